use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::instruments::ChannelSet;
use crate::Result;

use super::{Composite, Image};

/// An output that could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Result of writing an instrument's images.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outputs {
    /// Paths written, in the order they were created.
    pub written: Vec<PathBuf>,
    pub failures: Vec<OutputFailure>,
}

impl Outputs {
    fn record(&mut self, path: PathBuf, result: Result<()>) {
        match result {
            Ok(()) => {
                info!("wrote {path:?}");
                self.written.push(path);
            }
            Err(err) => {
                warn!("failed to write {path:?}: {err}");
                self.failures.push(OutputFailure {
                    path,
                    error: err.to_string(),
                });
            }
        }
    }
}

/// Writes channel images and composites for one instrument into `<root>/<INSTRUMENT>/`.
///
/// Channel images are named `<INSTRUMENT>-<n>.png`, `n` starting at 1, and composites
/// `<INSTRUMENT>-<name>.png`. A failure to write one image does not stop the others.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    dir: PathBuf,
    instrument: String,
}

impl Synthesizer {
    pub fn new(root: &Path, instrument: &str) -> Self {
        Synthesizer {
            dir: root.join(instrument),
            instrument: instrument.to_string(),
        }
    }

    /// Synthesizer writing next to `hint`, i.e., in its parent directory. If `hint` is an
    /// existing directory it is used as the root directly.
    pub fn for_hint(hint: &Path, instrument: &str) -> Self {
        let root = if hint.is_dir() {
            hint
        } else {
            hint.parent().unwrap_or(Path::new(""))
        };
        Self::new(root, instrument)
    }

    /// Directory outputs are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write every channel, then every composite. Nothing is written if there are no
    /// lines.
    pub fn write_all(&self, channels: &ChannelSet, composites: &[Composite]) -> Outputs {
        let mut outputs = Outputs::default();
        if channels.height() == 0 {
            warn!(instrument = %self.instrument, "no lines decoded, not writing images");
            return outputs;
        }
        if let Err(err) = std::fs::create_dir_all(&self.dir) {
            warn!("failed to create output directory {:?}: {err}", self.dir);
            outputs.failures.push(OutputFailure {
                path: self.dir.clone(),
                error: err.to_string(),
            });
            return outputs;
        }

        info!(dir = ?self.dir, "writing images");
        for (idx, channel) in channels.iter().enumerate() {
            let path = self.path_for(&(idx + 1).to_string());
            let result = Image::gray(channel.view()).write_png(&path);
            outputs.record(path, result);
        }
        for composite in composites {
            let path = self.path_for(composite.name());
            let result = composite
                .render(channels)
                .and_then(|img| img.write_png(&path));
            outputs.record(path, result);
        }
        outputs
    }

    fn path_for(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}-{suffix}.png", self.instrument))
    }
}
