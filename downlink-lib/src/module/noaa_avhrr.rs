use std::{
    io::BufReader,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::framing::{FrameReader, Progress};
use crate::image::{Synthesizer, AVHRR_COMPOSITES};
use crate::instruments::{Avhrr, FrameReconstructor, LineLayout};
use crate::Result;

use super::{
    open_input, DecodingModule, ModuleDescriptor, ParameterSpec, Parameters, RunOptions,
    RunReport, RunStats, COMMON_PARAMETERS,
};

const PARAMETERS: &[ParameterSpec] = &COMMON_PARAMETERS;

/// NOAA HRPT AVHRR decoder.
///
/// Input is a stream of HRPT minor frames, each decoded directly into one AVHRR scan line.
/// Writes one image per channel plus 221 false color composites to `<dir>/AVHRR`.
pub struct NoaaAvhrr {
    input: PathBuf,
    synth: Synthesizer,
    options: RunOptions,
    outputs: Vec<PathBuf>,
}

impl NoaaAvhrr {
    pub const ID: &'static str = "noaa_avhrr";

    /// # Errors
    /// [Error::Parameter](crate::Error::Parameter) if a parameter has the wrong kind or is
    /// out of range.
    pub fn new(input: &Path, output_hint: &Path, params: &Parameters) -> Result<Self> {
        let params = params.resolve(Self::ID, PARAMETERS)?;
        Ok(NoaaAvhrr {
            input: input.to_path_buf(),
            synth: Synthesizer::for_hint(output_hint, Avhrr.instrument()),
            options: RunOptions::from_params(&params)?,
            outputs: Vec::default(),
        })
    }

    pub fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor {
            id: Self::ID,
            label: "NOAA AVHRR",
            parameters: PARAMETERS,
            constructor: construct,
        }
    }
}

fn construct(input: &Path, hint: &Path, params: &Parameters) -> Result<Box<dyn DecodingModule>> {
    Ok(Box::new(NoaaAvhrr::new(input, hint, params)?))
}

impl DecodingModule for NoaaAvhrr {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn declared_parameters(&self) -> &'static [ParameterSpec] {
        PARAMETERS
    }

    fn process(&mut self) -> Result<RunReport> {
        let (file, size) = open_input(&self.input)?;
        info!("Using input frames {:?}", self.input);
        info!("Decoding to {:?}", self.synth.dir());

        let mut recon = FrameReconstructor::new(Avhrr);
        let mut reader = FrameReader::new(BufReader::new(file), recon.frame_len());
        let mut progress = Progress::new(size).with_interval(self.options.progress_interval);

        info!("Decoding minor frames...");
        let mut stats = RunStats::default();
        while let Some(frame) = reader.next() {
            progress.update(reader.consumed());
            stats.frames += 1;
            recon.push(&frame);
        }

        let read_error = reader.take_error().map(|err| err.to_string());
        stats.bytes = reader.consumed();
        stats.truncated_bytes = reader.truncated() as u64;
        stats.matched_frames = stats.frames;
        stats.raw_units = stats.frames;
        stats.instruments.push(recon.inner().stats());

        info!(lines = recon.inner().lines(), "AVHRR lines");
        if let Some(ref err) = read_error {
            warn!("input ended early: {err}");
        }

        info!("Writing images...");
        let outputs = self
            .synth
            .write_all(recon.inner().channels(), AVHRR_COMPOSITES);
        self.outputs.clone_from(&outputs.written);

        let mut report = RunReport::new(
            Self::ID,
            self.input.clone(),
            self.synth.dir().to_path_buf(),
            stats,
            outputs,
            self.options.max_loss_ratio,
        );
        report.read_error = read_error;
        Ok(report)
    }

    fn output_files(&self) -> &[PathBuf] {
        &self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_common_parameters() {
        let module = NoaaAvhrr::new(
            Path::new("x"),
            Path::new("/data/noaa19.raw16"),
            &Parameters::default(),
        )
        .unwrap();
        let names: Vec<&str> = module.declared_parameters().iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["max_loss_ratio", "progress_interval"]);
        assert_eq!(module.synth.dir(), Path::new("/data/AVHRR"));
    }

    #[test]
    fn empty_input_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("empty.raw16");
        std::fs::write(&input, b"").unwrap();

        let mut module =
            NoaaAvhrr::new(&input, &dir.path().join("out"), &Parameters::default()).unwrap();
        let report = module.process().unwrap();

        assert_eq!(report.stats.frames, 0);
        assert_eq!(report.stats.lines(), 0);
        assert!(report.outputs.is_empty());
        assert!(!report.degraded);
        assert!(!dir.path().join("AVHRR").exists());
    }
}
