use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::framing::DemuxStats;
use crate::image::{OutputFailure, Outputs};
use crate::instruments::InstrumentStats;
use crate::spacepacket::{Apid, Summary};

/// Counters for one decode run.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RunStats {
    /// Bytes read from the input.
    pub bytes: u64,
    /// Trailing bytes that did not make a complete frame.
    pub truncated_bytes: u64,
    /// Frames read.
    pub frames: u64,
    /// Frames for the virtual channels of interest.
    pub matched_frames: u64,
    /// Raw frames fed directly to an instrument.
    pub raw_units: u64,
    pub demux: DemuxStats,
    /// Packets delivered per APID.
    pub routed: BTreeMap<Apid, u64>,
    /// Packets without a consumer.
    pub unrouted: u64,
    pub instruments: Vec<InstrumentStats>,
    /// Packet counts and sequence gaps for routed APIDs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packets: Option<Summary>,
}

impl RunStats {
    /// Fraction of data units that were lost or could not be decoded.
    ///
    /// Lost and invalid packets plus malformed lines, over every packet or raw frame that
    /// was expected to carry instrument data. Zero if there was no data.
    pub fn loss_ratio(&self) -> f64 {
        let malformed: u64 = self.instruments.iter().map(|i| i.malformed).sum();
        let bad = self.demux.lost + self.demux.invalid + malformed;
        let total = self.demux.packets + self.demux.lost + self.demux.invalid + self.raw_units;
        if total == 0 {
            return 0.0;
        }
        bad as f64 / total as f64
    }

    pub fn lines(&self) -> u64 {
        self.instruments.iter().map(|i| i.lines).sum()
    }
}

/// The result of [DecodingModule::process](super::DecodingModule::process).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub module: String,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub stats: RunStats,
    /// Output paths in the order they were written.
    pub outputs: Vec<PathBuf>,
    /// Outputs that could not be written.
    pub failures: Vec<OutputFailure>,
    pub loss_ratio: f64,
    /// True if `loss_ratio` exceeded the module's `max_loss_ratio`.
    pub degraded: bool,
    /// Input read error that ended the run early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_error: Option<String>,
}

impl RunReport {
    pub(crate) fn new(
        module: &str,
        input: PathBuf,
        output_dir: PathBuf,
        stats: RunStats,
        outputs: Outputs,
        max_loss_ratio: f64,
    ) -> Self {
        let loss_ratio = stats.loss_ratio();
        let degraded = loss_ratio > max_loss_ratio;
        if degraded {
            warn!(
                module,
                loss_ratio, max_loss_ratio, "run is degraded, too much data was lost"
            );
        }
        RunReport {
            module: module.to_string(),
            input,
            output_dir,
            stats,
            outputs: outputs.written,
            failures: outputs.failures,
            loss_ratio,
            degraded,
            read_error: None,
        }
    }

    /// True if all outputs were written.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
