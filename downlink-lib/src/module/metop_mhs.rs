use std::{
    io::BufReader,
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::framing::{ChannelFilter, Demuxer, FrameReader, Progress, Vcid};
use crate::image::{Synthesizer, MHS_COMPOSITES};
use crate::instruments::{LineLayout, Mhs, PacketReconstructor};
use crate::spacepacket::{Apid, Router, Summary};
use crate::{Error, Result};

use super::{
    open_input, DecodingModule, ModuleDescriptor, ParamKind, ParameterSpec, Parameters,
    RunOptions, RunReport, RunStats, COMMON_PARAMETERS,
};

const PARAMETERS: &[ParameterSpec] = &[
    COMMON_PARAMETERS[0],
    COMMON_PARAMETERS[1],
    ParameterSpec {
        name: "vcid",
        kind: ParamKind::Int,
        default: "12",
        description: "Virtual channel carrying MHS packets",
    },
    ParameterSpec {
        name: "apid",
        kind: ParamKind::Int,
        default: "34",
        description: "APID of MHS science packets",
    },
];

/// MetOp AHRPT MHS decoder.
///
/// Reads CADUs, keeps the MHS virtual channel, demultiplexes it into space packets and
/// routes science packets to the MHS reconstructor. Writes one image per channel plus an
/// overview mosaic to `<dir>/MHS`.
pub struct MetopMhs {
    input: PathBuf,
    synth: Synthesizer,
    options: RunOptions,
    vcid: Vcid,
    apid: Apid,
    outputs: Vec<PathBuf>,
}

impl MetopMhs {
    pub const ID: &'static str = "metop_mhs";

    /// # Errors
    /// [Error::Parameter] if a parameter has the wrong kind or is out of range.
    pub fn new(input: &Path, output_hint: &Path, params: &Parameters) -> Result<Self> {
        let params = params.resolve(Self::ID, PARAMETERS)?;
        let options = RunOptions::from_params(&params)?;
        let int_param = |key: &str, max: i64| -> Result<u16> {
            let value = params.get_int(key).unwrap_or_default();
            if !(0..=max).contains(&value) {
                return Err(Error::Parameter {
                    key: key.to_string(),
                    reason: format!("{value} is not between 0 and {max}"),
                });
            }
            Ok(value as u16)
        };
        Ok(MetopMhs {
            input: input.to_path_buf(),
            synth: Synthesizer::for_hint(output_hint, Mhs.instrument()),
            options,
            vcid: int_param("vcid", 63)?,
            apid: int_param("apid", 2047)?,
            outputs: Vec::default(),
        })
    }

    pub fn descriptor() -> ModuleDescriptor {
        ModuleDescriptor {
            id: Self::ID,
            label: "MetOp MHS",
            parameters: PARAMETERS,
            constructor: construct,
        }
    }
}

fn construct(input: &Path, hint: &Path, params: &Parameters) -> Result<Box<dyn DecodingModule>> {
    Ok(Box::new(MetopMhs::new(input, hint, params)?))
}

impl DecodingModule for MetopMhs {
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

        let format = Mhs::frame_format();
        let mut reader = FrameReader::new(BufReader::new(file), format.block_len);
        let mut progress = Progress::new(size).with_interval(self.options.progress_interval);
        let mut filter = ChannelFilter::new(&[self.vcid]);
        let mut demuxer = Demuxer::for_format(&format);
        let mut recon = PacketReconstructor::new(Mhs);
        let mut summary = Summary::default();

        info!("Demultiplexing and deframing...");
        let mut stats = RunStats::default();
        {
            let mut router = Router::default();
            router.register(self.apid, &mut recon);
            router.register(self.apid, &mut summary);

            while let Some(block) = reader.next() {
                progress.update(reader.consumed());
                stats.frames += 1;
                let Some(frame) = format.decode(&block) else {
                    continue;
                };
                if !filter.accept(&frame.header) {
                    continue;
                }
                for packet in demuxer.push(&frame) {
                    router.route(&packet);
                }
            }
            demuxer.finish();
            stats.routed = router.routed_counts().clone();
            stats.unrouted = router.unrouted();
        }

        let read_error = reader.take_error().map(|err| err.to_string());
        stats.bytes = reader.consumed();
        stats.truncated_bytes = reader.truncated() as u64;
        stats.matched_frames = filter.matched();
        stats.demux = demuxer.stats();
        stats.instruments.push(recon.inner().stats());
        stats.packets = Some(summary);

        info!(vcid = self.vcid, frames = stats.matched_frames, "MHS frames");
        info!(packets = stats.demux.packets, lost = stats.demux.lost, "CCSDS packets");
        info!(
            apid = self.apid,
            packets = stats.routed.get(&self.apid).copied().unwrap_or_default(),
            "MHS packets"
        );
        info!(lines = recon.inner().lines(), "MHS lines");
        if let Some(ref err) = read_error {
            warn!("input ended early: {err}");
        }

        info!("Writing images...");
        let outputs = self
            .synth
            .write_all(recon.inner().channels(), MHS_COMPOSITES);
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
