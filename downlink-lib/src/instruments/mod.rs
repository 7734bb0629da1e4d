//! Instrument scan line reconstruction.
//!
//! Each instrument is described by a [LineLayout] that decodes one unit of instrument
//! data, either a space packet data field or a raw frame, into one scan line for every
//! channel. A [Reconstructor] appends decoded lines to per-channel buffers in a
//! [ChannelSet]. It is fed either by a [PacketReconstructor], which is a [PacketSink] that
//! can be registered with a [Router](crate::spacepacket::Router), or by a
//! [FrameReconstructor] for instruments whose data is not packetized.
mod avhrr;
mod mhs;

pub use avhrr::Avhrr;
pub use mhs::Mhs;

use ndarray::{Array2, ArrayView2, ArrayViewMut2, Axis, ShapeError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::spacepacket::{Packet, PacketSink};
use crate::{Error, Result};

/// Fixed layout of an instrument's scan line data.
pub trait LineLayout {
    /// Short instrument name, e.g., `MHS`, used to name outputs.
    fn instrument(&self) -> &'static str;

    /// Number of channels in each scan line.
    fn channels(&self) -> usize;

    /// Number of samples per channel in each scan line.
    fn width(&self) -> usize;

    /// Exact length in bytes of one unit of input data.
    fn unit_len(&self) -> usize;

    /// Decode one unit into `line`, which has shape `(channels, width)`. `unit` is always
    /// exactly [LineLayout::unit_len] bytes.
    ///
    /// # Errors
    /// If the unit content is not a valid scan line.
    fn decode(&self, unit: &[u8], line: ArrayViewMut2<u16>) -> Result<()>;
}

/// Per-channel sample buffers that grow one row per scan line.
///
/// All channels always have the same height.
#[derive(Debug, Clone)]
pub struct ChannelSet {
    channels: Vec<Array2<u16>>,
    width: usize,
}

impl ChannelSet {
    pub fn new(count: usize, width: usize) -> Self {
        ChannelSet {
            channels: (0..count).map(|_| Array2::zeros((0, width))).collect(),
            width,
        }
    }

    /// Append a scan line of shape `(channels, width)`, adding one row to every channel.
    ///
    /// # Errors
    /// [Error::Shape] if `line` does not have the shape of this set. Nothing is appended in
    /// that case.
    pub fn push_line(&mut self, line: ArrayView2<u16>) -> Result<()> {
        if line.dim() != (self.channels.len(), self.width) {
            return Err(ShapeError::from_kind(ndarray::ErrorKind::IncompatibleShape).into());
        }
        for (channel, row) in self.channels.iter_mut().zip(line.axis_iter(Axis(0))) {
            channel.push_row(row)?;
        }
        Ok(())
    }

    /// Number of scan lines.
    pub fn height(&self) -> usize {
        self.channels.first().map_or(0, |c| c.nrows())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channel buffer by 0-based index.
    pub fn channel(&self, idx: usize) -> Option<&Array2<u16>> {
        self.channels.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Array2<u16>> {
        self.channels.iter()
    }
}

/// Line counts for one instrument.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentStats {
    pub instrument: String,
    /// Scan lines appended.
    pub lines: u64,
    /// Units skipped because they could not be decoded.
    pub malformed: u64,
}

/// Decodes units of instrument data into a [ChannelSet].
///
/// A line is only appended once it has been completely decoded, so a malformed unit
/// leaves the channel buffers unchanged.
pub struct Reconstructor<L: LineLayout> {
    layout: L,
    channels: ChannelSet,
    scratch: Array2<u16>,
    lines: u64,
    malformed: u64,
}

impl<L: LineLayout> Reconstructor<L> {
    pub fn new(layout: L) -> Self {
        let (count, width) = (layout.channels(), layout.width());
        Reconstructor {
            layout,
            channels: ChannelSet::new(count, width),
            scratch: Array2::zeros((count, width)),
            lines: 0,
            malformed: 0,
        }
    }

    /// Decode one unit and append it as a scan line.
    ///
    /// # Errors
    /// [Error::MalformedLine] if `unit` does not have the length required by the layout, or
    /// any error from the layout's decode. Errors are also counted as malformed lines.
    pub fn push(&mut self, unit: &[u8]) -> Result<()> {
        let result = self.decode_line(unit);
        match result {
            Ok(()) => self.lines += 1,
            Err(ref err) => {
                debug!(
                    instrument = self.layout.instrument(),
                    line = self.lines,
                    "skipping malformed line: {err}"
                );
                self.malformed += 1;
            }
        }
        result
    }

    fn decode_line(&mut self, unit: &[u8]) -> Result<()> {
        let expected = self.layout.unit_len();
        if unit.len() != expected {
            return Err(Error::MalformedLine {
                expected,
                actual: unit.len(),
            });
        }
        self.scratch.fill(0);
        self.layout.decode(unit, self.scratch.view_mut())?;
        self.channels.push_line(self.scratch.view())
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    pub fn stats(&self) -> InstrumentStats {
        InstrumentStats {
            instrument: self.layout.instrument().to_string(),
            lines: self.lines,
            malformed: self.malformed,
        }
    }
}

/// Packet-driven front end; each packet data field is one unit.
pub struct PacketReconstructor<L: LineLayout>(Reconstructor<L>);

impl<L: LineLayout> PacketReconstructor<L> {
    pub fn new(layout: L) -> Self {
        PacketReconstructor(Reconstructor::new(layout))
    }

    pub fn inner(&self) -> &Reconstructor<L> {
        &self.0
    }

    pub fn into_inner(self) -> Reconstructor<L> {
        self.0
    }
}

impl<L: LineLayout> PacketSink for PacketReconstructor<L> {
    fn handle(&mut self, packet: &Packet) {
        // already counted and logged
        let _ = self.0.push(packet.payload());
    }
}

/// Raw-frame-driven front end; each fixed-size frame is one unit.
pub struct FrameReconstructor<L: LineLayout>(Reconstructor<L>);

impl<L: LineLayout> FrameReconstructor<L> {
    pub fn new(layout: L) -> Self {
        FrameReconstructor(Reconstructor::new(layout))
    }

    /// Length of the frames this reconstructor expects.
    pub fn frame_len(&self) -> usize {
        self.0.layout.unit_len()
    }

    /// Decode one raw frame. Returns false if it was malformed and skipped.
    pub fn push(&mut self, frame: &[u8]) -> bool {
        self.0.push(frame).is_ok()
    }

    pub fn inner(&self) -> &Reconstructor<L> {
        &self.0
    }

    pub fn into_inner(self) -> Reconstructor<L> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spacepacket::PrimaryHeader;

    /// 2 channels of 3 samples from 6 byte units; a unit starting with 0xff is invalid.
    struct Tiny;

    impl LineLayout for Tiny {
        fn instrument(&self) -> &'static str {
            "TINY"
        }
        fn channels(&self) -> usize {
            2
        }
        fn width(&self) -> usize {
            3
        }
        fn unit_len(&self) -> usize {
            6
        }
        fn decode(&self, unit: &[u8], mut line: ArrayViewMut2<u16>) -> Result<()> {
            if unit[0] == 0xff {
                return Err(Error::MalformedLine {
                    expected: 6,
                    actual: 6,
                });
            }
            for (i, b) in unit.iter().enumerate() {
                line[[i / 3, i % 3]] = u16::from(*b);
            }
            Ok(())
        }
    }

    #[test]
    fn channel_set_grows_evenly() {
        let mut set = ChannelSet::new(2, 3);
        assert_eq!(set.height(), 0);

        let line = Array2::from_shape_vec((2, 3), vec![1, 2, 3, 4, 5, 6]).unwrap();
        set.push_line(line.view()).unwrap();
        set.push_line(line.view()).unwrap();

        assert_eq!(set.height(), 2);
        for channel in set.iter() {
            assert_eq!(channel.dim(), (2, 3));
        }
        assert_eq!(set.channel(1).unwrap()[[1, 0]], 4);
    }

    #[test]
    fn channel_set_rejects_wrong_shape() {
        let mut set = ChannelSet::new(2, 3);
        let line = Array2::<u16>::zeros((2, 4));
        assert!(matches!(set.push_line(line.view()), Err(Error::Shape(_))));
        assert_eq!(set.height(), 0);
    }

    #[test]
    fn malformed_units_do_not_change_buffers() {
        let mut recon = Reconstructor::new(Tiny);
        recon.push(&[0, 1, 2, 3, 4, 5]).unwrap();
        assert!(matches!(
            recon.push(&[0, 1, 2]),
            Err(Error::MalformedLine {
                expected: 6,
                actual: 3
            })
        ));
        assert!(recon.push(&[0xff, 1, 2, 3, 4, 5]).is_err());
        recon.push(&[6, 7, 8, 9, 10, 11]).unwrap();

        assert_eq!(recon.lines(), 2);
        assert_eq!(recon.malformed(), 2);
        let channels = recon.channels();
        assert_eq!(channels.height(), 2);
        assert_eq!(channels.channel(0).unwrap().row(1).to_vec(), vec![6, 7, 8]);
        assert_eq!(channels.channel(1).unwrap().row(0).to_vec(), vec![3, 4, 5]);
    }

    #[test]
    fn packet_front_end_uses_data_field() {
        let mut data = PrimaryHeader::standalone(1, 0, 6).encode().to_vec();
        data.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        let packet = Packet::decode(&data).unwrap();

        let mut recon = PacketReconstructor::new(Tiny);
        recon.handle(&packet);
        recon.handle(&packet);

        let inner = recon.into_inner();
        assert_eq!(inner.lines(), 2);
        assert_eq!(inner.stats().instrument, "TINY");
        assert_eq!(inner.channels().channel(0).unwrap().row(0).to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn frame_front_end() {
        let mut recon = FrameReconstructor::new(Tiny);
        assert_eq!(recon.frame_len(), 6);
        assert!(recon.push(&[1; 6]));
        assert!(!recon.push(&[1; 5]));
        assert_eq!(recon.inner().lines(), 1);
        assert_eq!(recon.inner().malformed(), 1);
    }
}
