use ndarray::ArrayViewMut2;

use crate::framing::{FrameFormat, Vcid};
use crate::spacepacket::Apid;
use crate::Result;

use super::LineLayout;

/// MetOp Microwave Humidity Sounder science packet layout.
///
/// Each APID 34 packet carries one scan of 90 earth view positions. A position is a 2 byte
/// status word followed by one big-endian sample for each of the 5 channels. The
/// instrument scans right to left, so position `i` is stored in column `89 - i`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mhs;

impl Mhs {
    pub const VCID: Vcid = 12;
    pub const APID: Apid = 34;
    pub const CHANNELS: usize = 5;
    pub const WIDTH: usize = 90;
    /// Packet data field length, i.e., without the primary header.
    pub const PAYLOAD_LEN: usize = 1302;
    /// Offset of the first scan position in the packet data field.
    pub const SCENE_OFFSET: usize = 48;
    pub const POSITION_LEN: usize = 12;

    /// MetOp AHRPT CADU: 4 byte ASM, 2 byte insert zone, and 128 bytes of RS parity.
    pub fn frame_format() -> FrameFormat {
        FrameFormat::new(1024)
            .with_sync_marker(4)
            .with_insert_zone(2)
            .with_trailer(128)
    }
}

impl LineLayout for Mhs {
    fn instrument(&self) -> &'static str {
        "MHS"
    }

    fn channels(&self) -> usize {
        Self::CHANNELS
    }

    fn width(&self) -> usize {
        Self::WIDTH
    }

    fn unit_len(&self) -> usize {
        Self::PAYLOAD_LEN
    }

    fn decode(&self, unit: &[u8], mut line: ArrayViewMut2<u16>) -> Result<()> {
        let scene = &unit[Self::SCENE_OFFSET..Self::SCENE_OFFSET + Self::WIDTH * Self::POSITION_LEN];
        for (i, position) in scene.chunks_exact(Self::POSITION_LEN).enumerate() {
            let col = Self::WIDTH - 1 - i;
            // skip the status word
            for (c, sample) in position[2..].chunks_exact(2).enumerate() {
                line[[c, col]] = u16::from_be_bytes([sample[0], sample[1]]);
            }
        }
        Ok(())
    }
}
