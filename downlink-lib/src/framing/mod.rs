//! Transport frame decoding.
//!
//! Frames are read as fixed-size blocks (see [FrameReader]), their transfer frame
//! header decoded into a [VCDUHeader], filtered by virtual channel (see [ChannelFilter])
//! and finally demultiplexed into space packets (see [Demuxer]).
//!
//! References:
//! * CCSDS AOS Space Data Link Protocol 732.0-B-4
//!     - <https://public.ccsds.org/Pubs/732x0b4.pdf>
mod filter;
mod packets;
mod reader;

pub use filter::*;
pub use packets::*;
pub use reader::*;

use std::ops::Range;

use serde::{Deserialize, Serialize};

pub type Scid = u16;
pub type Vcid = u16;

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct VCDUHeader {
    pub version: u8,
    pub scid: Scid,
    pub vcid: Vcid,
    pub counter: u32,
    pub replay: bool,
    pub cycle: bool,
    pub counter_cycle: u8,
}

impl VCDUHeader {
    /// VCDU header length in bytes
    pub const LEN: usize = 6;
    /// VCID indicating a fill frame
    pub const FILL: Vcid = 63;
    /// Maximum value of the 24-bit VCDU counter before rollover to 0.
    pub const COUNTER_MAX: u32 = 0xff_ffff;

    /// Construct from the provided bytes, or `None` if there are not enough bytes.
    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Self> {
        if dat.len() < Self::LEN {
            return None;
        }

        let x = u16::from_be_bytes([dat[0], dat[1]]);
        Some(VCDUHeader {
            version: (dat[0] >> 6) & 0x3,
            scid: ((x >> 6) & 0xff),
            vcid: (x & 0x3f),
            counter: u32::from_be_bytes([0, dat[2], dat[3], dat[4]]),
            replay: (dat[5] >> 7) & 0x1 == 1,
            cycle: (dat[5] >> 6) & 0x1 == 1,
            counter_cycle: dat[5] & 0xf,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MPDU {
    first_header: u16,
    data: Vec<u8>,
}

impl MPDU {
    /// M_PDU header length in bytes
    pub const LEN: usize = 2;
    /// MPDU first-header pointer value indicating fill data
    pub const FILL: u16 = 0x7fe;
    /// MPDU first-header pointer value indicating this MPDU does not contain a packet
    /// primary header.
    pub const NO_HEADER: u16 = 0x7ff;

    /// Decode `data`, which must start with the M_PDU header, or `None` if there are not
    /// enough bytes.
    #[must_use]
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        let x = u16::from_be_bytes([data[0], data[1]]);

        Some(MPDU {
            first_header: x & 0x7ff,
            data: data.to_vec(),
        })
    }

    #[must_use]
    pub fn is_fill(&self) -> bool {
        self.first_header == Self::FILL
    }

    #[must_use]
    pub fn has_header(&self) -> bool {
        self.first_header != Self::NO_HEADER
    }

    /// Get the packet zone bytes from this MPDU, i.e., everything after the M_PDU header.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[Self::LEN..]
    }

    /// Offset of the first packet header within [MPDU::payload].
    #[must_use]
    pub fn header_offset(&self) -> usize {
        self.first_header as usize
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub header: VCDUHeader,
    /// All frame data bytes, including header
    pub data: Vec<u8>,
}

impl Frame {
    /// Decode ``dat`` into a ``Frame``, or `None` if not enough bytes.
    #[must_use]
    pub fn decode(dat: Vec<u8>) -> Option<Self> {
        let header = VCDUHeader::decode(&dat)?;
        Some(Frame { header, data: dat })
    }

    #[must_use]
    pub fn is_fill(&self) -> bool {
        self.header.vcid == VCDUHeader::FILL
    }

    /// Extract the MPDU bytes from this frame, or `None` if not enough bytes.
    #[must_use]
    pub fn mpdu(&self, izone_length: usize, trailer_length: usize) -> Option<MPDU> {
        let start: usize = VCDUHeader::LEN + izone_length;
        let end: usize = self.data.len().checked_sub(trailer_length)?;
        if start > end {
            return None;
        }
        MPDU::decode(&self.data[start..end])
    }
}

/// Describes how a transfer frame is laid out within each fixed-size block of an input
/// stream.
///
/// ```text
/// [sync marker][VCDU header][insert zone][M_PDU ...][trailer]
/// ```
///
/// The trailer covers anything after the data zone that is not interpreted here, e.g., an
/// operational control field or Reed-Solomon parity bytes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// Total length of one block in the input stream.
    pub block_len: usize,
    /// Bytes before the VCDU header, typically the attached sync marker.
    pub sync_len: usize,
    /// Insert zone length.
    pub izone_len: usize,
    /// Bytes after the M_PDU.
    pub trailer_len: usize,
}

impl FrameFormat {
    /// Format with no sync marker, insert zone or trailer.
    pub fn new(block_len: usize) -> Self {
        FrameFormat {
            block_len,
            sync_len: 0,
            izone_len: 0,
            trailer_len: 0,
        }
    }

    pub fn with_sync_marker(mut self, len: usize) -> Self {
        self.sync_len = len;
        self
    }

    pub fn with_insert_zone(mut self, len: usize) -> Self {
        self.izone_len = len;
        self
    }

    pub fn with_trailer(mut self, len: usize) -> Self {
        self.trailer_len = len;
        self
    }

    /// Byte range of the M_PDU, including its 2 byte header, within a block.
    #[must_use]
    pub fn payload_range(&self) -> Range<usize> {
        let start = self.sync_len + VCDUHeader::LEN + self.izone_len;
        let end = self.block_len.saturating_sub(self.trailer_len).max(start);
        start..end
    }

    /// Decode a block into a [Frame]. The sync marker is stripped, so the frame data starts
    /// with the VCDU header. Returns `None` if the block is too short to contain a header.
    #[must_use]
    pub fn decode(&self, block: &[u8]) -> Option<Frame> {
        if block.len() < self.sync_len {
            return None;
        }
        let end = block.len().min(self.block_len);
        Frame::decode(block[self.sync_len..end].to_vec())
    }
}

/// Calculate the number of missing frame sequence counts.
///
/// `cur` is the current frame counter. `last` is the frame counter seen before `cur`.
/// `cur` will be greater than `last` except in the case of a wrap. A repeated counter is
/// treated as a complete wrap.
#[must_use]
pub fn missing_frames(cur: u32, last: u32) -> u32 {
    let modulus = VCDUHeader::COUNTER_MAX + 1;
    let cur = cur & VCDUHeader::COUNTER_MAX;
    let last = last & VCDUHeader::COUNTER_MAX;
    (cur + modulus - last - 1) % modulus
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decode_vcduheader() {
        let dat: Vec<u8> = vec![
            0x55, 0x61, // version 1, scid 85, vcid 33
            0x01, 0xe2, 0x40, // counter 123456
            0x05, // replay:false, frame count usage:false, frame-count-cycle:5
            0x01, 0x02, 0x03, // insert zone
            0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0xaa, // first-header-pointer 682
        ];

        let header = VCDUHeader::decode(&dat).unwrap();

        assert_eq!(header.version, 1);
        assert_eq!(header.scid, 85);
        assert_eq!(header.vcid, 33);
        assert_eq!(header.counter, 123_456);
        assert!(!header.replay);
        assert!(!header.cycle);
        assert_eq!(header.counter_cycle, 5);
    }

    #[test]
    fn decode_vcduheader_minmax() {
        let header = VCDUHeader::decode(&[0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(header.counter, 0);

        let header = VCDUHeader::decode(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff]).unwrap();
        assert_eq!(header.vcid, VCDUHeader::FILL);
        assert_eq!(header.counter, VCDUHeader::COUNTER_MAX);
    }

    #[test]
    fn decode_vcduheader_is_none_when_data_too_short() {
        assert!(VCDUHeader::decode(&[0u8; 0]).is_none());
        assert!(VCDUHeader::decode(&[0u8; 5]).is_none());
    }

    #[test]
    fn frame_mpdu() {
        let mut dat: Vec<u8> = vec![
            0x67, 0x50, 0x96, 0x30, 0xbc, 0x80, // VCDU Header
            0x07, 0xff, // MPDU header indicating no header
        ];
        dat.resize(892, 0xff);

        let frame = Frame::decode(dat).unwrap();
        assert_eq!(frame.header.scid, 157);
        assert_eq!(frame.header.vcid, 16);

        let mpdu = frame.mpdu(0, 0).unwrap();
        assert!(!mpdu.is_fill());
        assert!(!mpdu.has_header());
        assert_eq!(mpdu.payload().len(), 892 - 8);
    }

    #[test]
    fn frame_mpdu_is_none_when_trailer_too_long() {
        let frame = Frame::decode(vec![0u8; 10]).unwrap();
        assert!(frame.mpdu(0, 20).is_none());
        assert!(frame.mpdu(4, 0).is_none());
    }

    #[test]
    fn frame_format_ranges() {
        let format = FrameFormat::new(1024)
            .with_sync_marker(4)
            .with_insert_zone(2)
            .with_trailer(128);

        assert_eq!(format.payload_range(), 12..896);

        let mut block = vec![0u8; 1024];
        block[4..10].copy_from_slice(&[0x40, 0x0c, 0x00, 0x00, 0x07, 0x00]);
        let frame = format.decode(&block).unwrap();
        assert_eq!(frame.header.vcid, 12);
        assert_eq!(frame.header.counter, 7);
        assert_eq!(frame.data.len(), 1020);

        let mpdu = frame.mpdu(format.izone_len, format.trailer_len).unwrap();
        assert_eq!(mpdu.payload().len(), 882);
    }

    #[test]
    fn test_missing_frames() {
        assert_eq!(missing_frames(5, 4), 0);
        assert_eq!(missing_frames(5, 3), 1);
        assert_eq!(missing_frames(0, VCDUHeader::COUNTER_MAX), 0);
        assert_eq!(missing_frames(0, VCDUHeader::COUNTER_MAX - 1), 1);
        assert_eq!(missing_frames(0, 0), VCDUHeader::COUNTER_MAX);
    }
}
