//! CCSDS space packets and their routing to consumers.
//!
//! References:
//! * CCSDS Space Packet Protocol 133.0-B-1
//!     - <https://public.ccsds.org/Pubs/133x0b1c2.pdf>
mod router;
mod summary;

pub use router::*;
pub use summary::*;

use std::fmt::Display;

use serde::{Deserialize, Serialize};

pub type Apid = u16;

/// Packet represents a single CCSDS space packet and its associated data.
///
/// This packet contains the primary header data as well as the user data,
/// which may or may not container a secondary header. See the header's
/// `has_secondary_header` flag.
///
/// # Example
/// Create a packet from the minimum number of bytes.
/// ```
/// use downlink::spacepacket::Packet;
///
/// let dat: &[u8] = &[
///     // primary header bytes
///     0xd, 0x59, 0xd2, 0xab, 0x0, 07,
///     // user data
///     0x52, 0xc0, 0x0, 0x0, 0x0, 0xa7, 0x0, 0xdb,
/// ];
/// let packet = Packet::decode(dat).unwrap();
/// assert_eq!(packet.header.apid, 1369);
/// assert_eq!(packet.payload().len(), 8);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Packet {
    /// All packets have a primary header
    pub header: PrimaryHeader,
    /// All packet bytes, including header and user data
    pub data: Vec<u8>,
}

impl Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Packet{{header: {:?}, data:[len={}]}}",
            self.header,
            self.data.len()
        )
    }
}

impl Packet {
    #[must_use]
    pub fn is_standalone(&self) -> bool {
        self.header.sequence_flags == SEQ_UNSEGMENTED
    }

    /// Packet data field, i.e., all bytes after the primary header.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[PrimaryHeader::LEN..]
    }

    /// Decode from bytes. Returns `None` if there are not enough bytes to construct the
    /// header or if there are not enough bytes to construct the [Packet] of the length
    /// indicated by the header. Bytes beyond the indicated length are ignored.
    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Packet> {
        let header = PrimaryHeader::decode(dat)?;
        let total = header.packet_len();
        if dat.len() < total {
            return None;
        }
        Some(Packet {
            header,
            data: dat[..total].to_vec(),
        })
    }
}

/// Packet is not part of a packet group, i.e., standalone.
pub const SEQ_UNSEGMENTED: u8 = 3;

/// CCSDS Primary Header
///
/// The primary header format is common to all CCSDS space packets.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrimaryHeader {
    pub version: u8,
    pub type_flag: u8,
    pub has_secondary_header: bool,
    pub apid: Apid,
    /// Packet grouping; [SEQ_UNSEGMENTED] for a packet that is not part of a group.
    pub sequence_flags: u8,
    pub sequence_id: u16,
    pub len_minus1: u16,
}

impl PrimaryHeader {
    /// Size of a ``PrimaryHeader``
    pub const LEN: usize = 6;
    pub const SEQ_MAX: u16 = 16383;

    /// Header for a standalone packet carrying `data_len` bytes of user data.
    ///
    /// # Panics
    /// If `data_len` is 0 or more than 65536
    #[must_use]
    pub fn standalone(apid: Apid, sequence_id: u16, data_len: usize) -> Self {
        assert!(
            (1..=65536).contains(&data_len),
            "invalid packet data length {data_len}"
        );
        PrimaryHeader {
            version: 0,
            type_flag: 0,
            has_secondary_header: false,
            apid: apid & 0x7ff,
            sequence_flags: SEQ_UNSEGMENTED,
            sequence_id: sequence_id & Self::SEQ_MAX,
            len_minus1: (data_len - 1) as u16,
        }
    }

    /// Decode from bytes. Returns `None` if there are not enough bytes to construct the
    /// header.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        let d1 = u16::from_be_bytes([buf[0], buf[1]]);
        let d2 = u16::from_be_bytes([buf[2], buf[3]]);
        let d3 = u16::from_be_bytes([buf[4], buf[5]]);

        Some(PrimaryHeader {
            version: (d1 >> 13 & 0x7) as u8,
            type_flag: (d1 >> 12 & 0x1) as u8,
            has_secondary_header: (d1 >> 11 & 0x1) == 1,
            apid: (d1 & 0x7ff),
            sequence_flags: (d2 >> 14 & 0x3) as u8,
            sequence_id: (d2 & 0x3fff),
            len_minus1: d3,
        })
    }

    #[must_use]
    pub fn encode(&self) -> [u8; Self::LEN] {
        let d1: u16 = (u16::from(self.version & 0x7) << 13)
            | (u16::from(self.type_flag & 0x1) << 12)
            | (u16::from(self.has_secondary_header) << 11)
            | (self.apid & 0x7ff);
        let d2: u16 = (u16::from(self.sequence_flags & 0x3) << 14) | (self.sequence_id & 0x3fff);
        let [a, b] = d1.to_be_bytes();
        let [c, d] = d2.to_be_bytes();
        let [e, f] = self.len_minus1.to_be_bytes();
        [a, b, c, d, e, f]
    }

    /// Total packet length in bytes, including this header.
    #[must_use]
    pub fn packet_len(&self) -> usize {
        Self::LEN + self.len_minus1 as usize + 1
    }
}

/// Calculate the number of missing sequence ids.
///
/// `cur` is the current sequence id. `last` is the sequence id seen before `cur`.
#[must_use]
pub fn missing_packets(cur: u16, last: u16) -> u16 {
    let modulus = u32::from(PrimaryHeader::SEQ_MAX) + 1;
    let cur = u32::from(cur & PrimaryHeader::SEQ_MAX);
    let last = u32::from(last & PrimaryHeader::SEQ_MAX);
    ((cur + modulus - last - 1) % modulus) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_header() {
        let dat: [u8; 6] = [
            // bytes from a SNPP CrIS packet
            0xd, 0x59, 0xd2, 0xab, 0xa, 0x8f,
        ];
        let ph = PrimaryHeader::decode(&dat).unwrap();

        assert_eq!(ph.version, 0);
        assert_eq!(ph.type_flag, 0);
        assert!(ph.has_secondary_header);
        assert_eq!(ph.apid, 1369);
        assert_eq!(ph.sequence_flags, 3);
        assert_eq!(ph.sequence_id, 4779);
        assert_eq!(ph.len_minus1, 2703);
        assert_eq!(ph.packet_len(), 2710);
        assert_eq!(ph.encode(), dat);
    }

    #[test]
    fn test_decode_packet() {
        #[rustfmt::skip]
        let dat: &[u8] = &[
            // Primary/secondary header and a single byte of user data
            0xd, 0x59, 0xc0, 0x01, 0x0, 0x8, 0x52, 0xc0, 0x0, 0x0, 0x0, 0xa7, 0x0, 0xdb, 0xff,
            // start of another packet
            0xd, 0x59,
        ];
        let packet = Packet::decode(dat).unwrap();
        assert_eq!(packet.data.len(), 15);
        assert_eq!(packet.payload().len(), 9);
        assert!(packet.is_standalone());

        assert!(Packet::decode(&dat[..14]).is_none());
        assert!(Packet::decode(&dat[..3]).is_none());
    }

    #[test]
    fn test_standalone_header() {
        let ph = PrimaryHeader::standalone(34, 16384 + 5, 1302);
        assert_eq!(ph.sequence_id, 5);
        assert_eq!(ph.len_minus1, 1301);
        let decoded = PrimaryHeader::decode(&ph.encode()).unwrap();
        assert_eq!(decoded, ph);
    }

    #[test]
    fn test_missing_packets() {
        assert_eq!(missing_packets(5, 4), 0);
        assert_eq!(missing_packets(5, 3), 1);
        assert_eq!(missing_packets(0, PrimaryHeader::SEQ_MAX), 0);
        assert_eq!(missing_packets(0, PrimaryHeader::SEQ_MAX - 1), 1);
        assert_eq!(missing_packets(0, 0), PrimaryHeader::SEQ_MAX);
    }
}
