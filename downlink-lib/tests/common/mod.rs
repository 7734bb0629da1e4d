#![allow(dead_code)]

use std::{collections::HashMap, fs::File, path::Path};

use downlink::framing::{Vcid, MPDU};
use downlink::instruments::{Avhrr, Mhs};
use downlink::spacepacket::{Apid, PrimaryHeader};
use md5::{Digest, Md5};

pub const ASM: [u8; 4] = [0x1a, 0xcf, 0xfc, 0x1d];
pub const ZONE_LEN: usize = 882;
const IDLE_APID: Apid = 0x7ff;

/// MHS sample value for a scan line, channel and scan position.
pub fn mhs_sample(line: u16, channel: usize, pos: usize) -> u16 {
    line * 1000 + channel as u16 * 100 + pos as u16
}

pub fn packet(apid: Apid, seq: u16, data: &[u8]) -> Vec<u8> {
    let mut dat = PrimaryHeader::standalone(apid, seq, data.len())
        .encode()
        .to_vec();
    dat.extend_from_slice(data);
    dat
}

/// MHS science packet for scan `line`.
pub fn mhs_packet(line: u16) -> Vec<u8> {
    let mut data = vec![0u8; Mhs::PAYLOAD_LEN];
    for pos in 0..Mhs::WIDTH {
        let start = Mhs::SCENE_OFFSET + pos * Mhs::POSITION_LEN;
        for c in 0..Mhs::CHANNELS {
            let off = start + 2 + c * 2;
            data[off..off + 2].copy_from_slice(&mhs_sample(line, c, pos).to_be_bytes());
        }
    }
    packet(Mhs::APID, line, &data)
}

/// Builds a stream of 1024 byte MetOp style CADUs.
#[derive(Default)]
pub struct CaduWriter {
    counters: HashMap<Vcid, u32>,
    /// Each written frame, already framed with its ASM.
    pub frames: Vec<Vec<u8>>,
}

impl CaduWriter {
    fn cadu(&mut self, vcid: Vcid, fhp: u16, zone: &[u8]) -> Vec<u8> {
        let counter = self.counters.entry(vcid).or_default();
        let mut dat = ASM.to_vec();
        // version 1, scid 11
        dat.push(0x40 | (11 >> 2));
        dat.push(((11 & 0x3) << 6) | (vcid as u8 & 0x3f));
        dat.extend_from_slice(&counter.to_be_bytes()[1..]);
        dat.push(0);
        dat.extend_from_slice(&[0, 0]); // insert zone
        dat.extend_from_slice(&fhp.to_be_bytes());
        dat.extend_from_slice(zone);
        dat.resize(1024, 0xaa); // RS parity
        *counter = (*counter + 1) & 0xff_ffff;
        dat
    }

    /// Write `packets` back to back in frames for `vcid`. The last frame is padded with
    /// an idle packet.
    pub fn write_packets(&mut self, vcid: Vcid, packets: &[Vec<u8>]) {
        let mut stream = Vec::default();
        let mut starts = Vec::default();
        for p in packets {
            starts.push(stream.len());
            stream.extend_from_slice(p);
        }
        let rem = stream.len() % ZONE_LEN;
        if rem != 0 {
            let mut pad = ZONE_LEN - rem;
            if pad < PrimaryHeader::LEN + 1 {
                pad += ZONE_LEN;
            }
            starts.push(stream.len());
            stream.extend(packet(IDLE_APID, 0, &vec![0x55; pad - PrimaryHeader::LEN]));
        }
        for (i, zone) in stream.chunks(ZONE_LEN).enumerate() {
            let lo = i * ZONE_LEN;
            let fhp = starts
                .iter()
                .find(|s| **s >= lo && **s < lo + ZONE_LEN)
                .map_or(MPDU::NO_HEADER, |s| (*s - lo) as u16);
            let cadu = self.cadu(vcid, fhp, zone);
            self.frames.push(cadu);
        }
    }

    pub fn write_fill(&mut self) {
        let cadu = self.cadu(63, MPDU::FILL, &[0; ZONE_LEN]);
        self.frames.push(cadu);
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.frames.concat()
    }
}

/// MetOp stream with `lines` MHS scans on VCID 12, interleaved with another
/// virtual channel and fill.
pub fn mhs_stream(lines: u16) -> CaduWriter {
    let mut writer = CaduWriter::default();
    let other: Vec<Vec<u8>> = (0..3).map(|i| packet(100, i, &[i as u8; 500])).collect();
    writer.write_packets(9, &other);
    writer.write_fill();
    let scans: Vec<Vec<u8>> = (0..lines).map(mhs_packet).collect();
    writer.write_packets(Mhs::VCID, &scans);
    writer.write_fill();
    writer
}

/// AVHRR 10-bit value for a scan line, channel and pixel.
pub fn avhrr_word(line: usize, channel: usize, pixel: usize) -> u16 {
    ((pixel * 7 + channel * 3 + line) % 1024) as u16
}

/// HRPT minor frame carrying AVHRR scan `line`.
pub fn avhrr_frame(line: usize) -> Vec<u8> {
    let mut words = vec![0u16; Avhrr::WORDS];
    for pixel in 0..Avhrr::WIDTH {
        for channel in 0..Avhrr::CHANNELS {
            words[Avhrr::DATA_START + pixel * Avhrr::CHANNELS + channel] =
                avhrr_word(line, channel, pixel);
        }
    }
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Decode a PNG, returning its header info and image bytes.
pub fn read_png(path: &Path) -> (png::OutputInfo, Vec<u8>) {
    let decoder = png::Decoder::new(File::open(path).unwrap());
    let mut reader = decoder.read_info().unwrap();
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf).unwrap();
    buf.truncate(info.buffer_size());
    (info, buf)
}

pub fn md5_file(path: &Path) -> String {
    let dat = std::fs::read(path).unwrap();
    format!("{:x}", Md5::digest(dat))
}
