use ndarray::ArrayViewMut2;

use crate::Result;

use super::LineLayout;

/// NOAA HRPT minor frame layout for the Advanced Very High Resolution Radiometer.
///
/// Frames are not packetized. A minor frame is 11090 10-bit words, each stored as a
/// little-endian `u16`. Earth view data begins at word 750 with the 5 channels
/// interleaved per pixel.
#[derive(Debug, Default, Clone, Copy)]
pub struct Avhrr;

impl Avhrr {
    pub const CHANNELS: usize = 5;
    pub const WIDTH: usize = 2048;
    /// Words in one minor frame.
    pub const WORDS: usize = 11090;
    pub const FRAME_LEN: usize = Self::WORDS * 2;
    /// Word offset of the first earth view sample.
    pub const DATA_START: usize = 750;
    /// 10-bit samples are scaled by this to cover the 16-bit range.
    pub const SCALE: u16 = 60;
    const MASK: u16 = 0x3ff;
}

impl LineLayout for Avhrr {
    fn instrument(&self) -> &'static str {
        "AVHRR"
    }

    fn channels(&self) -> usize {
        Self::CHANNELS
    }

    fn width(&self) -> usize {
        Self::WIDTH
    }

    fn unit_len(&self) -> usize {
        Self::FRAME_LEN
    }

    fn decode(&self, unit: &[u8], mut line: ArrayViewMut2<u16>) -> Result<()> {
        let start = Self::DATA_START * 2;
        let end = start + Self::WIDTH * Self::CHANNELS * 2;
        for (n, word) in unit[start..end].chunks_exact(2).enumerate() {
            let value = u16::from_le_bytes([word[0], word[1]]) & Self::MASK;
            line[[n % Self::CHANNELS, n / Self::CHANNELS]] = value * Self::SCALE;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::FrameReconstructor;

    fn word(pixel: usize, channel: usize) -> u16 {
        ((pixel * 7 + channel * 3) % 1024) as u16
    }

    fn minor_frame() -> Vec<u8> {
        let mut words = vec![0u16; Avhrr::WORDS];
        for pixel in 0..Avhrr::WIDTH {
            for channel in 0..Avhrr::CHANNELS {
                // upper bits are not part of the sample
                words[Avhrr::DATA_START + pixel * 5 + channel] = word(pixel, channel) | 0xfc00;
            }
        }
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn decodes_interleaved_channels() {
        let frame = minor_frame();
        assert_eq!(frame.len(), Avhrr::FRAME_LEN);

        let mut recon = FrameReconstructor::new(Avhrr);
        assert!(recon.push(&frame));
        assert!(recon.push(&frame));

        let channels = recon.inner().channels();
        assert_eq!(channels.height(), 2);
        for channel in 0..Avhrr::CHANNELS {
            let buf = channels.channel(channel).unwrap();
            assert_eq!(buf.ncols(), Avhrr::WIDTH);
            for pixel in [0, 1, 1000, Avhrr::WIDTH - 1] {
                assert_eq!(buf[[1, pixel]], word(pixel, channel) * 60);
            }
        }
    }

    #[test]
    fn short_frame_is_malformed() {
        let mut recon = FrameReconstructor::new(Avhrr);
        let frame = minor_frame();
        assert!(!recon.push(&frame[..Avhrr::FRAME_LEN - 2]));
        assert_eq!(recon.inner().lines(), 0);
        assert_eq!(recon.inner().malformed(), 1);
    }
}
