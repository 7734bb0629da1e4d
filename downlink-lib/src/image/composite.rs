use crate::instruments::ChannelSet;
use crate::{Error, Result};

use super::{Depth, Image};

/// Fixed recipe for combining channels into one image. Channel numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composite {
    /// 16-bit RGB with one channel per band.
    Rgb {
        name: &'static str,
        channels: [usize; 3],
    },
    /// [Composite::Rgb] equalized using `levels` bins across all bands, then normalized to
    /// 0..255 and written as 8-bit.
    EqualizedRgb {
        name: &'static str,
        channels: [usize; 3],
        levels: usize,
    },
    /// 16-bit grayscale grid with `columns` tiles per row. `None` tiles are zero.
    Mosaic {
        name: &'static str,
        columns: usize,
        tiles: &'static [Option<usize>],
    },
}

impl Composite {
    pub fn name(&self) -> &'static str {
        match self {
            Composite::Rgb { name, .. }
            | Composite::EqualizedRgb { name, .. }
            | Composite::Mosaic { name, .. } => *name,
        }
    }

    /// Build the composite from an instrument's channel buffers.
    ///
    /// # Errors
    /// [Error::Channel] if the recipe references a channel not in `channels`.
    pub fn render(&self, channels: &ChannelSet) -> Result<Image> {
        let get = |num: usize| {
            num.checked_sub(1)
                .and_then(|idx| channels.channel(idx))
                .map(|c| c.view())
                .ok_or(Error::Channel(num))
        };
        match self {
            Composite::Rgb { channels: nums, .. } => {
                let bands = nums.iter().map(|n| get(*n)).collect::<Result<Vec<_>>>()?;
                Image::stack(&bands)
            }
            Composite::EqualizedRgb {
                channels: nums,
                levels,
                ..
            } => {
                let bands = nums.iter().map(|n| get(*n)).collect::<Result<Vec<_>>>()?;
                let mut img = Image::stack(&bands)?;
                img.equalize(*levels);
                img.normalize(0, u16::from(u8::MAX));
                Ok(img.with_depth(Depth::Eight))
            }
            Composite::Mosaic { columns, tiles, .. } => {
                let tiles = tiles
                    .iter()
                    .map(|t| t.map(get).transpose())
                    .collect::<Result<Vec<_>>>()?;
                Image::mosaic(&tiles, *columns, (channels.height(), channels.width()))
            }
        }
    }
}

/// AVHRR false color composites.
pub const AVHRR_COMPOSITES: &[Composite] = &[
    Composite::Rgb {
        name: "RGB-221",
        channels: [2, 2, 1],
    },
    Composite::EqualizedRgb {
        name: "RGB-221-EQU",
        channels: [2, 2, 1],
        levels: 1000,
    },
];

/// MHS overview of all channels, 3 across.
pub const MHS_COMPOSITES: &[Composite] = &[Composite::Mosaic {
    name: "ALL",
    columns: 3,
    tiles: &[Some(1), Some(2), Some(3), Some(4), Some(5), None],
}];
