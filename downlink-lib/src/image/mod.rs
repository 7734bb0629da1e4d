//! Images and composites built from reconstructed channel buffers.
mod composite;
mod synth;

pub use composite::*;
pub use synth::*;

use std::{fs::File, io::BufWriter, path::Path};

use ndarray::{s, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Bits per sample of a written image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Depth {
    Eight,
    Sixteen,
}

/// Pixel data of shape `(height, width, bands)` with 1 (gray) or 3 (RGB) bands.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pixels: Array3<u16>,
    depth: Depth,
}

impl Image {
    /// 16-bit grayscale image of a single channel.
    pub fn gray(channel: ArrayView2<u16>) -> Self {
        Image {
            pixels: channel.to_owned().insert_axis(Axis(2)),
            depth: Depth::Sixteen,
        }
    }

    /// 16-bit image with one band per channel, in order.
    ///
    /// # Errors
    /// If the channels do not all have the same shape.
    pub fn stack(bands: &[ArrayView2<u16>]) -> Result<Self> {
        Ok(Image {
            pixels: ndarray::stack(Axis(2), bands)?,
            depth: Depth::Sixteen,
        })
    }

    /// 16-bit grayscale image of `tiles` laid out row by row, `columns` tiles per row. Each
    /// tile is `tile_shape` (rows, cols); `None` tiles are left zero.
    ///
    /// # Errors
    /// If a tile does not have `tile_shape`.
    pub fn mosaic(
        tiles: &[Option<ArrayView2<u16>>],
        columns: usize,
        tile_shape: (usize, usize),
    ) -> Result<Self> {
        let (h, w) = tile_shape;
        let rows = tiles.len().div_ceil(columns.max(1));
        let mut pixels = Array3::zeros((rows * h, columns * w, 1));
        for (idx, tile) in tiles.iter().enumerate() {
            let Some(tile) = tile else {
                continue;
            };
            let (r, c) = (idx / columns, idx % columns);
            let mut dest = pixels.slice_mut(s![r * h..(r + 1) * h, c * w..(c + 1) * w, 0]);
            if dest.dim() != tile.dim() {
                return Err(
                    ndarray::ShapeError::from_kind(ndarray::ErrorKind::IncompatibleShape).into(),
                );
            }
            dest.assign(tile);
        }
        Ok(Image {
            pixels,
            depth: Depth::Sixteen,
        })
    }

    pub fn height(&self) -> usize {
        self.pixels.dim().0
    }

    pub fn width(&self) -> usize {
        self.pixels.dim().1
    }

    pub fn bands(&self) -> usize {
        self.pixels.dim().2
    }

    pub fn depth(&self) -> Depth {
        self.depth
    }

    pub fn pixels(&self) -> &Array3<u16> {
        &self.pixels
    }

    /// Set the bit depth used when writing. Values above 255 are clamped when writing
    /// 8-bit images.
    #[must_use]
    pub fn with_depth(mut self, depth: Depth) -> Self {
        self.depth = depth;
        self
    }

    /// Histogram equalization over all bands using `levels` histogram bins spanning the
    /// image's value range. Output values stay within the input min and max.
    pub fn equalize(&mut self, levels: usize) {
        let (Some(&min), Some(&max)) = (self.pixels.iter().min(), self.pixels.iter().max()) else {
            return;
        };
        if levels == 0 || min == max {
            return;
        }
        let range = f64::from(max - min);
        let bin = |v: u16| {
            let pos = f64::from(v - min) * (levels - 1) as f64 / range;
            (pos as usize).min(levels - 1)
        };

        let mut cumulative = vec![0u64; levels];
        for v in &self.pixels {
            cumulative[bin(*v)] += 1;
        }
        for i in 1..levels {
            cumulative[i] += cumulative[i - 1];
        }
        let total = self.pixels.len() as f64;
        self.pixels
            .mapv_inplace(|v| (f64::from(min) + range * cumulative[bin(v)] as f64 / total) as u16);
    }

    /// Linearly rescale values so the image minimum maps to `lo` and the maximum to `hi`.
    /// A constant image is filled with `lo`.
    pub fn normalize(&mut self, lo: u16, hi: u16) {
        let (Some(&min), Some(&max)) = (self.pixels.iter().min(), self.pixels.iter().max()) else {
            return;
        };
        if min == max {
            self.pixels.fill(lo);
            return;
        }
        let (fmin, fmax) = (f64::from(min), f64::from(max));
        let (flo, fhi) = (f64::from(lo), f64::from(hi));
        self.pixels
            .mapv_inplace(|v| ((f64::from(v) - fmin) / (fmax - fmin) * (fhi - flo) + flo) as u16);
    }

    /// Sample bytes in PNG order, i.e., row major, bands interleaved, 16-bit big-endian.
    fn png_data(&self) -> Vec<u8> {
        match self.depth {
            Depth::Eight => self.pixels.iter().map(|v| (*v).min(255) as u8).collect(),
            Depth::Sixteen => self.pixels.iter().flat_map(|v| v.to_be_bytes()).collect(),
        }
    }

    /// Write as a PNG file, replacing any existing file.
    ///
    /// # Errors
    /// On I/O or encoding failures.
    pub fn write_png(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        let mut encoder = png::Encoder::new(writer, self.width() as u32, self.height() as u32);
        encoder.set_color(if self.bands() == 3 {
            png::ColorType::Rgb
        } else {
            png::ColorType::Grayscale
        });
        encoder.set_depth(match self.depth {
            Depth::Eight => png::BitDepth::Eight,
            Depth::Sixteen => png::BitDepth::Sixteen,
        });
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&self.png_data())?;
        writer.finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn stack_bands() {
        let a = array![[1u16, 2], [3, 4]];
        let b = array![[5u16, 6], [7, 8]];
        let img = Image::stack(&[a.view(), a.view(), b.view()]).unwrap();

        assert_eq!((img.height(), img.width(), img.bands()), (2, 2, 3));
        assert_eq!(img.pixels()[[1, 0, 0]], 3);
        assert_eq!(img.pixels()[[1, 0, 2]], 7);
    }

    #[test]
    fn stack_rejects_mismatched_bands() {
        let a = Array2::<u16>::zeros((2, 2));
        let b = Array2::<u16>::zeros((3, 2));
        assert!(Image::stack(&[a.view(), b.view()]).is_err());
    }

    #[test]
    fn mosaic_places_tiles() {
        let one = Array2::from_elem((2, 3), 1u16);
        let two = Array2::from_elem((2, 3), 2u16);
        let img = Image::mosaic(&[Some(one.view()), None, Some(two.view())], 2, (2, 3)).unwrap();

        assert_eq!((img.height(), img.width(), img.bands()), (4, 6, 1));
        assert_eq!(img.pixels()[[0, 0, 0]], 1);
        assert_eq!(img.pixels()[[1, 4, 0]], 0);
        assert_eq!(img.pixels()[[3, 2, 0]], 2);
        assert_eq!(img.pixels()[[3, 5, 0]], 0);
    }

    #[test]
    fn equalize_spreads_values() {
        let a = array![[0u16, 10], [10, 1000]];
        let mut img = Image::gray(a.view());
        img.equalize(1000);

        let px = img.pixels();
        // cumulative fractions: 1/4, 3/4, 1
        assert_eq!(px[[0, 0, 0]], 250);
        assert_eq!(px[[0, 1, 0]], 750);
        assert_eq!(px[[1, 0, 0]], 750);
        assert_eq!(px[[1, 1, 0]], 1000);
    }

    #[test]
    fn normalize_range() {
        let a = array![[100u16, 200], [300, 500]];
        let mut img = Image::gray(a.view());
        img.normalize(0, 255);
        let px = img.pixels();
        assert_eq!(px[[0, 0, 0]], 0);
        assert_eq!(px[[0, 1, 0]], 63);
        assert_eq!(px[[1, 1, 0]], 255);

        let mut flat = Image::gray(Array2::from_elem((2, 2), 7u16).view());
        flat.normalize(0, 255);
        assert!(flat.pixels().iter().all(|v| *v == 0));
    }

    #[test]
    fn write_png_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.png");
        let a = array![[1u16, 2, 3], [4, 5, 6]];
        Image::stack(&[a.view(), a.view(), a.view()])
            .unwrap()
            .with_depth(Depth::Eight)
            .write_png(&path)
            .unwrap();

        let decoder = png::Decoder::new(File::open(&path).unwrap());
        let reader = decoder.read_info().unwrap();
        let info = reader.info();
        assert_eq!((info.width, info.height), (3, 2));
        assert_eq!(info.color_type, png::ColorType::Rgb);
        assert_eq!(info.bit_depth, png::BitDepth::Eight);
    }
}
