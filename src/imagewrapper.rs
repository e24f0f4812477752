use crate::Result;
use crate::error::CompressionError;
use faer_core::Mat;
use image::*;
use std::array;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Row-major, channels-last pixel array with a shape of `[height, width]` or
/// `[height, width, channels]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelArray<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T: Copy> PixelArray<T> {
    pub fn new(shape: Vec<usize>, data: Vec<T>) -> Result<Self> {
        if !(2..=3).contains(&shape.len()) {
            return Err(CompressionError::UnsupportedChannelLayout(format!(
                "expected 2 or 3 dimensions, got shape {:?}",
                shape
            )));
        }
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(CompressionError::ShapeMismatch(format!(
                "shape {:?} needs {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub(crate) fn from_parts(shape: Vec<usize>, data: Vec<T>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn height(&self) -> usize {
        self.shape[0]
    }

    pub fn width(&self) -> usize {
        self.shape[1]
    }

    /// Size of the third dimension, 1 for a two-dimensional array.
    pub fn channels(&self) -> usize {
        self.shape.get(2).copied().unwrap_or(1)
    }

    pub fn get(&self, row: usize, col: usize, channel: usize) -> T {
        self.data[(row * self.width() + col) * self.channels() + channel]
    }
}

impl PixelArray<u8> {
    pub fn into_dynamic(self) -> Result<DynamicImage> {
        let width = self.width() as u32;
        let height = self.height() as u32;
        let dims = self.shape.len();
        let channels = self.channels();

        let image = match (dims, channels) {
            (2, _) => GrayImage::from_raw(width, height, self.data).map(DynamicImage::ImageLuma8),
            (3, 3) => RgbImage::from_raw(width, height, self.data).map(DynamicImage::ImageRgb8),
            _ => {
                return Err(CompressionError::UnsupportedChannelLayout(format!(
                    "cannot encode {} channels",
                    channels
                )));
            }
        };
        image.ok_or_else(|| {
            CompressionError::ShapeMismatch(format!(
                "buffer does not fit a {}x{} image",
                width, height
            ))
        })
    }
}

/// A decoded image, one `f32` matrix per channel.
#[derive(Debug, Clone)]
pub enum Image {
    Grayscale(Mat<f32>),
    Rgb([Mat<f32>; 3]),
}

impl Image {
    /// Picks the grayscale or RGB variant from the array's shape. Channels past
    /// the third (alpha and the like) are never read.
    pub fn from_array<T: Copy + Into<f32>>(array: &PixelArray<T>) -> Result<Self> {
        let height = array.height();
        let width = array.width();

        match (array.shape().len(), array.channels()) {
            (2, _) => Ok(Image::Grayscale(Mat::from_fn(height, width, |i, j| {
                array.get(i, j, 0).into()
            }))),
            (3, channels) if channels >= 3 => {
                if channels > 3 {
                    log::debug!("dropping {} channel(s) past RGB", channels - 3);
                }
                let mats = array::from_fn(|k| {
                    Mat::from_fn(height, width, |i, j| array.get(i, j, k).into())
                });
                Ok(Image::Rgb(mats))
            }
            (_, channels) => Err(CompressionError::UnsupportedChannelLayout(format!(
                "a {}x{} image with {} channel(s) is neither grayscale nor RGB",
                height, width, channels
            ))),
        }
    }

    pub fn rgb(r: Mat<f32>, g: Mat<f32>, b: Mat<f32>) -> Result<Self> {
        let dims = (r.nrows(), r.ncols());
        for (name, mat) in [("green", &g), ("blue", &b)] {
            if (mat.nrows(), mat.ncols()) != dims {
                return Err(CompressionError::ShapeMismatch(format!(
                    "{} channel is {}x{}, red channel is {}x{}",
                    name,
                    mat.nrows(),
                    mat.ncols(),
                    dims.0,
                    dims.1
                )));
            }
        }
        Ok(Image::Rgb([r, g, b]))
    }

    /// Converts a decoded raster. Deeper sample types are brought down to 8 bits
    /// first, so values always lie in [0, 255].
    pub fn from_dynamic(img: &DynamicImage) -> Result<Self> {
        let height = img.height() as usize;
        let width = img.width() as usize;

        let array = match img.color().channel_count() {
            1 => PixelArray::new(vec![height, width], img.to_luma8().into_raw())?,
            2 => PixelArray::new(vec![height, width, 2], img.to_luma_alpha8().into_raw())?,
            3 => PixelArray::new(vec![height, width, 3], img.to_rgb8().into_raw())?,
            _ => PixelArray::new(vec![height, width, 4], img.to_rgba8().into_raw())?,
        };
        Self::from_array(&array)
    }

    pub fn height(&self) -> usize {
        self.channels()[0].nrows()
    }

    pub fn width(&self) -> usize {
        self.channels()[0].ncols()
    }

    pub fn channels(&self) -> &[Mat<f32>] {
        match self {
            Image::Grayscale(mat) => std::slice::from_ref(mat),
            Image::Rgb(mats) => mats,
        }
    }
}

pub fn load<R: Read>(reader: R) -> Result<DynamicImage> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    let format = guess_format(&buf)?;

    Ok(load_from_memory_with_format(&buf, format)?)
}

/// Places `original` at x = 0 and `compressed` at x = width on one RGB canvas.
pub fn side_by_side(original: &DynamicImage, compressed: &DynamicImage) -> Result<RgbImage> {
    if original.dimensions() != compressed.dimensions() {
        return Err(CompressionError::ShapeMismatch(format!(
            "original is {:?}, compressed is {:?}",
            original.dimensions(),
            compressed.dimensions()
        )));
    }
    let (width, height) = original.dimensions();

    let mut canvas = RgbImage::new(width * 2, height);
    imageops::replace(&mut canvas, &original.to_rgb8(), 0, 0);
    imageops::replace(&mut canvas, &compressed.to_rgb8(), i64::from(width), 0);
    Ok(canvas)
}

/// Writes through a sibling staging file, so `path` only ever holds a complete image.
pub fn save(image: &RgbImage, path: &Path, format: ImageFormat) -> Result<()> {
    let staging = staging_path(path);
    let written = File::create(&staging)
        .map_err(CompressionError::from)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            image.write_to(&mut writer, format)?;
            writer.flush()?;
            Ok(())
        });

    if let Err(e) = written {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }
    fs::rename(&staging, path)?;
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".partial");
    path.with_file_name(name)
}
