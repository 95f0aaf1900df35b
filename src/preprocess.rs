//! Image decoding and normalization into the tensor layout the classifier expects.
//!
//! Every input, whatever its size, format or channel count, comes out as an NHWC
//! `f32` tensor of shape `(1, 224, 224, 3)` with values in `[0, 1]`.

use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbImage, imageops::FilterType};
use ndarray::{Array4, ArrayD, ArrayView4, Axis, Ix2, Ix3};

/// Side length of the square model input.
pub const IMAGE_SIZE: u32 = 224;

/// Number of color channels in the model input.
pub const RGB_CHANNELS: usize = 3;

/// Shape of every [`NormalizedTensor`]: batch, height, width, channels.
pub const TENSOR_SHAPE: [usize; 4] = [1, IMAGE_SIZE as usize, IMAGE_SIZE as usize, RGB_CHANNELS];

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    /// The input cannot be interpreted as a pixel grid at all.
    #[error("image input must be a path, encoded bytes or a 2D/3D pixel array: {0}")]
    InvalidInputKind(String),

    #[error("failed to open image {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("unsupported channel count {0}, expected 1, 3 or 4")]
    UnsupportedChannels(usize),

    #[error("image has no pixels ({width}x{height})")]
    Empty { width: usize, height: usize },

    #[error("image dimensions {width}x{height} are too large")]
    TooLarge { width: usize, height: usize },

    #[error("tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// How the values of an in-memory pixel array are scaled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelScale {
    /// Values are in `[0, 1]` and get multiplied by 255.
    Unit,
    /// Values are already in `[0, 255]`.
    Byte,
    /// `Unit` when the largest value is at most 1, `Byte` otherwise.
    ///
    /// An all-black or near-black `[0, 255]` array is indistinguishable from a unit-scaled one
    /// under this rule; pass an explicit scale when that matters.
    #[default]
    Auto,
}

/// An image in any of the forms the classifier accepts.
#[derive(Clone, Debug)]
pub enum ImageInput {
    /// An encoded image file on disk.
    Path(PathBuf),
    /// An encoded image (JPEG, PNG, ...) held in memory.
    Bytes(Vec<u8>),
    /// A raw pixel grid, either `(height, width)` or `(height, width, channels)`.
    Pixels { data: ArrayD<f32>, scale: PixelScale },
}

impl ImageInput {
    pub fn path(path: impl AsRef<Path>) -> Self {
        Self::Path(path.as_ref().to_path_buf())
    }

    pub fn pixels(data: ArrayD<f32>) -> Self {
        Self::Pixels {
            data,
            scale: PixelScale::Auto,
        }
    }

    pub fn byte_pixels(data: ArrayD<u8>) -> Self {
        Self::Pixels {
            data: data.mapv(f32::from),
            scale: PixelScale::Byte,
        }
    }
}

impl From<Vec<u8>> for ImageInput {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&Path> for ImageInput {
    fn from(path: &Path) -> Self {
        Self::path(path)
    }
}

/// A preprocessed image ready for scoring, shape [`TENSOR_SHAPE`].
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedTensor(Array4<f32>);

impl NormalizedTensor {
    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.0.view()
    }

    /// Contiguous NHWC data, when the tensor is in standard layout.
    pub fn as_slice(&self) -> Option<&[f32]> {
        self.0.as_slice()
    }
}

/// Decodes `input`, converts it to RGB, resizes it to 224x224 with bilinear
/// filtering and scales the pixels to `[0, 1]`.
pub fn normalize(input: ImageInput) -> Result<NormalizedTensor, PreprocessError> {
    let rgb = match input {
        ImageInput::Path(path) => image::open(&path)
            .map_err(|source| PreprocessError::Open { path, source })?
            .to_rgb8(),
        ImageInput::Bytes(bytes) => image::load_from_memory(&bytes)?.to_rgb8(),
        ImageInput::Pixels { data, scale } => rgb_from_pixels(data, scale)?,
    };
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(PreprocessError::Empty {
            width: rgb.width() as usize,
            height: rgb.height() as usize,
        });
    }
    image_to_tensor(&rgb)
}

fn image_to_tensor(rgb: &RgbImage) -> Result<NormalizedTensor, PreprocessError> {
    // Bilinear, aspect ratio is not preserved.
    let resized = image::imageops::resize(rgb, IMAGE_SIZE, IMAGE_SIZE, FilterType::Triangle);
    let data = resized
        .into_raw()
        .into_iter()
        .map(|v| f32::from(v) / 255.0)
        .collect();
    let tensor = Array4::from_shape_vec(
        (TENSOR_SHAPE[0], TENSOR_SHAPE[1], TENSOR_SHAPE[2], TENSOR_SHAPE[3]),
        data,
    )?;
    Ok(NormalizedTensor(tensor))
}

/// Rebuilds an RGB image from a raw pixel grid.
fn rgb_from_pixels(data: ArrayD<f32>, scale: PixelScale) -> Result<RgbImage, PreprocessError> {
    let grid = match data.ndim() {
        2 => data
            .into_dimensionality::<Ix2>()?
            .insert_axis(Axis(2)),
        3 => data.into_dimensionality::<Ix3>()?,
        ndim => {
            return Err(PreprocessError::InvalidInputKind(format!(
                "pixel array has {ndim} dimensions"
            )));
        }
    };

    let (height, width, channels) = grid.dim();
    if !matches!(channels, 1 | 3 | 4) {
        return Err(PreprocessError::UnsupportedChannels(channels));
    }
    if height == 0 || width == 0 {
        return Err(PreprocessError::Empty { width, height });
    }
    let (Ok(w), Ok(h)) = (u32::try_from(width), u32::try_from(height)) else {
        return Err(PreprocessError::TooLarge { width, height });
    };

    let factor = match scale {
        PixelScale::Unit => 255.0,
        PixelScale::Byte => 1.0,
        PixelScale::Auto => {
            let max = grid.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            if max <= 1.0 { 255.0 } else { 1.0 }
        }
    };
    let to_byte = |v: f32| (v * factor).clamp(0.0, 255.0) as u8;

    let mut raw = Vec::with_capacity(height * width * RGB_CHANNELS);
    for pixel in grid.lanes(Axis(2)) {
        match channels {
            // grayscale is replicated, alpha is dropped
            1 => raw.extend([to_byte(pixel[0]); RGB_CHANNELS]),
            _ => raw.extend(pixel.iter().take(RGB_CHANNELS).map(|&v| to_byte(v))),
        }
    }

    RgbImage::from_raw(w, h, raw).ok_or(PreprocessError::Empty { width, height })
}

/// Encodes `image` in `format`; used to build upload payloads.
pub fn encode_image(
    image: &DynamicImage,
    format: image::ImageFormat,
) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buf, format)?;
    Ok(buf.into_inner())
}
