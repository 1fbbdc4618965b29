//! Image preprocessing for the classifier.
//!
//! Uploaded scans go through a fixed pipeline before inference:
//!
//! ```text
//! bytes ──► decode ──► resize 299×299 ──► RGB ──► /255 ──► [1, 299, 299, 3]
//! ```
//!
//! Decoding and resizing are CPU-bound, so the async entry point
//! [`ImagePreprocessor::preprocess_blocking`] moves the work onto tokio's
//! blocking pool.

use bytes::Bytes;
use image::imageops::FilterType;
use image::ImageFormat;

use crate::error::PreprocessError;

/// Spatial resolution expected by the model.
pub const MODEL_INPUT_SIZE: u32 = 299;

/// Channels per pixel in the model input.
pub const MODEL_INPUT_CHANNELS: usize = 3;

// =============================================================================
// Tensor
// =============================================================================

/// A dense `f32` tensor in NHWC layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    shape: [usize; 4],
    data: Vec<f32>,
}

impl ImageTensor {
    /// Build a tensor from raw data. Returns `None` if the length does not
    /// match the shape.
    pub fn new(shape: [usize; 4], data: Vec<f32>) -> Option<Self> {
        if shape.iter().product::<usize>() != data.len() {
            return None;
        }
        Some(Self { shape, data })
    }

    /// `[batch, height, width, channels]`
    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Nested view of every batch item as `rows → pixels → channels`.
    ///
    /// This is the row-major layout model servers accept as JSON instances.
    pub fn instances(&self) -> Vec<Vec<Vec<&[f32]>>> {
        let [_, height, width, channels] = self.shape;
        let item_len = height * width * channels;
        let row_len = width * channels;

        if item_len == 0 {
            return Vec::new();
        }

        self.data
            .chunks(item_len)
            .map(|item| {
                item.chunks(row_len)
                    .map(|row| row.chunks(channels).collect())
                    .collect()
            })
            .collect()
    }
}

// =============================================================================
// Preprocessor
// =============================================================================

/// Turns uploaded image bytes into a model-ready tensor.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    size: u32,
    filter: FilterType,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImagePreprocessor {
    /// Preprocessor targeting the model's 299×299 input.
    pub fn new() -> Self {
        Self {
            size: MODEL_INPUT_SIZE,
            filter: FilterType::CatmullRom,
        }
    }

    /// Preprocessor with a custom square output size.
    pub fn with_size(size: u32) -> Self {
        Self {
            size,
            ..Self::new()
        }
    }

    /// Output side length in pixels.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Decode, resize, and normalize an image.
    ///
    /// # Errors
    ///
    /// Returns `PreprocessError::Empty` for an empty upload and
    /// `PreprocessError::Decode` if the bytes are not a supported image.
    pub fn preprocess(&self, source: &[u8]) -> Result<ImageTensor, PreprocessError> {
        if source.is_empty() {
            return Err(PreprocessError::Empty);
        }

        let img = image::load_from_memory(source)
            .map_err(|e| PreprocessError::Decode(e.to_string()))?;

        let rgb = img
            .resize_exact(self.size, self.size, self.filter)
            .to_rgb8();

        let data: Vec<f32> = rgb
            .into_raw()
            .into_iter()
            .map(|v| f32::from(v) / 255.0)
            .collect();

        let side = self.size as usize;
        ImageTensor::new([1, side, side, MODEL_INPUT_CHANNELS], data)
            .ok_or_else(|| PreprocessError::Decode("unexpected pixel buffer length".to_string()))
    }

    /// Run [`preprocess`](Self::preprocess) on the blocking thread pool.
    pub async fn preprocess_blocking(&self, source: Bytes) -> Result<ImageTensor, PreprocessError> {
        let preprocessor = self.clone();
        tokio::task::spawn_blocking(move || preprocessor.preprocess(&source))
            .await
            .map_err(|e| PreprocessError::Task(e.to_string()))?
    }
}

/// MIME type and file extension for an encoded image, if recognized.
pub fn detect_image_format(source: &[u8]) -> Option<(&'static str, &'static str)> {
    let format = image::guess_format(source).ok()?;
    let extension = match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        other => other.extensions_str().first().copied()?,
    };
    Some((format.to_mime_type(), extension))
}

// =============================================================================
// Tests
// =============================================================================
