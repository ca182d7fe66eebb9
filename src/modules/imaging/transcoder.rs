//! Image transcoding
//!
//! Decodes an uploaded image, shrinks it so neither edge exceeds the
//! configured bound, and re-encodes it as JPEG.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use thiserror::Error;

use crate::core::config::UploadPolicy;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("unrecognised image format")]
    UnknownFormat,

    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a successful transcode
#[derive(Debug, Clone)]
pub struct TranscodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Turns raw upload bytes into the stored representation
pub trait Transcoder: Send + Sync {
    fn transcode(&self, data: &[u8]) -> Result<TranscodedImage, TranscodeError>;

    /// File extension of the output, without the dot
    fn extension(&self) -> &'static str;
}

/// Bounded-size JPEG transcoder backed by the `image` crate
#[derive(Debug, Clone)]
pub struct JpegTranscoder {
    max_dimension: u32,
    quality: u8,
}

impl JpegTranscoder {
    pub fn new(max_dimension: u32, quality: u8) -> Self {
        Self {
            max_dimension,
            quality: quality.clamp(1, 100),
        }
    }

    pub fn from_policy(policy: &UploadPolicy) -> Self {
        Self::new(policy.max_dimension, policy.jpeg_quality)
    }

    fn bound(&self, img: DynamicImage) -> DynamicImage {
        if img.width() <= self.max_dimension && img.height() <= self.max_dimension {
            return img;
        }
        // resize keeps the aspect ratio and fits inside the box
        img.resize(self.max_dimension, self.max_dimension, FilterType::Lanczos3)
    }
}

impl Transcoder for JpegTranscoder {
    fn transcode(&self, data: &[u8]) -> Result<TranscodedImage, TranscodeError> {
        let reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
        if reader.format().is_none() {
            return Err(TranscodeError::UnknownFormat);
        }

        let img = reader.decode().map_err(TranscodeError::Decode)?;
        let img = self.bound(img);

        // JPEG has no alpha channel
        let rgb = img.to_rgb8();
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, self.quality)
            .encode_image(&rgb)
            .map_err(TranscodeError::Encode)?;

        Ok(TranscodedImage {
            bytes,
            width: rgb.width(),
            height: rgb.height(),
        })
    }

    fn extension(&self) -> &'static str {
        "jpg"
    }
}
