//! Captured frames.
//!
//! - `Frame`: one decoded RGB image from a camera source, plus capture metadata.
//! - `encode_jpeg`: compression applied to every image sent to the detector.
//!
//! Frames are cheap to hand around by reference; the session only clones one
//! when it freezes a still image on pause.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::time::Instant;

use crate::FrameSize;

/// JPEG quality used for detector uploads (0.7 on a 0..1 scale).
pub const DEFAULT_JPEG_QUALITY: u8 = 70;

/// One decoded camera frame.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    /// Monotonic sequence number assigned by the source.
    pub sequence: u64,
    /// Monotonic capture instant.
    pub captured_at: Instant,
}

impl Frame {
    /// Create a new frame. Called by the ingestion layer.
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image,
            sequence,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> FrameSize {
        FrameSize {
            width: self.width(),
            height: self.height(),
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Age of this frame since capture.
    pub fn age_ms(&self) -> u128 {
        self.captured_at.elapsed().as_millis()
    }
}

/// Encode an RGB image as JPEG at the given quality (1..=100).
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity((image.width() * image.height()) as usize / 4);
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
        .encode_image(image)
        .context("encode jpeg")?;
    Ok(bytes)
}
