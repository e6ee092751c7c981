//! Still-image camera: one local image file served as every frame.
//!
//! Useful for drawing a zone against a known site photo and for replaying a
//! captured frame through the detector at the normal cadence.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::Path;

use super::{CameraConfig, SourceStats};
use crate::frame::Frame;

pub struct StillImageSource {
    config: CameraConfig,
    image: Option<RgbImage>,
    frame_count: u64,
}

impl StillImageSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            image: None,
            frame_count: 0,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        let path = Path::new(&self.config.url);
        let image = image::open(path)
            .with_context(|| format!("open camera image {}", path.display()))?
            .into_rgb8();
        if image.width() == 0 || image.height() == 0 {
            return Err(anyhow!("camera image {} has no pixels", path.display()));
        }
        log::info!(
            "StillImageSource: loaded {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        self.image = Some(image);
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| anyhow!("image source not connected; call connect() first"))?;
        let frame = Frame::new(image.clone(), self.frame_count);
        self.frame_count += 1;
        Ok(frame)
    }

    pub fn is_healthy(&self) -> bool {
        self.image.is_some()
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}
