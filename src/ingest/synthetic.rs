//! Synthetic camera (`stub://`).
//!
//! Renders a flat yard with a worker-sized block walking left to right, so the
//! zone crop and overlays have something that moves. `stub://denied` refuses
//! to connect.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use super::{CameraConfig, SourceStats, DENIED_STUB_URL};
use crate::frame::Frame;

const GROUND: Rgb<u8> = Rgb([96, 96, 88]);
const WORKER: Rgb<u8> = Rgb([230, 120, 20]);
const WORKER_WIDTH: u32 = 24;
const WORKER_HEIGHT: u32 = 64;
/// Pixels the worker advances per frame.
const WORKER_STEP: u32 = 4;

pub struct SyntheticSource {
    config: CameraConfig,
    connected: bool,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            connected: false,
            frame_count: 0,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        if self.config.url.trim() == DENIED_STUB_URL {
            return Err(anyhow!("camera access denied for {}", self.config.url));
        }
        if self.config.width == 0 || self.config.height == 0 {
            return Err(anyhow!(
                "synthetic camera needs a non-zero size, got {}x{}",
                self.config.width,
                self.config.height
            ));
        }
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.config.url,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("synthetic camera not connected; call connect() first"));
        }
        let image = self.render();
        let frame = Frame::new(image, self.frame_count);
        self.frame_count += 1;
        Ok(frame)
    }

    fn render(&self) -> RgbImage {
        let (width, height) = (self.config.width, self.config.height);
        let span = width + WORKER_WIDTH;
        let left = ((self.frame_count * WORKER_STEP as u64) % span as u64) as i64
            - WORKER_WIDTH as i64;
        let top = height.saturating_sub(WORKER_HEIGHT) / 2;

        RgbImage::from_fn(width, height, |x, y| {
            let xi = x as i64;
            let inside_x = xi >= left && xi < left + WORKER_WIDTH as i64;
            let inside_y = y >= top && y < top + WORKER_HEIGHT;
            if inside_x && inside_y {
                WORKER
            } else {
                GROUND
            }
        })
    }

    pub fn is_healthy(&self) -> bool {
        self.connected
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(url: &str) -> SyntheticSource {
        SyntheticSource::new(CameraConfig {
            url: url.to_string(),
            target_fps: 30,
            width: 160,
            height: 120,
        })
    }

    #[test]
    fn produces_sized_sequenced_frames() -> Result<()> {
        let mut cam = source("stub://yard");
        cam.connect()?;
        let a = cam.next_frame()?;
        let b = cam.next_frame()?;
        assert_eq!((a.width(), a.height()), (160, 120));
        assert_eq!((a.sequence, b.sequence), (0, 1));
        assert_eq!(cam.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn worker_moves_between_frames() -> Result<()> {
        let mut cam = source("stub://yard");
        cam.connect()?;
        let frames: Vec<_> = (0..10).map(|_| cam.next_frame()).collect::<Result<_>>()?;
        assert_ne!(frames[2].image(), frames[9].image());
        assert!(frames[9].image().pixels().any(|p| *p == WORKER));
        Ok(())
    }

    #[test]
    fn frames_require_connect() {
        assert!(source("stub://yard").next_frame().is_err());
    }

    #[test]
    fn denied_url_refuses() {
        let mut cam = source(DENIED_STUB_URL);
        assert!(cam.connect().is_err());
        assert!(!cam.is_healthy());
    }
}
