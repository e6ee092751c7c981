//! Camera sources.
//!
//! A `CameraSource` is chosen from the configured URL:
//! - `stub://...`: synthetic scene with a worker walking across it
//!   (`stub://denied` refuses access, like a user declining a camera prompt)
//! - `http(s)://...`: MJPEG stream or single-JPEG snapshot endpoint
//! - `/dev/video*`: V4L2 device (feature: ingest-v4l2)
//! - any other local path: a still image re-served as every frame
//!
//! Sources decode into RGB `Frame`s and never write frames anywhere. Pixel
//! content is not logged.

mod http;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod still;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::frame::Frame;

pub use http::HttpSource;
pub use still::StillImageSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// URL of the synthetic source that refuses access.
pub const DENIED_STUB_URL: &str = "stub://denied";

/// Camera selection and capture geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Source URL or local path.
    pub url: String,
    /// Upper bound on delivered frames per second. 0 disables decimation.
    pub target_fps: u32,
    /// Preferred frame width (synthetic and V4L2 sources).
    pub width: u32,
    /// Preferred frame height (synthetic and V4L2 sources).
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

/// Counters reported by every source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    Http(HttpSource),
    Still(StillImageSource),
    #[cfg(feature = "ingest-v4l2")]
    V4l2(V4l2Source),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        let url = config.url.trim();
        if url.is_empty() {
            return Err(anyhow!("camera url is empty"));
        }

        let backend = if url.starts_with("stub://") {
            CameraBackend::Synthetic(SyntheticSource::new(config))
        } else if url.starts_with("http://") || url.starts_with("https://") {
            CameraBackend::Http(HttpSource::new(config)?)
        } else if url.starts_with("/dev/video") {
            Self::device_backend(config)?
        } else if url.contains("://") {
            return Err(anyhow!(
                "unsupported camera url '{}'; expected stub://, http(s)://, /dev/video*, or a local image path",
                url
            ));
        } else {
            CameraBackend::Still(StillImageSource::new(config))
        };
        Ok(Self { backend })
    }

    #[cfg(feature = "ingest-v4l2")]
    fn device_backend(config: CameraConfig) -> Result<CameraBackend> {
        Ok(CameraBackend::V4l2(V4l2Source::new(config)))
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    fn device_backend(config: CameraConfig) -> Result<CameraBackend> {
        Err(anyhow!(
            "camera {} requires the ingest-v4l2 feature",
            config.url
        ))
    }

    /// Acquire the camera. A failure here means access was refused.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            CameraBackend::Http(source) => source.connect(),
            CameraBackend::Still(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.connect(),
        }
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            CameraBackend::Http(source) => source.next_frame(),
            CameraBackend::Still(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.next_frame(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.is_healthy(),
            CameraBackend::Http(source) => source.is_healthy(),
            CameraBackend::Still(source) => source.is_healthy(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.is_healthy(),
        }
    }

    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            CameraBackend::Http(source) => source.stats(),
            CameraBackend::Still(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::V4l2(source) => source.stats(),
        }
    }
}

pub(crate) fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

/// How long a live source may go without a frame before it counts as unhealthy.
pub(crate) fn health_grace(target_fps: u32) -> Duration {
    let base_ms = if target_fps == 0 {
        2_000
    } else {
        (1000 / target_fps).saturating_mul(6)
    };
    Duration::from_millis(base_ms.max(2_000) as u64)
}
