//! Red-zone monitor
//!
//! Camera-side pipeline for construction-site safety monitoring.
//!
//! # Architecture
//!
//! A single `CaptureSession` owns all per-camera state and is driven by one loop:
//!
//! 1. **Zone editing**: a 4-vertex red zone is clicked onto a paused frame.
//! 2. **ROI crop**: the zone's axis-aligned bounding box is cut from the frame.
//! 3. **Scheduling**: rendering runs at the display cadence; detection uploads
//!    run at a slower, independent cadence on worker threads.
//! 4. **Overlay**: frame, zone, and the latest detections are drawn every tick.
//! 5. **Alerts**: person-in-zone and PPE-violation alerts are debounced with a
//!    fixed hold window.
//!
//! The detection model is an external HTTP service; this crate only speaks its
//! `/detect` and `/violations` contract.
//!
//! # Module Structure
//!
//! - `frame`: captured frames and JPEG encoding
//! - `ingest`: camera sources (synthetic, HTTP MJPEG/JPEG, image file, V4L2)
//! - `zone`: polygon editor and ROI extraction
//! - `detect`: detection types and detector clients
//! - `scheduler`: render/dispatch gates and completion handoff
//! - `overlay`: canvas drawing
//! - `alert`: alert debouncing
//! - `session`: composition root
//! - `history`, `control`, `api`, `config`, `ui`: runtime plumbing for the binaries

use serde::{Deserialize, Serialize};

pub mod alert;
pub mod api;
pub mod config;
pub mod control;
pub mod detect;
pub mod frame;
pub mod history;
pub mod ingest;
pub mod overlay;
pub mod scheduler;
pub mod session;
pub mod ui;
pub mod zone;

pub use alert::{AlertDebouncer, AlertState, AlertTrigger, DEFAULT_ALERT_HOLD};
pub use detect::{
    DetectRequest, DetectResponse, Detection, DetectionSummary, DetectorClient, DetectorError,
    HttpDetectorClient, StubDetector, ViolationRecord,
};
pub use frame::{encode_jpeg, Frame, DEFAULT_JPEG_QUALITY};
pub use ingest::{CameraConfig, CameraSource};
pub use overlay::{Canvas, DetectionOverlay, ImageCanvas};
pub use scheduler::{Completion, FrameScheduler, OverlapPolicy, SchedulerConfig};
pub use session::{CaptureSession, SessionConfig, SessionError, SessionSnapshot, TickReport};
pub use zone::{CroppedRegion, Polygon, PolygonEditor, RoiDescriptor, RoiExtractor, ZoneState};

// -------------------- Geometry --------------------

/// Pixel coordinate in canvas space.
///
/// Serialized as a two-element array `[x, y]`, which is how zone vertices
/// travel inside the ROI descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn translate(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl From<[f32; 2]> for Point {
    fn from(value: [f32; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<Point> for [f32; 2] {
    fn from(value: Point) -> Self {
        [value.x, value.y]
    }
}

/// Width/height pair, serialized as `{"width": .., "height": ..}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}
