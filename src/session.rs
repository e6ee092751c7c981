//! Capture session: the single owner of per-camera state.
//!
//! `CaptureSession` wires the camera, zone editor, scheduler, overlay and both
//! alert debouncers together and is driven by one loop calling `tick`. Nothing
//! here is shared with worker threads; detection results come back through
//! the scheduler's channel and are applied on the next tick.
//!
//! Lifecycle:
//! 1. `acquire_camera` (once; denial is fatal)
//! 2. `start`
//! 3. `tick` repeatedly; `pause`/`resume`/`click`/`reset_zone` in between
//! 4. `stop`

use ab_glyph::FontVec;
use anyhow::Result;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::alert::{AlertDebouncer, AlertState, AlertTrigger, DEFAULT_ALERT_HOLD};
use crate::detect::{Detection, DetectionSummary, DetectorClient, PERSON};
use crate::frame::{encode_jpeg, Frame};
use crate::ingest::{CameraSource, SourceStats};
use crate::overlay::{DetectionOverlay, ImageCanvas};
use crate::scheduler::{Completion, DispatchJob, FrameScheduler, SchedulerConfig};
use crate::zone::{Polygon, PolygonEditor, RoiExtractor, ZoneState};
use crate::Point;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub scheduler: SchedulerConfig,
    pub alert_hold: Duration,
    /// Detection class that drives the person-in-zone alert.
    pub person_label: String,
    /// Zone committed at startup.
    pub zone: Option<Polygon>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            alert_hold: DEFAULT_ALERT_HOLD,
            person_label: PERSON.to_string(),
            zone: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The camera refused access. Not retried.
    PermissionDenied(String),
    /// `start` was called before the camera was acquired.
    CameraNotAcquired,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::PermissionDenied(reason) => {
                write!(f, "camera permission denied: {}", reason)
            }
            SessionError::CameraNotAcquired => {
                write!(f, "camera not acquired; call acquire_camera() first")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// What one `tick` did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub rendered: bool,
    /// Sequence number of the request dispatched this tick.
    pub dispatched: Option<u64>,
    /// Completions applied this tick.
    pub applied: usize,
    pub frame_error: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ZoneSnapshot {
    pub committed: Option<Polygon>,
    pub in_progress: Vec<Point>,
}

/// Read-only view of the session for status output.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub has_permission: bool,
    pub running: bool,
    pub paused: bool,
    pub zone: ZoneSnapshot,
    pub detections: Vec<Detection>,
    pub summary: DetectionSummary,
    pub error: Option<String>,
    pub person_alert: AlertState,
    pub violation_alert: AlertState,
    pub in_flight: usize,
    pub frames_failed: u64,
    pub camera: SourceStats,
    pub camera_healthy: bool,
}

pub struct CaptureSession {
    camera: CameraSource,
    has_permission: bool,
    running: bool,
    paused: bool,
    still: Option<Frame>,
    last_frame: Option<Frame>,
    editor: PolygonEditor,
    scheduler: FrameScheduler,
    overlay: DetectionOverlay,
    canvas: ImageCanvas,
    detections: Vec<Detection>,
    summary: DetectionSummary,
    error: Option<String>,
    person_alert: AlertDebouncer,
    violation_alert: AlertDebouncer,
    frames_failed: u64,
}

impl CaptureSession {
    pub fn new(
        camera: CameraSource,
        client: Arc<dyn DetectorClient>,
        config: SessionConfig,
    ) -> Self {
        let editor = match config.zone {
            Some(zone) => PolygonEditor::with_zone(zone),
            None => PolygonEditor::new(),
        };
        Self {
            camera,
            has_permission: false,
            running: false,
            paused: false,
            still: None,
            last_frame: None,
            editor,
            scheduler: FrameScheduler::new(client, config.scheduler),
            overlay: DetectionOverlay::new(),
            canvas: ImageCanvas::new(1, 1),
            detections: Vec::new(),
            summary: DetectionSummary::default(),
            error: None,
            person_alert: AlertDebouncer::new(
                AlertTrigger::Class(config.person_label),
                config.alert_hold,
            ),
            violation_alert: AlertDebouncer::violations(config.alert_hold),
            frames_failed: 0,
        }
    }

    /// Label text is rasterized only when a font is supplied.
    pub fn set_font(&mut self, font: FontVec) {
        let canvas = std::mem::replace(&mut self.canvas, ImageCanvas::new(1, 1));
        self.canvas = canvas.with_font(font);
    }

    /// Acquire exclusive access to the camera. Idempotent once granted.
    pub fn acquire_camera(&mut self) -> Result<(), SessionError> {
        if self.has_permission {
            return Ok(());
        }
        match self.camera.connect() {
            Ok(()) => {
                self.has_permission = true;
                info!("camera acquired");
                Ok(())
            }
            Err(e) => {
                error!("camera access refused: {:#}", e);
                Err(SessionError::PermissionDenied(format!("{:#}", e)))
            }
        }
    }

    pub fn start(&mut self, now: Instant) -> Result<(), SessionError> {
        if !self.has_permission {
            return Err(SessionError::CameraNotAcquired);
        }
        if self.running {
            return Ok(());
        }
        self.running = true;
        self.paused = false;
        self.still = None;
        self.scheduler.start(now);
        info!(
            "session started (detector: {}, zone: {})",
            self.scheduler.client_name(),
            if self.editor.is_defined() {
                "committed"
            } else {
                "none"
            }
        );
        Ok(())
    }

    /// Advance the session. Never fails: frame errors are counted and logged,
    /// detector errors become the inline message.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        self.poll_alerts(now);

        for completion in self.scheduler.collect(None) {
            self.apply(now, completion);
            report.applied += 1;
        }

        if !self.running || self.paused || !self.scheduler.render_due(now) {
            return report;
        }

        let frame = match self.camera.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.frames_failed += 1;
                report.frame_error = true;
                warn!("frame read failed: {:#}", e);
                return report;
            }
        };

        self.render(&frame);
        self.scheduler.mark_rendered(now);
        report.rendered = true;

        if self.scheduler.dispatch_due(now) {
            let job = self.dispatch_job(&frame);
            report.dispatched = Some(self.scheduler.dispatch(now, job));
        }
        self.last_frame = Some(frame);
        report
    }

    /// Block up to `timeout` for in-flight detections and apply them.
    pub fn wait_for_detections(&mut self, now: Instant, timeout: Duration) -> usize {
        let completions = self.scheduler.collect(Some(timeout));
        let applied = completions.len();
        for completion in completions {
            self.apply(now, completion);
        }
        applied
    }

    /// Time until the next render is due.
    pub fn until_next_tick(&self, now: Instant) -> Duration {
        self.scheduler.until_next_render(now)
    }

    /// Freeze the current view for zone editing.
    pub fn pause(&mut self, _now: Instant) {
        if !self.running || self.paused {
            return;
        }
        let still = match self.camera.next_frame() {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!("could not capture still frame, using last frame: {:#}", e);
                self.last_frame.clone()
            }
        };
        self.still = still;
        self.paused = true;
        self.scheduler.stop();
        self.render_still();
        info!("session paused");
    }

    pub fn resume(&mut self, now: Instant) {
        if !self.running || !self.paused {
            return;
        }
        self.still = None;
        self.editor.discard_in_progress();
        if !self.editor.is_defined() {
            self.cancel_alerts();
        }
        self.paused = false;
        self.scheduler.start(now);
        info!("session resumed");
    }

    pub fn toggle_pause(&mut self, now: Instant) {
        if self.paused {
            self.resume(now);
        } else {
            self.pause(now);
        }
    }

    /// Forward a canvas click to the zone editor.
    pub fn click(&mut self, point: Point) -> ZoneState {
        let state = self.editor.register_click(self.paused, point);
        if !state.is_committed() {
            self.cancel_alerts();
        }
        if self.paused {
            self.render_still();
        }
        state
    }

    pub fn reset_zone(&mut self) {
        self.editor.reset();
        self.cancel_alerts();
        if self.paused {
            self.render_still();
        }
        info!("red zone cleared");
    }

    /// Tear down: stop scheduling, drop late results, hide alerts.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.paused = false;
        self.still = None;
        self.scheduler.stop();
        self.cancel_alerts();
        info!("session stopped");
    }

    pub fn has_permission(&self) -> bool {
        self.has_permission
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn editor(&self) -> &PolygonEditor {
        &self.editor
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn summary(&self) -> DetectionSummary {
        self.summary
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn person_alert(&self) -> AlertState {
        self.person_alert.state()
    }

    pub fn violation_alert(&self) -> AlertState {
        self.violation_alert.state()
    }

    pub fn canvas(&self) -> &ImageCanvas {
        &self.canvas
    }

    /// JPEG of the last composed view, if anything has been drawn.
    pub fn annotated_jpeg(&self, quality: u8) -> Result<Option<Vec<u8>>> {
        if self.last_frame.is_none() && self.still.is_none() {
            return Ok(None);
        }
        encode_jpeg(&self.canvas.to_rgb(), quality).map(Some)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            has_permission: self.has_permission,
            running: self.running,
            paused: self.paused,
            zone: ZoneSnapshot {
                committed: self.editor.committed().copied(),
                in_progress: self.editor.in_progress().to_vec(),
            },
            detections: self.detections.clone(),
            summary: self.summary,
            error: self.error.clone(),
            person_alert: self.person_alert.state(),
            violation_alert: self.violation_alert.state(),
            in_flight: self.scheduler.in_flight(),
            frames_failed: self.frames_failed,
            camera: self.camera.stats(),
            camera_healthy: self.camera.is_healthy(),
        }
    }

    fn dispatch_job(&self, frame: &Frame) -> DispatchJob {
        let Some(zone) = self.editor.committed() else {
            return DispatchJob::full_frame(frame.image().clone());
        };
        match RoiExtractor::extract(frame.image(), zone) {
            Some(region) => {
                let roi = region.descriptor(frame.size(), zone);
                DispatchJob::cropped(region.image, roi)
            }
            None => {
                debug!("red zone crop is empty; sending full frame");
                DispatchJob::full_frame(frame.image().clone())
            }
        }
    }

    fn apply(&mut self, now: Instant, completion: Completion) {
        match completion.result {
            Ok(response) => {
                let zone_committed = self.editor.is_defined();
                self.person_alert
                    .on_detection_result(now, zone_committed, &response);
                self.violation_alert
                    .on_detection_result(now, zone_committed, &response);

                self.detections = match completion.offset {
                    Some(offset) => response
                        .detections
                        .into_iter()
                        .map(|d| d.translated(offset))
                        .collect(),
                    None => response.detections,
                };
                self.summary = DetectionSummary::from_detections(&self.detections);
                self.error = None;
                debug!(
                    "detection #{} applied: {} box(es)",
                    completion.sequence,
                    self.detections.len()
                );
            }
            Err(e) => {
                warn!("detection #{} failed: {:?}", completion.sequence, e);
                self.error = Some(e.to_string());
            }
        }
    }

    fn poll_alerts(&mut self, now: Instant) {
        self.person_alert.poll(now);
        self.violation_alert.poll(now);
    }

    fn cancel_alerts(&mut self) {
        self.person_alert.cancel();
        self.violation_alert.cancel();
    }

    fn render(&mut self, frame: &Frame) {
        self.canvas.resize(frame.size());
        self.overlay.draw(
            &mut self.canvas,
            frame.image(),
            self.editor.committed(),
            self.editor.in_progress(),
            &self.detections,
        );
    }

    fn render_still(&mut self) {
        if let Some(still) = self.still.take() {
            self.render(&still);
            self.still = Some(still);
        }
    }

    #[cfg(test)]
    fn still_image(&self) -> Option<&image::RgbImage> {
        self.still.as_ref().map(|f| f.image())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectResponse, DetectorError, StubDetector, NO_HARDHAT};
    use crate::ingest::CameraConfig;

    fn camera(url: &str) -> CameraSource {
        CameraSource::new(CameraConfig {
            url: url.to_string(),
            target_fps: 30,
            width: 200,
            height: 150,
        })
        .unwrap()
    }

    fn session(stub: Arc<StubDetector>) -> CaptureSession {
        let mut session = CaptureSession::new(camera("stub://yard"), stub, SessionConfig::default());
        session.acquire_camera().unwrap();
        session
    }

    fn ms(t0: Instant, millis: u64) -> Instant {
        t0 + Duration::from_millis(millis)
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn denied_camera_is_fatal() {
        let stub = Arc::new(StubDetector::new());
        let mut session =
            CaptureSession::new(camera("stub://denied"), stub, SessionConfig::default());
        assert!(matches!(
            session.acquire_camera(),
            Err(SessionError::PermissionDenied(_))
        ));
        assert_eq!(
            session.start(Instant::now()),
            Err(SessionError::CameraNotAcquired)
        );
        assert!(!session.has_permission());
    }

    #[test]
    fn first_tick_renders_and_dispatches_full_frame() {
        let stub = Arc::new(StubDetector::new());
        let mut session = session(stub.clone());
        let t0 = Instant::now();
        session.start(t0).unwrap();

        let report = session.tick(t0);
        assert!(report.rendered);
        assert_eq!(report.dispatched, Some(0));
        assert_eq!(session.wait_for_detections(t0, WAIT), 1);
        assert_eq!(stub.requests()[0].roi, None);
        assert_eq!(stub.requests()[0].dimensions, Some((200, 150)));
        assert_eq!(session.canvas().image().dimensions(), (200, 150));
    }

    #[test]
    fn detector_error_keeps_detections_and_clears_on_success() {
        let stub = Arc::new(StubDetector::new());
        stub.push(Ok(DetectResponse {
            detections: vec![Detection::new(PERSON, 0.9, [1.0, 1.0, 5.0, 5.0])],
            violation_count: None,
        }));
        stub.push(Err(DetectorError::Server { status: 500 }));
        stub.push(Ok(DetectResponse::default()));

        let mut session = session(stub);
        let t0 = Instant::now();
        session.start(t0).unwrap();

        session.tick(t0);
        session.wait_for_detections(t0, WAIT);
        assert_eq!(session.detections().len(), 1);

        session.tick(ms(t0, 1000));
        session.wait_for_detections(ms(t0, 1000), WAIT);
        assert_eq!(session.error(), Some("Detection server error."));
        assert_eq!(session.detections().len(), 1);
        assert!(session.is_running());

        session.tick(ms(t0, 2000));
        session.wait_for_detections(ms(t0, 2000), WAIT);
        assert_eq!(session.error(), None);
        assert!(session.detections().is_empty());
    }

    #[test]
    fn clicks_only_count_while_paused() {
        let stub = Arc::new(StubDetector::new());
        let mut session = session(stub);
        let t0 = Instant::now();
        session.start(t0).unwrap();
        session.tick(t0);

        assert_eq!(session.click(Point::new(5.0, 5.0)), ZoneState::Empty);
        session.pause(ms(t0, 10));
        assert!(session.still_image().is_some());
        assert_eq!(
            session.click(Point::new(5.0, 5.0)),
            ZoneState::Drawing(vec![Point::new(5.0, 5.0)])
        );
    }

    #[test]
    fn resume_discards_unfinished_zone_but_keeps_committed() {
        let stub = Arc::new(StubDetector::new());
        let mut session = session(stub);
        let t0 = Instant::now();
        session.start(t0).unwrap();
        session.pause(t0);
        for (x, y) in [(10.0, 10.0), (100.0, 10.0), (100.0, 100.0), (10.0, 100.0)] {
            session.click(Point::new(x, y));
        }
        session.resume(ms(t0, 10));
        assert!(session.editor().is_defined());

        session.pause(ms(t0, 20));
        session.click(Point::new(1.0, 1.0));
        session.resume(ms(t0, 30));
        assert_eq!(session.editor().state(), ZoneState::Empty);
        assert!(session.still_image().is_none());
    }

    #[test]
    fn alerts_follow_zone_and_reset() {
        let zone = Polygon::new([
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(0.0, 100.0),
        ]);
        let stub = Arc::new(StubDetector::new().with_fallback(DetectResponse {
            detections: vec![
                Detection::new(PERSON, 0.9, [1.0, 1.0, 5.0, 5.0]),
                Detection::new(NO_HARDHAT, 0.8, [1.0, 1.0, 5.0, 5.0]),
            ],
            violation_count: None,
        }));
        let mut session = CaptureSession::new(
            camera("stub://yard"),
            stub,
            SessionConfig {
                zone: Some(zone),
                ..SessionConfig::default()
            },
        );
        session.acquire_camera().unwrap();
        let t0 = Instant::now();
        session.start(t0).unwrap();
        session.tick(t0);
        session.wait_for_detections(t0, WAIT);

        assert_eq!(
            session.person_alert(),
            AlertState {
                count: 1,
                visible: true
            }
        );
        assert!(session.violation_alert().visible);
        // boxes are shifted back by the crop offset (0, 0 here)
        assert_eq!(session.detections()[0].bbox, [1.0, 1.0, 5.0, 5.0]);

        session.reset_zone();
        assert!(!session.person_alert().visible);
        assert!(!session.violation_alert().visible);
    }

    #[test]
    fn stop_discards_late_completion() {
        let (stub, release) = StubDetector::gated();
        let stub = Arc::new(stub.with_fallback(DetectResponse {
            detections: vec![Detection::new(PERSON, 0.9, [0.0, 0.0, 1.0, 1.0])],
            violation_count: None,
        }));
        let mut session = session(stub);
        let t0 = Instant::now();
        session.start(t0).unwrap();
        session.tick(t0);
        session.stop();

        release.send(()).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        let report = session.tick(ms(t0, 500));
        assert_eq!(report.applied, 0);
        assert!(session.detections().is_empty());
        assert!(!session.person_alert().visible);
    }

    #[test]
    fn snapshot_serializes() {
        let stub = Arc::new(StubDetector::new());
        let mut session = session(stub);
        let t0 = Instant::now();
        session.start(t0).unwrap();
        session.tick(t0);

        let json = serde_json::to_value(session.snapshot()).unwrap();
        assert_eq!(json["running"], true);
        assert_eq!(json["zone"]["committed"], serde_json::Value::Null);
        assert_eq!(json["camera"]["source"], "stub://yard");
        assert!(session.annotated_jpeg(70).unwrap().is_some());
    }
}
