//! End-to-end session scenarios against the synthetic camera and stub detector.
//!
//! These tests verify that:
//! 1. A zone drawn on a paused frame turns the next upload into an ROI crop
//! 2. Boxes from a crop land back on the full frame
//! 3. Results that arrive after a stop are never applied
//! 4. A refused camera keeps the session from starting

use std::sync::Arc;
use std::time::{Duration, Instant};

use redzone_monitor::zone::RoiOffset;
use redzone_monitor::{
    CameraConfig, CameraSource, CaptureSession, DetectResponse, Detection, FrameSize,
    SessionConfig, SessionError, StubDetector, ZoneState,
};
use redzone_monitor::{Point, DEFAULT_ALERT_HOLD};

const WAIT: Duration = Duration::from_secs(5);

fn camera(url: &str) -> CameraSource {
    CameraSource::new(CameraConfig {
        url: url.to_string(),
        target_fps: 30,
        width: 200,
        height: 150,
    })
    .expect("camera source")
}

fn at(t0: Instant, millis: u64) -> Instant {
    t0 + Duration::from_millis(millis)
}

fn draw_square(session: &mut CaptureSession) -> ZoneState {
    let mut state = ZoneState::Empty;
    for (x, y) in [(10.0, 10.0), (100.0, 10.0), (100.0, 100.0), (10.0, 100.0)] {
        state = session.click(Point::new(x, y));
    }
    state
}

#[test]
fn drawn_zone_switches_uploads_to_roi_crop() {
    let stub = Arc::new(StubDetector::new());
    let mut session = CaptureSession::new(camera("stub://yard"), stub.clone(), SessionConfig::default());
    session.acquire_camera().expect("acquire");
    let t0 = Instant::now();
    session.start(t0).expect("start");

    let first = session.tick(t0);
    assert_eq!(first.dispatched, Some(0));
    assert_eq!(session.wait_for_detections(t0, WAIT), 1);

    session.pause(at(t0, 100));
    assert!(session.is_paused());
    assert!(draw_square(&mut session).is_committed());
    session.resume(at(t0, 200));

    let next = session.tick(at(t0, 1_200));
    assert_eq!(next.dispatched, Some(1));
    assert_eq!(session.wait_for_detections(at(t0, 1_200), WAIT), 1);

    let requests = stub.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].roi.is_none());
    let roi = requests[1].roi.as_ref().expect("roi descriptor");
    assert_eq!(roi.offset, RoiOffset { x: 10, y: 10 });
    assert_eq!((roi.width, roi.height), (90, 90));
    assert_eq!(
        roi.original_size,
        FrameSize {
            width: 200,
            height: 150
        }
    );
    assert_eq!(requests[1].dimensions, Some((90, 90)));
}

#[test]
fn crop_boxes_are_mapped_back_and_alert_holds() {
    let stub = Arc::new(StubDetector::new());
    stub.push(Ok(DetectResponse {
        detections: vec![Detection::new("Person", 0.91, [5.0, 6.0, 40.0, 60.0])],
        violation_count: Some(0),
    }));
    stub.push(Ok(DetectResponse::default()));

    let mut session = CaptureSession::new(camera("stub://yard"), stub, SessionConfig::default());
    session.acquire_camera().expect("acquire");
    let t0 = Instant::now();
    session.start(t0).expect("start");
    session.pause(t0);
    draw_square(&mut session);
    session.resume(at(t0, 10));

    session.tick(at(t0, 20));
    session.wait_for_detections(at(t0, 20), WAIT);
    assert_eq!(session.detections()[0].bbox, [15.0, 16.0, 50.0, 70.0]);
    assert_eq!(session.summary().persons, 1);
    assert!(session.person_alert().visible);
    assert!(!session.violation_alert().visible);

    // empty result starts the hold; the alert stays up until it elapses
    session.tick(at(t0, 1_100));
    session.wait_for_detections(at(t0, 1_100), WAIT);
    assert!(session.detections().is_empty());
    assert!(session.person_alert().visible);

    let after_hold = at(t0, 1_100) + DEFAULT_ALERT_HOLD + Duration::from_millis(1);
    session.tick(after_hold);
    assert!(!session.person_alert().visible);
}

#[test]
fn late_result_after_stop_is_dropped() {
    let (stub, release) = StubDetector::gated();
    let stub = Arc::new(stub.with_fallback(DetectResponse {
        detections: vec![Detection::new("NO-Hardhat", 0.7, [0.0, 0.0, 10.0, 10.0])],
        violation_count: None,
    }));
    let mut session = CaptureSession::new(camera("stub://yard"), stub, SessionConfig::default());
    session.acquire_camera().expect("acquire");
    let t0 = Instant::now();
    session.start(t0).expect("start");
    assert!(session.tick(t0).dispatched.is_some());

    session.stop();
    release.send(()).expect("release gate");
    std::thread::sleep(Duration::from_millis(200));

    let report = session.tick(at(t0, 2_000));
    assert_eq!(report.applied, 0);
    assert!(!report.rendered);
    assert!(session.detections().is_empty());
    assert!(!session.violation_alert().visible);
    assert!(!session.is_running());
}

#[test]
fn denied_camera_never_starts() {
    let stub = Arc::new(StubDetector::new());
    let mut session = CaptureSession::new(camera("stub://denied"), stub.clone(), SessionConfig::default());

    let err = session.acquire_camera().expect_err("access refused");
    assert!(matches!(err, SessionError::PermissionDenied(_)));
    assert_eq!(session.start(Instant::now()), Err(SessionError::CameraNotAcquired));

    let report = session.tick(Instant::now());
    assert!(!report.rendered);
    assert!(stub.requests().is_empty());
}
