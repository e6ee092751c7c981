use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use redzone_monitor::config::MonitorConfig;
use redzone_monitor::{OverlapPolicy, Point};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "REDZONE_CONFIG",
        "REDZONE_CAMERA_URL",
        "REDZONE_DETECTOR_URL",
        "REDZONE_API_ADDR",
        "REDZONE_FONT_PATH",
        "REDZONE_DETECT_INTERVAL_MS",
        "REDZONE_HOLD_MS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "camera": {
            "url": "http://10.0.0.7:81/stream",
            "target_fps": 15,
            "width": 800,
            "height": 600
        },
        "detector": { "url": "http://detector:5000", "timeout_ms": 2500 },
        "scheduler": { "detect_interval_ms": 1500, "jpeg_quality": 80, "overlap": "overlap" },
        "alerts": { "hold_ms": 3000, "person_label": "worker" },
        "history": { "enabled": false },
        "api": { "addr": "127.0.0.1:9000" },
        "zone": [[10, 10], [100, 10], [100, 100], [10, 100]]
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("REDZONE_CONFIG", file.path());
    std::env::set_var("REDZONE_DETECTOR_URL", "http://127.0.0.1:5050");
    std::env::set_var("REDZONE_HOLD_MS", "7000");

    let cfg = MonitorConfig::load().expect("load config");

    assert_eq!(cfg.camera.url, "http://10.0.0.7:81/stream");
    assert_eq!(cfg.camera.target_fps, 15);
    assert_eq!((cfg.camera.width, cfg.camera.height), (800, 600));
    assert_eq!(cfg.detector.url, "http://127.0.0.1:5050");
    assert_eq!(cfg.detector.timeout, Duration::from_millis(2500));
    assert_eq!(cfg.scheduler.detect_interval, Duration::from_millis(1500));
    assert_eq!(cfg.scheduler.jpeg_quality, 80);
    assert_eq!(cfg.scheduler.overlap, OverlapPolicy::Overlap);
    assert_eq!(cfg.alerts.hold, Duration::from_millis(7000));
    assert_eq!(cfg.alerts.person_label, "worker");
    assert!(!cfg.history.enabled);
    assert_eq!(cfg.api.addr, "127.0.0.1:9000");

    let zone = cfg.zone.expect("zone from file");
    assert_eq!(zone.vertices()[2], Point::new(100.0, 100.0));

    let session = cfg.session_config();
    assert_eq!(session.alert_hold, Duration::from_millis(7000));
    assert_eq!(session.person_label, "worker");
    assert!(session.zone.is_some());

    clear_env();
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = MonitorConfig::load().expect("load defaults");
    assert_eq!(cfg.camera.url, "stub://camera");
    assert_eq!(cfg.detector.url, "http://localhost:5000");
    assert_eq!(cfg.scheduler.render_interval, Duration::from_millis(33));
    assert_eq!(cfg.scheduler.detect_interval, Duration::from_secs(1));
    assert_eq!(cfg.scheduler.jpeg_quality, 70);
    assert_eq!(cfg.scheduler.overlap, OverlapPolicy::Skip);
    assert_eq!(cfg.alerts.hold, Duration::from_secs(5));
    assert_eq!(cfg.history.interval, Duration::from_secs(10));
    assert_eq!(cfg.history.limit, 20);
    assert_eq!(cfg.api.addr, "127.0.0.1:8787");
    assert!(cfg.zone.is_none());

    clear_env();
}

#[test]
fn rejects_unknown_keys_and_bad_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{ "camera_url": "stub://yard" }"#).expect("write");
    std::env::set_var("REDZONE_CONFIG", file.path());
    assert!(MonitorConfig::load().is_err());

    std::env::remove_var("REDZONE_CONFIG");
    std::env::set_var("REDZONE_DETECT_INTERVAL_MS", "soon");
    assert!(MonitorConfig::load().is_err());

    std::env::set_var("REDZONE_DETECT_INTERVAL_MS", "0");
    assert!(MonitorConfig::load().is_err());

    clear_env();
}
