use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::alert::DEFAULT_ALERT_HOLD;
use crate::api::DEFAULT_API_ADDR;
use crate::detect::PERSON;
use crate::frame::DEFAULT_JPEG_QUALITY;
use crate::history::{DEFAULT_HISTORY_INTERVAL, DEFAULT_HISTORY_LIMIT};
use crate::ingest::CameraConfig;
use crate::scheduler::{OverlapPolicy, SchedulerConfig, DEFAULT_DETECT_INTERVAL};
use crate::session::SessionConfig;
use crate::zone::Polygon;
use crate::Point;

const DEFAULT_DETECTOR_URL: &str = "http://localhost:5000";
const DEFAULT_DETECTOR_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RENDER_INTERVAL_MS: u64 = 1000 / 30;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MonitorConfigFile {
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    scheduler: Option<SchedulerConfigFile>,
    alerts: Option<AlertConfigFile>,
    history: Option<HistoryConfigFile>,
    api: Option<ApiConfigFile>,
    overlay: Option<OverlayConfigFile>,
    zone: Option<Vec<[f32; 2]>>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SchedulerConfigFile {
    render_interval_ms: Option<u64>,
    detect_interval_ms: Option<u64>,
    jpeg_quality: Option<u8>,
    overlap: Option<OverlapPolicy>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    hold_ms: Option<u64>,
    person_label: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryConfigFile {
    enabled: Option<bool>,
    interval_ms: Option<u64>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    enabled: Option<bool>,
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    font_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub camera: CameraConfig,
    pub detector: DetectorSettings,
    pub scheduler: SchedulerConfig,
    pub alerts: AlertSettings,
    pub history: HistorySettings,
    pub api: ApiSettings,
    pub overlay: OverlaySettings,
    /// Zone committed at startup.
    pub zone: Option<Polygon>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub hold: Duration,
    pub person_label: String,
}

#[derive(Debug, Clone)]
pub struct HistorySettings {
    pub enabled: bool,
    pub interval: Duration,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub enabled: bool,
    pub addr: String,
}

#[derive(Debug, Clone, Default)]
pub struct OverlaySettings {
    pub font_path: Option<PathBuf>,
}

impl MonitorConfig {
    /// Defaults, then `REDZONE_CONFIG` (JSON), then `REDZONE_*` env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("REDZONE_CONFIG").ok();
        let file_cfg = match config_path.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Result<Self> {
        let camera_defaults = CameraConfig::default();
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraConfig {
            url: camera_file.url.unwrap_or(camera_defaults.url),
            target_fps: camera_file.target_fps.unwrap_or(camera_defaults.target_fps),
            width: camera_file.width.unwrap_or(camera_defaults.width),
            height: camera_file.height.unwrap_or(camera_defaults.height),
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            url: detector_file
                .url
                .unwrap_or_else(|| DEFAULT_DETECTOR_URL.to_string()),
            timeout: Duration::from_millis(
                detector_file
                    .timeout_ms
                    .unwrap_or(DEFAULT_DETECTOR_TIMEOUT_MS),
            ),
        };

        let scheduler_file = file.scheduler.unwrap_or_default();
        let scheduler = SchedulerConfig {
            render_interval: Duration::from_millis(
                scheduler_file
                    .render_interval_ms
                    .unwrap_or(DEFAULT_RENDER_INTERVAL_MS),
            ),
            detect_interval: scheduler_file
                .detect_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_DETECT_INTERVAL),
            jpeg_quality: scheduler_file.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            overlap: scheduler_file.overlap.unwrap_or_default(),
        };

        let alerts_file = file.alerts.unwrap_or_default();
        let alerts = AlertSettings {
            hold: alerts_file
                .hold_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_ALERT_HOLD),
            person_label: alerts_file
                .person_label
                .unwrap_or_else(|| PERSON.to_string()),
        };

        let history_file = file.history.unwrap_or_default();
        let history = HistorySettings {
            enabled: history_file.enabled.unwrap_or(true),
            interval: history_file
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_HISTORY_INTERVAL),
            limit: history_file.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        };

        let api_file = file.api.unwrap_or_default();
        let api = ApiSettings {
            enabled: api_file.enabled.unwrap_or(true),
            addr: api_file
                .addr
                .unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
        };

        let overlay = OverlaySettings {
            font_path: file.overlay.and_then(|overlay| overlay.font_path),
        };

        let zone = match file.zone {
            Some(points) => Some(parse_zone_points(&points)?),
            None => None,
        };

        Ok(Self {
            camera,
            detector,
            scheduler,
            alerts,
            history,
            api,
            overlay,
            zone,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = non_empty_env("REDZONE_CAMERA_URL") {
            self.camera.url = url;
        }
        if let Some(url) = non_empty_env("REDZONE_DETECTOR_URL") {
            self.detector.url = url;
        }
        if let Some(addr) = non_empty_env("REDZONE_API_ADDR") {
            self.api.addr = addr;
        }
        if let Some(path) = non_empty_env("REDZONE_FONT_PATH") {
            self.overlay.font_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = non_empty_env("REDZONE_DETECT_INTERVAL_MS") {
            let ms: u64 = raw.parse().map_err(|_| {
                anyhow!("REDZONE_DETECT_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.scheduler.detect_interval = Duration::from_millis(ms);
        }
        if let Some(raw) = non_empty_env("REDZONE_HOLD_MS") {
            let ms: u64 = raw.parse().map_err(|_| {
                anyhow!("REDZONE_HOLD_MS must be an integer number of milliseconds")
            })?;
            self.alerts.hold = Duration::from_millis(ms);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.camera.url.trim().is_empty() {
            return Err(anyhow!("camera url must not be empty"));
        }
        if self.scheduler.render_interval.is_zero() {
            return Err(anyhow!("scheduler render interval must be greater than zero"));
        }
        if self.scheduler.detect_interval.is_zero() {
            return Err(anyhow!("scheduler detect interval must be greater than zero"));
        }
        if !(1..=100).contains(&self.scheduler.jpeg_quality) {
            return Err(anyhow!(
                "jpeg quality must be within 1..=100, got {}",
                self.scheduler.jpeg_quality
            ));
        }
        if self.alerts.hold.is_zero() {
            return Err(anyhow!("alert hold must be greater than zero"));
        }
        if self.alerts.person_label.trim().is_empty() {
            return Err(anyhow!("alert person_label must not be empty"));
        }
        if self.history.enabled && (self.history.interval.is_zero() || self.history.limit == 0) {
            return Err(anyhow!("history interval and limit must be greater than zero"));
        }
        if self.detector.timeout.is_zero() {
            return Err(anyhow!("detector timeout must be greater than zero"));
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            scheduler: self.scheduler.clone(),
            alert_hold: self.alerts.hold,
            person_label: self.alerts.person_label.clone(),
            zone: self.zone,
        }
    }
}

/// Parse a zone given as `x,y;x,y;x,y;x,y`.
pub fn parse_zone_arg(value: &str) -> Result<Polygon> {
    let points = value
        .split(';')
        .map(|pair| {
            let (x, y) = pair
                .split_once(',')
                .ok_or_else(|| anyhow!("zone point '{}' must be 'x,y'", pair.trim()))?;
            let x: f32 = x
                .trim()
                .parse()
                .map_err(|_| anyhow!("zone x '{}' is not a number", x.trim()))?;
            let y: f32 = y
                .trim()
                .parse()
                .map_err(|_| anyhow!("zone y '{}' is not a number", y.trim()))?;
            Ok([x, y])
        })
        .collect::<Result<Vec<_>>>()?;
    parse_zone_points(&points)
}

fn parse_zone_points(points: &[[f32; 2]]) -> Result<Polygon> {
    if points.iter().flatten().any(|v| !v.is_finite()) {
        return Err(anyhow!("zone coordinates must be finite"));
    }
    let points: Vec<Point> = points.iter().copied().map(Point::from).collect();
    Polygon::from_points(&points)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_arg_needs_four_points() -> Result<()> {
        let zone = parse_zone_arg("10,10; 100,10; 100,100; 10,100")?;
        assert_eq!(zone.vertices()[2], Point::new(100.0, 100.0));
        assert!(parse_zone_arg("1,1;2,2;3,3").is_err());
        assert!(parse_zone_arg("1,1;2,2;3,3;4").is_err());
        assert!(parse_zone_arg("1,1;2,2;3,3;x,4").is_err());
        Ok(())
    }

    #[test]
    fn empty_file_yields_defaults() -> Result<()> {
        let mut cfg = MonitorConfig::from_file(MonitorConfigFile::default())?;
        cfg.validate()?;
        assert_eq!(cfg.camera.url, "stub://camera");
        assert_eq!(cfg.detector.url, DEFAULT_DETECTOR_URL);
        assert_eq!(cfg.scheduler.detect_interval, Duration::from_millis(1000));
        assert_eq!(cfg.scheduler.render_interval, Duration::from_millis(33));
        assert_eq!(cfg.scheduler.jpeg_quality, 70);
        assert_eq!(cfg.scheduler.overlap, OverlapPolicy::Skip);
        assert_eq!(cfg.alerts.hold, Duration::from_millis(5000));
        assert_eq!(cfg.history.limit, 20);
        assert!(cfg.zone.is_none());
        Ok(())
    }

    #[test]
    fn validation_rejects_bad_values() -> Result<()> {
        let mut cfg = MonitorConfig::from_file(MonitorConfigFile::default())?;
        cfg.scheduler.jpeg_quality = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = MonitorConfig::from_file(MonitorConfigFile::default())?;
        cfg.scheduler.detect_interval = Duration::ZERO;
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn file_zone_must_have_four_points() {
        let file: MonitorConfigFile =
            serde_json::from_str(r#"{"zone":[[0,0],[1,0],[1,1]]}"#).unwrap();
        assert!(MonitorConfig::from_file(file).is_err());
    }
}
