//! redzoned - red-zone monitor daemon
//!
//! This daemon:
//! 1. Acquires the configured camera (denial is fatal)
//! 2. Renders frames with the red zone and latest detections at display rate
//! 3. Uploads the zone crop (or full frame) to the detection service once per interval
//! 4. Debounces person-in-zone and PPE-violation alerts
//! 5. Serves status, history and the annotated frame on a loopback API
//!
//! Control commands are read from stdin, one per line:
//! `pause`, `resume`, `toggle`, `click <x> <y>`, `reset`, `status`, `quit`.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

use redzone_monitor::{
    api::{ApiConfig, ApiServer, StatusBoard},
    config::{parse_zone_arg, MonitorConfig},
    control::{self, Command, Outcome},
    history::HistoryPoller,
    overlay::ImageCanvas,
    scheduler::OverlapPolicy,
    ui::{Ui, UiMode},
    CameraSource, CaptureSession, DetectorClient, HttpDetectorClient, StubDetector,
};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);
const FRAME_PUBLISH_INTERVAL: Duration = Duration::from_millis(500);
const MAX_IDLE_SLEEP: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(author, version, about = "Red-zone safety monitor")]
struct Args {
    /// Camera URL or path (overrides config).
    #[arg(long)]
    camera: Option<String>,

    /// Detection service base URL (overrides config).
    #[arg(long)]
    detector: Option<String>,

    /// Status API bind address (overrides config).
    #[arg(long)]
    api_addr: Option<String>,

    /// Red zone as "x,y;x,y;x,y;x,y".
    #[arg(long, value_name = "POINTS")]
    zone: Option<String>,

    /// Allow a new upload while one is still pending.
    #[arg(long)]
    overlap: bool,

    /// Use the built-in stub detector instead of the HTTP service.
    #[arg(long, env = "REDZONE_OFFLINE")]
    offline: bool,

    /// Do not start the status API.
    #[arg(long)]
    no_api: bool,

    /// Do not poll the detector's violation history.
    #[arg(long)]
    no_history: bool,

    /// Ignore stdin control commands.
    #[arg(long)]
    no_stdin: bool,

    #[arg(long, env = "REDZONE_UI", value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = Ui::detect(args.ui);

    let cfg = {
        let stage = ui.stage("Load configuration");
        match load_config(&args) {
            Ok(cfg) => cfg,
            Err(e) => {
                stage.fail();
                return Err(e);
            }
        }
    };

    let client: Arc<dyn DetectorClient> = if args.offline {
        log::warn!("offline mode: detections come from the stub detector");
        Arc::new(StubDetector::new())
    } else {
        Arc::new(HttpDetectorClient::new(&cfg.detector.url, cfg.detector.timeout)?)
    };

    let mut session = CaptureSession::new(
        CameraSource::new(cfg.camera.clone())?,
        client.clone(),
        cfg.session_config(),
    );
    if let Some(path) = &cfg.overlay.font_path {
        session.set_font(ImageCanvas::load_font(path)?);
    }

    {
        let stage = ui.stage("Acquire camera");
        if let Err(e) = session.acquire_camera() {
            stage.fail();
            return Err(anyhow!(e)).context("redzoned cannot run without a camera");
        }
    }

    let poller = if cfg.history.enabled && !args.no_history {
        Some(HistoryPoller::spawn(
            client.clone(),
            cfg.history.interval,
            cfg.history.limit,
        )?)
    } else {
        None
    };

    let status = StatusBoard::new();
    let api_handle = if cfg.api.enabled && !args.no_api {
        let _stage = ui.stage("Start status API");
        let api_config = ApiConfig {
            addr: cfg.api.addr.clone(),
        };
        Some(ApiServer::new(api_config, status.clone(), poller.as_ref().map(|p| p.board())).spawn()?)
    } else {
        None
    };

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::SeqCst);
    })
    .context("set Ctrl-C handler")?;

    let commands = if args.no_stdin {
        None
    } else {
        Some(spawn_stdin_reader())
    };

    session
        .start(Instant::now())
        .map_err(|e| anyhow!(e))?;
    log::info!(
        "redzoned running: camera={} detector={} detect_interval={}ms",
        cfg.camera.url,
        if args.offline { "stub" } else { cfg.detector.url.as_str() },
        cfg.scheduler.detect_interval.as_millis()
    );

    let mut last_health_log = Instant::now();
    let mut last_frame_publish: Option<Instant> = None;

    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        let mut changed = false;

        if let Some(rx) = &commands {
            for command in rx.try_iter() {
                changed = true;
                match control::apply(&mut session, &command, now) {
                    Outcome::Quit => running.store(false, Ordering::SeqCst),
                    Outcome::Status => ui.status(&session.snapshot()),
                    Outcome::Zone(state) => log::info!("zone: {:?}", state),
                    Outcome::Continue => {}
                }
            }
        }

        let report = session.tick(now);
        changed |= report.rendered || report.applied > 0;

        if changed {
            let publish_frame =
                last_frame_publish.map_or(true, |t| now.duration_since(t) >= FRAME_PUBLISH_INTERVAL);
            let frame = if publish_frame {
                last_frame_publish = Some(now);
                match session.annotated_jpeg(cfg.scheduler.jpeg_quality) {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::warn!("failed to encode annotated frame: {:#}", e);
                        None
                    }
                }
            } else {
                None
            };
            status.publish(session.snapshot(), frame);
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let snapshot = session.snapshot();
            log::info!(
                "camera health={} frames={} failed={} in_flight={} detections={}",
                snapshot.camera_healthy,
                snapshot.camera.frames_captured,
                snapshot.frames_failed,
                snapshot.in_flight,
                snapshot.detections.len()
            );
            last_health_log = Instant::now();
        }

        let idle = session
            .until_next_tick(Instant::now())
            .clamp(Duration::from_millis(1), MAX_IDLE_SLEEP);
        std::thread::sleep(idle);
    }

    log::info!("shutdown requested, stopping session...");
    session.stop();
    if let Some(handle) = api_handle {
        handle.stop()?;
    }
    if let Some(poller) = poller {
        poller.stop()?;
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<MonitorConfig> {
    let mut cfg = MonitorConfig::load()?;
    if let Some(camera) = &args.camera {
        cfg.camera.url = camera.clone();
    }
    if let Some(detector) = &args.detector {
        cfg.detector.url = detector.clone();
    }
    if let Some(addr) = &args.api_addr {
        cfg.api.addr = addr.clone();
    }
    if let Some(zone) = &args.zone {
        cfg.zone = Some(parse_zone_arg(zone).context("parse --zone")?);
    }
    if args.overlap {
        cfg.scheduler.overlap = OverlapPolicy::Overlap;
    }
    Ok(cfg)
}

fn spawn_stdin_reader() -> Receiver<Command> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => eprintln!("error: {:#}", e),
            }
        }
    });
    rx
}
