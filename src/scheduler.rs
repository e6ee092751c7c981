//! Render/dispatch scheduling.
//!
//! The scheduler owns two independent gates:
//! - the render gate fires at the display cadence and never waits on the network;
//! - the dispatch gate fires at most once per `detect_interval` and hands the
//!   frame (or ROI crop) to a short-lived worker thread that encodes it and
//!   calls the detector.
//!
//! Workers never touch session state. Each one sends a single message back over
//! an mpsc channel, which the session drains on its next tick via `collect`.
//! Messages carry the run epoch they were dispatched under; `stop` bumps the
//! epoch so anything that arrives afterwards is dropped.

use image::RgbImage;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::detect::{DetectRequest, DetectResponse, DetectorClient, DetectorError};
use crate::frame::{encode_jpeg, DEFAULT_JPEG_QUALITY};
use crate::zone::{RoiDescriptor, RoiOffset};

pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(1000 / 30);
pub const DEFAULT_DETECT_INTERVAL: Duration = Duration::from_millis(1000);

/// What to do when the dispatch gate opens while a request is still pending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Hold off until the pending request completes.
    #[default]
    Skip,
    /// Dispatch anyway; completions older than the newest applied one are dropped.
    Overlap,
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub render_interval: Duration,
    pub detect_interval: Duration,
    pub jpeg_quality: u8,
    pub overlap: OverlapPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            render_interval: DEFAULT_RENDER_INTERVAL,
            detect_interval: DEFAULT_DETECT_INTERVAL,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            overlap: OverlapPolicy::Skip,
        }
    }
}

/// Input for one detection upload.
#[derive(Clone, Debug)]
pub struct DispatchJob {
    /// Full frame, or the ROI crop when a zone is committed.
    pub image: RgbImage,
    pub roi: Option<RoiDescriptor>,
}

impl DispatchJob {
    pub fn full_frame(image: RgbImage) -> Self {
        Self { image, roi: None }
    }

    pub fn cropped(image: RgbImage, roi: RoiDescriptor) -> Self {
        Self {
            image,
            roi: Some(roi),
        }
    }
}

/// A detection exchange that finished under the current run.
#[derive(Debug)]
pub struct Completion {
    pub sequence: u64,
    /// Crop offset the request was sent with; boxes must be shifted by it.
    pub offset: Option<RoiOffset>,
    pub dispatched_at: Instant,
    pub result: Result<DetectResponse, DetectorError>,
}

struct Envelope {
    epoch: u64,
    completion: Completion,
}

pub struct FrameScheduler {
    client: Arc<dyn DetectorClient>,
    config: SchedulerConfig,
    running: bool,
    epoch: u64,
    next_sequence: u64,
    last_render: Option<Instant>,
    last_sent: Option<Instant>,
    in_flight: usize,
    newest_applied: Option<u64>,
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
}

impl FrameScheduler {
    pub fn new(client: Arc<dyn DetectorClient>, config: SchedulerConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            client,
            config,
            running: false,
            epoch: 0,
            next_sequence: 0,
            last_render: None,
            last_sent: None,
            in_flight: 0,
            newest_applied: None,
            tx,
            rx,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn client_name(&self) -> &'static str {
        self.client.name()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn last_sent(&self) -> Option<Instant> {
        self.last_sent
    }

    /// Begin (or resume) scheduling. The render gate opens immediately.
    pub fn start(&mut self, _now: Instant) {
        if self.running {
            return;
        }
        self.running = true;
        self.last_render = None;
        debug!("scheduler started (epoch {})", self.epoch);
    }

    /// Stop scheduling and orphan every pending request.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.epoch += 1;
        if self.in_flight > 0 {
            debug!(
                "scheduler stopped with {} request(s) in flight; their results will be dropped",
                self.in_flight
            );
        }
        self.in_flight = 0;
        self.newest_applied = None;
    }

    pub fn render_due(&self, now: Instant) -> bool {
        self.running
            && self
                .last_render
                .map_or(true, |t| now.saturating_duration_since(t) >= self.config.render_interval)
    }

    pub fn mark_rendered(&mut self, now: Instant) {
        self.last_render = Some(now);
    }

    /// Time until the render gate next opens.
    pub fn until_next_render(&self, now: Instant) -> Duration {
        match self.last_render {
            Some(t) => self
                .config
                .render_interval
                .saturating_sub(now.saturating_duration_since(t)),
            None => Duration::ZERO,
        }
    }

    pub fn dispatch_due(&self, now: Instant) -> bool {
        if !self.running {
            return false;
        }
        if self.config.overlap == OverlapPolicy::Skip && self.in_flight > 0 {
            return false;
        }
        self.last_sent
            .map_or(true, |t| now.saturating_duration_since(t) >= self.config.detect_interval)
    }

    /// Hand `job` to a worker thread. Returns the request's sequence number.
    pub fn dispatch(&mut self, now: Instant, job: DispatchJob) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.last_sent = Some(now);
        self.in_flight += 1;

        let epoch = self.epoch;
        let quality = self.config.jpeg_quality;
        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        let offset = job.roi.as_ref().map(|roi| roi.offset);

        debug!(
            "dispatch #{} via {} ({}x{}, roi={})",
            sequence,
            client.name(),
            job.image.width(),
            job.image.height(),
            job.roi.is_some()
        );

        let spawned = thread::Builder::new()
            .name(format!("redzone-detect-{}", sequence))
            .spawn({
                let tx = tx.clone();
                move || {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        run_job(client.as_ref(), job, quality)
                    }))
                    .unwrap_or_else(|_| {
                        Err(DetectorError::Unreachable(
                            "detection worker panicked".to_string(),
                        ))
                    });
                    let _ = tx.send(Envelope {
                        epoch,
                        completion: Completion {
                            sequence,
                            offset,
                            dispatched_at: now,
                            result,
                        },
                    });
                }
            });

        if let Err(e) = spawned {
            warn!("failed to spawn detection worker: {}", e);
            let _ = tx.send(Envelope {
                epoch,
                completion: Completion {
                    sequence,
                    offset,
                    dispatched_at: now,
                    result: Err(DetectorError::Unreachable(e.to_string())),
                },
            });
        }
        sequence
    }

    /// Drain finished requests that still belong to the current run.
    ///
    /// With `wait`, blocks up to that long for the first message when anything
    /// is in flight. Stale messages are consumed and dropped.
    pub fn collect(&mut self, wait: Option<Duration>) -> Vec<Completion> {
        let mut out = Vec::new();

        if let Some(timeout) = wait {
            if self.in_flight > 0 {
                match self.rx.recv_timeout(timeout) {
                    Ok(envelope) => out.extend(self.admit(envelope)),
                    Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
                }
            }
        }

        while let Ok(envelope) = self.rx.try_recv() {
            out.extend(self.admit(envelope));
        }
        out
    }

    fn admit(&mut self, envelope: Envelope) -> Option<Completion> {
        let sequence = envelope.completion.sequence;
        if envelope.epoch != self.epoch || !self.running {
            debug!("dropping stale completion #{}", sequence);
            return None;
        }
        self.in_flight = self.in_flight.saturating_sub(1);

        if self.newest_applied.is_some_and(|newest| sequence <= newest) {
            debug!("dropping out-of-order completion #{}", sequence);
            return None;
        }
        self.newest_applied = Some(sequence);
        Some(envelope.completion)
    }
}

fn run_job(
    client: &dyn DetectorClient,
    job: DispatchJob,
    quality: u8,
) -> Result<DetectResponse, DetectorError> {
    let jpeg =
        encode_jpeg(&job.image, quality).map_err(|e| DetectorError::Encode(e.to_string()))?;
    client.detect(&DetectRequest { jpeg, roi: job.roi })
}
