//! HTTP camera source.
//!
//! Handles two kinds of endpoints:
//! - `multipart/x-mixed-replace` MJPEG streams: JPEGs are cut out of the byte
//!   stream by SOI/EOI markers;
//! - anything else: treated as a snapshot URL and re-fetched per frame.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::{Duration, Instant};
use url::Url;

use super::{frame_interval, health_grace, CameraConfig, SourceStats};
use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const CONNECT_GRACE: Duration = Duration::from_secs(5);

pub struct HttpSource {
    config: CameraConfig,
    stream: Option<HttpStream>,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
    frame_count: u64,
    last_error: Option<String>,
}

enum HttpStream {
    Mjpeg(MjpegReader),
    Snapshot,
}

impl HttpSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        let url = Url::parse(&config.url).context("parse camera url")?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported camera scheme '{}'; expected http(s)",
                url.scheme()
            ));
        }
        Ok(Self {
            config,
            stream: None,
            last_frame_at: None,
            connected_at: None,
            frame_count: 0,
            last_error: None,
        })
    }

    pub fn connect(&mut self) -> Result<()> {
        let response = ureq::get(&self.config.url)
            .call()
            .map_err(|e| {
                self.last_error = Some(e.to_string());
                e
            })
            .with_context(|| format!("connect to camera {}", self.config.url))?;
        let content_type = response
            .header("Content-Type")
            .unwrap_or("")
            .to_ascii_lowercase();

        self.stream = Some(if content_type.contains("multipart") {
            log::info!("HttpSource: streaming MJPEG from {}", self.config.url);
            HttpStream::Mjpeg(MjpegReader::new(response.into_reader()))
        } else {
            log::info!("HttpSource: polling snapshots from {}", self.config.url);
            HttpStream::Snapshot
        });
        self.connected_at = Some(Instant::now());
        self.last_error = None;
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        let min_interval = frame_interval(self.config.target_fps);
        loop {
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| anyhow!("http camera not connected; call connect() first"))?;
            let jpeg = match stream {
                HttpStream::Mjpeg(reader) => reader.next_jpeg(),
                HttpStream::Snapshot => fetch_snapshot(&self.config.url),
            };
            let jpeg = match jpeg {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.last_error = Some(e.to_string());
                    return Err(e);
                }
            };

            let now = Instant::now();
            if let (Some(last), HttpStream::Mjpeg(_)) = (self.last_frame_at, &*stream) {
                // Drop stream frames that arrive faster than the target rate.
                if now.duration_since(last) < min_interval {
                    continue;
                }
            }

            let image = image::load_from_memory(&jpeg)
                .context("decode camera jpeg")?
                .into_rgb8();
            let frame = Frame::new(image, self.frame_count);
            self.frame_count += 1;
            self.last_frame_at = Some(now);
            self.last_error = None;
            return Ok(frame);
        }
    }

    pub fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        match self.last_frame_at {
            Some(last) => last.elapsed() <= health_grace(self.config.target_fps),
            None => connected_at.elapsed() <= CONNECT_GRACE,
        }
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}

struct MjpegReader {
    reader: Box<dyn Read + Send + Sync>,
    buffer: Vec<u8>,
}

impl MjpegReader {
    fn new(reader: Box<dyn Read + Send + Sync>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = [0u8; 8192];
        loop {
            if let Some((start, end)) = jpeg_bounds(&self.buffer) {
                let jpeg = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(jpeg);
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Err(anyhow!("mjpeg stream ended"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                // Keep the tail in case it holds the first byte of a marker.
                let drain_len = self.buffer.len() - 1;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn fetch_snapshot(url: &str) -> Result<Vec<u8>> {
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("fetch snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut bytes)
        .context("read snapshot body")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty snapshot from {}", url));
    }
    Ok(bytes)
}

/// Byte range of the first complete JPEG (SOI..=EOI) in `buffer`.
fn jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}
