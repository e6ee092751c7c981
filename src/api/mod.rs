//! Local status API.
//!
//! A small blocking HTTP server on a std `TcpListener`:
//! - `GET /health`
//! - `GET /status`: latest session snapshot
//! - `GET /violations`: detector violation history
//! - `GET /frame.jpg`: latest annotated frame
//!
//! The monitor loop is the only writer; it publishes into a `StatusBoard` and
//! the server thread reads from it. When bound to loopback, non-loopback peers
//! are refused.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::history::HistoryBoard;
use crate::session::SessionSnapshot;

const MAX_REQUEST_BYTES: usize = 8192;
pub const DEFAULT_API_ADDR: &str = "127.0.0.1:8787";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_API_ADDR.to_string(),
        }
    }
}

#[derive(Default)]
struct Published {
    snapshot: Option<SessionSnapshot>,
    frame_jpeg: Option<Arc<Vec<u8>>>,
}

/// Latest session state as seen by API readers.
#[derive(Clone, Default)]
pub struct StatusBoard {
    inner: Arc<Mutex<Published>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: SessionSnapshot, frame_jpeg: Option<Vec<u8>>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.snapshot = Some(snapshot);
            if let Some(frame) = frame_jpeg {
                inner.frame_jpeg = Some(Arc::new(frame));
            }
        }
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.inner.lock().ok().and_then(|inner| inner.snapshot.clone())
    }

    pub fn frame_jpeg(&self) -> Option<Arc<Vec<u8>>> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.frame_jpeg.clone())
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("status api thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    status: StatusBoard,
    history: Option<HistoryBoard>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, status: StatusBoard, history: Option<HistoryBoard>) -> Self {
        Self {
            cfg,
            status,
            history,
        }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("parse api addr '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("bind status api on {}", configured_addr))?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("redzone-api".to_string())
            .spawn(move || {
                if let Err(err) = run_api(listener, &self.status, self.history.as_ref(), shutdown_thread)
                {
                    log::error!("status api stopped: {}", err);
                }
            })?;

        log::info!("status api listening on http://{}", addr);
        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    status: &StatusBoard,
    history: Option<&HistoryBoard>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, status, history) {
                    log::warn!("status api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    status: &StatusBoard,
    history: Option<&HistoryBoard>,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_json_response(&mut stream, 403, r#"{"error":"forbidden"}"#)?;
        return Ok(());
    }

    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }

    match request.path.as_str() {
        "/health" => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        "/status" => match status.snapshot() {
            Some(snapshot) => write_json(&mut stream, &snapshot),
            None => write_json_response(&mut stream, 503, r#"{"error":"not_ready"}"#),
        },
        "/violations" => {
            let records = history.map(HistoryBoard::records).unwrap_or_default();
            write_json(&mut stream, &ViolationsBody { violations: records })
        }
        "/frame.jpg" => match status.frame_jpeg() {
            Some(jpeg) => write_response(&mut stream, 200, "image/jpeg", &jpeg),
            None => write_json_response(&mut stream, 404, r#"{"error":"no_frame"}"#),
        },
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

#[derive(Serialize)]
struct ViolationsBody {
    violations: Vec<crate::detect::ViolationRecord>,
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    parse_request_line(&String::from_utf8_lossy(&data))
}

fn parse_request_line(text: &str) -> Result<HttpRequest> {
    let request_line = text
        .split("\r\n")
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path);
    Ok(HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
    })
}

fn write_json<T: Serialize>(stream: &mut TcpStream, value: &T) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    write_response(stream, 200, "application/json", &payload)
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}
