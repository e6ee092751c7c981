//! HTTP client for the remote detection service.
//!
//! - `POST {base}/detect`: multipart `image` (JPEG) plus optional `roi` (JSON).
//! - `GET {base}/violations`: recent violation history.
//!
//! Any non-2xx status is a generic server error; a 2xx body with an `error`
//! field is a rejection carrying the server's message.

use anyhow::{anyhow, Context, Result};
use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::detect::backend::{DetectRequest, DetectorClient, DetectorError};
use crate::detect::result::{DetectResponse, Detection, ViolationRecord};

const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct WireDetectResponse {
    #[serde(default)]
    detections: Option<Vec<Detection>>,
    #[serde(default)]
    violation_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireViolations {
    #[serde(default)]
    violations: Vec<ViolationRecord>,
}

/// Detection service reached over HTTP.
pub struct HttpDetectorClient {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpDetectorClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(base_url).context("parse detector url")?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported detector scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

impl DetectorClient for HttpDetectorClient {
    fn name(&self) -> &'static str {
        "http"
    }

    fn detect(&self, request: &DetectRequest) -> Result<DetectResponse, DetectorError> {
        let roi_json = match &request.roi {
            Some(roi) => Some(
                serde_json::to_string(roi).map_err(|e| DetectorError::Encode(e.to_string()))?,
            ),
            None => None,
        };
        let boundary = make_boundary();
        let body = multipart_body(&boundary, &request.jpeg, roi_json.as_deref());

        let response = self
            .agent
            .post(&self.endpoint("detect"))
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .send_bytes(&body)
            .map_err(map_ureq_error)?;
        let text = read_body(response)?;
        parse_detect_body(&text)
    }

    fn violations(&self) -> Result<Vec<ViolationRecord>, DetectorError> {
        let response = self
            .agent
            .get(&self.endpoint("violations"))
            .call()
            .map_err(map_ureq_error)?;
        let text = read_body(response)?;
        let parsed: WireViolations =
            serde_json::from_str(&text).map_err(|e| DetectorError::Decode(e.to_string()))?;
        Ok(parsed.violations)
    }
}

fn map_ureq_error(err: ureq::Error) -> DetectorError {
    match err {
        ureq::Error::Status(status, _) => DetectorError::Server { status },
        ureq::Error::Transport(transport) => DetectorError::Unreachable(transport.to_string()),
    }
}

fn read_body(response: ureq::Response) -> Result<String, DetectorError> {
    use std::io::Read;

    let mut text = String::new();
    response
        .into_reader()
        .take(MAX_RESPONSE_BYTES as u64 + 1)
        .read_to_string(&mut text)
        .map_err(|e| DetectorError::Unreachable(e.to_string()))?;
    if text.len() > MAX_RESPONSE_BYTES {
        return Err(DetectorError::Decode("response too large".to_string()));
    }
    Ok(text)
}

pub(crate) fn parse_detect_body(text: &str) -> Result<DetectResponse, DetectorError> {
    let wire: WireDetectResponse =
        serde_json::from_str(text).map_err(|e| DetectorError::Decode(e.to_string()))?;
    if let Some(message) = wire.error.filter(|m| !m.is_empty()) {
        return Err(DetectorError::Rejected(message));
    }
    Ok(DetectResponse {
        detections: wire.detections.unwrap_or_default(),
        violation_count: wire.violation_count,
    })
}

fn make_boundary() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("----redzone{}", suffix)
}

pub(crate) fn multipart_body(boundary: &str, jpeg: &[u8], roi_json: Option<&str>) -> Vec<u8> {
    let mut body = Vec::with_capacity(jpeg.len() + 512);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"image\"; filename=\"frame.jpg\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    body.extend_from_slice(jpeg);
    body.extend_from_slice(b"\r\n");

    if let Some(roi) = roi_json {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"roi\"\r\n\r\n");
        body.extend_from_slice(roi.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_schemes() {
        assert!(HttpDetectorClient::new("ftp://detector", Duration::from_secs(1)).is_err());
        assert!(HttpDetectorClient::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn endpoint_strips_trailing_slash() -> Result<()> {
        let client = HttpDetectorClient::new("http://localhost:5000/", Duration::from_secs(1))?;
        assert_eq!(client.base_url(), "http://localhost:5000");
        assert_eq!(client.endpoint("detect"), "http://localhost:5000/detect");
        Ok(())
    }

    #[test]
    fn multipart_contains_image_and_optional_roi() {
        let body = multipart_body("XYZ", b"\xFF\xD8jpeg\xFF\xD9", Some(r#"{"width":90}"#));
        let text = String::from_utf8_lossy(&body);
        assert!(text.starts_with("--XYZ\r\n"));
        assert!(text.contains("name=\"image\"; filename=\"frame.jpg\""));
        assert!(text.contains("name=\"roi\"\r\n\r\n{\"width\":90}\r\n"));
        assert!(text.ends_with("--XYZ--\r\n"));

        let without = multipart_body("XYZ", b"jpeg", None);
        assert!(!String::from_utf8_lossy(&without).contains("name=\"roi\""));
    }

    #[test]
    fn error_field_becomes_rejection() {
        assert_eq!(
            parse_detect_body(r#"{"error":"No image provided"}"#),
            Err(DetectorError::Rejected("No image provided".to_string()))
        );
        let ok = parse_detect_body(r#"{"error":"","detections":[]}"#).unwrap();
        assert!(ok.detections.is_empty());
    }

    #[test]
    fn malformed_body_is_decode_error() {
        assert!(matches!(
            parse_detect_body("<html>"),
            Err(DetectorError::Decode(_))
        ));
    }

    #[test]
    fn boundaries_are_unique() {
        assert_ne!(make_boundary(), make_boundary());
    }
}
