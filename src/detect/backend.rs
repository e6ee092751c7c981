use std::fmt;

use super::result::{DetectResponse, ViolationRecord};
use crate::zone::RoiDescriptor;

/// One upload to the detection service.
#[derive(Clone, Debug)]
pub struct DetectRequest {
    /// JPEG-encoded frame or ROI crop.
    pub jpeg: Vec<u8>,
    /// Present when `jpeg` is a crop of a committed red zone.
    pub roi: Option<RoiDescriptor>,
}

/// Why a detection exchange failed.
///
/// Every variant is recoverable: the session shows the message and retries on
/// the next dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectorError {
    /// Network failure; the service never answered.
    Unreachable(String),
    /// Non-2xx HTTP status.
    Server { status: u16 },
    /// 2xx response carrying an `error` field.
    Rejected(String),
    /// Response body was not the expected JSON.
    Decode(String),
    /// The frame could not be encoded for upload.
    Encode(String),
}

impl fmt::Display for DetectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorError::Unreachable(_) => write!(f, "Failed to fetch detection results."),
            DetectorError::Server { .. } => write!(f, "Detection server error."),
            DetectorError::Rejected(message) => write!(f, "{}", message),
            DetectorError::Decode(reason) => {
                write!(f, "Invalid detection response: {}", reason)
            }
            DetectorError::Encode(reason) => write!(f, "Failed to encode frame: {}", reason),
        }
    }
}

impl std::error::Error for DetectorError {}

/// Client for the remote detection service.
///
/// Implementations are called from dispatch worker threads, never from the
/// render loop, and must not retain the uploaded image after returning.
pub trait DetectorClient: Send + Sync {
    /// Client identifier for logs.
    fn name(&self) -> &'static str;

    /// Upload one image and return the parsed detections.
    fn detect(&self, request: &DetectRequest) -> Result<DetectResponse, DetectorError>;

    /// Fetch the service's violation history.
    fn violations(&self) -> Result<Vec<ViolationRecord>, DetectorError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_inline_messages() {
        assert_eq!(
            DetectorError::Server { status: 502 }.to_string(),
            "Detection server error."
        );
        assert_eq!(
            DetectorError::Unreachable("connection refused".into()).to_string(),
            "Failed to fetch detection results."
        );
        assert_eq!(
            DetectorError::Rejected("model not loaded".into()).to_string(),
            "model not loaded"
        );
    }
}
