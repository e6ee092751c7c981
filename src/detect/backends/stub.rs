use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::time::Duration;

use crate::detect::backend::{DetectRequest, DetectorClient, DetectorError};
use crate::detect::result::{DetectResponse, ViolationRecord};
use crate::zone::RoiDescriptor;

const GATE_TIMEOUT: Duration = Duration::from_secs(30);

/// What the stub saw for one upload.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub roi: Option<RoiDescriptor>,
    /// Decoded size of the uploaded JPEG, if it decoded.
    pub dimensions: Option<(u32, u32)>,
}

/// Offline detector with scripted answers.
///
/// Responses are served in push order; once the script runs out every call
/// returns the fallback (empty by default). With a gate attached, each call
/// blocks until the test releases it, which makes late completions reproducible.
pub struct StubDetector {
    script: Mutex<VecDeque<Result<DetectResponse, DetectorError>>>,
    fallback: DetectResponse,
    requests: Mutex<Vec<RecordedRequest>>,
    history: Mutex<Vec<ViolationRecord>>,
    gate: Option<Mutex<Receiver<()>>>,
}

impl StubDetector {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: DetectResponse::default(),
            requests: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Stub whose calls wait for a release signal on the returned sender.
    pub fn gated() -> (Self, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let mut stub = Self::new();
        stub.gate = Some(Mutex::new(rx));
        (stub, tx)
    }

    pub fn with_fallback(mut self, fallback: DetectResponse) -> Self {
        self.fallback = fallback;
        self
    }

    /// Queue the next answer.
    pub fn push(&self, result: Result<DetectResponse, DetectorError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(result);
        }
    }

    pub fn set_history(&self, records: Vec<ViolationRecord>) {
        if let Ok(mut history) = self.history.lock() {
            *history = records;
        }
    }

    /// Uploads seen so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn wait_for_release(&self) -> Result<(), DetectorError> {
        let Some(gate) = &self.gate else {
            return Ok(());
        };
        let gate = gate
            .lock()
            .map_err(|_| DetectorError::Unreachable("stub gate poisoned".to_string()))?;
        gate.recv_timeout(GATE_TIMEOUT)
            .map_err(|_| DetectorError::Unreachable("stub gate never released".to_string()))
    }
}

impl Default for StubDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorClient for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&self, request: &DetectRequest) -> Result<DetectResponse, DetectorError> {
        let dimensions = image::load_from_memory(&request.jpeg)
            .ok()
            .map(|img| (img.width(), img.height()));
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                roi: request.roi.clone(),
                dimensions,
            });
        }

        self.wait_for_release()?;

        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }

    fn violations(&self) -> Result<Vec<ViolationRecord>, DetectorError> {
        Ok(self
            .history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::{Detection, PERSON};

    fn request() -> DetectRequest {
        DetectRequest {
            jpeg: Vec::new(),
            roi: None,
        }
    }

    #[test]
    fn serves_script_then_fallback() {
        let fallback = DetectResponse {
            detections: vec![Detection::new(PERSON, 0.9, [0.0, 0.0, 1.0, 1.0])],
            violation_count: None,
        };
        let stub = StubDetector::new().with_fallback(fallback.clone());
        stub.push(Err(DetectorError::Server { status: 500 }));

        assert_eq!(
            stub.detect(&request()),
            Err(DetectorError::Server { status: 500 })
        );
        assert_eq!(stub.detect(&request()), Ok(fallback));
        assert_eq!(stub.requests().len(), 2);
        assert!(stub.requests()[0].dimensions.is_none());
    }

    #[test]
    fn gated_calls_wait_for_release() {
        let (stub, release) = StubDetector::gated();
        release.send(()).unwrap();
        assert_eq!(stub.detect(&request()), Ok(DetectResponse::default()));
    }
}
