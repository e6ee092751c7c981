mod backend;
mod backends;
mod result;

pub use backend::{DetectRequest, DetectorClient, DetectorError};
pub use backends::stub::RecordedRequest;
pub use backends::{HttpDetectorClient, StubDetector};
pub use result::{
    is_violation_class, DetectResponse, Detection, DetectionSummary, ViolationRecord, MASK,
    NO_HARDHAT, NO_MASK, NO_SAFETY_VEST, PERSON, VIOLATION_CLASSES,
};
