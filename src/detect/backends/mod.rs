pub mod http;
pub mod stub;

pub use http::HttpDetectorClient;
pub use stub::StubDetector;
