pub mod error;
pub mod http;
pub mod mock;
pub mod upstream;

pub use error::UpstreamError;
pub use http::HttpUpstream;
pub use mock::{FailingUpstream, MockUpstream};
pub use upstream::{TokenUsage, UpstreamProvider, UpstreamResponse};
