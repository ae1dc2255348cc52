pub mod enforce;
pub mod error;
pub mod policy;
pub mod request;
pub mod validate;

pub use enforce::enforce;
pub use error::{ErrorCode, GatewayError};
pub use policy::{LoggingMode, LoggingSink, Policy, PolicyError, RetentionConfig};
pub use request::{ChatMessage, ChatRequest, RequestMetadata};
pub use validate::{ALLOWED_ROLES, validate_shape};
