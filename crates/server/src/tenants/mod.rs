pub mod clock;
pub mod compare;
pub mod config;
pub mod registry;

use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use compare::{DigestComparer, SubtleComparer};
pub use config::{TenantConfig, sha256_hex};
pub use registry::TenantRegistry;

/// Errors raised while validating tenant config or loading the tenants file.
#[derive(Debug, Error)]
pub enum TenantError {
    /// A tenant entry violates a structural constraint.
    #[error("invalid tenant config: {0}")]
    Invalid(String),

    /// The tenants file does not exist.
    #[error("tenants file not found: {0}")]
    NotFound(String),

    /// The tenants file could not be read.
    #[error("failed to read tenants file: {0}")]
    Io(#[from] std::io::Error),

    /// The tenants file is not valid JSON.
    #[error("tenants file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// `record_usage` was called with a negative token count.
    #[error("token count must be >= 0, got {0}")]
    NegativeTokens(i64),
}
