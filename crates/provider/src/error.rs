use thiserror::Error;

/// Errors surfaced by upstream providers.
///
/// All variants map to HTTP 502 at the gateway boundary; the timeout
/// variant additionally drives the `upstream_timeout` audit reason.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The upstream did not respond within the configured timeout.
    #[error("upstream request timed out after {0}s")]
    Timeout(u64),

    /// The upstream replied with a non-2xx status.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// Connection or protocol failure before a response arrived.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// The upstream body was not valid JSON.
    #[error("upstream returned an unparseable body: {0}")]
    Decode(String),

    /// The provider could not be constructed.
    #[error("invalid upstream configuration: {0}")]
    Configuration(String),
}

impl UpstreamError {
    /// Whether this failure was a timeout (audited as `upstream_timeout`).
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
