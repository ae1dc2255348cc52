pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod tenants;

pub use config::{AuthMode, GatewayConfig};
pub use error::ServerError;
pub use pipeline::{RequestContext, RequestPipeline};
