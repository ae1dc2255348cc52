use std::sync::Arc;

use clap::Parser;
use tracing::info;

use zeroveil_audit::AuditLogger;
use zeroveil_core::Policy;
use zeroveil_provider::{HttpUpstream, MockUpstream, UpstreamProvider};
use zeroveil_server::api::{self, AppState};
use zeroveil_server::config::{ENV_UPSTREAM_API_KEY, GatewayConfig};
use zeroveil_server::error::ServerError;
use zeroveil_server::pipeline::RequestPipeline;

const UPSTREAM_TIMEOUT_SECONDS: u64 = 30;

/// ZeroVeil gateway HTTP server.
#[derive(Parser, Debug)]
#[command(
    name = "zeroveil-gateway",
    about = "Policy-enforcing egress gateway for LLM providers"
)]
struct Cli {
    /// Bind host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Bind port.
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing from RUST_LOG or default to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = GatewayConfig::from_env()?;

    // Policy and tenants load failures are fatal; the gateway refuses to
    // start rather than serve with an unknown policy.
    let policy = Arc::new(Policy::load(&config.policy_path)?);
    info!(version = %policy.version, path = %config.policy_path, "policy loaded");

    if !policy
        .allowed_providers
        .iter()
        .any(|p| p == &config.upstream_provider)
    {
        return Err(Box::new(ServerError::Config(format!(
            "upstream provider '{}' is not in allowed_providers",
            config.upstream_provider
        ))) as Box<dyn std::error::Error>);
    }

    let (auth_mode, registry) = config.resolve_auth()?;
    info!(mode = ?auth_mode, tenants = registry.len(), "tenant registry ready");

    let upstream: Arc<dyn UpstreamProvider> = if config.upstream_provider == "mock" {
        Arc::new(MockUpstream::completing())
    } else {
        let api_key = config.upstream_api_key.clone().ok_or_else(|| {
            ServerError::Config(format!(
                "{ENV_UPSTREAM_API_KEY} must be set for upstream provider '{}'",
                config.upstream_provider
            ))
        })?;
        Arc::new(HttpUpstream::new(
            config.upstream_provider.clone(),
            config.upstream_url.clone(),
            api_key,
            UPSTREAM_TIMEOUT_SECONDS,
        )?)
    };

    let audit = Arc::new(AuditLogger::from_policy(&policy));
    let pipeline = Arc::new(RequestPipeline::new(
        Arc::clone(&policy),
        Arc::new(registry),
        auth_mode,
        upstream,
        audit,
    ));

    let app = api::router(AppState {
        pipeline,
        policy,
    });

    let listener = tokio::net::TcpListener::bind((cli.host.as_str(), cli.port)).await?;
    info!(host = %cli.host, port = cli.port, "zeroveil gateway listening");
    axum::serve(listener, app).await?;

    Ok(())
}
