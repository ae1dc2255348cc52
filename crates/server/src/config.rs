use std::path::Path;

use crate::error::ServerError;
use crate::tenants::{TenantConfig, TenantRegistry, sha256_hex};

/// Environment variable naming the policy JSON file. Required.
pub const ENV_POLICY_PATH: &str = "ZEROVEIL_POLICY_PATH";
/// Environment variable naming the tenants JSON file. Optional; a path that
/// does not exist selects legacy mode.
pub const ENV_TENANTS_PATH: &str = "ZEROVEIL_TENANTS_PATH";
/// Legacy single-key credential, used when no tenants file is configured.
pub const ENV_API_KEY: &str = "ZEROVEIL_API_KEY";
/// Base URL of the OpenAI-compatible upstream.
pub const ENV_UPSTREAM_URL: &str = "ZEROVEIL_UPSTREAM_URL";
/// Outbound credential for the upstream provider.
pub const ENV_UPSTREAM_API_KEY: &str = "ZEROVEIL_UPSTREAM_API_KEY";
/// Provider name recorded in audit events; `mock` selects the built-in
/// mock upstream.
pub const ENV_UPSTREAM_PROVIDER: &str = "ZEROVEIL_UPSTREAM_PROVIDER";

const DEFAULT_UPSTREAM_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_UPSTREAM_PROVIDER: &str = "openrouter";

/// How the gateway authenticates callers, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// A tenants file is loaded; bearer tokens must authenticate to an
    /// enabled tenant.
    Registry,
    /// Legacy single key: the bearer must hash-match `ZEROVEIL_API_KEY`.
    /// All traffic maps to the synthetic `default` tenant.
    SingleKey,
    /// Legacy open mode: no credentials required; all traffic maps to the
    /// synthetic `default` tenant.
    Open,
}

impl AuthMode {
    /// Whether requests must present a valid bearer token.
    pub fn requires_auth(self) -> bool {
        !matches!(self, Self::Open)
    }
}

/// Runtime configuration resolved from the environment at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub policy_path: String,
    pub tenants_path: Option<String>,
    pub api_key: Option<String>,
    pub upstream_url: String,
    pub upstream_api_key: Option<String>,
    pub upstream_provider: String,
}

impl GatewayConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ServerError> {
        let policy_path = std::env::var(ENV_POLICY_PATH)
            .map_err(|_| ServerError::Config(format!("{ENV_POLICY_PATH} must be set")))?;
        Ok(Self {
            policy_path,
            tenants_path: non_empty_var(ENV_TENANTS_PATH),
            api_key: non_empty_var(ENV_API_KEY),
            upstream_url: non_empty_var(ENV_UPSTREAM_URL)
                .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_owned()),
            upstream_api_key: non_empty_var(ENV_UPSTREAM_API_KEY),
            upstream_provider: non_empty_var(ENV_UPSTREAM_PROVIDER)
                .unwrap_or_else(|| DEFAULT_UPSTREAM_PROVIDER.to_owned()),
        })
    }

    /// Resolve the auth mode and build the tenant registry.
    ///
    /// A tenants path that does not exist is legacy mode, not an error; a
    /// path that exists but fails to parse is fatal. A tenants file with
    /// zero entries counts as not configured. In both legacy modes the
    /// registry holds a synthetic unlimited `default` tenant so rate and
    /// usage accounting stay uniform across modes.
    pub fn resolve_auth(&self) -> Result<(AuthMode, TenantRegistry), ServerError> {
        if let Some(path) = &self.tenants_path
            && Path::new(path).exists()
        {
            let registry = TenantRegistry::load(path)?;
            if !registry.is_empty() {
                return Ok((AuthMode::Registry, registry));
            }
        }

        if let Some(key) = &self.api_key {
            let tenant = TenantConfig::new("default", vec![sha256_hex(key)], 0, 0, true)?;
            return Ok((AuthMode::SingleKey, TenantRegistry::new(vec![tenant])));
        }

        let tenant = TenantConfig::new("default", Vec::new(), 0, 0, true)?;
        Ok((AuthMode::Open, TenantRegistry::new(vec![tenant])))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
