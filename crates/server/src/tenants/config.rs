use sha2::{Digest, Sha256};

use super::TenantError;

/// Hash a raw bearer token to the stored digest format (lowercase hex
/// SHA-256). The registry only ever sees tokens in this form.
pub fn sha256_hex(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

fn is_sha256_hex(candidate: &str) -> bool {
    candidate.len() == 64
        && candidate
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Immutable identity and limits for a single tenant.
///
/// Rate/usage counters live in the registry, not here; a `TenantConfig` can
/// be cloned out freely without carrying mutable state along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantConfig {
    /// Unique tenant identifier.
    pub tenant_id: String,
    /// SHA-256 hex digests of the tenant's API keys. Several digests allow
    /// zero-downtime key rotation.
    pub api_key_hashes: Vec<String>,
    /// Requests-per-minute budget. Zero means unlimited.
    pub rate_limit_rpm: u64,
    /// Tokens-per-day budget. Zero means unlimited.
    pub rate_limit_tpd: u64,
    /// A disabled tenant never authenticates and has zero capacity.
    pub enabled: bool,
}

impl TenantConfig {
    /// Validate and construct a tenant record.
    pub fn new(
        tenant_id: impl Into<String>,
        api_key_hashes: Vec<String>,
        rate_limit_rpm: u64,
        rate_limit_tpd: u64,
        enabled: bool,
    ) -> Result<Self, TenantError> {
        let tenant_id = tenant_id.into();
        if tenant_id.trim().is_empty() {
            return Err(TenantError::Invalid(
                "tenant_id must be non-empty".to_owned(),
            ));
        }
        for hash in &api_key_hashes {
            if !is_sha256_hex(hash) {
                return Err(TenantError::Invalid(format!(
                    "api_key_hashes entries must be lowercase SHA-256 hex digests \
                     (got a {}-char value for tenant '{tenant_id}')",
                    hash.len()
                )));
            }
        }
        Ok(Self {
            tenant_id,
            api_key_hashes,
            rate_limit_rpm,
            rate_limit_tpd,
            enabled,
        })
    }
}

/// Parse the tenants document: `{"tenants": [entry, ...]}`.
pub(super) fn parse_tenants(
    value: &serde_json::Value,
) -> Result<Vec<TenantConfig>, TenantError> {
    let root = value.as_object().ok_or_else(|| {
        TenantError::Invalid("tenants file root must be a JSON object".to_owned())
    })?;
    let entries = root
        .get("tenants")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| {
            TenantError::Invalid("tenants file must contain a \"tenants\" array".to_owned())
        })?;

    let mut tenants: Vec<TenantConfig> = Vec::with_capacity(entries.len());
    for entry in entries {
        let entry = entry.as_object().ok_or_else(|| {
            TenantError::Invalid("Each tenant entry must be an object".to_owned())
        })?;

        let tenant_id = entry
            .get("tenant_id")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();

        let api_key_hashes = match entry.get("api_key_hashes") {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_owned).ok_or_else(|| {
                        TenantError::Invalid("api_key_hashes must contain strings".to_owned())
                    })
                })
                .collect::<Result<_, _>>()?,
            Some(_) => {
                return Err(TenantError::Invalid(
                    "api_key_hashes must be a list".to_owned(),
                ));
            }
        };

        let rate_limit_rpm = parse_limit(entry, "rate_limit_rpm")?;
        let rate_limit_tpd = parse_limit(entry, "rate_limit_tpd")?;

        let enabled = match entry.get("enabled") {
            None | Some(serde_json::Value::Null) => true,
            Some(serde_json::Value::Bool(b)) => *b,
            Some(_) => return Err(TenantError::Invalid("enabled must be a bool".to_owned())),
        };

        let config = TenantConfig::new(
            tenant_id,
            api_key_hashes,
            rate_limit_rpm,
            rate_limit_tpd,
            enabled,
        )?;
        if tenants.iter().any(|t| t.tenant_id == config.tenant_id) {
            return Err(TenantError::Invalid(format!(
                "Duplicate tenant_id: {}",
                config.tenant_id
            )));
        }
        tenants.push(config);
    }

    Ok(tenants)
}

fn parse_limit(
    entry: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<u64, TenantError> {
    match entry.get(key) {
        None | Some(serde_json::Value::Null) => Ok(0),
        Some(value) => {
            let n = value
                .as_i64()
                .ok_or_else(|| TenantError::Invalid(format!("{key} must be an int")))?;
            if n < 0 {
                return Err(TenantError::Invalid(format!("{key} must be >= 0")));
            }
            Ok(n.cast_unsigned())
        }
    }
}
