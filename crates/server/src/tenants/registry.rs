use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use super::TenantError;
use super::clock::{Clock, SystemClock};
use super::compare::{DigestComparer, SubtleComparer};
use super::config::{TenantConfig, parse_tenants, sha256_hex};

const RPM_WINDOW_SECONDS: f64 = 60.0;
const TPD_WINDOW_SECONDS: f64 = 86_400.0;

#[derive(Debug, Default)]
struct Counters {
    rpm_window_start: f64,
    rpm_count: u64,
    tpd_window_start: f64,
    tpd_count: u64,
}

struct TenantSlot {
    config: TenantConfig,
    // Per-tenant lock: the window-reset + threshold-compare + increment
    // sequence must be one critical section, and tenants must not contend
    // with each other.
    counters: Mutex<Counters>,
}

/// Holds tenant records, authenticates bearer tokens, and tracks the
/// per-tenant RPM and TPD windows.
///
/// The tenant table is immutable after construction; only the counters
/// behind each tenant's lock mutate. All state is per-process and lost on
/// restart.
pub struct TenantRegistry {
    tenants: HashMap<String, TenantSlot>,
    clock: Arc<dyn Clock>,
    comparer: Arc<dyn DigestComparer>,
}

impl TenantRegistry {
    /// Build a registry over the given tenant records, using the system
    /// clock and the constant-time comparer.
    pub fn new(tenants: Vec<TenantConfig>) -> Self {
        let tenants = tenants
            .into_iter()
            .map(|config| {
                (
                    config.tenant_id.clone(),
                    TenantSlot {
                        config,
                        counters: Mutex::new(Counters::default()),
                    },
                )
            })
            .collect();
        Self {
            tenants,
            clock: Arc::new(SystemClock),
            comparer: Arc::new(SubtleComparer),
        }
    }

    /// Replace the clock (test seam).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the digest comparer (test seam).
    pub fn with_comparer(mut self, comparer: Arc<dyn DigestComparer>) -> Self {
        self.comparer = comparer;
        self
    }

    /// Load a registry from the tenants JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TenantError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TenantError::NotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&contents)?;
        Ok(Self::new(parse_tenants(&value)?))
    }

    /// Authenticate a raw bearer token against all enabled tenants.
    ///
    /// The token is hashed once and every stored digest of every enabled
    /// tenant is compared through the constant-time seam; the scan does not
    /// stop at the first mismatch or the first match, so a miss and a hit
    /// traverse the same work. Empty or whitespace-only tokens never match.
    pub fn authenticate(&self, token: &str) -> Option<&TenantConfig> {
        if token.trim().is_empty() {
            return None;
        }
        let digest = sha256_hex(token);

        let mut matched: Option<&TenantConfig> = None;
        for slot in self.tenants.values() {
            if !slot.config.enabled {
                continue;
            }
            for hash in &slot.config.api_key_hashes {
                if self.comparer.digests_equal(hash, &digest) && matched.is_none() {
                    matched = Some(&slot.config);
                }
            }
        }
        matched
    }

    /// Admit or reject a request against both windows.
    ///
    /// Returns false for unknown or disabled tenants. A zero limit makes
    /// its dimension unlimited. The RPM budget is consumed here on
    /// admission; the TPD budget is consumed post-response through
    /// [`Self::record_usage`].
    pub fn check_rate_limit(&self, tenant_id: &str) -> bool {
        let Some(slot) = self.tenants.get(tenant_id) else {
            return false;
        };
        if !slot.config.enabled {
            return false;
        }

        let now = self.clock.now();
        let mut counters = slot
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let rpm = slot.config.rate_limit_rpm;
        if rpm > 0 {
            if now - counters.rpm_window_start >= RPM_WINDOW_SECONDS {
                counters.rpm_window_start = now;
                counters.rpm_count = 0;
            }
            if counters.rpm_count >= rpm {
                return false;
            }
        }

        let tpd = slot.config.rate_limit_tpd;
        if tpd > 0 {
            if now - counters.tpd_window_start >= TPD_WINDOW_SECONDS {
                counters.tpd_window_start = now;
                counters.tpd_count = 0;
            }
            if counters.tpd_count >= tpd {
                return false;
            }
        }

        if rpm > 0 {
            counters.rpm_count += 1;
        }
        true
    }

    /// Charge consumed tokens against the tenant's daily budget.
    ///
    /// A no-op for unknown or disabled tenants and for tenants with an
    /// unlimited TPD. Negative token counts are an argument error.
    pub fn record_usage(&self, tenant_id: &str, tokens: i64) -> Result<(), TenantError> {
        if tokens < 0 {
            return Err(TenantError::NegativeTokens(tokens));
        }
        let Some(slot) = self.tenants.get(tenant_id) else {
            return Ok(());
        };
        if !slot.config.enabled || slot.config.rate_limit_tpd == 0 {
            return Ok(());
        }

        let now = self.clock.now();
        let mut counters = slot
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if now - counters.tpd_window_start >= TPD_WINDOW_SECONDS {
            counters.tpd_window_start = now;
            counters.tpd_count = 0;
        }
        counters.tpd_count += tokens.cast_unsigned();
        Ok(())
    }

    /// Remaining RPM budget: `None` when unlimited, zero for unknown or
    /// disabled tenants.
    pub fn rpm_remaining(&self, tenant_id: &str) -> Option<u64> {
        self.remaining(
            tenant_id,
            |config| config.rate_limit_rpm,
            |c| (c.rpm_window_start, c.rpm_count),
            RPM_WINDOW_SECONDS,
        )
    }

    /// Remaining TPD budget: `None` when unlimited, zero for unknown or
    /// disabled tenants.
    pub fn tpd_remaining(&self, tenant_id: &str) -> Option<u64> {
        self.remaining(
            tenant_id,
            |config| config.rate_limit_tpd,
            |c| (c.tpd_window_start, c.tpd_count),
            TPD_WINDOW_SECONDS,
        )
    }

    fn remaining(
        &self,
        tenant_id: &str,
        limit_of: impl Fn(&TenantConfig) -> u64,
        window_of: impl Fn(&Counters) -> (f64, u64),
        window_seconds: f64,
    ) -> Option<u64> {
        let Some(slot) = self.tenants.get(tenant_id) else {
            return Some(0);
        };
        if !slot.config.enabled {
            return Some(0);
        }
        let limit = limit_of(&slot.config);
        if limit == 0 {
            return None;
        }

        let now = self.clock.now();
        let counters = slot
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (window_start, count) = window_of(&counters);
        // A due-but-unapplied reset means the full budget is available.
        if now - window_start >= window_seconds {
            return Some(limit);
        }
        Some(limit.saturating_sub(count))
    }

    /// Look up a tenant record by id.
    pub fn get(&self, tenant_id: &str) -> Option<&TenantConfig> {
        self.tenants.get(tenant_id).map(|slot| &slot.config)
    }

    /// Snapshot of the tenant table. Mutating the returned map does not
    /// affect the registry.
    pub fn tenants(&self) -> HashMap<String, TenantConfig> {
        self.tenants
            .iter()
            .map(|(id, slot)| (id.clone(), slot.config.clone()))
            .collect()
    }

    /// Number of tenants in the registry.
    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    /// Whether the registry holds no tenants.
    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}
