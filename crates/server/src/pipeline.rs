use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use zeroveil_audit::{AuditAction, AuditEvent, AuditLogger};
use zeroveil_core::{ChatRequest, GatewayError, Policy, enforce, validate_shape};
use zeroveil_provider::UpstreamProvider;

use crate::config::AuthMode;
use crate::tenants::TenantRegistry;

/// Per-request transport metadata the HTTP layer hands to the pipeline.
#[derive(Debug, Default, Clone)]
pub struct RequestContext {
    /// Bearer token from the `Authorization` header, if any.
    pub bearer: Option<String>,
    /// Connecting client address, when known.
    pub client_ip: Option<String>,
    /// Client `User-Agent` header, when present.
    pub user_agent: Option<String>,
}

/// The enforcement pipeline: authenticate, rate-gate, validate, enforce,
/// forward, record usage, audit.
///
/// One instance is built at startup and shared by all request handlers.
/// Every request that enters produces exactly one audit event, either a
/// deny at the failing gate or an allow once the upstream reply is in hand.
pub struct RequestPipeline {
    policy: Arc<Policy>,
    registry: Arc<TenantRegistry>,
    auth_mode: AuthMode,
    upstream: Arc<dyn UpstreamProvider>,
    audit: Arc<AuditLogger>,
}

impl RequestPipeline {
    pub fn new(
        policy: Arc<Policy>,
        registry: Arc<TenantRegistry>,
        auth_mode: AuthMode,
        upstream: Arc<dyn UpstreamProvider>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            policy,
            registry,
            auth_mode,
            upstream,
            audit,
        }
    }

    /// Run one request through every gate and return the upstream body.
    pub async fn handle(
        &self,
        body: Value,
        ctx: &RequestContext,
    ) -> Result<Value, GatewayError> {
        let started = Instant::now();
        let request_id = format!("zv_{}", Uuid::new_v4().simple());

        // Authentication gate.
        let tenant_id = if self.auth_mode.requires_auth() {
            let token = ctx.bearer.as_deref().unwrap_or_default();
            match self.registry.authenticate(token) {
                Some(tenant) => tenant.tenant_id.clone(),
                None => {
                    let err = GatewayError::unauthorized("Invalid or missing API key");
                    self.deny(&request_id, None, "unauthorized", ctx, None, started);
                    return Err(err);
                }
            }
        } else {
            "default".to_owned()
        };

        // Rate gate. The RPM budget is consumed here and never refunded,
        // even if the client disconnects before the response.
        if !self.registry.check_rate_limit(&tenant_id) {
            let err = GatewayError::rate_limited(
                "Rate limit exceeded",
                serde_json::json!({
                    "rpm_remaining": self.registry.rpm_remaining(&tenant_id),
                    "tpd_remaining": self.registry.tpd_remaining(&tenant_id),
                }),
            );
            self.deny(&request_id, Some(tenant_id.as_str()), "rate_limited", ctx, None, started);
            return Err(err);
        }

        // Strict parse: any shape mismatch is an invalid_request, reported
        // without echoing body values.
        let request: ChatRequest = match serde_json::from_value(body) {
            Ok(request) => request,
            Err(_) => {
                let err = GatewayError::invalid_request(
                    "malformed request body",
                    serde_json::json!({}),
                );
                self.deny(&request_id, Some(tenant_id.as_str()), "invalid_request", ctx, None, started);
                return Err(err);
            }
        };

        // Shape validation, then policy enforcement; together they form the
        // fixed first-failure-wins check order.
        if let Err(err) = validate_shape(&request).and_then(|()| enforce(&self.policy, &request)) {
            self.deny(
                &request_id,
                Some(tenant_id.as_str()),
                err.code.as_str(),
                ctx,
                Some(&request),
                started,
            );
            return Err(err);
        }

        // Forward upstream.
        let response = match self.upstream.forward(&request).await {
            Ok(response) => response,
            Err(upstream_err) => {
                let reason = if upstream_err.is_timeout() {
                    "upstream_timeout"
                } else {
                    "upstream_error"
                };
                self.deny(
                    &request_id,
                    Some(tenant_id.as_str()),
                    reason,
                    ctx,
                    Some(&request),
                    started,
                );
                return Err(GatewayError::upstream(upstream_err.to_string()));
            }
        };

        // Charge consumed tokens against the daily budget.
        if let Some(usage) = response.usage
            && let Err(error) = self
                .registry
                .record_usage(&tenant_id, usage.total().cast_signed())
        {
            warn!(%error, %tenant_id, "failed to record token usage");
        }

        // Allow event, the one audit record for this request.
        let mut event = self.base_event(&request_id, Some(tenant_id.as_str()), AuditAction::Allow, "ok", ctx);
        annotate(&mut event, &request);
        if let Some(usage) = response.usage {
            event.tokens_prompt = Some(usage.prompt_tokens);
            event.tokens_completion = Some(usage.completion_tokens);
        }
        event.latency_ms = Some(elapsed_ms(started));
        self.audit.log(&event);

        debug!(%request_id, %tenant_id, "request forwarded upstream");
        Ok(response.body)
    }

    /// Emit the single deny event for a failed request.
    fn deny(
        &self,
        request_id: &str,
        tenant_id: Option<&str>,
        reason: &str,
        ctx: &RequestContext,
        request: Option<&ChatRequest>,
        started: Instant,
    ) {
        let mut event = self.base_event(
            request_id,
            tenant_id,
            AuditAction::Deny,
            reason,
            ctx,
        );
        if let Some(request) = request {
            annotate(&mut event, request);
        }
        event.latency_ms = Some(elapsed_ms(started));
        self.audit.log(&event);
    }

    fn base_event(
        &self,
        request_id: &str,
        tenant_id: Option<&str>,
        action: AuditAction,
        reason: &str,
        ctx: &RequestContext,
    ) -> AuditEvent {
        let mut event = AuditEvent::now(
            request_id,
            tenant_id.map(str::to_owned),
            action,
            reason,
        );
        event.client_ip = ctx.client_ip.clone();
        event.user_agent = ctx.user_agent.clone();
        event.provider = Some(self.upstream.name().to_owned());
        event
    }
}

/// Copy request metadata into an event: counts and attested flags only,
/// never content.
fn annotate(event: &mut AuditEvent, request: &ChatRequest) {
    event.model = request.model.clone();
    event.message_count = Some(request.message_count());
    event.total_chars = Some(request.total_chars());
    event.zdr_only = Some(request.zdr_attested());
    event.scrubbed_attested = Some(request.scrubbed_attested());
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
