use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use zeroveil_audit::AuditLogger;
use zeroveil_core::{LoggingSink, Policy, RetentionConfig};
use zeroveil_provider::{FailingUpstream, MockUpstream, UpstreamProvider};
use zeroveil_server::api::{self, AppState};
use zeroveil_server::config::AuthMode;
use zeroveil_server::pipeline::RequestPipeline;
use zeroveil_server::tenants::{TenantConfig, TenantRegistry, sha256_hex};

// -- Helpers --------------------------------------------------------------

fn policy_value(allowed_models: Value, max_chars: u64) -> Value {
    json!({
        "version": "0",
        "enforce_zdr_only": true,
        "require_scrubbed_attestation": true,
        "allowed_providers": ["mock"],
        "allowed_models": allowed_models,
        "limits": {"max_messages": 50, "max_chars_per_message": max_chars},
        "logging": {"mode": "metadata_only", "sink": "stdout"},
    })
}

fn test_policy() -> Policy {
    Policy::from_value(&policy_value(json!(["*"]), 16_000)).unwrap()
}

fn open_registry() -> TenantRegistry {
    TenantRegistry::new(vec![
        TenantConfig::new("default", Vec::new(), 0, 0, true).unwrap(),
    ])
}

struct AppBuilder {
    policy: Policy,
    registry: TenantRegistry,
    auth_mode: AuthMode,
    upstream: Arc<dyn UpstreamProvider>,
    audit_path: Option<PathBuf>,
}

impl AppBuilder {
    fn new() -> Self {
        Self {
            policy: test_policy(),
            registry: open_registry(),
            auth_mode: AuthMode::Open,
            upstream: Arc::new(MockUpstream::completing()),
            audit_path: None,
        }
    }

    fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    fn registry(mut self, registry: TenantRegistry) -> Self {
        self.registry = registry;
        self.auth_mode = AuthMode::Registry;
        self
    }

    fn upstream(mut self, upstream: Arc<dyn UpstreamProvider>) -> Self {
        self.upstream = upstream;
        self
    }

    fn audit_to(mut self, path: &Path) -> Self {
        self.audit_path = Some(path.to_path_buf());
        self
    }

    fn build(self) -> axum::Router {
        let audit = match self.audit_path {
            Some(path) => AuditLogger::new(
                LoggingSink::Jsonl,
                Some(path),
                RetentionConfig::default(),
            ),
            None => AuditLogger::new(LoggingSink::Stdout, None, RetentionConfig::default()),
        };
        let policy = Arc::new(self.policy);
        let pipeline = Arc::new(RequestPipeline::new(
            Arc::clone(&policy),
            Arc::new(self.registry),
            self.auth_mode,
            self.upstream,
            Arc::new(audit),
        ));
        api::router(AppState { pipeline, policy })
    }
}

async fn post_chat(app: &axum::Router, bearer: Option<&str>, body: &Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn scrubbed_body(messages: Value) -> Value {
    json!({"messages": messages, "metadata": {"scrubbed": true}})
}

fn audit_lines(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// -- Validation scenarios -------------------------------------------------

#[tokio::test]
async fn invalid_role_rejected_with_localized_details() {
    let app = AppBuilder::new().build();
    let (status, body) = post_chat(
        &app,
        None,
        &scrubbed_body(json!([{"role": "bad_role", "content": "hi"}])),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
    assert_eq!(
        body["error"]["details"],
        json!({
            "field": "messages[0].role",
            "value": "bad_role",
            "allowed": ["system", "user", "assistant", "tool", "function"],
        })
    );
}

#[tokio::test]
async fn all_valid_roles_accepted() {
    let app = AppBuilder::new().build();
    for role in ["system", "user", "assistant", "tool", "function"] {
        let (status, body) = post_chat(
            &app,
            None,
            &scrubbed_body(json!([{"role": role, "content": "hi"}])),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{role}: {body}");
    }
}

#[tokio::test]
async fn multiple_invalid_roles_reports_first() {
    let app = AppBuilder::new().build();
    let (status, body) = post_chat(
        &app,
        None,
        &scrubbed_body(json!([
            {"role": "bad1", "content": "hi"},
            {"role": "bad2", "content": "there"},
        ])),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"]["field"], "messages[0].role");
    assert_eq!(body["error"]["details"]["value"], "bad1");
}

#[tokio::test]
async fn nul_byte_in_content_rejected() {
    let app = AppBuilder::new().build();
    let (status, body) = post_chat(
        &app,
        None,
        &scrubbed_body(json!([{"role": "user", "content": "hi\u{0}there"}])),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
    assert_eq!(
        body["error"]["details"],
        json!({"field": "messages[0].content"})
    );
}

#[tokio::test]
async fn null_content_rejected() {
    let app = AppBuilder::new().build();
    let (status, body) = post_chat(
        &app,
        None,
        &scrubbed_body(json!([{"role": "user", "content": null}])),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["details"],
        json!({"field": "messages[0].content"})
    );
}

#[tokio::test]
async fn empty_messages_list_rejected() {
    let app = AppBuilder::new().build();
    let (status, body) = post_chat(&app, None, &scrubbed_body(json!([]))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("messages must be non-empty")
    );
}

#[tokio::test]
async fn malformed_json_gets_error_envelope() {
    let app = AppBuilder::new().build();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "invalid_request");
}

// -- Policy scenarios -----------------------------------------------------

#[tokio::test]
async fn blocked_model_denied_with_allowlist_details() {
    let policy = Policy::from_value(&policy_value(json!(["allowed-model"]), 16_000)).unwrap();
    let app = AppBuilder::new().policy(policy).build();

    let mut body = scrubbed_body(json!([{"role": "user", "content": "hi"}]));
    body["model"] = json!("blocked-model");
    let (status, response) = post_chat(&app, None, &body).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["error"]["code"], "policy_denied");
    assert_eq!(
        response["error"]["details"],
        json!({
            "field": "model",
            "value": "blocked-model",
            "allowed": ["allowed-model"],
        })
    );
}

#[tokio::test]
async fn wildcard_allows_any_model() {
    let app = AppBuilder::new().build();
    let mut body = scrubbed_body(json!([{"role": "user", "content": "hi"}]));
    body["model"] = json!("any-model-name");
    let (status, _) = post_chat(&app, None, &body).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn absent_model_accepted_with_restricted_allowlist() {
    let policy = Policy::from_value(&policy_value(json!(["specific-model"]), 16_000)).unwrap();
    let app = AppBuilder::new().policy(policy).build();
    let (status, _) = post_chat(
        &app,
        None,
        &scrubbed_body(json!([{"role": "user", "content": "hi"}])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn zdr_only_false_rejected_when_enforced() {
    let app = AppBuilder::new().build();
    let mut body = scrubbed_body(json!([{"role": "user", "content": "hi"}]));
    body["zdr_only"] = json!(false);
    let (status, response) = post_chat(&app, None, &body).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["error"]["code"], "policy_denied");
    assert_eq!(response["error"]["details"]["field"], "zdr_only");
}

#[tokio::test]
async fn missing_scrubbed_attestation_rejected() {
    let app = AppBuilder::new().build();
    let (status, response) = post_chat(
        &app,
        None,
        &json!({"messages": [{"role": "user", "content": "hi"}]}),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["error"]["details"]["field"], "metadata.scrubbed");
}

#[tokio::test]
async fn oversized_message_reports_index_and_limit() {
    let policy = Policy::from_value(&policy_value(json!(["*"]), 5)).unwrap();
    let app = AppBuilder::new().policy(policy).build();
    let (status, response) = post_chat(
        &app,
        None,
        &scrubbed_body(json!([
            {"role": "user", "content": "ok"},
            {"role": "user", "content": "this is too long"},
        ])),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["error"]["code"], "policy_denied");
    assert_eq!(response["error"]["details"]["index"], 1);
    assert_eq!(response["error"]["details"]["limit"], 5);
}

// -- Authentication and rate limiting -------------------------------------

#[tokio::test]
async fn legacy_open_mode_requires_no_auth() {
    let app = AppBuilder::new().build();
    let (status, _) = post_chat(
        &app,
        None,
        &scrubbed_body(json!([{"role": "user", "content": "hi"}])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn registry_mode_rejects_missing_and_wrong_bearer() {
    let registry = TenantRegistry::new(vec![
        TenantConfig::new("t1", vec![sha256_hex("good-key")], 0, 0, true).unwrap(),
    ]);
    let app = AppBuilder::new().registry(registry).build();
    let body = scrubbed_body(json!([{"role": "user", "content": "hi"}]));

    let (status, response) = post_chat(&app, None, &body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"]["code"], "unauthorized");

    let (status, _) = post_chat(&app, Some("wrong-key"), &body).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post_chat(&app, Some("good-key"), &body).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn disabled_tenant_cannot_authenticate() {
    let registry = TenantRegistry::new(vec![
        TenantConfig::new("off", vec![sha256_hex("key")], 0, 0, false).unwrap(),
    ]);
    let app = AppBuilder::new().registry(registry).build();
    let (status, _) = post_chat(
        &app,
        Some("key"),
        &scrubbed_body(json!([{"role": "user", "content": "hi"}])),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn exhausted_rpm_budget_returns_429_with_remaining() {
    let registry = TenantRegistry::new(vec![
        TenantConfig::new("t1", vec![sha256_hex("key")], 1, 0, true).unwrap(),
    ]);
    let app = AppBuilder::new().registry(registry).build();
    let body = scrubbed_body(json!([{"role": "user", "content": "hi"}]));

    let (status, _) = post_chat(&app, Some("key"), &body).await;
    assert_eq!(status, StatusCode::OK);

    let (status, response) = post_chat(&app, Some("key"), &body).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response["error"]["code"], "rate_limited");
    assert_eq!(response["error"]["details"]["rpm_remaining"], 0);
    // TPD is unlimited for this tenant, reported as null.
    assert!(response["error"]["details"]["tpd_remaining"].is_null());
}

#[tokio::test]
async fn recorded_usage_exhausts_daily_token_budget() {
    let registry = TenantRegistry::new(vec![
        TenantConfig::new("t1", vec![sha256_hex("key")], 0, 10, true).unwrap(),
    ]);
    let app = AppBuilder::new()
        .registry(registry)
        .upstream(Arc::new(MockUpstream::with_usage(7, 3)))
        .build();
    let body = scrubbed_body(json!([{"role": "user", "content": "hi"}]));

    // First request is admitted and burns the full 10-token budget.
    let (status, _) = post_chat(&app, Some("key"), &body).await;
    assert_eq!(status, StatusCode::OK);

    let (status, response) = post_chat(&app, Some("key"), &body).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response["error"]["details"]["tpd_remaining"], 0);
    assert!(response["error"]["details"]["rpm_remaining"].is_null());
}

#[tokio::test]
async fn unauthorized_deny_audited_with_null_tenant() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let registry = TenantRegistry::new(vec![
        TenantConfig::new("t1", vec![sha256_hex("key")], 0, 0, true).unwrap(),
    ]);
    let app = AppBuilder::new()
        .registry(registry)
        .audit_to(&audit_path)
        .build();

    let (status, _) = post_chat(
        &app,
        Some("wrong"),
        &scrubbed_body(json!([{"role": "user", "content": "hi"}])),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let lines = audit_lines(&audit_path);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["action"], "deny");
    assert_eq!(lines[0]["reason"], "unauthorized");
    assert!(lines[0]["tenant_id"].is_null());
}

// -- Upstream failures ----------------------------------------------------

#[tokio::test]
async fn upstream_error_maps_to_502() {
    let app = AppBuilder::new()
        .upstream(Arc::new(FailingUpstream::erroring()))
        .build();
    let (status, response) = post_chat(
        &app,
        None,
        &scrubbed_body(json!([{"role": "user", "content": "hi"}])),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(response["error"]["code"], "upstream_error");
}

#[tokio::test]
async fn upstream_timeout_audited_as_upstream_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let app = AppBuilder::new()
        .upstream(Arc::new(FailingUpstream::timing_out()))
        .audit_to(&audit_path)
        .build();

    let (status, _) = post_chat(
        &app,
        None,
        &scrubbed_body(json!([{"role": "user", "content": "hi"}])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let lines = audit_lines(&audit_path);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["action"], "deny");
    assert_eq!(lines[0]["reason"], "upstream_timeout");
}

// -- Audit regression: no content ever reaches the sink -------------------

#[tokio::test]
async fn allow_audit_never_contains_message_content() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let app = AppBuilder::new().audit_to(&audit_path).build();

    let secret_marker = "SECRET_PII_12345";
    let mut body = scrubbed_body(json!([{"role": "user", "content": secret_marker}]));
    body["zdr_only"] = json!(true);
    let (status, _) = post_chat(&app, None, &body).await;
    assert_eq!(status, StatusCode::OK);

    let raw = std::fs::read_to_string(&audit_path).unwrap();
    assert!(!raw.is_empty(), "expected at least one audit line");
    assert!(!raw.contains(secret_marker));

    let lines = audit_lines(&audit_path);
    assert_eq!(lines[0]["action"], "allow");
    assert_eq!(lines[0]["reason"], "ok");
    assert_eq!(lines[0]["tokens_prompt"], 9);
    assert_eq!(lines[0]["tokens_completion"], 12);
    assert_eq!(lines[0]["message_count"], 1);
}

#[tokio::test]
async fn deny_audit_records_metadata_but_not_content() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let policy = Policy::from_value(&policy_value(json!(["allowed-only"]), 16_000)).unwrap();
    let app = AppBuilder::new().policy(policy).audit_to(&audit_path).build();

    let secret_content = "DENY_SECRET_XYZ_99887";
    let mut body = scrubbed_body(json!([{"role": "user", "content": secret_content}]));
    body["model"] = json!("blocked-model");
    body["zdr_only"] = json!(true);
    let (status, _) = post_chat(&app, None, &body).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let lines = audit_lines(&audit_path);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["action"], "deny");
    assert_eq!(lines[0]["reason"], "policy_denied");
    // The model name is metadata and may be logged; content may not.
    assert_eq!(lines[0]["model"], "blocked-model");
    assert!(!lines[0].to_string().contains(secret_content));
}

#[tokio::test]
async fn every_audit_line_starts_with_schema_version() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let app = AppBuilder::new().audit_to(&audit_path).build();

    let ok = scrubbed_body(json!([{"role": "user", "content": "hi"}]));
    let bad = scrubbed_body(json!([{"role": "bad", "content": "hi"}]));
    post_chat(&app, None, &ok).await;
    post_chat(&app, None, &bad).await;

    let raw = std::fs::read_to_string(&audit_path).unwrap();
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        assert!(line.starts_with("{\"schema_version\":"), "{line}");
    }
}

#[tokio::test]
async fn request_ids_carry_the_zv_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let app = AppBuilder::new().audit_to(&audit_path).build();

    post_chat(
        &app,
        None,
        &scrubbed_body(json!([{"role": "user", "content": "hi"}])),
    )
    .await;

    let lines = audit_lines(&audit_path);
    assert!(
        lines[0]["request_id"]
            .as_str()
            .unwrap()
            .starts_with("zv_")
    );
}

// -- Misc surfaces --------------------------------------------------------

#[tokio::test]
async fn health_reports_policy_version() {
    let app = AppBuilder::new().build();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["policy_version"], "0");
}

#[tokio::test]
async fn success_passes_upstream_body_through() {
    let app = AppBuilder::new()
        .upstream(Arc::new(MockUpstream::with_body(json!({
            "id": "cmpl-xyz",
            "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4},
        }))))
        .build();

    let (status, body) = post_chat(
        &app,
        None,
        &scrubbed_body(json!([{"role": "user", "content": "hi"}])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "cmpl-xyz");
    assert_eq!(body["choices"][0]["message"]["content"], "hello");
}
