use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while loading or validating the policy file.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The policy file does not exist.
    #[error("policy file not found: {0}")]
    NotFound(String),

    /// The policy file could not be read.
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    /// The policy file is not valid JSON.
    #[error("policy file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The policy document violates a structural constraint.
    #[error("invalid policy: {0}")]
    Invalid(String),
}

/// Audit log redaction mode. Only metadata-only logging is supported; the
/// variant exists so the config surface stays explicit about what is being
/// promised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggingMode {
    /// Record counts and attested flags only, never message content.
    MetadataOnly,
}

/// Where audit events are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggingSink {
    /// One JSON line per event on standard output.
    Stdout,
    /// Append-only JSON-lines file with rotation.
    Jsonl,
}

/// Rotation and pruning knobs for the jsonl sink. A zero on any axis
/// disables that axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Rotate the live log once it exceeds this many MiB.
    pub max_size_mb: u64,
    /// Delete rotated files older than this many days.
    pub max_age_days: u64,
    /// How many rotated files to keep (`path.1` .. `path.N`).
    pub rotate_count: u32,
}

/// Immutable gateway policy, loaded once from JSON at startup.
#[derive(Debug, Clone, Serialize)]
pub struct Policy {
    /// Free-form version tag carried into diagnostics.
    pub version: String,
    /// Require `zdr_only` to be attested true on every request.
    pub enforce_zdr_only: bool,
    /// Require `metadata.scrubbed` to be attested true on every request.
    pub require_scrubbed_attestation: bool,
    /// Upstream providers the gateway may forward to. Never empty.
    pub allowed_providers: Vec<String>,
    /// Model allowlist; `["*"]` admits any model.
    pub allowed_models: Vec<String>,
    /// Maximum number of messages per request.
    pub max_messages: usize,
    /// Maximum characters in a single message's content.
    pub max_chars_per_message: usize,
    /// Audit redaction mode.
    pub logging_mode: LoggingMode,
    /// Audit sink selection.
    pub logging_sink: LoggingSink,
    /// Audit file path; present iff the sink is jsonl.
    pub logging_path: Option<String>,
    /// Rotation and pruning configuration for the jsonl sink.
    pub retention: RetentionConfig,
}

const DEFAULT_MAX_MESSAGES: u64 = 50;
const DEFAULT_MAX_CHARS_PER_MESSAGE: u64 = 16_000;

impl Policy {
    /// Load and validate a policy from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PolicyError::NotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&contents)?;
        Self::from_value(&value)
    }

    /// Validate a parsed policy document.
    ///
    /// Parsing goes through `serde_json::Value` rather than a derived
    /// deserializer so rejection messages name the offending policy field.
    pub fn from_value(value: &Value) -> Result<Self, PolicyError> {
        let root = value
            .as_object()
            .ok_or_else(|| PolicyError::Invalid("policy root must be a JSON object".to_owned()))?;

        let version = root
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("0")
            .to_owned();

        let enforce_zdr_only = get_bool(root, "enforce_zdr_only", true)?;
        let require_scrubbed_attestation = get_bool(root, "require_scrubbed_attestation", true)?;

        let allowed_providers = get_string_list(root, "allowed_providers")?;
        if allowed_providers.is_empty() {
            return Err(PolicyError::Invalid(
                "allowed_providers must be non-empty".to_owned(),
            ));
        }

        let allowed_models = match root.get("allowed_models") {
            None | Some(Value::Null) => vec!["*".to_owned()],
            Some(_) => get_string_list(root, "allowed_models")?,
        };

        let limits = get_section(root, "limits")?;
        let max_messages = get_limit(&limits, "max_messages", DEFAULT_MAX_MESSAGES)?;
        let max_chars_per_message =
            get_limit(&limits, "max_chars_per_message", DEFAULT_MAX_CHARS_PER_MESSAGE)?;

        let logging = get_section(root, "logging")?;
        let logging_mode = match logging.get("mode").and_then(Value::as_str) {
            None | Some("metadata_only") => LoggingMode::MetadataOnly,
            Some(other) => {
                return Err(PolicyError::Invalid(format!(
                    "Unsupported logging.mode: {other}"
                )));
            }
        };
        let logging_sink = match logging.get("sink").and_then(Value::as_str) {
            None | Some("stdout") => LoggingSink::Stdout,
            Some("jsonl") => LoggingSink::Jsonl,
            Some(other) => {
                return Err(PolicyError::Invalid(format!(
                    "Unsupported logging.sink: {other}"
                )));
            }
        };
        let logging_path = logging
            .get("path")
            .and_then(Value::as_str)
            .map(str::to_owned);
        if logging_sink == LoggingSink::Jsonl && logging_path.is_none() {
            return Err(PolicyError::Invalid(
                "logging.path required when logging.sink is jsonl".to_owned(),
            ));
        }

        let retention_section = match logging.get("retention") {
            None | Some(Value::Null) => serde_json::Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(PolicyError::Invalid(
                    "logging.retention must be an object".to_owned(),
                ));
            }
        };
        let retention = RetentionConfig {
            max_size_mb: get_retention(&retention_section, "max_size_mb")?,
            max_age_days: get_retention(&retention_section, "max_age_days")?,
            rotate_count: u32::try_from(get_retention(&retention_section, "rotate_count")?)
                .map_err(|_| PolicyError::Invalid("rotate_count out of range".to_owned()))?,
        };

        Ok(Self {
            version,
            enforce_zdr_only,
            require_scrubbed_attestation,
            allowed_providers,
            allowed_models,
            max_messages,
            max_chars_per_message,
            logging_mode,
            logging_sink,
            logging_path,
            retention,
        })
    }

    /// Whether the allowlist admits the given model.
    pub fn allows_model(&self, model: &str) -> bool {
        self.is_model_wildcard() || self.allowed_models.iter().any(|m| m == model)
    }

    /// Whether the model allowlist is the wildcard `["*"]`.
    pub fn is_model_wildcard(&self) -> bool {
        self.allowed_models.len() == 1 && self.allowed_models[0] == "*"
    }
}

fn get_bool(
    root: &serde_json::Map<String, Value>,
    key: &str,
    default: bool,
) -> Result<bool, PolicyError> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(PolicyError::Invalid(format!("{key} must be a bool"))),
    }
}

fn get_string_list(
    root: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Vec<String>, PolicyError> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| PolicyError::Invalid(format!("{key} must contain strings")))
            })
            .collect(),
        Some(_) => Err(PolicyError::Invalid(format!("{key} must be a list"))),
    }
}

fn get_section(
    root: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<serde_json::Map<String, Value>, PolicyError> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(serde_json::Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(PolicyError::Invalid(format!("{key} must be an object"))),
    }
}

fn get_limit(
    section: &serde_json::Map<String, Value>,
    key: &str,
    default: u64,
) -> Result<usize, PolicyError> {
    let raw = match section.get(key) {
        None | Some(Value::Null) => default,
        Some(value) => {
            let n = value
                .as_i64()
                .ok_or_else(|| PolicyError::Invalid(format!("{key} must be an int")))?;
            if n <= 0 {
                return Err(PolicyError::Invalid(format!("{key} must be positive")));
            }
            n.cast_unsigned()
        }
    };
    usize::try_from(raw).map_err(|_| PolicyError::Invalid(format!("{key} out of range")))
}

fn get_retention(
    section: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<u64, PolicyError> {
    match section.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => {
            let n = value
                .as_i64()
                .ok_or_else(|| PolicyError::Invalid(format!("{key} must be an int")))?;
            if n < 0 {
                return Err(PolicyError::Invalid(format!("{key} must be >= 0")));
            }
            Ok(n.cast_unsigned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "version": "0",
            "allowed_providers": ["openrouter"],
            "logging": {"mode": "metadata_only", "sink": "stdout"},
        })
    }

    #[test]
    fn defaults_applied_for_optional_fields() {
        let policy = Policy::from_value(&minimal()).unwrap();
        assert!(policy.enforce_zdr_only);
        assert!(policy.require_scrubbed_attestation);
        assert_eq!(policy.allowed_models, vec!["*"]);
        assert_eq!(policy.max_messages, 50);
        assert_eq!(policy.max_chars_per_message, 16_000);
        assert_eq!(policy.retention, RetentionConfig::default());
        assert!(policy.is_model_wildcard());
    }

    #[test]
    fn rejects_missing_allowed_providers() {
        let err = Policy::from_value(&json!({
            "logging": {"mode": "metadata_only", "sink": "stdout"},
        }))
        .unwrap_err();
        assert!(
            err.to_string().contains("allowed_providers must be non-empty"),
            "{err}"
        );
    }

    #[test]
    fn rejects_empty_allowed_providers() {
        let err = Policy::from_value(&json!({
            "allowed_providers": [],
            "logging": {"mode": "metadata_only", "sink": "stdout"},
        }))
        .unwrap_err();
        assert!(err.to_string().contains("allowed_providers must be non-empty"));
    }

    #[test]
    fn rejects_unsupported_logging_mode() {
        let err = Policy::from_value(&json!({
            "allowed_providers": ["openrouter"],
            "logging": {"mode": "content", "sink": "stdout"},
        }))
        .unwrap_err();
        assert!(err.to_string().contains("Unsupported logging.mode"), "{err}");
    }

    #[test]
    fn rejects_unsupported_logging_sink() {
        let err = Policy::from_value(&json!({
            "allowed_providers": ["openrouter"],
            "logging": {"mode": "metadata_only", "sink": "invalid_sink"},
        }))
        .unwrap_err();
        assert!(err.to_string().contains("Unsupported logging.sink"), "{err}");
    }

    #[test]
    fn jsonl_sink_requires_path() {
        let err = Policy::from_value(&json!({
            "allowed_providers": ["openrouter"],
            "logging": {"mode": "metadata_only", "sink": "jsonl"},
        }))
        .unwrap_err();
        assert!(err.to_string().contains("logging.path required"), "{err}");
    }

    #[test]
    fn rejects_negative_retention_fields() {
        for (key, expected) in [
            ("max_size_mb", "max_size_mb must be >= 0"),
            ("max_age_days", "max_age_days must be >= 0"),
            ("rotate_count", "rotate_count must be >= 0"),
        ] {
            let err = Policy::from_value(&json!({
                "allowed_providers": ["openrouter"],
                "logging": {
                    "mode": "metadata_only",
                    "sink": "jsonl",
                    "path": "/tmp/audit.jsonl",
                    "retention": {key: -1},
                },
            }))
            .unwrap_err();
            assert!(err.to_string().contains(expected), "{key}: {err}");
        }
    }

    #[test]
    fn rejects_non_object_root() {
        let err = Policy::from_value(&json!(["not", "a", "dict"])).unwrap_err();
        assert!(err.to_string().contains("must be a JSON object"), "{err}");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Policy::load("/nonexistent/path/to/policy.json").unwrap_err();
        assert!(matches!(err, PolicyError::NotFound(_)));
    }

    #[test]
    fn load_reports_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not valid json").unwrap();
        let err = Policy::load(&path).unwrap_err();
        assert!(matches!(err, PolicyError::Parse(_)));
    }

    #[test]
    fn nested_limits_and_retention_parsed() {
        let policy = Policy::from_value(&json!({
            "allowed_providers": ["openrouter"],
            "allowed_models": ["gpt-4"],
            "limits": {"max_messages": 10, "max_chars_per_message": 100},
            "logging": {
                "mode": "metadata_only",
                "sink": "jsonl",
                "path": "/var/log/zeroveil/audit.jsonl",
                "retention": {"max_size_mb": 64, "max_age_days": 30, "rotate_count": 5},
            },
        }))
        .unwrap();
        assert_eq!(policy.max_messages, 10);
        assert_eq!(policy.max_chars_per_message, 100);
        assert_eq!(policy.logging_sink, LoggingSink::Jsonl);
        assert_eq!(
            policy.logging_path.as_deref(),
            Some("/var/log/zeroveil/audit.jsonl")
        );
        assert_eq!(policy.retention.max_size_mb, 64);
        assert_eq!(policy.retention.max_age_days, 30);
        assert_eq!(policy.retention.rotate_count, 5);
        assert!(policy.allows_model("gpt-4"));
        assert!(!policy.allows_model("other"));
    }
}
