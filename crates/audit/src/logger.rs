use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use tracing::warn;

use zeroveil_core::{LoggingSink, Policy, RetentionConfig};

use crate::event::AuditEvent;

/// Append-only audit sink with size-based rotation and retention pruning.
///
/// Writes are best-effort: rotation or I/O failures are reported through
/// `tracing` and never propagate to the request path. A single lock
/// serializes the rotation check and the write so concurrent events cannot
/// interleave bytes.
pub struct AuditLogger {
    sink: LoggingSink,
    path: Option<PathBuf>,
    retention: RetentionConfig,
    write_lock: Mutex<()>,
}

impl AuditLogger {
    /// Create a logger for the given sink.
    pub fn new(sink: LoggingSink, path: Option<PathBuf>, retention: RetentionConfig) -> Self {
        Self {
            sink,
            path,
            retention,
            write_lock: Mutex::new(()),
        }
    }

    /// Build the logger the loaded policy asks for.
    pub fn from_policy(policy: &Policy) -> Self {
        Self::new(
            policy.logging_sink,
            policy.logging_path.clone().map(PathBuf::from),
            policy.retention,
        )
    }

    /// Append one event to the sink as a single JSON line.
    pub fn log(&self, event: &AuditEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(error) => {
                warn!(%error, "failed to serialize audit event");
                return;
            }
        };

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match self.sink {
            LoggingSink::Stdout => {
                let mut out = std::io::stdout().lock();
                if let Err(error) = writeln!(out, "{line}") {
                    warn!(%error, "failed to write audit event to stdout");
                }
            }
            LoggingSink::Jsonl => {
                // A jsonl sink without a path is inert rather than an error.
                let Some(path) = self.path.clone() else {
                    return;
                };
                self.maybe_rotate(&path);
                if let Err(error) = append_line(&path, &line) {
                    warn!(%error, path = %path.display(), "failed to append audit event");
                }
            }
        }
    }

    /// Rotate the live log when it exceeds the size threshold, then prune
    /// rotated siblings.
    ///
    /// The rotation ladder renames `path.N` to `path.N+1` from the top down
    /// and moves the live file to `path.1`. Pruning runs on every call, even
    /// when the size gate is closed, so a shrunken `rotate_count` eventually
    /// catches up with files written under an older, larger config.
    fn maybe_rotate(&self, path: &Path) {
        let retention = self.retention;
        if retention.rotate_count > 0 && retention.max_size_mb > 0 {
            let threshold = retention.max_size_mb * 1_048_576;
            let over = std::fs::metadata(path).is_ok_and(|meta| meta.len() > threshold);
            if over {
                for i in (1..=retention.rotate_count).rev() {
                    let src = numbered(path, i);
                    if src.exists()
                        && let Err(error) = std::fs::rename(&src, numbered(path, i + 1))
                    {
                        warn!(%error, from = %src.display(), "audit rotation rename failed");
                    }
                }
                if let Err(error) = std::fs::rename(path, numbered(path, 1)) {
                    warn!(%error, path = %path.display(), "audit rotation failed");
                }
            }
        }
        self.prune_siblings(path);
    }

    /// Delete rotated siblings with an index beyond `rotate_count` and, when
    /// age-based retention is on, rotated siblings older than the cutoff.
    fn prune_siblings(&self, path: &Path) {
        let Some(dir) = path.parent() else { return };
        let Some(base) = path.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };

        let now = SystemTime::now();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(index) = rotated_index(base, name) else {
                continue;
            };

            let stale = index > self.retention.rotate_count
                || entry
                    .metadata()
                    .and_then(|meta| meta.modified())
                    .is_ok_and(|mtime| is_expired(mtime, now, self.retention.max_age_days));
            if stale && let Err(error) = std::fs::remove_file(entry.path()) {
                warn!(%error, file = %entry.path().display(), "audit retention prune failed");
            }
        }
    }
}

/// `path` with a numeric rotation suffix appended (`audit.jsonl.3`).
fn numbered(path: &Path, index: u32) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

/// Parse the rotation index out of a sibling file name, if it is one.
fn rotated_index(base: &str, name: &str) -> Option<u32> {
    name.strip_prefix(base)?
        .strip_prefix('.')?
        .parse::<u32>()
        .ok()
}

/// Whether a rotated file's mtime is past the age cutoff.
fn is_expired(mtime: SystemTime, now: SystemTime, max_age_days: u64) -> bool {
    if max_age_days == 0 {
        return false;
    }
    let cutoff = Duration::from_secs(max_age_days * 86_400);
    now.duration_since(mtime).is_ok_and(|age| age > cutoff)
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().append(true).create(true).open(path)?;
    writeln!(file, "{line}")
}
