//! Audit Sink (C2): append-only, daily-rotated JSON-lines audit log. See
//! §4.2.
//!
//! `log()` is non-blocking from the caller's perspective: events go onto a
//! bounded channel that a single background writer task drains. On queue
//! saturation, events are dropped and a single summary event is emitted at
//! most once per minute, so a slow disk never blocks biometric operations
//! (§5's "audit-sink queue enqueue (bounded, non-blocking)").

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::sync::mpsc;

use facegate_core::{AuditEvent, Error};

const DROP_SUMMARY_INTERVAL_SECS: i64 = 60;

/// Handle producers hold to enqueue events. Cloning is cheap.
#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<AuditEvent>,
    dropped: Arc<AtomicI64>,
    last_drop_summary: Arc<AtomicI64>,
}

impl AuditSink {
    /// Start the sink: spawns the background writer task and returns a
    /// handle. `redact_user_name` strips `user_name` from events before
    /// they're written (optional PII redaction).
    pub fn start(
        audit_dir: impl Into<PathBuf>,
        queue_capacity: usize,
        retention_days: u32,
        redact_user_name: bool,
    ) -> Result<Self, Error> {
        let audit_dir = audit_dir.into();
        std::fs::create_dir_all(&audit_dir)
            .map_err(|e| Error::Internal(anyhow::anyhow!("creating audit dir {audit_dir:?}: {e}")))?;

        let (tx, rx) = mpsc::channel(queue_capacity);
        tokio::spawn(writer_task(audit_dir, rx, retention_days, redact_user_name));

        Ok(AuditSink {
            tx,
            dropped: Arc::new(AtomicI64::new(0)),
            last_drop_summary: Arc::new(AtomicI64::new(0)),
        })
    }

    /// Enqueue an event. Never blocks: on a full queue the event is
    /// dropped and counted toward the next summary-drop event.
    pub fn log(&self, event: AuditEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) | Err(mpsc::error::TrySendError::Closed(_)) => {
                self.record_drop();
            }
        }
    }

    fn record_drop(&self) {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now().timestamp();
        let last = self.last_drop_summary.load(Ordering::Relaxed);
        if now - last >= DROP_SUMMARY_INTERVAL_SECS {
            self.last_drop_summary.store(now, Ordering::Relaxed);
            tracing::warn!(dropped_since_last_summary = total, "audit queue saturated; events dropped");
            // try_send here too: if the channel is genuinely gone this is a
            // best-effort notice and dropping it silently is acceptable.
            let _ = self.tx.try_send(summary_event(total));
            self.dropped.store(0, Ordering::Relaxed);
        }
    }
}

fn summary_event(dropped: i64) -> AuditEvent {
    AuditEvent {
        ts: Utc::now(),
        event_type: "audit_queue_saturated".to_string(),
        outcome: facegate_core::AuditOutcome::Denied,
        client_id: "system".to_string(),
        user_id: None,
        user_name: None,
        confidence_score: None,
        threshold: None,
        biometric_data: None,
        additional_info: Some(format!("{dropped} events dropped since last summary")),
        error_message: None,
    }
}

async fn writer_task(
    audit_dir: PathBuf,
    mut rx: mpsc::Receiver<AuditEvent>,
    retention_days: u32,
    redact_user_name: bool,
) {
    let mut current_date: Option<NaiveDate> = None;
    let mut file: Option<std::fs::File> = None;

    while let Some(mut event) = rx.recv().await {
        if redact_user_name {
            event.user_name = None;
        }

        let event_date = event.ts.date_naive();
        if current_date != Some(event_date) {
            if let Err(e) = rotate_old_files(&audit_dir, event_date, retention_days) {
                tracing::error!(error = %e, "audit log rotation failed");
            }
            match open_log_file(&audit_dir, event_date) {
                Ok(f) => {
                    file = Some(f);
                    current_date = Some(event_date);
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to open audit log file; event lost");
                    continue;
                }
            }
        }

        let Some(f) = file.as_mut() else { continue };
        match serde_json::to_string(&event) {
            Ok(line) => {
                if let Err(e) = writeln!(f, "{line}") {
                    tracing::error!(error = %e, "failed to write audit event");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize audit event"),
        }
    }
}

fn log_path_for(audit_dir: &Path, date: NaiveDate) -> PathBuf {
    audit_dir.join(format!("{}.log", date.format("%Y-%m-%d")))
}

fn open_log_file(audit_dir: &Path, date: NaiveDate) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path_for(audit_dir, date))
}

/// Gzip-compress any `.log` file older than `retention_days`, replacing it
/// with a `.log.gz` sibling. Called on every rotation so the retention
/// policy is enforced incrementally rather than needing a separate cron.
fn rotate_old_files(audit_dir: &Path, today: NaiveDate, retention_days: u32) -> std::io::Result<()> {
    let cutoff = today - chrono::Duration::days(retention_days as i64);
    for entry in std::fs::read_dir(audit_dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }
        let Ok(file_date) = NaiveDate::parse_from_str(name, "%Y-%m-%d") else {
            continue;
        };
        if file_date < cutoff {
            compress_and_remove(&path)?;
        }
    }
    Ok(())
}

fn compress_and_remove(path: &Path) -> std::io::Result<()> {
    let data = std::fs::read(path)?;
    let gz_path = path.with_extension("log.gz");
    let gz_file = std::fs::File::create(&gz_path)?;
    let mut encoder = GzEncoder::new(gz_file, Compression::default());
    encoder.write_all(&data)?;
    encoder.finish()?;
    std::fs::remove_file(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn sample_event(event_type: &str) -> AuditEvent {
        AuditEvent {
            ts: Utc::now(),
            event_type: event_type.to_string(),
            outcome: facegate_core::AuditOutcome::Success,
            client_id: "client-1".to_string(),
            user_id: Some("alice".to_string()),
            user_name: Some("Alice Smith".to_string()),
            confidence_score: Some(0.1),
            threshold: Some(0.35),
            biometric_data: None,
            additional_info: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn logged_event_lands_in_todays_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AuditSink::start(dir.path(), 16, 30, false).unwrap();
        sink.log(sample_event("recognize_face"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let today = Utc::now().date_naive();
        let contents = std::fs::read_to_string(log_path_for(dir.path(), today)).unwrap();
        assert!(contents.contains("recognize_face"));
        assert!(contents.contains("Alice Smith"));
        let _ = HashMap::<String, String>::new();
    }

    #[tokio::test]
    async fn redaction_strips_user_name() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AuditSink::start(dir.path(), 16, 30, true).unwrap();
        sink.log(sample_event("recognize_face"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let today = Utc::now().date_naive();
        let contents = std::fs::read_to_string(log_path_for(dir.path(), today)).unwrap();
        assert!(!contents.contains("Alice Smith"));
    }

    #[tokio::test]
    async fn never_carries_an_embedding_field() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AuditSink::start(dir.path(), 16, 30, false).unwrap();
        sink.log(sample_event("register_user"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let today = Utc::now().date_naive();
        let contents = std::fs::read_to_string(log_path_for(dir.path(), today)).unwrap();
        assert!(!contents.contains("embedding"));
    }

    #[test]
    fn rotate_old_files_compresses_past_retention() {
        let dir = tempfile::tempdir().unwrap();
        let old_date = Utc::now().date_naive() - chrono::Duration::days(40);
        let old_path = log_path_for(dir.path(), old_date);
        std::fs::write(&old_path, "{\"event_type\":\"x\"}\n").unwrap();

        rotate_old_files(dir.path(), Utc::now().date_naive(), 30).unwrap();

        assert!(!old_path.exists());
        assert!(old_path.with_extension("log.gz").exists());
    }
}
