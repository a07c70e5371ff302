//! Best-effort side channel for validated generations.
//!
//! Every accepted chunk can be recorded as a (system, prompt, response) pair for
//! later fine-tuning. Failures here are logged and swallowed by the caller; they
//! never affect the chunk or the run.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::artifacts::write_document;
use crate::domain::OutputFormat;
use crate::error::{GenerationError, GenerationResult};

/// One append-only generation log entry.
#[derive(Clone, Debug, Serialize)]
pub struct AuditRecord {
    pub system: String,
    pub prompt: String,
    pub response: String,
    pub exam: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> GenerationResult<()>;
}

/// Sink used when generation logging is disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn record(&self, _record: &AuditRecord) -> GenerationResult<()> {
        Ok(())
    }
}

/// Appends one JSON object per line to a local file.
pub struct JsonlAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    #[instrument(level = "debug", skip(self, record), fields(path = %self.path.display(), exam = %record.exam))]
    async fn record(&self, record: &AuditRecord) -> GenerationResult<()> {
        let mut line = serde_json::to_string(record).map_err(|e| GenerationError::Audit(e.to_string()))?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| GenerationError::Audit(e.to_string()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| GenerationError::Audit(format!("{}: {}", self.path.display(), e)))?;
        file.write_all(line.as_bytes()).await.map_err(|e| GenerationError::Audit(e.to_string()))?;
        file.flush().await.map_err(|e| GenerationError::Audit(e.to_string()))?;
        debug!(target: "audit", "Logged generation pair");
        Ok(())
    }
}

/// Keeps a PDF snapshot of every live model response for debugging.
#[derive(Clone, Debug)]
pub struct RawResponseStore {
    dir: PathBuf,
}

impl RawResponseStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Best-effort: failures are logged, never returned. Rendering runs off the async workers.
    pub async fn save(&self, text: &str) {
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S%.3f");
        let suffix = Uuid::new_v4().simple().to_string();
        let path = self.dir.join(format!("gpt_response_{}_{}.pdf", timestamp, &suffix[..8]));
        let dir = self.dir.clone();
        let text = text.to_string();

        let written = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir).map_err(|e| GenerationError::ArtifactWrite {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })?;
            write_document(&path, &text, OutputFormat::Pdf).map(|()| path)
        })
        .await;

        match written {
            Ok(Ok(path)) => debug!(target: "audit", path = %path.display(), "Raw response saved"),
            Ok(Err(e)) => warn!(target: "audit", error = %e, "Failed to save raw response"),
            Err(e) => warn!(target: "audit", error = %e, "Raw response writer task failed"),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AuditRecord {
        AuditRecord {
            system: "You are a UPSC paper setter.".into(),
            prompt: "Write 3 MCQs".into(),
            response: "--Question Starting--\nQ1".into(),
            exam: "UPSC".into(),
            model: "gpt-4-turbo".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn jsonl_sink_appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("generations.jsonl");
        let sink = JsonlAuditSink::new(&path);

        sink.record(&record()).await.unwrap();
        sink.record(&record()).await.unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        let v: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(v["exam"], "UPSC");
        assert_eq!(v["model"], "gpt-4-turbo");
        assert!(v["created_at"].is_string());
    }

    #[tokio::test]
    async fn jsonl_sink_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        let sink = JsonlAuditSink::new(dir.path());
        assert!(matches!(sink.record(&record()).await, Err(GenerationError::Audit(_))));
    }

    #[tokio::test]
    async fn raw_response_store_writes_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawResponseStore::new(dir.path().join("raw"));
        store.save("--Question Starting--\nQ1. Sample").await;

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("raw")).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let name = entries[0].as_ref().unwrap().file_name().into_string().unwrap();
        assert!(name.starts_with("gpt_response_") && name.ends_with(".pdf"));
    }

    #[tokio::test]
    async fn concurrent_raw_responses_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawResponseStore::new(dir.path().join("raw"));
        tokio::join!(store.save("first reply"), store.save("second reply"), store.save("third reply"));

        let entries = std::fs::read_dir(dir.path().join("raw")).unwrap().count();
        assert_eq!(entries, 3);
    }

    #[tokio::test]
    async fn raw_response_store_swallows_unwritable_dir() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("raw");
        std::fs::write(&blocker, "not a directory").unwrap();

        RawResponseStore::new(&blocker).save("reply").await;
        assert!(blocker.is_file());
    }
}
