//! Append-only JSON-lines lifecycle event log.
//!
//! One event per line in a single file. Lines that fail to parse (for example
//! a line cut short by the crash being recovered from) are skipped on read.

use std::path::{Path, PathBuf};

use flowrun_core::repository::event_log::EventLogReader;
use flowrun_types::error::RepositoryError;
use flowrun_types::event::LifecycleEvent;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub struct JsonlEventLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlEventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `{data_dir}/events.jsonl`.
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("events.jsonl"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event and flush it to disk.
    pub async fn append(&self, event: &LifecycleEvent) -> Result<(), RepositoryError> {
        let mut line = serde_json::to_string(event)
            .map_err(|e| RepositoryError::Query(format!("serialize event: {e}")))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| RepositoryError::Query(format!("open {}: {e}", self.path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        file.sync_data()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }
}

impl EventLogReader for JsonlEventLog {
    async fn read(&self, execution_id: &str) -> Result<Vec<LifecycleEvent>, RepositoryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(RepositoryError::Query(format!(
                    "read {}: {err}",
                    self.path.display()
                )));
            }
        };

        let mut events = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LifecycleEvent>(line) {
                Ok(event) if event.execution_id == execution_id => events.push(event),
                Ok(_) => {}
                Err(e) => tracing::warn!(line = number + 1, error = %e, "skipping unreadable event"),
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use flowrun_types::event::LifecycleEventName;
    use tempfile::TempDir;

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_767_225_600 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn append_then_read_filters_by_execution() {
        let tmp = TempDir::new().unwrap();
        let log = JsonlEventLog::in_data_dir(tmp.path());

        log.append(&LifecycleEvent::workflow("a", LifecycleEventName::WorkflowStarted, at(0)))
            .await
            .unwrap();
        log.append(&LifecycleEvent::workflow("b", LifecycleEventName::WorkflowStarted, at(1)))
            .await
            .unwrap();
        log.append(&LifecycleEvent::node("a", LifecycleEventName::NodeStarted, "Fetch", at(2)))
            .await
            .unwrap();

        let events = log.read("a").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].node_name.as_deref(), Some("Fetch"));
        assert_eq!(log.read("b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_an_empty_log() {
        let tmp = TempDir::new().unwrap();
        let log = JsonlEventLog::in_data_dir(tmp.path());
        assert!(log.read("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn truncated_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let log = JsonlEventLog::in_data_dir(tmp.path());
        log.append(&LifecycleEvent::workflow("a", LifecycleEventName::WorkflowStarted, at(0)))
            .await
            .unwrap();

        let mut content = tokio::fs::read_to_string(log.path()).await.unwrap();
        content.push_str(r#"{"executionId":"a","eventName":"node.sta"#);
        tokio::fs::write(log.path(), content).await.unwrap();

        assert_eq!(log.read("a").await.unwrap().len(), 1);
    }
}
