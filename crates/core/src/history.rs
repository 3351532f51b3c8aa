use crate::chunking::normalize_whitespace;
use crate::error::HistoryError;
use crate::traits::HistoryStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

pub const HISTORY_LIMIT: usize = 10;
pub const SUMMARY_EXCERPT_CHARS: usize = 200;
pub const NO_SUMMARY_PLACEHOLDER: &str = "No summary available";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub result_count: usize,
    pub summary_excerpt: String,
}

impl HistoryEntry {
    pub fn new(
        query: impl Into<String>,
        result_count: usize,
        summary: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            timestamp: now,
            result_count,
            summary_excerpt: summary
                .map(excerpt)
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| NO_SUMMARY_PLACEHOLDER.to_string()),
        }
    }
}

/// First [`SUMMARY_EXCERPT_CHARS`] characters followed by `...`, or the whole
/// text when it is short enough.
fn excerpt(summary: &str) -> String {
    let text = normalize_whitespace(summary);
    if text.chars().count() <= SUMMARY_EXCERPT_CHARS {
        return text;
    }
    let mut cut: String = text.chars().take(SUMMARY_EXCERPT_CHARS).collect();
    cut.push_str("...");
    cut
}

fn push_bounded(entries: &mut Vec<HistoryEntry>, entry: HistoryEntry) {
    entries.insert(0, entry);
    entries.truncate(HISTORY_LIMIT);
}

#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn load(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        Ok(self.entries.lock().await.clone())
    }

    async fn append_bounded(&self, entry: HistoryEntry) -> Result<Vec<HistoryEntry>, HistoryError> {
        let mut entries = self.entries.lock().await;
        push_bounded(&mut entries, entry);
        Ok(entries.clone())
    }

    async fn clear(&self) -> Result<(), HistoryError> {
        self.entries.lock().await.clear();
        Ok(())
    }
}

/// History persisted as a JSON array. A missing file reads as empty history.
#[derive(Debug)]
pub struct JsonFileHistoryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Ok(raw) => {
                let mut entries: Vec<HistoryEntry> = serde_json::from_str(&raw)?;
                entries.truncate(HISTORY_LIMIT);
                Ok(entries)
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(error) => Err(error.into()),
        }
    }

    async fn write(&self, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(&self.path, raw).await?;
        debug!(path = %self.path.display(), entries = entries.len(), "history saved");
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for JsonFileHistoryStore {
    async fn load(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    async fn append_bounded(&self, entry: HistoryEntry) -> Result<Vec<HistoryEntry>, HistoryError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read().await?;
        push_bounded(&mut entries, entry);
        self.write(&entries).await?;
        Ok(entries)
    }

    async fn clear(&self) -> Result<(), HistoryError> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Err(error) if error.kind() != std::io::ErrorKind::NotFound => Err(error.into()),
            _ => Ok(()),
        }
    }
}
