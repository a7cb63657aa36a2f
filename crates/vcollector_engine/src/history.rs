//! Collector-history store implementations (§6 "History store (produced)",
//! §B.6). `InMemoryHistoryStore` is for tests and short-lived CLI runs;
//! `FileHistoryStore` appends one JSON line per create/update so a run's
//! audit trail survives process restarts without needing a database.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::warn;
use vcollector_model::{HistoryRow, HistoryStore};

#[derive(Default)]
pub struct InMemoryHistoryStore {
    rows: RwLock<HashMap<String, HistoryRow>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        InMemoryHistoryStore::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn create(&self, row: HistoryRow) {
        self.rows.write().await.insert(row.id.clone(), row);
    }

    async fn update(&self, row: HistoryRow) {
        self.rows.write().await.insert(row.id.clone(), row);
    }

    async fn get(&self, id: &str) -> Option<HistoryRow> {
        self.rows.read().await.get(id).cloned()
    }
}

/// Append-only JSONL history log plus an in-memory index for `get`, so a
/// single process can both query its own history and leave a durable trail
/// for out-of-process tooling to tail (§B.6).
pub struct FileHistoryStore {
    path: PathBuf,
    index: RwLock<HashMap<String, HistoryRow>>,
}

impl FileHistoryStore {
    pub fn new(path: PathBuf) -> Self {
        FileHistoryStore {
            path,
            index: RwLock::new(HashMap::new()),
        }
    }

    async fn append(&self, row: &HistoryRow) {
        let line = match serde_json::to_string(row) {
            Ok(line) => line,
            Err(err) => {
                warn!(%err, "failed to serialize history row, dropping append");
                return;
            }
        };

        let file = OpenOptions::new().create(true).append(true).open(&self.path).await;
        match file {
            Ok(mut file) => {
                if let Err(err) = file.write_all(format!("{line}\n").as_bytes()).await {
                    warn!(%err, path = %self.path.display(), "failed to append history row");
                }
            }
            Err(err) => warn!(%err, path = %self.path.display(), "failed to open history log"),
        }
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn create(&self, row: HistoryRow) {
        self.append(&row).await;
        self.index.write().await.insert(row.id.clone(), row);
    }

    async fn update(&self, row: HistoryRow) {
        self.append(&row).await;
        self.index.write().await.insert(row.id.clone(), row);
    }

    async fn get(&self, id: &str) -> Option<HistoryRow> {
        self.index.read().await.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vcollector_model::HistoryStatus;

    fn row(id: &str) -> HistoryRow {
        HistoryRow::open(id, "job-1", Utc::now())
    }

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemoryHistoryStore::new();
        store.create(row("h1")).await;
        let mut updated = store.get("h1").await.unwrap();
        updated.status = HistoryStatus::Success;
        store.update(updated).await;
        assert_eq!(store.get("h1").await.unwrap().status, HistoryStatus::Success);
    }

    #[tokio::test]
    async fn file_store_appends_one_line_per_write_and_answers_get() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let store = FileHistoryStore::new(path.clone());

        store.create(row("h1")).await;
        let mut updated = store.get("h1").await.unwrap();
        updated.status = HistoryStatus::Partial;
        store.update(updated).await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert_eq!(store.get("h1").await.unwrap().status, HistoryStatus::Partial);
    }
}
