// work-order-store-rs/src/file.rs
// Append-only NDJSON persistence for work orders.
//
// Implementation notes:
// - One serialized WorkOrder per line at {dir}/{db}/{collection}.ndjson.
// - The request-ID index is rebuilt from the file when the repository opens.
// - Lines that fail to parse are skipped with a warning.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use shared_types::{NewWorkOrder, WorkOrder};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{new_document_id, sort_oldest_first, InsertOutcome, StoreError, WorkOrderRepository};

pub fn collection_path(dir: impl AsRef<Path>, db: &str, collection: &str) -> PathBuf {
    dir.as_ref().join(db).join(format!("{}.ndjson", collection))
}

/// File-backed repository suitable for single-node deployments.
///
/// Writes are serialized through one lock, so the duplicate check and the
/// append happen atomically with respect to other inserts.
pub struct FileBackedRepository {
    path: PathBuf,
    index: Mutex<HashMap<String, WorkOrder>>,
}

impl FileBackedRepository {
    /// Open (creating if needed) the collection file and load its index.
    ///
    /// Fails fast when the directory cannot be created or the file cannot
    /// be read, so a misconfigured store stops the service at start-up.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let index = load_index(&path).await?;
        info!(path = %path.display(), orders = index.len(), "Opened work-order store");

        Ok(Self {
            path,
            index: Mutex::new(index),
        })
    }

    pub async fn open_collection(dir: impl AsRef<Path>, db: &str, collection: &str) -> Result<Self, StoreError> {
        Self::open(collection_path(dir, db, collection)).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. A tail left without a newline (torn write) is
    /// terminated first; a failed write is truncated back to the previous
    /// length so the next record starts on a clean line.
    async fn append(&self, order: &WorkOrder) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(order)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;

        let len = file.metadata().await?.len();
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::Start(len - 1)).await?;
            file.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                warn!(path = %self.path.display(), "Terminating torn record at end of store file");
                line.insert(0, b'\n');
            }
        }

        let written = async {
            file.write_all(&line).await?;
            file.flush().await?;
            file.sync_data().await
        }
        .await;

        if let Err(e) = written {
            if let Err(truncate_err) = file.set_len(len).await {
                warn!(path = %self.path.display(), error = %truncate_err, "Failed to roll back partial append");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

async fn load_index(path: &Path) -> Result<HashMap<String, WorkOrder>, StoreError> {
    let mut index = HashMap::new();
    let contents = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(index),
        Err(e) => return Err(e.into()),
    };

    for (line_no, line) in contents.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }
        match serde_json::from_slice::<WorkOrder>(line) {
            Ok(order) => {
                index.entry(order.request_id.clone()).or_insert(order);
            }
            Err(err) => {
                warn!(line = line_no + 1, error = %err, "failed to parse work order line; skipping");
            }
        }
    }

    // A torn final write must not swallow the next record
    if contents.last().map_or(false, |b| *b != b'\n') {
        let mut file = OpenOptions::new().append(true).open(path).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
    }

    Ok(index)
}

#[async_trait]
impl WorkOrderRepository for FileBackedRepository {
    async fn insert(&self, order: NewWorkOrder) -> Result<InsertOutcome, StoreError> {
        let mut index = self.index.lock().await;
        if let Some(existing) = index.get(&order.request_id) {
            return Ok(InsertOutcome::Duplicate(existing.clone()));
        }

        let stored = order.with_id(new_document_id());
        self.append(&stored).await?;
        index.insert(stored.request_id.clone(), stored.clone());
        Ok(InsertOutcome::Created(stored))
    }

    async fn find_by_request_id(&self, request_id: &str) -> Result<Option<WorkOrder>, StoreError> {
        Ok(self.index.lock().await.get(request_id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<WorkOrder>, StoreError> {
        let mut all: Vec<WorkOrder> = self.index.lock().await.values().cloned().collect();
        sort_oldest_first(&mut all);
        Ok(all)
    }
}
