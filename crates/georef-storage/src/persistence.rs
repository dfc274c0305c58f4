//! JSON snapshot persistence
//!
//! [`JsonFileStore`] serves reads and writes from a [`MemoryStore`] and
//! writes the full record set to disk on [`Store::flush`]. The snapshot is
//! written to a sibling temporary file and renamed into place, so a crash
//! mid-write leaves the previous snapshot intact.

use crate::{EntityId, Level, MemoryStore, Store, StoreError, StoredEntity, UpsertOutcome, Upserted};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk layout of a store snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub entities: Vec<StoredEntity>,
}

pub struct JsonFileStore {
    path: PathBuf,
    memory: MemoryStore,
    dirty: AtomicBool,
}

impl JsonFileStore {
    /// Open a snapshot, or start empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let memory = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let snapshot: StoreSnapshot = serde_json::from_str(&contents)
                .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(StoreError::Corrupt(format!(
                    "{}: unsupported snapshot version {}",
                    path.display(),
                    snapshot.version
                )));
            }
            tracing::debug!(
                path = %path.display(),
                records = snapshot.entities.len(),
                "loaded store snapshot"
            );
            MemoryStore::from_entities(snapshot.entities)?
        } else {
            MemoryStore::new()
        };

        Ok(Self {
            path,
            memory,
            dirty: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-memory view of the store.
    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    fn write_snapshot(&self) -> Result<(), StoreError> {
        let snapshot = StoreSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            entities: self.memory.snapshot(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            records = snapshot.entities.len(),
            "saved store snapshot"
        );
        Ok(())
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if dir.is_dir() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "snapshot directory does not exist: {}",
                dir.display()
            )))
        }
    }

    async fn upsert(
        &self,
        level: Level,
        parent_id: Option<EntityId>,
        name: &str,
        code: &str,
    ) -> Result<Upserted, StoreError> {
        let upserted = self.memory.upsert(level, parent_id, name, code).await?;
        if upserted.outcome != UpsertOutcome::Unchanged {
            self.dirty.store(true, Ordering::Release);
        }
        Ok(upserted)
    }

    async fn find(
        &self,
        level: Level,
        parent_id: Option<EntityId>,
        code: &str,
    ) -> Result<Option<StoredEntity>, StoreError> {
        self.memory.find(level, parent_id, code).await
    }

    async fn flush(&self) -> Result<(), StoreError> {
        if !self.dirty.swap(false, Ordering::AcqRel) && self.path.exists() {
            return Ok(());
        }
        if let Err(err) = self.write_snapshot() {
            self.dirty.store(true, Ordering::Release);
            return Err(err);
        }
        Ok(())
    }
}
