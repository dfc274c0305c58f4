//! georef Storage Layer
//!
//! The import pipeline only needs one capability from persistence: upsert a
//! record by its natural key and get back a stable identifier.
//!
//! ```text
//!   region ──► sub_region ──► area ──► unit
//!
//!   natural key = (level, parent id, code)     unique per level
//!   upsert      = create | update name | unchanged
//! ```
//!
//! ## Backends
//!
//! - [`MemoryStore`]: process-local, used for dry runs and tests
//! - [`persistence::JsonFileStore`]: in-memory with a JSON snapshot written on flush

pub mod persistence;


use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

pub use persistence::JsonFileStore;

// ============================================================================
// Core Types
// ============================================================================

/// One tier of the geographic hierarchy, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Region,
    SubRegion,
    Area,
    Unit,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::Region, Level::SubRegion, Level::Area, Level::Unit];

    /// The level whose ids this level's records reference.
    pub fn parent(self) -> Option<Level> {
        match self {
            Level::Region => None,
            Level::SubRegion => Some(Level::Region),
            Level::Area => Some(Level::SubRegion),
            Level::Unit => Some(Level::Area),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Region => "region",
            Level::SubRegion => "sub_region",
            Level::Area => "area",
            Level::Unit => "unit",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifier assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Uniqueness key of a record within its level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub level: Level,
    pub parent_id: Option<EntityId>,
    pub code: String,
}

/// A record as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntity {
    pub id: EntityId,
    pub level: Level,
    pub parent_id: Option<EntityId>,
    pub name: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredEntity {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            level: self.level,
            parent_id: self.parent_id,
            code: self.code.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    /// The key existed with a different name; the name was replaced.
    Updated,
    /// The key existed with identical content.
    Unchanged,
}

/// Result of a successful upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upserted {
    pub id: EntityId,
    pub outcome: UpsertOutcome,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("record rejected: {reason}")]
    Rejected { reason: String },
    #[error("store snapshot is corrupt: {0}")]
    Corrupt(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the store as a whole is unusable, as opposed to a single
    /// record being refused.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StoreError::Rejected { .. })
    }
}

// ============================================================================
// Store Interface
// ============================================================================

/// Persistence capability consumed by the import pipeline.
#[async_trait]
pub trait Store: Send + Sync {
    /// Connectivity check issued before any work starts.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Insert or update by `(level, parent_id, code)`.
    async fn upsert(
        &self,
        level: Level,
        parent_id: Option<EntityId>,
        name: &str,
        code: &str,
    ) -> Result<Upserted, StoreError>;

    /// Read a record by natural key.
    async fn find(
        &self,
        level: Level,
        parent_id: Option<EntityId>,
        code: &str,
    ) -> Result<Option<StoredEntity>, StoreError>;

    /// Make completed writes durable.
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

#[derive(Debug, Default)]
struct Tables {
    entities: Vec<StoredEntity>,
    by_key: HashMap<NaturalKey, usize>,
    by_id: HashMap<EntityId, usize>,
}

impl Tables {
    fn insert(&mut self, entity: StoredEntity) -> Result<(), StoreError> {
        let key = entity.natural_key();
        if self.by_key.contains_key(&key) || self.by_id.contains_key(&entity.id) {
            return Err(StoreError::Corrupt(format!(
                "duplicate record {} ({} `{}`)",
                entity.id, entity.level, entity.code
            )));
        }
        let idx = self.entities.len();
        self.by_key.insert(key, idx);
        self.by_id.insert(entity.id, idx);
        self.entities.push(entity);
        Ok(())
    }

    fn check_parent(&self, level: Level, parent_id: Option<EntityId>) -> Result<(), StoreError> {
        match (level.parent(), parent_id) {
            (None, None) => Ok(()),
            (None, Some(_)) => Err(StoreError::Rejected {
                reason: format!("{level} records have no parent"),
            }),
            (Some(parent_level), None) => Err(StoreError::Rejected {
                reason: format!("{level} records require a {parent_level} parent"),
            }),
            (Some(parent_level), Some(pid)) => {
                let known = self
                    .by_id
                    .get(&pid)
                    .is_some_and(|&i| self.entities[i].level == parent_level);
                if known {
                    Ok(())
                } else {
                    Err(StoreError::Rejected {
                        reason: format!("unknown {parent_level} parent {pid}"),
                    })
                }
            }
        }
    }
}

/// Process-local store. Enforces natural-key uniqueness and parent existence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from previously persisted records.
    pub fn from_entities(entities: Vec<StoredEntity>) -> Result<Self, StoreError> {
        let mut tables = Tables::default();
        for entity in entities {
            tables.insert(entity)?;
        }
        Ok(Self {
            tables: RwLock::new(tables),
        })
    }

    pub fn len(&self) -> usize {
        self.tables.read().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: EntityId) -> Option<StoredEntity> {
        let tables = self.tables.read();
        tables.by_id.get(&id).map(|&i| tables.entities[i].clone())
    }

    /// Records of one level in insertion order.
    pub fn entities(&self, level: Level) -> Vec<StoredEntity> {
        self.tables
            .read()
            .entities
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    /// Every record in insertion order.
    pub fn snapshot(&self) -> Vec<StoredEntity> {
        self.tables.read().entities.clone()
    }

    fn upsert_sync(
        &self,
        level: Level,
        parent_id: Option<EntityId>,
        name: &str,
        code: &str,
    ) -> Result<Upserted, StoreError> {
        if code.trim().is_empty() {
            return Err(StoreError::Rejected {
                reason: "empty code".to_string(),
            });
        }
        if name.trim().is_empty() {
            return Err(StoreError::Rejected {
                reason: "empty name".to_string(),
            });
        }

        let mut guard = self.tables.write();
        let tables = &mut *guard;
        tables.check_parent(level, parent_id)?;

        let key = NaturalKey {
            level,
            parent_id,
            code: code.to_string(),
        };
        if let Some(idx) = tables.by_key.get(&key).copied() {
            let existing = &mut tables.entities[idx];
            if existing.name == name {
                return Ok(Upserted {
                    id: existing.id,
                    outcome: UpsertOutcome::Unchanged,
                });
            }
            existing.name = name.to_string();
            existing.updated_at = Utc::now();
            return Ok(Upserted {
                id: existing.id,
                outcome: UpsertOutcome::Updated,
            });
        }

        let now = Utc::now();
        let entity = StoredEntity {
            id: EntityId::new(),
            level,
            parent_id,
            name: name.to_string(),
            code: code.to_string(),
            created_at: now,
            updated_at: now,
        };
        let id = entity.id;
        tables.insert(entity)?;
        Ok(Upserted {
            id,
            outcome: UpsertOutcome::Created,
        })
    }

    fn find_sync(
        &self,
        level: Level,
        parent_id: Option<EntityId>,
        code: &str,
    ) -> Option<StoredEntity> {
        let key = NaturalKey {
            level,
            parent_id,
            code: code.to_string(),
        };
        let tables = self.tables.read();
        tables.by_key.get(&key).map(|&i| tables.entities[i].clone())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert(
        &self,
        level: Level,
        parent_id: Option<EntityId>,
        name: &str,
        code: &str,
    ) -> Result<Upserted, StoreError> {
        self.upsert_sync(level, parent_id, name, code)
    }

    async fn find(
        &self,
        level: Level,
        parent_id: Option<EntityId>,
        code: &str,
    ) -> Result<Option<StoredEntity>, StoreError> {
        Ok(self.find_sync(level, parent_id, code))
    }
}
