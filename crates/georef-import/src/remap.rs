//! Legacy id → stable id mapping, one map per level.
//!
//! A level's [`IdentifierMap`] is owned mutably by that level's importer
//! while it runs. Handing it to [`IdentifierRemapper::complete`] freezes it:
//! the remapper only exposes shared access, so a later level can read its
//! parent's map but never change it.

use georef_storage::{EntityId, Level};
use std::collections::{BTreeMap, HashMap};

/// Legacy id of a row in the source dump.
pub type LegacyId = i64;

#[derive(Debug, Clone)]
pub struct IdentifierMap {
    level: Level,
    ids: HashMap<LegacyId, EntityId>,
}

impl IdentifierMap {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ids: HashMap::new(),
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// Record a mapping, returning the id it replaced.
    pub fn put(&mut self, legacy_id: LegacyId, id: EntityId) -> Option<EntityId> {
        self.ids.insert(legacy_id, id)
    }

    pub fn get(&self, legacy_id: LegacyId) -> Option<EntityId> {
        self.ids.get(&legacy_id).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Completed identifier maps of one pipeline run.
#[derive(Debug, Default)]
pub struct IdentifierRemapper {
    maps: BTreeMap<Level, IdentifierMap>,
}

impl IdentifierRemapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze a level's map. Completing a level twice replaces the earlier
    /// map and returns it.
    pub fn complete(&mut self, map: IdentifierMap) -> Option<IdentifierMap> {
        self.maps.insert(map.level, map)
    }

    /// The frozen map of `level`, if that level has completed.
    pub fn map(&self, level: Level) -> Option<&IdentifierMap> {
        self.maps.get(&level)
    }

    pub fn get(&self, level: Level, legacy_id: LegacyId) -> Option<EntityId> {
        self.maps.get(&level)?.get(legacy_id)
    }

    pub fn is_complete(&self, level: Level) -> bool {
        self.maps.contains_key(&level)
    }
}
