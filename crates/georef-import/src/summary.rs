//! Per-level and per-run import counters.

use chrono::{DateTime, Utc};
use georef_ingest_sql::ParseDiagnostics;
use georef_storage::Level;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSummary {
    pub level: Level,
    pub table: String,
    /// Rows decoded from the dump.
    pub seen: usize,
    /// Rows written (created + updated + unchanged).
    pub imported: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Parent legacy id absent from the parent level's map.
    pub skipped_orphan: usize,
    /// Unusable legacy id, parent id or name.
    pub skipped_malformed: usize,
    /// Rejected by the store.
    pub skipped_write_error: usize,
    /// Rows sharing a natural key with an earlier row of the same level.
    pub collisions: usize,
    pub parse: ParseDiagnostics,
    /// False when the run was cancelled while this level was in progress.
    pub completed: bool,
}

impl LevelSummary {
    pub fn new(level: Level, table: &str) -> Self {
        Self {
            level,
            table: table.to_string(),
            seen: 0,
            imported: 0,
            created: 0,
            updated: 0,
            unchanged: 0,
            skipped_orphan: 0,
            skipped_malformed: 0,
            skipped_write_error: 0,
            collisions: 0,
            parse: ParseDiagnostics::default(),
            completed: false,
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped_orphan + self.skipped_malformed + self.skipped_write_error
    }

    /// A level with no source statements at all.
    pub fn source_missing(&self) -> bool {
        self.parse.statements == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Levels that ran, top-down. Levels after a cancellation are absent.
    pub levels: Vec<LevelSummary>,
    pub cancelled: bool,
}

impl ImportSummary {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            levels: Vec::new(),
            cancelled: false,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn level(&self, level: Level) -> Option<&LevelSummary> {
        self.levels.iter().find(|l| l.level == level)
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled
    }

    pub fn total_seen(&self) -> usize {
        self.levels.iter().map(|l| l.seen).sum()
    }

    pub fn total_imported(&self) -> usize {
        self.levels.iter().map(|l| l.imported).sum()
    }

    pub fn total_created(&self) -> usize {
        self.levels.iter().map(|l| l.created).sum()
    }

    pub fn total_updated(&self) -> usize {
        self.levels.iter().map(|l| l.updated).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.levels.iter().map(LevelSummary::skipped).sum()
    }
}
