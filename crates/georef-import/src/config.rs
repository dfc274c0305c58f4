//! Import configuration.
//!
//! Loaded from a JSON file or taken from [`ImportConfig::default`], which
//! describes the administrative geography of the reference dumps:
//!
//! ```text
//! states(id, name, code)
//! lgas(id, state_id, name, code)
//! wards(id, lga_id, name, code)
//! polling_units(id, ward_id, name, code)
//! ```

use crate::error::ImportError;
use georef_ingest_sql::TableRows;
use georef_storage::Level;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A column by zero-based position, or by name from the INSERT column list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRef {
    Index(usize),
    Name(String),
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Index(i) => write!(f, "#{i}"),
            ColumnRef::Name(n) => write!(f, "`{n}`"),
        }
    }
}

impl From<usize> for ColumnRef {
    fn from(i: usize) -> Self {
        ColumnRef::Index(i)
    }
}

impl From<&str> for ColumnRef {
    fn from(name: &str) -> Self {
        ColumnRef::Name(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelColumns {
    pub legacy_id: ColumnRef,
    /// Absent for the top level only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ColumnRef>,
    pub name: ColumnRef,
    /// When absent or NULL in a row, the name doubles as the code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ColumnRef>,
}

/// Column positions after resolving names against a table's column list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub legacy_id: usize,
    pub parent_id: Option<usize>,
    pub name: usize,
    pub code: Option<usize>,
}

/// Static description of one hierarchy level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelDescriptor {
    pub level: Level,
    pub table: String,
    pub columns: LevelColumns,
}

impl LevelDescriptor {
    /// Descriptor for a table laid out as `(id, [parent_id,] name, code)`.
    pub fn positional(level: Level, table: &str) -> Self {
        let offset = usize::from(level.parent().is_some());
        Self {
            level,
            table: table.to_string(),
            columns: LevelColumns {
                legacy_id: ColumnRef::Index(0),
                parent_id: level.parent().map(|_| ColumnRef::Index(1)),
                name: ColumnRef::Index(1 + offset),
                code: Some(ColumnRef::Index(2 + offset)),
            },
        }
    }

    pub fn resolve(&self, rows: &TableRows) -> Result<ResolvedColumns, ImportError> {
        let resolve = |column: &ColumnRef| -> Result<usize, ImportError> {
            match column {
                ColumnRef::Index(i) => Ok(*i),
                ColumnRef::Name(name) => rows.column_index(name).ok_or_else(|| {
                    ImportError::Config(format!(
                        "{} level: column `{name}` not found in `{}` column list ({})",
                        self.level,
                        self.table,
                        rows.columns
                            .as_ref()
                            .map(|c| c.join(", "))
                            .unwrap_or_else(|| "statement has none".to_string())
                    ))
                }),
            }
        };

        Ok(ResolvedColumns {
            legacy_id: resolve(&self.columns.legacy_id)?,
            parent_id: self.columns.parent_id.as_ref().map(resolve).transpose()?,
            name: resolve(&self.columns.name)?,
            code: self.columns.code.as_ref().map(resolve).transpose()?,
        })
    }
}

fn default_batch_size() -> usize {
    500
}

fn default_concurrency() -> usize {
    8
}

fn default_levels() -> Vec<LevelDescriptor> {
    vec![
        LevelDescriptor::positional(Level::Region, "states"),
        LevelDescriptor::positional(Level::SubRegion, "lgas"),
        LevelDescriptor::positional(Level::Area, "wards"),
        LevelDescriptor::positional(Level::Unit, "polling_units"),
    ]
}

/// Configuration for one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Maximum records per write batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Concurrent natural-key groups within a batch (1 = strictly sequential)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Stop starting new batches after this many seconds
    #[serde(default)]
    pub deadline_secs: Option<u64>,
    /// Exactly four levels, top-down
    #[serde(default = "default_levels")]
    pub levels: Vec<LevelDescriptor>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            deadline_secs: None,
            levels: default_levels(),
        }
    }
}

impl ImportConfig {
    pub fn load(path: &Path) -> Result<Self, ImportError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ImportError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ImportError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        if self.batch_size == 0 {
            return Err(ImportError::Config("batch_size must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(ImportError::Config("concurrency must be at least 1".into()));
        }
        if self.levels.len() != Level::ALL.len() {
            return Err(ImportError::Config(format!(
                "expected {} levels, got {}",
                Level::ALL.len(),
                self.levels.len()
            )));
        }
        for (descriptor, expected) in self.levels.iter().zip(Level::ALL) {
            if descriptor.level != expected {
                return Err(ImportError::Config(format!(
                    "levels out of order: found {} where {expected} was expected",
                    descriptor.level
                )));
            }
            if descriptor.table.trim().is_empty() {
                return Err(ImportError::Config(format!(
                    "{expected} level has an empty table name"
                )));
            }
            match (expected.parent(), &descriptor.columns.parent_id) {
                (None, Some(_)) => {
                    return Err(ImportError::Config(format!(
                        "{expected} level cannot have a parent_id column"
                    )))
                }
                (Some(parent), None) => {
                    return Err(ImportError::Config(format!(
                        "{expected} level needs a parent_id column referencing {parent}"
                    )))
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn level(&self, level: Level) -> Option<&LevelDescriptor> {
        self.levels.iter().find(|d| d.level == level)
    }
}
