//! One level of the hierarchical import.
//!
//! Turns decoded rows into [`EntityRecord`]s, resolving each row's parent
//! through the parent level's completed [`IdentifierMap`], and fills this
//! level's own map from the ids the store hands back.

use crate::config::{LevelDescriptor, ResolvedColumns};
use crate::error::ImportError;
use crate::remap::{IdentifierMap, LegacyId};
use crate::summary::LevelSummary;
use crate::writer::{BatchWriter, EntityRecord};
use georef_ingest_sql::{DecodedRow, TableRows};
use georef_storage::EntityId;
use std::collections::HashSet;

/// Result of importing one level.
#[derive(Debug, Clone)]
pub struct LevelOutcome {
    pub summary: LevelSummary,
    pub map: IdentifierMap,
    pub cancelled: bool,
}

/// Why a row was not turned into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowSkip {
    Malformed(&'static str),
    Orphan(Option<LegacyId>),
}

/// Fields pulled out of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RowFields {
    legacy_id: LegacyId,
    parent_legacy_id: Option<LegacyId>,
    name: String,
    code: String,
}

fn parse_legacy_id(raw: &str) -> Option<LegacyId> {
    raw.trim().parse().ok()
}

fn read_row(row: &DecodedRow, columns: &ResolvedColumns) -> Result<RowFields, RowSkip> {
    let legacy_id = row
        .text(columns.legacy_id)
        .and_then(parse_legacy_id)
        .ok_or(RowSkip::Malformed("legacy id"))?;

    let parent_legacy_id = match columns.parent_id {
        None => None,
        Some(col) => match row.get(col) {
            None => return Err(RowSkip::Malformed("missing parent column")),
            Some(value) => match value.as_str() {
                None => return Err(RowSkip::Orphan(None)),
                Some(raw) => Some(parse_legacy_id(raw).ok_or(RowSkip::Malformed("parent id"))?),
            },
        },
    };

    let name = row
        .text(columns.name)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(RowSkip::Malformed("name"))?;

    let code = columns
        .code
        .and_then(|col| row.text(col))
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(name);

    Ok(RowFields {
        legacy_id,
        parent_legacy_id,
        name: name.to_string(),
        code: code.to_string(),
    })
}

pub struct HierarchicalImporter<'a> {
    descriptor: &'a LevelDescriptor,
    parents: Option<&'a IdentifierMap>,
}

impl<'a> HierarchicalImporter<'a> {
    /// `parents` is the completed map of the parent level; `None` for the
    /// top level. A lower level without it treats every row as an orphan.
    pub fn new(descriptor: &'a LevelDescriptor, parents: Option<&'a IdentifierMap>) -> Self {
        Self {
            descriptor,
            parents,
        }
    }

    pub async fn run(
        &self,
        rows: TableRows,
        mut writer: BatchWriter,
    ) -> Result<LevelOutcome, ImportError> {
        let level = self.descriptor.level;
        let mut summary = LevelSummary::new(level, &self.descriptor.table);
        summary.parse = rows.diagnostics;
        summary.seen = rows.rows.len();

        if rows.rows.is_empty() {
            summary.completed = true;
            return Ok(LevelOutcome {
                summary,
                map: IdentifierMap::new(level),
                cancelled: false,
            });
        }

        let columns = self.descriptor.resolve(&rows)?;
        let mut keys: HashSet<(Option<EntityId>, String)> = HashSet::new();
        let mut cancelled = false;

        for row in &rows.rows {
            let fields = match read_row(row, &columns) {
                Ok(fields) => fields,
                Err(RowSkip::Malformed(what)) => {
                    summary.skipped_malformed += 1;
                    tracing::debug!(level = %level, field = what, row = ?row.values(), "malformed row skipped");
                    continue;
                }
                Err(RowSkip::Orphan(parent)) => {
                    summary.skipped_orphan += 1;
                    tracing::debug!(level = %level, parent = ?parent, "row without parent skipped");
                    continue;
                }
            };

            let parent_id = match fields.parent_legacy_id {
                None => None,
                Some(parent_legacy) => {
                    match self.parents.and_then(|map| map.get(parent_legacy)) {
                        Some(id) => Some(id),
                        None => {
                            summary.skipped_orphan += 1;
                            tracing::debug!(
                                level = %level,
                                legacy_id = fields.legacy_id,
                                parent = parent_legacy,
                                "orphan row skipped"
                            );
                            continue;
                        }
                    }
                }
            };

            if !keys.insert((parent_id, fields.code.clone())) {
                summary.collisions += 1;
                tracing::debug!(
                    level = %level,
                    legacy_id = fields.legacy_id,
                    code = %fields.code,
                    "natural key repeats an earlier row"
                );
            }

            let record = EntityRecord {
                level,
                parent_id,
                name: fields.name,
                code: fields.code,
                legacy_id: fields.legacy_id,
            };
            match writer.push(record).await {
                Ok(()) => {}
                Err(ImportError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        if !cancelled {
            match writer.flush().await {
                Ok(()) => {}
                Err(ImportError::Cancelled) => cancelled = true,
                Err(err) => return Err(err),
            }
        }

        let outcome = writer.into_outcome();
        let mut map = IdentifierMap::new(level);
        for (legacy_id, id) in outcome.written {
            map.put(legacy_id, id);
        }

        summary.created = outcome.stats.created;
        summary.updated = outcome.stats.updated;
        summary.unchanged = outcome.stats.unchanged;
        summary.imported = outcome.stats.written();
        summary.skipped_write_error = outcome.stats.failed;
        summary.completed = !cancelled;

        if summary.skipped_orphan > 0 || summary.skipped_malformed > 0 {
            tracing::warn!(
                level = %level,
                orphans = summary.skipped_orphan,
                malformed = summary.skipped_malformed,
                "rows skipped"
            );
        }

        Ok(LevelOutcome {
            summary,
            map,
            cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use georef_ingest_sql::extract_table;
    use georef_storage::{Level, MemoryStore, Store};
    use std::sync::Arc;

    fn writer(store: &Arc<MemoryStore>, level: Level) -> BatchWriter {
        BatchWriter::new(store.clone(), level, 3, 2, CancelToken::new())
    }

    async fn import_regions(store: &Arc<MemoryStore>, dump: &str) -> LevelOutcome {
        let descriptor = LevelDescriptor::positional(Level::Region, "states");
        HierarchicalImporter::new(&descriptor, None)
            .run(extract_table(dump, "states"), writer(store, Level::Region))
            .await
            .unwrap()
    }

    #[test]
    fn test_read_row_fields_and_code_fallback() {
        let columns = ResolvedColumns {
            legacy_id: 0,
            parent_id: Some(1),
            name: 2,
            code: Some(3),
        };
        let rows = extract_table(
            "INSERT INTO t VALUES (10, 2, ' Epe ', NULL), ('x', 2, 'A', 'A'), (11, NULL, 'B', 'B'), (12, 'p', 'C', 'C'), (13, 2, NULL, 'D'), (14);",
            "t",
        );
        let read: Vec<Result<RowFields, RowSkip>> =
            rows.rows.iter().map(|r| read_row(r, &columns)).collect();

        assert_eq!(
            read[0],
            Ok(RowFields {
                legacy_id: 10,
                parent_legacy_id: Some(2),
                name: "Epe".into(),
                code: "Epe".into(),
            })
        );
        assert_eq!(read[1], Err(RowSkip::Malformed("legacy id")));
        assert_eq!(read[2], Err(RowSkip::Orphan(None)));
        assert_eq!(read[3], Err(RowSkip::Malformed("parent id")));
        assert_eq!(read[4], Err(RowSkip::Malformed("name")));
        assert_eq!(read[5], Err(RowSkip::Malformed("missing parent column")));
    }

    #[tokio::test]
    async fn test_top_level_import_populates_map() {
        let store = Arc::new(MemoryStore::new());
        let outcome = import_regions(
            &store,
            "INSERT INTO `states` VALUES (1, 'Lagos State', 'LA'), (2, 'O\\'Brien', 'OB');",
        )
        .await;

        assert_eq!(outcome.summary.seen, 2);
        assert_eq!(outcome.summary.created, 2);
        assert!(outcome.summary.completed);
        let lagos = outcome.map.get(1).unwrap();
        let stored = store.get(lagos).unwrap();
        assert_eq!(stored.name, "Lagos State");
        assert_eq!(stored.code, "LA");
        let obrien = store.get(outcome.map.get(2).unwrap()).unwrap();
        assert_eq!(obrien.name, "O'Brien");
    }

    #[tokio::test]
    async fn test_orphans_are_counted_and_not_written() {
        let store = Arc::new(MemoryStore::new());
        let regions = import_regions(&store, "INSERT INTO `states` VALUES (1,'Lagos','LA');").await;

        let descriptor = LevelDescriptor::positional(Level::SubRegion, "lgas");
        let rows = extract_table(
            "INSERT INTO `lgas` VALUES (10,1,'Ikeja','IKJ'),(11,99,'Nowhere','NWH'),(12,1,'Epe','EPE');",
            "lgas",
        );
        let outcome = HierarchicalImporter::new(&descriptor, Some(&regions.map))
            .run(rows, writer(&store, Level::SubRegion))
            .await
            .unwrap();

        assert_eq!(outcome.summary.seen, 3);
        assert_eq!(outcome.summary.imported, 2);
        assert_eq!(outcome.summary.skipped_orphan, 1);
        assert!(outcome.map.get(11).is_none());
        assert!(store
            .find(Level::SubRegion, regions.map.get(1), "NWH")
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.entities(Level::SubRegion).len(), 2);
    }

    #[tokio::test]
    async fn test_missing_parent_map_makes_every_row_orphan() {
        let store = Arc::new(MemoryStore::new());
        let descriptor = LevelDescriptor::positional(Level::Area, "wards");
        let rows = extract_table("INSERT INTO `wards` VALUES (1,1,'W','W');", "wards");
        let outcome = HierarchicalImporter::new(&descriptor, None)
            .run(rows, writer(&store, Level::Area))
            .await
            .unwrap();
        assert_eq!(outcome.summary.skipped_orphan, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_collisions_counted_last_row_wins() {
        let store = Arc::new(MemoryStore::new());
        let outcome = import_regions(
            &store,
            "INSERT INTO `states` VALUES (1,'Old Name','DUP'),(2,'Other','OT'),(3,'New Name','DUP'),(4,'Fourth','FO');",
        )
        .await;

        assert_eq!(outcome.summary.collisions, 1);
        assert_eq!(outcome.map.get(1), outcome.map.get(3));
        let dup = store.get(outcome.map.get(1).unwrap()).unwrap();
        assert_eq!(dup.name, "New Name");
        assert_eq!(store.entities(Level::Region).len(), 3);
    }

    #[tokio::test]
    async fn test_empty_table_completes_with_zero_rows() {
        let store = Arc::new(MemoryStore::new());
        let outcome = import_regions(&store, "INSERT INTO `lgas` VALUES (1,1,'x','x');").await;
        assert_eq!(outcome.summary.seen, 0);
        assert!(outcome.summary.source_missing());
        assert!(outcome.summary.completed);
        assert!(outcome.map.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_level_reports_partial_progress() {
        let store = Arc::new(MemoryStore::new());
        let cancel = CancelToken::new();
        cancel.cancel();
        let descriptor = LevelDescriptor::positional(Level::Region, "states");
        let rows = extract_table(
            "INSERT INTO `states` VALUES (1,'A','A'),(2,'B','B'),(3,'C','C'),(4,'D','D');",
            "states",
        );
        let w = BatchWriter::new(store.clone(), Level::Region, 2, 1, cancel);
        let outcome = HierarchicalImporter::new(&descriptor, None)
            .run(rows, w)
            .await
            .unwrap();
        assert!(outcome.cancelled);
        assert!(!outcome.summary.completed);
        assert_eq!(outcome.summary.imported, 0);
        assert!(store.is_empty());
    }
}
