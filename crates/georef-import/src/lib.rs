//! Hierarchical import of SQL dump rows into the georef store
//!
//! Four levels are imported strictly top-down:
//!
//! ```text
//! region (states) → sub_region (lgas) → area (wards) → unit (polling_units)
//! ```
//!
//! Each level's rows come from [`georef_ingest_sql`], each row's legacy parent
//! id is resolved through the parent level's frozen [`IdentifierMap`], and
//! records are upserted by natural key `(parent id, code)` in bounded batches
//! through [`BatchWriter`]. Re-running against the same dump is a no-op.
//!
//! Anomalies never abort a run. They are counted per level in
//! [`LevelSummary`]; only an unreadable dump, an unreachable store, or an
//! invalid configuration produce an [`ImportError`].

pub mod cancel;
pub mod config;
pub mod error;
pub mod importer;
pub mod pipeline;
pub mod remap;
pub mod summary;
pub mod writer;

#[cfg(test)]
mod test_support;

pub use cancel::CancelToken;
pub use config::{ColumnRef, ImportConfig, LevelColumns, LevelDescriptor, ResolvedColumns};
pub use error::ImportError;
pub use importer::{HierarchicalImporter, LevelOutcome};
pub use pipeline::Pipeline;
pub use remap::{IdentifierMap, IdentifierRemapper, LegacyId};
pub use summary::{ImportSummary, LevelSummary};
pub use writer::{BatchWriter, EntityRecord, WriteOutcome, WriteStats};
