//! Pipeline driver: runs the four levels in strict dependency order.
//!
//! ```text
//! dump ─► DumpIndex ─► region ─► sub_region ─► area ─► unit
//!                        │  ▲        │  ▲         │  ▲
//!                        ▼  │        ▼  │         ▼  │
//!                     IdentifierMap (frozen after each level)
//! ```
//!
//! The dump stays in memory for the whole run so each level re-lexes only
//! its own statements instead of re-reading the file.

use crate::cancel::CancelToken;
use crate::config::ImportConfig;
use crate::error::ImportError;
use crate::importer::HierarchicalImporter;
use crate::remap::IdentifierRemapper;
use crate::summary::ImportSummary;
use crate::writer::BatchWriter;
use georef_ingest_sql::DumpIndex;
use georef_storage::Store;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct Pipeline {
    store: Arc<dyn Store>,
    config: ImportConfig,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(store: Arc<dyn Store>, config: ImportConfig) -> Result<Self, ImportError> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            cancel: CancelToken::new(),
        })
    }

    /// Use an externally controlled cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Read the dump at `path` and run every level.
    pub async fn run_file(&self, path: &Path) -> Result<ImportSummary, ImportError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ImportError::ReadDump {
                path: path.to_path_buf(),
                source,
            })?;
        let dump = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    "dump is not valid UTF-8, invalid sequences replaced"
                );
                String::from_utf8_lossy(err.as_bytes()).into_owned()
            }
        };
        tracing::info!(path = %path.display(), bytes = dump.len(), "read dump");
        self.run(&dump).await
    }

    /// Run every level against an in-memory dump.
    pub async fn run(&self, dump: &str) -> Result<ImportSummary, ImportError> {
        self.store.ping().await?;

        let cancel = match self.config.deadline_secs {
            Some(secs) => self.cancel.clone().with_deadline(Duration::from_secs(secs)),
            None => self.cancel.clone(),
        };

        let index = DumpIndex::build(dump);
        let mut remapper = IdentifierRemapper::new();
        let mut summary = ImportSummary::start();

        for descriptor in &self.config.levels {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let level = descriptor.level;
            let rows = index.extract(&descriptor.table);
            let parents = level.parent().and_then(|p| remapper.map(p));
            let writer = BatchWriter::new(
                Arc::clone(&self.store),
                level,
                self.config.batch_size,
                self.config.concurrency,
                cancel.clone(),
            );

            let outcome = HierarchicalImporter::new(descriptor, parents)
                .run(rows, writer)
                .await?;
            self.store.flush().await?;

            let s = &outcome.summary;
            tracing::info!(
                level = %level,
                table = %descriptor.table,
                seen = s.seen,
                created = s.created,
                updated = s.updated,
                unchanged = s.unchanged,
                skipped = s.skipped(),
                "level complete"
            );

            summary.levels.push(outcome.summary);
            remapper.complete(outcome.map);
            if outcome.cancelled {
                summary.cancelled = true;
                break;
            }
        }

        summary.finish();
        if summary.cancelled {
            tracing::warn!(
                levels_run = summary.levels.len(),
                "import cancelled; re-run to resume"
            );
        }
        Ok(summary)
    }
}
