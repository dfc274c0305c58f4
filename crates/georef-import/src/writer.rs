//! Bounded-batch upsert writer.
//!
//! Records are buffered up to `batch_size` and flushed as one batch of
//! per-record upserts. Within a batch, records are grouped by natural key:
//! distinct groups run concurrently (at most `concurrency` at a time) while
//! records sharing a key run one after another in source order, so the last
//! row of the dump wins. A batch is complete only when every task joined.

use crate::cancel::CancelToken;
use crate::error::ImportError;
use crate::remap::LegacyId;
use georef_storage::{EntityId, Level, Store, StoreError, UpsertOutcome, Upserted};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// A row ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub level: Level,
    pub parent_id: Option<EntityId>,
    pub name: String,
    pub code: String,
    /// Kept only to populate the level's identifier map.
    pub legacy_id: LegacyId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteStats {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl WriteStats {
    pub fn written(&self) -> usize {
        self.created + self.updated + self.unchanged
    }

    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

/// What a writer produced once it stops accepting records.
#[derive(Debug, Clone, Default)]
pub struct WriteOutcome {
    pub stats: WriteStats,
    /// `(legacy id, stored id)` for every successful write, in source order.
    pub written: Vec<(LegacyId, EntityId)>,
    pub batches: usize,
}

pub struct BatchWriter {
    store: Arc<dyn Store>,
    level: Level,
    batch_size: usize,
    concurrency: usize,
    cancel: CancelToken,
    pending: Vec<EntityRecord>,
    outcome: WriteOutcome,
}

impl BatchWriter {
    pub fn new(
        store: Arc<dyn Store>,
        level: Level,
        batch_size: usize,
        concurrency: usize,
        cancel: CancelToken,
    ) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            level,
            batch_size,
            concurrency: concurrency.max(1),
            cancel,
            pending: Vec::with_capacity(batch_size),
            outcome: WriteOutcome::default(),
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn stats(&self) -> WriteStats {
        self.outcome.stats
    }

    /// Buffer a record, flushing when the batch is full.
    pub async fn push(&mut self, record: EntityRecord) -> Result<(), ImportError> {
        self.pending.push(record);
        if self.pending.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Write the pending batch. Cancellation is honored here, before a
    /// batch starts; pending records are then dropped unwritten.
    pub async fn flush(&mut self) -> Result<(), ImportError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            tracing::warn!(
                level = %self.level,
                dropped = self.pending.len(),
                "cancelled before batch start"
            );
            self.pending.clear();
            return Err(ImportError::Cancelled);
        }

        let records = Arc::new(std::mem::take(&mut self.pending));
        let results = self.write_batch(Arc::clone(&records)).await;

        let mut fatal: Option<StoreError> = None;
        for (record, result) in records.iter().zip(results) {
            match result {
                Some(Ok(upserted)) => {
                    self.outcome.stats.record(upserted.outcome);
                    self.outcome.written.push((record.legacy_id, upserted.id));
                }
                Some(Err(err)) if err.is_fatal() => {
                    fatal.get_or_insert(err);
                }
                Some(Err(err)) => {
                    self.outcome.stats.failed += 1;
                    tracing::warn!(
                        level = %record.level,
                        legacy_id = record.legacy_id,
                        code = %record.code,
                        name = %record.name,
                        error = %err,
                        "write rejected, record skipped"
                    );
                }
                None => {
                    self.outcome.stats.failed += 1;
                    tracing::warn!(
                        level = %record.level,
                        legacy_id = record.legacy_id,
                        code = %record.code,
                        "write task aborted, record skipped"
                    );
                }
            }
        }
        if let Some(err) = fatal {
            return Err(ImportError::Store(err));
        }

        self.outcome.batches += 1;
        tracing::info!(
            level = %self.level,
            batch = self.outcome.batches,
            records = records.len(),
            written = self.outcome.stats.written(),
            failed = self.outcome.stats.failed,
            "flushed batch"
        );
        Ok(())
    }

    /// Flush what is left and hand back the results.
    pub async fn finish(mut self) -> Result<WriteOutcome, ImportError> {
        self.flush().await?;
        Ok(self.outcome)
    }

    /// Results so far, without flushing.
    pub fn into_outcome(self) -> WriteOutcome {
        self.outcome
    }

    async fn write_batch(
        &self,
        records: Arc<Vec<EntityRecord>>,
    ) -> Vec<Option<Result<Upserted, StoreError>>> {
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut group_of: HashMap<(Option<EntityId>, &str), usize> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            let slot = *group_of
                .entry((record.parent_id, record.code.as_str()))
                .or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
            groups[slot].push(i);
        }

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for group in groups {
            let store = Arc::clone(&self.store);
            let records = Arc::clone(&records);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let mut out = Vec::with_capacity(group.len());
                for i in group {
                    let r = &records[i];
                    let result = store.upsert(r.level, r.parent_id, &r.name, &r.code).await;
                    let stop = matches!(&result, Err(e) if e.is_fatal());
                    out.push((i, result));
                    if stop {
                        break;
                    }
                }
                out
            });
        }

        let mut results: Vec<Option<Result<Upserted, StoreError>>> =
            (0..records.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(out) => {
                    for (i, result) in out {
                        results[i] = Some(result);
                    }
                }
                Err(err) => tracing::error!(level = %self.level, error = %err, "write task failed"),
            }
        }
        results
    }
}
