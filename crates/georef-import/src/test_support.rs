//! Store double with injectable failures.

use async_trait::async_trait;
use georef_storage::{EntityId, Level, MemoryStore, Store, StoreError, StoredEntity, Upserted};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub struct FlakyStore {
    inner: MemoryStore,
    reject_codes: HashSet<String>,
    down: AtomicBool,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FlakyStore {
    pub fn rejecting(codes: &[&str]) -> Self {
        Self {
            inner: MemoryStore::new(),
            reject_codes: codes.iter().map(|c| c.to_string()).collect(),
            down: AtomicBool::new(false),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Some(Duration::from_millis(ms));
        self
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn ping(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }

    async fn upsert(
        &self,
        level: Level,
        parent_id: Option<EntityId>,
        name: &str,
        code: &str,
    ) -> Result<Upserted, StoreError> {
        self.ping().await?;
        if self.reject_codes.contains(code) {
            return Err(StoreError::Rejected {
                reason: format!("code `{code}` refused"),
            });
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.inner.upsert(level, parent_id, name, code).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn find(
        &self,
        level: Level,
        parent_id: Option<EntityId>,
        code: &str,
    ) -> Result<Option<StoredEntity>, StoreError> {
        self.inner.find(level, parent_id, code).await
    }
}
