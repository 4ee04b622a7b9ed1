//! Common test utilities

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use explanation_cache::core::error::StoreResult;
use explanation_cache::{
    CacheEntry, MemoryStore, MisconceptionRecord, RemoteStore, RestStore, StoreConfig, StoreError,
};
use mockito::{Server, ServerGuard};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Setup a REST store pointing to a mock server
#[allow(dead_code)] // Used by other test modules
pub async fn setup_test_store() -> (RestStore, ServerGuard) {
    let server = Server::new_async().await;
    let config = StoreConfig::new(server.url()).with_timeout(std::time::Duration::from_secs(5));
    let store = RestStore::new(config).unwrap();
    (store, server)
}

/// Memory store wrapper whose operations can be made to fail on demand
#[allow(dead_code)]
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    /// Number of upcoming upserts that fail
    pub failing_upserts: AtomicU32,
    pub upsert_calls: AtomicU32,
    pub fail_selects: AtomicBool,
    pub fail_updates: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub fail_fetches: AtomicBool,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_upserts(&self, count: u32) {
        self.failing_upserts.store(count, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, operation: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(format!("{operation} refused")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for FlakyStore {
    async fn select(&self, key: &str) -> StoreResult<Option<CacheEntry>> {
        Self::check(&self.fail_selects, "select")?;
        self.inner.select(key).await
    }

    async fn upsert(&self, entry: &CacheEntry) -> StoreResult<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_upserts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_upserts.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("upsert refused".to_string()));
        }
        self.inner.upsert(entry).await
    }

    async fn update_usage(
        &self,
        key: &str,
        usage_count: u64,
        last_accessed: DateTime<Utc>,
    ) -> StoreResult<()> {
        Self::check(&self.fail_updates, "update")?;
        self.inner.update_usage(key, usage_count, last_accessed).await
    }

    async fn delete_stale(&self, prefix: &str, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        Self::check(&self.fail_deletes, "delete")?;
        self.inner.delete_stale(prefix, cutoff).await
    }

    async fn fetch_misconceptions(
        &self,
        student_id: &str,
    ) -> StoreResult<Vec<MisconceptionRecord>> {
        Self::check(&self.fail_fetches, "fetch")?;
        self.inner.fetch_misconceptions(student_id).await
    }
}
