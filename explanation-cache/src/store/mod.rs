//! Remote store contract and its backends
//!
//! - [`MemoryStore`]: radix-trie backed store for tests and embedded use
//! - [`RestStore`]: PostgREST-style HTTP client for the hosted table

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::error::StoreResult;
use crate::core::types::{CacheEntry, MisconceptionRecord};

pub use memory::MemoryStore;
pub use rest::RestStore;

/// Keyed record store holding cache entries, plus the procedure listing a
/// student's outstanding misconceptions
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Exact-key lookup
    async fn select(&self, key: &str) -> StoreResult<Option<CacheEntry>>;

    /// Insert or overwrite the entry stored under `entry.key`
    async fn upsert(&self, entry: &CacheEntry) -> StoreResult<()>;

    /// Write usage bookkeeping for an existing entry; missing keys are ignored
    async fn update_usage(
        &self,
        key: &str,
        usage_count: u64,
        last_accessed: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Delete entries whose key starts with `prefix` and whose
    /// `last_accessed` precedes `cutoff`. Returns the number removed.
    async fn delete_stale(&self, prefix: &str, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    /// Current misconception list of a student
    async fn fetch_misconceptions(&self, student_id: &str)
    -> StoreResult<Vec<MisconceptionRecord>>;
}
