use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::RemoteStore;
use crate::core::error::StoreResult;
use crate::core::types::{CacheEntry, MisconceptionRecord};

/// In-memory store using a radix trie so per-student prefix scans stay cheap
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<Trie<String, CacheEntry>>>,
    misconceptions: Arc<RwLock<HashMap<String, Vec<MisconceptionRecord>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        info!("Initializing in-memory explanation store");
        Self {
            entries: Arc::new(RwLock::new(Trie::new())),
            misconceptions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Replace the misconception list returned for a student
    pub fn set_misconceptions(&self, student_id: &str, records: Vec<MisconceptionRecord>) {
        debug!("SET misconceptions student={}, count={}", student_id, records.len());
        self.misconceptions
            .write()
            .insert(student_id.to_string(), records);
    }

    /// Insert an entry as-is, bypassing the cache bookkeeping
    pub fn insert_entry(&self, entry: CacheEntry) {
        self.entries.write().insert(entry.key.clone(), entry);
    }

    /// Read an entry without touching its usage counters
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Keys stored under a prefix
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let entries = self.entries.read();
        entries
            .get_raw_descendant(prefix)
            .map(|subtrie| {
                subtrie
                    .keys()
                    .filter(|k| k.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn select(&self, key: &str) -> StoreResult<Option<CacheEntry>> {
        debug!("SELECT key={}", key);
        Ok(self.entries.read().get(key).cloned())
    }

    async fn upsert(&self, entry: &CacheEntry) -> StoreResult<()> {
        debug!("UPSERT key={}, size={}", entry.key, entry.explanation.len());
        self.entries.write().insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn update_usage(
        &self,
        key: &str,
        usage_count: u64,
        last_accessed: DateTime<Utc>,
    ) -> StoreResult<()> {
        debug!("UPDATE key={}, usage_count={}", key, usage_count);
        if let Some(entry) = self.entries.write().get_mut(key) {
            entry.usage_count = usage_count;
            entry.last_accessed = last_accessed;
        }
        Ok(())
    }

    async fn delete_stale(&self, prefix: &str, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut entries = self.entries.write();

        let stale: Vec<String> = entries
            .get_raw_descendant(prefix)
            .map(|subtrie| {
                subtrie
                    .iter()
                    .filter(|(k, v)| k.starts_with(prefix) && v.is_stale(cutoff))
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default();

        for key in &stale {
            entries.remove(key);
        }

        debug!("DELETE prefix={}, cutoff={}, removed={}", prefix, cutoff, stale.len());
        Ok(stale.len() as u64)
    }

    async fn fetch_misconceptions(
        &self,
        student_id: &str,
    ) -> StoreResult<Vec<MisconceptionRecord>> {
        debug!("FETCH misconceptions student={}", student_id);
        Ok(self
            .misconceptions
            .read()
            .get(student_id)
            .cloned()
            .unwrap_or_default())
    }
}
