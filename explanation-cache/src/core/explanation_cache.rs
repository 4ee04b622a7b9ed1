use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::cache_key::{derive_key, student_prefix};
use super::error::{CacheError, Result, StoreError};
use super::retry::{RetryExecutor, RetryOptions};
use super::types::{
    CacheEntry, CacheStats, DEFAULT_API_SOURCE, MisconceptionRecord, MisconceptionReport,
    MisconceptionSummary,
};
use crate::config::{CacheConfig, EvictionConfig, RetryConfig};
use crate::store::RemoteStore;

/// Per-student explanation cache over a remote store.
///
/// Every lookup goes to the store; there is no in-process copy of entries.
/// Store failures on the read, eviction and bookkeeping paths are logged and
/// degrade to a miss. Only invalid keys and exhausted population retries
/// reach the caller.
pub struct ExplanationCache {
    store: Arc<dyn RemoteStore>,
    retry: RetryConfig,
    eviction: EvictionConfig,
    stats: RwLock<CacheStats>,
}

impl ExplanationCache {
    /// Create a cache with default retry and eviction settings
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self::with_config(store, &CacheConfig::default())
    }

    pub fn with_config(store: Arc<dyn RemoteStore>, config: &CacheConfig) -> Self {
        info!(
            "Initializing explanation cache with max_attempts={}, base_delay={}ms, max_age={}d",
            config.retry.max_attempts, config.retry.base_delay_ms, config.eviction.max_age_days
        );

        Self {
            store,
            retry: config.retry.clone(),
            eviction: config.eviction.clone(),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// Snapshot of the in-process counters
    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    /// Return the cached explanation for a misconception, if any.
    ///
    /// A hit bumps `usage_count` and `last_accessed` on a best-effort basis:
    /// the explanation is returned even when that update fails. The bump is
    /// a read followed by a write of `usage_count + 1`, so concurrent hits on
    /// the same key can lose increments.
    pub async fn lookup(&self, student_id: &str, code: &str) -> Result<Option<String>> {
        let key = derive_key(student_id, code)?;
        debug!("LOOKUP key={}", key);
        self.stats.write().lookups += 1;

        let entry = match self.store.select(&key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.stats.write().misses += 1;
                return Ok(None);
            }
            Err(err) => {
                self.store_failure("select", &key, err);
                self.stats.write().misses += 1;
                return Ok(None);
            }
        };

        let usage_count = entry.usage_count.saturating_add(1);
        if let Err(err) = self.store.update_usage(&key, usage_count, Utc::now()).await {
            self.store_failure("update usage", &key, err);
        }

        self.stats.write().hits += 1;
        Ok(Some(entry.explanation))
    }

    /// Write (or overwrite) the explanation for a misconception.
    ///
    /// The upsert runs through a [`RetryExecutor`] built from the configured
    /// retry settings; once every attempt has failed the caller gets
    /// [`CacheError::SaveFailed`].
    pub async fn populate(
        &self,
        student_id: &str,
        code: &str,
        explanation: &str,
        api_source: &str,
    ) -> Result<()> {
        let executor = self.retry_executor();
        self.populate_with(&executor, student_id, code, explanation, api_source)
            .await
    }

    /// Executor carrying the configured retry settings, for callers that
    /// want to observe population progress through [`populate_with`](Self::populate_with)
    pub fn retry_executor(&self) -> RetryExecutor<StoreError> {
        RetryExecutor::new(RetryOptions::from(&self.retry))
    }

    /// [`populate`](Self::populate) through a caller-owned executor whose
    /// `attempts()` and `is_retrying()` can be watched while the write runs
    pub async fn populate_with(
        &self,
        executor: &RetryExecutor<StoreError>,
        student_id: &str,
        code: &str,
        explanation: &str,
        api_source: &str,
    ) -> Result<()> {
        let key = derive_key(student_id, code)?;
        debug!("POPULATE key={}, source={}, size={}", key, api_source, explanation.len());

        let entry = CacheEntry::new(key, explanation, api_source);

        match executor.run(|| self.store.upsert(&entry)).await {
            Ok(()) => {
                self.stats.write().populates += 1;
                Ok(())
            }
            Err(err) => {
                let attempts = err.attempts();
                let source = err.into_source();
                error!(
                    key = %entry.key,
                    attempts = attempts,
                    error = %source,
                    "Could not save explanation"
                );
                self.stats.write().populate_failures += 1;
                Err(CacheError::SaveFailed { attempts, source })
            }
        }
    }

    /// [`populate`](Self::populate) with the default `"local"` source tag
    pub async fn populate_local(&self, student_id: &str, code: &str, explanation: &str) -> Result<()> {
        self.populate(student_id, code, explanation, DEFAULT_API_SOURCE)
            .await
    }

    /// Fetch a student's misconceptions and annotate each with its cache status
    pub async fn load_all_with_status(&self, student_id: &str) -> Result<MisconceptionReport> {
        // Validate before touching the store
        student_prefix(student_id)?;

        let records = match self.store.fetch_misconceptions(student_id).await {
            Ok(records) => records,
            Err(err) => {
                self.store_failure("fetch misconceptions", student_id, err);
                Vec::new()
            }
        };

        Ok(self.annotate(student_id, records).await)
    }

    /// Look up every record concurrently; output keeps the input order
    pub async fn annotate(
        &self,
        student_id: &str,
        records: Vec<MisconceptionRecord>,
    ) -> MisconceptionReport {
        let lookups = records
            .iter()
            .map(|record| self.lookup(student_id, &record.red_herring));
        let explanations = join_all(lookups).await;

        let summaries: Vec<MisconceptionSummary> = records
            .into_iter()
            .zip(explanations)
            .map(|(record, explanation)| {
                let explanation = explanation.unwrap_or_else(|err| {
                    warn!("Skipping cache lookup for {:?}: {}", record.red_herring, err);
                    None
                });
                MisconceptionSummary::from_record(record, explanation)
            })
            .collect();

        let report = MisconceptionReport::new(summaries);
        debug!(
            "Annotated {} misconceptions for student={}, hit_rate={:.1}%",
            report.summaries.len(),
            student_id,
            report.hit_rate
        );
        report
    }

    /// Delete this student's entries not read in the last `max_age_days`.
    ///
    /// Only keys under the student's own prefix are considered. Returns the
    /// number of entries removed (0 when the store fails).
    pub async fn evict_older_than(&self, student_id: &str, max_age_days: u32) -> Result<u64> {
        let prefix = student_prefix(student_id)?;
        // Ages reaching past the representable range keep every entry
        let cutoff = TimeDelta::try_days(i64::from(max_age_days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        match self.store.delete_stale(&prefix, cutoff).await {
            Ok(removed) => {
                if removed > 0 {
                    info!(
                        "Evicted {} entries for student={} older than {}d",
                        removed, student_id, max_age_days
                    );
                }
                self.stats.write().evictions += removed;
                Ok(removed)
            }
            Err(err) => {
                self.store_failure("evict", &prefix, err);
                Ok(0)
            }
        }
    }

    /// [`evict_older_than`](Self::evict_older_than) with the configured age
    pub async fn evict_stale(&self, student_id: &str) -> Result<u64> {
        self.evict_older_than(student_id, self.eviction.max_age_days)
            .await
    }

    fn store_failure(&self, operation: &str, target: &str, err: StoreError) {
        let err = CacheError::from(err);
        warn!("Store {} failed for {}: {}", operation, target, err);
        self.stats.write().store_errors += 1;
    }
}
