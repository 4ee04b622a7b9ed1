use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default provenance tag for explanations produced on the client
pub const DEFAULT_API_SOURCE: &str = "local";

/// Cached explanation record as stored in the remote table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Derived cache key, unique per (student, misconception)
    #[serde(rename = "cache_key")]
    pub key: String,
    /// Cached explanation text
    pub explanation: String,
    /// Which generator produced the explanation
    pub api_source: String,
    /// Number of successful reads (starts at 1 on population)
    pub usage_count: u64,
    /// When the entry was first written
    pub created_at: DateTime<Utc>,
    /// Last successful read
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    /// Create a freshly populated entry
    pub fn new(
        key: impl Into<String>,
        explanation: impl Into<String>,
        api_source: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            explanation: explanation.into(),
            api_source: api_source.into(),
            usage_count: 1,
            created_at: now,
            last_accessed: now,
        }
    }

    /// Whether the entry has not been read since `cutoff`
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_accessed < cutoff
    }
}

/// One outstanding misconception as returned by the student procedure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisconceptionRecord {
    /// Misconception code
    pub red_herring: String,
    #[serde(default)]
    pub frequency: u64,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl MisconceptionRecord {
    pub fn new(code: impl Into<String>, frequency: u64, topics: Vec<String>) -> Self {
        Self {
            red_herring: code.into(),
            frequency,
            topics,
        }
    }
}

/// Misconception annotated with its cache status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MisconceptionSummary {
    pub code: String,
    pub frequency: u64,
    pub topics: Vec<String>,
    pub explanation: Option<String>,
    pub from_cache: bool,
}

impl MisconceptionSummary {
    pub(crate) fn from_record(record: MisconceptionRecord, explanation: Option<String>) -> Self {
        Self {
            from_cache: explanation.is_some(),
            code: record.red_herring,
            frequency: record.frequency,
            topics: record.topics,
            explanation,
        }
    }
}

/// Annotated misconception list plus its cache hit rate
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MisconceptionReport {
    /// Summaries in the order the misconceptions were listed
    pub summaries: Vec<MisconceptionSummary>,
    /// Percentage of summaries served from the cache (0 when empty)
    pub hit_rate: f64,
}

impl MisconceptionReport {
    pub fn new(summaries: Vec<MisconceptionSummary>) -> Self {
        let hit_rate = hit_rate_percent(&summaries);
        Self {
            summaries,
            hit_rate,
        }
    }

    pub fn cached_count(&self) -> usize {
        self.summaries.iter().filter(|s| s.from_cache).count()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

fn hit_rate_percent(summaries: &[MisconceptionSummary]) -> f64 {
    if summaries.is_empty() {
        return 0.0;
    }
    let hits = summaries.iter().filter(|s| s.from_cache).count();
    hits as f64 / summaries.len() as f64 * 100.0
}

/// In-process counters for cache activity
#[derive(Debug, Default, Clone, Serialize)]
pub struct CacheStats {
    /// Number of lookup calls that reached the store
    pub lookups: u64,
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses (including degraded reads)
    pub misses: u64,
    /// Number of successful populations
    pub populates: u64,
    /// Number of populations that exhausted their retries
    pub populate_failures: u64,
    /// Number of entries removed by eviction
    pub evictions: u64,
    /// Number of store errors that were logged and swallowed
    pub store_errors: u64,
}

impl CacheStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
