//! # Explanation Cache
//!
//! Per-student cache of misconception explanations backed by a remote store.
//!
//! - **Cache keys**: deterministic `<student>::<code>` keys, scoped per student
//! - **Lookup**: every read goes to the store and bumps usage bookkeeping
//! - **Population**: upserts retried with exponential backoff
//! - **Eviction**: age-based deletes restricted to one student's keys
//! - **Aggregation**: misconception lists annotated with cache hit status
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use explanation_cache::{ExplanationCache, RestStore, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = RestStore::new(StoreConfig::new("http://localhost:54321").with_api_key("anon"))?;
//!     let cache = ExplanationCache::new(Arc::new(store));
//!
//!     if cache.lookup("student-1", "RH_12").await?.is_none() {
//!         cache.populate_local("student-1", "RH_12", "Dividing by a fraction...").await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod logging;
pub mod store;

// Re-export commonly used types
pub use config::{CacheConfig, EvictionConfig, LoggingConfig, RetryConfig, StoreConfig};
pub use crate::core::{
    CacheEntry, CacheError, CacheStats, ExplanationCache, MisconceptionAggregator,
    MisconceptionRecord, MisconceptionReport, MisconceptionSummary, RetryError, RetryExecutor,
    RetryOptions, StoreError, derive_key, student_prefix,
};
pub use crate::core::error::Result;
pub use store::{MemoryStore, RemoteStore, RestStore};
