pub mod aggregator;
pub mod cache_key;
pub mod error;
pub mod explanation_cache;
pub mod retry;
pub mod types;

pub use aggregator::MisconceptionAggregator;
pub use cache_key::{KEY_SEPARATOR, derive_key, student_prefix};
pub use error::{CacheError, StoreError};
pub use explanation_cache::ExplanationCache;
pub use retry::{ErrorCallback, RetryError, RetryExecutor, RetryOptions};
pub use types::{
    CacheEntry, CacheStats, DEFAULT_API_SOURCE, MisconceptionRecord, MisconceptionReport,
    MisconceptionSummary,
};
