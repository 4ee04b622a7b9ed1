use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use super::error::Result;
use super::explanation_cache::ExplanationCache;
use super::types::{MisconceptionReport, MisconceptionSummary};

/// Coordinates misconception loading for one UI context.
///
/// Only the latest snapshot is held, and only in memory; calling
/// [`refresh`](Self::refresh) again always replaces it with a fresh one.
pub struct MisconceptionAggregator {
    cache: Arc<ExplanationCache>,
    latest: RwLock<Option<MisconceptionReport>>,
}

impl MisconceptionAggregator {
    pub fn new(cache: Arc<ExplanationCache>) -> Self {
        Self {
            cache,
            latest: RwLock::new(None),
        }
    }

    /// Fetch the student's misconceptions, annotate them with cache status
    /// and keep the result as the latest snapshot
    pub async fn refresh(&self, student_id: &str) -> Result<MisconceptionReport> {
        let report = self.cache.load_all_with_status(student_id).await?;
        debug!(
            "Refreshed student={}: {} misconceptions, {} cached",
            student_id,
            report.summaries.len(),
            report.cached_count()
        );
        *self.latest.write() = Some(report.clone());
        Ok(report)
    }

    /// Summaries of the latest snapshot (empty before the first refresh)
    pub fn summaries(&self) -> Vec<MisconceptionSummary> {
        self.latest
            .read()
            .as_ref()
            .map(|report| report.summaries.clone())
            .unwrap_or_default()
    }

    /// Hit rate percentage of the latest snapshot
    pub fn hit_rate(&self) -> f64 {
        self.latest
            .read()
            .as_ref()
            .map_or(0.0, |report| report.hit_rate)
    }

    pub fn latest(&self) -> Option<MisconceptionReport> {
        self.latest.read().clone()
    }

    /// Drop the snapshot, e.g. when the owning view goes away
    pub fn clear(&self) {
        *self.latest.write() = None;
    }

    pub fn cache(&self) -> &Arc<ExplanationCache> {
        &self.cache
    }
}
