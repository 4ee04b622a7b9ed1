//! PostgREST-style client for the hosted explanation table

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use super::RemoteStore;
use crate::config::StoreConfig;
use crate::core::error::{StoreError, StoreResult};
use crate::core::types::{CacheEntry, MisconceptionRecord};

const PREFER: &str = "prefer";
const REQUEST_ID: &str = "x-request-id";

/// Store backed by a hosted relational table exposed over REST
#[derive(Clone)]
pub struct RestStore {
    config: Arc<StoreConfig>,
    http_client: Client,
    base_url: Url,
}

impl RestStore {
    /// Create a new REST store client
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let mut base_url = Url::parse(&config.base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut http_client_builder = Client::builder().timeout(config.timeout());

        if let Some(ref key) = config.api_key {
            let mut headers = HeaderMap::new();
            headers.insert("apikey", header_value(key)?);
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", key))?);
            http_client_builder = http_client_builder.default_headers(headers);
        }

        let http_client = http_client_builder.build()?;

        Ok(Self {
            config: Arc::new(config),
            http_client,
            base_url,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn table_url(&self) -> StoreResult<Url> {
        Ok(self
            .base_url
            .join(&format!("rest/v1/{}", self.config.table))?)
    }

    fn rpc_url(&self) -> StoreResult<Url> {
        Ok(self
            .base_url
            .join(&format!("rest/v1/rpc/{}", self.config.misconception_procedure))?)
    }

    /// Send a request, tagging it with a fresh request id and mapping
    /// non-success statuses to errors
    async fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let response = request.header(REQUEST_ID, &request_id).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        debug!("Request {} failed: status={}, body={}", request_id, status, message);
        match status {
            StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => Err(StoreError::Unavailable(format!(
                "{}: {}",
                status, message
            ))),
            _ => Err(StoreError::Server {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

fn header_value(value: &str) -> StoreResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| StoreError::InvalidConfig(format!("invalid header value: {e}")))
}

/// Turn a literal key prefix into a PostgREST `like` pattern
pub(crate) fn like_prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 8);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_' | '*') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn select(&self, key: &str) -> StoreResult<Option<CacheEntry>> {
        debug!("SELECT key={}", key);
        let request = self
            .http_client
            .get(self.table_url()?)
            .query(&[("cache_key", format!("eq.{key}")), ("select", "*".to_string())]);

        let rows: Vec<CacheEntry> = self.send(request).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert(&self, entry: &CacheEntry) -> StoreResult<()> {
        debug!("UPSERT key={}, size={}", entry.key, entry.explanation.len());
        let request = self
            .http_client
            .post(self.table_url()?)
            .query(&[("on_conflict", "cache_key")])
            .header(PREFER, "resolution=merge-duplicates,return=minimal")
            .json(entry);

        self.send(request).await?;
        Ok(())
    }

    async fn update_usage(
        &self,
        key: &str,
        usage_count: u64,
        last_accessed: DateTime<Utc>,
    ) -> StoreResult<()> {
        debug!("UPDATE key={}, usage_count={}", key, usage_count);
        let request = self
            .http_client
            .patch(self.table_url()?)
            .query(&[("cache_key", format!("eq.{key}"))])
            .header(PREFER, "return=minimal")
            .json(&json!({
                "usage_count": usage_count,
                "last_accessed": timestamp(last_accessed),
            }));

        self.send(request).await?;
        Ok(())
    }

    async fn delete_stale(&self, prefix: &str, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let request = self
            .http_client
            .delete(self.table_url()?)
            .query(&[
                ("cache_key", format!("like.{}", like_prefix_pattern(prefix))),
                ("last_accessed", format!("lt.{}", timestamp(cutoff))),
                ("select", "cache_key".to_string()),
            ])
            .header(PREFER, "return=representation");

        let removed: Vec<serde_json::Value> = self.send(request).await?.json().await?;
        debug!("DELETE prefix={}, cutoff={}, removed={}", prefix, cutoff, removed.len());
        Ok(removed.len() as u64)
    }

    async fn fetch_misconceptions(
        &self,
        student_id: &str,
    ) -> StoreResult<Vec<MisconceptionRecord>> {
        debug!("RPC {} student={}", self.config.misconception_procedure, student_id);
        let request = self
            .http_client
            .post(self.rpc_url()?)
            .json(&json!({ "p_student_id": student_id }));

        Ok(self.send(request).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_creation() {
        let store = RestStore::new(StoreConfig::new("http://localhost:54321"));
        assert!(store.is_ok());
    }

    #[test]
    fn test_store_with_api_key() {
        let store = RestStore::new(StoreConfig::new("http://localhost:54321").with_api_key("anon"));
        assert!(store.is_ok());
    }

    #[test]
    fn test_invalid_url() {
        let store = RestStore::new(StoreConfig::new("not-a-valid-url"));
        assert!(matches!(store, Err(StoreError::InvalidUrl(_))));
    }

    #[test]
    fn test_invalid_api_key_header() {
        let store = RestStore::new(StoreConfig::new("http://localhost:54321").with_api_key("bad\nkey"));
        assert!(matches!(store, Err(StoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_base_path_gets_trailing_slash() {
        let store = RestStore::new(StoreConfig::new("http://localhost:54321/project")).unwrap();
        assert_eq!(store.base_url().as_str(), "http://localhost:54321/project/");
        assert_eq!(
            store.table_url().unwrap().as_str(),
            "http://localhost:54321/project/rest/v1/explanation_cache"
        );
        assert_eq!(
            store.rpc_url().unwrap().as_str(),
            "http://localhost:54321/project/rest/v1/rpc/get_student_misconceptions"
        );
    }

    #[test]
    fn test_like_pattern_escapes_metacharacters() {
        assert_eq!(like_prefix_pattern("alice::"), "alice::*");
        assert_eq!(like_prefix_pattern("a_b%2A::"), "a\\_b\\%2A::*");
    }

    #[test]
    fn test_timestamp_format() {
        let ts = DateTime::parse_from_rfc3339("2026-01-02T03:04:05.678Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(timestamp(ts), "2026-01-02T03:04:05.678Z");
    }
}
