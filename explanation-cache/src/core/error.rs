use thiserror::Error;

/// Errors raised by a [`RemoteStore`](crate::store::RemoteStore) backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP transport error (connection refused, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid base URL or endpoint
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Client configuration that cannot be turned into a request
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Backend could not be reached or refused to serve the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Backend answered with a non-success status
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
}

/// Main error type for explanation cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Could not save explanation after {attempts} attempts: {source}")]
    SaveFailed {
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Http(e) if e.is_connect() || e.is_timeout() => {
                Self::StoreUnavailable(e.to_string())
            }
            StoreError::Unavailable(msg) => Self::StoreUnavailable(msg),
            other => Self::Store(other.to_string()),
        }
    }
}

/// Result type alias for explanation cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Result type alias for store backends
pub type StoreResult<T> = std::result::Result<T, StoreError>;
