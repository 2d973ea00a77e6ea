//! Error types for dartsearch.
//!
//! Library crates use [`DartSearchError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

/// Top-level error type for all dartsearch operations.
#[derive(Debug, thiserror::Error)]
pub enum DartSearchError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Query expansion produced an invalid or unusable result.
    #[error("expansion failed: {0}")]
    ExpansionFailed(String),

    /// Every catalogue sub-query failed; no search results are available.
    #[error("search unavailable: {0}")]
    SearchUnavailable(String),

    /// A token could not be acquired before the caller's deadline.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// A document body could not be retrieved from any source.
    #[error("fetch failed for {rcept_no}: {message}")]
    FetchFailed { rcept_no: String, message: String },

    /// The LLM endpoint is unreachable or returned an unusable response.
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    /// The run was cancelled by its owner.
    #[error("cancelled")]
    Cancelled,

    /// Network/HTTP error below the retry layer.
    #[error("network error: {0}")]
    Network(String),

    /// Wire-format or content parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Anything that should never happen in a healthy deployment.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DartSearchError>;

impl DartSearchError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a fetch error for a specific filing.
    pub fn fetch(rcept_no: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::FetchFailed {
            rcept_no: rcept_no.into(),
            message: msg.into(),
        }
    }

    /// Short stable name for telemetry (`partial_failures[].kind`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "Config",
            Self::ExpansionFailed(_) => "ExpansionFailed",
            Self::SearchUnavailable(_) => "SearchUnavailable",
            Self::RateLimited(_) => "RateLimited",
            Self::FetchFailed { .. } => "FetchFailed",
            Self::LlmUnavailable(_) => "LLMUnavailable",
            Self::Cancelled => "Cancelled",
            Self::Network(_) => "Network",
            Self::Parse { .. } => "Parse",
            Self::Internal(_) => "Internal",
        }
    }
}
