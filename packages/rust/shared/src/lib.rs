//! Shared types, error model, and configuration for dartsearch.
//!
//! This crate is the foundation depended on by all other dartsearch crates.
//! It provides:
//! - [`DartSearchError`] — the unified error type
//! - Domain types ([`ExpandedQuery`], [`FilingRef`], [`Filing`], [`ResponseEnvelope`])
//! - Configuration ([`AppConfig`], loaded from the environment)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{AppConfig, DartConfig, LlmConfig, PipelineConfig};
pub use error::{DartSearchError, Result};
pub use types::{
    Confidence, DateRange, EnvelopeSummary, ExpandedQuery, FetchError, FetchSource, Filing,
    FilingRef, PartialFailure, ResponseEnvelope, RunOptions, RunTelemetry, MAX_DOCS_TO_FILTER,
    MAX_DOCS_TO_RETURN,
};
