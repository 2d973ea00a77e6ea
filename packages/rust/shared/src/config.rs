//! Application configuration for dartsearch.
//!
//! Everything is read from the environment; there is no config file. Missing
//! optional variables fall back to documented defaults, a missing
//! `DART_API_KEY` is a startup error.

use crate::error::{DartSearchError, Result};

/// Default upstream filing API root.
const DEFAULT_DART_BASE_URL: &str = "https://opendart.fss.or.kr/api";

/// Default web viewer root.
const DEFAULT_VIEWER_URL: &str = "https://dart.fss.or.kr";

/// Default chat-completions root.
const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

/// Top-level application config, assembled from the process environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Filing API settings.
    pub dart: DartConfig,
    /// LLM provider settings. `None` when no endpoint is usable; every
    /// LLM-backed capability then runs its rule fallback.
    pub llm: Option<LlmConfig>,
    /// Pipeline tunables.
    pub pipeline: PipelineConfig,
}

/// Filing API connection and quota settings.
#[derive(Debug, Clone)]
pub struct DartConfig {
    /// API key, sent as the `crtfc_key` query parameter.
    pub api_key: String,
    /// API root, e.g. `https://opendart.fss.or.kr/api`.
    pub base_url: String,
    /// Web viewer root, used for provenance URLs and the HTML fallback.
    pub viewer_url: String,
    /// Daily token budget for the filing host.
    pub daily_rate_limit: u32,
    /// Burst tokens per second for the filing host.
    pub burst_per_second: u32,
}

/// LLM provider settings (OpenAI-compatible chat completions).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Endpoint root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Bearer token; empty for unauthenticated local endpoints.
    pub api_key: String,
    /// Model id.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Pipeline tunables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Post-dedup candidate cap handed to the filter phase.
    pub max_docs_to_filter: usize,
    /// Per-sub-query result cap (clamped to the catalogue's 100-row page).
    pub max_results_per_search: usize,
    /// Filings surviving the filter phase.
    pub max_docs_to_return: usize,
    /// Concurrent catalogue sub-queries.
    pub parallel_searches: usize,
    /// Concurrent document fetches.
    pub parallel_downloads: usize,
    /// Per-fetch timeout in milliseconds.
    pub fetch_timeout_ms: u64,
    /// Cache byte budget.
    pub cache_max_bytes: usize,
    /// Sufficiency loop bound.
    pub max_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_docs_to_filter: 100,
            max_results_per_search: 30,
            max_docs_to_return: 30,
            parallel_searches: 5,
            parallel_downloads: 3,
            fetch_timeout_ms: 30_000,
            cache_max_bytes: 512 * 1024 * 1024,
            max_attempts: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Environment loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Assemble the full configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let api_key = env_var("DART_API_KEY")
            .ok_or_else(|| DartSearchError::config("DART_API_KEY is not set"))?;

        let dart = DartConfig {
            api_key,
            base_url: env_var("DART_BASE_URL")
                .unwrap_or_else(|| DEFAULT_DART_BASE_URL.to_string()),
            viewer_url: env_var("DART_VIEWER_URL")
                .unwrap_or_else(|| DEFAULT_VIEWER_URL.to_string()),
            daily_rate_limit: env_parse("DART_API_RATE_LIMIT", 1000),
            burst_per_second: env_parse("DART_API_BURST", 5),
        };

        let llm = env_var("LLM_MODEL").map(|model| LlmConfig {
            base_url: env_var("LLM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            api_key: env_var("LLM_API_KEY").unwrap_or_default(),
            model,
            temperature: env_parse("LLM_TEMPERATURE", 0.2f32),
        });

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            max_docs_to_filter: env_parse("DART_MAX_SEARCH_RESULTS", defaults.max_docs_to_filter),
            max_results_per_search: env_parse(
                "DART_MAX_RESULTS_PER_SEARCH",
                defaults.max_results_per_search,
            )
            .min(100),
            parallel_searches: env_parse("DART_PARALLEL_SEARCHES", defaults.parallel_searches),
            parallel_downloads: env_parse("DART_PARALLEL_DOWNLOADS", defaults.parallel_downloads),
            fetch_timeout_ms: env_parse("DART_PARSE_TIMEOUT_MS", defaults.fetch_timeout_ms),
            cache_max_bytes: env_parse("DART_CACHE_MAX_BYTES", defaults.cache_max_bytes),
            max_attempts: env_parse("DART_MAX_ATTEMPTS", defaults.max_attempts),
            ..defaults
        };

        Ok(Self {
            dart,
            llm,
            pipeline,
        })
    }
}

/// Read an env var, treating empty values as unset.
fn env_var(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Read and parse an env var, falling back to `default` on absence or junk.
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env_var(name).and_then(|v| v.parse().ok()) {
        Some(v) => v,
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_defaults_match_documented_values() {
        let p = PipelineConfig::default();
        assert_eq!(p.max_docs_to_filter, 100);
        assert_eq!(p.max_results_per_search, 30);
        assert_eq!(p.max_docs_to_return, 30);
        assert_eq!(p.parallel_searches, 5);
        assert_eq!(p.parallel_downloads, 3);
        assert_eq!(p.fetch_timeout_ms, 30_000);
        assert_eq!(p.max_attempts, 3);
    }

    #[test]
    fn missing_api_key_is_an_error() {
        // Isolate from the ambient environment.
        std::env::remove_var("DART_API_KEY");
        let result = AppConfig::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("DART_API_KEY"));
    }

    #[test]
    fn env_parse_falls_back_on_junk() {
        std::env::set_var("DARTSEARCH_TEST_JUNK", "not-a-number");
        assert_eq!(env_parse("DARTSEARCH_TEST_JUNK", 7usize), 7);
        std::env::remove_var("DARTSEARCH_TEST_JUNK");
    }
}
