//! Networking substrate for dartsearch: the rate-limited HTTP client and the
//! fingerprint-addressed content cache.
//!
//! Both are process-wide and concurrency-safe; pipeline runs share them.

mod cache;
mod client;
mod limiter;

pub use cache::{fingerprint, ContentCache, TTL_BODY, TTL_DIRECTORY, TTL_SEARCH};
pub use client::{HttpResponse, RateLimitedClient};
pub use limiter::HostLimiter;
