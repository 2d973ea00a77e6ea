//! The deep-search pipeline over Korean corporate disclosures.
//!
//! [`DeepSearch`] wires the phases together: query expansion, catalogue
//! search, relevance filtering, body fetching, the sufficiency loop, and
//! answer synthesis. Construct one per process and call
//! [`DeepSearch::run`] per query.

pub mod fetch;
pub mod filter;
mod pipeline;
pub mod search;
pub mod sufficiency;
pub mod synthesize;

pub use pipeline::DeepSearch;
