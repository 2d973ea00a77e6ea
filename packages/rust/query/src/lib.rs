//! Natural-language query understanding: date phrases, the doc-type
//! taxonomy, and the LLM-assisted expander with its rule-based fallback.

pub mod dates;
pub mod doc_types;
mod expander;

pub use dates::{parse_date_phrase, ParsedWindow};
pub use expander::{Expansion, QueryExpander};
