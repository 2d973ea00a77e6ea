//! DART-side collaborators: the wire adapter for the open API, the company
//! directory with fuzzy resolution, and the body cleanup passes.

pub mod cleanup;
mod directory;
mod transport;

pub use directory::{normalize_name, Candidate, CompanyDirectory, CompanyRecord};
pub use transport::{CatalogPage, CatalogQuery, DartTransport, StructuredEndpoint};
