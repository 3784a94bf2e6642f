//! Registry of known data sources

pub mod source_catalog;

pub use source_catalog::{CatalogError, SourceCatalog};
