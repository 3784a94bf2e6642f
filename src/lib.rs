//! # Quarry
//!
//! Quarry runs SPARQL queries over a selected set of knowledge-graph sources and
//! turns the engine's result stream into observable session state.
//!
//! A [`QuerySession`](api::query_session::QuerySession) is created per query
//! panel. Each submission derives an engine context from the selected sources,
//! hands the engine's lazy result sequence to a stream controller, and exposes
//! the evolving results, column set, run state and elapsed time through watch
//! channels. Publication of results is coalesced: small result sets appear
//! record by record, large ones at a bounded rate, and the tail is always
//! published when the run ends.
//!
//! ## Features
//!
//! - Exactly-once terminal transitions across completion, stream errors and
//!   user interruption
//! - Rate-limited, prefix-consistent result snapshots
//! - Source catalog with direct SPARQL and compound (SPARQL + TPF) sources
//! - Oxigraph-backed local engine and a SPARQL protocol engine
//! - HTTP/WebSocket surface and CSV export
//!
//! ## Example
//!
//! ```ignore
//! use quarry::api::query_session::QuerySession;
//! use quarry::core::Source;
//! use quarry::querying::oxigraph_adapter::OxigraphEngine;
//!
//! let engine = OxigraphEngine::new();
//! engine.load_file("file://data.nt", "data.nt")?;
//! let session = QuerySession::new(engine);
//! let source = Source::sparql("Local", "local", "file://data.nt");
//!
//! session.run_query("SELECT * WHERE { ?s ?p ?o } LIMIT 10", &[source]).await?;
//! let status = session.wait_until_stopped().await;
//! println!("{} results in {}", session.results().len(), session.seconds_string());
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::new_without_default)]
#![allow(clippy::unnecessary_map_or)]

/// Core data structures and types
pub mod core;

/// Query engine contract, lazy result sequences and engine adapters
pub mod querying;

/// Result accumulation, elapsed-time tracking and stream lifecycle control
pub mod execution;

/// Session-level API consumed by UI layers
pub mod api;

/// Registry of known data sources
pub mod registry;

/// Result export formats
pub mod export;

/// HTTP and WebSocket surface
pub mod http;

/// Configuration structures and utilities
pub mod config;

pub mod error {
    //! Error types and result definitions

    use thiserror::Error;

    use crate::api::query_session::SessionError;
    use crate::config::ConfigError;
    use crate::export::csv::ExportError;
    use crate::querying::query_processing::EngineError;
    use crate::registry::source_catalog::CatalogError;

    /// Result type alias for Quarry operations
    pub type Result<T> = std::result::Result<T, Error>;

    /// Main error type for Quarry
    #[derive(Debug, Error)]
    pub enum Error {
        /// Configuration error
        #[error("Configuration error: {0}")]
        Config(#[from] ConfigError),
        /// Engine error
        #[error("Engine error: {0}")]
        Engine(#[from] EngineError),
        /// Session error
        #[error("Session error: {0}")]
        Session(#[from] SessionError),
        /// Source catalog error
        #[error("Catalog error: {0}")]
        Catalog(#[from] CatalogError),
        /// Export error
        #[error("Export error: {0}")]
        Export(#[from] ExportError),
        /// IO error
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),
    }
}

// Re-export commonly used types
pub use error::{Error, Result};
