//! Query Engine Module
//!
//! Quarry does not evaluate SPARQL itself. It hands a query and a
//! [`QueryContext`](query_processing::QueryContext) to a
//! [`QueryEngine`](query_processing::QueryEngine) and consumes whatever result
//! shape comes back.
//!
//! # Components
//!
//! - **query_processing** - The engine contract, source descriptors and result shapes
//! - **sequence** - Lazy, cancellable result sequences with an out-of-band error channel
//! - **oxigraph_adapter** - Engine over in-memory Oxigraph stores mounted per endpoint
//! - **sparql_endpoint** - Engine that forwards queries to a remote SPARQL protocol endpoint

pub mod oxigraph_adapter;
pub mod query_processing;
pub mod sequence;
pub mod sparql_endpoint;

pub use oxigraph_adapter::OxigraphEngine;
pub use query_processing::{EngineError, EngineResult, QueryContext, QueryEngine, SourceDescriptor};
pub use sequence::{LazySequence, SequenceControl, SequenceWriter, StreamError};
pub use sparql_endpoint::SparqlEndpointEngine;
