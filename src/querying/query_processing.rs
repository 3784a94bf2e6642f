use crate::core::{ResultRecord, Source, SourceAccess};
use crate::querying::sequence::LazySequence;
use async_trait::async_trait;
use oxigraph::model::{Quad, Variable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by an engine before a result stream exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Query parse error: {0}")]
    Parse(String),
    #[error("Query evaluation error: {0}")]
    Evaluation(String),
    #[error("Unknown source: {0}")]
    UnknownSource(String),
    #[error("Unsupported sources: {0}")]
    UnsupportedSources(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// How the engine should reach one source for a single execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum SourceDescriptor {
    /// Direct SPARQL protocol endpoint.
    #[serde(rename = "sparql")]
    Sparql(String),
    /// Quad/Triple Pattern Fragments endpoint, usable for federated join planning.
    #[serde(rename = "qpf")]
    Fragments(String),
}

impl SourceDescriptor {
    pub fn endpoint(&self) -> &str {
        match self {
            SourceDescriptor::Sparql(endpoint) | SourceDescriptor::Fragments(endpoint) => endpoint,
        }
    }
}

/// The invocation context handed to an engine alongside the query text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContext {
    pub sources: Vec<SourceDescriptor>,
}

impl QueryContext {
    /// Derives the context for a submission.
    ///
    /// A lone source is always queried through its direct SPARQL endpoint.
    /// With two or more sources, compound sources switch to their fragments
    /// endpoint so the engine can plan joins across them; SPARQL-only sources
    /// keep their endpoint regardless of count.
    pub fn for_sources(sources: &[Source]) -> Self {
        let federated = sources.len() > 1;
        let sources = sources
            .iter()
            .map(|source| match &source.access {
                SourceAccess::Sparql { endpoint } => SourceDescriptor::Sparql(endpoint.clone()),
                SourceAccess::Compound { tpf_endpoint, .. } if federated => {
                    SourceDescriptor::Fragments(tpf_endpoint.clone())
                }
                SourceAccess::Compound {
                    sparql_endpoint, ..
                } => SourceDescriptor::Sparql(sparql_endpoint.clone()),
            })
            .collect();
        Self { sources }
    }
}

/// The three result shapes an engine can produce.
pub enum EngineResult {
    /// SELECT results: engine-reported variables and a stream of solutions.
    Bindings {
        variables: Vec<Variable>,
        solutions: LazySequence<ResultRecord>,
    },
    /// CONSTRUCT/DESCRIBE results.
    Quads(LazySequence<Quad>),
    /// ASK results.
    Boolean(bool),
}

impl std::fmt::Debug for EngineResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineResult::Bindings { variables, .. } => f
                .debug_struct("Bindings")
                .field("variables", variables)
                .finish_non_exhaustive(),
            EngineResult::Quads(_) => f.write_str("Quads"),
            EngineResult::Boolean(value) => f.debug_tuple("Boolean").field(value).finish(),
        }
    }
}

/// A query execution engine. Quarry consumes this contract; it never
/// evaluates SPARQL itself.
#[async_trait]
pub trait QueryEngine: Send + Sync + 'static {
    async fn execute(
        &self,
        query: &str,
        context: &QueryContext,
    ) -> Result<EngineResult, EngineError>;
}
