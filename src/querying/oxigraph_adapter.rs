//! Oxigraph-based query engine.
//!
//! Each endpoint URL can be backed by an in-memory Oxigraph [`Store`]. A query
//! against a single source runs on that source's store; a query against
//! several sources runs on a union store holding all of their quads.
//!
//! Evaluation is blocking, so it runs on the blocking thread pool. The result
//! shape is reported back as soon as it is known and solutions are then pushed
//! into a [`LazySequence`] one by one, so consumers see the first rows before
//! evaluation has finished.
//!
//! # Example
//!
//! ```ignore
//! use quarry::querying::{OxigraphEngine, QueryContext, QueryEngine, SourceDescriptor};
//! use oxigraph::model::{GraphName, NamedNode, Quad};
//!
//! let engine = OxigraphEngine::new();
//! let alice = NamedNode::new("http://example.org/alice").unwrap();
//! let bob = NamedNode::new("http://example.org/bob").unwrap();
//! let knows = NamedNode::new("http://example.org/knows").unwrap();
//! let quad = Quad::new(alice, knows, bob, GraphName::DefaultGraph);
//! engine.insert_quads("http://example.org/sparql", [quad])?;
//!
//! let endpoint = SourceDescriptor::Sparql("http://example.org/sparql".into());
//! let context = QueryContext { sources: vec![endpoint] };
//! let result = engine.execute("SELECT ?s ?o WHERE { ?s ?p ?o }", &context).await?;
//! ```

use crate::core::ResultRecord;
use crate::querying::query_processing::{EngineError, EngineResult, QueryContext, QueryEngine};
use crate::querying::sequence::{LazySequence, StreamError};
use async_trait::async_trait;
use oxigraph::io::RdfFormat;
use oxigraph::model::{GraphName, Quad, Variable};
use oxigraph::sparql::{QueryResults, SparqlEvaluator};
use oxigraph::store::Store;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::oneshot;

impl From<oxigraph::store::StorageError> for EngineError {
    fn from(err: oxigraph::store::StorageError) -> Self {
        EngineError::Storage(err.to_string())
    }
}

impl From<oxigraph::store::LoaderError> for EngineError {
    fn from(err: oxigraph::store::LoaderError) -> Self {
        EngineError::Storage(err.to_string())
    }
}

/// Query engine backed by Oxigraph stores keyed by endpoint URL.
#[derive(Clone, Default)]
pub struct OxigraphEngine {
    datasets: Arc<RwLock<HashMap<String, Store>>>,
}

impl OxigraphEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `endpoint` from `store`, replacing any store mounted there before.
    pub fn mount(&self, endpoint: &str, store: Store) {
        self.datasets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(endpoint.to_string(), store);
    }

    /// Adds quads to the store behind `endpoint`, creating it if needed.
    pub fn insert_quads<I>(&self, endpoint: &str, quads: I) -> Result<usize, EngineError>
    where
        I: IntoIterator<Item = Quad>,
    {
        let store = self.store_or_create(endpoint)?;
        let mut inserted = 0;
        for quad in quads {
            if store.insert(&quad)? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Loads an RDF file into the store behind `endpoint`.
    ///
    /// The serialization is picked from the file extension (`nt`, `nq`, `ttl`,
    /// `trig`, `rdf`, ...). Triples land in the default graph.
    pub fn load_file(&self, endpoint: &str, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let path = path.as_ref();
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(RdfFormat::from_extension)
            .ok_or_else(|| {
                EngineError::Storage(format!("Unsupported RDF file extension: {}", path.display()))
            })?;
        let file = File::open(path)
            .map_err(|e| EngineError::Storage(format!("Cannot open {}: {}", path.display(), e)))?;

        let store = self.store_or_create(endpoint)?;
        store.load_from_reader(format, BufReader::new(file))?;
        tracing::info!(endpoint, path = %path.display(), "Loaded RDF file");
        Ok(())
    }

    /// Endpoints that currently have a store mounted.
    pub fn endpoints(&self) -> Vec<String> {
        let datasets = self.datasets.read().unwrap_or_else(PoisonError::into_inner);
        let mut endpoints: Vec<String> = datasets.keys().cloned().collect();
        endpoints.sort();
        endpoints
    }

    fn store_or_create(&self, endpoint: &str) -> Result<Store, EngineError> {
        let mut datasets = self
            .datasets
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = datasets.get(endpoint) {
            return Ok(store.clone());
        }
        let store = Store::new()?;
        datasets.insert(endpoint.to_string(), store.clone());
        Ok(store)
    }
}

#[async_trait]
impl QueryEngine for OxigraphEngine {
    async fn execute(
        &self,
        query: &str,
        context: &QueryContext,
    ) -> Result<EngineResult, EngineError> {
        let datasets = Arc::clone(&self.datasets);
        let context = context.clone();
        let query = query.to_string();
        let (shape_tx, shape_rx) = oneshot::channel();

        tracing::debug!(
            sources = context.sources.len(),
            "Dispatching query to Oxigraph"
        );
        tokio::task::spawn_blocking(move || match resolve(&datasets, &context) {
            Ok(store) => evaluate(&store, &query, shape_tx),
            Err(e) => {
                let _ = shape_tx.send(Err(e));
            }
        });

        shape_rx.await.map_err(|_| {
            EngineError::Evaluation("Evaluation task ended unexpectedly".to_string())
        })?
    }
}

/// Picks the store a query runs on.
///
/// Several sources are copied into a fresh union store, so this must run on
/// the blocking pool.
fn resolve(
    datasets: &RwLock<HashMap<String, Store>>,
    context: &QueryContext,
) -> Result<Store, EngineError> {
    let mut stores = {
        let datasets = datasets.read().unwrap_or_else(PoisonError::into_inner);
        context
            .sources
            .iter()
            .map(|descriptor| {
                datasets
                    .get(descriptor.endpoint())
                    .cloned()
                    .ok_or_else(|| EngineError::UnknownSource(descriptor.endpoint().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    match stores.len() {
        0 => Err(EngineError::UnsupportedSources(
            "no sources in query context".to_string(),
        )),
        1 => Ok(stores.remove(0)),
        _ => {
            let union = Store::new()?;
            for store in &stores {
                for quad in store.iter() {
                    union.insert(&quad?)?;
                }
            }
            Ok(union)
        }
    }
}

/// Runs on the blocking pool. Reports the result shape through `shape_tx`,
/// then feeds rows until the consumer destroys the sequence.
fn evaluate(
    store: &Store,
    query: &str,
    shape_tx: oneshot::Sender<Result<EngineResult, EngineError>>,
) {
    let prepared = match SparqlEvaluator::new().parse_query(query) {
        Ok(prepared) => prepared,
        Err(e) => {
            let _ = shape_tx.send(Err(EngineError::Parse(e.to_string())));
            return;
        }
    };
    let results = match prepared.on_store(store).execute() {
        Ok(results) => results,
        Err(e) => {
            let _ = shape_tx.send(Err(EngineError::Evaluation(e.to_string())));
            return;
        }
    };

    match results {
        QueryResults::Boolean(value) => {
            let _ = shape_tx.send(Ok(EngineResult::Boolean(value)));
        }
        QueryResults::Solutions(solutions) => {
            let variables: Arc<[Variable]> = solutions.variables().into();
            let (writer, sequence) = LazySequence::channel();
            let shape = EngineResult::Bindings {
                variables: variables.to_vec(),
                solutions: sequence,
            };
            if shape_tx.send(Ok(shape)).is_err() {
                return;
            }
            for solution in solutions {
                let pushed = match solution {
                    Ok(solution) => {
                        writer.push(ResultRecord::from_solution(&variables, &solution))
                    }
                    Err(e) => {
                        writer.fail(StreamError::new(e.to_string()));
                        false
                    }
                };
                if !pushed {
                    break;
                }
            }
        }
        QueryResults::Graph(triples) => {
            let (writer, sequence) = LazySequence::channel();
            let shape = EngineResult::Quads(sequence);
            if shape_tx.send(Ok(shape)).is_err() {
                return;
            }
            for triple in triples {
                let pushed = match triple {
                    Ok(triple) => writer.push(triple.in_graph(GraphName::DefaultGraph)),
                    Err(e) => {
                        writer.fail(StreamError::new(e.to_string()));
                        false
                    }
                };
                if !pushed {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::querying::query_processing::SourceDescriptor;
    use oxigraph::model::{NamedNode, Term};

    const ENDPOINT_A: &str = "http://example.org/a/sparql";
    const ENDPOINT_B: &str = "http://example.org/b/sparql";

    fn knows(s: &str, o: &str) -> Quad {
        Quad::new(
            NamedNode::new(format!("http://example.org/{s}")).unwrap(),
            NamedNode::new("http://example.org/knows").unwrap(),
            NamedNode::new(format!("http://example.org/{o}")).unwrap(),
            GraphName::DefaultGraph,
        )
    }

    fn insert(engine: &OxigraphEngine, endpoint: &str, quads: impl IntoIterator<Item = Quad>) {
        engine.insert_quads(endpoint, quads).unwrap();
    }

    fn context(endpoints: &[&str]) -> QueryContext {
        QueryContext {
            sources: endpoints
                .iter()
                .map(|e| SourceDescriptor::Sparql((*e).to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_select_streams_bindings() {
        let engine = OxigraphEngine::new();
        let quads = [knows("alice", "bob"), knows("bob", "carol")];
        insert(&engine, ENDPOINT_A, quads);

        let query = "SELECT ?s ?o WHERE { ?s <http://example.org/knows> ?o }";
        let result = engine
            .execute(query, &context(&[ENDPOINT_A]))
            .await
            .unwrap();
        let EngineResult::Bindings {
            variables,
            mut solutions,
        } = result
        else {
            panic!("expected bindings");
        };
        assert_eq!(
            variables,
            vec![Variable::new_unchecked("s"), Variable::new_unchecked("o")]
        );

        let mut count = 0;
        while let Some(record) = solutions.next().await {
            assert!(record.unwrap().get("o").is_some());
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_multiple_sources_are_queried_as_union() {
        let engine = OxigraphEngine::new();
        insert(&engine, ENDPOINT_A, [knows("alice", "bob")]);
        insert(&engine, ENDPOINT_B, [knows("bob", "carol")]);

        let query = "SELECT ?a ?c WHERE { \
            ?a <http://example.org/knows> ?b . ?b <http://example.org/knows> ?c }";
        let result = engine
            .execute(query, &context(&[ENDPOINT_A, ENDPOINT_B]))
            .await
            .unwrap();
        let EngineResult::Bindings { mut solutions, .. } = result else {
            panic!("expected bindings");
        };
        let record = solutions.next().await.unwrap().unwrap();
        assert_eq!(
            record.get("c"),
            Some(&Term::from(NamedNode::new("http://example.org/carol").unwrap()))
        );
        assert!(solutions.next().await.is_none());
    }

    #[tokio::test]
    async fn test_ask_and_construct_shapes() {
        let engine = OxigraphEngine::new();
        insert(&engine, ENDPOINT_A, [knows("alice", "bob")]);

        let ask = engine
            .execute("ASK { ?s ?p ?o }", &context(&[ENDPOINT_A]))
            .await
            .unwrap();
        assert!(matches!(ask, EngineResult::Boolean(true)));

        let query = "CONSTRUCT { ?o ?p ?s } WHERE { ?s ?p ?o }";
        let construct = engine
            .execute(query, &context(&[ENDPOINT_A]))
            .await
            .unwrap();
        let EngineResult::Quads(mut quads) = construct else {
            panic!("expected quads");
        };
        let quad = quads.next().await.unwrap().unwrap();
        assert_eq!(quad, knows("bob", "alice"));
    }

    #[tokio::test]
    async fn test_unknown_source_and_parse_errors() {
        let engine = OxigraphEngine::new();
        insert(&engine, ENDPOINT_A, [knows("alice", "bob")]);

        let err = engine
            .execute("SELECT * WHERE { ?s ?p ?o }", &context(&[ENDPOINT_B]))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::UnknownSource(ENDPOINT_B.to_string()));

        let err = engine
            .execute("SELEC nonsense", &context(&[ENDPOINT_A]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }

    #[tokio::test]
    async fn test_unknown_source_among_several_is_rejected() {
        let engine = OxigraphEngine::new();
        insert(&engine, ENDPOINT_A, [knows("alice", "bob")]);

        let both = context(&[ENDPOINT_A, ENDPOINT_B]);
        let err = engine
            .execute("SELECT * WHERE { ?s ?p ?o }", &both)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::UnknownSource(ENDPOINT_B.to_string()));

        let err = engine
            .execute("SELECT * WHERE { ?s ?p ?o }", &context(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedSources(_)));
    }

    #[test]
    fn test_resolve_builds_union_without_touching_sources() {
        let engine = OxigraphEngine::new();
        insert(&engine, ENDPOINT_A, [knows("alice", "bob")]);
        insert(&engine, ENDPOINT_B, [knows("bob", "carol")]);

        let both = context(&[ENDPOINT_A, ENDPOINT_B]);
        let union = resolve(&engine.datasets, &both).unwrap();
        assert_eq!(union.len().unwrap(), 2);
        let single = resolve(&engine.datasets, &context(&[ENDPOINT_A])).unwrap();
        assert_eq!(single.len().unwrap(), 1);
    }
}
