//! Engine that forwards queries to a remote SPARQL protocol endpoint.
//!
//! Only a single direct SPARQL source can be served: federating across
//! several endpoints or reading Triple Pattern Fragments needs a link
//! traversal engine, which this adapter is not.

use crate::core::ResultRecord;
use crate::querying::query_processing::{
    EngineError, EngineResult, QueryContext, QueryEngine, SourceDescriptor,
};
use crate::querying::sequence::LazySequence;
use async_trait::async_trait;
use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::{BlankNode, Literal, NamedNode, Quad, Term, Variable};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

const ACCEPT_HEADER: &str =
    "application/sparql-results+json, application/n-triples;q=0.9, text/plain;q=0.1";

/// `application/sparql-results+json` document.
#[derive(Debug, Deserialize)]
struct SparqlJson {
    #[serde(default)]
    head: SparqlJsonHead,
    results: Option<SparqlJsonResults>,
    boolean: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct SparqlJsonHead {
    #[serde(default)]
    vars: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SparqlJsonResults {
    bindings: Vec<HashMap<String, SparqlJsonTerm>>,
}

#[derive(Debug, Deserialize)]
struct SparqlJsonTerm {
    #[serde(rename = "type")]
    kind: String,
    value: String,
    #[serde(rename = "xml:lang")]
    lang: Option<String>,
    datatype: Option<String>,
}

impl SparqlJsonTerm {
    fn into_term(self) -> Result<Term, EngineError> {
        let invalid = |e: &dyn std::fmt::Display| {
            EngineError::Evaluation(format!("Invalid term in results: {}", e))
        };
        match self.kind.as_str() {
            "uri" => NamedNode::new(self.value)
                .map(Term::from)
                .map_err(|e| invalid(&e)),
            "bnode" => BlankNode::new(self.value)
                .map(Term::from)
                .map_err(|e| invalid(&e)),
            "literal" | "typed-literal" => {
                let literal = if let Some(lang) = self.lang {
                    Literal::new_language_tagged_literal(self.value, lang)
                        .map_err(|e| invalid(&e))?
                } else if let Some(datatype) = self.datatype {
                    let datatype = NamedNode::new(datatype).map_err(|e| invalid(&e))?;
                    Literal::new_typed_literal(self.value, datatype)
                } else {
                    Literal::new_simple_literal(self.value)
                };
                Ok(Term::from(literal))
            }
            other => Err(EngineError::Evaluation(format!(
                "Unsupported term type: {}",
                other
            ))),
        }
    }
}

/// Query engine that talks the SPARQL 1.1 protocol over HTTP.
#[derive(Debug, Clone, Default)]
pub struct SparqlEndpointEngine {
    client: reqwest::Client,
}

impl SparqlEndpointEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn endpoint<'a>(&self, context: &'a QueryContext) -> Result<&'a str, EngineError> {
        match context.sources.as_slice() {
            [SourceDescriptor::Sparql(endpoint)] => Ok(endpoint.as_str()),
            [SourceDescriptor::Fragments(endpoint)] => Err(EngineError::UnsupportedSources(format!(
                "fragments endpoint {} requires a federating engine",
                endpoint
            ))),
            [] => Err(EngineError::UnsupportedSources(
                "no sources in query context".to_string(),
            )),
            sources => Err(EngineError::UnsupportedSources(format!(
                "{} sources given, a single SPARQL endpoint is supported",
                sources.len()
            ))),
        }
    }
}

#[async_trait]
impl QueryEngine for SparqlEndpointEngine {
    async fn execute(
        &self,
        query: &str,
        context: &QueryContext,
    ) -> Result<EngineResult, EngineError> {
        let endpoint = self.endpoint(context)?;
        tracing::debug!(endpoint, "Sending query to SPARQL endpoint");

        let response = self
            .client
            .post(endpoint)
            .header(ACCEPT, ACCEPT_HEADER)
            .form(&[("query", query)])
            .send()
            .await
            .map_err(|e| EngineError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Http(format!(
                "{} from {}: {}",
                status,
                endpoint,
                body.trim()
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let body = response
            .bytes()
            .await
            .map_err(|e| EngineError::Http(e.to_string()))?;

        if content_type.contains("n-triples") || content_type.starts_with("text/plain") {
            parse_ntriples(&body)
        } else {
            parse_results_json(&body)
        }
    }
}

/// Parses a SPARQL JSON results document into bindings or a boolean.
fn parse_results_json(body: &[u8]) -> Result<EngineResult, EngineError> {
    let document: SparqlJson = serde_json::from_slice(body).map_err(|e| {
        EngineError::Evaluation(format!("Malformed SPARQL JSON results: {}", e))
    })?;

    if let Some(value) = document.boolean {
        return Ok(EngineResult::Boolean(value));
    }

    let variables = document
        .head
        .vars
        .iter()
        .map(|name| Variable::new(name.as_str()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            EngineError::Evaluation(format!("Invalid variable in results: {}", e))
        })?;
    let shared: Arc<[Variable]> = variables.clone().into();

    let bindings = document.results.map(|r| r.bindings).unwrap_or_default();
    let mut records = Vec::with_capacity(bindings.len());
    for mut binding in bindings {
        let mut values = Vec::with_capacity(shared.len());
        for variable in shared.iter() {
            let value = binding
                .remove(variable.as_str())
                .map(SparqlJsonTerm::into_term)
                .transpose()?;
            values.push(value);
        }
        records.push(ResultRecord::new(Arc::clone(&shared), values));
    }

    Ok(EngineResult::Bindings {
        variables,
        solutions: LazySequence::from_items(records),
    })
}

fn parse_ntriples(body: &[u8]) -> Result<EngineResult, EngineError> {
    let quads = RdfParser::from_format(RdfFormat::NTriples)
        .for_reader(body)
        .collect::<Result<Vec<Quad>, _>>()
        .map_err(|e| {
            EngineError::Evaluation(format!("Malformed N-Triples response: {}", e))
        })?;
    Ok(EngineResult::Quads(LazySequence::from_items(quads)))
}
