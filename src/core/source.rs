//! Data sources a query can be submitted against.

use serde::{Deserialize, Serialize};

/// Grouping used by catalogs and UIs. Only informational for query execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceCategory {
    #[default]
    Registry,
    Federation,
    Other,
    Custom,
}

/// How a source can be reached.
///
/// A compound source exposes both a direct SPARQL endpoint and a Triple
/// Pattern Fragments endpoint; the latter lets the engine plan joins across
/// several sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceAccess {
    Sparql {
        endpoint: String,
    },
    Compound {
        #[serde(rename = "sparqlEndpoint")]
        sparql_endpoint: String,
        #[serde(rename = "tpfEndpoint")]
        tpf_endpoint: String,
    },
}

/// A data source as selected by the user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub shortname: String,
    #[serde(default)]
    pub category: SourceCategory,
    #[serde(flatten)]
    pub access: SourceAccess,
}

impl Source {
    /// A source reachable only through a SPARQL endpoint.
    pub fn sparql(name: &str, shortname: &str, endpoint: &str) -> Self {
        Self {
            name: name.to_string(),
            shortname: shortname.to_string(),
            category: SourceCategory::Registry,
            access: SourceAccess::Sparql {
                endpoint: endpoint.to_string(),
            },
        }
    }

    /// A source with both a SPARQL endpoint and a fragments endpoint.
    pub fn compound(
        name: &str,
        shortname: &str,
        sparql_endpoint: &str,
        tpf_endpoint: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            shortname: shortname.to_string(),
            category: SourceCategory::Registry,
            access: SourceAccess::Compound {
                sparql_endpoint: sparql_endpoint.to_string(),
                tpf_endpoint: tpf_endpoint.to_string(),
            },
        }
    }

    pub fn with_category(mut self, category: SourceCategory) -> Self {
        self.category = category;
        self
    }

    pub fn is_compound(&self) -> bool {
        matches!(self.access, SourceAccess::Compound { .. })
    }

    /// All endpoint URLs this source exposes.
    pub fn endpoints(&self) -> Vec<&str> {
        match &self.access {
            SourceAccess::Sparql { endpoint } => vec![endpoint.as_str()],
            SourceAccess::Compound {
                sparql_endpoint,
                tpf_endpoint,
            } => {
                vec![sparql_endpoint.as_str(), tpf_endpoint.as_str()]
            }
        }
    }
}
