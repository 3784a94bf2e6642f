//! Uniform result records.
//!
//! Every result shape an engine can produce (solutions, quads, a boolean) is
//! normalised into [`ResultRecord`]s so that the rest of the pipeline handles
//! one kind of item.

use oxigraph::model::{GraphName, Literal, Quad, Term, Variable};
use oxigraph::sparql::QuerySolution;
use std::sync::{Arc, OnceLock};

static QUAD_VARIABLES: OnceLock<Arc<[Variable]>> = OnceLock::new();
static BOOLEAN_VARIABLES: OnceLock<Arc<[Variable]>> = OnceLock::new();

fn quad_variables() -> Arc<[Variable]> {
    let variables = QUAD_VARIABLES.get_or_init(|| {
        ["subject", "predicate", "object", "graph"]
            .into_iter()
            .map(Variable::new_unchecked)
            .collect()
    });
    Arc::clone(variables)
}

fn boolean_variables() -> Arc<[Variable]> {
    let variables =
        BOOLEAN_VARIABLES.get_or_init(|| vec![Variable::new_unchecked("result")].into());
    Arc::clone(variables)
}

/// Column set used for graph (quad) results.
pub fn quad_columns() -> Vec<Variable> {
    quad_variables().to_vec()
}

/// Column set used for boolean (ASK) results.
pub fn boolean_columns() -> Vec<Variable> {
    boolean_variables().to_vec()
}

/// One solution row: an ordered mapping from variable to an optional term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    variables: Arc<[Variable]>,
    values: Vec<Option<Term>>,
}

impl ResultRecord {
    /// Creates a record with one value per variable.
    ///
    /// Missing trailing values are treated as unbound. Passing more values
    /// than variables is a caller bug: debug builds panic, release builds
    /// drop the surplus.
    pub fn new(variables: Arc<[Variable]>, mut values: Vec<Option<Term>>) -> Self {
        debug_assert!(
            values.len() <= variables.len(),
            "{} values for {} variables",
            values.len(),
            variables.len()
        );
        values.resize(variables.len(), None);
        Self { variables, values }
    }

    /// Builds a record for `variables` from an oxigraph solution, keeping the
    /// variable order of the solution sequence.
    pub fn from_solution(variables: &Arc<[Variable]>, solution: &QuerySolution) -> Self {
        let values = variables
            .iter()
            .map(|v| solution.get(v.as_str()).cloned())
            .collect();
        Self {
            variables: Arc::clone(variables),
            values,
        }
    }

    /// Maps a quad onto the `subject, predicate, object, graph` columns.
    /// The default graph is left unbound.
    pub fn from_quad(quad: Quad) -> Self {
        let graph = match quad.graph_name {
            GraphName::NamedNode(node) => Some(Term::from(node)),
            GraphName::BlankNode(node) => Some(Term::from(node)),
            GraphName::DefaultGraph => None,
        };
        Self {
            variables: quad_variables(),
            values: vec![
                Some(Term::from(quad.subject)),
                Some(Term::from(quad.predicate)),
                Some(quad.object),
                graph,
            ],
        }
    }

    /// Wraps a boolean as an `xsd:boolean` literal under the `result` column.
    pub fn from_boolean(value: bool) -> Self {
        Self {
            variables: boolean_variables(),
            values: vec![Some(Term::from(Literal::from(value)))],
        }
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn values(&self) -> &[Option<Term>] {
        &self.values
    }

    /// The term bound to `variable`, if any.
    pub fn get(&self, variable: &str) -> Option<&Term> {
        self.variables
            .iter()
            .position(|v| v.as_str() == variable)
            .and_then(|i| self.values.get(i))
            .and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, Option<&Term>)> {
        self.variables
            .iter()
            .zip(self.values.iter().map(Option::as_ref))
    }
}
