//! Result shape normalisation.
//!
//! Engines answer with bindings, quads or a boolean. Downstream code only
//! deals with one uniform stream of [`ResultRecord`]s plus the column set that
//! describes them.

use crate::core::record::{boolean_columns, quad_columns};
use crate::core::ResultRecord;
use crate::querying::query_processing::EngineResult;
use crate::querying::sequence::LazySequence;
use oxigraph::model::Variable;

/// Converts any engine result into a column set and a record stream.
///
/// - bindings keep the engine-reported variables and their solution stream
/// - quads map onto `subject, predicate, object, graph`
/// - a boolean becomes a single record under `result`
pub fn normalize(result: EngineResult) -> (Vec<Variable>, LazySequence<ResultRecord>) {
    match result {
        EngineResult::Bindings {
            variables,
            solutions,
        } => (variables, solutions),
        EngineResult::Quads(quads) => (quad_columns(), quads.map(ResultRecord::from_quad)),
        EngineResult::Boolean(value) => {
            let record = ResultRecord::from_boolean(value);
            (boolean_columns(), LazySequence::from_items([record]))
        }
    }
}
