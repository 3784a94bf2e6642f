//! SPARQL 1.1 CSV results.
//!
//! The header holds the variable names. IRIs are written without angle
//! brackets, blank nodes as `_:label` and literals as their lexical form, so
//! language tags and datatypes are dropped. Unbound values are empty fields.
//! Rows end with CRLF.

use crate::core::ResultRecord;
use ::csv::{Terminator, WriterBuilder};
use oxigraph::model::{Term, Variable};
use std::io::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV output is not valid UTF-8")]
    Encoding,
}

fn term_field(term: &Term) -> String {
    match term {
        Term::NamedNode(node) => node.as_str().to_string(),
        Term::BlankNode(node) => format!("_:{}", node.as_str()),
        Term::Literal(literal) => literal.value().to_string(),
        #[allow(unreachable_patterns)]
        other => other.to_string(),
    }
}

/// Writes `records` under the `columns` header.
///
/// Values are looked up by column name, so records whose variables differ
/// from `columns` still line up.
pub fn write_csv<W: Write>(
    columns: &[Variable],
    records: &[ResultRecord],
    writer: W,
) -> Result<(), ExportError> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::CRLF)
        .from_writer(writer);

    writer.write_record(columns.iter().map(Variable::as_str))?;
    for record in records {
        let fields = columns.iter().map(|column| {
            record
                .get(column.as_str())
                .map(term_field)
                .unwrap_or_default()
        });
        writer.write_record(fields)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn to_csv_string(
    columns: &[Variable],
    records: &[ResultRecord],
) -> Result<String, ExportError> {
    let mut buffer = Vec::new();
    write_csv(columns, records, &mut buffer)?;
    String::from_utf8(buffer).map_err(|_| ExportError::Encoding)
}
