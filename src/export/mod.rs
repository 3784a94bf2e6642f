//! Result export formats

pub mod csv;

pub use self::csv::{to_csv_string, write_csv, ExportError};
