//! Change-record extraction from XML documents.
//!
//! Scalar fields are matched by element local name anywhere in the document
//! (first match in document order wins). Repeated container elements can be
//! collected as nested groups. Emitters turn records into JSON or a workbook.

pub mod emit;
pub mod extract;

pub use emit::{to_json, write_xlsx};
pub use extract::{
    ExtractOutcome, FileFailure, RecordSchema, extract_file, extract_files, extract_str,
};
