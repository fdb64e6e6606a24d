//! Web data collector.
//!
//! For every input record the collector resolves an identifier (optionally
//! from an HTML lookup page), fetches a JSON document, extracts the
//! configured fields and flags records whose required fields are missing.
//! Records are processed one at a time, in input order.

pub mod engine;
pub mod export;

pub use engine::{CollectReport, Collector};
pub use export::{ExportPaths, write_export};
