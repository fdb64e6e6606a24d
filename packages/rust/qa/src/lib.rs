//! Spreadsheet Q&A automation.
//!
//! Reads questions from a worksheet column, asks a language model for each
//! unanswered one and writes the answers back into the same rows.
//!
//! - [`ModelClient`]: the seam to the model endpoint ([`ChatClient`] talks to
//!   any OpenAI-compatible `chat/completions` API)
//! - [`run_qa`]: the row-by-row pipeline

pub mod automator;
pub mod client;

pub use automator::{QaLayout, QaSummary, read_questions, run_qa};
pub use client::{ChatClient, ModelClient};
