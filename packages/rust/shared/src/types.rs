//! Domain types shared by the chorekit tools.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

// ---------------------------------------------------------------------------
// QuestionRow
// ---------------------------------------------------------------------------

/// One question row of a Q&A spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRow {
    /// 1-based worksheet row.
    pub row: u32,
    /// Question text (trimmed).
    pub question: String,
    /// Existing answer, `None` while the cell is empty.
    pub answer: Option<String>,
}

impl QuestionRow {
    /// Rows that already carry an answer are never sent again.
    pub fn needs_answer(&self) -> bool {
        self.answer.is_none() && !self.question.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ChangeRecord
// ---------------------------------------------------------------------------

/// Flat record extracted from one change-management XML document.
///
/// Serializes as a single flat object: `source` (when known), then every
/// scalar field in configured order, then each group keyed by its element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeRecord {
    /// File the record came from, when read from disk.
    pub source: Option<String>,
    /// Scalar fields in configured order. Missing fields are `None`.
    pub fields: Vec<(String, Option<String>)>,
    /// Nested groups keyed by container element name.
    pub groups: BTreeMap<String, Vec<BTreeMap<String, String>>>,
}

impl Serialize for ChangeRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = usize::from(self.source.is_some()) + self.fields.len() + self.groups.len();
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(source) = &self.source {
            map.serialize_entry("source", source)?;
        }
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        for (element, entries) in &self.groups {
            map.serialize_entry(element, entries)?;
        }
        map.end()
    }
}

impl ChangeRecord {
    /// Value of a scalar field; `None` when missing or not configured.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .and_then(|(_, value)| value.as_deref())
    }

    /// Names of configured fields that were not found.
    pub fn missing_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Serialize `(name, value)` pairs as a JSON object, keeping their order.
fn ordered_fields<S: Serializer>(
    fields: &[(String, Option<String>)],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(fields.len()))?;
    for (name, value) in fields {
        map.serialize_entry(name, value)?;
    }
    map.end()
}

// ---------------------------------------------------------------------------
// CrawledItem
// ---------------------------------------------------------------------------

/// Validation outcome for a collected item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    /// Every required field is present.
    Valid,
    /// Required fields are missing from the response.
    Invalid { missing: Vec<String> },
}

/// Data collected for one input record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawledItem {
    /// The normalised input value (e.g. an e-mail address).
    pub input: String,
    /// URL the data was read from.
    pub url: String,
    /// Extracted fields in configured order.
    #[serde(serialize_with = "ordered_fields")]
    pub fields: Vec<(String, Option<String>)>,
    /// Validation status.
    pub status: ItemStatus,
}

impl CrawledItem {
    /// Whether every required field was present.
    pub fn is_valid(&self) -> bool {
        matches!(self.status, ItemStatus::Valid)
    }
}

/// Why a collector record was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    /// Input value failed validation.
    InvalidInput,
    /// The lookup page did not identify the record.
    NotFound,
    /// Requests kept failing after retries.
    Unreachable,
    /// The data response lacked required fields.
    MissingData,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidInput => "Invalid input",
            Self::NotFound => "Record not found",
            Self::Unreachable => "Unable to load record",
            Self::MissingData => "Requested data not found",
        };
        f.write_str(label)
    }
}

/// A rejected collector record, written to the error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectFailure {
    /// Input value (after normalisation, when it got that far).
    pub input: String,
    /// Failure category.
    pub reason: FailureReason,
    /// Human-readable detail.
    pub detail: String,
    /// The raw CSV row.
    pub raw: Vec<String>,
}

// ---------------------------------------------------------------------------
// UrlCheckResult
// ---------------------------------------------------------------------------

/// Outcome category of a URL check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum CheckStatus {
    /// Not a usable http(s) URL.
    Invalid,
    /// No HTTP response could be obtained.
    Unreachable,
    /// The server answered.
    Reachable,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Invalid => "Invalid URL",
            Self::Unreachable => "Unreachable",
            Self::Reachable => "Reachable",
        };
        f.write_str(label)
    }
}

/// TLS grade reported by the external grading command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Grade {
    pub overall: String,
    pub cap_reasons: String,
    pub warning: String,
}

impl Grade {
    /// `A` and `A+` count as acceptable.
    pub fn is_ok(&self) -> bool {
        matches!(self.overall.as_str(), "A" | "A+")
    }
}

/// Result of checking one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlCheckResult {
    /// The URL as given in the input.
    pub url: String,
    pub status: CheckStatus,
    pub reachable: bool,
    /// `None` for plain-http or unreachable URLs.
    pub certificate_valid: Option<bool>,
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<Grade>,
    /// Error text or other remarks.
    pub notes: String,
}

impl UrlCheckResult {
    /// Result for an input that is not a usable URL.
    pub fn invalid(url: impl Into<String>, notes: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: CheckStatus::Invalid,
            reachable: false,
            certificate_valid: None,
            http_status: None,
            grade: None,
            notes: notes.into(),
        }
    }
}
