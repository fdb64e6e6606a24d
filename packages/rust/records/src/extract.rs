//! XML → [`ChangeRecord`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use chorekit_shared::{
    ChangeRecord, ChoreError, GroupConfig, ProgressReporter, RecordsConfig, Result,
};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Which elements make up a record.
#[derive(Debug, Clone)]
pub struct RecordSchema {
    /// Scalar field names, in output order.
    pub fields: Vec<String>,
    /// Required namespace URI; `None` matches local names in any namespace.
    pub namespace: Option<String>,
    /// Repeated containers collected as nested groups.
    pub groups: Vec<GroupConfig>,
}

impl From<&RecordsConfig> for RecordSchema {
    fn from(config: &RecordsConfig) -> Self {
        Self {
            fields: config.fields.clone(),
            namespace: config
                .namespace
                .as_ref()
                .filter(|ns| !ns.trim().is_empty())
                .cloned(),
            groups: config.groups.clone(),
        }
    }
}

impl RecordSchema {
    fn matches(&self, node: &Node<'_, '_>, name: &str) -> bool {
        if !node.is_element() || node.tag_name().name() != name {
            return false;
        }
        match &self.namespace {
            Some(ns) => node.tag_name().namespace() == Some(ns.as_str()),
            None => true,
        }
    }

    /// First element named `name` below (and including) `scope`.
    fn first<'a, 'input>(&self, scope: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
        scope.descendants().find(|node| self.matches(node, name))
    }
}

/// Trimmed text of an element; empty text counts as missing.
fn element_text(node: Node<'_, '_>) -> Option<String> {
    let text: String = node
        .children()
        .filter(|child| child.is_text())
        .filter_map(|child| child.text())
        .collect();
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Extract a record from an XML string.
///
/// Missing fields become `None`; only malformed XML is an error.
pub fn extract_str(xml: &str, schema: &RecordSchema) -> Result<ChangeRecord> {
    let doc = Document::parse(xml).map_err(|e| ChoreError::parse(format!("malformed XML: {e}")))?;
    let root = doc.root_element();

    let fields = schema
        .fields
        .iter()
        .map(|name| {
            let value = schema.first(root, name).and_then(element_text);
            (name.clone(), value)
        })
        .collect();

    let mut groups = BTreeMap::new();
    for group in &schema.groups {
        let entries = root
            .descendants()
            .filter(|node| schema.matches(node, &group.element))
            .map(|container| collect_group(container, group, schema))
            .collect();
        groups.insert(group.element.clone(), entries);
    }

    Ok(ChangeRecord {
        source: None,
        fields,
        groups,
    })
}

fn collect_group(
    container: Node<'_, '_>,
    group: &GroupConfig,
    schema: &RecordSchema,
) -> BTreeMap<String, String> {
    let mut entry = BTreeMap::new();

    if group.fields.is_empty() {
        // Every leaf child element.
        for child in container.children().filter(Node::is_element) {
            if child.children().any(|n| n.is_element()) {
                continue;
            }
            if let Some(text) = element_text(child) {
                entry.insert(child.tag_name().name().to_string(), text);
            }
        }
    } else {
        for name in &group.fields {
            // Skip the container itself when a field shares its name.
            let found = container
                .descendants()
                .skip(1)
                .find(|node| schema.matches(node, name))
                .and_then(element_text);
            if let Some(text) = found {
                entry.insert(name.clone(), text);
            }
        }
    }

    entry
}

/// Read and extract one file.
#[instrument(skip_all, fields(file = %path.display()))]
pub fn extract_file(path: &Path, schema: &RecordSchema) -> Result<ChangeRecord> {
    let xml = std::fs::read_to_string(path).map_err(|e| ChoreError::io(path, e))?;
    let mut record = extract_str(&xml, schema).map_err(|e| match e {
        ChoreError::Parse { message } => {
            ChoreError::parse(format!("{}: {message}", path.display()))
        }
        other => other,
    })?;
    record.source = Some(path.display().to_string());

    let missing = record.missing_fields();
    if missing.is_empty() {
        debug!("all fields present");
    } else {
        debug!(missing = ?missing, "record has missing fields");
    }
    Ok(record)
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// A file that could not be extracted.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Records and failures of a batch run.
#[derive(Debug, Default)]
pub struct ExtractOutcome {
    pub records: Vec<ChangeRecord>,
    pub failures: Vec<FileFailure>,
}

impl ExtractOutcome {
    /// `true` when every file was extracted.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Extract every file in order. A failing file is logged and listed; the
/// others continue.
pub fn extract_files(
    paths: &[PathBuf],
    schema: &RecordSchema,
    progress: &dyn ProgressReporter,
) -> ExtractOutcome {
    let mut outcome = ExtractOutcome::default();
    progress.phase("Extracting records");

    for (i, path) in paths.iter().enumerate() {
        progress.item(&path.display().to_string(), i + 1, paths.len());
        match extract_file(path, schema) {
            Ok(record) => outcome.records.push(record),
            Err(e) => {
                error!(file = %path.display(), error = %e, "extraction failed");
                outcome.failures.push(FileFailure {
                    path: path.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    progress.done();
    info!(
        extracted = outcome.records.len(),
        failed = outcome.failures.len(),
        "extraction finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorekit_shared::SilentProgress;

    const CHANGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Aenderung xmlns="urn:example:change">
  <Kopf>
    <Nummer> 4711 </Nummer>
    <Baureihe>BR223</Baureihe>
    <Ausfuehrungsart>Serie</Ausfuehrungsart>
  </Kopf>
  <Aufgaben>
    <SelliSubtask>
      <Titel>Pruefen</Titel>
      <Status>offen</Status>
    </SelliSubtask>
    <SelliSubtask>
      <Titel>Freigeben</Titel>
      <Status>erledigt</Status>
      <Nummer>99</Nummer>
    </SelliSubtask>
  </Aufgaben>
</Aenderung>"#;

    fn default_schema() -> RecordSchema {
        RecordSchema::from(&RecordsConfig::default())
    }

    #[test]
    fn known_fields_are_extracted() {
        let record = extract_str(CHANGE, &default_schema()).unwrap();
        assert_eq!(record.get("Nummer"), Some("4711"));
        assert_eq!(record.get("Baureihe"), Some("BR223"));
        assert_eq!(record.get("Ausfuehrungsart"), Some("Serie"));
    }

    #[test]
    fn missing_field_is_none_not_error() {
        let record = extract_str(CHANGE, &default_schema()).unwrap();
        assert_eq!(record.get("EinsatzterminZeichnung"), None);
        assert_eq!(record.missing_fields(), vec!["EinsatzterminZeichnung"]);
        // Field order follows the schema.
        let names: Vec<_> = record.fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["Nummer", "Baureihe", "Ausfuehrungsart", "EinsatzterminZeichnung"]
        );
    }

    #[test]
    fn empty_element_counts_as_missing() {
        let record = extract_str("<r><Nummer>  </Nummer></r>", &default_schema()).unwrap();
        assert_eq!(record.get("Nummer"), None);
    }

    #[test]
    fn malformed_xml_is_parse_error() {
        let err = extract_str("<r><Nummer>1</r>", &default_schema()).unwrap_err();
        assert!(matches!(err, ChoreError::Parse { .. }));
    }

    #[test]
    fn namespace_filter() {
        let mut schema = default_schema();
        schema.namespace = Some("urn:example:change".into());
        assert_eq!(extract_str(CHANGE, &schema).unwrap().get("Nummer"), Some("4711"));

        schema.namespace = Some("urn:other".into());
        assert_eq!(extract_str(CHANGE, &schema).unwrap().get("Nummer"), None);

        // Blank namespace in config means "any".
        let config = RecordsConfig {
            namespace: Some("  ".into()),
            ..RecordsConfig::default()
        };
        assert_eq!(RecordSchema::from(&config).namespace, None);
    }

    #[test]
    fn groups_collect_each_container() {
        let mut schema = default_schema();
        schema.groups = vec![GroupConfig {
            element: "SelliSubtask".into(),
            fields: vec!["Titel".into(), "Status".into()],
        }];

        let record = extract_str(CHANGE, &schema).unwrap();
        let subtasks = &record.groups["SelliSubtask"];
        assert_eq!(subtasks.len(), 2);
        assert_eq!(subtasks[0]["Titel"], "Pruefen");
        assert_eq!(subtasks[1]["Status"], "erledigt");
        assert!(!subtasks[1].contains_key("Nummer"));
    }

    #[test]
    fn group_without_fields_takes_all_leaves() {
        let mut schema = default_schema();
        schema.groups = vec![GroupConfig {
            element: "SelliSubtask".into(),
            fields: Vec::new(),
        }];

        let record = extract_str(CHANGE, &schema).unwrap();
        let second = &record.groups["SelliSubtask"][1];
        assert_eq!(second.len(), 3);
        assert_eq!(second["Nummer"], "99");
    }

    #[test]
    fn batch_continues_past_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.xml");
        let bad = dir.path().join("bad.xml");
        let missing = dir.path().join("missing.xml");
        std::fs::write(&good, CHANGE).unwrap();
        std::fs::write(&bad, "<Aenderung><Nummer>").unwrap();

        let outcome = extract_files(
            &[bad.clone(), good.clone(), missing.clone()],
            &default_schema(),
            &SilentProgress,
        );

        assert!(!outcome.is_clean());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.records[0].source.as_deref(),
            Some(good.display().to_string().as_str())
        );
        let failed: Vec<_> = outcome.failures.iter().map(|f| f.path.clone()).collect();
        assert_eq!(failed, vec![bad, missing]);
    }
}
