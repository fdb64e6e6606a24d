//! Application configuration for chorekit.
//!
//! User config lives at `~/.chorekit/chorekit.toml` unless `--config` points
//! elsewhere. CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file: sections name the env var that
//! holds them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ChoreError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "chorekit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".chorekit";

// ---------------------------------------------------------------------------
// Config structs (matching chorekit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Spreadsheet Q&A automator.
    #[serde(default)]
    pub qa: QaConfig,

    /// XML record extractor.
    #[serde(default)]
    pub records: RecordsConfig,

    /// Web data collector.
    #[serde(default)]
    pub collector: CollectorConfig,

    /// URL checker.
    #[serde(default)]
    pub url_check: UrlCheckConfig,

    /// Outgoing mail for the URL report.
    #[serde(default)]
    pub smtp: SmtpConfig,
}

/// `[qa]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaConfig {
    /// Base URL of an OpenAI-compatible API (`/chat/completions` is appended).
    #[serde(default = "default_qa_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_qa_api_key_env")]
    pub api_key_env: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_qa_model")]
    pub model: String,

    /// Optional system message prepended to every question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Per-request timeout.
    #[serde(default = "default_qa_timeout")]
    pub timeout_secs: u64,

    /// Retries for transient failures, per question.
    #[serde(default = "default_qa_retries")]
    pub max_retries: usize,

    /// Abort before touching the workbook when the endpoint does not answer.
    #[serde(default = "default_true")]
    pub preflight: bool,

    /// Worksheet index (0-based).
    #[serde(default)]
    pub sheet: usize,

    /// Column holding the questions (1-based).
    #[serde(default = "default_one")]
    pub question_column: u32,

    /// Column receiving the answers (1-based).
    #[serde(default = "default_two")]
    pub answer_column: u32,

    /// First data row (1-based); rows above it are headers.
    #[serde(default = "default_two")]
    pub first_row: u32,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            endpoint: default_qa_endpoint(),
            api_key_env: default_qa_api_key_env(),
            model: default_qa_model(),
            system_prompt: None,
            timeout_secs: default_qa_timeout(),
            max_retries: default_qa_retries(),
            preflight: true,
            sheet: 0,
            question_column: default_one(),
            answer_column: default_two(),
            first_row: default_two(),
        }
    }
}

fn default_qa_endpoint() -> String {
    "https://api.openai.com/v1".into()
}
fn default_qa_api_key_env() -> String {
    "CHOREKIT_QA_API_KEY".into()
}
fn default_qa_model() -> String {
    "gpt-4o-mini".into()
}
fn default_qa_timeout() -> u64 {
    120
}
fn default_qa_retries() -> usize {
    2
}
fn default_one() -> u32 {
    1
}
fn default_two() -> u32 {
    2
}

/// `[records]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsConfig {
    /// Scalar fields, matched by element local name.
    #[serde(default = "default_record_fields")]
    pub fields: Vec<String>,

    /// Namespace URI elements must belong to. Empty matches any namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Repeated container elements collected as nested groups.
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            fields: default_record_fields(),
            namespace: None,
            groups: Vec::new(),
        }
    }
}

fn default_record_fields() -> Vec<String> {
    ["Nummer", "Baureihe", "Ausfuehrungsart", "EinsatzterminZeichnung"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// `[[records.groups]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Local name of the repeated container element.
    pub element: String,
    /// Fields collected inside each container. Empty collects every leaf child.
    #[serde(default)]
    pub fields: Vec<String>,
}

/// `[collector]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// CSV column (lower-cased header) holding the lookup key.
    #[serde(default = "default_input_column")]
    pub input_column: String,

    /// Domain suffix rewrites applied to the input before lookup.
    #[serde(default)]
    pub domain_rewrites: Vec<DomainRewrite>,

    /// Reject inputs that are not syntactically valid e-mail addresses.
    #[serde(default = "default_true")]
    pub validate_email: bool,

    /// HTML page that identifies the record (`{input}` placeholder).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_url: Option<String>,

    /// CSS selector of the element carrying the identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_selector: Option<String>,

    /// Attribute holding the identifier; the element text is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_attribute: Option<String>,

    /// JSON endpoint (`{input}` and `{id}` placeholders).
    #[serde(default)]
    pub data_url: String,

    /// JSON pointer (with `{id}`) to the object holding the fields.
    #[serde(default)]
    pub data_root: String,

    /// Output fields, in column order.
    #[serde(default)]
    pub fields: Vec<FieldMapping>,

    /// Output names that must be present. Empty means all fields.
    #[serde(default)]
    pub required: Vec<String>,

    /// Session cookie sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<CookieConfig>,

    /// Per-request timeout.
    #[serde(default = "default_collector_timeout")]
    pub timeout_secs: u64,

    /// Retries for transient failures, per request.
    #[serde(default = "default_collector_retries")]
    pub max_retries: usize,

    /// Pause between records.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Skip certificate verification (internal hosts with private CAs).
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Where exports land. Defaults to the user's Downloads directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            input_column: default_input_column(),
            domain_rewrites: Vec::new(),
            validate_email: true,
            lookup_url: None,
            id_selector: None,
            id_attribute: None,
            data_url: String::new(),
            data_root: String::new(),
            fields: Vec::new(),
            required: Vec::new(),
            session_cookie: None,
            timeout_secs: default_collector_timeout(),
            max_retries: default_collector_retries(),
            rate_limit_ms: default_rate_limit(),
            accept_invalid_certs: false,
            output_dir: None,
        }
    }
}

fn default_input_column() -> String {
    "email".into()
}
fn default_true() -> bool {
    true
}
fn default_collector_timeout() -> u64 {
    30
}
fn default_collector_retries() -> usize {
    3
}
fn default_rate_limit() -> u64 {
    200
}

/// `[[collector.domain_rewrites]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainRewrite {
    /// Domain suffix to replace, e.g. `example.io`.
    pub from: String,
    /// Replacement, e.g. `example.com`.
    pub to: String,
}

/// `[[collector.fields]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Column name in the export.
    pub name: String,
    /// Key below `data_root` in the JSON response.
    pub key: String,
}

/// `[collector.session_cookie]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    /// Cookie name.
    pub name: String,
    /// Env var holding the cookie value.
    pub env: String,
}

/// `[url_check]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlCheckConfig {
    /// Check every URL. When false a random tenth (at least one) is checked.
    #[serde(default = "default_true")]
    pub check_all: bool,

    /// Per-request timeout.
    #[serde(default = "default_url_timeout")]
    pub timeout_secs: u64,

    /// External grading command run through the shell, `{url}` placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade_command: Option<String>,

    /// Report and log directory. Defaults to `Logfiles/Logfiles_<date>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_dir: Option<String>,

    /// Move the input file into `Archive/` after the run.
    #[serde(default)]
    pub archive_input: bool,
}

impl Default for UrlCheckConfig {
    fn default() -> Self {
        Self {
            check_all: true,
            timeout_secs: default_url_timeout(),
            grade_command: None,
            report_dir: None,
            archive_input: false,
        }
    }
}

fn default_url_timeout() -> u64 {
    15
}

/// `[smtp]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Relay host. Required once `recipients` is non-empty; only `--no-mail`
    /// or an empty recipient list skip delivery.
    #[serde(default)]
    pub host: String,

    /// Relay port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Upgrade the connection with STARTTLS.
    #[serde(default = "default_true")]
    pub starttls: bool,

    /// Login name, if the relay requires authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Env var holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Sender address.
    #[serde(default)]
    pub from: String,

    /// Report recipients.
    #[serde(default)]
    pub recipients: Vec<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_smtp_port(),
            starttls: true,
            username: None,
            password_env: None,
            from: String::new(),
            recipients: Vec::new(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.chorekit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| ChoreError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.chorekit/chorekit.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
///
/// Unlike [`load_config`], a missing file is an error here: the caller asked
/// for this file explicitly.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ChoreError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ChoreError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ChoreError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(ChoreError::config(format!(
            "{} already exists, refusing to overwrite",
            path.display()
        )));
    }

    let content =
        toml::to_string_pretty(&AppConfig::default()).map_err(|e| ChoreError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ChoreError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a required secret from the environment.
///
/// `purpose` names the secret in the error message, e.g. "model API key".
pub fn require_env(var_name: &str, purpose: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(ChoreError::config(format!(
            "{purpose} not found. Set the {var_name} environment variable."
        ))),
    }
}
