//! Shared types, error model, and configuration for chorekit.
//!
//! This crate is the foundation depended on by all other chorekit crates.
//! It provides:
//! - [`ChoreError`]: the unified error type
//! - Domain types ([`QuestionRow`], [`ChangeRecord`], [`CrawledItem`], [`UrlCheckResult`])
//! - Configuration ([`AppConfig`] and its sections, config loading)
//! - [`with_retry`] for bounded network retries

pub mod config;
pub mod error;
pub mod progress;
pub mod retry;
pub mod types;
pub mod validate;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CollectorConfig, CookieConfig, DomainRewrite, FieldMapping, GroupConfig, QaConfig,
    RecordsConfig, SmtpConfig, UrlCheckConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, require_env,
};
pub use error::{ChoreError, Result};
pub use progress::{ProgressReporter, SilentProgress};
pub use retry::{RetryPolicy, with_retry};
pub use types::{
    ChangeRecord, CheckStatus, CollectFailure, CrawledItem, FailureReason, Grade, ItemStatus,
    QuestionRow, UrlCheckResult,
};
pub use validate::{is_valid_email, rewrite_domain};
