//! URL reachability and TLS checks with an e-mailed report.
//!
//! - [`UrlChecker`]: syntactic validation, strict then lenient TLS probe
//! - [`GradeCommand`]: optional external grading tool per reachable URL
//! - [`Report`]: summary counts, HTML body and the xlsx attachment
//! - [`MailTransport`]: SMTP delivery via `lettre`, swappable in tests

pub mod checker;
pub mod grade;
pub mod mail;
pub mod report;

pub use checker::{
    Probe, UrlChecker, classify, is_certificate_error, run_checks, sample_urls, validate_url,
};
pub use grade::{GradeCommand, parse_grade, strip_ansi};
pub use mail::{MailTransport, OutgoingMail, SmtpMailer, send_report};
pub use report::{Report, ReportSummary, default_report_dir};
