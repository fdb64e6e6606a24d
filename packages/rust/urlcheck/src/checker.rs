//! Reachability and certificate checks.

use std::time::Duration;

use rand::seq::IndexedRandom;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use chorekit_shared::{
    CheckStatus, ChoreError, ProgressReporter, Result, UrlCheckConfig, UrlCheckResult,
};

use crate::grade::GradeCommand;

/// User-Agent string for check requests.
const USER_AGENT: &str = concat!("chorekit-urlcheck/", env!("CARGO_PKG_VERSION"));

/// Parse `raw` and require an `http`/`https` URL with a host.
pub fn validate_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed)
        .map_err(|e| ChoreError::validation(format!("'{trimmed}' is not a URL: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ChoreError::validation(format!(
                "unsupported scheme '{other}' in '{trimmed}'"
            )));
        }
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ChoreError::validation(format!("'{trimmed}' has no host")));
    }
    Ok(url)
}

/// A random tenth of `urls`, at least one.
pub fn sample_urls(urls: &[String]) -> Vec<String> {
    if urls.is_empty() {
        return Vec::new();
    }
    let size = (urls.len() / 10).max(1);
    urls.choose_multiple(&mut rand::rng(), size)
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Outcome of one GET attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// The server answered with this status.
    Response(u16),
    /// No HTTP response; connection or TLS error text.
    Failed(String),
}

/// Whether a failed probe's error chain points at certificate verification.
/// Timeouts, resets and refused connections do not.
pub fn is_certificate_error(error: &str) -> bool {
    const MARKERS: [&str; 5] = [
        "certificate",
        "unknownissuer",
        "self signed",
        "self-signed",
        "notvalidforname",
    ];
    let error = error.to_ascii_lowercase();
    MARKERS.iter().any(|marker| error.contains(marker))
}

/// Combine the strict probe and, for https, the lenient retry into a result.
///
/// `lenient` is only consulted when the strict probe failed on an https URL
/// with a certificate error; any other failure is unreachable.
pub fn classify(url: &str, https: bool, strict: Probe, lenient: Option<Probe>) -> UrlCheckResult {
    let reachable = |status: u16, certificate_valid: Option<bool>, notes: String| UrlCheckResult {
        url: url.to_string(),
        status: CheckStatus::Reachable,
        reachable: true,
        certificate_valid,
        http_status: Some(status),
        grade: None,
        notes,
    };
    let unreachable = |notes: String| UrlCheckResult {
        url: url.to_string(),
        status: CheckStatus::Unreachable,
        reachable: false,
        certificate_valid: None,
        http_status: None,
        grade: None,
        notes,
    };

    match (strict, lenient) {
        (Probe::Response(status), _) => reachable(status, https.then_some(true), String::new()),
        (Probe::Failed(strict_err), Some(Probe::Response(status)))
            if https && is_certificate_error(&strict_err) =>
        {
            reachable(
                status,
                Some(false),
                format!("certificate not trusted: {strict_err}"),
            )
        }
        (Probe::Failed(strict_err), _) => unreachable(strict_err),
    }
}

// ---------------------------------------------------------------------------
// UrlChecker
// ---------------------------------------------------------------------------

/// Checks URLs with a certificate-verifying client, falling back to a
/// lenient client to tell TLS problems apart from dead hosts.
pub struct UrlChecker {
    strict: Client,
    lenient: Client,
}

impl UrlChecker {
    /// Build both clients from the `[url_check]` section.
    pub fn new(config: &UrlCheckConfig) -> Result<Self> {
        let build = |accept_invalid: bool| {
            Client::builder()
                .user_agent(USER_AGENT)
                .redirect(reqwest::redirect::Policy::limited(10))
                .timeout(Duration::from_secs(config.timeout_secs))
                .danger_accept_invalid_certs(accept_invalid)
                .build()
                .map_err(|e| ChoreError::Network(format!("failed to build HTTP client: {e}")))
        };

        Ok(Self {
            strict: build(false)?,
            lenient: build(true)?,
        })
    }

    /// Check one URL. Never fails: every outcome is a result row.
    #[instrument(skip_all, fields(url = %raw))]
    pub async fn check(&self, raw: &str) -> UrlCheckResult {
        let url = match validate_url(raw) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "invalid URL");
                return UrlCheckResult::invalid(raw.trim(), e.to_string());
            }
        };

        let https = url.scheme() == "https";
        let strict = probe(&self.strict, &url).await;
        let lenient = match (&strict, https) {
            (Probe::Failed(err), true) if is_certificate_error(err) => {
                debug!(error = %err, "strict probe failed, retrying without verification");
                Some(probe(&self.lenient, &url).await)
            }
            _ => None,
        };

        let result = classify(raw.trim(), https, strict, lenient);
        info!(
            status = %result.status,
            http_status = ?result.http_status,
            certificate_valid = ?result.certificate_valid,
            "checked"
        );
        result
    }
}

async fn probe(client: &Client, url: &Url) -> Probe {
    match client.get(url.as_str()).send().await {
        Ok(response) => Probe::Response(response.status().as_u16()),
        Err(e) => Probe::Failed(error_chain(&e)),
    }
}

/// `reqwest` hides the TLS/connect cause in the source chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Check every URL in order, then grade the reachable ones when a grading
/// command is configured. Each input appears exactly once in the output.
pub async fn run_checks(
    checker: &UrlChecker,
    grader: Option<&GradeCommand>,
    urls: &[String],
    progress: &dyn ProgressReporter,
) -> Vec<UrlCheckResult> {
    let mut results = Vec::with_capacity(urls.len());
    progress.phase("Checking URLs");

    for (i, raw) in urls.iter().enumerate() {
        progress.item(raw, i + 1, urls.len());
        let mut result = checker.check(raw).await;

        if let (Some(grader), true) = (grader, result.reachable) {
            match grader.run(&result.url).await {
                Ok(grade) => result.grade = Some(grade),
                Err(e) => {
                    warn!(url = %result.url, error = %e, "grading failed");
                    if !result.notes.is_empty() {
                        result.notes.push_str("; ");
                    }
                    result.notes.push_str(&format!("grading failed: {e}"));
                }
            }
        }
        results.push(result);
    }

    progress.done();
    results
}
