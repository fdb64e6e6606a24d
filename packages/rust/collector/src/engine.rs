//! Sequential collector engine.

use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Client;
use reqwest::header::COOKIE;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use chorekit_sheets::CsvTable;
use chorekit_shared::{
    ChoreError, CollectFailure, CollectorConfig, CrawledItem, FailureReason, ItemStatus,
    ProgressReporter, Result, RetryPolicy, is_valid_email, rewrite_domain, with_retry,
};

/// User-Agent string for collector requests.
const USER_AGENT: &str = concat!("chorekit-collector/", env!("CARGO_PKG_VERSION"));

/// Everything but RFC 3986 unreserved characters; safe in paths and queries.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

// ---------------------------------------------------------------------------
// CollectReport
// ---------------------------------------------------------------------------

/// Result of a collector run.
#[derive(Debug, Default)]
pub struct CollectReport {
    /// One item per record whose data could be fetched (valid or not).
    pub items: Vec<CrawledItem>,
    /// Rejected records, in input order.
    pub failures: Vec<CollectFailure>,
}

impl CollectReport {
    /// Items that passed validation.
    pub fn valid_items(&self) -> impl Iterator<Item = &CrawledItem> {
        self.items.iter().filter(|item| item.is_valid())
    }
}

/// Per-record failure before it is attached to the raw row.
struct Rejection {
    reason: FailureReason,
    detail: String,
}

impl Rejection {
    fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    /// 404 means the record does not exist; anything else after retries is
    /// an unreachable target.
    fn from_request(err: ChoreError) -> Self {
        match err {
            ChoreError::Http { status: 404, .. } => {
                Self::new(FailureReason::NotFound, err.to_string())
            }
            other => Self::new(FailureReason::Unreachable, other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Collects data for a list of input records over HTTP.
pub struct Collector {
    config: CollectorConfig,
    client: Client,
    cookie: Option<String>,
    id_selector: Option<Selector>,
    retry: RetryPolicy,
}

impl Collector {
    /// Create a collector. `cookie_value` is the resolved value of the
    /// configured session cookie, if any.
    pub fn new(config: CollectorConfig, cookie_value: Option<String>) -> Result<Self> {
        if config.data_url.trim().is_empty() {
            return Err(ChoreError::config("collector.data_url is not set"));
        }
        if config.fields.is_empty() {
            return Err(ChoreError::config("collector.fields is empty"));
        }

        let id_selector = match (&config.lookup_url, &config.id_selector) {
            (Some(_), None) => {
                return Err(ChoreError::config(
                    "collector.lookup_url requires collector.id_selector",
                ));
            }
            (Some(_), Some(raw)) => Some(Selector::parse(raw).map_err(|e| {
                ChoreError::config(format!("invalid collector.id_selector '{raw}': {e:?}"))
            })?),
            (None, _) => None,
        };

        let cookie = match (&config.session_cookie, cookie_value) {
            (Some(cookie), Some(value)) => Some(format!("{}={value}", cookie.name)),
            _ => None,
        };

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| ChoreError::Network(format!("failed to build HTTP client: {e}")))?;

        let retry = RetryPolicy::with_retries(config.max_retries);

        Ok(Self {
            config,
            client,
            cookie,
            id_selector,
            retry,
        })
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Process every row of `table`.
    ///
    /// A missing input column is fatal; everything else is recorded per row.
    #[instrument(skip_all, fields(rows = table.rows.len()))]
    pub async fn collect(
        &self,
        table: &CsvTable,
        progress: &dyn ProgressReporter,
    ) -> Result<CollectReport> {
        let column = table.column(&self.config.input_column).ok_or_else(|| {
            ChoreError::validation(format!(
                "input column '{}' not found (columns: {})",
                self.config.input_column,
                table.headers.join(", ")
            ))
        })?;

        info!(
            input_column = %self.config.input_column,
            fields = self.config.fields.len(),
            rate_limit_ms = self.config.rate_limit_ms,
            "starting collection"
        );

        let mut report = CollectReport::default();
        let total = table.rows.len();
        progress.phase("Collecting");

        for (i, row) in table.rows.iter().enumerate() {
            if i > 0 && self.config.rate_limit_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.rate_limit_ms)).await;
            }

            let raw_input = row.get(column).map(String::as_str).unwrap_or_default();
            let input = rewrite_domain(raw_input, &self.config.domain_rewrites);
            progress.item(&input, i + 1, total);

            match self.process(&input).await {
                Ok(item) => {
                    if let ItemStatus::Invalid { missing } = &item.status {
                        warn!(%input, missing = ?missing, "required data missing");
                        report.failures.push(CollectFailure {
                            input: input.clone(),
                            reason: FailureReason::MissingData,
                            detail: format!("missing: {}", missing.join(", ")),
                            raw: row.clone(),
                        });
                    } else {
                        info!(%input, "record collected");
                    }
                    report.items.push(item);
                }
                Err(rejection) => {
                    warn!(
                        %input,
                        reason = %rejection.reason,
                        detail = %rejection.detail,
                        "record rejected"
                    );
                    report.failures.push(CollectFailure {
                        input,
                        reason: rejection.reason,
                        detail: rejection.detail,
                        raw: row.clone(),
                    });
                }
            }
        }

        progress.done();
        info!(
            collected = report.items.len(),
            valid = report.valid_items().count(),
            failures = report.failures.len(),
            "collection completed"
        );

        Ok(report)
    }

    /// Validate → look up → fetch → extract, for one input.
    async fn process(&self, input: &str) -> std::result::Result<CrawledItem, Rejection> {
        if input.is_empty() {
            return Err(Rejection::new(FailureReason::InvalidInput, "empty input"));
        }
        if self.config.validate_email && !is_valid_email(input) {
            return Err(Rejection::new(
                FailureReason::InvalidInput,
                format!("'{input}' is not a valid e-mail address"),
            ));
        }

        let id = self.lookup_id(input).await?;
        let url = fill_template(&self.config.data_url, input, &id);
        let body = self.get(&url).await.map_err(Rejection::from_request)?;
        let document: Value = serde_json::from_str(&body).map_err(|e| {
            Rejection::new(
                FailureReason::Unreachable,
                format!("{url}: response is not JSON: {e}"),
            )
        })?;

        let pointer = self.config.data_root.replace("{id}", &escape_pointer(&id));
        let root = if pointer.is_empty() {
            Some(&document)
        } else {
            document.pointer(&pointer)
        };
        if root.is_none() {
            debug!(%input, %pointer, "data root not present in response");
        }

        let fields: Vec<(String, Option<String>)> = self
            .config
            .fields
            .iter()
            .map(|field| {
                let value = root
                    .and_then(|r| r.get(&field.key))
                    .and_then(json_text);
                (field.name.clone(), value)
            })
            .collect();

        let missing = self.missing_required(&fields);
        let status = if missing.is_empty() {
            ItemStatus::Valid
        } else {
            ItemStatus::Invalid { missing }
        };

        Ok(CrawledItem {
            input: input.to_string(),
            url,
            fields,
            status,
        })
    }

    /// Identifier for `input`: scraped from the lookup page, or the input
    /// itself when no lookup page is configured.
    async fn lookup_id(&self, input: &str) -> std::result::Result<String, Rejection> {
        let (Some(template), Some(selector)) = (&self.config.lookup_url, &self.id_selector) else {
            return Ok(input.to_string());
        };

        let url = fill_template(template, input, "");
        let html = self.get(&url).await.map_err(Rejection::from_request)?;

        extract_id(&html, selector, self.config.id_attribute.as_deref()).ok_or_else(|| {
            Rejection::new(
                FailureReason::NotFound,
                format!("no identifier on lookup page {url}"),
            )
        })
    }

    /// GET `url` and return the body, retrying transient failures.
    async fn get(&self, url: &str) -> Result<String> {
        with_retry(&self.retry, "collector request", || async {
            debug!(%url, "fetching");
            let mut request = self.client.get(url);
            if let Some(cookie) = &self.cookie {
                request = request.header(COOKIE, cookie);
            }

            let response = request
                .send()
                .await
                .map_err(|e| ChoreError::Network(format!("{url}: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ChoreError::Http {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            response
                .text()
                .await
                .map_err(|e| ChoreError::Network(format!("{url}: body read failed: {e}")))
        })
        .await
    }

    fn missing_required(&self, fields: &[(String, Option<String>)]) -> Vec<String> {
        let is_required = |name: &str| {
            self.config.required.is_empty() || self.config.required.iter().any(|r| r == name)
        };
        fields
            .iter()
            .filter(|(name, value)| value.is_none() && is_required(name))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Substitute `{input}` and `{id}`, percent-encoded.
fn fill_template(template: &str, input: &str, id: &str) -> String {
    let encode = |v: &str| utf8_percent_encode(v, COMPONENT).to_string();
    template
        .replace("{input}", &encode(input))
        .replace("{id}", &encode(id))
}

/// Escape a JSON pointer reference token (RFC 6901).
fn escape_pointer(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Identifier from the first element matching `selector`.
fn extract_id(html: &str, selector: &Selector, attribute: Option<&str>) -> Option<String> {
    let document = Html::parse_document(html);
    let element = document.select(selector).next()?;
    let value = match attribute {
        Some(attr) => element.value().attr(attr)?.trim().to_string(),
        None => element.text().collect::<String>().trim().to_string(),
    };
    (!value.is_empty()).then_some(value)
}

/// Text form of a JSON value. `null` and blank strings are missing.
fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
