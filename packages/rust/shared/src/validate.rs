//! Input validation helpers.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::DomainRewrite;

/// Pragmatic address check: one `@`, no whitespace, a dotted domain with an
/// alphabetic TLD.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$")
        .expect("email regex")
});

/// Whether `candidate` is a syntactically valid e-mail address.
pub fn is_valid_email(candidate: &str) -> bool {
    let candidate = candidate.trim();
    !candidate.starts_with('.')
        && !candidate.contains("..")
        && EMAIL_RE.is_match(candidate)
}

/// Apply the first matching domain-suffix rewrite to an address.
///
/// A suffix only matches on a label boundary: `example.io` rewrites
/// `jane@example.io` and `jane@mail.example.io`, never `jane@notexample.io`.
pub fn rewrite_domain(address: &str, rewrites: &[DomainRewrite]) -> String {
    let address = address.trim();
    for rewrite in rewrites {
        let from = rewrite.from.as_str();
        if from.is_empty() {
            continue;
        }
        let Some(prefix) = address.strip_suffix(from) else {
            continue;
        };
        if from.starts_with(['@', '.']) || prefix.ends_with(['@', '.']) {
            return format!("{prefix}{}", rewrite.to);
        }
    }
    address.to_string()
}
