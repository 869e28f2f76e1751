//! URL syntax check plus a bounded reachability probe.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{RANGE, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use tracing::debug;

static SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:").expect("scheme regex compiles"));

pub const PROBE_USER_AGENT: &str = concat!("docagent-url-validator/", env!("CARGO_PKG_VERSION"));

/// Result reported back to the model as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlReport {
    /// Syntactic validity (scheme and host).
    pub valid: bool,
    pub reachable: bool,
    /// Parsed URL, replaced by the final target after redirects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UrlProbe {
    client: Client,
}

impl UrlProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("build url probe http client")?;
        Ok(Self { client })
    }

    pub fn validate(&self, input: &str) -> UrlReport {
        let input = input.trim();
        let mut report = UrlReport {
            valid: false,
            reachable: false,
            normalized_url: None,
            issues: Vec::new(),
        };

        let url = match parse_http_url(input) {
            Ok(url) => url,
            Err(issues) => {
                report.issues = issues;
                return report;
            }
        };
        report.valid = true;
        report.normalized_url = Some(url.to_string());

        match self.probe(&url) {
            Ok((status, final_url)) => {
                report.normalized_url = Some(final_url.to_string());
                if status.is_success() || status.is_redirection() {
                    report.reachable = true;
                } else {
                    report
                        .issues
                        .push(format!("unreachable or unexpected status: {}", status.as_u16()));
                }
            }
            Err(err) => {
                report.issues.push(format!("network error: {err}"));
                report.issues.push("unreachable: no response".to_string());
            }
        }
        debug!(url = input, reachable = report.reachable, "probed url");
        report
    }

    /// HEAD first; fall back to a one-byte ranged GET when HEAD is refused.
    fn probe(&self, url: &Url) -> reqwest::Result<(StatusCode, Url)> {
        let head = self
            .client
            .head(url.clone())
            .header(USER_AGENT, PROBE_USER_AGENT)
            .send()?;
        let status = head.status();
        if status != StatusCode::METHOD_NOT_ALLOWED && status != StatusCode::NOT_IMPLEMENTED {
            return Ok((status, head.url().clone()));
        }
        let get = self
            .client
            .get(url.clone())
            .header(USER_AGENT, PROBE_USER_AGENT)
            .header(RANGE, "bytes=0-0")
            .send()?;
        Ok((get.status(), get.url().clone()))
    }
}

/// Parse `input` as an absolute http(s) URL with a host.
pub fn parse_http_url(input: &str) -> Result<Url, Vec<String>> {
    if input.is_empty() {
        return Err(vec!["empty URL".to_string()]);
    }
    if input.chars().any(char::is_whitespace) {
        return Err(vec!["URL contains whitespace".to_string()]);
    }
    if !SCHEME_RE.is_match(input) {
        return Err(vec![
            "missing scheme (expected http or https)".to_string(),
            "missing host".to_string(),
        ]);
    }
    let mut issues = Vec::new();
    let authority = input
        .split_once("://")
        .map(|(_, rest)| rest.split(['/', '?', '#']).next().unwrap_or_default());
    if authority.is_none_or(str::is_empty) {
        issues.push("missing host".to_string());
    }
    let url = match Url::parse(input) {
        Ok(url) => url,
        Err(err) if issues.is_empty() => return Err(vec![format!("parse error: {err}")]),
        Err(_) => {
            if !input.starts_with("http://") && !input.starts_with("https://") {
                issues.insert(0, "unsupported scheme (only http/https allowed)".to_string());
            }
            return Err(issues);
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        issues.insert(0, "unsupported scheme (only http/https allowed)".to_string());
    }
    if issues.is_empty() && url.host_str().is_none_or(str::is_empty) {
        issues.push("missing host".to_string());
    }
    if issues.is_empty() { Ok(url) } else { Err(issues) }
}
