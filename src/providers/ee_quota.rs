//! EE quota block
//!
//! EE serves an add-on status page to devices on its network. The page has
//! no API, so the remaining allowance is scraped from two marked-up nodes:
//!
//! - `.allowance__left`: text of the form `3.2GB left of 10GB`
//! - `.allowance__timespan`: text of the form `Lasts for 12 days 5 hours`
//!
//! Both patterns are matched from the start of the node text. Upstream
//! markup changes break them silently, which shows up as the down format.
//!
//! Placeholders: `quota_left`, `quota_total`, `quota_days`, `quota_hours`.
//! There is no `quota_color`; the severity is only sent as the block color.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA, USER_AGENT};
use scraper::{Html, Selector};

use super::{BlockProvider, BlockResponse, Severity, StatusSnapshot, ThresholdPolicy};
use crate::config::EeQuotaConfig;
use crate::host::Host;
use crate::http;
use crate::template::{self, TemplateError};

const STATUS_URL: &str = "http://add-on.ee.co.uk/status";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/65.0.3325.162 Safari/537.36";
const CACHE_SECONDS: i64 = 3600;

const ALLOWANCE_LEFT_SELECTOR: &str = ".allowance__left";
const ALLOWANCE_TIMESPAN_SELECTOR: &str = ".allowance__timespan";

/// Placeholders that must resolve for the block to be up.
/// `quota_days` and `quota_hours` are optional.
const REQUIRED_PLACEHOLDERS: &[&str] = &["quota_left", "quota_total"];

// Lazily skips any prefix, then `<amount><unit>` `left of` `<amount><unit>`.
// `amount` is digits and dots, `unit` is word characters.
static ALLOWANCE_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"(?s)^.*?(?P<left>(?P<left_amount>[0-9.]+)\w+)\s+left\s+of\s+(?P<total>[0-9.]+\w+)",
    )
    .ok()
});

// `Lasts for <days>`, anything, then `<hours>` followed by whitespace.
static TIMESPAN_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*Lasts for\s+(?P<days>\d+).*?(?P<hours>\d+)\s+").ok()
});

/// Remaining allowance as printed on the page
#[derive(Debug, Clone, PartialEq)]
pub struct Allowance {
    pub left: String,
    pub total: String,
    pub left_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timespan {
    pub days: String,
    pub hours: String,
}

pub fn parse_allowance(text: &str) -> Option<Allowance> {
    let captures = ALLOWANCE_RE.as_ref()?.captures(text)?;
    let left_amount = captures.name("left_amount")?.as_str().parse::<f64>().ok()?;

    Some(Allowance {
        left: captures.name("left")?.as_str().to_string(),
        total: captures.name("total")?.as_str().to_string(),
        left_amount,
    })
}

pub fn parse_timespan(text: &str) -> Option<Timespan> {
    let captures = TIMESPAN_RE.as_ref()?.captures(text)?;

    Some(Timespan {
        days: captures.name("days")?.as_str().to_string(),
        hours: captures.name("hours")?.as_str().to_string(),
    })
}

/// Text content of the first element matching `selector`
fn first_node_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>())
}

pub struct EeQuotaProvider {
    client: reqwest::Client,
    url: String,
    config: EeQuotaConfig,
    policy: ThresholdPolicy,
    host: Arc<dyn Host>,
}

impl EeQuotaProvider {
    pub fn new(config: EeQuotaConfig, host: Arc<dyn Host>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));

        let policy = ThresholdPolicy::new(config.bad_threshold, config.degraded_threshold);

        Self {
            client: http::build_client(headers),
            url: STATUS_URL.to_string(),
            config,
            policy,
            host,
        }
    }

    /// Point the block at a different status page
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    async fn fetch_page(&self) -> Result<String, reqwest::Error> {
        tracing::debug!("Fetching EE status page from: {}", self.url);
        let response = self.client.get(&self.url).send().await?;
        tracing::debug!("EE status page returned {}", response.status());
        response.text().await
    }

    /// Fetch and scrape the status page
    ///
    /// Never fails: network errors leave the snapshot empty, parse misses
    /// leave the corresponding placeholders out.
    pub async fn fetch_quota(&self) -> StatusSnapshot {
        match self.fetch_page().await {
            Ok(body) => self.parse_page(&body),
            Err(e) => {
                tracing::warn!("EE status page request failed: {}", e);
                StatusSnapshot::new()
            }
        }
    }

    pub fn parse_page(&self, body: &str) -> StatusSnapshot {
        let document = Html::parse_document(body);
        let mut snapshot = StatusSnapshot::new();

        match first_node_text(&document, ALLOWANCE_LEFT_SELECTOR) {
            Some(text) => match parse_allowance(&text) {
                Some(allowance) => {
                    snapshot.set_severity(self.policy.classify(allowance.left_amount));
                    snapshot.insert("quota_left", allowance.left);
                    snapshot.insert("quota_total", allowance.total);
                }
                None => tracing::debug!("Allowance text did not match: {:?}", text.trim()),
            },
            None => tracing::debug!("No {} node on EE status page", ALLOWANCE_LEFT_SELECTOR),
        }

        if let Some(timespan) = first_node_text(&document, ALLOWANCE_TIMESPAN_SELECTOR)
            .as_deref()
            .and_then(parse_timespan)
        {
            snapshot.insert("quota_days", timespan.days);
            snapshot.insert("quota_hours", timespan.hours);
        }

        snapshot
    }

    /// Render a snapshot for the bar
    ///
    /// An up format that cannot be satisfied falls back to the down format;
    /// a down format that cannot be satisfied is a configuration error.
    pub fn present(&self, snapshot: &StatusSnapshot) -> Result<BlockResponse, TemplateError> {
        let cached_until = self.host.time_in(CACHE_SECONDS);

        if let Some(severity) = snapshot.severity() {
            if snapshot.is_complete(REQUIRED_PLACEHOLDERS) {
                match template::render(&self.config.format, snapshot) {
                    Ok(full_text) => {
                        return Ok(BlockResponse {
                            full_text,
                            color: self.host.color(severity),
                            cached_until,
                        })
                    }
                    Err(e) => tracing::warn!("EE quota format failed: {}", e),
                }
            }
        }

        Ok(BlockResponse {
            full_text: template::render(&self.config.format_down, snapshot)?,
            color: self.host.color(Severity::Bad),
            cached_until,
        })
    }
}

#[async_trait]
impl BlockProvider for EeQuotaProvider {
    fn name(&self) -> &'static str {
        "EE Quota"
    }

    fn description(&self) -> &'static str {
        "Data allowance left on an EE mobile broadband account"
    }

    fn cache_seconds(&self) -> i64 {
        CACHE_SECONDS
    }

    async fn poll(&self) -> Result<BlockResponse, anyhow::Error> {
        tracing::debug!("Polling EE quota");
        let snapshot = self.fetch_quota().await;
        Ok(self.present(&snapshot)?)
    }
}
