//! Huawei modem block
//!
//! Reads signal strength and network type from the local web API of a
//! Huawei mobile broadband modem (E3785 and relatives).
//! Endpoint: <url>/api/monitoring/status
//!
//! The API answers `<error><code>125002</code></error>` until the client
//! holds a session cookie, which the modem hands out on a plain GET of the
//! web root. The block fetches that cookie once per challenge and retries
//! the status call once.
//!
//! Every child of the status document is a placeholder under its snake_case
//! name (`signal_icon`, `current_network_type`, ...). There is no `{color}`
//! placeholder; the severity is only sent as the block color.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::Mutex;

use super::{BlockProvider, BlockResponse, Severity, StatusSnapshot, ThresholdPolicy};
use crate::config::HuaweiConfig;
use crate::debug_settings;
use crate::host::Host;
use crate::http;
use crate::template::{self, TemplateError};

const STATUS_PATH: &str = "/api/monitoring/status";
const CACHE_SECONDS: i64 = 60;

/// Error code the modem returns when the request carries no valid session
pub const SESSION_REQUIRED_CODE: &str = "125002";

const REQUIRED_PLACEHOLDERS: &[&str] = &["signal_icon", "current_network_type"];

static FIRST_CAP_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(.)([A-Z][a-z]+)").ok());
static ALL_CAP_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").ok());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HuaweiError {
    #[error("Modem API returned unexpected error code {0}")]
    UnexpectedCode(String),
    #[error("Malformed modem XML: {0}")]
    Xml(String),
    #[error("Modem status is missing <{0}>")]
    MissingField(&'static str),
    #[error("Modem signal level {0:?} is not an integer")]
    InvalidSignal(String),
    #[error("Modem signal level {level} is outside the {palette}-glyph palette")]
    SignalOutOfRange { level: i64, palette: usize },
}

/// Convert a CamelCase tag name to snake_case
///
/// `_` goes before an uppercase letter that starts a lowercase run and
/// before an uppercase letter that follows a lowercase letter or digit.
/// `WanIPAddress` becomes `wan_ip_address`.
pub fn camel_to_snake(name: &str) -> String {
    let mut converted = name.to_string();
    if let Some(regex) = FIRST_CAP_RE.as_ref() {
        converted = regex.replace_all(&converted, "${1}_${2}").into_owned();
    }
    if let Some(regex) = ALL_CAP_RE.as_ref() {
        converted = regex.replace_all(&converted, "${1}_${2}").into_owned();
    }
    converted.to_lowercase()
}

/// Generation label for the modem's numeric network type
pub fn network_type(code: &str) -> &'static str {
    match code.trim() {
        "0" => "No Service",
        // GSM, GPRS, EDGE, EV-DV, 1xRTT
        "1" | "2" | "3" | "15" | "16" => "2G",
        // WCDMA, HSDPA, HSUPA, HSPA, TD-SCDMA, HSPA+, EV-DO rev 0/A/B,
        // HSPA+ 64QAM, HSPA+ MIMO
        "4" | "5" | "6" | "7" | "8" | "9" | "10" | "11" | "12" | "17" | "18" => "3G",
        // LTE
        "19" => "4G",
        _ => "??",
    }
}

/// A direct child of the document root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusField {
    pub name: String,
    pub text: Option<String>,
}

/// Root element of a modem API response and its direct children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDocument {
    pub root: String,
    pub fields: Vec<StatusField>,
}

impl StatusDocument {
    pub fn parse(xml: &str) -> Result<Self, HuaweiError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut depth = 0usize;
        let mut root = None;
        let mut fields = Vec::new();
        let mut current: Option<StatusField> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    depth += 1;
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                    match depth {
                        1 if root.is_none() => root = Some(name),
                        1 => return Err(HuaweiError::Xml("multiple root elements".to_string())),
                        2 => current = Some(StatusField { name, text: None }),
                        _ => {}
                    }
                }
                Ok(Event::Empty(e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                    match depth {
                        0 if root.is_none() => root = Some(name),
                        0 => return Err(HuaweiError::Xml("multiple root elements".to_string())),
                        1 => fields.push(StatusField { name, text: None }),
                        _ => {}
                    }
                }
                Ok(Event::End(_)) => {
                    if depth == 2 {
                        if let Some(field) = current.take() {
                            fields.push(field);
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                Ok(Event::Text(e)) if depth == 2 => {
                    let text = e
                        .unescape()
                        .map_err(|err| HuaweiError::Xml(err.to_string()))?;
                    if let Some(field) = current.as_mut() {
                        field.text.get_or_insert_with(String::new).push_str(&text);
                    }
                }
                Ok(Event::CData(e)) if depth == 2 => {
                    let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                    if let Some(field) = current.as_mut() {
                        field.text.get_or_insert_with(String::new).push_str(&text);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(HuaweiError::Xml(e.to_string())),
                _ => {}
            }
        }

        if depth != 0 {
            return Err(HuaweiError::Xml("unexpected end of document".to_string()));
        }
        let root = root.ok_or_else(|| HuaweiError::Xml("no root element".to_string()))?;

        Ok(Self { root, fields })
    }

    /// Text of the first direct `<code>` child, when it carries any
    pub fn error_code(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.name == "code")
            .and_then(|field| field.text.as_deref())
            .filter(|code| !code.is_empty())
    }
}

/// Session cookies issued by the modem, replaced wholesale on refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCookies {
    jar: BTreeMap<String, String>,
}

impl SessionCookies {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut jar = BTreeMap::new();
        for value in headers.get_all(SET_COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            match cookie::Cookie::parse(value) {
                Ok(parsed) => {
                    jar.insert(parsed.name().to_string(), parsed.value().to_string());
                }
                Err(e) => tracing::debug!("Ignoring unparsable Set-Cookie: {}", e),
            }
        }
        Self { jar }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.jar.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.jar.is_empty()
    }

    /// Value for a `Cookie` request header
    pub fn header_value(&self) -> Option<String> {
        if self.jar.is_empty() {
            return None;
        }
        Some(
            self.jar
                .iter()
                .map(|(name, value)| {
                    cookie::Cookie::new(name.as_str(), value.as_str())
                        .stripped()
                        .to_string()
                })
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

pub struct HuaweiProvider {
    client: reqwest::Client,
    config: HuaweiConfig,
    policy: ThresholdPolicy,
    host: Arc<dyn Host>,
    session: Mutex<SessionCookies>,
}

impl HuaweiProvider {
    pub fn new(config: HuaweiConfig, host: Arc<dyn Host>) -> Self {
        let policy = ThresholdPolicy::new(config.bad_threshold, config.degraded_threshold);

        Self {
            client: http::build_client(HeaderMap::new()),
            config,
            policy,
            host,
            session: Mutex::new(SessionCookies::default()),
        }
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    pub async fn session_cookies(&self) -> SessionCookies {
        self.session.lock().await.clone()
    }

    /// GET with the current session cookies; only a 200 counts as a response
    async fn get(&self, url: &str) -> Option<reqwest::Response> {
        let mut request = self.client.get(url);
        let cookie_header = self.session.lock().await.header_value();
        if let Some(header) = cookie_header {
            tracing::debug!(
                "Sending modem cookies: {}",
                debug_settings::redact_cookie_header(&header)
            );
            request = request.header(COOKIE, header);
        }

        match request.send().await {
            Ok(response) if response.status() == StatusCode::OK => Some(response),
            Ok(response) => {
                tracing::debug!("Modem request {} returned {}", url, response.status());
                None
            }
            Err(e) => {
                tracing::debug!("Modem request {} failed: {}", url, e);
                None
            }
        }
    }

    async fn request_status(&self) -> Option<StatusDocument> {
        let response = self.get(&self.endpoint(STATUS_PATH)).await?;
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Failed to read modem status body: {}", e);
                return None;
            }
        };

        match StatusDocument::parse(&body) {
            Ok(document) => Some(document),
            Err(e) => {
                tracing::warn!("Modem status unreadable: {}", e);
                None
            }
        }
    }

    /// Replace the session with the cookies handed out by the web root
    async fn refresh_session(&self) {
        let cookies = match self.get(self.base_url()).await {
            Some(response) => SessionCookies::from_headers(response.headers()),
            None => {
                tracing::warn!("Modem session refresh failed, retrying without cookies");
                SessionCookies::default()
            }
        };
        tracing::debug!("Modem session refreshed with {} cookie(s)", cookies.jar.len());
        *self.session.lock().await = cookies;
    }

    /// Run the status protocol: request, one session refresh and one retry
    /// on a session challenge.
    ///
    /// `Ok(None)` means the modem could not be reached or would not hand
    /// out a usable session.
    async fn get_status(&self) -> Result<Option<StatusDocument>, HuaweiError> {
        let Some(document) = self.request_status().await else {
            return Ok(None);
        };

        match document.error_code() {
            None => return Ok(Some(document)),
            Some(SESSION_REQUIRED_CODE) => {}
            Some(code) => return Err(HuaweiError::UnexpectedCode(code.to_string())),
        }

        tracing::debug!("Modem requires a session, refreshing");
        self.refresh_session().await;

        let Some(document) = self.request_status().await else {
            return Ok(None);
        };

        match document.error_code() {
            None => Ok(Some(document)),
            Some(SESSION_REQUIRED_CODE) => {
                tracing::warn!("Modem rejected the refreshed session");
                Ok(None)
            }
            Some(code) => Err(HuaweiError::UnexpectedCode(code.to_string())),
        }
    }

    /// Turn a status document into placeholders and a severity
    pub fn decode_status(&self, document: &StatusDocument) -> Result<StatusSnapshot, HuaweiError> {
        let mut snapshot = StatusSnapshot::new();
        for field in &document.fields {
            snapshot.insert(
                camel_to_snake(&field.name),
                field.text.clone().unwrap_or_default(),
            );
        }

        let network = network_type(
            snapshot
                .get("current_network_type")
                .ok_or(HuaweiError::MissingField("current_network_type"))?,
        );

        let raw_signal = snapshot
            .get("signal_icon")
            .ok_or(HuaweiError::MissingField("signal_icon"))?;
        let level = raw_signal
            .trim()
            .parse::<i64>()
            .map_err(|_| HuaweiError::InvalidSignal(raw_signal.to_string()))?;
        let glyph = usize::try_from(level)
            .ok()
            .and_then(|index| self.config.signal_chars.chars().nth(index))
            .ok_or(HuaweiError::SignalOutOfRange {
                level,
                palette: self.config.signal_chars.chars().count(),
            })?;

        snapshot.insert("current_network_type", network);
        snapshot.insert("signal_icon", glyph.to_string());
        snapshot.set_severity(self.policy.classify(level as f64));
        Ok(snapshot)
    }

    /// Poll the modem
    ///
    /// Unreachable or unreadable modems produce the down snapshot. Only an
    /// error code other than the session challenge is returned as an error.
    pub async fn fetch_status(&self) -> Result<StatusSnapshot, HuaweiError> {
        let Some(document) = self.get_status().await? else {
            return Ok(StatusSnapshot::down());
        };

        match self.decode_status(&document) {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                tracing::warn!("Modem status not usable: {}", e);
                Ok(StatusSnapshot::down())
            }
        }
    }

    pub fn present(&self, snapshot: &StatusSnapshot) -> Result<BlockResponse, TemplateError> {
        let cached_until = self.host.time_in(CACHE_SECONDS);

        match snapshot.severity() {
            Some(severity) if snapshot.is_complete(REQUIRED_PLACEHOLDERS) => Ok(BlockResponse {
                full_text: template::render(&self.config.format_up, snapshot)?,
                color: self.host.color(severity),
                cached_until,
            }),
            _ => Ok(BlockResponse {
                full_text: template::render(&self.config.format_down, &StatusSnapshot::down())?,
                color: self.host.color(Severity::Bad),
                cached_until,
            }),
        }
    }
}

#[async_trait]
impl BlockProvider for HuaweiProvider {
    fn name(&self) -> &'static str {
        "Huawei"
    }

    fn description(&self) -> &'static str {
        "Signal and network type of a Huawei mobile broadband modem"
    }

    fn cache_seconds(&self) -> i64 {
        CACHE_SECONDS
    }

    async fn poll(&self) -> Result<BlockResponse, anyhow::Error> {
        tracing::debug!("Polling Huawei modem at {}", self.base_url());
        let snapshot = self.fetch_status().await?;
        Ok(self.present(&snapshot)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SystemHost;
    use reqwest::header::HeaderValue;

    const STATUS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<response>
<ConnectionStatus>901</ConnectionStatus>
<WifiConnectionStatus></WifiConnectionStatus>
<SignalStrength></SignalStrength>
<SignalIcon>3</SignalIcon>
<CurrentNetworkType>19</CurrentNetworkType>
<CurrentServiceDomain>3</CurrentServiceDomain>
<RoamingStatus>0</RoamingStatus>
<WanIPAddress>10.64.12.7</WanIPAddress>
<simlockStatus>0</simlockStatus>
<maxsignal>5</maxsignal>
</response>"#;

    fn provider(config: HuaweiConfig) -> HuaweiProvider {
        HuaweiProvider::new(config, Arc::new(SystemHost::default()))
    }

    #[test]
    fn converts_tag_names() {
        assert_eq!(camel_to_snake("SignalIcon"), "signal_icon");
        assert_eq!(camel_to_snake("CurrentNetworkType"), "current_network_type");
        assert_eq!(camel_to_snake("WanIPAddress"), "wan_ip_address");
        assert_eq!(camel_to_snake("simlockStatus"), "simlock_status");
        assert_eq!(camel_to_snake("Ipv6Address"), "ipv6_address");
        assert_eq!(camel_to_snake("maxsignal"), "maxsignal");
    }

    #[test]
    fn conversion_is_idempotent() {
        for name in ["SignalIcon", "WanIPAddress", "CurrentNetworkTypeEx", "signal_icon", "ABC"] {
            let once = camel_to_snake(name);
            assert_eq!(camel_to_snake(&once), once, "{name}");
        }
    }

    #[test]
    fn decodes_network_types() {
        assert_eq!(network_type("0"), "No Service");
        assert_eq!(network_type("2"), "2G");
        assert_eq!(network_type("16"), "2G");
        assert_eq!(network_type("4"), "3G");
        assert_eq!(network_type("18"), "3G");
        assert_eq!(network_type("19"), "4G");
        assert_eq!(network_type("13"), "??");
        assert_eq!(network_type("101"), "??");
        assert_eq!(network_type(""), "??");
    }

    #[test]
    fn parses_direct_children() {
        let document = StatusDocument::parse(STATUS_XML).expect("document");

        assert_eq!(document.root, "response");
        assert_eq!(document.fields.len(), 10);
        assert_eq!(
            document.fields[3],
            StatusField {
                name: "SignalIcon".to_string(),
                text: Some("3".to_string())
            }
        );
        assert_eq!(document.fields[1].text, None);
        assert_eq!(document.error_code(), None);
    }

    #[test]
    fn finds_error_code() {
        let document =
            StatusDocument::parse("<error><code>125002</code><message></message></error>")
                .expect("document");
        assert_eq!(document.error_code(), Some(SESSION_REQUIRED_CODE));

        let document = StatusDocument::parse("<error><code/></error>").expect("document");
        assert_eq!(document.error_code(), None);
    }

    #[test]
    fn rejects_malformed_xml() {
        assert!(StatusDocument::parse("").is_err());
        assert!(StatusDocument::parse("<response><SignalIcon>3</response>").is_err());
        assert!(StatusDocument::parse("<response>").is_err());
    }

    #[test]
    fn decodes_status_snapshot() {
        let provider = provider(HuaweiConfig::default());
        let document = StatusDocument::parse(
            "<response><SignalIcon>3</SignalIcon><CurrentNetworkType>19</CurrentNetworkType></response>",
        )
        .expect("document");

        let snapshot = provider.decode_status(&document).expect("snapshot");

        assert_eq!(snapshot.get("signal_icon"), Some("³"));
        assert_eq!(snapshot.get("current_network_type"), Some("4G"));
        assert_eq!(snapshot.severity(), Some(Severity::Good));
    }

    #[test]
    fn signal_drives_severity() {
        let provider = provider(HuaweiConfig::default());
        let cases = [
            ("0", Severity::Bad),
            ("1", Severity::Bad),
            ("2", Severity::Degraded),
            ("3", Severity::Good),
            ("5", Severity::Good),
        ];

        for (signal, expected) in cases {
            let xml = format!(
                "<response><SignalIcon>{signal}</SignalIcon><CurrentNetworkType>4</CurrentNetworkType></response>"
            );
            let document = StatusDocument::parse(&xml).expect("document");
            let snapshot = provider.decode_status(&document).expect("snapshot");
            assert_eq!(snapshot.severity(), Some(expected), "signal {signal}");
        }
    }

    #[test]
    fn keeps_other_fields_as_placeholders() {
        let provider = provider(HuaweiConfig {
            format_up: "{signal_icon} {current_network_type} {wan_ip_address}".to_string(),
            ..HuaweiConfig::default()
        });
        let document = StatusDocument::parse(STATUS_XML).expect("document");
        let snapshot = provider.decode_status(&document).expect("snapshot");

        assert_eq!(snapshot.get("wifi_connection_status"), Some(""));
        let response = provider.present(&snapshot).expect("response");
        assert_eq!(response.full_text, "³ 4G 10.64.12.7");
    }

    #[test]
    fn unusable_status_is_an_error() {
        let provider = provider(HuaweiConfig::default());

        let missing = StatusDocument::parse("<response><SignalIcon>3</SignalIcon></response>")
            .expect("document");
        assert_eq!(
            provider.decode_status(&missing).unwrap_err(),
            HuaweiError::MissingField("current_network_type")
        );

        let garbled = StatusDocument::parse(
            "<response><SignalIcon>x</SignalIcon><CurrentNetworkType>19</CurrentNetworkType></response>",
        )
        .expect("document");
        assert!(matches!(
            provider.decode_status(&garbled),
            Err(HuaweiError::InvalidSignal(_))
        ));

        let out_of_range = StatusDocument::parse(
            "<response><SignalIcon>6</SignalIcon><CurrentNetworkType>19</CurrentNetworkType></response>",
        )
        .expect("document");
        assert_eq!(
            provider.decode_status(&out_of_range).unwrap_err(),
            HuaweiError::SignalOutOfRange { level: 6, palette: 6 }
        );
    }

    #[test]
    fn presents_up_and_down() {
        let provider = provider(HuaweiConfig::default());
        let document = StatusDocument::parse(STATUS_XML).expect("document");
        let snapshot = provider.decode_status(&document).expect("snapshot");

        let up = provider.present(&snapshot).expect("up");
        assert_eq!(up.full_text, "H:³ 4G");
        assert_eq!(up.color, "#00FF00");

        let down = provider.present(&StatusSnapshot::down()).expect("down");
        assert_eq!(down.full_text, "Modem Not found");
        assert_eq!(down.color, "#FF0000");
    }

    #[test]
    fn down_format_cannot_use_status_fields() {
        let provider = provider(HuaweiConfig {
            format_down: "{signal_icon}".to_string(),
            ..HuaweiConfig::default()
        });
        assert!(matches!(
            provider.present(&StatusSnapshot::down()),
            Err(TemplateError::MissingPlaceholder(_))
        ));
    }

    #[test]
    fn color_is_not_a_placeholder() {
        let provider = provider(HuaweiConfig {
            format_up: "{signal_icon} {color}".to_string(),
            ..HuaweiConfig::default()
        });
        let document = StatusDocument::parse(STATUS_XML).expect("document");
        let snapshot = provider.decode_status(&document).expect("snapshot");

        assert_eq!(
            provider.present(&snapshot).unwrap_err(),
            TemplateError::MissingPlaceholder("color".to_string())
        );
    }

    #[test]
    fn collects_session_cookies() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("SessionID=abc123; path=/; HttpOnly"),
        );
        headers.append(SET_COOKIE, HeaderValue::from_static("lang=en"));

        let cookies = SessionCookies::from_headers(&headers);

        assert_eq!(cookies.get("SessionID"), Some("abc123"));
        assert_eq!(cookies.header_value().as_deref(), Some("SessionID=abc123; lang=en"));
        assert_eq!(SessionCookies::default().header_value(), None);
    }
}
