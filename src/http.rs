//! Shared HTTP client construction
//!
//! Every block request gets a 0.5s connect timeout and a 10s read timeout.
//! reqwest does not retry on its own, so a failed request fails the poll.

use std::time::Duration;

use reqwest::header::HeaderMap;

pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

pub fn build_client(default_headers: HeaderMap) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_TIMEOUT)
        .default_headers(default_headers)
        .build()
        .unwrap_or_default()
}
