//! Shared fixtures for block integration tests

use barblocks::host::Host;
use barblocks::providers::Severity;
use chrono::{DateTime, TimeZone, Utc};

/// Host with a frozen clock and readable color tokens
pub struct FixedHost {
    pub now: DateTime<Utc>,
}

impl FixedHost {
    pub fn new() -> Self {
        Self {
            now: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }
}

impl Host for FixedHost {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn color(&self, severity: Severity) -> String {
        match severity {
            Severity::Bad => "bad".to_string(),
            Severity::Degraded => "degraded".to_string(),
            Severity::Good => "good".to_string(),
        }
    }
}

/// A URL nothing listens on
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:9";
