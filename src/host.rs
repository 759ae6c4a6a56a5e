//! Host collaborator handed to every block
//!
//! Blocks never read the clock or pick colors themselves; both come from the
//! host so a status bar (or a test) decides what "now" and "bad" mean.

use chrono::{DateTime, Duration, Utc};

use crate::config::ColorScheme;
use crate::providers::Severity;

pub trait Host: Send + Sync {
    /// Current time as seen by the host
    fn now(&self) -> DateTime<Utc>;

    /// Color token for a severity level
    fn color(&self, severity: Severity) -> String;

    /// Timestamp `seconds` from now, used for cache validity
    fn time_in(&self, seconds: i64) -> DateTime<Utc> {
        self.now() + Duration::seconds(seconds)
    }
}

/// Host backed by the system clock and the configured color scheme
#[derive(Debug, Clone, Default)]
pub struct SystemHost {
    colors: ColorScheme,
}

impl SystemHost {
    pub fn new(colors: ColorScheme) -> Self {
        Self { colors }
    }
}

impl Host for SystemHost {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn color(&self, severity: Severity) -> String {
        match severity {
            Severity::Bad => self.colors.bad.clone(),
            Severity::Degraded => self.colors.degraded.clone(),
            Severity::Good => self.colors.good.clone(),
        }
    }
}
