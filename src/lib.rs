//! barblocks - status bar blocks
//!
//! Polls a mobile broadband quota page and a Huawei modem's local API and
//! renders each into a short, color-coded status bar entry.

pub mod config;
pub mod debug_settings;
pub mod host;
pub mod http;
pub mod providers;
pub mod template;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_DIRECTIVE: &str = "barblocks=info";

/// Filter from `RUST_LOG`, or `barblocks=info` when it is unset or invalid
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_DIRECTIVE))
}

/// Initialize logging
///
/// Logs go to stderr so stdout stays reserved for block output. When file
/// logging is enabled the same events are appended to the debug log.
pub fn init_logging(file_logging: bool) {
    debug_settings::set_file_logging(file_logging);

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(rust_log.as_deref());

    let file_layer = file_logging.then(|| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(debug_settings::file_writer())
    });

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_level_is_kept() {
        let filter = log_filter(Some("barblocks=debug")).to_string();
        assert!(filter.contains("barblocks=debug"), "{filter}");
        assert!(!filter.contains("barblocks=info"), "{filter}");
    }

    #[test]
    fn falls_back_to_info_when_unset_or_invalid() {
        assert_eq!(log_filter(None).to_string(), "barblocks=info");
        assert_eq!(log_filter(Some("barblocks=loudest")).to_string(), "barblocks=info");
    }
}
