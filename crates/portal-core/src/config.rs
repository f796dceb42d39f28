//! Console configuration.
//!
//! Loads settings from environment variables with sensible defaults. Every
//! setting can be overridden via `PORTAL_*` environment variables, and the
//! terminal host lets command-line flags override those.

use std::path::PathBuf;
use std::time::Duration;

/// Default API base URL: the dashboard API of a locally running backend.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/dashboard/api";

pub const DEFAULT_LOG_LEVEL: &str = "warn";

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Console configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Base URL of the dashboard API, without a trailing slash.
    pub api_url: String,
    /// Directory holding the durable client-side store.
    pub state_dir: PathBuf,
    /// Log filter (e.g., `warn`, `portal_core=debug`).
    pub log_level: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ConsoleConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORTAL_API_URL`: API base URL (default: `http://127.0.0.1:8000/dashboard/api`)
    /// - `PORTAL_STATE_DIR`: store directory (default: `$HOME/.portal`)
    /// - `PORTAL_LOG_LEVEL`: log filter (default: `warn`)
    /// - `PORTAL_TIMEOUT_SECS`: request timeout in seconds (default: `10`)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns the value of an
    /// environment variable if it is set.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let api_url = var("PORTAL_API_URL")
            .map_or_else(|| DEFAULT_API_URL.to_owned(), |url| normalize_api_url(&url));

        let state_dir = match (var("PORTAL_STATE_DIR"), var("HOME")) {
            (Some(dir), _) => PathBuf::from(dir),
            (None, Some(home)) => PathBuf::from(home).join(".portal"),
            (None, None) => PathBuf::from(".portal"),
        };

        let log_level = var("PORTAL_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned());

        // 0 would make every request fail immediately.
        let timeout_secs = var("PORTAL_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            api_url,
            state_dir,
            log_level,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

/// Strip trailing slashes so paths can be appended with `/`.
#[must_use]
pub fn normalize_api_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}
