//! Application-level configuration loading, including the protocol timing knobs.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::pattern::PatternSpec;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "CLIP_BINGO_BACK_CONFIG_PATH";

/// How long a pending host review may stay unresolved before it auto-rejects.
const DEFAULT_REVIEW_TIMEOUT_MS: u64 = 10_000;
/// Minimum spacing between two resume-playback nudges for the same room.
const DEFAULT_RESUME_DEBOUNCE_MS: u64 = 10_000;
/// How long externally-polled playback reports are distrusted after a
/// reconnect or a confirmed clip start.
const DEFAULT_STALE_REPORT_WINDOW_MS: u64 = 15_000;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Pending review auto-reject deadline.
    pub review_timeout: Duration,
    /// Room-wide resume-nudge dedup window.
    pub resume_debounce: Duration,
    /// Post-reconnect / post-clip-start report suppression window.
    pub stale_report_window: Duration,
    /// Pattern a room starts with before the host picks one.
    pub default_pattern: PatternSpec,
    /// When enabled, a structurally complete and fully legitimate claim is
    /// accepted without pausing for host review.
    pub auto_accept_wins: bool,
    /// Broadcast channel capacity for the public SSE stream.
    pub public_sse_capacity: usize,
    /// Broadcast channel capacity for the host SSE stream.
    pub host_sse_capacity: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// built-in defaults when the file is absent or malformed.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration from file");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            review_timeout: Duration::from_millis(DEFAULT_REVIEW_TIMEOUT_MS),
            resume_debounce: Duration::from_millis(DEFAULT_RESUME_DEBOUNCE_MS),
            stale_report_window: Duration::from_millis(DEFAULT_STALE_REPORT_WINDOW_MS),
            default_pattern: PatternSpec::Line,
            auto_accept_wins: false,
            public_sse_capacity: 16,
            host_sse_capacity: 16,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    review_timeout_ms: Option<u64>,
    resume_debounce_ms: Option<u64>,
    stale_report_window_ms: Option<u64>,
    auto_accept_wins: Option<bool>,
    public_sse_capacity: Option<usize>,
    host_sse_capacity: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            review_timeout: raw
                .review_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.review_timeout),
            resume_debounce: raw
                .resume_debounce_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.resume_debounce),
            stale_report_window: raw
                .stale_report_window_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.stale_report_window),
            default_pattern: defaults.default_pattern,
            auto_accept_wins: raw.auto_accept_wins.unwrap_or(defaults.auto_accept_wins),
            public_sse_capacity: raw
                .public_sse_capacity
                .unwrap_or(defaults.public_sse_capacity),
            host_sse_capacity: raw.host_sse_capacity.unwrap_or(defaults.host_sse_capacity),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = AppConfig::default();
        assert_eq!(config.review_timeout, Duration::from_secs(10));
        assert_eq!(config.resume_debounce, Duration::from_secs(10));
        assert_eq!(config.stale_report_window, Duration::from_secs(15));
        assert!(!config.auto_accept_wins);
    }

    #[test]
    fn partial_raw_config_keeps_defaults_for_missing_fields() {
        let raw: RawConfig = serde_json::from_str(r#"{"review_timeout_ms": 2000}"#).unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.review_timeout, Duration::from_secs(2));
        assert_eq!(config.resume_debounce, Duration::from_secs(10));
    }
}
