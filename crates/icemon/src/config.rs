//! Monitor configuration.
//!
//! Settings come from an injected key/value store (a `StreamMonitoring`
//! settings group in the hosting application). They are read exactly once at
//! construction and again on `restart()`; the worker never touches the store.

use std::time::Duration;

use tracing::debug;

/// Settings group the keys live under in the hosting application's store.
pub const SETTINGS_GROUP: &str = "StreamMonitoring";

pub const KEY_ENABLED: &str = "streamMonitorEnabled";
pub const KEY_URL: &str = "streamMonitorUrl";
pub const KEY_OFFLINE_THRESHOLD: &str = "streamMonitorOfflineThreshold";
pub const KEY_RECONNECT_DELAY: &str = "streamMonitorReconnectDelay";

pub const DEFAULT_ENABLED: bool = true;
pub const DEFAULT_STREAM_URL: &str = "http://localhost:8000/stream";
pub const DEFAULT_OFFLINE_THRESHOLD: Duration = Duration::from_secs(10);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Key/value source for monitor settings.
///
/// Implementations return the raw string stored for a key within the
/// monitoring settings group, or `None` when the key is unset. Parsing and
/// defaulting happen in [`MonitorSettings::load`].
pub trait SettingsStore: Send + Sync {
    fn value(&self, key: &str) -> Option<String>;
}

/// Loaded monitor configuration, immutable between loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Whether monitoring runs at all.
    pub enabled: bool,
    /// Configured stream URL; may point at an `.m3u` playlist.
    pub stream_url: String,
    /// Maximum tolerated data silence before a connected stream is declared
    /// offline. Always at least one second.
    pub offline_threshold: Duration,
    /// Pause between a detected connection failure and the next attempt.
    pub reconnect_delay: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_ENABLED,
            stream_url: DEFAULT_STREAM_URL.to_string(),
            offline_threshold: DEFAULT_OFFLINE_THRESHOLD,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl MonitorSettings {
    /// Load settings from the store, falling back to defaults for missing or
    /// unparseable values.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let enabled = store
            .value(KEY_ENABLED)
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(DEFAULT_ENABLED);

        let stream_url = store
            .value(KEY_URL)
            .map(|url| url.trim().to_string())
            .unwrap_or_else(|| DEFAULT_STREAM_URL.to_string());

        // Threshold below one second would make every read-poll cycle a
        // failure, so clamp it up.
        let offline_threshold = store
            .value(KEY_OFFLINE_THRESHOLD)
            .as_deref()
            .and_then(parse_seconds)
            .unwrap_or(DEFAULT_OFFLINE_THRESHOLD)
            .max(Duration::from_secs(1));

        let reconnect_delay = store
            .value(KEY_RECONNECT_DELAY)
            .as_deref()
            .and_then(parse_seconds)
            .unwrap_or(DEFAULT_RECONNECT_DELAY);

        let settings = Self {
            enabled,
            stream_url,
            offline_threshold,
            reconnect_delay,
        };

        debug!(
            enabled = settings.enabled,
            url = %settings.stream_url,
            threshold_secs = settings.offline_threshold.as_secs(),
            delay_secs = settings.reconnect_delay.as_secs(),
            "loaded stream monitor settings"
        );

        settings
    }
}

/// Parse a stored boolean. Settings stores serialize both `true`/`false` and
/// `1`/`0`, so accept both, case-insensitively.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Parse a seconds value, accepting fractional input ("12.6" rounds to 13).
fn parse_seconds(value: &str) -> Option<Duration> {
    let secs = value.trim().parse::<f64>().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs(secs.round() as u64))
}
