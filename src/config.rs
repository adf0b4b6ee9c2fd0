//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct TourConfig {
    /// Prefix prepended to every persisted key.
    pub storage_prefix: String,
    /// How long a deferred tour stays hidden unless the tour overrides it.
    pub dismiss_cooldown: Duration,
    /// Maximum time to wait for a step's anchor to appear.
    pub element_wait_timeout: Duration,
    /// Cadence of anchor presence probes.
    pub poll_interval: Duration,
    /// Viewports narrower than this (in px) get the modal presentation.
    pub mobile_breakpoint_px: u32,
    /// Quick tips hide themselves after this long.
    pub quick_tip_duration: Duration,
    /// Location of the durable store used by the driver binary.
    pub store_path: Option<PathBuf>,
}

impl Default for TourConfig {
    fn default() -> Self {
        Self {
            storage_prefix: "tour-engine:tour:".to_string(),
            dismiss_cooldown: Duration::from_secs(24 * 60 * 60),
            element_wait_timeout: Duration::from_millis(12_000),
            poll_interval: Duration::from_millis(150),
            mobile_breakpoint_px: 768,
            quick_tip_duration: Duration::from_secs(8),
            store_path: None,
        }
    }
}

impl TourConfig {
    /// Build config from environment variables, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let storage_prefix =
            std::env::var("TOUR_STORAGE_PREFIX").unwrap_or(defaults.storage_prefix);

        let dismiss_cooldown = env_parse::<u64>("TOUR_DISMISS_COOLDOWN_HOURS")
            .and_then(|h| {
                let cooldown = hours(h);
                if cooldown.is_none() {
                    tracing::warn!(hours = h, "Ignoring out-of-range dismissal cooldown");
                }
                cooldown
            })
            .unwrap_or(defaults.dismiss_cooldown);

        let element_wait_timeout = env_parse::<u64>("TOUR_ELEMENT_WAIT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.element_wait_timeout);

        let poll_interval = env_parse::<u64>("TOUR_POLL_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);

        let mobile_breakpoint_px =
            env_parse::<u32>("TOUR_MOBILE_BREAKPOINT_PX").unwrap_or(defaults.mobile_breakpoint_px);

        let quick_tip_duration = env_parse::<u64>("TOUR_QUICK_TIP_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.quick_tip_duration);

        let store_path = std::env::var("TOUR_STORE_PATH").ok().map(PathBuf::from);

        Self {
            storage_prefix,
            dismiss_cooldown,
            element_wait_timeout,
            poll_interval,
            mobile_breakpoint_px,
            quick_tip_duration,
            store_path,
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "poll_interval".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.element_wait_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "element_wait_timeout".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.storage_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "storage_prefix".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// `None` when the hour count does not fit in seconds.
fn hours(h: u64) -> Option<Duration> {
    h.checked_mul(60 * 60).map(Duration::from_secs)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable configuration value");
            None
        }
    }
}
