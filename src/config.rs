//! Watchdog options
//!
//! Options are immutable once a [`crate::watchdog::Watchdog`] has been
//! constructed from them. They can be loaded from a YAML or JSON file:
//!
//! ```yaml
//! reschedule_retry: 0
//! reschedule_retry_interval: 1s
//! reschedule_retry_max_interval: 30s
//! ```

use crate::error::{Result, WatchdogError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Only make one attempt to reschedule containers by default
pub const DEFAULT_RESCHEDULE_RETRY: u32 = 1;

/// Default base interval between reschedule attempts
pub const DEFAULT_RESCHEDULE_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Default cap for the reschedule backoff
pub const DEFAULT_RESCHEDULE_RETRY_MAX_INTERVAL: Duration = Duration::from_secs(300);

/// Retry behaviour for rescheduling and restarting containers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogOptions {
    /// Maximum reschedule attempts per failed node (0 = unbounded)
    pub reschedule_retry: u32,
    /// Base interval between attempts
    #[serde(with = "duration_str")]
    pub reschedule_retry_interval: Duration,
    /// Upper bound for the exponential backoff
    #[serde(with = "duration_str")]
    pub reschedule_retry_max_interval: Duration,
}

impl Default for WatchdogOptions {
    fn default() -> Self {
        Self {
            reschedule_retry: DEFAULT_RESCHEDULE_RETRY,
            reschedule_retry_interval: DEFAULT_RESCHEDULE_RETRY_INTERVAL,
            reschedule_retry_max_interval: DEFAULT_RESCHEDULE_RETRY_MAX_INTERVAL,
        }
    }
}

impl WatchdogOptions {
    /// Create options with the given retry limit and intervals
    pub fn new(retry: u32, interval: Duration, max_interval: Duration) -> Self {
        Self {
            reschedule_retry: retry,
            reschedule_retry_interval: interval,
            reschedule_retry_max_interval: max_interval,
        }
    }

    /// Load options from a YAML or JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let options: Self = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        options.validate()?;
        Ok(options)
    }

    /// Check that the options describe a usable retry schedule
    pub fn validate(&self) -> Result<()> {
        // Backoff sleeps are floored to whole seconds.
        if self.reschedule_retry_interval < Duration::from_secs(1) {
            return Err(WatchdogError::InvalidConfig(format!(
                "reschedule_retry_interval must be at least 1s, got {:?}",
                self.reschedule_retry_interval
            )));
        }

        if self.reschedule_retry_max_interval < self.reschedule_retry_interval {
            return Err(WatchdogError::InvalidConfig(format!(
                "reschedule_retry_max_interval ({:?}) is shorter than reschedule_retry_interval ({:?})",
                self.reschedule_retry_max_interval, self.reschedule_retry_interval
            )));
        }

        Ok(())
    }

    /// Whether restarts are single-shot
    pub fn restart_retry_disabled(&self) -> bool {
        self.reschedule_retry == DEFAULT_RESCHEDULE_RETRY
    }
}

/// Parse a human duration such as `500ms`, `30s`, `5m`, `1h` or bare seconds
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);

    let value: u64 = number
        .parse()
        .map_err(|_| WatchdogError::InvalidConfig(format!("Invalid duration: {:?}", input)))?;

    let secs = match unit {
        "" | "s" => Some(value),
        "ms" => return Ok(Duration::from_millis(value)),
        "m" => value.checked_mul(60),
        "h" => value.checked_mul(3600),
        _ => {
            return Err(WatchdogError::InvalidConfig(format!(
                "Invalid duration unit in {:?}",
                input
            )))
        }
    };

    secs.map(Duration::from_secs)
        .ok_or_else(|| WatchdogError::InvalidConfig(format!("Duration out of range: {:?}", input)))
}

/// Render a duration the way [`parse_duration`] reads it
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        format!("{}ms", millis)
    } else {
        let secs = duration.as_secs();
        if secs != 0 && secs % 3600 == 0 {
            format!("{}h", secs / 3600)
        } else if secs != 0 && secs % 60 == 0 {
            format!("{}m", secs / 60)
        } else {
            format!("{}s", secs)
        }
    }
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => super::parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}
