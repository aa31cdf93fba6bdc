//! Chart configuration loaded from environment variables or a JSON file.
//!
//! Every value is optional and falls back to a default:
//! - `BARSCOPE_VIEWPORT_WIDTH`: chart width in pixels (800)
//! - `BARSCOPE_BAR_WIDTH`: initial bar width in pixels (10)
//! - `BARSCOPE_BAR_DURATION`: bar duration in seconds (60)
//! - `BARSCOPE_PAGE_SIZE`: bars per historical page (200)
//! - `BARSCOPE_LIVE_DRAIN_SECS`: live trade drain interval in seconds (5)
//! - `BARSCOPE_TRADE_QUEUE`: live trade queue capacity (4096)

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::BarscopeError;
use crate::models::is_supported_granularity;

/// Settings for one chart session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub viewport_width: u32,
    pub bar_width: u32,
    pub bar_duration: u32,
    pub page_size: usize,
    pub live_drain_interval_secs: u64,
    pub trade_queue_capacity: usize,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            viewport_width: 800,
            bar_width: 10,
            bar_duration: 60,
            page_size: 200,
            live_drain_interval_secs: 5,
            trade_queue_capacity: 4096,
        }
    }
}

impl ChartConfig {
    /// Loads configuration from a JSON file. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// [`validate`](Self::validate).
    pub fn load(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BarscopeError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the settings describe a drawable chart.
    ///
    /// # Errors
    ///
    /// Returns [`BarscopeError::Config`] naming the first bad setting.
    pub fn validate(&self) -> crate::Result<()> {
        if self.viewport_width == 0 || self.bar_width == 0 {
            return Err(BarscopeError::Config(
                "viewport_width and bar_width must be non-zero".to_string(),
            ));
        }
        if self.bar_width > self.viewport_width {
            return Err(BarscopeError::Config(format!(
                "bar_width {} exceeds viewport_width {}",
                self.bar_width, self.viewport_width
            )));
        }
        if !is_supported_granularity(self.bar_duration) {
            return Err(BarscopeError::Config(format!(
                "unsupported bar_duration {}s",
                self.bar_duration
            )));
        }
        if self.page_size == 0 || self.trade_queue_capacity == 0 {
            return Err(BarscopeError::Config(
                "page_size and trade_queue_capacity must be non-zero".to_string(),
            ));
        }
        if self.live_drain_interval_secs == 0 {
            return Err(BarscopeError::Config(
                "live_drain_interval_secs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn live_drain_interval(&self) -> Duration {
        Duration::from_secs(self.live_drain_interval_secs)
    }
}

/// Loads the chart configuration from environment variables.
///
/// # Errors
///
/// Returns [`BarscopeError::Config`] if a variable is not a number or the
/// resulting settings fail [`ChartConfig::validate`].
pub fn fetch_config() -> crate::Result<ChartConfig> {
    let defaults = ChartConfig::default();
    let config = ChartConfig {
        viewport_width: parsed_var("BARSCOPE_VIEWPORT_WIDTH")?.unwrap_or(defaults.viewport_width),
        bar_width: parsed_var("BARSCOPE_BAR_WIDTH")?.unwrap_or(defaults.bar_width),
        bar_duration: parsed_var("BARSCOPE_BAR_DURATION")?.unwrap_or(defaults.bar_duration),
        page_size: parsed_var("BARSCOPE_PAGE_SIZE")?.unwrap_or(defaults.page_size),
        live_drain_interval_secs: parsed_var("BARSCOPE_LIVE_DRAIN_SECS")?
            .unwrap_or(defaults.live_drain_interval_secs),
        trade_queue_capacity: parsed_var("BARSCOPE_TRADE_QUEUE")?
            .unwrap_or(defaults.trade_queue_capacity),
    };
    config.validate()?;
    Ok(config)
}

fn parsed_var<T: FromStr>(name: &str) -> crate::Result<Option<T>> {
    non_empty_var(name)
        .map(|raw| {
            raw.parse()
                .map_err(|_| BarscopeError::Config(format!("{name} is not a valid number: {raw}")))
        })
        .transpose()
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const VARS: [&str; 6] = [
        "BARSCOPE_VIEWPORT_WIDTH",
        "BARSCOPE_BAR_WIDTH",
        "BARSCOPE_BAR_DURATION",
        "BARSCOPE_PAGE_SIZE",
        "BARSCOPE_LIVE_DRAIN_SECS",
        "BARSCOPE_TRADE_QUEUE",
    ];

    /// Helper that temporarily sets env vars, runs `f`, then restores originals.
    ///
    /// Variables in [`VARS`] not listed in `vars` are cleared for the call.
    ///
    /// # Safety
    ///
    /// Callers are serialized on `ENV_LOCK`; nothing else in the crate reads
    /// these variables.
    fn with_env<F: FnOnce()>(vars: &[(&str, Option<&str>)], f: F) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let originals: Vec<(&str, Option<String>)> =
            VARS.iter().map(|k| (*k, std::env::var(k).ok())).collect();

        for k in VARS {
            let value = vars.iter().find(|(name, _)| *name == k).and_then(|(_, v)| *v);
            // SAFETY: serialized on ENV_LOCK.
            unsafe {
                match value {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }

        f();

        for (k, original) in originals {
            // SAFETY: still holding ENV_LOCK.
            unsafe {
                match original {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn defaults_without_env_vars() {
        with_env(&[], || {
            let config = fetch_config().unwrap();
            assert_eq!(config, ChartConfig::default());
            assert_eq!(config.live_drain_interval(), Duration::from_secs(5));
        });
    }

    #[test]
    fn reads_overrides() {
        with_env(
            &[
                ("BARSCOPE_VIEWPORT_WIDTH", Some("1200")),
                ("BARSCOPE_BAR_DURATION", Some("300")),
                ("BARSCOPE_PAGE_SIZE", Some("50")),
            ],
            || {
                let config = fetch_config().unwrap();
                assert_eq!(config.viewport_width, 1200);
                assert_eq!(config.bar_duration, 300);
                assert_eq!(config.page_size, 50);
                assert_eq!(config.bar_width, 10);
            },
        );
    }

    #[test]
    fn rejects_non_numeric_value() {
        with_env(&[("BARSCOPE_BAR_WIDTH", Some("wide"))], || {
            let err = fetch_config().unwrap_err();
            assert!(err.to_string().contains("BARSCOPE_BAR_WIDTH"));
        });
    }

    #[test]
    fn rejects_unsupported_duration() {
        with_env(&[("BARSCOPE_BAR_DURATION", Some("61"))], || {
            let err = fetch_config().unwrap_err();
            assert!(err.to_string().contains("unsupported bar_duration"));
        });
    }

    #[test]
    fn rejects_bars_wider_than_viewport() {
        with_env(
            &[
                ("BARSCOPE_VIEWPORT_WIDTH", Some("20")),
                ("BARSCOPE_BAR_WIDTH", Some("40")),
            ],
            || {
                assert!(fetch_config().is_err());
            },
        );
    }

    #[test]
    fn empty_values_treated_as_absent() {
        with_env(
            &[
                ("BARSCOPE_VIEWPORT_WIDTH", Some("")),
                ("BARSCOPE_TRADE_QUEUE", Some("")),
            ],
            || {
                assert_eq!(fetch_config().unwrap(), ChartConfig::default());
            },
        );
    }
}
