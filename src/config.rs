//! Run configuration
//!
//! Values come from defaults, an optional TOML file, and command-line flags
//! (in increasing precedence). [`RunConfig::validate`] must pass before a
//! [`WindowConfig`] is derived.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::attributor::{ScoringPolicy, WeightTable};
use crate::controller::{CycleConfig, WindowConfig, DEFAULT_TOP_K};
use crate::error::{HotkeyError, Result};
use crate::source::notify::{ChannelPattern, DEFAULT_PATTERN};

/// Shortest allowed observation window (seconds)
pub const MIN_DURATION_SECS: u64 = 1;
/// Longest allowed observation window (seconds)
pub const MAX_DURATION_SECS: u64 = 100;

/// Scoring policy selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ScoringMode {
    /// Every event weighs 1
    #[default]
    #[value(alias = "1")]
    Constant,
    /// Weight by command verb (GET=1, SET=2, HSET=2, HGETALL=1)
    #[value(aliases = ["2", "command-weighted"])]
    #[serde(alias = "command-weighted")]
    Command,
}

/// Sub-window schedule for command-tap runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleSettings {
    /// Observation time per sub-window (milliseconds)
    pub observe_ms: u64,
    /// Sub-window period (milliseconds)
    pub period_ms: u64,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            observe_ms: 10,
            period_ms: 1000,
        }
    }
}

/// Everything a hot key run needs to know
///
/// # Example
/// ```
/// use hotkeys::config::RunConfig;
///
/// let config = RunConfig::default();
/// assert_eq!(config.top_k, 20);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Observation window length (seconds, 1-100)
    pub duration_secs: u64,
    /// Sleep between empty polls (milliseconds)
    pub poll_interval_ms: f64,
    pub scoring: ScoringMode,
    /// Number of keys to report
    pub top_k: usize,
    /// Keep counts across windows
    pub continue_mode: bool,
    /// Number of successive windows
    pub windows: u32,
    pub cycle: Option<CycleSettings>,
    /// Replacement command weight table
    pub weights: Option<WeightTable>,
    /// Notification subscription pattern
    pub pattern: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            duration_secs: 10,
            poll_interval_ms: 10.0,
            scoring: ScoringMode::Constant,
            top_k: DEFAULT_TOP_K,
            continue_mode: false,
            windows: 1,
            cycle: None,
            weights: None,
            pattern: DEFAULT_PATTERN.to_string(),
        }
    }
}

impl RunConfig {
    /// Parse a TOML document; missing fields keep their defaults
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|e| HotkeyError::InvalidConfig(e.to_string()))
    }

    /// Load a TOML configuration file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&self.duration_secs) {
            return Err(HotkeyError::InvalidConfig(format!(
                "duration must be between {} and {} seconds, got {}",
                MIN_DURATION_SECS, MAX_DURATION_SECS, self.duration_secs
            )));
        }

        if !self.poll_interval_ms.is_finite() || self.poll_interval_ms <= 0.0 {
            return Err(HotkeyError::InvalidConfig(format!(
                "poll interval must be a positive number of milliseconds, got {}",
                self.poll_interval_ms
            )));
        }

        if self.top_k == 0 {
            return Err(HotkeyError::InvalidConfig(
                "top_k must be at least 1".to_string(),
            ));
        }

        if self.windows == 0 {
            return Err(HotkeyError::InvalidConfig(
                "windows must be at least 1".to_string(),
            ));
        }

        if let Some(cycle) = &self.cycle {
            if cycle.observe_ms == 0 || cycle.observe_ms > cycle.period_ms {
                return Err(HotkeyError::InvalidConfig(format!(
                    "cycle observe time must be in 1..={} ms, got {}",
                    cycle.period_ms, cycle.observe_ms
                )));
            }
        }

        if self.pattern.is_empty() {
            return Err(HotkeyError::InvalidConfig(
                "notification pattern must not be empty".to_string(),
            ));
        }
        ChannelPattern::new(&self.pattern)?;

        Ok(())
    }

    /// Scoring policy with the configured weight table
    pub fn policy(&self) -> ScoringPolicy {
        match self.scoring {
            ScoringMode::Constant => ScoringPolicy::Constant,
            ScoringMode::Command => {
                ScoringPolicy::CommandWeighted(self.weights.clone().unwrap_or_default())
            }
        }
    }

    /// Window parameters for the controller
    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            duration: Duration::from_secs(self.duration_secs),
            poll_interval: Duration::from_micros(
                ((self.poll_interval_ms * 1000.0).round() as u64).max(1),
            ),
            policy: self.policy(),
            top_k: self.top_k,
            continue_mode: self.continue_mode,
            cycle: self.cycle.map(|c| CycleConfig {
                observe: Duration::from_millis(c.observe_ms),
                period: Duration::from_millis(c.period_ms),
            }),
        }
    }
}
