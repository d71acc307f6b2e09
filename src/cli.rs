//! CLI argument parsing for hotkeys

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::{CycleSettings, RunConfig, ScoringMode};

/// Output format for the hot key report
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

/// Kind of event stream read from the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Keyspace notifications (`redis-cli --csv psubscribe '__keyevent@0__:*'`)
    Notify,
    /// Command tap (`redis-cli monitor`)
    Monitor,
}

#[derive(Parser, Debug)]
#[command(name = "hotkeys")]
#[command(version)]
#[command(about = "Rank the most frequently accessed keys of a key-value store", long_about = None)]
pub struct Cli {
    /// Event stream format
    #[arg(long = "source", value_enum)]
    pub source: SourceKind,

    /// Read events from a file instead of stdin
    #[arg(short = 'i', long = "input", value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Observation window in seconds (1-100, default: 10)
    #[arg(short = 't', long = "time", value_name = "SECS")]
    pub duration_secs: Option<u64>,

    /// Sleep between empty polls in milliseconds (default: 10)
    #[arg(short = 'T', long = "interval", value_name = "MS")]
    pub poll_interval_ms: Option<f64>,

    /// Scoring policy
    #[arg(short = 's', long = "scoring", value_enum)]
    pub scoring: Option<ScoringMode>,

    /// Number of keys to report (default: 20)
    #[arg(short = 'k', long = "top", value_name = "K")]
    pub top_k: Option<usize>,

    /// Keep accumulated counts between windows
    #[arg(short = 'c', long = "continue")]
    pub continue_mode: bool,

    /// Observe the command tap in sub-windows of this many milliseconds
    #[arg(long = "cycle-ms", value_name = "MS")]
    pub cycle_ms: Option<u64>,

    /// Sub-window period in milliseconds (default: 1000, requires --cycle-ms)
    #[arg(long = "period-ms", value_name = "MS", requires = "cycle_ms")]
    pub period_ms: Option<u64>,

    /// Number of successive windows to run (default: 1)
    #[arg(long = "windows", value_name = "N")]
    pub windows: Option<u32>,

    /// Notification channel pattern (default: __keyevent@0__:*)
    #[arg(long = "pattern", value_name = "PATTERN")]
    pub pattern: Option<String>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Load settings from a TOML file; flags override it
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log every observed event and its attribution
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Enable trace-level debug output
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// Overlay explicitly given flags on `config`
    pub fn apply_to(&self, config: &mut RunConfig) {
        if let Some(secs) = self.duration_secs {
            config.duration_secs = secs;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(scoring) = self.scoring {
            config.scoring = scoring;
        }
        if let Some(k) = self.top_k {
            config.top_k = k;
        }
        if self.continue_mode {
            config.continue_mode = true;
        }
        if let Some(observe_ms) = self.cycle_ms {
            let mut cycle = config.cycle.unwrap_or_default();
            cycle.observe_ms = observe_ms;
            if let Some(period_ms) = self.period_ms {
                cycle.period_ms = period_ms;
            }
            config.cycle = Some(cycle);
        }
        if let Some(windows) = self.windows {
            config.windows = windows;
        }
        if let Some(pattern) = &self.pattern {
            config.pattern = pattern.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_source() {
        assert!(Cli::try_parse_from(["hotkeys"]).is_err());
    }

    #[test]
    fn test_cli_parses_source() {
        let cli = Cli::parse_from(["hotkeys", "--source", "monitor"]);
        assert_eq!(cli.source, SourceKind::Monitor);
        assert!(cli.input.is_none());
        assert!(!cli.continue_mode);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "hotkeys", "--source", "notify", "-t", "5", "-T", "2.5", "-k", "3", "-c",
        ]);
        assert_eq!(cli.duration_secs, Some(5));
        assert_eq!(cli.poll_interval_ms, Some(2.5));
        assert_eq!(cli.top_k, Some(3));
        assert!(cli.continue_mode);
    }

    #[test]
    fn test_cli_scoring_aliases() {
        let cli = Cli::parse_from(["hotkeys", "--source", "monitor", "-s", "2"]);
        assert_eq!(cli.scoring, Some(ScoringMode::Command));
        let cli = Cli::parse_from(["hotkeys", "--source", "monitor", "-s", "command-weighted"]);
        assert_eq!(cli.scoring, Some(ScoringMode::Command));
        let cli = Cli::parse_from(["hotkeys", "--source", "monitor", "-s", "constant"]);
        assert_eq!(cli.scoring, Some(ScoringMode::Constant));
    }

    #[test]
    fn test_cli_period_requires_cycle() {
        assert!(
            Cli::try_parse_from(["hotkeys", "--source", "monitor", "--period-ms", "500"]).is_err()
        );
    }

    #[test]
    fn test_apply_overrides_only_given_flags() {
        let cli = Cli::parse_from([
            "hotkeys", "--source", "monitor", "-t", "7", "--cycle-ms", "50",
        ]);
        let mut config = RunConfig {
            top_k: 5,
            ..RunConfig::default()
        };
        cli.apply_to(&mut config);

        assert_eq!(config.duration_secs, 7);
        assert_eq!(config.top_k, 5);
        assert_eq!(
            config.cycle,
            Some(CycleSettings {
                observe_ms: 50,
                period_ms: 1000
            })
        );
    }
}
