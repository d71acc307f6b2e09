//! Command-tap adapter
//!
//! Taps the live command stream of a store (`MONITOR`). Every observed
//! command yields one [`RawEvent::Command`] carrying the full command line.
//! The tap can be suspended between the sub-windows of a cyclic run.

use tracing::{debug, warn};

use super::feed::Feed;
use super::wire::split_fields;
use super::EventSource;
use crate::error::{HotkeyError, Result};
use crate::event::{MonitorRecord, RawEvent};

/// Streaming command-tap capability of a store connection
pub trait CommandTap: Send {
    /// Begin (or resume) tapping
    fn start(&mut self) -> Result<()>;

    /// Next observed command, without blocking
    fn next_record(&mut self) -> Result<Option<MonitorRecord>>;

    /// Stop tapping; commands issued while stopped are not observed
    fn stop(&mut self) -> Result<()>;
}

impl CommandTap for Feed<MonitorRecord> {
    fn start(&mut self) -> Result<()> {
        debug!(feed = %self.label(), "command tap started");
        self.activate()
    }

    fn next_record(&mut self) -> Result<Option<MonitorRecord>> {
        Ok(self.try_next())
    }

    fn stop(&mut self) -> Result<()> {
        self.deactivate();
        Ok(())
    }
}

/// Parse one line of `redis-cli monitor` output
///
/// ```
/// use hotkeys::source::monitor::parse_monitor_line;
///
/// let line = r#"1339518083.107412 [0 127.0.0.1:60866] "set" "user:1" "x""#;
/// let rec = parse_monitor_line(line).unwrap();
/// assert_eq!(rec.command, "set user:1 x");
/// assert_eq!(rec.db, 0);
/// ```
///
/// Lines that are not command records (such as the `OK` banner) return `None`.
pub fn parse_monitor_line(line: &str) -> Option<MonitorRecord> {
    let line = line.trim();
    let (time, rest) = line.split_once(' ')?;
    let time: f64 = time.parse().ok()?;

    let rest = rest.trim_start().strip_prefix('[')?;
    // IPv6 clients print as `[::1]:port`, so the block ends at the first "] "
    let (origin, args) = rest.split_once("] ")?;
    let (db, client_address) = origin.split_once(' ')?;
    let db: u32 = db.parse().ok()?;

    let args = split_fields(args, ' ')?;
    if args.is_empty() {
        return None;
    }

    Some(MonitorRecord {
        time,
        db,
        client_address: client_address.to_string(),
        command: args.join(" "),
    })
}

/// Command-tap adapter over any [`CommandTap`]
pub struct CommandTapSource<T: CommandTap> {
    tap: T,
    tapping: bool,
}

impl<T: CommandTap> CommandTapSource<T> {
    pub fn new(tap: T) -> Self {
        Self {
            tap,
            tapping: false,
        }
    }

    pub fn is_tapping(&self) -> bool {
        self.tapping
    }

    fn start_tap(&mut self) -> Result<()> {
        self.tap.start().map_err(|e| match e {
            HotkeyError::SourceUnavailable(_) => e,
            other => HotkeyError::SourceUnavailable(other.to_string()),
        })?;
        self.tapping = true;
        Ok(())
    }

    fn stop_tap(&mut self) -> Result<()> {
        if !self.tapping {
            return Ok(());
        }
        self.tapping = false;
        self.tap.stop()
    }
}

impl<T: CommandTap> EventSource for CommandTapSource<T> {
    fn name(&self) -> &'static str {
        "monitor"
    }

    fn open(&mut self) -> Result<()> {
        self.start_tap()
    }

    fn poll(&mut self) -> Result<Option<RawEvent>> {
        Ok(self
            .tap
            .next_record()?
            .map(|record| RawEvent::Command {
                line: record.command,
            }))
    }

    fn suspend(&mut self) -> Result<()> {
        self.stop_tap()
    }

    fn resume(&mut self) -> Result<()> {
        self.start_tap()
    }

    fn close(&mut self) {
        if let Err(e) = self.stop_tap() {
            warn!(error = %e, "failed to stop command tap");
        }
    }
}
