//! Event sources feeding the ingestion loop
//!
//! Two interchangeable adapters sit behind [`EventSource`]:
//! - [`notify::NotificationSource`]: keyspace notifications, one key per message
//! - [`monitor::CommandTapSource`]: a live command tap, one command line per record
//!
//! Both are driven through [`feed::Feed`] transports when reading client
//! output, or any custom [`notify::Subscription`] / [`monitor::CommandTap`].

pub mod feed;
pub mod monitor;
pub mod notify;
pub mod wire;

use std::io::BufRead;

use crate::error::Result;
use crate::event::RawEvent;

pub use feed::Feed;
pub use monitor::CommandTapSource;
pub use notify::NotificationSource;

/// A producer of raw access events
///
/// The ingestion loop owns its source exclusively. `close` is called
/// unconditionally when the loop leaves the running state, including after
/// errors, and must be safe to call more than once.
pub trait EventSource: Send {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Acquire the subscription or tap
    fn open(&mut self) -> Result<()>;

    /// Next available event without blocking; `None` when nothing is pending
    fn poll(&mut self) -> Result<Option<RawEvent>>;

    /// Pause observation between sub-windows
    fn suspend(&mut self) -> Result<()> {
        Ok(())
    }

    /// Resume observation after [`EventSource::suspend`]
    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release the subscription or tap
    fn close(&mut self);
}

/// Notification adapter reading `redis-cli --csv psubscribe` output
pub fn notification_source_from_reader<R>(
    reader: R,
    pattern: &str,
) -> NotificationSource<Feed<crate::event::PubSubMessage>>
where
    R: BufRead + Send + 'static,
{
    let feed = Feed::from_reader(reader, notify::parse_notification_line, "notify");
    NotificationSource::new(feed, pattern)
}

/// Command-tap adapter reading `redis-cli monitor` output
pub fn command_tap_from_reader<R>(reader: R) -> CommandTapSource<Feed<crate::event::MonitorRecord>>
where
    R: BufRead + Send + 'static,
{
    let feed = Feed::from_reader(reader, monitor::parse_monitor_line, "monitor");
    CommandTapSource::new(feed)
}
