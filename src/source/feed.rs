//! Message feeds backing the ingestion adapters
//!
//! A [`Feed`] hands whole messages to an adapter without blocking. Messages
//! either come from an in-process channel or from a reader thread that
//! parses a line-oriented client output (for example `redis-cli monitor`
//! piped into the binary). The reader thread only sends complete lines, so
//! the ingestion loop never observes a partial message.

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use std::io::BufRead;
use std::thread;
use tracing::{debug, trace, warn};

use crate::error::{HotkeyError, Result};

/// Default buffer between a reader thread and the ingestion loop
pub const DEFAULT_FEED_CAPACITY: usize = 8192;

/// Non-blocking stream of messages with subscribe/unsubscribe semantics
pub struct Feed<M> {
    rx: Option<Receiver<M>>,
    active: bool,
    /// Whether the feed has been deactivated at least once
    resumed: bool,
    exhausted: bool,
    label: String,
}

impl<M: Send + 'static> Feed<M> {
    /// Feed over an existing channel
    pub fn from_channel(rx: Receiver<M>, label: impl Into<String>) -> Self {
        Self {
            rx: Some(rx),
            active: false,
            resumed: false,
            exhausted: false,
            label: label.into(),
        }
    }

    /// Unbounded in-process feed and the sender that fills it
    pub fn channel(label: impl Into<String>) -> (Sender<M>, Self) {
        let (tx, rx) = channel::unbounded();
        (tx, Self::from_channel(rx, label))
    }

    /// Feed parsed from a line-oriented reader on a background thread
    ///
    /// Lines for which `parse` returns `None` are skipped.
    pub fn from_reader<R>(reader: R, parse: fn(&str) -> Option<M>, label: impl Into<String>) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let label = label.into();
        let (tx, rx) = channel::bounded(DEFAULT_FEED_CAPACITY);
        let thread_label = label.clone();
        let spawned = thread::Builder::new()
            .name(format!("feed-{}", label))
            .spawn(move || read_lines(reader, parse, tx, &thread_label));

        match spawned {
            Ok(_) => Self::from_channel(rx, label),
            Err(e) => {
                warn!(feed = %label, error = %e, "failed to spawn feed reader");
                Self {
                    rx: None,
                    active: false,
                    resumed: false,
                    exhausted: true,
                    label,
                }
            }
        }
    }

    /// Start delivering messages
    ///
    /// When re-activated after [`Feed::deactivate`], messages queued in the
    /// meantime are discarded.
    pub fn activate(&mut self) -> Result<()> {
        let Some(rx) = &self.rx else {
            return Err(HotkeyError::SourceUnavailable(format!(
                "feed '{}' is closed",
                self.label
            )));
        };
        if self.exhausted {
            return Err(HotkeyError::SourceUnavailable(format!(
                "feed '{}' has ended",
                self.label
            )));
        }
        if self.resumed {
            let stale = rx.try_iter().count();
            if stale > 0 {
                debug!(feed = %self.label, stale, "discarded messages queued while inactive");
            }
        }
        self.active = true;
        Ok(())
    }

    /// Stop delivering messages until the next [`Feed::activate`]
    pub fn deactivate(&mut self) {
        if self.active {
            self.active = false;
            self.resumed = true;
        }
    }

    /// Next queued message, if any, without blocking
    pub fn try_next(&mut self) -> Option<M> {
        if !self.active {
            return None;
        }
        let rx = self.rx.as_ref()?;
        match rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                if !self.exhausted {
                    debug!(feed = %self.label, "feed producer finished");
                    self.exhausted = true;
                }
                None
            }
        }
    }

    /// Drop the receiving end; the feed cannot be activated again
    pub fn shutdown(&mut self) {
        self.active = false;
        self.rx = None;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether the producer has finished and every message was consumed
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

fn read_lines<R, M>(reader: R, parse: fn(&str) -> Option<M>, tx: Sender<M>, label: &str)
where
    R: BufRead,
{
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(feed = %label, error = %e, "feed reader stopped");
                return;
            }
        };
        match parse(&line) {
            Some(msg) => {
                if tx.send(msg).is_err() {
                    // Receiver dropped: the feed was shut down
                    return;
                }
            }
            None => trace!(feed = %label, line = %line, "skipped unparseable line"),
        }
    }
}
