//! Hotkeys - hot key detection for key-value stores
//!
//! This library observes a live stream of key-level access events
//! (keyspace notifications or a command tap), attributes each event to a
//! key with a weight, accumulates exact per-key scores, and produces a
//! deterministic top-K ranking at the end of an observation window.

pub mod attributor;
pub mod cli;
pub mod config;
pub mod controller;
pub mod counter;
pub mod error;
pub mod event;
pub mod report;
pub mod source;
pub mod store;

pub use error::{HotkeyError, Result};
