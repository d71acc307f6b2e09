//! Rendering of the ranked hot key list and run statistics

use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use tracing::warn;

use crate::cli::OutputFormat;
use crate::controller::{RunStats, WindowOutcome};
use crate::counter::{ScoreSink, Snapshot};
use crate::error::Result;

/// One ranked key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub rank: usize,
    pub key: String,
    pub score: u64,
}

/// End-of-window report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Requested number of keys
    pub top_k: usize,
    pub keys: Vec<ReportRow>,
    /// Distinct keys tracked by the counter
    pub unique_keys: usize,
    pub stats: RunStats,
    pub elapsed_ms: u64,
    /// Why parts of the report are missing, if they are
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

/// Call `op`, retrying once on failure
fn with_retry<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    op().or_else(|_| op())
}

impl Report {
    /// Build a report from a snapshot and the window outcome
    pub fn from_outcome(
        snapshot: &Snapshot,
        top_k: usize,
        unique_keys: usize,
        outcome: &WindowOutcome,
    ) -> Self {
        let keys = snapshot
            .iter()
            .enumerate()
            .map(|(i, entry)| ReportRow {
                rank: i + 1,
                key: entry.key.clone(),
                score: entry.score,
            })
            .collect();

        Self {
            top_k,
            keys,
            unique_keys,
            stats: outcome.stats.clone(),
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            degraded: outcome
                .source_error
                .as_ref()
                .map(|e| format!("source failed mid-window: {}", e)),
        }
    }

    /// Read the counter and assemble a report
    ///
    /// Storage failures do not fail the report: whatever could be read is
    /// reported and `degraded` says what is missing.
    pub fn collect(sink: &dyn ScoreSink, outcome: &WindowOutcome, top_k: usize) -> Self {
        let mut problems = Vec::new();

        let snapshot = with_retry(|| sink.snapshot(top_k)).unwrap_or_else(|e| {
            warn!(error = %e, "could not read ranked keys");
            problems.push(format!("ranking unavailable: {}", e));
            Snapshot::default()
        });
        let unique_keys = with_retry(|| sink.cardinality()).unwrap_or_else(|e| {
            warn!(error = %e, "could not read key count");
            problems.push(format!("key count unavailable: {}", e));
            0
        });

        let mut report = Self::from_outcome(&snapshot, top_k, unique_keys, outcome);
        if let Some(source_problem) = report.degraded.take() {
            problems.insert(0, source_problem);
        }
        if !problems.is_empty() {
            report.degraded = Some(problems.join("; "));
        }
        report
    }

    pub fn render<W: Write>(&self, format: OutputFormat, out: &mut W) -> io::Result<()> {
        match format {
            OutputFormat::Text => self.render_text(out),
            OutputFormat::Json => self.render_json(out),
        }
    }

    /// Human-readable ranking followed by run statistics
    pub fn render_text<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out)?;
        writeln!(out, "Top {} keys with the highest scores:", self.top_k)?;
        if self.keys.is_empty() {
            writeln!(out, "  (no keys observed)")?;
        }
        for row in &self.keys {
            writeln!(out, "{}. {}: {}", row.rank, row.key, row.score)?;
        }

        writeln!(out)?;
        writeln!(out, "Run statistics:")?;
        writeln!(out, "Total events handled: {}", self.stats.events_observed)?;
        writeln!(out, "Events attributed: {}", self.stats.events_attributed)?;
        writeln!(
            out,
            "Events dropped: {} (malformed: {}, storage: {})",
            self.stats.events_dropped, self.stats.malformed_events, self.stats.storage_drops
        )?;
        if self.stats.sink_rejections > 0 {
            writeln!(out, "Increments rejected by storage: {}", self.stats.sink_rejections)?;
        }
        writeln!(out, "Total unique keys tracked: {}", self.unique_keys)?;
        writeln!(out, "Total updates to hotkeys: {}", self.stats.increments_applied)?;
        writeln!(out, "Window length: {:.3}s", self.elapsed_ms as f64 / 1000.0)?;
        if let Some(reason) = &self.degraded {
            writeln!(out, "WARNING: report degraded: {}", reason)?;
        }
        Ok(())
    }

    /// Pretty-printed JSON
    pub fn render_json<W: Write>(&self, out: &mut W) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out)
    }
}
