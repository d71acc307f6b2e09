//! Observation window control
//!
//! ```text
//!   Idle ──start──▶ Running ──stop / deadline──▶ Draining ──loop exits──▶ Stopped
//!                      ▲                                                   │
//!                      └────────────────────start──────────────────────────┘
//! ```
//!
//! The ingestion loop runs on its own thread and owns the event source. It
//! checks for cancellation between events and at each poll boundary, so an
//! in-flight event is always attributed and counted completely. The counter
//! is the only state shared with the controlling thread.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendError, Sender};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::attributor::{attribute, ScoringPolicy};
use crate::counter::{ScoreSink, Snapshot};
use crate::error::{HotkeyError, Result};
use crate::event::{AttributedEvent, RawEvent};
use crate::source::EventSource;

/// Default number of keys reported
pub const DEFAULT_TOP_K: usize = 20;

/// Sub-window schedule for cyclic command-tap runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleConfig {
    /// How long each sub-window observes
    pub observe: Duration,
    /// Time from the start of one sub-window to the next
    pub period: Duration,
}

impl CycleConfig {
    /// Pause between sub-windows
    pub fn pause(&self) -> Duration {
        self.period.saturating_sub(self.observe)
    }
}

/// Parameters of one observation window
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub duration: Duration,
    /// Sleep between empty polls; bounds end-of-window latency
    pub poll_interval: Duration,
    pub policy: ScoringPolicy,
    pub top_k: usize,
    /// Keep counts from earlier windows instead of resetting
    pub continue_mode: bool,
    pub cycle: Option<CycleConfig>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10),
            poll_interval: Duration::from_millis(10),
            policy: ScoringPolicy::Constant,
            top_k: DEFAULT_TOP_K,
            continue_mode: false,
            cycle: None,
        }
    }
}

impl WindowConfig {
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_policy(mut self, policy: ScoringPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cycle(mut self, cycle: CycleConfig) -> Self {
        self.cycle = Some(cycle);
        self
    }

    pub fn with_continue_mode(mut self, continue_mode: bool) -> Self {
        self.continue_mode = continue_mode;
        self
    }
}

/// Lifecycle state of a [`WindowController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowState {
    Idle,
    Running,
    Draining,
    Stopped,
}

impl WindowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowState::Idle => "idle",
            WindowState::Running => "running",
            WindowState::Draining => "draining",
            WindowState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for WindowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters kept by the ingestion loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Raw events received from the source
    pub events_observed: u64,
    /// Events the attributor mapped to a key
    pub events_attributed: u64,
    /// Events that contributed nothing (malformed, lost to storage errors
    /// or rejected by the sink)
    pub events_dropped: u64,
    /// Successful counter increments
    pub increments_applied: u64,
    /// Sum of weights applied to the counter
    pub weight_applied: u64,
    /// Events without a key
    pub malformed_events: u64,
    /// Attributed events lost after a failed retry
    pub storage_drops: u64,
    /// Attributed events the sink refused with a non-retryable error
    #[serde(default)]
    pub sink_rejections: u64,
    /// Observation sub-windows completed
    pub cycles_completed: u64,
}

/// Result of one completed window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowOutcome {
    pub stats: RunStats,
    pub elapsed: Duration,
    /// Set when the source failed mid-window and ingestion ended early
    pub source_error: Option<String>,
}

struct Worker {
    handle: JoinHandle<Option<Box<dyn EventSource>>>,
    done: Receiver<WindowOutcome>,
}

/// Drives observation windows over a shared [`ScoreSink`]
pub struct WindowController {
    sink: Arc<dyn ScoreSink>,
    state: Arc<Mutex<WindowState>>,
    cancel: Arc<AtomicBool>,
    worker: Option<Worker>,
    continue_mode: bool,
    last_outcome: Option<WindowOutcome>,
    parked_source: Option<Box<dyn EventSource>>,
}

impl WindowController {
    pub fn new(sink: Arc<dyn ScoreSink>) -> Self {
        Self {
            sink,
            state: Arc::new(Mutex::new(WindowState::Idle)),
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
            continue_mode: false,
            last_outcome: None,
            parked_source: None,
        }
    }

    pub fn state(&self) -> WindowState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: WindowState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn misuse(&self, operation: &'static str) -> HotkeyError {
        HotkeyError::ControllerMisuse {
            operation,
            state: self.state().as_str(),
        }
    }

    pub fn sink(&self) -> &Arc<dyn ScoreSink> {
        &self.sink
    }

    /// Ranked view of the counter; may race the final increments while running
    pub fn snapshot(&self, k: usize) -> Result<Snapshot> {
        self.sink.snapshot(k)
    }

    /// Statistics of the last completed window
    pub fn last_outcome(&self) -> Option<&WindowOutcome> {
        self.last_outcome.as_ref()
    }

    /// Counters of the last completed window
    pub fn stats(&self) -> Option<&RunStats> {
        self.last_outcome.as_ref().map(|outcome| &outcome.stats)
    }

    /// Source handed back by the last completed window, for reuse
    pub fn take_source(&mut self) -> Option<Box<dyn EventSource>> {
        self.parked_source.take()
    }

    /// Open `source` and start ingesting on a background thread
    ///
    /// Fails with [`HotkeyError::ControllerMisuse`] while a window is active
    /// and with [`HotkeyError::SourceUnavailable`] if the source cannot be
    /// opened, in which case the controller stays in its current state.
    pub fn start(&mut self, config: &WindowConfig, mut source: Box<dyn EventSource>) -> Result<()> {
        match self.state() {
            WindowState::Idle | WindowState::Stopped => {}
            WindowState::Running | WindowState::Draining => return Err(self.misuse("start")),
        }

        if let Err(e) = source.open() {
            source.close();
            return Err(match e {
                HotkeyError::SourceUnavailable(_) => e,
                other => HotkeyError::SourceUnavailable(other.to_string()),
            });
        }

        if !config.continue_mode {
            if let Err(e) = self.sink.reset() {
                warn!(error = %e, "failed to clear counter before window");
            }
        }

        self.cancel.store(false, Ordering::SeqCst);
        self.continue_mode = config.continue_mode;
        self.last_outcome = None;
        self.set_state(WindowState::Running);

        let (done_tx, done_rx) = channel::bounded(1);
        let ingestion = IngestionLoop {
            source,
            sink: Arc::clone(&self.sink),
            policy: config.policy.clone(),
            poll_interval: config.poll_interval,
            cycle: config.cycle,
            cancel: Arc::clone(&self.cancel),
            state: Arc::clone(&self.state),
            deadline: Instant::now() + config.duration,
            stats: RunStats::default(),
        };

        info!(
            source = ingestion.source.name(),
            duration = ?config.duration,
            poll_interval = ?config.poll_interval,
            "observation window started"
        );

        let builder = thread::Builder::new().name("hotkeys-ingest".to_string());
        match spawn_ingestion(builder, ingestion, done_tx) {
            Ok(handle) => {
                self.worker = Some(Worker {
                    handle,
                    done: done_rx,
                });
                Ok(())
            }
            Err(e) => {
                self.set_state(WindowState::Idle);
                Err(e)
            }
        }
    }

    /// Signal the ingestion loop to finish. Idempotent once started.
    pub fn stop(&mut self) -> Result<()> {
        match self.state() {
            WindowState::Idle => Err(self.misuse("stop")),
            WindowState::Running => {
                self.cancel.store(true, Ordering::SeqCst);
                self.set_state(WindowState::Draining);
                debug!("observation window draining");
                Ok(())
            }
            WindowState::Draining | WindowState::Stopped => {
                self.cancel.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    /// Block until the ingestion loop has exited
    pub fn wait(&mut self) -> Result<WindowOutcome> {
        self.wait_inner(None)
    }

    /// Like [`WindowController::wait`], but report a stalled loop after `limit`
    ///
    /// On [`HotkeyError::IngestionStalled`] the window stays active and
    /// may be waited on again.
    pub fn wait_timeout(&mut self, limit: Duration) -> Result<WindowOutcome> {
        self.wait_inner(Some(limit))
    }

    fn wait_inner(&mut self, limit: Option<Duration>) -> Result<WindowOutcome> {
        match self.state() {
            WindowState::Idle => return Err(self.misuse("wait")),
            WindowState::Stopped => {
                return self
                    .last_outcome
                    .clone()
                    .ok_or_else(|| self.misuse("wait"));
            }
            WindowState::Running | WindowState::Draining => {}
        }

        let Some(worker) = self.worker.take() else {
            return Err(self.misuse("wait"));
        };

        let received = match limit {
            None => worker.done.recv().ok(),
            Some(limit) => match worker.done.recv_timeout(limit) {
                Ok(outcome) => Some(outcome),
                Err(RecvTimeoutError::Timeout) => {
                    warn!(waited = ?limit, "ingestion loop has not stopped");
                    self.worker = Some(worker);
                    return Err(HotkeyError::IngestionStalled { waited: limit });
                }
                Err(RecvTimeoutError::Disconnected) => None,
            },
        };

        let joined = worker.handle.join();
        self.set_state(WindowState::Stopped);

        let outcome = match (received, joined) {
            (Some(outcome), Ok(Some(source))) => {
                self.parked_source = Some(source);
                outcome
            }
            _ => {
                return Err(HotkeyError::IngestionFailed(
                    "ingestion thread panicked".to_string(),
                ))
            }
        };

        info!(
            observed = outcome.stats.events_observed,
            attributed = outcome.stats.events_attributed,
            dropped = outcome.stats.events_dropped,
            elapsed = ?outcome.elapsed,
            "observation window stopped"
        );
        self.last_outcome = Some(outcome.clone());
        Ok(outcome)
    }

    /// Run one full window: start, sleep for the duration, stop and wait
    pub fn run(
        &mut self,
        config: &WindowConfig,
        source: Box<dyn EventSource>,
    ) -> Result<WindowOutcome> {
        self.start(config, source)?;
        thread::sleep(config.duration);
        self.stop()?;
        self.wait()
    }

    /// End-of-run cleanup: clear the counter unless continue mode was requested
    pub fn conclude(&mut self) -> Result<()> {
        match self.state() {
            WindowState::Stopped => {}
            _ => return Err(self.misuse("conclude")),
        }
        if self.continue_mode {
            debug!("continue mode: keeping accumulated counts");
            return Ok(());
        }
        self.sink.reset()
    }
}

impl Drop for WindowController {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.cancel.store(true, Ordering::SeqCst);
            let _ = worker.handle.join();
        }
    }
}

/// Start `ingestion` on a thread from `builder`
///
/// The loop is handed over only once the thread exists, so the source is
/// still ours to close if spawning fails.
fn spawn_ingestion(
    builder: thread::Builder,
    ingestion: IngestionLoop,
    done_tx: Sender<WindowOutcome>,
) -> Result<JoinHandle<Option<Box<dyn EventSource>>>> {
    let (job_tx, job_rx) = channel::bounded::<IngestionLoop>(1);

    let spawned = builder.spawn(move || {
        let ingestion = job_rx.recv().ok()?;
        let (source, outcome) = ingestion.run();
        let _ = done_tx.send(outcome);
        Some(source)
    });

    match spawned {
        Ok(handle) => {
            if let Err(SendError(ingestion)) = job_tx.send(ingestion) {
                let mut source = ingestion.source;
                source.close();
            }
            Ok(handle)
        }
        Err(e) => {
            let mut source = ingestion.source;
            warn!(source = source.name(), error = %e, "failed to spawn ingestion thread");
            source.close();
            Err(HotkeyError::Io(e))
        }
    }
}

/// The producer side: polls the source and feeds the counter
struct IngestionLoop {
    source: Box<dyn EventSource>,
    sink: Arc<dyn ScoreSink>,
    policy: ScoringPolicy,
    poll_interval: Duration,
    cycle: Option<CycleConfig>,
    cancel: Arc<AtomicBool>,
    state: Arc<Mutex<WindowState>>,
    deadline: Instant,
    stats: RunStats,
}

impl IngestionLoop {
    fn run(mut self) -> (Box<dyn EventSource>, WindowOutcome) {
        let started = Instant::now();
        let source_error = self.run_cycles().err().map(|e| {
            warn!(source = self.source.name(), error = %e, "ingestion ended early");
            e.to_string()
        });

        self.mark_draining();
        self.source.close();

        let outcome = WindowOutcome {
            stats: self.stats,
            elapsed: started.elapsed(),
            source_error,
        };
        (self.source, outcome)
    }

    fn run_cycles(&mut self) -> Result<()> {
        loop {
            let sub_window_end = match self.cycle {
                Some(cycle) => (Instant::now() + cycle.observe).min(self.deadline),
                None => self.deadline,
            };
            self.observe_until(sub_window_end)?;
            self.stats.cycles_completed += 1;

            let Some(cycle) = self.cycle else {
                return Ok(());
            };
            if self.should_stop() {
                return Ok(());
            }

            self.source.suspend()?;
            trace!(pause = ?cycle.pause(), "sub-window finished");
            self.idle_until((Instant::now() + cycle.pause()).min(self.deadline));
            if self.should_stop() {
                return Ok(());
            }
            self.source.resume()?;
        }
    }

    fn should_stop(&self) -> bool {
        self.cancel.load(Ordering::SeqCst) || Instant::now() >= self.deadline
    }

    fn observe_until(&mut self, end: Instant) -> Result<()> {
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(());
            }
            let now = Instant::now();
            if now >= end {
                return Ok(());
            }
            match self.source.poll()? {
                Some(raw) => self.process(raw),
                None => thread::sleep(self.poll_interval.min(end - now)),
            }
        }
    }

    /// Sleep in poll-interval steps so cancellation stays responsive
    fn idle_until(&self, end: Instant) {
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return;
            }
            let now = Instant::now();
            if now >= end {
                return;
            }
            thread::sleep(self.poll_interval.min(end - now));
        }
    }

    fn process(&mut self, raw: RawEvent) {
        self.stats.events_observed += 1;

        let Some(event) = attribute(&raw, &self.policy) else {
            self.stats.malformed_events += 1;
            self.stats.events_dropped += 1;
            trace!(event = ?raw, "dropped unattributable event");
            return;
        };
        self.stats.events_attributed += 1;
        if let RawEvent::Command { line } = &raw {
            debug!(command = %line, key = %event.key, weight = event.weight, "attributed");
        } else {
            debug!(key = %event.key, weight = event.weight, "attributed");
        }

        self.apply(&event);
    }

    /// Increment, retrying once when the failure is transient; an event
    /// whose increment still fails is dropped
    fn apply(&mut self, event: &AttributedEvent) {
        let result = self
            .sink
            .increment(&event.key, event.weight)
            .or_else(|first| {
                if !first.is_transient() {
                    return Err(first);
                }
                debug!(key = %event.key, error = %first, "increment failed, retrying");
                self.sink.increment(&event.key, event.weight)
            });

        match result {
            Ok(()) => {
                self.stats.increments_applied += 1;
                self.stats.weight_applied += event.weight;
            }
            Err(e) if e.is_transient() => {
                self.stats.storage_drops += 1;
                self.stats.events_dropped += 1;
                warn!(key = %event.key, error = %e, "dropped event after failed retry");
            }
            Err(e) => {
                self.stats.sink_rejections += 1;
                self.stats.events_dropped += 1;
                warn!(key = %event.key, error = %e, "sink rejected increment");
            }
        }
    }

    fn mark_draining(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == WindowState::Running {
            *state = WindowState::Draining;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::FrequencyCounter;
    use std::collections::VecDeque;

    /// Source replaying a fixed list of events, then idling
    struct ScriptedSource {
        events: VecDeque<RawEvent>,
        opened: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
        fail_open: bool,
    }

    impl ScriptedSource {
        fn new(events: Vec<RawEvent>) -> Self {
            Self {
                events: events.into(),
                opened: Arc::new(AtomicBool::new(false)),
                closed: Arc::new(AtomicBool::new(false)),
                fail_open: false,
            }
        }
    }

    impl EventSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn open(&mut self) -> Result<()> {
            if self.fail_open {
                return Err(HotkeyError::SourceUnavailable("refused".into()));
            }
            self.opened.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn poll(&mut self) -> Result<Option<RawEvent>> {
            Ok(self.events.pop_front())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn short_window() -> WindowConfig {
        WindowConfig::default()
            .with_duration(Duration::from_millis(100))
            .with_poll_interval(Duration::from_millis(5))
    }

    fn controller() -> (Arc<FrequencyCounter>, WindowController) {
        let counter = Arc::new(FrequencyCounter::new());
        let controller = WindowController::new(counter.clone());
        (counter, controller)
    }

    #[test]
    fn test_new_controller_is_idle() {
        let (_, controller) = controller();
        assert_eq!(controller.state(), WindowState::Idle);
        assert!(controller.last_outcome().is_none());
        assert!(controller.stats().is_none());
    }

    #[test]
    fn test_run_counts_events() {
        let (counter, mut controller) = controller();
        let events = ["user:1", "user:2", "user:1", "user:3", "user:1"]
            .into_iter()
            .map(RawEvent::key_touch)
            .collect();

        let outcome = controller
            .run(&short_window(), Box::new(ScriptedSource::new(events)))
            .unwrap();

        assert_eq!(controller.state(), WindowState::Stopped);
        assert_eq!(controller.stats(), Some(&outcome.stats));
        assert_eq!(outcome.stats.events_observed, 5);
        assert_eq!(outcome.stats.events_attributed, 5);
        assert_eq!(outcome.stats.increments_applied, 5);
        assert_eq!(
            counter.top(2).to_pairs(),
            vec![("user:1".to_string(), 3), ("user:2".to_string(), 1)]
        );
    }

    #[test]
    fn test_start_while_running_is_misuse() {
        let (_, mut controller) = controller();
        let config = short_window().with_duration(Duration::from_secs(5));
        controller
            .start(&config, Box::new(ScriptedSource::new(vec![])))
            .unwrap();

        let err = controller
            .start(&config, Box::new(ScriptedSource::new(vec![])))
            .unwrap_err();
        assert!(matches!(err, HotkeyError::ControllerMisuse { operation: "start", .. }));

        controller.stop().unwrap();
        controller.wait().unwrap();
    }

    #[test]
    fn test_stop_while_idle_is_misuse() {
        let (_, mut controller) = controller();
        assert!(matches!(
            controller.stop(),
            Err(HotkeyError::ControllerMisuse { operation: "stop", state: "idle" })
        ));
        assert!(controller.wait().is_err());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (_, mut controller) = controller();
        let config = short_window().with_duration(Duration::from_secs(5));
        controller
            .start(&config, Box::new(ScriptedSource::new(vec![])))
            .unwrap();

        controller.stop().unwrap();
        controller.stop().unwrap();
        assert_eq!(controller.state(), WindowState::Draining);

        let started = Instant::now();
        controller.wait().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        controller.stop().unwrap();
        assert_eq!(controller.state(), WindowState::Stopped);
    }

    #[test]
    fn test_failed_open_never_enters_running() {
        let (_, mut controller) = controller();
        let mut source = ScriptedSource::new(vec![]);
        source.fail_open = true;
        let closed = Arc::clone(&source.closed);

        let err = controller.start(&short_window(), Box::new(source)).unwrap_err();
        assert!(matches!(err, HotkeyError::SourceUnavailable(_)));
        assert_eq!(controller.state(), WindowState::Idle);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_source_closed_after_window() {
        let (_, mut controller) = controller();
        let source = ScriptedSource::new(vec![]);
        let opened = Arc::clone(&source.opened);
        let closed = Arc::clone(&source.closed);

        controller.run(&short_window(), Box::new(source)).unwrap();
        assert!(opened.load(Ordering::SeqCst));
        assert!(closed.load(Ordering::SeqCst));
        assert!(controller.take_source().is_some());
        assert!(controller.take_source().is_none());
    }

    #[test]
    fn test_window_stops_on_its_own_deadline() {
        let (_, mut controller) = controller();
        let config = short_window().with_duration(Duration::from_millis(50));
        controller
            .start(&config, Box::new(ScriptedSource::new(vec![])))
            .unwrap();

        let outcome = controller.wait_timeout(Duration::from_secs(5)).unwrap();
        assert!(outcome.elapsed >= Duration::from_millis(50));
        assert_eq!(controller.state(), WindowState::Stopped);
    }

    #[test]
    fn test_wait_timeout_reports_stall() {
        let (_, mut controller) = controller();
        let config = short_window().with_duration(Duration::from_secs(5));
        controller
            .start(&config, Box::new(ScriptedSource::new(vec![])))
            .unwrap();

        let err = controller.wait_timeout(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, HotkeyError::IngestionStalled { .. }));
        assert_eq!(controller.state(), WindowState::Running);

        controller.stop().unwrap();
        assert!(controller.wait().is_ok());
    }

    #[test]
    fn test_reset_between_windows_unless_continue() {
        let (counter, mut controller) = controller();
        let source = || Box::new(ScriptedSource::new(vec![RawEvent::key_touch("k")]));

        controller.run(&short_window(), source()).unwrap();
        assert_eq!(counter.score_of("k"), 1);

        let keep = short_window().with_continue_mode(true);
        controller.run(&keep, source()).unwrap();
        assert_eq!(counter.score_of("k"), 2);
        controller.conclude().unwrap();
        assert_eq!(counter.score_of("k"), 2);

        controller.run(&short_window(), source()).unwrap();
        assert_eq!(counter.score_of("k"), 1);
        controller.conclude().unwrap();
        assert!(counter.is_empty());
    }

    #[test]
    fn test_conclude_requires_stopped() {
        let (_, mut controller) = controller();
        assert!(controller.conclude().is_err());
    }

    #[test]
    fn test_cyclic_window_suspends_and_resumes() {
        struct CountingSource {
            suspends: Arc<Mutex<u32>>,
        }

        impl EventSource for CountingSource {
            fn name(&self) -> &'static str {
                "counting"
            }
            fn open(&mut self) -> Result<()> {
                Ok(())
            }
            fn poll(&mut self) -> Result<Option<RawEvent>> {
                Ok(None)
            }
            fn suspend(&mut self) -> Result<()> {
                *self.suspends.lock().unwrap() += 1;
                Ok(())
            }
            fn close(&mut self) {}
        }

        let (_, mut controller) = controller();
        let suspends = Arc::new(Mutex::new(0));
        let config = short_window()
            .with_duration(Duration::from_millis(200))
            .with_cycle(CycleConfig {
                observe: Duration::from_millis(20),
                period: Duration::from_millis(50),
            });

        let outcome = controller
            .run(
                &config,
                Box::new(CountingSource {
                    suspends: Arc::clone(&suspends),
                }),
            )
            .unwrap();

        assert!(outcome.stats.cycles_completed >= 2);
        assert!(*suspends.lock().unwrap() >= 2);
    }

    #[test]
    fn test_spawn_failure_closes_source() {
        let counter: Arc<dyn ScoreSink> = Arc::new(FrequencyCounter::new());
        let source = ScriptedSource::new(vec![]);
        let closed = Arc::clone(&source.closed);
        let ingestion = IngestionLoop {
            source: Box::new(source),
            sink: counter,
            policy: ScoringPolicy::Constant,
            poll_interval: Duration::from_millis(5),
            cycle: None,
            cancel: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(WindowState::Running)),
            deadline: Instant::now(),
            stats: RunStats::default(),
        };
        let (done_tx, _done_rx) = channel::bounded(1);

        // No address space can hold this stack, so the spawn is refused
        let builder = thread::Builder::new().stack_size(1 << 60);
        let err = spawn_ingestion(builder, ingestion, done_tx).unwrap_err();

        assert!(matches!(err, HotkeyError::Io(_)));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_spawned_ingestion_returns_source() {
        let counter: Arc<dyn ScoreSink> = Arc::new(FrequencyCounter::new());
        let source = ScriptedSource::new(vec![RawEvent::key_touch("k")]);
        let closed = Arc::clone(&source.closed);
        let ingestion = IngestionLoop {
            source: Box::new(source),
            sink: Arc::clone(&counter),
            policy: ScoringPolicy::Constant,
            poll_interval: Duration::from_millis(5),
            cycle: None,
            cancel: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(WindowState::Running)),
            deadline: Instant::now() + Duration::from_millis(20),
            stats: RunStats::default(),
        };
        let (done_tx, done_rx) = channel::bounded(1);

        let handle = spawn_ingestion(thread::Builder::new(), ingestion, done_tx).unwrap();
        let outcome = done_rx.recv().unwrap();

        assert!(handle.join().unwrap().is_some());
        assert_eq!(outcome.stats.increments_applied, 1);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cycle_pause() {
        let cycle = CycleConfig {
            observe: Duration::from_millis(10),
            period: Duration::from_secs(1),
        };
        assert_eq!(cycle.pause(), Duration::from_millis(990));

        let saturated = CycleConfig {
            observe: Duration::from_secs(2),
            period: Duration::from_secs(1),
        };
        assert_eq!(saturated.pause(), Duration::ZERO);
    }
}
