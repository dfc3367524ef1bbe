//! Background tick engine.
//!
//! The engine converts wall-clock time into progress events for every active
//! session. It runs as its own tokio task and talks to the rest of the core
//! exclusively through channels: [`EngineCommand`]s in, [`EngineEvent`]s out.
//! It never calls into the state machine.
//!
//! # Architecture
//!
//! - [`TickState`] holds per-session bookkeeping (start epoch, accumulated
//!   pause, pause start, time-up guard) and computes events for a given
//!   `now`. It is plain data and is tested without a runtime.
//! - [`TickEngine`] owns the background task. A single shared interval drives
//!   all entries; it is created when the first entry appears and dropped once
//!   the last entry is gone, so an idle engine does not poll.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//! use focus_core::clock::SystemClock;
//! use focus_core::engine::{EngineCommand, EngineEvent, TickEngine};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (event_tx, mut event_rx) = mpsc::channel(64);
//!     let engine = TickEngine::spawn(Duration::from_millis(250), Arc::new(SystemClock), event_tx);
//!
//!     engine
//!         .send(EngineCommand::Start { session_id: "t1".into(), duration_ms: 1_500_000 })
//!         .unwrap();
//!
//!     if let Some(EngineEvent::Tick(tick)) = event_rx.recv().await {
//!         println!("{} ms left", tick.remaining_ms);
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::clock::Clock;
use crate::types::{BreakTickPayload, SessionId, SnapshotStatus, TickPayload};

/// Errors returned when commanding the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The background task has exited.
    #[error("tick engine has shut down")]
    Closed,
}

/// Commands accepted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Start {
        session_id: SessionId,
        duration_ms: u64,
    },
    Pause {
        session_id: SessionId,
    },
    Resume {
        session_id: SessionId,
    },
    Stop {
        session_id: SessionId,
    },
    Restore {
        session_id: SessionId,
        start_epoch: i64,
        paused_ms: u64,
        duration_ms: u64,
        status: SnapshotStatus,
    },
    StartBreak {
        session_id: SessionId,
        break_duration_ms: u64,
    },
    SkipBreak {
        session_id: SessionId,
    },
}

/// Events emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Tick(TickPayload),
    TimeUp { session_id: SessionId },
    Stopped { session_id: SessionId, elapsed_ms: u64 },
    BreakTick(BreakTickPayload),
    BreakCompleted { session_id: SessionId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryStatus {
    Running,
    Paused,
}

#[derive(Debug, Clone)]
struct FocusEntry {
    duration_ms: u64,
    start_epoch: i64,
    paused_ms: u64,
    pause_start_epoch: Option<i64>,
    status: EntryStatus,
    has_notified_time_up: bool,
}

impl FocusEntry {
    /// Elapsed focus time as of `now`, excluding completed pauses and, while
    /// paused, the pause in progress.
    fn elapsed_at(&self, now: i64) -> i64 {
        let end = self.pause_start_epoch.unwrap_or(now);
        let paused = i64::try_from(self.paused_ms).unwrap_or(i64::MAX);
        end.saturating_sub(self.start_epoch).saturating_sub(paused).max(0)
    }
}

#[derive(Debug, Clone)]
struct BreakEntry {
    duration_ms: u64,
    start_epoch: i64,
}

/// Per-session bookkeeping for the engine.
///
/// This mirrors the façade's context rather than replacing it: the engine
/// keeps its own start epoch, pause accounting and time-up guard.
#[derive(Debug, Default)]
pub struct TickState {
    focus: HashMap<SessionId, FocusEntry>,
    breaks: HashMap<SessionId, BreakEntry>,
}

impl TickState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no focus or break entry remains.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.focus.is_empty() && self.breaks.is_empty()
    }

    /// Applies a command at wall-clock `now`, returning any events it
    /// produces. Commands naming an unknown session are ignored.
    pub fn apply(&mut self, command: EngineCommand, now: i64) -> Vec<EngineEvent> {
        match command {
            EngineCommand::Start {
                session_id,
                duration_ms,
            } => {
                debug!(session_id = %session_id, duration_ms, "Engine entry started");
                self.focus.insert(
                    session_id,
                    FocusEntry {
                        duration_ms,
                        start_epoch: now,
                        paused_ms: 0,
                        pause_start_epoch: None,
                        status: EntryStatus::Running,
                        has_notified_time_up: false,
                    },
                );
                Vec::new()
            }

            EngineCommand::Pause { session_id } => {
                if let Some(entry) = self.focus.get_mut(&session_id) {
                    if entry.status == EntryStatus::Running {
                        entry.pause_start_epoch = Some(now);
                        entry.status = EntryStatus::Paused;
                        debug!(session_id = %session_id, "Engine entry paused");
                    }
                }
                Vec::new()
            }

            EngineCommand::Resume { session_id } => {
                if let Some(entry) = self.focus.get_mut(&session_id) {
                    if let Some(pause_start) = entry.pause_start_epoch.take() {
                        let span = u64::try_from(now.saturating_sub(pause_start)).unwrap_or(0);
                        entry.paused_ms = entry.paused_ms.saturating_add(span);
                        debug!(session_id = %session_id, paused_ms = entry.paused_ms, "Engine entry resumed");
                    }
                    entry.status = EntryStatus::Running;
                }
                Vec::new()
            }

            EngineCommand::Stop { session_id } => match self.focus.remove(&session_id) {
                Some(entry) => {
                    let elapsed_ms = u64::try_from(entry.elapsed_at(now)).unwrap_or(0);
                    debug!(session_id = %session_id, elapsed_ms, "Engine entry stopped");
                    vec![EngineEvent::Stopped {
                        session_id,
                        elapsed_ms,
                    }]
                }
                None => Vec::new(),
            },

            EngineCommand::Restore {
                session_id,
                start_epoch,
                paused_ms,
                duration_ms,
                status,
            } => {
                let (status, pause_start_epoch) = match status {
                    SnapshotStatus::Running => (EntryStatus::Running, None),
                    SnapshotStatus::Paused => (EntryStatus::Paused, Some(now)),
                };
                debug!(session_id = %session_id, ?status, "Engine entry restored");
                self.focus.insert(
                    session_id,
                    FocusEntry {
                        duration_ms,
                        start_epoch,
                        paused_ms,
                        pause_start_epoch,
                        status,
                        has_notified_time_up: false,
                    },
                );
                Vec::new()
            }

            EngineCommand::StartBreak {
                session_id,
                break_duration_ms,
            } => {
                debug!(session_id = %session_id, break_duration_ms, "Engine break started");
                self.breaks.insert(
                    session_id,
                    BreakEntry {
                        duration_ms: break_duration_ms,
                        start_epoch: now,
                    },
                );
                Vec::new()
            }

            EngineCommand::SkipBreak { session_id } => {
                if self.breaks.remove(&session_id).is_some() {
                    debug!(session_id = %session_id, "Engine break skipped");
                }
                Vec::new()
            }
        }
    }

    /// Computes one tick at wall-clock `now`.
    pub fn tick(&mut self, now: i64) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        for (session_id, entry) in &mut self.focus {
            if entry.status != EntryStatus::Running {
                continue;
            }
            let elapsed = entry.elapsed_at(now);
            let duration = i64::try_from(entry.duration_ms).unwrap_or(i64::MAX);
            let remaining = duration.saturating_sub(elapsed);
            let is_overtime = remaining < 0;
            let progress = if is_overtime || duration == 0 {
                1.0
            } else {
                (elapsed as f64 / duration as f64).min(1.0)
            };

            if remaining <= 0 && !entry.has_notified_time_up {
                entry.has_notified_time_up = true;
                events.push(EngineEvent::TimeUp {
                    session_id: session_id.clone(),
                });
            }

            trace!(session_id = %session_id, elapsed, remaining, "Tick");
            events.push(EngineEvent::Tick(TickPayload {
                session_id: session_id.clone(),
                remaining_ms: remaining.unsigned_abs(),
                elapsed_ms: u64::try_from(elapsed).unwrap_or(0),
                progress,
                is_overtime,
            }));
        }

        let mut finished = Vec::new();
        for (session_id, entry) in &self.breaks {
            let elapsed = u64::try_from(now.saturating_sub(entry.start_epoch)).unwrap_or(0);
            let remaining_ms = entry.duration_ms.saturating_sub(elapsed);
            events.push(EngineEvent::BreakTick(BreakTickPayload { remaining_ms }));
            if remaining_ms == 0 {
                finished.push(session_id.clone());
            }
        }
        for session_id in finished {
            self.breaks.remove(&session_id);
            debug!(session_id = %session_id, "Engine break completed");
            events.push(EngineEvent::BreakCompleted { session_id });
        }

        events
    }
}

/// Handle to the background tick engine task.
///
/// Dropping every handle closes the command channel, which ends the task.
#[derive(Debug)]
pub struct TickEngine {
    command_tx: mpsc::UnboundedSender<EngineCommand>,
    /// Handle to the background task (kept for cleanup).
    #[allow(dead_code)]
    task_handle: tokio::task::JoinHandle<()>,
}

impl TickEngine {
    /// Spawns the engine task on the current tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `period` - Interval between ticks
    /// * `clock` - Wall-clock source
    /// * `event_tx` - Channel receiving engine events
    #[must_use]
    pub fn spawn(
        period: Duration,
        clock: Arc<dyn Clock>,
        event_tx: mpsc::Sender<EngineEvent>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let task_handle = tokio::spawn(async move {
            run_engine_loop(period, clock, command_rx, event_tx).await;
        });

        Self {
            command_tx,
            task_handle,
        }
    }

    /// Queues a command. Never blocks; commands are applied in send order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] if the background task has exited.
    pub fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.command_tx
            .send(command)
            .map_err(|_| EngineError::Closed)
    }
}

async fn run_engine_loop(
    period: Duration,
    clock: Arc<dyn Clock>,
    mut command_rx: mpsc::UnboundedReceiver<EngineCommand>,
    event_tx: mpsc::Sender<EngineEvent>,
) {
    let mut state = TickState::new();
    let mut ticker: Option<Interval> = None;

    debug!(period_ms = period.as_millis(), "Starting tick engine");

    loop {
        let events = tokio::select! {
            command = command_rx.recv() => match command {
                Some(command) => state.apply(command, clock.now_ms()),
                None => {
                    debug!("Command channel closed");
                    break;
                }
            },
            () = next_tick(&mut ticker) => state.tick(clock.now_ms()),
        };

        if !emit(&event_tx, events).await {
            warn!("Engine event receiver dropped, stopping engine");
            break;
        }

        if state.is_empty() {
            if ticker.take().is_some() {
                debug!("No active entries, interval released");
            }
        } else if ticker.is_none() {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker = Some(interval);
            debug!("Interval created");
        }
    }

    debug!("Tick engine terminated");
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn emit(event_tx: &mpsc::Sender<EngineEvent>, events: Vec<EngineEvent>) -> bool {
    for event in events {
        if event_tx.send(event).await.is_err() {
            return false;
        }
    }
    true
}
