//! Session façade.
//!
//! [`FocusSession`] is the single writer of timer state. It owns the current
//! `(FsmState, FsmContext)` pair and wires the pure state machine to its
//! collaborators:
//!
//! - the [`TickEngine`], which it commands and whose events it folds back in
//! - the [`SnapshotStore`], written on every committed focus transition
//! - the [`TabCoordinator`], which gates user actions to the leading tab
//! - the [`EffectDispatcher`], which turns effects into sounds and
//!   notifications
//! - the [`TaskStore`], which receives status and duration bookkeeping
//!
//! Every public action is a no-op in a follower tab. A tab that loses
//! leadership hands its session off: its engine entry is dropped without
//! bookkeeping, it returns to idle and the new leader adopts the persisted
//! snapshot. Only the leader folds engine events into its state, so a
//! focus-end effect fires in exactly one tab.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use focus_core::clock::SystemClock;
//! use focus_core::config::Config;
//! use focus_core::dispatch::{EffectDispatcher, Notifier, NullOutput, SoundPlayer};
//! use focus_core::persistence::MemorySnapshotStore;
//! use focus_core::session::{FocusSession, SessionDeps};
//! use focus_core::tabs::TabCoordinator;
//! use focus_core::tasks::{LogToastSink, MemoryTaskStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let deps = SessionDeps {
//!         clock: Arc::new(SystemClock),
//!         store: Arc::new(MemorySnapshotStore::new()),
//!         tasks: Arc::new(MemoryTaskStore::new("tasks")),
//!         dispatcher: Arc::new(EffectDispatcher::new(
//!             SoundPlayer::new(Arc::new(NullOutput)),
//!             Notifier::new(None, Arc::new(LogToastSink)),
//!         )),
//!         coordinator: TabCoordinator::inert(),
//!     };
//!     let (mut session, mut channels) =
//!         FocusSession::launch(&Config::with_state_dir("/tmp/focus"), deps);
//!
//!     session.start("t1", Some("Write report".to_string()), 25);
//!     while session.process_next(&mut channels).await {
//!         println!("{}", session.view().clock);
//!     }
//! }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::dispatch::EffectDispatcher;
use crate::engine::{EngineCommand, EngineEvent, TickEngine};
use crate::fsm::{transition, Effect, FsmContext, FsmEvent, FsmState};
use crate::persistence::SnapshotStore;
use crate::tabs::{TabCoordinator, TabEnvelope, TabId, TabMessage};
use crate::tasks::{TaskStore, Toast, ToastVariant};
use crate::types::{
    minutes_to_ms, ms_to_rounded_minutes, ItemPatch, ItemStatus, SessionId, Snapshot,
    SnapshotStatus, TickPayload, MAX_DURATION_MINUTES,
};
use crate::view::{MirrorView, TimerView};

/// Collaborators handed to [`FocusSession`] at construction.
#[derive(Clone)]
pub struct SessionDeps {
    pub clock: Arc<dyn Clock>,
    pub store: Arc<dyn SnapshotStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub dispatcher: Arc<EffectDispatcher>,
    pub coordinator: TabCoordinator,
}

/// Inputs the session reacts to besides direct method calls.
#[derive(Debug)]
pub struct SessionChannels {
    pub engine_rx: mpsc::Receiver<EngineEvent>,
    pub bus_rx: Option<broadcast::Receiver<TabEnvelope>>,
}

/// User actions, for front-ends that route input as values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Start {
        session_id: SessionId,
        title: Option<String>,
        duration_minutes: u64,
    },
    Pause,
    Resume,
    Stop,
    FinishAndBreak,
    StartBreak,
    SkipBreak,
    DismissBreak,
    /// "Use this tab instead".
    TakeLeadership,
    Remind {
        title: String,
    },
}

/// How a session's engine entry ended, recorded until the engine reports
/// the final elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Stopped,
    Finished,
    /// The task item is gone, so there is nothing to write.
    Deleted,
    /// Given up to another tab, which does the bookkeeping.
    HandedOff,
}

/// The timer core for one tab.
pub struct FocusSession {
    state: FsmState,
    context: FsmContext,
    engine: TickEngine,
    clock: Arc<dyn Clock>,
    store: Arc<dyn SnapshotStore>,
    tasks: Arc<dyn TaskStore>,
    dispatcher: Arc<EffectDispatcher>,
    coordinator: TabCoordinator,
    collection: String,
    break_duration_ms: u64,
    last_saved: Option<Snapshot>,
    /// Pending completions per session, in the order the engine was told
    /// to stop.
    completions: HashMap<SessionId, VecDeque<Completion>>,
    mirror: MirrorView,
}

impl FocusSession {
    /// Creates an idle session and spawns its tick engine.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(config: &Config, deps: SessionDeps) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);
        let engine = TickEngine::spawn(config.tick_interval, deps.clock.clone(), event_tx);

        let session = Self {
            state: FsmState::Idle,
            context: FsmContext::initial(),
            engine,
            clock: deps.clock,
            store: deps.store,
            tasks: deps.tasks,
            dispatcher: deps.dispatcher,
            coordinator: deps.coordinator,
            collection: config.task_collection.clone(),
            break_duration_ms: minutes_to_ms(config.break_minutes),
            last_saved: None,
            completions: HashMap::new(),
            mirror: MirrorView::default(),
        };
        (session, event_rx)
    }

    /// Creates a session, joins the tab bus and resumes any persisted
    /// session.
    #[must_use]
    pub fn launch(config: &Config, deps: SessionDeps) -> (Self, SessionChannels) {
        let (mut session, engine_rx) = Self::new(config, deps);
        let bus_rx = session.mount();
        session.restore();
        (session, SessionChannels { engine_rx, bus_rx })
    }

    /// Subscribes to the tab bus, claims leadership and asks peers for their
    /// current session. Returns `None` without a bus.
    #[must_use]
    pub fn mount(&mut self) -> Option<broadcast::Receiver<TabEnvelope>> {
        let rx = self.coordinator.mount()?;
        self.coordinator.publish(TabMessage::RequestState);
        Some(rx)
    }

    #[must_use]
    pub fn state(&self) -> FsmState {
        self.state
    }

    #[must_use]
    pub fn context(&self) -> &FsmContext {
        &self.context
    }

    #[must_use]
    pub fn view(&self) -> TimerView {
        TimerView::derive(self.state, &self.context)
    }

    /// What this tab knows about the leader's session while following.
    #[must_use]
    pub fn mirror(&self) -> &MirrorView {
        &self.mirror
    }

    #[must_use]
    pub fn tab_id(&self) -> TabId {
        self.coordinator.tab_id()
    }

    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.coordinator.is_active()
    }

    #[must_use]
    pub fn dispatcher(&self) -> &EffectDispatcher {
        &self.dispatcher
    }

    /// The snapshot describing the current focus session, if any.
    #[must_use]
    pub fn current_snapshot(&self) -> Option<Snapshot> {
        if !self.state.is_focus() {
            return None;
        }
        let status = if self.state == FsmState::FocusPaused {
            SnapshotStatus::Paused
        } else {
            SnapshotStatus::Running
        };
        Some(Snapshot::new(
            self.context.session_id.clone()?,
            self.context.title.clone(),
            self.context.start_epoch?,
            self.context.paused_ms,
            self.context.duration_ms,
            status,
        ))
    }

    /// Applies an [`Action`]. Every action counts as a user interaction.
    /// Returns `true` if the timer state changed.
    pub fn perform(&mut self, action: Action) -> bool {
        self.on_user_interaction();
        match action {
            Action::Start {
                session_id,
                title,
                duration_minutes,
            } => self.start(session_id, title, duration_minutes),
            Action::Pause => self.pause(),
            Action::Resume => self.resume(),
            Action::Stop => self.stop(),
            Action::FinishAndBreak => self.finish_and_break(),
            Action::StartBreak => self.start_break(),
            Action::SkipBreak => self.skip_break(),
            Action::DismissBreak => self.dismiss_break(),
            Action::TakeLeadership => self.take_leadership(),
            Action::Remind { title } => {
                self.remind(&title);
                false
            }
        }
    }

    /// Unlocks audio and, if this tab leads, re-broadcasts its claim.
    pub fn on_user_interaction(&self) {
        self.dispatcher.sounds().unlock();
        self.coordinator.on_user_interaction();
    }

    /// Starts a focus session for the task item `session_id`.
    pub fn start(
        &mut self,
        session_id: impl Into<SessionId>,
        title: Option<String>,
        duration_minutes: u64,
    ) -> bool {
        if !self.leader_gate("start") {
            return false;
        }
        let session_id = session_id.into();
        if duration_minutes > MAX_DURATION_MINUTES {
            warn!(
                session_id = %session_id,
                duration_minutes,
                max = MAX_DURATION_MINUTES,
                "Rejecting session longer than the maximum"
            );
            return false;
        }
        let duration_ms = minutes_to_ms(duration_minutes);
        let applied = self.dispatch(FsmEvent::Start {
            session_id: session_id.clone(),
            title,
            duration_ms,
            started_at_ms: self.clock.now_ms(),
        });
        if !applied {
            return false;
        }

        info!(session_id = %session_id, duration_minutes, "Focus session started");
        self.command(EngineCommand::Start {
            session_id: session_id.clone(),
            duration_ms,
        });
        self.mark_item(&session_id, ItemStatus::Ongoing);
        if let Some(snapshot) = self.current_snapshot() {
            self.coordinator
                .publish(TabMessage::TimerStarted { snapshot });
        }
        true
    }

    pub fn pause(&mut self) -> bool {
        if !self.leader_gate("pause") {
            return false;
        }
        let Some(session_id) = self.context.session_id.clone() else {
            return false;
        };
        if !self.dispatch(FsmEvent::Pause {
            at_ms: self.clock.now_ms(),
        }) {
            return false;
        }
        debug!(session_id = %session_id, "Session paused");
        self.command(EngineCommand::Pause { session_id });
        self.coordinator.publish(TabMessage::TimerPaused {
            paused_ms: self.context.paused_ms,
        });
        true
    }

    pub fn resume(&mut self) -> bool {
        if !self.leader_gate("resume") {
            return false;
        }
        let Some(session_id) = self.context.session_id.clone() else {
            return false;
        };
        if !self.dispatch(FsmEvent::Resume {
            at_ms: self.clock.now_ms(),
        }) {
            return false;
        }
        debug!(session_id = %session_id, paused_ms = self.context.paused_ms, "Session resumed");
        self.command(EngineCommand::Resume { session_id });
        self.coordinator.publish(TabMessage::TimerResumed);
        true
    }

    /// Abandons the focus session. The actual duration is recorded once the
    /// engine reports it.
    pub fn stop(&mut self) -> bool {
        self.leader_gate("stop") && self.stop_with(Completion::Stopped)
    }

    /// Ends an overtime session, marks the item done and offers a break of
    /// the configured length.
    pub fn finish_and_break(&mut self) -> bool {
        if !self.leader_gate("finish_and_break") {
            return false;
        }
        let Some(session_id) = self.context.session_id.clone() else {
            return false;
        };
        if !self.dispatch(FsmEvent::FinishAndBreak {
            break_duration_ms: self.break_duration_ms,
        }) {
            return false;
        }

        info!(session_id = %session_id, "Focus session finished");
        self.expect_completion(&session_id, Completion::Finished);
        self.command(EngineCommand::Stop { session_id });
        self.coordinator.publish(TabMessage::TimerStopped);
        true
    }

    pub fn start_break(&mut self) -> bool {
        if !self.leader_gate("start_break") {
            return false;
        }
        let Some(session_id) = self.context.session_id.clone() else {
            return false;
        };
        if !self.dispatch(FsmEvent::StartBreak) {
            return false;
        }
        debug!(session_id = %session_id, "Break started");
        self.command(EngineCommand::StartBreak {
            session_id,
            break_duration_ms: self.context.break_duration_ms,
        });
        true
    }

    pub fn skip_break(&mut self) -> bool {
        if !self.leader_gate("skip_break") {
            return false;
        }
        let Some(session_id) = self.context.session_id.clone() else {
            return false;
        };
        if !self.dispatch(FsmEvent::SkipBreak) {
            return false;
        }
        debug!(session_id = %session_id, "Break skipped");
        self.command(EngineCommand::SkipBreak { session_id });
        true
    }

    pub fn dismiss_break(&mut self) -> bool {
        self.leader_gate("dismiss_break") && self.dispatch(FsmEvent::DismissBreak)
    }

    /// Takes leadership for this tab and adopts a persisted session that no
    /// other tab is driving.
    pub fn take_leadership(&mut self) -> bool {
        self.dispatcher.sounds().unlock();
        self.coordinator.claim();
        self.restore()
    }

    /// Plays the pre-start reminder for an upcoming session. Any tab may
    /// remind.
    pub fn remind(&self, title: &str) {
        debug!(title, "Reminder");
        self.dispatcher.remind(title, self.tab_id());
    }

    /// Resumes the persisted session, if there is one and this tab is idle
    /// and leading. Replays `START` (and `PAUSE` for a paused snapshot) and
    /// hands the original timing to the engine.
    pub fn restore(&mut self) -> bool {
        if self.state != FsmState::Idle || !self.coordinator.is_active() {
            return false;
        }
        let Some(snapshot) = self.store.load() else {
            return false;
        };

        let now = self.clock.now_ms();
        self.step(&FsmEvent::Start {
            session_id: snapshot.session_id.clone(),
            title: snapshot.title.clone(),
            duration_ms: snapshot.duration_ms,
            started_at_ms: snapshot.start_epoch,
        });
        self.context.paused_ms = snapshot.paused_ms;
        if snapshot.status == SnapshotStatus::Paused {
            self.step(&FsmEvent::Pause { at_ms: now });
        }
        self.last_saved = Some(snapshot.clone());
        self.persist(FsmState::Idle);

        info!(
            session_id = %snapshot.session_id,
            status = ?snapshot.status,
            "Session restored"
        );
        self.command(EngineCommand::Restore {
            session_id: snapshot.session_id.clone(),
            start_epoch: snapshot.start_epoch,
            paused_ms: snapshot.paused_ms,
            duration_ms: snapshot.duration_ms,
            status: snapshot.status,
        });
        self.mark_item(&snapshot.session_id, ItemStatus::Ongoing);
        self.coordinator
            .publish(TabMessage::TimerStarted { snapshot });
        true
    }

    /// Re-checks the task store after items changed. Stops the session if
    /// its item was deleted.
    pub fn on_items_changed(&mut self) {
        if self.coordinator.is_active() {
            self.stop_if_item_deleted();
        }
    }

    /// Folds one engine event into the state machine. Followers only
    /// settle the final report of entries they stopped.
    pub fn handle_engine_event(&mut self, event: EngineEvent) {
        if !self.coordinator.is_active() && !matches!(event, EngineEvent::Stopped { .. }) {
            trace!(?event, "Ignoring engine event in follower tab");
            return;
        }
        match event {
            EngineEvent::Tick(payload) => {
                if !self.owns(&payload.session_id) {
                    trace!(session_id = %payload.session_id, "Tick for another session");
                    return;
                }
                if self.stop_if_item_deleted() {
                    return;
                }
                self.dispatch(FsmEvent::Tick {
                    remaining_ms: payload.remaining_ms,
                    elapsed_ms: payload.elapsed_ms,
                    is_overtime: payload.is_overtime,
                });
                self.publish_tick(payload);
            }
            EngineEvent::TimeUp { session_id } => {
                if self.owns(&session_id) {
                    self.dispatch(FsmEvent::TimeUp);
                }
            }
            EngineEvent::Stopped {
                session_id,
                elapsed_ms,
            } => self.record_completion(&session_id, elapsed_ms),
            EngineEvent::BreakTick(payload) => {
                self.dispatch(FsmEvent::BreakTick {
                    remaining_ms: payload.remaining_ms,
                });
            }
            EngineEvent::BreakCompleted { session_id } => {
                if self.owns(&session_id) {
                    self.dispatch(FsmEvent::BreakCompleted);
                }
            }
        }
    }

    /// Processes a message from the tab bus, including this tab's own.
    pub fn handle_peer_message(&mut self, envelope: &TabEnvelope) {
        if self.coordinator.handle(envelope) {
            if self.coordinator.is_active() {
                self.restore();
            } else {
                // Demoted: ask the new leader what it is running.
                self.hand_off();
                self.coordinator.publish(TabMessage::RequestState);
            }
        }
        if envelope.from == self.tab_id() {
            return;
        }

        match &envelope.message {
            TabMessage::ClaimActive { .. } => {}
            TabMessage::RequestState => {
                if self.coordinator.is_active() {
                    self.coordinator.publish(TabMessage::StateResponse {
                        snapshot: self.current_snapshot(),
                    });
                }
            }
            message => {
                if self.coordinator.is_active() {
                    trace!(from = %envelope.from, ?message, "Ignoring mirror message while leading");
                    return;
                }
                self.mirror.apply(message);
            }
        }
    }

    /// Waits for the next engine event or tab message and applies it.
    /// Returns `false` once the engine has shut down.
    pub async fn process_next(&mut self, channels: &mut SessionChannels) -> bool {
        let mut bus_closed = false;
        let alive = {
            let engine_rx = &mut channels.engine_rx;
            let bus_rx = &mut channels.bus_rx;
            let peer = async {
                match bus_rx {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                event = engine_rx.recv() => match event {
                    Some(event) => {
                        self.handle_engine_event(event);
                        true
                    }
                    None => false,
                },
                message = peer => {
                    match message {
                        Ok(envelope) => self.handle_peer_message(&envelope),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Tab bus lagged, messages dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("Tab bus closed");
                            bus_closed = true;
                        }
                    }
                    true
                }
            }
        };
        if bus_closed {
            channels.bus_rx = None;
        }
        alive
    }

    /// Applies everything already queued without waiting. Returns the number
    /// of inputs processed.
    pub fn process_pending(&mut self, channels: &mut SessionChannels) -> usize {
        let mut processed = 0;
        loop {
            if let Some(rx) = &mut channels.bus_rx {
                match rx.try_recv() {
                    Ok(envelope) => {
                        self.handle_peer_message(&envelope);
                        processed += 1;
                        continue;
                    }
                    Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                        warn!(skipped, "Tab bus lagged, messages dropped");
                        continue;
                    }
                    Err(_) => {}
                }
            }
            match channels.engine_rx.try_recv() {
                Ok(event) => {
                    self.handle_engine_event(event);
                    processed += 1;
                }
                Err(_) => break,
            }
        }
        processed
    }

    fn leader_gate(&self, action: &str) -> bool {
        let active = self.coordinator.is_active();
        if !active {
            debug!(action, tab_id = %self.tab_id(), "Ignoring action in follower tab");
        }
        active
    }

    fn owns(&self, session_id: &str) -> bool {
        self.context.session_id.as_deref() == Some(session_id)
    }

    fn stop_with(&mut self, completion: Completion) -> bool {
        let Some(session_id) = self.context.session_id.clone() else {
            return false;
        };
        if !self.dispatch(FsmEvent::Stop) {
            return false;
        }
        info!(session_id = %session_id, ?completion, "Focus session stopped");
        self.expect_completion(&session_id, completion);
        self.command(EngineCommand::Stop { session_id });
        self.coordinator.publish(TabMessage::TimerStopped);
        true
    }

    /// Gives the local session up after another tab took leadership. The
    /// persisted snapshot stays for the new leader to adopt.
    fn hand_off(&mut self) {
        let Some(session_id) = self.context.session_id.clone() else {
            return;
        };
        match self.state {
            FsmState::FocusRunning | FsmState::FocusPaused | FsmState::OvertimeRunning => {
                self.expect_completion(&session_id, Completion::HandedOff);
                self.command(EngineCommand::Stop {
                    session_id: session_id.clone(),
                });
            }
            FsmState::BreakRunning => self.command(EngineCommand::SkipBreak {
                session_id: session_id.clone(),
            }),
            FsmState::Idle | FsmState::BreakReady | FsmState::BreakCompleted => {}
        }
        info!(session_id = %session_id, state = %self.state, "Handing session off to the leading tab");
        self.state = FsmState::Idle;
        self.context = FsmContext::initial();
        self.last_saved = None;
    }

    fn expect_completion(&mut self, session_id: &str, completion: Completion) {
        self.completions
            .entry(session_id.to_string())
            .or_default()
            .push_back(completion);
    }

    fn stop_if_item_deleted(&mut self) -> bool {
        if !self.state.is_focus() {
            return false;
        }
        let Some(session_id) = self.context.session_id.clone() else {
            return false;
        };
        match self.tasks.item_ids() {
            Ok(ids) if ids.contains(&session_id) => return false,
            Ok(_) => {}
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Cannot read task items, keeping session");
                return false;
            }
        }

        warn!(session_id = %session_id, "Task item deleted, stopping session");
        self.stop_with(Completion::Deleted);
        self.dispatcher.notifier().toast(Toast {
            title: "Session stopped".to_string(),
            description: "The task for this session was deleted.".to_string(),
            variant: ToastVariant::Destructive,
        });
        true
    }

    fn record_completion(&mut self, session_id: &str, elapsed_ms: u64) {
        let completion = self
            .completions
            .get_mut(session_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Completion::Stopped);
        self.completions.retain(|_, pending| !pending.is_empty());
        let minutes = ms_to_rounded_minutes(elapsed_ms);
        debug!(session_id, elapsed_ms, minutes, ?completion, "Engine entry stopped");

        let patch = match completion {
            Completion::Stopped => ItemPatch {
                status: None,
                actual_duration_minutes: Some(minutes),
            },
            Completion::Finished => ItemPatch {
                status: Some(ItemStatus::Done),
                actual_duration_minutes: Some(minutes),
            },
            Completion::Deleted | Completion::HandedOff => return,
        };
        if let Err(e) = self.tasks.edit_item(&self.collection, session_id, &patch) {
            warn!(session_id, error = %e, "Failed to record session duration");
        }
    }

    fn mark_item(&self, session_id: &str, status: ItemStatus) {
        if let Err(e) = self
            .tasks
            .edit_item(&self.collection, session_id, &ItemPatch::status(status))
        {
            warn!(session_id, ?status, error = %e, "Failed to update task status");
        }
    }

    fn publish_tick(&self, payload: TickPayload) {
        if self.coordinator.is_active() {
            self.coordinator
                .publish(TabMessage::TimerTick { payload });
        }
    }

    fn command(&self, command: EngineCommand) {
        if let Err(e) = self.engine.send(command) {
            warn!(error = %e, "Failed to command tick engine");
        }
    }

    /// Commits a transition without running effects or persisting. Returns
    /// the effects, or `None` if the event was ignored.
    fn step(&mut self, event: &FsmEvent) -> Option<Vec<Effect>> {
        let next = transition(self.state, &self.context, event);
        if next.is_identity(self.state, &self.context) {
            trace!(state = %self.state, event = event.name(), "Event ignored");
            return None;
        }
        if next.state != self.state {
            debug!(from = %self.state, to = %next.state, event = event.name(), "State transition");
        }
        self.state = next.state;
        self.context = next.context;
        Some(next.effects)
    }

    /// Commits a transition, runs its effects and persists. Returns `true`
    /// if anything changed.
    fn dispatch(&mut self, event: FsmEvent) -> bool {
        let previous = self.state;
        let Some(effects) = self.step(&event) else {
            return false;
        };
        for effect in &effects {
            self.dispatcher.execute(effect, self.tab_id());
        }
        self.persist(previous);
        true
    }

    /// Writes the snapshot while a focus session is active and clears it when
    /// the state leaves focus. Unchanged snapshots are not rewritten.
    fn persist(&mut self, previous: FsmState) {
        if let Some(snapshot) = self.current_snapshot() {
            if self.last_saved.as_ref() == Some(&snapshot) {
                return;
            }
            match self.store.save(&snapshot) {
                Ok(()) => {
                    trace!(session_id = %snapshot.session_id, status = ?snapshot.status, "Snapshot saved");
                    self.last_saved = Some(snapshot);
                }
                Err(e) => warn!(error = %e, "Failed to save snapshot"),
            }
        } else if previous != self.state {
            self.last_saved = None;
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "Failed to clear snapshot");
            }
        }
    }
}

impl std::fmt::Debug for FocusSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusSession")
            .field("state", &self.state)
            .field("context", &self.context)
            .field("tab_id", &self.tab_id())
            .field("leader", &self.is_leader())
            .finish_non_exhaustive()
    }
}
