//! Focus session state machine.
//!
//! A pure reducer over `(state, context, event)`. [`transition`] is the only
//! place transition rules live; it never performs I/O, never reads a clock
//! and never plays a sound. Side effects are returned as [`Effect`] values for
//! the caller to execute after committing the new state.
//!
//! ## States
//!
//! - `Idle` - no session
//! - `FocusRunning` / `FocusPaused` - counting down the planned duration
//! - `OvertimeRunning` - planned duration exhausted, counting up
//! - `BreakReady` - waiting for the user to start or skip a break
//! - `BreakRunning` - counting down the break
//! - `BreakCompleted` - break finished, waiting for dismissal
//!
//! Any `(state, event)` pair not enumerated in [`transition`] returns the
//! input unchanged with no effects. Duplicate or stray events are therefore
//! harmless.

use serde::{Deserialize, Serialize};

use crate::types::SessionId;

/// Timer lifecycle state. Exactly one is active at a time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsmState {
    #[default]
    Idle,
    FocusRunning,
    FocusPaused,
    OvertimeRunning,
    BreakReady,
    BreakRunning,
    BreakCompleted,
}

impl FsmState {
    pub const ALL: [FsmState; 7] = [
        FsmState::Idle,
        FsmState::FocusRunning,
        FsmState::FocusPaused,
        FsmState::OvertimeRunning,
        FsmState::BreakReady,
        FsmState::BreakRunning,
        FsmState::BreakCompleted,
    ];

    /// True while a focus session (not a break) is in progress.
    #[must_use]
    pub fn is_focus(self) -> bool {
        matches!(
            self,
            FsmState::FocusRunning | FsmState::FocusPaused | FsmState::OvertimeRunning
        )
    }

    #[must_use]
    pub fn is_break(self) -> bool {
        matches!(
            self,
            FsmState::BreakReady | FsmState::BreakRunning | FsmState::BreakCompleted
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FsmState::Idle => "idle",
            FsmState::FocusRunning => "focus_running",
            FsmState::FocusPaused => "focus_paused",
            FsmState::OvertimeRunning => "overtime_running",
            FsmState::BreakReady => "break_ready",
            FsmState::BreakRunning => "break_running",
            FsmState::BreakCompleted => "break_completed",
        }
    }
}

impl std::fmt::Display for FsmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing and identity data carried alongside [`FsmState`].
///
/// `session_id` is `Some` exactly when the state is not `Idle`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsmContext {
    pub session_id: Option<SessionId>,
    pub title: Option<String>,
    pub duration_ms: u64,
    pub remaining_ms: u64,
    pub elapsed_ms: u64,
    pub overtime_ms: u64,
    pub break_duration_ms: u64,
    pub break_remaining_ms: u64,
    /// Session start in milliseconds since the Unix epoch.
    pub start_epoch: Option<i64>,
    /// Pause time accumulated over completed pauses.
    pub paused_ms: u64,
    /// Start of the pause in progress, if any.
    pub paused_at: Option<i64>,
    pub has_played_time_up_effect: bool,
}

impl FsmContext {
    /// The context of an idle timer.
    #[must_use]
    pub fn initial() -> Self {
        Self::default()
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsmEvent {
    Start {
        session_id: SessionId,
        title: Option<String>,
        duration_ms: u64,
        started_at_ms: i64,
    },
    Tick {
        remaining_ms: u64,
        elapsed_ms: u64,
        is_overtime: bool,
    },
    Pause {
        at_ms: i64,
    },
    Resume {
        at_ms: i64,
    },
    TimeUp,
    Stop,
    FinishAndBreak {
        break_duration_ms: u64,
    },
    StartBreak,
    BreakTick {
        remaining_ms: u64,
    },
    BreakCompleted,
    SkipBreak,
    DismissBreak,
}

impl FsmEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            FsmEvent::Start { .. } => "START",
            FsmEvent::Tick { .. } => "TICK",
            FsmEvent::Pause { .. } => "PAUSE",
            FsmEvent::Resume { .. } => "RESUME",
            FsmEvent::TimeUp => "TIME_UP",
            FsmEvent::Stop => "STOP",
            FsmEvent::FinishAndBreak { .. } => "FINISH_AND_BREAK",
            FsmEvent::StartBreak => "START_BREAK",
            FsmEvent::BreakTick { .. } => "BREAK_TICK",
            FsmEvent::BreakCompleted => "BREAK_COMPLETED",
            FsmEvent::SkipBreak => "SKIP_BREAK",
            FsmEvent::DismissBreak => "DISMISS_BREAK",
        }
    }
}

/// Side effects requested by a transition. Each one expands to a sound plus a
/// notification in the session façade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// The planned focus duration ran out.
    FocusEnded { title: Option<String> },
    /// The break countdown reached zero.
    BreakEnded,
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: FsmState,
    pub context: FsmContext,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(state: FsmState, context: FsmContext) -> Self {
        Self {
            state,
            context,
            effects: Vec::new(),
        }
    }

    fn unchanged(state: FsmState, context: &FsmContext) -> Self {
        Self::to(state, context.clone())
    }

    fn reset() -> Self {
        Self::to(FsmState::Idle, FsmContext::initial())
    }

    /// True if the transition changed nothing and requested nothing.
    #[must_use]
    pub fn is_identity(&self, state: FsmState, context: &FsmContext) -> bool {
        self.state == state && &self.context == context && self.effects.is_empty()
    }
}

/// Applies `event` to `(state, context)`.
#[must_use]
pub fn transition(state: FsmState, context: &FsmContext, event: &FsmEvent) -> Transition {
    use FsmEvent as E;
    use FsmState as S;

    match (state, event) {
        (
            S::Idle,
            E::Start {
                session_id,
                title,
                duration_ms,
                started_at_ms,
            },
        ) => Transition::to(
            S::FocusRunning,
            FsmContext {
                session_id: Some(session_id.clone()),
                title: title.clone(),
                duration_ms: *duration_ms,
                remaining_ms: *duration_ms,
                start_epoch: Some(*started_at_ms),
                ..FsmContext::initial()
            },
        ),

        (
            S::FocusRunning,
            E::Tick {
                elapsed_ms,
                is_overtime: false,
                ..
            },
        ) => {
            let mut next = context.clone();
            next.elapsed_ms = *elapsed_ms;
            next.remaining_ms = next.duration_ms.saturating_sub(*elapsed_ms);
            Transition::to(S::FocusRunning, next)
        }

        // The engine reports overtime before (or instead of) its TIME_UP
        // message arriving; enter overtime here so the effect is not missed.
        (S::FocusRunning, E::Tick { is_overtime: true, .. }) => {
            let entered = time_up(context);
            let ticked = overtime_tick(&entered.context, event);
            Transition {
                state: S::OvertimeRunning,
                context: ticked,
                effects: entered.effects,
            }
        }

        (S::FocusRunning, E::Pause { at_ms }) => {
            let mut next = context.clone();
            next.paused_at = Some(*at_ms);
            Transition::to(S::FocusPaused, next)
        }

        (S::FocusRunning, E::TimeUp) => time_up(context),

        (S::FocusRunning | S::FocusPaused | S::OvertimeRunning, E::Stop) => Transition::reset(),

        (S::FocusPaused, E::Resume { at_ms }) => {
            let mut next = context.clone();
            if let Some(paused_at) = next.paused_at.take() {
                let span = u64::try_from(at_ms.saturating_sub(paused_at)).unwrap_or(0);
                next.paused_ms = next.paused_ms.saturating_add(span);
            }
            Transition::to(S::FocusRunning, next)
        }

        (S::OvertimeRunning, E::Tick { .. }) => {
            Transition::to(S::OvertimeRunning, overtime_tick(context, event))
        }

        (S::OvertimeRunning, E::FinishAndBreak { break_duration_ms }) => {
            let mut next = context.clone();
            next.overtime_ms = 0;
            next.break_duration_ms = *break_duration_ms;
            next.break_remaining_ms = *break_duration_ms;
            Transition::to(S::BreakReady, next)
        }

        (S::BreakReady, E::StartBreak) => {
            let mut next = context.clone();
            next.break_remaining_ms = next.break_duration_ms;
            Transition::to(S::BreakRunning, next)
        }

        (S::BreakReady | S::BreakRunning, E::SkipBreak) => Transition::reset(),

        (S::BreakRunning, E::BreakTick { remaining_ms }) => {
            let mut next = context.clone();
            next.break_remaining_ms = *remaining_ms;
            Transition::to(S::BreakRunning, next)
        }

        (S::BreakRunning, E::BreakCompleted) => {
            let mut next = context.clone();
            next.break_remaining_ms = 0;
            Transition {
                state: S::BreakCompleted,
                context: next,
                effects: vec![Effect::BreakEnded],
            }
        }

        (S::BreakCompleted, E::DismissBreak) => Transition::reset(),

        _ => Transition::unchanged(state, context),
    }
}

fn time_up(context: &FsmContext) -> Transition {
    let mut next = context.clone();
    next.remaining_ms = 0;
    let mut effects = Vec::new();
    if !next.has_played_time_up_effect {
        next.has_played_time_up_effect = true;
        effects.push(Effect::FocusEnded {
            title: next.title.clone(),
        });
    }
    Transition {
        state: FsmState::OvertimeRunning,
        context: next,
        effects,
    }
}

fn overtime_tick(context: &FsmContext, event: &FsmEvent) -> FsmContext {
    let mut next = context.clone();
    if let FsmEvent::Tick { elapsed_ms, .. } = event {
        next.elapsed_ms = *elapsed_ms;
        next.overtime_ms = elapsed_ms.saturating_sub(next.duration_ms);
    }
    next.remaining_ms = 0;
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    fn start_event(id: &str, minutes: u64) -> FsmEvent {
        FsmEvent::Start {
            session_id: id.to_string(),
            title: Some("Write report".to_string()),
            duration_ms: minutes * 60_000,
            started_at_ms: T0,
        }
    }

    fn all_events() -> Vec<FsmEvent> {
        vec![
            start_event("other", 10),
            FsmEvent::Tick {
                remaining_ms: 1_000,
                elapsed_ms: 2_000,
                is_overtime: false,
            },
            FsmEvent::Tick {
                remaining_ms: 1_000,
                elapsed_ms: 2_000,
                is_overtime: true,
            },
            FsmEvent::Pause { at_ms: T0 + 5_000 },
            FsmEvent::Resume { at_ms: T0 + 9_000 },
            FsmEvent::TimeUp,
            FsmEvent::Stop,
            FsmEvent::FinishAndBreak {
                break_duration_ms: 300_000,
            },
            FsmEvent::StartBreak,
            FsmEvent::BreakTick { remaining_ms: 100 },
            FsmEvent::BreakCompleted,
            FsmEvent::SkipBreak,
            FsmEvent::DismissBreak,
        ]
    }

    /// The transition table, restated independently of `transition`.
    fn is_enumerated(state: FsmState, event: &FsmEvent) -> bool {
        use FsmEvent as E;
        use FsmState as S;
        matches!(
            (state, event),
            (S::Idle, E::Start { .. })
                | (S::FocusRunning, E::Tick { .. })
                | (S::FocusRunning, E::Pause { .. })
                | (S::FocusRunning, E::TimeUp)
                | (S::FocusRunning | S::FocusPaused | S::OvertimeRunning, E::Stop)
                | (S::FocusPaused, E::Resume { .. })
                | (S::OvertimeRunning, E::Tick { .. })
                | (S::OvertimeRunning, E::FinishAndBreak { .. })
                | (S::BreakReady, E::StartBreak)
                | (S::BreakReady | S::BreakRunning, E::SkipBreak)
                | (S::BreakRunning, E::BreakTick { .. })
                | (S::BreakRunning, E::BreakCompleted)
                | (S::BreakCompleted, E::DismissBreak)
        )
    }

    fn busy_context() -> FsmContext {
        FsmContext {
            session_id: Some("t1".to_string()),
            title: Some("Write report".to_string()),
            duration_ms: 1_500_000,
            remaining_ms: 1_000_000,
            elapsed_ms: 500_000,
            overtime_ms: 0,
            break_duration_ms: 300_000,
            break_remaining_ms: 200_000,
            start_epoch: Some(T0),
            paused_ms: 1_000,
            paused_at: None,
            has_played_time_up_effect: false,
        }
    }

    #[test]
    fn identity_law_for_unlisted_pairs() {
        let context = busy_context();
        for state in FsmState::ALL {
            for event in all_events() {
                if is_enumerated(state, &event) {
                    continue;
                }
                let result = transition(state, &context, &event);
                assert!(
                    result.is_identity(state, &context),
                    "{state} + {} should be identity, got {result:?}",
                    event.name()
                );
            }
        }
    }

    #[test]
    fn duplicate_pause_is_ignored() {
        let started = transition(FsmState::Idle, &FsmContext::initial(), &start_event("t1", 25));
        let paused = transition(
            started.state,
            &started.context,
            &FsmEvent::Pause { at_ms: T0 + 1_000 },
        );
        assert_eq!(paused.state, FsmState::FocusPaused);

        let again = transition(
            paused.state,
            &paused.context,
            &FsmEvent::Pause { at_ms: T0 + 2_000 },
        );
        assert!(again.is_identity(paused.state, &paused.context));
    }

    #[test]
    fn start_sets_remaining_to_duration() {
        let result = transition(FsmState::Idle, &busy_context(), &start_event("t1", 25));
        assert_eq!(result.state, FsmState::FocusRunning);
        assert_eq!(result.context.remaining_ms, 1_500_000);
        assert_eq!(result.context.elapsed_ms, 0);
        assert_eq!(result.context.paused_ms, 0);
        assert_eq!(result.context.session_id.as_deref(), Some("t1"));
        assert_eq!(result.context.start_epoch, Some(T0));
        assert!(!result.context.has_played_time_up_effect);
        assert!(result.effects.is_empty());
    }

    #[test]
    fn focus_tick_keeps_remaining_consistent() {
        let started = transition(FsmState::Idle, &FsmContext::initial(), &start_event("t1", 25));
        let ticked = transition(
            started.state,
            &started.context,
            &FsmEvent::Tick {
                remaining_ms: 1_400_000,
                elapsed_ms: 100_000,
                is_overtime: false,
            },
        );
        assert_eq!(ticked.state, FsmState::FocusRunning);
        assert_eq!(ticked.context.elapsed_ms, 100_000);
        assert_eq!(ticked.context.remaining_ms, 1_400_000);
    }

    #[test]
    fn overtime_tick_enters_overtime_with_single_effect() {
        let started = transition(FsmState::Idle, &FsmContext::initial(), &start_event("t1", 25));
        let over = transition(
            started.state,
            &started.context,
            &FsmEvent::Tick {
                remaining_ms: 1,
                elapsed_ms: 1_500_001,
                is_overtime: true,
            },
        );
        assert_eq!(over.state, FsmState::OvertimeRunning);
        assert_eq!(over.context.remaining_ms, 0);
        assert_eq!(over.context.overtime_ms, 1);
        assert_eq!(
            over.effects,
            vec![Effect::FocusEnded {
                title: Some("Write report".to_string())
            }]
        );

        // Late TIME_UP and further ticks do not fire again.
        let late = transition(over.state, &over.context, &FsmEvent::TimeUp);
        assert!(late.is_identity(over.state, &over.context));

        let mut state = over.state;
        let mut context = over.context;
        for elapsed in [1_500_250, 1_500_500, 1_500_750] {
            let next = transition(
                state,
                &context,
                &FsmEvent::Tick {
                    remaining_ms: elapsed - 1_500_000,
                    elapsed_ms: elapsed,
                    is_overtime: true,
                },
            );
            assert!(next.effects.is_empty());
            state = next.state;
            context = next.context;
        }
        assert_eq!(context.overtime_ms, 750);
    }

    #[test]
    fn time_up_effect_not_replayed_when_flag_set() {
        let mut context = busy_context();
        context.has_played_time_up_effect = true;
        let result = transition(FsmState::FocusRunning, &context, &FsmEvent::TimeUp);
        assert_eq!(result.state, FsmState::OvertimeRunning);
        assert!(result.effects.is_empty());
    }

    #[test]
    fn stop_resets_from_every_focus_state() {
        let context = busy_context();
        for state in [
            FsmState::FocusRunning,
            FsmState::FocusPaused,
            FsmState::OvertimeRunning,
        ] {
            let result = transition(state, &context, &FsmEvent::Stop);
            assert_eq!(result.state, FsmState::Idle);
            assert_eq!(result.context, FsmContext::initial());
            assert!(result.effects.is_empty());
        }
    }

    #[test]
    fn pause_resume_accumulates_paused_time() {
        let started = transition(FsmState::Idle, &FsmContext::initial(), &start_event("t1", 25));
        let paused = transition(
            started.state,
            &started.context,
            &FsmEvent::Pause { at_ms: T0 + 10_000 },
        );
        assert_eq!(paused.context.paused_at, Some(T0 + 10_000));

        let resumed = transition(
            paused.state,
            &paused.context,
            &FsmEvent::Resume { at_ms: T0 + 15_000 },
        );
        assert_eq!(resumed.state, FsmState::FocusRunning);
        assert_eq!(resumed.context.paused_ms, 5_000);
        assert_eq!(resumed.context.paused_at, None);
    }

    #[test]
    fn break_cycle() {
        let mut context = busy_context();
        context.has_played_time_up_effect = true;
        context.overtime_ms = 4_000;

        let ready = transition(
            FsmState::OvertimeRunning,
            &context,
            &FsmEvent::FinishAndBreak {
                break_duration_ms: 300_000,
            },
        );
        assert_eq!(ready.state, FsmState::BreakReady);
        assert_eq!(ready.context.overtime_ms, 0);
        assert_eq!(ready.context.break_remaining_ms, 300_000);

        let running = transition(ready.state, &ready.context, &FsmEvent::StartBreak);
        assert_eq!(running.state, FsmState::BreakRunning);
        assert_eq!(running.context.break_remaining_ms, 300_000);

        let ticked = transition(
            running.state,
            &running.context,
            &FsmEvent::BreakTick {
                remaining_ms: 120_000,
            },
        );
        assert_eq!(ticked.context.break_remaining_ms, 120_000);

        let done = transition(ticked.state, &ticked.context, &FsmEvent::BreakCompleted);
        assert_eq!(done.state, FsmState::BreakCompleted);
        assert_eq!(done.context.break_remaining_ms, 0);
        assert_eq!(done.effects, vec![Effect::BreakEnded]);

        let dismissed = transition(done.state, &done.context, &FsmEvent::DismissBreak);
        assert_eq!(dismissed.state, FsmState::Idle);
        assert_eq!(dismissed.context, FsmContext::initial());
    }

    #[test]
    fn skip_break_resets_from_ready_and_running() {
        for state in [FsmState::BreakReady, FsmState::BreakRunning] {
            let result = transition(state, &busy_context(), &FsmEvent::SkipBreak);
            assert_eq!(result.state, FsmState::Idle);
            assert_eq!(result.context, FsmContext::initial());
        }
    }

    #[test]
    fn session_id_present_iff_not_idle() {
        let mut state = FsmState::Idle;
        let mut context = FsmContext::initial();
        let script = [
            start_event("t1", 1),
            FsmEvent::Tick {
                remaining_ms: 0,
                elapsed_ms: 60_001,
                is_overtime: true,
            },
            FsmEvent::FinishAndBreak {
                break_duration_ms: 1_000,
            },
            FsmEvent::StartBreak,
            FsmEvent::BreakCompleted,
            FsmEvent::DismissBreak,
        ];
        for event in &script {
            let next = transition(state, &context, event);
            state = next.state;
            context = next.context;
            assert_eq!(context.session_id.is_some(), state != FsmState::Idle);
        }
        assert_eq!(state, FsmState::Idle);
    }

    #[test]
    fn state_names() {
        assert_eq!(FsmState::OvertimeRunning.to_string(), "overtime_running");
        assert!(FsmState::FocusPaused.is_focus());
        assert!(FsmState::BreakReady.is_break());
        assert!(!FsmState::Idle.is_focus());
    }
}
