//! Display-ready views of timer state.

use serde::Serialize;

use crate::fsm::{FsmContext, FsmState};
use crate::tabs::TabMessage;
use crate::types::{Snapshot, SnapshotStatus, TickPayload};

/// What a front-end needs to render the timer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    pub state: FsmState,
    pub title: Option<String>,
    /// `MM:SS` countdown, `+MM:SS` in overtime.
    pub clock: String,
    pub progress: f64,
    pub is_overtime: bool,
}

impl TimerView {
    #[must_use]
    pub fn derive(state: FsmState, context: &FsmContext) -> Self {
        let (clock, progress) = match state {
            FsmState::Idle => (format_clock(0), 0.0),
            FsmState::FocusRunning | FsmState::FocusPaused => (
                format_clock(context.remaining_ms),
                ratio(context.elapsed_ms, context.duration_ms),
            ),
            FsmState::OvertimeRunning => (format!("+{}", format_clock(context.overtime_ms)), 1.0),
            FsmState::BreakReady | FsmState::BreakRunning | FsmState::BreakCompleted => (
                format_clock(context.break_remaining_ms),
                1.0 - ratio(context.break_remaining_ms, context.break_duration_ms),
            ),
        };

        Self {
            state,
            title: context.title.clone(),
            clock,
            progress,
            is_overtime: state == FsmState::OvertimeRunning,
        }
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 1.0;
    }
    (part as f64 / whole as f64).clamp(0.0, 1.0)
}

/// Formats milliseconds as `MM:SS`, or `H:MM:SS` from one hour up. Partial
/// seconds round up so a countdown shows `00:01` until it truly ends.
#[must_use]
pub fn format_clock(ms: u64) -> String {
    let total_secs = ms.div_ceil(1_000);
    let hours = total_secs / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Best-effort read-only copy of the leading tab's session, kept by
/// follower tabs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirrorView {
    pub snapshot: Option<Snapshot>,
    pub last_tick: Option<TickPayload>,
}

impl MirrorView {
    /// Folds a mirroring message into the view. Leadership and request
    /// messages are ignored.
    pub fn apply(&mut self, message: &TabMessage) {
        match message {
            TabMessage::TimerStarted { snapshot } => {
                self.snapshot = Some(snapshot.clone());
                self.last_tick = None;
            }
            TabMessage::StateResponse { snapshot } => {
                self.snapshot.clone_from(snapshot);
                self.last_tick = None;
            }
            TabMessage::TimerPaused { paused_ms } => {
                if let Some(snapshot) = &mut self.snapshot {
                    snapshot.status = SnapshotStatus::Paused;
                    snapshot.paused_ms = *paused_ms;
                }
            }
            TabMessage::TimerResumed => {
                if let Some(snapshot) = &mut self.snapshot {
                    snapshot.status = SnapshotStatus::Running;
                }
            }
            TabMessage::TimerStopped => *self = Self::default(),
            TabMessage::TimerTick { payload } => self.last_tick = Some(payload.clone()),
            TabMessage::ClaimActive { .. } | TabMessage::RequestState => {}
        }
    }

    /// Display text for the mirrored session, if any.
    #[must_use]
    pub fn clock(&self) -> Option<String> {
        let tick = self.last_tick.as_ref()?;
        Some(if tick.is_overtime {
            format!("+{}", format_clock(tick.remaining_ms))
        } else {
            format_clock(tick.remaining_ms)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(1), "00:01");
        assert_eq!(format_clock(1_500_000), "25:00");
        assert_eq!(format_clock(59_001), "01:00");
        assert_eq!(format_clock(3_600_000), "1:00:00");
        assert_eq!(format_clock(3_725_000), "1:02:05");
    }

    #[test]
    fn focus_view() {
        let context = FsmContext {
            session_id: Some("t1".to_string()),
            title: Some("Write report".to_string()),
            duration_ms: 1_000_000,
            remaining_ms: 750_000,
            elapsed_ms: 250_000,
            ..FsmContext::default()
        };
        let view = TimerView::derive(FsmState::FocusRunning, &context);
        assert_eq!(view.clock, "12:30");
        assert!((view.progress - 0.25).abs() < 1e-9);
        assert!(!view.is_overtime);
    }

    #[test]
    fn overtime_view() {
        let context = FsmContext {
            session_id: Some("t1".to_string()),
            duration_ms: 60_000,
            elapsed_ms: 125_000,
            overtime_ms: 65_000,
            ..FsmContext::default()
        };
        let view = TimerView::derive(FsmState::OvertimeRunning, &context);
        assert_eq!(view.clock, "+01:05");
        assert!(view.is_overtime);
    }

    #[test]
    fn break_view_progress() {
        let context = FsmContext {
            session_id: Some("t1".to_string()),
            break_duration_ms: 300_000,
            break_remaining_ms: 75_000,
            ..FsmContext::default()
        };
        let view = TimerView::derive(FsmState::BreakRunning, &context);
        assert_eq!(view.clock, "01:15");
        assert!((view.progress - 0.75).abs() < 1e-9);
    }

    #[test]
    fn mirror_follows_messages() {
        let mut mirror = MirrorView::default();
        let snapshot = Snapshot::new("t1", None, 0, 0, 60_000, SnapshotStatus::Running);
        mirror.apply(&TabMessage::TimerStarted {
            snapshot: snapshot.clone(),
        });
        mirror.apply(&TabMessage::TimerTick {
            payload: TickPayload {
                session_id: "t1".to_string(),
                remaining_ms: 30_000,
                elapsed_ms: 30_000,
                progress: 0.5,
                is_overtime: false,
            },
        });
        assert_eq!(mirror.clock().as_deref(), Some("00:30"));

        mirror.apply(&TabMessage::TimerPaused { paused_ms: 1_000 });
        let mirrored = mirror.snapshot.as_ref().unwrap();
        assert_eq!(mirrored.status, SnapshotStatus::Paused);
        assert_eq!(mirrored.paused_ms, 1_000);

        mirror.apply(&TabMessage::TimerStopped);
        assert_eq!(mirror, MirrorView::default());
    }
}
