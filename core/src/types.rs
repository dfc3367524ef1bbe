//! Shared payload types for the focus session core.
//!
//! These types cross component boundaries: the tick engine emits
//! [`TickPayload`]s, the persistence store reads and writes [`Snapshot`]s, the
//! tab bus mirrors both, and the session façade writes [`ItemPatch`]es into
//! the external task store. All types serialize to camelCase JSON.

use serde::{Deserialize, Serialize};

/// Current snapshot schema version. Snapshots with any other version are
/// treated as absent.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Identifier of a focus session. Sessions are keyed by the id of the task
/// item they were started from.
pub type SessionId = String;

/// Progress report for a running focus session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickPayload {
    pub session_id: SessionId,
    /// Time left in the planned duration, or time past it while in overtime.
    pub remaining_ms: u64,
    pub elapsed_ms: u64,
    /// Fraction of the planned duration consumed, clamped to `0.0..=1.0`.
    pub progress: f64,
    pub is_overtime: bool,
}

/// Progress report for a running break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakTickPayload {
    pub remaining_ms: u64,
}

/// Whether a persisted session was ticking or paused when last written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Running,
    Paused,
}

/// The minimal versioned record needed to resume a session after a reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub session_id: SessionId,
    pub title: Option<String>,
    /// Wall-clock start of the session, in milliseconds since the Unix epoch.
    pub start_epoch: i64,
    /// Pause time accumulated before the snapshot was written.
    pub paused_ms: u64,
    pub duration_ms: u64,
    pub status: SnapshotStatus,
}

impl Snapshot {
    /// Creates a snapshot stamped with the current schema version.
    #[must_use]
    pub fn new(
        session_id: impl Into<SessionId>,
        title: Option<String>,
        start_epoch: i64,
        paused_ms: u64,
        duration_ms: u64,
        status: SnapshotStatus,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            session_id: session_id.into(),
            title,
            start_epoch,
            paused_ms,
            duration_ms,
            status,
        }
    }
}

/// Lifecycle status of a task item in the external task store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Todo,
    Ongoing,
    Done,
}

/// Partial update applied to a task item via `edit_item`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_duration_minutes: Option<u64>,
}

impl ItemPatch {
    /// A patch that only sets the status.
    #[must_use]
    pub fn status(status: ItemStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Longest focus session a caller may start: one day.
pub const MAX_DURATION_MINUTES: u64 = 24 * 60;

/// Converts minutes to milliseconds, saturating at `u64::MAX`.
#[must_use]
pub const fn minutes_to_ms(minutes: u64) -> u64 {
    minutes.saturating_mul(60_000)
}

/// Converts an elapsed duration to whole minutes, rounding to nearest.
#[must_use]
pub const fn ms_to_rounded_minutes(ms: u64) -> u64 {
    ms.saturating_add(30_000) / 60_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_serializes_camel_case() {
        let snapshot = Snapshot::new(
            "t1",
            Some("Write report".to_string()),
            1_700_000_000_000,
            0,
            1_500_000,
            SnapshotStatus::Running,
        );
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            value,
            json!({
                "version": 1,
                "sessionId": "t1",
                "title": "Write report",
                "startEpoch": 1_700_000_000_000_i64,
                "pausedMs": 0,
                "durationMs": 1_500_000,
                "status": "running"
            })
        );
    }

    #[test]
    fn tick_payload_field_names() {
        let payload = TickPayload {
            session_id: "t1".to_string(),
            remaining_ms: 10,
            elapsed_ms: 20,
            progress: 0.5,
            is_overtime: false,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["sessionId"], "t1");
        assert_eq!(value["remainingMs"], 10);
        assert_eq!(value["isOvertime"], false);
    }

    #[test]
    fn item_patch_omits_unset_fields() {
        let patch = ItemPatch::status(ItemStatus::Ongoing);
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({ "status": "ongoing" })
        );

        let patch = ItemPatch {
            status: Some(ItemStatus::Done),
            actual_duration_minutes: Some(25),
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({ "status": "done", "actualDurationMinutes": 25 })
        );
    }

    #[test]
    fn minute_conversions() {
        assert_eq!(minutes_to_ms(25), 1_500_000);
        assert_eq!(ms_to_rounded_minutes(0), 0);
        assert_eq!(ms_to_rounded_minutes(29_999), 0);
        assert_eq!(ms_to_rounded_minutes(30_000), 1);
        assert_eq!(ms_to_rounded_minutes(1_500_000), 25);
    }

    #[test]
    fn conversions_saturate() {
        assert_eq!(minutes_to_ms(MAX_DURATION_MINUTES), 86_400_000);
        assert_eq!(minutes_to_ms(400_000_000_000_000), u64::MAX);
        assert_eq!(ms_to_rounded_minutes(u64::MAX), u64::MAX / 60_000);
    }
}
