//! Cross-tab leadership and state mirroring.
//!
//! Several front-ends ("tabs") of the same app may be open at once. Exactly
//! one of them should drive the timer. This module provides:
//!
//! - [`TabBus`] - a broadcast channel every tab publishes to and subscribes
//!   to. Each tab sees every message, including its own, in one global order.
//! - [`TabCoordinator`] - per-tab leadership state. A tab claims leadership
//!   by broadcasting `CLAIM_ACTIVE`; a tab is the leader exactly when the most
//!   recent claim it observed is its own.
//!
//! # Consistency
//!
//! There is no acknowledgment or quorum step. Between a claim being published
//! and a rival tab draining its queue, both tabs may believe they lead. Once
//! every tab has processed the same claims, they agree on the last claimant.
//!
//! # Degraded mode
//!
//! A coordinator built without a bus ([`TabCoordinator::inert`]) always
//! reports itself active. This covers runtimes with no shared channel.
//!
//! # Example
//!
//! ```rust
//! use focus_core::tabs::{TabBus, TabCoordinator};
//!
//! let bus = TabBus::new();
//! let a = TabCoordinator::new(Some(bus.clone()));
//! let b = TabCoordinator::new(Some(bus.clone()));
//!
//! let mut rx_a = a.mount().unwrap();
//! let mut rx_b = b.mount().unwrap();
//!
//! // Drain both queues: b claimed last, so b leads.
//! while let Ok(envelope) = rx_a.try_recv() { a.handle(&envelope); }
//! while let Ok(envelope) = rx_b.try_recv() { b.handle(&envelope); }
//! assert!(!a.is_active());
//! assert!(b.is_active());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::config::DEFAULT_CHANNEL_CAPACITY;
use crate::types::{Snapshot, TickPayload};

/// Locally unique identity of a tab, generated at construction.
pub type TabId = Uuid;

/// Messages exchanged between tabs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TabMessage {
    /// Leadership claim.
    ClaimActive {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
    TimerStarted {
        snapshot: Snapshot,
    },
    TimerPaused {
        #[serde(rename = "pausedMs")]
        paused_ms: u64,
    },
    TimerResumed,
    TimerStopped,
    TimerTick {
        payload: TickPayload,
    },
    /// Sent by a tab on mount to ask the leader for its current session.
    RequestState,
    StateResponse {
        snapshot: Option<Snapshot>,
    },
}

/// A message tagged with the tab that sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabEnvelope {
    pub from: TabId,
    pub message: TabMessage,
}

/// Broadcast channel shared by all tabs.
///
/// `TabBus` is `Clone`; every clone publishes into the same channel. When a
/// subscriber falls more than the channel capacity behind, it skips the
/// oldest messages.
#[derive(Debug, Clone)]
pub struct TabBus {
    sender: Sender<TabEnvelope>,
}

impl TabBus {
    /// Creates a bus with [`DEFAULT_CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a bus with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        debug!(capacity, "Created tab bus");
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> Receiver<TabEnvelope> {
        self.sender.subscribe()
    }

    /// Publishes to every subscriber, returning how many received it.
    pub fn publish(&self, envelope: TabEnvelope) -> usize {
        trace!(from = %envelope.from, message = ?envelope.message, "Publishing tab message");
        // An error only means nobody is subscribed yet.
        self.sender.send(envelope).unwrap_or(0)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for TabBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Leadership state for one tab.
#[derive(Debug, Clone)]
pub struct TabCoordinator {
    tab_id: TabId,
    bus: Option<TabBus>,
    active: Arc<AtomicBool>,
}

impl TabCoordinator {
    /// Creates a coordinator with a fresh identity. Without a bus the
    /// coordinator is inert and always active.
    #[must_use]
    pub fn new(bus: Option<TabBus>) -> Self {
        Self {
            tab_id: Uuid::new_v4(),
            bus,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A coordinator with no bus.
    #[must_use]
    pub fn inert() -> Self {
        Self::new(None)
    }

    #[must_use]
    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.bus.is_none()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.bus.is_none() || self.active.load(Ordering::SeqCst)
    }

    /// Subscribes to the bus and broadcasts this tab's claim. Returns the
    /// receiver the caller must feed into [`handle`](Self::handle).
    #[must_use]
    pub fn mount(&self) -> Option<Receiver<TabEnvelope>> {
        let rx = self.bus.as_ref()?.subscribe();
        self.claim();
        Some(rx)
    }

    /// Takes leadership ("use this tab instead").
    pub fn claim(&self) {
        let Some(bus) = &self.bus else {
            return;
        };
        if !self.active.swap(true, Ordering::SeqCst) {
            info!(tab_id = %self.tab_id, "Tab claimed leadership");
        }
        bus.publish(TabEnvelope {
            from: self.tab_id,
            message: TabMessage::ClaimActive {
                tab_id: self.tab_id,
            },
        });
    }

    /// Re-broadcasts the claim if this tab leads, so idle rivals that missed
    /// an earlier claim are demoted.
    pub fn on_user_interaction(&self) {
        if self.bus.is_some() && self.active.load(Ordering::SeqCst) {
            trace!(tab_id = %self.tab_id, "Re-asserting leadership");
            self.claim();
        }
    }

    /// Publishes a non-claim message from this tab.
    pub fn publish(&self, message: TabMessage) {
        if let Some(bus) = &self.bus {
            bus.publish(TabEnvelope {
                from: self.tab_id,
                message,
            });
        }
    }

    /// Processes a message from the bus. Returns `true` if leadership changed.
    pub fn handle(&self, envelope: &TabEnvelope) -> bool {
        let TabMessage::ClaimActive { tab_id } = envelope.message else {
            return false;
        };
        if self.bus.is_none() {
            return false;
        }
        let mine = tab_id == self.tab_id;
        let was = self.active.swap(mine, Ordering::SeqCst);
        if was != mine {
            if mine {
                info!(tab_id = %self.tab_id, "Tab regained leadership");
            } else {
                info!(tab_id = %self.tab_id, leader = %tab_id, "Tab lost leadership");
            }
        }
        was != mine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(coordinator: &TabCoordinator, rx: &mut Receiver<TabEnvelope>) {
        while let Ok(envelope) = rx.try_recv() {
            coordinator.handle(&envelope);
        }
    }

    #[test]
    fn inert_coordinator_is_always_active() {
        let tab = TabCoordinator::inert();
        assert!(tab.is_inert());
        assert!(tab.mount().is_none());
        tab.handle(&TabEnvelope {
            from: Uuid::new_v4(),
            message: TabMessage::ClaimActive {
                tab_id: Uuid::new_v4(),
            },
        });
        assert!(tab.is_active());
    }

    #[test]
    fn last_claim_wins() {
        let bus = TabBus::new();
        let a = TabCoordinator::new(Some(bus.clone()));
        let b = TabCoordinator::new(Some(bus.clone()));
        let mut rx_a = a.mount().unwrap();
        let mut rx_b = b.mount().unwrap();

        // A claims after B, regardless of what either believed before.
        a.claim();
        drain(&a, &mut rx_a);
        drain(&b, &mut rx_b);
        assert!(a.is_active());
        assert!(!b.is_active());

        b.claim();
        drain(&a, &mut rx_a);
        drain(&b, &mut rx_b);
        assert!(!a.is_active());
        assert!(b.is_active());
    }

    #[test]
    fn concurrent_mounts_are_transiently_both_active() {
        let bus = TabBus::new();
        let a = TabCoordinator::new(Some(bus.clone()));
        let b = TabCoordinator::new(Some(bus.clone()));
        let mut rx_a = a.mount().unwrap();
        let _rx_b = b.mount().unwrap();

        // Before any queue is drained both tabs consider themselves leader.
        assert!(a.is_active());
        assert!(b.is_active());

        drain(&a, &mut rx_a);
        assert!(!a.is_active());
    }

    #[test]
    fn interaction_rebroadcasts_only_when_leading() {
        let bus = TabBus::new();
        let a = TabCoordinator::new(Some(bus.clone()));
        let b = TabCoordinator::new(Some(bus.clone()));
        let mut rx_a = a.mount().unwrap();
        let mut rx_b = b.mount().unwrap();
        drain(&a, &mut rx_a);
        drain(&b, &mut rx_b);
        assert!(!a.is_active());

        // Follower interaction publishes nothing.
        a.on_user_interaction();
        assert!(rx_b.try_recv().is_err());

        // Leader interaction re-broadcasts its claim.
        b.on_user_interaction();
        let envelope = rx_a.try_recv().unwrap();
        assert_eq!(
            envelope.message,
            TabMessage::ClaimActive { tab_id: b.tab_id() }
        );
    }

    #[test]
    fn handle_reports_changes() {
        let bus = TabBus::new();
        let a = TabCoordinator::new(Some(bus));
        let rival = TabEnvelope {
            from: Uuid::new_v4(),
            message: TabMessage::ClaimActive {
                tab_id: Uuid::new_v4(),
            },
        };
        assert!(a.handle(&rival));
        assert!(!a.handle(&rival));
        assert!(!a.handle(&TabEnvelope {
            from: rival.from,
            message: TabMessage::TimerResumed,
        }));
    }

    #[test]
    fn message_wire_format() {
        let tab_id = Uuid::nil();
        let value = serde_json::to_value(TabMessage::ClaimActive { tab_id }).unwrap();
        assert_eq!(value["type"], "CLAIM_ACTIVE");
        assert_eq!(value["tabId"], "00000000-0000-0000-0000-000000000000");

        let value = serde_json::to_value(TabMessage::TimerPaused { paused_ms: 5 }).unwrap();
        assert_eq!(value["type"], "TIMER_PAUSED");
        assert_eq!(value["pausedMs"], 5);

        let value = serde_json::to_value(TabMessage::StateResponse { snapshot: None }).unwrap();
        assert_eq!(value["type"], "STATE_RESPONSE");
        assert!(value["snapshot"].is_null());
    }

    #[test]
    fn bus_counts_subscribers() {
        let bus = TabBus::with_capacity(8);
        assert_eq!(bus.subscriber_count(), 0);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(
            bus.publish(TabEnvelope {
                from: Uuid::nil(),
                message: TabMessage::RequestState,
            }),
            1
        );
    }
}
