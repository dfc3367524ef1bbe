//! Focus - core of a single-task focus session timer.
//!
//! This crate drives one focus session at a time through a finite state
//! machine, keeps wall-clock accurate progress in a background tick engine,
//! survives restarts through a small persisted snapshot, and coordinates
//! several open front-ends ("tabs") so only one of them drives the timer.
//!
//! # Overview
//!
//! A session runs `idle -> focus -> overtime -> break -> idle`. The planned
//! duration counts down, then overtime counts up until the user finishes
//! and optionally takes a break. Ending focus and ending a break each play a
//! synthesized tone and raise a notification exactly once per session.
//!
//! # Modules
//!
//! - [`fsm`]: Pure state machine reducer
//! - [`engine`]: Background tick engine
//! - [`persistence`]: Snapshot storage
//! - [`tabs`]: Cross-tab leadership and mirroring
//! - [`dispatch`]: Sounds and notifications
//! - [`session`]: Façade wiring the above together
//! - [`tasks`]: Task store and toast collaborators
//! - [`view`]: Display formatting
//! - [`types`]: Shared data types
//! - [`config`]: Configuration from environment variables
//! - [`clock`]: Wall-clock abstraction
//! - [`error`]: Error types

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fsm;
pub mod persistence;
pub mod session;
pub mod tabs;
pub mod tasks;
pub mod types;
pub mod view;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use dispatch::{EffectDispatcher, Notifier, SoundPlayer, Tone};
pub use engine::{EngineCommand, EngineError, EngineEvent, TickEngine};
pub use error::{FocusError, Result};
pub use fsm::{transition, Effect, FsmContext, FsmEvent, FsmState, Transition};
pub use persistence::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore, StorageError};
pub use session::{Action, FocusSession, SessionChannels, SessionDeps};
pub use tabs::{TabBus, TabCoordinator, TabEnvelope, TabId, TabMessage};
pub use tasks::{MemoryTaskStore, TaskItem, TaskStore, Toast, ToastSink};
pub use types::{
    ItemPatch, ItemStatus, SessionId, Snapshot, SnapshotStatus, TickPayload, MAX_DURATION_MINUTES,
};
pub use view::{MirrorView, TimerView};
