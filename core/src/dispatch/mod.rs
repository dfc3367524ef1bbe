//! Side-effect services invoked by state machine effects.
//!
//! - [`sound`]: synthesized tones behind a user-gesture unlock
//! - [`notify`]: native notifications with a toast fallback
//!
//! Both are constructed once at application start and handed to the session
//! façade, so tests can substitute fakes.

pub mod notify;
pub mod sound;

pub use notify::{NotificationBackend, NotificationRequest, Notifier, NotifyError, Permission};
pub use sound::{
    AudioError, AudioOutput, BellOutput, NullOutput, PcmPlayer, PipeOutput, SoundPlayer, Tone,
};

use tracing::debug;

use crate::fsm::Effect;
use crate::tabs::TabId;

/// Executes [`Effect`]s by playing a tone and raising a notification.
#[derive(Debug)]
pub struct EffectDispatcher {
    sounds: SoundPlayer,
    notifier: Notifier,
}

impl EffectDispatcher {
    #[must_use]
    pub fn new(sounds: SoundPlayer, notifier: Notifier) -> Self {
        Self { sounds, notifier }
    }

    #[must_use]
    pub fn sounds(&self) -> &SoundPlayer {
        &self.sounds
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Runs one effect. `tab` is focused when the notification is clicked.
    pub fn execute(&self, effect: &Effect, tab: TabId) {
        debug!(?effect, "Executing effect");
        let (tone, request) = match effect {
            Effect::FocusEnded { title } => (
                Tone::FocusEnd,
                NotificationRequest {
                    title: "Focus session complete".to_string(),
                    body: match title {
                        Some(title) => format!("Time's up for \"{title}\". Take a break?"),
                        None => "Time's up. Take a break?".to_string(),
                    },
                    tag: Some("focus-end".to_string()),
                    focus_tab: Some(tab),
                },
            ),
            Effect::BreakEnded => (
                Tone::BreakEnd,
                NotificationRequest {
                    title: "Break is over".to_string(),
                    body: "Ready for the next session?".to_string(),
                    tag: Some("break-end".to_string()),
                    focus_tab: Some(tab),
                },
            ),
        };
        self.sounds.play(tone);
        self.notifier.notify(&request);
    }

    /// Plays the pre-start reminder and raises a notification for `title`.
    pub fn remind(&self, title: &str, tab: TabId) {
        self.sounds.play(Tone::Reminder);
        self.notifier.notify(&NotificationRequest {
            title: "Starting soon".to_string(),
            body: title.to_string(),
            tag: Some("reminder".to_string()),
            focus_tab: Some(tab),
        });
    }
}
