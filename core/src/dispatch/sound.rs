//! Synthesized notification tones.
//!
//! Tones are rendered from a handful of sine partials with a short linear
//! attack and an exponential decay. No audio assets are shipped.
//!
//! Playback is gated on a one-time unlock: until a user gesture has
//! successfully opened the output, [`SoundPlayer::play`] drops the request.
//! Dropped tones are not queued.

use std::env;
use std::f32::consts::TAU;
use std::ffi::OsStr;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use thiserror::Error;
use tracing::{debug, info, warn};

/// Sample rate used for rendering.
pub const SAMPLE_RATE: u32 = 44_100;

const ATTACK_S: f32 = 0.01;

/// Errors from an audio output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// The output has not been unlocked by a user gesture.
    #[error("audio output is locked")]
    Locked,

    /// No audio device or backend is available.
    #[error("audio output unavailable: {0}")]
    Unavailable(String),

    /// The backend failed while playing.
    #[error("playback failed: {0}")]
    Playback(String),
}

/// The three tones the timer can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tone {
    /// Soft rising pair played before a scheduled session starts.
    Reminder,
    /// Bright arpeggiated chime when the planned focus time runs out.
    FocusEnd,
    /// Three insistent pulses when a break is over.
    BreakEnd,
}

#[derive(Debug, Clone, Copy)]
struct Partial {
    freq_hz: f32,
    start_s: f32,
    duration_s: f32,
    gain: f32,
    /// Exponential decay rate per second.
    decay: f32,
}

const fn partial(freq_hz: f32, start_s: f32, duration_s: f32, gain: f32, decay: f32) -> Partial {
    Partial {
        freq_hz,
        start_s,
        duration_s,
        gain,
        decay,
    }
}

const REMINDER: [Partial; 2] = [
    partial(659.25, 0.0, 0.35, 0.25, 6.0),
    partial(880.0, 0.18, 0.45, 0.25, 5.0),
];

const FOCUS_END: [Partial; 4] = [
    partial(1046.5, 0.0, 0.9, 0.22, 3.5),
    partial(1318.5, 0.12, 0.9, 0.2, 3.5),
    partial(1568.0, 0.24, 1.0, 0.2, 3.0),
    partial(2093.0, 0.36, 1.2, 0.12, 2.5),
];

const BREAK_END: [Partial; 3] = [
    partial(987.77, 0.0, 0.18, 0.35, 8.0),
    partial(987.77, 0.25, 0.18, 0.35, 8.0),
    partial(987.77, 0.5, 0.3, 0.35, 6.0),
];

impl Tone {
    fn partials(self) -> &'static [Partial] {
        match self {
            Tone::Reminder => &REMINDER,
            Tone::FocusEnd => &FOCUS_END,
            Tone::BreakEnd => &BREAK_END,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Tone::Reminder => "reminder",
            Tone::FocusEnd => "focus_end",
            Tone::BreakEnd => "break_end",
        }
    }

    /// Renders the tone as mono samples in `-1.0..=1.0`.
    #[must_use]
    pub fn render(self, sample_rate: u32) -> Vec<f32> {
        let rate = sample_rate as f32;
        let partials = self.partials();
        let total_s = partials
            .iter()
            .map(|p| p.start_s + p.duration_s)
            .fold(0.0_f32, f32::max);
        let mut samples = vec![0.0_f32; (total_s * rate).ceil() as usize];

        for p in partials {
            let first = (p.start_s * rate) as usize;
            let count = (p.duration_s * rate) as usize;
            for (i, sample) in samples.iter_mut().skip(first).take(count).enumerate() {
                let t = i as f32 / rate;
                let attack = (t / ATTACK_S).min(1.0);
                let envelope = attack * (-p.decay * t).exp();
                *sample += p.gain * envelope * (TAU * p.freq_hz * t).sin();
            }
        }

        for sample in &mut samples {
            *sample = sample.clamp(-1.0, 1.0);
        }
        samples
    }
}

/// An audio device.
pub trait AudioOutput: Send + Sync {
    /// Attempts to open the device in response to a user gesture.
    ///
    /// # Errors
    ///
    /// Returns an `AudioError` if the device stays locked or is missing.
    fn resume(&self) -> Result<(), AudioError>;

    /// Plays mono samples.
    ///
    /// # Errors
    ///
    /// Returns an `AudioError` if playback fails.
    fn play(&self, samples: &[f32], sample_rate: u32) -> Result<(), AudioError>;
}

/// Output that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOutput;

impl AudioOutput for NullOutput {
    fn resume(&self) -> Result<(), AudioError> {
        Ok(())
    }

    fn play(&self, _samples: &[f32], _sample_rate: u32) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Output that rings the terminal bell instead of playing samples.
///
/// A bell has no pitch, so every tone sounds the same. Use [`PipeOutput`]
/// where a PCM player is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct BellOutput;

impl AudioOutput for BellOutput {
    fn resume(&self) -> Result<(), AudioError> {
        if std::io::stdout().is_terminal() {
            Ok(())
        } else {
            Err(AudioError::Unavailable("stdout is not a terminal".to_string()))
        }
    }

    fn play(&self, _samples: &[f32], _sample_rate: u32) -> Result<(), AudioError> {
        let mut stdout = std::io::stdout();
        stdout
            .write_all(b"\x07")
            .and_then(|()| stdout.flush())
            .map_err(|e| AudioError::Playback(e.to_string()))
    }
}

/// External programs that play raw mono `f32` samples from stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmPlayer {
    /// PulseAudio / PipeWire.
    Paplay,
    /// ALSA.
    Aplay,
}

impl PcmPlayer {
    #[must_use]
    pub fn program(self) -> &'static str {
        match self {
            PcmPlayer::Paplay => "paplay",
            PcmPlayer::Aplay => "aplay",
        }
    }

    fn args(self, sample_rate: u32) -> Vec<String> {
        match self {
            PcmPlayer::Paplay => vec![
                "--raw".to_string(),
                "--format=float32le".to_string(),
                "--channels=1".to_string(),
                format!("--rate={sample_rate}"),
            ],
            PcmPlayer::Aplay => vec![
                "-q".to_string(),
                "-t".to_string(),
                "raw".to_string(),
                "-f".to_string(),
                "FLOAT_LE".to_string(),
                "-c".to_string(),
                "1".to_string(),
                "-r".to_string(),
                sample_rate.to_string(),
            ],
        }
    }

    /// Locates the program in a `PATH`-style list of directories.
    fn find_in(self, paths: &OsStr) -> Option<PathBuf> {
        env::split_paths(paths)
            .map(|dir| dir.join(self.program()))
            .find(|candidate| candidate.is_file())
    }
}

/// Output that streams rendered tones to an external PCM player.
#[derive(Debug, Clone, Copy)]
pub struct PipeOutput {
    player: PcmPlayer,
}

impl PipeOutput {
    #[must_use]
    pub fn new(player: PcmPlayer) -> Self {
        Self { player }
    }

    /// The first supported player installed on `PATH`.
    #[must_use]
    pub fn detect() -> Option<Self> {
        let paths = env::var_os("PATH")?;
        [PcmPlayer::Paplay, PcmPlayer::Aplay]
            .into_iter()
            .find(|player| player.find_in(&paths).is_some())
            .map(Self::new)
    }
}

impl AudioOutput for PipeOutput {
    fn resume(&self) -> Result<(), AudioError> {
        let found = env::var_os("PATH").and_then(|paths| self.player.find_in(&paths));
        match found {
            Some(_) => Ok(()),
            None => Err(AudioError::Unavailable(format!(
                "{} not found on PATH",
                self.player.program()
            ))),
        }
    }

    fn play(&self, samples: &[f32], sample_rate: u32) -> Result<(), AudioError> {
        let mut child = Command::new(self.player.program())
            .args(self.player.args(sample_rate))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AudioError::Playback(e.to_string()))?;
        let Some(mut stdin) = child.stdin.take() else {
            return Err(AudioError::Playback("player stdin unavailable".to_string()));
        };

        let pcm = encode_f32le(samples);
        let program = self.player.program();
        // Feeding and reaping the player blocks for the length of the tone.
        thread::spawn(move || {
            if let Err(e) = stdin.write_all(&pcm) {
                debug!(program, error = %e, "Player closed its input early");
            }
            drop(stdin);
            if let Err(e) = child.wait() {
                warn!(program, error = %e, "Failed to reap audio player");
            }
        });
        Ok(())
    }
}

fn encode_f32le(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Plays tones once the output has been unlocked.
pub struct SoundPlayer {
    output: Arc<dyn AudioOutput>,
    unlocked: AtomicBool,
}

impl SoundPlayer {
    #[must_use]
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            unlocked: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::SeqCst)
    }

    /// Called on any user gesture. A failed attempt leaves the player locked
    /// so the next gesture retries.
    pub fn unlock(&self) {
        if self.is_unlocked() {
            return;
        }
        match self.output.resume() {
            Ok(()) => {
                self.unlocked.store(true, Ordering::SeqCst);
                info!("Audio unlocked");
            }
            Err(e) => debug!(error = %e, "Audio unlock failed, still locked"),
        }
    }

    /// Plays `tone`, or drops it silently while locked.
    pub fn play(&self, tone: Tone) {
        if !self.is_unlocked() {
            debug!(tone = tone.name(), "Audio locked, tone dropped");
            return;
        }
        let samples = tone.render(SAMPLE_RATE);
        if let Err(e) = self.output.play(&samples, SAMPLE_RATE) {
            warn!(tone = tone.name(), error = %e, "Failed to play tone");
        }
    }
}

impl std::fmt::Debug for SoundPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundPlayer")
            .field("unlocked", &self.is_unlocked())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeOutput {
        fail_resumes: AtomicUsize,
        played: Mutex<Vec<usize>>,
    }

    impl AudioOutput for FakeOutput {
        fn resume(&self) -> Result<(), AudioError> {
            let remaining = self.fail_resumes.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_resumes.store(remaining - 1, Ordering::SeqCst);
                return Err(AudioError::Locked);
            }
            Ok(())
        }

        fn play(&self, samples: &[f32], _sample_rate: u32) -> Result<(), AudioError> {
            self.played.lock().unwrap().push(samples.len());
            Ok(())
        }
    }

    #[test]
    fn tones_are_distinct_and_bounded() {
        let reminder = Tone::Reminder.render(SAMPLE_RATE);
        let focus = Tone::FocusEnd.render(SAMPLE_RATE);
        let brk = Tone::BreakEnd.render(SAMPLE_RATE);

        assert_ne!(reminder.len(), focus.len());
        assert_ne!(focus.len(), brk.len());
        for samples in [&reminder, &focus, &brk] {
            assert!(!samples.is_empty());
            assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
            assert!(samples.iter().any(|s| s.abs() > 0.05), "tone is audible");
        }
    }

    #[test]
    fn render_length_matches_longest_partial() {
        // Focus end: last partial starts at 0.36s and lasts 1.2s.
        let samples = Tone::FocusEnd.render(1_000);
        assert!((1_560..=1_561).contains(&samples.len()));
    }

    #[test]
    fn pcm_is_little_endian_f32() {
        let bytes = encode_f32le(&[1.0, -0.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0_f32.to_le_bytes());
        assert_eq!(&bytes[4..], &(-0.5_f32).to_le_bytes());
    }

    #[test]
    fn player_arguments_describe_the_stream() {
        let args = PcmPlayer::Paplay.args(SAMPLE_RATE);
        assert!(args.contains(&"--format=float32le".to_string()));
        assert!(args.contains(&"--rate=44100".to_string()));

        let args = PcmPlayer::Aplay.args(8_000);
        assert_eq!(args[args.len() - 2..], ["-r".to_string(), "8000".to_string()]);
        assert!(args.contains(&"FLOAT_LE".to_string()));
    }

    #[test]
    fn players_are_found_on_the_search_path() {
        let empty = tempfile::TempDir::new().unwrap();
        let bin = tempfile::TempDir::new().unwrap();
        std::fs::write(bin.path().join("aplay"), "").unwrap();
        let paths = env::join_paths([empty.path(), bin.path()]).unwrap();

        assert_eq!(
            PcmPlayer::Aplay.find_in(&paths),
            Some(bin.path().join("aplay"))
        );
        assert_eq!(PcmPlayer::Paplay.find_in(&paths), None);
    }

    #[test]
    fn play_before_unlock_is_dropped() {
        let output = Arc::new(FakeOutput::default());
        let player = SoundPlayer::new(output.clone());

        player.play(Tone::FocusEnd);
        assert!(output.played.lock().unwrap().is_empty());

        player.unlock();
        player.play(Tone::FocusEnd);
        assert_eq!(output.played.lock().unwrap().len(), 1);
    }

    #[test]
    fn failed_unlock_retries_on_next_gesture() {
        let output = Arc::new(FakeOutput::default());
        output.fail_resumes.store(1, Ordering::SeqCst);
        let player = SoundPlayer::new(output);

        player.unlock();
        assert!(!player.is_unlocked());
        player.unlock();
        assert!(player.is_unlocked());
    }
}
