//! Playback state machine shared by the engine and the control overlay.
//!
//! Nothing in here touches GStreamer directly: the engine translates bus
//! messages into [`BusEvent`]s, feeds them to [`EngineState::apply`] and
//! carries out the returned [`Effect`].

use crate::Error;
use std::time::Duration;

/// Amount added to or removed from the volume by one key press.
pub const VOLUME_STEP: f64 = 0.05;

/// State of the underlying pipeline, independent of GStreamer's own enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Null,
    Ready,
    Paused,
    Playing,
    /// An asynchronous state change has not completed yet.
    Pending,
}

/// Where playback currently is, as far as the engine knows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Playback {
    /// No media bound yet, or the pipeline was dropped to `Ready`/`Null`.
    #[default]
    Stopped,
    Paused,
    Playing,
    /// End of stream reached without looping; waiting for a seek or `play`.
    Ended,
    /// A pipeline error ended the session. Only opening new media leaves this state.
    Failed(String),
}

/// Asynchronous notification posted on the pipeline bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    StateChanged(PipelineState),
    EndOfStream,
    Error(String),
    DurationChanged,
    AsyncDone,
}

/// Work the engine must do on the pipeline after a [`BusEvent`] was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Seek back to the start and keep playing.
    Restart,
    /// Pause at the end of the stream.
    Halt,
    /// Tear the pipeline down and surface the message.
    Fatal(String),
    /// Re-query the duration, stream counts and frame size.
    RefreshDuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

/// Kind of stream selectable through `playbin`'s `current-*` properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Audio,
    Video,
    Text,
}

impl StreamKind {
    /// The `(count, current)` property names for this kind of stream.
    pub fn properties(self) -> (&'static str, &'static str) {
        match self {
            StreamKind::Audio => ("n-audio", "current-audio"),
            StreamKind::Video => ("n-video", "current-video"),
            StreamKind::Text => ("n-text", "current-text"),
        }
    }
}

/// Derived engine state, mutated by transport intents and bus confirmations.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub uri: Option<url::Url>,
    pub playback: Playback,
    pub direction: Direction,
    pub eos_pending: bool,
    pub started: bool,
    pub has_video: bool,
    pub has_audio: bool,
    pub looping: bool,
    /// Keeps the media out of the recently viewed list.
    pub secret: bool,
    pub width: u32,
    pub height: u32,
    /// `None` until a discovery event fired or a query succeeded.
    pub duration: Option<Duration>,
    pub position: Option<Duration>,
}

impl EngineState {
    /// Binds a new URI, forgetting everything learnt about the previous media.
    ///
    /// The loop and secret flags are user preferences and survive.
    pub fn reset(&mut self, uri: url::Url) {
        *self = EngineState {
            uri: Some(uri),
            looping: self.looping,
            secret: self.secret,
            ..EngineState::default()
        };
    }

    pub fn is_playing(&self) -> bool {
        self.playback == Playback::Playing
    }

    pub fn failure(&self) -> Option<&str> {
        match &self.playback {
            Playback::Failed(message) => Some(message),
            _ => None,
        }
    }

    /// Records the synchronous intent of a transport call.
    pub fn request(&mut self, state: PipelineState) {
        if self.failure().is_some() {
            return;
        }
        if state == PipelineState::Playing {
            self.eos_pending = false;
        }
        self.confirm(state);
    }

    /// A seek leaves the end of the stream behind.
    pub fn seeked(&mut self, position: Duration) {
        if self.playback == Playback::Ended {
            self.playback = Playback::Paused;
        }
        self.eos_pending = false;
        self.direction = Direction::Forward;
        self.position = Some(position);
    }

    /// Applies one bus event and returns what the pipeline has to do next.
    ///
    /// Applying the same event twice in a row never changes the state twice.
    pub fn apply(&mut self, event: BusEvent) -> Effect {
        match event {
            BusEvent::StateChanged(state) => {
                if self.failure().is_none() {
                    self.confirm(state);
                }
                Effect::None
            }
            BusEvent::EndOfStream => {
                if self.failure().is_some() {
                    Effect::None
                } else if self.looping {
                    self.eos_pending = false;
                    self.playback = Playback::Playing;
                    self.position = Some(Duration::ZERO);
                    Effect::Restart
                } else if self.playback == Playback::Ended {
                    Effect::None
                } else {
                    self.eos_pending = true;
                    self.playback = Playback::Ended;
                    Effect::Halt
                }
            }
            BusEvent::Error(message) => {
                if self.failure().is_some() {
                    Effect::None
                } else {
                    self.playback = Playback::Failed(message.clone());
                    Effect::Fatal(message)
                }
            }
            BusEvent::DurationChanged | BusEvent::AsyncDone => {
                self.duration = None;
                Effect::RefreshDuration
            }
        }
    }

    fn confirm(&mut self, state: PipelineState) {
        match state {
            PipelineState::Playing => {
                self.playback = Playback::Playing;
                self.started = true;
            }
            PipelineState::Paused => {
                if self.playback != Playback::Ended {
                    self.playback = Playback::Paused;
                }
            }
            PipelineState::Ready | PipelineState::Null => {
                self.playback = Playback::Stopped;
            }
            PipelineState::Pending => {}
        }
    }

    pub fn snapshot(&self, volume: f64, muted: bool) -> Snapshot {
        Snapshot {
            playing: self.is_playing(),
            ended: self.playback == Playback::Ended,
            failure: self.failure().map(str::to_owned),
            looping: self.looping,
            has_audio: self.has_audio,
            has_video: self.has_video,
            width: self.width,
            height: self.height,
            duration: self.duration,
            position: self.position,
            volume,
            muted,
        }
    }
}

/// Read-only view of the engine handed to the control overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub playing: bool,
    pub ended: bool,
    pub failure: Option<String>,
    pub looping: bool,
    pub has_audio: bool,
    pub has_video: bool,
    pub width: u32,
    pub height: u32,
    pub duration: Option<Duration>,
    pub position: Option<Duration>,
    pub volume: f64,
    pub muted: bool,
}

/// Transport commands the control overlay issues against a player.
pub trait Transport {
    fn snapshot(&self) -> Snapshot;

    fn play(&mut self) -> Result<(), Error>;

    /// Halts playback, keeping the current frame on screen.
    fn stop(&mut self) -> Result<(), Error>;

    /// Plays when not playing and stops otherwise. Returns whether playback is now requested.
    fn toggle_playing(&mut self) -> Result<bool, Error> {
        if self.snapshot().playing {
            self.stop()?;
            Ok(false)
        } else {
            self.play()?;
            Ok(true)
        }
    }

    /// Jumps to `position`, clamped to the media duration when it is known.
    fn seek(&mut self, position: Duration, accurate: bool) -> Result<(), Error>;

    /// Synchronous position query, `None` if the pipeline cannot answer yet.
    fn query_position(&mut self) -> Option<Duration>;

    /// Synchronous duration query; the result is cached in the engine state.
    fn update_duration(&mut self) -> Option<Duration>;

    fn volume(&self) -> f64;

    /// Sets the volume, clamped to `[0.0, 1.0]`.
    fn set_volume(&mut self, volume: f64);

    fn muted(&self) -> bool;

    fn set_muted(&mut self, muted: bool);

    fn set_looping(&mut self, looping: bool);

    /// Returns whether subtitles are shown afterwards.
    fn toggle_subtitles(&mut self) -> Result<bool, Error>;

    /// Switches to the next stream of `kind`. Returns the new stream index, if there is one.
    fn cycle_streams(&mut self, kind: StreamKind) -> Result<Option<i32>, Error>;

    /// Advances (or rewinds) a single frame while paused.
    fn frame_step(&mut self, forward: bool) -> Result<(), Error>;
}

/// Clamps a seek target to `[0, duration)` once the duration is known.
pub fn clamp_seek(target: Duration, duration: Option<Duration>) -> Duration {
    match duration {
        Some(duration) if !duration.is_zero() => {
            target.min(duration.saturating_sub(Duration::from_nanos(1)))
        }
        _ => target,
    }
}

/// Target of a relative seek of `delta_secs` from `position`, clamped to the media.
pub fn relative_target(position: Duration, delta_secs: i64, duration: Option<Duration>) -> Duration {
    let delta = Duration::from_secs(delta_secs.unsigned_abs());
    let target = if delta_secs < 0 {
        position.saturating_sub(delta)
    } else {
        position.saturating_add(delta)
    };
    clamp_seek(target, duration)
}

/// Applies one volume step, keeping the result in `[0.0, 1.0]`.
pub fn step_volume(volume: f64, step: f64) -> f64 {
    let volume = if volume.is_nan() { 0.0 } else { volume };
    (volume + step).clamp(0.0, 1.0)
}

/// Index of the stream following `current` among `count` streams.
pub fn next_stream(current: i32, count: i32) -> Option<i32> {
    if count <= 0 {
        return None;
    }
    Some((current.max(-1) + 1).rem_euclid(count))
}
