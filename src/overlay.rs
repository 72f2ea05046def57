//! Control overlay: widget geometry on top of the video and the dispatch of
//! input and timer events to the engine.

use crate::assets::Icon;
use crate::controls::Controls;
use crate::playback::{
    relative_target, step_volume, Snapshot, StreamKind, Transport, VOLUME_STEP,
};
use iced::{Point, Rectangle, Size, Vector};
use log::{debug, warn};
use std::time::{Duration, Instant};

pub const SEEK_WIDTH: f32 = 440.0;
pub const SEEK_HEIGHT: f32 = 20.0;
pub const CONTROLS_SIZE: Size = Size::new(680.0, 160.0);
pub const PLAY_BUTTON_OFFSET: Vector = Vector::new(30.0, 30.0);
pub const PLAY_BUTTON_SIZE: Size = Size::new(100.0, 100.0);
pub const TITLE_OFFSET: Vector = Vector::new(200.0, 40.0);
/// Outer frame of the seek bar; presses anywhere on it seek.
pub const SEEK_FRAME_OFFSET: Vector = Vector::new(200.0, 100.0);
pub const SEEK_FRAME_SIZE: Size = Size::new(SEEK_WIDTH + 10.0, SEEK_HEIGHT + 10.0);
pub const SEEK_TRACK_OFFSET: Vector = Vector::new(205.0, 105.0);
/// Stage size used when the media has no video to size the window after.
pub const DEFAULT_STAGE: Size = Size::new(854.0, 480.0);
pub const TITLE_MAX_CHARS: usize = 40;

/// Key bindings understood by the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Quit,
    ToggleFullscreen,
    TogglePlaying,
    ToggleMute,
    VolumeDown,
    VolumeUp,
    /// Relative seek, in seconds.
    Seek(i64),
    ToggleLoop,
    ToggleSubtitles,
    CycleStreams(StreamKind),
    FrameStep { forward: bool },
}

/// What the window has to do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    None,
    Quit,
    Fullscreen(bool),
}

#[derive(Debug, Clone)]
pub struct Overlay {
    stage: Size,
    media: Size,
    video: Rectangle,
    controls_origin: Point,
    seek_fill: f32,
    controls: Controls,
    fullscreen: bool,
    playing: bool,
    title: String,
    status: Option<String>,
}

impl Overlay {
    pub fn new(media: Size, title: &str, fullscreen: bool, now: Instant) -> Self {
        let stage = if media.width > 0.0 && media.height > 0.0 {
            media
        } else {
            DEFAULT_STAGE
        };
        let mut overlay = Overlay {
            stage,
            media,
            video: Rectangle::with_size(stage),
            controls_origin: Point::ORIGIN,
            seek_fill: 0.0,
            controls: Controls::new(now),
            fullscreen,
            playing: false,
            title: shorten_title(title, TITLE_MAX_CHARS),
            status: None,
        };
        overlay.resize(stage);
        overlay
    }

    pub fn stage(&self) -> Size {
        self.stage
    }

    pub fn video(&self) -> Rectangle {
        self.video
    }

    pub fn controls_origin(&self) -> Point {
        self.controls_origin
    }

    pub fn seek_fill(&self) -> f32 {
        self.seek_fill
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// The error message when playback failed, the media title otherwise.
    pub fn title(&self) -> &str {
        self.status.as_deref().unwrap_or(&self.title)
    }

    /// Pause is offered while playing, play otherwise.
    pub fn play_icon(&self) -> Icon {
        if self.playing {
            Icon::Pause
        } else {
            Icon::Play
        }
    }

    pub fn play_button(&self) -> Rectangle {
        Rectangle::new(self.controls_origin + PLAY_BUTTON_OFFSET, PLAY_BUTTON_SIZE)
    }

    pub fn seek_frame(&self) -> Rectangle {
        Rectangle::new(self.controls_origin + SEEK_FRAME_OFFSET, SEEK_FRAME_SIZE)
    }

    pub fn seek_track(&self) -> Rectangle {
        Rectangle::new(
            self.controls_origin + SEEK_TRACK_OFFSET,
            Size::new(SEEK_WIDTH, SEEK_HEIGHT),
        )
    }

    /// Re-layouts after the window was resized or switched to/from fullscreen.
    pub fn resize(&mut self, stage: Size) {
        self.stage = stage;
        self.video = letterbox(stage, self.media);
        self.controls_origin = controls_origin(stage);
        debug!(
            "stage {}x{}, controls at ({:.2}, {:.2})",
            stage.width, stage.height, self.controls_origin.x, self.controls_origin.y
        );
    }

    /// Pulls the engine state the overlay mirrors and runs the idle timer.
    pub fn sync(&mut self, snapshot: &Snapshot, now: Instant) {
        self.playing = snapshot.playing;

        let media = Size::new(snapshot.width as f32, snapshot.height as f32);
        if media != self.media && media.width > 0.0 && media.height > 0.0 {
            self.media = media;
            self.resize(self.stage);
        }

        if let Some(failure) = &snapshot.failure {
            if self.status.is_none() {
                self.status = Some(shorten_title(&format!("Error: {failure}"), TITLE_MAX_CHARS));
                self.controls.show(now);
            }
        } else {
            self.status = None;
        }

        self.controls.update(now);
    }

    pub fn opacity(&self, now: Instant) -> f32 {
        self.controls.opacity(now)
    }

    /// The pointer is hidden together with the controls.
    pub fn cursor_hidden(&self) -> bool {
        !self.controls.is_visible()
    }

    pub fn pointer_moved(&mut self, now: Instant) {
        self.controls.show(now);
    }

    /// Hit-tests a press against the visible controls, then shows them.
    pub fn pointer_pressed(&mut self, at: Point, transport: &mut impl Transport, now: Instant) {
        if self.controls.is_visible() {
            if self.play_button().contains(at) {
                self.toggle_playing(transport);
            } else if self.seek_frame().contains(at) {
                self.seek_to_offset(at.x, transport);
            }
        }
        self.controls.show(now);
    }

    /// Periodic progress update of the seek bar.
    pub fn tick(&mut self, transport: &mut impl Transport) {
        let snapshot = transport.snapshot();
        let duration = snapshot.duration.or_else(|| transport.update_duration());
        let position = transport.query_position().or(snapshot.position);

        self.seek_fill = fill_width(position.unwrap_or_default(), duration);
        debug!(
            "playback position progress: {:.3}",
            self.seek_fill / SEEK_WIDTH
        );
    }

    pub fn handle_key(&mut self, command: KeyCommand, transport: &mut impl Transport) -> Outcome {
        match command {
            KeyCommand::Quit => return Outcome::Quit,
            KeyCommand::ToggleFullscreen => {
                self.fullscreen = !self.fullscreen;
                return Outcome::Fullscreen(self.fullscreen);
            }
            KeyCommand::TogglePlaying => self.toggle_playing(transport),
            KeyCommand::ToggleMute => {
                let muted = !transport.muted();
                transport.set_muted(muted);
                debug!("{} stream", if muted { "mute" } else { "unmute" });
            }
            KeyCommand::VolumeDown | KeyCommand::VolumeUp => {
                let step = if command == KeyCommand::VolumeUp {
                    VOLUME_STEP
                } else {
                    -VOLUME_STEP
                };
                let volume = step_volume(transport.volume(), step);
                transport.set_volume(volume);
                debug!("volume: {volume:.2}");
            }
            KeyCommand::Seek(delta) => self.seek_relative(delta, transport),
            KeyCommand::ToggleLoop => {
                let looping = !transport.snapshot().looping;
                transport.set_looping(looping);
                debug!("looping: {looping}");
            }
            KeyCommand::ToggleSubtitles => match transport.toggle_subtitles() {
                Ok(enabled) => debug!("subtitles enabled: {enabled}"),
                Err(err) => warn!("cannot toggle subtitles: {err}"),
            },
            KeyCommand::CycleStreams(kind) => match transport.cycle_streams(kind) {
                Ok(Some(index)) => debug!("switched to {kind:?} stream {index}"),
                Ok(None) => debug!("no {kind:?} stream to switch to"),
                Err(err) => warn!("cannot switch {kind:?} stream: {err}"),
            },
            KeyCommand::FrameStep { forward } => {
                if let Err(err) = transport.frame_step(forward) {
                    warn!("cannot step a frame: {err}");
                }
                self.playing = false;
            }
        }
        Outcome::None
    }

    fn toggle_playing(&mut self, transport: &mut impl Transport) {
        match transport.toggle_playing() {
            Ok(playing) => self.playing = playing,
            Err(err) => warn!("cannot toggle playback: {err}"),
        }
    }

    /// Seeks relative to the current position and moves the fill right away,
    /// before the pipeline confirms the new position.
    fn seek_relative(&mut self, delta_secs: i64, transport: &mut impl Transport) {
        let snapshot = transport.snapshot();
        let duration = snapshot.duration.or_else(|| transport.update_duration());
        let position = transport
            .query_position()
            .or(snapshot.position)
            .unwrap_or_default();
        let target = relative_target(position, delta_secs, duration);

        debug!("seeking {delta_secs:+}s to {target:?}");
        match transport.seek(target, false) {
            // without a duration the fill stays put until a tick can place it
            Ok(()) if duration.is_some() => self.seek_fill = fill_width(target, duration),
            Ok(()) => {}
            Err(err) => warn!("cannot seek to {target:?}: {err}"),
        }
    }

    fn seek_to_offset(&mut self, x: f32, transport: &mut impl Transport) {
        let fraction = seek_fraction(x, self.seek_track());
        let Some(duration) = transport
            .snapshot()
            .duration
            .or_else(|| transport.update_duration())
        else {
            warn!("cannot seek, the media duration is unknown");
            return;
        };
        let target = fraction_target(fraction, duration);

        match transport.seek(target, false) {
            Ok(()) => self.seek_fill = fraction * SEEK_WIDTH,
            Err(err) => warn!("cannot seek to {target:?}: {err}"),
        }
    }
}

/// Largest rectangle with the media's aspect ratio centred in `stage`.
pub fn letterbox(stage: Size, media: Size) -> Rectangle {
    if media.width <= 0.0 || media.height <= 0.0 {
        return Rectangle::with_size(stage);
    }
    let scale = (stage.width / media.width).min(stage.height / media.height);
    let size = Size::new(media.width * scale, media.height * scale);
    Rectangle::new(
        Point::new(
            (stage.width - size.width) / 2.0,
            (stage.height - size.height) / 2.0,
        ),
        size,
    )
}

/// Controls are centred horizontally, two thirds of the way down the stage.
pub fn controls_origin(stage: Size) -> Point {
    Point::new(
        (stage.width - CONTROLS_SIZE.width) / 2.0,
        stage.height - stage.height / 3.0,
    )
}

/// Width of the seek-bar fill for `position`, within `[0, SEEK_WIDTH]`.
pub fn fill_width(position: Duration, duration: Option<Duration>) -> f32 {
    match duration {
        Some(duration) if !duration.is_zero() => {
            let progress = position.as_secs_f64() / duration.as_secs_f64();
            (progress.clamp(0.0, 1.0) as f32) * SEEK_WIDTH
        }
        _ => 0.0,
    }
}

/// Fraction of the track left of `x`, within `[0, 1]`.
pub fn seek_fraction(x: f32, track: Rectangle) -> f32 {
    if track.width <= 0.0 {
        return 0.0;
    }
    (x - track.x).clamp(0.0, track.width) / track.width
}

pub fn fraction_target(fraction: f32, duration: Duration) -> Duration {
    if fraction >= 1.0 {
        duration
    } else if fraction <= 0.0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(duration.as_secs_f64() * f64::from(fraction))
    }
}

/// Shortens long names by replacing their middle with an ellipsis.
pub fn shorten_title(name: &str, max_chars: usize) -> String {
    let len = name.chars().count();
    if len <= max_chars || max_chars < 5 {
        return name.to_owned();
    }
    let keep = max_chars - 3;
    let head = keep.div_ceil(2);
    let tail = keep - head;
    let mut title: String = name.chars().take(head).collect();
    title.push_str("...");
    title.extend(name.chars().skip(len - tail));
    title
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{clamp_seek, Snapshot};
    use crate::Error;

    #[derive(Default)]
    struct FakeTransport {
        playing: bool,
        looping: bool,
        muted: bool,
        volume: f64,
        duration: Option<Duration>,
        /// Duration the pipeline reports once asked.
        discoverable: Option<Duration>,
        position: Option<Duration>,
        duration_queries: usize,
        seeks: Vec<Duration>,
        steps: Vec<bool>,
    }

    impl Transport for FakeTransport {
        fn snapshot(&self) -> Snapshot {
            Snapshot {
                playing: self.playing,
                ended: false,
                failure: None,
                looping: self.looping,
                has_audio: true,
                has_video: true,
                width: 1280,
                height: 720,
                duration: self.duration,
                position: self.position,
                volume: self.volume,
                muted: self.muted,
            }
        }

        fn play(&mut self) -> Result<(), Error> {
            self.playing = true;
            Ok(())
        }

        fn stop(&mut self) -> Result<(), Error> {
            self.playing = false;
            Ok(())
        }

        fn seek(&mut self, position: Duration, _accurate: bool) -> Result<(), Error> {
            self.seeks.push(position);
            self.position = Some(clamp_seek(position, self.duration));
            Ok(())
        }

        fn query_position(&mut self) -> Option<Duration> {
            self.position
        }

        fn update_duration(&mut self) -> Option<Duration> {
            self.duration_queries += 1;
            self.duration = self.discoverable;
            self.duration
        }

        fn volume(&self) -> f64 {
            self.volume
        }

        fn set_volume(&mut self, volume: f64) {
            self.volume = volume.clamp(0.0, 1.0);
        }

        fn muted(&self) -> bool {
            self.muted
        }

        fn set_muted(&mut self, muted: bool) {
            self.muted = muted;
        }

        fn set_looping(&mut self, looping: bool) {
            self.looping = looping;
        }

        fn toggle_subtitles(&mut self) -> Result<bool, Error> {
            Err(Error::Cast)
        }

        fn cycle_streams(&mut self, _kind: StreamKind) -> Result<Option<i32>, Error> {
            Ok(None)
        }

        fn frame_step(&mut self, forward: bool) -> Result<(), Error> {
            self.playing = false;
            self.steps.push(forward);
            Ok(())
        }
    }

    fn overlay(now: Instant) -> Overlay {
        Overlay::new(Size::new(1280.0, 720.0), "movie.mkv", false, now)
    }

    fn track_point(overlay: &Overlay, offset: f32) -> Point {
        let track = overlay.seek_track();
        Point::new(track.x + offset, track.y + track.height / 2.0)
    }

    #[test]
    fn letterbox_keeps_aspect_ratio() {
        let wide = letterbox(Size::new(1000.0, 1000.0), Size::new(1920.0, 1080.0));
        assert_eq!(wide.width, 1000.0);
        assert_eq!(wide.height, 562.5);
        assert_eq!(wide.y, (1000.0 - 562.5) / 2.0);
        assert_eq!(wide.x, 0.0);

        let tall = letterbox(Size::new(1000.0, 500.0), Size::new(480.0, 640.0));
        assert_eq!(tall.height, 500.0);
        assert_eq!(tall.width, 375.0);
        assert_eq!(tall.x, (1000.0 - 375.0) / 2.0);

        let audio_only = letterbox(Size::new(800.0, 600.0), Size::ZERO);
        assert_eq!(audio_only, Rectangle::with_size(Size::new(800.0, 600.0)));
    }

    #[test]
    fn controls_stay_centred() {
        let now = Instant::now();
        let mut overlay = overlay(now);
        for width in [700.0, 1280.0, 1920.0] {
            overlay.resize(Size::new(width, 900.0));
            let origin = overlay.controls_origin();
            assert_eq!(origin.x + CONTROLS_SIZE.width / 2.0, width / 2.0);
            assert_eq!(origin.y, 600.0);
        }
    }

    #[test]
    fn fill_is_bounded_and_monotonic() {
        let duration = Some(Duration::from_secs(100));
        let mut last = 0.0;
        for secs in 0..=120 {
            let fill = fill_width(Duration::from_secs(secs), duration);
            assert!((0.0..=SEEK_WIDTH).contains(&fill));
            assert!(fill >= last);
            last = fill;
        }
        assert_eq!(last, SEEK_WIDTH);
        assert_eq!(fill_width(Duration::from_secs(5), None), 0.0);
        assert_eq!(fill_width(Duration::from_secs(5), Some(Duration::ZERO)), 0.0);
    }

    #[test]
    fn tick_queries_unknown_duration() {
        let now = Instant::now();
        let mut overlay = overlay(now);
        let mut transport = FakeTransport {
            discoverable: Some(Duration::from_secs(200)),
            position: Some(Duration::from_secs(50)),
            ..FakeTransport::default()
        };

        overlay.tick(&mut transport);
        assert_eq!(transport.duration_queries, 1);
        assert_eq!(overlay.seek_fill(), SEEK_WIDTH / 4.0);

        transport.position = Some(Duration::from_secs(100));
        overlay.tick(&mut transport);
        assert_eq!(transport.duration_queries, 1);
        assert_eq!(overlay.seek_fill(), SEEK_WIDTH / 2.0);
    }

    #[test]
    fn press_at_track_end_seeks_to_duration() {
        let now = Instant::now();
        let mut overlay = overlay(now);
        let duration = Duration::from_secs(321);
        let mut transport = FakeTransport {
            duration: Some(duration),
            ..FakeTransport::default()
        };
        overlay.pointer_moved(now);

        overlay.pointer_pressed(track_point(&overlay, SEEK_WIDTH), &mut transport, now);
        overlay.pointer_pressed(track_point(&overlay, SEEK_WIDTH + 4.0), &mut transport, now);
        assert_eq!(transport.seeks, [duration, duration]);
        assert_eq!(overlay.seek_fill(), SEEK_WIDTH);

        overlay.pointer_pressed(track_point(&overlay, -4.0), &mut transport, now);
        assert_eq!(transport.seeks.last(), Some(&Duration::ZERO));
        assert_eq!(overlay.seek_fill(), 0.0);
    }

    #[test]
    fn press_queries_duration_first() {
        let now = Instant::now();
        let mut overlay = overlay(now);
        let mut transport = FakeTransport {
            discoverable: Some(Duration::from_secs(100)),
            ..FakeTransport::default()
        };
        overlay.pointer_moved(now);
        overlay.pointer_pressed(track_point(&overlay, SEEK_WIDTH / 2.0), &mut transport, now);
        assert_eq!(transport.duration_queries, 1);
        assert_eq!(transport.seeks, [Duration::from_secs(50)]);
    }

    #[test]
    fn presses_on_hidden_controls_only_show_them() {
        let now = Instant::now();
        let mut overlay = overlay(now);
        let mut transport = FakeTransport::default();
        let button = overlay.play_button();
        let center = Point::new(button.center_x(), button.center_y());

        overlay.pointer_pressed(center, &mut transport, now);
        assert!(!transport.playing);
        assert!(overlay.controls().is_visible());

        overlay.pointer_pressed(center, &mut transport, now);
        assert!(transport.playing);
        assert_eq!(overlay.play_icon(), Icon::Pause);
    }

    #[test]
    fn arrow_seeks_update_fill_optimistically() {
        let now = Instant::now();
        let mut overlay = overlay(now);
        let mut transport = FakeTransport {
            duration: Some(Duration::from_secs(100)),
            position: Some(Duration::from_secs(5)),
            ..FakeTransport::default()
        };

        overlay.handle_key(KeyCommand::Seek(-10), &mut transport);
        assert_eq!(transport.seeks, [Duration::ZERO]);
        assert_eq!(overlay.seek_fill(), 0.0);

        overlay.handle_key(KeyCommand::Seek(60), &mut transport);
        assert_eq!(transport.seeks.last(), Some(&Duration::from_secs(60)));
        assert_eq!(overlay.seek_fill(), SEEK_WIDTH * 0.6);

        overlay.handle_key(KeyCommand::Seek(60), &mut transport);
        let last = *transport.seeks.last().unwrap();
        assert!(last < Duration::from_secs(100));
    }

    #[test]
    fn seeks_without_duration_keep_the_fill() {
        let now = Instant::now();
        let mut overlay = overlay(now);
        let mut transport = FakeTransport {
            duration: Some(Duration::from_secs(100)),
            position: Some(Duration::from_secs(50)),
            ..FakeTransport::default()
        };
        overlay.tick(&mut transport);
        assert_eq!(overlay.seek_fill(), SEEK_WIDTH * 0.5);

        transport.duration = None;
        overlay.handle_key(KeyCommand::Seek(10), &mut transport);
        assert_eq!(transport.duration_queries, 1);
        assert_eq!(transport.seeks, [Duration::from_secs(60)]);
        assert_eq!(overlay.seek_fill(), SEEK_WIDTH * 0.5);
    }

    #[test]
    fn cursor_follows_the_controls() {
        let now = Instant::now();
        let mut overlay = overlay(now);
        assert!(overlay.cursor_hidden());

        overlay.pointer_moved(now);
        assert!(!overlay.cursor_hidden());

        overlay.sync(&FakeTransport::default().snapshot(), now + Duration::from_secs(3));
        assert!(overlay.cursor_hidden());
    }

    #[test]
    fn volume_keys_stay_in_range() {
        let now = Instant::now();
        let mut overlay = overlay(now);
        let mut transport = FakeTransport {
            volume: 0.9,
            ..FakeTransport::default()
        };
        for _ in 0..10 {
            overlay.handle_key(KeyCommand::VolumeUp, &mut transport);
            assert!((0.0..=1.0).contains(&transport.volume));
        }
        assert_eq!(transport.volume, 1.0);
        for _ in 0..30 {
            overlay.handle_key(KeyCommand::VolumeDown, &mut transport);
            assert!((0.0..=1.0).contains(&transport.volume));
        }
        assert_eq!(transport.volume, 0.0);
    }

    #[test]
    fn toggles() {
        let now = Instant::now();
        let mut overlay = overlay(now);
        let mut transport = FakeTransport::default();

        overlay.handle_key(KeyCommand::ToggleMute, &mut transport);
        assert!(transport.muted);
        overlay.handle_key(KeyCommand::ToggleLoop, &mut transport);
        assert!(transport.looping);

        assert_eq!(overlay.play_icon(), Icon::Play);
        overlay.handle_key(KeyCommand::TogglePlaying, &mut transport);
        assert!(transport.playing);
        assert_eq!(overlay.play_icon(), Icon::Pause);

        overlay.handle_key(KeyCommand::FrameStep { forward: false }, &mut transport);
        assert_eq!(transport.steps, [false]);
        assert_eq!(overlay.play_icon(), Icon::Play);

        // a failing transport call leaves the overlay usable
        overlay.handle_key(KeyCommand::ToggleSubtitles, &mut transport);

        assert_eq!(
            overlay.handle_key(KeyCommand::ToggleFullscreen, &mut transport),
            Outcome::Fullscreen(true)
        );
        assert_eq!(
            overlay.handle_key(KeyCommand::ToggleFullscreen, &mut transport),
            Outcome::Fullscreen(false)
        );
        assert_eq!(
            overlay.handle_key(KeyCommand::Quit, &mut transport),
            Outcome::Quit
        );
    }

    #[test]
    fn sync_follows_the_engine() {
        let now = Instant::now();
        let mut overlay = Overlay::new(Size::ZERO, "song.ogg", false, now);
        assert_eq!(overlay.stage(), DEFAULT_STAGE);

        let mut snapshot = FakeTransport::default().snapshot();
        snapshot.playing = true;
        snapshot.failure = Some("no decoder".to_owned());
        overlay.sync(&snapshot, now);
        assert_eq!(overlay.play_icon(), Icon::Pause);
        assert_eq!(overlay.title(), "Error: no decoder");
        assert!(overlay.controls().is_visible());
        assert_eq!(overlay.video(), letterbox(DEFAULT_STAGE, Size::new(1280.0, 720.0)));

        snapshot.failure = None;
        overlay.sync(&snapshot, now);
        assert_eq!(overlay.title(), "song.ogg");
    }

    #[test]
    fn long_titles_are_shortened() {
        assert_eq!(shorten_title("short.mkv", 40), "short.mkv");
        let long = "a".repeat(30) + &"b".repeat(30);
        let title = shorten_title(&long, 40);
        assert_eq!(title.chars().count(), 40);
        assert!(title.starts_with("aaaa"));
        assert!(title.ends_with("bbbb"));
        assert!(title.contains("..."));
    }
}
