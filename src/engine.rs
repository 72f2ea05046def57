use crate::playback::{
    clamp_seek, next_stream, BusEvent, Direction, Effect, EngineState, PipelineState, Snapshot,
    StreamKind, Transport,
};
use crate::Error;
use gstreamer as gst;
use gstreamer_app as gst_app;
use gstreamer_app::prelude::*;
use iced::widget::image as img;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PIPELINE: &str = "playbin video-sink=\"videoconvert ! videoscale ! appsink name=snap_video drop=true max-buffers=1 caps=video/x-raw,format=RGBA,pixel-aspect-ratio=1/1\"";

/// Latest decoded video frame, tightly packed RGBA.
#[derive(Debug, Default)]
pub(crate) struct Frame {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) pixels: Vec<u8>,
}

impl Frame {
    /// Moves the pixels out into an image handle, leaving the frame empty.
    fn take_handle(&mut self) -> Option<img::Handle> {
        if self.pixels.is_empty() {
            return None;
        }
        let pixels = std::mem::take(&mut self.pixels);
        Some(img::Handle::from_rgba(self.width, self.height, pixels))
    }
}

impl From<gst::State> for PipelineState {
    fn from(state: gst::State) -> Self {
        match state {
            gst::State::Null => PipelineState::Null,
            gst::State::Ready => PipelineState::Ready,
            gst::State::Paused => PipelineState::Paused,
            gst::State::Playing => PipelineState::Playing,
            _ => PipelineState::Pending,
        }
    }
}

/// Playback engine driving a `playbin` pipeline.
///
/// Decoded frames are pulled from an `appsink` on a worker thread; everything
/// else (transport calls, bus handling) happens on the caller's thread.
pub struct Engine {
    bus: gst::Bus,
    player: gst::Pipeline,
    video_pad: gst::Pad,
    alive: Arc<AtomicBool>,
    worker: Option<std::thread::JoinHandle<()>>,

    frame: Arc<Mutex<Frame>>,
    upload_frame: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,

    state: EngineState,
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(err) = self.player.set_state(gst::State::Null) {
            error!("failed to shut the pipeline down: {err}");
        }

        self.alive.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("failed to stop video thread");
            }
        }
    }
}

impl Engine {
    /// Builds the pipeline with an RGBA `appsink` as video sink.
    ///
    /// No media is bound yet; call [`Engine::load_uri`] or [`Engine::open_uri`].
    pub fn new() -> Result<Self, Error> {
        gst::init()?;

        let player = gst::parse::launch(PIPELINE)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| Error::Cast)?;

        let video_sink: gst::Element = player.property("video-sink");
        let app_sink = video_sink
            .downcast::<gst::Bin>()
            .map_err(|_| Error::Cast)?
            .by_name("snap_video")
            .ok_or(Error::Cast)?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| Error::Cast)?;
        let video_pad = app_sink.static_pad("sink").ok_or(Error::Caps)?;
        let bus = player.bus().ok_or(Error::Bus)?;

        let frame = Arc::new(Mutex::new(Frame::default()));
        let upload_frame = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let paused = Arc::new(AtomicBool::new(true));

        let frame_ref = Arc::clone(&frame);
        let upload_frame_ref = Arc::clone(&upload_frame);
        let alive_ref = Arc::clone(&alive);
        let paused_ref = Arc::clone(&paused);

        let worker = std::thread::spawn(move || {
            let mut last_pts = None;
            while alive_ref.load(Ordering::Acquire) {
                match (|| -> Result<(), gst::FlowError> {
                    let paused = paused_ref.load(Ordering::SeqCst);
                    let sample = if paused {
                        app_sink.try_pull_preroll(gst::ClockTime::from_mseconds(16))
                    } else {
                        app_sink.try_pull_sample(gst::ClockTime::from_mseconds(16))
                    }
                    .ok_or(gst::FlowError::Eos)?;

                    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                    // the preroll sample is handed out again until the pipeline moves
                    if paused && buffer.pts() == last_pts {
                        std::thread::sleep(Duration::from_millis(16));
                        return Ok(());
                    }
                    last_pts = buffer.pts();

                    let caps = sample.caps().ok_or(gst::FlowError::Error)?;
                    let s = caps.structure(0).ok_or(gst::FlowError::Error)?;
                    let width = s.get::<i32>("width").map_err(|_| gst::FlowError::Error)?;
                    let height = s.get::<i32>("height").map_err(|_| gst::FlowError::Error)?;
                    let len = width as usize * height as usize * 4;

                    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                    let pixels = map.as_slice().get(..len).ok_or(gst::FlowError::Error)?;

                    let mut frame = frame_ref.lock().map_err(|_| gst::FlowError::Error)?;
                    frame.width = width as u32;
                    frame.height = height as u32;
                    frame.pixels.clear();
                    frame.pixels.extend_from_slice(pixels);

                    upload_frame_ref.store(true, Ordering::SeqCst);
                    Ok(())
                })() {
                    Err(gst::FlowError::Error) => error!("error pulling frame"),
                    // nothing to pull until the pipeline prerolls or leaves EOS
                    Err(_) if paused_ref.load(Ordering::SeqCst) || app_sink.is_eos() => {
                        std::thread::sleep(Duration::from_millis(16));
                    }
                    _ => {}
                }
            }
        });

        Ok(Engine {
            bus,
            player,
            video_pad,
            alive,
            worker: Some(worker),

            frame,
            upload_frame,
            paused,

            state: EngineState::default(),
        })
    }

    /// Binds `uri` as the pipeline source without changing the pipeline state.
    pub fn load_uri(&mut self, uri: &url::Url) {
        info!("loading {uri}");
        self.player.set_property("uri", uri.as_str());
        self.state.reset(uri.clone());
    }

    /// Replaces the current media with `uri` and starts playing it.
    pub fn open_uri(&mut self, uri: &url::Url) -> Result<(), Error> {
        self.player.set_state(gst::State::Ready)?;
        self.load_uri(uri);
        self.play()
    }

    /// Waits for up to `timeout` until the pipeline has prerolled, then reads
    /// the frame size, stream counts and duration.
    ///
    /// Only meant for startup; the pipeline is left paused.
    pub fn preroll(&mut self, timeout: Duration) -> Result<(), Error> {
        self.player.set_state(gst::State::Paused)?;
        self.player
            .state(gst::ClockTime::from_nseconds(timeout.as_nanos() as u64))
            .0?;
        self.paused.store(true, Ordering::SeqCst);
        self.state.request(PipelineState::Paused);
        self.refresh_media_info();
        Ok(())
    }

    /// Current pipeline state, without waiting for pending changes.
    pub fn state(&self) -> PipelineState {
        let (_, current, _) = self.player.state(gst::ClockTime::ZERO);
        current.into()
    }

    pub fn uri(&self) -> Option<&url::Url> {
        self.state.uri.as_ref()
    }

    pub fn set_secret(&mut self, secret: bool) {
        self.state.secret = secret;
    }

    /// Drains the bus and runs the resulting state transitions.
    ///
    /// Returns every effect that was carried out, so the caller can react to
    /// the end of the stream or a fatal error.
    pub fn poll_bus(&mut self) -> Vec<Effect> {
        let events: Vec<BusEvent> = self
            .bus
            .iter()
            .filter_map(|msg| self.bus_event(&msg))
            .collect();

        let mut effects = Vec::new();
        for event in events {
            debug!("bus event: {event:?}");
            let effect = self.state.apply(event);
            if effect != Effect::None {
                self.execute(&effect);
                effects.push(effect);
            }
        }
        effects
    }

    fn bus_event(&self, msg: &gst::Message) -> Option<BusEvent> {
        match msg.view() {
            gst::MessageView::StateChanged(changed) => {
                // children post their own state changes on the same bus
                let from_pipeline = changed
                    .src()
                    .map(|s| s == self.player.upcast_ref::<gst::Object>())
                    .unwrap_or(false);
                from_pipeline.then(|| BusEvent::StateChanged(changed.current().into()))
            }
            gst::MessageView::Eos(_) => Some(BusEvent::EndOfStream),
            gst::MessageView::Error(err) => {
                debug!("error details: {:?}", err.debug());
                Some(BusEvent::Error(err.error().to_string()))
            }
            gst::MessageView::DurationChanged(_) => Some(BusEvent::DurationChanged),
            gst::MessageView::AsyncDone(_) => Some(BusEvent::AsyncDone),
            _ => None,
        }
    }

    fn execute(&mut self, effect: &Effect) {
        match effect {
            Effect::None => {}
            Effect::Restart => {
                if let Err(err) = self.restart_stream() {
                    error!("cannot restart stream (can't seek): {err:#?}");
                }
            }
            Effect::Halt => {
                if let Err(err) = self.player.set_state(gst::State::Paused) {
                    warn!("cannot pause at the end of the stream: {err}");
                }
                self.paused.store(true, Ordering::SeqCst);
            }
            Effect::Fatal(message) => {
                error!("bus returned an error: {message}");
                if let Err(err) = self.player.set_state(gst::State::Null) {
                    error!("cannot stop the failed pipeline: {err}");
                }
                self.paused.store(true, Ordering::SeqCst);
            }
            Effect::RefreshDuration => self.refresh_media_info(),
        }
    }

    fn restart_stream(&mut self) -> Result<(), Error> {
        self.seek_raw(Duration::ZERO, false)?;
        self.player.set_state(gst::State::Playing)?;
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn refresh_media_info(&mut self) {
        if let Some(caps) = self.video_pad.current_caps() {
            if let Some(s) = caps.structure(0) {
                if let (Ok(width), Ok(height)) = (s.get::<i32>("width"), s.get::<i32>("height")) {
                    self.state.width = width.max(0) as u32;
                    self.state.height = height.max(0) as u32;
                }
            }
        }
        self.state.has_video = self.player.property::<i32>("n-video") > 0;
        self.state.has_audio = self.player.property::<i32>("n-audio") > 0;
        if self.update_duration().is_none() {
            debug!("duration not known yet");
        }
    }

    fn seek_raw(&self, position: Duration, accurate: bool) -> Result<(), Error> {
        self.player.seek(
            1.0,
            gst::SeekFlags::FLUSH
                | gst::SeekFlags::KEY_UNIT
                | if accurate {
                    gst::SeekFlags::ACCURATE
                } else {
                    gst::SeekFlags::empty()
                },
            gst::SeekType::Set,
            gst::ClockTime::from_nseconds(position.as_nanos() as u64),
            gst::SeekType::End,
            gst::ClockTime::ZERO,
        )?;
        Ok(())
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), Error> {
        let Some(position) = self.player.query_position::<gst::ClockTime>() else {
            return Err(Error::Duration);
        };
        match direction {
            Direction::Forward => self.player.seek(
                1.0,
                gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE,
                gst::SeekType::Set,
                position,
                gst::SeekType::End,
                gst::ClockTime::ZERO,
            )?,
            Direction::Reverse => self.player.seek(
                -1.0,
                gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE,
                gst::SeekType::Set,
                gst::ClockTime::ZERO,
                gst::SeekType::Set,
                position,
            )?,
        }
        self.state.direction = direction;
        Ok(())
    }

    /// Returns the newest frame if one arrived since the last call.
    pub fn take_frame(&self) -> Option<img::Handle> {
        if !self.upload_frame.swap(false, Ordering::SeqCst) {
            return None;
        }
        let mut frame = self.frame.lock().ok()?;
        frame.take_handle()
    }

    /// Set the subtitle URI to display.
    pub fn set_subtitle_uri(&mut self, uri: &url::Url) -> Result<(), Error> {
        let playing = self.state.is_playing();
        self.player.set_state(gst::State::Ready)?;
        self.player.set_property("suburi", uri.as_str());
        if playing {
            self.play()
        } else {
            self.stop()
        }
    }

    /// Set whether the subtitle stream is rendered.
    pub fn set_subtitles_enabled(&mut self, enabled: bool) -> Result<(), Error> {
        let flags = self.player.property_value("flags");
        let flags_class = glib::FlagsClass::with_type(flags.type_()).ok_or(Error::Cast)?;
        let flags = flags_class.builder_with_value(flags).ok_or(Error::Cast)?;
        let flags = if enabled {
            flags.set_by_nick("text")
        } else {
            flags.unset_by_nick("text")
        }
        .build()
        .ok_or(Error::Cast)?;
        self.player.set_property_from_value("flags", &flags);
        Ok(())
    }

    /// Get whether the subtitle stream is rendered.
    pub fn subtitles_enabled(&self) -> bool {
        let flags = self.player.property_value("flags");
        glib::FlagsClass::with_type(flags.type_())
            .map(|flags_class| flags_class.is_set_by_nick(&flags, "text"))
            .unwrap_or(false)
    }
}

impl Transport for Engine {
    fn snapshot(&self) -> Snapshot {
        self.state.snapshot(self.volume(), self.muted())
    }

    fn play(&mut self) -> Result<(), Error> {
        if let Some(message) = self.state.failure() {
            return Err(Error::Pipeline(message.to_owned()));
        }
        if self.state.eos_pending {
            self.seek(Duration::ZERO, false)?;
        }
        if self.state.direction == Direction::Reverse {
            self.set_direction(Direction::Forward)?;
        }
        self.player.set_state(gst::State::Playing)?;
        self.paused.store(false, Ordering::SeqCst);
        self.state.request(PipelineState::Playing);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Error> {
        self.player.set_state(gst::State::Paused)?;
        self.paused.store(true, Ordering::SeqCst);
        self.state.request(PipelineState::Paused);
        Ok(())
    }

    fn seek(&mut self, position: Duration, accurate: bool) -> Result<(), Error> {
        let target = clamp_seek(position, self.state.duration);
        self.seek_raw(target, accurate)?;
        self.state.seeked(target);
        Ok(())
    }

    fn query_position(&mut self) -> Option<Duration> {
        let position = self
            .player
            .query_position::<gst::ClockTime>()
            .map(|position| Duration::from_nanos(position.nseconds()));
        if position.is_some() {
            self.state.position = position;
        }
        position
    }

    fn update_duration(&mut self) -> Option<Duration> {
        let duration = self
            .player
            .query_duration::<gst::ClockTime>()
            .map(|duration| Duration::from_nanos(duration.nseconds()));
        if duration.is_some() {
            self.state.duration = duration;
        }
        duration
    }

    fn volume(&self) -> f64 {
        self.player.property("volume")
    }

    fn set_volume(&mut self, volume: f64) {
        let muted = self.muted();
        self.player.set_property("volume", volume.clamp(0.0, 1.0));
        self.set_muted(muted); // for some reason gstreamer unmutes when changing volume?
    }

    fn muted(&self) -> bool {
        self.player.property("mute")
    }

    fn set_muted(&mut self, muted: bool) {
        self.player.set_property("mute", muted);
    }

    fn set_looping(&mut self, looping: bool) {
        self.state.looping = looping;
    }

    fn toggle_subtitles(&mut self) -> Result<bool, Error> {
        let enabled = !self.subtitles_enabled();
        self.set_subtitles_enabled(enabled)?;
        Ok(enabled)
    }

    fn cycle_streams(&mut self, kind: StreamKind) -> Result<Option<i32>, Error> {
        let (count, current) = kind.properties();
        let count: i32 = self.player.property(count);
        let Some(next) = next_stream(self.player.property(current), count) else {
            return Ok(None);
        };
        self.player.set_property(current, next);
        Ok(Some(next))
    }

    fn frame_step(&mut self, forward: bool) -> Result<(), Error> {
        if self.state.is_playing() {
            self.stop()?;
        }
        let direction = if forward {
            Direction::Forward
        } else {
            Direction::Reverse
        };
        if direction != self.state.direction {
            self.set_direction(direction)?;
        }
        let step = gst::event::Step::new(gst::format::Buffers::from_u64(1), 1.0, true, false);
        if !self.player.send_event(step) {
            return Err(Error::Pipeline("frame step rejected".to_owned()));
        }
        Ok(())
    }
}
