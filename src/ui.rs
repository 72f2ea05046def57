use crate::assets::{Icon, Icons};
use crate::engine::Engine;
use crate::history::History;
use crate::overlay::{
    KeyCommand, Outcome, Overlay, CONTROLS_SIZE, PLAY_BUTTON_OFFSET, PLAY_BUTTON_SIZE,
    SEEK_FRAME_OFFSET, SEEK_FRAME_SIZE, SEEK_HEIGHT, SEEK_TRACK_OFFSET, SEEK_WIDTH, TITLE_OFFSET,
};
use crate::playback::{Effect, StreamKind, Transport};
use crate::Error;
use iced::keyboard::{self, key::Named, Key};
use iced::widget::{container, image, mouse_area, stack, text, Space};
use iced::{
    event, font, mouse, time, touch, window, Background, Color, ContentFit, Element, Event, Font,
    Length, Padding, Point, Size, Subscription, Task,
};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Interval of the seek-bar progress update.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);
/// Interval at which the bus is polled and new frames are uploaded.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);
pub const PREROLL_TIMEOUT: Duration = Duration::from_secs(5);

const CONTROL_DARK: Color = Color {
    r: 73.0 / 255.0,
    g: 74.0 / 255.0,
    b: 77.0 / 255.0,
    a: 238.0 / 255.0,
};
const CONTROL_LIGHT: Color = Color {
    r: 0.8,
    g: 0.8,
    b: 0.8,
    a: 1.0,
};

/// Startup options of the [`Player`].
#[derive(Debug, Clone)]
pub struct Options {
    pub uri: url::Url,
    pub data_dir: PathBuf,
    pub fullscreen: bool,
    pub looping: bool,
    /// Keep this media out of the recently viewed list.
    pub secret: bool,
    pub subtitles: Option<url::Url>,
    pub volume: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum Message {
    Key(KeyCommand),
    PointerMoved(Point),
    PointerPressed,
    Touched(Point),
    Resized(Size),
    CloseRequested,
    Progress,
    Frame(Instant),
}

/// The player window: video surface with the control overlay on top.
pub struct Player {
    engine: Engine,
    overlay: Overlay,
    icons: Icons,
    history: Option<History>,
    frame: Option<image::Handle>,
    cursor: Point,
    name: String,
}

impl Player {
    /// Opens the media, resumes it from the recently viewed list and starts playing.
    pub fn new(options: Options) -> Result<Self, Error> {
        let mut engine = Engine::new()?;
        engine.set_secret(options.secret);
        engine.set_looping(options.looping);
        engine.load_uri(&options.uri);
        if let Some(subtitles) = &options.subtitles {
            engine.set_subtitle_uri(subtitles)?;
        }
        engine.preroll(PREROLL_TIMEOUT)?;

        if let Some(volume) = options.volume {
            engine.set_volume(volume);
        }

        let history = if options.secret {
            None
        } else {
            open_history()
        };
        let resume = history.as_ref().and_then(|history| {
            history.resume_position(options.uri.as_str(), engine.snapshot().duration)
        });
        if let Some(position) = resume {
            info!("resuming at {position:?}");
            if let Err(err) = engine.seek(position, true) {
                warn!("cannot resume at {position:?}: {err}");
            }
        }
        engine.play()?;

        let snapshot = engine.snapshot();
        let media = Size::new(snapshot.width as f32, snapshot.height as f32);
        let name = media_name(&options.uri);

        Ok(Player {
            overlay: Overlay::new(media, &name, options.fullscreen, Instant::now()),
            icons: Icons::load(&options.data_dir),
            engine,
            history,
            frame: None,
            cursor: Point::ORIGIN,
            name,
        })
    }

    /// Window size matching the media.
    pub fn initial_size(&self) -> Size {
        self.overlay.stage()
    }

    /// Task to run once the window is open.
    pub fn boot(&self) -> Task<Message> {
        if self.overlay.is_fullscreen() {
            set_fullscreen(true)
        } else {
            Task::none()
        }
    }

    pub fn title(&self) -> String {
        self.name.clone()
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        let now = Instant::now();
        match message {
            Message::Key(command) => match self.overlay.handle_key(command, &mut self.engine) {
                Outcome::Quit => return self.quit(),
                Outcome::Fullscreen(fullscreen) => return set_fullscreen(fullscreen),
                Outcome::None => {}
            },
            Message::PointerMoved(position) => {
                self.cursor = position;
                self.overlay.pointer_moved(now);
            }
            Message::PointerPressed => {
                self.overlay
                    .pointer_pressed(self.cursor, &mut self.engine, now);
            }
            Message::Touched(position) => {
                self.cursor = position;
                self.overlay.pointer_pressed(position, &mut self.engine, now);
            }
            Message::Resized(size) => self.overlay.resize(size),
            Message::CloseRequested => return self.quit(),
            Message::Progress => self.overlay.tick(&mut self.engine),
            Message::Frame(now) => self.next_frame(now),
        }
        Task::none()
    }

    fn next_frame(&mut self, now: Instant) {
        for effect in self.engine.poll_bus() {
            match effect {
                Effect::Halt => self.forget_media(),
                Effect::Fatal(message) => error!("playback failed: {message}"),
                _ => {}
            }
        }
        if let Some(frame) = self.engine.take_frame() {
            self.frame = Some(frame);
        }
        self.overlay.sync(&self.engine.snapshot(), now);
    }

    /// Removes the media from the recently viewed list once it was watched to the end.
    fn forget_media(&mut self) {
        let (Some(history), Some(uri)) = (self.history.as_mut(), self.engine.uri()) else {
            return;
        };
        history.remove(uri.as_str());
        if let Err(err) = history.save() {
            warn!("cannot save {}: {err}", history.path().display());
        }
    }

    fn quit(&mut self) -> Task<Message> {
        let position = self.engine.query_position();
        let snapshot = self.engine.snapshot();
        if let (Some(history), Some(uri)) = (self.history.as_mut(), self.engine.uri()) {
            match position {
                Some(position) if !snapshot.ended && snapshot.failure.is_none() => {
                    history.record_unfinished(uri.as_str(), position);
                }
                _ => history.remove(uri.as_str()),
            }
            if let Err(err) = history.save() {
                warn!("cannot save {}: {err}", history.path().display());
            }
        }
        debug!("quitting");
        iced::exit()
    }

    pub fn view(&self) -> Element<'_, Message> {
        let now = Instant::now();
        let video = self.overlay.video();

        let surface: Element<'_, Message> = match &self.frame {
            Some(frame) => image(frame.clone())
                .width(video.width)
                .height(video.height)
                .content_fit(ContentFit::Fill)
                .into(),
            None => Space::new(video.width, video.height).into(),
        };
        let background = container(place(surface, video.position()))
            .width(Length::Fill)
            .height(Length::Fill)
            .style(|_theme| filled(Color::BLACK));

        let opacity = self.overlay.opacity(now);
        let stage: Element<'_, Message> = if opacity <= 0.0 {
            background.into()
        } else {
            stack![background, place(self.controls(opacity), self.overlay.controls_origin())].into()
        };

        if self.overlay.cursor_hidden() {
            mouse_area(stage)
                .interaction(mouse::Interaction::Hidden)
                .into()
        } else {
            stage
        }
    }

    fn controls(&self, opacity: f32) -> Element<'_, Message> {
        let faded = |color: Color| Color {
            a: color.a * opacity,
            ..color
        };

        let panel = self.icon(Icon::Panel, CONTROLS_SIZE, opacity);
        let play = self.icon(self.overlay.play_icon(), PLAY_BUTTON_SIZE, opacity);
        let title = text(self.overlay.title().to_owned())
            .size(24)
            .font(Font {
                weight: font::Weight::Bold,
                ..Font::DEFAULT
            })
            .color(faded(CONTROL_DARK));

        stack![
            panel,
            place(play, Point::ORIGIN + PLAY_BUTTON_OFFSET),
            place(title, Point::ORIGIN + TITLE_OFFSET),
            place(
                rectangle(SEEK_FRAME_SIZE, faded(CONTROL_DARK)),
                Point::ORIGIN + SEEK_FRAME_OFFSET
            ),
            place(
                rectangle(Size::new(SEEK_WIDTH, SEEK_HEIGHT), faded(CONTROL_LIGHT)),
                Point::ORIGIN + SEEK_TRACK_OFFSET
            ),
            place(
                rectangle(
                    Size::new(self.overlay.seek_fill(), SEEK_HEIGHT),
                    faded(CONTROL_DARK)
                ),
                Point::ORIGIN + SEEK_TRACK_OFFSET
            ),
        ]
        .width(CONTROLS_SIZE.width)
        .height(CONTROLS_SIZE.height)
        .into()
    }

    fn icon(&self, icon: Icon, size: Size, opacity: f32) -> Element<'_, Message> {
        match self.icons.get(icon) {
            Some(handle) => image(handle.clone())
                .width(size.width)
                .height(size.height)
                .opacity(opacity)
                .into(),
            None => Space::new(size.width, size.height).into(),
        }
    }

    pub fn subscription(&self) -> Subscription<Message> {
        Subscription::batch([
            keyboard::on_key_press(|key, _modifiers| key_command(&key).map(Message::Key)),
            event::listen_with(|event, _status, _window| match event {
                Event::Mouse(mouse::Event::CursorMoved { position }) => {
                    Some(Message::PointerMoved(position))
                }
                Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                    Some(Message::PointerPressed)
                }
                Event::Touch(touch::Event::FingerPressed { position, .. }) => {
                    Some(Message::Touched(position))
                }
                Event::Window(window::Event::Resized(size)) => Some(Message::Resized(size)),
                Event::Window(window::Event::CloseRequested) => Some(Message::CloseRequested),
                _ => None,
            }),
            time::every(PROGRESS_INTERVAL).map(|_| Message::Progress),
            time::every(FRAME_INTERVAL).map(Message::Frame),
        ])
    }
}

/// Window settings for a stage of `size`; the window never gets smaller
/// than the control panel.
pub fn window_settings(size: Size) -> window::Settings {
    window::Settings {
        size: Size::new(
            size.width.max(CONTROLS_SIZE.width),
            size.height.max(CONTROLS_SIZE.height),
        ),
        min_size: Some(CONTROLS_SIZE),
        exit_on_close_request: false,
        ..window::Settings::default()
    }
}

fn open_history() -> Option<History> {
    let path = History::default_path()?;
    match History::open(&path) {
        Ok(history) => Some(history),
        Err(err) => {
            warn!("cannot read {}: {err}", path.display());
            None
        }
    }
}

fn set_fullscreen(fullscreen: bool) -> Task<Message> {
    let mode = if fullscreen {
        window::Mode::Fullscreen
    } else {
        window::Mode::Windowed
    };
    window::get_latest().and_then(move |id| window::change_mode(id, mode))
}

/// Positions `content` at `at` inside its parent.
fn place<'a>(content: impl Into<Element<'a, Message>>, at: Point) -> Element<'a, Message> {
    let offset = at - Point::ORIGIN;
    container(content)
        .padding(Padding {
            top: offset.y.max(0.0),
            left: offset.x.max(0.0),
            right: 0.0,
            bottom: 0.0,
        })
        .into()
}

fn rectangle<'a>(size: Size, color: Color) -> Element<'a, Message> {
    container(Space::new(size.width, size.height))
        .style(move |_theme| filled(color))
        .into()
}

fn filled(color: Color) -> container::Style {
    container::Style {
        background: Some(Background::Color(color)),
        ..container::Style::default()
    }
}

/// Key bindings of the player window.
pub fn key_command(key: &Key) -> Option<KeyCommand> {
    let command = match key.as_ref() {
        Key::Named(Named::Escape) | Key::Character("q") => KeyCommand::Quit,
        Key::Character("f") => KeyCommand::ToggleFullscreen,
        Key::Named(Named::Space) | Key::Character(" ") => KeyCommand::TogglePlaying,
        Key::Character("8") => KeyCommand::ToggleMute,
        Key::Character("9") => KeyCommand::VolumeDown,
        Key::Character("0") => KeyCommand::VolumeUp,
        Key::Named(Named::ArrowLeft) => KeyCommand::Seek(-10),
        Key::Named(Named::ArrowRight) => KeyCommand::Seek(10),
        Key::Named(Named::ArrowDown) => KeyCommand::Seek(-60),
        Key::Named(Named::ArrowUp) => KeyCommand::Seek(60),
        Key::Character("l") => KeyCommand::ToggleLoop,
        Key::Character("s") => KeyCommand::ToggleSubtitles,
        Key::Character("a") => KeyCommand::CycleStreams(StreamKind::Audio),
        Key::Character("v") => KeyCommand::CycleStreams(StreamKind::Video),
        Key::Character("t") => KeyCommand::CycleStreams(StreamKind::Text),
        Key::Character(".") => KeyCommand::FrameStep { forward: true },
        Key::Character(",") => KeyCommand::FrameStep { forward: false },
        _ => return None,
    };
    Some(command)
}

/// Parses `media` as a URI, falling back to a local file path.
pub fn media_uri(media: &str) -> Result<url::Url, Error> {
    match url::Url::parse(media) {
        // single letter schemes are windows drive letters
        Ok(uri) if uri.scheme().len() > 1 => Ok(uri),
        _ => {
            let path = std::fs::canonicalize(media)?;
            url::Url::from_file_path(path).map_err(|_| Error::Uri)
        }
    }
}

/// File name of the media, used as window and overlay title.
pub fn media_name(uri: &url::Url) -> String {
    uri.to_file_path()
        .ok()
        .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
        .or_else(|| {
            uri.path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|segment| !segment.is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| uri.to_string())
}
