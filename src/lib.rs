mod assets;
mod controls;
mod engine;
mod history;
mod overlay;
mod playback;
mod ui;

use gstreamer as gst;
use std::path::PathBuf;
use thiserror::Error;

pub use assets::{Icon, Icons};
pub use controls::{Controls, Fade, Visibility};
pub use engine::Engine;
pub use history::{Entry, History};
pub use overlay::{KeyCommand, Outcome, Overlay};
pub use playback::{
    BusEvent, Direction, Effect, EngineState, PipelineState, Playback, Snapshot, StreamKind,
    Transport,
};
pub use ui::{key_command, media_name, media_uri, window_settings, Message, Options, Player};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Glib(#[from] glib::Error),
    #[error("{0}")]
    Bool(#[from] glib::BoolError),
    #[error("failed to get the gstreamer bus")]
    Bus,
    #[error("{0}")]
    StateChange(#[from] gst::StateChangeError),
    #[error("failed to cast gstreamer element")]
    Cast,
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("invalid URI")]
    Uri,
    #[error("failed to get media capabilities")]
    Caps,
    #[error("failed to query media duration or position")]
    Duration,
    #[error("pipeline error: {0}")]
    Pipeline(String),
    #[error("icon file doesn't exist: {}", .0.display())]
    AssetMissing(PathBuf),
}
