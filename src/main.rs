use clap::Parser;
use log::error;
use snap_player::{media_uri, window_settings, Error, Options, Player};
use std::path::PathBuf;

/// Minimal video player with an animated control overlay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media file path or URI to play
    #[arg(value_name = "MEDIA")]
    media: String,

    /// Directory holding the control icons
    #[arg(
        short = 'd',
        long = "data-dir",
        value_name = "DIR",
        env = "SNAP_PLAYER_DATA_DIR",
        default_value = "data"
    )]
    data_dir: PathBuf,

    /// Start in fullscreen mode
    #[arg(short = 'F', long = "fullscreen")]
    fullscreen: bool,

    /// Restart the media when it ends
    #[arg(short = 'l', long = "loop")]
    looping: bool,

    /// Don't remember this media in the recently viewed list
    #[arg(short = 's', long = "secret")]
    secret: bool,

    /// Subtitle file path or URI
    #[arg(long = "subtitles", value_name = "SUBTITLES")]
    subtitles: Option<String>,

    /// Initial volume, from 0.0 to 1.0
    #[arg(long = "volume", value_name = "VOLUME")]
    volume: Option<f64>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbosity: u8,
}

impl Args {
    fn options(&self) -> Result<Options, Error> {
        Ok(Options {
            uri: media_uri(&self.media)?,
            data_dir: self.data_dir.clone(),
            fullscreen: self.fullscreen,
            looping: self.looping,
            secret: self.secret,
            subtitles: self.subtitles.as_deref().map(media_uri).transpose()?,
            volume: self.volume,
        })
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    // RUST_LOG still wins over the -v count
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> iced::Result {
    let args = Args::parse();
    init_logging(args.verbosity);

    let player = match args.options().and_then(Player::new) {
        Ok(player) => player,
        Err(err) => {
            error!("cannot play {}: {err}", args.media);
            std::process::exit(1);
        }
    };

    let size = player.initial_size();
    let boot = player.boot();

    iced::application(Player::title, Player::update, Player::view)
        .subscription(Player::subscription)
        .window(window_settings(size))
        .run_with(move || (player, boot))
}
