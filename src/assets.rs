use crate::Error;
use iced::widget::image as img;
use log::warn;
use std::path::{Path, PathBuf};

/// Icons drawn by the control panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Icon {
    Panel,
    Play,
    Pause,
}

impl Icon {
    pub const ALL: [Icon; 3] = [Icon::Panel, Icon::Play, Icon::Pause];

    pub fn file_name(self) -> &'static str {
        match self {
            Icon::Panel => "vid-panel.png",
            Icon::Play => "media-actions-start.png",
            Icon::Pause => "media-actions-pause.png",
        }
    }

    fn index(self) -> usize {
        match self {
            Icon::Panel => 0,
            Icon::Play => 1,
            Icon::Pause => 2,
        }
    }

    /// Path of the icon inside `data_dir`, if the file exists.
    pub fn resolve(self, data_dir: &Path) -> Result<PathBuf, Error> {
        let path = data_dir.join(self.file_name());
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::AssetMissing(path))
        }
    }
}

/// Icon table resolved once at startup. Missing files leave a blank control.
#[derive(Debug, Clone, Default)]
pub struct Icons {
    handles: [Option<img::Handle>; 3],
}

impl Icons {
    pub fn load(data_dir: &Path) -> Self {
        let mut icons = Icons::default();
        for icon in Icon::ALL {
            match icon.resolve(data_dir) {
                Ok(path) => icons.handles[icon.index()] = Some(img::Handle::from_path(path)),
                Err(err) => warn!("{err}, are you sure the player is installed correctly?"),
            }
        }
        icons
    }

    pub fn get(&self, icon: Icon) -> Option<&img::Handle> {
        self.handles[icon.index()].as_ref()
    }
}
