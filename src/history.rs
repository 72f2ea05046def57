//! Recently viewed media, remembered together with the position playback
//! stopped at so the next run can resume there.
//!
//! The file holds one entry per line, most recent first:
//! `<position in nanoseconds>\t<uri>`.

use crate::Error;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Most entries kept in the list.
pub const MAX_ENTRIES: usize = 10;
/// Media closer than this to its end starts over instead of resuming.
pub const RESUME_MARGIN: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub uri: String,
    pub position: Duration,
}

#[derive(Debug, Clone)]
pub struct History {
    path: PathBuf,
    entries: Vec<Entry>,
}

impl History {
    /// `<config dir>/snap_player/history`.
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|dir| dir.join("snap_player").join("history"))
    }

    /// Reads the list at `path`; a missing file is an empty list.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => parse(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        debug!("{} recently viewed entries in {}", entries.len(), path.display());
        Ok(History { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// URIs, most recent first.
    pub fn recently_viewed(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.uri.as_str())
    }

    pub fn position(&self, uri: &str) -> Option<Duration> {
        self.entries
            .iter()
            .find(|entry| entry.uri == uri)
            .map(|entry| entry.position)
    }

    /// Where to resume `uri`, unless it was left right at the start or the end.
    pub fn resume_position(&self, uri: &str, duration: Option<Duration>) -> Option<Duration> {
        let position = self.position(uri).filter(|position| !position.is_zero())?;
        match duration {
            Some(duration) if position + RESUME_MARGIN >= duration => None,
            _ => Some(position),
        }
    }

    /// Moves `uri` to the front of the list, remembering where it stopped.
    pub fn record_unfinished(&mut self, uri: &str, position: Duration) {
        self.remove(uri);
        self.entries.insert(
            0,
            Entry {
                uri: uri.to_owned(),
                position,
            },
        );
        self.entries.truncate(MAX_ENTRIES);
    }

    /// Forgets `uri`, typically once it was watched to the end.
    pub fn remove(&mut self, uri: &str) {
        self.entries.retain(|entry| entry.uri != uri);
    }

    pub fn save(&self) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text: String = self
            .entries
            .iter()
            .map(|entry| format!("{}\t{}\n", entry.position.as_nanos(), entry.uri))
            .collect();
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

fn parse(text: &str) -> Vec<Entry> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parsed = line.split_once('\t').and_then(|(position, uri)| {
                let position = position.trim().parse::<u64>().ok()?;
                Some(Entry {
                    uri: uri.trim().to_owned(),
                    position: Duration::from_nanos(position),
                })
            });
            if parsed.is_none() {
                warn!("skipping malformed history line {line:?}");
            }
            parsed
        })
        .take(MAX_ENTRIES)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::open(dir.path().join("history")).unwrap();
        assert_eq!(history.recently_viewed().count(), 0);
    }

    #[test]
    fn records_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history");

        let mut history = History::open(&path).unwrap();
        history.record_unfinished("file:///a.mkv", Duration::from_secs(10));
        history.record_unfinished("file:///b.mkv", Duration::from_secs(20));
        history.record_unfinished("file:///a.mkv", Duration::from_secs(30));
        history.save().unwrap();

        let history = History::open(&path).unwrap();
        let uris: Vec<_> = history.recently_viewed().collect();
        assert_eq!(uris, ["file:///a.mkv", "file:///b.mkv"]);
        assert_eq!(history.position("file:///a.mkv"), Some(Duration::from_secs(30)));
    }

    #[test]
    fn list_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = History::open(dir.path().join("history")).unwrap();
        for i in 0..(MAX_ENTRIES + 5) {
            history.record_unfinished(&format!("file:///{i}.mkv"), Duration::from_secs(1));
        }
        assert_eq!(history.recently_viewed().count(), MAX_ENTRIES);
        assert_eq!(history.recently_viewed().next(), Some("file:///14.mkv"));
    }

    #[test]
    fn resume_skips_finished_media() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = History::open(dir.path().join("history")).unwrap();
        history.record_unfinished("file:///a.mkv", Duration::from_secs(58));
        history.record_unfinished("file:///b.mkv", Duration::ZERO);

        let duration = Some(Duration::from_secs(60));
        assert_eq!(history.resume_position("file:///a.mkv", duration), None);
        assert_eq!(
            history.resume_position("file:///a.mkv", Some(Duration::from_secs(600))),
            Some(Duration::from_secs(58))
        );
        assert_eq!(history.resume_position("file:///b.mkv", duration), None);
        assert_eq!(history.resume_position("file:///c.mkv", duration), None);

        history.remove("file:///a.mkv");
        assert_eq!(history.position("file:///a.mkv"), None);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let entries = parse("12\tfile:///a.mkv\nnot a line\n\nabc\tfile:///b.mkv\n");
        assert_eq!(
            entries,
            [Entry {
                uri: "file:///a.mkv".to_owned(),
                position: Duration::from_nanos(12),
            }]
        );
    }
}
