//! The song catalog: playable tracks and the loader that builds it.
//!
//! # On-disk layout
//!
//! ```text
//! <catalog dir>/
//!   1234/            ← directory named after the song's external id
//!     info.json      ← title, subtitle, author, duration, difficulties
//!   5678/
//!     Some Song/     ← archives often unpack one level deeper
//!       info.json
//! ```
//!
//! Entries whose metadata cannot be read are logged and skipped; they
//! never enter the catalog.

use std::fs;
use std::path::{Path, PathBuf};

use beatlobby_protocol::Difficulty;
use serde::{Deserialize, Serialize};

use crate::LobbyError;

const INFO_FILE: &str = "info.json";

/// One difficulty tier of a song and where its notes live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyLevel {
    pub difficulty: Difficulty,
    /// Notes file for this tier, relative to the song directory.
    #[serde(default, alias = "jsonPath")]
    pub notes: String,
}

/// A playable track. Immutable once it is in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    /// Identifier clients vote with.
    pub level_id: String,
    /// Identifier in the external song repository; what admins and
    /// `RefreshCatalog` refer to.
    pub external_id: u32,
    pub title: String,
    pub subtitle: String,
    pub author: String,
    /// Total length in seconds.
    pub duration: f64,
    /// Tiers in the order the song lists them.
    pub difficulties: Vec<DifficultyLevel>,
}

/// `info.json` as written by song packs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SongInfo {
    #[serde(default)]
    level_id: Option<String>,
    #[serde(default)]
    external_id: Option<u32>,
    #[serde(alias = "songName")]
    title: String,
    #[serde(default, alias = "songSubName")]
    subtitle: String,
    #[serde(default, alias = "authorName")]
    author: String,
    duration: f64,
    #[serde(alias = "difficultyLevels")]
    difficulties: Vec<DifficultyLevel>,
}

impl Song {
    /// Loads one song from its directory.
    ///
    /// `info.json` is looked up in `dir` itself, then in its immediate
    /// subdirectories. The external id comes from `info.json` if present,
    /// otherwise from the directory name.
    pub fn load(dir: &Path) -> Result<Self, LobbyError> {
        let info_path = find_info(dir).ok_or_else(|| LobbyError::Catalog {
            path: dir.to_path_buf(),
            reason: format!("no {INFO_FILE} found"),
        })?;

        let invalid = |reason: String| LobbyError::Catalog {
            path: info_path.clone(),
            reason,
        };

        let raw = fs::read_to_string(&info_path).map_err(|e| invalid(e.to_string()))?;
        let info: SongInfo = serde_json::from_str(&raw).map_err(|e| invalid(e.to_string()))?;

        let external_id = match info.external_id {
            Some(id) => id,
            None => dir
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| invalid("no external id".into()))?,
        };

        let song = Song {
            level_id: info
                .level_id
                .unwrap_or_else(|| format!("custom_level_{external_id}")),
            external_id,
            title: info.title,
            subtitle: info.subtitle,
            author: info.author,
            duration: info.duration,
            difficulties: info.difficulties,
        };
        song.validate().map_err(invalid)?;
        Ok(song)
    }

    fn validate(&self) -> Result<(), String> {
        if self.difficulties.is_empty() {
            return Err("song has no difficulty levels".into());
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(format!("invalid duration {}", self.duration));
        }
        Ok(())
    }
}

fn find_info(dir: &Path) -> Option<PathBuf> {
    let direct = dir.join(INFO_FILE);
    if direct.is_file() {
        return Some(direct);
    }
    let mut nested: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path().join(INFO_FILE))
        .filter(|p| p.is_file())
        .collect();
    nested.sort();
    nested.into_iter().next()
}

/// The ordered set of playable songs.
///
/// Indices into the catalog are what the lobby's selected/last song refer
/// to; [`remove_by_external_id`](Self::remove_by_external_id) reports the
/// removed index so the lobby can shift its own.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    songs: Vec<Song>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from already-loaded songs, dropping invalid entries
    /// and duplicate external ids.
    pub fn from_songs(songs: impl IntoIterator<Item = Song>) -> Self {
        let mut catalog = Self::new();
        for song in songs {
            if let Err(e) = catalog.add(song) {
                tracing::warn!(error = %e, "skipping catalog entry");
            }
        }
        catalog
    }

    /// Loads the catalog from `dir`.
    ///
    /// With an empty `ids` list every subdirectory is loaded, sorted by
    /// name. Otherwise only `dir/<id>` for each listed id, in list order.
    /// Entries that fail to load are skipped with a warning.
    ///
    /// # Errors
    /// Only if `dir` itself cannot be read.
    pub fn load_dir(dir: &Path, ids: &[u32]) -> Result<Self, LobbyError> {
        let dirs: Vec<PathBuf> = if ids.is_empty() {
            let mut dirs: Vec<PathBuf> = fs::read_dir(dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            dirs.sort();
            dirs
        } else {
            ids.iter().map(|id| dir.join(id.to_string())).collect()
        };

        let mut catalog = Self::new();
        for song_dir in dirs {
            let loaded = Song::load(&song_dir).and_then(|song| catalog.add(song));
            if let Err(e) = loaded {
                tracing::warn!(error = %e, "skipping catalog entry");
            }
        }

        tracing::info!(songs = catalog.len(), dir = %dir.display(), "catalog loaded");
        Ok(catalog)
    }

    /// Appends a song.
    ///
    /// # Errors
    /// - [`LobbyError::DuplicateSong`]: external id already present
    /// - [`LobbyError::Catalog`]: the song has no difficulties or a bad duration
    pub fn add(&mut self, song: Song) -> Result<usize, LobbyError> {
        if self.position_by_external_id(song.external_id).is_some() {
            return Err(LobbyError::DuplicateSong(song.external_id));
        }
        song.validate().map_err(|reason| LobbyError::Catalog {
            path: PathBuf::from(song.external_id.to_string()),
            reason,
        })?;
        self.songs.push(song);
        Ok(self.songs.len() - 1)
    }

    /// Removes the song with `external_id`, returning its former index.
    pub fn remove_by_external_id(&mut self, external_id: u32) -> Option<(usize, Song)> {
        let index = self.position_by_external_id(external_id)?;
        Some((index, self.songs.remove(index)))
    }

    pub fn get(&self, index: usize) -> Option<&Song> {
        self.songs.get(index)
    }

    pub fn position_by_level_id(&self, level_id: &str) -> Option<usize> {
        self.songs.iter().position(|s| s.level_id == level_id)
    }

    pub fn position_by_external_id(&self, external_id: u32) -> Option<usize> {
        self.songs.iter().position(|s| s.external_id == external_id)
    }

    /// External ids in catalog order (the `RefreshCatalog` payload).
    pub fn external_ids(&self) -> Vec<u32> {
        self.songs.iter().map(|s| s.external_id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Song> + '_ {
        self.songs.iter()
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }
}
