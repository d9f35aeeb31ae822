//! Core protocol types.
//!
//! Inbound frames from a player decode into [`ClientMessage`]; everything
//! the lobby sends out is a [`ServerCommand`]. Both are internally tagged
//! by a `"type"` field so observers written in any language can dispatch
//! on a single key.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A player's platform identifier, as reported by the client in `Hello`.
///
/// Serialized as the bare number (`#[serde(transparent)]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of one player as shown on the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub player_id: PlayerId,
    pub player_name: String,
    /// Live score for the song in progress.
    #[serde(default)]
    pub player_score: u32,
    /// Fraction of the song completed, `0.0..=1.0`.
    #[serde(default)]
    pub player_progress: f32,
}

impl PlayerInfo {
    /// A fresh identity with zero score and progress.
    pub fn new(player_id: PlayerId, player_name: impl Into<String>) -> Self {
        Self {
            player_id,
            player_name: player_name.into(),
            player_score: 0,
            player_progress: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Difficulty
// ---------------------------------------------------------------------------

/// Difficulty tiers, ordered from easiest to hardest.
///
/// The derived `Ord` follows declaration order, which is what
/// preferred-difficulty resolution compares against.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
    Expert,
    ExpertPlus,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Easy => "Easy",
            Self::Normal => "Normal",
            Self::Hard => "Hard",
            Self::Expert => "Expert",
            Self::ExpertPlus => "ExpertPlus",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// ClientMessage: player → server
// ---------------------------------------------------------------------------

/// Messages a player sends on its own connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Must be the first frame on a new connection. Carries the player's
    /// identity; until it arrives the session is invisible to the lobby.
    Hello { player: PlayerInfo },

    /// Live score and progress while playing.
    UpdatePlayer { score: u32, progress: f32 },

    /// Vote for the next song by its catalog level id.
    Vote { level_id: String },

    /// The player reached the end of the song (or gave up).
    SongFinished,

    /// The player is leaving.
    Disconnect { reason: String },
}

// ---------------------------------------------------------------------------
// ServerCommand: server → players and observers
// ---------------------------------------------------------------------------

/// Commands broadcast by the lobby.
///
/// Constructed, encoded once, fanned out, discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerCommand {
    /// Whole seconds left before the selected song starts.
    SetLobbyCountdown { seconds: u32 },

    /// The roster. While a song plays it is sorted by descending score and
    /// carries the song's length and elapsed play time in seconds.
    SetPlayerRoster {
        players: Vec<PlayerInfo>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selected_song_duration: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selected_song_play_time: Option<f64>,
    },

    /// A song has been picked; clients show it as "starting soon".
    SetSelectedSong { difficulty: Difficulty },

    /// Start playing the selected song now.
    StartSelectedSong { difficulty: Difficulty },

    /// The catalog changed; clients should fetch these external ids.
    RefreshCatalog { songs: Vec<u32> },

    /// Sent to a single session right before the server closes it.
    Kicked { reason: String },
}

impl ServerCommand {
    /// The wire tag of this command.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetLobbyCountdown { .. } => "SetLobbyCountdown",
            Self::SetPlayerRoster { .. } => "SetPlayerRoster",
            Self::SetSelectedSong { .. } => "SetSelectedSong",
            Self::StartSelectedSong { .. } => "StartSelectedSong",
            Self::RefreshCatalog { .. } => "RefreshCatalog",
            Self::Kicked { .. } => "Kicked",
        }
    }
}
