//! Error types for the lobby layer.

use std::path::PathBuf;

use beatlobby_protocol::ProtocolError;

/// Errors that can occur in the lobby, its catalog, or while broadcasting.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// One catalog entry could not be loaded. The loader logs this and
    /// skips the entry; it never aborts the whole load.
    #[error("invalid catalog entry {path}: {reason}")]
    Catalog { path: PathBuf, reason: String },

    /// Reading the catalog directory itself failed.
    #[error("catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A song with this external id is already in the catalog.
    #[error("song {0} is already in the catalog")]
    DuplicateSong(u32),

    /// No song with this external id is in the catalog.
    #[error("song {0} is not in the catalog")]
    SongNotFound(u32),

    /// The lobby points at a catalog index that does not exist.
    #[error("selected song index {index} out of range (catalog has {len})")]
    SelectionOutOfRange { index: usize, len: usize },

    /// The lobby is playing but has no selected song.
    #[error("lobby is playing without a selected song")]
    NoSelection,

    /// Encoding an outbound command failed.
    #[error("broadcast encoding failed: {0}")]
    Encode(#[from] ProtocolError),
}
