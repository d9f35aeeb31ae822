//! The lobby: one shared room that moves every connected player through
//! voting, preparing and playing a song together.
//!
//! # Key types
//!
//! - [`Lobby`]: the tick-driven state machine
//! - [`Catalog`] / [`Song`]: the playable tracks
//! - [`SongOrder`]: how the next song is chosen
//! - [`Broadcaster`] / [`ObserverHub`]: encode-once fan-out to players
//!   and passive observers
//! - [`Phase`] / [`LobbyState`] / [`LobbyConfig`]: lobby state and settings
//!
//! `Lobby::tick` never touches a socket. Everything it sends goes through
//! the [`Broadcaster`] into per-session queues that writer tasks drain.

mod broadcast;
mod catalog;
mod error;
mod lobby;
mod selection;
mod state;

pub use broadcast::{Broadcaster, ObserverHub};
pub use catalog::{Catalog, DifficultyLevel, Song};
pub use error::LobbyError;
pub use lobby::Lobby;
pub use selection::{SongOrder, preferred_difficulty, select_song};
pub use state::{LobbyConfig, LobbyState, Phase};
