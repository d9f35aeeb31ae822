//! # beatlobby
//!
//! Authoritative server for a multiplayer music-game lobby.
//!
//! Players connect over TCP, vote on a song, and play it together while
//! the server keeps everyone's countdown, roster and song choice in sync.
//! Passive observers can follow along over WebSocket, and the server
//! advertises itself to directory servers so players can find it.
//!
//! ```text
//! acceptor ──→ sessions ←── lobby tick ──→ broadcaster ──→ per-session writers
//!                  ↑                            └────────→ observer hub
//!               admin / console
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use beatlobby::{LobbyServer, Settings};
//!
//! # async fn start() -> Result<(), beatlobby::ServerError> {
//! let settings = Settings::load_or_create("beatlobby.toml")?;
//! let server = LobbyServer::builder(settings)
//!     .settings_path("beatlobby.toml")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

pub mod admin;
pub mod config;
pub mod console;
mod error;
mod handler;
pub mod logging;
mod server;

pub use admin::{Admin, ClientSummary};
pub use config::{ConfigError, Settings};
pub use error::ServerError;
pub use server::{LobbyServer, LobbyServerBuilder};
