//! Admin operations.
//!
//! Each operation maps to one access-list or catalog mutation. Changes to
//! the access lists are re-checked against every live session right away,
//! and both kinds of change are written back to the settings file.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use beatlobby_lobby::Song;
use beatlobby_protocol::PlayerInfo;
use beatlobby_session::{AccessList, Admission, SessionId, SessionState};

use crate::handler::NOT_ALLOWED;
use crate::server::ServerState;
use crate::ServerError;

/// One row of the `clients` listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSummary {
    pub session_id: SessionId,
    pub addr: SocketAddr,
    pub state: SessionState,
    pub player: Option<PlayerInfo>,
}

/// Handle for admin operations on a running server. Cheap to clone.
#[derive(Clone)]
pub struct Admin {
    state: Arc<ServerState>,
}

impl Admin {
    pub(crate) fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    /// Every session currently in the set, in accept order.
    pub async fn clients(&self) -> Vec<ClientSummary> {
        self.state
            .sessions
            .lock()
            .await
            .iter()
            .map(|s| ClientSummary {
                session_id: s.id(),
                addr: s.addr(),
                state: s.state(),
                player: s.player().cloned(),
            })
            .collect()
    }

    /// Bans a player id or IP address and kicks matching sessions.
    /// Returns `false` if the entry was already banned.
    pub async fn ban(&self, entry: &str) -> Result<bool, ServerError> {
        self.update_access(|access| access.ban(entry)).await
    }

    pub async fn unban(&self, entry: &str) -> Result<bool, ServerError> {
        self.update_access(|access| access.unban(entry)).await
    }

    /// Turns allow-list mode on or off. Turning it on kicks everyone not
    /// on the list.
    pub async fn set_allow_list(&self, enabled: bool) -> Result<(), ServerError> {
        self.update_access(|access| {
            access.set_allow_list_enabled(enabled);
            true
        })
        .await
        .map(drop)
    }

    pub async fn allow(&self, entry: &str) -> Result<bool, ServerError> {
        self.update_access(|access| access.allow(entry)).await
    }

    pub async fn disallow(&self, entry: &str) -> Result<bool, ServerError> {
        self.update_access(|access| access.disallow(entry)).await
    }

    /// Loads the song in `dir` and appends it to the catalog.
    pub async fn add_song(&self, dir: &Path) -> Result<Song, ServerError> {
        let song = Song::load(dir)?;

        let ids = {
            let mut lobby = self.state.lobby.lock().await;
            let sessions = self.state.sessions.lock().await;
            lobby.add_song(song.clone(), &sessions, &self.state.broadcaster)?;
            lobby.catalog().external_ids()
        };
        self.persist_song_ids(ids).await?;
        Ok(song)
    }

    /// Removes a song by its external id.
    pub async fn remove_song(&self, external_id: u32) -> Result<Song, ServerError> {
        let (song, ids) = {
            let mut lobby = self.state.lobby.lock().await;
            let mut sessions = self.state.sessions.lock().await;
            let song = lobby.remove_song(external_id, &mut sessions, &self.state.broadcaster)?;
            (song, lobby.catalog().external_ids())
        };
        self.persist_song_ids(ids).await?;
        Ok(song)
    }

    /// The catalog in selection order.
    pub async fn songs(&self) -> Vec<Song> {
        self.state.lobby.lock().await.catalog().iter().cloned().collect()
    }

    /// The access lists as they are now.
    pub async fn access(&self) -> AccessList {
        self.state.settings.lock().await.access.clone()
    }

    /// Starts a graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        self.state.shutdown.cancel();
    }

    /// Applies `change`, saves if anything changed, and kicks sessions the
    /// new lists reject.
    async fn update_access<F>(&self, change: F) -> Result<bool, ServerError>
    where
        F: FnOnce(&mut AccessList) -> bool,
    {
        let access = {
            let mut settings = self.state.settings.lock().await;
            if !change(&mut settings.access) {
                return Ok(false);
            }
            if let Some(path) = &self.state.settings_path {
                settings.save(path)?;
            }
            settings.access.clone()
        };

        let notice = self.state.kick_notice(NOT_ALLOWED);
        let kicked = self
            .state
            .sessions
            .lock()
            .await
            .kick_where(notice, |s| !access.is_allowed(s.addr().ip(), s.player_id()));
        if !kicked.is_empty() {
            tracing::info!(count = kicked.len(), "kicked sessions after access change");
        }
        Ok(true)
    }

    async fn persist_song_ids(&self, ids: Vec<u32>) -> Result<(), ServerError> {
        let mut settings = self.state.settings.lock().await;
        settings.songs.ids = ids;
        if let Some(path) = &self.state.settings_path {
            settings.save(path)?;
        }
        Ok(())
    }
}
