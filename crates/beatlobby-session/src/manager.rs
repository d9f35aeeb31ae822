//! The session manager: the shared, ordered set of sessions.
//!
//! # Concurrency note
//!
//! `SessionManager` is not thread-safe by itself. The server wraps it in a
//! single mutex; the acceptor, the per-session tasks, the lobby tick and
//! admin commands all take that lock, so every iteration here sees a
//! consistent snapshot and additions/removals never race with it.
//!
//! Sessions are kept in a `BTreeMap` keyed by [`SessionId`]. Ids are
//! allocated in accept order, so iteration order is session order, which
//! the vote tie-break depends on.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use beatlobby_protocol::PlayerInfo;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{Session, SessionChannels, SessionError, SessionId, SessionState};

/// Manages all sessions.
///
/// ## Lifecycle
///
/// ```text
/// open() ──→ identify() ──→ start_playing() ⇄ finish_song()/stop_playing()
///    │            │                │
///    └────────────┴────────────────┴──→ disconnect() ──→ remove_disconnected()
/// ```
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: BTreeMap<SessionId, Session>,
}

impl SessionManager {
    /// Creates a new, empty session manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a freshly accepted connection in state `Connecting`.
    ///
    /// The returned cancel token is a child of `parent`, so a process-wide
    /// shutdown reaches every session.
    ///
    /// # Errors
    /// [`SessionError::AlreadyExists`] if the id is already in the set.
    pub fn open(
        &mut self,
        id: SessionId,
        addr: SocketAddr,
        parent: &CancellationToken,
    ) -> Result<SessionChannels, SessionError> {
        if self.sessions.contains_key(&id) {
            return Err(SessionError::AlreadyExists(id));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = parent.child_token();

        self.sessions.insert(
            id,
            Session {
                id,
                addr,
                state: SessionState::Connecting,
                player: None,
                vote: None,
                outbound: Some(tx),
                cancel: cancel.clone(),
            },
        );

        tracing::info!(session_id = %id, %addr, "session opened");
        Ok(SessionChannels {
            outbound: rx,
            cancel,
        })
    }

    /// Records the player's identity and moves `Connecting → Connected`.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: unknown id
    /// - [`SessionError::InvalidState`]: the session is not `Connecting`
    pub fn identify(
        &mut self,
        id: SessionId,
        player: PlayerInfo,
    ) -> Result<(), SessionError> {
        let session = self.get_mut(id)?;
        if session.state != SessionState::Connecting {
            return Err(SessionError::InvalidState {
                id,
                state: session.state,
                action: "identify",
            });
        }

        tracing::info!(
            session_id = %id,
            player_id = %player.player_id,
            player_name = %player.player_name,
            "player identified"
        );
        session.player = Some(player);
        session.state = SessionState::Connected;
        Ok(())
    }

    /// Updates live score and progress.
    pub fn update_score(
        &mut self,
        id: SessionId,
        score: u32,
        progress: f32,
    ) -> Result<(), SessionError> {
        let session = self.get_mut(id)?;
        match session.player.as_mut() {
            Some(player) => {
                player.player_score = score;
                player.player_progress = progress.clamp(0.0, 1.0);
                Ok(())
            }
            None => Err(SessionError::InvalidState {
                id,
                state: session.state,
                action: "update score",
            }),
        }
    }

    /// Records a vote for the current round, replacing any earlier one.
    pub fn vote(
        &mut self,
        id: SessionId,
        level_id: impl Into<String>,
    ) -> Result<(), SessionError> {
        let session = self.get_mut(id)?;
        if session.player.is_none() || session.state.is_terminal() {
            return Err(SessionError::InvalidState {
                id,
                state: session.state,
                action: "vote",
            });
        }
        session.vote = Some(level_id.into());
        Ok(())
    }

    /// `Playing → Connected` for one session. A no-op in any other state.
    pub fn finish_song(&mut self, id: SessionId) -> Result<(), SessionError> {
        let session = self.get_mut(id)?;
        if session.state == SessionState::Playing {
            session.state = SessionState::Connected;
            tracing::debug!(session_id = %id, "player finished song");
        }
        Ok(())
    }

    /// Moves every identified `Connected` session to `Playing`.
    ///
    /// Returns how many sessions were promoted.
    pub fn start_playing(&mut self) -> usize {
        let mut promoted = 0;
        for session in self.sessions.values_mut() {
            if session.state == SessionState::Connected && session.player.is_some() {
                session.state = SessionState::Playing;
                if let Some(player) = session.player.as_mut() {
                    player.player_score = 0;
                    player.player_progress = 0.0;
                }
                promoted += 1;
            }
        }
        promoted
    }

    /// Moves every `Playing` session back to `Connected`.
    pub fn stop_playing(&mut self) {
        for session in self.sessions.values_mut() {
            if session.state == SessionState::Playing {
                session.state = SessionState::Connected;
            }
        }
    }

    /// Clears every session's vote (start of a new round).
    pub fn clear_votes(&mut self) {
        for session in self.sessions.values_mut() {
            session.vote = None;
        }
    }

    /// Transitions a session to `Disconnected`.
    ///
    /// Closes the outbound queue (the writer drains what is already queued,
    /// then closes the socket) and cancels the session's token so its
    /// reader stops. Calling this on an already disconnected session is a
    /// no-op.
    pub fn disconnect(&mut self, id: SessionId) -> Result<(), SessionError> {
        let session = self.get_mut(id)?;
        if session.state.is_terminal() {
            return Ok(());
        }
        session.state = SessionState::Disconnected;
        session.outbound = None;
        session.cancel.cancel();
        tracing::info!(session_id = %id, addr = %session.addr, "session disconnected");
        Ok(())
    }

    /// Notify-then-close: queues `notice` (if any) and disconnects.
    pub fn kick(
        &mut self,
        id: SessionId,
        notice: Option<Bytes>,
    ) -> Result<(), SessionError> {
        let session = self.get_mut(id)?;
        if let Some(notice) = notice {
            session.enqueue(notice);
        }
        tracing::info!(session_id = %id, addr = %session.addr, "kicking session");
        self.disconnect(id)
    }

    /// Kicks every live session matching `predicate`. Returns the ids kicked.
    pub fn kick_where<F>(&mut self, notice: Option<Bytes>, predicate: F) -> Vec<SessionId>
    where
        F: Fn(&Session) -> bool,
    {
        let ids: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| !s.state.is_terminal() && predicate(s))
            .map(|s| s.id)
            .collect();

        for id in &ids {
            // Ids were collected under the same borrow; they exist.
            let _ = self.kick(*id, notice.clone());
        }
        ids
    }

    /// Removes every `Disconnected` session from the set.
    pub fn remove_disconnected(&mut self) -> Vec<SessionId> {
        let mut removed = Vec::new();
        self.sessions.retain(|id, session| {
            if session.state.is_terminal() {
                removed.push(*id);
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "removed disconnected sessions");
        }
        removed
    }

    /// Enqueues `data` on every session in `Connected` or `Playing`.
    ///
    /// Never blocks. A session whose queue is already torn down is skipped.
    /// Returns how many queues accepted the message.
    pub fn publish(&self, data: &Bytes) -> usize {
        self.sessions
            .values()
            .filter(|s| s.state.receives_broadcasts())
            .filter(|s| s.enqueue(data.clone()))
            .count()
    }

    /// Player snapshots of every identified live session, in session order.
    pub fn roster(&self) -> Vec<PlayerInfo> {
        self.sessions
            .values()
            .filter(|s| !s.state.is_terminal())
            .filter_map(|s| s.player.clone())
            .collect()
    }

    /// Votes cast by identified live sessions, in session order.
    pub fn votes(&self) -> impl Iterator<Item = &str> + '_ {
        self.sessions
            .values()
            .filter(|s| !s.state.is_terminal() && s.player.is_some())
            .filter_map(|s| s.vote.as_deref())
    }

    /// Number of sessions in `state`.
    pub fn count_in(&self, state: SessionState) -> usize {
        self.sessions.values().filter(|s| s.state == state).count()
    }

    /// Number of sessions that are not `Disconnected`.
    pub fn active_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| !s.state.is_terminal())
            .count()
    }

    /// Looks up a session by id.
    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// All sessions in session order.
    pub fn iter(&self) -> impl Iterator<Item = &Session> + '_ {
        self.sessions.values()
    }

    /// Returns the number of sessions (any state).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn get_mut(&mut self, id: SessionId) -> Result<&mut Session, SessionError> {
        self.sessions.get_mut(&id).ok_or(SessionError::NotFound(id))
    }
}

// =========================================================================
// Tests
// =========================================================================
