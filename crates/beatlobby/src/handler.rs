//! Per-session tasks: the reader that routes inbound messages, and the
//! writer that drains the outbound queue.
//!
//! The flow for one player is:
//!   1. First frame must be `Hello` → second admission check → identify
//!   2. Loop: decode `ClientMessage` → apply to the session set
//!   3. Socket closed, protocol error, kick or shutdown → disconnect
//!
//! Broadcasts never touch the socket directly. The lobby enqueues bytes on
//! the session's queue and the writer performs the blocking write.

use std::net::SocketAddr;
use std::sync::Arc;

use beatlobby_protocol::{ClientMessage, Codec, ProtocolError};
use beatlobby_session::{Admission, SessionChannels, SessionError, SessionId};
use beatlobby_transport::{Connection, TcpConnection};
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::server::{SERVER_CLOSED, ServerState};
use crate::ServerError;

/// Reason sent to a player the access list rejects.
pub(crate) const NOT_ALLOWED: &str = "You are not allowed on this server";

/// Drop guard that disconnects the session when the reader exits.
///
/// This ensures cleanup happens even if the reader panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async lock.
/// During shutdown the disconnect carries the `Kicked` notice, whichever
/// of this guard and the shutdown sweep gets there first.
struct SessionGuard {
    id: SessionId,
    state: Arc<ServerState>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let id = self.id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let notice = if state.shutdown.is_cancelled() {
                state.kick_notice(SERVER_CLOSED)
            } else {
                None
            };
            let mut sessions = state.sessions.lock().await;
            match sessions.kick(id, notice) {
                Ok(()) | Err(SessionError::NotFound(_)) => {}
                Err(e) => tracing::debug!(session_id = %id, error = %e, "disconnect failed"),
            }
        });
    }
}

/// Runs one player session from open to close.
pub(crate) async fn handle_player(
    conn: TcpConnection,
    id: SessionId,
    channels: SessionChannels,
    state: Arc<ServerState>,
) {
    let SessionChannels { outbound, cancel } = channels;
    let conn = Arc::new(conn);
    let addr = conn.peer_addr();

    state.tracker.spawn(write_outbound(
        Arc::clone(&conn),
        outbound,
        id,
        Arc::clone(&state),
    ));

    let _guard = SessionGuard {
        id,
        state: Arc::clone(&state),
    };

    let mut identified = false;
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(session_id = %id, "reader cancelled");
                break;
            }
            frame = conn.recv() => frame,
        };

        let data = match frame {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(session_id = %id, %addr, "connection closed by peer");
                break;
            }
            Err(e) => {
                tracing::debug!(session_id = %id, error = %e, "receive failed");
                break;
            }
        };

        match dispatch(&state, id, addr, &mut identified, &data).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                tracing::warn!(session_id = %id, %addr, error = %e, "dropping session");
                break;
            }
        }
    }
    // _guard drops here → session disconnect fires.
}

/// Applies one inbound frame. Returns `false` when the session should end.
async fn dispatch(
    state: &Arc<ServerState>,
    id: SessionId,
    addr: SocketAddr,
    identified: &mut bool,
    data: &Bytes,
) -> Result<bool, ServerError> {
    let message: ClientMessage = state.codec.decode(data)?;
    tracing::trace!(session_id = %id, ?message, "frame received");

    match message {
        ClientMessage::Hello { player } => {
            if *identified {
                return Err(ProtocolError::InvalidMessage("duplicate Hello".into()).into());
            }
            // Check and identify under one sessions guard, so an admin
            // sweep either sees this player identified or runs before the
            // check reads the lists.
            let mut sessions = state.sessions.lock().await;
            let allowed = state
                .settings
                .lock()
                .await
                .access
                .is_allowed(addr.ip(), Some(player.player_id));
            if !allowed {
                tracing::warn!(
                    session_id = %id,
                    %addr,
                    player_id = %player.player_id,
                    "player rejected by access list"
                );
                sessions.kick(id, state.kick_notice(NOT_ALLOWED))?;
                return Ok(false);
            }
            sessions.identify(id, player)?;
            *identified = true;
        }
        _ if !*identified => {
            return Err(ProtocolError::InvalidMessage(
                "first frame must be Hello".into(),
            )
            .into());
        }
        ClientMessage::UpdatePlayer { score, progress } => {
            state
                .sessions
                .lock()
                .await
                .update_score(id, score, progress)?;
        }
        ClientMessage::Vote { level_id } => {
            tracing::debug!(session_id = %id, %level_id, "vote received");
            state.sessions.lock().await.vote(id, level_id)?;
        }
        ClientMessage::SongFinished => {
            state.sessions.lock().await.finish_song(id)?;
        }
        ClientMessage::Disconnect { reason } => {
            tracing::info!(session_id = %id, %reason, "client disconnected");
            return Ok(false);
        }
    }
    Ok(true)
}

/// Drains the outbound queue onto the socket.
///
/// Ends when the queue closes (the session was disconnected and everything
/// already queued has been written) or a write fails, which disconnects
/// the session.
async fn write_outbound(
    conn: Arc<TcpConnection>,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    id: SessionId,
    state: Arc<ServerState>,
) {
    while let Some(data) = outbound.recv().await {
        if let Err(e) = conn.send(data).await {
            tracing::debug!(session_id = %id, error = %e, "send failed");
            if let Err(e) = state.sessions.lock().await.disconnect(id) {
                tracing::trace!(session_id = %id, error = %e, "session already gone");
            }
            break;
        }
    }

    if let Err(e) = conn.close().await {
        tracing::trace!(session_id = %id, error = %e, "close failed");
    }
    tracing::debug!(session_id = %id, "writer finished");
}
