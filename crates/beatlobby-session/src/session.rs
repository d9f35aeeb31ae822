//! Session types: the server's record of one connected participant.

use std::fmt;
use std::net::SocketAddr;

use beatlobby_protocol::{PlayerId, PlayerInfo};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Identifier of a session. Allocated from the connection id, so ids grow
/// monotonically in accept order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Connection state of a session.
///
/// ```text
///   Connecting ──(Hello)──→ Connected ⇄ Playing
///        │                      │          │
///        └──────────────────────┴──────────┴──→ Disconnected (terminal)
/// ```
///
/// - **Connecting**: accepted, no identity yet. Receives nothing.
/// - **Connected**: identified, in the lobby.
/// - **Playing**: currently playing the selected song.
/// - **Disconnected**: socket error, kick, or client close. The outbound
///   queue is closed and the session waits to be removed from the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    Connected,
    Playing,
    Disconnected,
}

impl SessionState {
    /// Whether broadcasts are delivered to a session in this state.
    pub fn receives_broadcasts(self) -> bool {
        matches!(self, Self::Connected | Self::Playing)
    }

    /// Whether this is the terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Playing => write!(f, "Playing"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One connected participant.
#[derive(Debug)]
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) addr: SocketAddr,
    pub(crate) state: SessionState,
    /// Populated by `Hello`. A session without it never shows up on the
    /// roster or in vote tallies.
    pub(crate) player: Option<PlayerInfo>,
    /// Level id this session voted for in the current round.
    pub(crate) vote: Option<String>,
    /// Producer side of the outbound queue. `None` once disconnected,
    /// which closes the queue and lets the writer finish.
    pub(crate) outbound: Option<mpsc::UnboundedSender<Bytes>>,
    pub(crate) cancel: CancellationToken,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn player(&self) -> Option<&PlayerInfo> {
        self.player.as_ref()
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player.as_ref().map(|p| p.player_id)
    }

    pub fn vote(&self) -> Option<&str> {
        self.vote.as_deref()
    }

    /// Pushes encoded bytes onto the outbound queue without blocking.
    ///
    /// Returns `false` if the queue is gone (session disconnected or its
    /// writer already exited); callers treat that as "skip".
    pub fn enqueue(&self, data: Bytes) -> bool {
        match &self.outbound {
            Some(tx) => tx.send(data).is_ok(),
            None => false,
        }
    }
}

/// The consumer ends handed back when a session is opened.
///
/// The server spawns the writer task with `outbound` and selects on
/// `cancel` in its reader task; both are released when the session is
/// disconnected.
#[derive(Debug)]
pub struct SessionChannels {
    pub outbound: mpsc::UnboundedReceiver<Bytes>,
    pub cancel: CancellationToken,
}
