//! Error types for the session layer.

use crate::{SessionId, SessionState};

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session exists with this id (it was never opened, or it has
    /// already been removed after disconnecting).
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// A session with this id is already in the set.
    #[error("session {0} already exists")]
    AlreadyExists(SessionId),

    /// The operation is not valid in the session's current state, e.g. a
    /// second `Hello` on an already identified session.
    #[error("session {id} cannot {action} while {state}")]
    InvalidState {
        id: SessionId,
        state: SessionState,
        action: &'static str,
    },
}
