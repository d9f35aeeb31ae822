//! Unified error type for the lobby server.

use beatlobby_directory::DirectoryError;
use beatlobby_lobby::LobbyError;
use beatlobby_protocol::ProtocolError;
use beatlobby_session::SessionError;
use beatlobby_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Accepting, reading or writing a socket failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be decoded, or a message arrived out of order.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// Catalog or lobby state error.
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Loading or saving the settings file failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let server_err: ServerError = err.into();
        assert!(matches!(server_err, ServerError::Transport(_)));
        assert!(server_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let server_err: ServerError = err.into();
        assert!(matches!(server_err, ServerError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::NotFound(beatlobby_session::SessionId(3));
        let server_err: ServerError = err.into();
        assert!(matches!(server_err, ServerError::Session(_)));
        assert!(server_err.to_string().contains("S-3"));
    }

    #[test]
    fn test_from_lobby_error() {
        let err = LobbyError::SongNotFound(12);
        let server_err: ServerError = err.into();
        assert!(matches!(server_err, ServerError::Lobby(_)));
    }

    #[test]
    fn test_from_directory_error() {
        let err = DirectoryError::Closed("hub:3700".into());
        let server_err: ServerError = err.into();
        assert!(matches!(server_err, ServerError::Directory(_)));
    }
}
