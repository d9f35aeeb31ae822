//! Broadcast fan-out: encode once, deliver to two independent sinks.
//!
//! 1. Every session in `Connected` or `Playing` (its outbound queue).
//! 2. The [`ObserverHub`], a publish/subscribe channel shared by all
//!    passive observers.
//!
//! Neither sink can block the caller, and a failure in one never affects
//! the other.

use beatlobby_protocol::{Codec, JsonCodec, ServerCommand};
use beatlobby_session::SessionManager;
use bytes::Bytes;
use tokio::sync::broadcast;

use crate::LobbyError;

/// Default number of commands an observer may fall behind before it
/// starts skipping.
const DEFAULT_OBSERVER_BACKLOG: usize = 256;

/// Publish/subscribe channel for passive observers.
///
/// Cloning is cheap; all clones feed the same subscribers. A subscriber
/// that falls more than `backlog` commands behind loses the oldest ones
/// (`RecvError::Lagged`) instead of slowing the publisher.
#[derive(Debug, Clone)]
pub struct ObserverHub {
    tx: broadcast::Sender<Bytes>,
}

impl ObserverHub {
    pub fn new(backlog: usize) -> Self {
        let (tx, _) = broadcast::channel(backlog.max(1));
        Self { tx }
    }

    /// A new receiver seeing every command published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.tx.subscribe()
    }

    /// Sends to all current observers. Having none is not an error.
    pub fn publish(&self, data: Bytes) -> usize {
        self.tx.send(data).unwrap_or(0)
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ObserverHub {
    fn default() -> Self {
        Self::new(DEFAULT_OBSERVER_BACKLOG)
    }
}

/// Encodes lobby commands and fans them out.
#[derive(Debug, Clone, Default)]
pub struct Broadcaster {
    codec: JsonCodec,
    observers: Option<ObserverHub>,
}

impl Broadcaster {
    /// A broadcaster that only reaches sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// A broadcaster that also mirrors every command to `hub`.
    pub fn with_observers(hub: ObserverHub) -> Self {
        Self {
            codec: JsonCodec,
            observers: Some(hub),
        }
    }

    pub fn observers(&self) -> Option<&ObserverHub> {
        self.observers.as_ref()
    }

    /// Encodes a command for a single recipient (e.g. a kick notice).
    pub fn encode(&self, command: &ServerCommand) -> Result<Bytes, LobbyError> {
        Ok(self.codec.encode(command)?)
    }

    /// Encodes `command` once and enqueues it on every eligible session and
    /// on the observer hub. Returns how many sessions accepted it.
    pub fn publish(
        &self,
        sessions: &SessionManager,
        command: &ServerCommand,
    ) -> Result<usize, LobbyError> {
        let data = self.encode(command)?;
        let delivered = sessions.publish(&data);
        let observed = self
            .observers
            .as_ref()
            .map_or(0, |hub| hub.publish(data));

        tracing::trace!(
            kind = command.kind(),
            sessions = delivered,
            observers = observed,
            "command published"
        );
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beatlobby_protocol::{PlayerId, PlayerInfo};
    use beatlobby_session::SessionId;
    use std::net::SocketAddr;
    use tokio_util::sync::CancellationToken;

    fn countdown(seconds: u32) -> ServerCommand {
        ServerCommand::SetLobbyCountdown { seconds }
    }

    #[test]
    fn test_publish_empty_set_without_observers_is_noop() {
        let broadcaster = Broadcaster::new();
        let sessions = SessionManager::new();
        for _ in 0..3 {
            assert_eq!(broadcaster.publish(&sessions, &countdown(3)).unwrap(), 0);
        }
    }

    #[test]
    fn test_publish_reaches_sessions_and_observers_with_same_bytes() {
        let hub = ObserverHub::new(8);
        let mut observer = hub.subscribe();
        let broadcaster = Broadcaster::with_observers(hub);

        let mut sessions = SessionManager::new();
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let mut ch = sessions
            .open(SessionId(1), addr, &CancellationToken::new())
            .unwrap();
        sessions
            .identify(SessionId(1), PlayerInfo::new(PlayerId(1), "one"))
            .unwrap();

        broadcaster.publish(&sessions, &countdown(9)).unwrap();

        let to_session = ch.outbound.try_recv().unwrap();
        let to_observer = observer.try_recv().unwrap();
        assert_eq!(to_session, to_observer);
        assert_eq!(&to_session[..], br#"{"type":"SetLobbyCountdown","seconds":9}"#);
    }

    #[test]
    fn test_lagging_observer_skips_instead_of_blocking() {
        let hub = ObserverHub::new(2);
        let mut slow = hub.subscribe();
        let broadcaster = Broadcaster::with_observers(hub);
        let sessions = SessionManager::new();

        for s in 0..5 {
            broadcaster.publish(&sessions, &countdown(s)).unwrap();
        }

        assert!(matches!(
            slow.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(3))
        ));
        // The newest commands are still there.
        assert!(slow.try_recv().is_ok());
    }

    #[test]
    fn test_observer_hub_without_subscribers_is_fine() {
        let hub = ObserverHub::default();
        assert_eq!(hub.publish(Bytes::from_static(b"{}")), 0);
        assert_eq!(hub.observer_count(), 0);
    }
}
