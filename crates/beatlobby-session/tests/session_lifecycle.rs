//! Integration tests for session lifecycle and admission working together.

use std::net::SocketAddr;

use beatlobby_protocol::{PlayerId, PlayerInfo};
use beatlobby_session::{AccessList, Admission, SessionId, SessionManager, SessionState};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

fn addr(last: u8) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, last], 5000 + last as u16))
}

fn join(mgr: &mut SessionManager, root: &CancellationToken, id: u64) -> beatlobby_session::SessionChannels {
    let channels = mgr.open(SessionId(id), addr(id as u8), root).unwrap();
    mgr.identify(SessionId(id), PlayerInfo::new(PlayerId(id), format!("p{id}")))
        .unwrap();
    channels
}

#[tokio::test]
async fn ban_propagation_kicks_live_session_and_rejects_reconnect() {
    let root = CancellationToken::new();
    let mut mgr = SessionManager::new();
    let mut access = AccessList::new();
    let mut victim = join(&mut mgr, &root, 2);
    let mut bystander = join(&mut mgr, &root, 3);

    access.ban(addr(2).ip().to_string());
    let kicked = mgr.kick_where(Some(Bytes::from_static(b"banned")), |s| {
        !access.is_allowed(s.addr().ip(), s.player_id())
    });

    assert_eq!(kicked, vec![SessionId(2)]);
    assert!(victim.cancel.is_cancelled());
    assert_eq!(victim.outbound.recv().await, Some(Bytes::from_static(b"banned")));
    assert_eq!(victim.outbound.recv().await, None);
    assert!(bystander.outbound.try_recv().is_err());
    assert!(!bystander.cancel.is_cancelled());

    // The acceptor checks before a session exists.
    assert!(!access.is_allowed(addr(2).ip(), None));
}

#[tokio::test]
async fn cleanup_never_leaks_disconnected_sessions() {
    let root = CancellationToken::new();
    let mut mgr = SessionManager::new();
    let _channels: Vec<_> = (1..=5).map(|id| join(&mut mgr, &root, id)).collect();

    mgr.disconnect(SessionId(2)).unwrap();
    mgr.disconnect(SessionId(4)).unwrap();
    mgr.remove_disconnected();

    assert!(mgr.iter().all(|s| s.state() != SessionState::Disconnected));
    assert_eq!(
        mgr.iter().map(|s| s.id()).collect::<Vec<_>>(),
        vec![SessionId(1), SessionId(3), SessionId(5)]
    );
}

#[tokio::test]
async fn root_cancel_reaches_every_session() {
    let root = CancellationToken::new();
    let mut mgr = SessionManager::new();
    let a = join(&mut mgr, &root, 1);
    let b = join(&mut mgr, &root, 2);

    root.cancel();

    a.cancel.cancelled().await;
    b.cancel.cancelled().await;
}

#[tokio::test]
async fn publish_preserves_fifo_order_per_session() {
    let root = CancellationToken::new();
    let mut mgr = SessionManager::new();
    let mut ch = join(&mut mgr, &root, 1);

    for n in 0..10u8 {
        mgr.publish(&Bytes::from(vec![n]));
    }
    for n in 0..10u8 {
        assert_eq!(ch.outbound.recv().await, Some(Bytes::from(vec![n])));
    }
}
