//! Integration tests for the lobby driving real sessions and observers.

use std::net::SocketAddr;
use std::time::Duration;

use beatlobby_lobby::{
    Broadcaster, Catalog, DifficultyLevel, Lobby, LobbyConfig, ObserverHub, Phase, Song, SongOrder,
};
use beatlobby_protocol::{Codec, Difficulty, JsonCodec, PlayerId, PlayerInfo, ServerCommand};
use beatlobby_session::{SessionId, SessionManager, SessionState};
use tokio_util::sync::CancellationToken;

const STEP: Duration = Duration::from_millis(5);

fn catalog() -> Catalog {
    Catalog::from_songs((0..3).map(|n| Song {
        level_id: format!("level-{n}"),
        external_id: n,
        title: format!("Track {n}"),
        subtitle: String::new(),
        author: "artist".into(),
        duration: 20.0,
        difficulties: vec![DifficultyLevel {
            difficulty: Difficulty::Expert,
            notes: "Expert.json".into(),
        }],
    }))
}

fn addr(id: u64) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7000 + id as u16))
}

fn ticks(lobby: &mut Lobby, sessions: &mut SessionManager, out: &Broadcaster, total: Duration) {
    for _ in 0..(total.as_millis() / STEP.as_millis()) {
        lobby.tick(STEP, sessions, out).unwrap();
        if let Some(i) = lobby.state().selected() {
            assert!(i < lobby.catalog().len());
        }
    }
}

#[test]
fn full_round_reaches_players_and_observers_but_not_connecting_sessions() {
    let root = CancellationToken::new();
    let hub = ObserverHub::new(4096);
    let mut observer = hub.subscribe();
    let out = Broadcaster::with_observers(hub);

    let config = LobbyConfig {
        lobby_time: Duration::from_secs(4),
        song_order: SongOrder::Voting,
        ..LobbyConfig::default()
    };
    let mut lobby = Lobby::with_seed(config, catalog(), 42);
    let mut sessions = SessionManager::new();

    let mut player = sessions.open(SessionId(1), addr(1), &root).unwrap();
    sessions
        .identify(SessionId(1), PlayerInfo::new(PlayerId(11), "alice"))
        .unwrap();
    let mut lurker = sessions.open(SessionId(2), addr(2), &root).unwrap();
    sessions.vote(SessionId(1), "level-1").unwrap();

    ticks(&mut lobby, &mut sessions, &out, Duration::from_secs(4));
    assert_eq!(lobby.phase(), Phase::Playing);
    assert_eq!(lobby.state().selected(), Some(1));
    assert_eq!(sessions.get(SessionId(1)).unwrap().state(), SessionState::Playing);
    // Never identified, so never promoted.
    assert_eq!(sessions.get(SessionId(2)).unwrap().state(), SessionState::Connecting);

    let mut to_player = Vec::new();
    while let Ok(bytes) = player.outbound.try_recv() {
        to_player.push(bytes);
    }
    let mut to_observer = Vec::new();
    while let Ok(bytes) = observer.try_recv() {
        to_observer.push(bytes);
    }
    assert!(lurker.outbound.try_recv().is_err());
    assert_eq!(to_player, to_observer);

    let kinds: Vec<&'static str> = to_player
        .iter()
        .map(|b| JsonCodec.decode::<ServerCommand>(b).unwrap().kind())
        .collect();
    assert!(kinds.contains(&"SetLobbyCountdown"));
    assert!(kinds.contains(&"SetPlayerRoster"));
    let selected = kinds.iter().position(|k| *k == "SetSelectedSong").unwrap();
    let started = kinds.iter().position(|k| *k == "StartSelectedSong").unwrap();
    assert!(selected < started);
}

#[test]
fn disconnected_sessions_never_outlive_a_tick() {
    let root = CancellationToken::new();
    let out = Broadcaster::new();
    let mut lobby = Lobby::with_seed(LobbyConfig::default(), catalog(), 1);
    let mut sessions = SessionManager::new();

    for id in 1..=20 {
        let _ = sessions.open(SessionId(id), addr(id), &root).unwrap();
        if id % 3 == 0 {
            sessions.disconnect(SessionId(id)).unwrap();
        }
        lobby.tick(STEP, &mut sessions, &out).unwrap();
        assert_eq!(sessions.count_in(SessionState::Disconnected), 0);
    }
    assert_eq!(sessions.len(), 14);
}

#[test]
fn shuffle_rounds_stay_in_range_and_never_repeat_immediately() {
    let root = CancellationToken::new();
    let out = Broadcaster::new();
    let config = LobbyConfig {
        lobby_time: Duration::from_secs(2),
        song_order: SongOrder::Shuffle,
        ..LobbyConfig::default()
    };
    let mut lobby = Lobby::with_seed(config, catalog(), 9);
    let mut sessions = SessionManager::new();
    let _ch = sessions.open(SessionId(1), addr(1), &root).unwrap();
    sessions
        .identify(SessionId(1), PlayerInfo::new(PlayerId(1), "p"))
        .unwrap();

    let mut previous = None;
    for _ in 0..10 {
        ticks(&mut lobby, &mut sessions, &out, Duration::from_secs(2));
        let current = lobby.state().selected();
        assert!(current.is_some());
        // Three songs: bumping a repeat of 0 or 1 lands on a new index;
        // a repeat of 2 wraps to 0.
        assert_ne!(current, previous);
        previous = current;
        sessions.finish_song(SessionId(1)).unwrap();
        ticks(&mut lobby, &mut sessions, &out, Duration::from_millis(5010));
        assert_eq!(lobby.phase(), Phase::Voting);
    }
}
