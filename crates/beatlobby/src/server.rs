//! `LobbyServer` builder and server loops.
//!
//! This is the entry point for running a lobby. It ties together all the
//! layers: transport → protocol → session → lobby, plus the directory
//! client and the observer feed.
//!
//! ## Tasks
//!
//! | Task | Owns | Stops on |
//! |---|---|---|
//! | accept loop ([`LobbyServer::run`]) | player listener | shutdown token |
//! | tick loop | `TickScheduler` | shutdown token |
//! | observer loop + one forwarder per observer | observer listener | shutdown token |
//! | one reader per session | read half | session token (child of shutdown) |
//! | one writer per session | outbound queue | queue closed |
//!
//! Locks are always taken in the order `lobby` → `sessions` → `settings`,
//! and none is held across socket I/O.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use beatlobby_directory::DirectoryClient;
use beatlobby_lobby::{Broadcaster, Catalog, LobbyError, Lobby, ObserverHub};
use beatlobby_protocol::{JsonCodec, ServerCommand};
use beatlobby_session::{Admission, SessionId, SessionManager};
use beatlobby_tick::{TickConfig, TickScheduler};
use beatlobby_transport::{
    Connection, TcpTransport, Transport, WebSocketConnection, WebSocketTransport,
};
use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::admin::Admin;
use crate::config::Settings;
use crate::handler::handle_player;
use crate::ServerError;

/// Reason sent to every player when the server goes down.
pub(crate) const SERVER_CLOSED: &str = "Server closed";

/// How long shutdown waits for writers to flush before giving up on them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Shared server state passed to every task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks.
/// Interior mutability via `Mutex` where needed.
pub(crate) struct ServerState {
    pub(crate) lobby: Mutex<Lobby>,
    pub(crate) sessions: Mutex<SessionManager>,
    /// Live settings. Admin operations mutate `access` and `songs` here
    /// and write the file back to `settings_path`. Always locked after
    /// `lobby` and `sessions` when more than one is held.
    pub(crate) settings: Mutex<Settings>,
    pub(crate) settings_path: Option<PathBuf>,
    pub(crate) broadcaster: Broadcaster,
    pub(crate) codec: JsonCodec,
    pub(crate) shutdown: CancellationToken,
    pub(crate) tracker: TaskTracker,
}

impl ServerState {
    /// Accept-time check of a peer that has not said who it is yet.
    pub(crate) async fn admits_peer(&self, ip: IpAddr) -> bool {
        self.settings.lock().await.access.is_allowed(ip, None)
    }

    /// Encodes a single-recipient `Kicked` notice. Encoding a fixed
    /// command cannot realistically fail; if it does the kick goes out
    /// without a notice.
    pub(crate) fn kick_notice(&self, reason: &str) -> Option<Bytes> {
        let command = ServerCommand::Kicked {
            reason: reason.to_owned(),
        };
        match self.broadcaster.encode(&command) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode kick notice");
                None
            }
        }
    }
}

/// Builder for configuring and starting a lobby server.
///
/// # Example
///
/// ```rust,ignore
/// let server = LobbyServer::builder(settings)
///     .settings_path("beatlobby.toml")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct LobbyServerBuilder {
    settings: Settings,
    settings_path: Option<PathBuf>,
    catalog: Option<Catalog>,
    seed: Option<u64>,
}

impl LobbyServerBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            settings_path: None,
            catalog: None,
            seed: None,
        }
    }

    /// Where admin changes are persisted. Without it, changes last until
    /// the process exits.
    pub fn settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    /// Uses `catalog` instead of loading one from `[songs]`.
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Seeds the shuffle order, for reproducible runs.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Loads the catalog and binds the listeners.
    pub async fn build(self) -> Result<LobbyServer, ServerError> {
        let settings = self.settings;

        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => {
                let dir = &settings.songs.directory;
                if !dir.exists() {
                    std::fs::create_dir_all(dir).map_err(LobbyError::from)?;
                    tracing::info!(dir = %dir.display(), "created empty song directory");
                }
                Catalog::load_dir(dir, &settings.songs.ids)?
            }
        };

        let players = TcpTransport::bind(
            &settings.player_bind_addr()?.to_string(),
            settings.server.max_frame_size,
        )
        .await?;

        let (observers, broadcaster) = if settings.observers.enabled {
            let transport =
                WebSocketTransport::bind(&settings.observer_bind_addr()?.to_string()).await?;
            (
                Some(transport),
                Broadcaster::with_observers(ObserverHub::default()),
            )
        } else {
            (None, Broadcaster::new())
        };

        let lobby_config = settings.lobby_config();
        let lobby = match self.seed {
            Some(seed) => Lobby::with_seed(lobby_config, catalog, seed),
            None => Lobby::new(lobby_config, catalog),
        };

        let directory = DirectoryClient::new(
            settings.server.address.clone(),
            settings.server.port,
            settings.server.name.clone(),
        )
        .with_timeout(settings.handshake_timeout());
        let tick = TickConfig::with_interval(settings.tick_interval());

        let state = Arc::new(ServerState {
            lobby: Mutex::new(lobby),
            sessions: Mutex::new(SessionManager::new()),
            settings: Mutex::new(settings),
            settings_path: self.settings_path,
            broadcaster,
            codec: JsonCodec,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        });

        Ok(LobbyServer {
            players,
            observers,
            directory,
            tick,
            state,
        })
    }
}

/// A lobby server with its listeners bound.
///
/// Call [`run()`](Self::run) to start serving.
pub struct LobbyServer {
    players: TcpTransport,
    observers: Option<WebSocketTransport>,
    directory: DirectoryClient,
    tick: TickConfig,
    state: Arc<ServerState>,
}

impl LobbyServer {
    pub fn builder(settings: Settings) -> LobbyServerBuilder {
        LobbyServerBuilder::new(settings)
    }

    /// Address of the player listener.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.players.local_addr()
    }

    /// Address of the observer listener, if observers are enabled.
    pub fn observer_addr(&self) -> Option<SocketAddr> {
        self.observers.as_ref().and_then(|t| t.local_addr().ok())
    }

    /// Cancelling this token shuts the server down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Handle for the admin operations.
    pub fn admin(&self) -> Admin {
        Admin::new(Arc::clone(&self.state))
    }

    /// Runs the server until the shutdown token is cancelled, then tears
    /// everything down.
    ///
    /// Directory registration happens first and never blocks startup for
    /// longer than the handshake timeout.
    pub async fn run(self) -> Result<(), ServerError> {
        let Self {
            mut players,
            observers,
            directory,
            tick,
            state,
        } = self;

        let directories = state.settings.lock().await.directory.addresses();
        let registrations = directory.register_all(&directories).await;

        state
            .tracker
            .spawn(run_ticks(Arc::clone(&state), TickScheduler::new(tick)));

        if let (Some(transport), Some(hub)) = (observers, state.broadcaster.observers()) {
            let feed = hub.clone();
            state
                .tracker
                .spawn(run_observers(transport, feed, Arc::clone(&state)));
        }

        tracing::info!(addr = ?players.local_addr().ok(), "lobby server running");

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                accepted = players.accept() => match accepted {
                    Ok(conn) => admit(conn, &state).await,
                    Err(e) => tracing::error!(error = %e, "accept failed"),
                },
            }
        }

        tracing::info!("shutting down");
        let notice = state.kick_notice(SERVER_CLOSED);
        let kicked = state.sessions.lock().await.kick_where(notice, |_| true);
        tracing::info!(sessions = kicked.len(), "closed all sessions");

        directory.deregister_all(registrations).await;

        state.tracker.close();
        if tokio::time::timeout(SHUTDOWN_GRACE, state.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                tasks = state.tracker.len(),
                "tasks still running after shutdown grace period"
            );
        }
        tracing::info!("server stopped");
        Ok(())
    }
}

/// First admission check (address only), then opens the session and
/// hands the connection to its reader and writer tasks.
async fn admit(conn: beatlobby_transport::TcpConnection, state: &Arc<ServerState>) {
    let addr = conn.peer_addr();
    if !state.admits_peer(addr.ip()).await {
        tracing::warn!(%addr, "connection rejected by access list");
        if let Err(e) = conn.close().await {
            tracing::debug!(%addr, error = %e, "close after rejection failed");
        }
        return;
    }

    let id = SessionId(conn.id().into_inner());
    let opened = state
        .sessions
        .lock()
        .await
        .open(id, addr, &state.shutdown);
    match opened {
        Ok(channels) => {
            state
                .tracker
                .spawn(handle_player(conn, id, channels, Arc::clone(state)));
        }
        Err(e) => tracing::error!(session_id = %id, error = %e, "failed to open session"),
    }
}

/// Drives the lobby until shutdown. A failed tick is logged and the next
/// one runs as usual.
async fn run_ticks(state: Arc<ServerState>, mut scheduler: TickScheduler) {
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            info = scheduler.wait_for_tick() => {
                let result = {
                    let mut lobby = state.lobby.lock().await;
                    let mut sessions = state.sessions.lock().await;
                    lobby.tick(info.dt, &mut sessions, &state.broadcaster)
                };
                if let Err(e) = result {
                    tracing::error!(tick = info.tick, error = %e, "lobby tick failed");
                }
                scheduler.finish_tick();
            }
        }
    }
    let stats = scheduler.stats();
    tracing::debug!(
        ticks = stats.ticks,
        late = stats.late_ticks,
        slow = stats.slow_ticks,
        slowest_ms = stats.slowest.as_secs_f64() * 1000.0,
        "tick loop stopped"
    );
}

/// Accepts observers and gives each one its own forwarder.
async fn run_observers(mut transport: WebSocketTransport, hub: ObserverHub, state: Arc<ServerState>) {
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            accepted = transport.accept() => match accepted {
                Ok(conn) => {
                    tracing::info!(addr = %conn.peer_addr(), "observer connected");
                    let feed = hub.subscribe();
                    state
                        .tracker
                        .spawn(forward_to_observer(conn, feed, state.shutdown.clone()));
                }
                Err(e) => tracing::warn!(error = %e, "observer accept failed"),
            },
        }
    }
}

/// Copies every published command to one observer until either side
/// goes away. Anything the observer sends is ignored.
async fn forward_to_observer(
    conn: WebSocketConnection,
    mut feed: broadcast::Receiver<Bytes>,
    shutdown: CancellationToken,
) {
    let addr = conn.peer_addr();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            published = feed.recv() => match published {
                Ok(data) => {
                    if let Err(e) = conn.send(data).await {
                        tracing::debug!(%addr, error = %e, "observer send failed");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(%addr, skipped, "observer lagging, skipped messages");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = conn.recv() => match incoming {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "observer receive failed");
                    break;
                }
            },
        }
    }

    if let Err(e) = conn.close().await {
        tracing::trace!(%addr, error = %e, "observer close failed");
    }
    tracing::info!(%addr, "observer disconnected");
}
