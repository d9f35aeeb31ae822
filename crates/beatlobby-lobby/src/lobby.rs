//! The lobby state machine.
//!
//! [`Lobby::tick`] is called by the server's tick loop with the measured
//! time since the previous tick. It reads votes and session states,
//! advances the phase, and publishes commands. It never performs I/O:
//! commands land in per-session queues and the observer hub.

use std::time::Duration;

use beatlobby_protocol::{Difficulty, PlayerInfo, ServerCommand};
use beatlobby_session::{SessionManager, SessionState};
use beatlobby_tick::Cadence;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::{
    Broadcaster, Catalog, LobbyConfig, LobbyError, LobbyState, Phase, Song,
    preferred_difficulty, select_song,
};

/// The shared room every player is in.
#[derive(Debug)]
pub struct Lobby {
    config: LobbyConfig,
    state: LobbyState,
    catalog: Catalog,
    roster_cadence: Cadence,
    rng: StdRng,
    /// Active session count seen by the previous tick (status logging).
    last_active: usize,
}

impl Lobby {
    /// Creates a lobby in `Voting` with nothing selected.
    pub fn new(config: LobbyConfig, catalog: Catalog) -> Self {
        Self::with_rng(config, catalog, StdRng::from_os_rng())
    }

    /// Like [`new`](Self::new) with a fixed shuffle seed.
    pub fn with_seed(config: LobbyConfig, catalog: Catalog, seed: u64) -> Self {
        Self::with_rng(config, catalog, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: LobbyConfig, catalog: Catalog, rng: StdRng) -> Self {
        Self {
            roster_cadence: Cadence::per_second(config.roster_rate_hz),
            config,
            state: LobbyState::default(),
            catalog,
            rng,
            last_active: 0,
        }
    }

    pub fn state(&self) -> &LobbyState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The song picked for the current round.
    pub fn selected_song(&self) -> Option<&Song> {
        self.state.selected.and_then(|i| self.catalog.get(i))
    }

    // =====================================================================
    // Tick
    // =====================================================================

    /// Advances the lobby by `dt`.
    ///
    /// Disconnected sessions are removed from `sessions` first, so none
    /// survive past one tick.
    ///
    /// # Errors
    /// A broken invariant or an encoding failure. The caller logs it and
    /// ticks again; the state stays consistent either way.
    pub fn tick(
        &mut self,
        dt: Duration,
        sessions: &mut SessionManager,
        out: &Broadcaster,
    ) -> Result<(), LobbyError> {
        sessions.remove_disconnected();
        self.state.uptime += dt;

        let active = sessions.active_count();
        if active != self.last_active {
            tracing::info!(
                connected = active,
                phase = %self.state.phase,
                "lobby population changed"
            );
            self.last_active = active;
        }

        match self.state.phase {
            Phase::Voting | Phase::Preparing => self.tick_countdown(dt, sessions, out),
            Phase::Playing => self.tick_playing(dt, sessions, out),
        }
    }

    fn tick_countdown(
        &mut self,
        dt: Duration,
        sessions: &mut SessionManager,
        out: &Broadcaster,
    ) -> Result<(), LobbyError> {
        self.state.lobby_timer += dt;
        if sessions.active_count() == 0 {
            self.state.reset_countdown();
        }

        let elapsed = self.state.lobby_timer.as_secs_f64().ceil() as u32;
        if elapsed > self.state.countdown_second {
            self.state.countdown_second = elapsed;
            let total = self.config.lobby_time.as_secs_f64().ceil() as u32;
            out.publish(
                sessions,
                &ServerCommand::SetLobbyCountdown {
                    seconds: total.saturating_sub(elapsed),
                },
            )?;
        }

        if self.roster_cadence.advance(dt) {
            out.publish(sessions, &roster_command(sessions.roster(), None))?;
        }

        if self.state.selected.is_none()
            && !self.catalog.is_empty()
            && self.state.lobby_timer >= self.config.lobby_time / 2
        {
            self.select_next(sessions, out)?;
        }

        if self.state.lobby_timer >= self.config.lobby_time {
            self.state.reset_countdown();
            if self.state.selected.is_some() {
                self.start_song(sessions, out)?;
            }
        }
        Ok(())
    }

    fn select_next(
        &mut self,
        sessions: &SessionManager,
        out: &Broadcaster,
    ) -> Result<(), LobbyError> {
        let Some(index) = select_song(
            self.config.song_order,
            sessions.votes(),
            &self.catalog,
            self.state.last,
            &mut self.rng,
        ) else {
            return Ok(());
        };

        self.state.selected = Some(index);
        self.state.phase = Phase::Preparing;
        let difficulty = self.selected_difficulty()?;

        if let Some(song) = self.catalog.get(index) {
            tracing::info!(
                index,
                external_id = song.external_id,
                title = %song.title,
                %difficulty,
                order = %self.config.song_order,
                "next song selected"
            );
        }
        out.publish(sessions, &ServerCommand::SetSelectedSong { difficulty })?;
        Ok(())
    }

    fn start_song(
        &mut self,
        sessions: &mut SessionManager,
        out: &Broadcaster,
    ) -> Result<(), LobbyError> {
        let difficulty = self.selected_difficulty()?;
        out.publish(sessions, &ServerCommand::StartSelectedSong { difficulty })?;

        let players = sessions.start_playing();
        self.state.phase = Phase::Playing;
        self.state.play_timer = Duration::ZERO;
        self.roster_cadence.reset();
        tracing::info!(players, %difficulty, "song started");
        Ok(())
    }

    fn tick_playing(
        &mut self,
        dt: Duration,
        sessions: &mut SessionManager,
        out: &Broadcaster,
    ) -> Result<(), LobbyError> {
        self.state.play_timer += dt;

        let duration = match self.selected_song() {
            Some(song) => song.duration,
            None => {
                self.return_to_lobby(sessions, "selected song missing");
                return Err(LobbyError::NoSelection);
            }
        };

        if self.roster_cadence.advance(dt) {
            let mut players = sessions.roster();
            players.sort_by(|a, b| b.player_score.cmp(&a.player_score));
            let play_time = self.state.play_timer.as_secs_f64();
            out.publish(
                sessions,
                &roster_command(players, Some((duration, play_time))),
            )?;
        }

        let song_over = self.state.play_timer.as_secs_f64()
            >= duration + self.config.end_grace.as_secs_f64();
        if song_over {
            self.return_to_lobby(sessions, "song over");
        } else if self.state.play_timer > self.config.abandon_after
            && sessions.count_in(SessionState::Playing) == 0
        {
            self.return_to_lobby(sessions, "no players left");
        }
        Ok(())
    }

    fn return_to_lobby(&mut self, sessions: &mut SessionManager, reason: &str) {
        self.state.last = self.state.selected;
        self.state.selected = None;
        self.state.play_timer = Duration::ZERO;
        self.state.phase = Phase::Voting;
        self.state.reset_countdown();
        self.roster_cadence.reset();
        sessions.stop_playing();
        sessions.clear_votes();
        tracing::info!(reason, "returning to lobby");
    }

    fn selected_difficulty(&self) -> Result<Difficulty, LobbyError> {
        let index = self.state.selected.ok_or(LobbyError::NoSelection)?;
        let song = self
            .catalog
            .get(index)
            .ok_or(LobbyError::SelectionOutOfRange {
                index,
                len: self.catalog.len(),
            })?;
        preferred_difficulty(song, self.config.preferred_difficulty).ok_or_else(|| {
            LobbyError::Catalog {
                path: song.external_id.to_string().into(),
                reason: "song has no difficulty levels".into(),
            }
        })
    }

    // =====================================================================
    // Catalog mutations
    // =====================================================================

    /// Adds a song and tells everyone to refresh their catalog.
    pub fn add_song(
        &mut self,
        song: Song,
        sessions: &SessionManager,
        out: &Broadcaster,
    ) -> Result<usize, LobbyError> {
        let external_id = song.external_id;
        let index = self.catalog.add(song)?;
        tracing::info!(external_id, index, "song added to catalog");
        self.publish_catalog(sessions, out)?;
        Ok(index)
    }

    /// Removes a song by external id and tells everyone to refresh.
    ///
    /// If it was the song pinned for this round, the round is abandoned and
    /// the lobby goes back to voting. Selected and last indices above the
    /// removed entry shift down so they keep pointing at the same songs.
    pub fn remove_song(
        &mut self,
        external_id: u32,
        sessions: &mut SessionManager,
        out: &Broadcaster,
    ) -> Result<Song, LobbyError> {
        let (index, song) = self
            .catalog
            .remove_by_external_id(external_id)
            .ok_or(LobbyError::SongNotFound(external_id))?;

        match self.state.selected {
            Some(s) if s == index => {
                self.state.selected = None;
                if self.state.phase == Phase::Playing {
                    self.state.play_timer = Duration::ZERO;
                    self.state.reset_countdown();
                    sessions.stop_playing();
                }
                self.state.phase = Phase::Voting;
                tracing::info!(external_id, "selected song removed, back to voting");
            }
            Some(s) if s > index => self.state.selected = Some(s - 1),
            _ => {}
        }
        self.state.last = match self.state.last {
            // The next List pick is then the song that followed the removed one.
            Some(l) if l == index => index.checked_sub(1),
            Some(l) if l > index => Some(l - 1),
            other => other,
        };

        tracing::info!(external_id, index, "song removed from catalog");
        self.publish_catalog(sessions, out)?;
        Ok(song)
    }

    fn publish_catalog(
        &self,
        sessions: &SessionManager,
        out: &Broadcaster,
    ) -> Result<(), LobbyError> {
        out.publish(
            sessions,
            &ServerCommand::RefreshCatalog {
                songs: self.catalog.external_ids(),
            },
        )?;
        Ok(())
    }
}

fn roster_command(players: Vec<PlayerInfo>, song: Option<(f64, f64)>) -> ServerCommand {
    ServerCommand::SetPlayerRoster {
        players,
        selected_song_duration: song.map(|(duration, _)| duration),
        selected_song_play_time: song.map(|(_, play_time)| play_time),
    }
}
