//! Lobby configuration and state.

use std::time::Duration;

use beatlobby_protocol::Difficulty;
use serde::{Deserialize, Serialize};

use crate::SongOrder;

// ---------------------------------------------------------------------------
// LobbyConfig
// ---------------------------------------------------------------------------

/// Settings the lobby reads every tick. Loaded once at startup.
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// Length of the voting countdown. Song selection happens at the
    /// halfway point, the song starts at the end.
    pub lobby_time: Duration,

    /// Tier to aim for when a song offers several.
    pub preferred_difficulty: Difficulty,

    /// How the next song is chosen.
    pub song_order: SongOrder,

    /// `SetPlayerRoster` broadcasts per second, in every phase.
    pub roster_rate_hz: u32,

    /// How long past the song's end the lobby waits before returning to
    /// voting.
    pub end_grace: Duration,

    /// How long into a song the lobby waits before giving up on a round
    /// that nobody is playing.
    pub abandon_after: Duration,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            lobby_time: Duration::from_secs(60),
            preferred_difficulty: Difficulty::ExpertPlus,
            song_order: SongOrder::Voting,
            roster_rate_hz: 20,
            end_grace: Duration::from_millis(2500),
            abandon_after: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// The lobby's phase.
///
/// ```text
///        ┌───────────────────────────────────────────────┐
///        ▼                                               │
///   Voting ──(song selected)──→ Preparing ──(countdown)──→ Playing
/// ```
///
/// - **Voting**: counting down, collecting votes, no song chosen yet.
/// - **Preparing**: a song is pinned; clients show "starting soon".
/// - **Playing**: everyone is playing the selected song.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Voting,
    Preparing,
    Playing,
}

impl Phase {
    /// Returns `true` while the countdown runs (Voting and Preparing).
    pub fn is_counting_down(&self) -> bool {
        matches!(self, Self::Voting | Self::Preparing)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Voting => write!(f, "Voting"),
            Self::Preparing => write!(f, "Preparing"),
            Self::Playing => write!(f, "Playing"),
        }
    }
}

// ---------------------------------------------------------------------------
// LobbyState
// ---------------------------------------------------------------------------

/// Everything the lobby remembers between ticks.
///
/// `selected` is always `None` or a valid catalog index, and is `None`
/// whenever the phase is `Voting`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LobbyState {
    pub(crate) phase: Phase,
    pub(crate) selected: Option<usize>,
    pub(crate) last: Option<usize>,
    pub(crate) lobby_timer: Duration,
    pub(crate) play_timer: Duration,
    pub(crate) uptime: Duration,
    /// Whole seconds of `lobby_timer` already announced.
    pub(crate) countdown_second: u32,
}

impl LobbyState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Catalog index of the song for the current round.
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Catalog index of the song played last round.
    pub fn last(&self) -> Option<usize> {
        self.last
    }

    pub fn lobby_timer(&self) -> Duration {
        self.lobby_timer
    }

    pub fn play_timer(&self) -> Duration {
        self.play_timer
    }

    /// Total time the lobby has been ticking.
    pub fn uptime(&self) -> Duration {
        self.uptime
    }

    pub(crate) fn reset_countdown(&mut self) {
        self.lobby_timer = Duration::ZERO;
        self.countdown_second = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_is_counting_down() {
        assert!(Phase::Voting.is_counting_down());
        assert!(Phase::Preparing.is_counting_down());
        assert!(!Phase::Playing.is_counting_down());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Preparing.to_string(), "Preparing");
    }

    #[test]
    fn test_lobby_state_default_is_idle_voting() {
        let state = LobbyState::default();
        assert_eq!(state.phase(), Phase::Voting);
        assert_eq!(state.selected(), None);
        assert_eq!(state.last(), None);
        assert_eq!(state.lobby_timer(), Duration::ZERO);
    }

    #[test]
    fn test_lobby_config_default() {
        let config = LobbyConfig::default();
        assert_eq!(config.roster_rate_hz, 20);
        assert_eq!(config.end_grace, Duration::from_millis(2500));
        assert_eq!(config.abandon_after, Duration::from_secs(5));
    }
}
