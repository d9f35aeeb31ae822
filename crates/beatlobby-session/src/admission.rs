//! Admission control: who may join the lobby.
//!
//! The acceptor consults an [`Admission`] implementation twice: once with
//! only the peer address (before a session exists), and once more when the
//! player's `Hello` arrives with an id. Admin commands that change the
//! lists re-run the check against every live session.
//!
//! # Why a trait?
//!
//! The server only needs `is_allowed`. Keeping that behind a trait lets
//! tests plug in a fixed policy and keeps the list storage (which is
//! persisted with the settings file) out of the hot path's signature.

use std::net::IpAddr;

use beatlobby_protocol::PlayerId;
use serde::{Deserialize, Serialize};

/// Decides whether a connection may stay in the lobby.
///
/// `player` is `None` while the session is still `Connecting`. Only the
/// ban list can reject such a connection; the allow list waits for the id.
pub trait Admission: Send + Sync {
    fn is_allowed(&self, addr: IpAddr, player: Option<PlayerId>) -> bool;
}

/// Ban list plus an optional allow list.
///
/// Entries are plain strings compared against the textual form of the IP
/// address (`"10.0.0.7"`) or the player id (`"76561198000000000"`), so one
/// list can hold both.
///
/// # Rules
/// - Present on the ban list → denied.
/// - Allow-list mode enabled, player identified and neither its address
///   nor its id on the allow list → denied.
/// - Otherwise allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessList {
    pub banned: Vec<String>,
    pub allowed: Vec<String>,
    pub allow_list_enabled: bool,
}

impl AccessList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry to the ban list. Returns `false` if it was already there.
    pub fn ban(&mut self, entry: impl Into<String>) -> bool {
        insert_unique(&mut self.banned, entry.into())
    }

    /// Removes an entry from the ban list. Returns `false` if it was absent.
    pub fn unban(&mut self, entry: &str) -> bool {
        remove_entry(&mut self.banned, entry)
    }

    pub fn set_allow_list_enabled(&mut self, enabled: bool) {
        self.allow_list_enabled = enabled;
    }

    /// Adds an entry to the allow list. Returns `false` if it was already there.
    pub fn allow(&mut self, entry: impl Into<String>) -> bool {
        insert_unique(&mut self.allowed, entry.into())
    }

    /// Removes an entry from the allow list. Returns `false` if it was absent.
    pub fn disallow(&mut self, entry: &str) -> bool {
        remove_entry(&mut self.allowed, entry)
    }

    pub fn is_banned(&self, addr: IpAddr, player: Option<PlayerId>) -> bool {
        matches_any(&self.banned, addr, player)
    }
}

impl Admission for AccessList {
    fn is_allowed(&self, addr: IpAddr, player: Option<PlayerId>) -> bool {
        if self.is_banned(addr, player) {
            return false;
        }
        match player {
            Some(_) if self.allow_list_enabled => matches_any(&self.allowed, addr, player),
            _ => true,
        }
    }
}

fn matches_any(list: &[String], addr: IpAddr, player: Option<PlayerId>) -> bool {
    let addr = addr.to_string();
    let player = player.map(|p| p.to_string());
    list.iter()
        .any(|entry| *entry == addr || player.as_deref() == Some(entry.as_str()))
}

fn insert_unique(list: &mut Vec<String>, entry: String) -> bool {
    if list.contains(&entry) {
        return false;
    }
    list.push(entry);
    true
}

fn remove_entry(list: &mut Vec<String>, entry: &str) -> bool {
    let before = list.len();
    list.retain(|e| e != entry);
    list.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    #[test]
    fn test_is_allowed_empty_lists_allows_everyone() {
        let list = AccessList::new();
        assert!(list.is_allowed(ip(1), None));
        assert!(list.is_allowed(ip(1), Some(PlayerId(7))));
    }

    #[test]
    fn test_is_allowed_banned_address_denied() {
        let mut list = AccessList::new();
        list.ban("192.168.1.5");
        assert!(!list.is_allowed(ip(5), None));
        assert!(list.is_allowed(ip(6), None));
    }

    #[test]
    fn test_is_allowed_banned_player_denied_only_once_identified() {
        let mut list = AccessList::new();
        list.ban("42");
        assert!(list.is_allowed(ip(1), None));
        assert!(!list.is_allowed(ip(1), Some(PlayerId(42))));
    }

    #[test]
    fn test_is_allowed_allow_list_mode_requires_entry() {
        let mut list = AccessList::new();
        list.allow("99");
        // Disabled: the allow list has no effect.
        assert!(list.is_allowed(ip(1), Some(PlayerId(1))));

        list.set_allow_list_enabled(true);
        assert!(!list.is_allowed(ip(1), Some(PlayerId(1))));
        assert!(list.is_allowed(ip(1), Some(PlayerId(99))));
    }

    #[test]
    fn test_is_allowed_allow_list_defers_until_identified() {
        let mut list = AccessList::new();
        list.set_allow_list_enabled(true);
        list.allow("99");
        // Not yet identified: the id entry cannot be checked, so the
        // connection is let through to send its Hello.
        assert!(list.is_allowed(ip(1), None));
        assert!(list.is_allowed(ip(1), Some(PlayerId(99))));
        assert!(!list.is_allowed(ip(1), Some(PlayerId(5))));
    }

    #[test]
    fn test_is_allowed_allow_list_matches_address_entry() {
        let mut list = AccessList::new();
        list.set_allow_list_enabled(true);
        list.allow("192.168.1.4");
        assert!(list.is_allowed(ip(4), Some(PlayerId(5))));
        assert!(!list.is_allowed(ip(6), Some(PlayerId(5))));
    }

    #[test]
    fn test_is_allowed_ban_wins_over_allow() {
        let mut list = AccessList::new();
        list.set_allow_list_enabled(true);
        list.allow("192.168.1.3");
        list.ban("192.168.1.3");
        assert!(!list.is_allowed(ip(3), None));
    }

    #[test]
    fn test_ban_and_unban_report_changes() {
        let mut list = AccessList::new();
        assert!(list.ban("1.2.3.4"));
        assert!(!list.ban("1.2.3.4"));
        assert_eq!(list.banned.len(), 1);
        assert!(list.unban("1.2.3.4"));
        assert!(!list.unban("1.2.3.4"));
    }

    #[test]
    fn test_access_list_missing_fields_default() {
        let list: AccessList = serde_json::from_str(r#"{"banned":["1"]}"#).unwrap();
        assert_eq!(list.banned, vec!["1".to_string()]);
        assert!(list.allowed.is_empty());
        assert!(!list.allow_list_enabled);
    }
}
