//! Song selection policies and preferred-difficulty resolution.

use std::fmt;

use beatlobby_protocol::Difficulty;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Catalog, Song};

/// How the lobby picks the next song.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SongOrder {
    /// Most-voted song; the song after the last one if nobody voted.
    #[default]
    Voting,
    /// Uniformly random, bumped by one if it repeats the last song.
    Shuffle,
    /// Catalog order.
    List,
}

impl fmt::Display for SongOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Voting => write!(f, "voting"),
            Self::Shuffle => write!(f, "shuffle"),
            Self::List => write!(f, "list"),
        }
    }
}

/// Picks the next song index.
///
/// `votes` are the level ids voted for by identified sessions, in session
/// order. `last` is the previously played index.
///
/// Returns `None` only for an empty catalog. Any other result is a valid
/// index: a policy result past the end wraps to `0`.
pub fn select_song<'a, R: Rng>(
    order: SongOrder,
    votes: impl IntoIterator<Item = &'a str>,
    catalog: &Catalog,
    last: Option<usize>,
    rng: &mut R,
) -> Option<usize> {
    if catalog.is_empty() {
        return None;
    }
    let after_last = last.map_or(0, |l| l + 1);

    let index = match order {
        SongOrder::Voting => most_voted(votes)
            .and_then(|level_id| catalog.position_by_level_id(level_id))
            .unwrap_or(after_last),
        SongOrder::Shuffle => {
            let pick = rng.random_range(0..catalog.len());
            if Some(pick) == last { pick + 1 } else { pick }
        }
        SongOrder::List => after_last,
    };

    Some(if index >= catalog.len() { 0 } else { index })
}

/// The vote value with the most votes. On a tie, the value seen first wins.
fn most_voted<'a>(votes: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    // Tallies in first-seen order; a handful of entries, so a Vec is fine.
    let mut tally: Vec<(&'a str, usize)> = Vec::new();
    for vote in votes {
        match tally.iter_mut().find(|(v, _)| *v == vote) {
            Some((_, count)) => *count += 1,
            None => tally.push((vote, 1)),
        }
    }

    let mut best: Option<(&'a str, usize)> = None;
    for (vote, count) in tally {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((vote, count));
        }
    }
    best.map(|(vote, _)| vote)
}

/// The highest tier of `song` not above `preferred`; if every tier is
/// harder than that, the song's first listed tier.
pub fn preferred_difficulty(song: &Song, preferred: Difficulty) -> Option<Difficulty> {
    song.difficulties
        .iter()
        .map(|d| d.difficulty)
        .filter(|d| *d <= preferred)
        .max()
        .or_else(|| song.difficulties.first().map(|d| d.difficulty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DifficultyLevel;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn song(n: u32, tiers: &[Difficulty]) -> Song {
        Song {
            level_id: format!("L{n}"),
            external_id: n,
            title: format!("Song {n}"),
            subtitle: String::new(),
            author: String::new(),
            duration: 60.0,
            difficulties: tiers
                .iter()
                .map(|d| DifficultyLevel {
                    difficulty: *d,
                    notes: String::new(),
                })
                .collect(),
        }
    }

    fn catalog(n: u32) -> Catalog {
        Catalog::from_songs((0..n).map(|i| song(i, &[Difficulty::Hard])))
    }

    const NO_VOTES: [&str; 0] = [];

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    // =====================================================================
    // Voting
    // =====================================================================

    #[test]
    fn test_most_voted_majority_wins() {
        assert_eq!(most_voted(["A", "A", "B"]), Some("A"));
        assert_eq!(most_voted(["A", "B", "A"]), Some("A"));
        assert_eq!(most_voted(["B", "A", "A"]), Some("A"));
    }

    #[test]
    fn test_most_voted_tie_first_seen_wins() {
        assert_eq!(most_voted(["A", "B"]), Some("A"));
        assert_eq!(most_voted(["B", "A"]), Some("B"));
        assert_eq!(most_voted(["C", "A", "B", "B", "A"]), Some("A"));
    }

    #[test]
    fn test_most_voted_empty_is_none() {
        assert_eq!(most_voted(NO_VOTES), None);
    }

    #[test]
    fn test_select_voting_picks_voted_index() {
        let cat = catalog(3);
        let picked = select_song(SongOrder::Voting, ["L2", "L2", "L0"], &cat, Some(0), &mut rng());
        assert_eq!(picked, Some(2));
    }

    #[test]
    fn test_select_voting_no_votes_follows_last() {
        let cat = catalog(3);
        let picked = select_song(SongOrder::Voting, NO_VOTES, &cat, Some(0), &mut rng());
        assert_eq!(picked, Some(1));
    }

    #[test]
    fn test_select_voting_unknown_level_falls_back() {
        let cat = catalog(3);
        let picked = select_song(SongOrder::Voting, ["gone"], &cat, Some(2), &mut rng());
        assert_eq!(picked, Some(0));
    }

    // =====================================================================
    // List / Shuffle
    // =====================================================================

    #[test]
    fn test_select_list_cycles_and_wraps() {
        let cat = catalog(3);
        let mut last = Some(0);
        let mut picks = Vec::new();
        for _ in 0..3 {
            last = select_song(SongOrder::List, NO_VOTES, &cat, last, &mut rng());
            picks.push(last.unwrap());
        }
        assert_eq!(picks, vec![1, 2, 0]);
    }

    #[test]
    fn test_select_list_first_round_starts_at_zero() {
        let cat = catalog(3);
        assert_eq!(select_song(SongOrder::List, NO_VOTES, &cat, None, &mut rng()), Some(0));
    }

    #[test]
    fn test_select_empty_catalog_is_none() {
        let cat = Catalog::new();
        for order in [SongOrder::Voting, SongOrder::Shuffle, SongOrder::List] {
            assert_eq!(select_song(order, ["L0"], &cat, None, &mut rng()), None);
        }
    }

    #[test]
    fn test_select_shuffle_never_repeats_with_two_songs() {
        let cat = catalog(2);
        let mut r = rng();
        for _ in 0..50 {
            assert_eq!(select_song(SongOrder::Shuffle, NO_VOTES, &cat, Some(0), &mut r), Some(1));
        }
    }

    #[test]
    fn test_select_shuffle_single_song_wraps_to_zero() {
        // Bump past the end, then wrap: the only song repeats.
        let cat = catalog(1);
        assert_eq!(select_song(SongOrder::Shuffle, NO_VOTES, &cat, Some(0), &mut rng()), Some(0));
    }

    #[test]
    fn test_select_result_always_in_range() {
        let cat = catalog(4);
        let mut r = rng();
        for last in [None, Some(0), Some(3), Some(10)] {
            for order in [SongOrder::Voting, SongOrder::Shuffle, SongOrder::List] {
                let idx = select_song(order, NO_VOTES, &cat, last, &mut r).unwrap();
                assert!(idx < cat.len());
            }
        }
    }

    // =====================================================================
    // preferred_difficulty
    // =====================================================================

    #[test]
    fn test_preferred_difficulty_highest_not_above_preference() {
        use Difficulty::*;
        let s = song(0, &[Easy, Hard, ExpertPlus, Normal]);
        assert_eq!(preferred_difficulty(&s, Expert), Some(Hard));
        assert_eq!(preferred_difficulty(&s, ExpertPlus), Some(ExpertPlus));
        assert_eq!(preferred_difficulty(&s, Easy), Some(Easy));
    }

    #[test]
    fn test_preferred_difficulty_falls_back_to_first_listed() {
        use Difficulty::*;
        let s = song(0, &[ExpertPlus, Expert]);
        assert_eq!(preferred_difficulty(&s, Normal), Some(ExpertPlus));
    }

    #[test]
    fn test_preferred_difficulty_no_tiers_is_none() {
        let s = song(0, &[]);
        assert_eq!(preferred_difficulty(&s, Difficulty::Hard), None);
    }

    #[test]
    fn test_song_order_serde_lowercase() {
        let order: SongOrder = serde_json::from_str(r#""shuffle""#).unwrap();
        assert_eq!(order, SongOrder::Shuffle);
        assert_eq!(order.to_string(), "shuffle");
    }
}
