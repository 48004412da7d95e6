//! Score Aggregator
//!
//! Authoritative per-player totals for one match. Every change produces a
//! full snapshot rather than a delta, so a client that missed updates can
//! resynchronise from the latest one alone.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::game::ids::PlayerId;

/// One player's total, as carried in `score.update`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerScore {
    /// Player identifier
    pub player_id: PlayerId,
    /// Running total (may be negative)
    pub total_score: i64,
}

/// Per-match score table.
#[derive(Clone, Debug, Default)]
pub struct ScoreAggregator {
    /// BTreeMap so snapshots come out in a stable order
    totals: BTreeMap<PlayerId, i64>,
}

impl ScoreAggregator {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `points_delta` to the player's total and return the full snapshot.
    ///
    /// Unconditional: the caller guarantees each resolved mole is applied
    /// at most once. Totals are not clamped.
    pub fn apply_hit(&mut self, player_id: &PlayerId, points_delta: i32) -> Vec<PlayerScore> {
        let total = self.totals.entry(player_id.clone()).or_insert(0);
        *total += i64::from(points_delta);
        self.snapshot()
    }

    /// Every player's total, ordered by player id.
    pub fn snapshot(&self) -> Vec<PlayerScore> {
        self.totals
            .iter()
            .map(|(player_id, total)| PlayerScore {
                player_id: player_id.clone(),
                total_score: *total,
            })
            .collect()
    }

    /// A player's total, if they have scored.
    pub fn total(&self, player_id: &PlayerId) -> Option<i64> {
        self.totals.get(player_id).copied()
    }

    /// Highest total (ties broken by lowest player id).
    pub fn leader(&self) -> Option<PlayerScore> {
        self.totals
            .iter()
            .max_by(|(id_a, a), (id_b, b)| a.cmp(b).then_with(|| id_b.cmp(id_a)))
            .map(|(player_id, total)| PlayerScore {
                player_id: player_id.clone(),
                total_score: *total,
            })
    }

    /// Totals sorted by score descending, then player id.
    pub fn standings(&self) -> Vec<PlayerScore> {
        let mut standings = self.snapshot();
        standings.sort_by(|a, b| {
            b.total_score
                .cmp(&a.total_score)
                .then_with(|| a.player_id.cmp(&b.player_id))
        });
        standings
    }

    /// Number of players with an entry.
    pub fn player_count(&self) -> usize {
        self.totals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> PlayerId {
        PlayerId::new(s)
    }

    #[test]
    fn test_lazy_entry_starts_at_zero() {
        let mut scores = ScoreAggregator::new();
        assert_eq!(scores.total(&pid("alice")), None);

        scores.apply_hit(&pid("alice"), 5);
        assert_eq!(scores.total(&pid("alice")), Some(5));
    }

    #[test]
    fn test_snapshot_is_full_table() {
        let mut scores = ScoreAggregator::new();
        scores.apply_hit(&pid("bob"), 15);
        let snapshot = scores.apply_hit(&pid("alice"), 5);

        assert_eq!(
            snapshot,
            vec![
                PlayerScore { player_id: pid("alice"), total_score: 5 },
                PlayerScore { player_id: pid("bob"), total_score: 15 },
            ]
        );
    }

    #[test]
    fn test_negative_totals_not_clamped() {
        let mut scores = ScoreAggregator::new();
        scores.apply_hit(&pid("carol"), -10);
        scores.apply_hit(&pid("carol"), -10);
        scores.apply_hit(&pid("carol"), 5);

        assert_eq!(scores.total(&pid("carol")), Some(-15));
    }

    #[test]
    fn test_leader_and_standings() {
        let mut scores = ScoreAggregator::new();
        assert!(scores.leader().is_none());

        scores.apply_hit(&pid("b"), 20);
        scores.apply_hit(&pid("a"), 20);
        scores.apply_hit(&pid("c"), -10);

        assert_eq!(scores.leader().unwrap().player_id, pid("a"));

        let order: Vec<String> = scores.standings().into_iter().map(|s| s.player_id.0).collect();
        assert_eq!(order, ["a", "b", "c"]);
        assert_eq!(scores.player_count(), 3);
    }
}
