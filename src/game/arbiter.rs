//! Hit Arbiter
//!
//! Resolves hit requests against the board. All requests for a match pass
//! through here one at a time in arrival order, so exactly one request can
//! observe a given mole as Active; every later one fails the state check.
//! That ordering is the whole first-hit-wins mechanism.

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::config::catalog::{ConfigCatalog, PerMoleType};
use crate::game::events::{DespawnReason, GameEvent};
use crate::game::ids::{MatchId, Millis, MoleId, PlayerId};
use crate::game::mole::{MoleBoard, MoleLookup, MoleState};
use crate::game::score::ScoreAggregator;

/// A player's attempt to hit a mole.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitRequest {
    /// Target mole
    pub mole_id: MoleId,
    /// Match the client believes the mole belongs to
    pub match_id: MatchId,
    /// Requesting player
    pub player_id: PlayerId,
}

/// Why a hit was refused. Rejections never mutate state or broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// No such mole in this match
    Unknown,
    /// Mole already hit or timed out
    AlreadyResolved,
    /// Arrived at or after the mole's deadline
    Stale,
}

/// Outcome of a hit submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HitVerdict {
    /// First valid hit; points were awarded
    Accepted {
        /// Points applied to the player
        points_delta: i32,
    },
    /// Refused
    Rejected(RejectReason),
}

impl HitVerdict {
    /// Whether the hit was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, HitVerdict::Accepted { .. })
    }
}

/// Per-match hit arbiter.
#[derive(Clone, Debug)]
pub struct HitArbiter {
    match_id: MatchId,
    /// Points per type, snapshotted from the catalog
    points: PerMoleType<i32>,
    accepted: u64,
    rejected: u64,
}

impl HitArbiter {
    /// Create an arbiter for one match.
    pub fn new(match_id: MatchId, catalog: &ConfigCatalog) -> Self {
        Self {
            match_id,
            points: catalog.mole_types.map(|_, def| def.base_points),
            accepted: 0,
            rejected: 0,
        }
    }

    /// Validate and resolve one hit.
    ///
    /// On acceptance the mole becomes Hit (which also cancels its timeout and
    /// frees the hole), then `mole.despawned{hit}`, `mole.hit` and
    /// `score.update` are pushed onto `events` in that order.
    pub fn submit_hit(
        &mut self,
        request: &HitRequest,
        now: Millis,
        board: &mut MoleBoard,
        scores: &mut ScoreAggregator,
        events: &mut Vec<GameEvent>,
    ) -> HitVerdict {
        let verdict = self.evaluate(request, now, board, scores, events);

        match verdict {
            HitVerdict::Accepted { .. } => self.accepted += 1,
            HitVerdict::Rejected(reason) => {
                self.rejected += 1;
                debug!(
                    match_id = %self.match_id,
                    mole_id = %request.mole_id,
                    player_id = %request.player_id,
                    ?reason,
                    "hit rejected"
                );
            }
        }

        verdict
    }

    fn evaluate(
        &self,
        request: &HitRequest,
        now: Millis,
        board: &mut MoleBoard,
        scores: &mut ScoreAggregator,
        events: &mut Vec<GameEvent>,
    ) -> HitVerdict {
        if request.match_id != self.match_id {
            return HitVerdict::Rejected(RejectReason::Unknown);
        }

        let mole = match board.lookup(request.mole_id) {
            MoleLookup::Active(mole) => mole,
            MoleLookup::Resolved(_) => return HitVerdict::Rejected(RejectReason::AlreadyResolved),
            MoleLookup::Unknown => return HitVerdict::Rejected(RejectReason::Unknown),
        };

        if mole.match_id != self.match_id {
            return HitVerdict::Rejected(RejectReason::Unknown);
        }
        if mole.is_expired(now) {
            return HitVerdict::Rejected(RejectReason::Stale);
        }

        let Some(mole) = board.resolve(request.mole_id, MoleState::Hit) else {
            return HitVerdict::Rejected(RejectReason::AlreadyResolved);
        };

        let points_delta = *self.points.get(mole.mole_type);

        events.push(GameEvent::mole_despawned(mole.id, DespawnReason::Hit));
        events.push(GameEvent::mole_hit(mole.id, request.player_id.clone(), points_delta));

        let snapshot = scores.apply_hit(&request.player_id, points_delta);
        events.push(GameEvent::ScoreUpdated { scores: snapshot });

        HitVerdict::Accepted { points_delta }
    }

    /// Hits accepted so far.
    pub fn accepted_count(&self) -> u64 {
        self.accepted
    }

    /// Hits rejected so far.
    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }
}
