//! Moles and the hole board.
//!
//! The board is the single owner of live moles. A mole is inserted Active,
//! resolved exactly once (Hit or TimedOut), and removed from the active set
//! in the same step; only a tombstone of its terminal state is kept so late
//! hit requests can be told apart from unknown ids.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::config::catalog::MoleType;
use crate::game::ids::{MatchId, Millis, MoleId};

/// Lifecycle state of a mole.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoleState {
    /// Visible and hittable
    Active,
    /// Resolved by a confirmed hit
    Hit,
    /// Resolved by its deadline or by the match ending
    TimedOut,
}

impl MoleState {
    /// Whether this is a terminal state.
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, MoleState::Active)
    }
}

/// A mole on the board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mole {
    /// Unique id within the match
    pub id: MoleId,
    /// Owning match
    pub match_id: MatchId,
    /// Hole the mole occupies
    pub hole_index: u8,
    /// Mole type
    pub mole_type: MoleType,
    /// When it became visible
    pub spawned_at: Millis,
    /// When it times out if not hit
    pub despawns_at: Millis,
    /// Lifecycle state
    pub state: MoleState,
}

impl Mole {
    /// Visible window length.
    #[inline]
    pub fn visible_ms(&self) -> Millis {
        self.despawns_at - self.spawned_at
    }

    /// Whether the deadline has passed at `now`.
    #[inline]
    pub fn is_expired(&self, now: Millis) -> bool {
        now >= self.despawns_at
    }
}

/// Result of looking a mole id up on the board.
#[derive(Debug, PartialEq, Eq)]
pub enum MoleLookup<'a> {
    /// Mole is live
    Active(&'a Mole),
    /// Mole existed and has already been resolved
    Resolved(MoleState),
    /// Never spawned in this match
    Unknown,
}

/// Hole occupancy plus the active mole set for one match.
#[derive(Clone, Debug)]
pub struct MoleBoard {
    /// Active mole per hole
    holes: Vec<Option<MoleId>>,
    /// Active moles (BTreeMap for deterministic iteration)
    active: BTreeMap<MoleId, Mole>,
    /// Terminal state of every resolved mole
    resolved: BTreeMap<MoleId, MoleState>,
}

impl MoleBoard {
    /// Create an empty board.
    pub fn new(hole_count: u8) -> Self {
        Self {
            holes: vec![None; usize::from(hole_count)],
            active: BTreeMap::new(),
            resolved: BTreeMap::new(),
        }
    }

    /// Number of holes.
    pub fn hole_count(&self) -> usize {
        self.holes.len()
    }

    /// Holes without an active mole, ascending.
    pub fn free_holes(&self) -> Vec<u8> {
        self.holes
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(idx, _)| idx as u8)
            .collect()
    }

    /// Place a new active mole.
    ///
    /// Returns the mole back if its hole is taken or out of range.
    pub fn insert(&mut self, mole: Mole) -> Result<(), Mole> {
        let slot = match self.holes.get_mut(usize::from(mole.hole_index)) {
            Some(slot) if slot.is_none() => slot,
            _ => return Err(mole),
        };
        *slot = Some(mole.id);
        self.active.insert(mole.id, mole);
        Ok(())
    }

    /// Look up a mole by id.
    pub fn lookup(&self, id: MoleId) -> MoleLookup<'_> {
        if let Some(mole) = self.active.get(&id) {
            return MoleLookup::Active(mole);
        }
        match self.resolved.get(&id) {
            Some(state) => MoleLookup::Resolved(*state),
            None => MoleLookup::Unknown,
        }
    }

    /// Get an active mole.
    pub fn get(&self, id: MoleId) -> Option<&Mole> {
        self.active.get(&id)
    }

    /// Transition an active mole to a terminal state and free its hole.
    ///
    /// Returns `None` if the mole is not active, so a second resolution of
    /// the same mole is a no-op.
    pub fn resolve(&mut self, id: MoleId, outcome: MoleState) -> Option<Mole> {
        debug_assert!(outcome.is_terminal());
        let mut mole = self.active.remove(&id)?;
        mole.state = outcome;

        if let Some(slot) = self.holes.get_mut(usize::from(mole.hole_index)) {
            if *slot == Some(id) {
                *slot = None;
            }
        }
        self.resolved.insert(id, outcome);

        Some(mole)
    }

    /// Active moles whose deadline has passed, oldest deadline first.
    pub fn expired(&self, now: Millis) -> Vec<MoleId> {
        let mut expired: Vec<(Millis, MoleId)> = self
            .active
            .values()
            .filter(|m| m.is_expired(now))
            .map(|m| (m.despawns_at, m.id))
            .collect();
        expired.sort_unstable();
        expired.into_iter().map(|(_, id)| id).collect()
    }

    /// Iterate active moles in id order.
    pub fn active(&self) -> impl Iterator<Item = &Mole> {
        self.active.values()
    }

    /// Ids of all active moles in id order.
    pub fn active_ids(&self) -> Vec<MoleId> {
        self.active.keys().copied().collect()
    }

    /// Number of active moles.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
