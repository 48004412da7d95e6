//! Match State
//!
//! Root aggregate for one match. Ties the spawn scheduler, hit arbiter,
//! score table and phase machine together behind a single `tick(now)`.
//! Everything here is driven by explicit timestamps and one seeded RNG, so
//! the same seed and the same hit queue always produce the same events.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Deserialize};
use tracing::info;

use crate::config::catalog::{ConfigCatalog, GameModeId};
use crate::config::settings::MatchSettings;
use crate::game::arbiter::{HitArbiter, HitRequest, HitVerdict};
use crate::game::events::GameEvent;
use crate::game::ids::{MatchId, Millis};
use crate::game::mole::MoleBoard;
use crate::game::phase::{
    FinishReason, MatchError, MatchPhase, MatchStateMachine, ScoreTarget, WinCondition,
};
use crate::game::scheduler::MoleSpawnScheduler;
use crate::game::score::{PlayerScore, ScoreAggregator};

// =============================================================================
// TICK RESULT
// =============================================================================

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick, in order
    pub events: Vec<GameEvent>,
    /// Hit verdicts for the requests drained this tick, in queue order
    pub verdicts: Vec<(HitRequest, HitVerdict)>,
    /// Whether the match ended this tick
    pub match_ended: bool,
}

// =============================================================================
// MATCH SUMMARY
// =============================================================================

/// End-of-match report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    /// Match identifier
    pub match_id: MatchId,
    /// Mode played
    pub mode: GameModeId,
    /// Phase at the time of the report
    pub phase: MatchPhase,
    /// Why it finished, if it has
    pub finish_reason: Option<FinishReason>,
    /// Totals by score descending, then player id
    pub standings: Vec<PlayerScore>,
    /// Hits accepted
    pub hits_accepted: u64,
    /// Hits rejected
    pub hits_rejected: u64,
    /// Moles spawned
    pub moles_spawned: u64,
}

// =============================================================================
// MATCH STATE
// =============================================================================

/// Complete state of one match.
pub struct MatchState {
    id: MatchId,
    mode: GameModeId,
    catalog: Arc<ConfigCatalog>,
    machine: MatchStateMachine,
    scheduler: MoleSpawnScheduler,
    arbiter: HitArbiter,
    scores: ScoreAggregator,
    win_condition: Option<Box<dyn WinCondition>>,
    /// Hits waiting for the next tick, with their receive times
    pending_hits: VecDeque<(HitRequest, Millis)>,
    ticks: u64,
}

impl MatchState {
    /// Create a match in `Waiting`.
    ///
    /// The win condition defaults to the mode's score target, if it has one.
    pub fn new(
        id: MatchId,
        mode: GameModeId,
        catalog: Arc<ConfigCatalog>,
        settings: &MatchSettings,
        seed: u64,
    ) -> Self {
        let win_condition = catalog
            .mode(mode)
            .rules
            .score_target
            .map(|target| Box::new(ScoreTarget { target }) as Box<dyn WinCondition>);

        Self {
            id,
            mode,
            arbiter: HitArbiter::new(id, &catalog),
            scheduler: MoleSpawnScheduler::new(id, settings, seed),
            catalog,
            machine: MatchStateMachine::new(),
            scores: ScoreAggregator::new(),
            win_condition,
            pending_hits: VecDeque::new(),
            ticks: 0,
        }
    }

    /// Replace the win condition.
    pub fn with_win_condition(mut self, condition: impl WinCondition + 'static) -> Self {
        self.win_condition = Some(Box::new(condition));
        self
    }

    /// Remove the win condition; the match then ends on time or abort only.
    pub fn without_win_condition(mut self) -> Self {
        self.win_condition = None;
        self
    }

    /// `Waiting -> InProgress`.
    ///
    /// Configuration is validated first; on error the match is left exactly
    /// as it was. Returns the opening `match.state_update`.
    pub fn start(&mut self, now: Millis) -> Result<Vec<GameEvent>, MatchError> {
        if self.machine.phase() != MatchPhase::Waiting {
            return Err(MatchError::InvalidTransition {
                action: "start",
                phase: self.machine.phase(),
            });
        }

        self.scheduler.start(self.mode, &self.catalog, now)?;
        self.machine.start(&self.catalog.mode(self.mode).rules, now)?;

        info!(
            match_id = %self.id,
            mode = %self.mode,
            remaining = ?self.machine.remaining_time_seconds(),
            "match started"
        );

        Ok(vec![self.state_update()])
    }

    /// Queue a hit for the next tick. Queue order is arbitration order.
    pub fn enqueue_hit(&mut self, request: HitRequest, received_at: Millis) {
        self.pending_hits.push_back((request, received_at));
    }

    /// Run one tick at time `now`.
    ///
    /// Order: drain queued hits, advance the countdown, expire and spawn
    /// moles, then check the end conditions. Outside `InProgress` queued hits
    /// are still drained (and rejected) but nothing else happens.
    pub fn tick(&mut self, now: Millis) -> TickResult {
        let mut result = TickResult::default();
        self.ticks += 1;

        while let Some((request, received_at)) = self.pending_hits.pop_front() {
            let verdict = self.arbiter.submit_hit(
                &request,
                received_at,
                self.scheduler.board_mut(),
                &mut self.scores,
                &mut result.events,
            );
            result.verdicts.push((request, verdict));
        }

        if self.machine.phase() != MatchPhase::InProgress {
            return result;
        }

        let clock_changed = self.machine.advance(now);
        let time_expired = self.machine.time_expired();

        if !time_expired {
            result.events.extend(self.scheduler.tick(now));
            if clock_changed {
                result.events.push(self.state_update());
            }
        }

        let reason = if time_expired {
            Some(FinishReason::TimeExpired)
        } else if self
            .win_condition
            .as_ref()
            .is_some_and(|condition| condition.is_met(&self.scores))
        {
            Some(FinishReason::WinConditionMet)
        } else {
            None
        };

        if let Some(reason) = reason {
            result.events.extend(self.finish(reason, now));
            result.match_ended = true;
        }

        result
    }

    /// Abort the match. Idempotent: aborting a finished match does nothing.
    pub fn abort(&mut self, now: Millis) -> Vec<GameEvent> {
        self.finish(FinishReason::Aborted, now)
    }

    fn finish(&mut self, reason: FinishReason, now: Millis) -> Vec<GameEvent> {
        if !self.machine.finish(reason, now) {
            return Vec::new();
        }

        let mut events = self.scheduler.stop(now);
        events.push(self.state_update());

        let summary = self.summary();
        info!(
            match_id = %self.id,
            ?reason,
            hits_accepted = summary.hits_accepted,
            hits_rejected = summary.hits_rejected,
            moles_spawned = summary.moles_spawned,
            leader = ?summary.standings.first().map(|s| s.player_id.as_str()),
            "match finished"
        );

        events
    }

    /// Current `match.state_update`, for resync.
    pub fn state_update(&self) -> GameEvent {
        GameEvent::state_updated(self.machine.phase(), self.machine.remaining_time_seconds())
    }

    /// Current `score.update`, for resync.
    pub fn score_update(&self) -> GameEvent {
        GameEvent::ScoreUpdated {
            scores: self.scores.snapshot(),
        }
    }

    /// End-of-match report (valid at any phase).
    pub fn summary(&self) -> MatchSummary {
        MatchSummary {
            match_id: self.id,
            mode: self.mode,
            phase: self.machine.phase(),
            finish_reason: self.machine.finish_reason(),
            standings: self.scores.standings(),
            hits_accepted: self.arbiter.accepted_count(),
            hits_rejected: self.arbiter.rejected_count(),
            moles_spawned: self.scheduler.spawned_count(),
        }
    }

    /// Match identifier.
    pub fn id(&self) -> MatchId {
        self.id
    }

    /// Mode being played.
    pub fn mode(&self) -> GameModeId {
        self.mode
    }

    /// Current phase.
    pub fn phase(&self) -> MatchPhase {
        self.machine.phase()
    }

    /// Whether the match has finished.
    pub fn is_finished(&self) -> bool {
        self.machine.phase() == MatchPhase::Finished
    }

    /// Seconds left, for timed modes.
    pub fn remaining_time_seconds(&self) -> Option<u32> {
        self.machine.remaining_time_seconds()
    }

    /// Score table.
    pub fn scores(&self) -> &ScoreAggregator {
        &self.scores
    }

    /// Mole board.
    pub fn board(&self) -> &MoleBoard {
        self.scheduler.board()
    }

    /// Hits waiting for the next tick.
    pub fn pending_hit_count(&self) -> usize {
        self.pending_hits.len()
    }

    /// Ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }
}

impl fmt::Debug for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchState")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("machine", &self.machine)
            .field("scores", &self.scores)
            .field("pending_hits", &self.pending_hits.len())
            .field("has_win_condition", &self.win_condition.is_some())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::catalog::PerMoleType;
    use crate::game::arbiter::RejectReason;
    use crate::game::events::DespawnReason;
    use crate::game::ids::{MoleId, PlayerId};

    const MATCH: MatchId = MatchId::from_bytes([5; 16]);
    const STEP: Millis = 50;

    fn new_match(mode: GameModeId, seed: u64) -> MatchState {
        MatchState::new(MATCH, mode, ConfigCatalog::builtin(), &MatchSettings::default(), seed)
    }

    fn hit(mole_id: MoleId, player: &str) -> HitRequest {
        HitRequest {
            mole_id,
            match_id: MATCH,
            player_id: PlayerId::new(player),
        }
    }

    /// Tick until a mole spawns. Returns its id and the time reached.
    fn tick_until_spawn(state: &mut MatchState, mut now: Millis) -> (MoleId, Millis) {
        loop {
            now += STEP;
            assert!(now < 60_000, "no mole spawned");
            for event in state.tick(now).events {
                if let GameEvent::MoleSpawned { mole_id, .. } = event {
                    return (mole_id, now);
                }
            }
        }
    }

    #[test]
    fn test_start_emits_state_update() {
        let mut state = new_match(GameModeId::Timed, 1);
        assert_eq!(state.phase(), MatchPhase::Waiting);

        let events = state.start(0).unwrap();

        assert_eq!(events, vec![GameEvent::state_updated(MatchPhase::InProgress, Some(180))]);
        assert_eq!(state.phase(), MatchPhase::InProgress);
    }

    #[test]
    fn test_start_twice_rejected() {
        let mut state = new_match(GameModeId::Versus, 1);
        state.start(0).unwrap();

        assert!(matches!(
            state.start(10),
            Err(MatchError::InvalidTransition { phase: MatchPhase::InProgress, .. })
        ));
    }

    #[test]
    fn test_config_error_leaves_match_waiting() {
        let mut catalog = ConfigCatalog::default();
        catalog.base_weights = PerMoleType { standard: 0, deluxe: 0, penalty: 0 };
        catalog.modes.timed.spawn.weight_overrides.clear();

        let mut state =
            MatchState::new(MATCH, GameModeId::Timed, Arc::new(catalog), &MatchSettings::default(), 1);

        assert!(matches!(state.start(0), Err(MatchError::Config(_))));
        assert_eq!(state.phase(), MatchPhase::Waiting);

        let result = state.tick(10_000);
        assert!(result.events.is_empty());
    }

    #[test]
    fn test_untimed_mode_has_no_countdown() {
        let mut state = new_match(GameModeId::ScoreChase, 1);
        let events = state.start(0).unwrap();
        assert_eq!(events, vec![GameEvent::state_updated(MatchPhase::InProgress, None)]);

        let result = state.tick(5_000);
        assert!(!result
            .events
            .iter()
            .any(|e| matches!(e, GameEvent::StateUpdated { .. })));
    }

    #[test]
    fn test_timed_match_counts_down_and_finishes() {
        let mut state = new_match(GameModeId::Timed, 42);
        state.start(0).unwrap();

        let mut countdown = Vec::new();
        let mut now = 0;
        let mut last = TickResult::default();
        let mut active_before_end = Vec::new();

        while now < 180_000 {
            active_before_end = state.board().active_ids();
            now += 250;
            last = state.tick(now);
            for event in &last.events {
                if let GameEvent::StateUpdated { phase: MatchPhase::InProgress, remaining_time_seconds } = event {
                    countdown.push(remaining_time_seconds.unwrap());
                }
            }
            assert_eq!(last.match_ended, now == 180_000);
        }

        assert_eq!(countdown, (1..180).rev().collect::<Vec<u32>>());
        assert_eq!(state.phase(), MatchPhase::Finished);
        assert_eq!(state.summary().finish_reason, Some(FinishReason::TimeExpired));
        assert_eq!(
            last.events.last(),
            Some(&GameEvent::state_updated(MatchPhase::Finished, Some(0)))
        );

        assert!(!active_before_end.is_empty());
        for id in active_before_end {
            assert!(last
                .events
                .contains(&GameEvent::mole_despawned(id, DespawnReason::Timeout)));
        }
        assert_eq!(state.board().active_count(), 0);
    }

    #[test]
    fn test_simultaneous_hits_first_wins() {
        let mut state = new_match(GameModeId::Timed, 7);
        state.start(0).unwrap();
        let (mole_id, now) = tick_until_spawn(&mut state, 0);
        let mole_type = match state.board().lookup(mole_id) {
            crate::game::mole::MoleLookup::Active(mole) => mole.mole_type,
            other => panic!("mole not active: {other:?}"),
        };
        let expected = ConfigCatalog::builtin().base_points(mole_type);

        state.enqueue_hit(hit(mole_id, "a"), now + 1);
        state.enqueue_hit(hit(mole_id, "b"), now + 1);
        let result = state.tick(now + STEP);

        assert_eq!(result.verdicts[0].1, HitVerdict::Accepted { points_delta: expected });
        assert_eq!(result.verdicts[1].1, HitVerdict::Rejected(RejectReason::AlreadyResolved));

        let hits: Vec<_> = result
            .events
            .iter()
            .filter(|e| matches!(e, GameEvent::MoleHit { .. }))
            .collect();
        assert_eq!(hits, vec![&GameEvent::mole_hit(mole_id, PlayerId::new("a"), expected)]);
        assert_eq!(
            result
                .events
                .iter()
                .filter(|e| matches!(e, GameEvent::ScoreUpdated { .. }))
                .count(),
            1
        );
        assert_eq!(state.scores().total(&PlayerId::new("b")), None);
    }

    #[test]
    fn test_hit_received_before_deadline_counts() {
        let mut state = new_match(GameModeId::Timed, 9);
        state.start(0).unwrap();
        let (mole_id, now) = tick_until_spawn(&mut state, 0);
        let despawns_at = state.board().get(mole_id).map(|m| m.despawns_at).unwrap();

        state.enqueue_hit(hit(mole_id, "late"), despawns_at);
        state.enqueue_hit(hit(mole_id, "ok"), despawns_at - 1);
        let result = state.tick(now + STEP);

        assert_eq!(result.verdicts[0].1, HitVerdict::Rejected(RejectReason::Stale));
        assert!(result.verdicts[1].1.is_accepted());
    }

    #[test]
    fn test_win_condition_ends_match() {
        let mut state = new_match(GameModeId::Versus, 3)
            .with_win_condition(|scores: &ScoreAggregator| scores.player_count() > 0);
        state.start(0).unwrap();
        let (mole_id, now) = tick_until_spawn(&mut state, 0);

        state.enqueue_hit(hit(mole_id, "winner"), now);
        let result = state.tick(now + STEP);

        assert!(result.match_ended);
        assert_eq!(state.summary().finish_reason, Some(FinishReason::WinConditionMet));
        assert_eq!(state.board().active_count(), 0);
    }

    #[test]
    fn test_score_chase_defaults_to_target() {
        let mut state = new_match(GameModeId::ScoreChase, 11);
        state.start(0).unwrap();

        let mut now = 0;
        while !state.is_finished() {
            let (mole_id, at) = tick_until_spawn(&mut state, now);
            let is_penalty = state
                .board()
                .get(mole_id)
                .is_some_and(|m| m.mole_type == crate::config::catalog::MoleType::Penalty);
            if !is_penalty {
                state.enqueue_hit(hit(mole_id, "chaser"), at);
            }
            now = at + STEP;
            state.tick(now);
            assert!(now < 600_000);
        }

        assert_eq!(state.summary().finish_reason, Some(FinishReason::WinConditionMet));
        assert!(state.scores().total(&PlayerId::new("chaser")).unwrap() >= 100);
    }

    #[test]
    fn test_finished_is_absorbing() {
        let mut state = new_match(GameModeId::Timed, 5);
        state.start(0).unwrap();
        let (mole_id, now) = tick_until_spawn(&mut state, 0);

        let events = state.abort(now);
        assert!(events.contains(&GameEvent::mole_despawned(mole_id, DespawnReason::Timeout)));
        assert_eq!(events.last(), Some(&state.state_update()));

        state.enqueue_hit(hit(mole_id, "a"), now + 1);
        let result = state.tick(now + 10_000);
        assert!(result.events.is_empty());
        assert!(!result.match_ended);
        assert_eq!(result.verdicts[0].1, HitVerdict::Rejected(RejectReason::AlreadyResolved));
        assert_eq!(state.summary().moles_spawned, 1);
    }

    #[test]
    fn test_abort_idempotent() {
        let mut state = new_match(GameModeId::Timed, 5);

        let first = state.abort(0);
        assert_eq!(first, vec![GameEvent::state_updated(MatchPhase::Finished, None)]);
        assert!(state.abort(10).is_empty());
        assert_eq!(state.summary().finish_reason, Some(FinishReason::Aborted));
        assert!(state.start(20).is_err());
    }

    #[test]
    fn test_resync_snapshots() {
        let mut state = new_match(GameModeId::Timed, 8);
        state.start(0).unwrap();
        let (mole_id, now) = tick_until_spawn(&mut state, 0);
        state.enqueue_hit(hit(mole_id, "p"), now);
        state.tick(now + STEP);

        match state.score_update() {
            GameEvent::ScoreUpdated { scores } => {
                assert_eq!(scores.len(), 1);
                assert_eq!(scores[0].player_id, PlayerId::new("p"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            state.state_update(),
            GameEvent::StateUpdated { phase: MatchPhase::InProgress, .. }
        ));
    }

    #[test]
    fn test_replay_determinism() {
        fn run(seed: u64) -> (Vec<GameEvent>, MatchSummary) {
            let mut state = new_match(GameModeId::ScoreChase, seed).without_win_condition();
            let mut log = state.start(0).unwrap();
            let mut now = 0;
            while now < 30_000 {
                now += STEP;
                let result = state.tick(now);
                for event in &result.events {
                    if let GameEvent::MoleSpawned { mole_id, .. } = event {
                        let player = if mole_id.0 % 2 == 0 { "even" } else { "odd" };
                        state.enqueue_hit(hit(*mole_id, player), now + 10);
                    }
                }
                log.extend(result.events);
            }
            log.extend(state.abort(now));
            (log, state.summary())
        }

        let (events_a, summary_a) = run(1234);
        let (events_b, summary_b) = run(1234);
        assert_eq!(events_a, events_b);
        assert_eq!(summary_a, summary_b);
        assert!(summary_a.hits_accepted > 0);

        let (events_c, _) = run(4321);
        assert_ne!(events_a, events_c);
    }

    #[test]
    fn test_hits_wait_for_next_tick() {
        let mut state = new_match(GameModeId::Timed, 8);
        state.start(0).unwrap();
        let (mole_id, now) = tick_until_spawn(&mut state, 0);
        let ticks = state.tick_count();

        state.enqueue_hit(hit(mole_id, "a"), now + 1);
        state.enqueue_hit(hit(mole_id, "b"), now + 2);
        assert_eq!(state.pending_hit_count(), 2);
        assert_eq!(state.board().active_count(), 1);

        let result = state.tick(now + STEP);
        assert_eq!(state.pending_hit_count(), 0);
        assert_eq!(state.tick_count(), ticks + 1);
        assert_eq!(result.verdicts.len(), 2);
        assert!(result.verdicts[0].1.is_accepted());
        assert_eq!(result.verdicts[1].1, HitVerdict::Rejected(RejectReason::AlreadyResolved));
    }
}
