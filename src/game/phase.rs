//! Match State Machine
//!
//! `Waiting -> InProgress -> Finished`. Transitions only move forward and
//! `Finished` is absorbing. The machine owns the phase and the countdown;
//! the match aggregate decides what to stop when it fires.

use std::fmt;

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::config::catalog::{ConfigError, ModeRules};
use crate::game::ids::Millis;
use crate::game::score::ScoreAggregator;

/// Match phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Lobby, before the host starts the match
    Waiting,
    /// Moles are spawning and hits count
    InProgress,
    /// Terminal
    Finished,
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchPhase::Waiting => "waiting",
            MatchPhase::InProgress => "in_progress",
            MatchPhase::Finished => "finished",
        })
    }
}

/// Why a match finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Countdown reached zero
    TimeExpired,
    /// Win condition met
    WinConditionMet,
    /// Host or server aborted
    Aborted,
}

/// Mode-specific end predicate, checked after every tick.
pub trait WinCondition: Send + Sync {
    /// Whether the match should end now.
    fn is_met(&self, scores: &ScoreAggregator) -> bool;
}

impl<F> WinCondition for F
where
    F: Fn(&ScoreAggregator) -> bool + Send + Sync,
{
    fn is_met(&self, scores: &ScoreAggregator) -> bool {
        self(scores)
    }
}

/// Ends the match once any player reaches `target` points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoreTarget {
    /// Winning total
    pub target: i64,
}

impl WinCondition for ScoreTarget {
    fn is_met(&self, scores: &ScoreAggregator) -> bool {
        scores.leader().is_some_and(|leader| leader.total_score >= self.target)
    }
}

/// Errors raised by match lifecycle operations.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Configuration rejected at start; the match stays in `Waiting`.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transition not allowed from the current phase.
    #[error("cannot {action} a match in phase {phase}")]
    InvalidTransition {
        /// Attempted action
        action: &'static str,
        /// Phase at the time
        phase: MatchPhase,
    },
}

const SECOND_MS: Millis = 1000;

/// Phase and countdown for one match.
#[derive(Clone, Debug)]
pub struct MatchStateMachine {
    phase: MatchPhase,
    remaining_time_seconds: Option<u32>,
    /// Clock time of the next whole-second decrement
    next_second_at: Option<Millis>,
    started_at: Option<Millis>,
    finished_at: Option<Millis>,
    finish_reason: Option<FinishReason>,
}

impl Default for MatchStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchStateMachine {
    /// New machine in `Waiting`.
    pub fn new() -> Self {
        Self {
            phase: MatchPhase::Waiting,
            remaining_time_seconds: None,
            next_second_at: None,
            started_at: None,
            finished_at: None,
            finish_reason: None,
        }
    }

    /// `Waiting -> InProgress`, arming the countdown for timed modes.
    pub fn start(&mut self, rules: &ModeRules, now: Millis) -> Result<(), MatchError> {
        if self.phase != MatchPhase::Waiting {
            return Err(MatchError::InvalidTransition {
                action: "start",
                phase: self.phase,
            });
        }

        self.phase = MatchPhase::InProgress;
        self.started_at = Some(now);
        self.remaining_time_seconds = rules.time_limit_seconds;
        self.next_second_at = rules.time_limit_seconds.map(|_| now + SECOND_MS);
        Ok(())
    }

    /// Advance the countdown to `now`.
    ///
    /// Returns true if `remaining_time_seconds` changed. Several seconds are
    /// consumed at once if ticks were delayed.
    pub fn advance(&mut self, now: Millis) -> bool {
        if self.phase != MatchPhase::InProgress {
            return false;
        }
        let (Some(remaining), Some(mut next)) = (self.remaining_time_seconds, self.next_second_at) else {
            return false;
        };

        let mut left = remaining;
        while left > 0 && now >= next {
            left -= 1;
            next += SECOND_MS;
        }

        self.next_second_at = Some(next);
        self.remaining_time_seconds = Some(left);
        left != remaining
    }

    /// Whether the countdown has run out.
    pub fn time_expired(&self) -> bool {
        self.phase == MatchPhase::InProgress && self.remaining_time_seconds == Some(0)
    }

    /// Move to `Finished`. Returns false (and changes nothing) if already there.
    pub fn finish(&mut self, reason: FinishReason, now: Millis) -> bool {
        if self.phase == MatchPhase::Finished {
            return false;
        }
        self.phase = MatchPhase::Finished;
        self.next_second_at = None;
        self.finished_at = Some(now);
        self.finish_reason = Some(reason);
        true
    }

    /// Current phase.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Seconds left; `None` for untimed modes or before start.
    pub fn remaining_time_seconds(&self) -> Option<u32> {
        self.remaining_time_seconds
    }

    /// Why the match finished.
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    /// When the match started.
    pub fn started_at(&self) -> Option<Millis> {
        self.started_at
    }

    /// When the match finished.
    pub fn finished_at(&self) -> Option<Millis> {
        self.finished_at
    }
}
