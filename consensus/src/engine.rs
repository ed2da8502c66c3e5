//! Weighted consensus over a claim's votes
//!
//! score = Σ(v·w·c) / Σ(w·c), with v = +1 approve / -1 reject, w the voter's
//! weight frozen on the vote and c the stated confidence. The score is
//! recomputed from the full vote set every time, never incrementally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spot_core::{Claim, ClaimStage, ConfigError, ConfigResult, Vote};
use std::collections::HashSet;

use crate::quorum::{
    has_quorum, majority_sign, threshold_decision, APPROVE_THRESHOLD, DEFAULT_MAX_VOTES,
    MIN_DISTINCT_VALIDATORS, REJECT_THRESHOLD,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub min_distinct_validators: u32,
    pub approve_threshold: f64,
    pub reject_threshold: f64,

    /// Votes after which the claim is force-resolved by the sign of the score
    pub max_votes: u32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_distinct_validators: MIN_DISTINCT_VALIDATORS,
            approve_threshold: APPROVE_THRESHOLD,
            reject_threshold: REJECT_THRESHOLD,
            max_votes: DEFAULT_MAX_VOTES,
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.min_distinct_validators == 0 {
            return Err(ConfigError::MustBePositive("min_distinct_validators"));
        }
        if !(self.approve_threshold > 0.0 && self.approve_threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold {
                name: "approve_threshold",
                value: self.approve_threshold,
            });
        }
        if !(self.reject_threshold < 0.0 && self.reject_threshold >= -1.0) {
            return Err(ConfigError::InvalidThreshold {
                name: "reject_threshold",
                value: self.reject_threshold,
            });
        }
        if self.max_votes < self.min_distinct_validators {
            return Err(ConfigError::Inconsistent(format!(
                "max_votes ({}) is below min_distinct_validators ({})",
                self.max_votes, self.min_distinct_validators
            )));
        }
        Ok(())
    }
}

/// Result of evaluating a vote set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub score: f64,
    pub stage: ClaimStage,
    pub approve_count: u32,
    pub reject_count: u32,
    pub distinct_validators: u32,

    /// Resolved by the vote cap rather than a threshold
    pub forced: bool,
}

impl ConsensusOutcome {
    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }
}

pub struct ConsensusEngine {
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Weighted score in [-1, 1]; 0 when no vote carries any influence
    pub fn score(&self, votes: &[Vote]) -> f64 {
        // Fixed summation order so the same vote set always gives the same float
        let mut ordered: Vec<&Vote> = votes.iter().collect();
        ordered.sort_by(|a, b| a.validator_id.cmp(&b.validator_id));

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for vote in ordered {
            let influence = vote.influence();
            if !influence.is_finite() || influence <= 0.0 {
                continue;
            }
            numerator += vote.decision.value() * influence;
            denominator += influence;
        }

        if denominator == 0.0 {
            return 0.0;
        }
        (numerator / denominator).clamp(-1.0, 1.0)
    }

    /// Stage implied by `votes` for a claim currently at `current`
    pub fn evaluate(&self, current: ClaimStage, votes: &[Vote]) -> ConsensusOutcome {
        let approve_count = votes.iter().filter(|v| v.is_approval()).count() as u32;
        let reject_count = votes.len() as u32 - approve_count;
        let distinct_validators = votes
            .iter()
            .map(|v| v.validator_id.as_str())
            .collect::<HashSet<_>>()
            .len() as u32;
        let score = self.score(votes);

        let mut outcome = ConsensusOutcome {
            score,
            stage: current,
            approve_count,
            reject_count,
            distinct_validators,
            forced: false,
        };

        if current.is_terminal() || votes.is_empty() {
            return outcome;
        }

        outcome.stage = ClaimStage::Validating;
        if !has_quorum(distinct_validators, self.config.min_distinct_validators) {
            return outcome;
        }

        if let Some(stage) =
            threshold_decision(score, self.config.approve_threshold, self.config.reject_threshold)
        {
            outcome.stage = stage;
        } else if approve_count + reject_count >= self.config.max_votes {
            outcome.stage = majority_sign(score);
            outcome.forced = true;
        }

        outcome
    }

    /// Write an outcome onto the claim. Returns true if the claim just became terminal.
    pub fn apply(&self, claim: &mut Claim, outcome: &ConsensusOutcome, now: DateTime<Utc>) -> bool {
        if !claim.stage.can_transition_to(outcome.stage) {
            log::warn!(
                "claim {}: refusing stage change {} -> {}",
                claim.id,
                claim.stage,
                outcome.stage
            );
            return false;
        }

        let was_terminal = claim.is_terminal();
        claim.approve_count = outcome.approve_count;
        claim.reject_count = outcome.reject_count;
        claim.distinct_validator_count = outcome.distinct_validators;
        claim.consensus_score = outcome.score;
        claim.stage = outcome.stage;

        let resolved = !was_terminal && claim.is_terminal();
        if resolved {
            claim.resolved_at = Some(now);
            log::info!(
                "claim {} {} with score {:.3} after {} votes{}",
                claim.id,
                claim.stage,
                outcome.score,
                claim.total_votes(),
                if outcome.forced { " (vote cap)" } else { "" }
            );
        }
        resolved
    }
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new(ConsensusConfig::default())
    }
}
