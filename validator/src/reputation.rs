//! Validator reputation tracking
//!
//! Activity (streaks, counters) is recorded on every vote. Accuracy, weight
//! and tier only move when a claim the validator voted on is resolved.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use spot_core::constants::STARTING_ACCURACY;
use spot_core::{ConfigError, ConfigResult, Tier, ValidatorState};

use crate::streak::{next_daily_streak, next_session_streak};

/// Quality votes needed for `verified`
pub const VERIFIED_QUALITY_VOTES: u64 = 50;

/// Quality votes needed for `elite`
pub const ELITE_QUALITY_VOTES: u64 = 200;
pub const ELITE_MIN_ACCURACY: f64 = 0.90;

/// Share of active validators eligible for `master`
pub const MASTER_PERCENTILE: f64 = 0.05;

/// Accuracy below which a validator is suspended, once the sample is large enough
pub const SUSPENSION_ACCURACY: f64 = 0.50;
pub const MIN_RESOLVED_SAMPLE: u64 = 20;

pub const ACTIVE_WINDOW_DAYS: i64 = 30;
pub const SESSION_TIMEOUT_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    pub verified_quality_votes: u64,
    pub elite_quality_votes: u64,
    pub elite_min_accuracy: f64,
    pub master_percentile: f64,
    pub suspension_accuracy: f64,

    /// Resolved votes required before suspension or master ranking applies
    pub min_resolved_sample: u64,

    /// Validators who voted within this many days count toward the master ranking
    pub active_window_days: i64,

    pub session_timeout_secs: i64,
    pub starting_accuracy: f64,

    /// weight = max(weight_offset + accuracy, min_weight)
    pub weight_offset: f64,
    pub min_weight: f64,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            verified_quality_votes: VERIFIED_QUALITY_VOTES,
            elite_quality_votes: ELITE_QUALITY_VOTES,
            elite_min_accuracy: ELITE_MIN_ACCURACY,
            master_percentile: MASTER_PERCENTILE,
            suspension_accuracy: SUSPENSION_ACCURACY,
            min_resolved_sample: MIN_RESOLVED_SAMPLE,
            active_window_days: ACTIVE_WINDOW_DAYS,
            session_timeout_secs: SESSION_TIMEOUT_SECS,
            starting_accuracy: STARTING_ACCURACY,
            weight_offset: 0.5,
            min_weight: 0.5,
        }
    }
}

impl ReputationConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, value) in [
            ("elite_min_accuracy", self.elite_min_accuracy),
            ("suspension_accuracy", self.suspension_accuracy),
            ("starting_accuracy", self.starting_accuracy),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }
        if !(self.master_percentile > 0.0 && self.master_percentile <= 1.0) {
            return Err(ConfigError::InvalidThreshold {
                name: "master_percentile",
                value: self.master_percentile,
            });
        }
        if !(self.min_weight > 0.0 && self.min_weight.is_finite()) {
            return Err(ConfigError::MustBePositive("min_weight"));
        }
        if !self.weight_offset.is_finite() {
            return Err(ConfigError::InvalidThreshold {
                name: "weight_offset",
                value: self.weight_offset,
            });
        }
        if self.session_timeout_secs <= 0 {
            return Err(ConfigError::MustBePositive("session_timeout_secs"));
        }
        if self.active_window_days <= 0 {
            return Err(ConfigError::MustBePositive("active_window_days"));
        }
        if self.elite_quality_votes < self.verified_quality_votes {
            return Err(ConfigError::Inconsistent(format!(
                "elite_quality_votes ({}) is below verified_quality_votes ({})",
                self.elite_quality_votes, self.verified_quality_votes
            )));
        }
        Ok(())
    }

    pub fn session_timeout(&self) -> TimeDelta {
        TimeDelta::seconds(self.session_timeout_secs)
    }
}

pub struct ReputationTracker {
    config: ReputationConfig,
}

impl ReputationTracker {
    pub fn new(config: ReputationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReputationConfig {
        &self.config
    }

    /// Monotonic map from accuracy to vote weight, never below `min_weight`
    pub fn weight_for(&self, accuracy: f64) -> f64 {
        (self.config.weight_offset + accuracy).max(self.config.min_weight)
    }

    /// State for a validator casting their first vote
    pub fn new_state(&self, validator_id: &str, now: DateTime<Utc>) -> ValidatorState {
        let accuracy = self.config.starting_accuracy;
        ValidatorState::new(validator_id.to_string(), accuracy, self.weight_for(accuracy), now)
    }

    /// Update streaks and counters for a vote cast at `now`
    pub fn record_activity(&self, state: &mut ValidatorState, now: DateTime<Utc>) {
        state.daily_streak_days = next_daily_streak(state.daily_streak_days, state.last_vote_at, now);
        state.session_streak_count = next_session_streak(
            state.session_streak_count,
            state.last_vote_at,
            now,
            self.config.session_timeout(),
        );
        state.total_votes += 1;
        state.last_vote_at = Some(state.last_vote_at.map_or(now, |last| last.max(now)));
        state.updated_at = now;
    }

    /// Fold one resolved vote into accuracy and weight.
    ///
    /// accuracy' = (accuracy·n + correct) / (n + 1), n = previously resolved votes
    pub fn record_outcome(&self, state: &mut ValidatorState, correct: bool, now: DateTime<Utc>) {
        let n = state.resolved_votes as f64;
        let hit = if correct { 1.0 } else { 0.0 };

        state.accuracy = ((state.accuracy * n + hit) / (n + 1.0)).clamp(0.0, 1.0);
        state.resolved_votes += 1;
        if correct {
            state.correct_votes += 1;
        }
        state.vote_weight = self.weight_for(state.accuracy);
        state.updated_at = now;
    }

    /// Tier implied by the validator's record. Suspension is never lifted here.
    pub fn evaluate_tier(&self, state: &ValidatorState, master_cutoff: Option<f64>) -> Tier {
        if state.tier.is_suspended() {
            return Tier::Suspended;
        }
        if state.resolved_votes >= self.config.min_resolved_sample
            && state.accuracy < self.config.suspension_accuracy
        {
            return Tier::Suspended;
        }

        let quality = state.correct_votes;
        let elite = quality >= self.config.elite_quality_votes
            && state.accuracy >= self.config.elite_min_accuracy;

        if elite && master_cutoff.is_some_and(|cutoff| state.accuracy >= cutoff) {
            Tier::Master
        } else if elite {
            Tier::Elite
        } else if quality >= self.config.verified_quality_votes {
            Tier::Verified
        } else {
            Tier::Learning
        }
    }

    /// Re-evaluate and store the tier, logging any change
    pub fn refresh_tier(&self, state: &mut ValidatorState, master_cutoff: Option<f64>) -> Tier {
        let tier = self.evaluate_tier(state, master_cutoff);
        if tier != state.tier {
            if tier.is_suspended() {
                log::warn!(
                    "validator {} suspended: accuracy {:.3} over {} resolved votes",
                    state.validator_id,
                    state.accuracy,
                    state.resolved_votes
                );
            } else {
                log::info!("validator {} tier {} -> {}", state.validator_id, state.tier, tier);
            }
            state.tier = tier;
        }
        tier
    }

    /// Accuracy update followed by a tier refresh
    pub fn apply_outcome(
        &self,
        state: &mut ValidatorState,
        correct: bool,
        master_cutoff: Option<f64>,
        now: DateTime<Utc>,
    ) -> Tier {
        self.record_outcome(state, correct, now);
        self.refresh_tier(state, master_cutoff)
    }

    /// Counts toward the master ranking
    pub fn is_active(&self, state: &ValidatorState, now: DateTime<Utc>) -> bool {
        !state.tier.is_suspended()
            && state.resolved_votes >= self.config.min_resolved_sample
            && state
                .last_vote_at
                .is_some_and(|t| now - t <= TimeDelta::days(self.config.active_window_days))
    }

    /// Lowest accuracy still inside the top percentile of active validators
    pub fn master_cutoff<'a, I>(&self, validators: I, now: DateTime<Utc>) -> Option<f64>
    where
        I: IntoIterator<Item = &'a ValidatorState>,
    {
        let mut accuracies: Vec<f64> = validators
            .into_iter()
            .filter(|v| self.is_active(v, now))
            .map(|v| v.accuracy)
            .collect();
        if accuracies.is_empty() {
            return None;
        }

        accuracies.sort_by(|a, b| b.total_cmp(a));
        let take = ((accuracies.len() as f64 * self.config.master_percentile).ceil() as usize)
            .clamp(1, accuracies.len());
        Some(accuracies[take - 1])
    }
}

impl Default for ReputationTracker {
    fn default() -> Self {
        Self::new(ReputationConfig::default())
    }
}
