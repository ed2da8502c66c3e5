//! Validation and submission reward calculation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spot_core::constants::{
    BASE_VALIDATION_RATE_MICROS, BOUNTY_VALIDATION_REWARD_MICROS, DEFAULT_SUBMISSION_REWARD_MICROS,
    MAX_VALIDATION_REWARD_MICROS,
};
use spot_core::error::check_dollars;
use spot_core::{
    Amount, Claim, ClaimStage, ConfigError, ConfigResult, EntryKind, LedgerEntry, RewardQuote, Tier,
    ValidatorState,
};
use spot_validator::{daily_streak_multiplier, session_streak_multiplier, tier_multiplier};
use std::collections::HashMap;

/// Reward configuration. Money is given in dollars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub base_validation_rate: f64,
    pub max_validation_reward: f64,

    /// Flat reward for votes on bounty-linked claims without their own price
    pub bounty_validation_reward: f64,

    /// Submission reward for categories missing from `submission_pricing`
    pub default_submission_reward: f64,

    /// Category -> submission reward
    pub submission_pricing: HashMap<String, f64>,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            base_validation_rate: Amount::from_micros(BASE_VALIDATION_RATE_MICROS).as_dollars(),
            max_validation_reward: Amount::from_micros(MAX_VALIDATION_REWARD_MICROS).as_dollars(),
            bounty_validation_reward: Amount::from_micros(BOUNTY_VALIDATION_REWARD_MICROS).as_dollars(),
            default_submission_reward: Amount::from_micros(DEFAULT_SUBMISSION_REWARD_MICROS).as_dollars(),
            submission_pricing: HashMap::new(),
        }
    }
}

impl RewardConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        check_dollars("base_validation_rate", self.base_validation_rate)?;
        check_dollars("max_validation_reward", self.max_validation_reward)?;
        check_dollars("bounty_validation_reward", self.bounty_validation_reward)?;
        check_dollars("default_submission_reward", self.default_submission_reward)?;
        for (category, price) in &self.submission_pricing {
            check_dollars(&format!("submission_pricing.{}", category), *price)?;
        }
        if self.base_validation_rate > self.max_validation_reward {
            return Err(ConfigError::Inconsistent(format!(
                "base_validation_rate ({}) exceeds max_validation_reward ({})",
                self.base_validation_rate, self.max_validation_reward
            )));
        }
        Ok(())
    }
}

/// How a standard validation reward was put together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub base: Amount,
    pub tier_multiplier: f64,
    pub daily_multiplier: f64,
    pub session_multiplier: f64,
    pub uncapped: Amount,
    pub amount: Amount,
    pub capped: bool,
}

pub struct RewardCalculator {
    base_rate: Amount,
    cap: Amount,
    bounty_flat: Amount,
    default_submission: Amount,
    submission_pricing: HashMap<String, Amount>,
}

impl RewardCalculator {
    pub fn new(config: &RewardConfig) -> Self {
        Self {
            base_rate: Amount::from_dollars(config.base_validation_rate),
            cap: Amount::from_dollars(config.max_validation_reward),
            bounty_flat: Amount::from_dollars(config.bounty_validation_reward),
            default_submission: Amount::from_dollars(config.default_submission_reward),
            submission_pricing: config
                .submission_pricing
                .iter()
                .map(|(category, price)| (category.to_ascii_lowercase(), Amount::from_dollars(*price)))
                .collect(),
        }
    }

    /// base × tier × daily × session, capped. `None` for suspended validators.
    pub fn standard_breakdown(
        &self,
        tier: Tier,
        daily_streak_days: u32,
        session_streak_count: u32,
    ) -> Option<RewardBreakdown> {
        let tier_multiplier = tier_multiplier(tier)?;
        let daily_multiplier = daily_streak_multiplier(daily_streak_days);
        let session_multiplier = session_streak_multiplier(session_streak_count);

        let uncapped = self
            .base_rate
            .scale(tier_multiplier * daily_multiplier * session_multiplier);
        let capped = uncapped > self.cap;

        Some(RewardBreakdown {
            base: self.base_rate,
            tier_multiplier,
            daily_multiplier,
            session_multiplier,
            uncapped,
            amount: if capped { self.cap } else { uncapped },
            capped,
        })
    }

    /// Reward for a vote by `voter` (already carrying the post-vote streaks) on `claim`.
    ///
    /// Bounty-linked claims pay a flat amount that ignores tier and streaks.
    pub fn quote_validation(&self, claim: &Claim, voter: &ValidatorState) -> Option<RewardQuote> {
        if voter.tier.is_suspended() {
            return None;
        }

        if let Some(bounty) = &claim.bounty {
            let amount = bounty
                .validation_reward
                .unwrap_or(self.bounty_flat)
                .max(Amount::ZERO);
            return Some(RewardQuote {
                kind: EntryKind::BountyReward,
                amount,
            });
        }

        self.standard_breakdown(voter.tier, voter.daily_streak_days, voter.session_streak_count)
            .map(|b| RewardQuote {
                kind: EntryKind::ValidationReward,
                amount: b.amount,
            })
    }

    pub fn submission_reward(&self, category: &str) -> Amount {
        self.submission_pricing
            .get(&category.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default_submission)
    }

    /// Owner payout for an approved claim, `None` for any other stage
    pub fn submission_entry(&self, claim: &Claim, now: DateTime<Utc>) -> Option<LedgerEntry> {
        if claim.stage != ClaimStage::Approved {
            return None;
        }
        Some(LedgerEntry::payout(
            &claim.owner_id,
            &claim.id,
            EntryKind::SubmissionReward,
            self.submission_reward(&claim.category),
            now,
        ))
    }

    /// Ledger entry for a vote's frozen reward quote
    pub fn vote_entry(
        validator_id: &str,
        claim_id: &str,
        quote: &RewardQuote,
        now: DateTime<Utc>,
    ) -> LedgerEntry {
        LedgerEntry::payout(validator_id, claim_id, quote.kind, quote.amount, now)
    }
}

impl Default for RewardCalculator {
    fn default() -> Self {
        Self::new(&RewardConfig::default())
    }
}
