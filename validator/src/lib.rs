//! Spotline Validator Reputation
//!
//! Tracks each validator's long-run reliability: accuracy, vote weight, tier
//! and streaks, and the reward multipliers derived from them.

pub mod multipliers;
pub mod reputation;
pub mod streak;

pub use multipliers::{
    combined as combined_multiplier, daily_streak_multiplier, session_streak_multiplier,
    tier_multiplier,
};
pub use reputation::{ReputationConfig, ReputationTracker};
