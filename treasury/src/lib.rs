//! Spotline Treasury
//!
//! Turns votes and resolutions into payouts:
//! - standard validation rewards (base × tier × daily × session, capped)
//! - flat bounty validation rewards
//! - submission rewards for approved claims, priced by category
//!
//! Every payout is an append-only ledger entry keyed by its idempotency key.

pub mod error;
pub mod ledger;
pub mod rewards;

pub use error::{Result, TreasuryError};
pub use ledger::{net_amount, plan_correction, LedgerSummary};
pub use rewards::{RewardBreakdown, RewardCalculator, RewardConfig};
