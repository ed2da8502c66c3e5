//! Spotline Core Library
//!
//! Shared domain types for the validation consensus and reward engine:
//! claims, votes, validator state, money and ledger entries.

pub mod amount;
pub mod claim;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod validator;
pub mod vote;

// Re-export main types
pub use amount::Amount;
pub use claim::{BountyLink, Claim, ClaimStage};
pub use error::{ConfigError, ConfigResult};
pub use ledger::{compensation_key, idempotency_key, EntryKind, LedgerEntry};
pub use validator::{QuotaCounters, Tier, ValidatorState};
pub use vote::{Decision, RewardQuote, Vote};
