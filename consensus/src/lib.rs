//! Spotline Consensus
//!
//! Weighted accept/reject consensus over validator votes, plus the per-validator
//! vote quota rules.

pub mod engine;
pub mod quorum;
pub mod rate_limit;

pub use engine::{ConsensusConfig, ConsensusEngine, ConsensusOutcome};
pub use quorum::{has_quorum, majority_sign, threshold_decision, MIN_DISTINCT_VALIDATORS};
pub use rate_limit::{QuotaCheck, RateLimitConfig};
