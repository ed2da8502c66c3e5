//! Engine error types

use spot_core::{Amount, ClaimStage, ConfigError};
use spot_storage::StoreError;
use spot_treasury::TreasuryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Rate limit exceeded for {validator_id}: {remaining_hour} votes left this hour, {remaining_day} today")]
    RateLimitExceeded {
        validator_id: String,
        remaining_hour: u32,
        remaining_day: u32,
    },

    #[error("{validator_id} already voted on claim {claim_id}")]
    DuplicateVote {
        claim_id: String,
        validator_id: String,
    },

    #[error("{validator_id} owns claim {claim_id} and cannot validate it")]
    SelfValidation {
        claim_id: String,
        validator_id: String,
    },

    #[error("Claim {claim_id} is already {stage}")]
    ClaimAlreadyResolved { claim_id: String, stage: ClaimStage },

    #[error("Claim {claim_id} changed under every one of {attempts} commit attempts")]
    ConsensusRaceConflict { claim_id: String, attempts: u32 },

    #[error("Ledger write failed for entry {key}: {reason}")]
    LedgerWriteFailure { key: String, reason: String },

    #[error("Claim not found: {0}")]
    ClaimNotFound(String),

    #[error("Claim already registered: {0}")]
    ClaimExists(String),

    #[error("Ledger entry not found: {0}")]
    LedgerEntryNotFound(String),

    #[error("Correction {correction_id} was already booked as {booked}; use a new id to change the payout again")]
    CorrectionConflict { correction_id: String, booked: Amount },

    #[error("Invalid vote: {0}")]
    InvalidVote(String),

    #[error("Store call {operation} timed out after {after_ms}ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Treasury error: {0}")]
    Treasury(#[from] TreasuryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Rule violations the caller should see as-is; never retried
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            EngineError::RateLimitExceeded { .. }
                | EngineError::DuplicateVote { .. }
                | EngineError::SelfValidation { .. }
                | EngineError::ClaimAlreadyResolved { .. }
                | EngineError::ClaimNotFound(_)
                | EngineError::ClaimExists(_)
                | EngineError::CorrectionConflict { .. }
                | EngineError::InvalidVote(_)
        )
    }

    /// Races and store hiccups worth another attempt
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Store(e) => e.is_transient(),
            EngineError::ConsensusRaceConflict { .. } | EngineError::Timeout { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
