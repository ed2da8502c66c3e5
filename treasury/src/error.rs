//! Treasury error types

use thiserror::Error;

/// Payout and correction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreasuryError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Entry {0} is itself a compensation; correct the original payout instead")]
    CorrectionOfCorrection(String),

    #[error("Entry {key} does not belong to {user_id}/{claim_id}")]
    EntryMismatch {
        key: String,
        user_id: String,
        claim_id: String,
    },
}

pub type Result<T> = std::result::Result<T, TreasuryError>;
