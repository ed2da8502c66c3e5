//! Spotline Validation Engine
//!
//! Orchestrates validator votes on submitted claims: fraud checks, vote
//! quotas, weighted consensus, reputation tiers and the reward ledger.

pub mod config;
pub mod error;
pub mod fraud;
pub mod orchestrator;
pub mod queries;
pub mod reconcile;
pub mod resolution;
pub mod retry;
pub mod types;

pub use config::{ConfigLoadError, EngineConfig, GuardConfig, RetryConfig, StorageBackend, StorageConfig};
pub use error::{EngineError, Result};
pub use fraud::FraudGuard;
pub use orchestrator::ValidationOrchestrator;
pub use retry::Backoff;
pub use spot_treasury::LedgerSummary;
pub use types::{
    BatchOutcome, HistoryItem, ReconcileReport, ResolutionReport, ResolutionStatus, ValidatorStateView,
    ValidatorStats, VoteReceipt, VoteRequest, VoteStatus,
};
