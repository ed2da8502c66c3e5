//! Request and response types of the orchestrator API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spot_consensus::QuotaCheck;
use spot_core::{Amount, ClaimStage, Decision, EntryKind, Tier};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub claim_id: String,
    pub validator_id: String,
    pub decision: Decision,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl VoteRequest {
    pub fn new(claim_id: &str, validator_id: &str, decision: Decision, confidence: f64) -> Self {
        Self {
            claim_id: claim_id.to_string(),
            validator_id: validator_id.to_string(),
            decision,
            confidence,
            reasoning: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteStatus {
    Recorded,

    /// Vote committed but its ledger entry could not be written yet
    RecordedRewardPending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub claim_id: String,
    pub validator_id: String,
    pub status: VoteStatus,
    pub consensus_stage: ClaimStage,
    pub consensus_score: f64,

    /// `None` when the voter is suspended
    pub reward_amount: Option<Amount>,
    pub reward_kind: Option<EntryKind>,

    pub remaining_hour: u32,
    pub remaining_day: u32,
}

/// Per-item outcome of a batch submission
#[derive(Debug)]
pub struct BatchOutcome {
    pub claim_id: String,
    pub result: Result<VoteReceipt, EngineError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorStateView {
    pub validator_id: String,
    pub tier: Tier,
    pub accuracy: f64,
    pub vote_weight: f64,
    pub daily_streak_days: u32,
    pub session_streak_count: u32,
    pub quotas_remaining: QuotaCheck,
    pub total_votes: u64,
    pub resolved_votes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub claim_id: String,
    pub decision: Decision,
    pub confidence: f64,
    pub cast_at: DateTime<Utc>,
    pub reward: Option<Amount>,

    /// Current stage of the claim, if it still exists
    pub claim_stage: Option<ClaimStage>,

    /// Whether the vote agreed with the final outcome; `None` until resolved
    pub matched_outcome: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorStats {
    pub validator_id: String,
    pub tier: Tier,
    pub total_votes: u64,
    pub approvals: u64,
    pub rejections: u64,

    /// Votes on claims that have reached a terminal stage
    pub decided: u64,
    pub correct: u64,

    /// correct / decided, `None` with nothing decided yet
    pub accuracy_on_decided: Option<f64>,

    /// Net validation and bounty rewards in the ledger
    pub validation_earnings: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    NotTerminal,
    Applied,
    AlreadyProcessed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub claim_id: String,
    pub stage: ClaimStage,
    pub status: ResolutionStatus,
    pub voters_updated: usize,

    /// Submission reward inserted by this call
    pub submission_paid: Option<Amount>,

    /// Submission reward owed but not written; reconciliation will retry
    pub submission_pending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub votes_scanned: usize,
    pub rewards_backfilled: usize,
    pub claims_resolved: usize,
    pub submissions_backfilled: usize,
    pub failures: usize,
}
