//! Validation votes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amount::Amount;
use crate::claim::ClaimStage;
use crate::ledger::EntryKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    /// +1 for approve, -1 for reject
    pub fn value(&self) -> f64 {
        match self {
            Decision::Approve => 1.0,
            Decision::Reject => -1.0,
        }
    }

    /// Whether this decision agrees with a terminal stage
    pub fn matches(&self, stage: ClaimStage) -> bool {
        matches!(
            (self, stage),
            (Decision::Approve, ClaimStage::Approved) | (Decision::Reject, ClaimStage::Rejected)
        )
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "approve" | "yes" => Ok(Decision::Approve),
            "reject" | "no" => Ok(Decision::Reject),
            other => Err(format!("unknown decision: {}", other)),
        }
    }
}

/// The payout a vote earned when it was cast
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardQuote {
    pub kind: EntryKind,
    pub amount: Amount,
}

/// A single validator's decision on a claim.
///
/// `weight` and `reward` are frozen at cast time so the consensus score and
/// the ledger can always be re-derived from the vote set alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub claim_id: String,
    pub validator_id: String,
    pub decision: Decision,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
    pub cast_at: DateTime<Utc>,
    pub weight: f64,
    #[serde(default)]
    pub reward: Option<RewardQuote>,
}

impl Vote {
    pub fn is_approval(&self) -> bool {
        matches!(self.decision, Decision::Approve)
    }

    /// weight × confidence, the vote's share of the score denominator
    pub fn influence(&self) -> f64 {
        self.weight * self.confidence
    }
}
