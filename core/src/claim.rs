//! Claims awaiting crowd validation
//!
//! Claims are created elsewhere. The engine reads identity, owner, category,
//! bounty link and difficulty, and writes the stage and vote-count fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amount::Amount;

/// Lifecycle of a claim. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStage {
    Submitted,
    Validating,
    Approved,
    Rejected,
}

impl ClaimStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClaimStage::Approved | ClaimStage::Rejected)
    }

    fn rank(&self) -> u8 {
        match self {
            ClaimStage::Submitted => 0,
            ClaimStage::Validating => 1,
            ClaimStage::Approved | ClaimStage::Rejected => 2,
        }
    }

    /// Whether moving from `self` to `next` keeps the stage monotonic.
    /// Staying put is allowed for non-terminal stages only.
    pub fn can_transition_to(&self, next: ClaimStage) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        next.rank() >= self.rank()
    }
}

impl fmt::Display for ClaimStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted => write!(f, "submitted"),
            Self::Validating => write!(f, "validating"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Link to an enterprise bounty. Opaque to the engine apart from the optional price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BountyLink {
    pub bounty_ref: String,

    /// Externally priced validation reward; the configured flat rate applies when absent
    #[serde(default)]
    pub validation_reward: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    pub owner_id: String,
    pub category: String,
    pub stage: ClaimStage,
    pub approve_count: u32,
    pub reject_count: u32,
    pub distinct_validator_count: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub bounty: Option<BountyLink>,

    /// 0.0 - 1.0, used only for prioritisation
    pub validation_difficulty: f64,

    /// Last weighted consensus score written by the engine
    #[serde(default)]
    pub consensus_score: f64,

    /// Optimistic-concurrency counter, bumped on every engine write
    #[serde(default)]
    pub version: u64,

    /// Set once the accuracy batch for a terminal claim has been applied
    #[serde(default)]
    pub resolution_processed: bool,

    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Claim {
    pub fn new(id: String, owner_id: String, category: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id,
            category,
            stage: ClaimStage::Submitted,
            approve_count: 0,
            reject_count: 0,
            distinct_validator_count: 0,
            created_at,
            bounty: None,
            validation_difficulty: 0.0,
            consensus_score: 0.0,
            version: 0,
            resolution_processed: false,
            resolved_at: None,
        }
    }

    pub fn with_difficulty(mut self, difficulty: f64) -> Self {
        self.validation_difficulty = if difficulty.is_finite() {
            difficulty.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn with_bounty(mut self, bounty: BountyLink) -> Self {
        self.bounty = Some(bounty);
        self
    }

    pub fn is_bounty_linked(&self) -> bool {
        self.bounty.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn total_votes(&self) -> u32 {
        self.approve_count + self.reject_count
    }
}
