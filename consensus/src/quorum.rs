//! Quorum and threshold rules for claim consensus

use spot_core::ClaimStage;

/// Minimum distinct validators before a claim can reach a terminal stage
pub const MIN_DISTINCT_VALIDATORS: u32 = 3;

/// Default vote count after which a claim is force-resolved
pub const DEFAULT_MAX_VOTES: u32 = 15;

pub const APPROVE_THRESHOLD: f64 = 0.6;
pub const REJECT_THRESHOLD: f64 = -0.6;

pub fn has_quorum(distinct_validators: u32, min_distinct: u32) -> bool {
    distinct_validators >= min_distinct
}

/// Terminal stage implied by `score`, if it clears either threshold
pub fn threshold_decision(score: f64, approve_threshold: f64, reject_threshold: f64) -> Option<ClaimStage> {
    if score >= approve_threshold {
        Some(ClaimStage::Approved)
    } else if score <= reject_threshold {
        Some(ClaimStage::Rejected)
    } else {
        None
    }
}

/// Forced outcome once the vote cap is hit. A tie rejects.
pub fn majority_sign(score: f64) -> ClaimStage {
    if score > 0.0 {
        ClaimStage::Approved
    } else {
        ClaimStage::Rejected
    }
}
