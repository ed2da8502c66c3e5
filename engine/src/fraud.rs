//! Fraud and duplicate guard
//!
//! Runs before quota, consensus and rewards: a vote that fails here never
//! costs the validator quota and never reaches the store.

use spot_core::Claim;

use crate::config::GuardConfig;
use crate::error::{EngineError, Result};
use crate::types::VoteRequest;

pub struct FraudGuard {
    config: GuardConfig,
}

impl FraudGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    fn check_id(&self, field: &str, id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(EngineError::InvalidVote(format!("{} is empty", field)));
        }
        if id.len() > self.config.max_id_len {
            return Err(EngineError::InvalidVote(format!(
                "{} longer than {} bytes",
                field, self.config.max_id_len
            )));
        }
        if id.chars().any(char::is_control) {
            return Err(EngineError::InvalidVote(format!(
                "{} contains control characters",
                field
            )));
        }
        Ok(())
    }

    /// Validate the request shape and return it normalised
    pub fn normalize(&self, mut request: VoteRequest) -> Result<VoteRequest> {
        self.check_id("claim_id", &request.claim_id)?;
        self.check_id("validator_id", &request.validator_id)?;

        if !request.confidence.is_finite() || !(0.0..=1.0).contains(&request.confidence) {
            return Err(EngineError::InvalidVote(format!(
                "confidence {} outside [0, 1]",
                request.confidence
            )));
        }

        request.reasoning = match request.reasoning.take() {
            Some(text) => {
                let trimmed = text.trim();
                if trimmed.chars().count() > self.config.max_reasoning_chars {
                    return Err(EngineError::InvalidVote(format!(
                        "reasoning longer than {} characters",
                        self.config.max_reasoning_chars
                    )));
                }
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            None => None,
        };

        Ok(request)
    }

    /// Self-validation, duplicate and late-vote checks against current state
    pub fn check(&self, claim: &Claim, validator_id: &str, already_voted: bool) -> Result<()> {
        if claim.owner_id == validator_id {
            log::warn!("self-validation attempt by {} on {}", validator_id, claim.id);
            return Err(EngineError::SelfValidation {
                claim_id: claim.id.clone(),
                validator_id: validator_id.to_string(),
            });
        }
        if already_voted {
            return Err(EngineError::DuplicateVote {
                claim_id: claim.id.clone(),
                validator_id: validator_id.to_string(),
            });
        }
        if claim.is_terminal() {
            return Err(EngineError::ClaimAlreadyResolved {
                claim_id: claim.id.clone(),
                stage: claim.stage,
            });
        }
        Ok(())
    }
}

impl Default for FraudGuard {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use spot_core::{ClaimStage, Decision};

    fn claim() -> Claim {
        Claim::new("c1".into(), "owner".into(), "music".into(), Utc::now())
    }

    #[test]
    fn test_owner_cannot_validate() {
        let guard = FraudGuard::default();
        assert!(matches!(
            guard.check(&claim(), "owner", false),
            Err(EngineError::SelfValidation { .. })
        ));
        assert!(guard.check(&claim(), "someone", false).is_ok());
    }

    #[test]
    fn test_duplicate_and_late_votes() {
        let guard = FraudGuard::default();
        assert!(matches!(
            guard.check(&claim(), "v1", true),
            Err(EngineError::DuplicateVote { .. })
        ));

        let mut done = claim();
        done.stage = ClaimStage::Rejected;
        assert!(matches!(
            guard.check(&done, "v1", false),
            Err(EngineError::ClaimAlreadyResolved { stage: ClaimStage::Rejected, .. })
        ));
    }

    #[test]
    fn test_confidence_bounds() {
        let guard = FraudGuard::default();
        for bad in [-0.1, 1.01, f64::NAN, f64::INFINITY] {
            let request = VoteRequest::new("c1", "v1", Decision::Approve, bad);
            assert!(guard.normalize(request).is_err(), "confidence {} accepted", bad);
        }
        assert!(guard.normalize(VoteRequest::new("c1", "v1", Decision::Reject, 0.0)).is_ok());
    }

    #[test]
    fn test_reasoning_is_trimmed_and_bounded() {
        let guard = FraudGuard::new(GuardConfig {
            max_reasoning_chars: 10,
            ..Default::default()
        });

        let request = VoteRequest::new("c1", "v1", Decision::Approve, 0.5).with_reasoning("  seen it  ");
        assert_eq!(guard.normalize(request).unwrap().reasoning.as_deref(), Some("seen it"));

        let blank = VoteRequest::new("c1", "v1", Decision::Approve, 0.5).with_reasoning("   ");
        assert_eq!(guard.normalize(blank).unwrap().reasoning, None);

        let long = VoteRequest::new("c1", "v1", Decision::Approve, 0.5).with_reasoning("x".repeat(11));
        assert!(guard.normalize(long).is_err());
    }

    #[test]
    fn test_ids_are_checked() {
        let guard = FraudGuard::default();
        assert!(guard.normalize(VoteRequest::new("", "v1", Decision::Approve, 0.5)).is_err());
        assert!(guard.normalize(VoteRequest::new("c1", "v\u{1f}1", Decision::Approve, 0.5)).is_err());
    }
}
