//! Claim resolution: voter accuracy, tiers and the owner's submission reward
//!
//! Runs at most once per terminal claim. The processed flag and every voter
//! update go to the store in one commit; a lost race reloads and retries.

use chrono::{DateTime, Utc};
use spot_core::{Amount, Claim, ClaimStage, ValidatorState};
use spot_storage::{ResolutionCommit, ResolutionStatus as StoredResolution};
use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::orchestrator::ValidationOrchestrator;
use crate::types::{ResolutionReport, ResolutionStatus};

impl ValidationOrchestrator {
    /// Apply the outcome of a terminal claim to everyone who voted on it
    pub async fn resolve_claim(&self, claim_id: &str) -> Result<ResolutionReport> {
        self.resolve_claim_at(claim_id, Utc::now()).await
    }

    pub async fn resolve_claim_at(&self, claim_id: &str, now: DateTime<Utc>) -> Result<ResolutionReport> {
        for attempt in 1..=self.max_attempts {
            let claim = self.load_claim_required(claim_id).await?;
            if !claim.is_terminal() {
                return Ok(ResolutionReport {
                    claim_id: claim.id,
                    stage: claim.stage,
                    status: ResolutionStatus::NotTerminal,
                    voters_updated: 0,
                    submission_paid: None,
                    submission_pending: false,
                });
            }
            if claim.resolution_processed {
                return self.finish(claim, ResolutionStatus::AlreadyProcessed, 0, now).await;
            }

            let commit = self.plan_resolution(&claim, now).await?;
            let voters_updated = commit.validators.len();

            match self.call("commit_resolution", move |s| s.commit_resolution(&commit)).await {
                Ok(StoredResolution::Applied) => {
                    log::info!(
                        "resolved {} as {}: {} voters updated",
                        claim.id,
                        claim.stage,
                        voters_updated
                    );
                    return self.finish(claim, ResolutionStatus::Applied, voters_updated, now).await;
                }
                Ok(StoredResolution::AlreadyProcessed) => {
                    return self.finish(claim, ResolutionStatus::AlreadyProcessed, 0, now).await;
                }
                Err(EngineError::Store(e)) if e.is_transient() => {
                    log::debug!(
                        "resolution attempt {}/{} on {} lost: {}",
                        attempt,
                        self.max_attempts,
                        claim_id,
                        e
                    );
                    if attempt < self.max_attempts {
                        self.backoff.wait(attempt).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(EngineError::ConsensusRaceConflict {
            claim_id: claim_id.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Updated state for every voter, with tiers ranked against the whole
    /// population as it will look after this resolution.
    async fn plan_resolution(&self, claim: &Claim, now: DateTime<Utc>) -> Result<ResolutionCommit> {
        let votes = {
            let id = claim.id.clone();
            self.call("votes_for_claim", move |s| s.votes_for_claim(&id)).await?
        };
        let population = self.call("list_validators", |s| s.list_validators()).await?;
        let mut by_id: HashMap<String, ValidatorState> = population
            .into_iter()
            .map(|v| (v.validator_id.clone(), v))
            .collect();

        let mut touched: Vec<(String, u64)> = Vec::with_capacity(votes.len());
        for vote in &votes {
            let Some(state) = by_id.get_mut(&vote.validator_id) else {
                log::warn!("voter {} on {} has no stored state", vote.validator_id, claim.id);
                continue;
            };
            let read_version = state.version;
            self.reputation
                .record_outcome(state, vote.decision.matches(claim.stage), now);
            touched.push((vote.validator_id.clone(), read_version));
        }

        let cutoff = self.reputation.master_cutoff(by_id.values(), now);

        let mut validators = Vec::with_capacity(touched.len());
        for (id, read_version) in touched {
            if let Some(mut state) = by_id.remove(&id) {
                self.reputation.refresh_tier(&mut state, cutoff);
                validators.push((state, read_version));
            }
        }

        let mut processed = claim.clone();
        processed.resolution_processed = true;
        Ok(ResolutionCommit {
            claim: processed,
            expected_claim_version: claim.version,
            validators,
        })
    }

    async fn finish(
        &self,
        claim: Claim,
        status: ResolutionStatus,
        voters_updated: usize,
        now: DateTime<Utc>,
    ) -> Result<ResolutionReport> {
        let (submission_paid, submission_pending) = if claim.stage == ClaimStage::Approved {
            match self.ensure_submission_reward(&claim, now).await {
                Ok(paid) => (paid, false),
                Err(e) => {
                    log::warn!("submission reward for {} pending: {}", claim.id, e);
                    (None, true)
                }
            }
        } else {
            (None, false)
        };

        Ok(ResolutionReport {
            claim_id: claim.id,
            stage: claim.stage,
            status,
            voters_updated,
            submission_paid,
            submission_pending,
        })
    }

    /// Insert the owner's submission reward if it is not there yet.
    /// Returns the amount when this call wrote it.
    pub(crate) async fn ensure_submission_reward(
        &self,
        claim: &Claim,
        now: DateTime<Utc>,
    ) -> Result<Option<Amount>> {
        let Some(entry) = self.rewards.submission_entry(claim, claim.resolved_at.unwrap_or(now)) else {
            return Ok(None);
        };
        let amount = entry.amount;
        let insert = self.write_ledger(entry).await?;
        if insert.is_inserted() {
            log::info!("submission reward {} paid to {} for {}", amount, claim.owner_id, claim.id);
            Ok(Some(amount))
        } else {
            Ok(None)
        }
    }
}
