//! Validation orchestrator
//!
//! Single entry point for votes. Each vote runs:
//! guard -> quota reservation -> optimistic commit (vote + consensus + voter
//! activity) -> ledger write -> resolution when the claim just went terminal.
//! A commit that fails after the reservation hands the slot back.
//!
//! The orchestrator holds no durable state; everything lives in the store.

use chrono::{DateTime, Utc};
use spot_consensus::{ConsensusEngine, RateLimitConfig};
use spot_core::{Claim, LedgerEntry, ValidatorState, Vote};
use spot_storage::{
    LedgerInsert, MemoryStore, SledStore, StoreError, StoreResult, ValidationStore, VoteCommit,
};
use spot_treasury::RewardCalculator;
use spot_validator::ReputationTracker;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EngineConfig, StorageBackend};
use crate::error::{EngineError, Result};
use crate::fraud::FraudGuard;
use crate::retry::Backoff;
use crate::types::{BatchOutcome, VoteReceipt, VoteRequest, VoteStatus};

/// What a successful optimistic commit produced
pub(crate) struct Committed {
    pub claim: Claim,
    pub vote: Vote,
}

pub struct ValidationOrchestrator {
    pub(crate) store: Arc<dyn ValidationStore>,
    pub(crate) consensus: ConsensusEngine,
    pub(crate) reputation: ReputationTracker,
    pub(crate) rewards: RewardCalculator,
    pub(crate) guard: FraudGuard,
    pub(crate) limits: RateLimitConfig,
    pub(crate) backoff: Backoff,
    pub(crate) max_attempts: u32,
    pub(crate) store_timeout: Duration,
}

impl ValidationOrchestrator {
    pub fn new(config: EngineConfig, store: Arc<dyn ValidationStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            consensus: ConsensusEngine::new(config.consensus),
            reputation: ReputationTracker::new(config.reputation),
            rewards: RewardCalculator::new(&config.rewards),
            guard: FraudGuard::new(config.guard),
            limits: config.rate_limit,
            backoff: Backoff::from_config(&config.retry),
            max_attempts: config.retry.max_attempts,
            store_timeout: config.retry.store_timeout(),
        })
    }

    /// Build the store described by `config.storage` and wrap it
    pub fn open(config: EngineConfig) -> Result<Self> {
        let store: Arc<dyn ValidationStore> = match config.storage.backend {
            StorageBackend::Sled => {
                log::info!("opening sled store at {}", config.storage.data_dir.display());
                Arc::new(
                    SledStore::open(&config.storage.data_dir)?
                        .with_sync_writes(config.storage.sync_writes),
                )
            }
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        };
        Self::new(config, store)
    }

    pub fn store(&self) -> &Arc<dyn ValidationStore> {
        &self.store
    }

    /// Run a blocking store call off the async runtime, bounded by the store timeout
    pub(crate) async fn call<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ValidationStore) -> StoreResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || f(&*store));

        match tokio::time::timeout(self.store_timeout, task).await {
            Ok(Ok(result)) => result.map_err(EngineError::from),
            Ok(Err(join)) => Err(EngineError::Store(StoreError::Backend(format!(
                "{} task failed: {}",
                operation, join
            )))),
            Err(_) => {
                log::warn!("store call {} timed out", operation);
                Err(EngineError::Timeout {
                    operation,
                    after_ms: self.store_timeout.as_millis() as u64,
                })
            }
        }
    }

    pub(crate) async fn load_claim_required(&self, claim_id: &str) -> Result<Claim> {
        let id = claim_id.to_string();
        self.call("load_claim", move |s| s.load_claim(&id))
            .await?
            .ok_or_else(|| EngineError::ClaimNotFound(claim_id.to_string()))
    }

    /// Register a claim delivered by the submission side. An id that is
    /// already registered is refused and the stored claim left untouched.
    pub async fn register_claim(&self, claim: Claim) -> Result<()> {
        self.guard_id(&claim.id)?;
        self.guard_id(&claim.owner_id)?;
        log::info!("registering claim {} ({}) by {}", claim.id, claim.category, claim.owner_id);
        match self.call("insert_claim", move |s| s.insert_claim(&claim)).await {
            Err(EngineError::Store(StoreError::AlreadyExists { id, .. })) => Err(EngineError::ClaimExists(id)),
            other => other,
        }
    }

    fn guard_id(&self, id: &str) -> Result<()> {
        if id.trim().is_empty() || id.chars().any(char::is_control) {
            return Err(EngineError::InvalidVote(format!("unusable id {:?}", id)));
        }
        Ok(())
    }

    pub async fn claim(&self, claim_id: &str) -> Result<Claim> {
        self.load_claim_required(claim_id).await
    }

    /// Submit one vote
    pub async fn submit_vote(&self, request: VoteRequest) -> Result<VoteReceipt> {
        self.submit_vote_at(request, Utc::now()).await
    }

    /// Submit one vote as if cast at `now`
    pub async fn submit_vote_at(&self, request: VoteRequest, now: DateTime<Utc>) -> Result<VoteReceipt> {
        let request = self.guard.normalize(request)?;
        let claim_id = request.claim_id.clone();
        let validator_id = request.validator_id.clone();

        // Cheap rejections first so they never consume quota
        let claim = self.load_claim_required(&claim_id).await?;
        let already_voted = {
            let (c, v) = (claim_id.clone(), validator_id.clone());
            self.call("has_vote", move |s| s.has_vote(&c, &v)).await?
        };
        self.guard.check(&claim, &validator_id, already_voted)?;

        let quota = {
            let fresh = self.reputation.new_state(&validator_id, now);
            let limits = self.limits.clone();
            let v = validator_id.clone();
            self.call("reserve_quota", move |s| s.reserve_quota(&v, &limits, &fresh, now))
                .await?
        };
        if !quota.allowed {
            log::info!(
                "rate limit hit for {} ({} left this hour, {} today)",
                validator_id,
                quota.remaining_hour,
                quota.remaining_day
            );
            return Err(EngineError::RateLimitExceeded {
                validator_id,
                remaining_hour: quota.remaining_hour,
                remaining_day: quota.remaining_day,
            });
        }

        let committed = match self.commit_with_retry(&request, now).await {
            Ok(committed) => committed,
            Err(e) => {
                self.refund_quota(&claim_id, &validator_id, now).await;
                return Err(e);
            }
        };

        let status = match &committed.vote.reward {
            Some(quote) => {
                let entry = RewardCalculator::vote_entry(&validator_id, &claim_id, quote, committed.vote.cast_at);
                match self.write_ledger(entry).await {
                    Ok(_) => VoteStatus::Recorded,
                    Err(e) => {
                        log::warn!(
                            "vote by {} on {} recorded, reward pending: {}",
                            validator_id,
                            claim_id,
                            e
                        );
                        VoteStatus::RecordedRewardPending
                    }
                }
            }
            None => VoteStatus::Recorded,
        };

        if committed.claim.is_terminal() {
            if let Err(e) = self.resolve_claim_at(&claim_id, now).await {
                log::warn!("resolution of {} deferred to reconciliation: {}", claim_id, e);
            }
        }

        Ok(VoteReceipt {
            claim_id,
            validator_id,
            status,
            consensus_stage: committed.claim.stage,
            consensus_score: committed.claim.consensus_score,
            reward_amount: committed.vote.reward.map(|q| q.amount),
            reward_kind: committed.vote.reward.map(|q| q.kind),
            remaining_hour: quota.remaining_hour,
            remaining_day: quota.remaining_day,
        })
    }

    /// Submit several votes in order. Each item succeeds or fails on its own.
    pub async fn submit_votes(&self, batch: Vec<VoteRequest>) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(batch.len());
        for request in batch {
            let claim_id = request.claim_id.clone();
            let result = self.submit_vote(request).await;
            if let Err(e) = &result {
                log::debug!("batch item on {} failed: {}", claim_id, e);
            }
            outcomes.push(BatchOutcome { claim_id, result });
        }
        outcomes
    }

    /// Insert the vote and recompute consensus as one atomic unit, retrying
    /// on version conflicts with backoff.
    async fn commit_with_retry(&self, request: &VoteRequest, now: DateTime<Utc>) -> Result<Committed> {
        let claim_id = request.claim_id.as_str();
        let validator_id = request.validator_id.as_str();

        for attempt in 1..=self.max_attempts {
            let claim = self.load_claim_required(claim_id).await?;
            let votes = {
                let c = claim_id.to_string();
                self.call("votes_for_claim", move |s| s.votes_for_claim(&c)).await?
            };
            let stored_voter = {
                let v = validator_id.to_string();
                self.call("load_validator", move |s| s.load_validator(&v)).await?
            };

            let already_voted = votes.iter().any(|v| v.validator_id == validator_id);
            self.guard.check(&claim, validator_id, already_voted)?;

            let expected_validator_version = stored_voter.as_ref().map(|v| v.version);
            let mut voter = stored_voter.unwrap_or_else(|| self.reputation.new_state(validator_id, now));
            self.reputation.record_activity(&mut voter, now);

            let vote = self.build_vote(request, &claim, &voter, now);
            let mut all_votes = votes;
            all_votes.push(vote.clone());

            let outcome = self.consensus.evaluate(claim.stage, &all_votes);
            let mut updated = claim.clone();
            self.consensus.apply(&mut updated, &outcome, now);

            let commit = VoteCommit {
                claim: updated.clone(),
                expected_claim_version: claim.version,
                vote: vote.clone(),
                validator: voter,
                expected_validator_version,
            };

            match self.call("commit_vote", move |s| s.commit_vote(&commit)).await {
                Ok(()) => {
                    updated.version = claim.version + 1;
                    log::debug!(
                        "vote {} -> {} committed: {} score {:.3}",
                        validator_id,
                        claim_id,
                        updated.stage,
                        updated.consensus_score
                    );
                    return Ok(Committed { claim: updated, vote });
                }
                Err(EngineError::Store(StoreError::DuplicateVote { .. })) => {
                    return Err(EngineError::DuplicateVote {
                        claim_id: claim_id.to_string(),
                        validator_id: validator_id.to_string(),
                    });
                }
                Err(EngineError::Store(e)) if e.is_transient() => {
                    log::debug!(
                        "commit attempt {}/{} on {} lost: {}",
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

        log::warn!(
            "giving up on vote {} -> {} after {} conflicting attempts",
            validator_id,
            claim_id,
            self.max_attempts
        );
        Err(EngineError::ConsensusRaceConflict {
            claim_id: claim_id.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Hand back the slot reserved for a vote that never got stored.
    ///
    /// A timed-out commit may still land, so the slot is only returned once
    /// the store confirms there is no vote row.
    async fn refund_quota(&self, claim_id: &str, validator_id: &str, reserved_at: DateTime<Utc>) {
        let (c, v) = (claim_id.to_string(), validator_id.to_string());
        match self.call("has_vote", move |s| s.has_vote(&c, &v)).await {
            Ok(false) => {}
            Ok(true) => return,
            Err(e) => {
                log::warn!("keeping quota slot of {}: vote state unknown ({})", validator_id, e);
                return;
            }
        }

        let v = validator_id.to_string();
        match self
            .call("release_quota", move |s| s.release_quota(&v, reserved_at, Utc::now()))
            .await
        {
            Ok(true) => log::debug!("returned quota slot to {} after failed vote on {}", validator_id, claim_id),
            Ok(false) => {}
            Err(e) => log::warn!("could not return quota slot to {}: {}", validator_id, e),
        }
    }

    fn build_vote(&self, request: &VoteRequest, claim: &Claim, voter: &ValidatorState, now: DateTime<Utc>) -> Vote {
        Vote {
            claim_id: request.claim_id.clone(),
            validator_id: request.validator_id.clone(),
            decision: request.decision,
            confidence: request.confidence,
            reasoning: request.reasoning.clone(),
            cast_at: now,
            weight: voter.vote_weight,
            reward: self.rewards.quote_validation(claim, voter),
        }
    }

    /// Check-or-insert a ledger entry. Store failures surface as `LedgerWriteFailure`.
    pub(crate) async fn write_ledger(&self, entry: LedgerEntry) -> Result<LedgerInsert> {
        let key = entry.idempotency_key.clone();
        match self.call("insert_ledger_entry", move |s| s.insert_ledger_entry(&entry)).await {
            Ok(insert) => {
                if let LedgerInsert::AlreadyPresent(existing) = &insert {
                    log::debug!("ledger entry {} already present ({})", key, existing.amount);
                }
                Ok(insert)
            }
            Err(e) => Err(EngineError::LedgerWriteFailure {
                key,
                reason: e.to_string(),
            }),
        }
    }
}
