//! Read-side queries: validator state, work queue, history and earnings

use chrono::{DateTime, Utc};
use spot_consensus::rate_limit;
use spot_core::{Amount, Claim, ClaimStage, Decision, EntryKind, ValidatorState};
use spot_treasury::LedgerSummary;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::orchestrator::ValidationOrchestrator;
use crate::types::{HistoryItem, ValidatorStateView, ValidatorStats};

/// Claims worth a validator's time first: hardest, then newest
fn queue_order(a: &Claim, b: &Claim) -> Ordering {
    b.validation_difficulty
        .total_cmp(&a.validation_difficulty)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

impl ValidationOrchestrator {
    async fn validator_or_fresh(&self, validator_id: &str, now: DateTime<Utc>) -> Result<ValidatorState> {
        let id = validator_id.to_string();
        let stored = self.call("load_validator", move |s| s.load_validator(&id)).await?;
        Ok(stored.unwrap_or_else(|| self.reputation.new_state(validator_id, now)))
    }

    pub async fn validator_state(&self, validator_id: &str) -> Result<ValidatorStateView> {
        self.validator_state_at(validator_id, Utc::now()).await
    }

    /// Current standing, with quotas as they would be for a vote at `now`
    pub async fn validator_state_at(&self, validator_id: &str, now: DateTime<Utc>) -> Result<ValidatorStateView> {
        let state = self.validator_or_fresh(validator_id, now).await?;
        let quotas_remaining = rate_limit::remaining(&state.quota, &self.limits, now);

        Ok(ValidatorStateView {
            validator_id: state.validator_id,
            tier: state.tier,
            accuracy: state.accuracy,
            vote_weight: state.vote_weight,
            daily_streak_days: state.daily_streak_days,
            session_streak_count: state.session_streak_count,
            quotas_remaining,
            total_votes: state.total_votes,
            resolved_votes: state.resolved_votes,
        })
    }

    /// Open claims this validator may still vote on, best first
    pub async fn prioritized_claims(&self, validator_id: &str, limit: usize) -> Result<Vec<Claim>> {
        let claims = self.call("list_claims", |s| s.list_claims()).await?;
        let voted: HashSet<String> = {
            let id = validator_id.to_string();
            self.call("votes_by_validator", move |s| s.votes_by_validator(&id))
                .await?
                .into_iter()
                .map(|v| v.claim_id)
                .collect()
        };

        let mut open: Vec<Claim> = claims
            .into_iter()
            .filter(|c| !c.is_terminal() && c.owner_id != validator_id && !voted.contains(&c.id))
            .collect();
        open.sort_by(queue_order);
        open.truncate(limit);
        Ok(open)
    }

    /// A validator's votes, newest first
    pub async fn validation_history(&self, validator_id: &str, limit: usize) -> Result<Vec<HistoryItem>> {
        let mut votes = {
            let id = validator_id.to_string();
            self.call("votes_by_validator", move |s| s.votes_by_validator(&id)).await?
        };
        votes.sort_by(|a, b| b.cast_at.cmp(&a.cast_at).then_with(|| a.claim_id.cmp(&b.claim_id)));
        votes.truncate(limit);

        let stages = self.claim_stages().await?;
        Ok(votes
            .into_iter()
            .map(|vote| {
                let claim_stage = stages.get(&vote.claim_id).copied();
                let matched_outcome = claim_stage
                    .filter(ClaimStage::is_terminal)
                    .map(|stage| vote.decision.matches(stage));
                HistoryItem {
                    claim_id: vote.claim_id,
                    decision: vote.decision,
                    confidence: vote.confidence,
                    cast_at: vote.cast_at,
                    reward: vote.reward.map(|q| q.amount),
                    claim_stage,
                    matched_outcome,
                }
            })
            .collect())
    }

    async fn claim_stages(&self) -> Result<HashMap<String, ClaimStage>> {
        Ok(self
            .call("list_claims", |s| s.list_claims())
            .await?
            .into_iter()
            .map(|c| (c.id, c.stage))
            .collect())
    }

    pub async fn validator_stats(&self, validator_id: &str) -> Result<ValidatorStats> {
        let now = Utc::now();
        let state = self.validator_or_fresh(validator_id, now).await?;
        let votes = {
            let id = validator_id.to_string();
            self.call("votes_by_validator", move |s| s.votes_by_validator(&id)).await?
        };
        let stages = self.claim_stages().await?;
        let summary = self.earnings_summary(validator_id).await?;

        let approvals = votes.iter().filter(|v| v.decision == Decision::Approve).count() as u64;
        let (mut decided, mut correct) = (0u64, 0u64);
        for vote in &votes {
            if let Some(stage) = stages.get(&vote.claim_id).filter(|s| s.is_terminal()) {
                decided += 1;
                if vote.decision.matches(*stage) {
                    correct += 1;
                }
            }
        }

        Ok(ValidatorStats {
            validator_id: validator_id.to_string(),
            tier: state.tier,
            total_votes: votes.len() as u64,
            approvals,
            rejections: votes.len() as u64 - approvals,
            decided,
            correct,
            accuracy_on_decided: (decided > 0).then(|| correct as f64 / decided as f64),
            validation_earnings: summary.amount_for(EntryKind::ValidationReward)
                + summary.amount_for(EntryKind::BountyReward),
        })
    }

    /// Net ledger totals for a user, compensations included
    pub async fn earnings_summary(&self, user_id: &str) -> Result<LedgerSummary> {
        let entries = {
            let id = user_id.to_string();
            self.call("ledger_for_user", move |s| s.ledger_for_user(&id)).await?
        };
        Ok(LedgerSummary::from_entries(user_id, &entries))
    }

    /// Total paid out across all kinds for one user
    pub async fn total_earnings(&self, user_id: &str) -> Result<Amount> {
        Ok(self.earnings_summary(user_id).await?.total)
    }
}
