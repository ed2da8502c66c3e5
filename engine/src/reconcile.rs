//! Ledger reconciliation and compensating corrections
//!
//! Reconciliation replays what committed votes and resolved claims imply and
//! inserts whatever the ledger is missing. Every insert is keyed, so running
//! it any number of times leaves the same ledger.

use chrono::{DateTime, Utc};
use spot_core::{compensation_key, idempotency_key, Amount, ClaimStage, EntryKind, LedgerEntry};
use spot_storage::LedgerInsert;
use spot_treasury::{net_amount, plan_correction, RewardCalculator};

use crate::error::{EngineError, Result};
use crate::orchestrator::ValidationOrchestrator;
use crate::types::{ReconcileReport, ResolutionStatus};

impl ValidationOrchestrator {
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        self.reconcile_at(Utc::now()).await
    }

    pub async fn reconcile_at(&self, now: DateTime<Utc>) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let votes = self.call("all_votes", |s| s.all_votes()).await?;
        report.votes_scanned = votes.len();
        for vote in &votes {
            let Some(quote) = &vote.reward else {
                continue;
            };
            let entry = RewardCalculator::vote_entry(&vote.validator_id, &vote.claim_id, quote, vote.cast_at);
            match self.write_ledger(entry).await {
                Ok(insert) if insert.is_inserted() => {
                    log::info!(
                        "backfilled {} {} for {} on {}",
                        quote.kind,
                        quote.amount,
                        vote.validator_id,
                        vote.claim_id
                    );
                    report.rewards_backfilled += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("backfill for {} on {} failed: {}", vote.validator_id, vote.claim_id, e);
                    report.failures += 1;
                }
            }
        }

        let claims = self.call("list_claims", |s| s.list_claims()).await?;
        for claim in claims.iter().filter(|c| c.is_terminal()) {
            if !claim.resolution_processed {
                match self.resolve_claim_at(&claim.id, now).await {
                    Ok(r) => {
                        if r.status == ResolutionStatus::Applied {
                            report.claims_resolved += 1;
                        }
                        if r.submission_paid.is_some() {
                            report.submissions_backfilled += 1;
                        }
                        if r.submission_pending {
                            report.failures += 1;
                        }
                    }
                    Err(e) => {
                        log::warn!("resolving {} failed: {}", claim.id, e);
                        report.failures += 1;
                    }
                }
            } else if claim.stage == ClaimStage::Approved {
                match self.ensure_submission_reward(claim, now).await {
                    Ok(Some(_)) => report.submissions_backfilled += 1,
                    Ok(None) => {}
                    Err(e) => {
                        log::warn!("submission backfill for {} failed: {}", claim.id, e);
                        report.failures += 1;
                    }
                }
            }
        }

        if report.rewards_backfilled + report.claims_resolved + report.submissions_backfilled > 0 {
            log::info!(
                "reconcile: {} rewards, {} resolutions, {} submissions backfilled ({} failures)",
                report.rewards_backfilled,
                report.claims_resolved,
                report.submissions_backfilled,
                report.failures
            );
        }
        Ok(report)
    }

    /// Bring a payout to `corrected` by appending a compensating entry.
    ///
    /// Returns `None` when nothing needed to change. Replaying a
    /// `correction_id` returns the entry it booked; reusing it for a
    /// different amount fails with `CorrectionConflict`.
    pub async fn correct_reward(
        &self,
        user_id: &str,
        claim_id: &str,
        kind: EntryKind,
        corrected: Amount,
        correction_id: &str,
    ) -> Result<Option<LedgerEntry>> {
        if correction_id.trim().is_empty() {
            return Err(EngineError::InvalidVote("correction id is empty".to_string()));
        }

        let key = idempotency_key(user_id, claim_id, kind);
        let original = {
            let k = key.clone();
            self.call("ledger_entry", move |s| s.ledger_entry(&k)).await?
        }
        .ok_or(EngineError::LedgerEntryNotFound(key))?;

        let related: Vec<LedgerEntry> = {
            let c = claim_id.to_string();
            self.call("ledger_for_claim", move |s| s.ledger_for_claim(&c)).await?
        }
        .into_iter()
        .filter(|e| e.user_id == user_id)
        .collect();

        // A used correction id only replays the payout it already produced
        let booked_key = compensation_key(&original.idempotency_key, correction_id);
        if let Some(booked) = related.iter().find(|e| e.idempotency_key == booked_key) {
            if net_amount(&original, &related) == corrected {
                return Ok(Some(booked.clone()));
            }
            return Err(EngineError::CorrectionConflict {
                correction_id: correction_id.to_string(),
                booked: booked.amount,
            });
        }

        let Some(fix) = plan_correction(&original, &related, corrected, correction_id, Utc::now())? else {
            return Ok(None);
        };
        match self.write_ledger(fix.clone()).await? {
            LedgerInsert::Inserted => Ok(Some(fix)),
            LedgerInsert::AlreadyPresent(existing) if existing.amount == fix.amount => Ok(Some(existing)),
            LedgerInsert::AlreadyPresent(existing) => {
                log::warn!(
                    "correction {} raced: booked {}, wanted {}",
                    correction_id,
                    existing.amount,
                    fix.amount
                );
                Err(EngineError::CorrectionConflict {
                    correction_id: correction_id.to_string(),
                    booked: existing.amount,
                })
            }
        }
    }
}
