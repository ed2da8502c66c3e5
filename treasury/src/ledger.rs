//! Ledger arithmetic: totals and compensating corrections
//!
//! Entries are never edited. A payout that turns out wrong is corrected by
//! appending a signed delta that references the original key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spot_core::{Amount, EntryKind, LedgerEntry};
use std::collections::BTreeMap;

use crate::error::{Result, TreasuryError};

/// Net amount currently standing for `original`: the payout plus every
/// compensation that points at it.
pub fn net_amount(original: &LedgerEntry, entries: &[LedgerEntry]) -> Amount {
    original.amount
        + entries
            .iter()
            .filter(|e| e.compensates.as_deref() == Some(original.idempotency_key.as_str()))
            .map(|e| e.amount)
            .sum::<Amount>()
}

/// Compensating entry that brings `original` to `corrected`.
///
/// `related` are the entries already stored for the same user and claim.
/// Returns `Ok(None)` when the net already matches, so a repeated correction
/// is a no-op.
pub fn plan_correction(
    original: &LedgerEntry,
    related: &[LedgerEntry],
    corrected: Amount,
    correction_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<LedgerEntry>> {
    if original.is_compensation() {
        return Err(TreasuryError::CorrectionOfCorrection(
            original.idempotency_key.clone(),
        ));
    }
    if corrected.is_negative() {
        return Err(TreasuryError::InvalidAmount(format!(
            "corrected payout {} is negative",
            corrected
        )));
    }
    if let Some(stray) = related
        .iter()
        .find(|e| e.user_id != original.user_id || e.claim_id != original.claim_id)
    {
        return Err(TreasuryError::EntryMismatch {
            key: stray.idempotency_key.clone(),
            user_id: original.user_id.clone(),
            claim_id: original.claim_id.clone(),
        });
    }

    let delta = corrected - net_amount(original, related);
    if delta.is_zero() {
        return Ok(None);
    }

    log::info!(
        "correction {} for {}/{} {}: delta {}",
        correction_id,
        original.user_id,
        original.claim_id,
        original.kind,
        delta
    );
    Ok(Some(LedgerEntry::compensating(original, delta, correction_id, now)))
}

/// Per-user earnings rolled up from ledger entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub user_id: String,
    pub by_kind: BTreeMap<String, Amount>,
    pub total: Amount,
    pub entries: usize,
    pub compensations: usize,
}

impl LedgerSummary {
    pub fn from_entries(user_id: &str, entries: &[LedgerEntry]) -> Self {
        let mut summary = LedgerSummary {
            user_id: user_id.to_string(),
            ..Default::default()
        };
        for kind in EntryKind::all() {
            summary.by_kind.insert(kind.to_string(), Amount::ZERO);
        }

        for entry in entries.iter().filter(|e| e.user_id == user_id) {
            *summary.by_kind.entry(entry.kind.to_string()).or_default() += entry.amount;
            summary.total += entry.amount;
            summary.entries += 1;
            if entry.is_compensation() {
                summary.compensations += 1;
            }
        }
        summary
    }

    pub fn amount_for(&self, kind: EntryKind) -> Amount {
        self.by_kind.get(kind.as_str()).copied().unwrap_or_default()
    }
}
