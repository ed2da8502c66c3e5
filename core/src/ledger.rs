//! Append-only payout ledger entries
//!
//! An entry is identified by its idempotency key. The key for a payout is
//! derived from `(user_id, claim_id, kind)`, so re-processing the same event
//! always lands on the same key. Corrections are separate entries that point
//! back at the original key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::amount::Amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    ValidationReward,
    SubmissionReward,
    BountyReward,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::ValidationReward => "validation_reward",
            EntryKind::SubmissionReward => "submission_reward",
            EntryKind::BountyReward => "bounty_reward",
        }
    }

    pub fn all() -> [EntryKind; 3] {
        [
            EntryKind::ValidationReward,
            EntryKind::SubmissionReward,
            EntryKind::BountyReward,
        ]
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn hash_fields(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        // Length prefix keeps ("ab", "c") and ("a", "bc") apart
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// hash(user_id, claim_id, kind)
pub fn idempotency_key(user_id: &str, claim_id: &str, kind: EntryKind) -> String {
    hash_fields(&[user_id, claim_id, kind.as_str()])
}

/// Key of a compensating entry, unique per (original entry, correction id)
pub fn compensation_key(original_key: &str, correction_id: &str) -> String {
    hash_fields(&["compensation", original_key, correction_id])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub idempotency_key: String,
    pub user_id: String,
    pub claim_id: String,
    pub kind: EntryKind,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,

    /// Key of the entry this one corrects
    #[serde(default)]
    pub compensates: Option<String>,

    #[serde(default)]
    pub note: Option<String>,
}

impl LedgerEntry {
    /// A first-time payout for `(user_id, claim_id, kind)`
    pub fn payout(
        user_id: &str,
        claim_id: &str,
        kind: EntryKind,
        amount: Amount,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            idempotency_key: idempotency_key(user_id, claim_id, kind),
            user_id: user_id.to_string(),
            claim_id: claim_id.to_string(),
            kind,
            amount,
            created_at,
            compensates: None,
            note: None,
        }
    }

    /// A signed delta correcting `original`
    pub fn compensating(
        original: &LedgerEntry,
        delta: Amount,
        correction_id: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            idempotency_key: compensation_key(&original.idempotency_key, correction_id),
            user_id: original.user_id.clone(),
            claim_id: original.claim_id.clone(),
            kind: original.kind,
            amount: delta,
            created_at,
            compensates: Some(original.idempotency_key.clone()),
            note: Some(correction_id.to_string()),
        }
    }

    pub fn is_compensation(&self) -> bool {
        self.compensates.is_some()
    }
}
