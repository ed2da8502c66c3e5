//! The shared store behind the engine
//!
//! Every write that must be atomic is a single trait call: the backend owns
//! the atomic primitive (a sled transaction, a lock) and the engine never
//! does read-then-write across calls.

use chrono::{DateTime, Utc};
use spot_consensus::{QuotaCheck, RateLimitConfig};
use spot_core::{Claim, LedgerEntry, ValidatorState, Vote};

use crate::error::StoreResult;

/// Vote insert plus the claim and voter updates it causes
#[derive(Debug, Clone)]
pub struct VoteCommit {
    /// Claim after applying the vote. Stored with version `expected_claim_version + 1`.
    pub claim: Claim,
    pub expected_claim_version: u64,

    pub vote: Vote,

    /// Voter after recording activity
    pub validator: ValidatorState,

    /// `None` when the voter has no stored state yet
    pub expected_validator_version: Option<u64>,
}

/// Resolution bookkeeping for a terminal claim: the processed flag and every
/// voter's accuracy/tier update, applied together or not at all.
#[derive(Debug, Clone)]
pub struct ResolutionCommit {
    /// Claim with `resolution_processed` set
    pub claim: Claim,
    pub expected_claim_version: u64,

    /// Updated voter states with the version each was read at
    pub validators: Vec<(ValidatorState, u64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStatus {
    Applied,
    AlreadyProcessed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerInsert {
    Inserted,

    /// An entry with the same idempotency key exists; nothing was written
    AlreadyPresent(LedgerEntry),
}

impl LedgerInsert {
    pub fn is_inserted(&self) -> bool {
        matches!(self, LedgerInsert::Inserted)
    }
}

pub trait ValidationStore: Send + Sync {
    /// Store a newly submitted claim. Fails with `AlreadyExists` when the id
    /// is taken; an existing claim is never replaced.
    fn insert_claim(&self, claim: &Claim) -> StoreResult<()>;
    fn load_claim(&self, claim_id: &str) -> StoreResult<Option<Claim>>;
    fn list_claims(&self) -> StoreResult<Vec<Claim>>;

    fn has_vote(&self, claim_id: &str, validator_id: &str) -> StoreResult<bool>;

    /// Votes on a claim, oldest first
    fn votes_for_claim(&self, claim_id: &str) -> StoreResult<Vec<Vote>>;

    /// A validator's votes, oldest first
    fn votes_by_validator(&self, validator_id: &str) -> StoreResult<Vec<Vote>>;
    fn all_votes(&self) -> StoreResult<Vec<Vote>>;

    fn load_validator(&self, validator_id: &str) -> StoreResult<Option<ValidatorState>>;
    fn list_validators(&self) -> StoreResult<Vec<ValidatorState>>;

    /// Atomically check and consume one vote of quota.
    ///
    /// `fresh` is stored when the validator has no state yet. A successful
    /// reservation bumps the validator's version.
    fn reserve_quota(
        &self,
        validator_id: &str,
        limits: &RateLimitConfig,
        fresh: &ValidatorState,
        now: DateTime<Utc>,
    ) -> StoreResult<QuotaCheck>;

    /// Atomically hand back one vote of quota reserved at `reserved_at`.
    ///
    /// Returns `false` when the validator is unknown or the windows have
    /// moved on. A release that changes anything bumps the version.
    fn release_quota(
        &self,
        validator_id: &str,
        reserved_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Insert the vote and write claim and voter, or fail with
    /// `Conflict` / `DuplicateVote` having written nothing.
    fn commit_vote(&self, commit: &VoteCommit) -> StoreResult<()>;

    fn commit_resolution(&self, commit: &ResolutionCommit) -> StoreResult<ResolutionStatus>;

    /// Check-or-insert on the idempotency key
    fn insert_ledger_entry(&self, entry: &LedgerEntry) -> StoreResult<LedgerInsert>;
    fn ledger_entry(&self, idempotency_key: &str) -> StoreResult<Option<LedgerEntry>>;
    fn ledger_for_user(&self, user_id: &str) -> StoreResult<Vec<LedgerEntry>>;
    fn ledger_for_claim(&self, claim_id: &str) -> StoreResult<Vec<LedgerEntry>>;
}

/// Key separating claim and validator ids; unit separator never appears in ids we accept
pub(crate) const KEY_SEP: char = '\u{1f}';

pub(crate) fn vote_key(claim_id: &str, validator_id: &str) -> String {
    format!("{}{}{}", claim_id, KEY_SEP, validator_id)
}

pub(crate) fn sort_votes(votes: &mut [Vote]) {
    votes.sort_by(|a, b| {
        a.cast_at
            .cmp(&b.cast_at)
            .then_with(|| a.claim_id.cmp(&b.claim_id))
            .then_with(|| a.validator_id.cmp(&b.validator_id))
    });
}

pub(crate) fn sort_entries(entries: &mut [LedgerEntry]) {
    entries.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.idempotency_key.cmp(&b.idempotency_key))
    });
}
