//! In-memory store for tests and ephemeral runs

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use spot_consensus::rate_limit::{release, try_reserve};
use spot_consensus::{QuotaCheck, RateLimitConfig};
use spot_core::{Claim, LedgerEntry, ValidatorState, Vote};

use crate::error::{StoreError, StoreResult};
use crate::store::{
    sort_entries, sort_votes, LedgerInsert, ResolutionCommit, ResolutionStatus, ValidationStore,
    VoteCommit,
};

/// DashMap-backed store.
///
/// Reads go straight to the maps. Every write that touches more than one
/// record holds `write_lock`, so multi-record commits are all-or-nothing.
#[derive(Default)]
pub struct MemoryStore {
    claims: DashMap<String, Claim>,
    votes: DashMap<(String, String), Vote>,
    validators: DashMap<String, ValidatorState>,
    ledger: DashMap<String, LedgerEntry>,
    write_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn conflict(entity: &'static str, id: &str) -> StoreError {
        StoreError::Conflict {
            entity,
            id: id.to_string(),
        }
    }
}

impl ValidationStore for MemoryStore {
    fn insert_claim(&self, claim: &Claim) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        match self.claims.entry(claim.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                entity: "claim",
                id: claim.id.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(claim.clone());
                Ok(())
            }
        }
    }

    fn load_claim(&self, claim_id: &str) -> StoreResult<Option<Claim>> {
        Ok(self.claims.get(claim_id).map(|c| c.clone()))
    }

    fn list_claims(&self) -> StoreResult<Vec<Claim>> {
        let mut claims: Vec<Claim> = self.claims.iter().map(|c| c.value().clone()).collect();
        claims.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(claims)
    }

    fn has_vote(&self, claim_id: &str, validator_id: &str) -> StoreResult<bool> {
        Ok(self
            .votes
            .contains_key(&(claim_id.to_string(), validator_id.to_string())))
    }

    fn votes_for_claim(&self, claim_id: &str) -> StoreResult<Vec<Vote>> {
        let mut votes: Vec<Vote> = self
            .votes
            .iter()
            .filter(|v| v.key().0 == claim_id)
            .map(|v| v.value().clone())
            .collect();
        sort_votes(&mut votes);
        Ok(votes)
    }

    fn votes_by_validator(&self, validator_id: &str) -> StoreResult<Vec<Vote>> {
        let mut votes: Vec<Vote> = self
            .votes
            .iter()
            .filter(|v| v.key().1 == validator_id)
            .map(|v| v.value().clone())
            .collect();
        sort_votes(&mut votes);
        Ok(votes)
    }

    fn all_votes(&self) -> StoreResult<Vec<Vote>> {
        let mut votes: Vec<Vote> = self.votes.iter().map(|v| v.value().clone()).collect();
        sort_votes(&mut votes);
        Ok(votes)
    }

    fn load_validator(&self, validator_id: &str) -> StoreResult<Option<ValidatorState>> {
        Ok(self.validators.get(validator_id).map(|v| v.clone()))
    }

    fn list_validators(&self) -> StoreResult<Vec<ValidatorState>> {
        let mut validators: Vec<ValidatorState> =
            self.validators.iter().map(|v| v.value().clone()).collect();
        validators.sort_by(|a, b| a.validator_id.cmp(&b.validator_id));
        Ok(validators)
    }

    fn reserve_quota(
        &self,
        validator_id: &str,
        limits: &RateLimitConfig,
        fresh: &ValidatorState,
        now: DateTime<Utc>,
    ) -> StoreResult<QuotaCheck> {
        let _guard = self.write_lock.lock();
        let mut state = self
            .validators
            .entry(validator_id.to_string())
            .or_insert_with(|| fresh.clone());

        let mut quota = state.quota.clone();
        let check = try_reserve(&mut quota, limits, now);
        if check.allowed {
            state.quota = quota;
            state.version += 1;
            state.updated_at = now;
        }
        Ok(check)
    }

    fn release_quota(
        &self,
        validator_id: &str,
        reserved_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let _guard = self.write_lock.lock();
        let Some(mut state) = self.validators.get_mut(validator_id) else {
            return Ok(false);
        };
        let released = release(&mut state.quota, reserved_at);
        if released {
            state.version += 1;
            state.updated_at = now;
        }
        Ok(released)
    }

    fn commit_vote(&self, commit: &VoteCommit) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let claim_id = commit.claim.id.as_str();
        let validator_id = commit.vote.validator_id.as_str();

        let stored_version = self
            .claims
            .get(claim_id)
            .map(|c| c.version)
            .ok_or_else(|| StoreError::NotFound {
                entity: "claim",
                id: claim_id.to_string(),
            })?;
        if stored_version != commit.expected_claim_version {
            return Err(Self::conflict("claim", claim_id));
        }

        let vote_key = (claim_id.to_string(), validator_id.to_string());
        if self.votes.contains_key(&vote_key) {
            return Err(StoreError::DuplicateVote {
                claim_id: claim_id.to_string(),
                validator_id: validator_id.to_string(),
            });
        }

        let validator_version = self.validators.get(validator_id).map(|v| v.version);
        if validator_version != commit.expected_validator_version {
            return Err(Self::conflict("validator", validator_id));
        }

        let mut claim = commit.claim.clone();
        claim.version = commit.expected_claim_version + 1;
        let mut validator = commit.validator.clone();
        validator.version = commit.expected_validator_version.map_or(1, |v| v + 1);

        self.claims.insert(claim.id.clone(), claim);
        self.votes.insert(vote_key, commit.vote.clone());
        self.validators.insert(validator.validator_id.clone(), validator);
        Ok(())
    }

    fn commit_resolution(&self, commit: &ResolutionCommit) -> StoreResult<ResolutionStatus> {
        let _guard = self.write_lock.lock();
        let claim_id = commit.claim.id.as_str();

        let (processed, version) = self
            .claims
            .get(claim_id)
            .map(|c| (c.resolution_processed, c.version))
            .ok_or_else(|| StoreError::NotFound {
                entity: "claim",
                id: claim_id.to_string(),
            })?;
        if processed {
            return Ok(ResolutionStatus::AlreadyProcessed);
        }
        if version != commit.expected_claim_version {
            return Err(Self::conflict("claim", claim_id));
        }

        for (state, expected) in &commit.validators {
            let current = self.validators.get(&state.validator_id).map(|v| v.version);
            if current != Some(*expected) {
                return Err(Self::conflict("validator", &state.validator_id));
            }
        }

        let mut claim = commit.claim.clone();
        claim.version = commit.expected_claim_version + 1;
        claim.resolution_processed = true;
        self.claims.insert(claim.id.clone(), claim);

        for (state, expected) in &commit.validators {
            let mut state = state.clone();
            state.version = expected + 1;
            self.validators.insert(state.validator_id.clone(), state);
        }
        Ok(ResolutionStatus::Applied)
    }

    fn insert_ledger_entry(&self, entry: &LedgerEntry) -> StoreResult<LedgerInsert> {
        match self.ledger.entry(entry.idempotency_key.clone()) {
            Entry::Occupied(existing) => Ok(LedgerInsert::AlreadyPresent(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(entry.clone());
                Ok(LedgerInsert::Inserted)
            }
        }
    }

    fn ledger_entry(&self, idempotency_key: &str) -> StoreResult<Option<LedgerEntry>> {
        Ok(self.ledger.get(idempotency_key).map(|e| e.clone()))
    }

    fn ledger_for_user(&self, user_id: &str) -> StoreResult<Vec<LedgerEntry>> {
        let mut entries: Vec<LedgerEntry> = self
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.value().clone())
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn ledger_for_claim(&self, claim_id: &str) -> StoreResult<Vec<LedgerEntry>> {
        let mut entries: Vec<LedgerEntry> = self
            .ledger
            .iter()
            .filter(|e| e.claim_id == claim_id)
            .map(|e| e.value().clone())
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }
}
