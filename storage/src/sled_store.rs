//! Sled-backed store
//!
//! One tree per record type, values are bincode. Multi-record writes run as
//! sled transactions across the trees involved.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    abort, ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::Transactional;
use spot_consensus::rate_limit::{release, try_reserve};
use spot_consensus::{QuotaCheck, RateLimitConfig};
use spot_core::{Claim, LedgerEntry, ValidatorState, Vote};
use std::path::Path;

use crate::error::{StoreError, StoreResult};
use crate::store::{
    sort_entries, sort_votes, vote_key, LedgerInsert, ResolutionCommit, ResolutionStatus,
    ValidationStore, VoteCommit, KEY_SEP,
};

type TxResult<T> = ConflictableTransactionResult<T, StoreError>;

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(bincode::deserialize(bytes)?)
}

fn tx_get<T: DeserializeOwned>(tree: &TransactionalTree, key: &str) -> TxResult<Option<T>> {
    match tree.get(key.as_bytes())? {
        Some(bytes) => decode(&bytes).map(Some).map_err(ConflictableTransactionError::Abort),
        None => Ok(None),
    }
}

fn tx_put<T: Serialize>(tree: &TransactionalTree, key: &str, value: &T) -> TxResult<()> {
    let bytes = encode(value).map_err(ConflictableTransactionError::Abort)?;
    tree.insert(key.as_bytes(), bytes)?;
    Ok(())
}

fn conflict(entity: &'static str, id: &str) -> StoreError {
    StoreError::Conflict {
        entity,
        id: id.to_string(),
    }
}

fn finish<T>(result: Result<T, TransactionError<StoreError>>) -> StoreResult<T> {
    result.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => e.into(),
    })
}

pub struct SledStore {
    db: sled::Db,
    claims: sled::Tree,
    votes: sled::Tree,
    /// validator_id SEP claim_id -> vote key
    votes_by_validator: sled::Tree,
    validators: sled::Tree,
    ledger: sled::Tree,
    sync_writes: bool,
}

impl SledStore {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path.as_ref())?;
        log::debug!("opened sled store at {}", path.as_ref().display());
        Self::from_db(db)
    }

    /// In-memory database removed on drop
    pub fn temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> StoreResult<Self> {
        Ok(Self {
            claims: db.open_tree("claims")?,
            votes: db.open_tree("votes")?,
            votes_by_validator: db.open_tree("votes_by_validator")?,
            validators: db.open_tree("validator_state")?,
            ledger: db.open_tree("ledger_entries")?,
            db,
            sync_writes: true,
        })
    }

    /// Flush after every committed write (default on)
    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn after_write(&self) -> StoreResult<()> {
        if self.sync_writes {
            self.flush()?;
        }
        Ok(())
    }

    fn get<T: DeserializeOwned>(tree: &sled::Tree, key: &str) -> StoreResult<Option<T>> {
        match tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn collect<T, I>(iter: I) -> StoreResult<Vec<T>>
    where
        T: DeserializeOwned,
        I: Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>,
    {
        iter.map(|item| {
            let (_, bytes) = item?;
            decode(&bytes)
        })
        .collect()
    }
}

impl ValidationStore for SledStore {
    fn insert_claim(&self, claim: &Claim) -> StoreResult<()> {
        let swapped = self
            .claims
            .compare_and_swap(claim.id.as_bytes(), None::<&[u8]>, Some(encode(claim)?))?;
        if swapped.is_err() {
            return Err(StoreError::AlreadyExists {
                entity: "claim",
                id: claim.id.clone(),
            });
        }
        self.after_write()
    }

    fn load_claim(&self, claim_id: &str) -> StoreResult<Option<Claim>> {
        Self::get(&self.claims, claim_id)
    }

    fn list_claims(&self) -> StoreResult<Vec<Claim>> {
        Self::collect(self.claims.iter())
    }

    fn has_vote(&self, claim_id: &str, validator_id: &str) -> StoreResult<bool> {
        Ok(self.votes.contains_key(vote_key(claim_id, validator_id).as_bytes())?)
    }

    fn votes_for_claim(&self, claim_id: &str) -> StoreResult<Vec<Vote>> {
        let prefix = format!("{}{}", claim_id, KEY_SEP);
        let mut votes: Vec<Vote> = Self::collect(self.votes.scan_prefix(prefix.as_bytes()))?;
        sort_votes(&mut votes);
        Ok(votes)
    }

    fn votes_by_validator(&self, validator_id: &str) -> StoreResult<Vec<Vote>> {
        let prefix = format!("{}{}", validator_id, KEY_SEP);
        let mut votes = Vec::new();
        for item in self.votes_by_validator.scan_prefix(prefix.as_bytes()) {
            let (_, target) = item?;
            if let Some(bytes) = self.votes.get(&target)? {
                votes.push(decode::<Vote>(&bytes)?);
            }
        }
        sort_votes(&mut votes);
        Ok(votes)
    }

    fn all_votes(&self) -> StoreResult<Vec<Vote>> {
        let mut votes: Vec<Vote> = Self::collect(self.votes.iter())?;
        sort_votes(&mut votes);
        Ok(votes)
    }

    fn load_validator(&self, validator_id: &str) -> StoreResult<Option<ValidatorState>> {
        Self::get(&self.validators, validator_id)
    }

    fn list_validators(&self) -> StoreResult<Vec<ValidatorState>> {
        Self::collect(self.validators.iter())
    }

    fn reserve_quota(
        &self,
        validator_id: &str,
        limits: &RateLimitConfig,
        fresh: &ValidatorState,
        now: DateTime<Utc>,
    ) -> StoreResult<QuotaCheck> {
        let result: Result<QuotaCheck, TransactionError<StoreError>> =
            self.validators.transaction(|validators| {
                let mut state = tx_get::<ValidatorState>(validators, validator_id)?
                    .unwrap_or_else(|| fresh.clone());

                let check = try_reserve(&mut state.quota, limits, now);
                if check.allowed {
                    state.version += 1;
                    state.updated_at = now;
                    tx_put(validators, validator_id, &state)?;
                }
                Ok(check)
            });

        let check = finish(result)?;
        if check.allowed {
            self.after_write()?;
        }
        Ok(check)
    }

    fn release_quota(
        &self,
        validator_id: &str,
        reserved_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result: Result<bool, TransactionError<StoreError>> =
            self.validators.transaction(|validators| {
                let Some(mut state) = tx_get::<ValidatorState>(validators, validator_id)? else {
                    return Ok(false);
                };
                if !release(&mut state.quota, reserved_at) {
                    return Ok(false);
                }
                state.version += 1;
                state.updated_at = now;
                tx_put(validators, validator_id, &state)?;
                Ok(true)
            });

        let released = finish(result)?;
        if released {
            self.after_write()?;
        }
        Ok(released)
    }

    fn commit_vote(&self, commit: &VoteCommit) -> StoreResult<()> {
        let claim_id = commit.claim.id.as_str();
        let validator_id = commit.vote.validator_id.as_str();
        let key = vote_key(claim_id, validator_id);
        let index_key = vote_key(validator_id, claim_id);

        let result: Result<(), TransactionError<StoreError>> = (
            &self.claims,
            &self.votes,
            &self.votes_by_validator,
            &self.validators,
        )
            .transaction(|(claims, votes, index, validators)| {
                match tx_get::<Claim>(claims, claim_id)? {
                    None => {
                        return abort(StoreError::NotFound {
                            entity: "claim",
                            id: claim_id.to_string(),
                        })
                    }
                    Some(stored) if stored.version != commit.expected_claim_version => {
                        return abort(conflict("claim", claim_id));
                    }
                    Some(_) => {}
                }

                if votes.get(key.as_bytes())?.is_some() {
                    return abort(StoreError::DuplicateVote {
                        claim_id: claim_id.to_string(),
                        validator_id: validator_id.to_string(),
                    });
                }

                let stored_version =
                    tx_get::<ValidatorState>(validators, validator_id)?.map(|v| v.version);
                if stored_version != commit.expected_validator_version {
                    return abort(conflict("validator", validator_id));
                }

                let mut claim = commit.claim.clone();
                claim.version = commit.expected_claim_version + 1;
                let mut validator = commit.validator.clone();
                validator.version = commit.expected_validator_version.map_or(1, |v| v + 1);

                tx_put(claims, claim_id, &claim)?;
                tx_put(votes, &key, &commit.vote)?;
                index.insert(index_key.as_bytes(), key.as_bytes())?;
                tx_put(validators, validator_id, &validator)?;
                Ok(())
            });

        finish(result)?;
        self.after_write()
    }

    fn commit_resolution(&self, commit: &ResolutionCommit) -> StoreResult<ResolutionStatus> {
        let claim_id = commit.claim.id.as_str();

        let result: Result<ResolutionStatus, TransactionError<StoreError>> =
            (&self.claims, &self.validators).transaction(|(claims, validators)| {
                let stored = match tx_get::<Claim>(claims, claim_id)? {
                    Some(stored) => stored,
                    None => {
                        return abort(StoreError::NotFound {
                            entity: "claim",
                            id: claim_id.to_string(),
                        })
                    }
                };
                if stored.resolution_processed {
                    return Ok(ResolutionStatus::AlreadyProcessed);
                }
                if stored.version != commit.expected_claim_version {
                    return abort(conflict("claim", claim_id));
                }

                for (state, expected) in &commit.validators {
                    let current = tx_get::<ValidatorState>(validators, &state.validator_id)?
                        .map(|v| v.version);
                    if current != Some(*expected) {
                        return abort(conflict("validator", &state.validator_id));
                    }
                }

                let mut claim = commit.claim.clone();
                claim.version = commit.expected_claim_version + 1;
                claim.resolution_processed = true;
                tx_put(claims, claim_id, &claim)?;

                for (state, expected) in &commit.validators {
                    let mut state = state.clone();
                    state.version = expected + 1;
                    tx_put(validators, &state.validator_id, &state)?;
                }
                Ok(ResolutionStatus::Applied)
            });

        let status = finish(result)?;
        if status == ResolutionStatus::Applied {
            self.after_write()?;
        }
        Ok(status)
    }

    fn insert_ledger_entry(&self, entry: &LedgerEntry) -> StoreResult<LedgerInsert> {
        let key = entry.idempotency_key.as_bytes();
        let swap = self
            .ledger
            .compare_and_swap(key, None as Option<&[u8]>, Some(encode(entry)?))?;

        match swap {
            Ok(()) => {
                self.after_write()?;
                Ok(LedgerInsert::Inserted)
            }
            Err(existing) => match existing.current {
                Some(bytes) => Ok(LedgerInsert::AlreadyPresent(decode(&bytes)?)),
                None => Err(StoreError::Backend(format!(
                    "ledger swap failed without a current value for {}",
                    entry.idempotency_key
                ))),
            },
        }
    }

    fn ledger_entry(&self, idempotency_key: &str) -> StoreResult<Option<LedgerEntry>> {
        Self::get(&self.ledger, idempotency_key)
    }

    fn ledger_for_user(&self, user_id: &str) -> StoreResult<Vec<LedgerEntry>> {
        let mut entries: Vec<LedgerEntry> = Self::collect(self.ledger.iter())?;
        entries.retain(|e| e.user_id == user_id);
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn ledger_for_claim(&self, claim_id: &str) -> StoreResult<Vec<LedgerEntry>> {
        let mut entries: Vec<LedgerEntry> = Self::collect(self.ledger.iter())?;
        entries.retain(|e| e.claim_id == claim_id);
        sort_entries(&mut entries);
        Ok(entries)
    }
}
