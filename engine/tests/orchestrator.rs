//! End-to-end vote flows against the in-memory and sled stores

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use spot_consensus::RateLimitConfig;
use spot_core::*;
use spot_engine::*;
use spot_validator::ReputationTracker;
use spot_storage::{
    LedgerInsert, MemoryStore, ResolutionCommit, ResolutionStatus as StoredResolution, StoreError, StoreResult,
    ValidationStore, VoteCommit,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap()
}

fn engine_with(config: EngineConfig) -> (ValidationOrchestrator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = ValidationOrchestrator::new(config, store.clone()).unwrap();
    (engine, store)
}

fn engine() -> (ValidationOrchestrator, Arc<MemoryStore>) {
    engine_with(EngineConfig::in_memory())
}

fn claim(id: &str, owner: &str) -> Claim {
    Claim::new(id.to_string(), owner.to_string(), "music".to_string(), t0())
}

/// Give a validator a stored record before their first vote
fn seed(store: &dyn ValidationStore, id: &str, accuracy: f64, tier: Tier) {
    let tracker = ReputationTracker::default();
    let mut state = ValidatorState::new(id.to_string(), accuracy, tracker.weight_for(accuracy), t0());
    state.tier = tier;
    // Reserved two days back so today's quota starts untouched
    store
        .reserve_quota(id, &RateLimitConfig::default(), &state, t0() - TimeDelta::days(2))
        .unwrap();
}

async fn vote(
    engine: &ValidationOrchestrator,
    claim_id: &str,
    validator_id: &str,
    decision: Decision,
    confidence: f64,
) -> Result<VoteReceipt> {
    engine
        .submit_vote_at(VoteRequest::new(claim_id, validator_id, decision, confidence), t0())
        .await
}

#[tokio::test]
async fn test_weighted_approval_and_resolution() {
    let (engine, store) = engine();
    engine.register_claim(claim("c1", "owner")).await.unwrap();
    seed(store.as_ref(), "b", 1.0, Tier::Learning);

    let first = vote(&engine, "c1", "a", Decision::Approve, 0.9).await.unwrap();
    assert_eq!(first.consensus_stage, ClaimStage::Validating);
    assert_eq!(first.status, VoteStatus::Recorded);
    assert_eq!(first.reward_amount, Some(Amount::from_micros(20_000)));
    assert_eq!(first.reward_kind, Some(EntryKind::ValidationReward));
    assert_eq!(first.remaining_hour, 19);

    vote(&engine, "c1", "b", Decision::Approve, 0.8).await.unwrap();
    let last = vote(&engine, "c1", "c", Decision::Reject, 0.5).await.unwrap();

    // (0.9 + 1.5*0.8 - 0.5) / (0.9 + 1.2 + 0.5) = 1.6 / 2.6
    assert_eq!(last.consensus_stage, ClaimStage::Approved);
    assert!((last.consensus_score - 1.6 / 2.6).abs() < 1e-9);

    let stored = engine.claim("c1").await.unwrap();
    assert_eq!(stored.approve_count, 2);
    assert_eq!(stored.reject_count, 1);
    assert_eq!(stored.distinct_validator_count, 3);
    assert!(stored.resolution_processed);
    assert_eq!(stored.resolved_at, Some(t0()));

    let a = store.load_validator("a").unwrap().unwrap();
    let c = store.load_validator("c").unwrap().unwrap();
    assert_eq!((a.resolved_votes, a.correct_votes), (1, 1));
    assert_eq!((c.resolved_votes, c.correct_votes), (1, 0));
    assert!((a.accuracy - 1.0).abs() < 1e-9);
    assert!(c.accuracy.abs() < 1e-9);
    assert!(a.vote_weight > c.vote_weight);

    // Owner gets the default submission reward exactly once
    assert_eq!(
        engine.total_earnings("owner").await.unwrap(),
        Amount::from_micros(1_000_000)
    );
}

#[tokio::test]
async fn test_vote_cap_forces_majority() {
    let mut config = EngineConfig::in_memory();
    config.consensus.max_votes = 3;
    let (engine, _) = engine_with(config);
    engine.register_claim(claim("c1", "owner")).await.unwrap();

    vote(&engine, "c1", "a", Decision::Approve, 1.0).await.unwrap();
    vote(&engine, "c1", "b", Decision::Reject, 1.0).await.unwrap();
    let receipt = vote(&engine, "c1", "c", Decision::Approve, 1.0).await.unwrap();

    assert_eq!(receipt.consensus_stage, ClaimStage::Approved);
    assert!((receipt.consensus_score - 1.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_no_decision_before_quorum() {
    let (engine, _) = engine();
    engine.register_claim(claim("c1", "owner")).await.unwrap();

    vote(&engine, "c1", "a", Decision::Reject, 1.0).await.unwrap();
    let receipt = vote(&engine, "c1", "b", Decision::Reject, 1.0).await.unwrap();
    assert_eq!(receipt.consensus_stage, ClaimStage::Validating);
    assert_eq!(receipt.consensus_score, -1.0);

    let receipt = vote(&engine, "c1", "c", Decision::Reject, 1.0).await.unwrap();
    assert_eq!(receipt.consensus_stage, ClaimStage::Rejected);

    // Rejected claims pay their voters but not the owner
    assert_eq!(engine.total_earnings("owner").await.unwrap(), Amount::ZERO);
    assert_eq!(engine.total_earnings("a").await.unwrap(), Amount::from_micros(20_000));
}

#[tokio::test]
async fn test_rate_limit_blocks_without_recording() {
    let mut config = EngineConfig::in_memory();
    config.rate_limit = RateLimitConfig {
        max_votes_per_hour: 2,
        max_votes_per_day: 10,
    };
    let (engine, store) = engine_with(config);
    for id in ["c1", "c2", "c3"] {
        engine.register_claim(claim(id, "owner")).await.unwrap();
    }

    let second = {
        vote(&engine, "c1", "v1", Decision::Approve, 0.7).await.unwrap();
        vote(&engine, "c2", "v1", Decision::Approve, 0.7).await.unwrap()
    };
    assert_eq!(second.remaining_hour, 0);
    assert_eq!(second.remaining_day, 8);

    let err = vote(&engine, "c3", "v1", Decision::Approve, 0.7).await.unwrap_err();
    assert!(
        matches!(err, EngineError::RateLimitExceeded { remaining_hour: 0, remaining_day: 8, .. }),
        "got {:?}",
        err
    );
    assert!(err.is_user_facing());
    assert!(!store.has_vote("c3", "v1").unwrap());
    assert_eq!(engine.claim("c3").await.unwrap().total_votes(), 0);

    // Next clock hour opens up again
    let later = engine
        .submit_vote_at(
            VoteRequest::new("c3", "v1", Decision::Approve, 0.7),
            t0() + TimeDelta::hours(1),
        )
        .await
        .unwrap();
    assert_eq!(later.remaining_hour, 1);
    assert_eq!(later.remaining_day, 7);
}

#[tokio::test]
async fn test_rejected_votes_cost_no_quota() {
    let (engine, store) = engine();
    engine.register_claim(claim("c1", "owner")).await.unwrap();

    let err = vote(&engine, "c1", "owner", Decision::Approve, 1.0).await.unwrap_err();
    assert!(matches!(err, EngineError::SelfValidation { .. }));
    assert!(store.load_validator("owner").unwrap().is_none());

    vote(&engine, "c1", "v1", Decision::Approve, 1.0).await.unwrap();
    let err = vote(&engine, "c1", "v1", Decision::Reject, 1.0).await.unwrap_err();
    assert!(matches!(err, EngineError::DuplicateVote { .. }));

    let view = engine.validator_state_at("v1", t0()).await.unwrap();
    assert_eq!(view.quotas_remaining.remaining_hour, 19);
    assert_eq!(view.total_votes, 1);

    let err = vote(&engine, "missing", "v1", Decision::Approve, 1.0).await.unwrap_err();
    assert!(matches!(err, EngineError::ClaimNotFound(_)));

    let err = vote(&engine, "c1", "v2", Decision::Approve, 1.5).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidVote(_)));
}

#[tokio::test]
async fn test_late_vote_leaves_claim_untouched() {
    let (engine, store) = engine();
    engine.register_claim(claim("c1", "owner")).await.unwrap();
    for v in ["a", "b", "c"] {
        vote(&engine, "c1", v, Decision::Approve, 0.9).await.unwrap();
    }
    let before = engine.claim("c1").await.unwrap();
    assert_eq!(before.stage, ClaimStage::Approved);

    let err = vote(&engine, "c1", "d", Decision::Reject, 1.0).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::ClaimAlreadyResolved { stage: ClaimStage::Approved, .. }
    ));

    let after = engine.claim("c1").await.unwrap();
    assert_eq!(after, before);
    assert!(store.load_validator("d").unwrap().is_none());
}

#[tokio::test]
async fn test_suspended_voter_counts_but_earns_nothing() {
    let (engine, store) = engine();
    engine.register_claim(claim("c1", "owner")).await.unwrap();
    seed(store.as_ref(), "s", 0.2, Tier::Suspended);

    let receipt = vote(&engine, "c1", "s", Decision::Approve, 1.0).await.unwrap();
    assert_eq!(receipt.reward_amount, None);
    assert_eq!(receipt.status, VoteStatus::Recorded);
    assert_eq!(engine.claim("c1").await.unwrap().approve_count, 1);
    assert!(store.ledger_for_user("s").unwrap().is_empty());
}

#[tokio::test]
async fn test_bounty_claims_pay_flat_reward() {
    let (engine, store) = engine();
    seed(store.as_ref(), "pro", 1.0, Tier::Elite);

    let plain = claim("b1", "owner").with_bounty(BountyLink {
        bounty_ref: "bounty-1".to_string(),
        validation_reward: None,
    });
    let priced = claim("b2", "owner").with_bounty(BountyLink {
        bounty_ref: "bounty-2".to_string(),
        validation_reward: Some(Amount::from_micros(250_000)),
    });
    engine.register_claim(plain).await.unwrap();
    engine.register_claim(priced).await.unwrap();

    let r1 = vote(&engine, "b1", "pro", Decision::Approve, 0.9).await.unwrap();
    assert_eq!(r1.reward_kind, Some(EntryKind::BountyReward));
    assert_eq!(r1.reward_amount, Some(Amount::from_micros(100_000)));

    let r2 = vote(&engine, "b2", "pro", Decision::Approve, 0.9).await.unwrap();
    assert_eq!(r2.reward_amount, Some(Amount::from_micros(250_000)));

    let summary = engine.earnings_summary("pro").await.unwrap();
    assert_eq!(summary.amount_for(EntryKind::BountyReward), Amount::from_micros(350_000));
    assert_eq!(summary.amount_for(EntryKind::ValidationReward), Amount::ZERO);
}

#[tokio::test]
async fn test_streaks_raise_rewards() {
    let (engine, store) = engine();
    seed(store.as_ref(), "v1", 0.5, Tier::Verified);
    for i in 0..6 {
        engine.register_claim(claim(&format!("c{}", i), "owner")).await.unwrap();
    }

    // Six votes a minute apart: session streak reaches 5 on the fifth
    let mut rewards = Vec::new();
    for i in 0..6 {
        let receipt = engine
            .submit_vote_at(
                VoteRequest::new(&format!("c{}", i), "v1", Decision::Approve, 0.8),
                t0() + TimeDelta::minutes(i),
            )
            .await
            .unwrap();
        rewards.push(receipt.reward_amount.unwrap().micros());
    }

    // Verified 1.5x, then 1.25x once the session streak hits 5
    assert_eq!(rewards, vec![30_000, 30_000, 30_000, 30_000, 37_500, 37_500]);
    assert_eq!(engine.validator_state_at("v1", t0()).await.unwrap().session_streak_count, 6);
}

#[tokio::test]
async fn test_submission_pricing_on_approval() {
    let mut config = EngineConfig::in_memory();
    config.rewards.submission_pricing.insert("music".to_string(), 2.5);
    let (engine, _) = engine_with(config);
    engine.register_claim(claim("c1", "owner")).await.unwrap();

    for v in ["a", "b"] {
        vote(&engine, "c1", v, Decision::Approve, 1.0).await.unwrap();
    }
    assert_eq!(engine.total_earnings("owner").await.unwrap(), Amount::ZERO);

    vote(&engine, "c1", "c", Decision::Approve, 1.0).await.unwrap();
    assert_eq!(
        engine.total_earnings("owner").await.unwrap(),
        Amount::from_micros(2_500_000)
    );
}

#[tokio::test]
async fn test_resolution_runs_once() {
    let (engine, store) = engine();
    engine.register_claim(claim("c1", "owner")).await.unwrap();
    for v in ["a", "b", "c"] {
        vote(&engine, "c1", v, Decision::Approve, 1.0).await.unwrap();
    }

    let report = engine.resolve_claim("c1").await.unwrap();
    assert_eq!(report.status, ResolutionStatus::AlreadyProcessed);
    assert_eq!(report.voters_updated, 0);
    assert_eq!(report.submission_paid, None);

    assert_eq!(store.load_validator("a").unwrap().unwrap().resolved_votes, 1);
    assert_eq!(store.ledger_for_user("owner").unwrap().len(), 1);

    engine.register_claim(claim("open", "owner")).await.unwrap();
    let report = engine.resolve_claim("open").await.unwrap();
    assert_eq!(report.status, ResolutionStatus::NotTerminal);
}

#[tokio::test]
async fn test_correction_is_idempotent() {
    let (engine, store) = engine();
    engine.register_claim(claim("c1", "owner")).await.unwrap();
    for v in ["a", "b", "c"] {
        vote(&engine, "c1", v, Decision::Approve, 1.0).await.unwrap();
    }

    let fix = engine
        .correct_reward("owner", "c1", EntryKind::SubmissionReward, Amount::from_micros(1_500_000), "fix-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fix.amount, Amount::from_micros(500_000));
    assert!(fix.is_compensation());

    let replay = engine
        .correct_reward("owner", "c1", EntryKind::SubmissionReward, Amount::from_micros(1_500_000), "fix-1")
        .await
        .unwrap();
    assert_eq!(replay, Some(fix));

    let already_there = engine
        .correct_reward("owner", "c1", EntryKind::SubmissionReward, Amount::from_micros(1_500_000), "fix-2")
        .await
        .unwrap();
    assert!(already_there.is_none());

    let summary = engine.earnings_summary("owner").await.unwrap();
    assert_eq!(summary.total, Amount::from_micros(1_500_000));
    assert_eq!(summary.compensations, 1);
    assert_eq!(store.ledger_for_claim("c1").unwrap().len(), 5);

    let err = engine
        .correct_reward("nobody", "c1", EntryKind::SubmissionReward, Amount::ZERO, "fix-3")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::LedgerEntryNotFound(_)));
}

#[tokio::test]
async fn test_queue_history_and_stats() {
    let (engine, _) = engine();
    let now = t0();
    let claims = [
        ("easy", "o1", 0.2),
        ("hard", "o1", 0.9),
        ("mine", "v1", 1.0),
        ("medium", "o2", 0.5),
    ];
    for (id, owner, difficulty) in claims {
        let c = Claim::new(id.into(), owner.into(), "tech".into(), now).with_difficulty(difficulty);
        engine.register_claim(c).await.unwrap();
    }

    vote(&engine, "medium", "v1", Decision::Approve, 0.2).await.unwrap();

    let queue: Vec<String> = engine
        .prioritized_claims("v1", 10)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(queue, vec!["hard".to_string(), "easy".to_string()]);
    assert_eq!(engine.prioritized_claims("v1", 1).await.unwrap().len(), 1);

    for v in ["v2", "v3"] {
        vote(&engine, "medium", v, Decision::Reject, 1.0).await.unwrap();
    }
    assert_eq!(engine.claim("medium").await.unwrap().stage, ClaimStage::Rejected);

    let history = engine.validation_history("v1", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].claim_stage, Some(ClaimStage::Rejected));
    assert_eq!(history[0].matched_outcome, Some(false));

    let stats = engine.validator_stats("v3").await.unwrap();
    assert_eq!(stats.total_votes, 1);
    assert_eq!(stats.rejections, 1);
    assert_eq!((stats.decided, stats.correct), (1, 1));
    assert_eq!(stats.accuracy_on_decided, Some(1.0));
    assert_eq!(stats.validation_earnings, Amount::from_micros(20_000));

    let unknown = engine.validator_state("nobody").await.unwrap();
    assert_eq!(unknown.tier, Tier::Learning);
    assert_eq!(unknown.quotas_remaining.remaining_day, 100);
}

#[tokio::test]
async fn test_batch_items_fail_independently() {
    let (engine, _) = engine();
    engine.register_claim(claim("c1", "owner")).await.unwrap();
    engine.register_claim(claim("c2", "v1")).await.unwrap();

    let outcomes = engine
        .submit_votes(vec![
            VoteRequest::new("c1", "v1", Decision::Approve, 0.9),
            VoteRequest::new("c2", "v1", Decision::Approve, 0.9),
            VoteRequest::new("c1", "v1", Decision::Approve, 0.9),
        ])
        .await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].result.is_ok());
    assert!(matches!(outcomes[1].result, Err(EngineError::SelfValidation { .. })));
    assert!(matches!(outcomes[2].result, Err(EngineError::DuplicateVote { .. })));
}

/// Memory store whose ledger can be switched off
struct FlakyLedger {
    inner: MemoryStore,
    ledger_down: AtomicBool,
    commits_down: AtomicBool,
}

impl FlakyLedger {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            ledger_down: AtomicBool::new(false),
            commits_down: AtomicBool::new(false),
        }
    }
}

impl ValidationStore for FlakyLedger {
    fn insert_claim(&self, claim: &Claim) -> StoreResult<()> {
        self.inner.insert_claim(claim)
    }
    fn load_claim(&self, claim_id: &str) -> StoreResult<Option<Claim>> {
        self.inner.load_claim(claim_id)
    }
    fn list_claims(&self) -> StoreResult<Vec<Claim>> {
        self.inner.list_claims()
    }
    fn has_vote(&self, claim_id: &str, validator_id: &str) -> StoreResult<bool> {
        self.inner.has_vote(claim_id, validator_id)
    }
    fn votes_for_claim(&self, claim_id: &str) -> StoreResult<Vec<Vote>> {
        self.inner.votes_for_claim(claim_id)
    }
    fn votes_by_validator(&self, validator_id: &str) -> StoreResult<Vec<Vote>> {
        self.inner.votes_by_validator(validator_id)
    }
    fn all_votes(&self) -> StoreResult<Vec<Vote>> {
        self.inner.all_votes()
    }
    fn load_validator(&self, validator_id: &str) -> StoreResult<Option<ValidatorState>> {
        self.inner.load_validator(validator_id)
    }
    fn list_validators(&self) -> StoreResult<Vec<ValidatorState>> {
        self.inner.list_validators()
    }
    fn reserve_quota(
        &self,
        validator_id: &str,
        limits: &RateLimitConfig,
        fresh: &ValidatorState,
        now: DateTime<Utc>,
    ) -> StoreResult<spot_consensus::QuotaCheck> {
        self.inner.reserve_quota(validator_id, limits, fresh, now)
    }
    fn release_quota(&self, validator_id: &str, reserved_at: DateTime<Utc>, now: DateTime<Utc>) -> StoreResult<bool> {
        self.inner.release_quota(validator_id, reserved_at, now)
    }
    fn commit_vote(&self, commit: &VoteCommit) -> StoreResult<()> {
        if self.commits_down.load(Ordering::SeqCst) {
            return Err(StoreError::Conflict {
                entity: "claim",
                id: commit.claim.id.clone(),
            });
        }
        self.inner.commit_vote(commit)
    }
    fn commit_resolution(&self, commit: &ResolutionCommit) -> StoreResult<StoredResolution> {
        self.inner.commit_resolution(commit)
    }
    fn insert_ledger_entry(&self, entry: &LedgerEntry) -> StoreResult<LedgerInsert> {
        if self.ledger_down.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("ledger offline".to_string()));
        }
        self.inner.insert_ledger_entry(entry)
    }
    fn ledger_entry(&self, idempotency_key: &str) -> StoreResult<Option<LedgerEntry>> {
        self.inner.ledger_entry(idempotency_key)
    }
    fn ledger_for_user(&self, user_id: &str) -> StoreResult<Vec<LedgerEntry>> {
        self.inner.ledger_for_user(user_id)
    }
    fn ledger_for_claim(&self, claim_id: &str) -> StoreResult<Vec<LedgerEntry>> {
        self.inner.ledger_for_claim(claim_id)
    }
}

#[tokio::test]
async fn test_reconcile_backfills_pending_rewards() {
    let store = Arc::new(FlakyLedger::new());
    let engine = ValidationOrchestrator::new(EngineConfig::in_memory(), store.clone()).unwrap();
    engine.register_claim(claim("c1", "owner")).await.unwrap();

    store.ledger_down.store(true, Ordering::SeqCst);
    for v in ["a", "b", "c"] {
        let receipt = vote(&engine, "c1", v, Decision::Approve, 1.0).await.unwrap();
        assert_eq!(receipt.status, VoteStatus::RecordedRewardPending);
        assert_eq!(receipt.reward_amount, Some(Amount::from_micros(20_000)));
    }

    // Consensus and reputation went through even with the ledger down
    let stored = engine.claim("c1").await.unwrap();
    assert_eq!(stored.stage, ClaimStage::Approved);
    assert!(stored.resolution_processed);
    assert!(store.ledger_for_claim("c1").unwrap().is_empty());

    let report = engine.reconcile_at(t0()).await.unwrap();
    assert_eq!(report.rewards_backfilled, 0);
    assert_eq!(report.failures, 4);

    store.ledger_down.store(false, Ordering::SeqCst);
    let report = engine.reconcile_at(t0()).await.unwrap();
    assert_eq!(report.votes_scanned, 3);
    assert_eq!(report.rewards_backfilled, 3);
    assert_eq!(report.submissions_backfilled, 1);
    assert_eq!(report.claims_resolved, 0);
    assert_eq!(report.failures, 0);

    let entries = store.ledger_for_claim("c1").unwrap();
    assert_eq!(entries.len(), 4);
    let a = entries.iter().find(|e| e.user_id == "a").unwrap();
    assert_eq!(a.created_at, t0());

    let again = engine.reconcile_at(t0()).await.unwrap();
    assert_eq!(again, ReconcileReport { votes_scanned: 3, ..Default::default() });
    assert_eq!(store.ledger_for_claim("c1").unwrap().len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_votes_keep_counts_consistent() {
    let mut config = EngineConfig::in_memory();
    config.retry.max_attempts = 100;
    config.retry.base_backoff_ms = 1;
    config.retry.max_backoff_ms = 5;
    // Quorum out of reach keeps the claim open so every vote lands
    config.consensus.min_distinct_validators = 50;
    config.consensus.max_votes = 50;

    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ValidationOrchestrator::new(config, store.clone()).unwrap());
    engine.register_claim(claim("c1", "owner")).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..12 {
        let engine = Arc::clone(&engine);
        let decision = if i % 3 == 0 { Decision::Reject } else { Decision::Approve };
        handles.push(tokio::spawn(async move {
            engine
                .submit_vote(VoteRequest::new("c1", &format!("v{}", i), decision, 0.9))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = engine.claim("c1").await.unwrap();
    let votes = store.votes_for_claim("c1").unwrap();
    assert_eq!(votes.len(), 12);
    assert_eq!(stored.approve_count, 8);
    assert_eq!(stored.reject_count, 4);
    assert_eq!(stored.distinct_validator_count, 12);
    assert_eq!(stored.stage, ClaimStage::Validating);
    assert_eq!(store.ledger_for_claim("c1").unwrap().len(), 12);
}

#[tokio::test]
async fn test_sled_backend_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.storage.data_dir = dir.path().join("db");

    {
        let engine = ValidationOrchestrator::open(config.clone()).unwrap();
        engine.register_claim(claim("c1", "owner")).await.unwrap();
        for v in ["a", "b", "c"] {
            vote(&engine, "c1", v, Decision::Approve, 0.8).await.unwrap();
        }
    }

    let engine = ValidationOrchestrator::open(config).unwrap();
    let stored = engine.claim("c1").await.unwrap();
    assert_eq!(stored.stage, ClaimStage::Approved);
    assert!(stored.resolution_processed);
    assert_eq!(engine.total_earnings("owner").await.unwrap(), Amount::from_micros(1_000_000));
    assert_eq!(engine.total_earnings("b").await.unwrap(), Amount::from_micros(20_000));

    let report = engine.reconcile_at(t0()).await.unwrap();
    assert_eq!(report.rewards_backfilled + report.submissions_backfilled, 0);
}

#[tokio::test]
async fn test_reused_correction_id_with_new_amount_is_refused() {
    let (engine, store) = engine();
    engine.register_claim(claim("c1", "owner")).await.unwrap();
    for v in ["a", "b", "c"] {
        vote(&engine, "c1", v, Decision::Approve, 1.0).await.unwrap();
    }
    let original = store
        .ledger_entry(&idempotency_key("a", "c1", EntryKind::ValidationReward))
        .unwrap()
        .unwrap();

    let first = engine
        .correct_reward("a", "c1", EntryKind::ValidationReward, Amount::from_micros(150_000), "fix-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.amount, Amount::from_micros(150_000) - original.amount);

    let err = engine
        .correct_reward("a", "c1", EntryKind::ValidationReward, Amount::from_micros(80_000), "fix-1")
        .await
        .unwrap_err();
    assert!(
        matches!(&err, EngineError::CorrectionConflict { booked, .. } if *booked == first.amount),
        "got {:?}",
        err
    );

    let summary = engine.earnings_summary("a").await.unwrap();
    assert_eq!(summary.amount_for(EntryKind::ValidationReward), Amount::from_micros(150_000));
    assert_eq!(summary.compensations, 1);

    // A fresh id moves the payout as asked
    let second = engine
        .correct_reward("a", "c1", EntryKind::ValidationReward, Amount::from_micros(80_000), "fix-2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.amount, Amount::from_micros(-70_000));
    let summary = engine.earnings_summary("a").await.unwrap();
    assert_eq!(summary.amount_for(EntryKind::ValidationReward), Amount::from_micros(80_000));
}

#[tokio::test]
async fn test_registering_existing_claim_leaves_it_untouched() {
    let (engine, store) = engine();
    engine.register_claim(claim("c1", "owner")).await.unwrap();
    for v in ["a", "b", "c"] {
        vote(&engine, "c1", v, Decision::Approve, 1.0).await.unwrap();
    }
    let resolved = engine.claim("c1").await.unwrap();
    assert_eq!(resolved.stage, ClaimStage::Approved);
    assert!(resolved.resolution_processed);

    let err = engine.register_claim(claim("c1", "owner")).await.unwrap_err();
    assert!(matches!(&err, EngineError::ClaimExists(id) if id == "c1"), "got {:?}", err);
    assert!(err.is_user_facing());
    assert_eq!(engine.claim("c1").await.unwrap(), resolved);

    let late = vote(&engine, "c1", "d", Decision::Reject, 1.0).await.unwrap_err();
    assert!(matches!(late, EngineError::ClaimAlreadyResolved { .. }), "got {:?}", late);
    assert!(!store.has_vote("c1", "d").unwrap());
    assert_eq!(engine.resolve_claim("c1").await.unwrap().status, ResolutionStatus::AlreadyProcessed);
}

#[tokio::test]
async fn test_failed_commit_returns_quota() {
    let store = Arc::new(FlakyLedger::new());
    let mut config = EngineConfig::in_memory();
    config.rate_limit = RateLimitConfig {
        max_votes_per_hour: 2,
        max_votes_per_day: 10,
    };
    config.retry.max_attempts = 2;
    config.retry.base_backoff_ms = 1;
    config.retry.max_backoff_ms = 2;
    let engine = ValidationOrchestrator::new(config, store.clone()).unwrap();
    for id in ["c1", "c2"] {
        engine.register_claim(claim(id, "owner")).await.unwrap();
    }

    store.commits_down.store(true, Ordering::SeqCst);
    let err = vote(&engine, "c1", "v1", Decision::Approve, 0.7).await.unwrap_err();
    assert!(matches!(err, EngineError::ConsensusRaceConflict { attempts: 2, .. }), "got {:?}", err);
    assert!(!store.has_vote("c1", "v1").unwrap());

    let state = store.load_validator("v1").unwrap().unwrap();
    assert_eq!((state.votes_this_hour(), state.votes_today()), (0, 0));

    // Both slots are still there once commits go through again
    store.commits_down.store(false, Ordering::SeqCst);
    vote(&engine, "c1", "v1", Decision::Approve, 0.7).await.unwrap();
    let last = vote(&engine, "c2", "v1", Decision::Approve, 0.7).await.unwrap();
    assert_eq!(last.remaining_hour, 0);
}
