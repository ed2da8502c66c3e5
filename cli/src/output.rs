//! Text and JSON rendering of engine results

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;
use spot_core::{Amount, Claim, ClaimStage, EntryKind, LedgerEntry, Tier};
use spot_engine::{
    BatchOutcome, HistoryItem, LedgerSummary, ReconcileReport, ResolutionReport, ValidatorStateView,
    ValidatorStats, VoteReceipt, VoteStatus,
};

pub struct Printer {
    json: bool,
}

fn stage_label(stage: ClaimStage) -> String {
    match stage {
        ClaimStage::Approved => stage.to_string().green().to_string(),
        ClaimStage::Rejected => stage.to_string().red().to_string(),
        _ => stage.to_string().yellow().to_string(),
    }
}

fn tier_label(tier: Tier) -> String {
    match tier {
        Tier::Suspended => tier.to_string().red().bold().to_string(),
        Tier::Master | Tier::Elite => tier.to_string().bright_magenta().to_string(),
        _ => tier.to_string().cyan().to_string(),
    }
}

fn money(amount: Amount) -> String {
    if amount.is_negative() {
        amount.to_string().red().to_string()
    } else {
        amount.to_string().green().to_string()
    }
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Print as JSON when asked, otherwise run the text renderer
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            text();
        }
        Ok(())
    }

    pub fn claim(&self, claim: &Claim) -> Result<()> {
        self.emit(claim, || {
            println!("{} {}", "Claim".bold(), claim.id);
            println!("  owner:      {}", claim.owner_id);
            println!("  category:   {}", claim.category);
            println!("  stage:      {}", stage_label(claim.stage));
            println!("  score:      {:.4}", claim.consensus_score);
            println!(
                "  votes:      {} approve / {} reject ({} validators)",
                claim.approve_count, claim.reject_count, claim.distinct_validator_count
            );
            println!("  difficulty: {:.2}", claim.validation_difficulty);
            if let Some(bounty) = &claim.bounty {
                let reward = bounty
                    .validation_reward
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "default".to_string());
                println!("  bounty:     {} ({} per vote)", bounty.bounty_ref, reward);
            }
            if let Some(at) = claim.resolved_at {
                println!("  resolved:   {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        })
    }

    pub fn receipt(&self, receipt: &VoteReceipt) -> Result<()> {
        self.emit(receipt, || {
            let mark = match receipt.status {
                VoteStatus::Recorded => "✓".green().to_string(),
                VoteStatus::RecordedRewardPending => "⚠".yellow().to_string(),
            };
            println!(
                "{} vote by {} on {} recorded",
                mark, receipt.validator_id, receipt.claim_id
            );
            println!(
                "  claim is {} (score {:.4})",
                stage_label(receipt.consensus_stage),
                receipt.consensus_score
            );
            match (receipt.reward_amount, receipt.reward_kind) {
                (Some(amount), Some(kind)) => println!("  reward: {} {}", money(amount), kind),
                _ => println!("  reward: {}", "none".bright_black()),
            }
            if receipt.status == VoteStatus::RecordedRewardPending {
                println!("  {}", "ledger write pending; run `spotd reconcile`".yellow());
            }
            println!(
                "  quota left: {} this hour, {} today",
                receipt.remaining_hour, receipt.remaining_day
            );
        })
    }

    pub fn batch(&self, outcomes: &[BatchOutcome]) -> Result<()> {
        if self.json {
            let items: Vec<serde_json::Value> = outcomes
                .iter()
                .map(|o| match &o.result {
                    Ok(receipt) => serde_json::json!({ "claim_id": o.claim_id, "receipt": receipt }),
                    Err(e) => serde_json::json!({ "claim_id": o.claim_id, "error": e.to_string() }),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
            return Ok(());
        }

        let ok = outcomes.iter().filter(|o| o.result.is_ok()).count();
        println!("{} of {} votes recorded", ok.to_string().green(), outcomes.len());
        for outcome in outcomes {
            match &outcome.result {
                Ok(r) => println!("  {} {} -> {}", "✓".green(), outcome.claim_id, stage_label(r.consensus_stage)),
                Err(e) => println!("  {} {}: {}", "✗".red(), outcome.claim_id, e),
            }
        }
        Ok(())
    }

    pub fn state(&self, view: &ValidatorStateView) -> Result<()> {
        self.emit(view, || {
            println!("{} {}", "Validator".bold(), view.validator_id);
            println!("  tier:     {}", tier_label(view.tier));
            println!("  accuracy: {:.3}", view.accuracy);
            println!("  weight:   {:.3}", view.vote_weight);
            println!(
                "  streaks:  {} days, {} this session",
                view.daily_streak_days, view.session_streak_count
            );
            println!(
                "  votes:    {} cast, {} resolved",
                view.total_votes, view.resolved_votes
            );
            println!(
                "  quota:    {} this hour, {} today",
                view.quotas_remaining.remaining_hour, view.quotas_remaining.remaining_day
            );
        })
    }

    pub fn queue(&self, claims: &[Claim]) -> Result<()> {
        self.emit(&claims, || {
            if claims.is_empty() {
                println!("{}", "Nothing to validate".bright_black());
            }
            for (i, claim) in claims.iter().enumerate() {
                println!(
                    "  {}. {} [{}] difficulty {:.2}{}",
                    i + 1,
                    claim.id,
                    claim.category,
                    claim.validation_difficulty,
                    if claim.is_bounty_linked() { " (bounty)" } else { "" }
                );
            }
        })
    }

    pub fn history(&self, items: &[HistoryItem]) -> Result<()> {
        self.emit(&items, || {
            for item in items {
                let verdict = match item.matched_outcome {
                    Some(true) => "correct".green().to_string(),
                    Some(false) => "wrong".red().to_string(),
                    None => "open".bright_black().to_string(),
                };
                let reward = item.reward.map(money).unwrap_or_else(|| "-".to_string());
                println!(
                    "  {} {} {} ({:.2}) {} {}",
                    item.cast_at.format("%Y-%m-%d %H:%M"),
                    item.claim_id,
                    item.decision,
                    item.confidence,
                    verdict,
                    reward
                );
            }
        })
    }

    pub fn stats(&self, stats: &ValidatorStats) -> Result<()> {
        self.emit(stats, || {
            println!("{} {}", "Validator".bold(), stats.validator_id);
            println!("  tier:      {}", tier_label(stats.tier));
            println!(
                "  votes:     {} ({} approve, {} reject)",
                stats.total_votes, stats.approvals, stats.rejections
            );
            match stats.accuracy_on_decided {
                Some(acc) => println!(
                    "  decided:   {} correct of {} ({:.1}%)",
                    stats.correct,
                    stats.decided,
                    acc * 100.0
                ),
                None => println!("  decided:   none yet"),
            }
            println!("  earned:    {}", money(stats.validation_earnings));
        })
    }

    pub fn earnings(&self, summary: &LedgerSummary) -> Result<()> {
        self.emit(summary, || {
            println!("{} {}", "Earnings for".bold(), summary.user_id);
            for kind in EntryKind::all() {
                println!("  {:<18} {}", kind.as_str(), money(summary.amount_for(kind)));
            }
            println!("  {:<18} {}", "total", money(summary.total));
            if summary.compensations > 0 {
                println!("  ({} entries, {} corrections)", summary.entries, summary.compensations);
            }
        })
    }

    pub fn resolution(&self, report: &ResolutionReport) -> Result<()> {
        self.emit(report, || {
            println!(
                "{} {}: {:?}, {} voters updated",
                report.claim_id,
                stage_label(report.stage),
                report.status,
                report.voters_updated
            );
            if let Some(paid) = report.submission_paid {
                println!("  submission reward {} paid", money(paid));
            }
            if report.submission_pending {
                println!("  {}", "submission reward pending; run `spotd reconcile`".yellow());
            }
        })
    }

    pub fn reconcile(&self, report: &ReconcileReport) -> Result<()> {
        self.emit(report, || {
            println!("scanned {} votes", report.votes_scanned);
            println!("  rewards backfilled:     {}", report.rewards_backfilled);
            println!("  claims resolved:        {}", report.claims_resolved);
            println!("  submissions backfilled: {}", report.submissions_backfilled);
            if report.failures > 0 {
                println!("  {} {}", "failures:".red(), report.failures);
            }
        })
    }

    pub fn correction(&self, entry: Option<&LedgerEntry>) -> Result<()> {
        self.emit(&entry, || match entry {
            Some(e) => println!(
                "{} appended {} to {} on {} ({})",
                "✓".green(),
                money(e.amount),
                e.user_id,
                e.claim_id,
                e.kind
            ),
            None => println!("{}", "Payout already at the requested amount".bright_black()),
        })
    }
}
