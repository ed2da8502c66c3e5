//! spotd - operator tool for the Spotline validation engine

mod output;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use spot_core::{Amount, BountyLink, Claim, Decision, EntryKind};
use spot_engine::{EngineConfig, ValidationOrchestrator, VoteRequest};
use std::path::PathBuf;

use output::Printer;

#[derive(Parser)]
#[command(name = "spotd")]
#[command(about = "Spotline claim validation engine", version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the storage directory from the config
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration as TOML
    Config,

    /// Register or inspect claims
    #[command(subcommand)]
    Claim(ClaimCommand),

    /// Cast a vote on a claim
    Vote {
        claim_id: String,
        validator_id: String,

        /// approve or reject
        decision: Decision,

        /// Confidence between 0 and 1
        #[arg(short = 'p', long, default_value = "1.0")]
        confidence: f64,

        #[arg(short, long)]
        reasoning: Option<String>,
    },

    /// Cast every vote in a JSON file (an array of vote requests)
    Batch { file: PathBuf },

    /// Tier, weight, streaks and remaining quota of a validator
    State { validator_id: String },

    /// Open claims a validator can still vote on, best first
    Queue {
        validator_id: String,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// A validator's votes, newest first
    History {
        validator_id: String,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Voting record and validation earnings
    Stats { validator_id: String },

    /// Ledger totals for a user
    Earnings { user_id: String },

    /// Apply the outcome of a terminal claim to its voters
    Resolve { claim_id: String },

    /// Backfill missing ledger entries and unfinished resolutions
    Reconcile,

    /// Correct a payout by appending a compensating entry
    Correct {
        user_id: String,
        claim_id: String,

        #[arg(value_enum)]
        kind: KindArg,

        /// Corrected payout in dollars
        amount: f64,

        /// Reuse an id to make the correction safe to repeat
        #[arg(long)]
        correction_id: Option<String>,
    },
}

#[derive(Subcommand)]
enum ClaimCommand {
    /// Register a claim for validation
    Add {
        claim_id: String,
        owner_id: String,
        category: String,

        /// How hard the claim is to check, 0 to 1
        #[arg(long, default_value = "0.5")]
        difficulty: f64,

        /// Link the claim to a bounty
        #[arg(long)]
        bounty: Option<String>,

        /// Validation reward in dollars for the linked bounty
        #[arg(long, requires = "bounty")]
        bounty_reward: Option<f64>,
    },

    /// Show a claim
    Show { claim_id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Validation,
    Submission,
    Bounty,
}

impl From<KindArg> for EntryKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Validation => EntryKind::ValidationReward,
            KindArg::Submission => EntryKind::SubmissionReward,
            KindArg::Bounty => EntryKind::BountyReward,
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }
    Ok(config)
}

fn dollars(name: &str, value: f64) -> Result<Amount> {
    if !value.is_finite() || value < 0.0 {
        bail!("{} must be a non-negative amount, got {}", name, value);
    }
    Ok(Amount::from_dollars(value))
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let out = Printer::new(cli.json);

    if let Commands::Config = cli.command {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let engine = ValidationOrchestrator::open(config)?;

    match cli.command {
        Commands::Config => {}

        Commands::Claim(ClaimCommand::Add {
            claim_id,
            owner_id,
            category,
            difficulty,
            bounty,
            bounty_reward,
        }) => {
            let mut claim = Claim::new(claim_id, owner_id, category, Utc::now()).with_difficulty(difficulty);
            if let Some(bounty_ref) = bounty {
                let validation_reward = bounty_reward.map(|r| dollars("bounty reward", r)).transpose()?;
                claim = claim.with_bounty(BountyLink {
                    bounty_ref,
                    validation_reward,
                });
            }
            engine.register_claim(claim.clone()).await?;
            out.claim(&claim)?;
        }

        Commands::Claim(ClaimCommand::Show { claim_id }) => {
            out.claim(&engine.claim(&claim_id).await?)?;
        }

        Commands::Vote {
            claim_id,
            validator_id,
            decision,
            confidence,
            reasoning,
        } => {
            let mut request = VoteRequest::new(&claim_id, &validator_id, decision, confidence);
            if let Some(text) = reasoning {
                request = request.with_reasoning(text);
            }
            out.receipt(&engine.submit_vote(request).await?)?;
        }

        Commands::Batch { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let requests: Vec<VoteRequest> =
                serde_json::from_str(&text).with_context(|| format!("parsing {}", file.display()))?;
            let outcomes = engine.submit_votes(requests).await;
            out.batch(&outcomes)?;
        }

        Commands::State { validator_id } => {
            out.state(&engine.validator_state(&validator_id).await?)?;
        }

        Commands::Queue { validator_id, limit } => {
            out.queue(&engine.prioritized_claims(&validator_id, limit).await?)?;
        }

        Commands::History { validator_id, limit } => {
            out.history(&engine.validation_history(&validator_id, limit).await?)?;
        }

        Commands::Stats { validator_id } => {
            out.stats(&engine.validator_stats(&validator_id).await?)?;
        }

        Commands::Earnings { user_id } => {
            out.earnings(&engine.earnings_summary(&user_id).await?)?;
        }

        Commands::Resolve { claim_id } => {
            out.resolution(&engine.resolve_claim(&claim_id).await?)?;
        }

        Commands::Reconcile => {
            out.reconcile(&engine.reconcile().await?)?;
        }

        Commands::Correct {
            user_id,
            claim_id,
            kind,
            amount,
            correction_id,
        } => {
            let corrected = dollars("amount", amount)?;
            let correction_id = correction_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let entry = engine
                .correct_reward(&user_id, &claim_id, kind.into(), corrected, &correction_id)
                .await?;
            out.correction(entry.as_ref())?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()).await {
        log::error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
