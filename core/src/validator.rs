//! Per-validator reliability and activity state

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reliability class, driving both vote weight and reward multiplier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Learning,
    Verified,
    Elite,
    Master,
    /// Votes still count toward consensus but earn nothing
    Suspended,
}

impl Tier {
    pub fn is_suspended(&self) -> bool {
        matches!(self, Tier::Suspended)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Learning => write!(f, "learning"),
            Self::Verified => write!(f, "verified"),
            Self::Elite => write!(f, "elite"),
            Self::Master => write!(f, "master"),
            Self::Suspended => write!(f, "suspended"),
        }
    }
}

/// Vote quota counters. Windows are anchored by timestamps and roll over lazily.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuotaCounters {
    /// Start of the clock hour the hourly counter belongs to
    pub hour_start: Option<DateTime<Utc>>,
    pub votes_this_hour: u32,

    /// Calendar day (UTC) the daily counter belongs to
    pub day: Option<NaiveDate>,
    pub votes_today: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorState {
    pub validator_id: String,

    /// Fraction of resolved votes that matched the final outcome
    pub accuracy: f64,

    /// Derived from accuracy, always > 0
    pub vote_weight: f64,

    pub tier: Tier,
    pub daily_streak_days: u32,
    pub session_streak_count: u32,
    pub quota: QuotaCounters,

    pub total_votes: u64,

    /// Votes on claims that reached a terminal stage
    pub resolved_votes: u64,

    /// Resolved votes that matched consensus ("quality votes")
    pub correct_votes: u64,

    pub last_vote_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Optimistic-concurrency counter, bumped on every write
    #[serde(default)]
    pub version: u64,
}

impl ValidatorState {
    pub fn new(validator_id: String, accuracy: f64, vote_weight: f64, now: DateTime<Utc>) -> Self {
        Self {
            validator_id,
            accuracy,
            vote_weight,
            tier: Tier::Learning,
            daily_streak_days: 0,
            session_streak_count: 0,
            quota: QuotaCounters::default(),
            total_votes: 0,
            resolved_votes: 0,
            correct_votes: 0,
            last_vote_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn votes_today(&self) -> u32 {
        self.quota.votes_today
    }

    pub fn votes_this_hour(&self) -> u32 {
        self.quota.votes_this_hour
    }

    pub fn last_vote_date(&self) -> Option<NaiveDate> {
        self.last_vote_at.map(|t| t.date_naive())
    }
}
