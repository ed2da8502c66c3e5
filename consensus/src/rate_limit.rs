//! Per-validator vote quotas
//!
//! Limits how many votes a validator can cast per clock hour and per UTC
//! calendar day. Counters live on the validator's state; windows are
//! recomputed from the timestamp on every check, so an expired window simply
//! starts again at zero. There is no background sweep.
//!
//! The functions here are pure. Callers run `try_reserve` inside whatever
//! atomic primitive their store offers so check-and-consume is one step.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use spot_core::{ConfigError, ConfigResult, QuotaCounters};

/// Rate limiter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum votes per validator per clock hour
    pub max_votes_per_hour: u32,

    /// Maximum votes per validator per UTC day
    pub max_votes_per_day: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_votes_per_hour: 20,
            max_votes_per_day: 100,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_votes_per_hour == 0 {
            return Err(ConfigError::MustBePositive("max_votes_per_hour"));
        }
        if self.max_votes_per_day == 0 {
            return Err(ConfigError::MustBePositive("max_votes_per_day"));
        }
        if self.max_votes_per_hour > self.max_votes_per_day {
            return Err(ConfigError::Inconsistent(format!(
                "max_votes_per_hour ({}) exceeds max_votes_per_day ({})",
                self.max_votes_per_hour, self.max_votes_per_day
            )));
        }
        Ok(())
    }
}

/// Outcome of a quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaCheck {
    pub allowed: bool,
    pub remaining_hour: u32,
    pub remaining_day: u32,
}

/// Start of the clock hour containing `now`
pub fn hour_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now)
}

/// Zero any counter whose window no longer contains `now`
pub fn roll_windows(quota: &mut QuotaCounters, now: DateTime<Utc>) {
    let hour = hour_start(now);
    if quota.hour_start != Some(hour) {
        quota.hour_start = Some(hour);
        quota.votes_this_hour = 0;
    }

    let day = now.date_naive();
    if quota.day != Some(day) {
        quota.day = Some(day);
        quota.votes_today = 0;
    }
}

fn check(quota: &QuotaCounters, config: &RateLimitConfig) -> QuotaCheck {
    let remaining_hour = config.max_votes_per_hour.saturating_sub(quota.votes_this_hour);
    let remaining_day = config.max_votes_per_day.saturating_sub(quota.votes_today);
    QuotaCheck {
        allowed: remaining_hour > 0 && remaining_day > 0,
        remaining_hour,
        remaining_day,
    }
}

/// Check and consume one vote of quota.
///
/// On success both counters are incremented and the returned remainders
/// already account for the vote. On exhaustion nothing is consumed.
pub fn try_reserve(quota: &mut QuotaCounters, config: &RateLimitConfig, now: DateTime<Utc>) -> QuotaCheck {
    roll_windows(quota, now);

    let before = check(quota, config);
    if !before.allowed {
        log::debug!(
            "quota exhausted: {}/{} this hour, {}/{} today",
            quota.votes_this_hour,
            config.max_votes_per_hour,
            quota.votes_today,
            config.max_votes_per_day
        );
        return before;
    }

    quota.votes_this_hour += 1;
    quota.votes_today += 1;

    QuotaCheck {
        allowed: true,
        remaining_hour: before.remaining_hour - 1,
        remaining_day: before.remaining_day - 1,
    }
}

/// Give back one vote reserved at `reserved_at`.
///
/// Only counters still in the reservation's window are decremented; a window
/// that has already rolled over owes nothing. Returns whether anything changed.
pub fn release(quota: &mut QuotaCounters, reserved_at: DateTime<Utc>) -> bool {
    let mut released = false;
    if quota.hour_start == Some(hour_start(reserved_at)) && quota.votes_this_hour > 0 {
        quota.votes_this_hour -= 1;
        released = true;
    }
    if quota.day == Some(reserved_at.date_naive()) && quota.votes_today > 0 {
        quota.votes_today -= 1;
        released = true;
    }
    released
}

/// Remaining quota at `now`, without consuming anything
pub fn remaining(quota: &QuotaCounters, config: &RateLimitConfig, now: DateTime<Utc>) -> QuotaCheck {
    let mut rolled = quota.clone();
    roll_windows(&mut rolled, now);
    check(&rolled, config)
}
