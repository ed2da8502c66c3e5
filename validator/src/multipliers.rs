//! Reward multiplier tables
//!
//! The three factors are multiplied together. Suspended validators have no
//! tier multiplier at all: they earn nothing.

use spot_core::Tier;

pub fn tier_multiplier(tier: Tier) -> Option<f64> {
    match tier {
        Tier::Learning => Some(1.0),
        Tier::Verified => Some(1.5),
        Tier::Elite => Some(2.0),
        Tier::Master => Some(3.0),
        Tier::Suspended => None,
    }
}

pub fn daily_streak_multiplier(days: u32) -> f64 {
    match days {
        0..=2 => 1.0,
        3..=6 => 1.25,
        7..=13 => 1.5,
        14..=29 => 2.0,
        _ => 2.5,
    }
}

pub fn session_streak_multiplier(count: u32) -> f64 {
    match count {
        0..=4 => 1.0,
        5..=9 => 1.25,
        10..=19 => 1.5,
        _ => 2.5,
    }
}

/// Product of all three factors, `None` when the tier earns nothing
pub fn combined(tier: Tier, daily_streak_days: u32, session_streak_count: u32) -> Option<f64> {
    tier_multiplier(tier).map(|t| {
        t * daily_streak_multiplier(daily_streak_days) * session_streak_multiplier(session_streak_count)
    })
}
