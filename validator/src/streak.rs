//! Daily and session streak bookkeeping

use chrono::{DateTime, Days, TimeDelta, Utc};

/// Daily streak after a vote at `now`.
///
/// A vote on the calendar day after the previous one extends the streak, a
/// vote on the same day leaves it alone, anything else starts over at zero.
pub fn next_daily_streak(current: u32, last_vote_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u32 {
    let Some(last) = last_vote_at else {
        return 0;
    };

    let last_day = last.date_naive();
    let today = now.date_naive();

    if today <= last_day {
        current
    } else if last_day.checked_add_days(Days::new(1)) == Some(today) {
        current.saturating_add(1)
    } else {
        0
    }
}

/// Session streak after a vote at `now`. A gap of at least `timeout` starts a new session.
pub fn next_session_streak(
    current: u32,
    last_vote_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    timeout: TimeDelta,
) -> u32 {
    match last_vote_at {
        Some(last) if now - last < timeout => current.saturating_add(1),
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_first_vote() {
        assert_eq!(next_daily_streak(0, None, day(1, 9)), 0);
        assert_eq!(next_session_streak(0, None, day(1, 9), TimeDelta::minutes(5)), 1);
    }

    #[test]
    fn test_daily_streak_rules() {
        // Next calendar day, even if under 24h later
        assert_eq!(next_daily_streak(4, Some(day(1, 23)), day(2, 1)), 5);
        // Same day
        assert_eq!(next_daily_streak(4, Some(day(2, 1)), day(2, 22)), 4);
        // Skipped a day
        assert_eq!(next_daily_streak(4, Some(day(2, 1)), day(4, 1)), 0);
    }

    #[test]
    fn test_daily_streak_across_month_boundary() {
        let last = Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap();
        assert_eq!(next_daily_streak(9, Some(last), now), 10);
    }

    #[test]
    fn test_session_timeout() {
        let timeout = TimeDelta::minutes(5);
        let last = day(1, 9);
        assert_eq!(next_session_streak(3, Some(last), last + TimeDelta::minutes(4), timeout), 4);
        assert_eq!(next_session_streak(3, Some(last), last + TimeDelta::minutes(5), timeout), 1);
    }
}
