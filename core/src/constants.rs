//! Engine-wide constants

/// Ledger amounts are stored as signed integer micro-dollars.
pub const MICROS_PER_DOLLAR: i64 = 1_000_000;

/// Hard ceiling on a single standard validation reward ($4.69).
pub const MAX_VALIDATION_REWARD_MICROS: i64 = 4_690_000;

/// Default base validation rate ($0.02).
pub const BASE_VALIDATION_RATE_MICROS: i64 = 20_000;

/// Default flat bounty validation reward ($0.10).
pub const BOUNTY_VALIDATION_REWARD_MICROS: i64 = 100_000;

/// Default submission reward when the pricing table has no entry ($1.00).
pub const DEFAULT_SUBMISSION_REWARD_MICROS: i64 = 1_000_000;

/// Neutral accuracy assigned to a validator with no resolved votes.
pub const STARTING_ACCURACY: f64 = 0.5;

