//! Volatility scoring from tick history.
//!
//! The score is the standard deviation of recent tick movements mapped
//! linearly onto [0, 100], saturating at 200 ticks. Everything is integer
//! math so the same history always produces the same score.

use arrayvec::ArrayVec;

use crate::history::TickHistory;
use crate::u256_math::isqrt;

/// Samples required before statistics are computed.
pub const MIN_SAMPLES: usize = 10;

/// Most recent ticks considered.
pub const WINDOW: usize = 50;

/// Score used when history is too short.
pub const DEFAULT_SCORE: u8 = 50;

/// Standard deviation (ticks) mapped to a score of 100.
pub const STD_DEV_CEILING: u128 = 200;

/// Volatility summary of one history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolatilityEstimate {
    /// Score in [0, 100]
    pub score: u8,
    /// Mean absolute movement between consecutive ticks
    pub average_tick_movement: u64,
}

/// Score a single history.
pub fn estimate(history: &TickHistory) -> VolatilityEstimate {
    if history.len() < MIN_SAMPLES {
        return VolatilityEstimate {
            score: DEFAULT_SCORE,
            average_tick_movement: 0,
        };
    }

    let window: ArrayVec<i32, WINDOW> = history.recent(WINDOW).collect();
    let movements: ArrayVec<i64, WINDOW> = window
        .windows(2)
        .map(|w| i64::from(w[1]) - i64::from(w[0]))
        .collect();
    let n = movements.len() as i128;

    let sum: i128 = movements.iter().map(|&m| i128::from(m)).sum();
    let mean = sum / n;

    let squared: u128 = movements
        .iter()
        .map(|&m| (i128::from(m) - mean).unsigned_abs().pow(2))
        .sum();
    let std_dev = isqrt(squared / n as u128);

    let absolute: u128 = movements.iter().map(|m| u128::from(m.unsigned_abs())).sum();

    VolatilityEstimate {
        score: score_from_std_dev(std_dev),
        average_tick_movement: (absolute / n as u128) as u64,
    }
}

fn score_from_std_dev(std_dev: u128) -> u8 {
    if std_dev >= STD_DEV_CEILING {
        100
    } else {
        (std_dev * 100 / STD_DEV_CEILING) as u8
    }
}

/// Baseline volatility assumed from a pool's fee tier when nothing has been
/// observed yet. Fee is in hundredths of a bip.
pub fn fee_tier_volatility(fee: u32, tick: i32) -> u8 {
    let base: u32 = match fee {
        f if f >= 10_000 => 75,
        f if f >= 3_000 => 50,
        f if f >= 500 => 30,
        _ => 20,
    };

    let magnitude = tick.unsigned_abs();
    let adjusted = if magnitude > 200_000 {
        base * 12 / 10
    } else if magnitude > 100_000 {
        base * 11 / 10
    } else {
        base
    };

    adjusted.min(100) as u8
}

/// Pool-level volatility across every protocol tracking the pool.
///
/// Takes the highest score among histories with enough samples. Falls back
/// to the default score when histories exist but are all short, and to the
/// fee tier when there are none.
pub fn pool_volatility<'a>(
    histories: impl IntoIterator<Item = &'a TickHistory>,
    fee: u32,
    tick: i32,
) -> u8 {
    let mut observed = false;
    let mut highest: Option<u8> = None;

    for history in histories {
        if history.is_empty() {
            continue;
        }
        observed = true;
        if history.len() >= MIN_SAMPLES {
            highest = highest.max(Some(history.volatility_score()));
        }
    }

    match (observed, highest) {
        (false, _) => fee_tier_volatility(fee, tick),
        (true, None) => DEFAULT_SCORE,
        (true, Some(score)) => score,
    }
}
