//! Tick range selection and rebalance policies.
//!
//! Two independent policies live here:
//! - the LP optimizer ([`optimal_range`], [`should_rebalance`]) sizes the
//!   engine's own (pool, protocol) position from the liquidation threshold
//!   and tolerates drift up to a share of the current width;
//! - the user path ([`should_rebalance_position`], [`rebalanced_range`])
//!   recenters opted-in positions by volatility once price nears a boundary.

use alloy::primitives::U256;

use crate::config::{PositionConfig, RangeConfig};
use crate::error::{EngineError, EngineResult};
use crate::position::{PoolPosition, PositionRecord};
use crate::tick_math::{max_usable_tick, min_usable_tick};
use crate::u256_math::wad_to_bps;

const BPS: i64 = 10_000;

fn floor_to(value: i64, spacing: i64) -> i64 {
    value.div_euclid(spacing) * spacing
}

fn to_tick(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Offset in ticks: `threshold_bps * factor / 10000`, at least one spacing.
fn offset(threshold_bps: u64, factor_bps: u32, spacing: i64) -> i64 {
    let raw = u128::from(threshold_bps) * u128::from(factor_bps) / BPS as u128;
    (raw.min(i32::MAX as u128) as i64).max(spacing)
}

/// Spacing that satisfies both the pool's own tick spacing and the
/// configured range spacing: their least common multiple.
pub fn alignment_spacing(pool_spacing: i32, configured_spacing: i32) -> i32 {
    let a = i64::from(pool_spacing.max(1));
    let b = i64::from(configured_spacing.max(1));
    let (mut x, mut y) = (a, b);
    while y != 0 {
        (x, y) = (y, x % y);
    }
    to_tick(a / x * b)
}

/// Target range for the LP position around `current_tick`.
///
/// The downside offset is larger than the upside one. Both bounds are
/// floored to `tick_spacing`, so the result always has `lower < upper`.
pub fn optimal_range(
    current_tick: i32,
    liquidation_threshold: U256,
    tick_spacing: i32,
    config: &RangeConfig,
) -> (i32, i32) {
    let spacing = i64::from(tick_spacing.max(1));
    let threshold_bps = wad_to_bps(liquidation_threshold);
    let lower_offset = offset(threshold_bps, config.lower_offset_factor_bps, spacing);
    let upper_offset = offset(threshold_bps, config.upper_offset_factor_bps, spacing);

    let current = i64::from(current_tick);
    let lower = floor_to(current - lower_offset, spacing);
    let upper = floor_to(current + upper_offset, spacing);
    (to_tick(lower), to_tick(upper))
}

/// Whether the LP position should move to `optimal`.
///
/// True with no liquidity, when price left the range, or when either bound
/// is further from its target than `hysteresis_bps` of the current width.
pub fn should_rebalance(
    position: &PoolPosition,
    optimal: (i32, i32),
    current_tick: i32,
    hysteresis_bps: u32,
) -> bool {
    if position.liquidity == 0 {
        return true;
    }
    if !position.contains(current_tick) {
        return true;
    }

    let width = i64::from(position.upper_tick) - i64::from(position.lower_tick);
    let tolerance = width * i64::from(hysteresis_bps) / BPS;
    let lower_drift = (i64::from(position.lower_tick) - i64::from(optimal.0)).abs();
    let upper_drift = (i64::from(position.upper_tick) - i64::from(optimal.1)).abs();

    lower_drift > tolerance || upper_drift > tolerance
}

/// Whether an opted-in position is outside its range or within
/// `proximity_bps` of its width from either boundary.
pub fn should_rebalance_position(position: &PositionRecord, current_tick: i32, proximity_bps: u32) -> bool {
    if !position.contains(current_tick) {
        return true;
    }

    let lower = i64::from(position.tick_lower);
    let upper = i64::from(position.tick_upper);
    let current = i64::from(current_tick);
    let margin = (upper - lower) * i64::from(proximity_bps) / BPS;

    current - lower < margin || upper - current < margin
}

/// New symmetric range for an opted-in position.
///
/// Half width grows with volatility, clamped to the configured bounds and
/// aligned to the spacing; the bounds are clamped to the usable tick range.
pub fn rebalanced_range(
    current_tick: i32,
    volatility: u8,
    tick_spacing: i32,
    config: &PositionConfig,
) -> EngineResult<(i32, i32)> {
    let spacing = i64::from(tick_spacing.max(1));
    let half_width = (i64::from(config.min_half_width)
        + i64::from(volatility) * i64::from(config.half_width_per_volatility))
    .clamp(i64::from(config.min_half_width), i64::from(config.max_half_width));
    let half_width = floor_to(half_width, spacing).max(spacing);

    let center = floor_to(i64::from(current_tick), spacing);
    let lower = (center - half_width).max(i64::from(min_usable_tick(tick_spacing.max(1))));
    let upper = (center + half_width).min(i64::from(max_usable_tick(tick_spacing.max(1))));

    let (lower, upper) = (to_tick(lower), to_tick(upper));
    if lower >= upper {
        return Err(EngineError::InvalidRange { lower, upper });
    }
    Ok((lower, upper))
}

/// Reject ranges the pool manager would refuse: unordered, outside the
/// usable ticks, or not on the spacing grid.
pub fn validate_range(lower: i32, upper: i32, tick_spacing: i32) -> EngineResult<()> {
    let spacing = tick_spacing.max(1);
    if lower >= upper
        || lower < min_usable_tick(spacing)
        || upper > max_usable_tick(spacing)
        || lower.rem_euclid(spacing) != 0
        || upper.rem_euclid(spacing) != 0
    {
        return Err(EngineError::InvalidRange { lower, upper });
    }
    Ok(())
}
