//! Tick and liquidity math for concentrated-liquidity pools.
//!
//! `sqrt_ratio_at_tick` reproduces the canonical TickMath bit decomposition
//! in Q64.96; `liquidity_for_amounts` is the constant-product
//! liquidity-for-amounts formula.

use alloy::primitives::U256;

use crate::u256_math::mul_div;

/// Minimum tick supported by the pool manager.
pub const MIN_TICK: i32 = -887_272;
/// Maximum tick supported by the pool manager.
pub const MAX_TICK: i32 = 887_272;

/// 2^96
pub const Q96: U256 = U256::from_limbs([0, 1 << 32, 0, 0]);

/// Multipliers for each set bit of |tick|, as Q128.128 values of 1/sqrt(1.0001)^(2^i).
const TICK_MULTIPLIERS: [(u32, u128); 19] = [
    (0x2, 0xfff97272373d413259a46990580e213a),
    (0x4, 0xfff2e50f5f656932ef12357cf3c7fdcc),
    (0x8, 0xffe5caca7e10e4e61c3624eaa0941cd0),
    (0x10, 0xffcb9843d60f6159c9db58835c926644),
    (0x20, 0xff973b41fa98c081472e6896dfb254c0),
    (0x40, 0xff2ea16466c96a3843ec78b326b52861),
    (0x80, 0xfe5dee046a99a2a811c461f1969c3053),
    (0x100, 0xfcbe86c7900a88aedcffc83b479aa3a4),
    (0x200, 0xf987a7253ac413176f2b074cf7815e54),
    (0x400, 0xf3392b0822b70005940c7a398e4b70f3),
    (0x800, 0xe7159475a2c29b7443b29c7fa6e889d9),
    (0x1000, 0xd097f3bdfd2022b8845ad8f792aa5825),
    (0x2000, 0xa9f746462d870fdf8a65dc1f90e061e5),
    (0x4000, 0x70d869a156d2a1b890bb3df62baf32f7),
    (0x8000, 0x31be135f97d08fd981231505542fcfa6),
    (0x10000, 0x9aa508b5b7a84e1c677de54f3e99bc9),
    (0x20000, 0x5d6af8dedb81196699c329225ee604),
    (0x40000, 0x2216e584f5fa1ea926041bedfe98),
    (0x80000, 0x48a170391f7dc42444e8fa2),
];

/// sqrt(1.0001^tick) as a Q64.96 value. `None` outside [MIN_TICK, MAX_TICK].
pub fn sqrt_ratio_at_tick(tick: i32) -> Option<U256> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return None;
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 0x1 != 0 {
        U256::from(0xfffcb933bd6fad37aa2d162d1a594001u128)
    } else {
        U256::from(1u64) << 128
    };

    for (bit, multiplier) in TICK_MULTIPLIERS {
        if abs_tick & bit != 0 {
            ratio = (ratio * U256::from(multiplier)) >> 128;
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 -> Q64.96, rounding up
    let rounding = if ratio.as_limbs()[0] & 0xffff_ffff == 0 { 0u64 } else { 1 };
    Some((ratio >> 32) + U256::from(rounding))
}

/// Round `tick` down (towards negative infinity) to a multiple of `spacing`.
#[inline]
pub fn align_down(tick: i32, spacing: i32) -> i32 {
    tick.div_euclid(spacing) * spacing
}

/// Smallest tick usable with `spacing`.
#[inline]
pub fn min_usable_tick(spacing: i32) -> i32 {
    -(MAX_TICK / spacing * spacing)
}

/// Largest tick usable with `spacing`.
#[inline]
pub fn max_usable_tick(spacing: i32) -> i32 {
    MAX_TICK / spacing * spacing
}

/// Liquidity received for `amount0` between two sqrt prices.
pub fn liquidity_for_amount0(sqrt_a: U256, sqrt_b: U256, amount0: u128) -> U256 {
    let (lo, hi) = ordered(sqrt_a, sqrt_b);
    if lo == hi {
        return U256::ZERO;
    }
    let intermediate = mul_div(lo, hi, Q96).unwrap_or(U256::MAX);
    mul_div(U256::from(amount0), intermediate, hi - lo).unwrap_or(U256::MAX)
}

/// Liquidity received for `amount1` between two sqrt prices.
pub fn liquidity_for_amount1(sqrt_a: U256, sqrt_b: U256, amount1: u128) -> U256 {
    let (lo, hi) = ordered(sqrt_a, sqrt_b);
    if lo == hi {
        return U256::ZERO;
    }
    mul_div(U256::from(amount1), Q96, hi - lo).unwrap_or(U256::MAX)
}

/// Maximum liquidity that `amount0`/`amount1` can fund in `[sqrt_a, sqrt_b]`
/// given the current price, saturated to `u128`.
pub fn liquidity_for_amounts(
    sqrt_price: U256,
    sqrt_a: U256,
    sqrt_b: U256,
    amount0: u128,
    amount1: u128,
) -> u128 {
    let (lo, hi) = ordered(sqrt_a, sqrt_b);

    let liquidity = if sqrt_price <= lo {
        liquidity_for_amount0(lo, hi, amount0)
    } else if sqrt_price < hi {
        let l0 = liquidity_for_amount0(sqrt_price, hi, amount0);
        let l1 = liquidity_for_amount1(lo, sqrt_price, amount1);
        l0.min(l1)
    } else {
        liquidity_for_amount1(lo, hi, amount1)
    };

    if liquidity > U256::from(u128::MAX) {
        u128::MAX
    } else {
        liquidity.to::<u128>()
    }
}

fn ordered(a: U256, b: U256) -> (U256, U256) {
    if a > b {
        (b, a)
    } else {
        (a, b)
    }
}
