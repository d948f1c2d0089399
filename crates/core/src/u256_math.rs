//! Fixed-point U256 arithmetic for threshold comparisons and liquidity math.
//!
//! Everything here is integer-only: health metrics and thresholds live on
//! the 18-decimal WAD scale so comparisons are exactly reproducible.

use alloy::primitives::{U256, U512};

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10000u64, 0, 0, 0]);

/// Fractional digits of a WAD value.
const WAD_DECIMALS: usize = 18;

/// Convert a WAD ratio to basis points (1e18 -> 10000), saturating at `u64::MAX`.
#[inline]
pub fn wad_to_bps(wad: U256) -> u64 {
    let bps = wad.saturating_mul(BPS_DENOMINATOR) / WAD;
    if bps > U256::from(u64::MAX) {
        u64::MAX
    } else {
        bps.to::<u64>()
    }
}

/// Build a WAD value from a ratio given in basis points.
#[inline]
pub fn bps_to_wad(bps: u64) -> U256 {
    U256::from(bps) * WAD / BPS_DENOMINATOR
}

/// Parse a decimal string ("1.05", "2", "0.950000000000000001") into WAD exactly.
///
/// Raw integers with more than 18 fractional digits are rejected rather than
/// rounded.
pub fn parse_wad(s: &str) -> anyhow::Result<U256> {
    let s = s.trim();
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        anyhow::bail!("empty decimal value");
    }
    if frac_part.len() > WAD_DECIMALS {
        anyhow::bail!("{s} has more than {WAD_DECIMALS} fractional digits");
    }
    if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
        anyhow::bail!("{s} is not a non-negative decimal");
    }

    let int_value = if int_part.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(int_part, 10)?
    };
    let frac_value = if frac_part.is_empty() {
        U256::ZERO
    } else {
        let padded = format!("{frac_part:0<width$}", width = WAD_DECIMALS);
        U256::from_str_radix(&padded, 10)?
    };

    int_value
        .checked_mul(WAD)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(|| anyhow::anyhow!("{s} overflows U256"))
}

/// Compute `a * b / denominator` with a 512-bit intermediate, rounding down.
///
/// Returns `None` on division by zero or when the result exceeds 256 bits.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return None;
    }
    let product = widen(a) * widen(b);
    narrow(product / widen(denominator))
}

fn widen(value: U256) -> U512 {
    let l = value.as_limbs();
    U512::from_limbs([l[0], l[1], l[2], l[3], 0, 0, 0, 0])
}

fn narrow(value: U512) -> Option<U256> {
    let l = value.as_limbs();
    if l[4..].iter().any(|&limb| limb != 0) {
        return None;
    }
    Some(U256::from_limbs([l[0], l[1], l[2], l[3]]))
}

/// Integer square root by Newton iteration.
///
/// Starts from `x`, iterates `k = (x / k + k) / 2` and stops once the next
/// estimate no longer decreases.
pub fn isqrt(x: u128) -> u128 {
    let mut result = x;
    // (x + 1) / 2 without overflowing at u128::MAX
    let mut k = x / 2 + (x & 1);
    while k < result {
        result = k;
        k = (x / k + k) / 2;
    }
    result
}
