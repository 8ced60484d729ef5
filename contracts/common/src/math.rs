//! Mathematical Utilities for mcUSD Protocol
//!
//! Checked fixed-point arithmetic shared by every engine. Token amounts,
//! ratios, rates and accumulators are all `u128`; ratios and rates carry 18
//! decimals. Products are taken in 256 bits, so `a * b / d` only fails when
//! the quotient itself does not fit. Every division rounds down unless
//! stated otherwise.

use primitive_types::U256;

use crate::constants::{precision::DECIMAL_PRECISION, time::MAX_DECAY_MINUTES};
use crate::errors::{McUsdError, McUsdResult};

// ============ Core Fixed-Point ============

fn narrow(value: U256) -> McUsdResult<u128> {
    if value > U256::from(u128::MAX) {
        return Err(McUsdError::Overflow);
    }
    Ok(value.low_u128())
}

/// `floor(a * b / d)` with a 256-bit intermediate product
pub fn mul_div(a: u128, b: u128, d: u128) -> McUsdResult<u128> {
    if d == 0 {
        return Err(McUsdError::DivisionByZero);
    }
    narrow(U256::from(a) * U256::from(b) / U256::from(d))
}

/// `(a * b + carry) / d` as `(quotient, remainder)`.
///
/// Used by accumulators that feed the remainder back in as the next call's
/// `carry`, so nothing is lost to rounding across calls.
pub fn mul_div_rem(a: u128, b: u128, carry: u128, d: u128) -> McUsdResult<(u128, u128)> {
    if d == 0 {
        return Err(McUsdError::DivisionByZero);
    }
    let numerator = U256::from(a) * U256::from(b) + U256::from(carry);
    let d = U256::from(d);
    Ok((narrow(numerator / d)?, (numerator % d).low_u128()))
}

/// Multiply two 1e18 decimals, rounding half up
pub fn dec_mul(x: u128, y: u128) -> McUsdResult<u128> {
    let product = x.checked_mul(y).ok_or(McUsdError::Overflow)?;
    Ok(product
        .checked_add(DECIMAL_PRECISION / 2)
        .ok_or(McUsdError::Overflow)?
        / DECIMAL_PRECISION)
}

/// `base ^ minutes` for a 1e18 decimal base ≤ 1, by repeated squaring.
/// The exponent is capped at [`MAX_DECAY_MINUTES`].
pub fn dec_pow(base: u128, minutes: u64) -> McUsdResult<u128> {
    let mut n = minutes.min(MAX_DECAY_MINUTES);
    if n == 0 {
        return Ok(DECIMAL_PRECISION);
    }

    let mut x = base;
    let mut y = DECIMAL_PRECISION;
    while n > 1 {
        if n % 2 == 1 {
            y = dec_mul(x, y)?;
        }
        x = dec_mul(x, x)?;
        n /= 2;
    }
    dec_mul(x, y)
}

/// `floor(sqrt(a * b))`; the root of a 256-bit product always fits
pub fn sqrt_product(a: u128, b: u128) -> u128 {
    (U256::from(a) * U256::from(b)).integer_sqrt().low_u128()
}

// ============ Collateral Ratios ============

/// USD value of `amount` base units of an asset, in stablecoin base units.
///
/// `price` is USD per whole asset unit with the stablecoin's 8 decimals.
pub fn collateral_value(amount: u128, price: u64, decimals: u8) -> McUsdResult<u128> {
    let scale = 10u128
        .checked_pow(decimals as u32)
        .ok_or(McUsdError::Overflow)?;
    mul_div(amount, price as u128, scale)
}

/// Inverse of [`collateral_value`]: base units of an asset worth `value`
pub fn amount_for_value(value: u128, price: u64, decimals: u8) -> McUsdResult<u128> {
    if price == 0 {
        return Err(McUsdError::DivisionByZero);
    }
    let scale = 10u128
        .checked_pow(decimals as u32)
        .ok_or(McUsdError::Overflow)?;
    mul_div(value, scale, price as u128)
}

/// Apply a 1e18 risk weight to a value
pub fn weighted(value: u128, safety_ratio: u128) -> McUsdResult<u128> {
    mul_div(value, safety_ratio, DECIMAL_PRECISION)
}

/// Collateral ratio (1e18 == 100%). Zero debt is an infinite ratio.
pub fn compute_cr(collateral_value: u128, debt: u128) -> McUsdResult<u128> {
    if debt == 0 {
        return Ok(u128::MAX);
    }
    mul_div(collateral_value, DECIMAL_PRECISION, debt)
}

/// Check if system is in Recovery Mode
pub fn is_recovery_mode(tcr: u128, ccr: u128) -> bool {
    tcr < ccr
}

/// `amount * rate / 1e18`, rounded down
pub fn apply_rate(amount: u128, rate: u128) -> McUsdResult<u128> {
    mul_div(amount, rate, DECIMAL_PRECISION)
}

// ============ Safe Math ============

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> McUsdResult<u128> {
    a.checked_add(b).ok_or(McUsdError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> McUsdResult<u128> {
    a.checked_sub(b).ok_or(McUsdError::Underflow)
}
