//! Fixed-point arithmetic and mathematical utilities.
//!
//! Amounts are stored as `u128` with 18 decimals. Products of two such values
//! overflow `u128` quickly, so every multiply-then-divide goes through a
//! 256-bit intermediate and is narrowed back with an explicit overflow check.

use primitive_types::U256;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{Error, Result};
use crate::utils::constants::{DECIMAL_PRECISION, MAX_DEC_POW_MINUTES, NICR_PRECISION};

// ═══════════════════════════════════════════════════════════════════════════════
// WIDE ARITHMETIC
// ═══════════════════════════════════════════════════════════════════════════════

fn narrow(value: U256, operation: impl FnOnce() -> String) -> Result<u128> {
    if value > U256::from(u128::MAX) {
        return Err(Error::Overflow {
            operation: operation(),
        });
    }
    Ok(value.low_u128())
}

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or_else(|| Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or_else(|| Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: u128, b: u128) -> Result<u128> {
    a.checked_mul(b).ok_or_else(|| Error::Overflow {
        operation: format!("{} * {}", a, b),
    })
}

/// `floor(a * b / c)` with a 256-bit intermediate product
pub fn mul_div(a: u128, b: u128, c: u128) -> Result<u128> {
    if c == 0 {
        return Err(Error::DivisionByZero);
    }
    let result = U256::from(a) * U256::from(b) / U256::from(c);
    narrow(result, || format!("({} * {}) / {}", a, b, c))
}

/// `ceil(a * b / c)` with a 256-bit intermediate product
pub fn mul_div_up(a: u128, b: u128, c: u128) -> Result<u128> {
    if c == 0 {
        return Err(Error::DivisionByZero);
    }
    let numerator = U256::from(a) * U256::from(b);
    let divisor = U256::from(c);
    let mut result = numerator / divisor;
    if !(numerator % divisor).is_zero() {
        result += U256::one();
    }
    narrow(result, || format!("ceil(({} * {}) / {})", a, b, c))
}

/// Per-unit share with error feedback: `(amount * 1e18 + carried_error) / divisor`.
///
/// Returns the quotient and the remainder to carry into the next call, so
/// truncation losses are not lost across successive distributions.
pub fn per_unit_with_error(amount: u128, carried_error: u128, divisor: u128) -> Result<(u128, u128)> {
    if divisor == 0 {
        return Err(Error::DivisionByZero);
    }
    let numerator = U256::from(amount) * U256::from(DECIMAL_PRECISION) + U256::from(carried_error);
    let divisor_wide = U256::from(divisor);
    let quotient = numerator / divisor_wide;
    let remainder = numerator - quotient * divisor_wide;
    let quotient = narrow(quotient, || format!("per_unit({}, {}, {})", amount, carried_error, divisor))?;
    Ok((quotient, remainder.low_u128()))
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECIMAL OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Multiply two 18-decimal values, rounding half up
pub fn dec_mul(x: u128, y: u128) -> Result<u128> {
    let product = U256::from(x) * U256::from(y) + U256::from(DECIMAL_PRECISION / 2);
    narrow(product / U256::from(DECIMAL_PRECISION), || {
        format!("dec_mul({}, {})", x, y)
    })
}

/// Raise an 18-decimal base to an integer power by repeated squaring.
///
/// The exponent is capped at `MAX_DEC_POW_MINUTES`; for bases below one the
/// result is already indistinguishable from zero long before that.
pub fn dec_pow(base: u128, minutes: u64) -> Result<u128> {
    let mut n = minutes.min(MAX_DEC_POW_MINUTES);
    if n == 0 {
        return Ok(DECIMAL_PRECISION);
    }

    let mut y = DECIMAL_PRECISION;
    let mut x = base;
    while n > 1 {
        if n % 2 == 0 {
            x = dec_mul(x, x)?;
            n /= 2;
        } else {
            y = dec_mul(x, y)?;
            x = dec_mul(x, x)?;
            n = (n - 1) / 2;
        }
    }
    dec_mul(x, y)
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERALIZATION CALCULATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Collateral ratio at `price`: `coll * price / debt`.
///
/// Zero debt yields `u128::MAX` (infinite ratio); ratios beyond `u128` saturate.
pub fn compute_cr(coll: u128, debt: u128, price: u128) -> u128 {
    if debt == 0 {
        return u128::MAX;
    }
    let ratio = U256::from(coll) * U256::from(price) / U256::from(debt);
    if ratio > U256::from(u128::MAX) {
        u128::MAX
    } else {
        ratio.low_u128()
    }
}

/// Price-independent ratio used for sorting: `coll * 1e20 / debt`
pub fn compute_nominal_cr(coll: u128, debt: u128) -> u128 {
    compute_cr(coll, debt, NICR_PRECISION)
}

/// Absolute difference of two values
pub fn abs_diff(a: u128, b: u128) -> u128 {
    if a >= b {
        a - b
    } else {
        b - a
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FORMATTING
// ═══════════════════════════════════════════════════════════════════════════════

/// Render an 18-decimal amount as a human-readable decimal string
pub fn format_amount(amount: u128) -> String {
    let decimal = i128::try_from(amount)
        .ok()
        .and_then(|raw| Decimal::try_from_i128_with_scale(raw, 18).ok());

    match decimal {
        Some(value) => value.normalize().to_string(),
        None => {
            let whole = amount / DECIMAL_PRECISION;
            let frac = amount % DECIMAL_PRECISION;
            if frac == 0 {
                whole.to_string()
            } else {
                format!("{}.{:018}", whole, frac).trim_end_matches('0').to_string()
            }
        }
    }
}

/// Convert a decimal value to an 18-decimal amount, truncating extra digits
pub fn decimal_to_amount(value: Decimal) -> Result<u128> {
    if value.is_sign_negative() {
        return Err(Error::InvalidParameter {
            name: "amount".into(),
            reason: format!("{} is negative", value),
        });
    }
    let truncated = value.round_dp_with_strategy(18, RoundingStrategy::ToZero);
    let mantissa = u128::try_from(truncated.mantissa()).map_err(|_| Error::Overflow {
        operation: format!("amount {}", value),
    })?;
    let factor = 10u128.pow(18 - truncated.scale());
    safe_mul(mantissa, factor)
}

/// Convert whole units to an 18-decimal amount
pub const fn units(whole: u128) -> u128 {
    whole * DECIMAL_PRECISION
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::MINUTE_DECAY_FACTOR;

    #[test]
    fn test_safe_arithmetic() {
        assert_eq!(safe_add(1, 2).unwrap(), 3);
        assert!(safe_add(u128::MAX, 1).is_err());
        assert_eq!(safe_sub(5, 3).unwrap(), 2);
        assert!(matches!(safe_sub(3, 5), Err(Error::Underflow { .. })));
        assert!(safe_mul(u128::MAX, 2).is_err());
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // 2000e18 * 1e18 overflows u128 without the wide product
        let debt = units(2_000);
        assert_eq!(mul_div(debt, DECIMAL_PRECISION, debt).unwrap(), DECIMAL_PRECISION);
        assert_eq!(mul_div(u128::MAX, 3, 3).unwrap(), u128::MAX);
        assert!(matches!(
            mul_div(u128::MAX, 3, 2),
            Err(Error::Overflow { .. })
        ));
        assert_eq!(mul_div(1, 1, 0), Err(Error::DivisionByZero));
    }

    #[test]
    fn test_mul_div_up() {
        assert_eq!(mul_div_up(10, 1, 3).unwrap(), 4);
        assert_eq!(mul_div_up(9, 1, 3).unwrap(), 3);
    }

    #[test]
    fn test_per_unit_with_error_carries_remainder() {
        // 10 units over 3 stakes: 3.333.. per unit, remainder carried
        let (per_unit, error) = per_unit_with_error(10, 0, 3).unwrap();
        assert_eq!(per_unit, 3_333_333_333_333_333_333);
        assert_eq!(error, 1);

        // Carried error feeds back into the next distribution
        let (_, error) = per_unit_with_error(10, error, 3).unwrap();
        assert_eq!(error, 2);
        assert_eq!(per_unit_with_error(1, 0, 0), Err(Error::DivisionByZero));
    }

    #[test]
    fn test_dec_mul_rounds_half_up() {
        assert_eq!(dec_mul(DECIMAL_PRECISION, 7).unwrap(), 7);
        // 0.5e-18 rounds up to 1e-18
        assert_eq!(dec_mul(DECIMAL_PRECISION / 2, 1).unwrap(), 1);
        assert_eq!(dec_mul(units(2), units(3)).unwrap(), units(6));
    }

    #[test]
    fn test_dec_pow() {
        assert_eq!(dec_pow(MINUTE_DECAY_FACTOR, 0).unwrap(), DECIMAL_PRECISION);
        assert_eq!(dec_pow(MINUTE_DECAY_FACTOR, 1).unwrap(), MINUTE_DECAY_FACTOR);
        assert_eq!(dec_pow(units(2), 10).unwrap(), units(1024));

        // Twelve hours of decay halves the base rate
        let half = dec_pow(MINUTE_DECAY_FACTOR, 720).unwrap();
        assert!(abs_diff(half, DECIMAL_PRECISION / 2) < 1_000_000_000_000_000);
    }

    #[test]
    fn test_dec_pow_caps_exponent() {
        let capped = dec_pow(MINUTE_DECAY_FACTOR, MAX_DEC_POW_MINUTES).unwrap();
        let beyond = dec_pow(MINUTE_DECAY_FACTOR, u64::MAX).unwrap();
        assert_eq!(capped, beyond);
        assert_eq!(beyond, 0);
    }

    #[test]
    fn test_collateral_ratio() {
        // 15 collateral at price 200 against 2000 debt = 150%
        let cr = compute_cr(units(15), units(2_000), units(200));
        assert_eq!(cr, 1_500_000_000_000_000_000);
        assert_eq!(compute_cr(units(1), 0, units(200)), u128::MAX);
    }

    #[test]
    fn test_nominal_cr() {
        let nicr = compute_nominal_cr(units(15), units(2_000));
        assert_eq!(nicr, 750_000_000_000_000_000);
        assert_eq!(compute_nominal_cr(units(1), 0), u128::MAX);
    }

    #[test]
    fn test_decimal_to_amount() {
        use std::str::FromStr;
        assert_eq!(decimal_to_amount(Decimal::from(200)).unwrap(), units(200));
        assert_eq!(
            decimal_to_amount(Decimal::from_str("1.5").unwrap()).unwrap(),
            DECIMAL_PRECISION + DECIMAL_PRECISION / 2
        );
        assert!(decimal_to_amount(Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(units(2_000)), "2000");
        assert_eq!(format_amount(1_500_000_000_000_000_000), "1.5");
        assert_eq!(format_amount(1), "0.000000000000000001");
        assert_eq!(format_amount(0), "0");
    }
}
