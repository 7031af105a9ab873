//! Input validation utilities.
//!
//! Checks shared by borrower operations, redemptions and the stability pool.
//! Each returns the specific `Error` variant so callers can simply `?` them.

use crate::error::{Error, Result};
use crate::utils::constants::DECIMAL_PRECISION;

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNT VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate that an amount is non-zero
pub fn validate_non_zero(amount: u128) -> Result<()> {
    if amount == 0 {
        return Err(Error::ZeroAmount);
    }
    Ok(())
}

/// Validate that `available` covers `required`
pub fn validate_sufficient_balance(required: u128, available: u128) -> Result<()> {
    if available < required {
        return Err(Error::InsufficientBalance {
            required,
            available,
        });
    }
    Ok(())
}

/// Validate net debt against the protocol floor
pub fn validate_min_net_debt(net_debt: u128, minimum: u128) -> Result<()> {
    if net_debt < minimum {
        return Err(Error::NetDebtBelowMinimum { net_debt, minimum });
    }
    Ok(())
}

/// A trove adjustment may add or withdraw collateral, never both
pub fn validate_single_collateral_change(deposit: u128, withdrawal: u128) -> Result<()> {
    if deposit != 0 && withdrawal != 0 {
        return Err(Error::CollateralChangeConflict);
    }
    Ok(())
}

/// A trove adjustment must change something
pub fn validate_non_zero_adjustment(deposit: u128, withdrawal: u128, debt_change: u128) -> Result<()> {
    if deposit == 0 && withdrawal == 0 && debt_change == 0 {
        return Err(Error::NoAdjustment);
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// RATIO VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate a collateral ratio against a minimum
pub fn validate_ratio_at_least(current: u128, minimum: u128) -> Result<()> {
    if current < minimum {
        return Err(Error::CollateralRatioTooLow { current, minimum });
    }
    Ok(())
}

/// Validate that a resulting TCR stays at or above CCR
pub fn validate_tcr_at_least(tcr: u128, ccr: u128) -> Result<()> {
    if tcr < ccr {
        return Err(Error::TcrBelowCritical { tcr, ccr });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// FEE VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate a caller's maximum fee percentage.
///
/// With `floor_applies` the value must lie in `[floor, 100%]`; otherwise any
/// value up to 100% is accepted (borrowing in Recovery Mode pays no fee).
pub fn validate_max_fee_percentage(max_fee: u128, floor: u128, floor_applies: bool) -> Result<()> {
    let min = if floor_applies { floor } else { 0 };
    if max_fee < min || max_fee > DECIMAL_PRECISION {
        return Err(Error::InvalidMaxFee {
            value: max_fee,
            min,
            max: DECIMAL_PRECISION,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::BORROWING_FEE_FLOOR;

    #[test]
    fn test_validate_non_zero() {
        assert!(validate_non_zero(1).is_ok());
        assert_eq!(validate_non_zero(0), Err(Error::ZeroAmount));
    }

    #[test]
    fn test_validate_collateral_change() {
        assert!(validate_single_collateral_change(5, 0).is_ok());
        assert!(validate_single_collateral_change(0, 5).is_ok());
        assert_eq!(
            validate_single_collateral_change(5, 5),
            Err(Error::CollateralChangeConflict)
        );
        assert_eq!(validate_non_zero_adjustment(0, 0, 0), Err(Error::NoAdjustment));
        assert!(validate_non_zero_adjustment(0, 0, 1).is_ok());
    }

    #[test]
    fn test_validate_ratios() {
        assert!(validate_ratio_at_least(11, 11).is_ok());
        assert!(matches!(
            validate_ratio_at_least(10, 11),
            Err(Error::CollateralRatioTooLow { .. })
        ));
        assert!(matches!(
            validate_tcr_at_least(10, 11),
            Err(Error::TcrBelowCritical { .. })
        ));
    }

    #[test]
    fn test_validate_max_fee() {
        assert!(validate_max_fee_percentage(BORROWING_FEE_FLOOR, BORROWING_FEE_FLOOR, true).is_ok());
        assert!(validate_max_fee_percentage(DECIMAL_PRECISION, BORROWING_FEE_FLOOR, true).is_ok());
        assert!(validate_max_fee_percentage(BORROWING_FEE_FLOOR - 1, BORROWING_FEE_FLOOR, true).is_err());
        assert!(validate_max_fee_percentage(0, BORROWING_FEE_FLOOR, false).is_ok());
        assert!(validate_max_fee_percentage(DECIMAL_PRECISION + 1, BORROWING_FEE_FLOOR, false).is_err());
    }

    #[test]
    fn test_validate_balances() {
        assert!(validate_sufficient_balance(5, 5).is_ok());
        assert!(matches!(
            validate_sufficient_balance(6, 5),
            Err(Error::InsufficientBalance { required: 6, available: 5 })
        ));
        assert!(validate_min_net_debt(10, 10).is_ok());
        assert!(validate_min_net_debt(9, 10).is_err());
    }
}
