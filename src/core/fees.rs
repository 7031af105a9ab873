//! Base-rate fee model.
//!
//! A single base rate drives both the borrowing and the redemption fee:
//!
//! - Redemptions raise it by the redeemed fraction of supply divided by `beta`
//! - It decays exponentially per elapsed minute (12h half-life by default)
//! - Borrowing rate = `min(floor + base, max_borrowing_fee)`, zero in Recovery Mode
//! - Redemption rate = `min(floor + base, 100%)`

use serde::{Deserialize, Serialize};

use crate::core::config::ProtocolParams;
use crate::error::{Error, Result};
use crate::utils::constants::{DECIMAL_PRECISION, SECONDS_IN_ONE_MINUTE};
use crate::utils::math::{dec_pow, mul_div, safe_add};

// ═══════════════════════════════════════════════════════════════════════════════
// BASE RATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Decaying base rate shared by borrowing and redemption fees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseRate {
    /// Base rate as of the last fee operation (18 decimals)
    base_rate: u128,
    /// Timestamp (seconds) of the last fee operation
    last_fee_operation_time: u64,
}

impl BaseRate {
    /// Zero base rate, last fee operation at `now`
    pub fn new(now: u64) -> Self {
        Self {
            base_rate: 0,
            last_fee_operation_time: now,
        }
    }

    /// Restore a base rate from stored values
    pub fn with_state(base_rate: u128, last_fee_operation_time: u64) -> Self {
        Self {
            base_rate,
            last_fee_operation_time,
        }
    }

    /// Undecayed base rate
    pub fn base_rate(&self) -> u128 {
        self.base_rate
    }

    /// Timestamp of the last fee operation
    pub fn last_fee_operation_time(&self) -> u64 {
        self.last_fee_operation_time
    }

    /// Whole minutes elapsed since the last fee operation
    pub fn minutes_passed(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_fee_operation_time) / SECONDS_IN_ONE_MINUTE
    }

    /// Base rate decayed to `now`
    pub fn decayed_base_rate(&self, params: &ProtocolParams, now: u64) -> Result<u128> {
        let decay_factor = dec_pow(params.minute_decay_factor, self.minutes_passed(now))?;
        mul_div(self.base_rate, decay_factor, DECIMAL_PRECISION)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RATES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Redemption rate from the stored (undecayed) base rate
    pub fn redemption_rate(&self, params: &ProtocolParams) -> u128 {
        redemption_rate_for(params, self.base_rate)
    }

    /// Redemption rate after decaying the base rate to `now`
    pub fn redemption_rate_with_decay(&self, params: &ProtocolParams, now: u64) -> Result<u128> {
        Ok(redemption_rate_for(params, self.decayed_base_rate(params, now)?))
    }

    /// Borrowing rate from the stored (undecayed) base rate
    pub fn borrowing_rate(&self, params: &ProtocolParams) -> u128 {
        borrowing_rate_for(params, self.base_rate)
    }

    /// Borrowing rate after decaying the base rate to `now`
    pub fn borrowing_rate_with_decay(&self, params: &ProtocolParams, now: u64) -> Result<u128> {
        Ok(borrowing_rate_for(params, self.decayed_base_rate(params, now)?))
    }

    /// Borrowing fee on `debt` at the stored base rate
    pub fn borrowing_fee(&self, params: &ProtocolParams, debt: u128) -> Result<u128> {
        mul_div(self.borrowing_rate(params), debt, DECIMAL_PRECISION)
    }

    /// Borrowing rate a client should expect at `now`; zero in Recovery Mode
    pub fn projected_borrowing_rate(&self, params: &ProtocolParams, now: u64, recovery_mode: bool) -> Result<u128> {
        if recovery_mode {
            return Ok(0);
        }
        self.borrowing_rate_with_decay(params, now)
    }

    /// Redemption rate a client should expect when redeeming `redeemed_fraction`
    /// of the total supply at `now`
    pub fn projected_redemption_rate(&self, params: &ProtocolParams, redeemed_fraction: u128, now: u64) -> Result<u128> {
        let decayed = self.decayed_base_rate(params, now)?;
        let base = safe_add(decayed, redeemed_fraction / params.beta)?;
        Ok(redemption_rate_for(params, base))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // UPDATES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Raise the base rate after a redemption drawing `coll_drawn` at `price`
    /// out of `total_debt_supply`. Returns the new base rate.
    pub fn update_from_redemption(
        &mut self,
        params: &ProtocolParams,
        coll_drawn: u128,
        price: u128,
        total_debt_supply: u128,
        now: u64,
    ) -> Result<u128> {
        let decayed = self.decayed_base_rate(params, now)?;
        let redeemed_fraction = mul_div(coll_drawn, price, total_debt_supply)?;

        let new_base_rate = safe_add(decayed, redeemed_fraction / params.beta)?.min(DECIMAL_PRECISION);
        if new_base_rate == 0 {
            return Err(Error::InvariantViolation(
                "base rate must be positive after a redemption".into(),
            ));
        }

        self.base_rate = new_base_rate;
        self.update_last_fee_operation_time(now);
        Ok(new_base_rate)
    }

    /// Decay the base rate on a borrowing operation
    pub fn decay_from_borrowing(&mut self, params: &ProtocolParams, now: u64) -> Result<()> {
        let decayed = self.decayed_base_rate(params, now)?;
        if decayed > DECIMAL_PRECISION {
            return Err(Error::InvariantViolation("decayed base rate above 100%".into()));
        }
        self.base_rate = decayed;
        self.update_last_fee_operation_time(now);
        Ok(())
    }

    /// Advance the fee clock only once at least a minute has passed, so
    /// frequent operations cannot stall the decay.
    fn update_last_fee_operation_time(&mut self, now: u64) -> bool {
        if now.saturating_sub(self.last_fee_operation_time) >= SECONDS_IN_ONE_MINUTE {
            self.last_fee_operation_time = now;
            true
        } else {
            false
        }
    }
}

fn redemption_rate_for(params: &ProtocolParams, base_rate: u128) -> u128 {
    params
        .redemption_fee_floor
        .saturating_add(base_rate)
        .min(DECIMAL_PRECISION)
}

fn borrowing_rate_for(params: &ProtocolParams, base_rate: u128) -> u128 {
    params
        .borrowing_fee_floor
        .saturating_add(base_rate)
        .min(params.max_borrowing_fee)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FEE CHECKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Redemption fee on `coll_drawn`; fails if it would take all of it
pub fn redemption_fee(redemption_rate: u128, coll_drawn: u128) -> Result<u128> {
    let fee = mul_div(redemption_rate, coll_drawn, DECIMAL_PRECISION)?;
    if fee >= coll_drawn {
        return Err(Error::FeeConsumesAllValue {
            fee,
            collateral_drawn: coll_drawn,
        });
    }
    Ok(fee)
}

/// Fail if `fee` is a larger share of `amount` than the caller tolerates
pub fn require_user_accepts_fee(fee: u128, amount: u128, max_fee_percentage: u128) -> Result<()> {
    let fee_percentage = mul_div(fee, DECIMAL_PRECISION, amount)?;
    if fee_percentage > max_fee_percentage {
        return Err(Error::FeeExceedsTolerance {
            fee_percentage,
            max_fee_percentage,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::*;
    use crate::utils::math::{abs_diff, units};

    fn params() -> ProtocolParams {
        ProtocolParams::default()
    }

    #[test]
    fn test_rates_at_zero_base() {
        let rate = BaseRate::new(0);
        assert_eq!(rate.borrowing_rate(&params()), BORROWING_FEE_FLOOR);
        assert_eq!(rate.redemption_rate(&params()), REDEMPTION_FEE_FLOOR);
        assert_eq!(rate.borrowing_fee(&params(), units(1_000)).unwrap(), units(5));
    }

    #[test]
    fn test_borrowing_rate_capped() {
        let rate = BaseRate::with_state(DECIMAL_PRECISION / 2, 0);
        assert_eq!(rate.borrowing_rate(&params()), MAX_BORROWING_FEE);
        assert_eq!(rate.redemption_rate(&params()), DECIMAL_PRECISION / 2 + REDEMPTION_FEE_FLOOR);
    }

    #[test]
    fn test_base_rate_decay() {
        let rate = BaseRate::with_state(DECIMAL_PRECISION, 0);

        // Less than a minute: no decay
        assert_eq!(rate.decayed_base_rate(&params(), 59).unwrap(), DECIMAL_PRECISION);

        // Twelve hours: roughly halved
        let decayed = rate.decayed_base_rate(&params(), 720 * 60).unwrap();
        assert!(abs_diff(decayed, DECIMAL_PRECISION / 2) < DECIMAL_PRECISION / 1000);
    }

    #[test]
    fn test_update_from_redemption() {
        let mut rate = BaseRate::new(0);

        // Draw 10 collateral at price 100 out of 10_000 supply: fraction 10%, base += 5%
        let new_rate = rate
            .update_from_redemption(&params(), units(10), units(100), units(10_000), 120)
            .unwrap();
        assert_eq!(new_rate, DECIMAL_PRECISION / 20);
        assert_eq!(rate.last_fee_operation_time(), 120);
    }

    #[test]
    fn test_update_from_redemption_caps_at_one() {
        let mut rate = BaseRate::with_state(DECIMAL_PRECISION, 0);
        let new_rate = rate
            .update_from_redemption(&params(), units(100), units(100), units(100), 0)
            .unwrap();
        assert_eq!(new_rate, DECIMAL_PRECISION);
    }

    #[test]
    fn test_fee_clock_needs_a_minute() {
        let mut rate = BaseRate::with_state(DECIMAL_PRECISION / 10, 1_000);
        rate.decay_from_borrowing(&params(), 1_030).unwrap();
        assert_eq!(rate.last_fee_operation_time(), 1_000);
        rate.decay_from_borrowing(&params(), 1_060).unwrap();
        assert_eq!(rate.last_fee_operation_time(), 1_060);
    }

    #[test]
    fn test_projected_rates() {
        let rate = BaseRate::new(0);
        assert_eq!(rate.projected_borrowing_rate(&params(), 0, true).unwrap(), 0);
        assert_eq!(
            rate.projected_borrowing_rate(&params(), 0, false).unwrap(),
            BORROWING_FEE_FLOOR
        );
        assert_eq!(
            rate.projected_redemption_rate(&params(), DECIMAL_PRECISION / 10, 0).unwrap(),
            REDEMPTION_FEE_FLOOR + DECIMAL_PRECISION / 20
        );
    }

    #[test]
    fn test_redemption_fee_checks() {
        assert_eq!(redemption_fee(DECIMAL_PRECISION / 100, units(10)).unwrap(), units(10) / 100);
        assert!(matches!(
            redemption_fee(DECIMAL_PRECISION, units(10)),
            Err(Error::FeeConsumesAllValue { .. })
        ));

        assert!(require_user_accepts_fee(units(1), units(100), DECIMAL_PRECISION / 100).is_ok());
        assert!(matches!(
            require_user_accepts_fee(units(2), units(100), DECIMAL_PRECISION / 100),
            Err(Error::FeeExceedsTolerance { .. })
        ));
    }
}
