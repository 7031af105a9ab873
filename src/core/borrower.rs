//! Borrower operations.
//!
//! Opening, adjusting and closing troves, and claiming surplus collateral.
//! Each operation runs its checks against the mode in force at the oracle
//! price of the operation:
//!
//! - Normal Mode: resulting ICR ≥ MCR and resulting TCR ≥ CCR
//! - Recovery Mode: new troves need ICR ≥ CCR, no collateral withdrawals, debt
//!   increases must not lower the ICR, no borrowing fee, no closing
//!
//! Every trove carries a flat gas compensation reserve inside its debt. The
//! reserve is minted to the gas pool on open and burnt from it on close.

use serde::{Deserialize, Serialize};

use crate::core::fees::require_user_accepts_fee;
use crate::core::ledger::{ExecutionContext, LedgerState};
use crate::core::sorted_troves::InsertHint;
use crate::core::token::DebtToken;
use crate::core::trove::TroveStatus;
use crate::error::{Error, Result};
use crate::protocol::events::{BorrowingFeePaidEvent, ProtocolEvent, SurplusClaimedEvent, TroveOperation};
use crate::utils::crypto::Address;
use crate::utils::math::{compute_cr, compute_nominal_cr, safe_add, safe_sub};
use crate::utils::validation::*;

// ═══════════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Requested change to an existing trove
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroveAdjustment {
    /// Collateral to add
    pub coll_deposit: u128,
    /// Collateral to remove
    pub coll_withdrawal: u128,
    /// Debt to draw or repay
    pub debt_change: u128,
    /// Whether `debt_change` is drawn (true) or repaid (false)
    pub is_debt_increase: bool,
    /// Highest borrowing rate accepted when drawing debt
    pub max_fee_percentage: u128,
}

/// Resulting trove values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroveChange {
    /// Collateral after the operation
    pub coll: u128,
    /// Debt after the operation
    pub debt: u128,
    /// Stake after the operation
    pub stake: u128,
    /// Borrowing fee charged
    pub borrowing_fee: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPEN
// ═══════════════════════════════════════════════════════════════════════════════

/// Open a trove for `owner` with `coll` collateral, drawing `amount` debt tokens
pub fn open_trove(
    state: &mut LedgerState,
    ctx: &ExecutionContext<'_>,
    owner: Address,
    coll: u128,
    amount: u128,
    max_fee_percentage: u128,
    hint: InsertHint,
) -> Result<TroveChange> {
    let params = ctx.params;
    if owner.is_reserved() {
        return Err(Error::InvalidParameter {
            name: "owner".into(),
            reason: "reserved address cannot own a trove".into(),
        });
    }

    let recovery = state.is_recovery_mode(ctx.price, params)?;
    validate_max_fee_percentage(max_fee_percentage, params.borrowing_fee_floor, !recovery)?;
    if state.troves.is_active(&owner) {
        return Err(Error::TroveAlreadyActive(owner.to_hex()));
    }

    let mut net_debt = amount;
    let mut borrowing_fee = 0;
    if !recovery {
        borrowing_fee = trigger_borrowing_fee(state, ctx, owner, amount, max_fee_percentage)?;
        net_debt = safe_add(net_debt, borrowing_fee)?;
    }
    validate_min_net_debt(net_debt, params.min_net_debt)?;

    let composite_debt = safe_add(net_debt, params.gas_compensation)?;
    let icr = compute_cr(coll, composite_debt, ctx.price);
    let nicr = compute_nominal_cr(coll, composite_debt);

    if recovery {
        validate_ratio_at_least(icr, params.ccr)?;
    } else {
        validate_ratio_at_least(icr, params.mcr)?;
        let new_tcr = state.new_tcr_from_trove_change(coll, true, composite_debt, true, ctx.price)?;
        validate_tcr_at_least(new_tcr, params.ccr)?;
    }

    let (stake, _) = state.troves.activate_trove(owner, coll, composite_debt)?;
    state.sorted.insert(&state.troves, owner, nicr, hint.prev, hint.next)?;
    state.emit_trove_updated(ctx, &owner, TroveOperation::Open);

    state.active_pool.receive_coll(coll)?;
    state.active_pool.increase_debt(composite_debt)?;
    state.token.mint(owner, amount)?;
    state.token.mint(Address::GAS_POOL, params.gas_compensation)?;

    tracing::info!(owner = %owner, coll, debt = composite_debt, fee = borrowing_fee, "trove opened");

    Ok(TroveChange {
        coll,
        debt: composite_debt,
        stake,
        borrowing_fee,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// ADJUST
// ═══════════════════════════════════════════════════════════════════════════════

/// Change collateral and/or debt of `owner`'s active trove
pub fn adjust_trove(
    state: &mut LedgerState,
    ctx: &ExecutionContext<'_>,
    owner: Address,
    adjustment: TroveAdjustment,
    hint: InsertHint,
) -> Result<TroveChange> {
    let params = ctx.params;
    let recovery = state.is_recovery_mode(ctx.price, params)?;

    if adjustment.is_debt_increase {
        validate_max_fee_percentage(adjustment.max_fee_percentage, params.borrowing_fee_floor, !recovery)?;
        validate_non_zero(adjustment.debt_change)?;
    }
    validate_single_collateral_change(adjustment.coll_deposit, adjustment.coll_withdrawal)?;
    validate_non_zero_adjustment(adjustment.coll_deposit, adjustment.coll_withdrawal, adjustment.debt_change)?;
    state.troves.require_active(&owner)?;

    state.apply_pending_rewards(ctx, &owner)?;

    let (coll_change, is_coll_increase) = if adjustment.coll_deposit != 0 {
        (adjustment.coll_deposit, true)
    } else {
        (adjustment.coll_withdrawal, false)
    };

    let mut net_debt_change = adjustment.debt_change;
    let mut borrowing_fee = 0;
    if adjustment.is_debt_increase && !recovery {
        borrowing_fee = trigger_borrowing_fee(
            state,
            ctx,
            owner,
            adjustment.debt_change,
            adjustment.max_fee_percentage,
        )?;
        net_debt_change = safe_add(net_debt_change, borrowing_fee)?;
    }

    let trove = *state.troves.require_active(&owner)?;
    if adjustment.coll_withdrawal > trove.coll {
        return Err(Error::InsufficientCollateral {
            requested: adjustment.coll_withdrawal,
            available: trove.coll,
        });
    }
    if !adjustment.is_debt_increase && adjustment.debt_change > 0 {
        // The gas reserve can only be repaid by closing
        let max_repayment = safe_sub(trove.debt, params.gas_compensation)?;
        if net_debt_change > max_repayment {
            return Err(Error::RepaymentExceedsDebt {
                repayment: net_debt_change,
                max: max_repayment,
            });
        }
        validate_min_net_debt(max_repayment - net_debt_change, params.min_net_debt)?;
        validate_sufficient_balance(net_debt_change, state.token.balance_of(&owner))?;
    }

    let new_coll = if is_coll_increase {
        safe_add(trove.coll, coll_change)?
    } else {
        trove.coll - coll_change
    };
    let new_debt = if adjustment.is_debt_increase {
        safe_add(trove.debt, net_debt_change)?
    } else {
        safe_sub(trove.debt, net_debt_change)?
    };

    let old_icr = compute_cr(trove.coll, trove.debt, ctx.price);
    let new_icr = compute_cr(new_coll, new_debt, ctx.price);
    if recovery {
        if adjustment.coll_withdrawal != 0 {
            return Err(Error::RecoveryModeRestriction(
                "collateral withdrawal not permitted".into(),
            ));
        }
        if adjustment.is_debt_increase {
            validate_ratio_at_least(new_icr, params.ccr)?;
            if new_icr < old_icr {
                return Err(Error::RecoveryModeRestriction(
                    "debt increase must not lower the trove's ICR".into(),
                ));
            }
        }
    } else {
        validate_ratio_at_least(new_icr, params.mcr)?;
        let new_tcr = state.new_tcr_from_trove_change(
            coll_change,
            is_coll_increase,
            net_debt_change,
            adjustment.is_debt_increase,
            ctx.price,
        )?;
        validate_tcr_at_least(new_tcr, params.ccr)?;
    }

    state.troves.set_coll_and_debt(&owner, new_coll, new_debt)?;
    let stake = state.troves.update_stake_and_total_stakes(&owner)?;
    let new_nicr = compute_nominal_cr(new_coll, new_debt);
    state.sorted.re_insert(&state.troves, owner, new_nicr, hint.prev, hint.next)?;
    state.emit_trove_updated(ctx, &owner, TroveOperation::Adjust);

    if adjustment.is_debt_increase {
        state.active_pool.increase_debt(net_debt_change)?;
        state.token.mint(owner, adjustment.debt_change)?;
    } else if net_debt_change > 0 {
        state.active_pool.decrease_debt(net_debt_change)?;
        state.token.burn(owner, net_debt_change)?;
    }
    if is_coll_increase {
        state.active_pool.receive_coll(coll_change)?;
    } else if coll_change > 0 {
        state.active_pool.send_coll(coll_change)?;
        state.queue_payout(owner, coll_change);
    }

    tracing::debug!(owner = %owner, coll = new_coll, debt = new_debt, "trove adjusted");

    Ok(TroveChange {
        coll: new_coll,
        debt: new_debt,
        stake,
        borrowing_fee,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLOSE AND CLAIM
// ═══════════════════════════════════════════════════════════════════════════════

/// Repay all debt of `owner`'s trove and return its collateral.
/// Returns the collateral released.
pub fn close_trove(state: &mut LedgerState, ctx: &ExecutionContext<'_>, owner: Address) -> Result<u128> {
    let params = ctx.params;
    state.troves.require_active(&owner)?;
    if state.is_recovery_mode(ctx.price, params)? {
        return Err(Error::RecoveryModeRestriction("closing troves not permitted".into()));
    }

    state.apply_pending_rewards(ctx, &owner)?;
    let trove = *state.troves.require_active(&owner)?;

    let repayment = safe_sub(trove.debt, params.gas_compensation)?;
    validate_sufficient_balance(repayment, state.token.balance_of(&owner))?;

    let new_tcr = state.new_tcr_from_trove_change(trove.coll, false, trove.debt, false, ctx.price)?;
    validate_tcr_at_least(new_tcr, params.ccr)?;

    state.troves.remove_stake(&owner)?;
    state.troves.close_trove(&owner, TroveStatus::ClosedByOwner, &mut state.sorted)?;
    state.emit_trove_updated(ctx, &owner, TroveOperation::Close);

    state.active_pool.decrease_debt(repayment)?;
    state.token.burn(owner, repayment)?;
    state.active_pool.decrease_debt(params.gas_compensation)?;
    state.token.burn(Address::GAS_POOL, params.gas_compensation)?;

    state.active_pool.send_coll(trove.coll)?;
    state.queue_payout(owner, trove.coll);

    tracing::info!(owner = %owner, coll = trove.coll, "trove closed");
    Ok(trove.coll)
}

/// Pay out the surplus collateral owed to `owner`
pub fn claim_collateral(state: &mut LedgerState, ctx: &ExecutionContext<'_>, owner: Address) -> Result<u128> {
    let amount = state.surplus_pool.claim_coll(&owner)?;
    state.emit(ProtocolEvent::SurplusClaimed(SurplusClaimedEvent {
        owner,
        amount,
        block_height: ctx.block_height,
        timestamp: ctx.timestamp,
    }));
    state.queue_payout(owner, amount);
    Ok(amount)
}

/// Decay the base rate, charge the borrowing fee on `amount` and mint it to
/// the fee recipient. Returns the fee.
fn trigger_borrowing_fee(
    state: &mut LedgerState,
    ctx: &ExecutionContext<'_>,
    borrower: Address,
    amount: u128,
    max_fee_percentage: u128,
) -> Result<u128> {
    state.base_rate.decay_from_borrowing(ctx.params, ctx.timestamp)?;
    let fee = state.base_rate.borrowing_fee(ctx.params, amount)?;
    require_user_accepts_fee(fee, amount, max_fee_percentage)?;

    state.token.mint(ctx.fee_recipient, fee)?;
    if fee > 0 {
        state.emit(ProtocolEvent::BorrowingFeePaid(BorrowingFeePaidEvent {
            borrower,
            fee,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));
    }
    Ok(fee)
}
