//! Redemption Engine.
//!
//! Debt tokens are redeemed at par for collateral at the oracle price,
//! walking up the sorted index from the lowest ICR:
//! - Troves below MCR are skipped, they are left for liquidation
//! - Fully redeemed troves close; leftover collateral goes to the surplus pool
//! - Only the last trove reached may be partially redeemed, and only when the
//!   caller's NICR hint still matches and its net debt stays above the floor
//! - Each redemption raises the base rate and pays a fee in collateral

use serde::{Deserialize, Serialize};

use crate::core::fees::{redemption_fee, require_user_accepts_fee};
use crate::core::ledger::{ExecutionContext, LedgerState};
use crate::core::sorted_troves::InsertHint;
use crate::core::token::DebtToken;
use crate::core::trove::TroveStatus;
use crate::error::{Error, Result};
use crate::protocol::events::{BaseRateUpdatedEvent, ProtocolEvent, RedemptionEvent, TroveOperation};
use crate::utils::constants::DECIMAL_PRECISION;
use crate::utils::crypto::Address;
use crate::utils::math::*;
use crate::utils::validation::*;

// ═══════════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Parameters of one redemption call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRequest {
    /// Debt tokens to redeem
    pub amount: u128,
    /// Expected first trove with ICR ≥ MCR
    pub first_hint: Option<Address>,
    /// Reinsert hint for the partially redeemed trove
    pub partial_hint: InsertHint,
    /// Expected NICR of the partially redeemed trove
    pub partial_nicr: u128,
    /// Maximum troves to visit, 0 for no limit
    pub max_iterations: usize,
    /// Highest redemption rate accepted
    pub max_fee_percentage: u128,
}

impl RedemptionRequest {
    /// Request without hints
    pub fn new(amount: u128, max_fee_percentage: u128) -> Self {
        Self {
            amount,
            first_hint: None,
            partial_hint: InsertHint::default(),
            partial_nicr: 0,
            max_iterations: 0,
            max_fee_percentage,
        }
    }
}

/// Effect of a redemption on one trove
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleRedemption {
    /// Trove owner
    pub borrower: Address,
    /// Debt redeemed
    pub debt_lot: u128,
    /// Collateral drawn
    pub coll_lot: u128,
    /// Whether the trove was closed
    pub closed: bool,
}

/// Result of a redemption call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionOutcome {
    /// Amount requested
    pub attempted_amount: u128,
    /// Debt actually redeemed
    pub actual_amount: u128,
    /// Collateral drawn from troves
    pub coll_drawn: u128,
    /// Collateral kept as fee
    pub coll_fee: u128,
    /// Collateral sent to the redeemer
    pub coll_sent: u128,
    /// Base rate after the redemption
    pub base_rate: u128,
    /// Troves touched, lowest ICR first
    pub troves: Vec<SingleRedemption>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// REDEMPTION ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine for redeeming debt tokens against troves
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedemptionEngine {
    /// Successful redemption calls
    total_redemptions: u64,
    /// Debt redeemed
    total_redeemed: u128,
    /// Collateral paid in fees
    total_fees: u128,
    /// Troves closed by redemption
    troves_closed: u64,
}

impl RedemptionEngine {
    /// Create a new redemption engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Redeem `request.amount` of `redeemer`'s debt tokens for collateral
    pub fn redeem_collateral(
        &mut self,
        state: &mut LedgerState,
        ctx: &ExecutionContext<'_>,
        redeemer: Address,
        request: RedemptionRequest,
    ) -> Result<RedemptionOutcome> {
        let params = ctx.params;
        validate_max_fee_percentage(request.max_fee_percentage, params.redemption_fee_floor, true)?;

        let tcr = state.tcr(ctx.price)?;
        if tcr < params.mcr {
            return Err(Error::SystemBelowMinimumRatio { tcr, mcr: params.mcr });
        }
        validate_non_zero(request.amount)?;
        validate_sufficient_balance(request.amount, state.token.balance_of(&redeemer))?;

        let total_debt_at_start = state.entire_system_debt()?;
        let mut remaining = request.amount;
        let mut outcome = RedemptionOutcome {
            attempted_amount: request.amount,
            ..RedemptionOutcome::default()
        };

        let mut current = if is_valid_first_redemption_hint(state, request.first_hint, ctx.price, params.mcr)? {
            request.first_hint
        } else {
            first_redeemable(state, ctx.price, params.mcr)?
        };

        let mut iterations_left = if request.max_iterations == 0 {
            usize::MAX
        } else {
            request.max_iterations
        };

        while let Some(borrower) = current {
            if remaining == 0 || iterations_left == 0 {
                break;
            }
            iterations_left -= 1;
            let next = state.sorted.prev(&borrower);

            state.apply_pending_rewards(ctx, &borrower)?;
            let Some(single) = redeem_from_trove(state, ctx, borrower, remaining, &request)? else {
                tracing::debug!(borrower = %borrower, "partial redemption cancelled");
                break;
            };

            outcome.actual_amount = safe_add(outcome.actual_amount, single.debt_lot)?;
            outcome.coll_drawn = safe_add(outcome.coll_drawn, single.coll_lot)?;
            remaining -= single.debt_lot;
            outcome.troves.push(single);
            current = next;
        }

        if outcome.coll_drawn == 0 {
            return Err(Error::NothingRedeemed);
        }

        outcome.base_rate =
            state
                .base_rate
                .update_from_redemption(params, outcome.coll_drawn, ctx.price, total_debt_at_start, ctx.timestamp)?;
        state.emit(ProtocolEvent::BaseRateUpdated(BaseRateUpdatedEvent {
            base_rate: outcome.base_rate,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));

        let rate = state.base_rate.redemption_rate(params);
        outcome.coll_fee = redemption_fee(rate, outcome.coll_drawn)?;
        require_user_accepts_fee(outcome.coll_fee, outcome.coll_drawn, request.max_fee_percentage)?;
        outcome.coll_sent = outcome.coll_drawn - outcome.coll_fee;

        state.emit(ProtocolEvent::Redemption(RedemptionEvent {
            redeemer,
            attempted_amount: outcome.attempted_amount,
            actual_amount: outcome.actual_amount,
            coll_sent: outcome.coll_sent,
            coll_fee: outcome.coll_fee,
            troves_redeemed: outcome.troves.len() as u32,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));

        state.token.burn(redeemer, outcome.actual_amount)?;
        state.active_pool.decrease_debt(outcome.actual_amount)?;
        state.active_pool.send_coll(outcome.coll_fee)?;
        state.queue_payout(ctx.fee_recipient, outcome.coll_fee);
        state.active_pool.send_coll(outcome.coll_sent)?;
        state.queue_payout(redeemer, outcome.coll_sent);

        self.record(&outcome)?;
        tracing::info!(
            redeemer = %redeemer,
            attempted = outcome.attempted_amount,
            redeemed = outcome.actual_amount,
            fee = outcome.coll_fee,
            troves = outcome.troves.len(),
            "redemption completed"
        );
        Ok(outcome)
    }

    fn record(&mut self, outcome: &RedemptionOutcome) -> Result<()> {
        self.total_redemptions += 1;
        self.total_redeemed = safe_add(self.total_redeemed, outcome.actual_amount)?;
        self.total_fees = safe_add(self.total_fees, outcome.coll_fee)?;
        self.troves_closed += outcome.troves.iter().filter(|t| t.closed).count() as u64;
        Ok(())
    }

    /// Get statistics
    pub fn statistics(&self) -> RedemptionStats {
        RedemptionStats {
            total_redemptions: self.total_redemptions,
            total_redeemed: self.total_redeemed,
            total_fees: self.total_fees,
            troves_closed: self.troves_closed,
        }
    }
}

/// Redemption statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionStats {
    /// Successful redemption calls
    pub total_redemptions: u64,
    /// Debt redeemed
    pub total_redeemed: u128,
    /// Collateral paid in fees
    pub total_fees: u128,
    /// Troves closed by redemption
    pub troves_closed: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERNAL
// ═══════════════════════════════════════════════════════════════════════════════

/// The hint must be listed, at or above MCR, and the next lower trove below MCR
fn is_valid_first_redemption_hint(
    state: &LedgerState,
    hint: Option<Address>,
    price: u128,
    mcr: u128,
) -> Result<bool> {
    let Some(hint) = hint else {
        return Ok(false);
    };
    if !state.sorted.contains(&hint) || state.troves.current_icr(&hint, price)? < mcr {
        return Ok(false);
    }
    match state.sorted.next(&hint) {
        None => Ok(true),
        Some(lower) => Ok(state.troves.current_icr(&lower, price)? < mcr),
    }
}

/// Lowest trove with ICR ≥ MCR
pub(crate) fn first_redeemable(state: &LedgerState, price: u128, mcr: u128) -> Result<Option<Address>> {
    let mut cursor = state.sorted.last();
    while let Some(owner) = cursor {
        if state.troves.current_icr(&owner, price)? >= mcr {
            break;
        }
        cursor = state.sorted.prev(&owner);
    }
    Ok(cursor)
}

/// Redeem up to `max_amount` from one trove. Returns `None` when a partial
/// redemption is cancelled.
fn redeem_from_trove(
    state: &mut LedgerState,
    ctx: &ExecutionContext<'_>,
    borrower: Address,
    max_amount: u128,
    request: &RedemptionRequest,
) -> Result<Option<SingleRedemption>> {
    let params = ctx.params;
    let trove = *state.troves.require_active(&borrower)?;

    let debt_lot = max_amount.min(safe_sub(trove.debt, params.gas_compensation)?);
    let coll_lot = mul_div(debt_lot, DECIMAL_PRECISION, ctx.price)?;
    let new_debt = trove.debt - debt_lot;
    let new_coll = safe_sub(trove.coll, coll_lot)?;

    if new_debt == params.gas_compensation {
        state.troves.remove_stake(&borrower)?;
        state
            .troves
            .close_trove(&borrower, TroveStatus::ClosedByRedemption, &mut state.sorted)?;
        state.emit_trove_updated(ctx, &borrower, TroveOperation::RedeemCollateral);

        // Reserve is burnt, leftover collateral becomes claimable
        state.token.burn(Address::GAS_POOL, params.gas_compensation)?;
        state.active_pool.decrease_debt(params.gas_compensation)?;
        state.surplus_pool.account_surplus(borrower, new_coll)?;
        state.active_pool.send_coll(new_coll)?;
        state.surplus_pool.receive_coll(new_coll)?;

        return Ok(Some(SingleRedemption {
            borrower,
            debt_lot,
            coll_lot,
            closed: true,
        }));
    }

    let new_nicr = compute_nominal_cr(new_coll, new_debt);
    let net_debt = new_debt - params.gas_compensation;
    if new_nicr != request.partial_nicr || net_debt < params.min_net_debt {
        return Ok(None);
    }

    state.troves.set_coll_and_debt(&borrower, new_coll, new_debt)?;
    state.sorted.re_insert(
        &state.troves,
        borrower,
        new_nicr,
        request.partial_hint.prev,
        request.partial_hint.next,
    )?;
    state.troves.update_stake_and_total_stakes(&borrower)?;
    state.emit_trove_updated(ctx, &borrower, TroveOperation::RedeemCollateral);

    Ok(Some(SingleRedemption {
        borrower,
        debt_lot,
        coll_lot,
        closed: false,
    }))
}
