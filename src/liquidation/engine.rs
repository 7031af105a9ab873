//! Liquidation Engine.
//!
//! This module handles the liquidation of undercollateralized troves:
//! - Single trove, sequence from the bottom of the sorted index, or batch
//! - Normal and Recovery Mode paths (see `recovery`)
//! - Offset against the Stability Pool, redistribution as fallback
//!
//! Liquidation runs in two phases. Each trove is first evaluated and closed,
//! its values added to `LiquidationTotals`. The pool offset, redistribution,
//! surplus transfer, system snapshots and liquidator compensation then run
//! once over the totals, in that order.

use serde::{Deserialize, Serialize};

use crate::core::config::ProtocolParams;
use crate::core::ledger::{ExecutionContext, LedgerState};
use crate::core::token::DebtToken;
use crate::core::trove::{EntireDebtAndColl, TroveStatus};
use crate::error::{Error, Result};
use crate::liquidation::recovery::{select_liquidation_path, LiquidationPath, PathInputs, SystemMode};
use crate::protocol::events::{
    LTermsUpdatedEvent, LiquidationEvent, ProductUpdatedEvent, ProtocolEvent, TroveLiquidatedEvent, TroveOperation,
};
use crate::utils::crypto::Address;
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION VALUES
// ═══════════════════════════════════════════════════════════════════════════════

/// How one trove's debt and collateral were split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationValues {
    /// Former owner
    pub borrower: Address,
    /// Path taken
    pub path: LiquidationPath,
    /// Debt including pending rewards
    pub entire_debt: u128,
    /// Collateral including pending rewards
    pub entire_coll: u128,
    /// Collateral paid to the liquidator
    pub coll_gas_compensation: u128,
    /// Debt tokens paid to the liquidator from the gas pool
    pub debt_gas_compensation: u128,
    /// Debt cancelled against the Stability Pool
    pub debt_to_offset: u128,
    /// Collateral sent to the Stability Pool
    pub coll_to_send_to_sp: u128,
    /// Debt spread over remaining troves
    pub debt_to_redistribute: u128,
    /// Collateral spread over remaining troves
    pub coll_to_redistribute: u128,
    /// Collateral left claimable by the former owner
    pub coll_surplus: u128,
}

impl LiquidationValues {
    fn new(borrower: Address, path: LiquidationPath, entire: &EntireDebtAndColl) -> Self {
        Self {
            borrower,
            path,
            entire_debt: entire.debt,
            entire_coll: entire.coll,
            coll_gas_compensation: 0,
            debt_gas_compensation: 0,
            debt_to_offset: 0,
            coll_to_send_to_sp: 0,
            debt_to_redistribute: 0,
            coll_to_redistribute: 0,
            coll_surplus: 0,
        }
    }

    /// Collateral accounted for by every destination
    pub fn coll_accounted(&self) -> u128 {
        self.coll_to_send_to_sp
            .saturating_add(self.coll_to_redistribute)
            .saturating_add(self.coll_gas_compensation)
            .saturating_add(self.coll_surplus)
    }

    /// Debt accounted for by offset and redistribution
    pub fn debt_accounted(&self) -> u128 {
        self.debt_to_offset.saturating_add(self.debt_to_redistribute)
    }
}

/// Aggregate of one liquidation call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationTotals {
    /// Mode at the start of the call
    pub mode: SystemMode,
    /// Collateral of all liquidated troves
    pub total_coll_in_sequence: u128,
    /// Debt of all liquidated troves
    pub total_debt_in_sequence: u128,
    /// Collateral paid to the liquidator
    pub total_coll_gas_compensation: u128,
    /// Debt tokens paid to the liquidator
    pub total_debt_gas_compensation: u128,
    /// Debt offset against the pool
    pub total_debt_to_offset: u128,
    /// Collateral sent to the pool
    pub total_coll_to_send_to_sp: u128,
    /// Debt redistributed
    pub total_debt_to_redistribute: u128,
    /// Collateral redistributed
    pub total_coll_to_redistribute: u128,
    /// Collateral moved to the surplus pool
    pub total_coll_surplus: u128,
    /// Per-trove values in liquidation order
    pub troves: Vec<LiquidationValues>,
}

impl LiquidationTotals {
    fn new(mode: SystemMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    fn add(&mut self, values: LiquidationValues) -> Result<()> {
        self.total_coll_in_sequence = safe_add(self.total_coll_in_sequence, values.entire_coll)?;
        self.total_debt_in_sequence = safe_add(self.total_debt_in_sequence, values.entire_debt)?;
        self.total_coll_gas_compensation = safe_add(self.total_coll_gas_compensation, values.coll_gas_compensation)?;
        self.total_debt_gas_compensation = safe_add(self.total_debt_gas_compensation, values.debt_gas_compensation)?;
        self.total_debt_to_offset = safe_add(self.total_debt_to_offset, values.debt_to_offset)?;
        self.total_coll_to_send_to_sp = safe_add(self.total_coll_to_send_to_sp, values.coll_to_send_to_sp)?;
        self.total_debt_to_redistribute = safe_add(self.total_debt_to_redistribute, values.debt_to_redistribute)?;
        self.total_coll_to_redistribute = safe_add(self.total_coll_to_redistribute, values.coll_to_redistribute)?;
        self.total_coll_surplus = safe_add(self.total_coll_surplus, values.coll_surplus)?;
        self.troves.push(values);
        Ok(())
    }

    /// Owners of the liquidated troves
    pub fn liquidated(&self) -> Vec<Address> {
        self.troves.iter().map(|v| v.borrower).collect()
    }

    /// Number of troves liquidated
    pub fn len(&self) -> usize {
        self.troves.len()
    }

    /// Whether no trove was liquidated
    pub fn is_empty(&self) -> bool {
        self.troves.is_empty()
    }

    /// Collateral moved to the pool or redistributed
    pub fn liquidated_coll(&self) -> u128 {
        self.total_coll_in_sequence
            .saturating_sub(self.total_coll_gas_compensation)
            .saturating_sub(self.total_coll_surplus)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine for liquidating undercollateralized troves
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiquidationEngine {
    /// Troves liquidated
    total_liquidations: u64,
    /// Successful liquidation calls
    total_calls: u64,
    /// Debt removed from troves
    total_debt_liquidated: u128,
    /// Collateral removed from troves
    total_coll_liquidated: u128,
    /// Troves with any pool offset
    offset_count: u64,
    /// Troves with any redistribution
    redistribution_count: u64,
    /// Troves liquidated with capped collateral
    capped_count: u64,
}

impl LiquidationEngine {
    /// Create a new liquidation engine
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION DETECTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Troves below MCR, worst first
    pub fn find_liquidatable(state: &LedgerState, price: u128, params: &ProtocolParams) -> Result<Vec<Address>> {
        let mut found = Vec::new();
        let mut cursor = state.sorted.last();
        while let Some(owner) = cursor {
            if state.troves.current_icr(&owner, price)? >= params.mcr {
                break;
            }
            found.push(owner);
            cursor = state.sorted.prev(&owner);
        }
        Ok(found)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION EXECUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Liquidate one active trove
    pub fn liquidate(
        &mut self,
        state: &mut LedgerState,
        ctx: &ExecutionContext<'_>,
        liquidator: Address,
        borrower: Address,
    ) -> Result<LiquidationTotals> {
        state.troves.require_active(&borrower)?;
        self.batch_liquidate_troves(state, ctx, liquidator, &[borrower])
    }

    /// Liquidate up to `n` troves starting from the lowest ICR
    pub fn liquidate_troves(
        &mut self,
        state: &mut LedgerState,
        ctx: &ExecutionContext<'_>,
        liquidator: Address,
        n: usize,
    ) -> Result<LiquidationTotals> {
        let health = state.system_health(ctx.price, ctx.params)?;
        let totals = if health.is_recovery_mode() {
            sequence_recovery_mode(state, ctx, n)?
        } else {
            sequence_normal_mode(state, ctx, n)?
        };
        self.finalize(state, ctx, liquidator, totals)
    }

    /// Liquidate the listed troves that qualify, in list order
    pub fn batch_liquidate_troves(
        &mut self,
        state: &mut LedgerState,
        ctx: &ExecutionContext<'_>,
        liquidator: Address,
        borrowers: &[Address],
    ) -> Result<LiquidationTotals> {
        if borrowers.is_empty() {
            return Err(Error::EmptyTroveArray);
        }

        let health = state.system_health(ctx.price, ctx.params)?;
        let totals = if health.is_recovery_mode() {
            batch_recovery_mode(state, ctx, borrowers)?
        } else {
            batch_normal_mode(state, ctx, borrowers)?
        };
        self.finalize(state, ctx, liquidator, totals)
    }

    /// Move the aggregated balances and pay the liquidator
    fn finalize(
        &mut self,
        state: &mut LedgerState,
        ctx: &ExecutionContext<'_>,
        liquidator: Address,
        totals: LiquidationTotals,
    ) -> Result<LiquidationTotals> {
        if totals.total_debt_in_sequence == 0 {
            return Err(Error::NothingToLiquidate);
        }

        // Offset against the pool
        if totals.total_debt_to_offset > 0 {
            state
                .stability_pool
                .offset(totals.total_debt_to_offset, totals.total_coll_to_send_to_sp)?;
            state.active_pool.decrease_debt(totals.total_debt_to_offset)?;
            state.token.burn(Address::STABILITY_POOL, totals.total_debt_to_offset)?;
            state.active_pool.send_coll(totals.total_coll_to_send_to_sp)?;

            let pool = &state.stability_pool;
            let event = ProtocolEvent::ProductUpdated(ProductUpdatedEvent {
                p: pool.p(),
                scale: pool.current_scale(),
                epoch: pool.current_epoch(),
                block_height: ctx.block_height,
                timestamp: ctx.timestamp,
            });
            state.emit(event);
        }

        // Redistribute the rest
        if totals.total_debt_to_redistribute > 0 {
            state.troves.redistribute_debt_and_coll(
                &mut state.active_pool,
                &mut state.default_pool,
                totals.total_debt_to_redistribute,
                totals.total_coll_to_redistribute,
            )?;
            let event = ProtocolEvent::LTermsUpdated(LTermsUpdatedEvent {
                l_coll: state.troves.l_coll(),
                l_debt: state.troves.l_debt(),
                block_height: ctx.block_height,
                timestamp: ctx.timestamp,
            });
            state.emit(event);
        }

        if totals.total_coll_surplus > 0 {
            state.active_pool.send_coll(totals.total_coll_surplus)?;
            state.surplus_pool.receive_coll(totals.total_coll_surplus)?;
        }

        state.troves.update_system_snapshots_exclude_coll_remainder(
            &state.active_pool,
            &state.default_pool,
            totals.total_coll_gas_compensation,
        )?;

        state.emit(ProtocolEvent::Liquidation(LiquidationEvent {
            liquidator,
            liquidated_debt: totals.total_debt_in_sequence,
            liquidated_coll: totals.liquidated_coll(),
            coll_gas_compensation: totals.total_coll_gas_compensation,
            debt_gas_compensation: totals.total_debt_gas_compensation,
            troves_liquidated: totals.len() as u32,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));

        // Compensation last
        state
            .token
            .transfer(Address::GAS_POOL, liquidator, totals.total_debt_gas_compensation)?;
        state.active_pool.send_coll(totals.total_coll_gas_compensation)?;
        state.queue_payout(liquidator, totals.total_coll_gas_compensation);

        self.record(&totals)?;
        tracing::info!(
            mode = totals.mode.name(),
            troves = totals.len(),
            debt = totals.total_debt_in_sequence,
            offset = totals.total_debt_to_offset,
            redistributed = totals.total_debt_to_redistribute,
            "liquidation finalized"
        );
        Ok(totals)
    }

    fn record(&mut self, totals: &LiquidationTotals) -> Result<()> {
        self.total_calls += 1;
        self.total_liquidations += totals.len() as u64;
        self.total_debt_liquidated = safe_add(self.total_debt_liquidated, totals.total_debt_in_sequence)?;
        self.total_coll_liquidated = safe_add(self.total_coll_liquidated, totals.total_coll_in_sequence)?;
        for values in &totals.troves {
            if values.debt_to_offset > 0 {
                self.offset_count += 1;
            }
            if values.debt_to_redistribute > 0 {
                self.redistribution_count += 1;
            }
            if values.path == LiquidationPath::CappedOffsetWithSurplus {
                self.capped_count += 1;
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Get total liquidations
    pub fn total_liquidations(&self) -> u64 {
        self.total_liquidations
    }

    /// Get total debt liquidated
    pub fn total_debt_liquidated(&self) -> u128 {
        self.total_debt_liquidated
    }

    /// Get statistics
    pub fn statistics(&self) -> LiquidationStats {
        LiquidationStats {
            total_liquidations: self.total_liquidations,
            total_calls: self.total_calls,
            total_debt_liquidated: self.total_debt_liquidated,
            total_coll_liquidated: self.total_coll_liquidated,
            offset_count: self.offset_count,
            redistribution_count: self.redistribution_count,
            capped_count: self.capped_count,
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Liquidation statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationStats {
    /// Troves liquidated
    pub total_liquidations: u64,
    /// Successful liquidation calls
    pub total_calls: u64,
    /// Debt removed from troves
    pub total_debt_liquidated: u128,
    /// Collateral removed from troves
    pub total_coll_liquidated: u128,
    /// Troves with any pool offset
    pub offset_count: u64,
    /// Troves with any redistribution
    pub redistribution_count: u64,
    /// Troves liquidated with capped collateral
    pub capped_count: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SEQUENCES AND BATCHES
// ═══════════════════════════════════════════════════════════════════════════════

fn sequence_normal_mode(state: &mut LedgerState, ctx: &ExecutionContext<'_>, n: usize) -> Result<LiquidationTotals> {
    let mut totals = LiquidationTotals::new(SystemMode::Normal);
    let mut pool_remaining = state.stability_pool.total_deposits();

    for _ in 0..n {
        let Some(borrower) = state.sorted.last() else {
            break;
        };
        let icr = state.troves.current_icr(&borrower, ctx.price)?;
        if icr >= ctx.params.mcr {
            break;
        }
        let values = liquidate_normal_mode(state, ctx, borrower, pool_remaining)?;
        pool_remaining -= values.debt_to_offset;
        totals.add(values)?;
    }
    Ok(totals)
}

/// Walks up from the lowest ICR, recomputing TCR after each trove. Once the
/// system leaves Recovery Mode only troves below MCR are taken. The trove
/// with the highest NICR is never reached.
fn sequence_recovery_mode(state: &mut LedgerState, ctx: &ExecutionContext<'_>, n: usize) -> Result<LiquidationTotals> {
    let mut totals = LiquidationTotals::new(SystemMode::Recovery);
    let mut tracker = RecoveryTracker::new(state)?;

    let first = state.sorted.first();
    let mut cursor = state.sorted.last();
    for _ in 0..n {
        let Some(borrower) = cursor else {
            break;
        };
        if Some(borrower) == first {
            break;
        }
        let next = state.sorted.prev(&borrower);
        let icr = state.troves.current_icr(&borrower, ctx.price)?;

        if !tracker.back_to_normal_mode {
            if icr >= ctx.params.mcr && tracker.pool_remaining == 0 {
                break;
            }
            let tcr = tracker.tcr(ctx.price);
            let values = liquidate_recovery_mode(state, ctx, borrower, icr, tracker.pool_remaining, tcr)?;
            tracker.apply_recovery(&values, ctx)?;
            if values.path != LiquidationPath::Skip {
                totals.add(values)?;
            }
        } else if icr < ctx.params.mcr {
            let values = liquidate_normal_mode(state, ctx, borrower, tracker.pool_remaining)?;
            tracker.pool_remaining -= values.debt_to_offset;
            totals.add(values)?;
        } else {
            break;
        }
        cursor = next;
    }
    Ok(totals)
}

fn batch_normal_mode(
    state: &mut LedgerState,
    ctx: &ExecutionContext<'_>,
    borrowers: &[Address],
) -> Result<LiquidationTotals> {
    let mut totals = LiquidationTotals::new(SystemMode::Normal);
    let mut pool_remaining = state.stability_pool.total_deposits();

    for borrower in borrowers {
        if !state.troves.is_active(borrower) {
            continue;
        }
        let icr = state.troves.current_icr(borrower, ctx.price)?;
        if icr < ctx.params.mcr {
            let values = liquidate_normal_mode(state, ctx, *borrower, pool_remaining)?;
            pool_remaining -= values.debt_to_offset;
            totals.add(values)?;
        }
    }
    Ok(totals)
}

fn batch_recovery_mode(
    state: &mut LedgerState,
    ctx: &ExecutionContext<'_>,
    borrowers: &[Address],
) -> Result<LiquidationTotals> {
    let mut totals = LiquidationTotals::new(SystemMode::Recovery);
    let mut tracker = RecoveryTracker::new(state)?;

    for borrower in borrowers {
        if !state.troves.is_active(borrower) {
            continue;
        }
        let icr = state.troves.current_icr(borrower, ctx.price)?;

        if !tracker.back_to_normal_mode {
            if icr >= ctx.params.mcr && tracker.pool_remaining == 0 {
                continue;
            }
            let tcr = tracker.tcr(ctx.price);
            let values = liquidate_recovery_mode(state, ctx, *borrower, icr, tracker.pool_remaining, tcr)?;
            tracker.apply_recovery(&values, ctx)?;
            if values.path != LiquidationPath::Skip {
                totals.add(values)?;
            }
        } else if icr < ctx.params.mcr {
            let values = liquidate_normal_mode(state, ctx, *borrower, tracker.pool_remaining)?;
            tracker.pool_remaining -= values.debt_to_offset;
            totals.add(values)?;
        }
    }
    Ok(totals)
}

/// Running system totals while liquidating in Recovery Mode
struct RecoveryTracker {
    pool_remaining: u128,
    system_coll: u128,
    system_debt: u128,
    back_to_normal_mode: bool,
}

impl RecoveryTracker {
    fn new(state: &LedgerState) -> Result<Self> {
        Ok(Self {
            pool_remaining: state.stability_pool.total_deposits(),
            system_coll: state.entire_system_coll()?,
            system_debt: state.entire_system_debt()?,
            back_to_normal_mode: false,
        })
    }

    fn tcr(&self, price: u128) -> u128 {
        compute_cr(self.system_coll, self.system_debt, price)
    }

    /// Only offset debt and collateral leaving the system count; redistributed
    /// balances stay in the system totals.
    fn apply_recovery(&mut self, values: &LiquidationValues, ctx: &ExecutionContext<'_>) -> Result<()> {
        self.pool_remaining = safe_sub(self.pool_remaining, values.debt_to_offset)?;
        self.system_debt = safe_sub(self.system_debt, values.debt_to_offset)?;
        self.system_coll = safe_sub(
            self.system_coll,
            safe_add(
                safe_add(values.coll_to_send_to_sp, values.coll_gas_compensation)?,
                values.coll_surplus,
            )?,
        )?;

        let tcr = self.tcr(ctx.price);
        self.back_to_normal_mode = tcr >= ctx.params.ccr;
        if self.back_to_normal_mode {
            tracing::debug!(tcr, "system back above CCR during liquidation");
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SINGLE TROVE
// ═══════════════════════════════════════════════════════════════════════════════

fn liquidate_normal_mode(
    state: &mut LedgerState,
    ctx: &ExecutionContext<'_>,
    borrower: Address,
    pool_remaining: u128,
) -> Result<LiquidationValues> {
    let entire = state.troves.entire_debt_and_coll(&borrower)?;
    let mut values = LiquidationValues::new(borrower, LiquidationPath::OffsetPool, &entire);

    move_pending_rewards_to_active_pool(state, &entire)?;
    state.troves.remove_stake(&borrower)?;

    values.coll_gas_compensation = entire.coll / ctx.params.percent_divisor;
    values.debt_gas_compensation = ctx.params.gas_compensation;
    let coll_to_liquidate = entire.coll - values.coll_gas_compensation;
    split_offset_and_redistribution(&mut values, coll_to_liquidate, pool_remaining)?;

    close_liquidated(state, ctx, &values, TroveOperation::LiquidateInNormalMode)?;
    Ok(values)
}

fn liquidate_recovery_mode(
    state: &mut LedgerState,
    ctx: &ExecutionContext<'_>,
    borrower: Address,
    icr: u128,
    pool_remaining: u128,
    tcr: u128,
) -> Result<LiquidationValues> {
    let entire = state.troves.entire_debt_and_coll(&borrower)?;
    let inputs = PathInputs {
        mode: SystemMode::Recovery,
        icr,
        debt: entire.debt,
        tcr,
        pool_remaining,
        trove_count: state.troves.owners_count(),
    };
    let path = select_liquidation_path(&inputs, ctx.params);
    let mut values = LiquidationValues::new(borrower, path, &entire);
    tracing::debug!(borrower = %borrower, icr, path = path.name(), "recovery mode path");

    match path {
        LiquidationPath::Skip => {
            values.entire_debt = 0;
            values.entire_coll = 0;
            return Ok(values);
        }
        LiquidationPath::RedistributeOnly => {
            values.coll_gas_compensation = entire.coll / ctx.params.percent_divisor;
            values.debt_gas_compensation = ctx.params.gas_compensation;
            values.debt_to_redistribute = entire.debt;
            values.coll_to_redistribute = entire.coll - values.coll_gas_compensation;
        }
        LiquidationPath::OffsetPool => {
            values.coll_gas_compensation = entire.coll / ctx.params.percent_divisor;
            values.debt_gas_compensation = ctx.params.gas_compensation;
            let coll_to_liquidate = entire.coll - values.coll_gas_compensation;
            split_offset_and_redistribution(&mut values, coll_to_liquidate, pool_remaining)?;
        }
        LiquidationPath::CappedOffsetWithSurplus => {
            let capped_coll = mul_div(entire.debt, ctx.params.mcr, ctx.price)?.min(entire.coll);
            values.coll_gas_compensation = capped_coll / ctx.params.percent_divisor;
            values.debt_gas_compensation = ctx.params.gas_compensation;
            values.debt_to_offset = entire.debt;
            values.coll_to_send_to_sp = capped_coll - values.coll_gas_compensation;
            values.coll_surplus = entire.coll - capped_coll;
        }
    }

    move_pending_rewards_to_active_pool(state, &entire)?;
    state.troves.remove_stake(&borrower)?;
    close_liquidated(state, ctx, &values, TroveOperation::LiquidateInRecoveryMode)?;
    if values.coll_surplus > 0 {
        state.surplus_pool.account_surplus(borrower, values.coll_surplus)?;
    }
    Ok(values)
}

/// Offset as much debt as the pool covers and give the pool the same share of
/// collateral; the remainder is redistributed.
fn split_offset_and_redistribution(
    values: &mut LiquidationValues,
    coll_to_liquidate: u128,
    pool_remaining: u128,
) -> Result<()> {
    let debt = values.entire_debt;
    if pool_remaining > 0 && debt > 0 {
        values.debt_to_offset = debt.min(pool_remaining);
        values.coll_to_send_to_sp = mul_div(coll_to_liquidate, values.debt_to_offset, debt)?;
    }
    values.debt_to_redistribute = debt - values.debt_to_offset;
    values.coll_to_redistribute = coll_to_liquidate - values.coll_to_send_to_sp;
    Ok(())
}

fn move_pending_rewards_to_active_pool(state: &mut LedgerState, entire: &EntireDebtAndColl) -> Result<()> {
    state
        .default_pool
        .transfer_to(&mut state.active_pool, entire.pending_coll_reward, entire.pending_debt_reward)
}

fn close_liquidated(
    state: &mut LedgerState,
    ctx: &ExecutionContext<'_>,
    values: &LiquidationValues,
    operation: TroveOperation,
) -> Result<()> {
    state
        .troves
        .close_trove(&values.borrower, TroveStatus::ClosedByLiquidation, &mut state.sorted)?;
    state.emit(ProtocolEvent::TroveLiquidated(TroveLiquidatedEvent {
        borrower: values.borrower,
        debt: values.entire_debt,
        coll: values.entire_coll,
        path: values.path,
        operation,
        block_height: ctx.block_height,
        timestamp: ctx.timestamp,
    }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::borrower::open_trove;
    use crate::core::sorted_troves::InsertHint;
    use crate::liquidation::stability_pool::provide_to_stability_pool;
    use crate::utils::constants::DECIMAL_PRECISION;

    struct Fixture {
        params: ProtocolParams,
        state: LedgerState,
    }

    fn owner(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn liquidator() -> Address {
        Address::from_low_u64(99)
    }

    fn ctx(params: &ProtocolParams, price: u128) -> ExecutionContext<'_> {
        ExecutionContext {
            params,
            price,
            timestamp: 1_000,
            block_height: 1,
            fee_recipient: Address::new([0xfc; 20]),
        }
    }

    /// One trove per collateral amount, each drawing 2000, owners numbered from 1
    fn fixture(colls: &[u128]) -> Fixture {
        let params = ProtocolParams::default();
        let mut state = LedgerState::new(&params, 0);
        let c = ctx(&params, units(200));
        for (i, coll) in colls.iter().enumerate() {
            open_trove(&mut state, &c, owner(i as u64 + 1), *coll, units(2_000), DECIMAL_PRECISION, InsertHint::default())
                .unwrap();
        }
        Fixture { params, state }
    }

    fn assert_conserved(totals: &LiquidationTotals) {
        for v in &totals.troves {
            assert_eq!(v.coll_accounted(), v.entire_coll);
            assert_eq!(v.debt_accounted(), v.entire_debt);
        }
    }

    #[test]
    fn test_liquidate_offsets_against_pool() {
        let mut f = fixture(&[units(100), units(13)]);
        let c = ctx(&f.params, units(200));
        f.state.token.mint(owner(1), units(1_000)).unwrap();
        provide_to_stability_pool(&mut f.state, &c, owner(1), units(3_000)).unwrap();

        // 13 coll at 180 against 2210 debt is below 110%
        let c = ctx(&f.params, units(180));
        let mut engine = LiquidationEngine::new();
        let totals = engine.liquidate(&mut f.state, &c, liquidator(), owner(2)).unwrap();

        let v = totals.troves[0];
        assert_eq!(v.path, LiquidationPath::OffsetPool);
        assert_eq!(v.debt_to_offset, units(2_210));
        assert_eq!(v.coll_gas_compensation, units(13) / 200);
        assert_eq!(v.debt_to_redistribute, 0);
        assert_conserved(&totals);

        assert_eq!(f.state.troves.status(&owner(2)), TroveStatus::ClosedByLiquidation);
        assert_eq!(f.state.stability_pool.total_deposits(), units(790));
        assert_eq!(f.state.token.balance_of(&liquidator()), units(200));
        assert_eq!(f.state.pending_payouts()[0].amount, units(13) / 200);
        assert_eq!(engine.statistics().offset_count, 1);
    }

    #[test]
    fn test_liquidate_redistributes_without_pool() {
        let mut f = fixture(&[units(100), units(13), units(30)]);
        let c = ctx(&f.params, units(180));
        let mut engine = LiquidationEngine::new();

        let totals = engine.liquidate(&mut f.state, &c, liquidator(), owner(2)).unwrap();
        let v = totals.troves[0];
        assert_eq!(v.debt_to_offset, 0);
        assert_eq!(v.debt_to_redistribute, units(2_210));
        assert_conserved(&totals);

        assert!(f.state.troves.has_pending_rewards(&owner(1)));
        assert!(f.state.troves.has_pending_rewards(&owner(3)));
        assert_eq!(f.state.default_pool.debt(), units(2_210));
        f.state.verify_invariants().unwrap();
    }

    #[test]
    fn test_healthy_and_missing_troves() {
        let mut f = fixture(&[units(100), units(30)]);
        let c = ctx(&f.params, units(200));
        let mut engine = LiquidationEngine::new();

        assert_eq!(
            engine.liquidate(&mut f.state, &c, liquidator(), owner(2)),
            Err(Error::NothingToLiquidate)
        );
        assert!(matches!(
            engine.liquidate(&mut f.state, &c, liquidator(), owner(42)),
            Err(Error::TroveNotFound(_))
        ));
        assert_eq!(
            engine.batch_liquidate_troves(&mut f.state, &c, liquidator(), &[]),
            Err(Error::EmptyTroveArray)
        );
        assert_eq!(engine.total_liquidations(), 0);
    }

    #[test]
    fn test_sequence_stops_at_healthy_trove() {
        let mut f = fixture(&[units(100), units(13), units(13), units(30)]);
        let c = ctx(&f.params, units(180));
        let mut engine = LiquidationEngine::new();

        let found = LiquidationEngine::find_liquidatable(&f.state, c.price, &f.params).unwrap();
        assert_eq!(found.len(), 2);

        let totals = engine.liquidate_troves(&mut f.state, &c, liquidator(), 10).unwrap();
        assert_eq!(totals.len(), 2);
        assert!(f.state.troves.is_active(&owner(4)));
        assert_conserved(&totals);
    }

    #[test]
    fn test_capped_offset_in_recovery_mode() {
        // At price 100: ICRs of about 163%, 122% and 140%, TCR about 142%
        let mut f = fixture(&[units(36), units(27), units(31)]);
        let c = ctx(&f.params, units(200));
        provide_to_stability_pool(&mut f.state, &c, owner(1), units(2_000)).unwrap();
        provide_to_stability_pool(&mut f.state, &c, owner(3), units(1_000)).unwrap();

        let price = units(100);
        let c = ctx(&f.params, price);
        let health = f.state.system_health(price, &f.params).unwrap();
        assert!(health.is_recovery_mode());

        let icr = f.state.troves.current_icr(&owner(2), price).unwrap();
        assert!(icr >= f.params.mcr && icr < health.tcr);

        let mut engine = LiquidationEngine::new();
        let totals = engine.liquidate(&mut f.state, &c, liquidator(), owner(2)).unwrap();
        let v = totals.troves[0];
        assert_eq!(v.path, LiquidationPath::CappedOffsetWithSurplus);
        assert_eq!(v.debt_to_offset, units(2_210));
        // Collateral capped at 110% of the debt
        assert_eq!(v.coll_surplus, units(27) - units(2_431) / 100);
        assert_conserved(&totals);
        assert_eq!(f.state.surplus_pool.balance_of(&owner(2)), v.coll_surplus);
        assert_eq!(f.state.surplus_pool.coll(), v.coll_surplus);
    }
}
