//! Ledger state.
//!
//! `LedgerState` bundles every piece of mutable protocol state into a single
//! value: troves, sorted index, pools, stability pool, base rate, debt token,
//! event log and settled collateral payouts. Every mutating operation takes it
//! by exclusive borrow, and the state machine snapshots it by clone so a
//! failed operation can be undone wholesale.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::config::ProtocolParams;
use crate::core::fees::BaseRate;
use crate::core::pools::{ActivePool, CollSurplusPool, DefaultPool, SecondaryRewardPool};
use crate::core::sorted_troves::SortedTroves;
use crate::core::token::{DebtToken, DebtTokenLedger};
use crate::core::trove::TroveManager;
use crate::error::{Error, Result};
use crate::liquidation::recovery::SystemHealth;
use crate::liquidation::stability_pool::StabilityPool;
use crate::protocol::events::{CollateralSentEvent, EventLog, ProtocolEvent, TroveOperation, TroveUpdatedEvent};
use crate::utils::crypto::{Address, Hash};
use crate::utils::math::{compute_cr, safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// EXECUTION CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// Inputs fixed for the duration of one operation
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    /// Protocol parameters
    pub params: &'a ProtocolParams,
    /// Oracle price, read once at the start of the operation
    pub price: u128,
    /// Current timestamp (seconds)
    pub timestamp: u64,
    /// Current block height
    pub block_height: u64,
    /// Receiver of borrowing and redemption fees
    pub fee_recipient: Address,
}

/// Collateral leaving the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralPayout {
    /// Receiver
    pub recipient: Address,
    /// Collateral amount
    pub amount: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// All mutable protocol state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// Trove records, stakes and redistribution accumulators
    pub troves: TroveManager,
    /// Troves ordered by nominal ICR
    pub sorted: SortedTroves,
    /// Balances of active troves
    pub active_pool: ActivePool,
    /// Redistributed balances not yet applied to troves
    pub default_pool: DefaultPool,
    /// Collateral claimable by former owners
    pub surplus_pool: CollSurplusPool,
    /// Stability pool
    pub stability_pool: StabilityPool,
    /// Secondary reward owed to stability depositors
    pub secondary_rewards: SecondaryRewardPool,
    /// Fee base rate
    pub base_rate: BaseRate,
    /// Debt token balances
    pub token: DebtTokenLedger,
    /// Events emitted so far
    pub events: EventLog,
    /// Collateral settled to each recipient
    collateral_sent: BTreeMap<Address, u128>,
    /// Payouts of the running operation awaiting settlement
    pending_payouts: Vec<CollateralPayout>,
}

impl LedgerState {
    /// Create an empty ledger
    pub fn new(params: &ProtocolParams, now: u64) -> Self {
        Self {
            troves: TroveManager::new(),
            sorted: SortedTroves::new(params.max_sorted_size),
            active_pool: ActivePool::new(),
            default_pool: DefaultPool::new(),
            surplus_pool: CollSurplusPool::new(),
            stability_pool: StabilityPool::new(),
            secondary_rewards: SecondaryRewardPool::new(),
            base_rate: BaseRate::new(now),
            token: DebtTokenLedger::new(),
            events: EventLog::new(),
            collateral_sent: BTreeMap::new(),
            pending_payouts: Vec::new(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SYSTEM TOTALS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Collateral of all troves, pending rewards included
    pub fn entire_system_coll(&self) -> Result<u128> {
        safe_add(self.active_pool.coll(), self.default_pool.coll())
    }

    /// Debt of all troves, pending rewards included
    pub fn entire_system_debt(&self) -> Result<u128> {
        safe_add(self.active_pool.debt(), self.default_pool.debt())
    }

    /// Total collateral ratio at `price`
    pub fn tcr(&self, price: u128) -> Result<u128> {
        Ok(compute_cr(self.entire_system_coll()?, self.entire_system_debt()?, price))
    }

    /// Mode, TCR and totals at `price`
    pub fn system_health(&self, price: u128, params: &ProtocolParams) -> Result<SystemHealth> {
        Ok(SystemHealth::compute(
            self.entire_system_coll()?,
            self.entire_system_debt()?,
            price,
            params,
        ))
    }

    /// Whether the system is in Recovery Mode at `price`
    pub fn is_recovery_mode(&self, price: u128, params: &ProtocolParams) -> Result<bool> {
        Ok(self.system_health(price, params)?.is_recovery_mode())
    }

    /// TCR after a single trove's collateral and debt change
    pub fn new_tcr_from_trove_change(
        &self,
        coll_change: u128,
        is_coll_increase: bool,
        debt_change: u128,
        is_debt_increase: bool,
        price: u128,
    ) -> Result<u128> {
        let total_coll = self.entire_system_coll()?;
        let total_debt = self.entire_system_debt()?;

        let new_coll = if is_coll_increase {
            safe_add(total_coll, coll_change)?
        } else {
            safe_sub(total_coll, coll_change)?
        };
        let new_debt = if is_debt_increase {
            safe_add(total_debt, debt_change)?
        } else {
            safe_sub(total_debt, debt_change)?
        };
        Ok(compute_cr(new_coll, new_debt, price))
    }

    /// Whether the worst trove is below `mcr` at `price`
    pub fn has_undercollateralized_troves(&self, price: u128, mcr: u128) -> Result<bool> {
        match self.sorted.last() {
            Some(lowest) => Ok(self.troves.current_icr(&lowest, price)? < mcr),
            None => Ok(false),
        }
    }

    /// Fold `owner`'s pending redistribution rewards into their trove,
    /// emitting an update when anything changed
    pub fn apply_pending_rewards(&mut self, ctx: &ExecutionContext<'_>, owner: &Address) -> Result<()> {
        let applied = self
            .troves
            .apply_pending_rewards(owner, &mut self.active_pool, &mut self.default_pool)?;
        if applied {
            self.emit_trove_updated(ctx, owner, TroveOperation::ApplyPendingRewards);
        }
        Ok(())
    }

    /// Emit the current stored values of `owner`'s trove
    pub fn emit_trove_updated(&mut self, ctx: &ExecutionContext<'_>, owner: &Address, operation: TroveOperation) {
        let trove = self.troves.trove(owner).copied().unwrap_or_default();
        self.events.push(ProtocolEvent::TroveUpdated(TroveUpdatedEvent {
            borrower: *owner,
            debt: trove.debt,
            coll: trove.coll,
            stake: trove.stake,
            operation,
            block_height: ctx.block_height,
            timestamp: ctx.timestamp,
        }));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EVENTS AND PAYOUTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Append an event
    pub fn emit(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    /// Record collateral owed to `recipient`; settled once the operation's
    /// bookkeeping is complete. Zero amounts are ignored.
    pub fn queue_payout(&mut self, recipient: Address, amount: u128) {
        if amount > 0 {
            self.pending_payouts.push(CollateralPayout { recipient, amount });
        }
    }

    /// Payouts queued by the running operation
    pub fn pending_payouts(&self) -> &[CollateralPayout] {
        &self.pending_payouts
    }

    /// Deliver all queued payouts. Returns them in queue order.
    pub fn settle_payouts(&mut self, block_height: u64, timestamp: u64) -> Result<Vec<CollateralPayout>> {
        let payouts = std::mem::take(&mut self.pending_payouts);
        for payout in &payouts {
            let sent = self.collateral_sent.entry(payout.recipient).or_insert(0);
            *sent = safe_add(*sent, payout.amount)?;
            self.events.push(ProtocolEvent::CollateralSent(CollateralSentEvent {
                recipient: payout.recipient,
                amount: payout.amount,
                block_height,
                timestamp,
            }));
        }
        Ok(payouts)
    }

    /// Total collateral settled to `recipient`
    pub fn collateral_sent_to(&self, recipient: &Address) -> u128 {
        self.collateral_sent.get(recipient).copied().unwrap_or(0)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INVARIANTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Check cross-component invariants
    pub fn verify_invariants(&self) -> Result<()> {
        self.troves.verify_invariants()?;

        if self.sorted.size() != self.troves.owners_count() {
            return Err(Error::InvariantViolation(format!(
                "sorted index holds {} troves, ledger {}",
                self.sorted.size(),
                self.troves.owners_count()
            )));
        }
        if !self.token.verify_supply_invariant() {
            return Err(Error::InvariantViolation("token balances do not sum to supply".into()));
        }
        if self.token.balance_of(&Address::STABILITY_POOL) != self.stability_pool.total_deposits() {
            return Err(Error::InvariantViolation(
                "stability pool deposits differ from its token balance".into(),
            ));
        }
        if self.secondary_rewards.issued() != self.stability_pool.statistics().total_secondary_issued {
            return Err(Error::InvariantViolation(
                "secondary reward funding differs from stability pool issuance".into(),
            ));
        }
        if self.stability_pool.p() == 0 {
            return Err(Error::InvariantViolation("stability pool product is zero".into()));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SERIALIZATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Compute state hash
    pub fn state_hash(&self) -> Result<Hash> {
        Ok(Hash::sha256(&self.to_bytes()?))
    }
}
