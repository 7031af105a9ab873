//! Position ledger.
//!
//! A Trove is a collateralized debt position owned by one address. The ledger
//! tracks every trove, its stake, and the global redistribution accumulators:
//!
//! - `L_coll` / `L_debt`: cumulative collateral and debt redistributed per unit staked
//! - Pending rewards of a trove are `stake * (L - snapshot)`
//! - Stakes are `coll * total_stakes_snapshot / total_collateral_snapshot`
//! - Owners live in a dense array with swap-and-pop removal

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::pools::{ActivePool, DefaultPool};
use crate::core::sorted_troves::{NominalIcrSource, SortedTroves};
use crate::error::{Error, Result};
use crate::utils::constants::DECIMAL_PRECISION;
use crate::utils::crypto::Address;
use crate::utils::math::{compute_cr, compute_nominal_cr, mul_div, per_unit_with_error, safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// TROVE STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle status of a trove
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TroveStatus {
    /// Never opened
    #[default]
    NonExistent,
    /// Open and carrying debt
    Active,
    /// Closed by its owner after repaying
    ClosedByOwner,
    /// Closed by liquidation
    ClosedByLiquidation,
    /// Closed after its full debt was redeemed
    ClosedByRedemption,
}

impl TroveStatus {
    /// Whether this is one of the closed states
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            TroveStatus::ClosedByOwner | TroveStatus::ClosedByLiquidation | TroveStatus::ClosedByRedemption
        )
    }

    /// Get status name
    pub fn name(&self) -> &'static str {
        match self {
            TroveStatus::NonExistent => "NonExistent",
            TroveStatus::Active => "Active",
            TroveStatus::ClosedByOwner => "ClosedByOwner",
            TroveStatus::ClosedByLiquidation => "ClosedByLiquidation",
            TroveStatus::ClosedByRedemption => "ClosedByRedemption",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TROVE RECORD
// ═══════════════════════════════════════════════════════════════════════════════

/// Stored trove record. Values exclude pending redistribution rewards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trove {
    /// Recorded debt, including the gas compensation reserve
    pub debt: u128,
    /// Recorded collateral
    pub coll: u128,
    /// Share of total stakes
    pub stake: u128,
    /// Lifecycle status
    pub status: TroveStatus,
    /// Position in the owners array (meaningful only while active)
    pub array_index: usize,
}

impl Trove {
    /// Whether the trove is active
    pub fn is_active(&self) -> bool {
        self.status == TroveStatus::Active
    }
}

/// L accumulators as of a trove's last touch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSnapshot {
    /// `L_coll` at last touch
    pub coll: u128,
    /// `L_debt` at last touch
    pub debt: u128,
}

/// Debt and collateral of a trove including pending rewards
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntireDebtAndColl {
    /// Recorded debt plus pending debt reward
    pub debt: u128,
    /// Recorded collateral plus pending collateral reward
    pub coll: u128,
    /// Pending debt reward
    pub pending_debt_reward: u128,
    /// Pending collateral reward
    pub pending_coll_reward: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TROVE MANAGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Ledger of all troves plus the redistribution accumulators
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroveManager {
    /// Trove records by owner, closed troves included
    troves: BTreeMap<Address, Trove>,
    /// Owners of active troves
    owners: Vec<Address>,
    /// Reward snapshots of active troves
    reward_snapshots: BTreeMap<Address, RewardSnapshot>,
    /// Sum of all active stakes
    total_stakes: u128,
    /// `total_stakes` right after the last liquidation
    total_stakes_snapshot: u128,
    /// System collateral right after the last liquidation, gas compensation excluded
    total_collateral_snapshot: u128,
    /// Collateral redistributed per unit staked
    l_coll: u128,
    /// Debt redistributed per unit staked
    l_debt: u128,
    /// Truncation remainder carried between collateral redistributions
    last_coll_error_redistribution: u128,
    /// Truncation remainder carried between debt redistributions
    last_debt_error_redistribution: u128,
}

impl TroveManager {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Stored record of `owner`, if it ever existed
    pub fn trove(&self, owner: &Address) -> Option<&Trove> {
        self.troves.get(owner)
    }

    /// Status of `owner`'s trove
    pub fn status(&self, owner: &Address) -> TroveStatus {
        self.troves.get(owner).map(|t| t.status).unwrap_or_default()
    }

    /// Whether `owner` has an active trove
    pub fn is_active(&self, owner: &Address) -> bool {
        self.status(owner) == TroveStatus::Active
    }

    /// The active trove of `owner`, or `TroveNotFound`
    pub fn require_active(&self, owner: &Address) -> Result<&Trove> {
        self.troves
            .get(owner)
            .filter(|t| t.is_active())
            .ok_or_else(|| Error::TroveNotFound(owner.to_hex()))
    }

    /// Number of active troves
    pub fn owners_count(&self) -> usize {
        self.owners.len()
    }

    /// Owner at `index` in the owners array
    pub fn owner_at(&self, index: usize) -> Option<Address> {
        self.owners.get(index).copied()
    }

    /// All active owners, in array order
    pub fn owners(&self) -> &[Address] {
        &self.owners
    }

    /// Reward snapshot of `owner` (zero when absent)
    pub fn reward_snapshot(&self, owner: &Address) -> RewardSnapshot {
        self.reward_snapshots.get(owner).copied().unwrap_or_default()
    }

    /// Sum of active stakes
    pub fn total_stakes(&self) -> u128 {
        self.total_stakes
    }

    /// Total stakes captured after the last liquidation
    pub fn total_stakes_snapshot(&self) -> u128 {
        self.total_stakes_snapshot
    }

    /// Total collateral captured after the last liquidation
    pub fn total_collateral_snapshot(&self) -> u128 {
        self.total_collateral_snapshot
    }

    /// Collateral redistributed per unit staked
    pub fn l_coll(&self) -> u128 {
        self.l_coll
    }

    /// Debt redistributed per unit staked
    pub fn l_debt(&self) -> u128 {
        self.l_debt
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PENDING REWARDS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Collateral redistributed to `owner` since their last touch
    pub fn pending_collateral_reward(&self, owner: &Address) -> Result<u128> {
        let Some(trove) = self.troves.get(owner).filter(|t| t.is_active()) else {
            return Ok(0);
        };
        let per_unit = safe_sub(self.l_coll, self.reward_snapshot(owner).coll)?;
        if per_unit == 0 {
            return Ok(0);
        }
        mul_div(trove.stake, per_unit, DECIMAL_PRECISION)
    }

    /// Debt redistributed to `owner` since their last touch
    pub fn pending_debt_reward(&self, owner: &Address) -> Result<u128> {
        let Some(trove) = self.troves.get(owner).filter(|t| t.is_active()) else {
            return Ok(0);
        };
        let per_unit = safe_sub(self.l_debt, self.reward_snapshot(owner).debt)?;
        if per_unit == 0 {
            return Ok(0);
        }
        mul_div(trove.stake, per_unit, DECIMAL_PRECISION)
    }

    /// Whether `owner`'s trove has unapplied redistribution rewards
    pub fn has_pending_rewards(&self, owner: &Address) -> bool {
        self.is_active(owner) && self.reward_snapshot(owner).coll < self.l_coll
    }

    /// Debt and collateral of `owner` including pending rewards
    pub fn entire_debt_and_coll(&self, owner: &Address) -> Result<EntireDebtAndColl> {
        let trove = self.troves.get(owner).copied().unwrap_or_default();
        let pending_coll_reward = self.pending_collateral_reward(owner)?;
        let pending_debt_reward = self.pending_debt_reward(owner)?;
        Ok(EntireDebtAndColl {
            debt: safe_add(trove.debt, pending_debt_reward)?,
            coll: safe_add(trove.coll, pending_coll_reward)?,
            pending_debt_reward,
            pending_coll_reward,
        })
    }

    /// Nominal ICR of `owner` including pending rewards
    pub fn nominal_icr(&self, owner: &Address) -> Result<u128> {
        let entire = self.entire_debt_and_coll(owner)?;
        Ok(compute_nominal_cr(entire.coll, entire.debt))
    }

    /// ICR of `owner` at `price` including pending rewards
    pub fn current_icr(&self, owner: &Address, price: u128) -> Result<u128> {
        let entire = self.entire_debt_and_coll(owner)?;
        Ok(compute_cr(entire.coll, entire.debt, price))
    }

    /// Fold pending rewards into `owner`'s trove and move the backing
    /// balances from the default pool to the active pool.
    ///
    /// Returns whether anything was applied.
    pub fn apply_pending_rewards(
        &mut self,
        owner: &Address,
        active_pool: &mut ActivePool,
        default_pool: &mut DefaultPool,
    ) -> Result<bool> {
        if !self.has_pending_rewards(owner) {
            return Ok(false);
        }

        let pending_coll = self.pending_collateral_reward(owner)?;
        let pending_debt = self.pending_debt_reward(owner)?;

        let trove = self
            .troves
            .get_mut(owner)
            .ok_or_else(|| Error::TroveNotFound(owner.to_hex()))?;
        trove.coll = safe_add(trove.coll, pending_coll)?;
        trove.debt = safe_add(trove.debt, pending_debt)?;

        self.update_reward_snapshots(owner);
        default_pool.transfer_to(active_pool, pending_coll, pending_debt)?;
        Ok(true)
    }

    /// Record the current L accumulators as `owner`'s snapshot
    pub fn update_reward_snapshots(&mut self, owner: &Address) {
        self.reward_snapshots.insert(
            *owner,
            RewardSnapshot {
                coll: self.l_coll,
                debt: self.l_debt,
            },
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STAKES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Stake for a trove holding `coll`.
    ///
    /// Before the first liquidation the stake equals the collateral; afterwards
    /// it is scaled by the snapshot ratio so redistributed collateral, which has
    /// no stake of its own, is not double counted.
    pub fn compute_new_stake(&self, coll: u128) -> Result<u128> {
        if self.total_collateral_snapshot == 0 {
            return Ok(coll);
        }
        if self.total_stakes_snapshot == 0 {
            return Err(Error::InvariantViolation(
                "total stakes snapshot is zero while collateral snapshot is not".into(),
            ));
        }
        mul_div(coll, self.total_stakes_snapshot, self.total_collateral_snapshot)
    }

    /// Recompute `owner`'s stake from its recorded collateral. Returns the new stake.
    pub fn update_stake_and_total_stakes(&mut self, owner: &Address) -> Result<u128> {
        let (coll, old_stake) = {
            let trove = self.require_active(owner)?;
            (trove.coll, trove.stake)
        };
        let new_stake = self.compute_new_stake(coll)?;

        self.total_stakes = safe_add(safe_sub(self.total_stakes, old_stake)?, new_stake)?;
        if let Some(trove) = self.troves.get_mut(owner) {
            trove.stake = new_stake;
        }
        Ok(new_stake)
    }

    /// Remove `owner`'s stake from the total
    pub fn remove_stake(&mut self, owner: &Address) -> Result<()> {
        let trove = self
            .troves
            .get_mut(owner)
            .ok_or_else(|| Error::TroveNotFound(owner.to_hex()))?;
        self.total_stakes = safe_sub(self.total_stakes, trove.stake)?;
        trove.stake = 0;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REDISTRIBUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Spread `debt` and `coll` over all active stakes through the L
    /// accumulators, and park the balances in the default pool until troves
    /// are touched.
    pub fn redistribute_debt_and_coll(
        &mut self,
        active_pool: &mut ActivePool,
        default_pool: &mut DefaultPool,
        debt: u128,
        coll: u128,
    ) -> Result<()> {
        if debt == 0 {
            return Ok(());
        }

        let (coll_per_unit, coll_error) =
            per_unit_with_error(coll, self.last_coll_error_redistribution, self.total_stakes)?;
        let (debt_per_unit, debt_error) =
            per_unit_with_error(debt, self.last_debt_error_redistribution, self.total_stakes)?;

        self.last_coll_error_redistribution = coll_error;
        self.last_debt_error_redistribution = debt_error;
        self.l_coll = safe_add(self.l_coll, coll_per_unit)?;
        self.l_debt = safe_add(self.l_debt, debt_per_unit)?;

        tracing::debug!(
            debt,
            coll,
            l_coll = self.l_coll,
            l_debt = self.l_debt,
            "redistributed liquidated trove"
        );

        active_pool.transfer_to(default_pool, coll, debt)
    }

    /// Capture stake and collateral totals after a liquidation.
    ///
    /// `coll_remainder` is collateral still sitting in the active pool that is
    /// about to leave as compensation and must not count towards the snapshot.
    pub fn update_system_snapshots_exclude_coll_remainder(
        &mut self,
        active_pool: &ActivePool,
        default_pool: &DefaultPool,
        coll_remainder: u128,
    ) -> Result<()> {
        self.total_stakes_snapshot = self.total_stakes;
        self.total_collateral_snapshot = safe_add(safe_sub(active_pool.coll(), coll_remainder)?, default_pool.coll())?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record a new active trove for `owner` with the given balances, snapshot
    /// its rewards, assign a stake and append it to the owners array.
    ///
    /// Returns the assigned stake and array index.
    pub fn activate_trove(&mut self, owner: Address, coll: u128, debt: u128) -> Result<(u128, usize)> {
        if self.is_active(&owner) {
            return Err(Error::TroveAlreadyActive(owner.to_hex()));
        }

        self.troves.insert(
            owner,
            Trove {
                debt,
                coll,
                stake: 0,
                status: TroveStatus::Active,
                array_index: 0,
            },
        );
        self.update_reward_snapshots(&owner);
        let stake = self.update_stake_and_total_stakes(&owner)?;
        let index = self.add_trove_owner(owner)?;
        Ok((stake, index))
    }

    /// Append `owner` to the owners array. Returns its index.
    pub fn add_trove_owner(&mut self, owner: Address) -> Result<usize> {
        let index = self.owners.len();
        let trove = self
            .troves
            .get_mut(&owner)
            .ok_or_else(|| Error::TroveNotFound(owner.to_hex()))?;
        trove.array_index = index;
        self.owners.push(owner);
        Ok(index)
    }

    /// Remove a closed trove's owner from the owners array by moving the last
    /// owner into its slot.
    pub fn remove_trove_owner(&mut self, owner: &Address) -> Result<()> {
        let trove = self
            .troves
            .get(owner)
            .ok_or_else(|| Error::TroveNotFound(owner.to_hex()))?;
        if !trove.status.is_closed() {
            return Err(Error::InvariantViolation(format!(
                "removing owner {} with status {}",
                owner,
                trove.status.name()
            )));
        }

        let index = trove.array_index;
        if self.owners.get(index) != Some(owner) {
            return Err(Error::InvariantViolation(format!(
                "owners array out of sync at index {}",
                index
            )));
        }

        self.owners.swap_remove(index);
        if let Some(moved) = self.owners.get(index).copied() {
            if let Some(moved_trove) = self.troves.get_mut(&moved) {
                moved_trove.array_index = index;
            }
        }
        Ok(())
    }

    /// Close `owner`'s trove with `closed_status`: zero the record and its
    /// snapshot, drop it from the owners array and the sorted index.
    ///
    /// The last trove in the system can never be closed.
    pub fn close_trove(&mut self, owner: &Address, closed_status: TroveStatus, sorted: &mut SortedTroves) -> Result<()> {
        if !closed_status.is_closed() {
            return Err(Error::InvalidParameter {
                name: "closed_status".into(),
                reason: format!("{} is not a closed status", closed_status.name()),
            });
        }
        self.require_active(owner)?;
        if self.owners.len() <= 1 || sorted.size() <= 1 {
            return Err(Error::OnlyOneTroveInSystem);
        }

        if let Some(trove) = self.troves.get_mut(owner) {
            trove.status = closed_status;
            trove.coll = 0;
            trove.debt = 0;
        }
        self.reward_snapshots.remove(owner);

        self.remove_trove_owner(owner)?;
        sorted.remove(owner)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BALANCE UPDATES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Add collateral to an active trove. Returns the new collateral.
    pub fn increase_coll(&mut self, owner: &Address, amount: u128) -> Result<u128> {
        let trove = self.active_mut(owner)?;
        trove.coll = safe_add(trove.coll, amount)?;
        Ok(trove.coll)
    }

    /// Remove collateral from an active trove. Returns the new collateral.
    pub fn decrease_coll(&mut self, owner: &Address, amount: u128) -> Result<u128> {
        let trove = self.active_mut(owner)?;
        trove.coll = trove.coll.checked_sub(amount).ok_or(Error::InsufficientCollateral {
            requested: amount,
            available: trove.coll,
        })?;
        Ok(trove.coll)
    }

    /// Add debt to an active trove. Returns the new debt.
    pub fn increase_debt(&mut self, owner: &Address, amount: u128) -> Result<u128> {
        let trove = self.active_mut(owner)?;
        trove.debt = safe_add(trove.debt, amount)?;
        Ok(trove.debt)
    }

    /// Remove debt from an active trove. Returns the new debt.
    pub fn decrease_debt(&mut self, owner: &Address, amount: u128) -> Result<u128> {
        let trove = self.active_mut(owner)?;
        trove.debt = safe_sub(trove.debt, amount)?;
        Ok(trove.debt)
    }

    /// Overwrite the balances of an active trove
    pub fn set_coll_and_debt(&mut self, owner: &Address, coll: u128, debt: u128) -> Result<()> {
        let trove = self.active_mut(owner)?;
        trove.coll = coll;
        trove.debt = debt;
        Ok(())
    }

    fn active_mut(&mut self, owner: &Address) -> Result<&mut Trove> {
        self.troves
            .get_mut(owner)
            .filter(|t| t.is_active())
            .ok_or_else(|| Error::TroveNotFound(owner.to_hex()))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INVARIANTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Check structural invariants: non-active troves hold nothing, the owners
    /// array and stored indices agree, and stakes sum to the total.
    pub fn verify_invariants(&self) -> Result<()> {
        let mut stake_sum = 0u128;
        let mut active = 0usize;
        for (owner, trove) in &self.troves {
            if trove.is_active() {
                active += 1;
                stake_sum = safe_add(stake_sum, trove.stake)?;
                if self.owners.get(trove.array_index) != Some(owner) {
                    return Err(Error::InvariantViolation(format!(
                        "trove {} has stale array index {}",
                        owner, trove.array_index
                    )));
                }
            } else if trove.coll != 0 || trove.debt != 0 || trove.stake != 0 {
                return Err(Error::InvariantViolation(format!(
                    "inactive trove {} still holds balances",
                    owner
                )));
            }
        }
        if active != self.owners.len() {
            return Err(Error::InvariantViolation("owners array length mismatch".into()));
        }
        if stake_sum != self.total_stakes {
            return Err(Error::InvariantViolation(format!(
                "stakes sum {} != total stakes {}",
                stake_sum, self.total_stakes
            )));
        }
        Ok(())
    }
}

impl NominalIcrSource for TroveManager {
    fn nominal_icr(&self, id: &Address) -> u128 {
        TroveManager::nominal_icr(self, id).unwrap_or(0)
    }
}
