//! Collateral ledgers.
//!
//! - `ActivePool`: collateral and debt of active troves
//! - `DefaultPool`: redistributed collateral and debt not yet applied to troves
//! - `CollSurplusPool`: collateral owed back to owners after capped liquidations
//!   and full redemptions
//! - `SecondaryRewardPool`: secondary reward funded by the issuer and credited
//!   to stability depositors

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::utils::crypto::Address;
use crate::utils::math::{safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// ACTIVE / DEFAULT POOLS
// ═══════════════════════════════════════════════════════════════════════════════

/// Aggregate collateral and debt balance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolBalances {
    /// Collateral held
    coll: u128,
    /// Debt recorded
    debt: u128,
}

/// Balances of active troves
pub type ActivePool = PoolBalances;

/// Balances awaiting redistribution to troves
pub type DefaultPool = PoolBalances;

impl PoolBalances {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Collateral held
    pub fn coll(&self) -> u128 {
        self.coll
    }

    /// Debt recorded
    pub fn debt(&self) -> u128 {
        self.debt
    }

    /// Record additional debt
    pub fn increase_debt(&mut self, amount: u128) -> Result<()> {
        self.debt = safe_add(self.debt, amount)?;
        Ok(())
    }

    /// Remove debt
    pub fn decrease_debt(&mut self, amount: u128) -> Result<()> {
        self.debt = safe_sub(self.debt, amount)?;
        Ok(())
    }

    /// Take in collateral
    pub fn receive_coll(&mut self, amount: u128) -> Result<()> {
        self.coll = safe_add(self.coll, amount)?;
        Ok(())
    }

    /// Release collateral, returning the amount sent
    pub fn send_coll(&mut self, amount: u128) -> Result<u128> {
        self.coll = self.coll.checked_sub(amount).ok_or(Error::InsufficientCollateral {
            requested: amount,
            available: self.coll,
        })?;
        Ok(amount)
    }

    /// Move collateral and debt into another pool
    pub fn transfer_to(&mut self, other: &mut PoolBalances, coll: u128, debt: u128) -> Result<()> {
        self.send_coll(coll)?;
        self.decrease_debt(debt)?;
        other.receive_coll(coll)?;
        other.increase_debt(debt)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL SURPLUS POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Surplus collateral claimable by former trove owners
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollSurplusPool {
    /// Collateral held
    coll: u128,
    /// Claimable amount per owner
    balances: BTreeMap<Address, u128>,
}

impl CollSurplusPool {
    /// Create an empty surplus pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Collateral held
    pub fn coll(&self) -> u128 {
        self.coll
    }

    /// Claimable surplus of `owner`
    pub fn balance_of(&self, owner: &Address) -> u128 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    /// Take in collateral backing accounted surplus
    pub fn receive_coll(&mut self, amount: u128) -> Result<()> {
        self.coll = safe_add(self.coll, amount)?;
        Ok(())
    }

    /// Credit `amount` of surplus to `owner`
    pub fn account_surplus(&mut self, owner: Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let balance = self.balances.entry(owner).or_insert(0);
        *balance = safe_add(*balance, amount)?;
        Ok(())
    }

    /// Release the full surplus owed to `owner`
    pub fn claim_coll(&mut self, owner: &Address) -> Result<u128> {
        let amount = self
            .balances
            .remove(owner)
            .ok_or_else(|| Error::NoSurplusToClaim(owner.to_hex()))?;
        self.coll = safe_sub(self.coll, amount)?;
        Ok(amount)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SECONDARY REWARD POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Secondary reward issued to the stability pool and credited to depositors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryRewardPool {
    /// Reward funded by the issuer
    issued: u128,
    /// Reward credited to depositors
    credited: u128,
    /// Credited reward per depositor
    balances: BTreeMap<Address, u128>,
}

impl SecondaryRewardPool {
    /// Create an empty reward pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Reward funded so far
    pub fn issued(&self) -> u128 {
        self.issued
    }

    /// Reward credited so far
    pub fn credited(&self) -> u128 {
        self.credited
    }

    /// Funded reward not yet credited to anyone
    pub fn undistributed(&self) -> u128 {
        self.issued.saturating_sub(self.credited)
    }

    /// Reward credited to `depositor`
    pub fn balance_of(&self, depositor: &Address) -> u128 {
        self.balances.get(depositor).copied().unwrap_or(0)
    }

    /// Back `amount` of newly issued reward
    pub fn fund(&mut self, amount: u128) -> Result<()> {
        self.issued = safe_add(self.issued, amount)?;
        Ok(())
    }

    /// Credit `amount` to `depositor`; never more than was funded
    pub fn credit(&mut self, depositor: Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let credited = safe_add(self.credited, amount)?;
        if credited > self.issued {
            return Err(Error::InvariantViolation(format!(
                "secondary reward credited {} exceeds issued {}",
                credited, self.issued
            )));
        }
        self.credited = credited;
        let balance = self.balances.entry(depositor).or_insert(0);
        *balance = safe_add(*balance, amount)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_balances() {
        let mut pool = ActivePool::new();
        pool.receive_coll(100).unwrap();
        pool.increase_debt(50).unwrap();

        assert_eq!(pool.send_coll(40).unwrap(), 40);
        assert_eq!(pool.coll(), 60);
        assert!(matches!(
            pool.send_coll(61),
            Err(Error::InsufficientCollateral { requested: 61, available: 60 })
        ));
        assert!(pool.decrease_debt(51).is_err());
    }

    #[test]
    fn test_transfer_between_pools() {
        let mut active = ActivePool::new();
        let mut default = DefaultPool::new();
        active.receive_coll(100).unwrap();
        active.increase_debt(80).unwrap();

        active.transfer_to(&mut default, 30, 20).unwrap();
        assert_eq!((active.coll(), active.debt()), (70, 60));
        assert_eq!((default.coll(), default.debt()), (30, 20));
    }

    #[test]
    fn test_surplus_claim() {
        let owner = Address::from_low_u64(9);
        let mut surplus = CollSurplusPool::new();

        surplus.receive_coll(25).unwrap();
        surplus.account_surplus(owner, 25).unwrap();
        assert_eq!(surplus.balance_of(&owner), 25);

        assert_eq!(surplus.claim_coll(&owner).unwrap(), 25);
        assert_eq!(surplus.coll(), 0);
        assert!(matches!(surplus.claim_coll(&owner), Err(Error::NoSurplusToClaim(_))));
    }

    #[test]
    fn test_secondary_reward_credit_bounded_by_funding() {
        let depositor = Address::from_low_u64(4);
        let mut rewards = SecondaryRewardPool::new();

        rewards.fund(100).unwrap();
        rewards.credit(depositor, 60).unwrap();
        rewards.credit(depositor, 0).unwrap();
        assert_eq!(rewards.balance_of(&depositor), 60);
        assert_eq!(rewards.undistributed(), 40);

        assert!(matches!(
            rewards.credit(depositor, 41),
            Err(Error::InvariantViolation(_))
        ));
        assert_eq!(rewards.credited(), 60);
    }
}
