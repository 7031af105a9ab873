//! Debt token interface and in-memory ledger.
//!
//! The engine consumes the debt token only through the narrow `DebtToken`
//! trait (mint, burn, transfer, balance, supply). `DebtTokenLedger` is the
//! in-memory implementation carried inside the ledger state, so a rollback
//! of the state also rolls back balances.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::utils::crypto::{Address, Hash};

// ═══════════════════════════════════════════════════════════════════════════════
// DEBT TOKEN INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// Narrow interface the engine uses to move debt tokens
pub trait DebtToken {
    /// Create `amount` tokens for `to`
    fn mint(&mut self, to: Address, amount: u128) -> Result<()>;

    /// Destroy `amount` tokens held by `from`
    fn burn(&mut self, from: Address, amount: u128) -> Result<()>;

    /// Move `amount` tokens between holders
    fn transfer(&mut self, from: Address, to: Address, amount: u128) -> Result<()>;

    /// Balance of `owner`
    fn balance_of(&self, owner: &Address) -> u128;

    /// Total tokens in existence
    fn total_supply(&self) -> u128;
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Balance book for the debt token. Zero amounts are accepted and change nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtTokenLedger {
    /// Total supply
    total_supply: u128,
    /// Balances by holder
    balances: BTreeMap<Address, u128>,
}

impl DebtTokenLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of holders with a non-zero balance
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Sum of balances equals supply
    pub fn verify_supply_invariant(&self) -> bool {
        self.balances
            .values()
            .try_fold(0u128, |acc, b| acc.checked_add(*b))
            == Some(self.total_supply)
    }

    fn debit(&mut self, from: Address, amount: u128) -> Result<()> {
        let available = self.balance_of(&from);
        let remaining = available
            .checked_sub(amount)
            .ok_or(Error::InsufficientBalance {
                required: amount,
                available,
            })?;
        if remaining == 0 {
            self.balances.remove(&from);
        } else {
            self.balances.insert(from, remaining);
        }
        Ok(())
    }

    fn credit(&mut self, to: Address, amount: u128) -> Result<()> {
        let balance = self.balances.entry(to).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(Error::Overflow {
            operation: "credit balance".into(),
        })?;
        Ok(())
    }

    /// Compute state hash
    pub fn state_hash(&self) -> Hash {
        let mut data = Vec::new();
        data.extend_from_slice(&self.total_supply.to_be_bytes());
        for (holder, balance) in &self.balances {
            data.extend_from_slice(holder.as_bytes());
            data.extend_from_slice(&balance.to_be_bytes());
        }
        Hash::sha256(&data)
    }
}

impl DebtToken for DebtTokenLedger {
    fn mint(&mut self, to: Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.total_supply = self.total_supply.checked_add(amount).ok_or(Error::Overflow {
            operation: "mint total supply".into(),
        })?;
        self.credit(to, amount)
    }

    fn burn(&mut self, from: Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.debit(from, amount)?;
        self.total_supply -= amount;
        Ok(())
    }

    fn transfer(&mut self, from: Address, to: Address, amount: u128) -> Result<()> {
        if amount == 0 || from == to {
            return Ok(());
        }
        self.debit(from, amount)?;
        self.credit(to, amount)
    }

    fn balance_of(&self, owner: &Address) -> u128 {
        self.balances.get(owner).copied().unwrap_or(0)
    }

    fn total_supply(&self) -> u128 {
        self.total_supply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Address {
        Address::from_low_u64(1)
    }

    fn bob() -> Address {
        Address::from_low_u64(2)
    }

    #[test]
    fn test_mint_and_burn() {
        let mut token = DebtTokenLedger::new();

        token.mint(alice(), 1_000).unwrap();
        assert_eq!(token.balance_of(&alice()), 1_000);
        assert_eq!(token.total_supply(), 1_000);

        token.burn(alice(), 400).unwrap();
        assert_eq!(token.balance_of(&alice()), 600);
        assert_eq!(token.total_supply(), 600);
        assert!(token.verify_supply_invariant());
    }

    #[test]
    fn test_burn_insufficient_balance() {
        let mut token = DebtTokenLedger::new();
        token.mint(alice(), 100).unwrap();

        let result = token.burn(alice(), 101);
        assert_eq!(
            result,
            Err(Error::InsufficientBalance {
                required: 101,
                available: 100
            })
        );
        assert_eq!(token.total_supply(), 100);
    }

    #[test]
    fn test_transfer() {
        let mut token = DebtTokenLedger::new();
        token.mint(alice(), 100).unwrap();

        token.transfer(alice(), bob(), 100).unwrap();
        assert_eq!(token.balance_of(&alice()), 0);
        assert_eq!(token.balance_of(&bob()), 100);
        assert_eq!(token.holder_count(), 1);
        assert!(token.transfer(alice(), bob(), 1).is_err());
    }

    #[test]
    fn test_zero_amounts_are_noops() {
        let mut token = DebtTokenLedger::new();
        let before = token.state_hash();
        token.mint(alice(), 0).unwrap();
        token.burn(alice(), 0).unwrap();
        token.transfer(alice(), bob(), 0).unwrap();
        assert_eq!(token.state_hash(), before);
    }
}
