//! Price feed implementation.
//!
//! This module provides the price source consumed by the engine:
//! - `PriceOracle`, the read-only interface queried once per operation
//! - `PriceFeed`, a settable feed with deviation checks and history

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::crypto::Hash;
use crate::utils::math::{abs_diff, mul_div};

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// Source of the collateral price, in debt units per collateral unit (18 decimals)
pub trait PriceOracle {
    /// Price usable at `now`
    fn price(&self, now: u64) -> Result<u128>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE DATA
// ═══════════════════════════════════════════════════════════════════════════════

/// A single price data point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceData {
    /// Price (18 decimals)
    pub price: u128,
    /// Unix timestamp when price was recorded
    pub timestamp: u64,
}

impl PriceData {
    /// Create a new price data point
    pub fn new(price: u128, timestamp: u64) -> Self {
        Self { price, timestamp }
    }

    /// Check if price is fresh
    pub fn is_fresh(&self, current_time: u64, max_age: u64) -> bool {
        current_time.saturating_sub(self.timestamp) <= max_age
    }

    /// Get age of price in seconds
    pub fn age(&self, current_time: u64) -> u64 {
        current_time.saturating_sub(self.timestamp)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE FEED
// ═══════════════════════════════════════════════════════════════════════════════

/// Settable collateral price feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFeed {
    /// Current price
    current: PriceData,
    /// Previous price (for change detection)
    previous: PriceData,
    /// Price history (for TWAP calculations)
    history: Vec<PriceData>,
    /// Maximum history size
    max_history: usize,
    /// Maximum price staleness in seconds, unchecked when `None`
    max_staleness: Option<u64>,
    /// Maximum allowed deviation between validated updates
    max_deviation_bps: u128,
}

impl Default for PriceFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceFeed {
    /// Create a feed with no price
    pub fn new() -> Self {
        Self {
            current: PriceData::default(),
            previous: PriceData::default(),
            history: Vec::new(),
            max_history: 100,
            max_staleness: None,
            max_deviation_bps: MAX_PRICE_DEVIATION_BPS,
        }
    }

    /// Create a feed holding `price` from `timestamp`
    pub fn fixed(price: u128, timestamp: u64) -> Self {
        let mut feed = Self::new();
        feed.force_update(PriceData::new(price, timestamp));
        feed
    }

    /// Create with custom limits
    pub fn with_params(max_staleness: Option<u64>, max_deviation_bps: u128) -> Self {
        Self {
            max_staleness,
            max_deviation_bps,
            ..Self::new()
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PRICE UPDATES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Update price with validation
    pub fn update(&mut self, price: PriceData) -> Result<()> {
        if price.price == 0 {
            return Err(Error::PriceUnavailable("price must be positive".into()));
        }

        if self.current.timestamp > 0 && price.timestamp < self.current.timestamp {
            return Err(Error::InvalidParameter {
                name: "timestamp".into(),
                reason: "price timestamp is older than current".into(),
            });
        }

        if self.current.price > 0 {
            let deviation = self.deviation_bps(self.current.price, price.price)?;
            if deviation > self.max_deviation_bps {
                return Err(Error::PriceUnavailable(format!(
                    "price moved {} bps, limit {}",
                    deviation, self.max_deviation_bps
                )));
            }
        }

        self.force_update(price);
        Ok(())
    }

    /// Set the price without checks
    pub fn force_update(&mut self, price: PriceData) {
        self.previous = self.current;
        self.current = price;
        self.history.push(price);
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Get current price
    pub fn current_price(&self) -> &PriceData {
        &self.current
    }

    /// Get previous price
    pub fn previous_price(&self) -> &PriceData {
        &self.previous
    }

    /// Average of the recorded prices no older than `period_secs`
    pub fn twap(&self, period_secs: u64, current_time: u64) -> Option<u128> {
        let cutoff = current_time.saturating_sub(period_secs);
        let relevant: Vec<u128> = self
            .history
            .iter()
            .filter(|p| p.timestamp >= cutoff)
            .map(|p| p.price)
            .collect();

        if relevant.is_empty() {
            return None;
        }
        let sum = relevant.iter().try_fold(0u128, |acc, p| acc.checked_add(*p))?;
        Some(sum / relevant.len() as u128)
    }

    /// Get price change in basis points, negative for a drop
    pub fn price_change_bps(&self) -> i128 {
        if self.previous.price == 0 {
            return 0;
        }
        let change = self
            .deviation_bps(self.previous.price, self.current.price)
            .unwrap_or(0) as i128;
        if self.current.price < self.previous.price {
            -change
        } else {
            change
        }
    }

    fn deviation_bps(&self, old_price: u128, new_price: u128) -> Result<u128> {
        mul_div(abs_diff(old_price, new_price), BPS_DIVISOR, old_price)
    }

    /// Compute state hash
    pub fn state_hash(&self) -> Hash {
        let mut data = Vec::new();
        data.extend_from_slice(&self.current.price.to_be_bytes());
        data.extend_from_slice(&self.current.timestamp.to_be_bytes());
        Hash::sha256(&data)
    }
}

impl PriceOracle for PriceFeed {
    fn price(&self, now: u64) -> Result<u128> {
        if self.current.price == 0 {
            return Err(Error::PriceUnavailable("no price available".into()));
        }
        if let Some(max_age) = self.max_staleness {
            if !self.current.is_fresh(now, max_age) {
                return Err(Error::PriceUnavailable(format!(
                    "price is {}s old, limit {}s",
                    self.current.age(now),
                    max_age
                )));
            }
        }
        Ok(self.current.price)
    }
}
