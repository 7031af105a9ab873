//! Protocol configuration and parameters.
//!
//! This module defines all tunable parameters of the engine:
//! - `ProtocolParams`: ratios, debt floors, fee floors and decay constants
//! - `ProtocolConfig`: params plus deployment settings, loadable from JSON
//!   with `TROVE_*` environment overrides

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::crypto::Address;

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol parameters, all 18-decimal fixed point unless noted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Minimum collateral ratio (MCR)
    /// Below this, troves can be liquidated in Normal Mode
    pub mcr: u128,

    /// Critical collateral ratio (CCR)
    /// When system TCR falls below this, Recovery Mode activates
    pub ccr: u128,

    /// Flat debt-token reserve added to every trove and paid to liquidators
    pub gas_compensation: u128,

    /// Minimum net debt per trove (excluding the gas reserve)
    pub min_net_debt: u128,

    /// Divisor for the collateral compensation share (200 = 0.5%)
    pub percent_divisor: u128,

    /// Floor of the borrowing rate
    pub borrowing_fee_floor: u128,

    /// Cap of the borrowing rate
    pub max_borrowing_fee: u128,

    /// Floor of the redemption rate
    pub redemption_fee_floor: u128,

    /// Per-minute base-rate decay factor
    pub minute_decay_factor: u128,

    /// Divisor applied to the redeemed fraction when raising the base rate (plain integer)
    pub beta: u128,

    /// Capacity of the sorted trove index (plain integer)
    pub max_sorted_size: usize,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            mcr: MIN_COLLATERAL_RATIO,
            ccr: CRITICAL_COLLATERAL_RATIO,
            gas_compensation: GAS_COMPENSATION,
            min_net_debt: MIN_NET_DEBT,
            percent_divisor: PERCENT_DIVISOR,
            borrowing_fee_floor: BORROWING_FEE_FLOOR,
            max_borrowing_fee: MAX_BORROWING_FEE,
            redemption_fee_floor: REDEMPTION_FEE_FLOOR,
            minute_decay_factor: MINUTE_DECAY_FACTOR,
            beta: BETA,
            max_sorted_size: DEFAULT_MAX_SORTED_SIZE,
        }
    }
}

impl ProtocolParams {
    /// Override MCR and CCR
    pub fn with_ratios(mut self, mcr: u128, ccr: u128) -> Self {
        self.mcr = mcr;
        self.ccr = ccr;
        self
    }

    /// Override the borrowing fee floor and cap
    pub fn with_borrowing_fee(mut self, floor: u128, max: u128) -> Self {
        self.borrowing_fee_floor = floor;
        self.max_borrowing_fee = max;
        self
    }

    /// Override the redemption fee floor
    pub fn with_redemption_fee_floor(mut self, floor: u128) -> Self {
        self.redemption_fee_floor = floor;
        self
    }

    /// Override the gas reserve and minimum net debt
    pub fn with_debt_limits(mut self, gas_compensation: u128, min_net_debt: u128) -> Self {
        self.gas_compensation = gas_compensation;
        self.min_net_debt = min_net_debt;
        self
    }

    /// Override the sorted index capacity
    pub fn with_max_sorted_size(mut self, size: usize) -> Self {
        self.max_sorted_size = size;
        self
    }

    /// Smallest composite debt a trove can carry
    pub fn min_composite_debt(&self) -> u128 {
        self.min_net_debt.saturating_add(self.gas_compensation)
    }

    /// Validate parameters are consistent
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| Err(Error::Config(reason.to_string()));

        if self.mcr <= ONE_HUNDRED_PERCENT {
            return fail("mcr must exceed 100%");
        }
        if self.ccr <= self.mcr {
            return fail("ccr must exceed mcr");
        }
        if self.percent_divisor == 0 {
            return fail("percent_divisor must be positive");
        }
        if self.borrowing_fee_floor > self.max_borrowing_fee || self.max_borrowing_fee > DECIMAL_PRECISION {
            return fail("borrowing fee floor must not exceed its cap, cap must not exceed 100%");
        }
        if self.redemption_fee_floor > DECIMAL_PRECISION {
            return fail("redemption fee floor must not exceed 100%");
        }
        if self.minute_decay_factor == 0 || self.minute_decay_factor >= DECIMAL_PRECISION {
            return fail("minute_decay_factor must lie strictly between 0 and 1");
        }
        if self.beta == 0 {
            return fail("beta must be positive");
        }
        if self.max_sorted_size == 0 {
            return fail("max_sorted_size must be positive");
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Deployment configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Protocol parameters
    pub params: ProtocolParams,

    /// Recipient of redemption fees and borrowing fees
    pub fee_recipient: Address,

    /// Initial oracle price used by the simulator
    pub initial_price: u128,

    /// Only account allowed to issue the stability pool's secondary reward
    #[serde(default = "default_secondary_issuer")]
    pub secondary_issuer: Address,
}

fn default_secondary_issuer() -> Address {
    Address::new([0xfb; ADDRESS_LENGTH])
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            params: ProtocolParams::default(),
            fee_recipient: Address::new([0xfc; ADDRESS_LENGTH]),
            initial_price: 200 * DECIMAL_PRECISION,
            secondary_issuer: default_secondary_issuer(),
        }
    }
}

impl ProtocolConfig {
    /// Create a new protocol configuration
    pub fn new(params: ProtocolParams) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.params.validate()?;
        Ok(config)
    }

    /// Save to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Config(e.to_string()))?;
        }

        std::fs::write(path, content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply `TROVE_*` environment overrides on top of this configuration
    pub fn with_env_overrides(mut self) -> Result<Self> {
        fn parse_u128(key: &str) -> Result<Option<u128>> {
            match std::env::var(key) {
                Ok(raw) => raw
                    .parse()
                    .map(Some)
                    .map_err(|e| Error::Config(format!("{}: {}", key, e))),
                Err(_) => Ok(None),
            }
        }

        if let Some(mcr) = parse_u128("TROVE_MCR")? {
            self.params.mcr = mcr;
        }
        if let Some(ccr) = parse_u128("TROVE_CCR")? {
            self.params.ccr = ccr;
        }
        if let Some(price) = parse_u128("TROVE_INITIAL_PRICE")? {
            self.initial_price = price;
        }
        if let Ok(recipient) = std::env::var("TROVE_FEE_RECIPIENT") {
            self.fee_recipient = Address::from_hex(&recipient)?;
        }
        if let Ok(issuer) = std::env::var("TROVE_SECONDARY_ISSUER") {
            self.secondary_issuer = Address::from_hex(&issuer)?;
        }

        self.params.validate()?;
        Ok(self)
    }
}
