//! System mode and liquidation path selection.
//!
//! The system is in Recovery Mode while its total collateral ratio (TCR) is
//! below the critical ratio (CCR, 150% by default). The mode decides which
//! troves may be liquidated and how:
//!
//! | Mode     | Trove ICR                 | Path                        |
//! |----------|---------------------------|-----------------------------|
//! | Normal   | `< MCR`                   | offset, then redistribute   |
//! | Recovery | `< 100%`                  | redistribute only           |
//! | Recovery | `100% ..< MCR`            | offset, then redistribute   |
//! | Recovery | `MCR ..< TCR`, pool covers | offset capped at MCR, surplus to owner |
//! | any      | otherwise                 | skip                        |

use serde::{Deserialize, Serialize};

use crate::core::config::ProtocolParams;
use crate::utils::constants::ONE_HUNDRED_PERCENT;
use crate::utils::math::compute_cr;

// ═══════════════════════════════════════════════════════════════════════════════
// SYSTEM MODE
// ═══════════════════════════════════════════════════════════════════════════════

/// System-wide operating mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemMode {
    /// TCR at or above CCR
    #[default]
    Normal,
    /// TCR below CCR
    Recovery,
}

impl SystemMode {
    /// Mode for a given TCR
    pub fn from_tcr(tcr: u128, ccr: u128) -> Self {
        if tcr < ccr {
            SystemMode::Recovery
        } else {
            SystemMode::Normal
        }
    }

    /// Whether this is Recovery Mode
    pub fn is_recovery(&self) -> bool {
        matches!(self, SystemMode::Recovery)
    }

    /// Get mode name
    pub fn name(&self) -> &'static str {
        match self {
            SystemMode::Normal => "Normal",
            SystemMode::Recovery => "Recovery",
        }
    }
}

/// Aggregate collateralization of the system at a price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemHealth {
    /// Operating mode
    pub mode: SystemMode,
    /// Total collateral ratio
    pub tcr: u128,
    /// Collateral in active and default pools
    pub total_coll: u128,
    /// Debt in active and default pools
    pub total_debt: u128,
    /// Price used
    pub price: u128,
}

impl SystemHealth {
    /// Evaluate system health from totals
    pub fn compute(total_coll: u128, total_debt: u128, price: u128, params: &ProtocolParams) -> Self {
        let tcr = compute_cr(total_coll, total_debt, price);
        Self {
            mode: SystemMode::from_tcr(tcr, params.ccr),
            tcr,
            total_coll,
            total_debt,
            price,
        }
    }

    /// Whether the system is in Recovery Mode
    pub fn is_recovery_mode(&self) -> bool {
        self.mode.is_recovery()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION PATH
// ═══════════════════════════════════════════════════════════════════════════════

/// How a single trove is liquidated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiquidationPath {
    /// Offset against the Stability Pool, redistribute any remainder
    OffsetPool,
    /// Redistribute everything to other troves
    RedistributeOnly,
    /// Offset fully against the pool, collateral capped at MCR, rest to surplus
    CappedOffsetWithSurplus,
    /// Not liquidated
    Skip,
}

impl LiquidationPath {
    /// Get path name
    pub fn name(&self) -> &'static str {
        match self {
            LiquidationPath::OffsetPool => "OffsetPool",
            LiquidationPath::RedistributeOnly => "RedistributeOnly",
            LiquidationPath::CappedOffsetWithSurplus => "CappedOffsetWithSurplus",
            LiquidationPath::Skip => "Skip",
        }
    }
}

/// Inputs that decide a trove's liquidation path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathInputs {
    /// Mode in force for this trove
    pub mode: SystemMode,
    /// Trove ICR including pending rewards
    pub icr: u128,
    /// Trove debt including pending rewards
    pub debt: u128,
    /// TCR before this trove is liquidated
    pub tcr: u128,
    /// Pool deposits not yet committed to earlier troves of the same pass
    pub pool_remaining: u128,
    /// Active troves in the system
    pub trove_count: usize,
}

/// Select the liquidation path of one trove
pub fn select_liquidation_path(inputs: &PathInputs, params: &ProtocolParams) -> LiquidationPath {
    match inputs.mode {
        SystemMode::Normal => {
            if inputs.icr < params.mcr {
                LiquidationPath::OffsetPool
            } else {
                LiquidationPath::Skip
            }
        }
        SystemMode::Recovery => {
            if inputs.trove_count <= 1 {
                LiquidationPath::Skip
            } else if inputs.icr < ONE_HUNDRED_PERCENT {
                LiquidationPath::RedistributeOnly
            } else if inputs.icr < params.mcr {
                LiquidationPath::OffsetPool
            } else if inputs.icr < inputs.tcr && inputs.debt <= inputs.pool_remaining {
                LiquidationPath::CappedOffsetWithSurplus
            } else {
                LiquidationPath::Skip
            }
        }
    }
}
