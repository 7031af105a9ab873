//! Protocol operations - atomic state changes.
//!
//! Operations represent discrete actions a caller submits to the state
//! machine. Each one is executed all-or-nothing against the ledger and
//! returns an `OperationResult` describing its effect.

use serde::{Deserialize, Serialize};

use crate::core::borrower::{TroveAdjustment, TroveChange};
use crate::core::sorted_troves::InsertHint;
use crate::liquidation::engine::LiquidationTotals;
use crate::liquidation::stability_pool::DepositChange;
use crate::redemption::engine::{RedemptionOutcome, RedemptionRequest};
use crate::utils::crypto::Address;

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// All possible protocol operations. The caller is supplied separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolOperation {
    /// Open a trove for the caller
    OpenTrove {
        /// Collateral deposited
        collateral: u128,
        /// Debt tokens drawn, before fee and reserve
        debt_amount: u128,
        /// Highest borrowing rate accepted
        max_fee_percentage: u128,
        /// Sorted-list insert hint
        #[serde(default)]
        hint: InsertHint,
    },
    /// Change collateral and/or debt of the caller's trove
    AdjustTrove {
        /// Requested change
        adjustment: TroveAdjustment,
        /// Sorted-list insert hint
        #[serde(default)]
        hint: InsertHint,
    },
    /// Repay and close the caller's trove
    CloseTrove,
    /// Claim surplus collateral left after liquidation or redemption
    ClaimCollateral,
    /// Deposit debt tokens into the stability pool
    ProvideToStabilityPool {
        /// Amount deposited
        amount: u128,
    },
    /// Withdraw from the stability pool
    WithdrawFromStabilityPool {
        /// Amount requested, capped at the compounded deposit
        amount: u128,
    },
    /// Move the caller's collateral gain into their trove
    WithdrawCollateralGainToTrove {
        /// Sorted-list insert hint
        #[serde(default)]
        hint: InsertHint,
    },
    /// Distribute secondary rewards to depositors; configured issuer only
    IssueSecondaryReward {
        /// Reward amount
        amount: u128,
    },
    /// Liquidate one trove
    Liquidate {
        /// Trove owner
        borrower: Address,
    },
    /// Liquidate up to `n` troves from the bottom of the sorted list
    LiquidateTroves {
        /// Maximum troves to visit
        n: usize,
    },
    /// Liquidate an explicit list of troves
    BatchLiquidateTroves {
        /// Trove owners
        borrowers: Vec<Address>,
    },
    /// Redeem debt tokens for collateral
    RedeemCollateral(RedemptionRequest),
    /// Transfer debt tokens to another account
    Transfer {
        /// Recipient
        to: Address,
        /// Amount
        amount: u128,
    },
}

impl ProtocolOperation {
    /// Get the operation type name
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::OpenTrove { .. } => "OpenTrove",
            Self::AdjustTrove { .. } => "AdjustTrove",
            Self::CloseTrove => "CloseTrove",
            Self::ClaimCollateral => "ClaimCollateral",
            Self::ProvideToStabilityPool { .. } => "ProvideToStabilityPool",
            Self::WithdrawFromStabilityPool { .. } => "WithdrawFromStabilityPool",
            Self::WithdrawCollateralGainToTrove { .. } => "WithdrawCollateralGainToTrove",
            Self::IssueSecondaryReward { .. } => "IssueSecondaryReward",
            Self::Liquidate { .. } => "Liquidate",
            Self::LiquidateTroves { .. } => "LiquidateTroves",
            Self::BatchLiquidateTroves { .. } => "BatchLiquidateTroves",
            Self::RedeemCollateral(_) => "RedeemCollateral",
            Self::Transfer { .. } => "Transfer",
        }
    }

    /// Whether the operation can liquidate troves
    pub fn is_liquidation(&self) -> bool {
        matches!(
            self,
            Self::Liquidate { .. } | Self::LiquidateTroves { .. } | Self::BatchLiquidateTroves { .. }
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATION RESULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of any protocol operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResult {
    /// Trove opened or adjusted
    TroveChanged(TroveChange),
    /// Trove closed, collateral returned
    TroveClosed {
        /// Collateral returned to the owner
        collateral_returned: u128,
    },
    /// Surplus collateral claimed
    CollateralClaimed {
        /// Amount claimed
        amount: u128,
    },
    /// Stability deposit changed
    Deposit(DepositChange),
    /// Secondary reward issued
    SecondaryRewardIssued {
        /// Reward per unit deposited
        per_unit_staked: u128,
    },
    /// Troves liquidated
    Liquidation(LiquidationTotals),
    /// Collateral redeemed
    Redemption(RedemptionOutcome),
    /// Tokens transferred
    Transfer {
        /// Amount moved
        amount: u128,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
