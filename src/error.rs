//! Error types for the trove engine.
//!
//! Every error aborts the enclosing operation and the state machine restores
//! the pre-call state, so there is no recoverable/fatal split. Each variant is
//! classified into one `ErrorKind` for callers that only care about the class.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for trove engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Position, deposit or surplus does not exist or is already closed
    NotFound,
    /// No position in scope qualifies for the operation
    NothingEligible,
    /// Zero, inconsistent or excessive amount
    InvalidAmount,
    /// A collateral ratio, debt floor or post-state violates a protocol minimum
    BelowMinimum,
    /// Redemption fee above the caller's tolerance
    FeeExceedsTolerance,
    /// Redemption fee would consume all returned collateral
    FeeConsumesAllValue,
    /// Redemption blocked while TCR is below MCR
    SystemBelowMinimumRatio,
    /// Offset larger than the stability pool holds
    PoolInsufficient,
    /// Operation not allowed in the current system state
    InvalidState,
    /// Arithmetic, serialization, configuration or invariant failure
    Internal,
}

/// Main error type for the trove engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Trove Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Trove does not exist or is not active
    #[error("Trove not found or not active: {0}")]
    TroveNotFound(String),

    /// Trove is already active
    #[error("Trove already active: {0}")]
    TroveAlreadyActive(String),

    /// Collateral ratio below the required minimum
    #[error("Collateral ratio {current} below minimum {minimum}")]
    CollateralRatioTooLow {
        /// Resulting ratio (18 decimals)
        current: u128,
        /// Required ratio (18 decimals)
        minimum: u128,
    },

    /// Operation would push the system TCR below CCR
    #[error("Total collateral ratio {tcr} would fall below critical ratio {ccr}")]
    TcrBelowCritical {
        /// Resulting TCR (18 decimals)
        tcr: u128,
        /// Critical collateral ratio (18 decimals)
        ccr: u128,
    },

    /// Net debt below the protocol floor
    #[error("Net debt {net_debt} below minimum {minimum}")]
    NetDebtBelowMinimum {
        /// Resulting net debt
        net_debt: u128,
        /// Minimum net debt
        minimum: u128,
    },

    /// Repayment would eat into the gas reserve
    #[error("Repayment {repayment} exceeds repayable debt {max}")]
    RepaymentExceedsDebt {
        /// Requested repayment
        repayment: u128,
        /// Largest allowed repayment
        max: u128,
    },

    /// Collateral withdrawal larger than the trove holds
    #[error("Insufficient collateral: requested {requested}, available {available}")]
    InsufficientCollateral {
        /// Requested withdrawal
        requested: u128,
        /// Collateral in the trove
        available: u128,
    },

    /// Adjustment both adds and withdraws collateral
    #[error("Cannot add and withdraw collateral in one adjustment")]
    CollateralChangeConflict,

    /// Adjustment changes nothing
    #[error("Adjustment must change collateral or debt")]
    NoAdjustment,

    /// The last trove in the system cannot be closed
    #[error("Only one trove in the system")]
    OnlyOneTroveInSystem,

    /// Operation forbidden while the system is in Recovery Mode
    #[error("Not allowed in recovery mode: {0}")]
    RecoveryModeRestriction(String),

    /// Debt-token balance too small
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Required amount
        required: u128,
        /// Available amount
        available: u128,
    },

    /// No surplus collateral owed to this owner
    #[error("No collateral available to claim for {0}")]
    NoSurplusToClaim(String),

    // ═══════════════════════════════════════════════════════════════════
    // Liquidation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// No trove in scope is eligible
    #[error("Nothing to liquidate")]
    NothingToLiquidate,

    /// Batch liquidation called with an empty list
    #[error("Trove array must not be empty")]
    EmptyTroveArray,

    // ═══════════════════════════════════════════════════════════════════
    // Stability Pool Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Depositor has no active deposit
    #[error("No stability pool deposit for {0}")]
    DepositNotFound(String),

    /// Offset exceeds the pool's deposits
    #[error("Stability pool insufficient: requested {requested}, available {available}")]
    PoolInsufficient {
        /// Debt requested to offset
        requested: u128,
        /// Total deposits in the pool
        available: u128,
    },

    /// Withdrawal blocked while a trove sits below MCR
    #[error("Cannot withdraw while there are troves with ICR < MCR")]
    UndercollateralizedTroves,

    /// Depositor has no collateral gain to move
    #[error("Depositor {0} has no collateral gain")]
    NoCollateralGain(String),

    // ═══════════════════════════════════════════════════════════════════
    // Redemption & Fee Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Redemptions are blocked while TCR < MCR
    #[error("Cannot redeem when TCR {tcr} < MCR {mcr}")]
    SystemBelowMinimumRatio {
        /// Current TCR
        tcr: u128,
        /// Minimum collateral ratio
        mcr: u128,
    },

    /// Redemption reached no trove
    #[error("Unable to redeem any amount")]
    NothingRedeemed,

    /// Fee above the caller's tolerance
    #[error("Fee {fee_percentage} exceeds provided maximum {max_fee_percentage}")]
    FeeExceedsTolerance {
        /// Effective fee percentage (18 decimals)
        fee_percentage: u128,
        /// Caller's maximum (18 decimals)
        max_fee_percentage: u128,
    },

    /// Fee would eat all of the redeemed collateral
    #[error("Fee {fee} would eat up all returned collateral {collateral_drawn}")]
    FeeConsumesAllValue {
        /// Computed fee
        fee: u128,
        /// Collateral drawn
        collateral_drawn: u128,
    },

    /// Max fee percentage outside the accepted range
    #[error("Max fee percentage {value} must be between {min} and {max}")]
    InvalidMaxFee {
        /// Provided value
        value: u128,
        /// Lower bound
        min: u128,
        /// Upper bound
        max: u128,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Sorted Index Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Sorted index at capacity
    #[error("Sorted list is full")]
    SortedListFull,

    /// Node already in the sorted index
    #[error("Sorted list already contains {0}")]
    NodeAlreadyExists(String),

    /// Node missing from the sorted index
    #[error("Sorted list does not contain {0}")]
    NodeNotFound(String),

    /// Nominal ICR must be positive
    #[error("Nominal ICR must be positive")]
    ZeroNominalIcr,

    // ═══════════════════════════════════════════════════════════════════
    // Oracle Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Oracle could not supply a usable price
    #[error("Price unavailable: {0}")]
    PriceUnavailable(String),

    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Amount is zero
    #[error("Amount cannot be zero")]
    ZeroAmount,

    /// Caller may not perform the operation
    #[error("Unauthorized caller: {0}")]
    Unauthorized(String),

    // ═══════════════════════════════════════════════════════════════════
    // Arithmetic Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Underflow in calculation
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    /// Division by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Invariant violation detected
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // ═══════════════════════════════════════════════════════════════════
    // Serialization & Config Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TroveNotFound(_)
            | Error::DepositNotFound(_)
            | Error::NoSurplusToClaim(_)
            | Error::NodeNotFound(_) => ErrorKind::NotFound,

            Error::NothingToLiquidate | Error::NothingRedeemed => ErrorKind::NothingEligible,

            Error::RepaymentExceedsDebt { .. }
            | Error::InsufficientCollateral { .. }
            | Error::CollateralChangeConflict
            | Error::NoAdjustment
            | Error::InsufficientBalance { .. }
            | Error::EmptyTroveArray
            | Error::NoCollateralGain(_)
            | Error::InvalidMaxFee { .. }
            | Error::ZeroNominalIcr
            | Error::InvalidParameter { .. }
            | Error::ZeroAmount => ErrorKind::InvalidAmount,

            Error::CollateralRatioTooLow { .. }
            | Error::TcrBelowCritical { .. }
            | Error::NetDebtBelowMinimum { .. } => ErrorKind::BelowMinimum,

            Error::FeeExceedsTolerance { .. } => ErrorKind::FeeExceedsTolerance,
            Error::FeeConsumesAllValue { .. } => ErrorKind::FeeConsumesAllValue,
            Error::SystemBelowMinimumRatio { .. } => ErrorKind::SystemBelowMinimumRatio,
            Error::PoolInsufficient { .. } => ErrorKind::PoolInsufficient,

            Error::TroveAlreadyActive(_)
            | Error::OnlyOneTroveInSystem
            | Error::RecoveryModeRestriction(_)
            | Error::UndercollateralizedTroves
            | Error::SortedListFull
            | Error::NodeAlreadyExists(_)
            | Error::Unauthorized(_) => ErrorKind::InvalidState,

            Error::PriceUnavailable(_)
            | Error::Overflow { .. }
            | Error::Underflow { .. }
            | Error::DivisionByZero
            | Error::InvariantViolation(_)
            | Error::Serialization(_)
            | Error::Deserialization(_)
            | Error::Config(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::InvariantViolation(_)
                | Error::Overflow { .. }
                | Error::Underflow { .. }
                | Error::DivisionByZero
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Trove errors: 1xxx
            Error::TroveNotFound(_) => 1001,
            Error::TroveAlreadyActive(_) => 1002,
            Error::CollateralRatioTooLow { .. } => 1003,
            Error::TcrBelowCritical { .. } => 1004,
            Error::NetDebtBelowMinimum { .. } => 1005,
            Error::RepaymentExceedsDebt { .. } => 1006,
            Error::InsufficientCollateral { .. } => 1007,
            Error::CollateralChangeConflict => 1008,
            Error::NoAdjustment => 1009,
            Error::OnlyOneTroveInSystem => 1010,
            Error::RecoveryModeRestriction(_) => 1011,
            Error::InsufficientBalance { .. } => 1012,
            Error::NoSurplusToClaim(_) => 1013,

            // Liquidation errors: 2xxx
            Error::NothingToLiquidate => 2001,
            Error::EmptyTroveArray => 2002,

            // Stability pool errors: 3xxx
            Error::DepositNotFound(_) => 3001,
            Error::PoolInsufficient { .. } => 3002,
            Error::UndercollateralizedTroves => 3003,
            Error::NoCollateralGain(_) => 3004,

            // Redemption and fee errors: 4xxx
            Error::SystemBelowMinimumRatio { .. } => 4001,
            Error::NothingRedeemed => 4002,
            Error::FeeExceedsTolerance { .. } => 4003,
            Error::FeeConsumesAllValue { .. } => 4004,
            Error::InvalidMaxFee { .. } => 4005,

            // Sorted index errors: 5xxx
            Error::SortedListFull => 5001,
            Error::NodeAlreadyExists(_) => 5002,
            Error::NodeNotFound(_) => 5003,
            Error::ZeroNominalIcr => 5004,

            // Oracle errors: 6xxx
            Error::PriceUnavailable(_) => 6001,

            // Validation errors: 7xxx
            Error::InvalidParameter { .. } => 7001,
            Error::ZeroAmount => 7002,
            Error::Unauthorized(_) => 7003,

            // Arithmetic errors: 8xxx
            Error::Overflow { .. } => 8001,
            Error::Underflow { .. } => 8002,
            Error::DivisionByZero => 8003,
            Error::InvariantViolation(_) => 8004,

            // Serialization and config errors: 9xxx
            Error::Serialization(_) => 9001,
            Error::Deserialization(_) => 9002,
            Error::Config(_) => 9003,
        }
    }
}
