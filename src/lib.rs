//! # Trove Engine
//!
//! Accounting core of a collateralized-debt platform: individually owned
//! leveraged positions ("troves"), liquidation in normal and recovery mode,
//! a stability pool that absorbs liquidated debt, and redemptions with a
//! decaying base-rate fee.
//!
//! ## Architecture
//!
//! The engine consists of several modules:
//!
//! - **Core**: Trove ledger, sorted index, pools, token, fees and borrower operations
//! - **Liquidation**: Liquidation engine, recovery mode and stability pool
//! - **Redemption**: Redemption engine and hint helpers
//! - **Oracle**: Price source read once per operation
//! - **Protocol**: Operations, events and the atomic state machine
//!
//! ## Design Principles
//!
//! - **Deterministic**: Integer fixed-point arithmetic and ordered maps only
//! - **Atomic**: Every operation commits fully or leaves no trace
//! - **Checked**: Overflow is an error, never a wrap
//!
//! ## Example
//!
//! ```rust,ignore
//! use trove_engine::prelude::*;
//!
//! let mut machine = ProtocolStateMachine::with_price_feed(ProtocolConfig::default(), 0)?;
//! machine.execute(owner, ProtocolOperation::OpenTrove {
//!     collateral: units(10),
//!     debt_amount: units(2_000),
//!     max_fee_percentage: DECIMAL_PRECISION,
//!     hint: InsertHint::default(),
//! })?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod core;
pub mod error;
pub mod liquidation;
pub mod oracle;
pub mod protocol;
pub mod redemption;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        borrower::{TroveAdjustment, TroveChange},
        config::{ProtocolConfig, ProtocolParams},
        ledger::{ExecutionContext, LedgerState},
        sorted_troves::InsertHint,
        token::DebtToken,
        trove::{Trove, TroveStatus},
    };
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::liquidation::{
        engine::LiquidationEngine,
        recovery::{LiquidationPath, SystemMode},
        stability_pool::StabilityPool,
    };
    pub use crate::oracle::price_feed::{PriceData, PriceFeed, PriceOracle};
    pub use crate::protocol::{
        operations::{OperationResult, ProtocolOperation},
        state_machine::ProtocolStateMachine,
    };
    pub use crate::redemption::{
        engine::{RedemptionEngine, RedemptionRequest},
        hints::HintHelpers,
    };
    pub use crate::utils::{
        constants::DECIMAL_PRECISION,
        crypto::{Address, Hash},
        math::units,
    };
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol name
pub const PROTOCOL_NAME: &str = "trove-engine";
