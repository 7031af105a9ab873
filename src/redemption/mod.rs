//! Redemption module for the trove engine.
//!
//! - Redemption engine exchanging debt tokens for collateral at face value
//! - Hint helpers for redemptions and sorted-list insertions

pub mod engine;
pub mod hints;

pub use engine::*;
pub use hints::*;
