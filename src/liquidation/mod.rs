//! Liquidation module for the trove engine.
//!
//! This module handles liquidations and the stability pool:
//! - Liquidation engine for undercollateralized troves
//! - Stability pool for absorbing liquidated debt
//! - Redistribution of what the pool cannot absorb
//! - Recovery mode and per-trove path selection

pub mod engine;
pub mod recovery;
pub mod stability_pool;

pub use engine::*;
pub use recovery::*;
pub use stability_pool::*;
