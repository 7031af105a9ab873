//! Oracle module for the collateral price.
//!
//! The engine reads the price through the `PriceOracle` trait exactly once at
//! the start of each operation. `PriceFeed` is the settable implementation
//! used by the state machine, the simulator and tests.

pub mod price_feed;

pub use price_feed::*;
