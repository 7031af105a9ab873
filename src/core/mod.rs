//! Core modules for the trove engine.
//!
//! This module contains the fundamental building blocks:
//! - Configuration and protocol parameters
//! - Debt token interface and balances
//! - Active, default and surplus pools
//! - Base rate and fee computation
//! - Trove records, stakes and redistribution
//! - ICR-sorted trove index
//! - Ledger state and borrower operations

pub mod borrower;
pub mod config;
pub mod fees;
pub mod ledger;
pub mod pools;
pub mod sorted_troves;
pub mod token;
pub mod trove;

pub use borrower::{TroveAdjustment, TroveChange};
pub use config::*;
pub use fees::*;
pub use ledger::*;
pub use pools::*;
pub use sorted_troves::*;
pub use token::*;
pub use trove::*;
