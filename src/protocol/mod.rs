//! Protocol module - Core state machine and orchestration.
//!
//! This module provides the state machine that runs every ledger
//! operation atomically, together with the operation and event types.

pub mod events;
pub mod operations;
pub mod state_machine;

pub use events::*;
pub use operations::*;
pub use state_machine::*;
