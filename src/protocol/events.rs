//! Protocol events for state change notifications.
//!
//! Events are appended to the ledger's log by every successful operation, in
//! the order the changes happen. A failed operation leaves no events behind.

use serde::{Deserialize, Serialize};

use crate::liquidation::recovery::LiquidationPath;
use crate::utils::crypto::{Address, Hash};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Operation that caused a trove update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TroveOperation {
    /// Trove opened
    Open,
    /// Collateral or debt changed by the owner
    Adjust,
    /// Trove closed by the owner
    Close,
    /// Pending redistribution rewards applied
    ApplyPendingRewards,
    /// Liquidated in Normal Mode
    LiquidateInNormalMode,
    /// Liquidated in Recovery Mode
    LiquidateInRecoveryMode,
    /// Partially or fully redeemed against
    RedeemCollateral,
}

/// All protocol event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    // Trove Events
    /// Trove values changed
    TroveUpdated(TroveUpdatedEvent),
    /// Borrowing fee charged
    BorrowingFeePaid(BorrowingFeePaidEvent),
    /// Single trove liquidated
    TroveLiquidated(TroveLiquidatedEvent),
    /// Summary of one liquidation call
    Liquidation(LiquidationEvent),
    /// Redistribution accumulators changed
    LTermsUpdated(LTermsUpdatedEvent),
    /// Surplus collateral claimed
    SurplusClaimed(SurplusClaimedEvent),
    /// Collateral left the system
    CollateralSent(CollateralSentEvent),

    // Token Events
    /// Debt tokens transferred between holders
    TokenTransfer(TokenTransferEvent),

    // Stability Pool Events
    /// Deposit to stability pool
    StabilityDeposit(StabilityDepositEvent),
    /// Withdrawal from stability pool
    StabilityWithdraw(StabilityWithdrawEvent),
    /// Collateral gain moved into the depositor's trove
    CollateralGainWithdrawn(CollateralGainWithdrawnEvent),
    /// Secondary reward issued to depositors
    SecondaryRewardIssued(SecondaryRewardIssuedEvent),
    /// Running product changed after an offset
    ProductUpdated(ProductUpdatedEvent),

    // Redemption Events
    /// Debt tokens redeemed for collateral
    Redemption(RedemptionEvent),
    /// Base rate changed
    BaseRateUpdated(BaseRateUpdatedEvent),

    // Protocol Events
    /// Recovery mode entered
    RecoveryModeEntered(RecoveryModeEvent),
    /// Recovery mode exited
    RecoveryModeExited(RecoveryModeEvent),
}

impl ProtocolEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TroveUpdated(_) => "TroveUpdated",
            Self::BorrowingFeePaid(_) => "BorrowingFeePaid",
            Self::TroveLiquidated(_) => "TroveLiquidated",
            Self::Liquidation(_) => "Liquidation",
            Self::LTermsUpdated(_) => "LTermsUpdated",
            Self::SurplusClaimed(_) => "SurplusClaimed",
            Self::CollateralSent(_) => "CollateralSent",
            Self::TokenTransfer(_) => "TokenTransfer",
            Self::StabilityDeposit(_) => "StabilityDeposit",
            Self::StabilityWithdraw(_) => "StabilityWithdraw",
            Self::CollateralGainWithdrawn(_) => "CollateralGainWithdrawn",
            Self::SecondaryRewardIssued(_) => "SecondaryRewardIssued",
            Self::ProductUpdated(_) => "ProductUpdated",
            Self::Redemption(_) => "Redemption",
            Self::BaseRateUpdated(_) => "BaseRateUpdated",
            Self::RecoveryModeEntered(_) => "RecoveryModeEntered",
            Self::RecoveryModeExited(_) => "RecoveryModeExited",
        }
    }

    /// Get the timestamp of the event
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::TroveUpdated(e) => e.timestamp,
            Self::BorrowingFeePaid(e) => e.timestamp,
            Self::TroveLiquidated(e) => e.timestamp,
            Self::Liquidation(e) => e.timestamp,
            Self::LTermsUpdated(e) => e.timestamp,
            Self::SurplusClaimed(e) => e.timestamp,
            Self::CollateralSent(e) => e.timestamp,
            Self::TokenTransfer(e) => e.timestamp,
            Self::StabilityDeposit(e) => e.timestamp,
            Self::StabilityWithdraw(e) => e.timestamp,
            Self::CollateralGainWithdrawn(e) => e.timestamp,
            Self::SecondaryRewardIssued(e) => e.timestamp,
            Self::ProductUpdated(e) => e.timestamp,
            Self::Redemption(e) => e.timestamp,
            Self::BaseRateUpdated(e) => e.timestamp,
            Self::RecoveryModeEntered(e) => e.timestamp,
            Self::RecoveryModeExited(e) => e.timestamp,
        }
    }

    /// Get the block height of the event
    pub fn block_height(&self) -> u64 {
        match self {
            Self::TroveUpdated(e) => e.block_height,
            Self::BorrowingFeePaid(e) => e.block_height,
            Self::TroveLiquidated(e) => e.block_height,
            Self::Liquidation(e) => e.block_height,
            Self::LTermsUpdated(e) => e.block_height,
            Self::SurplusClaimed(e) => e.block_height,
            Self::CollateralSent(e) => e.block_height,
            Self::TokenTransfer(e) => e.block_height,
            Self::StabilityDeposit(e) => e.block_height,
            Self::StabilityWithdraw(e) => e.block_height,
            Self::CollateralGainWithdrawn(e) => e.block_height,
            Self::SecondaryRewardIssued(e) => e.block_height,
            Self::ProductUpdated(e) => e.block_height,
            Self::Redemption(e) => e.block_height,
            Self::BaseRateUpdated(e) => e.block_height,
            Self::RecoveryModeEntered(e) => e.block_height,
            Self::RecoveryModeExited(e) => e.block_height,
        }
    }

    /// Compute event hash
    pub fn hash(&self) -> Hash {
        let data = bincode::serialize(self).unwrap_or_default();
        Hash::sha256(&data)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TROVE EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Stored trove values after a change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroveUpdatedEvent {
    /// Trove owner
    pub borrower: Address,
    /// Recorded debt
    pub debt: u128,
    /// Recorded collateral
    pub coll: u128,
    /// Stake
    pub stake: u128,
    /// Cause of the update
    pub operation: TroveOperation,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Borrowing fee charged on a debt increase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowingFeePaidEvent {
    /// Trove owner
    pub borrower: Address,
    /// Fee in debt tokens
    pub fee: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// One trove removed by liquidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroveLiquidatedEvent {
    /// Former owner
    pub borrower: Address,
    /// Debt including pending rewards
    pub debt: u128,
    /// Collateral including pending rewards
    pub coll: u128,
    /// How the trove was liquidated
    pub path: LiquidationPath,
    /// Normal or Recovery Mode liquidation
    pub operation: TroveOperation,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Totals of one liquidation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationEvent {
    /// Caller paid the gas compensation
    pub liquidator: Address,
    /// Debt removed from troves
    pub liquidated_debt: u128,
    /// Collateral moved to the pool or redistributed
    pub liquidated_coll: u128,
    /// Collateral paid to the liquidator
    pub coll_gas_compensation: u128,
    /// Debt tokens paid to the liquidator
    pub debt_gas_compensation: u128,
    /// Number of troves liquidated
    pub troves_liquidated: u32,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Redistribution accumulators after a redistribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LTermsUpdatedEvent {
    /// Collateral per unit of stake
    pub l_coll: u128,
    /// Debt per unit of stake
    pub l_debt: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Surplus collateral claimed by a former owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurplusClaimedEvent {
    /// Claimant
    pub owner: Address,
    /// Collateral claimed
    pub amount: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Collateral paid out of the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralSentEvent {
    /// Receiver
    pub recipient: Address,
    /// Collateral amount
    pub amount: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when tokens are transferred
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransferEvent {
    /// Sender
    pub from: Address,
    /// Recipient
    pub to: Address,
    /// Amount transferred
    pub amount: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STABILITY POOL EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when depositing to stability pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityDepositEvent {
    /// Depositor
    pub depositor: Address,
    /// Amount deposited
    pub amount: u128,
    /// Deposit after the operation
    pub new_deposit: u128,
    /// Collateral gain paid out
    pub collateral_gain: u128,
    /// Secondary reward credited
    pub secondary_gain: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Event emitted when withdrawing from stability pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityWithdrawEvent {
    /// Depositor
    pub depositor: Address,
    /// Amount withdrawn
    pub amount: u128,
    /// Deposit after the operation
    pub new_deposit: u128,
    /// Collateral gain paid out
    pub collateral_gain: u128,
    /// Secondary reward credited
    pub secondary_gain: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Collateral gain moved from the pool into the depositor's trove
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralGainWithdrawnEvent {
    /// Depositor
    pub depositor: Address,
    /// Collateral moved
    pub collateral_gain: u128,
    /// Deposit lost to offsets since the last snapshot
    pub debt_loss: u128,
    /// Secondary reward credited
    pub secondary_gain: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Secondary reward distributed over current deposits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryRewardIssuedEvent {
    /// Issuing account
    pub issuer: Address,
    /// Amount issued
    pub amount: u128,
    /// Reward per unit deposited
    pub per_unit_staked: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Running product after an offset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdatedEvent {
    /// Product P
    pub p: u128,
    /// Current scale
    pub scale: u64,
    /// Current epoch
    pub epoch: u64,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// REDEMPTION EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when debt tokens are redeemed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionEvent {
    /// Redeemer
    pub redeemer: Address,
    /// Amount requested
    pub attempted_amount: u128,
    /// Amount actually redeemed
    pub actual_amount: u128,
    /// Collateral sent to the redeemer
    pub coll_sent: u128,
    /// Collateral kept as fee
    pub coll_fee: u128,
    /// Troves touched
    pub troves_redeemed: u32,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// Base rate after a redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseRateUpdatedEvent {
    /// New base rate
    pub base_rate: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted for recovery mode changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryModeEvent {
    /// Total Collateralization Ratio that triggered the change
    pub tcr: u128,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Ordered record of emitted events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<ProtocolEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn push(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Events from position `start` on
    pub fn since(&self, start: usize) -> &[ProtocolEvent] {
        self.events.get(start..).unwrap_or(&[])
    }

    /// Get events of a specific type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&ProtocolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get the number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Merge another event log into this one
    pub fn merge(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Compute merkle root of all events
    pub fn merkle_root(&self) -> Hash {
        use crate::utils::crypto::merkle_root;
        let hashes: Vec<Hash> = self.events.iter().map(|e| e.hash()).collect();
        merkle_root(&hashes)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn trove_opened(n: u64, block_height: u64) -> ProtocolEvent {
        ProtocolEvent::TroveUpdated(TroveUpdatedEvent {
            borrower: Address::from_low_u64(n),
            debt: 2_000,
            coll: 20,
            stake: 20,
            operation: TroveOperation::Open,
            block_height,
            timestamp: 1_700_000_000 + block_height,
        })
    }

    #[test]
    fn test_event_types() {
        let event = trove_opened(1, 100);

        assert_eq!(event.event_type(), "TroveUpdated");
        assert_eq!(event.timestamp(), 1_700_000_100);
        assert_eq!(event.block_height(), 100);
    }

    #[test]
    fn test_event_log() {
        let mut log = EventLog::new();
        assert!(log.is_empty());

        log.push(trove_opened(1, 100));
        log.push(ProtocolEvent::StabilityDeposit(StabilityDepositEvent {
            depositor: Address::from_low_u64(2),
            amount: 500,
            new_deposit: 500,
            collateral_gain: 0,
            secondary_gain: 0,
            block_height: 101,
            timestamp: 1_700_000_101,
        }));

        assert_eq!(log.len(), 2);
        assert_eq!(log.filter_by_type("TroveUpdated").len(), 1);
        assert_eq!(log.filter_by_type("StabilityDeposit").len(), 1);
        assert_eq!(log.since(1).len(), 1);
        assert!(log.since(5).is_empty());
    }

    #[test]
    fn test_event_hash() {
        let event = trove_opened(1, 100);

        let hash1 = event.hash();
        let hash2 = event.hash();
        assert_eq!(hash1, hash2);
        assert!(!hash1.is_zero());
        assert_ne!(hash1, trove_opened(2, 100).hash());
    }

    #[test]
    fn test_event_log_merkle_root() {
        let mut log = EventLog::new();

        // Empty log has zero merkle root (deterministic)
        let empty_root = log.merkle_root();
        assert!(empty_root.is_zero());

        log.push(ProtocolEvent::TokenTransfer(TokenTransferEvent {
            from: Address::from_low_u64(1),
            to: Address::from_low_u64(2),
            amount: 1_000,
            block_height: 100,
            timestamp: 1_700_000_100,
        }));

        let root_with_one = log.merkle_root();
        assert!(!root_with_one.is_zero());
        assert_ne!(empty_root, root_with_one);
    }
}
