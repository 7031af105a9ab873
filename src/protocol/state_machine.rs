//! Protocol State Machine - Core orchestration engine.
//!
//! The state machine is the central coordinator for all protocol operations:
//! - Reads the oracle exactly once per operation
//! - Runs the operation against a snapshot of the ledger and restores it on
//!   any error, so a failed operation leaves no trace
//! - Settles outbound collateral only after all bookkeeping succeeded
//! - Tracks Recovery Mode transitions and emits them as events

use crate::core::borrower;
use crate::core::config::ProtocolConfig;
use crate::core::ledger::{ExecutionContext, LedgerState};
use crate::core::token::DebtToken;
use crate::core::trove::{EntireDebtAndColl, Trove};
use crate::error::{Error, Result};
use crate::liquidation::engine::{LiquidationEngine, LiquidationStats};
use crate::liquidation::recovery::SystemHealth;
use crate::liquidation::stability_pool::{self, StabilityPoolStats};
use crate::oracle::price_feed::{PriceData, PriceFeed, PriceOracle};
use crate::protocol::events::*;
use crate::protocol::operations::*;
use crate::redemption::engine::{RedemptionEngine, RedemptionStats};
use crate::redemption::hints::HintHelpers;
use crate::utils::crypto::{Address, Hash};

// ═══════════════════════════════════════════════════════════════════════════════
// STATE MACHINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol state machine - orchestrates all operations
#[derive(Debug, Clone)]
pub struct ProtocolStateMachine<O: PriceOracle = PriceFeed> {
    /// Protocol configuration
    config: ProtocolConfig,
    /// Ledger state
    state: LedgerState,
    /// Liquidation engine
    liquidation: LiquidationEngine,
    /// Redemption engine
    redemption: RedemptionEngine,
    /// Price source
    oracle: O,
    /// Current block height
    block_height: u64,
    /// Current timestamp
    timestamp: u64,
    /// Whether the last completed operation left the system in Recovery Mode
    recovery_mode: bool,
    /// Run ledger invariant checks after each operation
    check_invariants: bool,
}

impl<O: PriceOracle> ProtocolStateMachine<O> {
    /// Create a state machine with an empty ledger
    pub fn new(config: ProtocolConfig, oracle: O, timestamp: u64) -> Result<Self> {
        config.params.validate()?;
        let state = LedgerState::new(&config.params, timestamp);

        Ok(Self {
            config,
            state,
            liquidation: LiquidationEngine::new(),
            redemption: RedemptionEngine::new(),
            oracle,
            block_height: 0,
            timestamp,
            recovery_mode: false,
            check_invariants: true,
        })
    }

    /// Enable or disable the per-operation invariant check
    pub fn with_invariant_checks(mut self, enabled: bool) -> Self {
        self.check_invariants = enabled;
        self
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BLOCK PROCESSING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Begin a new block. Time never moves backwards.
    pub fn begin_block(&mut self, height: u64, timestamp: u64) -> Result<()> {
        if timestamp < self.timestamp {
            return Err(Error::InvalidParameter {
                name: "timestamp".into(),
                reason: format!("{} is before current time {}", timestamp, self.timestamp),
            });
        }
        self.block_height = height;
        self.timestamp = timestamp;
        Ok(())
    }

    /// Advance the clock by `seconds` within the next block
    pub fn advance_time(&mut self, seconds: u64) {
        self.block_height += 1;
        self.timestamp = self.timestamp.saturating_add(seconds);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OPERATION EXECUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Execute `op` on behalf of `caller`, all or nothing
    pub fn execute(&mut self, caller: Address, op: ProtocolOperation) -> Result<OperationResult> {
        let op_type = op.operation_type();
        if caller.is_reserved() {
            return Err(Error::InvalidParameter {
                name: "caller".into(),
                reason: format!("{} is a reserved address", caller),
            });
        }

        let price = self.oracle.price(self.timestamp)?;
        tracing::debug!(caller = %caller, op = op_type, price, "executing operation");

        let state_snapshot = self.state.clone();
        let liquidation_snapshot = self.liquidation.clone();
        let redemption_snapshot = self.redemption.clone();

        match self.run(caller, op, price) {
            Ok(result) => {
                tracing::info!(caller = %caller, op = op_type, "operation completed");
                Ok(result)
            }
            Err(err) => {
                self.state = state_snapshot;
                self.liquidation = liquidation_snapshot;
                self.redemption = redemption_snapshot;
                tracing::warn!(caller = %caller, op = op_type, error = %err, "operation rolled back");
                Err(err)
            }
        }
    }

    fn run(&mut self, caller: Address, op: ProtocolOperation, price: u128) -> Result<OperationResult> {
        let ctx = ExecutionContext {
            params: &self.config.params,
            price,
            timestamp: self.timestamp,
            block_height: self.block_height,
            fee_recipient: self.config.fee_recipient,
        };
        let state = &mut self.state;

        let result = match op {
            ProtocolOperation::OpenTrove {
                collateral,
                debt_amount,
                max_fee_percentage,
                hint,
            } => OperationResult::TroveChanged(borrower::open_trove(
                state,
                &ctx,
                caller,
                collateral,
                debt_amount,
                max_fee_percentage,
                hint,
            )?),
            ProtocolOperation::AdjustTrove { adjustment, hint } => {
                OperationResult::TroveChanged(borrower::adjust_trove(state, &ctx, caller, adjustment, hint)?)
            }
            ProtocolOperation::CloseTrove => OperationResult::TroveClosed {
                collateral_returned: borrower::close_trove(state, &ctx, caller)?,
            },
            ProtocolOperation::ClaimCollateral => OperationResult::CollateralClaimed {
                amount: borrower::claim_collateral(state, &ctx, caller)?,
            },
            ProtocolOperation::ProvideToStabilityPool { amount } => OperationResult::Deposit(
                stability_pool::provide_to_stability_pool(state, &ctx, caller, amount)?,
            ),
            ProtocolOperation::WithdrawFromStabilityPool { amount } => OperationResult::Deposit(
                stability_pool::withdraw_from_stability_pool(state, &ctx, caller, amount)?,
            ),
            ProtocolOperation::WithdrawCollateralGainToTrove { hint } => OperationResult::Deposit(
                stability_pool::withdraw_collateral_gain_to_trove(state, &ctx, caller, hint)?,
            ),
            ProtocolOperation::IssueSecondaryReward { amount } => {
                if caller != self.config.secondary_issuer {
                    return Err(Error::Unauthorized(caller.to_hex()));
                }
                OperationResult::SecondaryRewardIssued {
                    per_unit_staked: stability_pool::issue_secondary_reward(state, &ctx, caller, amount)?,
                }
            }
            ProtocolOperation::Liquidate { borrower } => {
                OperationResult::Liquidation(self.liquidation.liquidate(state, &ctx, caller, borrower)?)
            }
            ProtocolOperation::LiquidateTroves { n } => {
                OperationResult::Liquidation(self.liquidation.liquidate_troves(state, &ctx, caller, n)?)
            }
            ProtocolOperation::BatchLiquidateTroves { borrowers } => OperationResult::Liquidation(
                self.liquidation
                    .batch_liquidate_troves(state, &ctx, caller, &borrowers)?,
            ),
            ProtocolOperation::RedeemCollateral(request) => {
                OperationResult::Redemption(self.redemption.redeem_collateral(state, &ctx, caller, request)?)
            }
            ProtocolOperation::Transfer { to, amount } => {
                if to.is_reserved() {
                    return Err(Error::InvalidParameter {
                        name: "to".into(),
                        reason: format!("cannot transfer to reserved address {}", to),
                    });
                }
                state.token.transfer(caller, to, amount)?;
                state.emit(ProtocolEvent::TokenTransfer(TokenTransferEvent {
                    from: caller,
                    to,
                    amount,
                    block_height: ctx.block_height,
                    timestamp: ctx.timestamp,
                }));
                OperationResult::Transfer { amount }
            }
        };

        state.settle_payouts(ctx.block_height, ctx.timestamp)?;
        if self.check_invariants {
            state.verify_invariants()?;
        }
        self.refresh_mode(price)?;
        Ok(result)
    }

    /// Emit a Recovery Mode transition if the mode changed at `price`
    fn refresh_mode(&mut self, price: u128) -> Result<()> {
        let health = self.state.system_health(price, &self.config.params)?;
        let recovery = health.is_recovery_mode();
        if recovery == self.recovery_mode {
            return Ok(());
        }

        let event = RecoveryModeEvent {
            tcr: health.tcr,
            block_height: self.block_height,
            timestamp: self.timestamp,
        };
        if recovery {
            tracing::warn!(tcr = health.tcr, "entering recovery mode");
            self.state.emit(ProtocolEvent::RecoveryModeEntered(event));
        } else {
            tracing::info!(tcr = health.tcr, "exiting recovery mode");
            self.state.emit(ProtocolEvent::RecoveryModeExited(event));
        }
        self.recovery_mode = recovery;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERY METHODS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Current oracle price
    pub fn price(&self) -> Result<u128> {
        self.oracle.price(self.timestamp)
    }

    /// Total collateral ratio at the current price
    pub fn tcr(&self) -> Result<u128> {
        self.state.tcr(self.price()?)
    }

    /// System totals and mode at the current price
    pub fn system_health(&self) -> Result<SystemHealth> {
        self.state.system_health(self.price()?, &self.config.params)
    }

    /// Check if in recovery mode as of the last operation
    pub fn is_recovery_mode(&self) -> bool {
        self.recovery_mode
    }

    /// Get a trove record
    pub fn trove(&self, owner: &Address) -> Option<&Trove> {
        self.state.troves.trove(owner)
    }

    /// Debt and collateral of a trove including pending rewards
    pub fn entire_debt_and_coll(&self, owner: &Address) -> Result<EntireDebtAndColl> {
        self.state.troves.entire_debt_and_coll(owner)
    }

    /// Current ICR of a trove
    pub fn current_icr(&self, owner: &Address) -> Result<u128> {
        self.state.troves.current_icr(owner, self.price()?)
    }

    /// Compounded stability deposit
    pub fn compounded_deposit(&self, depositor: &Address) -> Result<u128> {
        self.state.stability_pool.compounded_deposit(depositor)
    }

    /// Pending collateral gain of a depositor
    pub fn collateral_gain(&self, depositor: &Address) -> Result<u128> {
        self.state.stability_pool.depositor_collateral_gain(depositor)
    }

    /// Pending secondary reward of a depositor
    pub fn secondary_gain(&self, depositor: &Address) -> Result<u128> {
        self.state.stability_pool.depositor_secondary_gain(depositor)
    }

    /// Secondary reward credited to a depositor so far
    pub fn secondary_balance_of(&self, depositor: &Address) -> u128 {
        self.state.secondary_rewards.balance_of(depositor)
    }

    /// Debt token balance
    pub fn balance_of(&self, account: &Address) -> u128 {
        self.state.token.balance_of(account)
    }

    /// Surplus collateral claimable by `owner`
    pub fn surplus_of(&self, owner: &Address) -> u128 {
        self.state.surplus_pool.balance_of(owner)
    }

    /// Total collateral paid out to `recipient`
    pub fn collateral_sent_to(&self, recipient: &Address) -> u128 {
        self.state.collateral_sent_to(recipient)
    }

    /// Hint helpers over the current ledger
    pub fn hints(&self) -> HintHelpers<'_> {
        HintHelpers::new(&self.state, &self.config.params)
    }

    /// Ledger state
    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// Events emitted so far
    pub fn events(&self) -> &EventLog {
        &self.state.events
    }

    /// Fingerprint of the ledger
    pub fn state_hash(&self) -> Result<Hash> {
        self.state.state_hash()
    }

    /// Get protocol configuration
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Get current block height
    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    /// Get current timestamp
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Price source
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Liquidation statistics
    pub fn liquidation_stats(&self) -> LiquidationStats {
        self.liquidation.statistics()
    }

    /// Redemption statistics
    pub fn redemption_stats(&self) -> RedemptionStats {
        self.redemption.statistics()
    }

    /// Stability pool statistics
    pub fn stability_pool_stats(&self) -> StabilityPoolStats {
        self.state.stability_pool.statistics()
    }
}

impl ProtocolStateMachine<PriceFeed> {
    /// State machine over a settable feed holding `config.initial_price`
    pub fn with_price_feed(config: ProtocolConfig, timestamp: u64) -> Result<Self> {
        let feed = PriceFeed::fixed(config.initial_price, timestamp);
        Self::new(config, feed, timestamp)
    }

    /// Set the oracle price and record any Recovery Mode transition
    pub fn set_price(&mut self, price: u128) -> Result<()> {
        if price == 0 {
            return Err(Error::PriceUnavailable("price must be positive".into()));
        }
        self.oracle.force_update(PriceData::new(price, self.timestamp));
        tracing::info!(price, "price updated");
        self.refresh_mode(price)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
