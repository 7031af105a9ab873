//! Trove engine simulator CLI
//!
//! Runs JSON scenario files against the protocol state machine and reports
//! the resulting system state.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;
use serde::Deserialize;

use trove_engine::core::borrower::TroveAdjustment;
use trove_engine::core::config::ProtocolConfig;
use trove_engine::core::sorted_troves::InsertHint;
use trove_engine::protocol::{OperationResult, ProtocolOperation, ProtocolStateMachine};
use trove_engine::redemption::RedemptionRequest;
use trove_engine::utils::crypto::Address;
use trove_engine::utils::math::{compute_nominal_cr, decimal_to_amount, format_amount};

/// Trove engine simulator - replays lending scenarios
#[derive(Parser)]
#[command(name = "trove-sim")]
#[command(version = trove_engine::VERSION)]
#[command(about = "Run collateralized-debt scenarios against the trove engine", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to protocol configuration
    #[arg(short, long, env = "TROVE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Destination path
        #[arg(default_value = "trove-config.json")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a scenario file
    Run {
        /// Scenario file (JSON)
        scenario: PathBuf,

        /// Write the event log to this file (JSON)
        #[arg(short, long)]
        events: Option<PathBuf>,
    },

    /// Show the effective protocol parameters
    Params,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCENARIO FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

/// A scenario: starting price and a list of steps. Accounts are small integers.
#[derive(Debug, Deserialize)]
struct Scenario {
    /// Starting price, defaults to the configured initial price
    #[serde(default)]
    initial_price: Option<Decimal>,
    /// Starting timestamp
    #[serde(default)]
    start_time: u64,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct Step {
    #[serde(flatten)]
    action: Action,
    /// The step is expected to be rejected
    #[serde(default)]
    expect_failure: bool,
}

fn full_fee() -> Decimal {
    Decimal::ONE
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Action {
    SetPrice {
        price: Decimal,
    },
    AdvanceTime {
        seconds: u64,
    },
    OpenTrove {
        caller: u64,
        collateral: Decimal,
        debt: Decimal,
        #[serde(default = "full_fee")]
        max_fee: Decimal,
    },
    AdjustTrove {
        caller: u64,
        #[serde(default)]
        coll_deposit: Decimal,
        #[serde(default)]
        coll_withdrawal: Decimal,
        #[serde(default)]
        debt_change: Decimal,
        #[serde(default)]
        is_debt_increase: bool,
        #[serde(default = "full_fee")]
        max_fee: Decimal,
    },
    CloseTrove {
        caller: u64,
    },
    ClaimCollateral {
        caller: u64,
    },
    ProvideToStabilityPool {
        caller: u64,
        amount: Decimal,
    },
    WithdrawFromStabilityPool {
        caller: u64,
        amount: Decimal,
    },
    WithdrawCollateralGainToTrove {
        caller: u64,
    },
    IssueSecondaryReward {
        amount: Decimal,
    },
    Liquidate {
        caller: u64,
        borrower: u64,
    },
    LiquidateTroves {
        caller: u64,
        n: usize,
    },
    BatchLiquidate {
        caller: u64,
        borrowers: Vec<u64>,
    },
    Redeem {
        caller: u64,
        amount: Decimal,
        #[serde(default = "full_fee")]
        max_fee: Decimal,
        #[serde(default)]
        max_iterations: usize,
    },
    Transfer {
        caller: u64,
        to: u64,
        amount: Decimal,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════════════════════

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let term = Term::stdout();

    if let Err(e) = run_command(&cli, &term) {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run_command(cli: &Cli, term: &Term) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Init { path, force } => cmd_init(path, *force, term),
        Commands::Run { scenario, events } => cmd_run(cli, scenario, events.as_deref(), term),
        Commands::Params => cmd_params(cli, term),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMAND HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_init(path: &Path, force: bool, term: &Term) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists. Use --force to overwrite.", path.display());
    }
    ProtocolConfig::default()
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;

    let _ = term.write_line(&format!(
        "{} Configuration written to {}",
        style("✓").green(),
        path.display()
    ));
    Ok(())
}

fn cmd_params(cli: &Cli, term: &Term) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let p = &config.params;

    let _ = term.write_line(&format!("{}", style("Protocol Parameters").bold().underlined()));
    let _ = term.write_line(&format!("  MCR:                {}", format_ratio(p.mcr)));
    let _ = term.write_line(&format!("  CCR:                {}", format_ratio(p.ccr)));
    let _ = term.write_line(&format!("  Gas compensation:   {}", format_amount(p.gas_compensation)));
    let _ = term.write_line(&format!("  Min net debt:       {}", format_amount(p.min_net_debt)));
    let _ = term.write_line(&format!("  Borrowing fee:      {} - {}", format_ratio(p.borrowing_fee_floor), format_ratio(p.max_borrowing_fee)));
    let _ = term.write_line(&format!("  Redemption floor:   {}", format_ratio(p.redemption_fee_floor)));
    let _ = term.write_line(&format!("  Fee recipient:      {}", config.fee_recipient));
    let _ = term.write_line(&format!("  Initial price:      {}", format_amount(config.initial_price)));
    Ok(())
}

fn cmd_run(cli: &Cli, scenario_path: &Path, events_path: Option<&Path>, term: &Term) -> anyhow::Result<()> {
    let mut config = load_config(cli)?;
    let raw = std::fs::read_to_string(scenario_path)
        .with_context(|| format!("reading {}", scenario_path.display()))?;
    let scenario: Scenario = serde_json::from_str(&raw).context("parsing scenario")?;

    if let Some(price) = scenario.initial_price {
        config.initial_price = decimal_to_amount(price)?;
    }
    let mut machine = ProtocolStateMachine::with_price_feed(config, scenario.start_time)?;

    let progress = ProgressBar::new(scenario.steps.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .context("progress template")?,
    );

    let mut unexpected = 0usize;
    for (index, step) in scenario.steps.iter().enumerate() {
        let outcome = apply_step(&mut machine, &step.action);
        let label = format!("#{} {}", index + 1, action_name(&step.action));

        match (&outcome, step.expect_failure) {
            (Ok(summary), false) => {
                if cli.verbose {
                    progress.println(format!("{} {} {}", style("✓").green(), label, style(summary).dim()));
                }
            }
            (Err(e), true) => {
                if cli.verbose {
                    progress.println(format!("{} {} rejected: {}", style("✓").green(), label, style(e).dim()));
                }
            }
            (Ok(_), true) => {
                unexpected += 1;
                progress.println(format!("{} {} succeeded but was expected to fail", style("✗").red(), label));
            }
            (Err(e), false) => {
                unexpected += 1;
                progress.println(format!("{} {} failed: {}", style("✗").red(), label, e));
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    print_summary(&machine, term)?;

    if let Some(path) = events_path {
        let json = serde_json::to_string_pretty(machine.events().events())?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        let _ = term.write_line(&format!(
            "{} {} events written to {}",
            style("✓").green(),
            machine.events().len(),
            path.display()
        ));
    }

    if unexpected > 0 {
        anyhow::bail!("{} step(s) did not behave as expected", unexpected);
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// STEP EXECUTION
// ═══════════════════════════════════════════════════════════════════════════════

fn apply_step(machine: &mut ProtocolStateMachine, action: &Action) -> anyhow::Result<String> {
    let op = match action {
        Action::SetPrice { price } => {
            machine.set_price(decimal_to_amount(*price)?)?;
            return Ok(format!("price {}", price));
        }
        Action::AdvanceTime { seconds } => {
            machine.advance_time(*seconds);
            return Ok(format!("t = {}", machine.timestamp()));
        }
        Action::OpenTrove {
            caller,
            collateral,
            debt,
            max_fee,
        } => {
            let collateral = decimal_to_amount(*collateral)?;
            let debt_amount = decimal_to_amount(*debt)?;
            let expected_debt = debt_amount + machine.config().params.gas_compensation;
            let hint = machine
                .hints()
                .find_insert_hint(compute_nominal_cr(collateral, expected_debt), *caller)?;
            return run_op(
                machine,
                *caller,
                ProtocolOperation::OpenTrove {
                    collateral,
                    debt_amount,
                    max_fee_percentage: decimal_to_amount(*max_fee)?,
                    hint,
                },
            );
        }
        Action::AdjustTrove {
            caller: _,
            coll_deposit,
            coll_withdrawal,
            debt_change,
            is_debt_increase,
            max_fee,
        } => ProtocolOperation::AdjustTrove {
            adjustment: TroveAdjustment {
                coll_deposit: decimal_to_amount(*coll_deposit)?,
                coll_withdrawal: decimal_to_amount(*coll_withdrawal)?,
                debt_change: decimal_to_amount(*debt_change)?,
                is_debt_increase: *is_debt_increase,
                max_fee_percentage: decimal_to_amount(*max_fee)?,
            },
            hint: InsertHint::default(),
        },
        Action::CloseTrove { .. } => ProtocolOperation::CloseTrove,
        Action::ClaimCollateral { .. } => ProtocolOperation::ClaimCollateral,
        Action::ProvideToStabilityPool { amount, .. } => ProtocolOperation::ProvideToStabilityPool {
            amount: decimal_to_amount(*amount)?,
        },
        Action::WithdrawFromStabilityPool { amount, .. } => ProtocolOperation::WithdrawFromStabilityPool {
            amount: decimal_to_amount(*amount)?,
        },
        Action::WithdrawCollateralGainToTrove { .. } => ProtocolOperation::WithdrawCollateralGainToTrove {
            hint: InsertHint::default(),
        },
        Action::IssueSecondaryReward { amount } => {
            let issuer = machine.config().secondary_issuer;
            let op = ProtocolOperation::IssueSecondaryReward {
                amount: decimal_to_amount(*amount)?,
            };
            return Ok(describe_result(&machine.execute(issuer, op)?));
        }
        Action::Liquidate { borrower, .. } => ProtocolOperation::Liquidate {
            borrower: account(*borrower),
        },
        Action::LiquidateTroves { n, .. } => ProtocolOperation::LiquidateTroves { n: *n },
        Action::BatchLiquidate { borrowers, .. } => ProtocolOperation::BatchLiquidateTroves {
            borrowers: borrowers.iter().copied().map(account).collect(),
        },
        Action::Redeem {
            caller,
            amount,
            max_fee,
            max_iterations,
        } => {
            let price = machine.price()?;
            let hints = machine
                .hints()
                .get_redemption_hints(decimal_to_amount(*amount)?, price, *max_iterations)?;
            let partial_hint = if hints.partial_nicr > 0 {
                machine.hints().find_insert_hint(hints.partial_nicr, *caller)?
            } else {
                InsertHint::default()
            };
            let request = RedemptionRequest {
                amount: hints.truncated_amount,
                first_hint: hints.first_hint,
                partial_hint,
                partial_nicr: hints.partial_nicr,
                max_iterations: *max_iterations,
                max_fee_percentage: decimal_to_amount(*max_fee)?,
            };
            return run_op(machine, *caller, ProtocolOperation::RedeemCollateral(request));
        }
        Action::Transfer { to, amount, .. } => ProtocolOperation::Transfer {
            to: account(*to),
            amount: decimal_to_amount(*amount)?,
        },
    };

    let caller = action_caller(action).unwrap_or_default();
    run_op(machine, caller, op)
}

fn run_op(machine: &mut ProtocolStateMachine, caller: u64, op: ProtocolOperation) -> anyhow::Result<String> {
    let result = machine.execute(account(caller), op)?;
    Ok(describe_result(&result))
}

fn describe_result(result: &OperationResult) -> String {
    match result {
        OperationResult::TroveChanged(change) => format!(
            "coll {} debt {} fee {}",
            format_amount(change.coll),
            format_amount(change.debt),
            format_amount(change.borrowing_fee)
        ),
        OperationResult::TroveClosed { collateral_returned } => {
            format!("returned {}", format_amount(*collateral_returned))
        }
        OperationResult::CollateralClaimed { amount } => format!("claimed {}", format_amount(*amount)),
        OperationResult::Deposit(change) => format!(
            "deposit {} gain {} reward {}",
            format_amount(change.new_deposit),
            format_amount(change.collateral_gain),
            format_amount(change.secondary_gain)
        ),
        OperationResult::SecondaryRewardIssued { per_unit_staked } => {
            format!("per unit {}", format_amount(*per_unit_staked))
        }
        OperationResult::Liquidation(totals) => format!(
            "{} trove(s), debt {}, coll {}",
            totals.len(),
            format_amount(totals.total_debt_in_sequence),
            format_amount(totals.total_coll_in_sequence)
        ),
        OperationResult::Redemption(outcome) => format!(
            "redeemed {}, coll {}, fee {}",
            format_amount(outcome.actual_amount),
            format_amount(outcome.coll_sent),
            format_amount(outcome.coll_fee)
        ),
        OperationResult::Transfer { amount } => format!("moved {}", format_amount(*amount)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPER FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

fn load_config(cli: &Cli) -> anyhow::Result<ProtocolConfig> {
    let config = match &cli.config {
        Some(path) => ProtocolConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => ProtocolConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

fn account(n: u64) -> Address {
    Address::from_low_u64(n)
}

fn action_caller(action: &Action) -> Option<u64> {
    match action {
        Action::SetPrice { .. } | Action::AdvanceTime { .. } | Action::IssueSecondaryReward { .. } => None,
        Action::OpenTrove { caller, .. }
        | Action::AdjustTrove { caller, .. }
        | Action::CloseTrove { caller }
        | Action::ClaimCollateral { caller }
        | Action::ProvideToStabilityPool { caller, .. }
        | Action::WithdrawFromStabilityPool { caller, .. }
        | Action::WithdrawCollateralGainToTrove { caller }
        | Action::Liquidate { caller, .. }
        | Action::LiquidateTroves { caller, .. }
        | Action::BatchLiquidate { caller, .. }
        | Action::Redeem { caller, .. }
        | Action::Transfer { caller, .. } => Some(*caller),
    }
}

fn action_name(action: &Action) -> &'static str {
    match action {
        Action::SetPrice { .. } => "set_price",
        Action::AdvanceTime { .. } => "advance_time",
        Action::OpenTrove { .. } => "open_trove",
        Action::AdjustTrove { .. } => "adjust_trove",
        Action::CloseTrove { .. } => "close_trove",
        Action::ClaimCollateral { .. } => "claim_collateral",
        Action::ProvideToStabilityPool { .. } => "provide_to_stability_pool",
        Action::WithdrawFromStabilityPool { .. } => "withdraw_from_stability_pool",
        Action::WithdrawCollateralGainToTrove { .. } => "withdraw_collateral_gain_to_trove",
        Action::IssueSecondaryReward { .. } => "issue_secondary_reward",
        Action::Liquidate { .. } => "liquidate",
        Action::LiquidateTroves { .. } => "liquidate_troves",
        Action::BatchLiquidate { .. } => "batch_liquidate",
        Action::Redeem { .. } => "redeem",
        Action::Transfer { .. } => "transfer",
    }
}

fn format_ratio(ratio: u128) -> String {
    if ratio == u128::MAX {
        return "∞".to_string();
    }
    format!("{}%", format_amount(ratio.saturating_mul(100)))
}

fn print_summary(machine: &ProtocolStateMachine, term: &Term) -> anyhow::Result<()> {
    let health = machine.system_health()?;
    let pool = machine.stability_pool_stats();
    let liquidations = machine.liquidation_stats();
    let redemptions = machine.redemption_stats();
    let state = machine.state();

    let mode = if health.is_recovery_mode() {
        style("Recovery").red().bold()
    } else {
        style("Normal").green()
    };

    let _ = term.write_line(&format!("\n{}", style("System").bold().underlined()));
    let _ = term.write_line(&format!("  Price:        {}", format_amount(health.price)));
    let _ = term.write_line(&format!("  Mode:         {}", mode));
    let _ = term.write_line(&format!("  TCR:          {}", style(format_ratio(health.tcr)).cyan()));
    let _ = term.write_line(&format!("  Collateral:   {}", style(format_amount(health.total_coll)).yellow()));
    let _ = term.write_line(&format!("  Debt:         {}", style(format_amount(health.total_debt)).green()));
    let _ = term.write_line(&format!("  Troves:       {}", state.troves.owners_count()));
    let _ = term.write_line(&format!(
        "  Base rate:    {}",
        format_ratio(state.base_rate.base_rate())
    ));

    let _ = term.write_line(&format!("\n{}", style("Stability Pool").bold().underlined()));
    let _ = term.write_line(&format!("  Deposits:     {}", format_amount(pool.total_deposits)));
    let _ = term.write_line(&format!("  Collateral:   {}", format_amount(pool.total_collateral)));
    let _ = term.write_line(&format!("  Depositors:   {}", pool.depositor_count));
    let rewards = &machine.state().secondary_rewards;
    let _ = term.write_line(&format!(
        "  Reward:       {} issued, {} credited",
        format_amount(rewards.issued()),
        format_amount(rewards.credited())
    ));
    let _ = term.write_line(&format!(
        "  P / scale / epoch: {} / {} / {}",
        pool.p, pool.current_scale, pool.current_epoch
    ));

    let _ = term.write_line(&format!("\n{}", style("Activity").bold().underlined()));
    let _ = term.write_line(&format!(
        "  Liquidated:   {} trove(s), debt {}",
        liquidations.total_liquidations,
        format_amount(liquidations.total_debt_liquidated)
    ));
    let _ = term.write_line(&format!(
        "  Redeemed:     {} in {} call(s), fees {}",
        format_amount(redemptions.total_redeemed),
        redemptions.total_redemptions,
        format_amount(redemptions.total_fees)
    ));
    let _ = term.write_line(&format!(
        "  Events:       {} (root {})",
        machine.events().len(),
        &machine.events().merkle_root().to_hex()[..16]
    ));

    Ok(())
}
