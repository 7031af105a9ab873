//! Protocol constants and magic numbers.
//!
//! All amounts, ratios and rates are 18-decimal fixed-point `u128` values
//! unless stated otherwise. `ProtocolParams::default()` is built from these.

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED-POINT CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// One unit in 18-decimal fixed point (1.0)
pub const DECIMAL_PRECISION: u128 = 1_000_000_000_000_000_000;

/// 100% expressed as a fixed-point ratio
pub const ONE_HUNDRED_PERCENT: u128 = DECIMAL_PRECISION;

/// Precision used for nominal collateral ratios (collateral / debt, no price)
pub const NICR_PRECISION: u128 = 100_000_000_000_000_000_000;

/// Largest exponent accepted by `dec_pow` (1000 years in minutes)
pub const MAX_DEC_POW_MINUTES: u64 = 525_600_000;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERALIZATION CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Minimum Collateral Ratio (MCR) - 110%
/// Below this ratio a trove is liquidatable in Normal Mode
pub const MIN_COLLATERAL_RATIO: u128 = 1_100_000_000_000_000_000;

/// Critical Collateral Ratio (CCR) - 150%
/// When the system TCR falls below this, Recovery Mode activates
pub const CRITICAL_COLLATERAL_RATIO: u128 = 1_500_000_000_000_000_000;

// ═══════════════════════════════════════════════════════════════════════════════
// DEBT CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Debt-token reserve set aside on open and paid to the liquidator (200 units)
pub const GAS_COMPENSATION: u128 = 200 * DECIMAL_PRECISION;

/// Minimum net debt of a trove, excluding the gas reserve (1800 units)
pub const MIN_NET_DEBT: u128 = 1_800 * DECIMAL_PRECISION;

/// Divisor for the collateral share paid as liquidation compensation (1/200 = 0.5%)
pub const PERCENT_DIVISOR: u128 = 200;

// ═══════════════════════════════════════════════════════════════════════════════
// FEE CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Borrowing fee floor - 0.5%
pub const BORROWING_FEE_FLOOR: u128 = DECIMAL_PRECISION / 1000 * 5;

/// Redemption fee floor - 0.5%
pub const REDEMPTION_FEE_FLOOR: u128 = DECIMAL_PRECISION / 1000 * 5;

/// Maximum borrowing fee - 5%
pub const MAX_BORROWING_FEE: u128 = DECIMAL_PRECISION / 100 * 5;

/// Per-minute decay factor of the base rate (half-life of 12 hours)
pub const MINUTE_DECAY_FACTOR: u128 = 999_037_758_833_783_000;

/// Divisor applied to the redeemed fraction when raising the base rate
pub const BETA: u128 = 2;

/// Seconds per minute, the granularity of base-rate decay
pub const SECONDS_IN_ONE_MINUTE: u64 = 60;

// ═══════════════════════════════════════════════════════════════════════════════
// STABILITY POOL CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Renormalization factor applied to P when it would lose precision
pub const SCALE_FACTOR: u128 = 1_000_000_000;

/// Initial value of the product P
pub const INITIAL_P: u128 = DECIMAL_PRECISION;

// ═══════════════════════════════════════════════════════════════════════════════
// SORTED INDEX CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default capacity of the sorted trove index
pub const DEFAULT_MAX_SORTED_SIZE: usize = usize::MAX;

/// Default iteration bound for redemption hint lookups (0 means unbounded)
pub const DEFAULT_MAX_REDEMPTION_ITERATIONS: usize = 0;

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Basis points divisor (10000 = 100%)
pub const BPS_DIVISOR: u128 = 10_000;

/// Maximum price move accepted by a validated feed update (50%)
pub const MAX_PRICE_DEVIATION_BPS: u128 = 5_000;

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTITY
// ═══════════════════════════════════════════════════════════════════════════════

/// Length of an owner address in bytes
pub const ADDRESS_LENGTH: usize = 20;
