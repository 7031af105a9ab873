//! Read-only hint helpers.
//!
//! Callers compute hints off the critical path so that mutating operations
//! touch as few sorted-list nodes as possible. None of these functions modify
//! state; a stale hint only costs the operation extra traversal.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::core::config::ProtocolParams;
use crate::core::ledger::LedgerState;
use crate::core::sorted_troves::InsertHint;
use crate::error::Result;
use crate::redemption::engine::first_redeemable;
use crate::utils::constants::DECIMAL_PRECISION;
use crate::utils::crypto::Address;
use crate::utils::math::*;

/// Hints for a redemption call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionHints {
    /// First trove with ICR ≥ MCR, scanning from the lowest
    pub first_hint: Option<Address>,
    /// Expected NICR of the partially redeemed trove, 0 if none
    pub partial_nicr: u128,
    /// Part of the requested amount that can actually be redeemed
    pub truncated_amount: u128,
}

/// Result of a randomized nearest-NICR search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproxHint {
    /// Closest trove found
    pub hint: Option<Address>,
    /// Distance between its NICR and the target
    pub diff: u128,
    /// Seed to continue the search with
    pub latest_seed: u64,
}

/// Hint computations over a ledger snapshot
#[derive(Debug, Clone, Copy)]
pub struct HintHelpers<'a> {
    state: &'a LedgerState,
    params: &'a ProtocolParams,
}

impl<'a> HintHelpers<'a> {
    /// Borrow a ledger for hint lookups
    pub fn new(state: &'a LedgerState, params: &'a ProtocolParams) -> Self {
        Self { state, params }
    }

    /// Simulate a redemption of `amount` without touching state.
    ///
    /// The walk stops at the first trove that can only be partly redeemed;
    /// its redeemable part is capped so the net debt stays at the minimum.
    pub fn get_redemption_hints(&self, amount: u128, price: u128, max_iterations: usize) -> Result<RedemptionHints> {
        let troves = &self.state.troves;
        let first_hint = first_redeemable(self.state, price, self.params.mcr)?;

        let mut remaining = amount;
        let mut partial_nicr = 0;
        let mut iterations_left = if max_iterations == 0 { usize::MAX } else { max_iterations };
        let mut cursor = first_hint;

        while let Some(owner) = cursor {
            if remaining == 0 || iterations_left == 0 {
                break;
            }
            iterations_left -= 1;

            let entire = troves.entire_debt_and_coll(&owner)?;
            let net_debt = safe_sub(entire.debt, self.params.gas_compensation)?;

            if net_debt > remaining {
                if net_debt > self.params.min_net_debt {
                    let redeemable = remaining.min(net_debt - self.params.min_net_debt);
                    let new_coll = safe_sub(entire.coll, mul_div(redeemable, DECIMAL_PRECISION, price)?)?;
                    let new_debt = safe_add(net_debt - redeemable, self.params.gas_compensation)?;
                    partial_nicr = compute_nominal_cr(new_coll, new_debt);
                    remaining -= redeemable;
                }
                break;
            }
            remaining -= net_debt;
            cursor = self.state.sorted.prev(&owner);
        }

        Ok(RedemptionHints {
            first_hint,
            partial_nicr,
            truncated_amount: amount - remaining,
        })
    }

    /// Sample `num_trials` random troves and return the one whose NICR is
    /// closest to `nicr`. The search starts from the lowest trove.
    pub fn get_approx_hint(&self, nicr: u128, num_trials: usize, seed: u64) -> Result<ApproxHint> {
        let troves = &self.state.troves;
        let count = troves.owners_count();
        let Some(last) = self.state.sorted.last().filter(|_| count > 0) else {
            return Ok(ApproxHint {
                hint: None,
                diff: 0,
                latest_seed: seed,
            });
        };

        let mut hint = last;
        let mut diff = abs_diff(troves.nominal_icr(&last)?, nicr);
        let mut rng = StdRng::seed_from_u64(seed);

        for _ in 1..num_trials {
            let index = rng.gen_range(0..count);
            let Some(candidate) = troves.owner_at(index) else {
                continue;
            };
            let candidate_diff = abs_diff(troves.nominal_icr(&candidate)?, nicr);
            if candidate_diff < diff {
                diff = candidate_diff;
                hint = candidate;
            }
        }

        Ok(ApproxHint {
            hint: Some(hint),
            diff,
            latest_seed: rng.gen(),
        })
    }

    /// Exact insert position for `nicr`, seeded by an approximate hint.
    ///
    /// Uses roughly `15 * sqrt(n)` samples, enough to land within a few
    /// nodes of the target on a list of `n` troves.
    pub fn find_insert_hint(&self, nicr: u128, seed: u64) -> Result<InsertHint> {
        let count = self.state.troves.owners_count();
        let trials = ((count as f64).sqrt() * 15.0).ceil() as usize;
        let approx = self.get_approx_hint(nicr, trials.max(1), seed)?;

        let (prev, next) = self
            .state
            .sorted
            .find_insert_position(&self.state.troves, nicr, approx.hint, approx.hint);
        Ok(InsertHint::new(prev, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::borrower::open_trove;
    use crate::core::ledger::ExecutionContext;

    fn owner(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn setup(params: &ProtocolParams, colls: &[u128]) -> LedgerState {
        let mut state = LedgerState::new(params, 0);
        let ctx = ExecutionContext {
            params,
            price: units(200),
            timestamp: 0,
            block_height: 1,
            fee_recipient: Address::new([0xfc; 20]),
        };
        for (i, coll) in colls.iter().enumerate() {
            open_trove(&mut state, &ctx, owner(i as u64 + 1), *coll, units(2_000), DECIMAL_PRECISION, InsertHint::default())
                .unwrap();
        }
        state
    }

    #[test]
    fn test_redemption_hints_walk_full_troves() {
        let params = ProtocolParams::default();
        let state = setup(&params, &[units(100), units(20), units(30), units(50)]);
        let helpers = HintHelpers::new(&state, &params);

        // Owner 2 is fully redeemed, owner 3 partly
        let hints = helpers.get_redemption_hints(units(2_110), units(200), 0).unwrap();
        assert_eq!(hints.first_hint, Some(owner(2)));
        assert_eq!(hints.truncated_amount, units(2_110));
        let expected = compute_nominal_cr(units(30) - units(100) / 200, units(2_110));
        assert_eq!(hints.partial_nicr, expected);

        // Bounded to one trove
        let hints = helpers.get_redemption_hints(units(2_110), units(200), 1).unwrap();
        assert_eq!(hints.truncated_amount, units(2_010));
        assert_eq!(hints.partial_nicr, 0);
    }

    #[test]
    fn test_redemption_hints_empty_ledger() {
        let params = ProtocolParams::default();
        let state = LedgerState::new(&params, 0);
        let hints = HintHelpers::new(&state, &params)
            .get_redemption_hints(units(100), units(200), 0)
            .unwrap();
        assert_eq!(hints.first_hint, None);
        assert_eq!(hints.truncated_amount, 0);
    }

    #[test]
    fn test_approx_hint_is_deterministic() {
        let params = ProtocolParams::default();
        let state = setup(&params, &[units(100), units(20), units(30), units(50)]);
        let helpers = HintHelpers::new(&state, &params);
        let target = state.troves.nominal_icr(&owner(3)).unwrap();

        let a = helpers.get_approx_hint(target, 50, 7).unwrap();
        let b = helpers.get_approx_hint(target, 50, 7).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.hint, Some(owner(3)));
        assert_eq!(a.diff, 0);
    }

    #[test]
    fn test_find_insert_hint_is_valid_position() {
        let params = ProtocolParams::default();
        let state = setup(&params, &[units(100), units(20), units(30), units(50)]);
        let helpers = HintHelpers::new(&state, &params);
        let nicr = compute_nominal_cr(units(40), units(2_210));

        let hint = helpers.find_insert_hint(nicr, 42).unwrap();
        assert_eq!(hint, InsertHint::new(Some(owner(4)), Some(owner(3))));
        assert!(state.sorted.valid_insert_position(&state.troves, nicr, hint.prev, hint.next));
    }
}
