use crate::error::MathError;
use crate::full_math::{mul_div, mul_div_rounding_up};
use crate::sqrt_price_math::{
    get_amount0_delta, get_amount1_delta, get_next_sqrt_price_from_input,
    get_next_sqrt_price_from_output,
};
use alloy_primitives::U256;
use clmm_types::FEE_DENOMINATOR;

/// Result of a single swap step computation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapStepResult {
    /// The sqrt price after this step
    pub sqrt_ratio_next_x96: U256,
    /// Amount of input token consumed, excluding the fee
    pub amount_in: U256,
    /// Amount of output token produced
    pub amount_out: U256,
    /// Fee amount taken from input
    pub fee_amount: U256,
}

/// Compute the result of swapping within a single tick range
///
/// # Arguments
/// * `sqrt_ratio_current_x96` - Current sqrt price
/// * `sqrt_ratio_target_x96` - Target sqrt price (next tick boundary or price limit)
/// * `liquidity` - Available liquidity in this range
/// * `amount_remaining` - Remaining amount to swap (positive = exact input, negative = exact output)
/// * `fee_pips` - Fee in hundredths of a bip (e.g., 3000 = 0.3%)
///
/// The direction is implied by the relative order of the current and target
/// prices.
pub fn compute_swap_step(
    sqrt_ratio_current_x96: U256,
    sqrt_ratio_target_x96: U256,
    liquidity: u128,
    amount_remaining: i128,
    fee_pips: u32,
) -> Result<SwapStepResult, MathError> {
    let zero_for_one = sqrt_ratio_current_x96 >= sqrt_ratio_target_x96;
    let exact_in = amount_remaining >= 0;
    let remaining = U256::from(amount_remaining.unsigned_abs());
    let fee = U256::from(fee_pips);
    let denominator = U256::from(FEE_DENOMINATOR);

    let sqrt_ratio_next_x96;
    let mut amount_in = U256::ZERO;
    let mut amount_out = U256::ZERO;

    if exact_in {
        let amount_remaining_less_fee = mul_div(remaining, denominator - fee, denominator)?;

        amount_in = if zero_for_one {
            get_amount0_delta(sqrt_ratio_target_x96, sqrt_ratio_current_x96, liquidity, true)?
        } else {
            get_amount1_delta(sqrt_ratio_current_x96, sqrt_ratio_target_x96, liquidity, true)?
        };

        sqrt_ratio_next_x96 = if amount_remaining_less_fee >= amount_in {
            sqrt_ratio_target_x96
        } else {
            get_next_sqrt_price_from_input(
                sqrt_ratio_current_x96,
                liquidity,
                amount_remaining_less_fee,
                zero_for_one,
            )?
        };
    } else {
        amount_out = if zero_for_one {
            get_amount1_delta(sqrt_ratio_target_x96, sqrt_ratio_current_x96, liquidity, false)?
        } else {
            get_amount0_delta(sqrt_ratio_current_x96, sqrt_ratio_target_x96, liquidity, false)?
        };

        sqrt_ratio_next_x96 = if remaining >= amount_out {
            sqrt_ratio_target_x96
        } else {
            get_next_sqrt_price_from_output(
                sqrt_ratio_current_x96,
                liquidity,
                remaining,
                zero_for_one,
            )?
        };
    }

    let max = sqrt_ratio_target_x96 == sqrt_ratio_next_x96;

    // Recompute whichever side was not pinned by reaching the target
    if zero_for_one {
        if !max || !exact_in {
            amount_in =
                get_amount0_delta(sqrt_ratio_next_x96, sqrt_ratio_current_x96, liquidity, true)?;
        }
        if !max || exact_in {
            amount_out =
                get_amount1_delta(sqrt_ratio_next_x96, sqrt_ratio_current_x96, liquidity, false)?;
        }
    } else {
        if !max || !exact_in {
            amount_in =
                get_amount1_delta(sqrt_ratio_current_x96, sqrt_ratio_next_x96, liquidity, true)?;
        }
        if !max || exact_in {
            amount_out =
                get_amount0_delta(sqrt_ratio_current_x96, sqrt_ratio_next_x96, liquidity, false)?;
        }
    }

    // Cap output at remaining for exact output swaps
    if !exact_in && amount_out > remaining {
        amount_out = remaining;
    }

    let fee_amount = if exact_in && sqrt_ratio_next_x96 != sqrt_ratio_target_x96 {
        // Didn't reach target - the remainder is all fee
        remaining - amount_in
    } else {
        mul_div_rounding_up(amount_in, fee, denominator - fee)?
    };

    Ok(SwapStepResult {
        sqrt_ratio_next_x96,
        amount_in,
        amount_out,
        fee_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clmm_types::Q96;
    use proptest::prelude::*;

    const E18: i128 = 1_000_000_000_000_000_000;

    fn u(s: &str) -> U256 {
        U256::from_str_radix(s, 10).unwrap()
    }

    // sqrt(1.01)
    fn price_101_100() -> U256 {
        u("79623317895830914510639640423")
    }

    // === Exact input tests (positive amount_remaining) ===

    #[test]
    fn test_compute_swap_step_exact_in_capped_at_target_one_for_zero() {
        let result = compute_swap_step(Q96, price_101_100(), 2 * E18 as u128, E18, 600).unwrap();

        assert_eq!(result.sqrt_ratio_next_x96, price_101_100());
        assert_eq!(result.amount_in, U256::from(9975124224178055u64));
        assert_eq!(result.amount_out, U256::from(9925619580021728u64));
        assert_eq!(result.fee_amount, U256::from(5988667735148u64));
        // Not all input was consumed
        assert!(result.amount_in + result.fee_amount < U256::from(E18 as u128));
    }

    #[test]
    fn test_compute_swap_step_exact_in_fully_spent_one_for_zero() {
        let target = u("250541448375047931186413801569"); // sqrt(10)
        let result = compute_swap_step(Q96, target, 2 * E18 as u128, E18, 600).unwrap();

        assert_eq!(result.sqrt_ratio_next_x96, u("118818475322642227089037862318"));
        assert_eq!(result.amount_in, U256::from(999400000000000000u64));
        assert_eq!(result.amount_out, U256::from(666399946655997866u64));
        assert_eq!(result.fee_amount, U256::from(600000000000000u64));
        assert!(result.sqrt_ratio_next_x96 < target);
        assert_eq!(result.amount_in + result.fee_amount, U256::from(E18 as u128));
    }

    #[test]
    fn test_compute_swap_step_exact_in_zero_fee() {
        let target = u("78834968213693974763009544974"); // sqrt(100/101)
        let result = compute_swap_step(Q96, target, 2 * E18 as u128, E18, 0).unwrap();

        assert_eq!(result.sqrt_ratio_next_x96, target);
        assert_eq!(result.fee_amount, U256::ZERO);
        assert_eq!(result.amount_in, U256::from(9975124224178055u64));
        assert_eq!(result.amount_out, U256::from(9925619580021728u64));
    }

    #[test]
    fn test_compute_swap_step_target_price_of_one_uses_partial_input() {
        let result = compute_swap_step(
            U256::from(2u8),
            U256::from(1u8),
            1,
            3915081100057732413702495386755767,
            1,
        )
        .unwrap();

        assert_eq!(result.sqrt_ratio_next_x96, U256::from(1u8));
        assert_eq!(result.amount_in, u("39614081257132168796771975168"));
        assert_eq!(result.amount_out, U256::ZERO);
        assert_eq!(result.fee_amount, u("39614120871253040049813"));
    }

    #[test]
    fn test_compute_swap_step_entire_input_amount_taken_as_fee() {
        let result = compute_swap_step(
            U256::from(2413u32),
            u("79887613182836312"),
            1985041575832132834610021537970,
            10,
            1872,
        )
        .unwrap();

        assert_eq!(result.sqrt_ratio_next_x96, U256::from(2413u32));
        assert_eq!(result.amount_in, U256::ZERO);
        assert_eq!(result.amount_out, U256::ZERO);
        assert_eq!(result.fee_amount, U256::from(10u8));
    }

    #[test]
    fn test_compute_swap_step_at_target() {
        let result = compute_swap_step(Q96, Q96, E18 as u128, E18, 3000).unwrap();

        assert_eq!(result.sqrt_ratio_next_x96, Q96);
        assert_eq!(result.amount_in, U256::ZERO);
        assert_eq!(result.amount_out, U256::ZERO);
        assert_eq!(result.fee_amount, U256::ZERO);
    }

    // === Exact output tests (negative amount_remaining) ===

    #[test]
    fn test_compute_swap_step_exact_out_capped_at_target_one_for_zero() {
        let result = compute_swap_step(Q96, price_101_100(), 2 * E18 as u128, -E18, 600).unwrap();

        assert_eq!(result.sqrt_ratio_next_x96, price_101_100());
        assert_eq!(result.amount_in, U256::from(9975124224178055u64));
        assert_eq!(result.amount_out, U256::from(9925619580021728u64));
        assert_eq!(result.fee_amount, U256::from(5988667735148u64));
        assert!(result.amount_out < U256::from(E18 as u128));
    }

    #[test]
    fn test_compute_swap_step_exact_out_fully_received_one_for_zero() {
        let target = u("792281625142643375935439503360"); // sqrt(100)
        let result = compute_swap_step(Q96, target, 2 * E18 as u128, -E18, 600).unwrap();

        assert_eq!(result.sqrt_ratio_next_x96, Q96 * U256::from(2u8));
        assert_eq!(result.amount_in, U256::from(2 * E18 as u128));
        assert_eq!(result.amount_out, U256::from(E18 as u128));
        assert_eq!(result.fee_amount, U256::from(1200720432259356u64));
    }

    #[test]
    fn test_compute_swap_step_exact_out_capped_at_desired_amount() {
        let result = compute_swap_step(
            u("417332158212080721273783715441582"),
            u("1452870262520218020823638996"),
            159344665391607089467575320103,
            -1,
            1,
        )
        .unwrap();

        assert_eq!(result.sqrt_ratio_next_x96, u("417332158212080721273783715441581"));
        assert_eq!(result.amount_in, U256::from(1u8));
        assert_eq!(result.amount_out, U256::from(1u8));
        assert_eq!(result.fee_amount, U256::from(1u8));
    }

    #[test]
    fn test_compute_swap_step_insufficient_liquidity_zero_for_one_exact_out() {
        let price = u("20282409603651670423947251286016");
        let target = price * U256::from(11u8) / U256::from(10u8);
        let result = compute_swap_step(price, target, 1024, -4, 3000).unwrap();

        assert_eq!(result.amount_out, U256::ZERO);
        assert_eq!(result.sqrt_ratio_next_x96, target);
        assert_eq!(result.amount_in, U256::from(26215u32));
        assert_eq!(result.fee_amount, U256::from(79u8));
    }

    #[test]
    fn test_compute_swap_step_insufficient_liquidity_one_for_zero_exact_out() {
        let price = u("20282409603651670423947251286016");
        let target = price * U256::from(9u8) / U256::from(10u8);
        let result = compute_swap_step(price, target, 1024, -263000, 3000).unwrap();

        assert_eq!(result.amount_out, U256::from(26214u32));
        assert_eq!(result.sqrt_ratio_next_x96, target);
        assert_eq!(result.amount_in, U256::from(1u8));
        assert_eq!(result.fee_amount, U256::from(1u8));
    }

    #[test]
    fn test_compute_swap_step_zero_liquidity_moves_to_target() {
        let target = Q96 / U256::from(2u8);
        let result = compute_swap_step(Q96, target, 0, E18, 3000).unwrap();

        assert_eq!(result.sqrt_ratio_next_x96, target);
        assert_eq!(result.amount_in, U256::ZERO);
        assert_eq!(result.amount_out, U256::ZERO);
    }

    proptest! {
        #[test]
        fn prop_exact_in_never_spends_more_than_remaining(
            liquidity in 1u128..u128::MAX / 2,
            amount in 1i128..i128::MAX,
            fee in 0u32..100_000,
            down in any::<bool>(),
        ) {
            let target = if down { Q96 / U256::from(2u8) } else { Q96 * U256::from(2u8) };
            let result = compute_swap_step(Q96, target, liquidity, amount, fee).unwrap();
            prop_assert!(result.amount_in + result.fee_amount <= U256::from(amount as u128));
            if down {
                prop_assert!(result.sqrt_ratio_next_x96 >= target && result.sqrt_ratio_next_x96 <= Q96);
            } else {
                prop_assert!(result.sqrt_ratio_next_x96 <= target && result.sqrt_ratio_next_x96 >= Q96);
            }
        }

        #[test]
        fn prop_exact_out_never_exceeds_requested(
            liquidity in 1u128..u128::MAX / 2,
            amount in 1i128..i128::MAX,
            fee in 0u32..100_000,
            down in any::<bool>(),
        ) {
            let target = if down { Q96 / U256::from(2u8) } else { Q96 * U256::from(2u8) };
            let result = compute_swap_step(Q96, target, liquidity, -amount, fee).unwrap();
            prop_assert!(result.amount_out <= U256::from(amount as u128));
        }
    }
}
