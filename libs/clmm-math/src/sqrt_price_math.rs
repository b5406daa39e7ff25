use crate::error::MathError;
use crate::full_math::{div_rounding_up, mul_div, mul_div_rounding_up};
use alloy_primitives::U256;
use clmm_types::Q96;

/// Largest value representable in 160 bits
const MAX_U160: U256 = U256::from_limbs([u64::MAX, u64::MAX, u32::MAX as u64, 0]);

fn sorted(a: U256, b: U256) -> (U256, U256) {
    if a > b {
        (b, a)
    } else {
        (a, b)
    }
}

/// Next sqrt price given a delta of token0, always rounding up
///
/// Adding token0 moves the price down, removing it moves the price up. The
/// result is rounded up in both cases so the pool never under-collects.
pub fn get_next_sqrt_price_from_amount0_rounding_up(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, MathError> {
    if amount.is_zero() {
        return Ok(sqrt_price_x96);
    }
    let numerator1: U256 = U256::from(liquidity) << 96;

    if add {
        if let Some(product) = amount.checked_mul(sqrt_price_x96) {
            if let Some(denominator) = numerator1.checked_add(product) {
                return mul_div_rounding_up(numerator1, sqrt_price_x96, denominator);
            }
        }
        let denominator = (numerator1 / sqrt_price_x96)
            .checked_add(amount)
            .ok_or(MathError::Overflow)?;
        div_rounding_up(numerator1, denominator)
    } else {
        let product = amount
            .checked_mul(sqrt_price_x96)
            .ok_or(MathError::PriceOverflow)?;
        if numerator1 <= product {
            return Err(MathError::PriceOverflow);
        }
        let next = mul_div_rounding_up(numerator1, sqrt_price_x96, numerator1 - product)?;
        if next > MAX_U160 {
            return Err(MathError::PriceOverflow);
        }
        Ok(next)
    }
}

/// Next sqrt price given a delta of token1, always rounding down
pub fn get_next_sqrt_price_from_amount1_rounding_down(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, MathError> {
    let liquidity = U256::from(liquidity);

    if add {
        let quotient = if amount <= MAX_U160 {
            (amount << 96) / liquidity
        } else {
            mul_div(amount, Q96, liquidity)?
        };
        let next = sqrt_price_x96
            .checked_add(quotient)
            .ok_or(MathError::PriceOverflow)?;
        if next > MAX_U160 {
            return Err(MathError::PriceOverflow);
        }
        Ok(next)
    } else {
        let quotient = if amount <= MAX_U160 {
            div_rounding_up(amount << 96, liquidity)?
        } else {
            mul_div_rounding_up(amount, Q96, liquidity)?
        };
        if sqrt_price_x96 <= quotient {
            return Err(MathError::PriceUnderflow);
        }
        Ok(sqrt_price_x96 - quotient)
    }
}

/// Next sqrt price after swapping `amount_in` of the input token
pub fn get_next_sqrt_price_from_input(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount_in: U256,
    zero_for_one: bool,
) -> Result<U256, MathError> {
    if sqrt_price_x96.is_zero() {
        return Err(MathError::ZeroPrice);
    }
    if liquidity == 0 {
        return Err(MathError::ZeroLiquidity);
    }

    if zero_for_one {
        get_next_sqrt_price_from_amount0_rounding_up(sqrt_price_x96, liquidity, amount_in, true)
    } else {
        get_next_sqrt_price_from_amount1_rounding_down(sqrt_price_x96, liquidity, amount_in, true)
    }
}

/// Next sqrt price after taking `amount_out` of the output token
pub fn get_next_sqrt_price_from_output(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount_out: U256,
    zero_for_one: bool,
) -> Result<U256, MathError> {
    if sqrt_price_x96.is_zero() {
        return Err(MathError::ZeroPrice);
    }
    if liquidity == 0 {
        return Err(MathError::ZeroLiquidity);
    }

    if zero_for_one {
        get_next_sqrt_price_from_amount1_rounding_down(sqrt_price_x96, liquidity, amount_out, false)
    } else {
        get_next_sqrt_price_from_amount0_rounding_up(sqrt_price_x96, liquidity, amount_out, false)
    }
}

/// Amount of token0 between two sqrt prices for a given liquidity
///
/// `liquidity * (sqrt(upper) - sqrt(lower)) / (sqrt(upper) * sqrt(lower))`
pub fn get_amount0_delta(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, MathError> {
    let (lower, upper) = sorted(sqrt_ratio_a_x96, sqrt_ratio_b_x96);
    if lower.is_zero() {
        return Err(MathError::ZeroPrice);
    }

    let numerator1 = U256::from(liquidity) << 96;
    let numerator2 = upper - lower;

    if round_up {
        div_rounding_up(mul_div_rounding_up(numerator1, numerator2, upper)?, lower)
    } else {
        Ok(mul_div(numerator1, numerator2, upper)? / lower)
    }
}

/// Amount of token1 between two sqrt prices for a given liquidity
///
/// `liquidity * (sqrt(upper) - sqrt(lower))`
pub fn get_amount1_delta(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, MathError> {
    let (lower, upper) = sorted(sqrt_ratio_a_x96, sqrt_ratio_b_x96);
    let liquidity = U256::from(liquidity);

    if round_up {
        mul_div_rounding_up(liquidity, upper - lower, Q96)
    } else {
        mul_div(liquidity, upper - lower, Q96)
    }
}
