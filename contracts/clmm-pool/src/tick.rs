use crate::error::{PoolError, Result};
use alloy_primitives::U256;
use clmm_math::{add_delta, MathError};
use clmm_types::TickInfo;

/// Update a tick with liquidity delta
/// Returns true if the tick was flipped (initialized or uninitialized)
///
/// `info` is left untouched when the update fails.
#[allow(clippy::too_many_arguments)]
pub fn update(
    info: &mut TickInfo,
    tick: i32,
    tick_current: i32,
    liquidity_delta: i128,
    fee_growth_global_0_x128: U256,
    fee_growth_global_1_x128: U256,
    upper: bool,
    max_liquidity: u128,
) -> Result<bool> {
    let liquidity_gross_before = info.liquidity_gross;
    let liquidity_gross_after = add_delta(liquidity_gross_before, liquidity_delta)?;

    if liquidity_gross_after > max_liquidity {
        return Err(PoolError::LiquidityGrossExceeded);
    }

    // Net is added for a lower tick and subtracted for an upper tick
    let liquidity_net = if upper {
        info.liquidity_net.checked_sub(liquidity_delta).ok_or(if liquidity_delta < 0 {
            MathError::LiquidityOverflow
        } else {
            MathError::LiquidityUnderflow
        })?
    } else {
        info.liquidity_net.checked_add(liquidity_delta).ok_or(if liquidity_delta > 0 {
            MathError::LiquidityOverflow
        } else {
            MathError::LiquidityUnderflow
        })?
    };

    let flipped = (liquidity_gross_after == 0) != (liquidity_gross_before == 0);

    if liquidity_gross_before == 0 {
        // All growth before initialization is assumed to have happened below the tick
        if tick <= tick_current {
            info.fee_growth_outside_0_x128 = fee_growth_global_0_x128;
            info.fee_growth_outside_1_x128 = fee_growth_global_1_x128;
        }
        info.initialized = true;
    }

    info.liquidity_gross = liquidity_gross_after;
    info.liquidity_net = liquidity_net;

    Ok(flipped)
}

/// Cross a tick during a swap
/// Returns the liquidity delta to apply when moving left to right
pub fn cross(
    info: &mut TickInfo,
    fee_growth_global_0_x128: U256,
    fee_growth_global_1_x128: U256,
) -> i128 {
    info.fee_growth_outside_0_x128 =
        fee_growth_global_0_x128.wrapping_sub(info.fee_growth_outside_0_x128);
    info.fee_growth_outside_1_x128 =
        fee_growth_global_1_x128.wrapping_sub(info.fee_growth_outside_1_x128);
    info.liquidity_net
}

/// Reset a tick whose gross liquidity went back to zero
pub fn clear(info: &mut TickInfo) {
    *info = TickInfo::default();
}

/// Fee growth inside a tick range, modulo 2^256
pub fn get_fee_growth_inside(
    lower: &TickInfo,
    upper: &TickInfo,
    tick_lower: i32,
    tick_upper: i32,
    tick_current: i32,
    fee_growth_global_0_x128: U256,
    fee_growth_global_1_x128: U256,
) -> (U256, U256) {
    let (fee_growth_below_0, fee_growth_below_1) = if tick_current >= tick_lower {
        (lower.fee_growth_outside_0_x128, lower.fee_growth_outside_1_x128)
    } else {
        (
            fee_growth_global_0_x128.wrapping_sub(lower.fee_growth_outside_0_x128),
            fee_growth_global_1_x128.wrapping_sub(lower.fee_growth_outside_1_x128),
        )
    };

    let (fee_growth_above_0, fee_growth_above_1) = if tick_current < tick_upper {
        (upper.fee_growth_outside_0_x128, upper.fee_growth_outside_1_x128)
    } else {
        (
            fee_growth_global_0_x128.wrapping_sub(upper.fee_growth_outside_0_x128),
            fee_growth_global_1_x128.wrapping_sub(upper.fee_growth_outside_1_x128),
        )
    };

    (
        fee_growth_global_0_x128
            .wrapping_sub(fee_growth_below_0)
            .wrapping_sub(fee_growth_above_0),
        fee_growth_global_1_x128
            .wrapping_sub(fee_growth_below_1)
            .wrapping_sub(fee_growth_above_1),
    )
}
