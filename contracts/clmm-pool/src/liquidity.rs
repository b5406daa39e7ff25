//! Position bookkeeping shared by the synchronous pool and the pool actor.

use crate::error::{PoolError, Result};
use crate::position::{self, PositionStore};
use crate::tick::get_fee_growth_inside;
use alloy_primitives::U256;
use clmm_math::{add_delta, get_amount0_delta, get_amount1_delta, get_sqrt_ratio_at_tick, MathError};
use clmm_types::{PoolState, PositionInfo, PositionKey, TickInfo, MAX_TICK, MIN_TICK};

/// Validate tick range
pub fn validate_ticks(tick_lower: i32, tick_upper: i32, tick_spacing: i32) -> Result<()> {
    if tick_lower >= tick_upper {
        return Err(PoolError::InvalidRange);
    }
    if tick_lower < MIN_TICK || tick_upper > MAX_TICK {
        return Err(PoolError::InvalidRange);
    }
    if tick_lower % tick_spacing != 0 || tick_upper % tick_spacing != 0 {
        return Err(PoolError::InvalidRange);
    }
    Ok(())
}

/// Signed liquidity delta for an unsigned amount
pub fn liquidity_delta(liquidity: u128, adding: bool) -> Result<i128> {
    let delta = i128::try_from(liquidity).map_err(|_| MathError::LiquidityOverflow)?;
    Ok(if adding { delta } else { -delta })
}

/// Token amounts owed to (positive delta) or by (negative delta) the pool
///
/// Rounds up when liquidity is added and down when it is removed.
pub fn amounts_for_delta(
    state: &PoolState,
    tick_lower: i32,
    tick_upper: i32,
    liquidity_delta: i128,
) -> Result<(U256, U256)> {
    let liquidity = liquidity_delta.unsigned_abs();
    let round_up = liquidity_delta > 0;
    let sqrt_lower = get_sqrt_ratio_at_tick(tick_lower)?;
    let sqrt_upper = get_sqrt_ratio_at_tick(tick_upper)?;

    if state.tick < tick_lower {
        // Below range - only token0
        let amount0 = get_amount0_delta(sqrt_lower, sqrt_upper, liquidity, round_up)?;
        Ok((amount0, U256::ZERO))
    } else if state.tick < tick_upper {
        let amount0 = get_amount0_delta(state.sqrt_price_x96, sqrt_upper, liquidity, round_up)?;
        let amount1 = get_amount1_delta(sqrt_lower, state.sqrt_price_x96, liquidity, round_up)?;
        Ok((amount0, amount1))
    } else {
        // Above range - only token1
        let amount1 = get_amount1_delta(sqrt_lower, sqrt_upper, liquidity, round_up)?;
        Ok((U256::ZERO, amount1))
    }
}

/// Apply a liquidity delta to a position once both boundary ticks are updated
///
/// `lower` and `upper` are the boundary entries right after their update.
/// Position and pool liquidity are only written when both succeed.
#[allow(clippy::too_many_arguments)]
pub fn modify_position(
    state: &mut PoolState,
    positions: &mut PositionStore,
    key: &PositionKey,
    liquidity_delta: i128,
    lower: &TickInfo,
    upper: &TickInfo,
) -> Result<PositionInfo> {
    let (fee_growth_inside_0, fee_growth_inside_1) = get_fee_growth_inside(
        lower,
        upper,
        key.tick_lower,
        key.tick_upper,
        state.tick,
        state.fee_growth_global_0_x128,
        state.fee_growth_global_1_x128,
    );

    let mut info = positions.get(key);
    position::update(&mut info, liquidity_delta, fee_growth_inside_0, fee_growth_inside_1)?;

    // Only in-range positions contribute to active liquidity
    let liquidity = if state.tick >= key.tick_lower && state.tick < key.tick_upper {
        add_delta(state.liquidity, liquidity_delta)?
    } else {
        state.liquidity
    };

    state.liquidity = liquidity;
    positions.set(key, info.clone());
    Ok(info)
}

/// Burned principal as owed token amounts
pub fn owed_amounts(amount0: U256, amount1: U256) -> Result<(u128, u128)> {
    let amount0 = u128::try_from(amount0).map_err(|_| MathError::Overflow)?;
    let amount1 = u128::try_from(amount1).map_err(|_| MathError::Overflow)?;
    Ok((amount0, amount1))
}

/// Credit burned principal to the position's owed tokens
pub fn credit_owed(position: &mut PositionInfo, (amount0, amount1): (u128, u128)) {
    position.tokens_owed_0 = position.tokens_owed_0.wrapping_add(amount0);
    position.tokens_owed_1 = position.tokens_owed_1.wrapping_add(amount1);
}

/// Withdraw up to the requested owed amounts
/// Returns (amount0, amount1) actually collected
pub fn collect(
    position: &mut PositionInfo,
    amount0_requested: u128,
    amount1_requested: u128,
) -> (u128, u128) {
    let amount0 = amount0_requested.min(position.tokens_owed_0);
    let amount1 = amount1_requested.min(position.tokens_owed_1);
    position.tokens_owed_0 -= amount0;
    position.tokens_owed_1 -= amount1;
    (amount0, amount1)
}
