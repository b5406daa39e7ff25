use crate::error::{PoolError, Result};
use alloy_primitives::{B256, U256};
use clmm_math::{add_delta, mul_div};
use clmm_types::{PositionInfo, PositionKey, Q128};
use std::collections::BTreeMap;

/// Low 128 bits of a 256-bit value
fn truncate_u128(value: U256) -> u128 {
    let limbs = value.as_limbs();
    (limbs[0] as u128) | ((limbs[1] as u128) << 64)
}

/// Fees earned by `liquidity` since the last fee growth snapshot
fn fees_owed(fee_growth_inside_x128: U256, fee_growth_inside_last_x128: U256, liquidity: u128) -> Result<u128> {
    let growth = fee_growth_inside_x128.wrapping_sub(fee_growth_inside_last_x128);
    Ok(truncate_u128(mul_div(growth, U256::from(liquidity), Q128)?))
}

/// Credit fees accrued so far and apply a liquidity delta
///
/// Fees are computed on the liquidity held before the delta. A zero delta on
/// an empty position is rejected since there is nothing to poke.
pub fn update(
    position: &mut PositionInfo,
    liquidity_delta: i128,
    fee_growth_inside_0_x128: U256,
    fee_growth_inside_1_x128: U256,
) -> Result<()> {
    let liquidity_next = if liquidity_delta == 0 {
        if position.liquidity == 0 {
            return Err(PoolError::NoPosition);
        }
        position.liquidity
    } else {
        add_delta(position.liquidity, liquidity_delta)?
    };

    let tokens_owed_0 = fees_owed(
        fee_growth_inside_0_x128,
        position.fee_growth_inside_0_last_x128,
        position.liquidity,
    )?;
    let tokens_owed_1 = fees_owed(
        fee_growth_inside_1_x128,
        position.fee_growth_inside_1_last_x128,
        position.liquidity,
    )?;

    position.liquidity = liquidity_next;
    position.fee_growth_inside_0_last_x128 = fee_growth_inside_0_x128;
    position.fee_growth_inside_1_last_x128 = fee_growth_inside_1_x128;
    position.tokens_owed_0 = position.tokens_owed_0.wrapping_add(tokens_owed_0);
    position.tokens_owed_1 = position.tokens_owed_1.wrapping_add(tokens_owed_1);

    Ok(())
}

/// Positions keyed by the hash of (owner, tick_lower, tick_upper)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PositionStore {
    positions: BTreeMap<B256, PositionInfo>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PositionKey) -> PositionInfo {
        self.positions.get(&key.hash()).cloned().unwrap_or_default()
    }

    /// Positions are never dropped implicitly, even at zero liquidity
    pub fn set(&mut self, key: &PositionKey, info: PositionInfo) {
        self.positions.insert(key.hash(), info);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
