use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::codec::{CellBuilder, CellSlice, CodecError, Record};
use crate::Fee;

/// Current pool state, mutated only by pool operations
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    /// Current sqrt(price) as Q64.96
    pub sqrt_price_x96: U256,
    /// Current tick index
    pub tick: i32,
    /// Total liquidity currently in range
    pub liquidity: u128,
    /// Fee growth global for token0 (Q128.128, wrapping)
    pub fee_growth_global_0_x128: U256,
    /// Fee growth global for token1 (Q128.128, wrapping)
    pub fee_growth_global_1_x128: U256,
    /// Protocol fees accumulated for token0
    pub protocol_fees_0: u128,
    /// Protocol fees accumulated for token1
    pub protocol_fees_1: u128,
}

impl PoolState {
    pub fn new(sqrt_price_x96: U256, tick: i32) -> Self {
        Self {
            sqrt_price_x96,
            tick,
            liquidity: 0,
            fee_growth_global_0_x128: U256::ZERO,
            fee_growth_global_1_x128: U256::ZERO,
            protocol_fees_0: 0,
            protocol_fees_1: 0,
        }
    }
}

/// Pool configuration - immutable after creation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// The pool's own token0 wallet; transfer notifications for token0 come from here
    pub token0_wallet: Address,
    /// The pool's own token1 wallet
    pub token1_wallet: Address,
    /// Fee tier in hundredths of bps
    pub fee: Fee,
    /// Divisor of the swap fee diverted to the protocol, 0 disables it
    pub protocol_fee: u8,
    /// Tick spacing for this pool
    pub tick_spacing: i32,
    /// Maximum liquidity per tick
    pub max_liquidity_per_tick: u128,
    /// Bitmap words covered by each tick shard
    pub words_per_shard: u32,
    /// Seconds after which anyone may trigger a staging refund
    pub staging_timeout: u64,
}

/// Persisted pool root
///
/// pool#_ fee:uint24 tick_spacing:int24 tick:int24 sqrt_price_x96:uint160 liquidity:uint128 = PoolRoot;
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolRoot {
    pub fee: Fee,
    pub tick_spacing: i32,
    pub tick: i32,
    pub sqrt_price_x96: U256,
    pub liquidity: u128,
}

impl PoolRoot {
    pub fn new(config: &PoolConfig, state: &PoolState) -> Self {
        Self {
            fee: config.fee,
            tick_spacing: config.tick_spacing,
            tick: state.tick,
            sqrt_price_x96: state.sqrt_price_x96,
            liquidity: state.liquidity,
        }
    }
}

impl Record for PoolRoot {
    fn store(&self, builder: &mut CellBuilder) -> Result<(), CodecError> {
        builder.store_u64(self.fee as u64, 24)?;
        builder.store_int(self.tick_spacing as i128, 24)?;
        builder.store_int(self.tick as i128, 24)?;
        builder.store_uint(self.sqrt_price_x96, 160)?;
        builder.store_u128(self.liquidity, 128)?;
        Ok(())
    }

    fn load(slice: &mut CellSlice<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            fee: slice.load_u64(24)? as Fee,
            tick_spacing: slice.load_int(24)? as i32,
            tick: slice.load_int(24)? as i32,
            sqrt_price_x96: slice.load_uint(160)?,
            liquidity: slice.load_u128(128)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MAX_SQRT_RATIO, MIN_TICK};

    #[test]
    fn test_new_state_is_empty() {
        let state = PoolState::new(U256::from(1u8) << 96, 0);
        assert_eq!(state.liquidity, 0);
        assert_eq!(state.fee_growth_global_0_x128, U256::ZERO);
        assert_eq!(state.protocol_fees_1, 0);
    }

    #[test]
    fn test_root_layout_is_360_bits() {
        let root = PoolRoot {
            fee: 10000,
            tick_spacing: 200,
            tick: MIN_TICK,
            sqrt_price_x96: MAX_SQRT_RATIO - U256::from(1u8),
            liquidity: 1234,
        };
        let cell = root.to_cell().unwrap();
        assert_eq!(cell.bit_len(), 360);
        assert_eq!(PoolRoot::from_cell(&cell).unwrap(), root);
    }

    #[test]
    fn test_root_rejects_price_wider_than_160_bits() {
        let root = PoolRoot {
            fee: 500,
            tick_spacing: 10,
            tick: 0,
            sqrt_price_x96: U256::from(1u8) << 160,
            liquidity: 0,
        };
        assert!(matches!(
            root.to_cell(),
            Err(CodecError::ValueTooWide { bits: 160 })
        ));
    }
}
