use alloy_primitives::{keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::codec::{CellBuilder, CellSlice, CodecError, Record};

/// Position key for pool-level tracking
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub owner: Address,
    pub tick_lower: i32,
    pub tick_upper: i32,
}

impl PositionKey {
    pub fn new(owner: Address, tick_lower: i32, tick_upper: i32) -> Self {
        Self {
            owner,
            tick_lower,
            tick_upper,
        }
    }

    /// keccak256(owner ‖ int24 tick_lower ‖ int24 tick_upper)
    pub fn hash(&self) -> B256 {
        let mut packed = [0u8; 26];
        packed[..20].copy_from_slice(self.owner.as_slice());
        packed[20..23].copy_from_slice(&self.tick_lower.to_be_bytes()[1..]);
        packed[23..].copy_from_slice(&self.tick_upper.to_be_bytes()[1..]);
        keccak256(packed)
    }
}

/// Position info stored in the pool
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionInfo {
    /// Liquidity in this position
    pub liquidity: u128,
    /// Fee growth inside at last update (token0)
    pub fee_growth_inside_0_last_x128: U256,
    /// Fee growth inside at last update (token1)
    pub fee_growth_inside_1_last_x128: U256,
    /// Uncollected token0
    pub tokens_owed_0: u128,
    /// Uncollected token1
    pub tokens_owed_1: u128,
}

impl PositionInfo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Record for PositionInfo {
    fn store(&self, builder: &mut CellBuilder) -> Result<(), CodecError> {
        builder.store_u128(self.liquidity, 128)?;
        builder.store_uint(self.fee_growth_inside_0_last_x128, 256)?;
        builder.store_uint(self.fee_growth_inside_1_last_x128, 256)?;
        builder.store_u128(self.tokens_owed_0, 128)?;
        builder.store_u128(self.tokens_owed_1, 128)?;
        Ok(())
    }

    fn load(slice: &mut CellSlice<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            liquidity: slice.load_u128(128)?,
            fee_growth_inside_0_last_x128: slice.load_uint(256)?,
            fee_growth_inside_1_last_x128: slice.load_uint(256)?,
            tokens_owed_0: slice.load_u128(128)?,
            tokens_owed_1: slice.load_u128(128)?,
        })
    }
}
