use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::codec::{CellBuilder, CellSlice, CodecError, Record};

/// Information stored for each initialized tick
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickInfo {
    /// Total liquidity referencing this tick
    pub liquidity_gross: u128,
    /// Net liquidity change when tick is crossed (+ when moving right)
    pub liquidity_net: i128,
    /// Fee growth per unit liquidity on the other side of this tick (token0)
    pub fee_growth_outside_0_x128: U256,
    /// Fee growth per unit liquidity on the other side of this tick (token1)
    pub fee_growth_outside_1_x128: U256,
    /// True if tick has been initialized
    pub initialized: bool,
}

impl TickInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cleared entry carries nothing worth persisting
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// tick#_ liquidity_gross:uint128 liquidity_net:int128
//        fee_growth_outside_0_x128:uint256 fee_growth_outside_1_x128:uint256
//        initialized:Bool = TickInfo;
impl Record for TickInfo {
    fn store(&self, builder: &mut CellBuilder) -> Result<(), CodecError> {
        builder.store_u128(self.liquidity_gross, 128)?;
        builder.store_int(self.liquidity_net, 128)?;
        builder.store_uint(self.fee_growth_outside_0_x128, 256)?;
        builder.store_uint(self.fee_growth_outside_1_x128, 256)?;
        builder.store_bit(self.initialized)?;
        Ok(())
    }

    fn load(slice: &mut CellSlice<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            liquidity_gross: slice.load_u128(128)?,
            liquidity_net: slice.load_int(128)?,
            fee_growth_outside_0_x128: slice.load_uint(256)?,
            fee_growth_outside_1_x128: slice.load_uint(256)?,
            initialized: slice.load_bit()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_empty() {
        assert!(TickInfo::new().is_empty());
        let info = TickInfo {
            initialized: true,
            ..Default::default()
        };
        assert!(!info.is_empty());
    }

    #[test]
    fn test_record_layout_is_769_bits() {
        let info = TickInfo {
            liquidity_gross: u128::MAX,
            liquidity_net: i128::MIN,
            fee_growth_outside_0_x128: U256::MAX,
            fee_growth_outside_1_x128: U256::from(7u8),
            initialized: true,
        };
        let cell = info.to_cell().unwrap();
        assert_eq!(cell.bit_len(), 128 + 128 + 256 + 256 + 1);
        assert_eq!(TickInfo::from_cell(&cell).unwrap(), info);
    }

    #[test]
    fn test_record_negative_net() {
        let info = TickInfo {
            liquidity_gross: 5,
            liquidity_net: -5,
            ..Default::default()
        };
        let cell = info.to_cell().unwrap();
        // liquidity_net starts right after the 128-bit gross field
        let mut slice = cell.parse();
        slice.skip(128).unwrap();
        assert_eq!(slice.load_int(128).unwrap(), -5);
    }
}
