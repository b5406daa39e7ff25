mod address;
pub mod codec;
mod pool;
mod position;
mod tick;

pub use address::*;
pub use codec::{Cell, CellBuilder, CellSlice, CodecError, Record};
pub use pool::*;
pub use position::*;
pub use tick::*;

use alloy_primitives::U256;

/// Q96 constant (2^96) for sqrt price fixed-point math
pub const Q96: U256 = U256::from_limbs([0, 1 << 32, 0, 0]);

/// Q128 constant (2^128) for fee growth fixed-point math
pub const Q128: U256 = U256::from_limbs([0, 0, 1, 0]);

/// Minimum tick index, log base sqrt(1.0001) of 2^-128
pub const MIN_TICK: i32 = -887272;

/// Maximum tick index, log base sqrt(1.0001) of 2^128
pub const MAX_TICK: i32 = -MIN_TICK;

/// Sqrt ratio at MIN_TICK
pub const MIN_SQRT_RATIO: U256 = U256::from_limbs([4295128739, 0, 0, 0]);

/// Sqrt ratio at MAX_TICK (exclusive upper bound of valid prices)
pub const MAX_SQRT_RATIO: U256 =
    U256::from_limbs([6743328256752651558, 17280870778742802505, 4294805859, 0]);

/// Fee amount in hundredths of a basis point (1e-6)
/// 500 = 0.05%, 3000 = 0.3%, 10000 = 1%
pub type Fee = u32;

/// Fee pips denominator
pub const FEE_DENOMINATOR: u32 = 1_000_000;

pub const FEE_LOW: Fee = 500;
pub const FEE_MEDIUM: Fee = 3000;
pub const FEE_HIGH: Fee = 10000;

/// Number of 256-tick bitmap words held by one tick shard unless configured otherwise
pub const DEFAULT_WORDS_PER_SHARD: u32 = 16;

/// Get tick spacing for a given fee amount
pub fn fee_to_tick_spacing(fee: Fee) -> Option<i32> {
    match fee {
        FEE_LOW => Some(10),
        FEE_MEDIUM => Some(60),
        FEE_HIGH => Some(200),
        _ => None,
    }
}

/// Lowest tick a position may use for the given spacing
pub fn min_usable_tick(tick_spacing: i32) -> i32 {
    -(MAX_TICK / tick_spacing) * tick_spacing
}

/// Highest tick a position may use for the given spacing
pub fn max_usable_tick(tick_spacing: i32) -> i32 {
    (MAX_TICK / tick_spacing) * tick_spacing
}

/// Calculate maximum liquidity per tick for a given tick spacing
pub fn max_liquidity_per_tick(tick_spacing: i32) -> u128 {
    let min_tick = (MIN_TICK / tick_spacing) * tick_spacing;
    let max_tick = (MAX_TICK / tick_spacing) * tick_spacing;
    let num_ticks = ((max_tick - min_tick) / tick_spacing) as u128 + 1;
    u128::MAX / num_ticks
}
