// ============================================================================
// INVARIANTS MODULE
// ============================================================================
//
// Predicates over pool, tick and position state. The synchronous pool checks
// them with debug assertions after every operation, and the tests use them
// to check whole stores after randomized operation sequences.
//
// INVARIANT CATEGORIES:
//
// 1. PRICE INVARIANTS
//    - Price is always within valid bounds
//    - Tick is consistent with sqrt price
//
// 2. LIQUIDITY INVARIANTS
//    - Liquidity net sums to zero across all ticks
//    - Tick gross liquidity respects the per-tick cap
//
// 3. FEE INVARIANTS
//    - Fee growth moves forward (modulo 2^256)
//
// 4. SWAP INVARIANTS
//    - Swap amounts have opposite signs
//    - Price moves in the swap direction and respects the limit
//
// 5. TICK INVARIANTS
//    - Tick bitmap is consistent with tick state
//    - Tick spacing is respected
//
// ============================================================================

use crate::storage::{TickAccess, TickShard, TickStore};
use alloy_primitives::U256;
use clmm_math::get_sqrt_ratio_at_tick;
use clmm_types::{PoolState, MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO, MIN_TICK};

// ============================================================================
// PRICE INVARIANTS
// ============================================================================

/// Invariant: sqrt_price is always within valid bounds
///
/// Property:
///   MIN_SQRT_RATIO <= sqrt_price_x96 < MAX_SQRT_RATIO
pub fn price_in_bounds(state: &PoolState) -> bool {
    state.sqrt_price_x96 >= MIN_SQRT_RATIO && state.sqrt_price_x96 < MAX_SQRT_RATIO
}

/// Invariant: tick is within valid bounds
///
/// Property:
///   MIN_TICK <= tick <= MAX_TICK
pub fn tick_in_bounds(state: &PoolState) -> bool {
    state.tick >= MIN_TICK && state.tick <= MAX_TICK
}

/// Invariant: the price lies in the tick's bucket
///
/// Property:
///   sqrt_ratio(tick) <= sqrt_price_x96 <= sqrt_ratio(tick + 1)
///
/// A swap that stops exactly on an initialized tick going down leaves the
/// tick one below, so the upper bound is inclusive.
pub fn tick_consistent_with_price(state: &PoolState) -> bool {
    let lower = match get_sqrt_ratio_at_tick(state.tick) {
        Ok(ratio) => ratio,
        Err(_) => return false,
    };
    if state.tick == MAX_TICK {
        return state.sqrt_price_x96 >= lower;
    }
    match get_sqrt_ratio_at_tick(state.tick + 1) {
        Ok(upper) => lower <= state.sqrt_price_x96 && state.sqrt_price_x96 <= upper,
        Err(_) => false,
    }
}

// ============================================================================
// LIQUIDITY INVARIANTS
// ============================================================================

/// Invariant: liquidity delta doesn't cause underflow or overflow
///
/// Property:
///   if delta < 0 then liquidity >= |delta|
pub fn liquidity_delta_valid(liquidity: u128, delta: i128) -> bool {
    if delta < 0 {
        liquidity >= delta.unsigned_abs()
    } else {
        liquidity.checked_add(delta as u128).is_some()
    }
}

/// Invariant: max liquidity per tick is respected
///
/// Property:
///   tick.liquidity_gross <= max_liquidity_per_tick
pub fn tick_liquidity_bounded(tick_liquidity_gross: u128, max_liquidity_per_tick: u128) -> bool {
    tick_liquidity_gross <= max_liquidity_per_tick
}

/// Invariant: liquidity_net sums to zero across all ticks
///
/// Property:
///   sum(tick.liquidity_net for all ticks) == 0
///
/// Every position adds at its lower tick what it removes at its upper tick.
pub fn liquidity_net_sums_to_zero<'a>(shards: impl IntoIterator<Item = &'a TickShard>) -> bool {
    let mut total: i128 = 0;
    for shard in shards {
        for (_, info) in shard.ticks() {
            total = match total.checked_add(info.liquidity_net) {
                Some(total) => total,
                None => return false,
            };
        }
    }
    total == 0
}

// ============================================================================
// FEE INVARIANTS
// ============================================================================

/// Invariant: fee growth global moves forward
///
/// Property:
///   fee_growth_new - fee_growth_old (mod 2^256) < 2^255
///
/// The accumulators wrap, so a "decrease" shows up as a huge difference.
pub fn fee_growth_monotonic(old_fee_growth: U256, new_fee_growth: U256) -> bool {
    let diff = new_fee_growth.wrapping_sub(old_fee_growth);
    !diff.bit(255)
}

/// Invariant: fee is within valid range
///
/// Property:
///   fee < 1_000_000
pub fn fee_valid(fee: u32) -> bool {
    fee < clmm_types::FEE_DENOMINATOR
}

// ============================================================================
// SWAP INVARIANTS
// ============================================================================

/// Invariant: amounts in a swap have correct signs
///
/// Property:
///   amount0 and amount1 never move in the same direction
pub fn swap_amounts_opposite_signs(amount0: i128, amount1: i128) -> bool {
    (amount0 > 0 && amount1 < 0) || (amount0 < 0 && amount1 > 0) || (amount0 == 0 || amount1 == 0)
}

/// Invariant: swap direction consistency
///
/// Property:
///   - zero_for_one => price decreases (sqrt_price_after <= sqrt_price_before)
///   - !zero_for_one => price increases (sqrt_price_after >= sqrt_price_before)
pub fn swap_direction_consistent(zero_for_one: bool, sqrt_price_before: U256, sqrt_price_after: U256) -> bool {
    if zero_for_one {
        sqrt_price_after <= sqrt_price_before
    } else {
        sqrt_price_after >= sqrt_price_before
    }
}

/// Invariant: swap respects price limit
///
/// Property:
///   - zero_for_one => sqrt_price_after >= sqrt_price_limit
///   - !zero_for_one => sqrt_price_after <= sqrt_price_limit
pub fn swap_respects_limit(zero_for_one: bool, sqrt_price_after: U256, sqrt_price_limit: U256) -> bool {
    if zero_for_one {
        sqrt_price_after >= sqrt_price_limit
    } else {
        sqrt_price_after <= sqrt_price_limit
    }
}

// ============================================================================
// TICK INVARIANTS
// ============================================================================

/// Invariant: tick is on spacing
///
/// Property:
///   tick % tick_spacing == 0
pub fn tick_on_spacing(tick: i32, tick_spacing: i32) -> bool {
    tick % tick_spacing == 0
}

/// Invariant: tick_lower < tick_upper for a position
pub fn tick_range_valid(tick_lower: i32, tick_upper: i32) -> bool {
    tick_lower < tick_upper
}

/// Invariant: tick bitmap consistency
///
/// Property:
///   tick is initialized in storage IFF bit is set in bitmap
pub fn tick_bitmap_consistent<S: TickStore>(store: &S, tick: i32) -> bool {
    let layout = store.layout();
    let initialized = match store.get(tick) {
        TickAccess::Ready(info) => info.initialized,
        TickAccess::Pending { .. } => return false,
    };
    let (word_pos, bit_pos) = crate::tick_bitmap::position(layout.compress(tick));
    let bit_set = match store.word(word_pos) {
        TickAccess::Ready(word) => word.bit(bit_pos as usize),
        TickAccess::Pending { .. } => return false,
    };
    initialized == bit_set
}

/// Every stored tick of a shard agrees with its bitmap and the gross cap
pub fn shard_consistent(shard: &TickShard, max_liquidity_per_tick: u128) -> bool {
    let spacing = shard.layout().tick_spacing;
    shard.ticks().all(|(tick, info)| {
        tick_on_spacing(*tick, spacing)
            && shard.contains_tick(*tick)
            && tick_liquidity_bounded(info.liquidity_gross, max_liquidity_per_tick)
            && info.initialized == (info.liquidity_gross > 0)
            && tick_bitmap_consistent(shard, *tick)
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{PagedTickStore, ShardLayout, TickContext, TickUpdate};
    use clmm_types::{TickInfo, Q96};

    fn state(sqrt_price_x96: U256, tick: i32) -> PoolState {
        PoolState::new(sqrt_price_x96, tick)
    }

    #[test]
    fn test_price_in_bounds_valid() {
        assert!(price_in_bounds(&state(Q96, 0)));
        assert!(price_in_bounds(&state(MIN_SQRT_RATIO, MIN_TICK)));
        assert!(!price_in_bounds(&state(MAX_SQRT_RATIO, MAX_TICK)));
    }

    #[test]
    fn test_tick_in_bounds_valid() {
        assert!(tick_in_bounds(&state(Q96, 0)));
        assert!(!tick_in_bounds(&state(Q96, MIN_TICK - 1)));
    }

    #[test]
    fn test_tick_consistent_with_price() {
        assert!(tick_consistent_with_price(&state(Q96, 0)));
        assert!(tick_consistent_with_price(&state(Q96, -1))); // Stopped on tick 0 going down
        assert!(!tick_consistent_with_price(&state(Q96, 1)));
        assert!(!tick_consistent_with_price(&state(Q96, -2)));
    }

    #[test]
    fn test_liquidity_delta_valid_add() {
        assert!(liquidity_delta_valid(1000, 500)); // Can add
        assert!(liquidity_delta_valid(0, 1000)); // Can add to zero
        assert!(!liquidity_delta_valid(u128::MAX, 1));
    }

    #[test]
    fn test_liquidity_delta_valid_remove() {
        assert!(liquidity_delta_valid(1000, -500)); // Can remove partial
        assert!(liquidity_delta_valid(1000, -1000)); // Can remove all
        assert!(!liquidity_delta_valid(1000, -1001)); // Cannot remove more
    }

    #[test]
    fn test_fee_growth_monotonic() {
        assert!(fee_growth_monotonic(U256::from(100u8), U256::from(200u8)));
        assert!(fee_growth_monotonic(U256::from(100u8), U256::from(100u8)));
        assert!(!fee_growth_monotonic(U256::from(200u8), U256::from(100u8)));
        // Wrapping past zero is still forward
        assert!(fee_growth_monotonic(U256::MAX, U256::from(5u8)));
    }

    #[test]
    fn test_fee_valid() {
        assert!(fee_valid(3000));
        assert!(!fee_valid(1_000_000));
    }

    #[test]
    fn test_swap_direction_consistent() {
        let (low, high) = (U256::from(900u16), U256::from(1000u16));
        assert!(swap_direction_consistent(true, high, low));
        assert!(swap_direction_consistent(true, high, high)); // No change OK
        assert!(!swap_direction_consistent(true, low, high));
        assert!(swap_direction_consistent(false, low, high));
        assert!(!swap_direction_consistent(false, high, low));
    }

    #[test]
    fn test_swap_respects_limit() {
        let (low, high) = (U256::from(400u16), U256::from(500u16));
        assert!(swap_respects_limit(true, high, low)); // Above limit
        assert!(swap_respects_limit(true, low, low)); // At limit
        assert!(!swap_respects_limit(true, low, high)); // Below limit
        assert!(swap_respects_limit(false, low, high));
        assert!(!swap_respects_limit(false, high, low));
    }

    #[test]
    fn test_swap_amounts_opposite_signs() {
        assert!(swap_amounts_opposite_signs(100, -50)); // Normal swap
        assert!(swap_amounts_opposite_signs(-100, 50)); // Reverse
        assert!(swap_amounts_opposite_signs(0, 0)); // No amounts
        assert!(!swap_amounts_opposite_signs(100, 100)); // Both positive
        assert!(!swap_amounts_opposite_signs(-100, -100)); // Both negative
    }

    #[test]
    fn test_tick_on_spacing() {
        assert!(tick_on_spacing(60, 60));
        assert!(tick_on_spacing(-60, 60));
        assert!(!tick_on_spacing(65, 60));
    }

    #[test]
    fn test_tick_range_valid() {
        assert!(tick_range_valid(-100, 100));
        assert!(!tick_range_valid(100, 100)); // Equal
        assert!(!tick_range_valid(100, -100)); // Reversed
    }

    #[test]
    fn test_store_consistency_after_updates() {
        let layout = ShardLayout::new(10, 1);
        let mut store = PagedTickStore::new(layout);
        let context = TickContext {
            tick_current: 0,
            fee_growth_global_0_x128: U256::ZERO,
            fee_growth_global_1_x128: U256::ZERO,
            max_liquidity: 1_000,
        };
        for (tick, delta, upper) in [(-3000, 100, false), (50, 100, true), (50, -100, true), (3000, 100, true)] {
            let update = TickUpdate {
                tick,
                liquidity_delta: delta,
                upper,
            };
            store.apply_tick_update(&update, &context).unwrap();
        }

        for tick in [-3000, 50, 3000] {
            assert!(tick_bitmap_consistent(&store, tick));
        }
        let shards: Vec<_> = [-2, 1].iter().filter_map(|i| store.shard(*i)).collect();
        assert_eq!(shards.len(), 2);
        assert!(shards.iter().all(|shard| shard_consistent(shard, 1_000)));
        assert!(liquidity_net_sums_to_zero(shards));
    }

    #[test]
    fn test_shard_inconsistent_when_bit_missing() {
        let mut shard = TickShard::new(ShardLayout::new(10, 1), 0);
        let info = TickInfo {
            liquidity_gross: 5,
            liquidity_net: 5,
            initialized: true,
            ..TickInfo::default()
        };
        assert!(shard.set(20, info).is_ready());
        assert!(!shard_consistent(&shard, u128::MAX));
        assert!(!liquidity_net_sums_to_zero([&shard]));
    }
}
