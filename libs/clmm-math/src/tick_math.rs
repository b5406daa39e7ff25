use crate::bit_math::most_significant_bit;
use crate::error::MathError;
use alloy_primitives::{I256, U256};
use clmm_types::{MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO};

// log_sqrt(1.0001)(2) in Q128 and the error bounds of the log approximation
const SQRT_10001: I256 = I256::from_raw(U256::from_limbs([11745905768312294533, 13863, 0, 0]));
const TICK_LOW: I256 = I256::from_raw(U256::from_limbs([
    6552757943157144234,
    184476617836266586,
    0,
    0,
]));
const TICK_HIGH: I256 = I256::from_raw(U256::from_limbs([
    4998474450511881007,
    15793544031827761793,
    0,
    0,
]));

/// 1/sqrt(1.0001)^(2^i) in Q128, for i = 1..=19
const MULTIPLIERS: [(u32, u64, u64); 19] = [
    (0x2, 6459403834229662010, 18444899583751176498),
    (0x4, 17226890335427755468, 18443055278223354162),
    (0x8, 2032852871939366096, 18439367220385604838),
    (0x10, 14545316742740207172, 18431993317065449817),
    (0x20, 5129152022828963008, 18417254355718160513),
    (0x40, 4894419605888772193, 18387811781193591352),
    (0x80, 1280255884321894483, 18329067761203520168),
    (0x100, 15924666964335305636, 18212142134806087854),
    (0x200, 8010504389359918676, 17980523815641551639),
    (0x400, 10668036004952895731, 17526086738831147013),
    (0x800, 4878133418470705625, 16651378430235024244),
    (0x1000, 9537173718739605541, 15030750278693429944),
    (0x2000, 9972618978014552549, 12247334978882834399),
    (0x4000, 10428997489610666743, 8131365268884726200),
    (0x8000, 9305304367709015974, 3584323654723342297),
    (0x10000, 14301143598189091785, 696457651847595233),
    (0x20000, 7393154844743099908, 26294789957452057),
    (0x40000, 2209338891292245656, 37481735321082),
    (0x80000, 10518117631919034274, 76158723),
];

/// Calculates sqrt(1.0001^tick) * 2^96
///
/// Fails with `TickOutOfRange` when `|tick| > MAX_TICK`.
pub fn get_sqrt_ratio_at_tick(tick: i32) -> Result<U256, MathError> {
    let abs_tick = tick.unsigned_abs();
    if abs_tick > MAX_TICK as u32 {
        return Err(MathError::TickOutOfRange);
    }

    let mut ratio = if abs_tick & 0x1 != 0 {
        U256::from_limbs([12262481743371124737, 18445821805675392311, 0, 0])
    } else {
        U256::from_limbs([0, 0, 1, 0])
    };

    for (bit, lo, hi) in MULTIPLIERS {
        if abs_tick & bit != 0 {
            ratio = ratio.wrapping_mul(U256::from_limbs([lo, hi, 0, 0])) >> 128;
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 to Q64.96, rounding up so the inverse lookup is consistent
    let round = ratio.as_limbs()[0] & 0xFFFF_FFFF != 0;
    Ok((ratio >> 32) + U256::from(round as u8))
}

/// Greatest tick whose sqrt ratio is less than or equal to `sqrt_price_x96`
///
/// Valid input is `[MIN_SQRT_RATIO, MAX_SQRT_RATIO)`; anything else fails with
/// `RatioOutOfRange`.
pub fn get_tick_at_sqrt_ratio(sqrt_price_x96: U256) -> Result<i32, MathError> {
    if sqrt_price_x96 < MIN_SQRT_RATIO || sqrt_price_x96 >= MAX_SQRT_RATIO {
        return Err(MathError::RatioOutOfRange);
    }

    let ratio = sqrt_price_x96 << 32;
    let msb = most_significant_bit(ratio)? as usize;

    let mut r = if msb >= 128 {
        ratio >> (msb - 127)
    } else {
        ratio << (127 - msb)
    };

    let mut log_2: I256 = (I256::from_raw(U256::from(msb)) - I256::from_raw(U256::from(128u8))) << 64;

    for shift in (50..=63usize).rev() {
        r = r.wrapping_mul(r) >> 127;
        let f: U256 = r >> 128;
        log_2 |= I256::from_raw(f << shift);
        if !f.is_zero() {
            r >>= 1;
        }
    }

    let log_sqrt10001 = log_2.wrapping_mul(SQRT_10001);
    let tick_low_shifted: I256 = (log_sqrt10001 - TICK_LOW) >> 128;
    let tick_low = tick_low_shifted.low_i32();
    let tick_high_shifted: I256 = (log_sqrt10001 + TICK_HIGH) >> 128;
    let tick_high = tick_high_shifted.low_i32();

    if tick_low == tick_high {
        Ok(tick_low)
    } else if get_sqrt_ratio_at_tick(tick_high)? <= sqrt_price_x96 {
        Ok(tick_high)
    } else {
        Ok(tick_low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clmm_types::{MIN_TICK, Q96};
    use proptest::prelude::*;

    fn u(s: &str) -> U256 {
        U256::from_str_radix(s, 10).unwrap()
    }

    // === get_sqrt_ratio_at_tick tests ===

    #[test]
    fn test_get_sqrt_ratio_at_tick_bounds() {
        assert_eq!(get_sqrt_ratio_at_tick(MIN_TICK - 1), Err(MathError::TickOutOfRange));
        assert_eq!(get_sqrt_ratio_at_tick(MAX_TICK + 1), Err(MathError::TickOutOfRange));
    }

    #[test]
    fn test_get_sqrt_ratio_at_tick_zero() {
        assert_eq!(get_sqrt_ratio_at_tick(0).unwrap(), Q96);
    }

    #[test]
    fn test_get_sqrt_ratio_at_tick_extremes() {
        assert_eq!(get_sqrt_ratio_at_tick(MIN_TICK).unwrap(), MIN_SQRT_RATIO);
        assert_eq!(get_sqrt_ratio_at_tick(MIN_TICK + 1).unwrap(), U256::from(4295343490u64));
        assert_eq!(
            get_sqrt_ratio_at_tick(MAX_TICK - 1).unwrap(),
            u("1461373636630004318706518188784493106690254656249")
        );
        assert_eq!(get_sqrt_ratio_at_tick(MAX_TICK).unwrap(), MAX_SQRT_RATIO);
    }

    #[test]
    fn test_get_sqrt_ratio_at_tick_adjacent_to_zero() {
        assert_eq!(
            get_sqrt_ratio_at_tick(1).unwrap(),
            u("79232123823359799118286999568")
        );
        assert_eq!(
            get_sqrt_ratio_at_tick(-1).unwrap(),
            u("79224201403219477170569942574")
        );
    }

    #[test]
    fn test_get_sqrt_ratio_at_tick_known_values() {
        let cases: [(i32, &str); 8] = [
            (50, "79426470787362580746886972461"),
            (100, "79625275426524748796330556128"),
            (500, "81233731461783161732293370115"),
            (1000, "83290069058676223003182343270"),
            (5000, "101729702841318637793976746270"),
            (50000, "965075977353221155028623082916"),
            (250000, "21246587762933397357449903968194344"),
            (738203, "847134979253254120489401328389043031315994541"),
        ];
        for (tick, expected) in cases {
            assert_eq!(get_sqrt_ratio_at_tick(tick).unwrap(), u(expected), "tick {tick}");
        }
    }

    #[test]
    fn test_get_sqrt_ratio_at_tick_monotonic() {
        let mut previous = get_sqrt_ratio_at_tick(MIN_TICK).unwrap();
        for tick in (MIN_TICK + 1..=MAX_TICK).step_by(9973) {
            let current = get_sqrt_ratio_at_tick(tick).unwrap();
            assert!(current > previous);
            previous = current;
        }
    }

    // === get_tick_at_sqrt_ratio tests ===

    #[test]
    fn test_get_tick_at_sqrt_ratio_out_of_range() {
        assert_eq!(
            get_tick_at_sqrt_ratio(MIN_SQRT_RATIO - U256::from(1u8)),
            Err(MathError::RatioOutOfRange)
        );
        assert_eq!(get_tick_at_sqrt_ratio(MAX_SQRT_RATIO), Err(MathError::RatioOutOfRange));
    }

    #[test]
    fn test_get_tick_at_sqrt_ratio_extremes() {
        assert_eq!(get_tick_at_sqrt_ratio(MIN_SQRT_RATIO).unwrap(), MIN_TICK);
        assert_eq!(get_tick_at_sqrt_ratio(U256::from(4295343490u64)).unwrap(), MIN_TICK + 1);
        assert_eq!(
            get_tick_at_sqrt_ratio(u("1461373636630004318706518188784493106690254656249")).unwrap(),
            MAX_TICK - 1
        );
        assert_eq!(
            get_tick_at_sqrt_ratio(MAX_SQRT_RATIO - U256::from(1u8)).unwrap(),
            MAX_TICK - 1
        );
    }

    #[test]
    fn test_get_tick_at_sqrt_ratio_q96() {
        assert_eq!(get_tick_at_sqrt_ratio(Q96).unwrap(), 0);
        assert_eq!(get_tick_at_sqrt_ratio(Q96 - U256::from(1u8)).unwrap(), -1);
    }

    proptest! {
        #[test]
        fn prop_tick_round_trip(tick in MIN_TICK..MAX_TICK) {
            let ratio = get_sqrt_ratio_at_tick(tick).unwrap();
            prop_assert_eq!(get_tick_at_sqrt_ratio(ratio).unwrap(), tick);
        }

        #[test]
        fn prop_tick_brackets_ratio(limbs in prop::array::uniform3(any::<u64>())) {
            let raw = U256::from_limbs([limbs[0], limbs[1], limbs[2] & 0xFFFF_FFFF, 0]);
            let ratio = MIN_SQRT_RATIO + raw % (MAX_SQRT_RATIO - MIN_SQRT_RATIO);
            let tick = get_tick_at_sqrt_ratio(ratio).unwrap();
            prop_assert!(get_sqrt_ratio_at_tick(tick).unwrap() <= ratio);
            prop_assert!(get_sqrt_ratio_at_tick(tick + 1).unwrap() > ratio);
        }
    }
}
