//! Packed index of initialized ticks.
//!
//! One bit per compressed tick (`tick / tick_spacing`), 256 bits per word.
//! These helpers work on a single word; reading and writing words is the
//! job of the [`TickStore`](crate::storage::TickStore).

use alloy_primitives::U256;

/// Word index and bit position of a compressed tick
pub fn position(compressed: i32) -> (i32, u8) {
    (compressed >> 8, compressed.rem_euclid(256) as u8)
}

/// Bit mask selecting only the position's bit
pub fn bit_mask(bit_pos: u8) -> U256 {
    U256::from(1u8) << bit_pos as usize
}

/// Next initialized compressed tick in the word holding the search start
///
/// With `lte` the search covers the query position and everything below it in
/// the word; otherwise it starts one position above the query. Without a set
/// bit the word boundary in the search direction is returned. The result
/// never leaves the word containing the position that was searched.
pub fn next_initialized_in_word(word: U256, compressed: i32, lte: bool) -> (i32, bool) {
    if lte {
        let (_, bit_pos) = position(compressed);
        // All bits at or below the current position
        let mask = bit_mask(bit_pos) - U256::from(1u8) + bit_mask(bit_pos);
        let masked = word & mask;

        if masked.is_zero() {
            (compressed - bit_pos as i32, false)
        } else {
            let msb = 255 - masked.leading_zeros() as i32;
            (compressed - (bit_pos as i32 - msb), true)
        }
    } else {
        let start = compressed + 1;
        let (_, bit_pos) = position(start);
        // All bits at or above the start position
        let mask = !(bit_mask(bit_pos) - U256::from(1u8));
        let masked = word & mask;

        if masked.is_zero() {
            (start + (255 - bit_pos as i32), false)
        } else {
            let lsb = masked.trailing_zeros() as i32;
            (start + (lsb - bit_pos as i32), true)
        }
    }
}

/// Word index read by a search starting at `compressed`
pub fn search_word(compressed: i32, lte: bool) -> i32 {
    if lte {
        position(compressed).0
    } else {
        position(compressed + 1).0
    }
}
