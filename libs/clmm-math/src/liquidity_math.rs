use crate::error::MathError;

/// Add a signed liquidity delta to an unsigned liquidity value
pub fn add_delta(liquidity: u128, delta: i128) -> Result<u128, MathError> {
    if delta < 0 {
        liquidity
            .checked_sub(delta.unsigned_abs())
            .ok_or(MathError::LiquidityUnderflow)
    } else {
        liquidity
            .checked_add(delta as u128)
            .ok_or(MathError::LiquidityOverflow)
    }
}
