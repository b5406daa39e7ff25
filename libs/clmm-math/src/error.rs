use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    #[error("Math error - division by zero")]
    DivideByZero,
    #[error("Math error - result overflows 256 bits")]
    Overflow,
    #[error("Math error - tick out of range")]
    TickOutOfRange,
    #[error("Math error - sqrt ratio out of range")]
    RatioOutOfRange,
    #[error("Math error - liquidity overflow")]
    LiquidityOverflow,
    #[error("Math error - liquidity underflow")]
    LiquidityUnderflow,
    #[error("Math error - sqrt price is zero")]
    ZeroPrice,
    #[error("Math error - liquidity is zero")]
    ZeroLiquidity,
    #[error("Math error - next sqrt price exceeds 160 bits")]
    PriceOverflow,
    #[error("Math error - next sqrt price is not positive")]
    PriceUnderflow,
    #[error("Math error - zero has no set bits")]
    ZeroValue,
}

impl MathError {
    /// Stable reason code carried in reply messages
    pub fn code(&self) -> u32 {
        match self {
            MathError::DivideByZero => 0x1000,
            MathError::Overflow => 0x1001,
            MathError::TickOutOfRange => 0x1002,
            MathError::RatioOutOfRange => 0x1003,
            MathError::LiquidityOverflow => 0x1004,
            MathError::LiquidityUnderflow => 0x1005,
            MathError::ZeroPrice => 0x1006,
            MathError::ZeroLiquidity => 0x1007,
            MathError::PriceOverflow => 0x1008,
            MathError::PriceUnderflow => 0x1009,
            MathError::ZeroValue => 0x100a,
        }
    }
}
