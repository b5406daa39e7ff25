use clmm_math::MathError;
use clmm_types::codec::CodecError;
use thiserror::Error;

pub type Result<T, E = PoolError> = std::result::Result<T, E>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error(transparent)]
    Math(#[from] MathError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Pool error - tick liquidity gross exceeds the per-tick maximum")]
    LiquidityGrossExceeded,
    #[error("Pool error - invalid tick range")]
    InvalidRange,
    #[error("Pool error - sender is not allowed to perform this operation")]
    Unauthorized,
    #[error("Pool error - stale or duplicate message")]
    StaleOrDuplicateMessage,
    #[error("Pool error - invalid sqrt price limit")]
    InvalidPriceLimit,
    #[error("Pool error - transferred amount does not cover the operation")]
    InsufficientAmount,
    #[error("Pool error - position has no liquidity")]
    NoPosition,
    #[error("Pool error - amount must be non-zero")]
    ZeroAmount,
    #[error("Pool error - message does not match this pool")]
    PoolMismatch,
    #[error("Pool error - malformed forward payload")]
    MalformedPayload,
    #[error("Pool error - tick {tick} is outside the addressed shard")]
    ShardMisrouted { tick: i32 },
    #[error("Pool error - shard {shard} is unavailable")]
    ShardUnavailable { shard: i32 },
    #[error("Pool error - tick is not a multiple of the tick spacing")]
    TickNotSpaced,
    #[error("Pool error - unexpected message")]
    UnexpectedMessage,
    #[error("Pool error - mint leg conflicts with the staged leg")]
    LegConflict,
    #[error("Pool error - staged leg refunded on request")]
    RefundRequested,
}

impl PoolError {
    /// Stable reason code carried in reply messages
    pub fn code(&self) -> u32 {
        match self {
            PoolError::Math(err) => err.code(),
            PoolError::Codec(err) => err.code(),
            PoolError::LiquidityGrossExceeded => 0x3000,
            PoolError::InvalidRange => 0x3001,
            PoolError::Unauthorized => 0x3002,
            PoolError::StaleOrDuplicateMessage => 0x3003,
            PoolError::InvalidPriceLimit => 0x3004,
            PoolError::InsufficientAmount => 0x3005,
            PoolError::NoPosition => 0x3006,
            PoolError::ZeroAmount => 0x3007,
            PoolError::PoolMismatch => 0x3008,
            PoolError::MalformedPayload => 0x3009,
            PoolError::ShardMisrouted { .. } => 0x300a,
            PoolError::ShardUnavailable { .. } => 0x300b,
            PoolError::TickNotSpaced => 0x300c,
            PoolError::UnexpectedMessage => 0x300d,
            PoolError::LegConflict => 0x300e,
            PoolError::RefundRequested => 0x300f,
        }
    }
}
