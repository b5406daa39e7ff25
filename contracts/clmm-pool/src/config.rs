use alloy_primitives::{Address, U256};
use clmm_types::{
    fee_to_tick_spacing, max_liquidity_per_tick, Fee, PoolConfig, DEFAULT_WORDS_PER_SHARD,
    MAX_SQRT_RATIO, MIN_SQRT_RATIO,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_STAGING_TIMEOUT_SECS: u64 = 86_400;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to parse pool settings: {0}")]
    Parse(String),
    #[error("Unknown fee tier {0} and no explicit tick spacing")]
    UnknownFeeTier(Fee),
    #[error("Fee {0} is not below the fee denominator")]
    FeeTooHigh(Fee),
    #[error("Tick spacing must be positive, got {0}")]
    InvalidTickSpacing(i32),
    #[error("Protocol fee divisor must be 0 or within 4..=10, got {0}")]
    InvalidProtocolFee(u8),
    #[error("Shard width must be at least one bitmap word")]
    ZeroShardWidth,
    #[error("Malformed sqrt price {0:?}")]
    MalformedPrice(String),
    #[error("Sqrt price {0} is outside the valid range")]
    PriceOutOfRange(U256),
}

/// Pool settings loaded from TOML
///
/// ```toml
/// fee = 500
/// sqrt_price_x96 = "79228162514264337593543950336"
/// token0_wallet = "0x1000000000000000000000000000000000000001"
/// token1_wallet = "0x2000000000000000000000000000000000000002"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolSettings {
    /// Fee tier in hundredths of a bip
    pub fee: Fee,

    /// Explicit tick spacing, required for fee tiers without a default
    #[serde(default)]
    pub tick_spacing: Option<i32>,

    /// Divisor of the swap fee diverted to the protocol (0 = off)
    #[serde(default)]
    pub protocol_fee: u8,

    /// Bitmap words per tick shard
    #[serde(default = "default_words_per_shard")]
    pub words_per_shard: u32,

    /// Seconds before anyone other than the owner may refund a staged mint leg
    #[serde(default = "default_staging_timeout")]
    pub staging_timeout_secs: u64,

    /// Initial sqrt price, decimal or 0x-prefixed hex
    pub sqrt_price_x96: String,

    pub token0_wallet: Address,
    pub token1_wallet: Address,
}

fn default_words_per_shard() -> u32 {
    DEFAULT_WORDS_PER_SHARD
}

fn default_staging_timeout() -> u64 {
    DEFAULT_STAGING_TIMEOUT_SECS
}

impl PoolSettings {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate the settings and produce the pool configuration and initial price
    pub fn build(&self) -> Result<(PoolConfig, U256), ConfigError> {
        if self.fee >= clmm_types::FEE_DENOMINATOR {
            return Err(ConfigError::FeeTooHigh(self.fee));
        }

        let tick_spacing = match self.tick_spacing {
            Some(spacing) => spacing,
            None => fee_to_tick_spacing(self.fee).ok_or(ConfigError::UnknownFeeTier(self.fee))?,
        };
        if tick_spacing <= 0 {
            return Err(ConfigError::InvalidTickSpacing(tick_spacing));
        }

        if self.protocol_fee != 0 && !(4..=10).contains(&self.protocol_fee) {
            return Err(ConfigError::InvalidProtocolFee(self.protocol_fee));
        }

        if self.words_per_shard == 0 {
            return Err(ConfigError::ZeroShardWidth);
        }

        let sqrt_price_x96 = parse_price(&self.sqrt_price_x96)?;
        if sqrt_price_x96 < MIN_SQRT_RATIO || sqrt_price_x96 >= MAX_SQRT_RATIO {
            return Err(ConfigError::PriceOutOfRange(sqrt_price_x96));
        }

        let config = PoolConfig {
            token0_wallet: self.token0_wallet,
            token1_wallet: self.token1_wallet,
            fee: self.fee,
            protocol_fee: self.protocol_fee,
            tick_spacing,
            max_liquidity_per_tick: max_liquidity_per_tick(tick_spacing),
            words_per_shard: self.words_per_shard,
            staging_timeout: self.staging_timeout_secs,
        };
        Ok((config, sqrt_price_x96))
    }
}

fn parse_price(raw: &str) -> Result<U256, ConfigError> {
    let trimmed = raw.trim();
    let parsed = match trimmed.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(trimmed, 10),
    };
    parsed.map_err(|_| ConfigError::MalformedPrice(raw.to_string()))
}
