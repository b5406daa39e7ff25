//! The swap walk as a resumable session.
//!
//! A [`SwapSession`] carries everything the walk needs between steps, so it
//! can run to completion against a [`PagedTickStore`](crate::storage::PagedTickStore)
//! or hop between shard actors, suspending whenever the next bitmap word lives
//! in a shard the current store does not hold.

use crate::error::{PoolError, Result};
use crate::storage::{ShardLayout, TickAccess, TickStore};
use alloy_primitives::U256;
use clmm_math::{add_delta, compute_swap_step, get_sqrt_ratio_at_tick, get_tick_at_sqrt_ratio, mul_div, MathError};
use clmm_types::{PoolConfig, PoolState, MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO, MIN_TICK, Q128};

/// A tick crossed during a swap, with the globals used to cross it
///
/// Crossing again with the same globals restores the tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickCrossing {
    pub tick: i32,
    pub fee_growth_global_0_x128: U256,
    pub fee_growth_global_1_x128: U256,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapProgress {
    /// Amount exhausted or price limit reached
    Done,
    /// The next step needs the given shard
    Suspended { shard: i32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapSession {
    pub zero_for_one: bool,
    /// Positive for exact input, negative for exact output
    pub amount_specified: i128,
    pub sqrt_price_limit_x96: U256,
    pub fee: u32,
    pub protocol_fee: u8,

    pub amount_remaining: i128,
    pub amount_calculated: i128,
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub liquidity: u128,
    pub fee_growth_global_0_x128: U256,
    pub fee_growth_global_1_x128: U256,
    /// Protocol share of the input token fees taken so far
    pub protocol_fee_amount: u128,
    pub crossings: Vec<TickCrossing>,
}

fn to_i128(value: U256) -> Result<i128> {
    let value = u128::try_from(value).map_err(|_| MathError::Overflow)?;
    Ok(i128::try_from(value).map_err(|_| MathError::Overflow)?)
}

/// Resolve and validate a caller supplied price limit; zero means no limit
pub fn resolve_price_limit(state: &PoolState, zero_for_one: bool, sqrt_price_limit_x96: U256) -> Result<U256> {
    let one = U256::from(1u8);
    if sqrt_price_limit_x96.is_zero() {
        return Ok(if zero_for_one {
            MIN_SQRT_RATIO + one
        } else {
            MAX_SQRT_RATIO - one
        });
    }

    let valid = if zero_for_one {
        sqrt_price_limit_x96 < state.sqrt_price_x96 && sqrt_price_limit_x96 > MIN_SQRT_RATIO
    } else {
        sqrt_price_limit_x96 > state.sqrt_price_x96 && sqrt_price_limit_x96 < MAX_SQRT_RATIO
    };
    if !valid {
        return Err(PoolError::InvalidPriceLimit);
    }
    Ok(sqrt_price_limit_x96)
}

impl SwapSession {
    pub fn new(
        state: &PoolState,
        config: &PoolConfig,
        zero_for_one: bool,
        amount_specified: i128,
        sqrt_price_limit_x96: U256,
    ) -> Result<Self> {
        if amount_specified == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let sqrt_price_limit_x96 = resolve_price_limit(state, zero_for_one, sqrt_price_limit_x96)?;

        Ok(Self {
            zero_for_one,
            amount_specified,
            sqrt_price_limit_x96,
            fee: config.fee,
            protocol_fee: config.protocol_fee,
            amount_remaining: amount_specified,
            amount_calculated: 0,
            sqrt_price_x96: state.sqrt_price_x96,
            tick: state.tick,
            liquidity: state.liquidity,
            fee_growth_global_0_x128: state.fee_growth_global_0_x128,
            fee_growth_global_1_x128: state.fee_growth_global_1_x128,
            protocol_fee_amount: 0,
            crossings: Vec::new(),
        })
    }

    pub fn exact_input(&self) -> bool {
        self.amount_specified > 0
    }

    pub fn is_done(&self) -> bool {
        self.amount_remaining == 0 || self.sqrt_price_x96 == self.sqrt_price_limit_x96
    }

    /// Walk until done or until the next bitmap word is out of reach
    ///
    /// Suspension happens before anything in the step is touched, so the
    /// session resumes at the same step once handed to the right store.
    pub fn advance<S: TickStore>(&mut self, store: &mut S) -> Result<SwapProgress> {
        let exact_input = self.exact_input();

        while !self.is_done() {
            let step_start = self.sqrt_price_x96;

            let (tick_next, initialized) =
                match store.next_initialized_tick_within_one_word(self.tick, self.zero_for_one)? {
                    TickAccess::Ready(next) => next,
                    TickAccess::Pending { shard } => return Ok(SwapProgress::Suspended { shard }),
                };

            // Clamp to min/max tick
            let tick_next = tick_next.clamp(MIN_TICK, MAX_TICK);
            let sqrt_price_next_x96 = get_sqrt_ratio_at_tick(tick_next)?;

            // Determine target price for this step
            let sqrt_ratio_target_x96 = if self.zero_for_one {
                sqrt_price_next_x96.max(self.sqrt_price_limit_x96)
            } else {
                sqrt_price_next_x96.min(self.sqrt_price_limit_x96)
            };

            let step = compute_swap_step(
                self.sqrt_price_x96,
                sqrt_ratio_target_x96,
                self.liquidity,
                self.amount_remaining,
                self.fee,
            )?;

            let amount_in = to_i128(step.amount_in)?;
            let amount_out = to_i128(step.amount_out)?;
            let mut fee_amount = step.fee_amount;

            if exact_input {
                let spent = amount_in
                    .checked_add(to_i128(fee_amount)?)
                    .ok_or(MathError::Overflow)?;
                self.amount_remaining -= spent;
                self.amount_calculated = self
                    .amount_calculated
                    .checked_sub(amount_out)
                    .ok_or(MathError::Overflow)?;
            } else {
                self.amount_remaining += amount_out;
                self.amount_calculated = self
                    .amount_calculated
                    .checked_add(amount_in)
                    .and_then(|a| a.checked_add(to_i128(fee_amount).ok()?))
                    .ok_or(MathError::Overflow)?;
            }

            if self.protocol_fee > 0 {
                let delta = fee_amount / U256::from(self.protocol_fee);
                fee_amount -= delta;
                self.protocol_fee_amount = self
                    .protocol_fee_amount
                    .checked_add(u128::try_from(delta).map_err(|_| MathError::Overflow)?)
                    .ok_or(MathError::Overflow)?;
            }

            // Fee growth wraps
            if self.liquidity > 0 {
                let growth = mul_div(fee_amount, Q128, U256::from(self.liquidity))?;
                if self.zero_for_one {
                    self.fee_growth_global_0_x128 = self.fee_growth_global_0_x128.wrapping_add(growth);
                } else {
                    self.fee_growth_global_1_x128 = self.fee_growth_global_1_x128.wrapping_add(growth);
                }
            }

            self.sqrt_price_x96 = step.sqrt_ratio_next_x96;

            if self.sqrt_price_x96 == sqrt_price_next_x96 {
                if initialized {
                    let liquidity_net = match store.cross_tick(
                        tick_next,
                        self.fee_growth_global_0_x128,
                        self.fee_growth_global_1_x128,
                    )? {
                        TickAccess::Ready(net) => net,
                        TickAccess::Pending { .. } => {
                            return Err(PoolError::ShardMisrouted { tick: tick_next })
                        }
                    };
                    self.crossings.push(TickCrossing {
                        tick: tick_next,
                        fee_growth_global_0_x128: self.fee_growth_global_0_x128,
                        fee_growth_global_1_x128: self.fee_growth_global_1_x128,
                    });

                    let liquidity_net = if self.zero_for_one {
                        liquidity_net.checked_neg().ok_or(MathError::LiquidityOverflow)?
                    } else {
                        liquidity_net
                    };
                    self.liquidity = add_delta(self.liquidity, liquidity_net)?;
                }

                self.tick = if self.zero_for_one { tick_next - 1 } else { tick_next };
            } else if self.sqrt_price_x96 != step_start {
                // Price moved within the word without reaching the next tick
                self.tick = get_tick_at_sqrt_ratio(self.sqrt_price_x96)?;
            }
        }

        Ok(SwapProgress::Done)
    }

    /// Shard the next step reads from
    pub fn next_shard(&self, layout: &ShardLayout) -> i32 {
        layout.shard_for_search(self.tick, self.zero_for_one)
    }

    /// Signed pool deltas: positive is owed to the pool, negative is paid out
    pub fn amounts(&self) -> (i128, i128) {
        let consumed = self.amount_specified - self.amount_remaining;
        if self.zero_for_one == self.exact_input() {
            (consumed, self.amount_calculated)
        } else {
            (self.amount_calculated, consumed)
        }
    }

    /// Input owed to the pool and output paid by it
    pub fn settlement(&self) -> (u128, u128) {
        let (amount0, amount1) = self.amounts();
        let (input, output) = if self.zero_for_one {
            (amount0, amount1)
        } else {
            (amount1, amount0)
        };
        (input.max(0).unsigned_abs(), output.min(0).unsigned_abs())
    }

    /// Mirror the walked price, liquidity and fee growth into the pool state
    pub fn sync(&self, state: &mut PoolState) {
        state.sqrt_price_x96 = self.sqrt_price_x96;
        state.tick = self.tick;
        state.liquidity = self.liquidity;
        state.fee_growth_global_0_x128 = self.fee_growth_global_0_x128;
        state.fee_growth_global_1_x128 = self.fee_growth_global_1_x128;
    }

    /// Write the finished walk back to the pool, including protocol fees
    pub fn apply(&self, state: &mut PoolState) -> Result<()> {
        let mut next = state.clone();
        self.sync(&mut next);

        let protocol_fees = if self.zero_for_one {
            &mut next.protocol_fees_0
        } else {
            &mut next.protocol_fees_1
        };
        *protocol_fees = protocol_fees
            .checked_add(self.protocol_fee_amount)
            .ok_or(MathError::Overflow)?;

        *state = next;
        Ok(())
    }

    /// Undo crossings in reverse order
    pub fn uncross<S: TickStore>(crossings: &[TickCrossing], store: &mut S) -> Result<()> {
        for crossing in crossings.iter().rev() {
            match store.cross_tick(
                crossing.tick,
                crossing.fee_growth_global_0_x128,
                crossing.fee_growth_global_1_x128,
            )? {
                TickAccess::Ready(_) => {}
                TickAccess::Pending { .. } => {
                    return Err(PoolError::ShardMisrouted { tick: crossing.tick })
                }
            }
        }
        Ok(())
    }
}
