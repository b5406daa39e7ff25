//! Single-process pool with every operation applied atomically.
//!
//! Operations either complete or leave the pool exactly as they found it:
//! touched ticks are restored from their receipts and crossings are undone
//! before an error is returned.

use crate::error::{PoolError, Result};
use crate::invariants;
use crate::liquidity::{self, amounts_for_delta, credit_owed, owed_amounts, validate_ticks};
use crate::position::PositionStore;
use crate::storage::{PagedTickStore, ShardLayout, TickAccess, TickContext, TickReceipt, TickStore, TickUpdate};
use crate::swap::{SwapProgress, SwapSession};
use alloy_primitives::{Address, U256};
use clmm_math::get_tick_at_sqrt_ratio;
use clmm_types::{PoolConfig, PoolState, PositionInfo, PositionKey, TickInfo};
use tracing::{debug, info};

fn pending<T>(access: TickAccess<T>) -> Result<T> {
    match access {
        TickAccess::Ready(value) => Ok(value),
        TickAccess::Pending { shard } => Err(PoolError::ShardUnavailable { shard }),
    }
}

#[derive(Clone, Debug)]
pub struct Pool<S: TickStore = PagedTickStore> {
    config: PoolConfig,
    state: PoolState,
    ticks: S,
    positions: PositionStore,
}

impl Pool<PagedTickStore> {
    /// Initialize a pool at the given price
    pub fn new(config: PoolConfig, sqrt_price_x96: U256) -> Result<Self> {
        let layout = ShardLayout::new(config.tick_spacing, config.words_per_shard);
        Self::with_store(config, sqrt_price_x96, PagedTickStore::new(layout))
    }
}

impl<S: TickStore> Pool<S> {
    pub fn with_store(config: PoolConfig, sqrt_price_x96: U256, ticks: S) -> Result<Self> {
        let tick = get_tick_at_sqrt_ratio(sqrt_price_x96)?;
        debug!(%sqrt_price_x96, tick, fee = config.fee, "pool initialized");
        Ok(Self {
            config,
            state: PoolState::new(sqrt_price_x96, tick),
            ticks,
            positions: PositionStore::new(),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }

    pub fn ticks(&self) -> &S {
        &self.ticks
    }

    pub fn tick(&self, tick: i32) -> Result<TickInfo> {
        pending(self.ticks.get(tick))
    }

    pub fn position(&self, owner: Address, tick_lower: i32, tick_upper: i32) -> PositionInfo {
        self.positions.get(&PositionKey::new(owner, tick_lower, tick_upper))
    }

    /// Protocol fees accrued so far
    pub fn collected_fees(&self) -> (u128, u128) {
        (self.state.protocol_fees_0, self.state.protocol_fees_1)
    }

    fn tick_context(&self) -> TickContext {
        TickContext {
            tick_current: self.state.tick,
            fee_growth_global_0_x128: self.state.fee_growth_global_0_x128,
            fee_growth_global_1_x128: self.state.fee_growth_global_1_x128,
            max_liquidity: self.config.max_liquidity_per_tick,
        }
    }

    fn restore(&mut self, receipts: &[TickReceipt]) {
        for receipt in receipts.iter().rev() {
            // Receipts came from this store, so restoring cannot be pending
            let restored = self.ticks.restore_tick(receipt);
            debug_assert!(matches!(restored, Ok(TickAccess::Ready(()))));
        }
    }

    /// Update both boundary ticks, restoring the first if the second fails
    fn update_ticks(&mut self, key: &PositionKey, liquidity_delta: i128) -> Result<(TickReceipt, TickReceipt)> {
        let context = self.tick_context();
        let lower = TickUpdate {
            tick: key.tick_lower,
            liquidity_delta,
            upper: false,
        };
        let upper = TickUpdate {
            tick: key.tick_upper,
            liquidity_delta,
            upper: true,
        };

        let lower_receipt = pending(self.ticks.apply_tick_update(&lower, &context)?)?;
        match self
            .ticks
            .apply_tick_update(&upper, &context)
            .and_then(pending)
        {
            Ok(upper_receipt) => Ok((lower_receipt, upper_receipt)),
            Err(err) => {
                self.restore(&[lower_receipt]);
                Err(err)
            }
        }
    }

    fn modify_position(&mut self, key: &PositionKey, liquidity_delta: i128) -> Result<(U256, U256)> {
        validate_ticks(key.tick_lower, key.tick_upper, self.config.tick_spacing)?;
        let amounts = amounts_for_delta(&self.state, key.tick_lower, key.tick_upper, liquidity_delta)?;

        let (lower, upper) = self.update_ticks(key, liquidity_delta)?;
        if let Err(err) = liquidity::modify_position(
            &mut self.state,
            &mut self.positions,
            key,
            liquidity_delta,
            &lower.updated,
            &upper.updated,
        ) {
            self.restore(&[lower, upper]);
            return Err(err);
        }

        debug_assert!(invariants::tick_liquidity_bounded(
            lower.updated.liquidity_gross,
            self.config.max_liquidity_per_tick
        ));
        Ok(amounts)
    }

    /// Add liquidity to a position; returns the token amounts owed to the pool
    pub fn mint(&mut self, owner: Address, tick_lower: i32, tick_upper: i32, liquidity: u128) -> Result<(U256, U256)> {
        if liquidity == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let key = PositionKey::new(owner, tick_lower, tick_upper);
        let delta = liquidity::liquidity_delta(liquidity, true)?;
        let (amount0, amount1) = self.modify_position(&key, delta)?;

        info!(%owner, tick_lower, tick_upper, liquidity, %amount0, %amount1, "mint");
        Ok((amount0, amount1))
    }

    /// Remove liquidity, crediting the principal to the position's owed tokens
    ///
    /// Burning zero liquidity only accrues fees.
    pub fn burn(&mut self, owner: Address, tick_lower: i32, tick_upper: i32, liquidity: u128) -> Result<(U256, U256)> {
        let key = PositionKey::new(owner, tick_lower, tick_upper);
        let delta = liquidity::liquidity_delta(liquidity, false)?;
        validate_ticks(tick_lower, tick_upper, self.config.tick_spacing)?;
        let (amount0, amount1) = amounts_for_delta(&self.state, tick_lower, tick_upper, delta)?;
        let owed = owed_amounts(amount0, amount1)?;

        self.modify_position(&key, delta)?;
        let mut position = self.positions.get(&key);
        credit_owed(&mut position, owed);
        self.positions.set(&key, position);

        info!(%owner, tick_lower, tick_upper, liquidity, %amount0, %amount1, "burn");
        Ok((amount0, amount1))
    }

    /// Withdraw owed tokens; returns what was actually paid out
    pub fn collect(
        &mut self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount0_requested: u128,
        amount1_requested: u128,
    ) -> (u128, u128) {
        let key = PositionKey::new(owner, tick_lower, tick_upper);
        let mut position = self.positions.get(&key);
        let collected = liquidity::collect(&mut position, amount0_requested, amount1_requested);
        if collected != (0, 0) {
            self.positions.set(&key, position);
        }
        collected
    }

    /// Swap against the pool; returns the signed (amount0, amount1) deltas
    ///
    /// Positive amounts are owed to the pool, negative amounts are paid out.
    pub fn swap(&mut self, zero_for_one: bool, amount_specified: i128, sqrt_price_limit_x96: U256) -> Result<(i128, i128)> {
        let mut session = SwapSession::new(&self.state, &self.config, zero_for_one, amount_specified, sqrt_price_limit_x96)?;

        let outcome = match session.advance(&mut self.ticks) {
            Ok(SwapProgress::Done) => session.apply(&mut self.state),
            Ok(SwapProgress::Suspended { shard }) => Err(PoolError::ShardUnavailable { shard }),
            Err(err) => Err(err),
        };
        if let Err(err) = outcome {
            SwapSession::uncross(&session.crossings, &mut self.ticks)?;
            return Err(err);
        }

        let (amount0, amount1) = session.amounts();
        debug_assert!(invariants::swap_amounts_opposite_signs(amount0, amount1));
        debug_assert!(invariants::price_in_bounds(&self.state));
        debug_assert!(invariants::tick_consistent_with_price(&self.state));

        info!(
            zero_for_one,
            amount0,
            amount1,
            tick = self.state.tick,
            crossings = session.crossings.len(),
            "swap"
        );
        Ok((amount0, amount1))
    }
}
