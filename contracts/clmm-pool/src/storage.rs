//! Tick storage behind a uniform interface.
//!
//! Ticks and bitmap words are partitioned into shards of
//! `words_per_shard` bitmap words. A store may hold only some shards; asking
//! it for anything else answers [`TickAccess::Pending`] naming the shard that
//! owns the data, so callers can suspend and resume there instead of the
//! store hiding a remote round-trip.
//!
//! - [`TickShard`]: one shard, the state of a shard actor
//! - [`PagedTickStore`]: every shard in one process, always ready

use crate::error::{PoolError, Result};
use crate::tick;
use crate::tick_bitmap::{self, bit_mask, next_initialized_in_word, search_word};
use alloy_primitives::U256;
use clmm_types::{TickInfo, MAX_TICK, MIN_TICK};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of touching tick storage that may live elsewhere
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickAccess<T> {
    Ready(T),
    /// The data lives in another shard
    Pending { shard: i32 },
}

impl<T> TickAccess<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TickAccess<U> {
        match self {
            TickAccess::Ready(value) => TickAccess::Ready(f(value)),
            TickAccess::Pending { shard } => TickAccess::Pending { shard },
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, TickAccess::Ready(_))
    }
}

/// Unwrap a ready access or return the pending shard from the enclosing function
macro_rules! ready {
    ($access:expr) => {
        match $access {
            $crate::storage::TickAccess::Ready(value) => value,
            $crate::storage::TickAccess::Pending { shard } => {
                return Ok($crate::storage::TickAccess::Pending { shard })
            }
        }
    };
}
pub(crate) use ready;

/// Maps ticks to bitmap words and shards
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardLayout {
    pub tick_spacing: i32,
    pub words_per_shard: u32,
}

impl ShardLayout {
    pub fn new(tick_spacing: i32, words_per_shard: u32) -> Self {
        Self {
            tick_spacing,
            words_per_shard,
        }
    }

    /// Tick divided by spacing, rounded towards negative infinity
    pub fn compress(&self, tick: i32) -> i32 {
        tick.div_euclid(self.tick_spacing)
    }

    pub fn shard_of_word(&self, word_pos: i32) -> i32 {
        word_pos.div_euclid(self.words_per_shard as i32)
    }

    pub fn shard_of_tick(&self, tick: i32) -> i32 {
        let (word_pos, _) = tick_bitmap::position(self.compress(tick));
        self.shard_of_word(word_pos)
    }

    /// Shard holding the word a search from `tick` reads
    pub fn shard_for_search(&self, tick: i32, lte: bool) -> i32 {
        self.shard_of_word(search_word(self.compress(tick), lte))
    }

    /// Inclusive range of ticks covered by a shard
    pub fn tick_range(&self, shard: i32) -> (i32, i32) {
        let words = self.words_per_shard as i64;
        let spacing = self.tick_spacing as i64;
        let first = shard as i64 * words * 256 * spacing;
        let last = (shard as i64 + 1) * words * 256 * spacing - 1;
        (
            first.clamp(MIN_TICK as i64, MAX_TICK as i64) as i32,
            last.clamp(MIN_TICK as i64, MAX_TICK as i64) as i32,
        )
    }

    /// Every shard touched by a tick range, in ascending order
    pub fn shards_between(&self, tick_lower: i32, tick_upper: i32) -> Vec<i32> {
        (self.shard_of_tick(tick_lower)..=self.shard_of_tick(tick_upper)).collect()
    }
}

/// A signed liquidity change at one boundary tick
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickUpdate {
    pub tick: i32,
    pub liquidity_delta: i128,
    pub upper: bool,
}

/// Pool snapshot a tick update is applied against
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickContext {
    pub tick_current: i32,
    pub fee_growth_global_0_x128: U256,
    pub fee_growth_global_1_x128: U256,
    pub max_liquidity: u128,
}

/// What a tick update did, enough to compute fee growth and to undo it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReceipt {
    pub tick: i32,
    pub flipped: bool,
    /// Entry before the update
    pub prior: TickInfo,
    /// Entry after the update, before a flipped-off tick is cleared
    pub updated: TickInfo,
}

pub trait TickStore {
    fn layout(&self) -> ShardLayout;

    fn get(&self, tick: i32) -> TickAccess<TickInfo>;

    /// Store an entry; an empty entry is removed
    fn set(&mut self, tick: i32, info: TickInfo) -> TickAccess<()>;

    fn word(&self, word_pos: i32) -> TickAccess<U256>;

    fn set_word(&mut self, word_pos: i32, word: U256) -> TickAccess<()>;

    /// Flip the initialized bit of a tick
    fn flip_tick(&mut self, tick: i32) -> Result<TickAccess<()>> {
        let layout = self.layout();
        if tick % layout.tick_spacing != 0 {
            return Err(PoolError::TickNotSpaced);
        }
        let (word_pos, bit_pos) = tick_bitmap::position(tick / layout.tick_spacing);
        let word = ready!(self.word(word_pos));
        Ok(self.set_word(word_pos, word ^ bit_mask(bit_pos)))
    }

    /// Next initialized tick within the bitmap word searched from `tick`
    /// Returns (tick, initialized)
    fn next_initialized_tick_within_one_word(
        &self,
        tick: i32,
        lte: bool,
    ) -> Result<TickAccess<(i32, bool)>> {
        let layout = self.layout();
        let compressed = layout.compress(tick);
        let word = ready!(self.word(search_word(compressed, lte)));
        let (next, initialized) = next_initialized_in_word(word, compressed, lte);
        Ok(TickAccess::Ready((next * layout.tick_spacing, initialized)))
    }

    /// Apply a boundary tick update, flipping the bitmap on (de)initialization
    ///
    /// A zero delta only reads the tick.
    fn apply_tick_update(
        &mut self,
        update: &TickUpdate,
        context: &TickContext,
    ) -> Result<TickAccess<TickReceipt>> {
        let prior = ready!(self.get(update.tick));
        if update.liquidity_delta == 0 {
            return Ok(TickAccess::Ready(TickReceipt {
                tick: update.tick,
                flipped: false,
                prior: prior.clone(),
                updated: prior,
            }));
        }

        let mut info = prior.clone();
        let flipped = tick::update(
            &mut info,
            update.tick,
            context.tick_current,
            update.liquidity_delta,
            context.fee_growth_global_0_x128,
            context.fee_growth_global_1_x128,
            update.upper,
            context.max_liquidity,
        )?;

        if flipped {
            ready!(self.flip_tick(update.tick)?);
        }

        let updated = info.clone();
        if flipped && update.liquidity_delta < 0 {
            tick::clear(&mut info);
        }
        ready!(self.set(update.tick, info));

        Ok(TickAccess::Ready(TickReceipt {
            tick: update.tick,
            flipped,
            prior,
            updated,
        }))
    }

    /// Undo an update described by its receipt
    fn restore_tick(&mut self, receipt: &TickReceipt) -> Result<TickAccess<()>> {
        if receipt.flipped {
            ready!(self.flip_tick(receipt.tick)?);
        }
        ready!(self.set(receipt.tick, receipt.prior.clone()));
        Ok(TickAccess::Ready(()))
    }

    /// Cross a tick, returning its liquidity net
    fn cross_tick(
        &mut self,
        tick: i32,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
    ) -> Result<TickAccess<i128>> {
        let mut info = ready!(self.get(tick));
        let liquidity_net = tick::cross(&mut info, fee_growth_global_0_x128, fee_growth_global_1_x128);
        ready!(self.set(tick, info));
        Ok(TickAccess::Ready(liquidity_net))
    }
}

/// The ticks and bitmap words of a single shard
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickShard {
    layout: ShardLayout,
    index: i32,
    ticks: BTreeMap<i32, TickInfo>,
    words: BTreeMap<i32, U256>,
}

impl TickShard {
    pub fn new(layout: ShardLayout, index: i32) -> Self {
        Self {
            layout,
            index,
            ticks: BTreeMap::new(),
            words: BTreeMap::new(),
        }
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty() && self.words.is_empty()
    }

    pub fn ticks(&self) -> impl Iterator<Item = (&i32, &TickInfo)> {
        self.ticks.iter()
    }

    pub fn contains_tick(&self, tick: i32) -> bool {
        self.layout.shard_of_tick(tick) == self.index
    }

    fn pending(&self, shard: i32) -> Option<TickAccess<()>> {
        (shard != self.index).then_some(TickAccess::Pending { shard })
    }
}

impl TickStore for TickShard {
    fn layout(&self) -> ShardLayout {
        self.layout
    }

    fn get(&self, tick: i32) -> TickAccess<TickInfo> {
        let shard = self.layout.shard_of_tick(tick);
        if let Some(pending) = self.pending(shard) {
            return pending.map(|_| TickInfo::default());
        }
        TickAccess::Ready(self.ticks.get(&tick).cloned().unwrap_or_default())
    }

    fn set(&mut self, tick: i32, info: TickInfo) -> TickAccess<()> {
        let shard = self.layout.shard_of_tick(tick);
        if let Some(pending) = self.pending(shard) {
            return pending;
        }
        if info.is_empty() {
            self.ticks.remove(&tick);
        } else {
            self.ticks.insert(tick, info);
        }
        TickAccess::Ready(())
    }

    fn word(&self, word_pos: i32) -> TickAccess<U256> {
        let shard = self.layout.shard_of_word(word_pos);
        if let Some(pending) = self.pending(shard) {
            return pending.map(|_| U256::ZERO);
        }
        TickAccess::Ready(self.words.get(&word_pos).copied().unwrap_or_default())
    }

    fn set_word(&mut self, word_pos: i32, word: U256) -> TickAccess<()> {
        let shard = self.layout.shard_of_word(word_pos);
        if let Some(pending) = self.pending(shard) {
            return pending;
        }
        if word.is_zero() {
            self.words.remove(&word_pos);
        } else {
            self.words.insert(word_pos, word);
        }
        TickAccess::Ready(())
    }
}

/// Segmented page store holding every shard in one process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PagedTickStore {
    layout: ShardLayout,
    shards: BTreeMap<i32, TickShard>,
}

impl PagedTickStore {
    pub fn new(layout: ShardLayout) -> Self {
        Self {
            layout,
            shards: BTreeMap::new(),
        }
    }

    pub fn shard(&self, index: i32) -> Option<&TickShard> {
        self.shards.get(&index)
    }

    /// Number of shards that currently hold data
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn with_shard<T>(&mut self, index: i32, f: impl FnOnce(&mut TickShard) -> TickAccess<T>) -> TickAccess<T> {
        let layout = self.layout;
        let shard = self
            .shards
            .entry(index)
            .or_insert_with(|| TickShard::new(layout, index));
        let result = f(shard);
        if shard.is_empty() {
            self.shards.remove(&index);
        }
        result
    }
}

impl TickStore for PagedTickStore {
    fn layout(&self) -> ShardLayout {
        self.layout
    }

    fn get(&self, tick: i32) -> TickAccess<TickInfo> {
        match self.shards.get(&self.layout.shard_of_tick(tick)) {
            Some(shard) => shard.get(tick),
            None => TickAccess::Ready(TickInfo::default()),
        }
    }

    fn set(&mut self, tick: i32, info: TickInfo) -> TickAccess<()> {
        let index = self.layout.shard_of_tick(tick);
        self.with_shard(index, |shard| shard.set(tick, info))
    }

    fn word(&self, word_pos: i32) -> TickAccess<U256> {
        match self.shards.get(&self.layout.shard_of_word(word_pos)) {
            Some(shard) => shard.word(word_pos),
            None => TickAccess::Ready(U256::ZERO),
        }
    }

    fn set_word(&mut self, word_pos: i32, word: U256) -> TickAccess<()> {
        let index = self.layout.shard_of_word(word_pos);
        self.with_shard(index, |shard| shard.set_word(word_pos, word))
    }
}
