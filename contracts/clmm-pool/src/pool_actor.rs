//! The pool as an actor.
//!
//! The pool keeps price, liquidity, fee growth, positions and reserves, while
//! ticks live in shard actors it deploys on demand. Mint, burn and swap touch
//! ticks through request/reply round-trips, so they run one at a time under a
//! lock and later arrivals wait in a queue. Every failure after funds arrived
//! ends in a refund to the depositor.

use crate::error::{PoolError, Result};
use crate::host::{Context, Deploy, Handler};
use crate::invariants;
use crate::liquidity::{self, amounts_for_delta, credit_owed, liquidity_delta, owed_amounts, validate_ticks};
use crate::message::{ForwardPayload, Leg, Message, TransferReason};
use crate::position::PositionStore;
use crate::storage::{ShardLayout, TickContext, TickReceipt, TickShard, TickUpdate};
use crate::swap::{SwapProgress, SwapSession, TickCrossing};
use alloy_primitives::{Address, U256};
use clmm_math::{get_tick_at_sqrt_ratio, MathError};
use clmm_types::{shard_address, staging_address, Cell, PoolConfig, PoolRoot, PoolState, PositionInfo, PositionKey, Record};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
struct MintRequest {
    /// Token0 leg
    leg0: Leg,
    /// Token1 leg
    leg1: Leg,
    tick_lower: i32,
    tick_upper: i32,
    liquidity: u128,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct BurnRequest {
    owner: Address,
    query_id: u64,
    tick_lower: i32,
    tick_upper: i32,
    liquidity: u128,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct SwapRequest {
    owner: Address,
    query_id: u64,
    /// Wallet the input arrived through
    token: Address,
    amount: u128,
    zero_for_one: bool,
    sqrt_price_limit_x96: U256,
    /// Zero for exact input
    amount_out: u128,
}

/// An operation waiting for the lock
#[derive(Clone, Debug)]
enum Operation {
    Mint(MintRequest),
    Burn(BurnRequest),
    Swap(SwapRequest),
}

#[derive(Clone, Debug)]
enum BatchKind {
    Mint(MintRequest),
    Burn(BurnRequest),
}

/// Boundary tick updates sent to one or two shards
#[derive(Clone, Debug)]
struct TickBatch {
    kind: BatchKind,
    key: PositionKey,
    liquidity_delta: i128,
    amounts: (U256, U256),
    /// seq -> shard of replies still outstanding
    awaiting: BTreeMap<u64, i32>,
    receipts: BTreeMap<i32, Vec<TickReceipt>>,
    /// First failure reported by a shard
    failure: Option<u32>,
}

#[derive(Clone, Debug)]
struct SwapRun {
    request: SwapRequest,
    /// State before the first segment, restored on abort
    snapshot: PoolState,
    seq: u64,
    shard: i32,
}

#[derive(Clone, Debug)]
enum Inflight {
    Ticks(TickBatch),
    Swap(SwapRun),
}

#[derive(Clone, Debug)]
pub struct PoolActor {
    address: Address,
    config: PoolConfig,
    layout: ShardLayout,
    state: PoolState,
    positions: PositionStore,
    reserves: (u128, u128),
    seq: u64,
    next_leg_id: u64,
    /// Mint legs the pool holds funds for, by leg id
    held: BTreeMap<u64, Leg>,
    inflight: Option<Inflight>,
    deferred: VecDeque<Operation>,
}

impl PoolActor {
    /// Initialize a pool at the given price
    pub fn new(address: Address, config: PoolConfig, sqrt_price_x96: U256) -> Result<Self> {
        let tick = get_tick_at_sqrt_ratio(sqrt_price_x96)?;
        info!(%address, %sqrt_price_x96, tick, fee = config.fee, tick_spacing = config.tick_spacing, "pool deployed");
        Ok(Self {
            address,
            layout: ShardLayout::new(config.tick_spacing, config.words_per_shard),
            config,
            state: PoolState::new(sqrt_price_x96, tick),
            positions: PositionStore::new(),
            reserves: (0, 0),
            seq: 0,
            next_leg_id: 0,
            held: BTreeMap::new(),
            inflight: None,
            deferred: VecDeque::new(),
        })
    }

    // === getters ===

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn layout(&self) -> ShardLayout {
        self.layout
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }

    pub fn position(&self, owner: Address, tick_lower: i32, tick_upper: i32) -> PositionInfo {
        self.positions.get(&PositionKey::new(owner, tick_lower, tick_upper))
    }

    /// Token balances backing positions and protocol fees
    pub fn reserves(&self) -> (u128, u128) {
        self.reserves
    }

    pub fn collected_fees(&self) -> (u128, u128) {
        (self.state.protocol_fees_0, self.state.protocol_fees_1)
    }

    /// Mint legs deposited but not yet consumed or refunded
    pub fn held_legs(&self) -> impl Iterator<Item = &Leg> {
        self.held.values()
    }

    /// True while a mint, burn or swap holds the lock
    pub fn is_busy(&self) -> bool {
        self.inflight.is_some()
    }

    pub fn queued(&self) -> usize {
        self.deferred.len()
    }

    /// Persisted root record
    pub fn root_record(&self) -> Result<Cell> {
        Ok(PoolRoot::new(&self.config, &self.state).to_cell()?)
    }

    pub fn position_record(&self, owner: Address, tick_lower: i32, tick_upper: i32) -> Result<Cell> {
        Ok(self.position(owner, tick_lower, tick_upper).to_cell()?)
    }

    // === helpers ===

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn shard_deploy(&self, index: i32) -> Deploy {
        Deploy::Shard {
            pool: self.address,
            index,
            layout: self.layout,
        }
    }

    fn tick_context(&self) -> TickContext {
        TickContext {
            tick_current: self.state.tick,
            fee_growth_global_0_x128: self.state.fee_growth_global_0_x128,
            fee_growth_global_1_x128: self.state.fee_growth_global_1_x128,
            max_liquidity: self.config.max_liquidity_per_tick,
        }
    }

    fn is_held(&self, leg: &Leg) -> bool {
        self.held.get(&leg.leg_id) == Some(leg)
    }

    fn transfer(
        &self,
        ctx: &mut Context,
        query_id: u64,
        token: Address,
        amount: u128,
        destination: Address,
        reason: TransferReason,
    ) {
        if amount == 0 {
            return;
        }
        ctx.send(
            token,
            Message::TokenTransfer {
                query_id,
                token,
                amount,
                destination,
                reason,
            },
        );
    }

    fn refund_leg(&self, ctx: &mut Context, leg: &Leg, code: u32) {
        self.transfer(ctx, leg.query_id, leg.token, leg.amount, leg.owner, TransferReason::Refund { code });
    }

    fn refund_mint(&self, ctx: &mut Context, request: &MintRequest, code: u32) {
        self.refund_leg(ctx, &request.leg0, code);
        self.refund_leg(ctx, &request.leg1, code);
    }

    fn refund_swap(&self, ctx: &mut Context, request: &SwapRequest, code: u32) {
        self.transfer(
            ctx,
            request.query_id,
            request.token,
            request.amount,
            request.owner,
            TransferReason::Refund { code },
        );
    }

    // === deposits ===

    fn on_transfer_notification(
        &mut self,
        ctx: &mut Context,
        query_id: u64,
        amount: u128,
        from_user: Address,
        forward_payload: &Cell,
    ) -> Result<()> {
        let token = ctx.sender();
        if token != self.config.token0_wallet && token != self.config.token1_wallet {
            return Err(PoolError::Unauthorized);
        }

        let accepted = match ForwardPayload::from_cell(forward_payload) {
            Ok(ForwardPayload::Mint {
                query_id,
                tick_lower,
                tick_upper,
                liquidity,
            }) => {
                let leg = Leg {
                    leg_id: 0,
                    query_id,
                    owner: from_user,
                    token,
                    amount,
                };
                self.accept_leg(ctx, leg, tick_lower, tick_upper, liquidity)
            }
            Ok(ForwardPayload::Swap {
                query_id,
                fee,
                tick_spacing,
                sqrt_price_limit_x96,
                zero_for_one,
                amount_out,
            }) => {
                if fee != self.config.fee || tick_spacing != self.config.tick_spacing {
                    Err(PoolError::PoolMismatch)
                } else {
                    let request = SwapRequest {
                        owner: from_user,
                        query_id,
                        token,
                        amount,
                        zero_for_one,
                        sqrt_price_limit_x96,
                        amount_out,
                    };
                    self.accept_swap(ctx, request)
                }
            }
            Err(err) => {
                debug!(%from_user, %err, "undecodable forward payload");
                Err(PoolError::MalformedPayload)
            }
        };

        if let Err(err) = accepted {
            info!(%from_user, %token, amount, code = err.code(), %err, "deposit refunded");
            self.transfer(ctx, query_id, token, amount, from_user, TransferReason::Refund { code: err.code() });
        }
        Ok(())
    }

    /// Record a mint leg as held and stage it
    fn accept_leg(&mut self, ctx: &mut Context, mut leg: Leg, tick_lower: i32, tick_upper: i32, liquidity: u128) -> Result<()> {
        validate_ticks(tick_lower, tick_upper, self.config.tick_spacing)?;
        if liquidity == 0 {
            return Err(PoolError::ZeroAmount);
        }
        liquidity_delta(liquidity, true)?;

        self.next_leg_id += 1;
        leg.leg_id = self.next_leg_id;
        self.held.insert(leg.leg_id, leg.clone());
        debug!(leg_id = leg.leg_id, owner = %leg.owner, token = %leg.token, amount = leg.amount, "mint leg held");

        let deploy = Deploy::Staging {
            pool: self.address,
            owner: leg.owner,
            tick_lower,
            tick_upper,
            timeout: self.config.staging_timeout,
        };
        ctx.deploy_and_send(
            deploy,
            Message::AddLeg {
                leg,
                tick_lower,
                tick_upper,
                liquidity,
            },
        );
        Ok(())
    }

    fn accept_swap(&mut self, ctx: &mut Context, request: SwapRequest) -> Result<()> {
        let input_token = if request.zero_for_one {
            self.config.token0_wallet
        } else {
            self.config.token1_wallet
        };
        if request.token != input_token {
            return Err(PoolError::PoolMismatch);
        }
        if request.amount == 0 {
            return Err(PoolError::ZeroAmount);
        }
        i128::try_from(request.amount).map_err(|_| MathError::Overflow)?;
        i128::try_from(request.amount_out).map_err(|_| MathError::Overflow)?;

        self.schedule(ctx, Operation::Swap(request));
        Ok(())
    }

    // === staging replies ===

    fn on_mint_complete(
        &mut self,
        ctx: &mut Context,
        leg0: Leg,
        leg1: Leg,
        tick_lower: i32,
        tick_upper: i32,
        liquidity: u128,
    ) -> Result<()> {
        if ctx.sender() != staging_address(&self.address, &leg0.owner, tick_lower, tick_upper) {
            return Err(PoolError::Unauthorized);
        }
        if !self.is_held(&leg0) || !self.is_held(&leg1) {
            debug!(
                leg0 = leg0.leg_id,
                leg1 = leg1.leg_id,
                code = PoolError::StaleOrDuplicateMessage.code(),
                "mint completion for legs no longer held"
            );
            return Ok(());
        }
        self.held.remove(&leg0.leg_id);
        self.held.remove(&leg1.leg_id);

        let (leg0, leg1) = if leg0.token == self.config.token0_wallet {
            (leg0, leg1)
        } else {
            (leg1, leg0)
        };
        let request = MintRequest {
            leg0,
            leg1,
            tick_lower,
            tick_upper,
            liquidity,
        };
        if request.leg0.token != self.config.token0_wallet
            || request.leg1.token != self.config.token1_wallet
            || request.leg0.owner != request.leg1.owner
        {
            warn!(tick_lower, tick_upper, "mismatched legs refunded");
            self.refund_mint(ctx, &request, PoolError::LegConflict.code());
            return Ok(());
        }

        self.schedule(ctx, Operation::Mint(request));
        Ok(())
    }

    fn on_mint_refund(&mut self, ctx: &mut Context, leg: Leg, tick_lower: i32, tick_upper: i32, code: u32) -> Result<()> {
        if ctx.sender() != staging_address(&self.address, &leg.owner, tick_lower, tick_upper) {
            return Err(PoolError::Unauthorized);
        }
        if !self.is_held(&leg) {
            debug!(
                leg_id = leg.leg_id,
                code = PoolError::StaleOrDuplicateMessage.code(),
                "refund for a leg no longer held"
            );
            return Ok(());
        }
        self.held.remove(&leg.leg_id);
        info!(leg_id = leg.leg_id, owner = %leg.owner, amount = leg.amount, code, "mint leg refunded");
        self.refund_leg(ctx, &leg, code);
        Ok(())
    }

    // === lock ===

    fn schedule(&mut self, ctx: &mut Context, operation: Operation) {
        self.deferred.push_back(operation);
        if self.inflight.is_some() {
            debug!(queued = self.deferred.len(), "operation waiting for the lock");
        }
        self.drain(ctx);
    }

    /// Start queued operations until one of them takes the lock
    fn drain(&mut self, ctx: &mut Context) {
        while self.inflight.is_none() {
            let Some(operation) = self.deferred.pop_front() else {
                return;
            };
            self.start(ctx, operation);
        }
    }

    fn start(&mut self, ctx: &mut Context, operation: Operation) {
        let started = match &operation {
            Operation::Mint(request) => self.start_mint(ctx, request),
            Operation::Burn(request) => self.start_burn(ctx, request),
            Operation::Swap(request) => self.start_swap(ctx, request),
        };
        let Err(err) = started else {
            return;
        };

        warn!(code = err.code(), %err, "operation rejected");
        match &operation {
            Operation::Mint(request) => self.refund_mint(ctx, request, err.code()),
            Operation::Burn(_) => {}
            Operation::Swap(request) => self.refund_swap(ctx, request, err.code()),
        }
    }

    // === mint and burn ===

    fn start_mint(&mut self, ctx: &mut Context, request: &MintRequest) -> Result<()> {
        validate_ticks(request.tick_lower, request.tick_upper, self.config.tick_spacing)?;
        let key = PositionKey::new(request.leg0.owner, request.tick_lower, request.tick_upper);
        let delta = liquidity_delta(request.liquidity, true)?;
        let (amount0, amount1) = amounts_for_delta(&self.state, request.tick_lower, request.tick_upper, delta)?;

        if amount0 > U256::from(request.leg0.amount) || amount1 > U256::from(request.leg1.amount) {
            debug!(%amount0, %amount1, leg0 = request.leg0.amount, leg1 = request.leg1.amount, "legs do not cover the mint");
            return Err(PoolError::InsufficientAmount);
        }

        self.dispatch_ticks(ctx, BatchKind::Mint(request.clone()), key, delta, (amount0, amount1));
        Ok(())
    }

    fn start_burn(&mut self, ctx: &mut Context, request: &BurnRequest) -> Result<()> {
        validate_ticks(request.tick_lower, request.tick_upper, self.config.tick_spacing)?;
        let key = PositionKey::new(request.owner, request.tick_lower, request.tick_upper);
        let delta = liquidity_delta(request.liquidity, false)?;

        let position = self.positions.get(&key);
        if position.liquidity == 0 && request.liquidity == 0 {
            return Err(PoolError::NoPosition);
        }
        if position.liquidity < request.liquidity {
            return Err(MathError::LiquidityUnderflow.into());
        }
        let amounts = amounts_for_delta(&self.state, request.tick_lower, request.tick_upper, delta)?;
        owed_amounts(amounts.0, amounts.1)?;

        self.dispatch_ticks(ctx, BatchKind::Burn(request.clone()), key, delta, amounts);
        Ok(())
    }

    /// Send boundary tick updates, one message per shard, and take the lock
    fn dispatch_ticks(&mut self, ctx: &mut Context, kind: BatchKind, key: PositionKey, delta: i128, amounts: (U256, U256)) {
        let context = self.tick_context();
        let mut groups: BTreeMap<i32, Vec<TickUpdate>> = BTreeMap::new();
        for (tick, upper) in [(key.tick_lower, false), (key.tick_upper, true)] {
            groups
                .entry(self.layout.shard_of_tick(tick))
                .or_default()
                .push(TickUpdate {
                    tick,
                    liquidity_delta: delta,
                    upper,
                });
        }

        let mut awaiting = BTreeMap::new();
        for (shard, updates) in groups {
            let seq = self.next_seq();
            awaiting.insert(seq, shard);
            ctx.deploy_and_send(
                self.shard_deploy(shard),
                Message::UpdateTicks {
                    seq,
                    context: context.clone(),
                    updates,
                },
            );
        }

        self.inflight = Some(Inflight::Ticks(TickBatch {
            kind,
            key,
            liquidity_delta: delta,
            amounts,
            awaiting,
            receipts: BTreeMap::new(),
            failure: None,
        }));
    }

    fn on_ticks_updated(&mut self, ctx: &mut Context, seq: u64, result: Result<Vec<TickReceipt>, u32>) -> Result<()> {
        let Some(Inflight::Ticks(batch)) = &mut self.inflight else {
            debug!(seq, code = PoolError::StaleOrDuplicateMessage.code(), "no tick update in flight");
            return Ok(());
        };
        let Some(&shard) = batch.awaiting.get(&seq) else {
            debug!(seq, code = PoolError::StaleOrDuplicateMessage.code(), "unexpected tick update reply");
            return Ok(());
        };
        if ctx.sender() != shard_address(&self.address, shard) {
            return Err(PoolError::Unauthorized);
        }

        batch.awaiting.remove(&seq);
        match result {
            Ok(receipts) => {
                batch.receipts.insert(shard, receipts);
            }
            Err(code) => {
                batch.failure.get_or_insert(code);
            }
        }
        if !batch.awaiting.is_empty() {
            return Ok(());
        }

        if let Some(Inflight::Ticks(batch)) = self.inflight.take() {
            self.complete_batch(ctx, batch);
        }
        self.drain(ctx);
        Ok(())
    }

    /// Undo successful shard updates of a failed batch
    fn restore_ticks(&mut self, ctx: &mut Context, receipts: &BTreeMap<i32, Vec<TickReceipt>>) {
        for (&shard, receipts) in receipts {
            let seq = self.next_seq();
            ctx.send(
                shard_address(&self.address, shard),
                Message::RestoreTicks {
                    seq,
                    receipts: receipts.clone(),
                },
            );
        }
    }

    /// Apply the position change once both boundary ticks are updated
    fn settle_batch(&mut self, batch: &TickBatch) -> Result<(u128, u128)> {
        let receipt = |tick: i32| {
            batch
                .receipts
                .values()
                .flatten()
                .find(|receipt| receipt.tick == tick)
                .ok_or(PoolError::ShardMisrouted { tick })
        };
        let lower = receipt(batch.key.tick_lower)?;
        let upper = receipt(batch.key.tick_upper)?;
        let amounts = owed_amounts(batch.amounts.0, batch.amounts.1)?;
        let reserves = match batch.kind {
            BatchKind::Mint(_) => (
                self.reserves.0.checked_add(amounts.0).ok_or(MathError::Overflow)?,
                self.reserves.1.checked_add(amounts.1).ok_or(MathError::Overflow)?,
            ),
            BatchKind::Burn(_) => self.reserves,
        };

        liquidity::modify_position(
            &mut self.state,
            &mut self.positions,
            &batch.key,
            batch.liquidity_delta,
            &lower.updated,
            &upper.updated,
        )?;
        self.reserves = reserves;
        debug_assert!(invariants::tick_liquidity_bounded(
            upper.updated.liquidity_gross,
            self.config.max_liquidity_per_tick
        ));
        Ok(amounts)
    }

    fn complete_batch(&mut self, ctx: &mut Context, batch: TickBatch) {
        let settled = match batch.failure {
            Some(code) => Err(code),
            None => self.settle_batch(&batch).map_err(|err| err.code()),
        };

        let (amount0, amount1) = match settled {
            Ok(amounts) => amounts,
            Err(code) => {
                warn!(code, tick_lower = batch.key.tick_lower, tick_upper = batch.key.tick_upper, "tick update failed");
                self.restore_ticks(ctx, &batch.receipts);
                if let BatchKind::Mint(request) = &batch.kind {
                    self.refund_mint(ctx, request, code);
                }
                return;
            }
        };

        match batch.kind {
            BatchKind::Mint(request) => {
                let owner = request.leg0.owner;
                let excess0 = request.leg0.amount.saturating_sub(amount0);
                let excess1 = request.leg1.amount.saturating_sub(amount1);
                self.transfer(ctx, request.leg0.query_id, request.leg0.token, excess0, owner, TransferReason::Excess);
                self.transfer(ctx, request.leg1.query_id, request.leg1.token, excess1, owner, TransferReason::Excess);
                ctx.send(
                    owner,
                    Message::MintReceipt {
                        query_id: request.leg0.query_id,
                        tick_lower: request.tick_lower,
                        tick_upper: request.tick_upper,
                        liquidity: request.liquidity,
                        amount0,
                        amount1,
                    },
                );
                info!(%owner, tick_lower = request.tick_lower, tick_upper = request.tick_upper, liquidity = request.liquidity, amount0, amount1, "mint");
            }
            BatchKind::Burn(request) => {
                let mut position = self.positions.get(&batch.key);
                credit_owed(&mut position, (amount0, amount1));
                self.positions.set(&batch.key, position);

                ctx.send(
                    request.owner,
                    Message::BurnReceipt {
                        query_id: request.query_id,
                        tick_lower: request.tick_lower,
                        tick_upper: request.tick_upper,
                        liquidity: request.liquidity,
                        amount0,
                        amount1,
                    },
                );
                info!(owner = %request.owner, tick_lower = request.tick_lower, tick_upper = request.tick_upper, liquidity = request.liquidity, amount0, amount1, "burn");
            }
        }
    }

    // === swap ===

    fn query_shard(&mut self, ctx: &mut Context, shard: i32, session: SwapSession) -> u64 {
        let seq = self.next_seq();
        ctx.send_bounceable(
            shard_address(&self.address, shard),
            Message::CrossShardTickQuery { seq, session },
        );
        seq
    }

    fn start_swap(&mut self, ctx: &mut Context, request: &SwapRequest) -> Result<()> {
        let amount_specified = if request.amount_out == 0 {
            i128::try_from(request.amount)
        } else {
            i128::try_from(request.amount_out).map(|amount| -amount)
        }
        .map_err(|_| MathError::Overflow)?;

        let session = SwapSession::new(
            &self.state,
            &self.config,
            request.zero_for_one,
            amount_specified,
            request.sqrt_price_limit_x96,
        )?;
        let shard = session.next_shard(&self.layout);
        let snapshot = self.state.clone();
        let seq = self.query_shard(ctx, shard, session);
        self.inflight = Some(Inflight::Swap(SwapRun {
            request: request.clone(),
            snapshot,
            seq,
            shard,
        }));
        Ok(())
    }

    /// The swap in flight, if `seq` is the segment it waits for
    fn awaited_swap(&self, seq: u64) -> Option<&SwapRun> {
        match &self.inflight {
            Some(Inflight::Swap(run)) if run.seq == seq => Some(run),
            _ => {
                debug!(seq, code = PoolError::StaleOrDuplicateMessage.code(), "unexpected swap segment");
                None
            }
        }
    }

    fn on_swap_reply(
        &mut self,
        ctx: &mut Context,
        seq: u64,
        session: SwapSession,
        result: Result<SwapProgress, u32>,
    ) -> Result<()> {
        let Some(run) = self.awaited_swap(seq) else {
            return Ok(());
        };
        if ctx.sender() != shard_address(&self.address, run.shard) {
            return Err(PoolError::Unauthorized);
        }
        self.advance_swap(ctx, session, result);
        Ok(())
    }

    /// A query to a shard that was never deployed: walk it as an empty range
    fn on_bounced_query(&mut self, ctx: &mut Context, seq: u64, session: SwapSession) -> Result<()> {
        let Some(run) = self.awaited_swap(seq) else {
            return Ok(());
        };
        if ctx.sender() != shard_address(&self.address, run.shard) {
            return Err(PoolError::Unauthorized);
        }

        let mut empty = TickShard::new(self.layout, run.shard);
        let mut walked = session.clone();
        match walked.advance(&mut empty) {
            Ok(progress) => self.advance_swap(ctx, walked, Ok(progress)),
            Err(err) => self.advance_swap(ctx, session, Err(err.code())),
        }
        Ok(())
    }

    fn advance_swap(&mut self, ctx: &mut Context, session: SwapSession, result: Result<SwapProgress, u32>) {
        let Some(Inflight::Swap(mut run)) = self.inflight.take() else {
            return;
        };

        match result {
            Ok(SwapProgress::Suspended { shard }) => {
                session.sync(&mut self.state);
                run.seq = self.query_shard(ctx, shard, session);
                run.shard = shard;
                self.inflight = Some(Inflight::Swap(run));
                return;
            }
            Ok(SwapProgress::Done) => {
                if let Err(err) = self.finish_swap(ctx, &run.request, &session) {
                    self.abort_swap(ctx, run, &session.crossings, err.code());
                }
            }
            Err(code) => self.abort_swap(ctx, run, &session.crossings, code),
        }
        self.drain(ctx);
    }

    fn finish_swap(&mut self, ctx: &mut Context, request: &SwapRequest, session: &SwapSession) -> Result<()> {
        let (input, output) = session.settlement();
        if input > request.amount {
            return Err(PoolError::InsufficientAmount);
        }

        let mut state = self.state.clone();
        session.apply(&mut state)?;
        let (reserve_in, reserve_out) = if request.zero_for_one {
            (self.reserves.0, self.reserves.1)
        } else {
            (self.reserves.1, self.reserves.0)
        };
        let reserve_in = reserve_in.checked_add(input).ok_or(MathError::Overflow)?;
        let reserve_out = reserve_out.checked_sub(output).ok_or(MathError::Overflow)?;

        self.state = state;
        self.reserves = if request.zero_for_one {
            (reserve_in, reserve_out)
        } else {
            (reserve_out, reserve_in)
        };

        let output_token = if request.zero_for_one {
            self.config.token1_wallet
        } else {
            self.config.token0_wallet
        };
        self.transfer(ctx, request.query_id, output_token, output, request.owner, TransferReason::SwapOutput);
        self.transfer(
            ctx,
            request.query_id,
            request.token,
            request.amount - input,
            request.owner,
            TransferReason::Excess,
        );

        let (amount0, amount1) = session.amounts();
        ctx.send(
            request.owner,
            Message::SwapReceipt {
                query_id: request.query_id,
                amount0,
                amount1,
            },
        );

        debug_assert!(invariants::swap_amounts_opposite_signs(amount0, amount1));
        debug_assert!(invariants::price_in_bounds(&self.state));
        debug_assert!(invariants::tick_consistent_with_price(&self.state));
        info!(
            owner = %request.owner,
            zero_for_one = request.zero_for_one,
            amount0,
            amount1,
            tick = self.state.tick,
            crossings = session.crossings.len(),
            "swap"
        );
        Ok(())
    }

    /// Put the pool back as it was before the swap and refund the whole input
    fn abort_swap(&mut self, ctx: &mut Context, run: SwapRun, crossings: &[TickCrossing], code: u32) {
        self.state = run.snapshot;

        let mut groups: BTreeMap<i32, Vec<TickCrossing>> = BTreeMap::new();
        for crossing in crossings {
            groups
                .entry(self.layout.shard_of_tick(crossing.tick))
                .or_default()
                .push(crossing.clone());
        }
        for (shard, crossings) in groups {
            let seq = self.next_seq();
            ctx.send(shard_address(&self.address, shard), Message::UncrossTicks { seq, crossings });
        }

        warn!(owner = %run.request.owner, code, crossings = crossings.len(), "swap aborted");
        self.refund_swap(ctx, &run.request, code);
    }

    // === burn and collect ===

    fn on_burn(&mut self, ctx: &mut Context, query_id: u64, tick_lower: i32, tick_upper: i32, liquidity: u128) -> Result<()> {
        validate_ticks(tick_lower, tick_upper, self.config.tick_spacing)?;
        liquidity_delta(liquidity, false)?;
        let request = BurnRequest {
            owner: ctx.sender(),
            query_id,
            tick_lower,
            tick_upper,
            liquidity,
        };
        self.schedule(ctx, Operation::Burn(request));
        Ok(())
    }

    fn on_collect(
        &mut self,
        ctx: &mut Context,
        query_id: u64,
        tick_lower: i32,
        tick_upper: i32,
        amount0_requested: u128,
        amount1_requested: u128,
    ) -> Result<()> {
        let owner = ctx.sender();
        let key = PositionKey::new(owner, tick_lower, tick_upper);
        let mut position = self.positions.get(&key);
        let (amount0, amount1) = liquidity::collect(&mut position, amount0_requested, amount1_requested);
        if (amount0, amount1) == (0, 0) {
            debug!(%owner, tick_lower, tick_upper, "nothing to collect");
            return Ok(());
        }

        let (Some(reserve0), Some(reserve1)) = (
            self.reserves.0.checked_sub(amount0),
            self.reserves.1.checked_sub(amount1),
        ) else {
            warn!(%owner, amount0, amount1, reserve0 = self.reserves.0, reserve1 = self.reserves.1, "owed tokens exceed reserves");
            return Err(MathError::Overflow.into());
        };

        self.positions.set(&key, position);
        self.reserves = (reserve0, reserve1);
        self.transfer(ctx, query_id, self.config.token0_wallet, amount0, owner, TransferReason::Collect);
        self.transfer(ctx, query_id, self.config.token1_wallet, amount1, owner, TransferReason::Collect);
        info!(%owner, tick_lower, tick_upper, amount0, amount1, "collect");
        Ok(())
    }
}

impl Handler for PoolActor {
    fn handle(&mut self, ctx: &mut Context, message: Message) -> Result<()> {
        match message {
            Message::TransferNotification {
                query_id,
                amount,
                from_user,
                forward_payload,
            } => self.on_transfer_notification(ctx, query_id, amount, from_user, &forward_payload),
            Message::Burn {
                query_id,
                tick_lower,
                tick_upper,
                liquidity,
            } => self.on_burn(ctx, query_id, tick_lower, tick_upper, liquidity),
            Message::Collect {
                query_id,
                tick_lower,
                tick_upper,
                amount0_requested,
                amount1_requested,
            } => self.on_collect(ctx, query_id, tick_lower, tick_upper, amount0_requested, amount1_requested),
            Message::MintComplete {
                leg0,
                leg1,
                tick_lower,
                tick_upper,
                liquidity,
            } => self.on_mint_complete(ctx, leg0, leg1, tick_lower, tick_upper, liquidity),
            Message::MintRefund {
                leg,
                tick_lower,
                tick_upper,
                code,
            } => self.on_mint_refund(ctx, leg, tick_lower, tick_upper, code),
            Message::TicksUpdated { seq, result } => self.on_ticks_updated(ctx, seq, result),
            Message::CrossShardTickReply { seq, session, result } => self.on_swap_reply(ctx, seq, session, result),
            Message::Bounced { original } => match *original {
                Message::CrossShardTickQuery { seq, session } => self.on_bounced_query(ctx, seq, session),
                other => {
                    debug!(message = other.name(), "bounce ignored");
                    Ok(())
                }
            },
            other => {
                debug!(message = other.name(), "unexpected message");
                Err(PoolError::UnexpectedMessage)
            }
        }
    }
}
