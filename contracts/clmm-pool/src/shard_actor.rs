//! Tick shard actor: owns one contiguous range of ticks and bitmap words.

use crate::error::{PoolError, Result};
use crate::host::{Context, Handler};
use crate::message::Message;
use crate::storage::{ShardLayout, TickAccess, TickContext, TickReceipt, TickShard, TickStore, TickUpdate};
use crate::swap::SwapSession;
use alloy_primitives::Address;
use clmm_types::{Cell, Record, TickInfo};
use tracing::debug;

#[derive(Clone, Debug)]
pub struct ShardActor {
    pool: Address,
    shard: TickShard,
    /// Highest request sequence handled so far
    last_seq: u64,
}

fn apply_updates(shard: &mut TickShard, context: &TickContext, updates: &[TickUpdate]) -> Result<Vec<TickReceipt>> {
    let mut receipts = Vec::with_capacity(updates.len());
    for update in updates {
        match shard.apply_tick_update(update, context)? {
            TickAccess::Ready(receipt) => receipts.push(receipt),
            TickAccess::Pending { .. } => return Err(PoolError::ShardMisrouted { tick: update.tick }),
        }
    }
    Ok(receipts)
}

fn restore(shard: &mut TickShard, receipts: &[TickReceipt]) -> Result<()> {
    for receipt in receipts.iter().rev() {
        if let TickAccess::Pending { .. } = shard.restore_tick(receipt)? {
            return Err(PoolError::ShardMisrouted { tick: receipt.tick });
        }
    }
    Ok(())
}

impl ShardActor {
    pub fn new(pool: Address, layout: ShardLayout, index: i32) -> Self {
        Self {
            pool,
            shard: TickShard::new(layout, index),
            last_seq: 0,
        }
    }

    pub fn index(&self) -> i32 {
        self.shard.index()
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn ticks(&self) -> &TickShard {
        &self.shard
    }

    pub fn tick(&self, tick: i32) -> Result<TickInfo> {
        match self.shard.get(tick) {
            TickAccess::Ready(info) => Ok(info),
            TickAccess::Pending { .. } => Err(PoolError::ShardMisrouted { tick }),
        }
    }

    /// Persisted layout of a tick entry
    pub fn tick_record(&self, tick: i32) -> Result<Cell> {
        Ok(self.tick(tick)?.to_cell()?)
    }

    /// Accept a request once; later or repeated sequence numbers are dropped
    fn admit(&mut self, seq: u64) -> bool {
        if seq <= self.last_seq {
            debug!(
                shard = self.shard.index(),
                seq,
                last_seq = self.last_seq,
                code = PoolError::StaleOrDuplicateMessage.code(),
                "stale request dropped"
            );
            return false;
        }
        self.last_seq = seq;
        true
    }
}

impl Handler for ShardActor {
    fn handle(&mut self, ctx: &mut Context, message: Message) -> Result<()> {
        if ctx.sender() != self.pool {
            return Err(PoolError::Unauthorized);
        }

        match message {
            Message::UpdateTicks { seq, context, updates } => {
                if !self.admit(seq) {
                    return Ok(());
                }
                let mut scratch = self.shard.clone();
                let result = match apply_updates(&mut scratch, &context, &updates) {
                    Ok(receipts) => {
                        self.shard = scratch;
                        Ok(receipts)
                    }
                    Err(err) => {
                        debug!(shard = self.shard.index(), seq, %err, "tick update rejected");
                        Err(err.code())
                    }
                };
                ctx.send(self.pool, Message::TicksUpdated { seq, result });
            }
            Message::RestoreTicks { seq, receipts } => {
                if self.admit(seq) {
                    restore(&mut self.shard, &receipts)?;
                }
            }
            Message::CrossShardTickQuery { seq, session } => {
                if !self.admit(seq) {
                    return Ok(());
                }
                let mut scratch = self.shard.clone();
                let mut walked = session.clone();
                let reply = match walked.advance(&mut scratch) {
                    Ok(progress) => {
                        self.shard = scratch;
                        Message::CrossShardTickReply {
                            seq,
                            session: walked,
                            result: Ok(progress),
                        }
                    }
                    Err(err) => {
                        debug!(shard = self.shard.index(), seq, %err, "swap segment failed");
                        Message::CrossShardTickReply {
                            seq,
                            session,
                            result: Err(err.code()),
                        }
                    }
                };
                ctx.send(self.pool, reply);
            }
            Message::UncrossTicks { seq, crossings } => {
                if self.admit(seq) {
                    SwapSession::uncross(&crossings, &mut self.shard)?;
                }
            }
            other => {
                debug!(shard = self.shard.index(), message = other.name(), "unexpected message");
                return Err(PoolError::UnexpectedMessage);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::{SwapProgress, TickCrossing};
    use alloy_primitives::{address, U256};
    use clmm_types::{PoolConfig, PoolState, Q96};

    const POOL: Address = address!("00000000000000000000000000000000000000f0");
    const STRANGER: Address = address!("1000000000000000000000000000000000000001");

    fn context() -> TickContext {
        TickContext {
            tick_current: 0,
            fee_growth_global_0_x128: U256::ZERO,
            fee_growth_global_1_x128: U256::ZERO,
            max_liquidity: 100,
        }
    }

    fn update(tick: i32, liquidity_delta: i128, upper: bool) -> TickUpdate {
        TickUpdate {
            tick,
            liquidity_delta,
            upper,
        }
    }

    fn shard() -> ShardActor {
        ShardActor::new(POOL, ShardLayout::new(60, 1), 0)
    }

    fn send(actor: &mut ShardActor, message: Message) -> (Result<()>, Vec<Message>) {
        let mut ctx = Context::new(Address::ZERO, POOL, 0);
        let result = actor.handle(&mut ctx, message);
        let replies = ctx.outbox().iter().map(|envelope| envelope.body.clone()).collect();
        (result, replies)
    }

    // === tick updates ===

    #[test]
    fn test_update_replies_with_receipts() {
        let mut actor = shard();
        let (result, replies) = send(
            &mut actor,
            Message::UpdateTicks {
                seq: 4,
                context: context(),
                updates: vec![update(60, 10, false), update(120, 10, true)],
            },
        );
        assert!(result.is_ok());
        match &replies[..] {
            [Message::TicksUpdated { seq: 4, result: Ok(receipts) }] => {
                assert_eq!(receipts.len(), 2);
                assert!(receipts.iter().all(|receipt| receipt.flipped));
            }
            other => panic!("unexpected replies {other:?}"),
        }
        assert_eq!(actor.tick(120).unwrap().liquidity_net, -10);
        assert_eq!(actor.last_seq(), 4);
    }

    #[test]
    fn test_update_failure_changes_nothing() {
        let mut actor = shard();
        // Second update exceeds the per-tick maximum of 100
        let (_, replies) = send(
            &mut actor,
            Message::UpdateTicks {
                seq: 1,
                context: context(),
                updates: vec![update(60, 10, false), update(120, 101, true)],
            },
        );
        assert_eq!(
            replies,
            vec![Message::TicksUpdated {
                seq: 1,
                result: Err(PoolError::LiquidityGrossExceeded.code())
            }]
        );
        assert!(actor.ticks().is_empty());
    }

    #[test]
    fn test_update_outside_shard_is_misrouted() {
        let mut actor = shard();
        let (_, replies) = send(
            &mut actor,
            Message::UpdateTicks {
                seq: 1,
                context: context(),
                updates: vec![update(-60, 10, false)],
            },
        );
        assert_eq!(
            replies,
            vec![Message::TicksUpdated {
                seq: 1,
                result: Err(PoolError::ShardMisrouted { tick: -60 }.code())
            }]
        );
    }

    #[test]
    fn test_restore_undoes_update() {
        let mut actor = shard();
        let (_, replies) = send(
            &mut actor,
            Message::UpdateTicks {
                seq: 1,
                context: context(),
                updates: vec![update(60, 10, false)],
            },
        );
        let receipts = match &replies[0] {
            Message::TicksUpdated { result: Ok(receipts), .. } => receipts.clone(),
            other => panic!("unexpected {}", other.name()),
        };

        let (result, _) = send(&mut actor, Message::RestoreTicks { seq: 2, receipts });
        assert!(result.is_ok());
        assert!(actor.ticks().is_empty());
    }

    // === sequencing and authorization ===

    #[test]
    fn test_stale_sequence_dropped() {
        let mut actor = shard();
        let message = Message::UpdateTicks {
            seq: 3,
            context: context(),
            updates: vec![update(60, 10, false)],
        };
        send(&mut actor, message.clone());
        let (result, replies) = send(&mut actor, message);
        assert!(result.is_ok());
        assert!(replies.is_empty());
        assert_eq!(actor.tick(60).unwrap().liquidity_gross, 10);
    }

    #[test]
    fn test_only_pool_may_send() {
        let mut actor = shard();
        let mut ctx = Context::new(Address::ZERO, STRANGER, 0);
        let result = actor.handle(&mut ctx, Message::RestoreTicks { seq: 1, receipts: vec![] });
        assert_eq!(result, Err(PoolError::Unauthorized));
        assert_eq!(actor.last_seq(), 0);
    }

    // === swap segments ===

    #[test]
    fn test_query_on_empty_shard_suspends_towards_next() {
        let mut actor = shard();
        let config = PoolConfig {
            token0_wallet: Address::ZERO,
            token1_wallet: Address::ZERO,
            fee: 3000,
            protocol_fee: 0,
            tick_spacing: 60,
            max_liquidity_per_tick: u128::MAX,
            words_per_shard: 1,
            staging_timeout: 0,
        };
        let state = PoolState {
            liquidity: 1_000_000,
            ..PoolState::new(Q96, 0)
        };
        let session = SwapSession::new(&state, &config, false, 1_000_000_000, U256::ZERO).unwrap();

        let (_, replies) = send(&mut actor, Message::CrossShardTickQuery { seq: 1, session });
        match &replies[..] {
            [Message::CrossShardTickReply { seq: 1, session, result: Ok(progress) }] => {
                assert_eq!(*progress, SwapProgress::Suspended { shard: 1 });
                // Walked to the last tick of word 0
                assert_eq!(session.tick, 255 * 60);
            }
            other => panic!("unexpected replies {other:?}"),
        }
    }

    #[test]
    fn test_uncross_outside_shard_fails_whole_message() {
        let mut actor = shard();
        let crossings = vec![TickCrossing {
            tick: -60,
            fee_growth_global_0_x128: U256::ZERO,
            fee_growth_global_1_x128: U256::ZERO,
        }];
        let (result, _) = send(&mut actor, Message::UncrossTicks { seq: 1, crossings });
        assert_eq!(result, Err(PoolError::ShardMisrouted { tick: -60 }));
    }

    #[test]
    fn test_tick_record_layout() {
        let actor = shard();
        let cell = actor.tick_record(60).unwrap();
        assert_eq!(cell.bit_len(), 128 + 128 + 256 + 256 + 1);
        assert!(actor.tick_record(-60).is_err());
    }
}
