//! Per-owner, per-range buffer that pairs the two legs of a deposit.
//!
//! The pool forwards each accepted mint leg here. The first leg waits; the
//! matching second leg completes the saga and the record destroys itself. A
//! waiting leg can be handed back by its owner at any time, or by anyone once
//! the timeout has passed.

use crate::error::{PoolError, Result};
use crate::host::{Context, Handler};
use crate::message::{Leg, Message};
use alloy_primitives::Address;
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MintSaga {
    Pending,
    OneLegReceived {
        leg: Leg,
        liquidity: u128,
        received_at: u64,
    },
    Completed,
    Refunded,
}

#[derive(Clone, Debug)]
pub struct StagingActor {
    pool: Address,
    owner: Address,
    tick_lower: i32,
    tick_upper: i32,
    timeout: u64,
    saga: MintSaga,
}

impl StagingActor {
    pub fn new(pool: Address, owner: Address, tick_lower: i32, tick_upper: i32, timeout: u64) -> Self {
        Self {
            pool,
            owner,
            tick_lower,
            tick_upper,
            timeout,
            saga: MintSaga::Pending,
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn saga(&self) -> &MintSaga {
        &self.saga
    }

    fn refund(&self, ctx: &mut Context, leg: Leg, err: PoolError) {
        ctx.send(
            self.pool,
            Message::MintRefund {
                leg,
                tick_lower: self.tick_lower,
                tick_upper: self.tick_upper,
                code: err.code(),
            },
        );
    }

    fn add_leg(&mut self, ctx: &mut Context, leg: Leg, liquidity: u128) -> Result<()> {
        match &self.saga {
            MintSaga::Pending => {
                debug!(owner = %self.owner, leg_id = leg.leg_id, token = %leg.token, "first leg staged");
                self.saga = MintSaga::OneLegReceived {
                    leg,
                    liquidity,
                    received_at: ctx.now(),
                };
                Ok(())
            }
            MintSaga::OneLegReceived {
                leg: staged,
                liquidity: staged_liquidity,
                ..
            } => {
                if staged.leg_id == leg.leg_id {
                    debug!(leg_id = leg.leg_id, "duplicate leg dropped");
                    return Ok(());
                }
                if staged.token == leg.token || *staged_liquidity != liquidity {
                    info!(
                        owner = %self.owner,
                        staged = staged.leg_id,
                        rejected = leg.leg_id,
                        "conflicting leg refunded"
                    );
                    self.refund(ctx, leg, PoolError::LegConflict);
                    return Ok(());
                }

                ctx.send(
                    self.pool,
                    Message::MintComplete {
                        leg0: staged.clone(),
                        leg1: leg,
                        tick_lower: self.tick_lower,
                        tick_upper: self.tick_upper,
                        liquidity,
                    },
                );
                self.saga = MintSaga::Completed;
                ctx.destroy();
                Ok(())
            }
            MintSaga::Completed | MintSaga::Refunded => Err(PoolError::UnexpectedMessage),
        }
    }

    fn request_refund(&mut self, ctx: &mut Context, observed_leg_id: u64) -> Result<()> {
        let MintSaga::OneLegReceived { leg, received_at, .. } = &self.saga else {
            debug!(owner = %self.owner, "nothing staged to refund");
            return Ok(());
        };

        let expired = ctx.now() >= received_at.saturating_add(self.timeout);
        if ctx.sender() != self.owner && !expired {
            return Err(PoolError::Unauthorized);
        }
        if leg.leg_id != observed_leg_id {
            debug!(
                observed = observed_leg_id,
                staged = leg.leg_id,
                code = PoolError::StaleOrDuplicateMessage.code(),
                "refund request for another leg"
            );
            return Ok(());
        }

        info!(owner = %self.owner, leg_id = leg.leg_id, requester = %ctx.sender(), "staged leg refunded");
        let leg = leg.clone();
        self.refund(ctx, leg, PoolError::RefundRequested);
        self.saga = MintSaga::Refunded;
        ctx.destroy();
        Ok(())
    }
}

impl Handler for StagingActor {
    fn handle(&mut self, ctx: &mut Context, message: Message) -> Result<()> {
        match message {
            Message::AddLeg {
                leg,
                tick_lower,
                tick_upper,
                liquidity,
            } => {
                if ctx.sender() != self.pool {
                    return Err(PoolError::Unauthorized);
                }
                if leg.owner != self.owner || tick_lower != self.tick_lower || tick_upper != self.tick_upper {
                    return Err(PoolError::PoolMismatch);
                }
                self.add_leg(ctx, leg, liquidity)
            }
            Message::RequestRefund { observed_leg_id } => self.request_refund(ctx, observed_leg_id),
            other => {
                debug!(message = other.name(), "unexpected message");
                Err(PoolError::UnexpectedMessage)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const POOL: Address = address!("00000000000000000000000000000000000000f0");
    const OWNER: Address = address!("1000000000000000000000000000000000000001");
    const KEEPER: Address = address!("3000000000000000000000000000000000000003");
    const TOKEN0: Address = address!("00000000000000000000000000000000000000a0");
    const TOKEN1: Address = address!("00000000000000000000000000000000000000a1");

    fn leg(leg_id: u64, token: Address) -> Leg {
        Leg {
            leg_id,
            query_id: 9,
            owner: OWNER,
            token,
            amount: 1_000,
        }
    }

    fn add_leg(leg: Leg, liquidity: u128) -> Message {
        Message::AddLeg {
            leg,
            tick_lower: -60,
            tick_upper: 60,
            liquidity,
        }
    }

    fn staging() -> StagingActor {
        StagingActor::new(POOL, OWNER, -60, 60, 100)
    }

    fn send(actor: &mut StagingActor, from: Address, now: u64, message: Message) -> (Result<()>, Context) {
        let mut ctx = Context::new(Address::ZERO, from, now);
        let result = actor.handle(&mut ctx, message);
        (result, ctx)
    }

    fn bodies(ctx: &Context) -> Vec<Message> {
        ctx.outbox().iter().map(|envelope| envelope.body.clone()).collect()
    }

    // === pairing ===

    #[test]
    fn test_second_leg_completes() {
        let mut actor = staging();
        let (result, ctx) = send(&mut actor, POOL, 5, add_leg(leg(1, TOKEN1), 500));
        assert!(result.is_ok());
        assert!(bodies(&ctx).is_empty());
        assert!(matches!(actor.saga(), MintSaga::OneLegReceived { received_at: 5, .. }));

        let (result, ctx) = send(&mut actor, POOL, 6, add_leg(leg(2, TOKEN0), 500));
        assert!(result.is_ok());
        assert!(ctx.is_destroyed());
        assert_eq!(
            bodies(&ctx),
            vec![Message::MintComplete {
                leg0: leg(1, TOKEN1),
                leg1: leg(2, TOKEN0),
                tick_lower: -60,
                tick_upper: 60,
                liquidity: 500,
            }]
        );
        assert_eq!(actor.saga(), &MintSaga::Completed);
    }

    #[test]
    fn test_same_token_leg_refunded_immediately() {
        let mut actor = staging();
        send(&mut actor, POOL, 0, add_leg(leg(1, TOKEN0), 500));
        let (result, ctx) = send(&mut actor, POOL, 0, add_leg(leg(2, TOKEN0), 500));

        assert!(result.is_ok());
        assert!(!ctx.is_destroyed());
        assert_eq!(
            bodies(&ctx),
            vec![Message::MintRefund {
                leg: leg(2, TOKEN0),
                tick_lower: -60,
                tick_upper: 60,
                code: PoolError::LegConflict.code(),
            }]
        );
        // The first leg stays staged
        assert!(matches!(actor.saga(), MintSaga::OneLegReceived { leg, .. } if leg.leg_id == 1));
    }

    #[test]
    fn test_liquidity_mismatch_refunded() {
        let mut actor = staging();
        send(&mut actor, POOL, 0, add_leg(leg(1, TOKEN0), 500));
        let (_, ctx) = send(&mut actor, POOL, 0, add_leg(leg(2, TOKEN1), 501));
        assert!(matches!(
            &bodies(&ctx)[..],
            [Message::MintRefund { leg, .. }] if leg.leg_id == 2
        ));
    }

    #[test]
    fn test_duplicate_leg_ignored() {
        let mut actor = staging();
        send(&mut actor, POOL, 0, add_leg(leg(1, TOKEN0), 500));
        let (result, ctx) = send(&mut actor, POOL, 0, add_leg(leg(1, TOKEN0), 500));
        assert!(result.is_ok());
        assert!(bodies(&ctx).is_empty());
    }

    #[test]
    fn test_leg_only_from_pool() {
        let mut actor = staging();
        let (result, _) = send(&mut actor, OWNER, 0, add_leg(leg(1, TOKEN0), 500));
        assert_eq!(result, Err(PoolError::Unauthorized));
        assert_eq!(actor.saga(), &MintSaga::Pending);
    }

    // === refunds ===

    #[test]
    fn test_owner_refund_any_time() {
        let mut actor = staging();
        send(&mut actor, POOL, 10, add_leg(leg(1, TOKEN0), 500));
        let (result, ctx) = send(&mut actor, OWNER, 11, Message::RequestRefund { observed_leg_id: 1 });

        assert!(result.is_ok());
        assert!(ctx.is_destroyed());
        assert!(matches!(
            &bodies(&ctx)[..],
            [Message::MintRefund { code, .. }] if *code == PoolError::RefundRequested.code()
        ));
        assert_eq!(actor.saga(), &MintSaga::Refunded);
    }

    #[test]
    fn test_others_wait_for_timeout() {
        let mut actor = staging();
        send(&mut actor, POOL, 10, add_leg(leg(1, TOKEN0), 500));

        let (result, _) = send(&mut actor, KEEPER, 109, Message::RequestRefund { observed_leg_id: 1 });
        assert_eq!(result, Err(PoolError::Unauthorized));

        let (result, ctx) = send(&mut actor, KEEPER, 110, Message::RequestRefund { observed_leg_id: 1 });
        assert!(result.is_ok());
        assert_eq!(bodies(&ctx).len(), 1);
    }

    #[test]
    fn test_refund_for_other_leg_is_stale() {
        let mut actor = staging();
        send(&mut actor, POOL, 0, add_leg(leg(1, TOKEN0), 500));
        let (result, ctx) = send(&mut actor, OWNER, 0, Message::RequestRefund { observed_leg_id: 7 });
        assert!(result.is_ok());
        assert!(bodies(&ctx).is_empty());
        assert!(!ctx.is_destroyed());
    }
}
