//! In-process actor runtime.
//!
//! Every actor lives at an address and only reacts to messages. Delivery runs
//! the handler against a copy of the target: a handler that fails leaves the
//! actor untouched and sends nothing. Envelopes between the same ordered pair
//! of addresses are never reordered; everything else may be, which tests use
//! to interleave concurrent sagas.

use crate::error::{PoolError, Result};
use crate::message::Message;
use crate::pool_actor::PoolActor;
use crate::shard_actor::ShardActor;
use crate::staging::StagingActor;
use crate::storage::ShardLayout;
use alloy_primitives::Address;
use clmm_types::{shard_address, staging_address};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, trace, warn};

/// Instructions to create the recipient if it does not exist yet
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Deploy {
    Shard {
        pool: Address,
        index: i32,
        layout: ShardLayout,
    },
    Staging {
        pool: Address,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        /// Seconds before anyone but the owner may refund
        timeout: u64,
    },
}

impl Deploy {
    /// Address the deployed actor will live at
    pub fn address(&self) -> Address {
        match self {
            Deploy::Shard { pool, index, .. } => shard_address(pool, *index),
            Deploy::Staging {
                pool,
                owner,
                tick_lower,
                tick_upper,
                ..
            } => staging_address(pool, owner, *tick_lower, *tick_upper),
        }
    }

    fn spawn(&self) -> Actor {
        match self {
            Deploy::Shard { pool, index, layout } => Actor::Shard(ShardActor::new(*pool, *layout, *index)),
            Deploy::Staging {
                pool,
                owner,
                tick_lower,
                tick_upper,
                timeout,
            } => Actor::Staging(StagingActor::new(*pool, *owner, *tick_lower, *tick_upper, *timeout)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub from: Address,
    pub to: Address,
    pub body: Message,
    /// Return the body to the sender if nobody lives at `to`
    pub bounce: bool,
    pub deploy: Option<Deploy>,
}

/// What a handler sees of the world while it runs
#[derive(Debug)]
pub struct Context {
    address: Address,
    sender: Address,
    now: u64,
    outbox: Vec<Envelope>,
    destroyed: bool,
}

impl Context {
    pub fn new(address: Address, sender: Address, now: u64) -> Self {
        Self {
            address,
            sender,
            now,
            outbox: Vec::new(),
            destroyed: false,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    /// Logical time in seconds
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn send(&mut self, to: Address, body: Message) {
        self.push(to, body, false, None);
    }

    /// Send a message that comes back as [`Message::Bounced`] if `to` is empty
    pub fn send_bounceable(&mut self, to: Address, body: Message) {
        self.push(to, body, true, None);
    }

    /// Send to a child, creating it first if needed
    pub fn deploy_and_send(&mut self, deploy: Deploy, body: Message) {
        let to = deploy.address();
        self.push(to, body, false, Some(deploy));
    }

    /// Remove this actor once the current message is handled
    pub fn destroy(&mut self) {
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Messages sent so far
    pub fn outbox(&self) -> &[Envelope] {
        &self.outbox
    }

    fn push(&mut self, to: Address, body: Message, bounce: bool, deploy: Option<Deploy>) {
        self.outbox.push(Envelope {
            from: self.address,
            to,
            body,
            bounce,
            deploy,
        });
    }
}

pub trait Handler {
    fn handle(&mut self, ctx: &mut Context, message: Message) -> Result<()>;
}

#[derive(Clone, Debug)]
pub enum Actor {
    Pool(Box<PoolActor>),
    Shard(ShardActor),
    Staging(StagingActor),
}

impl Handler for Actor {
    fn handle(&mut self, ctx: &mut Context, message: Message) -> Result<()> {
        match self {
            Actor::Pool(pool) => pool.handle(ctx, message),
            Actor::Shard(shard) => shard.handle(ctx, message),
            Actor::Staging(staging) => staging.handle(ctx, message),
        }
    }
}

/// Outcome of delivering one envelope
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Handled,
    /// The handler failed and its changes were discarded
    Failed(PoolError),
    /// Nobody lives at the address; the body went back to the sender
    Bounced,
    /// Addressed outside the network
    Outbound,
    Dropped,
}

/// A set of actors and the messages in flight between them
#[derive(Debug, Default)]
pub struct Network {
    actors: BTreeMap<Address, Actor>,
    queue: VecDeque<Envelope>,
    now: u64,
    outbound: Vec<Envelope>,
    failures: Vec<(Envelope, PoolError)>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deploy_pool(&mut self, pool: PoolActor) {
        self.actors.insert(pool.address(), Actor::Pool(Box::new(pool)));
    }

    /// Queue a message from an address outside the network
    pub fn send_external(&mut self, from: Address, to: Address, body: Message) {
        self.queue.push_back(Envelope {
            from,
            to,
            body,
            bounce: false,
            deploy: None,
        });
    }

    pub fn advance_time(&mut self, seconds: u64) {
        self.now += seconds;
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Envelopes waiting for delivery, oldest first
    pub fn pending(&self) -> impl Iterator<Item = &Envelope> {
        self.queue.iter()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Envelopes that left the network, oldest first
    pub fn outbound(&self) -> &[Envelope] {
        &self.outbound
    }

    pub fn take_outbound(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbound)
    }

    pub fn failures(&self) -> &[(Envelope, PoolError)] {
        &self.failures
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.actors.contains_key(address)
    }

    pub fn pool(&self, address: &Address) -> Option<&PoolActor> {
        match self.actors.get(address) {
            Some(Actor::Pool(pool)) => Some(pool),
            _ => None,
        }
    }

    pub fn shard(&self, address: &Address) -> Option<&ShardActor> {
        match self.actors.get(address) {
            Some(Actor::Shard(shard)) => Some(shard),
            _ => None,
        }
    }

    pub fn staging(&self, address: &Address) -> Option<&StagingActor> {
        match self.actors.get(address) {
            Some(Actor::Staging(staging)) => Some(staging),
            _ => None,
        }
    }

    /// Deliver the oldest envelope
    pub fn deliver_next(&mut self) -> Option<Delivery> {
        let envelope = self.queue.pop_front()?;
        Some(self.deliver(envelope))
    }

    /// Deliver the envelope at `index` ahead of older ones
    ///
    /// Returns `None` when the index is out of range or when an older
    /// envelope travels between the same two addresses.
    pub fn deliver_at(&mut self, index: usize) -> Option<Delivery> {
        let target = self.queue.get(index)?;
        let overtakes = self
            .queue
            .iter()
            .take(index)
            .any(|earlier| earlier.from == target.from && earlier.to == target.to);
        if overtakes {
            return None;
        }
        let envelope = self.queue.remove(index)?;
        Some(self.deliver(envelope))
    }

    /// Queue a second copy of the envelope at `index`
    pub fn duplicate_at(&mut self, index: usize) -> bool {
        match self.queue.get(index).cloned() {
            Some(envelope) => {
                self.queue.push_back(envelope);
                true
            }
            None => false,
        }
    }

    /// Deliver until the queue is empty or `max_steps` envelopes were handled
    ///
    /// Returns the number of deliveries made.
    pub fn run_until_idle(&mut self, max_steps: usize) -> usize {
        let mut steps = 0;
        while steps < max_steps && self.deliver_next().is_some() {
            steps += 1;
        }
        if !self.queue.is_empty() {
            warn!(pending = self.queue.len(), max_steps, "network still busy");
        }
        steps
    }

    fn deliver(&mut self, envelope: Envelope) -> Delivery {
        trace!(
            from = %envelope.from,
            to = %envelope.to,
            message = envelope.body.name(),
            opcode = ?envelope.body.opcode(),
            "deliver"
        );

        let mut actor = match self.actors.get(&envelope.to) {
            Some(actor) => actor.clone(),
            None => match &envelope.deploy {
                Some(deploy) if deploy.address() == envelope.to => deploy.spawn(),
                Some(_) => {
                    warn!(to = %envelope.to, "deploy does not match the destination");
                    return Delivery::Dropped;
                }
                None if envelope.bounce => {
                    debug!(to = %envelope.to, message = envelope.body.name(), "bounced");
                    self.queue.push_back(Envelope {
                        from: envelope.to,
                        to: envelope.from,
                        body: Message::Bounced {
                            original: Box::new(envelope.body),
                        },
                        bounce: false,
                        deploy: None,
                    });
                    return Delivery::Bounced;
                }
                None => {
                    self.outbound.push(envelope);
                    return Delivery::Outbound;
                }
            },
        };

        let mut ctx = Context::new(envelope.to, envelope.from, self.now);
        match actor.handle(&mut ctx, envelope.body.clone()) {
            Ok(()) => {
                if ctx.destroyed {
                    debug!(address = %envelope.to, "actor destroyed");
                    self.actors.remove(&envelope.to);
                } else {
                    self.actors.insert(envelope.to, actor);
                }
                self.queue.extend(ctx.outbox);
                Delivery::Handled
            }
            Err(err) => {
                warn!(
                    to = %envelope.to,
                    message = envelope.body.name(),
                    code = err.code(),
                    %err,
                    "handler failed"
                );
                self.failures.push((envelope, err));
                Delivery::Failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_tracing;
    use crate::storage::{TickContext, TickUpdate};
    use alloy_primitives::{address, U256};

    const POOL: Address = address!("00000000000000000000000000000000000000f0");
    const USER: Address = address!("1000000000000000000000000000000000000001");

    fn layout() -> ShardLayout {
        ShardLayout::new(60, 1)
    }

    fn shard_deploy(index: i32) -> Deploy {
        Deploy::Shard {
            pool: POOL,
            index,
            layout: layout(),
        }
    }

    fn update_ticks(seq: u64) -> Message {
        Message::UpdateTicks {
            seq,
            context: TickContext {
                tick_current: 0,
                fee_growth_global_0_x128: U256::ZERO,
                fee_growth_global_1_x128: U256::ZERO,
                max_liquidity: u128::MAX,
            },
            updates: vec![TickUpdate {
                tick: 60,
                liquidity_delta: 10,
                upper: false,
            }],
        }
    }

    fn deployed(network: &mut Network, from: Address, deploy: Deploy, body: Message) {
        network.queue.push_back(Envelope {
            from,
            to: deploy.address(),
            body,
            bounce: false,
            deploy: Some(deploy),
        });
    }

    // === delivery ===

    #[test]
    fn test_deploy_spawns_and_handles() {
        init_tracing();
        let mut network = Network::new();
        deployed(&mut network, POOL, shard_deploy(0), update_ticks(1));

        assert_eq!(network.deliver_next(), Some(Delivery::Handled));
        let shard = network.shard(&shard_address(&POOL, 0)).unwrap();
        assert_eq!(shard.tick(60).unwrap().liquidity_gross, 10);

        // The reply to the pool leaves the network since no pool is deployed
        assert_eq!(network.deliver_next(), Some(Delivery::Outbound));
        assert!(matches!(
            network.outbound()[0].body,
            Message::TicksUpdated { seq: 1, result: Ok(_) }
        ));
    }

    #[test]
    fn test_deploy_to_wrong_address_is_dropped() {
        let mut network = Network::new();
        network.queue.push_back(Envelope {
            from: POOL,
            to: shard_address(&POOL, 1),
            body: update_ticks(1),
            bounce: false,
            deploy: Some(shard_deploy(0)),
        });

        assert_eq!(network.deliver_next(), Some(Delivery::Dropped));
        assert!(!network.contains(&shard_address(&POOL, 1)));
        assert!(!network.contains(&shard_address(&POOL, 0)));
    }

    #[test]
    fn test_failed_handler_commits_nothing() {
        init_tracing();
        let mut network = Network::new();
        // Shards only take orders from their pool
        deployed(&mut network, USER, shard_deploy(0), update_ticks(1));

        assert_eq!(
            network.deliver_next(),
            Some(Delivery::Failed(PoolError::Unauthorized))
        );
        assert!(!network.contains(&shard_address(&POOL, 0)));
        assert_eq!(network.pending_count(), 0);
        assert_eq!(network.failures().len(), 1);
    }

    #[test]
    fn test_bounceable_to_empty_address_returns() {
        let mut network = Network::new();
        network.queue.push_back(Envelope {
            from: POOL,
            to: USER,
            body: Message::RequestRefund { observed_leg_id: 3 },
            bounce: true,
            deploy: None,
        });

        assert_eq!(network.deliver_next(), Some(Delivery::Bounced));
        let returned = network.pending().next().unwrap();
        assert_eq!(returned.to, POOL);
        assert_eq!(returned.from, USER);
        assert!(!returned.bounce);
        assert_eq!(
            returned.body,
            Message::Bounced {
                original: Box::new(Message::RequestRefund { observed_leg_id: 3 })
            }
        );
    }

    // === ordering controls ===

    #[test]
    fn test_deliver_at_keeps_pair_order() {
        let mut network = Network::new();
        deployed(&mut network, POOL, shard_deploy(0), update_ticks(1));
        deployed(&mut network, POOL, shard_deploy(1), update_ticks(2));
        deployed(&mut network, POOL, shard_deploy(0), update_ticks(3));

        // Same pair as the head of the queue
        assert_eq!(network.deliver_at(2), None);
        // Different destination may overtake
        assert_eq!(network.deliver_at(1), Some(Delivery::Handled));
        assert!(network.contains(&shard_address(&POOL, 1)));
        assert_eq!(network.deliver_at(7), None);
    }

    #[test]
    fn test_duplicate_is_dropped_by_sequence() {
        init_tracing();
        let mut network = Network::new();
        deployed(&mut network, POOL, shard_deploy(0), update_ticks(1));
        assert!(network.duplicate_at(0));
        assert!(!network.duplicate_at(5));

        // update, its copy, then the single reply
        assert_eq!(network.run_until_idle(10), 3);
        let shard = network.shard(&shard_address(&POOL, 0)).unwrap();
        assert_eq!(shard.tick(60).unwrap().liquidity_gross, 10);
        // Only the first copy produced a reply
        assert_eq!(network.outbound().len(), 1);
    }

    #[test]
    fn test_run_until_idle_respects_bound() {
        let mut network = Network::new();
        deployed(&mut network, POOL, shard_deploy(0), update_ticks(1));
        deployed(&mut network, POOL, shard_deploy(1), update_ticks(2));

        assert_eq!(network.run_until_idle(1), 1);
        assert_eq!(network.pending_count(), 2);
        network.advance_time(30);
        assert_eq!(network.now(), 30);
    }
}
