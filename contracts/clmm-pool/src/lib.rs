//! Concentrated-liquidity pool whose ticks are spread across shard actors.
//!
//! [`Pool`] runs every operation in one process against a
//! [`PagedTickStore`]. [`PoolActor`] runs the same operations as message
//! exchanges with [`ShardActor`]s and [`StagingActor`]s inside a [`Network`].

pub mod config;
pub mod error;
pub mod host;
pub mod invariants;
pub mod liquidity;
pub mod message;
pub mod pool;
pub mod pool_actor;
pub mod position;
pub mod shard_actor;
pub mod staging;
pub mod storage;
pub mod swap;
pub mod tick;
pub mod tick_bitmap;

pub use config::{ConfigError, PoolSettings};
pub use error::{PoolError, Result};
pub use host::{Context, Delivery, Envelope, Handler, Network};
pub use message::{ForwardPayload, Leg, Message, TransferReason};
pub use pool::Pool;
pub use pool_actor::PoolActor;
pub use shard_actor::ShardActor;
pub use staging::{MintSaga, StagingActor};
pub use storage::{PagedTickStore, ShardLayout, TickAccess, TickShard, TickStore};
pub use swap::{SwapProgress, SwapSession};

#[cfg(test)]
pub(crate) fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
