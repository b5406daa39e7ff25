use alloy_primitives::{keccak256, Address};
use serde::{Deserialize, Serialize};

/// What a child actor is, relative to the pool that spawns it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildSeed {
    /// Partition of the tick store
    TickShard { index: i32 },
    /// Buffer for one owner's two-leg deposit into one range
    LpStaging {
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
    },
}

impl ChildSeed {
    fn tag(&self) -> u8 {
        match self {
            ChildSeed::TickShard { .. } => 0x01,
            ChildSeed::LpStaging { .. } => 0x02,
        }
    }

    fn packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(27);
        out.push(self.tag());
        match self {
            ChildSeed::TickShard { index } => out.extend_from_slice(&index.to_be_bytes()),
            ChildSeed::LpStaging {
                owner,
                tick_lower,
                tick_upper,
            } => {
                out.extend_from_slice(owner.as_slice());
                out.extend_from_slice(&tick_lower.to_be_bytes()[1..]);
                out.extend_from_slice(&tick_upper.to_be_bytes()[1..]);
            }
        }
        out
    }
}

/// Deterministic child address: the low 20 bytes of keccak256(parent ‖ tag ‖ fields)
pub fn child_address(parent: &Address, seed: &ChildSeed) -> Address {
    let mut preimage = parent.to_vec();
    preimage.extend_from_slice(&seed.packed());
    let hash = keccak256(&preimage);
    Address::from_slice(&hash[12..])
}

/// Address of the tick shard with the given index
pub fn shard_address(pool: &Address, index: i32) -> Address {
    child_address(pool, &ChildSeed::TickShard { index })
}

/// Address of the staging record for an owner's deposit into a range
pub fn staging_address(pool: &Address, owner: &Address, tick_lower: i32, tick_upper: i32) -> Address {
    child_address(
        pool,
        &ChildSeed::LpStaging {
            owner: *owner,
            tick_lower,
            tick_upper,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_address_is_pure() {
        let pool = Address::repeat_byte(7);
        assert_eq!(shard_address(&pool, -3), shard_address(&pool, -3));
        assert_ne!(shard_address(&pool, -3), shard_address(&pool, 3));
        assert_ne!(
            shard_address(&pool, 0),
            shard_address(&Address::repeat_byte(8), 0)
        );
    }

    #[test]
    fn test_staging_address_depends_on_owner_and_range() {
        let pool = Address::repeat_byte(7);
        let alice = Address::repeat_byte(1);
        let bob = Address::repeat_byte(2);
        let a = staging_address(&pool, &alice, -60, 60);
        assert_eq!(a, staging_address(&pool, &alice, -60, 60));
        assert_ne!(a, staging_address(&pool, &bob, -60, 60));
        assert_ne!(a, staging_address(&pool, &alice, -120, 60));
    }

    #[test]
    fn test_kinds_do_not_collide() {
        let pool = Address::ZERO;
        let seed = ChildSeed::TickShard { index: 0 };
        let expected = {
            let mut preimage = pool.to_vec();
            preimage.extend_from_slice(&[0x01, 0, 0, 0, 0]);
            Address::from_slice(&keccak256(&preimage)[12..])
        };
        assert_eq!(child_address(&pool, &seed), expected);
        assert_ne!(
            child_address(&pool, &seed),
            staging_address(&pool, &Address::ZERO, 0, 0)
        );
    }
}
