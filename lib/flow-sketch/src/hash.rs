use std::hash::BuildHasher as _;

use foldhash::quality::FixedState;

/// A seeded hash function over flow keys.
///
/// Digests are uniformly distributed over `u32`, and two `HashFn`s with different seeds behave as independent hash
/// functions. Currently, [`foldhash`][foldhash] is used as the underlying implementation.
///
/// [foldhash]: http://github.com/orlp/foldhash
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HashFn {
    seed: u64,
}

impl HashFn {
    /// Creates a new `HashFn` with the given seed.
    pub const fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Returns the seed of this hash function.
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Hashes `key` into a 32-bit digest.
    #[inline]
    pub fn digest(&self, key: u32) -> u32 {
        let hash = FixedState::with_seed(self.seed).hash_one(key);
        (hash ^ (hash >> 32)) as u32
    }

    /// Hashes `key` into an index in `0..len`.
    ///
    /// `len` must be nonzero.
    #[inline]
    pub fn index(&self, key: u32, len: usize) -> usize {
        (u64::from(self.digest(key)) % len as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_per_seed() {
        let a = HashFn::new(17);
        let b = HashFn::new(17);
        for key in 0..1000 {
            assert_eq!(a.digest(key), b.digest(key));
        }
    }

    #[test]
    fn seeds_are_independent() {
        let a = HashFn::new(1);
        let b = HashFn::new(2);
        let same = (0..1000).filter(|key| a.digest(*key) == b.digest(*key)).count();
        assert!(same < 5);
    }

    #[test]
    fn index_spreads_evenly() {
        let hash = HashFn::new(0xC0FFEE);
        let mut buckets = [0u32; 8];
        for key in 0..80_000 {
            buckets[hash.index(key, buckets.len())] += 1;
        }
        assert!(buckets.iter().all(|count| (9_000..11_000).contains(count)), "{:?}", buckets);
    }
}
