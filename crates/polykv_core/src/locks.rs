//! Sharded record-lock table.
//!
//! All single-record operations lock the shard covering their key before
//! reading and release it only after writing, which makes them atomic at
//! record granularity. Multi-key operations collect the distinct shards
//! of every involved key and acquire them in ascending shard order - one
//! deterministic total order across the whole engine, so concurrent
//! multi-key calls cannot deadlock against each other or against
//! single-key calls.

use parking_lot::{Mutex, MutexGuard};

/// Number of lock shards. Power of two so the modulo is a mask.
const NUM_SHARDS: usize = 64;

/// A striped lock table keyed by record key.
pub(crate) struct LockTable {
    shards: Vec<Mutex<()>>,
}

impl LockTable {
    pub(crate) fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    fn shard_of(&self, key: &[u8]) -> usize {
        (fnv1a64(key) as usize) & (NUM_SHARDS - 1)
    }

    /// Locks the shard covering one key.
    pub(crate) fn lock_key(&self, key: &[u8]) -> MutexGuard<'_, ()> {
        self.shards[self.shard_of(key)].lock()
    }

    /// Locks the shards covering all given keys, in ascending shard order.
    pub(crate) fn lock_keys<'a, I>(&self, keys: I) -> Vec<MutexGuard<'_, ()>>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut shards: Vec<usize> = keys.into_iter().map(|k| self.shard_of(k)).collect();
        shards.sort_unstable();
        shards.dedup();
        shards.into_iter().map(|i| self.shards[i].lock()).collect()
    }
}

impl std::fmt::Debug for LockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockTable")
            .field("shards", &self.shards.len())
            .finish()
    }
}

/// FNV-1a, 64-bit. Deterministic across runs, unlike the std hasher's
/// randomized keys, so it is also usable for on-disk bucket addressing.
pub(crate) fn fnv1a64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
