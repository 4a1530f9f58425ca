use parking_lot::{Mutex, MutexGuard};

/// Sharded lock set keyed by triple id.
///
/// Serializes the add/delete/undelete sequence for one triple id across
/// connections without a monitor on the shared instance itself. Two ids
/// may map to the same shard; that only costs contention, not
/// correctness.
pub(crate) struct LockTable {
    shards: Vec<Mutex<()>>,
}

impl LockTable {
    pub fn new(shards: usize) -> LockTable {
        let count = shards.max(1);
        let mut set = Vec::with_capacity(count);
        for _ in 0..count {
            set.push(Mutex::new(()));
        }
        LockTable { shards: set }
    }

    /// Holds the shard lock for the id while the guard lives.
    pub fn lock(&self, id: i64) -> MutexGuard<'_, ()> {
        self.shards[self.shard_index(id)].lock()
    }

    fn shard_index(&self, id: i64) -> usize {
        (id as u64 as usize) % self.shards.len()
    }
}
