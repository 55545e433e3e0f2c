use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lazily created per-guild async locks. Holding a guild's guard serializes
/// count-then-insert allocation (and config writes) for that guild without
/// blocking unrelated guilds.
#[derive(Clone, Default)]
pub struct GuildLocks {
    inner: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl GuildLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, guild_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(guild_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Display-slot allocation. Numbering is dense and reuses slots as tickets
/// close: the allocated slot is the lowest positive integer not held by any
/// non-closed ticket in the guild, so the first ticket is always #1 and
/// closing #1 frees it for the next submission.
#[derive(Clone, Default)]
pub struct SlotAllocator {
    locks: GuildLocks,
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the guild's allocation guard. The caller must hold it across
    /// the whole read-compute-insert sequence: two concurrent submissions in
    /// the same guild must never observe the same set of open slots.
    pub async fn guard(&self, guild_id: i64) -> OwnedMutexGuard<()> {
        self.locks.acquire(guild_id).await
    }

    /// Lowest positive slot absent from `taken`.
    pub fn next_slot(taken: &[i64]) -> i64 {
        let used: HashSet<i64> = taken.iter().copied().collect();
        let mut slot = 1;
        while used.contains(&slot) {
            slot += 1;
        }
        slot
    }
}
