use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use tracing::debug;

use super::backend::SecretBackend;
use super::handle;
use super::model::StoredSecret;

const SHARDS: usize = 64;

type Shard = Mutex<HashMap<String, StoredSecret>>;

/// In-process backend. Nothing survives a restart.
///
/// Handles are spread over independently locked shards, so operations on
/// unrelated secrets rarely wait on each other.
pub struct MemoryBackend {
    shards: Box<[Shard]>,
    sequence: AtomicU64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::default()).collect(),
            sequence: AtomicU64::new(0),
        }
    }
}

impl MemoryBackend {
    fn shard(&self, handle: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        handle.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }
}

fn lock(shard: &Shard) -> Result<MutexGuard<'_, HashMap<String, StoredSecret>>> {
    shard
        .lock()
        .map_err(|_| anyhow!("memory shard lock poisoned"))
}

impl SecretBackend for MemoryBackend {
    fn insert(&self, record: &StoredSecret) -> Result<String> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = handle::mint(seq);
        let mut map = lock(self.shard(&handle))?;
        if map.insert(handle.clone(), record.clone()).is_some() {
            anyhow::bail!("handle collision at sequence {seq}");
        }
        Ok(handle)
    }

    fn consume(&self, handle: &str, now: i64) -> Result<Option<StoredSecret>> {
        let mut map = lock(self.shard(handle))?;

        let Some(record) = map.get_mut(handle) else {
            return Ok(None);
        };
        if !record.is_live(now) {
            map.remove(handle);
            debug!(handle = %handle, "lazy-evicted dead secret");
            return Ok(None);
        }

        record.take_view();
        let snapshot = record.clone();
        if snapshot.remaining_views == 0 {
            map.remove(handle);
            debug!(handle = %handle, "burned after final view");
        }
        Ok(Some(snapshot))
    }

    fn purge(&self, now: i64) -> Result<usize> {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut map = lock(shard)?;
            let before = map.len();
            map.retain(|_, record| record.is_live(now));
            removed += before - map.len();
        }
        Ok(removed)
    }
}
