use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use redb::backends::InMemoryBackend;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info, warn};

use super::backend::SecretBackend;
use super::handle;
use super::model::StoredSecret;

const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");
const HANDLE_SEQ_KEY: &str = "handle_seq";

/// Leading byte of every encoded record. Anything else is treated as corruption.
const RECORD_MARKER: u8 = 0x01;

/// Durable backend on a single redb file.
///
/// Every mutation runs in a redb write transaction, which is serializable and
/// commits atomically: a crash or error mid-transaction leaves the previous
/// state intact.
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).context("open redb database")?;
        Self::init(db)
    }

    /// A non-durable database held entirely in memory.
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .context("create in-memory redb database")?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self> {
        // Ensure all tables exist.
        let write_txn = db.begin_write()?;
        write_txn.open_table(SECRETS)?;
        write_txn.open_table(COUNTERS)?;
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Presence check from a read snapshot, so lookups for unknown handles
    /// never wait on the single-writer lock.
    fn contains(&self, handle: &str) -> Result<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SECRETS)?;
        let present = table.get(handle)?.is_some();
        Ok(present)
    }
}

impl SecretBackend for RedbBackend {
    fn insert(&self, record: &StoredSecret) -> Result<String> {
        let bytes = encode(record)?;
        let write_txn = self.db.begin_write()?;
        let handle = {
            let mut counters = write_txn.open_table(COUNTERS)?;
            let seq = counters.get(HANDLE_SEQ_KEY)?.map(|g| g.value()).unwrap_or(0) + 1;
            counters.insert(HANDLE_SEQ_KEY, seq)?;

            let handle = handle::mint(seq);
            let mut table = write_txn.open_table(SECRETS)?;
            if table.insert(handle.as_str(), bytes.as_slice())?.is_some() {
                anyhow::bail!("handle collision at sequence {seq}");
            }
            handle
        };
        write_txn.commit()?;
        Ok(handle)
    }

    fn consume(&self, handle: &str, now: i64) -> Result<Option<StoredSecret>> {
        if !self.contains(handle)? {
            return Ok(None);
        }

        // Dead rows are evicted here rather than skipped, so a clock that steps
        // backwards cannot make them servable again.
        let write_txn = self.db.begin_write()?;
        let consumed = {
            let mut table = write_txn.open_table(SECRETS)?;

            // Copy the bytes out so the AccessGuard (which borrows `table`) is
            // dropped before any mutation.
            let raw_bytes: Option<Vec<u8>> =
                table.get(handle)?.map(|guard| guard.value().to_vec());

            match raw_bytes {
                None => None,
                Some(bytes) => {
                    let mut record = decode(&bytes)?;
                    if !record.is_live(now) {
                        table.remove(handle)?;
                        debug!(handle = %handle, "lazy-evicted dead secret");
                        None
                    } else {
                        record.take_view();
                        if record.remaining_views == 0 {
                            table.remove(handle)?;
                            debug!(handle = %handle, "burned after final view");
                        } else {
                            let updated = encode(&record)?;
                            table.insert(handle, updated.as_slice())?;
                        }
                        Some(record)
                    }
                }
            }
        };
        write_txn.commit()?;
        Ok(consumed)
    }

    fn purge(&self, now: i64) -> Result<usize> {
        // Dead records never come back to life and handles are never reused,
        // so keys found dead here are still safe to drop in the later write.
        let dead: Vec<String> = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(SECRETS)?;
            let mut keys = Vec::new();
            for item in table.iter()? {
                let (k, v) = item?;
                match decode(v.value()) {
                    Ok(record) if !record.is_live(now) => keys.push(k.value().to_owned()),
                    Ok(_) => {}
                    // Unreadable rows stay put; the rest of the table is still swept.
                    Err(e) => warn!(key = %k.value(), error = %e, "skipping undecodable secret"),
                }
            }
            keys
        };

        if dead.is_empty() {
            return Ok(0);
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SECRETS)?;
            for key in &dead {
                table.remove(key.as_str())?;
            }
        }
        write_txn.commit()?;

        info!(removed = dead.len(), "purged dead secrets");
        Ok(dead.len())
    }
}

/// Encode a record as `[RECORD_MARKER] + bincode(record)`.
fn encode(record: &StoredSecret) -> Result<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(record, bincode::config::standard())
        .context("bincode encode")?;
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(RECORD_MARKER);
    out.extend_from_slice(&payload);
    Ok(out)
}

fn decode(bytes: &[u8]) -> Result<StoredSecret> {
    match bytes.split_first() {
        Some((&RECORD_MARKER, payload)) => {
            let (record, _) =
                bincode::serde::decode_from_slice(payload, bincode::config::standard())
                    .context("bincode decode")?;
            Ok(record)
        }
        Some((marker, _)) => anyhow::bail!("unknown record marker {marker:#04x}"),
        None => anyhow::bail!("empty record"),
    }
}
