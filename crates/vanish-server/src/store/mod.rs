//! The expiring, self-destructing secret table.
//!
//! A [`Store`] hands out a secret at most `view_budget` times and never at or
//! after its deadline. Records that can no longer be served look exactly like
//! records that never existed.

pub mod backend;
pub mod clock;
pub mod db;
pub mod error;
pub mod handle;
pub mod memory;
pub mod model;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

pub use backend::SecretBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use db::RedbBackend;
pub use error::StoreError;
pub use memory::MemoryBackend;
pub use model::{Expiry, Secret, StoredSecret};

/// Thread-safe handle to the secret table. Clones share the same backend.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn SecretBackend>,
    clock: Arc<dyn Clock>,
}

impl Store {
    pub fn new(backend: impl SecretBackend + 'static) -> Self {
        Self::with_clock(backend, SystemClock)
    }

    pub fn with_clock(backend: impl SecretBackend + 'static, clock: impl Clock) -> Self {
        Self {
            backend: Arc::new(backend),
            clock: Arc::new(clock),
        }
    }

    /// Open (or create) a durable store at `path`.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let backend = RedbBackend::open(path)
            .with_context(|| format!("open secret database: {}", path.display()))?;
        Ok(Self::new(backend))
    }

    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::default())
    }

    /// Store `text` under a fresh handle, readable `view_budget` times and,
    /// when `ttl_minutes > 0`, only until `ttl_minutes` from now.
    pub fn create(
        &self,
        text: &str,
        view_budget: u32,
        ttl_minutes: u32,
    ) -> Result<Secret, StoreError> {
        if text.is_empty() {
            return Err(StoreError::InvalidArgument("secret text must not be empty"));
        }
        if view_budget == 0 {
            return Err(StoreError::InvalidArgument("view budget must be at least 1"));
        }

        let now = self.clock.now();
        let record = StoredSecret {
            text: text.to_owned(),
            created_at: now,
            expiry: Expiry::after_minutes(now, ttl_minutes),
            remaining_views: view_budget,
        };
        let handle = self.backend.insert(&record).map_err(StoreError::Storage)?;

        debug!(handle = %handle, view_budget, ttl_minutes, "stored secret");
        Ok(record.to_secret(handle))
    }

    /// Spend one view of the secret at `handle`.
    ///
    /// The returned secret carries the view count left after this read; zero
    /// means this was the last one.
    pub fn consume_one(&self, handle: &str) -> Result<Secret, StoreError> {
        let now = self.clock.now();
        match self.backend.consume(handle, now) {
            Ok(Some(record)) => Ok(record.to_secret(handle.to_owned())),
            Ok(None) => Err(StoreError::NotFound),
            Err(e) => Err(StoreError::Storage(e)),
        }
    }

    /// Remove every record that can no longer be served. Returns how many went.
    pub fn purge(&self) -> Result<usize, StoreError> {
        self.backend
            .purge(self.clock.now())
            .map_err(StoreError::Storage)
    }

    /// Spawn a background Tokio task that calls `purge()` every `interval`.
    pub fn spawn_sweep(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await; // skip first immediate tick
            loop {
                ticker.tick().await;
                match self.purge() {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "background sweep"),
                    Err(e) => warn!(error = %e, "background sweep error"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Barrier;
    use std::thread;

    use super::*;

    const START: i64 = 1_700_000_000;

    /// One store per backend, sharing `clock`.
    fn stores(clock: &ManualClock) -> Vec<(&'static str, Store)> {
        vec![
            (
                "redb",
                Store::with_clock(RedbBackend::in_memory().unwrap(), clock.clone()),
            ),
            (
                "memory",
                Store::with_clock(MemoryBackend::default(), clock.clone()),
            ),
        ]
    }

    #[test]
    fn single_view_secret_is_served_once() {
        let clock = ManualClock::new(START);
        for (name, s) in stores(&clock) {
            let created = s.create("hello", 1, 0).unwrap();
            assert_eq!(created.remaining_views, 1, "{name}");
            assert_eq!(created.expiry, Expiry::Never, "{name}");
            assert_eq!(created.created_at, START, "{name}");

            let read = s.consume_one(&created.handle).unwrap();
            assert_eq!(read.text, "hello", "{name}");
            assert_eq!(read.remaining_views, 0, "{name}");
            assert_eq!(read.handle, created.handle, "{name}");

            assert!(
                matches!(s.consume_one(&created.handle), Err(StoreError::NotFound)),
                "{name}"
            );
        }
    }

    #[test]
    fn ttl_beats_remaining_views() {
        let clock = ManualClock::new(START);
        for (name, s) in stores(&clock) {
            clock.set(START);
            let created = s.create("x", 5, 1).unwrap();
            assert_eq!(created.expiry, Expiry::At(START + 60), "{name}");

            clock.advance(Duration::from_secs(61));
            assert!(
                matches!(s.consume_one(&created.handle), Err(StoreError::NotFound)),
                "{name}"
            );
        }
    }

    #[test]
    fn deadline_instant_is_already_dead() {
        let clock = ManualClock::new(START);
        for (name, s) in stores(&clock) {
            clock.set(START);
            let created = s.create("edge", 10, 3).unwrap();

            clock.set(START + 3 * 60 - 1);
            assert!(s.consume_one(&created.handle).is_ok(), "{name}");

            clock.set(START + 3 * 60);
            assert!(
                matches!(s.consume_one(&created.handle), Err(StoreError::NotFound)),
                "{name}"
            );

            // Winding the clock back does not resurrect it either.
            clock.set(START);
            assert!(
                matches!(s.consume_one(&created.handle), Err(StoreError::NotFound)),
                "{name}"
            );
        }
    }

    #[test]
    fn empty_text_is_rejected() {
        let clock = ManualClock::new(START);
        for (name, s) in stores(&clock) {
            assert!(
                matches!(s.create("", 1, 0), Err(StoreError::InvalidArgument(_))),
                "{name}"
            );
        }
    }

    #[test]
    fn zero_view_budget_is_rejected_without_consuming_a_handle() {
        let clock = ManualClock::new(START);
        for (name, s) in stores(&clock) {
            assert!(
                matches!(s.create("text", 0, 0), Err(StoreError::InvalidArgument(_))),
                "{name}"
            );
            // The first handle actually minted still carries sequence 1.
            let created = s.create("text", 1, 0).unwrap();
            assert!(created.handle.ends_with("0000000000000001"), "{name}");
        }
    }

    #[test]
    fn view_budget_is_exact() {
        let clock = ManualClock::new(START);
        for (name, s) in stores(&clock) {
            for budget in 1..=7u32 {
                let created = s.create("budget", budget, 0).unwrap();
                for left in (0..budget).rev() {
                    let read = s.consume_one(&created.handle).unwrap();
                    assert_eq!(read.remaining_views, left, "{name} budget={budget}");
                }
                assert!(
                    matches!(s.consume_one(&created.handle), Err(StoreError::NotFound)),
                    "{name} budget={budget}"
                );
            }
        }
    }

    #[test]
    fn dead_handles_are_indistinguishable() {
        let clock = ManualClock::new(START);
        for (name, s) in stores(&clock) {
            clock.set(START);
            let exhausted = s.create("a", 1, 0).unwrap();
            s.consume_one(&exhausted.handle).unwrap();
            let expired = s.create("b", 3, 1).unwrap();
            clock.advance(Duration::from_secs(120));

            let never = "0".repeat(handle::HANDLE_LEN);
            let outcomes = [
                s.consume_one(&never),
                s.consume_one(&expired.handle),
                s.consume_one(&exhausted.handle),
                s.consume_one(""),
            ];
            for outcome in outcomes {
                match outcome {
                    Err(e @ StoreError::NotFound) => {
                        assert_eq!(e.to_string(), "secret not found", "{name}")
                    }
                    other => panic!("{name}: expected NotFound, got {other:?}"),
                }
            }
        }
    }

    #[test]
    fn concurrent_last_view_is_served_once() {
        let clock = ManualClock::new(START);
        for (name, s) in stores(&clock) {
            for _ in 0..1000 {
                let created = s.create("race", 1, 0).unwrap();
                let handle = created.handle.as_str();
                let barrier = &Barrier::new(2);
                let store = &s;

                let outcomes: Vec<Result<Secret, StoreError>> = thread::scope(|scope| {
                    let workers: Vec<_> = (0..2)
                        .map(|_| {
                            scope.spawn(move || {
                                barrier.wait();
                                store.consume_one(handle)
                            })
                        })
                        .collect();
                    workers.into_iter().map(|w| w.join().unwrap()).collect()
                });

                let served: Vec<&Secret> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
                assert_eq!(served.len(), 1, "{name}");
                assert_eq!(served[0].remaining_views, 0, "{name}");
                assert!(
                    outcomes
                        .iter()
                        .any(|o| matches!(o, Err(StoreError::NotFound))),
                    "{name}"
                );
            }
        }
    }

    #[test]
    fn concurrent_reads_spend_exactly_the_budget() {
        let clock = ManualClock::new(START);
        for (name, s) in stores(&clock) {
            let created = s.create("shared", 50, 0).unwrap();
            let handle = created.handle.as_str();
            let store = &s;
            let served: usize = thread::scope(|scope| {
                let workers: Vec<_> = (0..8)
                    .map(|_| {
                        scope.spawn(move || {
                            (0..20)
                                .filter(|_| store.consume_one(handle).is_ok())
                                .count()
                        })
                    })
                    .collect();
                workers.into_iter().map(|w| w.join().unwrap()).sum()
            });
            assert_eq!(served, 50, "{name}");
        }
    }

    #[test]
    fn sequential_handles_are_unique() {
        let clock = ManualClock::new(START);
        for (name, s) in stores(&clock) {
            let handles: HashSet<String> = (0..10_000)
                .map(|_| s.create("u", 1, 0).unwrap().handle.clone())
                .collect();
            assert_eq!(handles.len(), 10_000, "{name}");
        }
    }

    #[test]
    fn concurrent_handles_are_unique() {
        let clock = ManualClock::new(START);
        for (name, s) in stores(&clock) {
            let store = &s;
            let handles: HashSet<String> = thread::scope(|scope| {
                let workers: Vec<_> = (0..10)
                    .map(|_| {
                        scope.spawn(move || {
                            (0..1_000)
                                .map(|_| store.create("u", 1, 0).unwrap().handle.clone())
                                .collect::<Vec<_>>()
                        })
                    })
                    .collect();
                workers
                    .into_iter()
                    .flat_map(|w| w.join().unwrap())
                    .collect()
            });
            assert_eq!(handles.len(), 10_000, "{name}");
        }
    }

    #[test]
    fn purge_is_observationally_a_no_op() {
        let clock = ManualClock::new(START);
        for (name, s) in stores(&clock) {
            clock.set(START);
            let short = s.create("short", 2, 1).unwrap();
            let long = s.create("long", 2, 10).unwrap();
            let open = s.create("open", 2, 0).unwrap();

            clock.advance(Duration::from_secs(5 * 60));
            assert_eq!(s.purge().unwrap(), 1, "{name}");

            assert!(
                matches!(s.consume_one(&short.handle), Err(StoreError::NotFound)),
                "{name}"
            );
            assert_eq!(s.consume_one(&long.handle).unwrap().remaining_views, 1, "{name}");
            assert_eq!(s.consume_one(&open.handle).unwrap().remaining_views, 1, "{name}");
        }
    }

    #[test]
    fn durable_store_reopens_with_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vanish.db");

        let handle = {
            let s = Store::open(&path).unwrap();
            let created = s.create("persisted", 2, 0).unwrap();
            s.consume_one(&created.handle).unwrap();
            created.handle.clone()
        };

        let s = Store::open(&path).unwrap();
        let read = s.consume_one(&handle).unwrap();
        assert_eq!(read.text, "persisted");
        assert_eq!(read.remaining_views, 0);
        assert!(matches!(s.consume_one(&handle), Err(StoreError::NotFound)));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_purges_in_background() {
        let clock = ManualClock::new(START);
        let s = Store::with_clock(MemoryBackend::default(), clock.clone());
        let created = s.create("swept", 1, 1).unwrap();
        clock.advance(Duration::from_secs(3600));

        let sweep = s.clone().spawn_sweep(Duration::from_secs(10));
        time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;

        assert_eq!(s.purge().unwrap(), 0);
        assert!(matches!(s.consume_one(&created.handle), Err(StoreError::NotFound)));
        sweep.abort();
    }
}
