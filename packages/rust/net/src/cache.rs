//! Fingerprint-addressed read-through cache.
//!
//! Keys are `sha256(namespace || canonical_params)`. Namespaces separate the
//! search list, document bodies, and the company directory, each with its own
//! TTL. Entries are evicted LRU against a byte budget. Concurrent misses for
//! one fingerprint coalesce behind a per-key gate so at most one origin fetch
//! is in flight; fetch errors are never cached.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as SyncMutex};
use std::time::{Duration, Instant};

use dartsearch_shared::Result;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

/// TTL for cached search lists.
pub const TTL_SEARCH: Duration = Duration::from_secs(24 * 3600);

/// TTL for cached document bodies.
pub const TTL_BODY: Duration = Duration::from_secs(24 * 3600);

/// TTL for the company directory.
pub const TTL_DIRECTORY: Duration = Duration::from_secs(7 * 24 * 3600);

/// Compute the cache fingerprint for a namespaced request.
pub fn fingerprint(namespace: &str, canonical_params: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(canonical_params.as_bytes());
    format!("{:x}", hasher.finalize())
}

struct Entry {
    value: Arc<String>,
    stored_at: Instant,
    ttl: Duration,
    seq: u64,
}

struct Store {
    entries: HashMap<String, Entry>,
    /// Lazily-deleted LRU order: `(seq, key)` pairs, oldest first. Entries
    /// whose seq no longer matches are stale and skipped.
    lru: VecDeque<(u64, String)>,
    total_bytes: usize,
    next_seq: u64,
}

/// Byte-bounded, TTL-aware, miss-coalescing cache.
pub struct ContentCache {
    max_bytes: usize,
    store: SyncMutex<Store>,
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ContentCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            store: SyncMutex::new(Store {
                entries: HashMap::new(),
                lru: VecDeque::new(),
                total_bytes: 0,
                next_seq: 0,
            }),
            gates: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fresh value for `key`, or `None`. Counts toward hit/miss statistics
    /// and refreshes the entry's LRU position.
    pub fn get(&self, key: &str) -> Option<Arc<String>> {
        let mut store = self.store.lock().expect("cache lock poisoned");
        let seq = store.next_seq;
        match store.entries.get_mut(key) {
            Some(entry) if entry.stored_at.elapsed() < entry.ttl => {
                entry.seq = seq;
                let value = entry.value.clone();
                store.next_seq += 1;
                store.lru.push_back((seq, key.to_string()));
                drop(store);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            _ => {
                drop(store);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert `value` under `key`, evicting LRU entries past the byte budget.
    pub fn put(&self, key: &str, value: Arc<String>, ttl: Duration) {
        let size = value.len();
        let mut store = self.store.lock().expect("cache lock poisoned");

        if let Some(old) = store.entries.remove(key) {
            store.total_bytes -= old.value.len();
        }

        let seq = store.next_seq;
        store.next_seq += 1;
        store.lru.push_back((seq, key.to_string()));
        store.entries.insert(
            key.to_string(),
            Entry {
                value,
                stored_at: Instant::now(),
                ttl,
                seq,
            },
        );
        store.total_bytes += size;

        while store.total_bytes > self.max_bytes {
            let Some((seq, key)) = store.lru.pop_front() else {
                break;
            };
            let current = store.entries.get(&key).map(|e| e.seq);
            if current == Some(seq) {
                let removed = store.entries.remove(&key).expect("entry exists");
                store.total_bytes -= removed.value.len();
                debug!(%key, "evicted cache entry");
            }
        }
    }

    /// Read-through lookup: return the cached value or run `fetch` to
    /// produce it, coalescing concurrent misses for the same key.
    ///
    /// A failed fetch is not cached; waiters coalesced behind it re-check
    /// the store and fetch for themselves.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<Arc<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }

        let gate = {
            let mut gates = self.gates.lock().await;
            gates
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        // First caller through holds the gate for the duration of the origin
        // fetch; coalesced waiters block here, then see the stored value.
        let _guard = gate.lock().await;

        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }

        let result = fetch().await;
        {
            let mut gates = self.gates.lock().await;
            gates.remove(key);
        }

        let value = Arc::new(result?);
        self.put(key, value.clone(), ttl);
        Ok(value)
    }

    /// Hit/miss counters since process start. Callers compute per-run rates
    /// from deltas.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
