//! Thread-safe LRU with expirable entries
//!
//! Entries live in an arena-backed doubly linked list (newest at the head)
//! indexed by a key map. Every entry is also filed into one of
//! [`NUM_BUCKETS`] expiration buckets; a sweeper task on the tokio runtime
//! walks the buckets round-robin, waits for the newest entry of the current
//! bucket to expire and then drops the whole bucket.
//!
//! Without a runtime at construction there is no sweeper and expired
//! entries are only skipped by lookups.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Number of expiration buckets swept round-robin
pub const NUM_BUCKETS: usize = 100;

/// TTL used when none is given; entries effectively never expire
pub const NO_EVICTION_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 10);

// tokio timers resolve to milliseconds
const MIN_TICK: Duration = Duration::from_millis(1);

/// Called for every entry leaving the cache, after the cache lock is released
pub type EvictCallback<K, V> = Arc<dyn Fn(&K, &V) + Send + Sync>;

struct Node<K, V> {
    key: K,
    value: V,
    expires_at: Instant,
    bucket: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Bucket<K> {
    entries: HashSet<K>,
    newest: Option<Instant>,
}

struct State<K, V> {
    size: usize,
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    items: HashMap<K, usize>,
    buckets: Vec<Bucket<K>>,
    next_cleanup: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> State<K, V> {
    fn new(size: usize) -> Self {
        Self {
            size,
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            items: HashMap::new(),
            buckets: (0..NUM_BUCKETS)
                .map(|_| Bucket {
                    entries: HashSet::new(),
                    newest: None,
                })
                .collect(),
            next_cleanup: 0,
        }
    }

    fn node(&self, idx: usize) -> Option<&Node<K, V>> {
        self.nodes.get(idx)?.as_ref()
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<K, V>> {
        self.nodes.get_mut(idx)?.as_mut()
    }

    fn unlink(&mut self, idx: usize) {
        let Some((prev, next)) = self.node(idx).map(|n| (n.prev, n.next)) else {
            return;
        };
        match prev {
            Some(p) => {
                if let Some(node) = self.node_mut(p) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.node_mut(n) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(node) = self.node_mut(idx) {
            node.prev = None;
            node.next = None;
        }
    }

    fn link_front(&mut self, idx: usize) {
        let old_head = self.head;
        let Some(node) = self.node_mut(idx) else {
            return;
        };
        node.prev = None;
        node.next = old_head;
        if let Some(head) = old_head {
            if let Some(node) = self.node_mut(head) {
                node.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head != Some(idx) {
            self.unlink(idx);
            self.link_front(idx);
        }
    }

    fn add_to_bucket(&mut self, idx: usize) {
        let bucket_id = (NUM_BUCKETS + self.next_cleanup - 1) % NUM_BUCKETS;
        let Some(node) = self.node_mut(idx) else {
            return;
        };
        node.bucket = bucket_id;
        let (key, expires_at) = (node.key.clone(), node.expires_at);
        let bucket = &mut self.buckets[bucket_id];
        bucket.entries.insert(key);
        if bucket.newest.is_none_or(|newest| newest < expires_at) {
            bucket.newest = Some(expires_at);
        }
    }

    fn remove_from_bucket(&mut self, idx: usize) {
        let Some((bucket, key)) = self.node(idx).map(|n| (n.bucket, n.key.clone())) else {
            return;
        };
        self.buckets[bucket].entries.remove(&key);
    }

    /// Detach an entry from every index and hand it back for the evict callback
    fn remove_element(&mut self, idx: usize) -> Option<(K, V)> {
        self.unlink(idx);
        self.remove_from_bucket(idx);
        let node = self.nodes.get_mut(idx)?.take()?;
        self.free.push(idx);
        self.items.remove(&node.key);
        Some((node.key, node.value))
    }

    fn remove_oldest(&mut self) -> Option<(K, V)> {
        let idx = self.tail?;
        self.remove_element(idx)
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    /// Unexpired entries, oldest to newest
    fn live_entries(&self) -> impl Iterator<Item = &Node<K, V>> {
        let now = Instant::now();
        let mut cursor = self.tail;
        std::iter::from_fn(move || {
            let node = self.node(cursor?)?;
            cursor = node.prev;
            Some(node)
        })
        .filter(move |node| now <= node.expires_at)
    }
}

struct Shared<K, V> {
    state: Mutex<State<K, V>>,
    on_evict: Option<EvictCallback<K, V>>,
    ttl: Duration,
}

impl<K, V> Shared<K, V> {
    fn lock(&self) -> MutexGuard<'_, State<K, V>> {
        // evict callbacks run outside the lock
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run the evict callback for each entry; a panicking callback is logged
    /// and the remaining entries are still reported.
    fn notify(&self, evicted: Vec<(K, V)>) {
        let Some(cb) = &self.on_evict else {
            return;
        };
        for (k, v) in &evicted {
            if panic::catch_unwind(AssertUnwindSafe(|| cb(k, v))).is_err() {
                tracing::error!("LRU evict callback panicked; entry dropped without cleanup");
            }
        }
    }
}

/// Aborts the sweep task when the last cache handle goes away
struct Sweeper {
    task: JoinHandle<()>,
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Bounded, TTL-scoped LRU cache. Cloning shares the same cache.
pub struct ExpirableLru<K, V> {
    shared: Arc<Shared<K, V>>,
    _sweeper: Option<Arc<Sweeper>>,
}

impl<K, V> Clone for ExpirableLru<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            _sweeper: self._sweeper.clone(),
        }
    }
}

impl<K, V> ExpirableLru<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create a cache holding at most `size` entries (0 means unlimited) that
    /// expire `ttl` after insertion (zero means never).
    ///
    /// The sweeper is spawned on the current tokio runtime.
    pub fn new(size: usize, on_evict: Option<EvictCallback<K, V>>, ttl: Duration) -> Self {
        let ttl = if ttl.is_zero() { NO_EVICTION_TTL } else { ttl };
        let shared = Arc::new(Shared {
            state: Mutex::new(State::new(size)),
            on_evict,
            ttl,
        });

        let sweeper = if ttl < NO_EVICTION_TTL {
            match Handle::try_current() {
                Ok(runtime) => {
                    let tick = (ttl / NUM_BUCKETS as u32).max(MIN_TICK);
                    let task = runtime.spawn(sweep_loop(Arc::downgrade(&shared), tick));
                    Some(Arc::new(Sweeper { task }))
                }
                Err(_) => {
                    tracing::warn!("no tokio runtime for the LRU sweeper, expired entries are only skipped on lookup");
                    None
                }
            }
        } else {
            None
        };

        Self {
            shared,
            _sweeper: sweeper,
        }
    }

    fn expiry(&self, now: Instant) -> Instant {
        now.checked_add(self.shared.ttl)
            .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365))
    }

    /// Insert or refresh an entry. Returns true when an older entry was evicted
    /// to make room; refreshing an existing key never evicts.
    pub fn add(&self, key: K, value: V) -> bool {
        let now = Instant::now();
        let expires_at = self.expiry(now);
        let evicted = {
            let mut state = self.shared.lock();

            if let Some(&idx) = state.items.get(&key) {
                state.move_to_front(idx);
                state.remove_from_bucket(idx);
                if let Some(node) = state.node_mut(idx) {
                    node.value = value;
                    node.expires_at = expires_at;
                }
                state.add_to_bucket(idx);
                return false;
            }

            let node = Node {
                key: key.clone(),
                value,
                expires_at,
                bucket: 0,
                prev: None,
                next: None,
            };
            let idx = match state.free.pop() {
                Some(slot) => {
                    state.nodes[slot] = Some(node);
                    slot
                }
                None => {
                    state.nodes.push(Some(node));
                    state.nodes.len() - 1
                }
            };
            state.link_front(idx);
            state.items.insert(key, idx);
            state.add_to_bucket(idx);

            if state.size > 0 && state.len() > state.size {
                state.remove_oldest()
            } else {
                None
            }
        };

        match evicted {
            Some(entry) => {
                self.shared.notify(vec![entry]);
                true
            }
            None => false,
        }
    }

    /// Look up a key, promoting it to most recently used. Expired entries miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.shared.lock();
        let idx = *state.items.get(key)?;
        if Instant::now() > state.node(idx)?.expires_at {
            return None;
        }
        state.move_to_front(idx);
        state.node(idx).map(|n| n.value.clone())
    }

    /// Look up a key without touching its recency
    pub fn peek(&self, key: &K) -> Option<V> {
        let state = self.shared.lock();
        let node = state.node(*state.items.get(key)?)?;
        if Instant::now() > node.expires_at {
            return None;
        }
        Some(node.value.clone())
    }

    /// Whether the key is present, expired or not, without touching recency
    pub fn contains(&self, key: &K) -> bool {
        self.shared.lock().items.contains_key(key)
    }

    pub fn remove(&self, key: &K) -> bool {
        let removed = {
            let mut state = self.shared.lock();
            match state.items.get(key).copied() {
                Some(idx) => state.remove_element(idx),
                None => None,
            }
        };
        match removed {
            Some(entry) => {
                self.shared.notify(vec![entry]);
                true
            }
            None => false,
        }
    }

    pub fn remove_oldest(&self) -> Option<(K, V)> {
        let removed = self.shared.lock().remove_oldest();
        if let Some(entry) = &removed {
            self.shared.notify(vec![entry.clone()]);
        }
        removed
    }

    pub fn get_oldest(&self) -> Option<(K, V)> {
        let state = self.shared.lock();
        let node = state.node(state.tail?)?;
        Some((node.key.clone(), node.value.clone()))
    }

    /// Unexpired keys, oldest to newest
    pub fn keys(&self) -> Vec<K> {
        let state = self.shared.lock();
        state.live_entries().map(|n| n.key.clone()).collect()
    }

    /// Unexpired values, oldest to newest
    pub fn values(&self) -> Vec<V> {
        let state = self.shared.lock();
        state.live_entries().map(|n| n.value.clone()).collect()
    }

    /// Unexpired entries, oldest to newest
    pub fn key_values(&self) -> Vec<(K, V)> {
        let state = self.shared.lock();
        state
            .live_entries()
            .map(|n| (n.key.clone(), n.value.clone()))
            .collect()
    }

    /// Number of entries, including expired ones the sweeper has not reached yet
    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cap(&self) -> usize {
        self.shared.lock().size
    }

    /// Change the capacity, evicting the oldest entries that no longer fit.
    /// A size of 0 makes the cache unlimited. Returns the number evicted.
    pub fn resize(&self, size: usize) -> usize {
        let evicted = {
            let mut state = self.shared.lock();
            if size == 0 {
                state.size = 0;
                return 0;
            }
            let diff = state.len().saturating_sub(size);
            let mut evicted = Vec::with_capacity(diff);
            for _ in 0..diff {
                if let Some(entry) = state.remove_oldest() {
                    evicted.push(entry);
                }
            }
            state.size = size;
            evicted
        };
        let count = evicted.len();
        self.shared.notify(evicted);
        count
    }

    /// Drop every entry, invoking the evict callback for each
    pub fn purge(&self) {
        let evicted = {
            let mut state = self.shared.lock();
            let mut evicted = Vec::with_capacity(state.len());
            while let Some(entry) = state.remove_oldest() {
                evicted.push(entry);
            }
            for bucket in &mut state.buckets {
                bucket.entries.clear();
            }
            state.nodes.clear();
            state.free.clear();
            evicted
        };
        self.shared.notify(evicted);
    }
}

async fn sweep_loop<K, V>(weak: Weak<Shared<K, V>>, tick: Duration)
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if !delete_expired(&weak).await {
            return;
        }
    }
}

/// Sweep the bucket under the cursor once its newest entry has expired.
/// Returns false when the cache is gone.
async fn delete_expired<K, V>(weak: &Weak<Shared<K, V>>) -> bool
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    let wait = {
        let Some(shared) = weak.upgrade() else {
            return false;
        };
        let state = shared.lock();
        state.buckets[state.next_cleanup]
            .newest
            .map(|newest| newest.saturating_duration_since(Instant::now()))
            .unwrap_or_default()
    };

    // wait without holding the lock or a strong reference
    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }

    let Some(shared) = weak.upgrade() else {
        return false;
    };
    let evicted = {
        let mut state = shared.lock();
        let cursor = state.next_cleanup;
        let keys: Vec<K> = state.buckets[cursor].entries.iter().cloned().collect();
        let mut evicted = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(idx) = state.items.get(&key).copied() {
                evicted.extend(state.remove_element(idx));
            }
        }
        state.buckets[cursor].newest = None;
        state.next_cleanup = (cursor + 1) % NUM_BUCKETS;
        evicted
    };
    shared.notify(evicted);
    true
}
