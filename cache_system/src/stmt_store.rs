//! Prepared-statement store
//!
//! Caches prepared statement handles by their rendered SQL. The first caller
//! for a key inserts a pending entry and prepares; concurrent callers for the
//! same key find the pending entry and wait for the preparation signal, so
//! the database sees a single prepare per key.

use crate::errors::CacheError;
use crate::lru::{EvictCallback, ExpirableLru};
use async_trait::async_trait;
use config::StmtCacheConfig;
use futures::FutureExt;
use std::fmt::Debug;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, watch};

/// Default TTL for cached statements
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A driver-side prepared statement that must be released explicitly
#[async_trait]
pub trait PreparedHandle: Send + Sync + 'static {
    async fn close(&self) -> Result<(), CacheError>;
}

enum PrepareState<S> {
    Pending,
    Ready(Arc<S>),
    Failed(String),
}

/// A cached statement, possibly still being prepared
pub struct Stmt<S> {
    transaction: bool,
    state: watch::Receiver<PrepareState<S>>,
}

impl<S> Debug for Stmt<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match &*self.state.borrow() {
            PrepareState::Pending => "pending",
            PrepareState::Ready(_) => "ready",
            PrepareState::Failed(_) => "failed",
        };
        f.debug_struct("Stmt")
            .field("transaction", &self.transaction)
            .field("status", &status)
            .finish()
    }
}

impl<S: PreparedHandle> Stmt<S> {
    /// Whether the statement was prepared on a transaction connection
    pub fn is_transaction(&self) -> bool {
        self.transaction
    }

    /// Wait for preparation to finish and return the handle
    pub async fn ready(&self) -> Result<Arc<S>, CacheError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|s| !matches!(s, PrepareState::Pending))
            .await
            .map_err(|_| CacheError::Abandoned)?;
        match &*state {
            PrepareState::Ready(handle) => Ok(Arc::clone(handle)),
            PrepareState::Failed(e) => Err(CacheError::Prepare(e.clone())),
            PrepareState::Pending => Err(CacheError::Abandoned),
        }
    }

    /// Preparation error, if preparation finished and failed
    pub fn error(&self) -> Option<CacheError> {
        match &*self.state.borrow() {
            PrepareState::Failed(e) => Some(CacheError::Prepare(e.clone())),
            _ => None,
        }
    }

    /// Wait for preparation, then release the driver handle
    pub async fn close(&self) -> Result<(), CacheError> {
        match self.ready().await {
            Ok(handle) => handle.close().await,
            // nothing was prepared, nothing to release
            Err(_) => Ok(()),
        }
    }
}

/// LRU-backed cache of prepared statements keyed by SQL text
pub struct StmtStore<S: PreparedHandle> {
    lru: ExpirableLru<String, Arc<Stmt<S>>>,
    lock: Mutex<()>,
}

impl<S: PreparedHandle> Debug for StmtStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StmtStore")
            .field("len", &self.lru.len())
            .field("cap", &self.lru.cap())
            .finish()
    }
}

impl<S: PreparedHandle> StmtStore<S> {
    /// Create a store holding up to `size` statements (0 means unlimited)
    /// for `ttl` each (zero means [`DEFAULT_TTL`]).
    pub fn new(size: usize, ttl: Duration) -> Self {
        let ttl = if ttl.is_zero() { DEFAULT_TTL } else { ttl };
        let runtime = Handle::try_current().ok();
        let on_evict: EvictCallback<String, Arc<Stmt<S>>> =
            Arc::new(move |key: &String, stmt: &Arc<Stmt<S>>| {
                close_in_background(runtime.as_ref(), key, Arc::clone(stmt))
            });
        Self {
            lru: ExpirableLru::new(size, Some(on_evict), ttl),
            lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &StmtCacheConfig) -> Self {
        Self::new(config.size, config.ttl())
    }

    /// Cached keys, oldest to newest
    pub fn keys(&self) -> Vec<String> {
        self.lru.keys()
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }

    /// Look up an entry without waiting for its preparation
    pub fn get(&self, key: &str) -> Option<Arc<Stmt<S>>> {
        self.lru.get(&key.to_string())
    }

    pub fn set(&self, key: &str, stmt: Arc<Stmt<S>>) {
        self.lru.add(key.to_string(), stmt);
    }

    /// Remove an entry; its handle is closed in the background
    pub fn delete(&self, key: &str) {
        self.lru.remove(&key.to_string());
    }

    /// Return the prepared handle for `key`, preparing it with `prepare` on a
    /// miss. A failed preparation is removed from the cache so the next caller
    /// retries.
    pub async fn get_or_prepare<F, Fut>(
        &self,
        key: &str,
        is_transaction: bool,
        prepare: F,
    ) -> Result<Arc<S>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S, String>>,
    {
        let guard = self.lock.lock().await;
        if let Some(stmt) = self.lru.get(&key.to_string()) {
            if !stmt.is_transaction() || is_transaction {
                drop(guard);
                return stmt.ready().await;
            }
        }

        let (tx, rx) = watch::channel(PrepareState::Pending);
        let stmt = Arc::new(Stmt {
            transaction: is_transaction,
            state: rx,
        });
        self.lru.add(key.to_string(), Arc::clone(&stmt));
        drop(guard);

        match prepare().await {
            Ok(handle) => {
                let handle = Arc::new(handle);
                tx.send_replace(PrepareState::Ready(Arc::clone(&handle)));
                Ok(handle)
            }
            Err(e) => {
                tracing::debug!("prepare failed for {:?}: {}", key, e);
                tx.send_replace(PrepareState::Failed(e.clone()));
                // a caller may have replaced the pending entry meanwhile
                if self.lru.peek(&key.to_string()).is_some_and(|cached| Arc::ptr_eq(&cached, &stmt)) {
                    self.delete(key);
                }
                Err(CacheError::Prepare(e))
            }
        }
    }

    /// Drop every cached statement, closing each handle in the background
    pub fn reset(&self) {
        self.lru.purge();
    }
}

/// Close an evicted statement on the store's runtime, or on the caller's
/// when the store was built outside one.
fn close_in_background<S: PreparedHandle>(runtime: Option<&Handle>, key: &str, stmt: Arc<Stmt<S>>) {
    let Some(runtime) = runtime.cloned().or_else(|| Handle::try_current().ok()) else {
        tracing::warn!("no tokio runtime to close evicted statement {:?}", key);
        return;
    };
    let key = key.to_string();
    runtime.spawn(async move {
        match AssertUnwindSafe(stmt.close()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("closing evicted statement {:?} failed: {}", key, e),
            Err(_) => tracing::error!("panic while closing evicted statement {:?}", key),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct FakeStmt {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PreparedHandle for FakeStmt {
        async fn close(&self) -> Result<(), CacheError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_prepare() {
        let store = Arc::new(StmtStore::<FakeStmt>::new(0, Duration::ZERO));
        let prepares = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let prepares = Arc::clone(&prepares);
            let closed = Arc::clone(&closed);
            tasks.push(tokio::spawn(async move {
                store
                    .get_or_prepare("SELECT 1", false, || async move {
                        prepares.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(FakeStmt { closed })
                    })
                    .await
            }));
        }
        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }
        assert_eq!(prepares.load(Ordering::SeqCst), 1);
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(store.keys(), vec!["SELECT 1".to_string()]);
    }

    #[tokio::test]
    async fn failed_prepare_is_forgotten() {
        let store = StmtStore::<FakeStmt>::new(0, Duration::ZERO);
        let err = store
            .get_or_prepare("BROKEN", false, || async { Err("syntax error".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, CacheError::Prepare("syntax error".to_string()));
        assert!(store.get("BROKEN").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn eviction_closes_statement() {
        let store = StmtStore::<FakeStmt>::new(1, Duration::ZERO);
        let closed = Arc::new(AtomicUsize::new(0));
        for sql in ["SELECT 1", "SELECT 2"] {
            let closed = Arc::clone(&closed);
            store
                .get_or_prepare(sql, false, || async move { Ok(FakeStmt { closed }) })
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(store.keys(), vec!["SELECT 2".to_string()]);

        store.reset();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transaction_statements_are_not_shared_with_pool() {
        let store = StmtStore::<FakeStmt>::new(0, Duration::ZERO);
        let closed = Arc::new(AtomicUsize::new(0));
        let c1 = Arc::clone(&closed);
        let first = store
            .get_or_prepare("SELECT 1", true, || async move { Ok(FakeStmt { closed: c1 }) })
            .await
            .unwrap();
        let c2 = Arc::clone(&closed);
        let second = store
            .get_or_prepare("SELECT 1", false, || async move { Ok(FakeStmt { closed: c2 }) })
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!store.get("SELECT 1").unwrap().is_transaction());
    }

    #[tokio::test]
    async fn expired_statements_are_closed() {
        let store = StmtStore::<FakeStmt>::new(0, Duration::from_millis(50));
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closed);
        store
            .get_or_prepare("SELECT 1", false, || async move { Ok(FakeStmt { closed: counter }) })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(store.is_empty());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_prepare_keeps_a_newer_entry() {
        let store = Arc::new(StmtStore::<FakeStmt>::new(0, Duration::ZERO));
        let closed = Arc::new(AtomicUsize::new(0));
        let (release, wait) = tokio::sync::oneshot::channel::<()>();

        let failing = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .get_or_prepare("SELECT 1", true, || async move {
                        let _ = wait.await;
                        Err("connection reset".to_string())
                    })
                    .await
            })
        };
        while store.get("SELECT 1").is_none() {
            tokio::task::yield_now().await;
        }
        let counter = Arc::clone(&closed);
        store
            .get_or_prepare("SELECT 1", false, || async move { Ok(FakeStmt { closed: counter }) })
            .await
            .unwrap();
        release.send(()).unwrap();

        assert!(failing.await.unwrap().is_err());
        let cached = store.get("SELECT 1").unwrap();
        assert!(!cached.is_transaction());
        assert!(cached.error().is_none());
    }
}
