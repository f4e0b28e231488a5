//! Engine entry point
//!
//! `Orm` turns an [`AppConfig`] into a ready root [`Session`]: it opens the
//! connection pool, picks the dialect, registers the default callbacks and
//! owns the domain metadata store with its refresh task.

use std::sync::Arc;
use std::time::Duration;

use config::AppConfig;
use domain_meta::{MetaFetcher, MetaStore, RefreshReport};
use statement_core::dialect;
use statement_core::pool::postgres::PgConnPool;
use statement_core::{ConnPool, DbBuilder, Session};
use tokio::task::JoinHandle;

use crate::errors::{ConnectError, OrmError};

/// Owns the root session, the pool behind it and the domain metadata store
pub struct Orm {
    db: Session,
    pool: Arc<dyn ConnPool>,
    meta_store: Arc<MetaStore>,
    refresh_every: Option<Duration>,
    refresh: Option<JoinHandle<()>>,
}

impl Orm {
    /// Connect with `config`; only PostgreSQL has a bundled driver
    pub async fn open(config: AppConfig) -> Result<Self, ConnectError> {
        let database = &config.database;
        if dialect::by_name(&database.dialect).is_none() {
            return Err(ConnectError::UnsupportedDialect(database.dialect.clone()));
        }
        if !matches!(
            database.dialect.to_ascii_lowercase().as_str(),
            "postgres" | "postgresql" | "pg"
        ) {
            return Err(ConnectError::NoDriver(database.dialect.clone()));
        }

        let mut pool_options = sqlx::postgres::PgPoolOptions::new()
            .max_connections(database.max_connections)
            .min_connections(database.min_connections)
            .acquire_timeout(Duration::from_secs(database.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(database.idle_timeout_seconds));

        if database.max_lifetime_seconds > 0 {
            pool_options =
                pool_options.max_lifetime(Duration::from_secs(database.max_lifetime_seconds));
        }

        let pool = pool_options.connect(&database.connection_string()).await?;
        crate::debug_log!(
            "connected to {}:{}/{}",
            database.host,
            database.port,
            database.database
        );

        let mut orm = Self::with_pool(&config, Arc::new(PgConnPool::new(pool)))?;
        orm.start_refresh();
        Ok(orm)
    }

    /// Load the configuration from the environment and connect
    pub async fn from_env() -> Result<Self, ConnectError> {
        Self::open(AppConfig::load()?).await
    }

    /// Build on an existing pool, e.g. another driver or a test double
    pub fn with_pool(config: &AppConfig, pool: Arc<dyn ConnPool>) -> Result<Self, ConnectError> {
        Self::with_builder(config, pool, |builder| builder)
    }

    /// Like [`with_pool`](Self::with_pool), letting the caller adjust the
    /// builder (schema cache, DB-name resolver) before the engine is built
    pub fn with_builder<F>(
        config: &AppConfig,
        pool: Arc<dyn ConnPool>,
        customize: F,
    ) -> Result<Self, ConnectError>
    where
        F: FnOnce(DbBuilder) -> DbBuilder,
    {
        let dialect = dialect::by_name(&config.database.dialect)
            .ok_or_else(|| ConnectError::UnsupportedDialect(config.database.dialect.clone()))?;
        let meta_store = Arc::new(MetaStore::new());

        let builder = DbBuilder::new(dialect, Arc::clone(&pool))
            .config(config.orm.clone())
            .stmt_cache(config.stmt_cache.clone())
            .domain(&config.domain)
            .meta_store(Arc::clone(&meta_store));
        let db = customize(builder).build()?;

        Ok(Self {
            db,
            pool,
            meta_store,
            refresh_every: (config.domain.refresh_seconds > 0)
                .then(|| Duration::from_secs(config.domain.refresh_seconds)),
            refresh: None,
        })
    }

    /// A fresh root session; chains started from it share the engine
    pub fn db(&self) -> Session {
        self.db.clone()
    }

    pub fn meta_store(&self) -> &Arc<MetaStore> {
        &self.meta_store
    }

    /// Register a metadata source for the domain checks
    pub fn add_fetcher(&self, fetcher: Arc<dyn MetaFetcher>) {
        self.meta_store.add_fetcher(fetcher);
    }

    /// Run every fetcher once and publish the result
    pub async fn refresh_domain(&self) -> RefreshReport {
        self.meta_store.refresh().await
    }

    /// Start the periodic refresh configured by `[domain] refresh_seconds`.
    /// Must be called inside a tokio runtime; a second call is a no-op.
    pub fn start_refresh(&mut self) {
        if self.refresh.is_some() {
            return;
        }
        if let Some(every) = self.refresh_every {
            tracing::info!("domain refresh every {}s", every.as_secs());
            self.refresh = Some(self.meta_store.spawn_refresh(every));
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Check database connection health
    pub async fn health_check(&self) -> Result<(), OrmError> {
        self.pool.ping().await.map_err(OrmError::Exec)
    }
}

impl Drop for Orm {
    fn drop(&mut self) {
        if let Some(handle) = self.refresh.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Orm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orm")
            .field("db", &self.db)
            .field("refresh_every", &self.refresh_every)
            .field("refreshing", &self.is_refreshing())
            .finish()
    }
}
