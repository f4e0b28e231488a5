//! Engine: everything sessions share
//!
//! An [`Engine`] is built once per database: configuration, dialect, pool,
//! callback registry, schema cache and the domain-validation settings. Every
//! [`Session`] holds it behind an `Arc`.

use crate::callbacks::Callbacks;
use crate::dialect::Dialect;
use crate::errors::OrmError;
use crate::pool::{ConnPool, PreparedStmtPool};
use crate::schema::{NamingStrategy, SchemaCache};
use crate::session::Session;
use crate::statement::Statement;
use cache_system::StmtCacheConfig;
use config::{DomainConfig, OrmConfig};
use domain_meta::MetaStore;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Picks the domain database a statement validates against
pub type DbResolver = Arc<dyn Fn(&Statement) -> Option<String> + Send + Sync>;

#[derive(Clone)]
pub struct DomainSettings {
    pub store: Arc<MetaStore>,
    pub default_db: Option<String>,
    pub resolver: Option<DbResolver>,
}

impl DomainSettings {
    /// Database name for `stmt`: the resolver first, then the default
    pub fn resolve(&self, stmt: &Statement) -> Option<String> {
        self.resolver
            .as_ref()
            .and_then(|resolve| resolve(stmt))
            .or_else(|| self.default_db.clone())
            .filter(|name| !name.is_empty())
    }
}

impl fmt::Debug for DomainSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainSettings")
            .field("default_db", &self.default_db)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

pub struct Engine {
    pub config: OrmConfig,
    pub dialect: Arc<dyn Dialect>,
    pub pool: Arc<dyn ConnPool>,
    pub callbacks: Callbacks,
    pub schemas: Arc<SchemaCache>,
    pub domain: DomainSettings,
    prepared: Option<Arc<PreparedStmtPool>>,
    save_points: AtomicU64,
}

impl Engine {
    /// The prepared-statement pool when `prepare_stmt` is on
    pub fn prepared(&self) -> Option<&Arc<PreparedStmtPool>> {
        self.prepared.as_ref()
    }

    pub(crate) fn next_save_point(&self) -> String {
        format!("sp{}", self.save_points.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("dialect", &self.dialect.name())
            .field("config", &self.config)
            .field("callbacks", &self.callbacks)
            .field("schemas", &self.schemas)
            .field("domain", &self.domain)
            .finish()
    }
}

/// Builds the engine and returns its root session
pub struct DbBuilder {
    dialect: Arc<dyn Dialect>,
    pool: Arc<dyn ConnPool>,
    config: OrmConfig,
    stmt_cache: StmtCacheConfig,
    schemas: Option<Arc<SchemaCache>>,
    meta_store: Option<Arc<MetaStore>>,
    default_db: Option<String>,
    resolver: Option<DbResolver>,
}

impl DbBuilder {
    pub fn new(dialect: Arc<dyn Dialect>, pool: Arc<dyn ConnPool>) -> Self {
        Self {
            dialect,
            pool,
            config: OrmConfig::default(),
            stmt_cache: StmtCacheConfig::default(),
            schemas: None,
            meta_store: None,
            default_db: None,
            resolver: None,
        }
    }

    pub fn config(mut self, config: OrmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn stmt_cache(mut self, config: StmtCacheConfig) -> Self {
        self.stmt_cache = config;
        self
    }

    pub fn domain(mut self, config: &DomainConfig) -> Self {
        self.default_db = config.default_db.clone();
        self
    }

    /// Use a private schema cache instead of the shared one
    pub fn schema_cache(mut self, cache: Arc<SchemaCache>) -> Self {
        self.schemas = Some(cache);
        self
    }

    pub fn meta_store(mut self, store: Arc<MetaStore>) -> Self {
        self.meta_store = Some(store);
        self
    }

    pub fn domain_default_db(mut self, name: impl Into<String>) -> Self {
        self.default_db = Some(name.into());
        self
    }

    pub fn db_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Statement) -> Option<String> + Send + Sync + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn build(self) -> Result<Session, OrmError> {
        let naming = NamingStrategy::from_config(&self.config);
        let schemas = match self.schemas {
            Some(cache) => cache,
            None if naming == NamingStrategy::default() => SchemaCache::global(),
            None => Arc::new(SchemaCache::new(naming)),
        };

        let (pool, prepared) = if self.config.prepare_stmt {
            let prepared = Arc::new(PreparedStmtPool::new(self.pool, &self.stmt_cache));
            (Arc::clone(&prepared) as Arc<dyn ConnPool>, Some(prepared))
        } else {
            (self.pool, None)
        };

        let callbacks = Callbacks::new();
        self.dialect.initialize(&callbacks)?;
        crate::debug_log!(
            "engine ready: dialect={}, prepare_stmt={}",
            self.dialect.name(),
            self.config.prepare_stmt
        );

        let engine = Engine {
            config: self.config,
            dialect: self.dialect,
            pool,
            callbacks,
            schemas,
            domain: DomainSettings {
                store: self.meta_store.unwrap_or_else(MetaStore::global),
                default_db: self.default_db,
                resolver: self.resolver,
            },
            prepared,
            save_points: AtomicU64::new(0),
        };
        Ok(Session::new(Arc::new(engine)))
    }
}
