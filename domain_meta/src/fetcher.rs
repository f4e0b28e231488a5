//! Pluggable metadata sources and the refresh cycle

use crate::collection::{DbCollection, DbMeta, MetaStore};
use crate::errors::DomainError;
use crate::model::DomainTable;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A source of table metadata.
///
/// A fetcher with an empty `db_name` returns tables of every database and
/// rebuilds the whole snapshot; a named fetcher refreshes only its database.
#[async_trait]
pub trait MetaFetcher: Send + Sync {
    fn db_name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<DomainTable>, DomainError>;
}

/// Outcome of one refresh cycle
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Databases published during the cycle
    pub updated: Vec<String>,
    pub failed: Vec<(String, DomainError)>,
}

impl MetaStore {
    /// Register a fetcher, replacing any previous one for the same database
    pub fn add_fetcher(&self, fetcher: Arc<dyn MetaFetcher>) {
        let mut fetchers = self.fetchers.write().unwrap_or_else(|e| e.into_inner());
        fetchers.insert(fetcher.db_name().to_string(), fetcher);
    }

    /// Run every fetcher once. The catch-all fetcher replaces the whole
    /// snapshot first; named fetchers then merge their database in.
    pub async fn refresh(&self) -> RefreshReport {
        let fetchers: Vec<Arc<dyn MetaFetcher>> = {
            let guard = self.fetchers.read().unwrap_or_else(|e| e.into_inner());
            guard.values().cloned().collect()
        };
        let mut report = RefreshReport::default();

        for fetcher in fetchers.iter().filter(|f| f.db_name().is_empty()) {
            match fetcher.fetch().await {
                Ok(tables) => {
                    tracing::info!("domain fetcher(db=*) fetched {} tables", tables.len());
                    let (collection, failures) = DbCollection::from_tables(tables);
                    report.updated.extend(collection.db_names().map(str::to_string));
                    for (db, e) in failures {
                        tracing::error!("domain metadata for db={} rejected: {}", db, e);
                        report.failed.push((db, e));
                    }
                    self.publish(collection);
                }
                Err(e) => {
                    tracing::error!("domain fetcher(db=*) failed: {}", e);
                    report.failed.push((String::new(), e));
                }
            }
        }

        for fetcher in fetchers.iter().filter(|f| !f.db_name().is_empty()) {
            let name = fetcher.db_name().to_string();
            let tables = match fetcher.fetch().await {
                Ok(tables) => tables,
                Err(e) => {
                    tracing::error!("domain fetcher(db={}) failed: {}", name, e);
                    report.failed.push((name, e));
                    continue;
                }
            };
            tracing::info!("domain fetcher(db={}) fetched {} tables", name, tables.len());
            if tables.is_empty() {
                continue;
            }
            match DbMeta::new(&name, tables) {
                Ok(meta) => {
                    self.set_db(&name, meta);
                    report.updated.push(name);
                }
                Err(e) => {
                    tracing::error!("domain metadata for db={} rejected: {}", name, e);
                    report.failed.push((name, e));
                }
            }
        }

        report
    }

    /// Refresh immediately and then every `every` until the handle is aborted
    pub fn spawn_refresh(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let report = store.refresh().await;
                if !report.failed.is_empty() {
                    tracing::warn!(
                        "domain refresh finished with {} failures",
                        report.failed.len()
                    );
                }
            }
        })
    }

    /// Start the periodic refresh described by `[domain] refresh_seconds`
    pub fn spawn_from_config(self: &Arc<Self>, config: &config::DomainConfig) -> Option<JoinHandle<()>> {
        (config.refresh_seconds > 0)
            .then(|| self.spawn_refresh(Duration::from_secs(config.refresh_seconds)))
    }
}
