//! Published snapshots of domain metadata

use crate::errors::DomainError;
use crate::fetcher::MetaFetcher;
use crate::lookup::{parse_lookup_tag, LookupPath};
use crate::model::{DomainTable, FieldRole};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

/// Tables of one database, indexed by name and by lookup-id field
#[derive(Debug, Clone, Default)]
pub struct DbMeta {
    tables: Vec<DomainTable>,
    by_name: HashMap<String, usize>,
    by_lookup_id: HashMap<String, usize>,
}

impl DbMeta {
    /// Index `tables` and resolve every lookup-value tag they declare
    pub fn new(db_name: &str, tables: Vec<DomainTable>) -> Result<Self, DomainError> {
        let mut meta = DbMeta {
            by_name: HashMap::with_capacity(tables.len()),
            by_lookup_id: HashMap::with_capacity(tables.len()),
            tables,
        };
        for (idx, table) in meta.tables.iter().enumerate() {
            meta.by_name.insert(table.table_name.clone(), idx);
            if let Some(field) = table.lookup_id_field() {
                meta.by_lookup_id.insert(field.name.clone(), idx);
            }
        }

        let mut resolved: Vec<(usize, usize, LookupPath)> = Vec::new();
        for (ti, table) in meta.tables.iter().enumerate() {
            for (fi, field) in table.fields.iter().enumerate() {
                if let Some(FieldRole::LookupValue { tag, .. }) = &field.role {
                    let path = parse_lookup_tag(&meta, db_name, &table.table_name, &field.name, tag)?;
                    resolved.push((ti, fi, path));
                }
            }
        }
        for (ti, fi, resolved_path) in resolved {
            if let Some(FieldRole::LookupValue { path, .. }) = &mut meta.tables[ti].fields[fi].role {
                *path = Some(resolved_path);
            }
        }
        Ok(meta)
    }

    pub fn table(&self, name: &str) -> Option<&DomainTable> {
        self.by_name.get(name).map(|&i| &self.tables[i])
    }

    pub fn table_by_lookup_id(&self, lookup_id: &str) -> Option<&DomainTable> {
        self.by_lookup_id.get(lookup_id).map(|&i| &self.tables[i])
    }

    pub fn tables(&self) -> &[DomainTable] {
        &self.tables
    }
}

/// Every known database, keyed by name
#[derive(Debug, Clone, Default)]
pub struct DbCollection {
    dbs: BTreeMap<String, Arc<DbMeta>>,
}

impl DbCollection {
    /// Group `tables` by their database name. A database whose lookups fail to
    /// resolve is left out and reported.
    pub fn from_tables(tables: Vec<DomainTable>) -> (Self, Vec<(String, DomainError)>) {
        let mut grouped: BTreeMap<String, Vec<DomainTable>> = BTreeMap::new();
        for table in tables {
            grouped.entry(table.db_name.clone()).or_default().push(table);
        }
        let mut collection = DbCollection::default();
        let mut failures = Vec::new();
        for (name, tables) in grouped {
            match DbMeta::new(&name, tables) {
                Ok(meta) => {
                    collection.dbs.insert(name, Arc::new(meta));
                }
                Err(e) => failures.push((name, e)),
            }
        }
        (collection, failures)
    }

    pub fn db(&self, name: &str) -> Option<Arc<DbMeta>> {
        self.dbs.get(name).cloned()
    }

    pub fn db_names(&self) -> impl Iterator<Item = &str> {
        self.dbs.keys().map(String::as_str)
    }

    /// Copy of this collection with `name` replaced
    pub fn with_db(&self, name: &str, meta: DbMeta) -> Self {
        let mut next = self.clone();
        next.dbs.insert(name.to_string(), Arc::new(meta));
        next
    }

    pub fn parse_lookup(&self, tag: &str, column: &str, db_name: &str, table: &str) -> Result<LookupPath, DomainError> {
        let db = self
            .db(db_name)
            .ok_or_else(|| DomainError::UnknownDatabase(db_name.to_string()))?;
        parse_lookup_tag(&db, db_name, table, column, tag)
    }
}

/// Holder of the current [`DbCollection`] plus the fetchers that rebuild it.
///
/// Readers clone the current `Arc` and never observe a half-built snapshot;
/// writers build a complete replacement and swap it in. The `RwLock` around
/// the pointer is held only for the clone or the store, so a reader waits at
/// most one pointer write; building the snapshot and dropping the old one
/// happen outside it.
#[derive(Default)]
pub struct MetaStore {
    current: RwLock<Arc<DbCollection>>,
    write: Mutex<()>,
    pub(crate) fetchers: RwLock<BTreeMap<String, Arc<dyn MetaFetcher>>>,
}

impl std::fmt::Debug for MetaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dbs: Vec<String> = self.load().db_names().map(str::to_string).collect();
        f.debug_struct("MetaStore").field("dbs", &dbs).finish()
    }
}

impl MetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide store used when an engine is not given its own
    pub fn global() -> Arc<MetaStore> {
        static GLOBAL: OnceLock<Arc<MetaStore>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(MetaStore::new())))
    }

    /// Current snapshot
    pub fn load(&self) -> Arc<DbCollection> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Replace the whole snapshot
    pub fn publish(&self, collection: DbCollection) {
        let _writer = self.write.lock().unwrap_or_else(|e| e.into_inner());
        self.swap(collection);
    }

    /// Replace one database in the snapshot
    pub fn set_db(&self, name: &str, meta: DbMeta) {
        let _writer = self.write.lock().unwrap_or_else(|e| e.into_inner());
        let next = self.load().with_db(name, meta);
        self.swap(next);
    }

    fn swap(&self, collection: DbCollection) {
        let next = Arc::new(collection);
        let previous = {
            let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *guard, next)
        };
        drop(previous);
    }

    pub fn db(&self, name: &str) -> Option<Arc<DbMeta>> {
        self.load().db(name)
    }
}
