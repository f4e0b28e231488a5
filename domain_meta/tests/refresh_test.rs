use async_trait::async_trait;
use domain_meta::{
    DomainError, DomainField, DomainTable, ExtraRule, FieldRole, MetaFetcher, MetaStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use type_mapping::DataKind;

struct StaticFetcher {
    db: String,
    tables: Vec<DomainTable>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    fn new(db: &str, tables: Vec<DomainTable>) -> Arc<Self> {
        Arc::new(Self {
            db: db.to_string(),
            tables,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MetaFetcher for StaticFetcher {
    fn db_name(&self) -> &str {
        &self.db
    }

    async fn fetch(&self) -> Result<Vec<DomainTable>, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tables.clone())
    }
}

struct FailingFetcher;

#[async_trait]
impl MetaFetcher for FailingFetcher {
    fn db_name(&self) -> &str {
        "broken"
    }

    async fn fetch(&self) -> Result<Vec<DomainTable>, DomainError> {
        Err(DomainError::Fetch {
            name: "broken".into(),
            reason: "timeout".into(),
        })
    }
}

fn anchor_table(db: &str) -> DomainTable {
    let mut rules = HashMap::new();
    rules.insert("gender".to_string(), ExtraRule::new("gender", DataKind::String));
    rules.insert("career".to_string(), ExtraRule::new("career", DataKind::String));
    DomainTable::new(
        db,
        "anchor",
        vec![
            DomainField::new("id", "bigint"),
            DomainField::new("faction_id", "bigint").foreign(db, "faction", "id"),
            DomainField::new("extra", "json").role(FieldRole::Extra { rules }),
        ],
    )
}

fn live_tables() -> Vec<DomainTable> {
    vec![
        DomainTable::new(
            "live",
            "room",
            vec![
                DomainField::new("room_id", "bigint").role(FieldRole::LookupId),
                DomainField::new("anchor_id", "bigint").foreign("live", "anchor", "id"),
                DomainField::new("org_name", "varchar").role(FieldRole::LookupValue {
                    tag: "anchor_id.faction_id.faction_name".into(),
                    path: None,
                }),
            ],
        ),
        anchor_table("live"),
        DomainTable::new(
            "live",
            "faction",
            vec![
                DomainField::new("id", "bigint"),
                DomainField::new("faction_name", "varchar"),
            ],
        ),
    ]
}

#[tokio::test]
async fn catch_all_fetcher_rebuilds_and_named_fetchers_merge() {
    let store = MetaStore::new();
    let all = StaticFetcher::new("", live_tables());
    let staging = StaticFetcher::new("staging", vec![anchor_table("staging")]);
    store.add_fetcher(all.clone());
    store.add_fetcher(staging.clone());
    store.add_fetcher(Arc::new(FailingFetcher));

    let report = store.refresh().await;
    assert_eq!(report.updated, vec!["live".to_string(), "staging".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(all.calls.load(Ordering::SeqCst), 1);
    assert_eq!(staging.calls.load(Ordering::SeqCst), 1);

    let live = store.db("live").unwrap();
    let room = live.table("room").unwrap();
    assert_eq!(live.table_by_lookup_id("room_id").unwrap().table_name, "room");
    let path = room.field("org_name").unwrap().lookup_path().unwrap();
    assert_eq!(path.depth(), 2);
    assert_eq!(path.last_field, "faction_name");

    let staging_anchor = store.db("staging").unwrap();
    let extra = staging_anchor.table("anchor").unwrap().field("extra").unwrap();
    let err = extra.check(r#"{"gender":"F","career":42}"#).unwrap_err();
    assert_eq!(
        err.to_string(),
        "rule(key=career,type=FieldString) dismatch value(type=float/int,value=42)"
    );
}

#[tokio::test]
async fn collection_level_lookup_parsing() {
    let store = MetaStore::new();
    store.add_fetcher(StaticFetcher::new("", live_tables()));
    store.refresh().await;

    let collection = store.load();
    let path = collection
        .parse_lookup("anchor_id.faction_id.faction_name", "org_name", "live", "room")
        .unwrap();
    assert_eq!(path.hops.len(), 2);

    let err = collection
        .parse_lookup("anchor_id.faction_id.id.x.y", "org_name", "live", "room")
        .unwrap_err();
    assert!(err.to_string().contains("lookup deep=5>4"));

    assert!(matches!(
        collection.parse_lookup("anchor_id.id", "x", "nowhere", "room"),
        Err(DomainError::UnknownDatabase(_))
    ));
}
