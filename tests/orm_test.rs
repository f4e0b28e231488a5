//! Engine wiring: configuration, dialect choice, domain metadata and health

use async_trait::async_trait;
use domain_meta::{DomainError, DomainField, DomainTable, ExtraRule, FieldRole};
use ormchain::prelude::*;
use ormchain::statement_core::pool::{ExecResult, PreparedStatement, Rows, TxConn};
use ormchain::statement_core::{ConnPool, DbError};
use pretty_assertions::assert_eq;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use type_mapping::DataKind;

const MINIMAL: &str = r#"
    [database]
    host = "localhost"
    port = 5432
    database = "app"
    username = "postgres"
    password = "secret"
    min_connections = 1
    max_connections = 4
    connection_timeout_seconds = 5
    idle_timeout_seconds = 60
    max_lifetime_seconds = 0
"#;

fn config(extra: &str) -> AppConfig {
    AppConfig::from_toml_str(&format!("{MINIMAL}\n{extra}")).unwrap()
}

/// Records statements and answers queries from a queue
#[derive(Default)]
struct Recording {
    statements: Mutex<Vec<String>>,
    rows: Mutex<VecDeque<Rows>>,
}

impl Recording {
    fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    fn push_rows(&self, columns: &[&str], rows: Vec<Vec<Value>>) {
        self.rows.lock().unwrap().push_back(Rows::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows,
        ));
    }
}

#[async_trait]
impl ConnPool for Recording {
    async fn exec(&self, sql: &str, _vars: &[Value]) -> Result<ExecResult, DbError> {
        self.statements.lock().unwrap().push(sql.to_string());
        Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: Some(1),
        })
    }

    async fn query(&self, sql: &str, _vars: &[Value]) -> Result<Rows, DbError> {
        self.statements.lock().unwrap().push(sql.to_string());
        Ok(self.rows.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn prepare(&self, _sql: &str) -> Result<Arc<dyn PreparedStatement>, DbError> {
        Err(DbError::new("prepare is not scripted"))
    }

    async fn begin(&self) -> Result<Arc<dyn TxConn>, DbError> {
        Err(DbError::new("transactions are not scripted"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
struct Member {
    id: i64,
    name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
#[orm(table = "anchor")]
struct Anchor {
    id: i64,
    extra: String,
}

struct StaticFetcher;

#[async_trait]
impl MetaFetcher for StaticFetcher {
    fn db_name(&self) -> &str {
        ""
    }

    async fn fetch(&self) -> Result<Vec<DomainTable>, DomainError> {
        let mut rules = HashMap::new();
        rules.insert("level".to_string(), ExtraRule::new("level", DataKind::Int));
        Ok(vec![DomainTable::new(
            "live",
            "anchor",
            vec![
                DomainField::new("id", "bigint"),
                DomainField::new("extra", "json").role(FieldRole::Extra { rules }),
            ],
        )])
    }
}

fn no_tx(mut config: AppConfig) -> AppConfig {
    config.orm.skip_default_transaction = true;
    config
}

#[tokio::test]
async fn the_configured_dialect_renders_statements() {
    let pool = Arc::new(Recording::default());
    pool.push_rows(&["id"], vec![vec![Value::from(5i64)]]);
    let orm = Orm::with_pool(&no_tx(config("")), pool.clone()).unwrap();
    let mut member = Member {
        name: "ann".into(),
        ..Default::default()
    };

    orm.db().create(&mut member).await.unwrap();

    assert_eq!(member.id, 5);
    assert_eq!(
        pool.statements(),
        vec![r#"INSERT INTO "members" ("name") VALUES ($1) RETURNING "id""#]
    );
}

#[tokio::test]
async fn orm_settings_reach_the_engine() {
    let pool = Arc::new(Recording::default());
    let mut settings = config("[orm]\ntable_prefix = \"app_\"\nskip_default_transaction = true");
    settings.database.dialect = "mysql".into();
    let orm = Orm::with_pool(&settings, pool.clone()).unwrap();
    let mut members: Vec<Member> = Vec::new();

    orm.db().find(&mut members).await.unwrap();

    assert_eq!(pool.statements(), vec!["SELECT * FROM `app_members`"]);
}

#[test]
fn unknown_dialects_are_rejected() {
    let mut settings = config("");
    settings.database.dialect = "db2".into();

    let err = Orm::with_pool(&settings, Arc::new(Recording::default())).unwrap_err();

    assert!(matches!(err, ConnectError::UnsupportedDialect(ref name) if name == "db2"));
}

#[tokio::test]
async fn opening_without_a_bundled_driver_fails_fast() {
    let mut settings = config("");
    settings.database.dialect = "mysql".into();

    let err = Orm::open(settings).await.unwrap_err();

    assert!(matches!(err, ConnectError::NoDriver(_)), "{err}");
}

#[tokio::test]
async fn refreshed_domain_metadata_guards_writes() {
    let pool = Arc::new(Recording::default());
    let settings = no_tx(config("[domain]\ndefault_db = \"live\""));
    let orm = Orm::with_pool(&settings, pool.clone()).unwrap();
    orm.add_fetcher(Arc::new(StaticFetcher));
    let mut anchor = Anchor {
        extra: r#"{"level":"high"}"#.into(),
        ..Default::default()
    };

    orm.db().create(&mut anchor.clone()).await.unwrap();
    let report = orm.refresh_domain().await;
    let err = orm.db().create(&mut anchor).await.unwrap_err();

    assert_eq!(report.updated, vec!["live"]);
    assert!(report.failed.is_empty());
    assert!(
        err.to_string().starts_with("extra field check failed (stage=before_create, db=live"),
        "{err}"
    );
    assert_eq!(pool.statements().len(), 1);
}

#[tokio::test]
async fn refresh_task_follows_the_interval_setting() {
    let pool = Arc::new(Recording::default());
    let mut manual = Orm::with_pool(&config(""), pool.clone()).unwrap();
    let mut periodic = Orm::with_pool(&config("[domain]\nrefresh_seconds = 60"), pool).unwrap();

    manual.start_refresh();
    periodic.start_refresh();

    assert!(!manual.is_refreshing());
    assert!(periodic.is_refreshing());
}

#[tokio::test]
async fn health_check_pings_the_pool() {
    let pool = Arc::new(Recording::default());
    let orm = Orm::with_pool(&config(""), pool.clone()).unwrap();

    orm.health_check().await.unwrap();

    assert_eq!(pool.statements(), vec!["SELECT 1"]);
}
