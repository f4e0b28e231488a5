mod common;

use common::*;
use pretty_assertions::assert_eq;
use statement_core::prelude::*;
use statement_core::{sync_stage, Statement};
use std::sync::Mutex;

#[derive(Debug, Clone, Default, PartialEq, Model)]
struct Member {
    id: i64,
    name: String,
}

fn member(name: &str) -> Member {
    Member {
        name: name.to_string(),
        ..Default::default()
    }
}

#[test]
fn default_create_stages_run_in_a_fixed_order() {
    let pool = MockPool::new();
    let db = mysql(&pool);

    assert_eq!(
        db.callbacks().create().names().unwrap(),
        vec![
            "orm:begin_transaction",
            "orm:before_create",
            "orm:check_extra",
            "orm:save_before_associations",
            "orm:create",
            "orm:save_after_associations",
            "orm:after_create",
            "orm:commit_or_rollback_transaction",
        ]
    );
    assert_eq!(
        db.callbacks().query().names().unwrap(),
        vec!["orm:query", "orm:preload", "orm:after_query"]
    );
}

#[tokio::test]
async fn custom_stages_run_where_they_were_placed() {
    let pool = MockPool::new();
    pool.inserted(1, 1);
    let db = mysql(&pool);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    db.callbacks()
        .create()
        .after("orm:save_before_associations")
        .before("orm:create")
        .register_stage(
            "audit:before_insert",
            sync_stage(move |stmt: &mut Statement| {
                sink.lock()
                    .unwrap()
                    .push(format!("{} rendered={}", stmt.table, !stmt.sql.is_empty()));
            }),
        )
        .unwrap();
    let sink = Arc::clone(&seen);
    db.callbacks()
        .create()
        .after("orm:create")
        .register_stage(
            "audit:after_insert",
            sync_stage(move |stmt: &mut Statement| {
                sink.lock()
                    .unwrap()
                    .push(format!("{} rendered={}", stmt.table, !stmt.sql.is_empty()));
            }),
        )
        .unwrap();

    let names = db.callbacks().create().names().unwrap();
    let position = |name: &str| names.iter().position(|n| n == name).unwrap();
    assert!(position("orm:save_before_associations") < position("audit:before_insert"));
    assert!(position("audit:before_insert") < position("orm:create"));
    assert!(position("orm:create") < position("audit:after_insert"));

    db.create(&mut member("ann")).await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["members rendered=false", "members rendered=true"]
    );
}

#[tokio::test]
async fn a_failing_stage_rolls_the_transaction_back() {
    let pool = MockPool::new();
    let db = mysql(&pool);
    db.callbacks()
        .create()
        .before("orm:create")
        .register_stage(
            "quota",
            sync_stage(|stmt: &mut Statement| stmt.add_error(OrmError::user("quota exceeded"))),
        )
        .unwrap();

    let err = db.create(&mut member("bob")).await.unwrap_err();

    assert_eq!(err, OrmError::user("quota exceeded"));
    assert_eq!(pool.calls(), vec![Call::Begin, Call::Rollback]);
}

#[tokio::test]
async fn predicates_pick_the_statements_a_stage_sees() {
    let pool = MockPool::new();
    pool.inserted(1, 1).inserted(1, 2);
    let db = mysql(&pool);
    let hits = Arc::new(Mutex::new(0));

    let counter = Arc::clone(&hits);
    db.callbacks()
        .create()
        .after("orm:create")
        .when(|stmt| stmt.table == "users")
        .register_stage(
            "users:count",
            sync_stage(move |_: &mut Statement| *counter.lock().unwrap() += 1),
        )
        .unwrap();

    db.clone().create(&mut member("carol")).await.unwrap();
    db.create(&mut User::named("dave", 30)).await.unwrap();

    assert_eq!(*hits.lock().unwrap(), 1);
}

#[tokio::test]
async fn replaced_stages_take_over_the_slot() {
    let pool = MockPool::new();
    let db = mysql(&pool);
    db.callbacks()
        .query()
        .replace(
            "orm:query",
            sync_stage(|stmt: &mut Statement| stmt.sql = "SELECT 1".to_string()),
        )
        .unwrap();
    let mut users: Vec<User> = Vec::new();

    db.clone().find(&mut users).await.unwrap();

    assert!(users.is_empty());
    assert!(pool.calls().is_empty());
    assert_eq!(
        db.callbacks().query().names().unwrap(),
        vec!["orm:query", "orm:preload", "orm:after_query"]
    );
}

#[test]
fn removing_stages_is_checked() {
    let pool = MockPool::new();
    let db = mysql(&pool);

    db.callbacks().query().remove("orm:after_query").unwrap();
    let err = db.callbacks().query().remove("orm:after_query").unwrap_err();

    assert!(matches!(err, OrmError::Callback(_)), "{err:?}");
    assert_eq!(
        db.callbacks().query().names().unwrap(),
        vec!["orm:query", "orm:preload"]
    );
}

#[test]
fn registering_a_taken_name_fails() {
    let pool = MockPool::new();
    let db = mysql(&pool);

    let err = db
        .callbacks()
        .create()
        .register_stage("orm:create", sync_stage(|_: &mut Statement| {}))
        .unwrap_err();

    assert!(matches!(err, OrmError::Callback(ref msg) if msg.contains("already registered")));
}

#[test]
fn engines_keep_separate_stage_lists() {
    let pool = MockPool::new();
    let first = mysql(&pool);
    let second = mysql(&pool);

    first.callbacks().row().remove("orm:row").unwrap();

    assert!(first.callbacks().row().names().unwrap().is_empty());
    assert_eq!(second.callbacks().row().names().unwrap(), vec!["orm:row"]);
}
