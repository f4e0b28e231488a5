mod common;

use common::*;
use pretty_assertions::assert_eq;
use statement_core::prelude::*;

#[derive(Debug, Clone, Default, PartialEq, Model)]
#[orm(hooks(before_update, before_delete))]
struct Note {
    id: i64,
    body: String,
    updated_at: i64,
}

impl Hooks for Note {
    fn before_update(&mut self, _: &Session) -> Result<(), OrmError> {
        if self.body == "locked" {
            return Err(OrmError::hook("before_update", "note is locked"));
        }
        Ok(())
    }

    fn before_delete(&mut self, _: &Session) -> Result<(), OrmError> {
        if self.body == "pinned" {
            return Err(OrmError::hook("before_delete", "note is pinned"));
        }
        Ok(())
    }
}

#[tokio::test]
async fn column_updates_follow_the_conditions() {
    let pool = MockPool::new();
    pool.affected(3);

    let executed = mysql(&pool)
        .model::<User>()
        .where_("age < ?", args![18])
        .updates([("name", Arg::from("minor")), ("age", Arg::from(17))])
        .await
        .unwrap();

    assert_eq!(executed.rows_affected, 3);
    assert_eq!(
        executed.sql,
        "UPDATE `users` SET `name`=?,`age`=? WHERE age < ?"
    );
    assert_eq!(
        executed.vars,
        vec![Value::from("minor"), Value::from(17), Value::from(18)]
    );
    assert_eq!(pool.calls().first(), Some(&Call::Begin));
    assert_eq!(pool.calls().last(), Some(&Call::Commit));
}

#[tokio::test]
async fn updates_without_conditions_are_refused() {
    let pool = MockPool::new();

    let err = mysql(&pool)
        .model::<User>()
        .update("name", "everyone")
        .await
        .unwrap_err();

    assert_eq!(err, OrmError::MissingWhereClause);
    assert!(pool.statements().is_empty());
    assert_eq!(pool.calls(), vec![Call::Begin, Call::Rollback]);
}

#[tokio::test]
async fn global_updates_need_the_switch() {
    let pool = MockPool::new();
    let config = config::OrmConfig {
        allow_global_update: true,
        ..Default::default()
    };

    let executed = with_config(&pool, config)
        .model::<User>()
        .update("age", 0)
        .await
        .unwrap();

    assert_eq!(executed.sql, "UPDATE `users` SET `age`=?");
}

#[tokio::test]
async fn update_refreshes_the_update_time_but_update_column_does_not() {
    let pool = MockPool::new();

    let touched = mysql(&pool)
        .model::<Note>()
        .where_("id = ?", args![1])
        .update("body", "x")
        .await
        .unwrap();
    let quiet = mysql(&pool)
        .model::<Note>()
        .where_("id = ?", args![1])
        .update_column("body", "y")
        .await
        .unwrap();

    assert_eq!(touched.sql, "UPDATE `notes` SET `body`=?,`updated_at`=? WHERE id = ?");
    assert!(matches!(touched.vars[1], Value::Int(secs) if secs > 0));
    assert_eq!(quiet.sql, "UPDATE `notes` SET `body`=? WHERE id = ?");
}

#[tokio::test]
async fn record_updates_skip_zero_fields_and_match_the_key() {
    let pool = MockPool::new();
    let mut user = User {
        id: 3,
        name: "renamed".into(),
        ..Default::default()
    };

    let executed = mysql(&pool).updates_from(&mut user).await.unwrap();

    assert_eq!(
        executed.sql,
        "UPDATE `users` SET `name`=? WHERE `users`.`id` = ?"
    );
    assert_eq!(executed.vars, vec![Value::from("renamed"), Value::from(3i64)]);
}

#[tokio::test]
async fn record_hooks_guard_updates() {
    let pool = MockPool::new();
    let mut note = Note {
        id: 1,
        body: "locked".into(),
        ..Default::default()
    };

    let err = mysql(&pool).updates_from(&mut note).await.unwrap_err();

    assert!(matches!(err, OrmError::Hook { ref hook, .. } if hook == "before_update"), "{err:?}");
    assert!(pool.statements().is_empty());
}

#[tokio::test]
async fn save_inserts_new_records() {
    let pool = MockPool::new();
    pool.inserted(1, 12);
    let mut user = User::named("fresh", 20);

    mysql(&pool).save(&mut user).await.unwrap();

    assert_eq!(user.id, 12);
    assert!(pool.sqls()[0].starts_with("INSERT INTO `users`"));
}

#[tokio::test]
async fn save_updates_every_column_of_existing_records() {
    let pool = MockPool::new();
    let mut user = User {
        id: 4,
        name: "kept".into(),
        ..Default::default()
    };

    let executed = mysql(&pool).save(&mut user).await.unwrap();

    assert_eq!(
        executed.sql,
        "UPDATE `users` SET `name`=?,`age`=?,`company_id`=?,`manager_id`=? WHERE `users`.`id` = ?"
    );
    assert_eq!(
        executed.vars,
        vec![
            Value::from("kept"),
            Value::from(0),
            Value::Null,
            Value::Null,
            Value::from(4i64),
        ]
    );
}

#[tokio::test]
async fn save_falls_back_to_an_upsert_when_nothing_matched() {
    let pool = MockPool::new();
    pool.affected(0);
    let mut user = User {
        id: 4,
        name: "gone".into(),
        ..Default::default()
    };

    mysql(&pool).save(&mut user).await.unwrap();

    let sqls = pool.sqls();
    assert_eq!(sqls.len(), 2);
    assert!(sqls[1].starts_with("INSERT INTO `users`"), "{}", sqls[1]);
    assert!(sqls[1].contains("ON DUPLICATE KEY UPDATE"), "{}", sqls[1]);
}

#[tokio::test]
async fn deleting_a_record_matches_its_key() {
    let pool = MockPool::new();
    let mut user = User {
        id: 9,
        ..Default::default()
    };

    let executed = mysql(&pool).delete(&mut user).await.unwrap();

    assert_eq!(executed.sql, "DELETE FROM `users` WHERE `users`.`id` = ?");
    assert_eq!(executed.vars, vec![Value::from(9i64)]);
}

#[tokio::test]
async fn deleting_several_records_uses_an_in_list() {
    let pool = MockPool::new();
    let mut users = vec![
        User {
            id: 1,
            ..Default::default()
        },
        User {
            id: 2,
            ..Default::default()
        },
    ];

    let executed = mysql(&pool).delete(&mut users).await.unwrap();

    assert_eq!(executed.sql, "DELETE FROM `users` WHERE `users`.`id` IN (?,?)");
}

#[tokio::test]
async fn deletes_without_conditions_are_refused() {
    let pool = MockPool::new();

    let err = mysql(&pool).model::<User>().delete_where().await.unwrap_err();

    assert_eq!(err, OrmError::MissingWhereClause);
    assert!(pool.statements().is_empty());
}

#[tokio::test]
async fn conditional_deletes_render_the_where() {
    let pool = MockPool::new();
    pool.affected(4);

    let executed = mysql(&pool)
        .model::<User>()
        .where_("age < ?", args![10])
        .delete_where()
        .await
        .unwrap();

    assert_eq!(executed.rows_affected, 4);
    assert_eq!(executed.sql, "DELETE FROM `users` WHERE age < ?");
}

#[tokio::test]
async fn soft_delete_stamps_the_row_instead() {
    let pool = MockPool::new();
    let mut post = Post {
        id: 5,
        ..Default::default()
    };

    let executed = mysql(&pool).delete(&mut post).await.unwrap();

    assert_eq!(
        executed.sql,
        "UPDATE `posts` SET `deleted_at`=? WHERE `posts`.`id` = ? AND `posts`.`deleted_at` IS NULL"
    );
    assert!(post.deleted_at.is_some());
}

#[tokio::test]
async fn unscoped_delete_removes_soft_deleted_rows() {
    let pool = MockPool::new();
    let mut post = Post {
        id: 5,
        ..Default::default()
    };

    let executed = mysql(&pool).unscoped().delete(&mut post).await.unwrap();

    assert_eq!(executed.sql, "DELETE FROM `posts` WHERE `posts`.`id` = ?");
    assert!(post.deleted_at.is_none());
}

#[tokio::test]
async fn soft_delete_scope_alone_is_not_a_condition() {
    let pool = MockPool::new();

    let err = mysql(&pool).model::<Post>().delete_where().await.unwrap_err();

    assert_eq!(err, OrmError::MissingWhereClause);
}

#[tokio::test]
async fn delete_hooks_can_veto() {
    let pool = MockPool::new();
    let mut note = Note {
        id: 2,
        body: "pinned".into(),
        ..Default::default()
    };

    let err = mysql(&pool).delete(&mut note).await.unwrap_err();

    assert!(matches!(err, OrmError::Hook { .. }), "{err:?}");
    assert_eq!(pool.calls(), vec![Call::Begin, Call::Rollback]);
}

#[tokio::test]
async fn table_updates_take_column_names_verbatim() {
    let pool = MockPool::new();

    let executed = mysql(&pool)
        .table("audit_log")
        .where_("id = ?", args![1])
        .update("seen", true)
        .await
        .unwrap();

    assert_eq!(executed.sql, "UPDATE `audit_log` SET `seen`=? WHERE id = ?");
    assert_markers_match(&pool);
}
