mod common;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use statement_core::clause::CmpOp;
use statement_core::prelude::*;
use std::time::Duration;

fn user_row(id: i64, name: &str, age: i32) -> Vec<Value> {
    vec![Value::from(id), Value::from(name), Value::from(age)]
}

const USER_COLUMNS: [&str; 3] = ["id", "name", "age"];

#[tokio::test]
async fn find_scans_every_row() {
    let pool = MockPool::new();
    pool.rows(&USER_COLUMNS, vec![user_row(1, "alice", 20), user_row(2, "bob", 30)]);
    let mut users: Vec<User> = Vec::new();

    let executed = mysql(&pool)
        .model::<User>()
        .where_("age >= ?", args![18])
        .find(&mut users)
        .await
        .unwrap();

    assert_eq!(executed.sql, "SELECT * FROM `users` WHERE age >= ?");
    assert_eq!(executed.rows_affected, 2);
    let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob"]);
    assert_eq!(users[1].age, 30);
}

#[tokio::test]
async fn empty_find_is_not_an_error() {
    let pool = MockPool::new();
    let mut users: Vec<User> = Vec::new();

    mysql(&pool).find(&mut users).await.unwrap();

    assert!(users.is_empty());
    assert_eq!(pool.sqls(), vec!["SELECT * FROM `users`"]);
}

#[tokio::test]
async fn first_and_last_order_by_primary_key() {
    let pool = MockPool::new();
    pool.rows(&USER_COLUMNS, vec![user_row(1, "alice", 20)]);
    pool.rows(&USER_COLUMNS, vec![user_row(9, "zoe", 40)]);

    let mut first = User::default();
    mysql(&pool).first(&mut first).await.unwrap();
    let mut last = User::default();
    mysql(&pool).last(&mut last).await.unwrap();

    assert_eq!(first.id, 1);
    assert_eq!(last.name, "zoe");
    assert_eq!(
        pool.sqls(),
        vec![
            "SELECT * FROM `users` ORDER BY `users`.`id` LIMIT 1",
            "SELECT * FROM `users` ORDER BY `users`.`id` DESC LIMIT 1",
        ]
    );
}

#[tokio::test]
async fn take_has_no_order() {
    let pool = MockPool::new();
    pool.rows(&USER_COLUMNS, vec![user_row(4, "dan", 50)]);
    let mut user = User::default();

    let executed = mysql(&pool).take(&mut user).await.unwrap();

    assert_eq!(executed.sql, "SELECT * FROM `users` LIMIT 1");
    assert_eq!(user.id, 4);
}

#[tokio::test]
async fn missing_single_records_raise_not_found() {
    let pool = MockPool::new();
    let mut user = User::default();

    let first = mysql(&pool).first(&mut user).await.unwrap_err();
    let take = mysql(&pool).take(&mut user).await.unwrap_err();
    let last = mysql(&pool).last(&mut user).await.unwrap_err();

    for err in [first, take, last] {
        assert!(err.is_not_found(), "{err:?}");
    }
}

#[tokio::test]
async fn records_with_a_key_query_by_it() {
    let pool = MockPool::new();
    pool.rows(&USER_COLUMNS, vec![user_row(3, "cat", 33)]);
    let mut user = User {
        id: 3,
        ..Default::default()
    };

    let executed = mysql(&pool).find(&mut user).await.unwrap();

    assert_eq!(executed.sql, "SELECT * FROM `users` WHERE `users`.`id` = ?");
    assert_eq!(executed.vars, vec![Value::from(3i64)]);
    assert_eq!(user.name, "cat");
}

#[tokio::test]
async fn count_drops_order_and_reads_the_scalar() {
    let pool = MockPool::new();
    pool.rows(&["count(*)"], vec![vec![Value::from(12i64)]]);
    let mut total = 0i64;

    let executed = mysql(&pool)
        .model::<User>()
        .where_("age > ?", args![20])
        .order("name")
        .count(&mut total)
        .await
        .unwrap();

    assert_eq!(total, 12);
    assert_eq!(executed.sql, "SELECT count(*) FROM `users` WHERE age > ?");
}

#[tokio::test]
async fn distinct_count_names_the_column() {
    let pool = MockPool::new();
    pool.rows(&["n"], vec![vec![Value::from(3i64)]]);
    let mut total = 0i64;

    let executed = mysql(&pool)
        .model::<User>()
        .distinct(&["name"])
        .count(&mut total)
        .await
        .unwrap();

    assert_eq!(total, 3);
    assert_eq!(executed.sql, "SELECT count(DISTINCT `name`) FROM `users`");
}

#[tokio::test]
async fn pluck_collects_one_column() {
    let pool = MockPool::new();
    pool.rows(&["name"], vec![vec![Value::from("a")], vec![Value::from("b")]]);
    let mut names: Vec<Value> = Vec::new();

    let executed = mysql(&pool)
        .model::<User>()
        .pluck("name", &mut names)
        .await
        .unwrap();

    assert_eq!(executed.sql, "SELECT `name` FROM `users`");
    assert_eq!(names, vec![Value::from("a"), Value::from("b")]);
}

#[tokio::test]
async fn maps_receive_raw_rows() {
    let pool = MockPool::new();
    pool.rows(&["id", "title"], vec![vec![Value::from(1i64), Value::from("x")]]);
    let mut rows: Vec<Row> = Vec::new();

    mysql(&pool).table("posts").find(&mut rows).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("title"), Some(&Value::from("x")));
}

#[tokio::test]
async fn select_and_omit_shape_the_column_list() {
    let pool = MockPool::new();
    let mut users: Vec<User> = Vec::new();

    mysql(&pool)
        .select(&["name", "age"])
        .find(&mut users)
        .await
        .unwrap();
    mysql(&pool)
        .omit(&["age", "manager_id"])
        .find(&mut users)
        .await
        .unwrap();

    assert_eq!(
        pool.sqls(),
        vec![
            "SELECT `name`,`age` FROM `users`",
            "SELECT `id`,`name`,`company_id` FROM `users`",
        ]
    );
}

#[tokio::test]
async fn unknown_selects_are_rejected() {
    let pool = MockPool::new();
    let mut users: Vec<User> = Vec::new();

    let err = mysql(&pool)
        .select(&["nickname"])
        .find(&mut users)
        .await
        .unwrap_err();

    assert!(matches!(err, OrmError::User(_)), "{err:?}");
    assert!(pool.calls().is_empty());
}

#[tokio::test]
async fn group_and_having_render_in_order() {
    let pool = MockPool::new();
    let mut rows: Vec<Row> = Vec::new();

    mysql(&pool)
        .model::<User>()
        .select_expr("age, count(*) AS n", args![])
        .group("age")
        .having("count(*) > ?", args![1])
        .order_by("age", true)
        .limit(10)
        .offset(20)
        .find(&mut rows)
        .await
        .unwrap();

    assert_eq!(
        pool.sqls(),
        vec![
            "SELECT age, count(*) AS n FROM `users` GROUP BY age HAVING count(*) > ? \
             ORDER BY `age` DESC LIMIT 10 OFFSET 20"
        ]
    );
    assert_markers_match(&pool);
}

#[tokio::test]
async fn or_and_not_conditions_group() {
    let pool = MockPool::new();
    let mut users: Vec<User> = Vec::new();

    mysql(&pool)
        .where_("name = ?", args!["jinzhu"])
        .or("name = ?", args!["jinzhu 2"])
        .not_expr(Expr::eq(Column::new("age"), 18))
        .find(&mut users)
        .await
        .unwrap();

    let (sql, vars) = pool.statements().remove(0);
    assert!(sql.starts_with("SELECT * FROM `users` WHERE name = ? OR name = ?"), "{sql}");
    assert!(sql.contains("`age` <> ?"), "{sql}");
    assert_eq!(vars.len(), 3);
}

#[tokio::test]
async fn in_lists_expand_and_empty_lists_match_nothing() {
    let pool = MockPool::new();
    let mut users: Vec<User> = Vec::new();

    mysql(&pool)
        .where_expr(Expr::in_list(Column::new("id"), args![1, 2, 3]))
        .find(&mut users)
        .await
        .unwrap();
    mysql(&pool)
        .where_expr(Expr::in_list(Column::new("id"), vec![]))
        .find(&mut users)
        .await
        .unwrap();

    assert_eq!(
        pool.sqls(),
        vec![
            "SELECT * FROM `users` WHERE `id` IN (?,?,?)",
            "SELECT * FROM `users` WHERE `id` IN (NULL)",
        ]
    );
    assert_markers_match(&pool);
}

#[tokio::test]
async fn relation_joins_alias_the_target_and_fill_it() {
    let pool = MockPool::new();
    pool.rows(
        &["id", "name", "company__id", "company__name"],
        vec![
            vec![Value::from(1i64), Value::from("alice"), Value::from(5i64), Value::from("acme")],
            vec![Value::from(2i64), Value::from("bob"), Value::Null, Value::Null],
        ],
    );
    let mut users: Vec<User> = Vec::new();

    let executed = mysql(&pool).joins("company", args![]).find(&mut users).await.unwrap();

    assert!(
        executed.sql.contains(
            "FROM `users` LEFT JOIN `companies` `company` ON `users`.`company_id` = `company`.`id`"
        ),
        "{}",
        executed.sql
    );
    assert!(executed.sql.contains("`company`.`name` AS `company__name`"));
    assert!(executed.sql.starts_with("SELECT `users`.`id`,`users`.`name`"));
    assert_eq!(
        users[0].company,
        Some(Company {
            id: 5,
            name: "acme".into()
        })
    );
    assert_eq!(users[1].company, None);
}

#[tokio::test]
async fn nested_joins_chain_their_aliases() {
    let pool = MockPool::new();
    let mut users: Vec<User> = Vec::new();

    let executed = mysql(&pool)
        .joins("manager.company", args![])
        .find(&mut users)
        .await
        .unwrap();

    assert!(
        executed.sql.contains(
            "LEFT JOIN `users` `manager` ON `users`.`manager_id` = `manager`.`id` \
             LEFT JOIN `companies` `manager__company` ON `manager`.`company_id` = `manager__company`.`id`"
        ),
        "{}",
        executed.sql
    );
    assert!(executed.sql.contains("`manager__company`.`name` AS `manager__company__name`"));
}

#[tokio::test]
async fn joining_a_collection_is_unsupported() {
    let pool = MockPool::new();
    let mut users: Vec<User> = Vec::new();

    let err = mysql(&pool).joins("pets", args![]).find(&mut users).await.unwrap_err();

    assert!(matches!(err, OrmError::UnsupportedRelation(_)), "{err:?}");
}

#[tokio::test]
async fn raw_joins_pass_through() {
    let pool = MockPool::new();
    let mut rows: Vec<Row> = Vec::new();

    mysql(&pool)
        .table("users")
        .joins("JOIN emails ON emails.user_id = users.id AND emails.email = ?", args!["a@b"])
        .find(&mut rows)
        .await
        .unwrap();

    let (sql, vars) = pool.statements().remove(0);
    assert_eq!(
        sql,
        "SELECT * FROM `users` JOIN emails ON emails.user_id = users.id AND emails.email = ?"
    );
    assert_eq!(vars, vec![Value::from("a@b")]);
}

fn script_user_with_pets(pool: &MockPool) {
    pool.rows(&USER_COLUMNS, vec![user_row(1, "alice", 20)]);
    pool.rows(
        &["id", "user_id", "name"],
        vec![
            vec![Value::from(10i64), Value::from(1i64), Value::from("rex")],
            vec![Value::from(11i64), Value::from(1i64), Value::from("tom")],
        ],
    );
}

#[tokio::test]
async fn preloading_twice_yields_the_same_graph() {
    let pool = MockPool::new();
    script_user_with_pets(&pool);
    script_user_with_pets(&pool);
    let mut user = User {
        id: 1,
        pets: vec![Pet {
            id: 99,
            user_id: 1,
            name: "stale".into(),
        }],
        ..Default::default()
    };

    mysql(&pool).preload("pets").find(&mut user).await.unwrap();
    let once = user.clone();
    mysql(&pool).preload("pets").find(&mut user).await.unwrap();

    assert_eq!(user, once);
    let names: Vec<&str> = user.pets.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["rex", "tom"]);
    let (sql, vars) = pool.statements().remove(1);
    assert!(sql.starts_with("SELECT * FROM `pets` WHERE"), "{sql}");
    assert_eq!(vars, vec![Value::from(1i64)]);
}

#[tokio::test]
async fn preload_distributes_children_by_parent() {
    let pool = MockPool::new();
    pool.rows(&USER_COLUMNS, vec![user_row(1, "alice", 20), user_row(2, "bob", 30)]);
    pool.rows(
        &["id", "user_id", "name"],
        vec![
            vec![Value::from(10i64), Value::from(2i64), Value::from("rex")],
            vec![Value::from(11i64), Value::from(1i64), Value::from("tom")],
            vec![Value::from(12i64), Value::from(2i64), Value::from("kit")],
        ],
    );
    let mut users: Vec<User> = Vec::new();

    mysql(&pool).preload("pets").find(&mut users).await.unwrap();

    let pets: Vec<Vec<i64>> = users
        .iter()
        .map(|u| u.pets.iter().map(|p| p.id).collect())
        .collect();
    assert_eq!(pets, vec![vec![11], vec![10, 12]]);
    let (_, vars) = pool.statements().remove(1);
    assert_eq!(vars, vec![Value::from(1i64), Value::from(2i64)]);
}

#[tokio::test]
async fn many_to_many_preload_goes_through_the_join_table() {
    let pool = MockPool::new();
    pool.rows(&USER_COLUMNS, vec![user_row(1, "alice", 20)]);
    pool.rows(
        &["user_id", "language_id"],
        vec![
            vec![Value::from(1i64), Value::from(5i64)],
            vec![Value::from(1i64), Value::from(6i64)],
        ],
    );
    pool.rows(
        &["id", "code"],
        vec![
            vec![Value::from(5i64), Value::from("en")],
            vec![Value::from(6i64), Value::from("fr")],
        ],
    );
    let mut users: Vec<User> = Vec::new();

    mysql(&pool).preload("languages").find(&mut users).await.unwrap();

    let codes: Vec<&str> = users[0].languages.iter().map(|l| l.code.as_str()).collect();
    assert_eq!(codes, vec!["en", "fr"]);
    let sqls = pool.sqls();
    assert_eq!(sqls.len(), 3);
    assert!(sqls[1].starts_with("SELECT * FROM `user_languages` WHERE"), "{}", sqls[1]);
    assert!(sqls[2].starts_with("SELECT * FROM `languages` WHERE"), "{}", sqls[2]);
}

#[tokio::test]
async fn belongs_to_preload_skips_parents_without_a_key() {
    let pool = MockPool::new();
    pool.rows(
        &["id", "name", "company_id"],
        vec![
            vec![Value::from(1i64), Value::from("a"), Value::from(5i64)],
            vec![Value::from(2i64), Value::from("b"), Value::Null],
        ],
    );
    pool.rows(&["id", "name"], vec![vec![Value::from(5i64), Value::from("acme")]]);
    let mut users: Vec<User> = Vec::new();

    mysql(&pool).preload("company").find(&mut users).await.unwrap();

    assert_eq!(users[0].company.as_ref().map(|c| c.name.as_str()), Some("acme"));
    assert_eq!(users[1].company, None);
}

#[tokio::test]
async fn preload_conditions_reach_the_child_query() {
    let pool = MockPool::new();
    pool.rows(&USER_COLUMNS, vec![user_row(1, "alice", 20)]);
    let mut users: Vec<User> = Vec::new();

    mysql(&pool)
        .preload_where("pets", vec![Expr::neq(Column::new("name"), "stale")])
        .find(&mut users)
        .await
        .unwrap();

    let (sql, vars) = pool.statements().remove(1);
    assert!(sql.contains("`name` <> ?"), "{sql}");
    assert_eq!(vars, vec![Value::from(1i64), Value::from("stale")]);
}

#[tokio::test]
async fn soft_deleted_rows_are_hidden_unless_unscoped() {
    let pool = MockPool::new();
    let mut posts: Vec<Post> = Vec::new();

    mysql(&pool).find(&mut posts).await.unwrap();
    mysql(&pool).unscoped().find(&mut posts).await.unwrap();

    assert_eq!(
        pool.sqls(),
        vec![
            "SELECT * FROM `posts` WHERE `posts`.`deleted_at` IS NULL",
            "SELECT * FROM `posts`",
        ]
    );
}

#[tokio::test]
async fn find_in_batches_walks_by_primary_key() {
    let pool = MockPool::new();
    pool.rows(&USER_COLUMNS, vec![user_row(1, "a", 1), user_row(2, "b", 2)]);
    pool.rows(&USER_COLUMNS, vec![user_row(3, "c", 3)]);
    let mut seen = Vec::new();

    mysql(&pool)
        .find_in_batches::<User, _>(2, |batch, idx| {
            seen.push((idx, batch.len()));
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(seen, vec![(1, 2), (2, 1)]);
    let statements = pool.statements();
    assert_eq!(
        statements[0].0,
        "SELECT * FROM `users` ORDER BY `users`.`id` LIMIT 2"
    );
    assert_eq!(
        statements[1].0,
        "SELECT * FROM `users` WHERE `users`.`id` > ? ORDER BY `users`.`id` LIMIT 2"
    );
    assert_eq!(statements[1].1, vec![Value::from(2i64)]);
}

#[tokio::test]
async fn first_or_init_fills_from_conditions() {
    let pool = MockPool::new();
    let mut user = User::default();

    mysql(&pool)
        .where_expr(Expr::eq(Column::new("name"), "nobody"))
        .first_or_init(&mut user)
        .await
        .unwrap();

    assert_eq!(user.name, "nobody");
    assert_eq!(user.id, 0);
}

#[tokio::test]
async fn first_or_create_inserts_the_missing_record() {
    let pool = MockPool::new();
    pool.rows(&USER_COLUMNS, vec![]);
    pool.inserted(1, 42);
    let mut user = User::default();

    mysql(&pool)
        .where_expr(Expr::eq(Column::new("name"), "newbie"))
        .first_or_create(&mut user)
        .await
        .unwrap();

    assert_eq!(user.id, 42);
    assert_eq!(user.name, "newbie");
    assert!(pool.sqls()[1].starts_with("INSERT INTO `users`"));
}

#[tokio::test]
async fn conditional_search_builds_filters_order_and_page() {
    let pool = MockPool::new();
    pool.rows(&["count(*)"], vec![vec![Value::from(7i64)]]);
    pool.rows(&["id", "user_name"], vec![vec![Value::from(6i64), Value::from("ann")]]);
    let search = json!({
        "neq_id": 1,
        "gt_age": 18,
        "like_name": "a%",
        "page": 2,
        "pagesize": 5,
        "order_key": "descId"
    });
    let serde_json::Value::Object(search) = search else {
        unreachable!()
    };

    let result = mysql(&pool)
        .table("users")
        .query_general(&search, ConditionalOptions::default())
        .await
        .unwrap();

    assert_eq!(result.total, 7);
    assert_eq!(result.list.len(), 1);
    assert_eq!(result.list[0].get("userName"), Some(&Value::from("ann")));
    assert!(result.sum.is_empty());
    let statements = pool.statements();
    assert_eq!(
        statements[0].0,
        "SELECT count(*) FROM `users` WHERE `age` >= ? AND `name` LIKE ? AND `id` <> ?"
    );
    assert_eq!(
        statements[1].0,
        "SELECT * FROM `users` WHERE `age` >= ? AND `name` LIKE ? AND `id` <> ? \
         ORDER BY `id` DESC LIMIT 5 OFFSET 5"
    );
    assert_eq!(
        statements[1].1,
        vec![Value::from(18i64), Value::from("a%"), Value::from(1i64)]
    );
}

#[tokio::test]
async fn conditional_search_sums_on_the_first_page() {
    let pool = MockPool::new();
    pool.rows(&["count(*)"], vec![vec![Value::from(2i64)]]);
    pool.rows(&["id", "amount"], vec![vec![Value::from(1i64), Value::from(3i64)]]);
    pool.rows(&["amount"], vec![vec![Value::from(9i64)]]);
    let search = json!({ "page": 1, "#sum": ["amount"] });
    let serde_json::Value::Object(search) = search else {
        unreachable!()
    };

    let result = mysql(&pool)
        .table("orders")
        .query_general(&search, ConditionalOptions::default())
        .await
        .unwrap();

    assert_eq!(result.sum.get("amount"), Some(&Value::from(9i64)));
    assert_eq!(
        pool.sqls()[2],
        "SELECT sum(`amount`) AS `amount` FROM `orders`"
    );
}

#[tokio::test]
async fn out_of_range_pages_fail_before_querying() {
    let pool = MockPool::new();
    let search = json!({ "page": i64::MAX, "pagesize": 50 });
    let serde_json::Value::Object(search) = search else {
        unreachable!()
    };

    let err = mysql(&pool)
        .table("users")
        .query_general(&search, ConditionalOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, OrmError::User(ref msg) if msg.contains("out of range")), "{err}");
    assert!(pool.calls().is_empty());
}

#[tokio::test]
async fn empty_conditional_results_skip_the_page_query() {
    let pool = MockPool::new();
    pool.rows(&["count(*)"], vec![vec![Value::from(0i64)]]);
    let search = serde_json::Map::new();

    let result = mysql(&pool)
        .table("users")
        .query_general(&search, ConditionalOptions::default())
        .await
        .unwrap();

    assert_eq!(result.total, 0);
    assert_eq!(pool.sqls().len(), 1);
}

#[derive(serde::Serialize)]
struct UserSearch {
    gt_age: i32,
    name: Option<String>,
    page: u32,
}

#[tokio::test]
async fn typed_search_records_drive_the_query() {
    let pool = MockPool::new();
    pool.rows(&["count(*)"], vec![vec![Value::from(1i64)]]);
    pool.rows(&USER_COLUMNS, vec![user_row(5, "eve", 40)]);
    let search = UserSearch {
        gt_age: 30,
        name: None,
        page: 1,
    };
    let mut users: Vec<User> = Vec::new();

    let (total, _) = mysql(&pool)
        .model::<User>()
        .query_conditional(&search, &mut users, ConditionalOptions::default())
        .await
        .unwrap();

    assert_eq!(total, 1);
    assert_eq!(users[0].name, "eve");
    assert_eq!(
        pool.sqls()[1],
        "SELECT * FROM `users` WHERE `age` >= ? LIMIT 100"
    );
}

#[tokio::test]
async fn cancelled_statements_stop_waiting() {
    let pool = MockPool::new();
    pool.reply(Reply::Hang);
    let token = CancelToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });
    let mut users: Vec<User> = Vec::new();

    let err = tokio::time::timeout(
        Duration::from_secs(2),
        mysql(&pool).with_cancel(token).find(&mut users),
    )
    .await
    .expect("cancellation should end the query")
    .unwrap_err();

    assert!(err.is_cancelled(), "{err:?}");
}

#[tokio::test]
async fn rows_and_scan_skip_model_stages() {
    let pool = MockPool::new();
    pool.rows(&["name"], vec![vec![Value::from("x")], vec![Value::from("y")]]);
    pool.rows(&USER_COLUMNS, vec![user_row(8, "raw", 8)]);

    let rows = mysql(&pool).table("users").select(&["name"]).rows().await.unwrap();
    let mut users: Vec<User> = Vec::new();
    mysql(&pool)
        .raw("SELECT * FROM users WHERE id = ?", args![8])
        .scan(&mut users)
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(users[0].name, "raw");
    assert_eq!(pool.sqls()[1], "SELECT * FROM users WHERE id = ?");
}

#[tokio::test]
async fn rows_refuse_dry_run() {
    let pool = MockPool::new();
    let err = mysql(&pool).table("users").dry_run().rows().await.unwrap_err();
    assert!(matches!(err, OrmError::DryRunModeUnsupported));
}

#[tokio::test]
async fn comparison_helpers_bind_their_operand() {
    let pool = MockPool::new();
    let mut users: Vec<User> = Vec::new();

    mysql(&pool)
        .where_expr(Expr::cmp(CmpOp::Lt, Column::new("age"), 65))
        .where_expr(Expr::like(Column::new("name"), "j%"))
        .find(&mut users)
        .await
        .unwrap();

    assert_eq!(
        pool.sqls(),
        vec!["SELECT * FROM `users` WHERE `age` < ? AND `name` LIKE ?"]
    );
    assert_markers_match(&pool);
}
