mod common;

use common::*;
use pretty_assertions::assert_eq;
use statement_core::prelude::*;
use statement_core::schema::{NamingStrategy, RelationKind};
use statement_core::SchemaCache;

#[derive(Debug, Clone, Default, PartialEq, Model)]
struct Author {
    name: String,
    email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
struct Blog {
    id: i64,
    title: String,
    #[orm(embedded, embedded_prefix = "author_")]
    author: Author,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
struct Toy {
    id: i64,
    name: String,
    owner_id: i64,
    owner_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Model)]
struct Dog {
    id: i64,
    name: String,
    #[orm(has_many, polymorphic = "Owner")]
    toys: Vec<Toy>,
}

#[test]
fn parsing_twice_returns_the_cached_schema() {
    let cache = SchemaCache::new(NamingStrategy::default());

    let first = cache.parse::<User>().unwrap();
    let second = cache.parse::<User>().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);
    assert_eq!(
        first.db_names,
        vec!["id", "name", "age", "company_id", "manager_id"]
    );
    assert_eq!(
        first.relationships.keys().collect::<Vec<_>>(),
        vec!["company", "manager", "pets", "languages"]
    );
}

#[test]
fn separate_caches_agree_on_field_order() {
    let a = SchemaCache::new(NamingStrategy::default()).parse::<User>().unwrap();
    let b = SchemaCache::new(NamingStrategy::default()).parse::<User>().unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.db_names, b.db_names);
    assert_eq!(
        a.prioritized_primary_field.as_ref().map(|f| f.db_name.as_str()),
        Some("id")
    );
}

#[test]
fn naming_strategy_prefixes_and_pluralizes() {
    let plural = NamingStrategy::default();
    let prefixed = NamingStrategy::new("app_", true);

    assert_eq!(plural.table_name("UserProfile"), "user_profiles");
    assert_eq!(plural.table_name("Company"), "companies");
    assert_eq!(prefixed.table_name("UserProfile"), "app_user_profile");
}

#[tokio::test]
async fn configured_naming_reaches_the_statements() {
    let pool = MockPool::new();
    let config = config::OrmConfig {
        table_prefix: "t_".into(),
        singular_table: true,
        ..Default::default()
    };
    let mut pets: Vec<Pet> = Vec::new();

    with_config(&pool, config).find(&mut pets).await.unwrap();

    assert_eq!(pool.sqls(), vec!["SELECT * FROM `t_pet`"]);
}

#[test]
fn embedded_fields_flatten_with_their_prefix() {
    let cache = SchemaCache::new(NamingStrategy::default());

    let schema = cache.parse::<Blog>().unwrap();

    assert_eq!(schema.table, "blogs");
    assert_eq!(schema.db_names, vec!["id", "title", "author_name", "author_email"]);
}

#[tokio::test]
async fn embedded_fields_are_written_and_read_back() {
    let pool = MockPool::new();
    pool.inserted(1, 4);
    let mut blog = Blog {
        title: "notes".into(),
        author: Author {
            name: "ann".into(),
            email: "ann@example.com".into(),
        },
        ..Default::default()
    };

    let executed = mysql(&pool).create(&mut blog).await.unwrap();

    assert_eq!(
        executed.sql,
        "INSERT INTO `blogs` (`title`,`author_name`,`author_email`) VALUES (?,?,?)"
    );
    assert_eq!(blog.id, 4);

    pool.rows(
        &["id", "title", "author_name", "author_email"],
        vec![vec![
            Value::from(4i64),
            Value::from("notes"),
            Value::from("bea"),
            Value::from("bea@example.com"),
        ]],
    );
    let mut loaded = Blog::default();
    mysql(&pool).first(&mut loaded).await.unwrap();

    assert_eq!(loaded.author.name, "bea");
    assert_eq!(loaded.author.email, "bea@example.com");
}

#[test]
fn polymorphic_relations_resolve_both_columns() {
    let cache = SchemaCache::new(NamingStrategy::default());
    let dog = cache.parse::<Dog>().unwrap();

    let (_, resolved) = dog.resolve_relation("toys", &cache).unwrap();

    assert_eq!(resolved.kind, RelationKind::HasMany);
    let polymorphic = resolved.polymorphic.as_ref().unwrap();
    assert_eq!(polymorphic.id_field.db_name, "owner_id");
    assert_eq!(polymorphic.type_field.db_name, "owner_type");
    assert_eq!(polymorphic.value, "dogs");
}

#[tokio::test]
async fn polymorphic_preload_filters_by_owner_type() {
    let pool = MockPool::new();
    pool.rows(&["id", "name"], vec![vec![Value::from(1i64), Value::from("rex")]]);
    pool.rows(
        &["id", "name", "owner_id", "owner_type"],
        vec![vec![
            Value::from(3i64),
            Value::from("ball"),
            Value::from(1i64),
            Value::from("dogs"),
        ]],
    );
    let mut dogs: Vec<Dog> = Vec::new();

    mysql(&pool).preload("toys").find(&mut dogs).await.unwrap();

    assert_eq!(dogs[0].toys.len(), 1);
    assert_eq!(dogs[0].toys[0].name, "ball");
    let (sql, vars) = pool.statements().remove(1);
    assert!(sql.starts_with("SELECT * FROM `toys` WHERE"), "{sql}");
    assert!(sql.contains("`toys`.`owner_type` = ?"), "{sql}");
    assert_eq!(vars.last(), Some(&Value::from("dogs")));
    assert_markers_match(&pool);
}

#[tokio::test]
async fn polymorphic_children_are_stamped_on_create() {
    let pool = MockPool::new();
    pool.inserted(1, 1).inserted(1, 9);
    let mut dog = Dog {
        name: "rex".into(),
        toys: vec![Toy {
            name: "ball".into(),
            ..Default::default()
        }],
        ..Default::default()
    };

    mysql(&pool).create(&mut dog).await.unwrap();

    assert_eq!(dog.toys[0].owner_id, 1);
    assert_eq!(dog.toys[0].owner_type, "dogs");
    let (sql, vars) = pool.statements().remove(1);
    assert!(
        sql.starts_with("INSERT INTO `toys` (`name`,`owner_id`,`owner_type`) VALUES (?,?,?)"),
        "{sql}"
    );
    assert_eq!(
        vars[..3].to_vec(),
        vec![Value::from("ball"), Value::from(1i64), Value::from("dogs")]
    );
}

#[tokio::test]
async fn polymorphic_association_queries_carry_the_type() {
    let pool = MockPool::new();
    let mut dog = Dog {
        id: 2,
        ..Default::default()
    };
    let mut toys: Vec<Toy> = Vec::new();

    mysql(&pool)
        .association(&mut dog, "toys")
        .unwrap()
        .find(&mut toys)
        .await
        .unwrap();

    assert_eq!(
        pool.statements(),
        vec![(
            "SELECT * FROM `toys` WHERE `toys`.`owner_id` = ? AND `toys`.`owner_type` = ?"
                .to_string(),
            vec![Value::from(2i64), Value::from("dogs")]
        )]
    );
}
