//! Clause rendering tests against a `?`/backtick builder

use super::*;
use crate::args;
use crate::errors::OrmError;
use pretty_assertions::assert_eq;
use type_mapping::Value;

#[derive(Default)]
struct TestBuilder {
    sql: String,
    vars: Vec<Value>,
    errors: Vec<OrmError>,
}

impl Builder for TestBuilder {
    fn write_str(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    fn write_char(&mut self, c: char) {
        self.sql.push(c);
    }

    fn write_quoted(&mut self, column: &Column) {
        if column.raw {
            self.sql.push_str(&column.name);
            return;
        }
        if !column.table.is_empty() {
            let table = if column.table == CURRENT_TABLE { "users" } else { &column.table };
            self.sql.push_str(&format!("`{table}`."));
        }
        let name = if column.name == PRIMARY_KEY { "id" } else { &column.name };
        self.sql.push_str(&format!("`{name}`"));
    }

    fn write_quoted_table(&mut self, table: &Table) {
        let name = if table.name == CURRENT_TABLE { "users" } else { &table.name };
        self.sql.push_str(&format!("`{name}`"));
        if !table.alias.is_empty() {
            self.sql.push_str(&format!(" `{}`", table.alias));
        }
    }

    fn add_var(&mut self, arg: &Arg) {
        match arg {
            Arg::Value(Value::Array(items)) => {
                self.sql.push('(');
                if items.is_empty() {
                    self.sql.push_str("NULL");
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.sql.push(',');
                    }
                    self.add_var(&Arg::Value(item.clone()));
                }
                self.sql.push(')');
            }
            Arg::Value(v) => {
                self.vars.push(v.clone());
                self.sql.push('?');
            }
            Arg::Column(c) => self.write_quoted(c),
            Arg::Expr(e) => e.build(self),
            Arg::Default => self.sql.push_str("DEFAULT"),
            Arg::Sub(sub) => {
                self.sql.push('(');
                sub.build(self);
                self.sql.push(')');
            }
        }
    }

    fn add_error(&mut self, err: OrmError) {
        self.errors.push(err);
    }
}

fn render(clauses: &[ClauseExpr]) -> TestBuilder {
    let mut builder = TestBuilder::default();
    for (idx, clause) in clauses.iter().enumerate() {
        if idx > 0 {
            builder.write_char(' ');
        }
        clause.build(&mut builder);
    }
    builder
}

fn assert_markers_match(builder: &TestBuilder) {
    assert_eq!(
        builder.sql.matches('?').count(),
        builder.vars.len(),
        "markers in {:?}",
        builder.sql
    );
}

// ========================================
// Conditions
// ========================================

#[test]
fn comparisons_render_null_and_lists() {
    let built = render(&[Where::new(vec![
        Expr::eq(Column::new("name"), "jinzhu"),
        Expr::eq(Column::new("deleted_at"), Value::Null),
        Expr::neq(Column::new("role"), vec!["admin", "root"]),
        Expr::gte(Column::new("age"), 18),
    ])
    .into()]);
    assert_eq!(
        built.sql,
        "WHERE `name` = ? AND `deleted_at` IS NULL AND `role` NOT IN (?,?) AND `age` >= ?"
    );
    assert_eq!(built.vars.len(), 4);
    assert_markers_match(&built);
}

#[test]
fn in_list_edge_cases() {
    let built = render(&[Where::new(vec![
        Expr::in_list(Column::new("id"), vec![]),
        Expr::in_list(Column::new("id"), args![1]),
        Expr::in_list(Column::new("id"), args![1, 2, 3]),
        Expr::not_in(Column::new("id"), vec![]),
        Expr::not_in(Column::new("id"), args![4]),
    ])
    .into()]);
    assert_eq!(
        built.sql,
        "WHERE `id` IN (NULL) AND `id` = ? AND `id` IN (?,?,?) AND `id` IS NOT NULL AND `id` <> ?"
    );
    assert_markers_match(&built);
}

#[test]
fn or_and_not_parenthesize_like_sql_reads() {
    let built = render(&[Where::new(vec![
        Expr::raw("name = ? OR name = ?", args!["a", "b"]),
        Expr::or(vec![Expr::eq(Column::new("age"), 20)]),
        Expr::not(vec![
            Expr::eq(Column::new("role"), "admin"),
            Expr::like(Column::new("email"), "%@test"),
        ]),
    ])
    .into()]);
    assert_eq!(
        built.sql,
        "WHERE (name = ? OR name = ?) OR `age` = ? AND (`role` <> ? AND `email` NOT LIKE ?)"
    );
    assert_markers_match(&built);
}

#[test]
fn raw_expression_expands_lists_after_parenthesis() {
    let built = render(&[Where::new(vec![
        Expr::raw("id IN (?)", args![vec![1, 2]]),
        Expr::raw("name IN ?", args![vec!["a"]]),
    ])
    .into()]);
    assert_eq!(built.sql, "WHERE id IN (?,?) AND name IN (?)");
    assert_markers_match(&built);
}

#[test]
fn raw_expression_reports_unbound_vars() {
    let built = render(&[Where::new(vec![Expr::raw("id = ?", args![1, 2])]).into()]);
    assert_eq!(built.errors.len(), 1);
}

#[test]
fn named_expression_binds_by_name() {
    let built = render(&[Where::new(vec![Expr::named(
        "name = @name OR nickname = @name",
        vec![("name".to_string(), Arg::from("jinzhu"))],
    )])
    .into()]);
    assert_eq!(built.sql, "WHERE name = ? OR nickname = ?");
    assert_eq!(built.vars, vec![Value::from("jinzhu"), Value::from("jinzhu")]);
}

// ========================================
// Verbs
// ========================================

#[test]
fn select_statement_in_clause_order() {
    let mut from = From::table(Table::current());
    from.joins.push(Join::new(
        JoinType::Left,
        Table::new("companies").alias("Company"),
        vec![Expr::eq(
            Column::new("id").of("Company"),
            Arg::Column(Column::new("company_id").of(CURRENT_TABLE)),
        )],
    ));
    let built = render(&[
        Select::columns(vec![Column::current("id"), Column::new("name").of("Company")]).into(),
        from.into(),
        Where::new(vec![Expr::gt(Column::new("age"), 1)]).into(),
        GroupBy {
            columns: vec![Column::new("age")],
            having: vec![Expr::raw("count(*) > ?", args![1])],
        }
        .into(),
        OrderBy::column(Column::new("id"), true).into(),
        Limit::new(Some(10), Some(20)).into(),
        Locking::update().options("NOWAIT").into(),
    ]);
    assert_eq!(
        built.sql,
        "SELECT `users`.`id`,`Company`.`name` FROM `users` LEFT JOIN `companies` `Company` \
         ON `Company`.`id` = `users`.`company_id` WHERE `age` > ? GROUP BY `age` \
         HAVING count(*) > ? ORDER BY `id` DESC LIMIT 10 OFFSET 20 FOR UPDATE NOWAIT"
    );
    assert_markers_match(&built);
}

#[test]
fn insert_with_defaults_and_upsert() {
    let built = render(&[
        Insert::default().into(),
        Values {
            columns: vec![Column::new("name"), Column::new("age")],
            rows: vec![args!["alice", 18], vec![Arg::from("bob"), Arg::Default]],
        }
        .into(),
        OnConflict::update_columns(vec![Column::new("id")], &["name".to_string()]).into(),
        Returning {
            columns: vec![Column::new("id")],
        }
        .into(),
    ]);
    assert_eq!(
        built.sql,
        "INSERT INTO `users` (`name`,`age`) VALUES (?,?),(?,DEFAULT) \
         ON CONFLICT (`id`) DO UPDATE SET `name`=`excluded`.`name` RETURNING `id`"
    );
    assert_markers_match(&built);
}

#[test]
fn empty_values_render_default_values() {
    let built = render(&[Insert::default().into(), Values::default().into()]);
    assert_eq!(built.sql, "INSERT INTO `users` DEFAULT VALUES");
}

#[test]
fn update_and_delete() {
    let update = render(&[
        Update::default().into(),
        Set::new(vec![
            Assignment::new(Column::new("name"), "x"),
            Assignment::new(Column::new("age"), Expr::raw("age + ?", args![1])),
        ])
        .into(),
        Where::new(vec![Expr::eq(Column::primary_key(), 3)]).into(),
    ]);
    assert_eq!(
        update.sql,
        "UPDATE `users` SET `name`=?,`age`=age + ? WHERE `users`.`id` = ?"
    );
    assert_markers_match(&update);

    let delete = render(&[
        Delete::default().into(),
        From::default().into(),
        Where::new(vec![Expr::eq(Column::new("id"), 3)]).into(),
    ]);
    assert_eq!(delete.sql, "DELETE FROM `users` WHERE `id` = ?");
}

#[test]
fn sub_query_shares_variables() {
    let sub = SubQuery::new(vec![
        Clause::new(Select::expr(Expr::raw("AVG(age)", vec![]))),
        Clause::new(From::table(Table::new("users"))),
        Clause::new(Where::new(vec![Expr::like(Column::new("name"), "a%")])),
    ]);
    let built = render(&[Where::new(vec![
        Expr::gt(Column::new("age"), sub),
        Expr::eq(Column::new("active"), true),
    ])
    .into()]);
    assert_eq!(
        built.sql,
        "WHERE `age` > (SELECT AVG(age) FROM `users` WHERE `name` LIKE ?) AND `active` = ?"
    );
    assert_markers_match(&built);
}

// ========================================
// Merging
// ========================================

#[test]
fn merging_follows_clause_semantics() {
    let merged = ClauseExpr::from(Where::new(vec![Expr::eq(Column::new("b"), 2)]))
        .merge(Where::new(vec![Expr::eq(Column::new("a"), 1)]).into());
    match merged {
        ClauseExpr::Where(w) => assert_eq!(w.exprs.len(), 2),
        other => panic!("unexpected {other:?}"),
    }

    let limit = ClauseExpr::from(Limit::new(None, Some(5))).merge(Limit::new(Some(10), None).into());
    assert_eq!(limit, ClauseExpr::Limit(Limit::new(Some(10), Some(5))));

    let reorder = ClauseExpr::from(OrderBy {
        items: vec![OrderItem::Column {
            column: Column::new("b"),
            desc: false,
        }],
        reorder: true,
    })
    .merge(OrderBy::column(Column::new("a"), false).into());
    match reorder {
        ClauseExpr::OrderBy(o) => assert_eq!(o.items.len(), 1),
        other => panic!("unexpected {other:?}"),
    }
}
