//! Query stage
//!
//! Builds `SELECT .. FROM .. [JOIN ..] WHERE ..` from the statement and scans
//! the result into the destination.

use super::{helper, scan};
use crate::clause::{Column, Expr, From, Join, Select, Table, Where, QUERY_CLAUSES};
use crate::errors::OrmError;
use crate::model::Dest;
use crate::schema::{Cardinality, RelationKind, Schema};
use crate::statement::{JoinRequest, Statement};
use futures::future::BoxFuture;
use std::sync::Arc;

pub(crate) fn query(stmt: &mut Statement) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        if stmt.error.is_some() {
            return;
        }
        if stmt.sql.is_empty() {
            if let Err(err) = build_query(stmt) {
                stmt.add_error(err);
                return;
            }
        }
        if stmt.error.is_some() || stmt.flags.dry_run {
            return;
        }
        match stmt.query_sql().await {
            Ok(rows) => {
                if let Err(err) = scan::scan_rows(stmt, &rows) {
                    stmt.add_error(err);
                }
            }
            Err(err) => stmt.add_error(err),
        }
    })
}

/// Render the SELECT for the statement into `stmt.sql`
pub(crate) fn build_query(stmt: &mut Statement) -> Result<(), OrmError> {
    stmt.check_select_omit()?;
    let schema = stmt.schema.clone();
    if let Some(schema) = &schema {
        helper::scope_soft_delete(stmt, &schema.query_clauses);
        if matches!(stmt.dest, Dest::Record(_)) {
            if let Some(condition) = helper::primary_conditions(stmt) {
                stmt.add_clause(Where::new(vec![condition]));
            }
        }
    }

    let mut joins = Vec::with_capacity(stmt.joins.len());
    let mut joined_columns = Vec::new();
    for request in stmt.joins.clone() {
        match request {
            JoinRequest::Raw(expr) => joins.push(Join::raw(expr)),
            JoinRequest::Relation { name, kind, on } => {
                let schema = schema.as_ref().ok_or_else(|| {
                    OrmError::user(format!("joining {name} needs a model"))
                })?;
                // `Manager.Company` joins hop by hop, aliased `Manager__Company`
                let hops: Vec<&str> = name.split('.').collect();
                let mut owner = Arc::clone(schema);
                let mut parent: Option<String> = None;
                for (idx, hop) in hops.iter().enumerate() {
                    let alias = hops[..=idx].join("__");
                    let on = if idx + 1 == hops.len() { on.clone() } else { Vec::new() };
                    let (join, columns, target) =
                        relation_join(stmt, &owner, hop, parent.as_deref(), &alias, kind, on)?;
                    joins.push(join);
                    joined_columns.extend(columns);
                    owner = target;
                    parent = Some(alias);
                }
            }
        }
    }

    if !stmt.clauses.contains_key("SELECT") {
        let qualify = !joins.is_empty();
        let column = |name: &str| {
            if qualify {
                Column::current(name)
            } else {
                Column::new(name)
            }
        };
        let mut select = Select {
            distinct: stmt.distinct,
            ..Select::default()
        };
        if stmt.has_explicit_selects() {
            for name in &stmt.selects {
                match schema.as_ref().and_then(|s| s.look_up_field(name)) {
                    Some(field) => select.columns.push(column(&field.db_name)),
                    None if schema.as_ref().and_then(|s| s.relationship(name)).is_some() => {}
                    None => select.columns.push(Column::raw(name.as_str())),
                }
            }
        } else if let Some(schema) = &schema {
            if stmt.flags.query_fields || qualify || !stmt.omits.is_empty() {
                select.columns = schema
                    .db_names
                    .iter()
                    .filter_map(|name| schema.fields_by_db_name.get(name))
                    .filter(|f| f.readable && stmt.field_selected(f))
                    .map(|f| column(&f.db_name))
                    .collect();
            }
        }
        if !select.columns.is_empty() {
            select.columns.extend(joined_columns);
        }
        stmt.add_clause(select);
    }

    stmt.add_clause(From {
        tables: Vec::new(),
        joins,
    });
    stmt.build(QUERY_CLAUSES);
    Ok(())
}

/// LEFT/INNER JOIN on a single-record relation of `schema`, aliased `alias`,
/// with its `alias__column` select list. `parent` is the alias of the
/// previous hop, `None` for the statement's own table.
fn relation_join(
    stmt: &Statement,
    schema: &Arc<Schema>,
    name: &str,
    parent: Option<&str>,
    alias: &str,
    kind: crate::clause::JoinType,
    on: Vec<Expr>,
) -> Result<(Join, Vec<Column>, Arc<Schema>), OrmError> {
    let (relation, resolved) = schema.resolve_relation(name, &stmt.engine.schemas)?;
    if relation.cardinality != Cardinality::One || resolved.kind == RelationKind::Many2Many {
        return Err(OrmError::UnsupportedRelation(format!(
            "cannot join {name}: only has-one and belongs-to relations can be joined"
        )));
    }
    let owner_column = |column: &str| match parent {
        Some(parent) => Column::new(column).of(parent),
        None => Column::current(column),
    };
    let mut conditions = Vec::with_capacity(resolved.references.len() + on.len());
    for reference in &resolved.references {
        let foreign = reference.foreign_key.db_name.as_str();
        match (&reference.primary_key, &reference.primary_value) {
            (_, Some(value)) => {
                conditions.push(Expr::eq(Column::new(foreign).of(alias), value.clone()));
            }
            (Some(primary), None) if reference.own_primary_key => conditions.push(Expr::eq(
                Column::new(foreign).of(alias),
                owner_column(primary.db_name.as_str()),
            )),
            (Some(primary), None) => conditions.push(Expr::eq(
                owner_column(foreign),
                Column::new(primary.db_name.as_str()).of(alias),
            )),
            (None, None) => {}
        }
    }
    conditions.extend(on);

    let target = &resolved.target;
    let columns = target
        .db_names
        .iter()
        .filter_map(|db| target.fields_by_db_name.get(db))
        .filter(|f| f.readable)
        .map(|f| {
            Column::new(f.db_name.as_str())
                .of(alias)
                .alias(format!("{alias}__{}", f.db_name))
        })
        .collect();
    let join = Join::new(kind, Table::new(target.table.as_str()).alias(alias), conditions);
    Ok((join, columns, Arc::clone(target)))
}
