//! Preload stage
//!
//! After the main query, each requested relation is loaded with one extra
//! query (two for many-to-many) and attached to its parents. Parents keep
//! nothing from an earlier load: the relation field is cleared before the
//! fresh records are attached, so preloading twice yields the same result.

use crate::association::utils::{distinct_keys, identity, in_condition, key_of};
use crate::clause::Column;
use crate::errors::OrmError;
use crate::model::{Dest, Record, Row};
use crate::schema::{Field, RelationKind, Schema};
use crate::session::Session;
use crate::statement::{Preload, Statement, ASSOCIATIONS};
use futures::future::BoxFuture;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use type_mapping::Value;

pub(crate) fn preload(stmt: &mut Statement) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        if stmt.error.is_some()
            || stmt.flags.dry_run
            || stmt.preloads.is_empty()
            || !stmt.dest.has_records()
        {
            return;
        }
        let schema = match stmt.dest_schema() {
            Ok(Some(schema)) => schema,
            Ok(None) => return,
            Err(err) => {
                stmt.add_error(err);
                return;
            }
        };

        let mut dest = std::mem::take(&mut stmt.dest);
        for (name, (own, nested)) in group_paths(&schema, &stmt.preloads) {
            if let Err(err) = preload_relation(stmt, &schema, &mut dest, &name, own, nested).await {
                stmt.add_error(err);
                break;
            }
        }
        stmt.dest = dest;
    })
}

/// Split `A.B.C` paths by their first segment; `*` stands for every relation
fn group_paths(
    schema: &Schema,
    preloads: &IndexMap<String, Preload>,
) -> IndexMap<String, (Preload, IndexMap<String, Preload>)> {
    let mut groups: IndexMap<String, (Preload, IndexMap<String, Preload>)> = IndexMap::new();
    for (path, preload) in preloads {
        if path == ASSOCIATIONS || path == "*" {
            for name in schema.relationships.keys() {
                groups.entry(name.clone()).or_default();
            }
            continue;
        }
        match path.split_once('.') {
            Some((head, rest)) => {
                groups
                    .entry(head.to_string())
                    .or_default()
                    .1
                    .insert(rest.to_string(), preload.clone());
            }
            None => groups.entry(path.clone()).or_default().0 = preload.clone(),
        }
    }
    groups
}

/// Columns the parent is matched on, and the matching fields of the target
struct KeyLayout {
    parent_fields: Vec<Arc<Field>>,
    target_fields: Vec<Arc<Field>>,
    fixed: Vec<(Arc<Field>, Value)>,
}

async fn preload_relation(
    stmt: &Statement,
    schema: &Arc<Schema>,
    dest: &mut Dest,
    name: &str,
    own: Preload,
    nested: IndexMap<String, Preload>,
) -> Result<(), OrmError> {
    let (relation, resolved) = schema.resolve_relation(name, &stmt.engine.schemas)?;
    let target = Arc::clone(&resolved.target);

    let mut layout = KeyLayout {
        parent_fields: Vec::new(),
        target_fields: Vec::new(),
        fixed: Vec::new(),
    };
    let join_table = match resolved.kind {
        RelationKind::Many2Many => {
            let join_table = resolved.join_table.clone().ok_or_else(|| {
                OrmError::schema(format!("relation {name} has no join table"))
            })?;
            layout.parent_fields = join_table.parent.iter().map(|c| Arc::clone(&c.references)).collect();
            layout.target_fields = join_table.target.iter().map(|c| Arc::clone(&c.references)).collect();
            Some(join_table)
        }
        RelationKind::BelongsTo => {
            for reference in &resolved.references {
                let primary = reference.primary_key.clone().ok_or(OrmError::PrimaryKeyRequired)?;
                layout.parent_fields.push(Arc::clone(&reference.foreign_key));
                layout.target_fields.push(primary);
            }
            None
        }
        RelationKind::HasOne | RelationKind::HasMany => {
            for reference in &resolved.references {
                match (&reference.primary_key, &reference.primary_value) {
                    (_, Some(value)) => layout
                        .fixed
                        .push((Arc::clone(&reference.foreign_key), value.clone())),
                    (Some(primary), None) => {
                        layout.parent_fields.push(Arc::clone(primary));
                        layout.target_fields.push(Arc::clone(&reference.foreign_key));
                    }
                    (None, None) => {}
                }
            }
            None
        }
    };

    let parent_keys: Vec<Option<Vec<Value>>> = dest
        .record_refs()
        .into_iter()
        .map(|record| key_of(&layout.parent_fields, record))
        .collect();
    let keys = distinct_keys(parent_keys.iter().flatten().cloned());
    if keys.is_empty() {
        for parent in dest.record_muts() {
            relation.clear(parent);
        }
        return Ok(());
    }

    // many-to-many: parent identity -> target identities, from the join table
    let mut links: HashMap<String, Vec<String>> = HashMap::new();
    let target_keys = match &join_table {
        Some(join_table) => {
            let parent_columns: Vec<Column> = join_table
                .parent
                .iter()
                .map(|c| Column::new(c.column.as_str()))
                .collect();
            let mut rows: Vec<Row> = Vec::new();
            Session::from_statement(stmt.fork())
                .table(&join_table.table)
                .where_expr(in_condition(&parent_columns, &keys))
                .find(&mut rows)
                .await?;
            let mut target_keys = Vec::with_capacity(rows.len());
            for row in &rows {
                let read = |columns: &[crate::schema::JoinColumn]| -> Vec<Value> {
                    columns
                        .iter()
                        .map(|c| row.get(&c.column).cloned().unwrap_or(Value::Null))
                        .collect()
                };
                let parent_key = read(&join_table.parent);
                let target_key = read(&join_table.target);
                links
                    .entry(identity(&parent_key))
                    .or_default()
                    .push(identity(&target_key));
                target_keys.push(target_key);
            }
            distinct_keys(target_keys)
        }
        None => keys,
    };

    let records = if target_keys.is_empty() {
        Vec::new()
    } else {
        let target_columns: Vec<Column> = layout
            .target_fields
            .iter()
            .map(|f| Column::current(f.db_name.as_str()))
            .collect();
        let mut session = Session::from_statement(stmt.fork())
            .where_expr(in_condition(&target_columns, &target_keys));
        for (field, value) in &layout.fixed {
            session = session.where_expr(crate::clause::Expr::eq(
                Column::current(field.db_name.as_str()),
                value.clone(),
            ));
        }
        for condition in own.conditions {
            session = session.where_expr(condition);
        }
        if let Some(scope) = &own.scope {
            session = scope(session);
        }
        session.stmt.preloads.extend(nested);
        session.find_records(target.model).await?
    };

    let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        if let Some(key) = key_of(&layout.target_fields, record.as_ref()) {
            by_key.entry(identity(&key)).or_default().push(idx);
        }
    }

    for (parent, key) in dest.record_muts().into_iter().zip(parent_keys) {
        relation.clear(parent);
        let Some(key) = key else {
            continue;
        };
        let parent_identity = identity(&key);
        let target_identities = match &join_table {
            Some(_) => links.get(&parent_identity).cloned().unwrap_or_default(),
            None => vec![parent_identity],
        };
        for target_identity in target_identities {
            for &idx in by_key.get(&target_identity).into_iter().flatten() {
                if let Some(copy) = target.clone_record(records[idx].as_ref()) {
                    attach(&relation, parent, copy);
                }
            }
        }
    }
    Ok(())
}

fn attach(relation: &crate::schema::Relationship, parent: &mut dyn std::any::Any, record: Record) {
    if !relation.attach(parent, record) {
        tracing::warn!("preloaded record does not fit relation {}", relation.name);
    }
}
