//! Saving and deleting associated records
//!
//! Belongs-to targets are upserted before the owner so their keys can be
//! copied into it; has-one, has-many and many-to-many targets are upserted
//! after it with the owner's key written into them. Each nested statement
//! runs on the owner's connection, so it shares the owner's transaction.

use crate::association::utils::{copy_fields, distinct_keys, in_condition, key_of, record_is_zero};
use crate::callbacks::CallbackKind;
use crate::clause::{Column, Expr, OnConflict};
use crate::errors::OrmError;
use crate::model::{Dest, Record, Row};
use crate::schema::{RelationKind, Relationship, ResolvedRelation, Schema};
use crate::session::Session;
use crate::statement::{Statement, ASSOCIATIONS};
use futures::future::BoxFuture;
use std::sync::Arc;
use type_mapping::Value;

/// Nested record copied out of its owner: (copy, owner index, position)
type Pending = Vec<(Record, usize, usize)>;

pub(crate) fn save_before_associations(stmt: &mut Statement) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        if let Err(err) = save(stmt, true).await {
            stmt.add_error(err);
        }
    })
}

pub(crate) fn save_after_associations(stmt: &mut Statement) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        if let Err(err) = save(stmt, false).await {
            stmt.add_error(err);
        }
    })
}

async fn save(stmt: &mut Statement, before: bool) -> Result<(), OrmError> {
    if stmt.error.is_some() || stmt.flags.dry_run || !stmt.dest.has_records() {
        return Ok(());
    }
    let Some(schema) = stmt.schema.clone() else {
        return Ok(());
    };
    for name in schema.relationships.keys() {
        if !stmt.relation_selected(name) {
            continue;
        }
        let (relation, resolved) = schema.resolve_relation(name, &stmt.engine.schemas)?;
        match (resolved.kind, before) {
            (RelationKind::BelongsTo, true) => save_belongs_to(stmt, &relation, &resolved).await?,
            (RelationKind::HasOne | RelationKind::HasMany, false) => {
                save_has(stmt, &relation, &resolved).await?
            }
            (RelationKind::Many2Many, false) => save_many2many(stmt, &relation, &resolved).await?,
            _ => {}
        }
    }
    Ok(())
}

/// Copy the non-empty nested records out of the owners
fn pending(stmt: &Statement, relation: &Relationship, target: &Schema) -> Pending {
    let mut out = Vec::new();
    for (owner, record) in stmt.dest.record_refs().into_iter().enumerate() {
        for (pos, child) in relation.related(record).into_iter().enumerate() {
            if record_is_zero(target, child) {
                continue;
            }
            if let Some(copy) = target.clone_record(child) {
                out.push((copy, owner, pos));
            }
        }
    }
    out
}

fn conflict_policy(stmt: &Statement, target: &Schema, update: &[String]) -> OnConflict {
    let columns: Vec<Column> = target
        .primary_fields
        .iter()
        .map(|f| Column::new(f.db_name.as_str()))
        .collect();
    if stmt.flags.full_save_associations {
        return OnConflict {
            columns,
            update_all: true,
            ..OnConflict::default()
        };
    }
    if update.is_empty() {
        return OnConflict {
            columns,
            do_nothing: true,
            ..OnConflict::default()
        };
    }
    OnConflict::update_columns(columns, update)
}

/// Upsert `records` of `target` in a nested statement and hand them back
async fn upsert(
    stmt: &Statement,
    target: &Schema,
    records: Vec<Record>,
    conflict: OnConflict,
) -> Result<Vec<Record>, OrmError> {
    let session = Session::from_statement(stmt.fork()).clauses(conflict);
    let (dest, result) = session
        .run_dest(CallbackKind::Create, Dest::Records(records), Some(target.model))
        .await;
    result?;
    match dest {
        Dest::Records(records) => Ok(records),
        other => Err(OrmError::user(format!(
            "association save returned a {:?} destination",
            other.kind()
        ))),
    }
}

/// Write the saved copies back over the nested records they came from
fn write_back(
    stmt: &mut Statement,
    relation: &Relationship,
    target: &Schema,
    saved: &[Record],
    positions: &[(usize, usize)],
) -> Result<(), OrmError> {
    let mut owners = stmt.dest.record_muts();
    for (copy, &(owner, pos)) in saved.iter().zip(positions) {
        let Some(record) = owners.get_mut(owner) else {
            continue;
        };
        if let Some(child) = relation.related_mut(&mut **record).into_iter().nth(pos) {
            copy_fields(target, copy.as_ref(), child)?;
        }
    }
    Ok(())
}

async fn save_belongs_to(
    stmt: &mut Statement,
    relation: &Relationship,
    resolved: &ResolvedRelation,
) -> Result<(), OrmError> {
    let target = Arc::clone(&resolved.target);
    let pending = pending(stmt, relation, &target);
    if pending.is_empty() {
        return Ok(());
    }
    let positions: Vec<(usize, usize)> = pending.iter().map(|(_, o, p)| (*o, *p)).collect();
    let records = pending.into_iter().map(|(r, _, _)| r).collect();
    let conflict = conflict_policy(stmt, &target, &[]);
    let saved = upsert(stmt, &target, records, conflict).await?;

    write_back(stmt, relation, &target, &saved, &positions)?;
    let mut owners = stmt.dest.record_muts();
    for (copy, &(owner, _)) in saved.iter().zip(&positions) {
        let Some(record) = owners.get_mut(owner) else {
            continue;
        };
        for reference in &resolved.references {
            if let Some(primary) = &reference.primary_key {
                let (value, _) = primary.value_of(copy.as_ref());
                reference.foreign_key.set(&mut **record, value)?;
            }
        }
    }
    Ok(())
}

async fn save_has(
    stmt: &mut Statement,
    relation: &Relationship,
    resolved: &ResolvedRelation,
) -> Result<(), OrmError> {
    let target = Arc::clone(&resolved.target);
    let mut pending = pending(stmt, relation, &target);
    if pending.is_empty() {
        return Ok(());
    }
    {
        let owners = stmt.dest.record_refs();
        for (copy, owner, _) in pending.iter_mut() {
            let Some(owner) = owners.get(*owner) else {
                continue;
            };
            for reference in &resolved.references {
                let value = match (&reference.primary_value, &reference.primary_key) {
                    (Some(value), _) => value.clone(),
                    (None, Some(primary)) => primary.value_of(*owner).0,
                    (None, None) => continue,
                };
                reference.foreign_key.set(copy.as_mut(), value)?;
            }
        }
    }
    let foreign: Vec<String> = resolved
        .references
        .iter()
        .map(|r| r.foreign_key.db_name.clone())
        .collect();
    let positions: Vec<(usize, usize)> = pending.iter().map(|(_, o, p)| (*o, *p)).collect();
    let records = pending.into_iter().map(|(r, _, _)| r).collect();
    let conflict = conflict_policy(stmt, &target, &foreign);
    let saved = upsert(stmt, &target, records, conflict).await?;
    write_back(stmt, relation, &target, &saved, &positions)
}

async fn save_many2many(
    stmt: &mut Statement,
    relation: &Relationship,
    resolved: &ResolvedRelation,
) -> Result<(), OrmError> {
    let target = Arc::clone(&resolved.target);
    let join_table = resolved
        .join_table
        .clone()
        .ok_or_else(|| OrmError::schema(format!("relation {} has no join table", relation.name)))?;
    let pending = pending(stmt, relation, &target);
    if pending.is_empty() {
        return Ok(());
    }
    let positions: Vec<(usize, usize)> = pending.iter().map(|(_, o, p)| (*o, *p)).collect();
    let records = pending.into_iter().map(|(r, _, _)| r).collect();
    let conflict = conflict_policy(stmt, &target, &[]);
    let saved = upsert(stmt, &target, records, conflict).await?;
    write_back(stmt, relation, &target, &saved, &positions)?;

    let rows: Vec<Row> = {
        let owners = stmt.dest.record_refs();
        saved
            .iter()
            .zip(&positions)
            .filter_map(|(copy, &(owner, _))| {
                let owner = owners.get(owner)?;
                let mut row = Row::new();
                for column in &join_table.parent {
                    row.insert(column.column.clone(), column.references.value_of(*owner).0);
                }
                for column in &join_table.target {
                    row.insert(column.column.clone(), column.references.value_of(copy.as_ref()).0);
                }
                Some(row)
            })
            .collect()
    };
    let session = Session::from_statement(stmt.fork())
        .table(&join_table.table)
        .clauses(OnConflict {
            columns: join_table
                .parent
                .iter()
                .chain(&join_table.target)
                .map(|c| Column::new(c.column.as_str()))
                .collect(),
            do_nothing: true,
            ..OnConflict::default()
        });
    let (_, result) = session.run_dest(CallbackKind::Create, Dest::Maps(rows), None).await;
    result.map(|_| ())
}

/// Delete the associations named in the select list along with the owners
pub(crate) fn delete_before_associations(stmt: &mut Statement) -> BoxFuture<'_, ()> {
    Box::pin(async move {
        if let Err(err) = delete_associations(stmt).await {
            stmt.add_error(err);
        }
    })
}

async fn delete_associations(stmt: &mut Statement) -> Result<(), OrmError> {
    if stmt.error.is_some() || stmt.flags.dry_run || !stmt.dest.has_records() {
        return Ok(());
    }
    let Some(schema) = stmt.schema.clone() else {
        return Ok(());
    };
    let names: Vec<String> = schema
        .relationships
        .keys()
        .filter(|name| {
            stmt.selects.iter().any(|s| s == *name || s == ASSOCIATIONS)
                && !stmt.omits.iter().any(|o| o == *name)
        })
        .cloned()
        .collect();

    for name in names {
        let (_, resolved) = schema.resolve_relation(&name, &stmt.engine.schemas)?;
        let mut session = Session::from_statement(stmt.fork());
        session.stmt.flags.unscoped = stmt.flags.unscoped;
        let condition = match resolved.kind {
            RelationKind::BelongsTo => continue,
            RelationKind::HasOne | RelationKind::HasMany => {
                let mut conditions = Vec::new();
                let mut parent_fields = Vec::new();
                let mut columns = Vec::new();
                for reference in &resolved.references {
                    match (&reference.primary_value, &reference.primary_key) {
                        (Some(value), _) => conditions.push(Expr::eq(
                            Column::current(reference.foreign_key.db_name.as_str()),
                            value.clone(),
                        )),
                        (None, Some(primary)) => {
                            parent_fields.push(Arc::clone(primary));
                            columns.push(Column::current(reference.foreign_key.db_name.as_str()));
                        }
                        (None, None) => {}
                    }
                }
                let keys = owner_keys(stmt, &parent_fields);
                if keys.is_empty() {
                    continue;
                }
                session.stmt.model = Some(resolved.target.model);
                conditions.push(in_condition(&columns, &keys));
                Expr::and(conditions)
            }
            RelationKind::Many2Many => {
                let Some(join_table) = &resolved.join_table else {
                    continue;
                };
                let parent_fields: Vec<_> = join_table.parent.iter().map(|c| Arc::clone(&c.references)).collect();
                let columns: Vec<Column> = join_table.parent.iter().map(|c| Column::new(c.column.as_str())).collect();
                let keys = owner_keys(stmt, &parent_fields);
                if keys.is_empty() {
                    continue;
                }
                session = session.table(&join_table.table);
                in_condition(&columns, &keys)
            }
        };
        session.where_expr(condition).delete_where().await?;
    }
    Ok(())
}

fn owner_keys(stmt: &Statement, fields: &[Arc<crate::schema::Field>]) -> Vec<Vec<Value>> {
    distinct_keys(
        stmt.dest
            .record_refs()
            .into_iter()
            .filter_map(|record| key_of(fields, record)),
    )
}
