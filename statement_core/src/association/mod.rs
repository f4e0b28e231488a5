//! Association mode: operate on one relationship of a loaded record
//!
//! ```ignore
//! let mut user: User = ...;
//! db.association(&mut user, "Languages")?
//!     .append(vec![Language::new("de")])
//!     .await?;
//! ```
//!
//! Links are written the way saving a record with its associations writes
//! them: belongs-to keys live on the owner, has-one/has-many keys on the
//! targets and many-to-many links in the join table. Unlinking nulls the
//! foreign keys or deletes the join rows; target rows are never deleted.

pub(crate) mod utils;

use crate::clause::{Arg, Column, Expr};
use crate::errors::OrmError;
use crate::model::{Dest, Destination, Model, ModelRef, Record, Row};
use crate::schema::{Cardinality, Field, JoinTable, RelationKind, Relationship, ResolvedRelation, Schema};
use crate::session::{Executed, Session};
use crate::stages::associations;
use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;
use type_mapping::Value;
use utils::{distinct_keys, identity, in_condition, key_of};

pub struct Association<'a, M: Model> {
    session: Session,
    owner: &'a mut M,
    schema: Arc<Schema>,
    relation: Arc<Relationship>,
    resolved: Arc<ResolvedRelation>,
}

impl Session {
    /// Association mode over relation `name` of `owner`, which must carry
    /// its primary key
    pub fn association<'a, M: Model>(
        &self,
        owner: &'a mut M,
        name: &str,
    ) -> Result<Association<'a, M>, OrmError> {
        let schema = ModelRef::of::<M>().schema(&self.stmt.engine.schemas)?;
        let (relation, resolved) = schema.resolve_relation(name, &self.stmt.engine.schemas)?;
        if schema.primary_is_zero(&*owner) {
            return Err(OrmError::PrimaryKeyRequired);
        }
        let mut session = Session::from_statement(self.stmt.fork());
        session.stmt.flags.unscoped = self.stmt.flags.unscoped;
        Ok(Association {
            session,
            owner,
            schema,
            relation,
            resolved,
        })
    }
}

impl<M: Model> Association<'_, M> {
    pub fn kind(&self) -> RelationKind {
        self.resolved.kind
    }

    /// Load the linked records into `dest`; nothing linked leaves it as is
    pub async fn find<D: Destination>(&self, dest: &mut D) -> Result<Executed, OrmError> {
        let Some(condition) = self.target_condition().await? else {
            return Ok(Executed::default());
        };
        self.target_session().where_expr(condition).find(dest).await
    }

    pub async fn count(&self, count: &mut i64) -> Result<Executed, OrmError> {
        let Some(condition) = self.target_condition().await? else {
            *count = 0;
            return Ok(Executed::default());
        };
        self.target_session().where_expr(condition).count(count).await
    }

    /// Save `records` and link them to the owner, keeping existing links
    pub async fn append<T: Model>(&mut self, records: Vec<T>) -> Result<(), OrmError> {
        self.check_target::<T>()?;
        if records.is_empty() {
            return Ok(());
        }
        let one = self.relation.cardinality == Cardinality::One;
        if one && records.len() > 1 {
            return Err(OrmError::user(format!(
                "relation {} holds a single record, got {}",
                self.relation.name,
                records.len()
            )));
        }

        let mut copy = self.owner.clone();
        self.relation.clear(&mut copy);
        for record in records {
            self.relation.attach(&mut copy, Box::new(record));
        }
        let copy = self.save_links(copy).await?;

        let added: Vec<Record> = self
            .relation
            .related(&copy)
            .into_iter()
            .filter_map(|r| self.resolved.target.clone_record(r))
            .collect();
        if one {
            self.relation.clear(&mut *self.owner);
        }
        for record in added {
            self.relation.attach(&mut *self.owner, record);
        }

        if self.resolved.kind == RelationKind::BelongsTo {
            let mut columns = Vec::with_capacity(self.resolved.references.len());
            for reference in &self.resolved.references {
                let (value, _) = reference.foreign_key.value_of(&copy);
                reference.foreign_key.set(&mut *self.owner, value.clone())?;
                columns.push((reference.foreign_key.db_name.clone(), value));
            }
            self.update_owner(columns).await?;
        }
        Ok(())
    }

    /// Link exactly `records`, unlinking everything else
    pub async fn replace<T: Model>(&mut self, records: Vec<T>) -> Result<(), OrmError> {
        self.check_target::<T>()?;
        if records.is_empty() {
            return self.clear().await;
        }
        self.relation.clear(&mut *self.owner);
        self.append(records).await?;
        if self.resolved.kind == RelationKind::BelongsTo {
            return Ok(());
        }
        let fields = self.target_key_fields()?;
        let kept = distinct_keys(
            self.relation
                .related(&*self.owner)
                .into_iter()
                .filter_map(|r| key_of(&fields, r)),
        );
        self.unlink(&kept, true).await?;
        Ok(())
    }

    /// Unlink `records` from the owner
    pub async fn delete<T: Model>(&mut self, records: &[T]) -> Result<(), OrmError> {
        self.check_target::<T>()?;
        let fields = self.target_key_fields()?;
        let keys = distinct_keys(records.iter().filter_map(|r| key_of(&fields, r as &dyn Any)));
        if keys.is_empty() {
            return Ok(());
        }
        if self.resolved.kind == RelationKind::BelongsTo {
            let current: Vec<Value> = self
                .resolved
                .references
                .iter()
                .filter(|r| r.primary_key.is_some())
                .map(|r| r.foreign_key.value_of(&*self.owner).0)
                .collect();
            if keys.iter().any(|k| identity(k) == identity(&current)) {
                self.clear().await?;
            }
            return Ok(());
        }

        self.unlink(&keys, false).await?;
        let removed: HashSet<String> = keys.iter().map(|k| identity(k)).collect();
        let remaining: Vec<Record> = self
            .relation
            .related(&*self.owner)
            .into_iter()
            .filter(|r| key_of(&fields, *r).map_or(true, |k| !removed.contains(&identity(&k))))
            .filter_map(|r| self.resolved.target.clone_record(r))
            .collect();
        self.relation.clear(&mut *self.owner);
        for record in remaining {
            self.relation.attach(&mut *self.owner, record);
        }
        Ok(())
    }

    /// Unlink every record
    pub async fn clear(&mut self) -> Result<(), OrmError> {
        if self.resolved.kind == RelationKind::BelongsTo {
            let blank = self.schema.new_record();
            let mut columns = Vec::new();
            for reference in self.resolved.references.iter().filter(|r| r.primary_key.is_some()) {
                let (zero, _) = reference.foreign_key.value_of(blank.as_ref());
                reference.foreign_key.set(&mut *self.owner, zero)?;
                columns.push((reference.foreign_key.db_name.clone(), Value::Null));
            }
            self.update_owner(columns).await?;
        } else {
            self.unlink(&[], true).await?;
        }
        self.relation.clear(&mut *self.owner);
        Ok(())
    }

    fn check_target<T: Model>(&self) -> Result<(), OrmError> {
        if ModelRef::of::<T>().type_id != self.resolved.target.type_id {
            return Err(OrmError::user(format!(
                "relation {} holds {}, not {}",
                self.relation.name,
                self.resolved.target.name,
                std::any::type_name::<T>()
            )));
        }
        Ok(())
    }

    fn target_session(&self) -> Session {
        let mut session = self.session.clone();
        session.stmt.model = Some(self.resolved.target.model);
        session
    }

    fn join_table(&self) -> Result<&JoinTable, OrmError> {
        self.resolved
            .join_table
            .as_ref()
            .ok_or_else(|| OrmError::schema(format!("relation {} has no join table", self.relation.name)))
    }

    /// Target fields identifying a link: the referenced key for belongs-to
    /// and many-to-many, the primary key otherwise
    fn target_key_fields(&self) -> Result<Vec<Arc<Field>>, OrmError> {
        Ok(match self.resolved.kind {
            RelationKind::BelongsTo => self
                .resolved
                .references
                .iter()
                .filter_map(|r| r.primary_key.clone())
                .collect(),
            RelationKind::Many2Many => self
                .join_table()?
                .target
                .iter()
                .map(|c| Arc::clone(&c.references))
                .collect(),
            RelationKind::HasOne | RelationKind::HasMany => self.resolved.target.primary_fields.clone(),
        })
    }

    /// `target.fk = owner.pk` (plus the polymorphic type) for has relations
    fn has_conditions(&self) -> Vec<Expr> {
        self.resolved
            .references
            .iter()
            .filter_map(|reference| {
                let value = match (&reference.primary_value, &reference.primary_key) {
                    (Some(value), _) => value.clone(),
                    (None, Some(primary)) => primary.value_of(&*self.owner).0,
                    (None, None) => return None,
                };
                Some(Expr::eq(
                    Column::current(reference.foreign_key.db_name.as_str()),
                    value,
                ))
            })
            .collect()
    }

    fn join_parent_condition(&self, join_table: &JoinTable) -> Expr {
        Expr::and(
            join_table
                .parent
                .iter()
                .map(|c| Expr::eq(Column::new(c.column.as_str()), c.references.value_of(&*self.owner).0))
                .collect(),
        )
    }

    /// Condition selecting the linked targets; `None` when nothing is linked
    async fn target_condition(&self) -> Result<Option<Expr>, OrmError> {
        match self.resolved.kind {
            RelationKind::BelongsTo => {
                let mut conditions = Vec::new();
                for reference in &self.resolved.references {
                    let Some(primary) = &reference.primary_key else {
                        continue;
                    };
                    let (value, zero) = reference.foreign_key.value_of(&*self.owner);
                    if zero {
                        return Ok(None);
                    }
                    conditions.push(Expr::eq(Column::current(primary.db_name.as_str()), value));
                }
                Ok(Some(Expr::and(conditions)))
            }
            RelationKind::HasOne | RelationKind::HasMany => Ok(Some(Expr::and(self.has_conditions()))),
            RelationKind::Many2Many => {
                let join_table = self.join_table()?;
                let condition = self.join_parent_condition(join_table);
                let mut rows: Vec<Row> = Vec::new();
                self.session
                    .clone()
                    .table(&join_table.table)
                    .where_expr(condition)
                    .find(&mut rows)
                    .await?;
                let keys = distinct_keys(rows.iter().filter_map(|row| {
                    join_table
                        .target
                        .iter()
                        .map(|c| row.get(&c.column).cloned())
                        .collect::<Option<Vec<Value>>>()
                }));
                if keys.is_empty() {
                    return Ok(None);
                }
                let columns: Vec<Column> = join_table
                    .target
                    .iter()
                    .map(|c| Column::current(c.references.db_name.as_str()))
                    .collect();
                Ok(Some(in_condition(&columns, &keys)))
            }
        }
    }

    /// Run the association save stages for the relation on `copy`
    async fn save_links(&self, copy: M) -> Result<M, OrmError> {
        let mut stmt = self.session.stmt.fork();
        stmt.model = Some(ModelRef::of::<M>());
        stmt.parse_model()?;
        stmt.selects = vec![self.relation.name.clone()];
        stmt.dest = Dest::record(copy);
        associations::save_before_associations(&mut stmt).await;
        associations::save_after_associations(&mut stmt).await;
        if let Some(err) = stmt.error.take() {
            return Err(err);
        }
        std::mem::take(&mut stmt.dest).into_record()
    }

    /// UPDATE columns of the owner row, matched by its primary key
    async fn update_owner(&self, columns: Vec<(String, Value)>) -> Result<(), OrmError> {
        if columns.is_empty() {
            return Ok(());
        }
        let condition = Expr::and(
            self.schema
                .primary_fields
                .iter()
                .map(|f| Expr::eq(Column::current(f.db_name.as_str()), f.value_of(&*self.owner).0))
                .collect(),
        );
        let mut session = self.session.clone();
        session.stmt.model = Some(ModelRef::of::<M>());
        session
            .where_expr(condition)
            .update_columns(columns.into_iter().map(|(k, v)| (k, Arg::Value(v))))
            .await?;
        Ok(())
    }

    /// Unlink targets whose key is in `keys`, or not in `keys` when `except`
    /// is set (an empty `keys` with `except` unlinks everything)
    async fn unlink(&self, keys: &[Vec<Value>], except: bool) -> Result<u64, OrmError> {
        if keys.is_empty() && !except {
            return Ok(0);
        }
        let filter = |columns: &[Column]| -> Option<Expr> {
            if keys.is_empty() {
                return None;
            }
            let condition = in_condition(columns, keys);
            Some(if except {
                Expr::not(vec![condition])
            } else {
                condition
            })
        };

        let executed = match self.resolved.kind {
            RelationKind::BelongsTo => return Ok(0),
            RelationKind::HasOne | RelationKind::HasMany => {
                let mut conditions = self.has_conditions();
                let columns: Vec<Column> = self
                    .resolved
                    .target
                    .primary_fields
                    .iter()
                    .map(|f| Column::current(f.db_name.as_str()))
                    .collect();
                conditions.extend(filter(&columns));
                let nulls: Vec<(String, Arg)> = self
                    .resolved
                    .references
                    .iter()
                    .filter(|r| r.primary_key.is_some())
                    .map(|r| (r.foreign_key.db_name.clone(), Arg::Value(Value::Null)))
                    .collect();
                self.target_session()
                    .where_expr(Expr::and(conditions))
                    .update_columns(nulls)
                    .await?
            }
            RelationKind::Many2Many => {
                let join_table = self.join_table()?;
                let mut conditions = vec![self.join_parent_condition(join_table)];
                let columns: Vec<Column> = join_table
                    .target
                    .iter()
                    .map(|c| Column::new(c.column.as_str()))
                    .collect();
                conditions.extend(filter(&columns));
                self.session
                    .clone()
                    .table(&join_table.table)
                    .where_expr(Expr::and(conditions))
                    .delete_where()
                    .await?
            }
        };
        Ok(executed.rows_affected)
    }
}
