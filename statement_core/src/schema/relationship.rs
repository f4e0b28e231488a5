//! Relationship descriptors
//!
//! Relationships hold the target's [`ModelRef`] rather than its schema, so
//! cyclic graphs (`User -> Orders -> User`) never form reference cycles.
//! Foreign keys are worked out on first use and memoised.

use crate::errors::OrmError;
use crate::model::{Model, ModelRef, Record};
use crate::schema::field::{normalize_tag_key, Field};
use crate::schema::{Schema, SchemaCache};
use heck::ToSnakeCase;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use type_mapping::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
    Many2Many,
}

/// Shape of the owning field: one nested record or a list of them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// A field that can hold zero or one related record
pub trait RelationSlot<T>: Send + Sync + 'static {
    fn slot(&self) -> Option<&T>;
    fn slot_mut(&mut self) -> Option<&mut T>;
    fn put(&mut self, value: T);
    fn clear(&mut self);
}

impl<T: Model> RelationSlot<T> for Option<T> {
    fn slot(&self) -> Option<&T> {
        self.as_ref()
    }
    fn slot_mut(&mut self) -> Option<&mut T> {
        self.as_mut()
    }
    fn put(&mut self, value: T) {
        *self = Some(value);
    }
    fn clear(&mut self) {
        *self = None;
    }
}

impl<T: Model> RelationSlot<T> for Option<Box<T>> {
    fn slot(&self) -> Option<&T> {
        self.as_deref()
    }
    fn slot_mut(&mut self) -> Option<&mut T> {
        self.as_deref_mut()
    }
    fn put(&mut self, value: T) {
        *self = Some(Box::new(value));
    }
    fn clear(&mut self) {
        *self = None;
    }
}

impl<T: Model> RelationSlot<T> for Box<T> {
    fn slot(&self) -> Option<&T> {
        Some(self)
    }
    fn slot_mut(&mut self) -> Option<&mut T> {
        Some(self)
    }
    fn put(&mut self, value: T) {
        **self = value;
    }
    fn clear(&mut self) {
        **self = T::default();
    }
}

impl<T: Model> RelationSlot<T> for T {
    fn slot(&self) -> Option<&T> {
        Some(self)
    }
    fn slot_mut(&mut self) -> Option<&mut T> {
        Some(self)
    }
    fn put(&mut self, value: T) {
        *self = value;
    }
    fn clear(&mut self) {
        *self = T::default();
    }
}

type RecordsFn = Arc<dyn for<'a> Fn(&'a dyn Any) -> Vec<&'a dyn Any> + Send + Sync>;
type RecordsMutFn = Arc<dyn for<'a> Fn(&'a mut dyn Any) -> Vec<&'a mut dyn Any> + Send + Sync>;
type ClearFn = Arc<dyn Fn(&mut dyn Any) + Send + Sync>;
type AttachFn = Arc<dyn Fn(&mut dyn Any, Record) -> bool + Send + Sync>;

/// Type-erased access to the related records held by a parent record
#[derive(Clone)]
pub(crate) struct RelationAccess {
    pub records: RecordsFn,
    pub records_mut: RecordsMutFn,
    pub clear: ClearFn,
    pub attach: AttachFn,
}

fn records_fn<F>(f: F) -> F
where
    F: for<'a> Fn(&'a dyn Any) -> Vec<&'a dyn Any>,
{
    f
}

fn records_mut_fn<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut dyn Any) -> Vec<&'a mut dyn Any>,
{
    f
}

/// Declared relation of a record type
#[derive(Clone)]
pub struct RelationDef {
    pub name: String,
    pub tags: Vec<(String, String)>,
    pub cardinality: Cardinality,
    pub target: ModelRef,
    pub(crate) access: RelationAccess,
}

impl RelationDef {
    /// A `Vec<T>` field
    pub fn many<M, T>(
        name: &str,
        tags: &[(&str, &str)],
        get: fn(&M) -> &Vec<T>,
        get_mut: fn(&mut M) -> &mut Vec<T>,
    ) -> Self
    where
        M: 'static,
        T: Model,
    {
        let access = RelationAccess {
            records: Arc::new(records_fn(move |record| match record.downcast_ref::<M>() {
                Some(m) => get(m).iter().map(|t| t as &dyn Any).collect(),
                None => Vec::new(),
            })),
            records_mut: Arc::new(records_mut_fn(move |record| {
                match record.downcast_mut::<M>() {
                    Some(m) => get_mut(m).iter_mut().map(|t| t as &mut dyn Any).collect(),
                    None => Vec::new(),
                }
            })),
            clear: Arc::new(move |record: &mut dyn Any| {
                if let Some(m) = record.downcast_mut::<M>() {
                    get_mut(m).clear();
                }
            }),
            attach: Arc::new(move |record: &mut dyn Any, related: Record| {
                match (record.downcast_mut::<M>(), related.downcast::<T>()) {
                    (Some(m), Ok(t)) => {
                        get_mut(m).push(*t);
                        true
                    }
                    _ => false,
                }
            }),
        };
        Self::declare::<T>(name, tags, Cardinality::Many, access)
    }

    /// An `Option<T>`, `Option<Box<T>>`, `Box<T>` or `T` field
    pub fn one<M, T, S>(
        name: &str,
        tags: &[(&str, &str)],
        get: fn(&M) -> &S,
        get_mut: fn(&mut M) -> &mut S,
    ) -> Self
    where
        M: 'static,
        T: Model,
        S: RelationSlot<T>,
    {
        let access = RelationAccess {
            records: Arc::new(records_fn(move |record| {
                match record.downcast_ref::<M>().and_then(|m| get(m).slot()) {
                    Some(t) => vec![t as &dyn Any],
                    None => Vec::new(),
                }
            })),
            records_mut: Arc::new(records_mut_fn(move |record| {
                match record.downcast_mut::<M>().and_then(|m| get_mut(m).slot_mut()) {
                    Some(t) => vec![t as &mut dyn Any],
                    None => Vec::new(),
                }
            })),
            clear: Arc::new(move |record: &mut dyn Any| {
                if let Some(m) = record.downcast_mut::<M>() {
                    get_mut(m).clear();
                }
            }),
            attach: Arc::new(move |record: &mut dyn Any, related: Record| {
                match (record.downcast_mut::<M>(), related.downcast::<T>()) {
                    (Some(m), Ok(t)) => {
                        get_mut(m).put(*t);
                        true
                    }
                    _ => false,
                }
            }),
        };
        Self::declare::<T>(name, tags, Cardinality::One, access)
    }

    fn declare<T: Model>(
        name: &str,
        tags: &[(&str, &str)],
        cardinality: Cardinality,
        access: RelationAccess,
    ) -> Self {
        Self {
            name: name.to_string(),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            cardinality,
            target: ModelRef::of::<T>(),
            access,
        }
    }
}

impl fmt::Debug for RelationDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationDef")
            .field("name", &self.name)
            .field("cardinality", &self.cardinality)
            .field("target", &self.target)
            .finish()
    }
}

/// One primary/foreign pairing of a relation
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// Field the value is read from; `None` when `primary_value` is fixed
    pub primary_key: Option<Arc<Field>>,
    /// Fixed discriminator written to the foreign side (polymorphic type)
    pub primary_value: Option<Value>,
    pub foreign_key: Arc<Field>,
    /// Whether the primary side belongs to the relation's owner
    pub own_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinColumn {
    pub column: String,
    pub references: Arc<Field>,
}

/// Join table of a many-to-many relation
#[derive(Debug, Clone, PartialEq)]
pub struct JoinTable {
    pub table: String,
    pub parent: Vec<JoinColumn>,
    pub target: Vec<JoinColumn>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Polymorphic {
    pub id_field: Arc<Field>,
    pub type_field: Arc<Field>,
    pub value: String,
}

/// Foreign-key layout of a relationship, resolved against both schemas
#[derive(Debug, Clone)]
pub struct ResolvedRelation {
    pub kind: RelationKind,
    pub target: Arc<Schema>,
    pub references: Vec<Reference>,
    pub join_table: Option<JoinTable>,
    pub polymorphic: Option<Polymorphic>,
}

impl ResolvedRelation {
    /// References read from the parent (primary) side
    pub fn owner_references(&self) -> impl Iterator<Item = &Reference> {
        self.references.iter().filter(|r| r.own_primary_key)
    }
}

pub struct Relationship {
    pub name: String,
    pub declared: Option<RelationKind>,
    pub cardinality: Cardinality,
    pub tags: BTreeMap<String, String>,
    pub target: ModelRef,
    pub(crate) access: RelationAccess,
    resolved: OnceLock<Arc<ResolvedRelation>>,
}

impl Relationship {
    pub(crate) fn from_def(def: RelationDef) -> Result<Self, OrmError> {
        let tags: BTreeMap<String, String> = def
            .tags
            .into_iter()
            .map(|(k, v)| (normalize_tag_key(&k), v.trim().to_string()))
            .collect();
        let declared = if tags.contains_key("many2many") || tags.contains_key("many_2_many") {
            Some(RelationKind::Many2Many)
        } else if tags.contains_key("belongs_to") {
            Some(RelationKind::BelongsTo)
        } else if tags.contains_key("has_one") {
            Some(RelationKind::HasOne)
        } else if tags.contains_key("has_many") {
            Some(RelationKind::HasMany)
        } else {
            None
        };
        match (declared, def.cardinality) {
            (Some(RelationKind::Many2Many | RelationKind::HasMany), Cardinality::One)
            | (Some(RelationKind::HasOne | RelationKind::BelongsTo), Cardinality::Many) => {
                return Err(OrmError::schema(format!(
                    "relation {} is declared {:?} on a {:?} field",
                    def.name,
                    declared,
                    def.cardinality
                )))
            }
            _ => {}
        }
        Ok(Self {
            name: def.name,
            declared,
            cardinality: def.cardinality,
            tags,
            target: def.target,
            access: def.access,
            resolved: OnceLock::new(),
        })
    }

    fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn related<'a>(&self, record: &'a dyn Any) -> Vec<&'a dyn Any> {
        (self.access.records)(record)
    }

    pub fn related_mut<'a>(&self, record: &'a mut dyn Any) -> Vec<&'a mut dyn Any> {
        (self.access.records_mut)(record)
    }

    pub fn clear(&self, record: &mut dyn Any) {
        (self.access.clear)(record)
    }

    /// Set (one) or append (many) a related record; false on a type mismatch
    pub fn attach(&self, record: &mut dyn Any, related: Record) -> bool {
        (self.access.attach)(record, related)
    }

    /// Work out the foreign keys against `parent` (the owning schema)
    pub fn resolve(
        &self,
        parent: &Schema,
        cache: &SchemaCache,
    ) -> Result<Arc<ResolvedRelation>, OrmError> {
        if let Some(resolved) = self.resolved.get() {
            return Ok(Arc::clone(resolved));
        }
        let target = self.target.schema(cache)?;
        let resolved = Arc::new(self.build(parent, target, cache)?);
        let _ = self.resolved.set(Arc::clone(&resolved));
        Ok(self.resolved.get().cloned().unwrap_or(resolved))
    }

    fn build(
        &self,
        parent: &Schema,
        target: Arc<Schema>,
        cache: &SchemaCache,
    ) -> Result<ResolvedRelation, OrmError> {
        match self.declared {
            Some(RelationKind::Many2Many) => self.many_to_many(parent, target, cache),
            Some(RelationKind::BelongsTo) => self.belongs_to(parent, target),
            Some(kind) => self.has(parent, target, kind, cache),
            None if self.cardinality == Cardinality::Many => {
                self.has(parent, target, RelationKind::HasMany, cache)
            }
            None => match self.belongs_to(parent, Arc::clone(&target)) {
                Ok(resolved) => Ok(resolved),
                Err(_) => self.has(parent, target, RelationKind::HasOne, cache),
            },
        }
    }

    fn invalid(&self, parent: &Schema, detail: &str) -> OrmError {
        OrmError::schema(format!(
            "invalid relation {}.{}: {detail}",
            parent.name, self.name
        ))
    }

    fn has(
        &self,
        parent: &Schema,
        target: Arc<Schema>,
        kind: RelationKind,
        cache: &SchemaCache,
    ) -> Result<ResolvedRelation, OrmError> {
        let naming = cache.naming();
        if let Some(owner) = self.tag("polymorphic") {
            let primary = self.primary_on(parent, self.tag("references"))?;
            let id_name = self
                .tag("polymorphic_id")
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}_id", owner.to_snake_case()));
            let type_name = self
                .tag("polymorphic_type")
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}_type", owner.to_snake_case()));
            let id_field = target
                .look_up_field(&id_name)
                .ok_or_else(|| self.invalid(parent, &format!("missing polymorphic field {id_name}")))?;
            let type_field = target.look_up_field(&type_name).ok_or_else(|| {
                self.invalid(parent, &format!("missing polymorphic field {type_name}"))
            })?;
            let value = self
                .tag("polymorphic_value")
                .map(str::to_string)
                .unwrap_or_else(|| parent.table.clone());
            return Ok(ResolvedRelation {
                kind,
                references: vec![
                    Reference {
                        primary_key: Some(primary),
                        primary_value: None,
                        foreign_key: Arc::clone(&id_field),
                        own_primary_key: true,
                    },
                    Reference {
                        primary_key: None,
                        primary_value: Some(Value::String(value.clone())),
                        foreign_key: Arc::clone(&type_field),
                        own_primary_key: true,
                    },
                ],
                target,
                join_table: None,
                polymorphic: Some(Polymorphic {
                    id_field,
                    type_field,
                    value,
                }),
            });
        }

        let primary = self.primary_on(parent, self.tag("references"))?;
        let foreign_name = self
            .tag("foreign_key")
            .map(str::to_string)
            .unwrap_or_else(|| naming.foreign_key(&parent.name, &primary.name));
        let foreign = target.look_up_field(&foreign_name).ok_or_else(|| {
            self.invalid(
                parent,
                &format!("foreign key {foreign_name} not found on {}", target.name),
            )
        })?;
        Ok(ResolvedRelation {
            kind,
            references: vec![Reference {
                primary_key: Some(primary),
                primary_value: None,
                foreign_key: foreign,
                own_primary_key: true,
            }],
            target,
            join_table: None,
            polymorphic: None,
        })
    }

    fn belongs_to(&self, parent: &Schema, target: Arc<Schema>) -> Result<ResolvedRelation, OrmError> {
        let primary = self.primary_on(&target, self.tag("references"))?;
        let foreign_name = self
            .tag("foreign_key")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_{}", self.name.to_snake_case(), primary.name));
        let foreign = parent.look_up_field(&foreign_name).ok_or_else(|| {
            self.invalid(
                parent,
                &format!("foreign key {foreign_name} not found on {}", parent.name),
            )
        })?;
        Ok(ResolvedRelation {
            kind: RelationKind::BelongsTo,
            references: vec![Reference {
                primary_key: Some(primary),
                primary_value: None,
                foreign_key: foreign,
                own_primary_key: false,
            }],
            target,
            join_table: None,
            polymorphic: None,
        })
    }

    fn many_to_many(
        &self,
        parent: &Schema,
        target: Arc<Schema>,
        cache: &SchemaCache,
    ) -> Result<ResolvedRelation, OrmError> {
        let naming = cache.naming();
        let table = match self.tag("many2many").or_else(|| self.tag("many_2_many")) {
            Some(name) => naming.join_table_name(name),
            None => naming.join_table_name(&format!("{}_{}", parent.name, self.name)),
        };
        let parent_keys = self.key_fields(parent, self.tag("foreign_key"))?;
        let target_keys = self.key_fields(&target, self.tag("references"))?;
        let self_referential = parent.type_id == target.type_id;

        let parent_columns = split_list(self.tag("join_foreign_key"));
        let target_columns = split_list(self.tag("join_references"));
        let join_parent = parent_keys
            .iter()
            .enumerate()
            .map(|(i, field)| JoinColumn {
                column: parent_columns
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| naming.foreign_key(&parent.name, &field.db_name)),
                references: Arc::clone(field),
            })
            .collect::<Vec<_>>();
        let join_target = target_keys
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let column = target_columns.get(i).cloned().unwrap_or_else(|| {
                    if self_referential {
                        let singular = pluralizer::pluralize(&self.name.to_snake_case(), 1, false);
                        naming.foreign_key(&singular, &field.db_name)
                    } else {
                        naming.foreign_key(&target.name, &field.db_name)
                    }
                });
                JoinColumn {
                    column,
                    references: Arc::clone(field),
                }
            })
            .collect::<Vec<_>>();
        if join_parent
            .iter()
            .any(|p| join_target.iter().any(|t| t.column == p.column))
        {
            return Err(self.invalid(parent, "join table columns collide"));
        }
        Ok(ResolvedRelation {
            kind: RelationKind::Many2Many,
            target,
            references: Vec::new(),
            join_table: Some(JoinTable {
                table,
                parent: join_parent,
                target: join_target,
            }),
            polymorphic: None,
        })
    }

    fn primary_on(&self, schema: &Schema, named: Option<&str>) -> Result<Arc<Field>, OrmError> {
        match named {
            Some(name) => schema.look_up_field(name).ok_or_else(|| {
                OrmError::schema(format!(
                    "relation {} references unknown field {name} on {}",
                    self.name, schema.name
                ))
            }),
            None => schema.prioritized_primary_field.clone().ok_or_else(|| {
                OrmError::schema(format!(
                    "relation {} needs a primary key on {}",
                    self.name, schema.name
                ))
            }),
        }
    }

    fn key_fields(&self, schema: &Schema, named: Option<&str>) -> Result<Vec<Arc<Field>>, OrmError> {
        match named {
            Some(list) => split_list(Some(list))
                .iter()
                .map(|name| self.primary_on(schema, Some(name)))
                .collect(),
            None if schema.primary_fields.is_empty() => Err(OrmError::schema(format!(
                "relation {} needs a primary key on {}",
                self.name, schema.name
            ))),
            None => Ok(schema.primary_fields.clone()),
        }
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

impl fmt::Debug for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relationship")
            .field("name", &self.name)
            .field("declared", &self.declared)
            .field("cardinality", &self.cardinality)
            .field("target", &self.target)
            .finish()
    }
}

impl PartialEq for Relationship {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.declared == other.declared
            && self.cardinality == other.cardinality
            && self.tags == other.tags
            && self.target == other.target
    }
}
