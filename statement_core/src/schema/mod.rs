//! Schema reflector
//!
//! Turns the [`ModelDef`] emitted by `#[derive(Model)]` into a [`Schema`]:
//! parsed fields, primary keys, database defaults, indexes and lazily
//! resolved relationships. Schemas are memoised per record type in a
//! [`SchemaCache`]; the first parse wins and later parses observe it.

pub mod field;
pub mod index;
pub mod naming;
pub mod relationship;

pub use field::{Field, FieldDef, TimeUnit};
pub use index::Index;
pub use naming::NamingStrategy;
pub use relationship::{
    Cardinality, JoinColumn, JoinTable, Polymorphic, Reference, RelationDef, RelationKind,
    RelationSlot, Relationship, ResolvedRelation,
};

use crate::errors::OrmError;
use crate::model::{call_hook, HookFn, HookSet, Model, ModelRef, Record};
use indexmap::IndexMap;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

/// Declarations of a record type, built by the derive
pub struct ModelDef {
    pub name: String,
    pub table: Option<String>,
    pub fields: Vec<FieldDef>,
    pub relations: Vec<RelationDef>,
    model: ModelRef,
    hooks: HookSet,
    call_hook: HookFn,
    new_record: fn() -> Record,
    clone_record: fn(&dyn Any) -> Option<Record>,
}

impl ModelDef {
    pub fn new<M: Model>(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: None,
            fields: Vec::new(),
            relations: Vec::new(),
            model: ModelRef::of::<M>(),
            hooks: M::hook_set(),
            call_hook: call_hook::<M>,
            new_record: || Box::new(M::default()),
            clone_record: |record| {
                record
                    .downcast_ref::<M>()
                    .map(|m| Box::new(m.clone()) as Record)
            },
        }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Flatten the fields of `E` into this record
    pub fn embedded<M, E>(
        mut self,
        tags: &[(&str, &str)],
        get: fn(&M) -> &E,
        get_mut: fn(&mut M) -> &mut E,
    ) -> Self
    where
        M: 'static,
        E: Model,
    {
        let mut prefix = String::new();
        let mut extra = Vec::new();
        for (key, value) in tags {
            match field::normalize_tag_key(key).as_str() {
                "embedded_prefix" => prefix = value.to_string(),
                "embedded" => {}
                _ => extra.push((key.to_string(), value.to_string())),
            }
        }
        for def in E::definition().fields {
            self.fields.push(def.embed_in(get, get_mut, &prefix, &extra));
        }
        self
    }

    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }
}

/// Statement modifiers a schema attaches to every query, update or delete
#[derive(Debug, Clone, PartialEq)]
pub enum ClauseHook {
    /// Filter out rows whose `deleted_at` is set; DELETE becomes UPDATE
    SoftDelete { field: Arc<Field> },
}

pub struct Schema {
    pub name: String,
    pub table: String,
    pub type_id: TypeId,
    pub model: ModelRef,
    pub fields: Vec<Arc<Field>>,
    pub fields_by_name: HashMap<String, Arc<Field>>,
    pub fields_by_db_name: HashMap<String, Arc<Field>>,
    pub db_names: Vec<String>,
    pub primary_fields: Vec<Arc<Field>>,
    pub prioritized_primary_field: Option<Arc<Field>>,
    /// Fields whose value the database supplies, in insertion-column order
    pub fields_with_default_db_value: Vec<Arc<Field>>,
    pub relationships: IndexMap<String, Arc<Relationship>>,
    pub indexes: Vec<Index>,
    pub soft_delete_field: Option<Arc<Field>>,
    pub query_clauses: Vec<ClauseHook>,
    pub update_clauses: Vec<ClauseHook>,
    pub delete_clauses: Vec<ClauseHook>,
    pub hooks: HookSet,
    call_hook: HookFn,
    new_record: fn() -> Record,
    clone_record: fn(&dyn Any) -> Option<Record>,
}

impl Schema {
    pub fn build(def: ModelDef, naming: &NamingStrategy) -> Result<Schema, OrmError> {
        let table = def
            .table
            .clone()
            .unwrap_or_else(|| naming.table_name(&def.name));

        let mut parsed = def
            .fields
            .iter()
            .map(|f| Field::parse(f, naming))
            .collect::<Result<Vec<_>, _>>()?;

        if !parsed.iter().any(|f| f.primary_key) {
            if let Some(id) = parsed.iter_mut().find(|f| f.name == "id" || f.db_name == "id") {
                id.primary_key = true;
            }
        }

        let mut default_db: Vec<usize> = parsed
            .iter()
            .enumerate()
            .filter(|(_, f)| f.has_default_value && f.default_value_interface.is_none())
            .map(|(i, _)| i)
            .collect();

        let primary: Vec<usize> = parsed
            .iter()
            .enumerate()
            .filter(|(_, f)| f.primary_key)
            .map(|(i, _)| i)
            .collect();
        let prioritized = match primary.as_slice() {
            [only] => Some(*only),
            _ => primary
                .iter()
                .copied()
                .find(|&i| parsed[i].name == "id" || parsed[i].db_name == "id"),
        };

        // integer primary keys without an explicit auto_increment tag are
        // generated by the database
        if let Some(i) = prioritized {
            let field = &mut parsed[i];
            if field.data_kind.is_integer() && !field.tags.contains_key("auto_increment") {
                if (!field.has_default_value || field.default_value_interface.is_some())
                    && !default_db.contains(&i)
                {
                    default_db.push(i);
                }
                field.has_default_value = true;
                field.auto_increment = true;
            }
        }

        let fields: Vec<Arc<Field>> = parsed.into_iter().map(Arc::new).collect();
        let mut fields_by_name = HashMap::new();
        let mut fields_by_db_name = HashMap::new();
        let mut db_names = Vec::new();
        for field in &fields {
            if fields_by_name
                .insert(field.name.clone(), Arc::clone(field))
                .is_some()
            {
                return Err(OrmError::schema(format!(
                    "duplicated field {} on {}",
                    field.name, def.name
                )));
            }
            if !field.db_name.is_empty() && !fields_by_db_name.contains_key(&field.db_name) {
                fields_by_db_name.insert(field.db_name.clone(), Arc::clone(field));
                db_names.push(field.db_name.clone());
            }
        }

        let primary_fields = primary.iter().map(|&i| Arc::clone(&fields[i])).collect();
        let prioritized_primary_field = prioritized.map(|i| Arc::clone(&fields[i]));
        let fields_with_default_db_value = default_db
            .iter()
            .map(|&i| Arc::clone(&fields[i]))
            .collect();

        let soft_delete_field = fields.iter().find(|f| f.soft_delete).cloned();
        let soft_delete_hooks: Vec<ClauseHook> = soft_delete_field
            .iter()
            .map(|field| ClauseHook::SoftDelete {
                field: Arc::clone(field),
            })
            .collect();

        let mut relationships = IndexMap::new();
        for relation in def.relations {
            let name = relation.name.clone();
            relationships.insert(name, Arc::new(Relationship::from_def(relation)?));
        }

        let indexes = index::parse_indexes(&table, &fields, naming);

        Ok(Schema {
            name: def.name,
            table,
            type_id: def.model.type_id,
            model: def.model,
            fields,
            fields_by_name,
            fields_by_db_name,
            db_names,
            primary_fields,
            prioritized_primary_field,
            fields_with_default_db_value,
            relationships,
            indexes,
            soft_delete_field,
            query_clauses: soft_delete_hooks.clone(),
            update_clauses: soft_delete_hooks.clone(),
            delete_clauses: soft_delete_hooks,
            hooks: def.hooks,
            call_hook: def.call_hook,
            new_record: def.new_record,
            clone_record: def.clone_record,
        })
    }

    /// Field by Rust name, falling back to the column name
    pub fn look_up_field(&self, name: &str) -> Option<Arc<Field>> {
        self.fields_by_name
            .get(name)
            .or_else(|| self.fields_by_db_name.get(name))
            .cloned()
    }

    pub fn relationship(&self, name: &str) -> Option<Arc<Relationship>> {
        self.relationships.get(name).cloned().or_else(|| {
            self.relationships
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, rel)| Arc::clone(rel))
        })
    }

    /// Relationship by name together with its resolved foreign keys
    pub fn resolve_relation(
        &self,
        name: &str,
        cache: &SchemaCache,
    ) -> Result<(Arc<Relationship>, Arc<ResolvedRelation>), OrmError> {
        let relation = self.relationship(name).ok_or_else(|| {
            OrmError::UnsupportedRelation(format!("{} on {}", name, self.name))
        })?;
        let resolved = relation.resolve(self, cache)?;
        Ok((relation, resolved))
    }

    pub fn new_record(&self) -> Record {
        (self.new_record)()
    }

    pub fn clone_record(&self, record: &dyn Any) -> Option<Record> {
        (self.clone_record)(record)
    }

    pub(crate) fn call_hook(
        &self,
        record: &mut dyn Any,
        hook: crate::model::Hook,
        session: &crate::session::Session,
    ) -> Result<(), OrmError> {
        (self.call_hook)(record, hook, session)
    }

    pub fn is_record(&self, record: &dyn Any) -> bool {
        (*record).type_id() == self.type_id
    }

    /// Whether every primary key of `record` is zero (a new record)
    pub fn primary_is_zero(&self, record: &dyn Any) -> bool {
        self.primary_fields.is_empty()
            || self.primary_fields.iter().all(|f| f.value_of(record).1)
    }

    pub fn has_integer_primary(&self) -> bool {
        self.prioritized_primary_field
            .as_ref()
            .is_some_and(|f| f.data_kind.is_integer())
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.table == other.table
            && self.type_id == other.type_id
            && self.fields == other.fields
            && self.db_names == other.db_names
            && self.primary_fields == other.primary_fields
            && self.prioritized_primary_field == other.prioritized_primary_field
            && self.fields_with_default_db_value == other.fields_with_default_db_value
            && self.relationships == other.relationships
            && self.indexes == other.indexes
            && self.hooks == other.hooks
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("fields", &self.fields)
            .field("relationships", &self.relationships.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Concurrent memo of parsed schemas keyed by record type
pub struct SchemaCache {
    naming: NamingStrategy,
    schemas: RwLock<HashMap<TypeId, Arc<Schema>>>,
}

impl SchemaCache {
    pub fn new(naming: NamingStrategy) -> Self {
        Self {
            naming,
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Process-wide cache with the default naming strategy
    pub fn global() -> Arc<SchemaCache> {
        static GLOBAL: OnceLock<Arc<SchemaCache>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(SchemaCache::new(NamingStrategy::default()))))
    }

    pub fn naming(&self) -> &NamingStrategy {
        &self.naming
    }

    pub fn parse<M: Model>(&self) -> Result<Arc<Schema>, OrmError> {
        let id = TypeId::of::<M>();
        if let Some(schema) = self
            .schemas
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
        {
            return Ok(Arc::clone(schema));
        }

        // built outside the lock; a concurrent parse of the same type loses the race
        let schema = Arc::new(Schema::build(M::definition(), &self.naming)?);
        crate::debug_log!("parsed schema {} -> {}", schema.name, schema.table);
        let mut schemas = self.schemas.write().unwrap_or_else(|e| e.into_inner());
        Ok(Arc::clone(schemas.entry(id).or_insert(schema)))
    }

    pub fn get(&self, id: TypeId) -> Option<Arc<Schema>> {
        self.schemas
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.schemas.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaCache")
            .field("naming", &self.naming)
            .field("schemas", &self.len())
            .finish()
    }
}
