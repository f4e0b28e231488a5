//! Field descriptors
//!
//! A [`FieldDef`] is what `#[derive(Model)]` emits: the Rust name, the raw
//! tag pairs and a typed accessor pair. [`Field::parse`] turns it into the
//! shared descriptor used by every stage, with the accessors erased into
//! closures over `dyn Any`.

use crate::errors::OrmError;
use crate::schema::naming::NamingStrategy;
use heck::ToSnakeCase;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use type_mapping::{ConvertError, DataKind, FieldValue, Value};

pub(crate) type Getter = Arc<dyn Fn(&dyn Any) -> Option<(Value, bool)> + Send + Sync>;
pub(crate) type Setter = Arc<dyn Fn(&mut dyn Any, Value) -> Result<(), ConvertError> + Send + Sync>;

/// Declared field of a record type
#[derive(Clone)]
pub struct FieldDef {
    pub name: String,
    pub tags: Vec<(String, String)>,
    pub data_kind: DataKind,
    pub nullable: bool,
    pub(crate) getter: Getter,
    pub(crate) setter: Setter,
}

impl FieldDef {
    pub fn new<M, F>(
        name: &str,
        tags: &[(&str, &str)],
        get: fn(&M) -> &F,
        get_mut: fn(&mut M) -> &mut F,
    ) -> Self
    where
        M: 'static,
        F: FieldValue + Default + 'static,
    {
        let getter: Getter = Arc::new(move |record: &dyn Any| {
            record.downcast_ref::<M>().map(|m| {
                let field = get(m);
                (field.to_value(), field.is_zero())
            })
        });
        let setter: Setter = Arc::new(move |record: &mut dyn Any, value: Value| {
            let Some(m) = record.downcast_mut::<M>() else {
                return Err(ConvertError::Mismatch {
                    expected: std::any::type_name::<M>(),
                    found: "record",
                });
            };
            // NULL into a non-optional field resets it
            let converted = if value.is_null() && !F::nullable() {
                F::default()
            } else {
                F::from_value(value)?
            };
            *get_mut(m) = converted;
            Ok(())
        });
        Self {
            name: name.to_string(),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            data_kind: F::data_kind(),
            nullable: F::nullable(),
            getter,
            setter,
        }
    }

    /// Re-root the accessors under an embedding record of type `P`
    pub(crate) fn embed_in<P, E>(
        self,
        get: fn(&P) -> &E,
        get_mut: fn(&mut P) -> &mut E,
        prefix: &str,
        extra_tags: &[(String, String)],
    ) -> FieldDef
    where
        P: 'static,
        E: 'static,
    {
        let inner_get = self.getter;
        let inner_set = self.setter;
        let getter: Getter = Arc::new(move |record: &dyn Any| {
            let parent = record.downcast_ref::<P>()?;
            inner_get(get(parent) as &dyn Any)
        });
        let setter: Setter = Arc::new(move |record: &mut dyn Any, value: Value| {
            let Some(parent) = record.downcast_mut::<P>() else {
                return Err(ConvertError::Mismatch {
                    expected: std::any::type_name::<P>(),
                    found: "record",
                });
            };
            inner_set(get_mut(parent) as &mut dyn Any, value)
        });
        let mut tags = self.tags;
        if !prefix.is_empty() {
            tags.push(("embedded_prefix".to_string(), prefix.to_string()));
        }
        tags.extend(extra_tags.iter().cloned());
        FieldDef {
            name: self.name,
            tags,
            data_kind: self.data_kind,
            nullable: self.nullable,
            getter,
            setter,
        }
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("data_kind", &self.data_kind)
            .finish()
    }
}

/// Storage unit of an auto-maintained timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Time,
    Seconds,
    Milli,
    Nano,
}

impl TimeUnit {
    /// Current time in this unit
    pub fn now(self) -> Value {
        let now = chrono::Utc::now();
        match self {
            TimeUnit::Time => Value::Time(now),
            TimeUnit::Seconds => Value::Int(now.timestamp()),
            TimeUnit::Milli => Value::Int(now.timestamp_millis()),
            TimeUnit::Nano => Value::Int(now.timestamp_nanos_opt().unwrap_or(i64::MAX)),
        }
    }
}

/// Parsed field descriptor, shared by every statement touching the schema
#[derive(Clone)]
pub struct Field {
    pub name: String,
    pub db_name: String,
    pub data_kind: DataKind,
    /// Explicit `type` annotation, empty when inferred
    pub data_type: String,
    pub tags: BTreeMap<String, String>,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub auto_increment_increment: i64,
    pub creatable: bool,
    pub updatable: bool,
    pub readable: bool,
    pub not_null: bool,
    pub nullable: bool,
    pub unique: bool,
    pub size: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub has_default_value: bool,
    pub default_value: Option<String>,
    /// Default usable on the client side; `None` for database expressions
    pub default_value_interface: Option<Value>,
    pub auto_create_time: Option<TimeUnit>,
    pub auto_update_time: Option<TimeUnit>,
    pub soft_delete: bool,
    pub index: Option<String>,
    pub unique_index: Option<String>,
    getter: Getter,
    setter: Setter,
}

impl Field {
    pub fn parse(def: &FieldDef, naming: &NamingStrategy) -> Result<Field, OrmError> {
        let tags: BTreeMap<String, String> = def
            .tags
            .iter()
            .map(|(k, v)| (normalize_tag_key(k), v.trim().to_string()))
            .collect();
        let flag = |key: &str| tags.get(key).is_some_and(|v| is_truthy(v));
        let number = |key: &str| -> Result<Option<u32>, OrmError> {
            match tags.get(key) {
                None => Ok(None),
                Some(v) => v.parse().map(Some).map_err(|_| {
                    OrmError::schema(format!("invalid {key} value {v:?} on field {}", def.name))
                }),
            }
        };

        let prefix = tags.get("embedded_prefix").cloned().unwrap_or_default();
        let db_name = match tags.get("column").filter(|c| !c.is_empty()) {
            Some(column) => format!("{prefix}{column}"),
            None => format!("{prefix}{}", naming.column_name(&def.name)),
        };
        let data_type = tags.get("type").cloned().unwrap_or_default();
        let data_kind = if data_type.is_empty() {
            def.data_kind
        } else {
            DataKind::from_type_name(&data_type)
        };

        let auto_increment_increment = match tags.get("auto_increment_increment") {
            Some(v) => v.parse().map_err(|_| {
                OrmError::schema(format!(
                    "invalid auto_increment_increment {v:?} on field {}",
                    def.name
                ))
            })?,
            None => 1,
        };

        let not_null = flag("not_null");
        let readonly = flag("readonly");
        let mut field = Field {
            name: def.name.clone(),
            db_name,
            data_kind,
            data_type,
            primary_key: flag("primary_key"),
            auto_increment: flag("auto_increment"),
            auto_increment_increment,
            creatable: !readonly && !flag("update_only"),
            updatable: !readonly && !flag("create_only"),
            readable: true,
            not_null,
            nullable: def.nullable && !not_null,
            unique: flag("unique"),
            size: number("size")?,
            precision: number("precision")?,
            scale: number("scale")?,
            has_default_value: false,
            default_value: None,
            default_value_interface: None,
            auto_create_time: None,
            auto_update_time: None,
            soft_delete: false,
            index: tags.get("index").cloned(),
            unique_index: tags.get("unique_index").cloned(),
            getter: Arc::clone(&def.getter),
            setter: Arc::clone(&def.setter),
            tags,
        };

        if let Some(default) = field.tags.get("default").cloned() {
            field.has_default_value = true;
            field.default_value_interface = parse_default(&default, field.data_kind)
                .map_err(|_| {
                    OrmError::schema(format!(
                        "invalid default value {default:?} on field {}",
                        field.name
                    ))
                })?;
            field.default_value = Some(default);
        }
        if field.auto_increment {
            field.has_default_value = true;
        }

        field.auto_create_time = field.time_tracking("auto_create_time", "created_at");
        field.auto_update_time = field.time_tracking("auto_update_time", "updated_at");
        field.soft_delete = field.tags.contains_key("soft_delete")
            || (field.name == "deleted_at" && field.nullable && field.data_kind == DataKind::Time);

        Ok(field)
    }

    fn time_tracking(&self, tag: &str, conventional: &str) -> Option<TimeUnit> {
        let setting = self.tags.get(tag);
        let enabled = match setting {
            Some(v) => v.is_empty() || is_truthy(v) || matches!(v.as_str(), "milli" | "nano"),
            None => self.name == conventional,
        };
        if !enabled {
            return None;
        }
        match self.data_kind {
            DataKind::Time => Some(TimeUnit::Time),
            kind if kind.is_integer() => Some(match setting.map(String::as_str) {
                Some("nano") => TimeUnit::Nano,
                Some("milli") => TimeUnit::Milli,
                _ => TimeUnit::Seconds,
            }),
            _ => None,
        }
    }

    /// Read the field from a record; returns the value and whether it is zero
    pub fn value_of(&self, record: &dyn Any) -> (Value, bool) {
        (self.getter)(record).unwrap_or((Value::Null, true))
    }

    pub fn set(&self, record: &mut dyn Any, value: Value) -> Result<(), OrmError> {
        (self.setter)(record, value).map_err(|e| match e {
            ConvertError::Mismatch { expected, found } => OrmError::user(format!(
                "cannot assign {found} to field {} ({expected})",
                self.name
            )),
            other => OrmError::Convert(other),
        })
    }

    /// Value used for an INSERT when the record carries a zero value
    pub(crate) fn insert_default(&self) -> Option<Value> {
        if let Some(unit) = self.auto_create_time.or(self.auto_update_time) {
            return Some(unit.now());
        }
        self.default_value_interface.clone()
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.db_name == other.db_name
            && self.data_kind == other.data_kind
            && self.tags == other.tags
            && self.primary_key == other.primary_key
            && self.auto_increment == other.auto_increment
            && self.creatable == other.creatable
            && self.updatable == other.updatable
            && self.nullable == other.nullable
            && self.has_default_value == other.has_default_value
            && self.default_value_interface == other.default_value_interface
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("db_name", &self.db_name)
            .field("data_kind", &self.data_kind)
            .field("primary_key", &self.primary_key)
            .field("has_default_value", &self.has_default_value)
            .finish()
    }
}

/// `primaryKey`, `PRIMARY_KEY` and `primary_key` are the same tag
pub(crate) fn normalize_tag_key(key: &str) -> String {
    key.trim().replace([' ', '-'], "_").to_snake_case()
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.to_ascii_lowercase().as_str(), "false" | "f" | "0" | "no")
}

/// Client-side default for a `default` tag, `None` when the database owns it
fn parse_default(raw: &str, kind: DataKind) -> Result<Option<Value>, ()> {
    let raw = raw.trim();
    if raw.contains('(') {
        return Ok(None);
    }
    if raw.eq_ignore_ascii_case("null") {
        return Ok(Some(Value::Null));
    }
    let value = match kind {
        DataKind::Bool => Value::Bool(match raw.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => true,
            "false" | "f" | "0" => false,
            _ => return Err(()),
        }),
        DataKind::Int | DataKind::WideInt => Value::Int(raw.parse().map_err(|_| ())?),
        DataKind::Float | DataKind::Double => Value::Float(raw.parse().map_err(|_| ())?),
        DataKind::String => Value::String(raw.trim_matches('\'').to_string()),
        // time and binary defaults are database expressions
        _ => return Ok(None),
    };
    Ok(Some(value))
}
