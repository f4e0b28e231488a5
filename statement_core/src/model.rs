//! Record types, hooks and destinations
//!
//! A record type implements [`Model`] (normally through `#[derive(Model)]`)
//! and [`Hooks`]. Statements never see the concrete type: records travel as
//! [`Record`] boxes and are read and written through the field closures of
//! their [`Schema`](crate::schema::Schema).

use crate::errors::OrmError;
use crate::schema::{ModelDef, Schema, SchemaCache};
use crate::session::Session;
use indexmap::IndexMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use type_mapping::{FieldValue, Value};

/// Type-erased record owned by a statement
pub type Record = Box<dyn Any + Send + Sync>;

/// Column name to value mapping used by map destinations
pub type Row = IndexMap<String, Value>;

/// Lifecycle hooks a record may implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    BeforeSave,
    BeforeCreate,
    BeforeUpdate,
    BeforeDelete,
    AfterSave,
    AfterCreate,
    AfterUpdate,
    AfterDelete,
    AfterFind,
    AfterError,
}

impl Hook {
    pub const ALL: [Hook; 10] = [
        Hook::BeforeSave,
        Hook::BeforeCreate,
        Hook::BeforeUpdate,
        Hook::BeforeDelete,
        Hook::AfterSave,
        Hook::AfterCreate,
        Hook::AfterUpdate,
        Hook::AfterDelete,
        Hook::AfterFind,
        Hook::AfterError,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Hook::BeforeSave => "before_save",
            Hook::BeforeCreate => "before_create",
            Hook::BeforeUpdate => "before_update",
            Hook::BeforeDelete => "before_delete",
            Hook::AfterSave => "after_save",
            Hook::AfterCreate => "after_create",
            Hook::AfterUpdate => "after_update",
            Hook::AfterDelete => "after_delete",
            Hook::AfterFind => "after_find",
            Hook::AfterError => "after_error",
        }
    }

    pub fn from_name(name: &str) -> Option<Hook> {
        Hook::ALL.into_iter().find(|h| h.name() == name)
    }

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Capability set: which hooks a record type implements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookSet(u16);

impl HookSet {
    pub const NONE: HookSet = HookSet(0);

    pub const fn with(self, hook: Hook) -> Self {
        HookSet(self.0 | hook.bit())
    }

    pub const fn contains(self, hook: Hook) -> bool {
        self.0 & hook.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Lifecycle callbacks invoked once per record.
///
/// Only hooks listed in `#[orm(hooks(...))]` are called; the rest keep these
/// defaults. Returning an error halts the chain.
#[allow(unused_variables)]
pub trait Hooks {
    fn before_save(&mut self, session: &Session) -> Result<(), OrmError> {
        Ok(())
    }
    fn before_create(&mut self, session: &Session) -> Result<(), OrmError> {
        Ok(())
    }
    fn before_update(&mut self, session: &Session) -> Result<(), OrmError> {
        Ok(())
    }
    fn before_delete(&mut self, session: &Session) -> Result<(), OrmError> {
        Ok(())
    }
    fn after_save(&mut self, session: &Session) -> Result<(), OrmError> {
        Ok(())
    }
    fn after_create(&mut self, session: &Session) -> Result<(), OrmError> {
        Ok(())
    }
    fn after_update(&mut self, session: &Session) -> Result<(), OrmError> {
        Ok(())
    }
    fn after_delete(&mut self, session: &Session) -> Result<(), OrmError> {
        Ok(())
    }
    fn after_find(&mut self, session: &Session) -> Result<(), OrmError> {
        Ok(())
    }
    fn after_error(&mut self, session: &Session) -> Result<(), OrmError> {
        Ok(())
    }
}

/// A record type known to the schema reflector
pub trait Model: Hooks + Default + Clone + Send + Sync + 'static {
    /// Field, embedded and relation declarations of the type
    fn definition() -> ModelDef;

    fn hook_set() -> HookSet {
        HookSet::NONE
    }
}

pub(crate) type HookFn = fn(&mut dyn Any, Hook, &Session) -> Result<(), OrmError>;

/// Dispatch `hook` on a type-erased record of type `M`
pub(crate) fn call_hook<M: Model>(
    record: &mut dyn Any,
    hook: Hook,
    session: &Session,
) -> Result<(), OrmError> {
    let Some(record) = record.downcast_mut::<M>() else {
        return Err(OrmError::user(format!(
            "hook {} called on a record that is not {}",
            hook.name(),
            std::any::type_name::<M>()
        )));
    };
    match hook {
        Hook::BeforeSave => record.before_save(session),
        Hook::BeforeCreate => record.before_create(session),
        Hook::BeforeUpdate => record.before_update(session),
        Hook::BeforeDelete => record.before_delete(session),
        Hook::AfterSave => record.after_save(session),
        Hook::AfterCreate => record.after_create(session),
        Hook::AfterUpdate => record.after_update(session),
        Hook::AfterDelete => record.after_delete(session),
        Hook::AfterFind => record.after_find(session),
        Hook::AfterError => record.after_error(session),
    }
}

/// Identity of a record type plus the way to reflect it
#[derive(Clone, Copy)]
pub struct ModelRef {
    pub type_id: TypeId,
    pub type_name: &'static str,
    parse: fn(&SchemaCache) -> Result<Arc<Schema>, OrmError>,
}

impl ModelRef {
    pub fn of<M: Model>() -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
            parse: |cache| cache.parse::<M>(),
        }
    }

    pub fn schema(&self, cache: &SchemaCache) -> Result<Arc<Schema>, OrmError> {
        (self.parse)(cache)
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

impl PartialEq for ModelRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

/// Shape of a destination, fixed when a finisher takes it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestKind {
    None,
    Struct,
    Slice,
    Map,
    Maps,
    Scalar,
    Scalars,
}

/// The value a statement reads from and writes results into
#[derive(Default)]
pub enum Dest {
    #[default]
    None,
    Record(Record),
    Records(Vec<Record>),
    Map(Row),
    Maps(Vec<Row>),
    Scalar(Value),
    Scalars(Vec<Value>),
}

impl fmt::Debug for Dest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dest::None => f.write_str("Dest::None"),
            Dest::Record(_) => f.write_str("Dest::Record"),
            Dest::Records(records) => write!(f, "Dest::Records({})", records.len()),
            Dest::Map(row) => f.debug_tuple("Dest::Map").field(row).finish(),
            Dest::Maps(rows) => f.debug_tuple("Dest::Maps").field(rows).finish(),
            Dest::Scalar(v) => f.debug_tuple("Dest::Scalar").field(v).finish(),
            Dest::Scalars(v) => f.debug_tuple("Dest::Scalars").field(v).finish(),
        }
    }
}

impl Dest {
    pub fn record<M: Model>(record: M) -> Self {
        Dest::Record(Box::new(record))
    }

    pub fn records<M: Model>(records: Vec<M>) -> Self {
        Dest::Records(records.into_iter().map(|r| Box::new(r) as Record).collect())
    }

    pub fn kind(&self) -> DestKind {
        match self {
            Dest::None => DestKind::None,
            Dest::Record(_) => DestKind::Struct,
            Dest::Records(_) => DestKind::Slice,
            Dest::Map(_) => DestKind::Map,
            Dest::Maps(_) => DestKind::Maps,
            Dest::Scalar(_) => DestKind::Scalar,
            Dest::Scalars(_) => DestKind::Scalars,
        }
    }

    /// Whether the destination holds typed records
    pub fn has_records(&self) -> bool {
        matches!(self, Dest::Record(_) | Dest::Records(_))
    }

    /// Number of records (or maps) carried
    pub fn len(&self) -> usize {
        match self {
            Dest::None => 0,
            Dest::Record(_) | Dest::Map(_) | Dest::Scalar(_) => 1,
            Dest::Records(r) => r.len(),
            Dest::Maps(m) => m.len(),
            Dest::Scalars(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn record_refs(&self) -> Vec<&dyn Any> {
        match self {
            Dest::Record(r) => vec![r.as_ref() as &dyn Any],
            Dest::Records(rs) => rs.iter().map(|r| r.as_ref() as &dyn Any).collect(),
            _ => Vec::new(),
        }
    }

    pub fn record_muts(&mut self) -> Vec<&mut dyn Any> {
        match self {
            Dest::Record(r) => vec![r.as_mut() as &mut dyn Any],
            Dest::Records(rs) => rs.iter_mut().map(|r| r.as_mut() as &mut dyn Any).collect(),
            _ => Vec::new(),
        }
    }

    pub fn into_record<M: Model>(self) -> Result<M, OrmError> {
        match self {
            Dest::Record(r) => r.downcast::<M>().map(|b| *b).map_err(|_| wrong_type::<M>()),
            Dest::Records(rs) if rs.len() == 1 => rs
                .into_iter()
                .next()
                .map(|r| r.downcast::<M>().map(|b| *b).map_err(|_| wrong_type::<M>()))
                .unwrap_or_else(|| Err(wrong_type::<M>())),
            other => Err(OrmError::user(format!(
                "destination {:?} cannot be restored into {}",
                other.kind(),
                std::any::type_name::<M>()
            ))),
        }
    }

    pub fn into_records<M: Model>(self) -> Result<Vec<M>, OrmError> {
        match self {
            Dest::Records(rs) => rs
                .into_iter()
                .map(|r| r.downcast::<M>().map(|b| *b).map_err(|_| wrong_type::<M>()))
                .collect(),
            Dest::Record(r) => Ok(vec![*r.downcast::<M>().map_err(|_| wrong_type::<M>())?]),
            Dest::None => Ok(Vec::new()),
            other => Err(OrmError::user(format!(
                "destination {:?} cannot be restored into a slice of {}",
                other.kind(),
                std::any::type_name::<M>()
            ))),
        }
    }
}

fn wrong_type<M>() -> OrmError {
    OrmError::user(format!("destination is not {}", std::any::type_name::<M>()))
}

/// A caller value a finisher can fill.
///
/// The value is moved into the statement for the duration of the chain and
/// restored afterwards, so the chain works on owned records.
pub trait Destination: Send {
    fn take_dest(&mut self) -> Dest;

    fn restore_dest(&mut self, dest: Dest) -> Result<(), OrmError>;

    /// Record type carried, when the destination is typed
    fn model_ref() -> Option<ModelRef>
    where
        Self: Sized,
    {
        None
    }
}

/// A single record: its primary key drives updates and deletes
impl<M: Model> Destination for M {
    fn take_dest(&mut self) -> Dest {
        Dest::record(std::mem::take(self))
    }

    fn restore_dest(&mut self, dest: Dest) -> Result<(), OrmError> {
        *self = dest.into_record()?;
        Ok(())
    }

    fn model_ref() -> Option<ModelRef> {
        Some(ModelRef::of::<M>())
    }
}

/// No destination: statements driven by `model`/`table` alone
impl Destination for () {
    fn take_dest(&mut self) -> Dest {
        Dest::None
    }

    fn restore_dest(&mut self, _dest: Dest) -> Result<(), OrmError> {
        Ok(())
    }
}

impl<M: Model> Destination for Vec<M> {
    fn take_dest(&mut self) -> Dest {
        Dest::records(std::mem::take(self))
    }

    fn restore_dest(&mut self, dest: Dest) -> Result<(), OrmError> {
        *self = dest.into_records()?;
        Ok(())
    }

    fn model_ref() -> Option<ModelRef> {
        Some(ModelRef::of::<M>())
    }
}

impl Destination for Row {
    fn take_dest(&mut self) -> Dest {
        Dest::Map(std::mem::take(self))
    }

    fn restore_dest(&mut self, dest: Dest) -> Result<(), OrmError> {
        match dest {
            Dest::Map(row) => *self = row,
            Dest::Maps(rows) => *self = rows.into_iter().next().unwrap_or_default(),
            _ => {}
        }
        Ok(())
    }
}

impl Destination for Vec<Row> {
    fn take_dest(&mut self) -> Dest {
        Dest::Maps(std::mem::take(self))
    }

    fn restore_dest(&mut self, dest: Dest) -> Result<(), OrmError> {
        match dest {
            Dest::Maps(rows) => *self = rows,
            Dest::Map(row) => *self = vec![row],
            _ => {}
        }
        Ok(())
    }
}

impl Destination for Vec<Value> {
    fn take_dest(&mut self) -> Dest {
        Dest::Scalars(std::mem::take(self))
    }

    fn restore_dest(&mut self, dest: Dest) -> Result<(), OrmError> {
        if let Dest::Scalars(values) = dest {
            *self = values;
        }
        Ok(())
    }
}

macro_rules! scalar_destination {
    ($($ty:ty),*) => {$(
        impl Destination for $ty {
            fn take_dest(&mut self) -> Dest {
                Dest::Scalar(Value::Null)
            }

            fn restore_dest(&mut self, dest: Dest) -> Result<(), OrmError> {
                match dest {
                    Dest::Scalar(Value::Null) => Ok(()),
                    Dest::Scalar(value) => {
                        *self = <$ty as FieldValue>::from_value(value)?;
                        Ok(())
                    }
                    _ => Ok(()),
                }
            }
        }
    )*};
}

scalar_destination!(i64, i32, u64, u32, f64, String, bool, Value);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_set_tracks_capabilities() {
        let set = HookSet::NONE.with(Hook::BeforeCreate).with(Hook::AfterFind);
        assert!(set.contains(Hook::BeforeCreate));
        assert!(set.contains(Hook::AfterFind));
        assert!(!set.contains(Hook::AfterError));
        assert!(HookSet::NONE.is_empty());
        assert_eq!(Hook::from_name("after_delete"), Some(Hook::AfterDelete));
    }

    #[test]
    fn scalar_destination_round_trips() {
        let mut count = 0i64;
        let dest = count.take_dest();
        assert_eq!(dest.kind(), DestKind::Scalar);
        count.restore_dest(Dest::Scalar(Value::Int(42))).unwrap();
        assert_eq!(count, 42);
    }

    #[test]
    fn row_destinations_keep_maps() {
        let mut rows: Vec<Row> = Vec::new();
        let mut row = Row::new();
        row.insert("id".into(), Value::Int(1));
        rows.restore_dest(Dest::Maps(vec![row.clone()])).unwrap();
        assert_eq!(rows, vec![row]);
    }
}
