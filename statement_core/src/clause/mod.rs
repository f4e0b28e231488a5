//! Clause tree and rendering
//!
//! A statement keeps one [`Clause`] per clause name. Each clause renders
//! itself, keyword included, into a [`Builder`], which owns the text buffer
//! and the variable list and knows the dialect's quoting and bind markers.

pub mod delete;
pub mod expression;
pub mod filter;
pub mod grouping;
pub mod insert;
pub mod join;
pub mod ordering;
pub mod pagination;
pub mod select;
pub mod update;

#[cfg(test)]
mod tests;

pub use delete::Delete;
pub use expression::{CmpOp, Expr, SubQuery};
pub use filter::Where;
pub use grouping::GroupBy;
pub use insert::{Insert, OnConflict, Returning, Values};
pub use join::{From, Join, JoinType};
pub use ordering::{OrderBy, OrderItem};
pub use pagination::Limit;
pub use select::{Locking, Select};
pub use update::{Assignment, Set, Update};

use crate::errors::OrmError;
use std::sync::Arc;
use type_mapping::Value;

/// Placeholder replaced by the statement's table when rendered
pub const CURRENT_TABLE: &str = "~~~ct~~~";
/// Placeholder replaced by the schema's primary key column
pub const PRIMARY_KEY: &str = "~~~py~~~";

/// Render order of each verb
pub const CREATE_CLAUSES: &[&str] = &["INSERT", "VALUES", "ON CONFLICT", "RETURNING"];
pub const QUERY_CLAUSES: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP BY", "ORDER BY", "LIMIT", "FOR",
];
pub const UPDATE_CLAUSES: &[&str] = &["UPDATE", "SET", "WHERE", "RETURNING"];
pub const DELETE_CLAUSES: &[&str] = &["DELETE", "FROM", "WHERE", "RETURNING"];

/// Sink clauses render into
pub trait Builder {
    fn write_str(&mut self, s: &str);

    fn write_char(&mut self, c: char);

    /// Write a column (or `table.column`) with identifier quoting
    fn write_quoted(&mut self, column: &Column);

    fn write_quoted_table(&mut self, table: &Table);

    /// Append one argument: values bind a marker, columns quote, expressions render
    fn add_var(&mut self, arg: &Arg);

    fn add_error(&mut self, err: OrmError);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    pub table: String,
    pub name: String,
    pub alias: String,
    /// Written verbatim without quoting
    pub raw: bool,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table: String::new(),
            name: name.into(),
            alias: String::new(),
            raw: false,
        }
    }

    /// Column qualified with the statement's own table
    pub fn current(name: impl Into<String>) -> Self {
        Self::new(name).of(CURRENT_TABLE)
    }

    pub fn primary_key() -> Self {
        Self::new(PRIMARY_KEY).of(CURRENT_TABLE)
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            raw: true,
            ..Self::new(sql)
        }
    }

    pub fn of(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Table {
    pub name: String,
    pub alias: String,
    pub raw: bool,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: String::new(),
            raw: false,
        }
    }

    pub fn current() -> Self {
        Self::new(CURRENT_TABLE)
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }
}

/// Anything that can stand in a `?` position
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(Value),
    Column(Column),
    Expr(Box<Expr>),
    /// The literal `DEFAULT` in a VALUES row
    Default,
    Sub(Arc<SubQuery>),
}

impl Arg {
    pub fn is_null(&self) -> bool {
        matches!(self, Arg::Value(Value::Null))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! arg_from_value {
    ($($ty:ty),* $(,)?) => {$(
        impl std::convert::From<$ty> for Arg {
            fn from(v: $ty) -> Self {
                Arg::Value(Value::from(v))
            }
        }
    )*};
}

arg_from_value!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    f32,
    f64,
    String,
    &str,
    chrono::DateTime<chrono::Utc>,
    chrono::NaiveDateTime,
    chrono::NaiveDate,
    uuid::Uuid,
    serde_json::Value,
);

impl std::convert::From<Value> for Arg {
    fn from(v: Value) -> Self {
        Arg::Value(v)
    }
}

impl<T: Into<Value>> std::convert::From<Option<T>> for Arg {
    fn from(v: Option<T>) -> Self {
        Arg::Value(v.map(Into::into).unwrap_or(Value::Null))
    }
}

/// A list binds as `(?,?,...)`
impl<T: Into<Value>> std::convert::From<Vec<T>> for Arg {
    fn from(v: Vec<T>) -> Self {
        Arg::Value(Value::Array(v.into_iter().map(Into::into).collect()))
    }
}

impl std::convert::From<Column> for Arg {
    fn from(c: Column) -> Self {
        Arg::Column(c)
    }
}

impl std::convert::From<Expr> for Arg {
    fn from(e: Expr) -> Self {
        Arg::Expr(Box::new(e))
    }
}

impl std::convert::From<SubQuery> for Arg {
    fn from(s: SubQuery) -> Self {
        Arg::Sub(Arc::new(s))
    }
}

/// Build a `Vec<Arg>` from heterogeneous values
#[macro_export]
macro_rules! args {
    () => { ::std::vec::Vec::<$crate::clause::Arg>::new() };
    ($($e:expr),+ $(,)?) => { ::std::vec![$($crate::clause::Arg::from($e)),+] };
}

/// One clause node
#[derive(Debug, Clone, PartialEq)]
pub enum ClauseExpr {
    Select(Select),
    From(From),
    Where(Where),
    GroupBy(GroupBy),
    OrderBy(OrderBy),
    Limit(Limit),
    Locking(Locking),
    Insert(Insert),
    Values(Values),
    OnConflict(OnConflict),
    Returning(Returning),
    Update(Update),
    Set(Set),
    Delete(Delete),
    /// Free-form clause registered under a custom name
    Expr(Expr),
}

impl ClauseExpr {
    pub fn name(&self) -> &'static str {
        match self {
            ClauseExpr::Select(_) => "SELECT",
            ClauseExpr::From(_) => "FROM",
            ClauseExpr::Where(_) => "WHERE",
            ClauseExpr::GroupBy(_) => "GROUP BY",
            ClauseExpr::OrderBy(_) => "ORDER BY",
            ClauseExpr::Limit(_) => "LIMIT",
            ClauseExpr::Locking(_) => "FOR",
            ClauseExpr::Insert(_) => "INSERT",
            ClauseExpr::Values(_) => "VALUES",
            ClauseExpr::OnConflict(_) => "ON CONFLICT",
            ClauseExpr::Returning(_) => "RETURNING",
            ClauseExpr::Update(_) => "UPDATE",
            ClauseExpr::Set(_) => "SET",
            ClauseExpr::Delete(_) => "DELETE",
            ClauseExpr::Expr(_) => "",
        }
    }

    pub fn build(&self, builder: &mut dyn Builder) {
        match self {
            ClauseExpr::Select(c) => c.build(builder),
            ClauseExpr::From(c) => c.build(builder),
            ClauseExpr::Where(c) => c.build(builder),
            ClauseExpr::GroupBy(c) => c.build(builder),
            ClauseExpr::OrderBy(c) => c.build(builder),
            ClauseExpr::Limit(c) => c.build(builder),
            ClauseExpr::Locking(c) => c.build(builder),
            ClauseExpr::Insert(c) => c.build(builder),
            ClauseExpr::Values(c) => c.build(builder),
            ClauseExpr::OnConflict(c) => c.build(builder),
            ClauseExpr::Returning(c) => c.build(builder),
            ClauseExpr::Update(c) => c.build(builder),
            ClauseExpr::Set(c) => c.build(builder),
            ClauseExpr::Delete(c) => c.build(builder),
            ClauseExpr::Expr(e) => e.build(builder),
        }
    }

    /// Whether rendering would produce nothing
    pub fn is_empty(&self) -> bool {
        match self {
            ClauseExpr::Where(w) => w.exprs.is_empty(),
            ClauseExpr::GroupBy(g) => g.columns.is_empty() && g.having.is_empty(),
            ClauseExpr::OrderBy(o) => o.items.is_empty(),
            ClauseExpr::Limit(l) => l.limit.is_none() && l.offset.unwrap_or(0) == 0,
            _ => false,
        }
    }

    /// Combine `self` (newly added) with the clause already registered
    pub fn merge(self, existing: ClauseExpr) -> ClauseExpr {
        match (existing, self) {
            (ClauseExpr::Where(mut old), ClauseExpr::Where(new)) => {
                old.exprs.extend(new.exprs);
                ClauseExpr::Where(old)
            }
            (ClauseExpr::From(mut old), ClauseExpr::From(new)) => {
                old.tables.extend(new.tables);
                old.joins.extend(new.joins);
                ClauseExpr::From(old)
            }
            (ClauseExpr::GroupBy(mut old), ClauseExpr::GroupBy(new)) => {
                old.columns.extend(new.columns);
                old.having.extend(new.having);
                ClauseExpr::GroupBy(old)
            }
            (ClauseExpr::OrderBy(mut old), ClauseExpr::OrderBy(new)) => {
                if new.reorder {
                    ClauseExpr::OrderBy(new)
                } else {
                    old.items.extend(new.items);
                    ClauseExpr::OrderBy(old)
                }
            }
            (ClauseExpr::Limit(old), ClauseExpr::Limit(new)) => ClauseExpr::Limit(Limit {
                limit: new.limit.or(old.limit),
                offset: new.offset.or(old.offset),
            }),
            (ClauseExpr::Returning(mut old), ClauseExpr::Returning(new)) => {
                old.columns.extend(new.columns);
                ClauseExpr::Returning(old)
            }
            (ClauseExpr::Select(old), ClauseExpr::Select(mut new)) => {
                new.distinct |= old.distinct;
                ClauseExpr::Select(new)
            }
            (_, new) => new,
        }
    }
}

macro_rules! clause_from {
    ($($variant:ident),*) => {$(
        impl std::convert::From<$variant> for ClauseExpr {
            fn from(c: $variant) -> Self {
                ClauseExpr::$variant(c)
            }
        }
    )*};
}

clause_from!(
    Select, From, Where, GroupBy, OrderBy, Limit, Locking, Insert, Values, OnConflict,
    Returning, Update, Set, Delete
);

/// A clause registered on a statement
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub name: String,
    pub expression: ClauseExpr,
}

impl Clause {
    pub fn new(expression: impl Into<ClauseExpr>) -> Self {
        let expression = expression.into();
        Self {
            name: expression.name().to_string(),
            expression,
        }
    }

    /// A raw expression rendered in the slot `name` (e.g. `"FOR"`)
    pub fn named(name: impl Into<String>, expression: Expr) -> Self {
        Self {
            name: name.into(),
            expression: ClauseExpr::Expr(expression),
        }
    }

    pub fn build(&self, builder: &mut dyn Builder) {
        self.expression.build(builder)
    }
}

/// Write `columns` comma separated and quoted
pub(crate) fn write_columns(builder: &mut dyn Builder, columns: &[Column]) {
    for (idx, column) in columns.iter().enumerate() {
        if idx > 0 {
            builder.write_char(',');
        }
        builder.write_quoted(column);
    }
}
