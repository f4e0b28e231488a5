//! Search parameters to WHERE / ORDER BY / LIMIT
//!
//! Keys are converted to snake case and read by prefix:
//!
//! | key             | condition          |
//! |-----------------|--------------------|
//! | `x`, `eq_x`     | `x = ?`            |
//! | `neq_x`         | `x <> ?`           |
//! | `gt_x`, `lt_x`  | `x >= ?`, `x <= ?` |
//! | `in_x`, `nin_x` | `x IN`, `x NOT IN` |
//! | `like_x`        | `x LIKE ?`         |
//! | `nlike_x`       | `x NOT LIKE ?`     |
//!
//! `page`/`pagesize` paginate (the size is capped at `max_pagesize`),
//! `order_key` orders (`descId`, `asc_name`), and `#sum` lists columns summed
//! on the first page. Keys starting with `#` never become conditions.

use crate::clause::{Arg, CmpOp, Column, Expr, Limit, OrderBy};
use crate::errors::OrmError;
use crate::model::{Destination, Row};
use crate::session::Session;
use heck::{ToLowerCamelCase, ToSnakeCase};
use serde::Serialize;
use serde_json::{Map, Value as Json};
use type_mapping::{json_to_value, Value};

pub const SUM_KEY: &str = "#sum";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionalOptions {
    pub max_pagesize: u64,
    /// Keep `""` values as conditions instead of skipping them
    pub include_empty_string: bool,
}

impl Default for ConditionalOptions {
    fn default() -> Self {
        Self {
            max_pagesize: 100,
            include_empty_string: false,
        }
    }
}

impl ConditionalOptions {
    pub fn from_config(config: &config::OrmConfig) -> Self {
        Self {
            max_pagesize: config.max_pagesize,
            ..Self::default()
        }
    }
}

/// A search record: anything that serializes to an object of parameters.
/// Nested objects are flattened into the same key space.
pub trait Conditional {
    fn search_params(&self) -> Result<Map<String, Json>, OrmError>;
}

impl<T: Serialize + ?Sized> Conditional for T {
    fn search_params(&self) -> Result<Map<String, Json>, OrmError> {
        match serde_json::to_value(self) {
            Ok(Json::Object(map)) => Ok(map),
            Ok(Json::Null) => Ok(Map::new()),
            Ok(other) => Err(OrmError::user(format!("search parameters must be an object, got {other}"))),
            Err(err) => Err(OrmError::user(format!("search parameters: {err}"))),
        }
    }
}

/// Parsed search parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    pub wheres: Vec<Expr>,
    pub page: Option<u64>,
    pub pagesize: Option<u64>,
    pub order_key: Option<String>,
    pub desc: bool,
    pub sum_keys: Vec<String>,
    options: ConditionalOptions,
}

/// Total, page rows and first-page sums of a general query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneralResult {
    pub total: i64,
    /// Rows with lowerCamelCase keys
    pub list: Vec<Row>,
    pub sum: Row,
}

fn is_legal_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphabetic() || c == '_')
}

fn as_number(value: &Json) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        })
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

impl Conditions {
    pub fn new(options: ConditionalOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Parse a flat or nested parameter object
    pub fn parse(search: &Map<String, Json>, options: ConditionalOptions) -> Result<Self, OrmError> {
        let mut conditions = Self::new(options);
        conditions.walk(search)?;
        conditions.offset()?;
        Ok(conditions)
    }

    pub fn from_record<C: Conditional + ?Sized>(
        search: &C,
        options: ConditionalOptions,
    ) -> Result<Self, OrmError> {
        Self::parse(&search.search_params()?, options)
    }

    fn walk(&mut self, search: &Map<String, Json>) -> Result<(), OrmError> {
        for (key, value) in search {
            match value {
                Json::Object(nested) => self.walk(nested)?,
                _ => self.add(key, value)?,
            }
        }
        Ok(())
    }

    /// Interpret one parameter
    pub fn add(&mut self, key: &str, value: &Json) -> Result<(), OrmError> {
        if key == SUM_KEY {
            return self.add_sum_keys(value);
        }
        if key.is_empty() || key.starts_with('#') || value.is_null() {
            return Ok(());
        }
        if !self.options.include_empty_string && value.as_str() == Some("") {
            return Ok(());
        }

        let key = key.to_snake_case();
        let (op, column) = match key.as_str() {
            "page" => {
                self.page = as_number(value).map(|p| p.max(1) as u64);
                return Ok(());
            }
            "pagesize" | "page_size" => {
                self.pagesize = as_number(value).map(|p| p.max(0) as u64);
                return Ok(());
            }
            "order_key" => return self.set_order(value),
            _ => split_prefix(&key),
        };
        if column.is_empty() {
            return Ok(());
        }
        let column = Column::new(column);
        let expr = match op {
            Prefix::In | Prefix::NotIn => {
                let values = match json_to_value(value.clone()) {
                    Value::Array(items) => items.into_iter().map(Arg::Value).collect(),
                    single => vec![Arg::Value(single)],
                };
                if op == Prefix::In {
                    Expr::in_list(column, values)
                } else {
                    Expr::not_in(column, values)
                }
            }
            Prefix::Cmp(op) => Expr::cmp(op, column, Arg::Value(json_to_value(value.clone()))),
        };
        self.wheres.push(expr);
        Ok(())
    }

    fn set_order(&mut self, value: &Json) -> Result<(), OrmError> {
        let Some(raw) = value.as_str() else {
            return Err(OrmError::user(format!("illegal key: {value}")));
        };
        if raw.is_empty() {
            return Ok(());
        }
        if !is_legal_key(raw) {
            return Err(OrmError::user(format!("illegal key: {raw}")));
        }
        let key = raw.to_snake_case();
        let (column, desc) = if let Some(column) = key.strip_prefix("desc_") {
            (column, true)
        } else if let Some(column) = key.strip_prefix("asc_") {
            (column, false)
        } else {
            (key.as_str(), false)
        };
        self.order_key = Some(column.to_string());
        self.desc = desc;
        Ok(())
    }

    fn add_sum_keys(&mut self, value: &Json) -> Result<(), OrmError> {
        let keys: Vec<&str> = match value {
            Json::Array(items) => items.iter().filter_map(Json::as_str).collect(),
            Json::String(key) => vec![key.as_str()],
            _ => Vec::new(),
        };
        for key in keys {
            if !is_legal_key(key) {
                return Err(OrmError::user(format!("illegal key: {key}")));
            }
            self.sum_keys.push(key.to_snake_case());
        }
        Ok(())
    }

    /// Page size after the cap; absent or oversized sizes use the cap
    pub fn effective_pagesize(&self) -> u64 {
        match self.pagesize {
            Some(size) if size <= self.options.max_pagesize => size,
            _ => self.options.max_pagesize,
        }
    }

    /// Rows skipped before the requested page. Pages whose offset does not
    /// fit a signed 64-bit OFFSET are rejected.
    pub fn offset(&self) -> Result<Option<u64>, OrmError> {
        let Some(page) = self.page else {
            return Ok(None);
        };
        self.effective_pagesize()
            .checked_mul(page.saturating_sub(1))
            .filter(|offset| i64::try_from(*offset).is_ok())
            .map(Some)
            .ok_or_else(|| OrmError::user(format!("page {page} is out of range")))
    }

    pub fn apply_where(&self, session: Session) -> Session {
        self.wheres
            .iter()
            .cloned()
            .fold(session, |session, expr| session.where_expr(expr))
    }

    pub fn apply_page(&self, mut session: Session) -> Session {
        if let Some(column) = &self.order_key {
            session = session.clauses(OrderBy::column(Column::new(column.as_str()), self.desc));
        }
        let size = self.effective_pagesize();
        let limit = (size > 0).then_some(size);
        let offset = self
            .page
            .map(|page| size.saturating_mul(page.saturating_sub(1)));
        if limit.is_some() || offset.is_some() {
            session = session.clauses(Limit::new(limit, offset));
        }
        session
    }

    /// `sum(a) AS a, sum(b) AS b`
    fn sum_select(&self, session: &Session) -> Option<String> {
        if self.sum_keys.is_empty() {
            return None;
        }
        let stmt = session.statement();
        let parts: Vec<String> = self
            .sum_keys
            .iter()
            .map(|key| {
                let column = stmt.quote(key);
                format!("sum({column}) AS {column}")
            })
            .collect();
        Some(parts.join(", "))
    }

    fn wants_sum(&self) -> bool {
        self.page == Some(1) && !self.sum_keys.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prefix {
    Cmp(CmpOp),
    In,
    NotIn,
}

fn split_prefix(key: &str) -> (Prefix, &str) {
    const PREFIXES: [(&str, Prefix); 8] = [
        ("eq_", Prefix::Cmp(CmpOp::Eq)),
        ("neq_", Prefix::Cmp(CmpOp::Neq)),
        ("gt_", Prefix::Cmp(CmpOp::Gte)),
        ("lt_", Prefix::Cmp(CmpOp::Lte)),
        ("in_", Prefix::In),
        ("nin_", Prefix::NotIn),
        ("like_", Prefix::Cmp(CmpOp::Like)),
        ("nlike_", Prefix::Cmp(CmpOp::NotLike)),
    ];
    for (prefix, op) in PREFIXES {
        if let Some(column) = key.strip_prefix(prefix) {
            return (op, column);
        }
    }
    (Prefix::Cmp(CmpOp::Eq), key)
}

impl Session {
    /// Count, page and optionally sum the rows matching `search`
    pub async fn query_general(
        self,
        search: &Map<String, Json>,
        options: ConditionalOptions,
    ) -> Result<GeneralResult, OrmError> {
        let conditions = Conditions::parse(search, options)?;
        let filtered = conditions.apply_where(self);
        let mut result = GeneralResult::default();
        filtered.clone().count(&mut result.total).await?;
        if result.total == 0 {
            return Ok(result);
        }

        let mut rows: Vec<Row> = Vec::new();
        conditions.apply_page(filtered.clone()).find(&mut rows).await?;
        result.list = rows
            .into_iter()
            .map(|row| row.into_iter().map(|(k, v)| (k.to_lower_camel_case(), v)).collect())
            .collect();

        if conditions.wants_sum() {
            if let Some(select) = conditions.sum_select(&filtered) {
                filtered
                    .select_expr(&select, Vec::new())
                    .find(&mut result.sum)
                    .await?;
            }
        }
        Ok(result)
    }

    /// Typed variant: fill `list` with the requested page and return the
    /// total and the first-page sums
    pub async fn query_conditional<C, D>(
        self,
        search: &C,
        list: &mut D,
        options: ConditionalOptions,
    ) -> Result<(i64, Row), OrmError>
    where
        C: Conditional + ?Sized,
        D: Destination,
    {
        let conditions = Conditions::from_record(search, options)?;
        let filtered = conditions.apply_where(self);
        let mut total = 0;
        filtered.clone().count(&mut total).await?;
        let mut sum = Row::new();
        if total == 0 {
            return Ok((total, sum));
        }
        conditions.apply_page(filtered.clone()).find(list).await?;
        if conditions.wants_sum() {
            if let Some(select) = conditions.sum_select(&filtered) {
                filtered.select_expr(&select, Vec::new()).find(&mut sum).await?;
            }
        }
        Ok((total, sum))
    }
}
