//! Database dialects
//!
//! A dialect owns everything vendor specific the pipeline needs: bind
//! markers, identifier quoting, the default callback set, the duplicate-key
//! translator, catalog queries for the migrator probe and the few clauses
//! whose syntax differs from the common form.

pub mod migrator;
pub mod mysql;
pub mod oracle;
pub mod postgres;
pub mod sqlite;
pub mod sqlserver;

pub use migrator::{Migrator, MigratorProbe};
pub use mysql::MySql;
pub use oracle::Oracle;
pub use postgres::Postgres;
pub use sqlite::Sqlite;
pub use sqlserver::SqlServer;

use crate::callbacks::Callbacks;
use crate::clause::{Builder, Clause};
use crate::errors::{DbError, OrmError};
use std::fmt;
use type_mapping::Value;

/// Shape of a bind marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStyle {
    /// `?`
    Question,
    /// `$1`, `$2`
    Dollar,
    /// `@p1`, `@p2`
    AtP,
    /// `:1`, `:2`
    Colon,
}

impl BindStyle {
    /// Write the marker of the 1-based `position`
    pub fn write(self, out: &mut String, position: usize) {
        match self {
            BindStyle::Question => out.push('?'),
            BindStyle::Dollar => {
                out.push('$');
                out.push_str(&position.to_string());
            }
            BindStyle::AtP => {
                out.push_str("@p");
                out.push_str(&position.to_string());
            }
            BindStyle::Colon => {
                out.push(':');
                out.push_str(&position.to_string());
            }
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            BindStyle::Question => "?",
            BindStyle::Dollar => "$",
            BindStyle::AtP => "@p",
            BindStyle::Colon => ":",
        }
    }
}

/// What the dialect may need to know about the other clauses of a statement
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildContext {
    pub has_order_by: bool,
}

/// Turns a driver error into a typed duplicate-key error
pub trait ErrorTranslator: Send + Sync {
    fn translate(&self, err: &DbError) -> Option<OrmError>;
}

/// Duplicate-key detection by vendor code or message fragment
#[derive(Debug, Clone, Copy)]
pub struct DuplicateKeyCodes {
    pub codes: &'static [&'static str],
    pub messages: &'static [&'static str],
}

impl ErrorTranslator for DuplicateKeyCodes {
    fn translate(&self, err: &DbError) -> Option<OrmError> {
        let by_code = err
            .code
            .as_deref()
            .is_some_and(|code| self.codes.contains(&code));
        let by_message = self.messages.iter().any(|m| err.message.contains(m));
        if !by_code && !by_message {
            return None;
        }
        let code = err
            .code
            .clone()
            .or_else(|| self.codes.first().map(|c| c.to_string()))
            .unwrap_or_default();
        Some(OrmError::DuplicatedKey {
            code,
            message: err.message.clone(),
        })
    }
}

pub trait Dialect: MigratorProbe + Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn bind_style(&self) -> BindStyle;

    /// Opening and closing identifier quote
    fn quote_chars(&self) -> (char, char);

    /// Whether INSERT/UPDATE can hand generated values back through RETURNING
    fn supports_returning(&self) -> bool {
        false
    }

    /// Register the default stages into a fresh registry
    fn initialize(&self, callbacks: &Callbacks) -> Result<(), OrmError> {
        crate::stages::register_defaults(callbacks)
    }

    fn bind_var(&self, out: &mut String, position: usize) {
        self.bind_style().write(out, position)
    }

    /// Quote an identifier; dotted names quote each part
    fn quote_to(&self, out: &mut String, ident: &str) {
        let (open, close) = self.quote_chars();
        for (idx, part) in ident.split('.').enumerate() {
            if idx > 0 {
                out.push('.');
            }
            if part == "*" {
                out.push('*');
                continue;
            }
            out.push(open);
            for c in part.chars() {
                out.push(c);
                if c == close {
                    out.push(close);
                }
            }
            out.push(close);
        }
    }

    fn translator(&self) -> Option<&dyn ErrorTranslator> {
        None
    }

    /// Statement text with the variables inlined, for logs only
    fn explain(&self, sql: &str, vars: &[Value]) -> String {
        explain(sql, self.bind_style(), vars)
    }

    fn save_point_sql(&self, name: &str) -> String {
        format!("SAVEPOINT {name}")
    }

    fn rollback_to_sql(&self, name: &str) -> String {
        format!("ROLLBACK TO SAVEPOINT {name}")
    }

    /// Render `clause` in the vendor's own syntax; `false` falls back to the
    /// common rendering
    #[allow(unused_variables)]
    fn build_clause(&self, clause: &Clause, builder: &mut dyn Builder, ctx: BuildContext) -> bool {
        false
    }

    fn migrator(&self) -> &dyn MigratorProbe;
}

/// Inline `vars` into `sql` in place of its bind markers
pub fn explain(sql: &str, style: BindStyle, vars: &[Value]) -> String {
    let mut out = String::with_capacity(sql.len() + vars.len() * 8);
    let chars: Vec<char> = sql.chars().collect();
    let prefix: Vec<char> = style.prefix().chars().collect();
    let mut quote: Option<char> = None;
    let mut next = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        if matches!(c, '\'' | '"' | '`') {
            quote = Some(c);
            out.push(c);
            i += 1;
            continue;
        }
        if chars[i..].starts_with(&prefix) {
            if style == BindStyle::Question {
                match vars.get(next) {
                    Some(v) => out.push_str(&literal(v)),
                    None => out.push('?'),
                }
                next += 1;
                i += 1;
                continue;
            }
            let start = i + prefix.len();
            let end = chars[start..]
                .iter()
                .position(|c| !c.is_ascii_digit())
                .map_or(chars.len(), |p| start + p);
            if end > start {
                let digits: String = chars[start..end].iter().collect();
                let value = digits
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|n| vars.get(n));
                match value {
                    Some(v) => out.push_str(&literal(v)),
                    None => out.extend(&chars[i..end]),
                }
                i = end;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bytes(b) => format!("'<binary {} bytes>'", b.len()),
        Value::Time(t) => format!("'{}'", t.format("%Y-%m-%d %H:%M:%S%.6f")),
        Value::Uuid(u) => format!("'{u}'"),
        Value::Json(j) => format!("'{}'", j.to_string().replace('\'', "''")),
        Value::Array(items) => format!(
            "({})",
            items.iter().map(literal).collect::<Vec<_>>().join(",")
        ),
    }
}

/// Dialect matching a `database.dialect` configuration value
pub fn by_name(name: &str) -> Option<std::sync::Arc<dyn Dialect>> {
    let dialect: std::sync::Arc<dyn Dialect> = match name.to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" | "pg" => std::sync::Arc::new(Postgres),
        "mysql" | "mariadb" => std::sync::Arc::new(MySql),
        "sqlite" | "sqlite3" => std::sync::Arc::new(Sqlite),
        "sqlserver" | "mssql" => std::sync::Arc::new(SqlServer),
        "oracle" => std::sync::Arc::new(Oracle),
        _ => return None,
    };
    Some(dialect)
}
