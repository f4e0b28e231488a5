//! SQLite

use super::{BindStyle, BuildContext, Dialect, DuplicateKeyCodes, ErrorTranslator, MigratorProbe};
use crate::args;
use crate::clause::{Builder, Clause, ClauseExpr, Expr};

const DUPLICATE_KEY: DuplicateKeyCodes = DuplicateKeyCodes {
    // SQLITE_CONSTRAINT_PRIMARYKEY, SQLITE_CONSTRAINT_UNIQUE
    codes: &["1555", "2067"],
    messages: &["UNIQUE constraint failed"],
};

#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn bind_style(&self) -> BindStyle {
        BindStyle::Question
    }

    fn quote_chars(&self) -> (char, char) {
        ('`', '`')
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn translator(&self) -> Option<&dyn ErrorTranslator> {
        Some(&DUPLICATE_KEY)
    }

    fn rollback_to_sql(&self, name: &str) -> String {
        format!("ROLLBACK TO {name}")
    }

    fn build_clause(&self, clause: &Clause, builder: &mut dyn Builder, _ctx: BuildContext) -> bool {
        match &clause.expression {
            // SQLite has no FOR UPDATE; the database lock covers it
            ClauseExpr::Locking(_) => true,
            ClauseExpr::Limit(limit) if limit.limit.is_none() => {
                if let Some(offset) = limit.offset.filter(|o| *o > 0) {
                    builder.write_str(&format!("LIMIT -1 OFFSET {offset}"));
                }
                true
            }
            _ => false,
        }
    }

    fn migrator(&self) -> &dyn MigratorProbe {
        self
    }
}

impl MigratorProbe for Sqlite {
    fn current_database_sql(&self) -> Expr {
        Expr::raw("SELECT name FROM pragma_database_list WHERE seq = 0", args![])
    }

    fn has_table_sql(&self, _database: &str, table: &str) -> Expr {
        Expr::raw(
            "SELECT count(*) FROM sqlite_master WHERE type = ? AND name = ?",
            args!["table", table],
        )
    }

    fn has_column_sql(&self, _database: &str, table: &str, column: &str) -> Expr {
        Expr::raw(
            "SELECT count(*) FROM pragma_table_info(?) WHERE name = ?",
            args![table, column],
        )
    }
}
