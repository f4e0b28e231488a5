//! PostgreSQL

use super::{BindStyle, Dialect, DuplicateKeyCodes, ErrorTranslator, MigratorProbe};
use crate::args;
use crate::clause::Expr;

const DUPLICATE_KEY: DuplicateKeyCodes = DuplicateKeyCodes {
    codes: &["23505"],
    messages: &[],
};

#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn bind_style(&self) -> BindStyle {
        BindStyle::Dollar
    }

    fn quote_chars(&self) -> (char, char) {
        ('"', '"')
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn translator(&self) -> Option<&dyn ErrorTranslator> {
        Some(&DUPLICATE_KEY)
    }

    fn migrator(&self) -> &dyn MigratorProbe {
        self
    }
}

impl MigratorProbe for Postgres {
    fn current_database_sql(&self) -> Expr {
        Expr::raw("SELECT CURRENT_DATABASE()", args![])
    }

    fn has_table_sql(&self, _database: &str, table: &str) -> Expr {
        Expr::raw(
            "SELECT count(*) FROM information_schema.tables WHERE table_schema = CURRENT_SCHEMA() \
             AND table_name = ? AND table_type = ?",
            args![table, "BASE TABLE"],
        )
    }

    fn has_column_sql(&self, _database: &str, table: &str, column: &str) -> Expr {
        Expr::raw(
            "SELECT count(*) FROM INFORMATION_SCHEMA.columns WHERE table_schema = CURRENT_SCHEMA() \
             AND table_name = ? AND column_name = ?",
            args![table, column],
        )
    }
}
