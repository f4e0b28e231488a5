//! Oracle

use super::sqlserver::write_fetch;
use super::{BindStyle, BuildContext, Dialect, DuplicateKeyCodes, ErrorTranslator, MigratorProbe};
use crate::args;
use crate::clause::{Builder, Clause, ClauseExpr, Expr};

const DUPLICATE_KEY: DuplicateKeyCodes = DuplicateKeyCodes {
    codes: &["1", "ORA-00001"],
    messages: &["ORA-00001"],
};

#[derive(Debug, Clone, Copy, Default)]
pub struct Oracle;

impl Dialect for Oracle {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn bind_style(&self) -> BindStyle {
        BindStyle::Colon
    }

    fn quote_chars(&self) -> (char, char) {
        ('"', '"')
    }

    fn translator(&self) -> Option<&dyn ErrorTranslator> {
        Some(&DUPLICATE_KEY)
    }

    fn build_clause(&self, clause: &Clause, builder: &mut dyn Builder, _ctx: BuildContext) -> bool {
        match &clause.expression {
            ClauseExpr::Limit(limit) => {
                write_fetch(builder, limit);
                true
            }
            ClauseExpr::OnConflict(_) => true,
            _ => false,
        }
    }

    fn migrator(&self) -> &dyn MigratorProbe {
        self
    }
}

impl MigratorProbe for Oracle {
    fn current_database_sql(&self) -> Expr {
        Expr::raw("SELECT ORA_DATABASE_NAME FROM DUAL", args![])
    }

    fn has_table_sql(&self, _database: &str, table: &str) -> Expr {
        Expr::raw("SELECT COUNT(*) FROM USER_TABLES WHERE TABLE_NAME = ?", args![table])
    }

    fn has_column_sql(&self, _database: &str, table: &str, column: &str) -> Expr {
        Expr::raw(
            "SELECT COUNT(*) FROM USER_TAB_COLUMNS WHERE TABLE_NAME = ? AND COLUMN_NAME = ?",
            args![table, column],
        )
    }
}
