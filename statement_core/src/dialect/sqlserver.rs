//! Microsoft SQL Server

use super::{BindStyle, BuildContext, Dialect, DuplicateKeyCodes, ErrorTranslator, MigratorProbe};
use crate::args;
use crate::clause::{Builder, Clause, ClauseExpr, Expr, Limit};

const DUPLICATE_KEY: DuplicateKeyCodes = DuplicateKeyCodes {
    codes: &["2627", "2601"],
    messages: &["Violation of PRIMARY KEY constraint", "Cannot insert duplicate key"],
};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServer;

/// `OFFSET .. ROWS FETCH NEXT .. ROWS ONLY`, shared with Oracle
pub(crate) fn write_fetch(builder: &mut dyn Builder, limit: &Limit) {
    builder.write_str(&format!("OFFSET {} ROWS", limit.offset.unwrap_or(0)));
    if let Some(count) = limit.limit {
        builder.write_str(&format!(" FETCH NEXT {count} ROWS ONLY"));
    }
}

impl Dialect for SqlServer {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn bind_style(&self) -> BindStyle {
        BindStyle::AtP
    }

    fn quote_chars(&self) -> (char, char) {
        ('[', ']')
    }

    fn translator(&self) -> Option<&dyn ErrorTranslator> {
        Some(&DUPLICATE_KEY)
    }

    fn save_point_sql(&self, name: &str) -> String {
        format!("SAVE TRANSACTION {name}")
    }

    fn rollback_to_sql(&self, name: &str) -> String {
        format!("ROLLBACK TRANSACTION {name}")
    }

    fn build_clause(&self, clause: &Clause, builder: &mut dyn Builder, ctx: BuildContext) -> bool {
        match &clause.expression {
            ClauseExpr::Limit(limit) => {
                // OFFSET/FETCH is only valid after an ORDER BY
                if !ctx.has_order_by {
                    builder.write_str("ORDER BY (SELECT NULL) ");
                }
                write_fetch(builder, limit);
                true
            }
            // upserts need MERGE; conflicts surface as duplicate-key errors
            ClauseExpr::OnConflict(_) | ClauseExpr::Locking(_) => true,
            _ => false,
        }
    }

    fn migrator(&self) -> &dyn MigratorProbe {
        self
    }
}

impl MigratorProbe for SqlServer {
    fn current_database_sql(&self) -> Expr {
        Expr::raw("SELECT DB_NAME()", args![])
    }

    fn has_table_sql(&self, database: &str, table: &str) -> Expr {
        Expr::raw(
            "SELECT count(*) FROM INFORMATION_SCHEMA.tables WHERE table_name = ? AND table_catalog = ?",
            args![table, database],
        )
    }

    fn has_column_sql(&self, database: &str, table: &str, column: &str) -> Expr {
        Expr::raw(
            "SELECT count(*) FROM INFORMATION_SCHEMA.columns WHERE table_catalog = ? \
             AND table_name = ? AND column_name = ?",
            args![database, table, column],
        )
    }
}
