//! MySQL / MariaDB

use super::{BindStyle, BuildContext, Dialect, DuplicateKeyCodes, ErrorTranslator, MigratorProbe};
use crate::args;
use crate::clause::{Builder, Clause, ClauseExpr, Column, Expr, PRIMARY_KEY};

const DUPLICATE_KEY: DuplicateKeyCodes = DuplicateKeyCodes {
    codes: &["1062"],
    messages: &["Duplicate entry"],
};

#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn bind_style(&self) -> BindStyle {
        BindStyle::Question
    }

    fn quote_chars(&self) -> (char, char) {
        ('`', '`')
    }

    fn translator(&self) -> Option<&dyn ErrorTranslator> {
        Some(&DUPLICATE_KEY)
    }

    fn build_clause(&self, clause: &Clause, builder: &mut dyn Builder, _ctx: BuildContext) -> bool {
        match &clause.expression {
            ClauseExpr::OnConflict(conflict) => {
                builder.write_str("ON DUPLICATE KEY UPDATE ");
                if conflict.do_nothing || conflict.do_updates.is_empty() {
                    // tables without a schema name their key through the conflict columns
                    let key = match conflict.columns.first() {
                        Some(column) => Column::new(column.name.as_str()),
                        None => Column::new(PRIMARY_KEY),
                    };
                    builder.write_quoted(&key);
                    builder.write_char('=');
                    builder.write_quoted(&key);
                    return true;
                }
                for (idx, assignment) in conflict.do_updates.iter().enumerate() {
                    if idx > 0 {
                        builder.write_char(',');
                    }
                    builder.write_quoted(&assignment.column);
                    builder.write_char('=');
                    if assignment.is_excluded() {
                        builder.write_str("VALUES(");
                        builder.write_quoted(&Column::new(assignment.column.name.as_str()));
                        builder.write_char(')');
                    } else {
                        builder.add_var(&assignment.value);
                    }
                }
                true
            }
            // OFFSET needs a LIMIT in MySQL
            ClauseExpr::Limit(limit) if limit.limit.is_none() => {
                if let Some(offset) = limit.offset.filter(|o| *o > 0) {
                    builder.write_str(&format!("LIMIT 18446744073709551615 OFFSET {offset}"));
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

impl MigratorProbe for MySql {
    fn current_database_sql(&self) -> Expr {
        Expr::raw("SELECT DATABASE()", args![])
    }

    fn has_table_sql(&self, database: &str, table: &str) -> Expr {
        Expr::raw(
            "SELECT count(*) FROM information_schema.tables WHERE table_schema = ? \
             AND table_name = ? AND table_type = ?",
            args![database, table, "BASE TABLE"],
        )
    }

    fn has_column_sql(&self, database: &str, table: &str, column: &str) -> Expr {
        Expr::raw(
            "SELECT count(*) FROM INFORMATION_SCHEMA.columns WHERE table_schema = ? \
             AND table_name = ? AND column_name = ?",
            args![database, table, column],
        )
    }
}
