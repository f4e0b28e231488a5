//! INSERT, VALUES, ON CONFLICT and RETURNING

use super::expression::build_exprs;
use super::{write_columns, Arg, Assignment, Builder, Column, Expr, Table};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Insert {
    pub table: Option<Table>,
    /// e.g. `IGNORE` for MySQL
    pub modifier: String,
}

impl Insert {
    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_str("INSERT ");
        if !self.modifier.is_empty() {
            builder.write_str(&self.modifier);
            builder.write_char(' ');
        }
        builder.write_str("INTO ");
        match &self.table {
            Some(table) => builder.write_quoted_table(table),
            None => builder.write_quoted_table(&Table::current()),
        }
    }
}

/// Column list plus a row matrix; every row has one entry per column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Arg>>,
}

impl Values {
    pub fn build(&self, builder: &mut dyn Builder) {
        if self.columns.is_empty() {
            builder.write_str("DEFAULT VALUES");
            return;
        }
        builder.write_char('(');
        write_columns(builder, &self.columns);
        builder.write_str(") VALUES ");
        for (idx, row) in self.rows.iter().enumerate() {
            if idx > 0 {
                builder.write_char(',');
            }
            builder.write_char('(');
            for (i, value) in row.iter().enumerate() {
                if i > 0 {
                    builder.write_char(',');
                }
                builder.add_var(value);
            }
            builder.write_char(')');
        }
    }
}

/// Upsert policy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OnConflict {
    pub columns: Vec<Column>,
    pub target_where: Vec<Expr>,
    pub on_constraint: String,
    pub do_nothing: bool,
    pub do_updates: Vec<Assignment>,
    pub where_: Vec<Expr>,
    /// Update every non-key column with the excluded value
    pub update_all: bool,
}

impl OnConflict {
    pub fn do_nothing() -> Self {
        Self {
            do_nothing: true,
            ..Self::default()
        }
    }

    /// `DO UPDATE SET col = excluded.col` for each of `columns`
    pub fn update_columns(conflict: Vec<Column>, columns: &[String]) -> Self {
        Self {
            columns: conflict,
            do_updates: columns.iter().map(|c| Assignment::excluded(c)).collect(),
            ..Self::default()
        }
    }

    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_str("ON CONFLICT ");
        if !self.on_constraint.is_empty() {
            builder.write_str("ON CONSTRAINT ");
            builder.write_str(&self.on_constraint);
            builder.write_char(' ');
        } else {
            if !self.columns.is_empty() {
                builder.write_char('(');
                write_columns(builder, &self.columns);
                builder.write_str(") ");
            }
            if !self.target_where.is_empty() {
                builder.write_str("WHERE ");
                let exprs: Vec<&Expr> = self.target_where.iter().collect();
                build_exprs(builder, &exprs, " AND ");
                builder.write_char(' ');
            }
        }
        if self.do_nothing || self.do_updates.is_empty() {
            builder.write_str("DO NOTHING");
        } else {
            builder.write_str("DO UPDATE SET ");
            super::update::write_assignments(builder, &self.do_updates);
        }
        if !self.where_.is_empty() {
            builder.write_str(" WHERE ");
            let exprs: Vec<&Expr> = self.where_.iter().collect();
            build_exprs(builder, &exprs, " AND ");
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Returning {
    pub columns: Vec<Column>,
}

impl Returning {
    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_str("RETURNING ");
        if self.columns.is_empty() {
            builder.write_char('*');
        } else {
            write_columns(builder, &self.columns);
        }
    }
}
