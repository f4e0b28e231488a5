//! SELECT and row-locking clauses

use super::{write_columns, Builder, Column, Expr, Table};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub columns: Vec<Column>,
    /// Replaces the column list when set (`SELECT count(*)`, raw selects)
    pub expression: Option<Expr>,
}

impl Select {
    pub fn columns(columns: Vec<Column>) -> Self {
        Self {
            columns,
            ..Self::default()
        }
    }

    pub fn expr(expression: Expr) -> Self {
        Self {
            expression: Some(expression),
            ..Self::default()
        }
    }

    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_str("SELECT ");
        if self.distinct {
            builder.write_str("DISTINCT ");
        }
        if let Some(expr) = &self.expression {
            expr.build(builder);
        } else if self.columns.is_empty() {
            builder.write_char('*');
        } else {
            write_columns(builder, &self.columns);
        }
    }
}

/// `FOR UPDATE` / `FOR SHARE` with optional table and NOWAIT / SKIP LOCKED
#[derive(Debug, Clone, PartialEq)]
pub struct Locking {
    pub strength: String,
    pub table: Option<Table>,
    pub options: String,
}

impl Locking {
    pub fn update() -> Self {
        Self {
            strength: "UPDATE".to_string(),
            table: None,
            options: String::new(),
        }
    }

    pub fn share() -> Self {
        Self {
            strength: "SHARE".to_string(),
            ..Self::update()
        }
    }

    pub fn options(mut self, options: &str) -> Self {
        self.options = options.to_string();
        self
    }

    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_str("FOR ");
        builder.write_str(&self.strength);
        if let Some(table) = &self.table {
            builder.write_str(" OF ");
            builder.write_quoted_table(table);
        }
        if !self.options.is_empty() {
            builder.write_char(' ');
            builder.write_str(&self.options);
        }
    }
}
