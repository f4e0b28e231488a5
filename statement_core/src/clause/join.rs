//! FROM clause and joins

use super::{Builder, Expr, Table, Where};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Cross,
    Inner,
    Left,
    Right,
}

impl JoinType {
    pub fn sql(self) -> &'static str {
        match self {
            JoinType::Cross => "CROSS",
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinType,
    pub table: Table,
    pub on: Where,
    pub using: Vec<String>,
    /// Raw join fragment, rendered verbatim in place of the structured form
    pub expression: Option<Expr>,
}

impl Join {
    pub fn new(kind: JoinType, table: Table, on: Vec<Expr>) -> Self {
        Self {
            kind,
            table,
            on: Where::new(on),
            using: Vec::new(),
            expression: None,
        }
    }

    pub fn raw(expression: Expr) -> Self {
        Self {
            kind: JoinType::Inner,
            table: Table::new(""),
            on: Where::default(),
            using: Vec::new(),
            expression: Some(expression),
        }
    }

    pub fn build(&self, builder: &mut dyn Builder) {
        if let Some(expr) = &self.expression {
            expr.build(builder);
            return;
        }
        builder.write_str(self.kind.sql());
        builder.write_str(" JOIN ");
        builder.write_quoted_table(&self.table);
        if !self.on.exprs.is_empty() {
            builder.write_str(" ON ");
            self.on.build_conditions(builder);
        } else if !self.using.is_empty() {
            builder.write_str(" USING (");
            for (idx, column) in self.using.iter().enumerate() {
                if idx > 0 {
                    builder.write_char(',');
                }
                builder.write_quoted(&super::Column::new(column.as_str()));
            }
            builder.write_char(')');
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct From {
    pub tables: Vec<Table>,
    pub joins: Vec<Join>,
}

impl From {
    pub fn table(table: Table) -> Self {
        Self {
            tables: vec![table],
            joins: Vec::new(),
        }
    }

    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_str("FROM ");
        if self.tables.is_empty() {
            builder.write_quoted_table(&Table::current());
        } else {
            for (idx, table) in self.tables.iter().enumerate() {
                if idx > 0 {
                    builder.write_char(',');
                }
                builder.write_quoted_table(table);
            }
        }
        for join in &self.joins {
            builder.write_char(' ');
            join.build(builder);
        }
    }
}
