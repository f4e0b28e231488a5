//! UPDATE and SET

use super::{Arg, Builder, Column, Table};

/// Sentinel table name marking the excluded row of an upsert
pub const EXCLUDED: &str = "excluded";

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: Column,
    pub value: Arg,
}

impl Assignment {
    pub fn new(column: Column, value: impl Into<Arg>) -> Self {
        Self {
            column,
            value: value.into(),
        }
    }

    /// `column = excluded.column`
    pub fn excluded(column: &str) -> Self {
        Self {
            column: Column::new(column),
            value: Arg::Column(Column::new(column).of(EXCLUDED)),
        }
    }

    pub fn is_excluded(&self) -> bool {
        matches!(&self.value, Arg::Column(c) if c.table == EXCLUDED)
    }
}

pub(crate) fn write_assignments(builder: &mut dyn Builder, assignments: &[Assignment]) {
    for (idx, assignment) in assignments.iter().enumerate() {
        if idx > 0 {
            builder.write_char(',');
        }
        builder.write_quoted(&assignment.column);
        builder.write_char('=');
        builder.add_var(&assignment.value);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub table: Option<Table>,
    pub modifier: String,
}

impl Update {
    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_str("UPDATE ");
        if !self.modifier.is_empty() {
            builder.write_str(&self.modifier);
            builder.write_char(' ');
        }
        match &self.table {
            Some(table) => builder.write_quoted_table(table),
            None => builder.write_quoted_table(&Table::current()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Set {
    pub assignments: Vec<Assignment>,
}

impl Set {
    pub fn new(assignments: Vec<Assignment>) -> Self {
        Self { assignments }
    }

    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_str("SET ");
        if self.assignments.is_empty() {
            // no-op assignment keeps the statement valid
            let pk = Column::primary_key();
            builder.write_quoted(&pk);
            builder.write_char('=');
            builder.write_quoted(&pk);
        } else {
            write_assignments(builder, &self.assignments);
        }
    }
}
