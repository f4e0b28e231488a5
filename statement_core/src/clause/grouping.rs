//! GROUP BY / HAVING

use super::expression::build_exprs;
use super::{write_columns, Builder, Column, Expr};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupBy {
    pub columns: Vec<Column>,
    pub having: Vec<Expr>,
}

impl GroupBy {
    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_str("GROUP BY ");
        write_columns(builder, &self.columns);
        if !self.having.is_empty() {
            builder.write_str(" HAVING ");
            let having: Vec<&Expr> = self.having.iter().collect();
            build_exprs(builder, &having, " AND ");
        }
    }
}
