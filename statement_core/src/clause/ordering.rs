//! ORDER BY

use super::{Builder, Column, Expr};

#[derive(Debug, Clone, PartialEq)]
pub enum OrderItem {
    Column { column: Column, desc: bool },
    Expr(Expr),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBy {
    pub items: Vec<OrderItem>,
    /// Replace earlier ORDER BY entries instead of appending
    pub reorder: bool,
}

impl OrderBy {
    pub fn column(column: Column, desc: bool) -> Self {
        Self {
            items: vec![OrderItem::Column { column, desc }],
            reorder: false,
        }
    }

    pub fn expr(expr: Expr) -> Self {
        Self {
            items: vec![OrderItem::Expr(expr)],
            reorder: false,
        }
    }

    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_str("ORDER BY ");
        for (idx, item) in self.items.iter().enumerate() {
            if idx > 0 {
                builder.write_char(',');
            }
            match item {
                OrderItem::Column { column, desc } => {
                    builder.write_quoted(column);
                    if *desc {
                        builder.write_str(" DESC");
                    }
                }
                OrderItem::Expr(expr) => expr.build(builder),
            }
        }
    }
}
