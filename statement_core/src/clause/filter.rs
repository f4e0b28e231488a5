//! WHERE clause

use super::expression::build_exprs;
use super::{Builder, Expr};

/// Conjunction of conditions; `Or` entries of a single expression join with OR
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Where {
    pub exprs: Vec<Expr>,
}

impl Where {
    pub fn new(exprs: Vec<Expr>) -> Self {
        Self { exprs }
    }

    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_str("WHERE ");
        self.build_conditions(builder);
    }

    /// Conditions without the keyword, as used by JOIN ... ON and HAVING
    pub fn build_conditions(&self, builder: &mut dyn Builder) {
        let flattened: Vec<&Expr> = match self.exprs.as_slice() {
            [Expr::And(inner)] => inner.iter().collect(),
            exprs => exprs.iter().collect(),
        };
        let exprs: Vec<&Expr> = flattened.into_iter().filter(|e| !e.is_empty()).collect();
        build_exprs(builder, &exprs, " AND ");
    }
}
