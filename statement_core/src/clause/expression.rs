//! Condition expressions
//!
//! Comparisons, set membership, raw fragments and the And/Or/Not
//! combinators. Every node writes exactly one bind marker per value it
//! appends to the builder.

use super::{Arg, Builder, Clause, Column};
use type_mapping::Value;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
}

impl CmpOp {
    pub fn sql(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Neq => "<>",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
            CmpOp::Like => "LIKE",
            CmpOp::NotLike => "NOT LIKE",
        }
    }

    pub fn negate(self) -> CmpOp {
        match self {
            CmpOp::Eq => CmpOp::Neq,
            CmpOp::Neq => CmpOp::Eq,
            CmpOp::Gt => CmpOp::Lte,
            CmpOp::Gte => CmpOp::Lt,
            CmpOp::Lt => CmpOp::Gte,
            CmpOp::Lte => CmpOp::Gt,
            CmpOp::Like => CmpOp::NotLike,
            CmpOp::NotLike => CmpOp::Like,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// SQL fragment with `?` markers
    Raw {
        sql: String,
        vars: Vec<Arg>,
        /// Expand list arguments in place instead of wrapping them in `( )`
        without_parentheses: bool,
    },
    /// SQL fragment with `@name` markers
    Named { sql: String, vars: Vec<(String, Arg)> },
    Cmp { op: CmpOp, column: Column, value: Arg },
    In { column: Column, values: Vec<Arg>, negated: bool },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Vec<Expr>),
}

impl Expr {
    pub fn raw(sql: impl Into<String>, vars: Vec<Arg>) -> Self {
        Expr::Raw {
            sql: sql.into(),
            vars,
            without_parentheses: false,
        }
    }

    pub fn named(sql: impl Into<String>, vars: Vec<(String, Arg)>) -> Self {
        Expr::Named {
            sql: sql.into(),
            vars,
        }
    }

    pub fn cmp(op: CmpOp, column: Column, value: impl Into<Arg>) -> Self {
        Expr::Cmp {
            op,
            column,
            value: value.into(),
        }
    }

    pub fn eq(column: Column, value: impl Into<Arg>) -> Self {
        Self::cmp(CmpOp::Eq, column, value)
    }

    pub fn neq(column: Column, value: impl Into<Arg>) -> Self {
        Self::cmp(CmpOp::Neq, column, value)
    }

    pub fn gt(column: Column, value: impl Into<Arg>) -> Self {
        Self::cmp(CmpOp::Gt, column, value)
    }

    pub fn gte(column: Column, value: impl Into<Arg>) -> Self {
        Self::cmp(CmpOp::Gte, column, value)
    }

    pub fn lt(column: Column, value: impl Into<Arg>) -> Self {
        Self::cmp(CmpOp::Lt, column, value)
    }

    pub fn lte(column: Column, value: impl Into<Arg>) -> Self {
        Self::cmp(CmpOp::Lte, column, value)
    }

    pub fn like(column: Column, value: impl Into<Arg>) -> Self {
        Self::cmp(CmpOp::Like, column, value)
    }

    pub fn not_like(column: Column, value: impl Into<Arg>) -> Self {
        Self::cmp(CmpOp::NotLike, column, value)
    }

    pub fn in_list(column: Column, values: Vec<Arg>) -> Self {
        Expr::In {
            column,
            values,
            negated: false,
        }
    }

    pub fn not_in(column: Column, values: Vec<Arg>) -> Self {
        Expr::In {
            column,
            values,
            negated: true,
        }
    }

    pub fn and(exprs: Vec<Expr>) -> Self {
        Expr::And(exprs)
    }

    pub fn or(exprs: Vec<Expr>) -> Self {
        Expr::Or(exprs)
    }

    pub fn not(exprs: Vec<Expr>) -> Self {
        Expr::Not(exprs)
    }

    pub fn build(&self, builder: &mut dyn Builder) {
        match self {
            Expr::Raw {
                sql,
                vars,
                without_parentheses,
            } => build_raw(builder, sql, vars, *without_parentheses),
            Expr::Named { sql, vars } => build_named(builder, sql, vars),
            Expr::Cmp { op, column, value } => build_cmp(builder, *op, column, value),
            Expr::In {
                column,
                values,
                negated,
            } => build_in(builder, column, values, *negated),
            Expr::And(exprs) => build_group(builder, exprs, " AND "),
            Expr::Or(exprs) => build_group(builder, exprs, " OR "),
            Expr::Not(exprs) => build_not(builder, exprs),
        }
    }

    /// Render the negation where the node has a direct negated form
    fn build_negated(&self, builder: &mut dyn Builder) -> bool {
        match self {
            Expr::Cmp { op, column, value } => {
                build_cmp(builder, op.negate(), column, value);
                true
            }
            Expr::In {
                column,
                values,
                negated,
            } => {
                build_in(builder, column, values, !negated);
                true
            }
            _ => false,
        }
    }

    /// Upper-cased raw SQL, for the parenthesization checks
    fn raw_sql(&self) -> Option<String> {
        match self {
            Expr::Raw { sql, .. } | Expr::Named { sql, .. } => Some(sql.to_ascii_uppercase()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Expr::Raw { sql, vars, .. } => sql.is_empty() && vars.is_empty(),
            Expr::And(e) | Expr::Or(e) | Expr::Not(e) => e.iter().all(Expr::is_empty),
            _ => false,
        }
    }
}

fn build_raw(builder: &mut dyn Builder, sql: &str, vars: &[Arg], without_parentheses: bool) {
    let mut idx = 0;
    let mut after_parenthesis = false;
    for c in sql.chars() {
        if c == '?' && idx < vars.len() {
            match &vars[idx] {
                Arg::Value(Value::Array(items)) if after_parenthesis || without_parentheses => {
                    if items.is_empty() {
                        builder.add_var(&Arg::Value(Value::Null));
                    }
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            builder.write_char(',');
                        }
                        builder.add_var(&Arg::Value(item.clone()));
                    }
                }
                other => builder.add_var(other),
            }
            idx += 1;
            after_parenthesis = false;
        } else {
            builder.write_char(c);
            after_parenthesis = c == '(';
        }
    }
    if idx < vars.len() {
        builder.add_error(crate::errors::OrmError::user(format!(
            "expression {sql:?} has {} unbound variables",
            vars.len() - idx
        )));
    }
}

fn build_named(builder: &mut dyn Builder, sql: &str, vars: &[(String, Arg)]) {
    let chars: Vec<char> = sql.chars().collect();
    let mut positional = vars.iter().map(|(_, arg)| arg);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '@' {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                end += 1;
            }
            let name: String = chars[start..end].iter().collect();
            match vars.iter().find(|(n, _)| *n == name) {
                Some((_, arg)) if !name.is_empty() => builder.add_var(arg),
                _ => {
                    builder.write_char('@');
                    builder.write_str(&name);
                }
            }
            i = end;
            continue;
        }
        if c == '?' {
            match positional.next() {
                Some(arg) => builder.add_var(arg),
                None => builder.write_char('?'),
            }
        } else {
            builder.write_char(c);
        }
        i += 1;
    }
}

fn build_cmp(builder: &mut dyn Builder, op: CmpOp, column: &Column, value: &Arg) {
    builder.write_quoted(column);
    match (op, value) {
        (CmpOp::Eq, Arg::Value(Value::Null)) => builder.write_str(" IS NULL"),
        (CmpOp::Neq, Arg::Value(Value::Null)) => builder.write_str(" IS NOT NULL"),
        (CmpOp::Eq, Arg::Value(Value::Array(_))) => {
            builder.write_str(" IN ");
            builder.add_var(value);
        }
        (CmpOp::Neq, Arg::Value(Value::Array(_))) => {
            builder.write_str(" NOT IN ");
            builder.add_var(value);
        }
        _ => {
            builder.write_char(' ');
            builder.write_str(op.sql());
            builder.write_char(' ');
            builder.add_var(value);
        }
    }
}

fn build_in(builder: &mut dyn Builder, column: &Column, values: &[Arg], negated: bool) {
    builder.write_quoted(column);
    match values {
        [] if negated => builder.write_str(" IS NOT NULL"),
        [] => builder.write_str(" IN (NULL)"),
        [single] if !matches!(single, Arg::Value(Value::Array(_))) => {
            builder.write_str(if negated { " <> " } else { " = " });
            builder.add_var(single);
        }
        _ => {
            builder.write_str(if negated { " NOT IN (" } else { " IN (" });
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    builder.write_char(',');
                }
                builder.add_var(value);
            }
            builder.write_char(')');
        }
    }
}

fn build_group(builder: &mut dyn Builder, exprs: &[Expr], joiner: &str) {
    let exprs: Vec<&Expr> = exprs.iter().filter(|e| !e.is_empty()).collect();
    if exprs.len() > 1 {
        builder.write_char('(');
        build_exprs(builder, &exprs, joiner);
        builder.write_char(')');
    } else {
        build_exprs(builder, &exprs, joiner);
    }
}

fn build_not(builder: &mut dyn Builder, exprs: &[Expr]) {
    let exprs: Vec<&Expr> = exprs.iter().filter(|e| !e.is_empty()).collect();
    if exprs.len() > 1 {
        builder.write_char('(');
    }
    for (idx, expr) in exprs.iter().enumerate() {
        if idx > 0 {
            builder.write_str(" AND ");
        }
        if expr.build_negated(builder) {
            continue;
        }
        builder.write_str("NOT ");
        let wrap = expr
            .raw_sql()
            .is_some_and(|sql| sql.contains(" AND ") || sql.contains(" OR "));
        if wrap {
            builder.write_char('(');
            expr.build(builder);
            builder.write_char(')');
        } else {
            expr.build(builder);
        }
    }
    if exprs.len() > 1 {
        builder.write_char(')');
    }
}

/// Join `exprs` with `joiner`, parenthesizing raw fragments that would
/// otherwise bind differently
pub(crate) fn build_exprs(builder: &mut dyn Builder, exprs: &[&Expr], joiner: &str) {
    for (idx, expr) in exprs.iter().enumerate() {
        if idx > 0 {
            match expr {
                Expr::Or(inner) if inner.len() == 1 => builder.write_str(" OR "),
                _ => builder.write_str(joiner),
            }
        }
        let wrap = exprs.len() > 1
            && match expr {
                Expr::Or(inner) if inner.len() == 1 => inner[0]
                    .raw_sql()
                    .is_some_and(|sql| sql.contains(" AND ") || sql.contains(" OR ")),
                Expr::And(inner) if inner.len() == 1 => {
                    inner[0].raw_sql().is_some_and(|sql| sql.contains(" OR "))
                }
                Expr::Raw { .. } | Expr::Named { .. } => {
                    expr.raw_sql().is_some_and(|sql| sql.contains(" OR "))
                }
                _ => false,
            };
        if wrap {
            builder.write_char('(');
            expr.build(builder);
            builder.write_char(')');
        } else {
            expr.build(builder);
        }
    }
}

/// A SELECT rendered inline as `( ... )`, sharing the outer variable list
#[derive(Debug, Clone, PartialEq)]
pub struct SubQuery {
    pub clauses: Vec<Clause>,
}

impl SubQuery {
    pub fn new(clauses: Vec<Clause>) -> Self {
        Self { clauses }
    }

    pub fn build(&self, builder: &mut dyn Builder) {
        let mut first = true;
        for clause in &self.clauses {
            if clause.expression.is_empty() {
                continue;
            }
            if !first {
                builder.write_char(' ');
            }
            first = false;
            clause.build(builder);
        }
    }
}
