//! Chain methods: each consumes the session and returns it extended

use super::{Session, SessionConfig};
use crate::cancel::CancelToken;
use crate::clause::{
    Arg, Clause, ClauseExpr, Column, Expr, GroupBy, JoinType, Limit, OrderBy, Select, Where,
};
use crate::model::{Model, ModelRef, Row};
use crate::statement::{JoinRequest, Preload, Statement};
use std::sync::Arc;
use type_mapping::Value;

impl Session {
    /// Record type whose schema and table the statement uses
    pub fn model<M: Model>(mut self) -> Self {
        self.stmt.model = Some(ModelRef::of::<M>());
        self.stmt.schema = None;
        self
    }

    pub fn table(mut self, name: &str) -> Self {
        self.stmt.table = name.to_string();
        self
    }

    /// Restrict the written or read columns; relation names select
    /// associations to save, `*` selects everything
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.stmt
            .selects
            .extend(columns.iter().map(|c| c.to_string()));
        self
    }

    /// Raw SELECT list such as `count(*)` or `name, age + ? AS next`
    pub fn select_expr(mut self, sql: &str, args: Vec<Arg>) -> Self {
        self.stmt.add_clause(Select::expr(Expr::raw(sql, args)));
        self
    }

    pub fn omit(mut self, columns: &[&str]) -> Self {
        self.stmt.omits.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn where_(self, sql: &str, args: Vec<Arg>) -> Self {
        self.where_expr(Expr::raw(sql, args))
    }

    pub fn where_expr(mut self, expr: Expr) -> Self {
        if !expr.is_empty() {
            self.stmt.add_clause(Where::new(vec![expr]));
        }
        self
    }

    /// Equality condition per entry, keys being column names
    pub fn where_map(self, conditions: Row) -> Self {
        let exprs = conditions
            .into_iter()
            .map(|(column, value)| Expr::eq(Column::current(column), value))
            .collect();
        self.where_expr(Expr::and(exprs))
    }

    pub fn or(self, sql: &str, args: Vec<Arg>) -> Self {
        self.or_expr(Expr::raw(sql, args))
    }

    pub fn or_expr(mut self, expr: Expr) -> Self {
        if !expr.is_empty() {
            self.stmt.add_clause(Where::new(vec![Expr::or(vec![expr])]));
        }
        self
    }

    pub fn not(self, sql: &str, args: Vec<Arg>) -> Self {
        self.not_expr(Expr::raw(sql, args))
    }

    pub fn not_expr(mut self, expr: Expr) -> Self {
        if !expr.is_empty() {
            self.stmt.add_clause(Where::new(vec![Expr::not(vec![expr])]));
        }
        self
    }

    /// Raw ordering such as `age desc, name`
    pub fn order(mut self, order: &str) -> Self {
        self.stmt.add_clause(OrderBy::column(Column::raw(order), false));
        self
    }

    pub fn order_by(mut self, column: &str, desc: bool) -> Self {
        self.stmt.add_clause(OrderBy::column(Column::new(column), desc));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.stmt.add_clause(Limit::new(Some(limit), None));
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.stmt.add_clause(Limit::new(None, Some(offset)));
        self
    }

    pub fn group(mut self, column: &str) -> Self {
        self.stmt.add_clause(GroupBy {
            columns: vec![Column::raw(column)],
            having: Vec::new(),
        });
        self
    }

    pub fn having(mut self, sql: &str, args: Vec<Arg>) -> Self {
        self.stmt.add_clause(GroupBy {
            columns: Vec::new(),
            having: vec![Expr::raw(sql, args)],
        });
        self
    }

    /// LEFT JOIN a has-one/belongs-to relation by name, or append a raw
    /// `JOIN ...` fragment
    pub fn joins(mut self, query: &str, args: Vec<Arg>) -> Self {
        self.stmt.joins.push(join_request(query, args, JoinType::Left));
        self
    }

    /// Relation join with extra ON conditions
    pub fn joins_on(mut self, relation: &str, on: Vec<Expr>) -> Self {
        self.stmt.joins.push(JoinRequest::Relation {
            name: relation.to_string(),
            kind: JoinType::Left,
            on,
        });
        self
    }

    pub fn inner_joins(mut self, query: &str, args: Vec<Arg>) -> Self {
        self.stmt.joins.push(join_request(query, args, JoinType::Inner));
        self
    }

    /// Load a relation (or `A.B` path) after the main query
    pub fn preload(mut self, path: &str) -> Self {
        self.stmt.preloads.insert(path.to_string(), Preload::default());
        self
    }

    pub fn preload_where(mut self, path: &str, conditions: Vec<Expr>) -> Self {
        self.stmt.preloads.insert(
            path.to_string(),
            Preload {
                conditions,
                scope: None,
            },
        );
        self
    }

    /// Preload whose query is shaped by `scope`, e.g. to order or limit it
    pub fn preload_scope<F>(mut self, path: &str, scope: F) -> Self
    where
        F: Fn(Session) -> Session + Send + Sync + 'static,
    {
        self.stmt.preloads.insert(
            path.to_string(),
            Preload {
                conditions: Vec::new(),
                scope: Some(Arc::new(scope)),
            },
        );
        self
    }

    pub fn distinct(mut self, columns: &[&str]) -> Self {
        self.stmt.distinct = true;
        self.select(columns)
    }

    pub fn clauses(mut self, clause: impl Into<ClauseExpr>) -> Self {
        self.stmt.add_clause(clause);
        self
    }

    /// Register a clause under an explicit name (`Clause::named`)
    pub fn clause(mut self, clause: Clause) -> Self {
        self.stmt.add_named_clause(clause);
        self
    }

    /// Apply reusable chain fragments
    pub fn scopes<F>(self, scope: F) -> Self
    where
        F: FnOnce(Session) -> Session,
    {
        scope(self)
    }

    /// Ignore soft-delete scoping
    pub fn unscoped(mut self) -> Self {
        self.stmt.flags.unscoped = true;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.stmt.cancel = token;
        self
    }

    pub fn session(mut self, config: SessionConfig) -> Self {
        if config.new_db {
            let mut fresh = Statement::new(std::sync::Arc::clone(&self.stmt.engine));
            fresh.conn = self.stmt.conn.clone();
            fresh.cancel = self.stmt.cancel.clone();
            fresh.settings = std::mem::take(&mut self.stmt.settings);
            fresh.flags = self.stmt.flags;
            self.stmt = fresh;
        }
        let flags = &mut self.stmt.flags;
        flags.dry_run |= config.dry_run;
        flags.skip_hooks |= config.skip_hooks;
        flags.skip_default_transaction |= config.skip_default_transaction;
        flags.allow_global_update |= config.allow_global_update;
        flags.full_save_associations |= config.full_save_associations;
        flags.query_fields |= config.query_fields;
        if let Some(token) = config.cancel {
            self.stmt.cancel = token;
        }
        self
    }

    /// Render statements without executing them
    pub fn dry_run(mut self) -> Self {
        self.stmt.flags.dry_run = true;
        self
    }

    pub fn skip_hooks(mut self) -> Self {
        self.stmt.flags.skip_hooks = true;
        self
    }

    /// Store a value hooks and stages can read back with `get`
    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.stmt.settings.insert(key.to_string(), value.into());
        self
    }

    /// Use `sql` verbatim as the statement
    pub fn raw(self, sql: &str, args: Vec<Arg>) -> Self {
        self.raw_expr(Expr::raw(sql, args))
    }

    pub fn raw_expr(mut self, expr: Expr) -> Self {
        self.stmt.sql.clear();
        self.stmt.vars.clear();
        self.stmt.build_expr(&expr);
        self
    }
}

fn join_request(query: &str, args: Vec<Arg>, kind: JoinType) -> JoinRequest {
    let is_name = args.is_empty() && !query.trim().contains(char::is_whitespace);
    if is_name {
        JoinRequest::Relation {
            name: query.trim().to_string(),
            kind,
            on: Vec::new(),
        }
    } else {
        JoinRequest::Raw(Expr::raw(query, args))
    }
}
