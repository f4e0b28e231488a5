//! Statement context
//!
//! One [`Statement`] is threaded through every stage of a chain. It owns the
//! destination, the clause map, the rendered SQL with its variables and the
//! accumulated error. Rendering happens through its [`Builder`] impl, which
//! resolves the current-table and primary-key placeholders and asks the
//! dialect for quoting and bind markers.

use crate::cancel::CancelToken;
use crate::clause::{
    Arg, Builder, Clause, ClauseExpr, Column, Expr, JoinType, Table, CURRENT_TABLE, PRIMARY_KEY,
};
use crate::dialect::BuildContext;
use crate::engine::Engine;
use crate::errors::{DbError, OrmError};
use crate::model::{Dest, ModelRef};
use crate::pool::{Conn, ExecResult, Rows};
use crate::schema::{Field, Schema};
use crate::session::Session;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use type_mapping::Value;

/// Select/omit entry standing for every relationship of the schema
pub const ASSOCIATIONS: &str = "~~~as~~~";

/// Per-statement switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub dry_run: bool,
    pub skip_hooks: bool,
    /// Ignore soft-delete scoping
    pub unscoped: bool,
    pub raise_not_found: bool,
    pub skip_default_transaction: bool,
    pub full_save_associations: bool,
    pub allow_global_update: bool,
    /// SELECT lists every column instead of `*`
    pub query_fields: bool,
    /// Update without hooks or `updated_at` tracking
    pub update_column: bool,
    /// Row stage returns every row instead of the first
    pub many_rows: bool,
}

impl Flags {
    pub(crate) fn from_config(config: &config::OrmConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            skip_default_transaction: config.skip_default_transaction,
            full_save_associations: config.full_save_associations,
            allow_global_update: config.allow_global_update,
            query_fields: config.query_fields,
            ..Self::default()
        }
    }

    /// Flags a forked statement inherits
    fn inherited(self) -> Self {
        Self {
            raise_not_found: false,
            update_column: false,
            many_rows: false,
            ..self
        }
    }
}

/// Join requested through `joins`/`inner_joins`
#[derive(Debug, Clone, PartialEq)]
pub enum JoinRequest {
    /// Verbatim `JOIN ...` fragment
    Raw(Expr),
    /// Join on a has-one or belongs-to relationship, selecting its columns
    /// under `Relation__column` aliases
    Relation {
        name: String,
        kind: JoinType,
        on: Vec<Expr>,
    },
}

/// Transforms the session a preload query runs in
pub type PreloadScope = Arc<dyn Fn(Session) -> Session + Send + Sync>;

/// One `preload` request
#[derive(Clone, Default)]
pub struct Preload {
    pub conditions: Vec<Expr>,
    pub scope: Option<PreloadScope>,
}

impl fmt::Debug for Preload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preload")
            .field("conditions", &self.conditions)
            .field("scope", &self.scope.is_some())
            .finish()
    }
}

/// Source of the SET list of an update
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Assignments {
    #[default]
    None,
    /// Field or column name to value
    Columns(IndexMap<String, Arg>),
    /// Read from the destination record; `skip_zero` leaves zero fields out
    Record { skip_zero: bool },
}

pub struct Statement {
    pub engine: Arc<Engine>,
    pub conn: Conn,
    pub table: String,
    pub model: Option<ModelRef>,
    pub schema: Option<Arc<Schema>>,
    pub dest: Dest,
    /// Record type of the destination when it differs from `model`
    pub dest_model: Option<ModelRef>,
    pub clauses: HashMap<String, Clause>,
    pub selects: Vec<String>,
    pub omits: Vec<String>,
    pub distinct: bool,
    pub joins: Vec<JoinRequest>,
    pub preloads: IndexMap<String, Preload>,
    pub assignments: Assignments,
    pub settings: HashMap<String, Value>,
    pub flags: Flags,
    pub sql: String,
    pub vars: Vec<Value>,
    pub rows_affected: u64,
    pub rows: Option<Rows>,
    pub error: Option<OrmError>,
    pub cancel: CancelToken,
    /// Set by the transaction bracket when it opened the transaction itself
    pub(crate) started_tx: bool,
}

impl Statement {
    pub fn new(engine: Arc<Engine>) -> Self {
        let conn = Conn::Pool(Arc::clone(&engine.pool));
        let flags = Flags::from_config(&engine.config);
        Self {
            engine,
            conn,
            table: String::new(),
            model: None,
            schema: None,
            dest: Dest::None,
            dest_model: None,
            clauses: HashMap::new(),
            selects: Vec::new(),
            omits: Vec::new(),
            distinct: false,
            joins: Vec::new(),
            preloads: IndexMap::new(),
            assignments: Assignments::None,
            settings: HashMap::new(),
            flags,
            sql: String::new(),
            vars: Vec::new(),
            rows_affected: 0,
            rows: None,
            error: None,
            cancel: CancelToken::new(),
            started_tx: false,
        }
    }

    /// Fresh statement on the same connection, keeping the cancellation
    /// token, the settings and the dry-run/skip-hooks switches
    pub fn fork(&self) -> Statement {
        let mut stmt = Statement::new(Arc::clone(&self.engine));
        stmt.conn = self.conn.clone();
        stmt.cancel = self.cancel.clone();
        stmt.flags = self.flags.inherited();
        stmt.flags.unscoped = false;
        stmt.settings = self.settings.clone();
        stmt
    }

    pub fn add_error(&mut self, err: OrmError) {
        self.error = Some(match self.error.take() {
            Some(existing) => existing.chain(err),
            None => err,
        });
    }

    /// Register a clause, merging with one of the same name
    pub fn add_clause(&mut self, clause: impl Into<ClauseExpr>) {
        self.add_named_clause(Clause::new(clause));
    }

    pub fn add_named_clause(&mut self, clause: Clause) {
        let merged = match self.clauses.remove(&clause.name) {
            Some(existing) => Clause {
                name: clause.name,
                expression: clause.expression.merge(existing.expression),
            },
            None => clause,
        };
        self.clauses.insert(merged.name.clone(), merged);
    }

    pub fn add_clause_if_not_exists(&mut self, clause: impl Into<ClauseExpr>) {
        let clause = Clause::new(clause);
        if !self.clauses.contains_key(&clause.name) {
            self.clauses.insert(clause.name.clone(), clause);
        }
    }

    pub fn where_exprs(&self) -> &[Expr] {
        match self.clauses.get("WHERE").map(|c| &c.expression) {
            Some(ClauseExpr::Where(w)) => &w.exprs,
            _ => &[],
        }
    }

    /// Resolve the schema and default table from the model, once
    pub(crate) fn parse_model(&mut self) -> Result<(), OrmError> {
        if self.schema.is_some() {
            return Ok(());
        }
        let Some(model) = self.model else {
            return Ok(());
        };
        let schema = model.schema(&self.engine.schemas)?;
        if self.table.is_empty() {
            self.table = schema.table.clone();
        }
        self.schema = Some(schema);
        Ok(())
    }

    /// Render `names` in order, skipping absent and empty clauses
    pub fn build(&mut self, names: &[&str]) {
        let has_order_by = self
            .clauses
            .get("ORDER BY")
            .is_some_and(|c| !c.expression.is_empty());
        let dialect = Arc::clone(&self.engine.dialect);
        let mut first = self.sql.is_empty();
        for name in names {
            let Some(clause) = self.clauses.get(*name).cloned() else {
                continue;
            };
            if clause.expression.is_empty() {
                continue;
            }
            let mark = self.sql.len();
            if !first {
                self.sql.push(' ');
            }
            let body = self.sql.len();
            if !dialect.build_clause(&clause, self, BuildContext { has_order_by }) {
                clause.build(self);
            }
            if self.sql.len() == body {
                self.sql.truncate(mark);
            } else {
                first = false;
            }
        }
    }

    /// Render a free-form expression as the whole statement
    pub fn build_expr(&mut self, expr: &Expr) {
        expr.build(self);
    }

    pub fn quote(&self, ident: &str) -> String {
        let mut out = String::new();
        self.engine.dialect.quote_to(&mut out, ident);
        out
    }

    pub fn explain(&self) -> String {
        self.engine.dialect.explain(&self.sql, &self.vars)
    }

    /// Whether a field passes the select and omit lists
    pub fn field_selected(&self, field: &Field) -> bool {
        self.name_selected(&[field.name.as_str(), field.db_name.as_str()])
    }

    /// Whether a relationship passes the select and omit lists
    pub fn relation_selected(&self, name: &str) -> bool {
        if self.omits.iter().any(|o| o == ASSOCIATIONS) {
            return false;
        }
        if self.selects.iter().any(|s| s == ASSOCIATIONS) && !self.omits.iter().any(|o| o == name) {
            return true;
        }
        self.name_selected(&[name])
    }

    fn name_selected(&self, names: &[&str]) -> bool {
        let listed = |list: &[String]| list.iter().any(|item| names.contains(&item.as_str()));
        if listed(&self.omits) {
            return false;
        }
        if self.selects.is_empty() || self.selects.iter().any(|s| s == "*") {
            return true;
        }
        listed(&self.selects)
    }

    /// Whether the select list names specific columns
    pub fn has_explicit_selects(&self) -> bool {
        !self.selects.is_empty() && !self.selects.iter().any(|s| s == "*")
    }

    /// Reject select/omit entries that are neither columns nor relationships
    pub(crate) fn check_select_omit(&self) -> Result<(), OrmError> {
        let Some(schema) = &self.schema else {
            return Ok(());
        };
        for name in self.selects.iter().chain(&self.omits) {
            if name == "*" || name == ASSOCIATIONS {
                continue;
            }
            if schema.look_up_field(name).is_none() && schema.relationship(name).is_none() {
                return Err(OrmError::user(format!(
                    "unknown column {name} on {}",
                    schema.name
                )));
            }
        }
        Ok(())
    }

    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    pub(crate) fn translate(&self, err: DbError) -> OrmError {
        self.engine
            .dialect
            .translator()
            .and_then(|t| t.translate(&err))
            .unwrap_or(OrmError::Exec(err))
    }

    /// Execute the rendered SQL, racing the cancellation token
    pub(crate) async fn exec_sql(&self) -> Result<ExecResult, OrmError> {
        let conn = self.conn.clone();
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(OrmError::Cancelled),
            result = conn.exec(&self.sql, &self.vars) => result,
        };
        result.map_err(|e| self.translate(e))
    }

    pub(crate) async fn query_sql(&self) -> Result<Rows, OrmError> {
        let conn = self.conn.clone();
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(OrmError::Cancelled),
            result = conn.query(&self.sql, &self.vars) => result,
        };
        result.map_err(|e| self.translate(e))
    }

    /// Schema of the destination records, which may differ from the model's
    pub(crate) fn dest_schema(&self) -> Result<Option<Arc<Schema>>, OrmError> {
        match (self.dest_model, &self.schema) {
            (Some(model), Some(schema)) if model.type_id == schema.type_id => {
                Ok(Some(Arc::clone(schema)))
            }
            (Some(model), _) => model.schema(&self.engine.schemas).map(Some),
            (None, schema) => Ok(schema.clone()),
        }
    }

    /// Session handed to user hooks
    pub(crate) fn hook_session(&self) -> Session {
        Session::from_statement(self.fork())
    }

    fn write_ident(&mut self, ident: &str) {
        self.engine.dialect.quote_to(&mut self.sql, ident);
    }

    fn write_table_name(&mut self, name: &str) {
        // "users u" and "(SELECT ...) t" pass through as written
        if name.contains([' ', '(']) {
            self.sql.push_str(name);
        } else {
            self.write_ident(name);
        }
    }
}

impl Clone for Statement {
    /// The destination, result rows and counters are not carried over
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            conn: self.conn.clone(),
            table: self.table.clone(),
            model: self.model,
            schema: self.schema.clone(),
            dest: Dest::None,
            dest_model: None,
            clauses: self.clauses.clone(),
            selects: self.selects.clone(),
            omits: self.omits.clone(),
            distinct: self.distinct,
            joins: self.joins.clone(),
            preloads: self.preloads.clone(),
            assignments: self.assignments.clone(),
            settings: self.settings.clone(),
            flags: self.flags,
            sql: self.sql.clone(),
            vars: self.vars.clone(),
            rows_affected: 0,
            rows: None,
            error: self.error.clone(),
            cancel: self.cancel.clone(),
            started_tx: false,
        }
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("table", &self.table)
            .field("model", &self.model)
            .field("dest", &self.dest)
            .field("sql", &self.sql)
            .field("vars", &self.vars)
            .field("error", &self.error)
            .finish()
    }
}

impl Builder for Statement {
    fn write_str(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    fn write_char(&mut self, c: char) {
        self.sql.push(c);
    }

    fn write_quoted(&mut self, column: &Column) {
        if column.raw {
            self.sql.push_str(&column.name);
            return;
        }
        if !column.table.is_empty() {
            let table = if column.table == CURRENT_TABLE {
                self.table.clone()
            } else {
                column.table.clone()
            };
            if !table.is_empty() {
                self.write_ident(&table);
                self.sql.push('.');
            }
        }
        if column.name == PRIMARY_KEY {
            let primary = self
                .schema
                .as_ref()
                .and_then(|s| s.prioritized_primary_field.as_ref())
                .map(|f| f.db_name.clone());
            match primary {
                Some(name) => self.write_ident(&name),
                None => self.add_error(OrmError::PrimaryKeyRequired),
            }
        } else if column.name == "*" {
            self.sql.push('*');
        } else {
            self.write_ident(&column.name);
        }
        if !column.alias.is_empty() {
            self.sql.push_str(" AS ");
            self.write_ident(&column.alias);
        }
    }

    fn write_quoted_table(&mut self, table: &Table) {
        if table.raw {
            self.sql.push_str(&table.name);
        } else if table.name == CURRENT_TABLE {
            let name = self.table.clone();
            self.write_table_name(&name);
        } else {
            self.write_table_name(&table.name);
        }
        if !table.alias.is_empty() {
            self.sql.push(' ');
            self.write_ident(&table.alias);
        }
    }

    fn add_var(&mut self, arg: &Arg) {
        match arg {
            Arg::Value(Value::Array(items)) => {
                self.sql.push('(');
                if items.is_empty() {
                    self.sql.push_str("NULL");
                }
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        self.sql.push(',');
                    }
                    self.vars.push(item.clone());
                    self.engine.dialect.bind_var(&mut self.sql, self.vars.len());
                }
                self.sql.push(')');
            }
            Arg::Value(value) => {
                self.vars.push(value.clone());
                self.engine.dialect.bind_var(&mut self.sql, self.vars.len());
            }
            Arg::Column(column) => self.write_quoted(column),
            Arg::Expr(expr) => expr.build(self),
            Arg::Default => self.sql.push_str("DEFAULT"),
            Arg::Sub(sub) => {
                self.sql.push('(');
                sub.build(self);
                self.sql.push(')');
            }
        }
    }

    fn add_error(&mut self, err: OrmError) {
        Statement::add_error(self, err);
    }
}
