//! Sessions: the chainable surface over a statement
//!
//! A [`Session`] owns one [`Statement`]. Chain methods consume the session
//! and return it with the statement extended; finishers consume it, run the
//! chain of their kind and report an [`Executed`] summary. Cloning a session
//! snapshots its conditions, so a configured session can be reused:
//!
//! ```ignore
//! let active = db.clone().model::<User>().where_("active = ?", args![true]);
//! let mut users = Vec::<User>::new();
//! active.clone().order("name").find(&mut users).await?;
//! let mut total = 0i64;
//! active.count(&mut total).await?;
//! ```

mod chain;
mod finisher;
mod transaction;

use crate::callbacks::{CallbackKind, Callbacks};
use crate::cancel::CancelToken;
use crate::dialect::migrator::Migrator;
use crate::engine::Engine;
use crate::errors::OrmError;
use crate::model::{Dest, Destination, ModelRef, Record};
use crate::statement::Statement;
use std::sync::Arc;
use type_mapping::Value;

/// Outcome of a finisher
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Executed {
    pub rows_affected: u64,
    /// Rendered SQL of the last statement the chain ran
    pub sql: String,
    pub vars: Vec<Value>,
}

/// Switches applied by [`Session::session`]; `false` leaves a switch as is
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub dry_run: bool,
    pub skip_hooks: bool,
    pub skip_default_transaction: bool,
    pub allow_global_update: bool,
    pub full_save_associations: bool,
    pub query_fields: bool,
    /// Drop the chained conditions and start from an empty statement
    pub new_db: bool,
    pub cancel: Option<CancelToken>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) stmt: Statement,
}

impl Session {
    pub(crate) fn new(engine: Arc<Engine>) -> Self {
        Self {
            stmt: Statement::new(engine),
        }
    }

    pub fn from_statement(stmt: Statement) -> Self {
        Self { stmt }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.stmt.engine
    }

    pub fn statement(&self) -> &Statement {
        &self.stmt
    }

    pub fn callbacks(&self) -> &Callbacks {
        &self.stmt.engine.callbacks
    }

    /// Catalog probe bound to this session's connection
    pub fn migrator(&self) -> Migrator {
        Migrator::new(self.clone())
    }

    /// Value stored with [`set`](Self::set)
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.stmt.setting(key)
    }

    /// Resolve the model and run every stage of `kind`
    pub(crate) async fn execute(mut self, kind: CallbackKind) -> Statement {
        if let Err(err) = self.stmt.parse_model() {
            self.stmt.add_error(err);
        }
        let engine = Arc::clone(&self.stmt.engine);
        engine.callbacks.execute(kind, &mut self.stmt).await;
        self.stmt
    }

    /// Run `kind` over an owned destination and hand it back with the outcome
    pub(crate) async fn run_dest(
        mut self,
        kind: CallbackKind,
        dest: Dest,
        model: Option<ModelRef>,
    ) -> (Dest, Result<Executed, OrmError>) {
        self.stmt.dest = dest;
        if model.is_some() {
            self.stmt.dest_model = model;
            if self.stmt.model.is_none() {
                self.stmt.model = model;
            }
        }
        let mut stmt = self.execute(kind).await;
        let dest = std::mem::take(&mut stmt.dest);
        (dest, finish(stmt))
    }

    /// Run `kind` with the caller's destination moved in and restored after,
    /// whether or not the chain failed
    pub(crate) async fn run_with<D: Destination>(
        self,
        kind: CallbackKind,
        dest: &mut D,
    ) -> Result<Executed, OrmError> {
        let (taken, result) = self.run_dest(kind, dest.take_dest(), D::model_ref()).await;
        let restored = dest.restore_dest(taken);
        let executed = result?;
        restored?;
        Ok(executed)
    }

    /// Query records of `model` without a typed destination
    pub(crate) async fn find_records(self, model: ModelRef) -> Result<Vec<Record>, OrmError> {
        let (dest, result) = self
            .run_dest(CallbackKind::Query, Dest::Records(Vec::new()), Some(model))
            .await;
        result?;
        match dest {
            Dest::Records(records) => Ok(records),
            _ => Ok(Vec::new()),
        }
    }
}

pub(crate) fn finish(stmt: Statement) -> Result<Executed, OrmError> {
    match stmt.error {
        Some(err) => Err(err),
        None => Ok(Executed {
            rows_affected: stmt.rows_affected,
            sql: stmt.sql,
            vars: stmt.vars,
        }),
    }
}
