//! Finishers: run a chain and report what it did

use super::{finish, Executed, Session};
use crate::callbacks::CallbackKind;
use crate::clause::{Arg, CmpOp, Column, Expr, OnConflict, OrderBy, Select};
use crate::errors::OrmError;
use crate::model::{Dest, DestKind, Destination, Model, ModelRef};
use crate::pool::Rows;
use crate::schema::Schema;
use crate::statement::Assignments;
use indexmap::IndexMap;
use std::any::Any;
use type_mapping::Value;

impl Session {
    /// INSERT the destination: a record, records, a map or maps
    pub async fn create<D: Destination>(self, dest: &mut D) -> Result<Executed, OrmError> {
        let batch = self.stmt.engine.config.create_batch_size;
        if batch > 0 {
            return self.create_in_batches(dest, batch).await;
        }
        self.run_with(CallbackKind::Create, dest).await
    }

    /// INSERT in chunks of `batch_size`, inside one transaction unless the
    /// session is already in one or skips the default transaction
    pub async fn create_in_batches<D: Destination>(
        self,
        dest: &mut D,
        batch_size: usize,
    ) -> Result<Executed, OrmError> {
        let taken = dest.take_dest();
        if batch_size == 0 || taken.len() <= batch_size {
            let (taken, result) = self.run_dest(CallbackKind::Create, taken, D::model_ref()).await;
            let restored = dest.restore_dest(taken);
            let executed = result?;
            restored?;
            return Ok(executed);
        }

        let wrap = !self.stmt.conn.is_tx()
            && !self.stmt.flags.skip_default_transaction
            && !self.stmt.flags.dry_run;
        let session = if wrap {
            match self.clone().begin().await {
                Ok(tx) => tx,
                Err(err) => {
                    dest.restore_dest(taken)?;
                    return Err(err);
                }
            }
        } else {
            self
        };

        let chunks = split(taken, batch_size);

        let mut done = Vec::with_capacity(chunks.len());
        let mut total = Executed::default();
        let mut failure = None;
        let mut chunks = chunks.into_iter();
        for part in chunks.by_ref() {
            let (part, result) = session
                .clone()
                .run_dest(CallbackKind::Create, part, D::model_ref())
                .await;
            done.push(part);
            match result {
                Ok(executed) => {
                    total.rows_affected += executed.rows_affected;
                    total.sql = executed.sql;
                    total.vars = executed.vars;
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        done.extend(chunks);
        let restored = dest.restore_dest(join(done));

        if wrap {
            match &failure {
                None => session.commit().await?,
                Some(_) => session.rollback().await?,
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }
        restored?;
        Ok(total)
    }

    /// INSERT a new record (zero primary key) or UPDATE every column of an
    /// existing one, falling back to an upsert when the UPDATE matched nothing
    pub async fn save<D: Destination>(self, dest: &mut D) -> Result<Executed, OrmError> {
        let Some(model) = D::model_ref() else {
            return Err(OrmError::user("save needs a record destination"));
        };
        let schema = model.schema(&self.stmt.engine.schemas)?;
        let taken = dest.take_dest();
        let is_new = match &taken {
            Dest::Record(record) => schema.primary_is_zero(record.as_ref()),
            _ => true,
        };
        if is_new || !matches!(taken, Dest::Record(_)) {
            let session = if matches!(taken, Dest::Records(_)) {
                self.clauses(OnConflict {
                    update_all: true,
                    ..OnConflict::default()
                })
            } else {
                self
            };
            let (taken, result) = session.run_dest(CallbackKind::Create, taken, Some(model)).await;
            let restored = dest.restore_dest(taken);
            let executed = result?;
            restored?;
            return Ok(executed);
        }

        let fallback = self.clone();
        let mut update = self;
        update.stmt.assignments = Assignments::Record { skip_zero: false };
        if !update.stmt.has_explicit_selects() {
            update.stmt.selects.push("*".to_string());
        }
        let (taken, result) = update.run_dest(CallbackKind::Update, taken, Some(model)).await;
        let executed = match result {
            Ok(executed) => executed,
            Err(err) => {
                dest.restore_dest(taken)?;
                return Err(err);
            }
        };
        if executed.rows_affected > 0 || fallback.stmt.flags.dry_run {
            dest.restore_dest(taken)?;
            return Ok(executed);
        }
        let upsert = fallback.clauses(OnConflict {
            update_all: true,
            ..OnConflict::default()
        });
        let (taken, result) = upsert.run_dest(CallbackKind::Create, taken, Some(model)).await;
        let restored = dest.restore_dest(taken);
        let executed = result?;
        restored?;
        Ok(executed)
    }

    /// First record ordered by primary key; `RecordNotFound` when none
    pub async fn first<D: Destination>(mut self, dest: &mut D) -> Result<Executed, OrmError> {
        self.order_by_primary::<D>(false);
        self.single(dest).await
    }

    /// One record in no particular order; `RecordNotFound` when none
    pub async fn take<D: Destination>(self, dest: &mut D) -> Result<Executed, OrmError> {
        self.single(dest).await
    }

    /// Last record ordered by primary key; `RecordNotFound` when none
    pub async fn last<D: Destination>(mut self, dest: &mut D) -> Result<Executed, OrmError> {
        self.order_by_primary::<D>(true);
        self.single(dest).await
    }

    async fn single<D: Destination>(mut self, dest: &mut D) -> Result<Executed, OrmError> {
        self.stmt.add_clause(crate::clause::Limit::new(Some(1), None));
        self.stmt.flags.raise_not_found = true;
        self.run_with(CallbackKind::Query, dest).await
    }

    fn order_by_primary<D: Destination>(&mut self, desc: bool) {
        if self.stmt.model.is_some() || D::model_ref().is_some() {
            self.stmt.add_clause(OrderBy::column(Column::primary_key(), desc));
        }
    }

    /// Every matching record; an empty result is not an error
    pub async fn find<D: Destination>(self, dest: &mut D) -> Result<Executed, OrmError> {
        self.run_with(CallbackKind::Query, dest).await
    }

    /// Walk the matches in primary-key order, `batch_size` at a time
    pub async fn find_in_batches<M, F>(
        self,
        batch_size: usize,
        mut handle: F,
    ) -> Result<Executed, OrmError>
    where
        M: Model,
        F: FnMut(&mut Vec<M>, usize) -> Result<(), OrmError>,
    {
        if batch_size == 0 {
            return Err(OrmError::user("batch size must be positive"));
        }
        let schema = ModelRef::of::<M>().schema(&self.stmt.engine.schemas)?;
        let primary = schema
            .prioritized_primary_field
            .clone()
            .ok_or(OrmError::PrimaryKeyRequired)?;

        let mut total = Executed::default();
        let mut last = None;
        let mut batch = 0;
        loop {
            let mut session = self
                .clone()
                .clauses(OrderBy::column(Column::current(primary.db_name.as_str()), false))
                .limit(batch_size as u64);
            if let Some(value) = last.take() {
                session = session.where_expr(Expr::cmp(
                    CmpOp::Gt,
                    Column::current(primary.db_name.as_str()),
                    Arg::Value(value),
                ));
            }
            let mut records: Vec<M> = Vec::new();
            let executed = session.find(&mut records).await?;
            total.rows_affected += executed.rows_affected;
            total.sql = executed.sql;
            total.vars = executed.vars;
            if records.is_empty() {
                break;
            }
            batch += 1;
            let fetched = records.len();
            last = records.last().map(|r| primary.value_of(r as &dyn Any).0);
            handle(&mut records, batch)?;
            if fetched < batch_size {
                break;
            }
        }
        Ok(total)
    }

    /// First match, or `record` filled from the equality conditions
    pub async fn first_or_init<M: Model>(self, record: &mut M) -> Result<Executed, OrmError> {
        let conditions = self.stmt.where_exprs().to_vec();
        let schema = ModelRef::of::<M>().schema(&self.stmt.engine.schemas)?;
        match self.first(record).await {
            Err(OrmError::RecordNotFound) => {
                assign_conditions(&schema, record, &conditions)?;
                Ok(Executed::default())
            }
            other => other,
        }
    }

    /// First match, or create it from the equality conditions
    pub async fn first_or_create<M: Model>(self, record: &mut M) -> Result<Executed, OrmError> {
        let creator = self.clone();
        let conditions = self.stmt.where_exprs().to_vec();
        let schema = ModelRef::of::<M>().schema(&self.stmt.engine.schemas)?;
        match self.first(record).await {
            Err(OrmError::RecordNotFound) => {
                assign_conditions(&schema, record, &conditions)?;
                let mut fresh = creator;
                fresh.stmt.clauses.clear();
                fresh.create(record).await
            }
            other => other,
        }
    }

    /// UPDATE one column of the matching rows
    pub async fn update(self, column: &str, value: impl Into<Arg>) -> Result<Executed, OrmError> {
        self.updates([(column.to_string(), value.into())]).await
    }

    /// UPDATE several columns of the matching rows; keys are field or column
    /// names. `updated_at` is refreshed and update hooks run.
    pub async fn updates<I, K>(mut self, values: I) -> Result<Executed, OrmError>
    where
        I: IntoIterator<Item = (K, Arg)>,
        K: Into<String>,
    {
        let columns: IndexMap<String, Arg> = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.stmt.assignments = Assignments::Columns(columns);
        self.run_with(CallbackKind::Update, &mut ()).await
    }

    /// UPDATE from the non-zero fields of `record`, matched by its primary key
    pub async fn updates_from<D: Destination>(mut self, record: &mut D) -> Result<Executed, OrmError> {
        self.stmt.assignments = Assignments::Record { skip_zero: true };
        self.run_with(CallbackKind::Update, record).await
    }

    /// Like [`update`](Self::update) without hooks or `updated_at`
    pub async fn update_column(self, column: &str, value: impl Into<Arg>) -> Result<Executed, OrmError> {
        self.update_columns([(column.to_string(), value.into())]).await
    }

    pub async fn update_columns<I, K>(mut self, values: I) -> Result<Executed, OrmError>
    where
        I: IntoIterator<Item = (K, Arg)>,
        K: Into<String>,
    {
        self.stmt.flags.update_column = true;
        self.stmt.flags.skip_hooks = true;
        self.updates(values).await
    }

    /// DELETE the destination records by primary key (soft delete when the
    /// model has a `deleted_at` field)
    pub async fn delete<D: Destination>(self, dest: &mut D) -> Result<Executed, OrmError> {
        self.run_with(CallbackKind::Delete, dest).await
    }

    /// DELETE the rows matching the chained conditions
    pub async fn delete_where(self) -> Result<Executed, OrmError> {
        self.run_with(CallbackKind::Delete, &mut ()).await
    }

    /// `SELECT count(*)`; with GROUP BY, the number of groups
    pub async fn count(mut self, count: &mut i64) -> Result<Executed, OrmError> {
        let grouped = self.stmt.clauses.contains_key("GROUP BY");
        if !grouped {
            self.stmt.clauses.remove("ORDER BY");
        }
        self.stmt.preloads.clear();
        if !self.stmt.clauses.contains_key("SELECT") {
            let expr = match (self.stmt.distinct, self.stmt.selects.as_slice()) {
                (true, [column]) => {
                    let column = self.stmt.quote(column);
                    Expr::raw(format!("count(DISTINCT {column})"), Vec::new())
                }
                _ => Expr::raw("count(*)", Vec::new()),
            };
            self.stmt.add_clause(Select::expr(expr));
        }
        self.stmt.selects.clear();
        self.stmt.distinct = false;

        if grouped {
            self.stmt.flags.many_rows = true;
            let stmt = self.execute(CallbackKind::Row).await;
            *count = stmt.rows.as_ref().map_or(0, |r| r.len() as i64);
            return finish(stmt);
        }
        self.stmt.dest = Dest::Scalar(Value::Int(0));
        let mut stmt = self.execute(CallbackKind::Query).await;
        if let Dest::Scalar(value) = std::mem::take(&mut stmt.dest) {
            *count = value.as_i64().unwrap_or(0);
        }
        finish(stmt)
    }

    /// Values of one column
    pub async fn pluck<D: Destination>(mut self, column: &str, dest: &mut D) -> Result<Executed, OrmError> {
        let column = if self.stmt.distinct {
            format!("DISTINCT {}", self.stmt.quote(column))
        } else {
            self.stmt.quote(column)
        };
        self.stmt.add_clause(Select::expr(Expr::raw(column, Vec::new())));
        self.stmt.preloads.clear();
        self.run_with(CallbackKind::Query, dest).await
    }

    /// First result row
    pub async fn row(self) -> Result<Rows, OrmError> {
        self.rows_inner(false).await
    }

    /// Every result row
    pub async fn rows(self) -> Result<Rows, OrmError> {
        self.rows_inner(true).await
    }

    async fn rows_inner(mut self, many: bool) -> Result<Rows, OrmError> {
        if self.stmt.flags.dry_run {
            return Err(OrmError::DryRunModeUnsupported);
        }
        self.stmt.flags.many_rows = many;
        let mut stmt = self.execute(CallbackKind::Row).await;
        let rows = stmt.rows.take().unwrap_or_default();
        finish(stmt)?;
        Ok(rows)
    }

    /// Run the statement (usually `raw`) and copy its rows into `dest`
    /// without hooks or preloads
    pub async fn scan<D: Destination>(mut self, dest: &mut D) -> Result<Executed, OrmError> {
        self.stmt.flags.many_rows = true;
        self.stmt.dest = dest.take_dest();
        self.stmt.dest_model = D::model_ref();
        if self.stmt.model.is_none() && self.stmt.sql.is_empty() {
            self.stmt.model = D::model_ref();
        }
        let mut stmt = self.execute(CallbackKind::Row).await;
        if stmt.error.is_none() {
            if let Some(rows) = stmt.rows.take() {
                let rows_affected = rows.len() as u64;
                if let Err(err) = crate::stages::scan::scan_rows(&mut stmt, &rows) {
                    stmt.add_error(err);
                }
                stmt.rows_affected = rows_affected;
            }
        }
        let restored = dest.restore_dest(std::mem::take(&mut stmt.dest));
        let executed = finish(stmt)?;
        restored?;
        Ok(executed)
    }

    /// Execute raw SQL that returns no rows
    pub async fn exec(self, sql: &str, args: Vec<Arg>) -> Result<Executed, OrmError> {
        let session = self.raw(sql, args);
        let stmt = session.execute(CallbackKind::Raw).await;
        finish(stmt)
    }
}

fn split(dest: Dest, size: usize) -> Vec<Dest> {
    match dest {
        Dest::Records(records) => chunk(records, size).into_iter().map(Dest::Records).collect(),
        Dest::Maps(rows) => chunk(rows, size).into_iter().map(Dest::Maps).collect(),
        other => vec![other],
    }
}

/// Reassemble the parts produced by [`split`]
fn join(mut parts: Vec<Dest>) -> Dest {
    if parts.len() == 1 {
        return parts.pop().unwrap_or_default();
    }
    match parts.first().map(Dest::kind) {
        Some(DestKind::Slice) => Dest::Records(
            parts
                .into_iter()
                .flat_map(|d| match d {
                    Dest::Records(r) => r,
                    _ => Vec::new(),
                })
                .collect(),
        ),
        Some(DestKind::Maps) => Dest::Maps(
            parts
                .into_iter()
                .flat_map(|d| match d {
                    Dest::Maps(r) => r,
                    _ => Vec::new(),
                })
                .collect(),
        ),
        _ => parts.pop().unwrap_or_default(),
    }
}

fn chunk<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    let mut current = Vec::with_capacity(size);
    for item in items {
        current.push(item);
        if current.len() == size {
            chunks.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Copy `column = value` conditions onto the record
fn assign_conditions(schema: &Schema, record: &mut dyn Any, conditions: &[Expr]) -> Result<(), OrmError> {
    for condition in conditions {
        match condition {
            Expr::Cmp {
                op: CmpOp::Eq,
                column,
                value: Arg::Value(value),
            } => {
                if let Some(field) = schema.look_up_field(&column.name) {
                    field.set(record, value.clone())?;
                }
            }
            Expr::And(inner) => assign_conditions(schema, record, inner)?,
            _ => {}
        }
    }
    Ok(())
}
