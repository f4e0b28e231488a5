//! Migrator probe: catalog queries answering "does this exist"

use crate::clause::Expr;
use crate::errors::OrmError;
use crate::session::Session;

/// Catalog queries of one vendor
pub trait MigratorProbe: Send + Sync {
    fn current_database_sql(&self) -> Expr;

    /// Query returning a row count for `table` in `database`
    fn has_table_sql(&self, database: &str, table: &str) -> Expr;

    fn has_column_sql(&self, database: &str, table: &str, column: &str) -> Expr;
}

/// Runs the dialect's catalog queries through a session
#[derive(Clone)]
pub struct Migrator {
    session: Session,
}

impl Migrator {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub async fn current_database(&self) -> Result<String, OrmError> {
        let sql = self.session.engine().dialect.migrator().current_database_sql();
        let mut name = String::new();
        self.session.clone().raw_expr(sql).scan(&mut name).await?;
        Ok(name)
    }

    pub async fn has_table(&self, table: &str) -> Result<bool, OrmError> {
        let database = self.current_database().await?;
        let sql = self.session.engine().dialect.migrator().has_table_sql(&database, table);
        self.count(sql).await
    }

    pub async fn has_column(&self, table: &str, column: &str) -> Result<bool, OrmError> {
        let database = self.current_database().await?;
        let sql = self
            .session
            .engine()
            .dialect
            .migrator()
            .has_column_sql(&database, table, column);
        self.count(sql).await
    }

    async fn count(&self, sql: Expr) -> Result<bool, OrmError> {
        let mut count = 0i64;
        self.session.clone().raw_expr(sql).scan(&mut count).await?;
        Ok(count > 0)
    }
}
