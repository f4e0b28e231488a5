//! Explicit transactions and save points

use super::Session;
use crate::errors::OrmError;
use crate::pool::Conn;
use std::future::Future;

impl Session {
    /// Open a transaction; statements run through the returned session
    /// until `commit` or `rollback`
    pub async fn begin(mut self) -> Result<Session, OrmError> {
        let tx = match &self.stmt.conn {
            Conn::Tx(_) => return Err(OrmError::InvalidTransaction),
            Conn::Pool(pool) => pool.begin().await.map_err(|e| self.stmt.translate(e))?,
        };
        self.stmt.conn = Conn::Tx(tx);
        tracing::trace!("transaction started");
        Ok(self)
    }

    pub async fn commit(&self) -> Result<(), OrmError> {
        let Conn::Tx(tx) = &self.stmt.conn else {
            return Err(OrmError::InvalidTransaction);
        };
        tx.commit().await.map_err(|e| self.stmt.translate(e))?;
        tracing::trace!("transaction committed");
        Ok(())
    }

    pub async fn rollback(&self) -> Result<(), OrmError> {
        let Conn::Tx(tx) = &self.stmt.conn else {
            return Err(OrmError::InvalidTransaction);
        };
        tx.rollback().await.map_err(|e| self.stmt.translate(e))?;
        tracing::trace!("transaction rolled back");
        Ok(())
    }

    pub async fn save_point(&self, name: &str) -> Result<(), OrmError> {
        let sql = self.stmt.engine.dialect.save_point_sql(name);
        self.tx_exec(&sql).await
    }

    pub async fn rollback_to(&self, name: &str) -> Result<(), OrmError> {
        let sql = self.stmt.engine.dialect.rollback_to_sql(name);
        self.tx_exec(&sql).await
    }

    async fn tx_exec(&self, sql: &str) -> Result<(), OrmError> {
        let Conn::Tx(tx) = &self.stmt.conn else {
            return Err(OrmError::InvalidTransaction);
        };
        tx.exec(sql, &[]).await.map_err(|e| self.stmt.translate(e))?;
        Ok(())
    }

    /// Run `f` in a transaction: commit when it returns `Ok`, roll back when
    /// it returns `Err`. Inside an open transaction a save point brackets the
    /// closure instead, so only its own work is undone.
    pub async fn transaction<F, Fut, T>(&self, f: F) -> Result<T, OrmError>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, OrmError>>,
    {
        if self.stmt.conn.is_tx() {
            let point = self.stmt.engine.next_save_point();
            self.save_point(&point).await?;
            let result = f(self.clone()).await;
            if result.is_err() {
                if let Err(err) = self.rollback_to(&point).await {
                    tracing::warn!("rollback to save point {} failed: {}", point, err);
                }
            }
            return result;
        }

        let tx = self.clone().begin().await?;
        match f(tx.clone()).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!("rollback after failed transaction: {}", rollback);
                }
                Err(err)
            }
        }
    }
}
