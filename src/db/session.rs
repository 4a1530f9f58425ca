use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::OptionalExtension;

use crate::dialect::{Dialect, Stmt};
use crate::error::Result;

/// One physical transactional session against the backing store, plus the
/// dialect that supplies its statement text. Prepared statements are cached
/// by the driver and released when the session closes.
pub(crate) struct Session {
    conn: rusqlite::Connection,
    dialect: Arc<dyn Dialect>,
}

impl Session {
    /// Opens a session on the database file.
    pub fn open(path: &Path, dialect: Arc<dyn Dialect>) -> Result<Session> {
        let conn = rusqlite::Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(Duration::from_millis(250))?;
        Ok(Session { conn, dialect })
    }

    #[cfg(test)]
    pub fn open_in_memory(dialect: Arc<dyn Dialect>) -> Result<Session> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Ok(Session { conn, dialect })
    }

    /// The dialect bound to this session.
    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    /// Executes a keyed statement, returning the affected row count.
    pub fn execute(&self, stmt: Stmt, params: impl rusqlite::Params) -> Result<usize> {
        let sql = self.dialect.statement(stmt)?;
        let mut prepared = self.conn.prepare_cached(sql)?;
        Ok(prepared.execute(params)?)
    }

    /// Executes dynamically assembled SQL, returning the affected row count.
    pub fn execute_sql(&self, sql: &str, params: impl rusqlite::Params) -> Result<usize> {
        let mut prepared = self.conn.prepare_cached(sql)?;
        Ok(prepared.execute(params)?)
    }

    /// Runs a keyed single-row query; `Ok(None)` when no row matches.
    pub fn query_row_opt<T>(
        &self,
        stmt: Stmt,
        params: impl rusqlite::Params,
        map: impl FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>> {
        let sql = self.dialect.statement(stmt)?;
        let mut prepared = self.conn.prepare_cached(sql)?;
        Ok(prepared.query_row(params, map).optional()?)
    }

    /// Runs a keyed multi-row query and collects the mapped rows.
    pub fn query_rows<T>(
        &self,
        stmt: Stmt,
        params: impl rusqlite::Params,
        map: impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let sql = self.dialect.statement(stmt)?;
        self.query_rows_sql(sql, params, map)
    }

    /// Runs dynamically assembled SQL and collects the mapped rows.
    pub fn query_rows_sql<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        map: impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let mut prepared = self.conn.prepare_cached(sql)?;
        let rows = prepared.query_map(params, map)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Runs a dynamically assembled single-row query.
    pub fn query_row_sql_opt<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        map: impl FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>> {
        let mut prepared = self.conn.prepare_cached(sql)?;
        Ok(prepared.query_row(params, map).optional()?)
    }

    /// Executes a multi-statement script (schema create/drop/migrate).
    pub fn execute_script(&self, script: &str) -> Result<()> {
        self.conn.execute_batch(script)?;
        Ok(())
    }

    /// Opens a deferred transaction.
    pub fn begin(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN DEFERRED")?;
        Ok(())
    }

    /// Commits the open transaction.
    pub fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    /// Rolls back the open transaction, if any.
    pub fn rollback(&self) -> Result<()> {
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Establishes a named savepoint.
    pub fn savepoint(&self, name: &str) -> Result<()> {
        self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        Ok(())
    }

    /// Rolls back to a named savepoint without releasing it.
    pub fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        self.conn
            .execute_batch(&format!("ROLLBACK TO SAVEPOINT {name}"))?;
        Ok(())
    }

    /// Releases a named savepoint.
    pub fn release_savepoint(&self, name: &str) -> Result<()> {
        self.conn.execute_batch(&format!("RELEASE SAVEPOINT {name}"))?;
        Ok(())
    }
}
