use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::params;
use tracing::{info, warn};

use crate::cache::{CachePool, LangCache};
use crate::dialect::{Dialect, SqliteDialect, Stmt};
use crate::error::{Result, StoreError};
use crate::model::{NodeRef, TripleRef};

use super::config::StoreConfig;
use super::connection::Connection;
use super::gc::{GarbageCollector, GcDependency, GcShared, GcStats};
use super::locks::LockTable;
use super::retry::RetryPolicy;
use super::sequence::Sequences;
use super::session::Session;

const TRIPLE_LOCK_SHARDS: usize = 64;

/// Pool of idle backend sessions. Sessions are rolled back before reuse.
pub(crate) struct SessionPool {
    path: PathBuf,
    dialect: Arc<dyn Dialect>,
    idle: Mutex<Vec<Session>>,
    max_idle: usize,
}

impl SessionPool {
    pub fn acquire(&self) -> Result<Session> {
        if let Some(session) = self.idle.lock().pop() {
            return Ok(session);
        }
        Session::open(&self.path, Arc::clone(&self.dialect))
    }

    pub fn release(&self, session: Session) {
        if session.rollback().is_err() {
            // A session that cannot roll back is discarded, not pooled.
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(session);
        }
    }

    pub fn drain(&self) {
        self.idle.lock().clear();
    }
}

/// Shared state behind the facade, owned by `Arc` so connections and the
/// collector can outlive individual facade borrows.
pub(crate) struct StoreInner {
    pub path: PathBuf,
    pub dialect: Arc<dyn Dialect>,
    pub cfg: StoreConfig,
    pub caches: Arc<CachePool>,
    pub lang: LangCache,
    pub pool: SessionPool,
    pub sequences: Sequences,
    pub triple_locks: LockTable,
    pub commits: AtomicU64,
    pub gc: Arc<GcShared>,
    open: AtomicBool,
}

impl StoreInner {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// The persistence facade: wires the caches, session pool, sequences, and
/// garbage collector together and hands out connections.
pub struct Store {
    inner: Arc<StoreInner>,
    gc: Mutex<Option<GarbageCollector>>,
}

impl Store {
    /// Tables the core schema consists of, in the form `init_database`
    /// expects them.
    pub const CORE_TABLES: &'static [&'static str] =
        &["nodes", "triples", "namespaces", "metadata", "sequences"];

    /// Opens a store on the given database file with the bundled SQLite
    /// dialect.
    pub fn open(path: impl AsRef<Path>, cfg: StoreConfig) -> Result<Store> {
        Store::open_with_dialect(path, Arc::new(SqliteDialect::new()), cfg)
    }

    /// Opens a store with a caller-supplied dialect.
    pub fn open_with_dialect(
        path: impl AsRef<Path>,
        dialect: Arc<dyn Dialect>,
        cfg: StoreConfig,
    ) -> Result<Store> {
        let path = path.as_ref().to_path_buf();
        let policy = RetryPolicy {
            max_attempts: cfg.retry_attempts,
            backoff: cfg.retry_backoff,
        };
        let caches = CachePool::new(&cfg);
        let inner = Arc::new(StoreInner {
            pool: SessionPool {
                path: path.clone(),
                dialect: Arc::clone(&dialect),
                idle: Mutex::new(Vec::new()),
                max_idle: cfg.max_idle_sessions,
            },
            sequences: Sequences::new(
                path.clone(),
                Arc::clone(&dialect),
                policy,
                cfg.sequence_block,
            ),
            triple_locks: LockTable::new(TRIPLE_LOCK_SHARDS),
            commits: AtomicU64::new(0),
            gc: Arc::new(GcShared::new()),
            caches,
            lang: LangCache::new(),
            path,
            dialect,
            cfg,
            open: AtomicBool::new(true),
        });
        // The triple table's own columns keep nodes alive, as does a
        // literal's datatype reference.
        for column in ["subject", "predicate", "object", "context", "creator"] {
            inner.gc.add_node_dependency("triples", column);
        }
        inner.gc.add_node_dependency("nodes", "ltype");
        Ok(Store {
            inner,
            gc: Mutex::new(None),
        })
    }

    /// Creates the schema when any required table is absent, otherwise
    /// migrates stepwise from the stored schema version to the dialect's
    /// current version. Starts the garbage collector on success.
    pub fn init_database(&self, required_tables: &[&str]) -> Result<()> {
        let session = self.inner.pool.acquire()?;
        let tables: Vec<String> = session.query_rows(Stmt::MetaTables, [], |row| row.get(0))?;
        let missing = required_tables
            .iter()
            .any(|required| !tables.iter().any(|have| have == required));
        if missing {
            info!(version = self.inner.dialect.schema_version(), "store.schema.create");
            session.execute_script(self.inner.dialect.create_script())?;
            self.write_version(&session, self.inner.dialect.schema_version())?;
        } else {
            self.migrate(&session)?;
        }
        self.inner.sequences.reset_cache();
        self.inner.pool.release(session);
        self.start_gc()?;
        Ok(())
    }

    fn migrate(&self, session: &Session) -> Result<()> {
        let current = self.inner.dialect.schema_version();
        let mut version = match self.read_version(session)? {
            Some(version) => version,
            None => {
                // Pre-versioning databases are stamped with the current
                // version; their layout predates any migration step.
                self.write_version(session, current)?;
                return Ok(());
            }
        };
        while version < current {
            let script = self.inner.dialect.migration_script(version).ok_or_else(|| {
                StoreError::Migration(format!("no migration step from version {version}"))
            })?;
            info!(from = version, to = version + 1, "store.schema.migrate");
            session.begin()?;
            if let Err(err) = session.execute_script(script) {
                warn!(from = version, error = %err, "store.schema.migrate_failed");
                let _ = session.rollback();
                return Err(err);
            }
            session.commit()?;
            version += 1;
            self.write_version(session, version)?;
        }
        Ok(())
    }

    fn read_version(&self, session: &Session) -> Result<Option<u32>> {
        let value: Option<String> =
            session.query_row_opt(Stmt::MetaVersion, [], |row| row.get(0))?;
        match value {
            Some(text) => text
                .parse()
                .map(Some)
                .map_err(|_| StoreError::Migration(format!("unparseable schema version '{text}'"))),
            None => Ok(None),
        }
    }

    fn write_version(&self, session: &Session, version: u32) -> Result<()> {
        let value = version.to_string();
        let updated = session.execute(Stmt::MetaUpdate, params!["schema_version", value])?;
        if updated == 0 {
            session.execute(Stmt::MetaInsert, params!["schema_version", value])?;
        }
        Ok(())
    }

    /// Stored schema version, if the database has been initialized.
    pub fn schema_version(&self) -> Result<Option<u32>> {
        let session = self.inner.pool.acquire()?;
        let tables: Vec<String> = session.query_rows(Stmt::MetaTables, [], |row| row.get(0))?;
        let version = if tables.iter().any(|table| table == "metadata") {
            self.read_version(&session)
        } else {
            Ok(None)
        };
        self.inner.pool.release(session);
        version
    }

    /// Drops every schema object. Stops the collector first.
    pub fn drop_database(&self) -> Result<()> {
        self.stop_gc();
        let session = self.inner.pool.acquire()?;
        info!("store.schema.drop");
        session.execute_script(self.inner.dialect.drop_script())?;
        self.inner.pool.release(session);
        self.inner.caches.clear();
        self.inner.sequences.reset_cache();
        Ok(())
    }

    /// A new unit-of-work connection.
    pub fn connection(&self) -> Result<Connection> {
        Connection::acquire(Arc::clone(&self.inner))
    }

    /// One-shot pattern query over an auto-managed connection; the result
    /// is materialized so no connection leaks out.
    pub fn list_triples(
        &self,
        subject: Option<&NodeRef>,
        predicate: Option<&NodeRef>,
        object: Option<&NodeRef>,
        context: Option<&NodeRef>,
        include_inferred: bool,
        wildcard_context: bool,
    ) -> Result<Vec<TripleRef>> {
        let conn = self.connection()?;
        let cursor = conn.list_triples(
            subject,
            predicate,
            object,
            context,
            include_inferred,
            wildcard_context,
        )?;
        let mut out = Vec::new();
        for triple in cursor {
            out.push(triple?);
        }
        Ok(out)
    }

    /// Database file this store is bound to.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Registers a table/column that keeps soft-deleted triple rows alive.
    pub fn add_triple_table_dependency(&self, table: &str, column: &str) {
        self.inner.gc.add_triple_dependency(table, column);
    }

    /// Registers a table/column that keeps node rows alive.
    pub fn add_node_table_dependency(&self, table: &str, column: &str) {
        self.inner.gc.add_node_dependency(table, column);
    }

    /// Registered referents of the triple table.
    pub fn triple_table_dependencies(&self) -> Vec<GcDependency> {
        self.inner.gc.triple_dependencies()
    }

    /// Registered referents of the node table.
    pub fn node_table_dependencies(&self) -> Vec<GcDependency> {
        self.inner.gc.node_dependencies()
    }

    /// Registers a buffer-flush hook run before each node cleanup pass.
    pub fn register_flush_hook(
        &self,
        hook: impl Fn() -> Result<()> + Send + Sync + 'static,
    ) {
        self.inner.gc.register_flush_hook(Box::new(hook));
    }

    /// Stats of the most recent collector cycle.
    pub fn gc_stats(&self) -> Option<GcStats> {
        self.inner.gc.last_stats()
    }

    /// Makes the collector's next tick run immediately.
    pub fn trigger_gc(&self) {
        self.inner.gc.trigger();
    }

    /// Commits observed across all connections since open.
    pub fn commits(&self) -> u64 {
        self.inner.commits.load(Ordering::Relaxed)
    }

    /// Stops the collector, clears the caches, and drains the session
    /// pool. Connections handed out earlier fail on next use.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.open.store(false, Ordering::Release);
        self.stop_gc();
        self.inner.caches.clear();
        self.inner.pool.drain();
        info!("store.shutdown");
        Ok(())
    }

    fn start_gc(&self) -> Result<()> {
        if !self.inner.cfg.gc_enabled {
            return Ok(());
        }
        let mut guard = self.gc.lock();
        if guard.is_none() {
            *guard = Some(GarbageCollector::start(Arc::clone(&self.inner))?);
        }
        Ok(())
    }

    fn stop_gc(&self) {
        if let Some(mut collector) = self.gc.lock().take() {
            collector.stop(&self.inner.gc);
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
