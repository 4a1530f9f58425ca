use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::error::Result;

use super::connection::Connection;
use super::store::StoreInner;

/// A table/column pair registered as a referent of the triple or node
/// table. Registration is imperative because referent discovery is
/// backend-specific.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GcDependency {
    /// Referencing table.
    pub table: String,
    /// Referencing column holding the id.
    pub column: String,
}

/// Outcome of one collector cycle.
#[derive(Clone, Debug)]
pub struct GcStats {
    /// Cycle number since the collector started.
    pub cycle: u64,
    /// Soft-deleted triple rows physically removed.
    pub triples_removed: u64,
    /// Orphaned node rows physically removed.
    pub nodes_removed: u64,
    /// Whether node cleanup ran this cycle.
    pub nodes_examined: bool,
    /// Wall-clock duration of the cycle.
    pub run_millis: u64,
}

type FlushHook = Box<dyn Fn() -> Result<()> + Send + Sync>;

struct GcState {
    stop: bool,
    triggered: bool,
}

/// State shared between the collector thread and its registrars.
pub(crate) struct GcShared {
    triple_deps: Mutex<Vec<GcDependency>>,
    node_deps: Mutex<Vec<GcDependency>>,
    flush_hooks: Mutex<Vec<FlushHook>>,
    state: Mutex<GcState>,
    wake: Condvar,
    last_stats: Mutex<Option<GcStats>>,
    cycle: AtomicU64,
}

impl GcShared {
    pub fn new() -> GcShared {
        GcShared {
            triple_deps: Mutex::new(Vec::new()),
            node_deps: Mutex::new(Vec::new()),
            flush_hooks: Mutex::new(Vec::new()),
            state: Mutex::new(GcState {
                stop: false,
                triggered: false,
            }),
            wake: Condvar::new(),
            last_stats: Mutex::new(None),
            cycle: AtomicU64::new(0),
        }
    }

    pub fn add_triple_dependency(&self, table: &str, column: &str) {
        let dep = GcDependency {
            table: table.to_owned(),
            column: column.to_owned(),
        };
        let mut deps = self.triple_deps.lock();
        if !deps.contains(&dep) {
            deps.push(dep);
        }
    }

    pub fn add_node_dependency(&self, table: &str, column: &str) {
        let dep = GcDependency {
            table: table.to_owned(),
            column: column.to_owned(),
        };
        let mut deps = self.node_deps.lock();
        if !deps.contains(&dep) {
            deps.push(dep);
        }
    }

    pub fn register_flush_hook(&self, hook: FlushHook) {
        self.flush_hooks.lock().push(hook);
    }

    pub fn last_stats(&self) -> Option<GcStats> {
        self.last_stats.lock().clone()
    }

    pub fn triple_dependencies(&self) -> Vec<GcDependency> {
        self.triple_deps.lock().clone()
    }

    pub fn node_dependencies(&self) -> Vec<GcDependency> {
        self.node_deps.lock().clone()
    }

    /// Makes the next tick run immediately.
    pub fn trigger(&self) {
        self.state.lock().triggered = true;
        self.wake.notify_all();
    }

    fn request_stop(&self) {
        self.state.lock().stop = true;
        self.wake.notify_all();
    }
}

/// Background loop reclaiming soft-deleted triples and orphaned nodes.
///
/// Runs on its own thread with its own connection, decoupled from
/// foreground transactions. Each cleanup query runs in its own
/// transaction; a failed step is logged and rolled back without blocking
/// the other. The loop skips the very first tick after start and is
/// stopped cooperatively.
pub(crate) struct GarbageCollector {
    handle: Option<JoinHandle<()>>,
}

impl GarbageCollector {
    pub fn start(inner: Arc<StoreInner>) -> Result<GarbageCollector> {
        let handle = std::thread::Builder::new()
            .name("terna-gc".into())
            .spawn(move || run_loop(inner))?;
        Ok(GarbageCollector {
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self, shared: &GcShared) {
        shared.request_stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("gc.thread.panicked");
            }
        }
    }
}

fn run_loop(inner: Arc<StoreInner>) {
    let shared = Arc::clone(&inner.gc);
    let mut first_tick = true;
    debug!(interval_ms = inner.cfg.gc_interval.as_millis() as u64, "gc.started");
    loop {
        let manual = {
            let mut state = shared.state.lock();
            if !state.stop && !state.triggered {
                let _ = shared.wake.wait_for(&mut state, inner.cfg.gc_interval);
            }
            if state.stop {
                break;
            }
            std::mem::replace(&mut state.triggered, false)
        };
        if first_tick {
            first_tick = false;
            if !manual {
                continue;
            }
        }
        run_cycle(&inner, &shared);
    }
    debug!("gc.stopped");
}

fn run_cycle(inner: &Arc<StoreInner>, shared: &GcShared) {
    let cycle = shared.cycle.fetch_add(1, Ordering::Relaxed) + 1;
    let started = Instant::now();
    let conn = match Connection::acquire(Arc::clone(inner)) {
        Ok(conn) => conn,
        Err(err) => {
            warn!(error = %err, "gc.connection.unavailable");
            return;
        }
    };

    let mut triples_removed = 0;
    match collect_triples(&conn, shared) {
        Ok(removed) => triples_removed = removed,
        Err(err) => {
            warn!(cycle, error = %err, "gc.triples.failed");
            if let Err(err) = conn.rollback() {
                warn!(cycle, error = %err, "gc.triples.rollback_failed");
            }
        }
    }

    let node_cadence = inner.cfg.gc_node_cycle.max(1) as u64;
    let nodes_examined = cycle % node_cadence == 0;
    let mut nodes_removed = 0;
    if nodes_examined {
        match collect_nodes(&conn, shared) {
            Ok(removed) => nodes_removed = removed,
            Err(err) => {
                warn!(cycle, error = %err, "gc.nodes.failed");
                if let Err(err) = conn.rollback() {
                    warn!(cycle, error = %err, "gc.nodes.rollback_failed");
                }
            }
        }
    }

    let stats = GcStats {
        cycle,
        triples_removed,
        nodes_removed,
        nodes_examined,
        run_millis: started.elapsed().as_millis() as u64,
    };
    if triples_removed > 0 || nodes_removed > 0 {
        info!(
            cycle,
            triples = triples_removed,
            nodes = nodes_removed,
            run_millis = stats.run_millis,
            "gc.cycle.completed"
        );
    } else {
        debug!(cycle, "gc.cycle.noop");
    }
    *shared.last_stats.lock() = Some(stats);
}

fn collect_triples(conn: &Connection, shared: &GcShared) -> Result<u64> {
    let deps = shared.triple_deps.lock().clone();
    let sql = delete_sql("triples", Some("deleted = 1"), &deps);
    let removed = conn.execute_dynamic(&sql, [])? as u64;
    conn.commit()?;
    Ok(removed)
}

fn collect_nodes(conn: &Connection, shared: &GcShared) -> Result<u64> {
    // Let collaborating subsystems flush their node write buffers so
    // freshly buffered references are visible to the orphan scan.
    {
        let hooks = shared.flush_hooks.lock();
        for hook in hooks.iter() {
            hook()?;
        }
    }
    let deps = shared.node_deps.lock().clone();
    if deps.is_empty() {
        // No registered referents means every node would qualify.
        return Ok(0);
    }
    let sql = delete_sql("nodes", None, &deps);
    let removed = conn.execute_dynamic(&sql, [])? as u64;
    conn.commit()?;
    Ok(removed)
}

fn delete_sql(target: &str, extra: Option<&str>, deps: &[GcDependency]) -> String {
    let mut sql = format!("DELETE FROM {target} WHERE ");
    sql.push_str(extra.unwrap_or("1 = 1"));
    for dep in deps {
        sql.push_str(&format!(
            " AND NOT EXISTS (SELECT 1 FROM {} d WHERE d.{} = {target}.id)",
            dep.table, dep.column
        ));
    }
    sql
}
