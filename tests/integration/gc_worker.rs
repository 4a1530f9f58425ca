#![allow(missing_docs)]

use std::time::{Duration, Instant};

use tempfile::{tempdir, TempDir};
use terna::{GcStats, Literal, Node, Result, Store, StoreConfig, Triple};

fn gc_cfg(interval: Duration) -> StoreConfig {
    let mut cfg = StoreConfig::default();
    cfg.gc_enabled = true;
    cfg.gc_interval = interval;
    cfg.gc_node_cycle = 1;
    cfg
}

fn open_store(cfg: StoreConfig) -> Result<(TempDir, Store)> {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("terna.db"), cfg)?;
    store.init_database(Store::CORE_TABLES)?;
    Ok((dir, store))
}

fn wait_for_stats(
    store: &Store,
    deadline: Duration,
    accept: impl Fn(&GcStats) -> bool,
) -> GcStats {
    let limit = Instant::now() + deadline;
    loop {
        if let Some(stats) = store.gc_stats() {
            if accept(&stats) {
                return stats;
            }
        }
        if Instant::now() > limit {
            panic!("collector did not reach the expected state in time");
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn triple_rows(dir: &TempDir) -> i64 {
    let raw = rusqlite::Connection::open(dir.path().join("terna.db")).unwrap();
    raw.query_row("SELECT COUNT(*) FROM triples", [], |row| row.get(0))
        .unwrap()
}

fn node_rows(dir: &TempDir) -> i64 {
    let raw = rusqlite::Connection::open(dir.path().join("terna.db")).unwrap();
    raw.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn the_first_tick_does_no_work() -> Result<()> {
    let (_dir, store) = open_store(gc_cfg(Duration::from_millis(100)))?;
    // The first tick (~100ms) is skipped; stats only appear once the
    // second tick runs a cycle (~200ms).
    std::thread::sleep(Duration::from_millis(130));
    assert!(store.gc_stats().is_none());
    wait_for_stats(&store, Duration::from_secs(5), |_| true);
    Ok(())
}

#[test]
fn soft_deleted_triples_and_orphan_nodes_are_reclaimed() -> Result<()> {
    let (dir, store) = open_store(gc_cfg(Duration::from_secs(60)))?;
    let conn = store.connection()?;
    let triple = Triple::new(
        Node::uri("http://example.org/s"),
        Node::uri("http://example.org/p"),
        Node::literal(Literal::string("v", None, None)),
        None,
    );
    conn.store_triple(&triple)?;
    conn.commit()?;
    conn.delete_triple(&triple)?;
    conn.commit()?;
    drop(conn);
    assert_eq!(triple_rows(&dir), 1);
    assert_eq!(node_rows(&dir), 3);

    store.trigger_gc();
    wait_for_stats(&store, Duration::from_secs(5), |stats| {
        stats.triples_removed > 0
    });
    assert_eq!(triple_rows(&dir), 0);

    // Once the triple row is gone its terms are orphans; a later node
    // pass reclaims them.
    store.trigger_gc();
    wait_for_stats(&store, Duration::from_secs(5), |stats| {
        stats.nodes_removed > 0 || node_rows(&dir) == 0
    });
    assert_eq!(node_rows(&dir), 0);
    Ok(())
}

#[test]
fn registered_dependencies_protect_rows() -> Result<()> {
    let (dir, store) = open_store(gc_cfg(Duration::from_secs(60)))?;
    store.add_triple_table_dependency("keepers", "triple_id");

    let conn = store.connection()?;
    let subject = Node::uri("http://example.org/s");
    let triple = Triple::new(
        subject.clone(),
        Node::uri("http://example.org/p"),
        Node::uri("http://example.org/o"),
        None,
    );
    conn.store_triple(&triple)?;
    conn.commit()?;

    {
        let raw = rusqlite::Connection::open(dir.path().join("terna.db")).unwrap();
        raw.execute_batch("CREATE TABLE keepers (triple_id INTEGER NOT NULL)")
            .unwrap();
        raw.execute("INSERT INTO keepers (triple_id) VALUES (?1)", [triple.id()])
            .unwrap();
    }

    conn.delete_triple(&triple)?;
    conn.commit()?;
    drop(conn);

    store.trigger_gc();
    wait_for_stats(&store, Duration::from_secs(5), |_| true);
    // The keeper row references the soft-deleted triple, and the triple
    // row in turn keeps its subject node alive.
    assert_eq!(triple_rows(&dir), 1);
    assert!(node_rows(&dir) >= 3);

    {
        let raw = rusqlite::Connection::open(dir.path().join("terna.db")).unwrap();
        raw.execute("DELETE FROM keepers", []).unwrap();
    }
    store.trigger_gc();
    wait_for_stats(&store, Duration::from_secs(5), |stats| {
        stats.triples_removed > 0
    });
    assert_eq!(triple_rows(&dir), 0);
    Ok(())
}

#[test]
fn flush_hooks_run_before_node_cleanup() -> Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    let (_dir, store) = open_store(gc_cfg(Duration::from_secs(60)))?;
    let calls = Arc::new(AtomicU32::new(0));
    let hook_calls = Arc::clone(&calls);
    store.register_flush_hook(move || {
        hook_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    store.trigger_gc();
    wait_for_stats(&store, Duration::from_secs(5), |stats| stats.nodes_examined);
    assert!(calls.load(Ordering::SeqCst) >= 1);
    Ok(())
}

#[test]
fn a_failing_cleanup_step_does_not_stop_the_collector() -> Result<()> {
    let (_dir, store) = open_store(gc_cfg(Duration::from_secs(60)))?;
    // A dependency on a table that does not exist makes the triple step
    // fail; the cycle still completes and reports stats.
    store.add_triple_table_dependency("missing_table", "triple_id");
    store.trigger_gc();
    let stats = wait_for_stats(&store, Duration::from_secs(5), |_| true);
    assert_eq!(stats.triples_removed, 0);

    // The node step keeps running despite the broken triple step.
    store.trigger_gc();
    wait_for_stats(&store, Duration::from_secs(5), |stats| stats.nodes_examined);
    Ok(())
}
