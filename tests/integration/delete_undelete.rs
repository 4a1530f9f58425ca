#![allow(missing_docs)]

use tempfile::{tempdir, TempDir};
use terna::{Node, Result, Store, StoreConfig, Triple};

fn open_store() -> Result<(TempDir, Store)> {
    let dir = tempdir().unwrap();
    let mut cfg = StoreConfig::default();
    cfg.gc_enabled = false;
    let store = Store::open(dir.path().join("terna.db"), cfg)?;
    store.init_database(Store::CORE_TABLES)?;
    Ok((dir, store))
}

fn sample_triple() -> terna::TripleRef {
    Triple::new(
        Node::uri("http://example.org/s"),
        Node::uri("http://example.org/p"),
        Node::uri("http://example.org/o"),
        None,
    )
}

#[test]
fn soft_delete_keeps_the_row_until_collected() -> Result<()> {
    let (dir, store) = open_store()?;
    let conn = store.connection()?;
    let triple = sample_triple();
    conn.store_triple(&triple)?;
    conn.commit()?;

    conn.delete_triple(&triple)?;
    assert!(triple.is_deleted());
    assert!(triple.deleted_at().is_some());
    conn.commit()?;

    assert_eq!(conn.size(None, true)?, 0);
    let listed: Vec<_> = conn
        .list_triples(None, None, None, None, false, true)?
        .collect::<Result<Vec<_>>>()?;
    assert!(listed.is_empty());

    let raw = rusqlite::Connection::open(dir.path().join("terna.db")).unwrap();
    let (rows, deleted): (i64, i64) = raw
        .query_row(
            "SELECT COUNT(*), SUM(deleted) FROM triples",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(rows, 1);
    assert_eq!(deleted, 1);
    Ok(())
}

#[test]
fn readding_a_triple_deleted_in_the_same_transaction_undeletes() -> Result<()> {
    let (dir, store) = open_store()?;
    let conn = store.connection()?;
    let triple = sample_triple();
    conn.store_triple(&triple)?;
    conn.commit()?;
    let id = triple.id();

    conn.delete_triple(&triple)?;
    assert!(triple.is_deleted());
    conn.store_triple(&triple)?;
    assert!(!triple.is_deleted());
    assert_eq!(triple.id(), id);
    conn.commit()?;

    // Exactly one active row; no duplicate, no integrity error.
    let raw = rusqlite::Connection::open(dir.path().join("terna.db")).unwrap();
    let (rows, active): (i64, i64) = raw
        .query_row(
            "SELECT COUNT(*), SUM(1 - deleted) FROM triples",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(rows, 1);
    assert_eq!(active, 1);
    assert_eq!(conn.size(None, true)?, 1);
    Ok(())
}

#[test]
fn delete_and_readd_survive_repeated_cycles() -> Result<()> {
    let (_dir, store) = open_store()?;
    let conn = store.connection()?;
    let triple = sample_triple();
    conn.store_triple(&triple)?;
    conn.commit()?;

    for _ in 0..3 {
        conn.delete_triple(&triple)?;
        conn.store_triple(&triple)?;
    }
    conn.commit()?;
    assert!(!triple.is_deleted());
    assert_eq!(conn.size(None, true)?, 1);
    Ok(())
}

#[test]
fn the_filter_resets_at_transaction_boundaries() -> Result<()> {
    let (_dir, store) = open_store()?;
    let conn = store.connection()?;
    let triple = sample_triple();
    conn.store_triple(&triple)?;
    conn.commit()?;

    conn.delete_triple(&triple)?;
    conn.commit()?;

    // A later transaction re-adding the same instance is a plain no-op on
    // the already assigned id: the filter forgot the old deletion, so the
    // triple stays deleted in the backend.
    conn.store_triple(&triple)?;
    conn.commit()?;
    assert_eq!(conn.size(None, true)?, 0);
    Ok(())
}

#[test]
fn deleting_an_unpersisted_triple_only_marks_the_flag() -> Result<()> {
    let (dir, store) = open_store()?;
    let conn = store.connection()?;
    let triple = sample_triple();
    conn.delete_triple(&triple)?;
    assert!(triple.is_deleted());
    assert!(!triple.is_persisted());
    conn.commit()?;

    let raw = rusqlite::Connection::open(dir.path().join("terna.db")).unwrap();
    let rows: i64 = raw
        .query_row("SELECT COUNT(*) FROM triples", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 0);
    Ok(())
}

#[test]
fn immediate_stores_follow_the_same_delete_protocol() -> Result<()> {
    let dir = tempdir().unwrap();
    let mut cfg = StoreConfig::default();
    cfg.gc_enabled = false;
    cfg.batching = false;
    let store = Store::open(dir.path().join("terna.db"), cfg)?;
    store.init_database(Store::CORE_TABLES)?;

    let conn = store.connection()?;
    let triple = sample_triple();
    conn.store_triple(&triple)?;
    conn.delete_triple(&triple)?;
    conn.store_triple(&triple)?;
    conn.commit()?;
    assert_eq!(conn.size(None, true)?, 1);
    Ok(())
}
