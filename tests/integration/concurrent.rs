#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;

use tempfile::{tempdir, TempDir};
use terna::{Literal, Node, Result, Store, StoreConfig, Triple};

fn open_store() -> Result<(TempDir, Store)> {
    let dir = tempdir().unwrap();
    let mut cfg = StoreConfig::default();
    cfg.gc_enabled = false;
    let store = Store::open(dir.path().join("terna.db"), cfg)?;
    store.init_database(Store::CORE_TABLES)?;
    Ok((dir, store))
}

#[test]
fn logically_identical_triples_from_two_connections_stay_distinct() -> Result<()> {
    let (dir, store) = open_store()?;

    let first = store.connection()?;
    let t1 = Triple::new(
        Node::uri("http://example.org/s"),
        Node::uri("http://example.org/p"),
        Node::uri("http://example.org/o"),
        None,
    );
    first.store_triple(&t1)?;
    first.commit()?;

    let second = store.connection()?;
    let t2 = Triple::new(
        Node::uri("http://example.org/s"),
        Node::uri("http://example.org/p"),
        Node::uri("http://example.org/o"),
        None,
    );
    second.store_triple(&t2)?;
    second.commit()?;

    // No silent dedup across connections: same pattern, two rows.
    assert_eq!(*t1, *t2);
    assert_ne!(t1.id(), t2.id());
    let raw = rusqlite::Connection::open(dir.path().join("terna.db")).unwrap();
    let rows: i64 = raw
        .query_row("SELECT COUNT(*) FROM triples", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 2);
    Ok(())
}

#[test]
fn deletion_flags_propagate_through_the_shared_cache() -> Result<()> {
    let (_dir, store) = open_store()?;
    let writer = store.connection()?;
    let triple = Triple::new(
        Node::uri("http://example.org/s"),
        Node::uri("http://example.org/p"),
        Node::literal(Literal::string("shared", None, None)),
        None,
    );
    writer.store_triple(&triple)?;
    writer.commit()?;

    let reader = store.connection()?;
    let held = reader.load_triple_by_id(triple.id())?.unwrap();
    // The shared cache hands out the same instance.
    assert!(Arc::ptr_eq(&held, &triple));
    assert!(!held.is_deleted());

    writer.delete_triple(&triple)?;
    // Visible to the reader's handle before the deleting transaction
    // commits.
    assert!(held.is_deleted());
    writer.commit()?;
    Ok(())
}

#[test]
fn interned_terms_are_shared_across_connections() -> Result<()> {
    let (_dir, store) = open_store()?;
    let first = store.connection()?;
    let uri = Node::uri("http://example.org/shared");
    first.store_node(&uri)?;
    first.commit()?;

    let second = store.connection()?;
    let loaded = second.load_uri("http://example.org/shared")?.unwrap();
    assert!(Arc::ptr_eq(&loaded, &uri));
    Ok(())
}

#[test]
fn parallel_writers_make_progress() -> Result<()> {
    let (dir, store) = open_store()?;
    let store = Arc::new(store);
    let mut handles = Vec::new();
    for worker in 0..2 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || -> Result<()> {
            for i in 0..5 {
                let conn = store.connection()?;
                let triple = Triple::new(
                    Node::uri(format!("http://example.org/w{worker}/s{i}")),
                    Node::uri("http://example.org/p"),
                    Node::literal(Literal::string(format!("{worker}-{i}"), None, None)),
                    None,
                );
                conn.store_triple(&triple)?;
                conn.commit()?;
            }
            Ok(())
        }));
    }
    for handle in handles {
        handle.join().expect("writer thread panicked")?;
    }

    let raw = rusqlite::Connection::open(dir.path().join("terna.db")).unwrap();
    let rows: i64 = raw
        .query_row("SELECT COUNT(*) FROM triples", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 10);
    Ok(())
}
