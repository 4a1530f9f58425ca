#![allow(missing_docs)]

use std::sync::Arc;

use proptest::prelude::*;
use tempfile::{tempdir, TempDir};
use terna::{vocab, Literal, LiteralValue, Namespace, Node, Result, Store, StoreConfig, Triple};
use time::macros::datetime;

fn open_store() -> Result<(TempDir, Store)> {
    let dir = tempdir().unwrap();
    let mut cfg = StoreConfig::default();
    cfg.gc_enabled = false;
    let store = Store::open(dir.path().join("terna.db"), cfg)?;
    store.init_database(Store::CORE_TABLES)?;
    Ok((dir, store))
}

#[test]
fn uri_round_trips_by_natural_key() -> Result<()> {
    let (_dir, store) = open_store()?;
    let conn = store.connection()?;
    let uri = Node::uri("http://example.org/thing");
    conn.store_node(&uri)?;
    assert!(uri.is_persisted());
    let loaded = conn.load_uri("http://example.org/thing")?.unwrap();
    assert_eq!(*loaded, *uri);
    assert_eq!(loaded.id(), uri.id());
    assert!(conn.load_uri("http://example.org/other")?.is_none());
    Ok(())
}

#[test]
fn blank_node_round_trips() -> Result<()> {
    let (_dir, store) = open_store()?;
    let conn = store.connection()?;
    let blank = Node::blank("node17");
    conn.store_node(&blank)?;
    let loaded = conn.load_blank("node17")?.unwrap();
    assert_eq!(loaded.id(), blank.id());
    assert_eq!(*loaded, *blank);
    Ok(())
}

#[test]
fn literals_round_trip_by_value_lang_and_type() -> Result<()> {
    let (_dir, store) = open_store()?;
    let conn = store.connection()?;

    let plain = Node::literal(Literal::string("bonjour", None, None));
    conn.store_node(&plain)?;
    let loaded = conn.load_literal("bonjour", None, None)?.unwrap();
    assert_eq!(loaded.id(), plain.id());

    let tagged = Node::literal(Literal::string("bonjour", Some("FR".into()), None));
    conn.store_node(&tagged)?;
    let loaded = conn.load_literal("bonjour", Some("fr"), None)?.unwrap();
    assert_eq!(loaded.id(), tagged.id());
    assert_ne!(loaded.id(), plain.id());

    let int_type = Node::uri(vocab::XSD_INTEGER);
    let int_lit = Node::literal(Literal::integer(42, int_type.clone()));
    conn.store_node(&int_lit)?;
    // Storing the literal persisted its datatype first.
    assert!(int_type.is_persisted());
    let loaded = conn.load_literal("42", None, Some(&int_type))?.unwrap();
    assert_eq!(loaded.id(), int_lit.id());

    Ok(())
}

#[test]
fn typed_literal_loads_use_the_value_projection() -> Result<()> {
    let (_dir, store) = open_store()?;
    let conn = store.connection()?;

    let int_lit = Node::literal(Literal::integer(-7, Node::uri(vocab::XSD_INTEGER)));
    conn.store_node(&int_lit)?;
    assert_eq!(conn.load_literal_by_int(-7)?.unwrap().id(), int_lit.id());
    assert!(conn.load_literal_by_int(8)?.is_none());

    let dbl_lit = Node::literal(Literal::double(2.5, Node::uri(vocab::XSD_DOUBLE)));
    conn.store_node(&dbl_lit)?;
    assert_eq!(conn.load_literal_by_double(2.5)?.unwrap().id(), dbl_lit.id());

    let bool_lit = Node::literal(Literal::boolean(true, Node::uri(vocab::XSD_BOOLEAN)));
    conn.store_node(&bool_lit)?;
    assert_eq!(conn.load_literal_by_bool(true)?.unwrap().id(), bool_lit.id());

    let instant = datetime!(2023-06-15 08:00:00.250 UTC);
    let time_lit = Node::literal(Literal::date_time(instant, Node::uri(vocab::XSD_DATETIME)));
    conn.store_node(&time_lit)?;
    // Lookup truncates fractional seconds the same way construction did.
    assert_eq!(
        conn.load_literal_by_time(instant)?.unwrap().id(),
        time_lit.id()
    );
    Ok(())
}

#[test]
fn namespace_round_trips_by_prefix_and_uri() -> Result<()> {
    let (_dir, store) = open_store()?;
    let conn = store.connection()?;
    let mut ns = Namespace::new("ex", "http://example.org/");
    conn.store_namespace(&mut ns)?;
    assert!(ns.is_persisted());
    // Idempotent: a second store is a no-op.
    let id = ns.id;
    conn.store_namespace(&mut ns)?;
    assert_eq!(ns.id, id);

    assert_eq!(conn.load_namespace_by_prefix("ex")?.unwrap().uri, ns.uri);
    assert_eq!(
        conn.load_namespace_by_uri("http://example.org/")?.unwrap().prefix,
        ns.prefix
    );
    assert_eq!(conn.namespaces()?.len(), 1);

    conn.delete_namespace("ex")?;
    assert!(conn.load_namespace_by_prefix("ex")?.is_none());
    Ok(())
}

#[test]
fn batched_node_loads_are_positional_with_duplicates() -> Result<()> {
    let dir = tempdir().unwrap();
    let mut cfg = StoreConfig::default();
    cfg.gc_enabled = false;
    let first = Store::open(dir.path().join("terna.db"), cfg.clone())?;
    first.init_database(Store::CORE_TABLES)?;
    let a = Node::uri("http://example.org/a");
    let b = Node::uri("http://example.org/b");
    {
        let conn = first.connection()?;
        conn.store_node(&a)?;
        conn.store_node(&b)?;
        conn.commit()?;
    }
    first.shutdown()?;

    // A fresh store has cold caches, so the lookup takes the batched
    // IN-clause path for the two distinct ids.
    let store = Store::open(dir.path().join("terna.db"), cfg)?;
    store.init_database(Store::CORE_TABLES)?;
    let conn = store.connection()?;
    let result = conn.load_nodes_by_ids(&[a.id(), b.id(), a.id(), -1])?;
    assert_eq!(result.len(), 4);
    let first = result[0].as_ref().unwrap();
    let third = result[2].as_ref().unwrap();
    assert!(Arc::ptr_eq(first, third));
    assert_eq!(result[1].as_ref().unwrap().id(), b.id());
    assert!(result[3].is_none());
    Ok(())
}

#[test]
fn store_list_delete_collect_scenario() -> Result<()> {
    let dir = tempdir().unwrap();
    let mut cfg = StoreConfig::default();
    cfg.gc_enabled = true;
    // Long interval: cycles only run when triggered, so the soft-deleted
    // row is observably still present before the collector passes.
    cfg.gc_interval = std::time::Duration::from_secs(60);
    cfg.gc_node_cycle = 1;
    let store = Store::open(dir.path().join("terna.db"), cfg)?;
    store.init_database(Store::CORE_TABLES)?;

    let conn = store.connection()?;
    let s = Node::uri("http://ex/s");
    let p = Node::uri("http://ex/p");
    let o = Node::literal(Literal::integer(42, Node::uri(vocab::XSD_INTEGER)));
    let triple = Triple::new(s.clone(), p.clone(), o.clone(), None);
    conn.store_triple(&triple)?;
    conn.commit()?;

    let listed = store.list_triples(Some(&s), None, None, None, false, true)?;
    assert_eq!(listed.len(), 1);
    assert_eq!(*listed[0], *triple);

    let before = conn.size(None, true)?;
    conn.delete_triple(&triple)?;
    conn.commit()?;
    assert_eq!(conn.size(None, true)?, before - 1);

    // The row survives logical deletion until a collector cycle runs.
    let raw = rusqlite::Connection::open(dir.path().join("terna.db")).unwrap();
    let rows: i64 = raw
        .query_row("SELECT COUNT(*) FROM triples", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);
    drop(conn);

    store.trigger_gc();
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        if let Some(stats) = store.gc_stats() {
            if stats.triples_removed > 0 {
                break;
            }
        }
        if std::time::Instant::now() > deadline {
            panic!("collector did not reclaim the triple in time");
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    let rows: i64 = raw
        .query_row("SELECT COUNT(*) FROM triples", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 0);
    Ok(())
}

proptest! {
    #[test]
    fn integer_projections_stay_in_sync(value in any::<i64>()) {
        let literal = Literal::integer(value, Node::uri(vocab::XSD_INTEGER));
        prop_assert_eq!(literal.lexical().parse::<i64>().unwrap(), value);
        prop_assert_eq!(literal.double_projection().unwrap(), value as f64);
        match literal.value() {
            LiteralValue::Int(stored) => prop_assert_eq!(stored, value),
            other => prop_assert!(false, "unexpected projection {:?}", other),
        }
    }

    #[test]
    fn boolean_projections_stay_in_sync(value in any::<bool>()) {
        let literal = Literal::boolean(value, Node::uri(vocab::XSD_BOOLEAN));
        prop_assert_eq!(literal.lexical(), if value { "true" } else { "false" });
        match literal.value() {
            LiteralValue::Bool(stored) => prop_assert_eq!(stored, value),
            other => prop_assert!(false, "unexpected projection {:?}", other),
        }
    }
}
