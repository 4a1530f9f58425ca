#![allow(missing_docs)]

use tempfile::{tempdir, TempDir};
use terna::{Literal, Node, Result, Store, StoreConfig, Triple, UNPERSISTED};

fn open_store(cfg: StoreConfig) -> Result<(TempDir, Store)> {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("terna.db"), cfg)?;
    store.init_database(Store::CORE_TABLES)?;
    Ok((dir, store))
}

fn quiet_cfg() -> StoreConfig {
    let mut cfg = StoreConfig::default();
    cfg.gc_enabled = false;
    cfg
}

#[test]
fn staged_triples_are_visible_to_the_owning_transaction() -> Result<()> {
    let (_dir, store) = open_store(quiet_cfg())?;
    let conn = store.connection()?;
    let s = Node::uri("http://example.org/s");
    let p = Node::uri("http://example.org/p");
    let o = Node::literal(Literal::string("staged", None, None));
    let triple = Triple::new(s.clone(), p.clone(), o.clone(), None);
    conn.store_triple(&triple)?;

    let matches: Vec<_> = conn
        .list_triples(Some(&s), None, None, None, false, true)?
        .collect::<Result<Vec<_>>>()?;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id(), triple.id());

    // Another connection does not see the uncommitted staged write.
    let other = store.connection()?;
    let foreign: Vec<_> = other
        .list_triples(Some(&s), None, None, None, false, true)?
        .collect::<Result<Vec<_>>>()?;
    assert!(foreign.is_empty());

    conn.commit()?;
    // Refresh the other connection's snapshot before requerying.
    other.rollback()?;
    let foreign: Vec<_> = other
        .list_triples(Some(&s), None, None, None, false, true)?
        .collect::<Result<Vec<_>>>()?;
    assert_eq!(foreign.len(), 1);
    Ok(())
}

#[test]
fn deleting_a_staged_triple_touches_no_rows() -> Result<()> {
    let (dir, store) = open_store(quiet_cfg())?;
    let conn = store.connection()?;
    let triple = Triple::new(
        Node::uri("http://example.org/s"),
        Node::uri("http://example.org/p"),
        Node::uri("http://example.org/o"),
        None,
    );
    conn.store_triple(&triple)?;
    let staged_id = triple.id();
    assert!(staged_id >= 0);

    conn.delete_triple(&triple)?;
    assert!(triple.is_deleted());
    assert_eq!(triple.id(), UNPERSISTED);

    conn.commit()?;
    let raw = rusqlite::Connection::open(dir.path().join("terna.db")).unwrap();
    let rows: i64 = raw
        .query_row("SELECT COUNT(*) FROM triples", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 0);
    // The terms were never forced to disk either.
    let nodes: i64 = raw
        .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
        .unwrap();
    assert_eq!(nodes, 0);
    Ok(())
}

#[test]
fn rollback_discards_staged_triples_and_resets_ids() -> Result<()> {
    let (dir, store) = open_store(quiet_cfg())?;
    let conn = store.connection()?;
    let triple = Triple::new(
        Node::uri("http://example.org/s"),
        Node::uri("http://example.org/p"),
        Node::uri("http://example.org/o"),
        None,
    );
    conn.store_triple(&triple)?;
    assert!(triple.id() >= 0);

    conn.rollback()?;
    assert_eq!(triple.id(), UNPERSISTED);

    conn.commit()?;
    let raw = rusqlite::Connection::open(dir.path().join("terna.db")).unwrap();
    let rows: i64 = raw
        .query_row("SELECT COUNT(*) FROM triples", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 0);
    Ok(())
}

#[test]
fn size_counts_staged_triples_in_the_owning_transaction() -> Result<()> {
    let (_dir, store) = open_store(quiet_cfg())?;
    let conn = store.connection()?;
    assert_eq!(conn.size(None, true)?, 0);
    let g = Node::uri("http://example.org/g");
    let staged = Triple::new(
        Node::uri("http://example.org/s"),
        Node::uri("http://example.org/p"),
        Node::uri("http://example.org/o"),
        Some(g.clone()),
    );
    conn.store_triple(&staged)?;
    assert_eq!(conn.size(None, true)?, 1);
    assert_eq!(conn.size(Some(&g), false)?, 1);
    assert_eq!(conn.size(None, false)?, 0);
    Ok(())
}

#[test]
fn staging_flushes_automatically_at_the_batch_size() -> Result<()> {
    let mut cfg = quiet_cfg();
    cfg.batch_size = 2;
    let (dir, store) = open_store(cfg)?;
    let conn = store.connection()?;
    let p = Node::uri("http://example.org/p");
    for i in 0..2 {
        let triple = Triple::new(
            Node::uri(format!("http://example.org/s{i}")),
            p.clone(),
            Node::literal(Literal::string(format!("v{i}"), None, None)),
            None,
        );
        conn.store_triple(&triple)?;
    }
    // The batch threshold was reached, so both rows are already in the
    // backend within the open transaction.
    let listed: Vec<_> = conn
        .list_triples(None, Some(&p), None, None, false, true)?
        .collect::<Result<Vec<_>>>()?;
    assert_eq!(listed.len(), 2);

    conn.commit()?;
    let raw = rusqlite::Connection::open(dir.path().join("terna.db")).unwrap();
    let rows: i64 = raw
        .query_row("SELECT COUNT(*) FROM triples", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 2);
    Ok(())
}

#[test]
fn contexts_include_staged_named_graphs() -> Result<()> {
    let (_dir, store) = open_store(quiet_cfg())?;
    let conn = store.connection()?;
    let g1 = Node::uri("http://example.org/g1");
    let g2 = Node::uri("http://example.org/g2");
    let committed = Triple::new(
        Node::uri("http://example.org/s"),
        Node::uri("http://example.org/p"),
        Node::uri("http://example.org/o"),
        Some(g1.clone()),
    );
    conn.store_triple(&committed)?;
    conn.commit()?;

    let staged = Triple::new(
        Node::uri("http://example.org/s2"),
        Node::uri("http://example.org/p"),
        Node::uri("http://example.org/o2"),
        Some(g2.clone()),
    );
    conn.store_triple(&staged)?;

    let contexts = conn.contexts()?;
    let mut uris: Vec<_> = contexts
        .iter()
        .filter_map(|node| node.uri_str().map(str::to_owned))
        .collect();
    uris.sort();
    assert_eq!(
        uris,
        vec![
            "http://example.org/g1".to_string(),
            "http://example.org/g2".to_string()
        ]
    );
    Ok(())
}
