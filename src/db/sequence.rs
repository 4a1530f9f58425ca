use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::dialect::{Dialect, Stmt};
use crate::error::{Result, StoreError};

use super::retry::{with_retry, RetryPolicy};
use super::session::Session;

/// Id sequences backed by the `sequences` table.
///
/// Ids are claimed in blocks over a dedicated autocommit session, so a
/// single UPDATE ... RETURNING round trip serves many assignments and ids
/// stay unique across connections and processes. Transaction ids are
/// claimed one at a time; gaps from unused block remainders are harmless.
pub(crate) struct Sequences {
    path: PathBuf,
    dialect: Arc<dyn Dialect>,
    policy: RetryPolicy,
    session: Mutex<Option<Session>>,
    nodes: Mutex<SeqBlock>,
    triples: Mutex<SeqBlock>,
    namespaces: Mutex<SeqBlock>,
    tx: Mutex<SeqBlock>,
    block: i64,
}

#[derive(Default)]
struct SeqBlock {
    next: i64,
    // exclusive upper bound; next == end means exhausted
    end: i64,
}

impl Sequences {
    pub fn new(
        path: PathBuf,
        dialect: Arc<dyn Dialect>,
        policy: RetryPolicy,
        block: i64,
    ) -> Sequences {
        Sequences {
            path,
            dialect,
            policy,
            session: Mutex::new(None),
            nodes: Mutex::new(SeqBlock::default()),
            triples: Mutex::new(SeqBlock::default()),
            namespaces: Mutex::new(SeqBlock::default()),
            tx: Mutex::new(SeqBlock::default()),
            block: block.max(1),
        }
    }

    /// Next node id.
    pub fn next_node_id(&self) -> Result<i64> {
        self.next_from("nodes", &self.nodes, self.block)
    }

    /// Next triple id.
    pub fn next_triple_id(&self) -> Result<i64> {
        self.next_from("triples", &self.triples, self.block)
    }

    /// Next namespace id.
    pub fn next_namespace_id(&self) -> Result<i64> {
        self.next_from("namespaces", &self.namespaces, 1)
    }

    /// Next transaction id.
    pub fn next_tx_id(&self) -> Result<i64> {
        self.next_from("tx", &self.tx, 1)
    }

    /// Discards cached blocks and the allocation session. Called after the
    /// schema is created or dropped, when the backing rows change out from
    /// under the cache.
    pub fn reset_cache(&self) {
        *self.nodes.lock() = SeqBlock::default();
        *self.triples.lock() = SeqBlock::default();
        *self.namespaces.lock() = SeqBlock::default();
        *self.tx.lock() = SeqBlock::default();
        *self.session.lock() = None;
    }

    fn next_from(&self, name: &'static str, cell: &Mutex<SeqBlock>, block: i64) -> Result<i64> {
        let mut guard = cell.lock();
        if guard.next < guard.end {
            let value = guard.next;
            guard.next += 1;
            return Ok(value);
        }
        let claimed = self.allocate(name, block)?;
        let start = claimed - block + 1;
        guard.next = start + 1;
        guard.end = claimed + 1;
        Ok(start)
    }

    fn allocate(&self, name: &'static str, block: i64) -> Result<i64> {
        let mut session = self.session.lock();
        if session.is_none() {
            *session = Some(Session::open(&self.path, Arc::clone(&self.dialect))?);
        }
        let session = session.as_ref().ok_or(StoreError::NotOpen)?;
        with_retry(session, &self.policy, None, "seq.allocate", |s| {
            s.query_row_opt(Stmt::SeqAllocate, rusqlite::params![name, block], |row| {
                row.get::<_, i64>(0)
            })?
            .ok_or_else(|| StoreError::Migration(format!("sequence '{name}' is missing")))
        })
    }
}
