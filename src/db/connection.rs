use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::params;
use rusqlite::types::Value;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::dialect::Stmt;
use crate::error::{Result, StoreError};
use crate::model::{
    now_millis, Literal, LiteralKey, LiteralValue, Namespace, Node, NodeId, NodeKind, NodeRef,
    NodeValue, Triple, TripleRef,
};

use super::cursor::TripleCursor;
use super::filter::DeletionFilter;
use super::retry::{with_retry, RetryPolicy};
use super::session::Session;
use super::staging::{ContextPattern, TripleStaging};
use super::store::StoreInner;

// Largest IN-clause arity used by batched node resolution.
const MAX_IN_ARITY: usize = 512;
// Rows per multi-row INSERT during a staged-batch flush.
const BATCH_ROWS_PER_STATEMENT: usize = 100;

/// The unit-of-work object for one transactional session.
///
/// All graph-level reads and writes go through a connection: loads consult
/// the process-wide caches before touching the backend, triple writes are
/// staged and flushed in batches, and deletes follow the soft-delete
/// protocol. A connection is used by one logical thread of control at a
/// time; the caches it shares with other connections tolerate concurrency
/// on their own.
pub struct Connection {
    inner: Arc<StoreInner>,
    session: Option<Session>,
    staging: Mutex<TripleStaging>,
    filter: Mutex<DeletionFilter>,
    tx_id: AtomicI64,
    policy: RetryPolicy,
    batching: bool,
}

struct RawNode {
    id: i64,
    ntype: i64,
    svalue: Option<String>,
    ivalue: Option<i64>,
    dvalue: Option<f64>,
    tvalue: Option<i64>,
    bvalue: Option<bool>,
    lang: Option<String>,
    ltype: Option<i64>,
    created: i64,
}

pub(crate) struct RawTriple {
    pub id: i64,
    pub subject: i64,
    pub predicate: i64,
    pub object: i64,
    pub context: Option<i64>,
    pub creator: Option<i64>,
    pub inferred: bool,
    pub deleted: bool,
    pub created: i64,
    pub deleted_at: Option<i64>,
}

fn raw_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawNode> {
    Ok(RawNode {
        id: row.get(0)?,
        ntype: row.get(1)?,
        svalue: row.get(2)?,
        ivalue: row.get(3)?,
        dvalue: row.get(4)?,
        tvalue: row.get(5)?,
        bvalue: row.get(6)?,
        lang: row.get(7)?,
        ltype: row.get(8)?,
        created: row.get(9)?,
    })
}

pub(crate) fn raw_triple(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawTriple> {
    Ok(RawTriple {
        id: row.get(0)?,
        subject: row.get(1)?,
        predicate: row.get(2)?,
        object: row.get(3)?,
        context: row.get(4)?,
        creator: row.get(5)?,
        inferred: row.get(6)?,
        deleted: row.get(7)?,
        created: row.get(8)?,
        deleted_at: row.get(9)?,
    })
}

impl Connection {
    pub(crate) fn acquire(inner: Arc<StoreInner>) -> Result<Connection> {
        if !inner.is_open() {
            return Err(StoreError::NotOpen);
        }
        let session = inner.pool.acquire()?;
        session.begin()?;
        let tx_id = inner.sequences.next_tx_id()?;
        let policy = RetryPolicy {
            max_attempts: inner.cfg.retry_attempts,
            backoff: inner.cfg.retry_backoff,
        };
        let batching = inner.cfg.batching && inner.dialect.batch_supported();
        let filter = DeletionFilter::new(
            inner.cfg.deletion_filter_capacity,
            inner.cfg.deletion_filter_rate,
        );
        debug!(tx_id, batching, "store.connection.opened");
        Ok(Connection {
            inner,
            session: Some(session),
            staging: Mutex::new(TripleStaging::default()),
            filter: Mutex::new(filter),
            tx_id: AtomicI64::new(tx_id),
            policy,
            batching,
        })
    }

    /// Id of the current transaction.
    pub fn tx_id(&self) -> i64 {
        self.tx_id.load(Ordering::Acquire)
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(StoreError::NotOpen)
    }

    // ---- node loads ----

    /// Node by database id.
    pub fn load_node_by_id(&self, id: NodeId) -> Result<Option<NodeRef>> {
        if id < 0 {
            return Ok(None);
        }
        if let Some(node) = self.inner.caches.node_by_id(id) {
            return Ok(Some(node));
        }
        let raw = self
            .session()?
            .query_row_opt(Stmt::LoadNodeById, [id], raw_node)?;
        match raw {
            Some(raw) => Ok(Some(self.node_from_raw(raw)?)),
            None => Ok(None),
        }
    }

    /// Batched positional node resolution. The result has one slot per
    /// input id, duplicates included; uncached ids are fetched with
    /// bounded IN-clauses, halving the batch size to fit what remains.
    pub fn load_nodes_by_ids(&self, ids: &[NodeId]) -> Result<Vec<Option<NodeRef>>> {
        let mut resolved: FxHashMap<NodeId, NodeRef> = FxHashMap::default();
        let mut missing: Vec<NodeId> = Vec::new();
        let mut queued: FxHashSet<NodeId> = FxHashSet::default();
        for &id in ids {
            if id < 0 || resolved.contains_key(&id) || queued.contains(&id) {
                continue;
            }
            match self.inner.caches.node_by_id(id) {
                Some(node) => {
                    resolved.insert(id, node);
                }
                None => {
                    queued.insert(id);
                    missing.push(id);
                }
            }
        }
        let mut remaining = missing.as_slice();
        while !remaining.is_empty() {
            let mut arity = MAX_IN_ARITY;
            while arity > remaining.len() {
                arity /= 2;
            }
            let arity = arity.max(1).min(remaining.len());
            let (chunk, rest) = remaining.split_at(arity);
            let sql = self.inner.dialect.nodes_by_ids(arity);
            let raws = self.session()?.query_rows_sql(
                &sql,
                rusqlite::params_from_iter(chunk.iter().copied()),
                raw_node,
            )?;
            for raw in raws {
                let node = self.node_from_raw(raw)?;
                resolved.insert(node.id(), node);
            }
            remaining = rest;
        }
        Ok(ids.iter().map(|id| resolved.get(id).cloned()).collect())
    }

    /// URI resource by URI string.
    pub fn load_uri(&self, uri: &str) -> Result<Option<NodeRef>> {
        if let Some(node) = self.inner.caches.uri(uri) {
            return Ok(Some(node));
        }
        let _guard = self.inner.caches.uri_lock.lock();
        if let Some(node) = self.inner.caches.uri(uri) {
            return Ok(Some(node));
        }
        let raw = self
            .session()?
            .query_row_opt(Stmt::LoadUriByUri, [uri], raw_node)?;
        raw.map(|raw| self.node_from_raw(raw)).transpose()
    }

    /// Blank node by anonymous id.
    pub fn load_blank(&self, anon_id: &str) -> Result<Option<NodeRef>> {
        if let Some(node) = self.inner.caches.blank(anon_id) {
            return Ok(Some(node));
        }
        let _guard = self.inner.caches.blank_lock.lock();
        if let Some(node) = self.inner.caches.blank(anon_id) {
            return Ok(Some(node));
        }
        let raw = self
            .session()?
            .query_row_opt(Stmt::LoadBlankByAnonId, [anon_id], raw_node)?;
        raw.map(|raw| self.node_from_raw(raw)).transpose()
    }

    /// Literal by lexical form, language tag, and datatype.
    pub fn load_literal(
        &self,
        lexical: &str,
        lang: Option<&str>,
        datatype: Option<&NodeRef>,
    ) -> Result<Option<NodeRef>> {
        let lang = lang.map(|tag| self.inner.lang.normalize(tag));
        let key = LiteralKey {
            lexical: lexical.to_owned(),
            lang: lang.as_deref().map(str::to_owned),
            datatype: datatype.and_then(|dt| dt.uri_str()).map(str::to_owned),
        };
        if let Some(node) = self.inner.caches.literal(&key) {
            return Ok(Some(node));
        }
        let _guard = self.inner.caches.literal_lock.lock();
        if let Some(node) = self.inner.caches.literal(&key) {
            return Ok(Some(node));
        }
        let session = self.session()?;
        let raw = match (&lang, datatype) {
            (Some(tag), _) => session.query_row_opt(
                Stmt::LoadLiteralByValueLang,
                params![lexical, &**tag],
                raw_node,
            )?,
            (None, Some(dt)) => {
                if !dt.is_persisted() {
                    // No literal row can reference an unpersisted datatype.
                    return Ok(None);
                }
                session.query_row_opt(
                    Stmt::LoadLiteralByValueType,
                    params![lexical, dt.id()],
                    raw_node,
                )?
            }
            (None, None) => {
                session.query_row_opt(Stmt::LoadLiteralByValue, [lexical], raw_node)?
            }
        };
        raw.map(|raw| self.node_from_raw(raw)).transpose()
    }

    /// Integer literal by typed value.
    pub fn load_literal_by_int(&self, value: i64) -> Result<Option<NodeRef>> {
        self.load_literal_typed(Stmt::LoadLiteralByIntValue, Value::Integer(value))
    }

    /// Double literal by typed value.
    pub fn load_literal_by_double(&self, value: f64) -> Result<Option<NodeRef>> {
        self.load_literal_typed(Stmt::LoadLiteralByDoubleValue, Value::Real(value))
    }

    /// Boolean literal by typed value.
    pub fn load_literal_by_bool(&self, value: bool) -> Result<Option<NodeRef>> {
        self.load_literal_typed(Stmt::LoadLiteralByBoolValue, Value::Integer(value as i64))
    }

    /// Date/time literal by instant; fractional seconds are truncated the
    /// same way the literal constructor truncates them.
    pub fn load_literal_by_time(&self, instant: OffsetDateTime) -> Result<Option<NodeRef>> {
        self.load_literal_typed(
            Stmt::LoadLiteralByTimeValue,
            Value::Integer(instant.unix_timestamp()),
        )
    }

    fn load_literal_typed(&self, stmt: Stmt, value: Value) -> Result<Option<NodeRef>> {
        let _guard = self.inner.caches.literal_lock.lock();
        let raw = self.session()?.query_row_opt(stmt, [value], raw_node)?;
        raw.map(|raw| self.node_from_raw(raw)).transpose()
    }

    fn node_from_raw(&self, raw: RawNode) -> Result<NodeRef> {
        let kind = NodeKind::from_code(raw.ntype)?;
        let lexical = raw.svalue.unwrap_or_default();
        let value = match kind {
            NodeKind::Uri => NodeValue::Uri(lexical),
            NodeKind::Blank => NodeValue::Blank(lexical),
            _ => {
                let datatype = match raw.ltype {
                    Some(dt_id) => Some(self.load_node_by_id(dt_id)?.ok_or_else(|| {
                        StoreError::contract(format!(
                            "literal {} references missing datatype {dt_id}",
                            raw.id
                        ))
                    })?),
                    None => None,
                };
                let lang = raw
                    .lang
                    .map(|tag| self.inner.lang.normalize(&tag).to_string());
                let projection = match kind {
                    NodeKind::StringLiteral => LiteralValue::Str,
                    NodeKind::IntLiteral => LiteralValue::Int(raw.ivalue.unwrap_or_default()),
                    NodeKind::DoubleLiteral => {
                        LiteralValue::Double(raw.dvalue.unwrap_or_default())
                    }
                    NodeKind::BoolLiteral => LiteralValue::Bool(raw.bvalue.unwrap_or_default()),
                    NodeKind::DateTimeLiteral => {
                        LiteralValue::DateTime(raw.tvalue.unwrap_or_default())
                    }
                    NodeKind::Uri | NodeKind::Blank => unreachable!(),
                };
                NodeValue::Literal(Literal::from_parts(lexical, lang, datatype, projection))
            }
        };
        let node = Node::from_row(raw.id, raw.created, value);
        self.inner.caches.cache_node(&node);
        Ok(node)
    }

    // ---- triple loads ----

    /// Triple by database id, including soft-deleted rows.
    pub fn load_triple_by_id(&self, id: i64) -> Result<Option<TripleRef>> {
        if id < 0 {
            return Ok(None);
        }
        if let Some(triple) = self.inner.caches.triple_by_id(id) {
            return Ok(Some(triple));
        }
        let raw = self
            .session()?
            .query_row_opt(Stmt::LoadTripleById, [id], raw_triple)?;
        match raw {
            Some(raw) => Ok(Some(self.triple_from_raw(&raw)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn triple_from_raw(&self, raw: &RawTriple) -> Result<TripleRef> {
        if let Some(triple) = self.inner.caches.triple_by_id(raw.id) {
            return Ok(triple);
        }
        let mut ids: SmallVec<[i64; 5]> = SmallVec::new();
        ids.push(raw.subject);
        ids.push(raw.predicate);
        ids.push(raw.object);
        ids.extend(raw.context);
        ids.extend(raw.creator);
        let nodes = self.load_nodes_by_ids(&ids)?;
        let mut slots = nodes.into_iter();
        let mut take = |position: &str| -> Result<NodeRef> {
            slots.next().flatten().ok_or_else(|| {
                StoreError::contract(format!(
                    "triple {} references a missing {position} node",
                    raw.id
                ))
            })
        };
        let subject = take("subject")?;
        let predicate = take("predicate")?;
        let object = take("object")?;
        let context = raw.context.map(|_| take("context")).transpose()?;
        let creator = raw.creator.map(|_| take("creator")).transpose()?;
        let triple = Triple::from_row(
            raw.id,
            subject,
            predicate,
            object,
            context,
            creator,
            raw.inferred,
            raw.deleted,
            raw.created,
            raw.deleted_at,
        );
        self.inner.caches.cache_triple(&triple);
        Ok(triple)
    }

    // ---- namespace operations ----

    /// Namespace by prefix.
    pub fn load_namespace_by_prefix(&self, prefix: &str) -> Result<Option<Namespace>> {
        if let Some(ns) = self.inner.caches.namespace_by_prefix(prefix) {
            return Ok(Some(ns));
        }
        let _guard = self.inner.caches.namespace_lock.lock();
        if let Some(ns) = self.inner.caches.namespace_by_prefix(prefix) {
            return Ok(Some(ns));
        }
        let ns = self
            .session()?
            .query_row_opt(Stmt::LoadNamespaceByPrefix, [prefix], Self::raw_namespace)?;
        if let Some(ns) = &ns {
            self.inner.caches.cache_namespace(ns);
        }
        Ok(ns)
    }

    /// Namespace by URI.
    pub fn load_namespace_by_uri(&self, uri: &str) -> Result<Option<Namespace>> {
        if let Some(ns) = self.inner.caches.namespace_by_uri(uri) {
            return Ok(Some(ns));
        }
        let _guard = self.inner.caches.namespace_lock.lock();
        if let Some(ns) = self.inner.caches.namespace_by_uri(uri) {
            return Ok(Some(ns));
        }
        let ns = self
            .session()?
            .query_row_opt(Stmt::LoadNamespaceByUri, [uri], Self::raw_namespace)?;
        if let Some(ns) = &ns {
            self.inner.caches.cache_namespace(ns);
        }
        Ok(ns)
    }

    fn raw_namespace(row: &rusqlite::Row<'_>) -> rusqlite::Result<Namespace> {
        Ok(Namespace {
            id: row.get(0)?,
            prefix: row.get(1)?,
            uri: row.get(2)?,
            created: row.get(3)?,
        })
    }

    /// All namespace bindings, ordered by prefix.
    pub fn namespaces(&self) -> Result<Vec<Namespace>> {
        let list = self
            .session()?
            .query_rows(Stmt::QueryNamespaces, [], Self::raw_namespace)?;
        for ns in &list {
            self.inner.caches.cache_namespace(ns);
        }
        Ok(list)
    }

    /// Persists a namespace binding; a no-op when it already has an id.
    pub fn store_namespace(&self, ns: &mut Namespace) -> Result<()> {
        if ns.is_persisted() {
            return Ok(());
        }
        let _guard = self.inner.caches.namespace_lock.lock();
        let id = self.inner.sequences.next_namespace_id()?;
        self.session()?.execute(
            Stmt::StoreNamespace,
            params![id, ns.prefix, ns.uri, ns.created],
        )?;
        ns.id = id;
        self.inner.caches.cache_namespace(ns);
        Ok(())
    }

    /// Removes a namespace binding by prefix.
    pub fn delete_namespace(&self, prefix: &str) -> Result<()> {
        self.session()?.execute(Stmt::DeleteNamespace, [prefix])?;
        self.inner.caches.evict_namespace(prefix);
        Ok(())
    }

    // ---- node stores ----

    /// Persists a node; a no-op when it already has an id. A literal whose
    /// datatype is itself unpersisted persists the datatype first.
    pub fn store_node(&self, node: &NodeRef) -> Result<()> {
        if node.is_persisted() {
            return Ok(());
        }
        if let Some(literal) = node.as_literal() {
            literal.validate()?;
            if let Some(datatype) = literal.datatype() {
                if !datatype.is_persisted() {
                    self.store_node(datatype)?;
                }
            }
        }
        let id = self.inner.sequences.next_node_id()?;
        node.assign_id(id)?;
        let session = self.session()?;
        let created = node.created();
        match node.value() {
            NodeValue::Uri(uri) => {
                session.execute(Stmt::StoreUri, params![id, uri, created])?;
            }
            NodeValue::Blank(anon) => {
                session.execute(Stmt::StoreBlank, params![id, anon, created])?;
            }
            NodeValue::Literal(literal) => {
                let ltype = literal.datatype().map(|dt| dt.id());
                match literal.value() {
                    LiteralValue::Str => {
                        session.execute(
                            Stmt::StoreStringLiteral,
                            params![id, literal.lexical(), literal.lang(), ltype, created],
                        )?;
                    }
                    LiteralValue::Int(v) => {
                        session.execute(
                            Stmt::StoreIntLiteral,
                            params![id, literal.lexical(), v, v as f64, ltype, created],
                        )?;
                    }
                    LiteralValue::Double(v) => {
                        session.execute(
                            Stmt::StoreDoubleLiteral,
                            params![id, literal.lexical(), v, ltype, created],
                        )?;
                    }
                    LiteralValue::Bool(v) => {
                        session.execute(
                            Stmt::StoreBoolLiteral,
                            params![id, literal.lexical(), v, ltype, created],
                        )?;
                    }
                    LiteralValue::DateTime(secs) => {
                        session.execute(
                            Stmt::StoreTimeLiteral,
                            params![id, literal.lexical(), secs, ltype, created],
                        )?;
                    }
                }
            }
        }
        self.inner.caches.cache_node(node);
        Ok(())
    }

    // ---- triple stores and deletes ----

    /// Persists or stages a triple.
    ///
    /// A triple that already carries an id is normally a no-op; when its id
    /// hits the per-transaction deletion filter it is treated as a re-add
    /// of a triple deleted earlier in this transaction and routed through
    /// UNDELETE. A filter false positive only costs an undelete of an
    /// already active row.
    pub fn store_triple(&self, triple: &TripleRef) -> Result<()> {
        let existing = triple.id();
        if existing >= 0 {
            let _guard = self.inner.triple_locks.lock(existing);
            let maybe_deleted = self.filter.lock().maybe_contains(existing);
            if maybe_deleted {
                with_retry(
                    self.session()?,
                    &self.policy,
                    Some("sp_undelete"),
                    "undelete.triple",
                    |s| s.execute(Stmt::UndeleteTriple, [existing]),
                )?;
                triple.mark_active();
                self.inner.caches.cache_triple(triple);
                debug!(triple_id = existing, "store.triple.undeleted");
            }
            return Ok(());
        }
        triple.validate()?;
        let id = self.inner.sequences.next_triple_id()?;
        triple.assign_id(id)?;
        let _guard = self.inner.triple_locks.lock(id);
        if self.batching {
            self.inner.caches.cache_triple(triple);
            let should_flush = {
                let mut staging = self.staging.lock();
                staging.insert(triple.clone());
                staging.len() >= self.inner.cfg.batch_size
            };
            if should_flush {
                self.flush()?;
            }
        } else {
            self.persist_triple_now(triple)?;
            self.inner.caches.cache_triple(triple);
        }
        Ok(())
    }

    /// Marks a triple deleted.
    ///
    /// The in-memory flag flips before any backend work so concurrent
    /// readers holding the same cached instance observe the deletion right
    /// away. A staged triple is simply removed from the staging table; a
    /// persisted one gets a soft-delete UPDATE and its id recorded in the
    /// deletion filter.
    pub fn delete_triple(&self, triple: &TripleRef) -> Result<()> {
        let id = triple.id();
        let now = now_millis();
        if id < 0 {
            triple.mark_deleted(now);
            return Ok(());
        }
        let _guard = self.inner.triple_locks.lock(id);
        triple.mark_deleted(now);
        let was_staged = self.staging.lock().remove(id).is_some();
        if was_staged {
            triple.clear_id();
            self.inner.caches.evict_triple(id);
            return Ok(());
        }
        with_retry(
            self.session()?,
            &self.policy,
            Some("sp_delete"),
            "delete.triple",
            |s| s.execute(Stmt::DeleteTriple, params![id, now]),
        )?;
        self.filter.lock().record(id);
        Ok(())
    }

    fn ensure_terms_persisted(&self, triple: &TripleRef) -> Result<()> {
        self.store_node(triple.subject())?;
        self.store_node(triple.predicate())?;
        self.store_node(triple.object())?;
        if let Some(context) = triple.context() {
            self.store_node(context)?;
        }
        if let Some(creator) = triple.creator() {
            self.store_node(creator)?;
        }
        Ok(())
    }

    fn persist_triple_now(&self, triple: &TripleRef) -> Result<()> {
        self.ensure_terms_persisted(triple)?;
        let subject = triple.subject().id();
        let predicate = triple.predicate().id();
        let object = triple.object().id();
        let context = triple.context().map(|node| node.id());
        let creator = triple.creator().map(|node| node.id());
        with_retry(
            self.session()?,
            &self.policy,
            Some("sp_triple"),
            "store.triple",
            |s| {
                s.execute(
                    Stmt::StoreTriple,
                    params![
                        triple.id(),
                        subject,
                        predicate,
                        object,
                        context,
                        creator,
                        triple.is_inferred(),
                        triple.created()
                    ],
                )
            },
        )
        .map_err(|err| {
            // A lock conflict that escapes the retry loop (not listed as
            // transient by the dialect) is still a concurrent writer losing
            // the race, not a driver fault.
            if err.backend_code() == Some(self.inner.dialect.lock_conflict_code()) {
                StoreError::ConcurrentModification("store.triple")
            } else {
                err
            }
        })?;
        Ok(())
    }

    /// Flushes any staged triples as one batched insert.
    pub fn flush(&self) -> Result<()> {
        let staged = self.staging.lock().drain();
        if staged.is_empty() {
            return Ok(());
        }
        for triple in &staged {
            self.ensure_terms_persisted(triple)?;
        }
        debug!(count = staged.len(), "store.staging.flush");
        let session = self.session()?;
        let dialect = Arc::clone(&self.inner.dialect);
        with_retry(
            session,
            &self.policy,
            Some("sp_flush"),
            "store.triple_batch",
            |s| {
                if dialect.batch_supported() {
                    for chunk in staged.chunks(BATCH_ROWS_PER_STATEMENT) {
                        let sql = dialect.store_triples_batch(chunk.len());
                        let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * 8);
                        for triple in chunk {
                            values.push(Value::Integer(triple.id()));
                            values.push(Value::Integer(triple.subject().id()));
                            values.push(Value::Integer(triple.predicate().id()));
                            values.push(Value::Integer(triple.object().id()));
                            values.push(match triple.context() {
                                Some(node) => Value::Integer(node.id()),
                                None => Value::Null,
                            });
                            values.push(match triple.creator() {
                                Some(node) => Value::Integer(node.id()),
                                None => Value::Null,
                            });
                            values.push(Value::Integer(triple.is_inferred() as i64));
                            values.push(Value::Integer(triple.created()));
                        }
                        s.execute_sql(&sql, rusqlite::params_from_iter(values))?;
                    }
                } else {
                    for triple in &staged {
                        s.execute(
                            Stmt::StoreTriple,
                            params![
                                triple.id(),
                                triple.subject().id(),
                                triple.predicate().id(),
                                triple.object().id(),
                                triple.context().map(|node| node.id()),
                                triple.creator().map(|node| node.id()),
                                triple.is_inferred(),
                                triple.created()
                            ],
                        )?;
                    }
                }
                Ok(())
            },
        )
    }

    // ---- pattern queries ----

    /// Lazy pattern scan over active triples.
    ///
    /// Only non-null components constrain the query. With
    /// `wildcard_context` false, a `None` context means the default graph
    /// (`context IS NULL`) rather than any context. Staged triples
    /// matching the pattern are yielded before backend rows, so
    /// uncommitted writes are visible within the owning transaction.
    pub fn list_triples(
        &self,
        subject: Option<&NodeRef>,
        predicate: Option<&NodeRef>,
        object: Option<&NodeRef>,
        context: Option<&NodeRef>,
        include_inferred: bool,
        wildcard_context: bool,
    ) -> Result<TripleCursor<'_>> {
        let pattern = match (context, wildcard_context) {
            (Some(node), _) => ContextPattern::Named(node.key()),
            (None, true) => ContextPattern::Any,
            (None, false) => ContextPattern::DefaultGraph,
        };
        let staged =
            self.staging
                .lock()
                .matches(subject, predicate, object, &pattern, include_inferred);

        let mut sql = self
            .inner
            .dialect
            .statement(Stmt::LoadTriple)?
            .to_string();
        let mut params: Vec<Value> = Vec::new();
        let mut unmatchable = false;
        let bind = |column: &str, node: &NodeRef, sql: &mut String, params: &mut Vec<Value>| {
            sql.push_str(" AND t.");
            sql.push_str(column);
            sql.push_str(" = ?");
            params.push(Value::Integer(node.id()));
        };
        if let Some(node) = subject {
            unmatchable |= !node.is_persisted();
            bind("subject", node, &mut sql, &mut params);
        }
        if let Some(node) = predicate {
            unmatchable |= !node.is_persisted();
            bind("predicate", node, &mut sql, &mut params);
        }
        if let Some(node) = object {
            unmatchable |= !node.is_persisted();
            bind("object", node, &mut sql, &mut params);
        }
        match (context, wildcard_context) {
            (Some(node), _) => {
                unmatchable |= !node.is_persisted();
                bind("context", node, &mut sql, &mut params);
            }
            (None, false) => sql.push_str(" AND t.context IS NULL"),
            (None, true) => {}
        }
        if !include_inferred {
            sql.push_str(" AND t.inferred = 0");
        }
        sql.push_str(" AND t.id > ? ORDER BY t.id LIMIT ?");

        // Without backend cursor support everything is pulled in one page.
        let page_size = if self.inner.dialect.cursor_supported() {
            self.inner.cfg.fetch_page_size
        } else {
            1 << 30
        };
        Ok(TripleCursor::new(
            self,
            staged,
            sql,
            params,
            page_size,
            unmatchable,
        ))
    }

    pub(crate) fn fetch_triple_page(
        &self,
        sql: &str,
        params: &[Value],
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<TripleRef>> {
        let mut bound: Vec<Value> = Vec::with_capacity(params.len() + 2);
        bound.extend(params.iter().cloned());
        bound.push(Value::Integer(after_id));
        bound.push(Value::Integer(limit as i64));
        let raws = self.session()?.query_rows_sql(
            sql,
            rusqlite::params_from_iter(bound),
            raw_triple,
        )?;
        // One batched node-resolution pass per page.
        let mut node_ids: Vec<i64> = Vec::new();
        for raw in &raws {
            node_ids.push(raw.subject);
            node_ids.push(raw.predicate);
            node_ids.push(raw.object);
            node_ids.extend(raw.context);
            node_ids.extend(raw.creator);
        }
        self.load_nodes_by_ids(&node_ids)?;
        let mut page = Vec::with_capacity(raws.len());
        for raw in &raws {
            page.push(self.triple_from_raw(raw)?);
        }
        Ok(page)
    }

    /// Number of active triples, optionally within one context. Staged
    /// triples count toward the owning transaction's view.
    pub fn size(&self, context: Option<&NodeRef>, wildcard_context: bool) -> Result<u64> {
        let session = self.session()?;
        let backend: i64 = match (context, wildcard_context) {
            (Some(node), _) => {
                if node.is_persisted() {
                    session
                        .query_row_opt(Stmt::QuerySizeCtx, [node.id()], |row| row.get(0))?
                        .unwrap_or(0)
                } else {
                    0
                }
            }
            (None, true) => session
                .query_row_opt(Stmt::QuerySize, [], |row| row.get(0))?
                .unwrap_or(0),
            (None, false) => {
                let sql = format!(
                    "{} AND context IS NULL",
                    self.inner.dialect.statement(Stmt::QuerySize)?
                );
                session
                    .query_row_sql_opt(&sql, [], |row| row.get(0))?
                    .unwrap_or(0)
            }
        };
        let pattern = match (context, wildcard_context) {
            (Some(node), _) => ContextPattern::Named(node.key()),
            (None, true) => ContextPattern::Any,
            (None, false) => ContextPattern::DefaultGraph,
        };
        let staged = self
            .staging
            .lock()
            .matches(None, None, None, &pattern, true)
            .len();
        Ok(backend as u64 + staged as u64)
    }

    /// Distinct named contexts, staged ones included.
    pub fn contexts(&self) -> Result<Vec<NodeRef>> {
        let ids: Vec<i64> = self
            .session()?
            .query_rows(Stmt::QueryContexts, [], |row| row.get(0))?;
        let resolved = self.load_nodes_by_ids(&ids)?;
        let mut out: Vec<NodeRef> = resolved.into_iter().flatten().collect();
        let mut seen: FxHashSet<_> = out.iter().map(|node| node.key()).collect();
        for context in self.staging.lock().contexts() {
            if seen.insert(context.key()) {
                out.push(context);
            }
        }
        Ok(out)
    }

    /// URI resources, optionally restricted to a URI prefix.
    pub fn resources(&self, prefix: Option<&str>) -> Result<Vec<NodeRef>> {
        let raws = match prefix {
            None => self
                .session()?
                .query_rows(Stmt::QueryResources, [], raw_node)?,
            Some(prefix) => {
                let pattern = like_prefix_pattern(prefix);
                self.session()?
                    .query_rows(Stmt::QueryResourcesPrefix, [pattern], raw_node)?
            }
        };
        raws.into_iter().map(|raw| self.node_from_raw(raw)).collect()
    }

    // ---- metadata ----

    /// Metadata value by key.
    pub fn metadata_get(&self, key: &str) -> Result<Option<String>> {
        self.session()?
            .query_row_opt(Stmt::MetaGet, [key], |row| row.get(0))
    }

    /// Sets a metadata value, inserting the row when it does not exist.
    pub fn metadata_set(&self, key: &str, value: &str) -> Result<()> {
        let session = self.session()?;
        let updated = session.execute(Stmt::MetaUpdate, params![key, value])?;
        if updated == 0 {
            session.execute(Stmt::MetaInsert, params![key, value])?;
        }
        Ok(())
    }

    // ---- transaction control ----

    /// Flushes staged triples, commits, and opens the next transaction
    /// under a fresh transaction id. The deletion filter is re-derived at
    /// its fixed capacity.
    pub fn commit(&self) -> Result<()> {
        self.flush()?;
        let session = self.session()?;
        with_retry(session, &self.policy, None, "commit", |s| s.commit())?;
        self.filter.lock().reset();
        let next = self.inner.sequences.next_tx_id()?;
        let committed = self.tx_id.swap(next, Ordering::AcqRel);
        self.inner.commits.fetch_add(1, Ordering::Relaxed);
        info!(tx_id = committed, next_tx_id = next, "store.commit");
        session.begin()?;
        Ok(())
    }

    /// Discards staged triples (their ids return to unpersisted), clears
    /// the deletion filter, and rolls back the session.
    pub fn rollback(&self) -> Result<()> {
        let staged = self.staging.lock().drain();
        for triple in &staged {
            let id = triple.id();
            triple.clear_id();
            self.inner.caches.evict_triple(id);
        }
        self.filter.lock().reset();
        let session = self.session()?;
        session.rollback()?;
        let next = self.inner.sequences.next_tx_id()?;
        let abandoned = self.tx_id.swap(next, Ordering::AcqRel);
        warn!(
            tx_id = abandoned,
            discarded = staged.len(),
            "store.rollback"
        );
        session.begin()?;
        Ok(())
    }

    /// Rolls back open work and returns the session to the pool.
    pub fn close(mut self) -> Result<()> {
        self.release_session();
        Ok(())
    }

    pub(crate) fn execute_dynamic(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<usize> {
        self.session()?.execute_sql(sql, params)
    }

    fn release_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(err) = session.rollback() {
                warn!(error = %err, "store.connection.rollback_on_close");
            }
            self.inner.pool.release(session);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.release_session();
    }
}

fn like_prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
