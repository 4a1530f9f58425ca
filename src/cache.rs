//! Process-wide cache pool: one bounded key→value mapping per entity
//! class, shared by every connection.
//!
//! Entries are shared `Arc` handles and are never mutated in place by the
//! caches themselves; they are inserted on construction-from-row or store
//! and removed on explicit delete, otherwise eviction is up to the LRU
//! policy.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::db::StoreConfig;
use crate::model::{LiteralKey, Namespace, NodeId, NodeRef, NodeValue, TripleRef};

const NODE_ID_SHARDS: usize = 16;

/// Named caches for nodes, triples, and namespaces, plus the entity-class
/// construction locks that serialize load-or-construct races between
/// connections.
pub struct CachePool {
    nodes_by_id: Vec<Mutex<LruCache<NodeId, NodeRef>>>,
    triples_by_id: Mutex<LruCache<i64, TripleRef>>,
    uris: Mutex<LruCache<String, NodeRef>>,
    blanks: Mutex<LruCache<String, NodeRef>>,
    literals: Mutex<LruCache<LiteralKey, NodeRef>>,
    ns_by_prefix: Mutex<LruCache<String, Namespace>>,
    ns_by_uri: Mutex<LruCache<String, Namespace>>,
    pub(crate) uri_lock: Mutex<()>,
    pub(crate) blank_lock: Mutex<()>,
    pub(crate) literal_lock: Mutex<()>,
    pub(crate) namespace_lock: Mutex<()>,
}

fn cap(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity.max(1)).unwrap()
}

impl CachePool {
    /// Builds the pool with the capacities from `cfg`.
    pub fn new(cfg: &StoreConfig) -> Arc<CachePool> {
        let per_shard = cap(cfg.node_cache_capacity / NODE_ID_SHARDS);
        let mut nodes_by_id = Vec::with_capacity(NODE_ID_SHARDS);
        for _ in 0..NODE_ID_SHARDS {
            nodes_by_id.push(Mutex::new(LruCache::new(per_shard)));
        }
        Arc::new(CachePool {
            nodes_by_id,
            triples_by_id: Mutex::new(LruCache::new(cap(cfg.triple_cache_capacity))),
            uris: Mutex::new(LruCache::new(cap(cfg.uri_cache_capacity))),
            blanks: Mutex::new(LruCache::new(cap(cfg.blank_cache_capacity))),
            literals: Mutex::new(LruCache::new(cap(cfg.literal_cache_capacity))),
            ns_by_prefix: Mutex::new(LruCache::new(cap(cfg.namespace_cache_capacity))),
            ns_by_uri: Mutex::new(LruCache::new(cap(cfg.namespace_cache_capacity))),
            uri_lock: Mutex::new(()),
            blank_lock: Mutex::new(()),
            literal_lock: Mutex::new(()),
            namespace_lock: Mutex::new(()),
        })
    }

    fn node_shard(&self, id: NodeId) -> &Mutex<LruCache<NodeId, NodeRef>> {
        &self.nodes_by_id[(id as u64 as usize) % NODE_ID_SHARDS]
    }

    /// Node by database id.
    pub fn node_by_id(&self, id: NodeId) -> Option<NodeRef> {
        self.node_shard(id).lock().get(&id).cloned()
    }

    /// URI resource by URI string.
    pub fn uri(&self, uri: &str) -> Option<NodeRef> {
        self.uris.lock().get(uri).cloned()
    }

    /// Blank node by anonymous id.
    pub fn blank(&self, anon_id: &str) -> Option<NodeRef> {
        self.blanks.lock().get(anon_id).cloned()
    }

    /// Literal by its composite natural key.
    pub fn literal(&self, key: &LiteralKey) -> Option<NodeRef> {
        self.literals.lock().get(key).cloned()
    }

    /// Triple by database id.
    pub fn triple_by_id(&self, id: i64) -> Option<TripleRef> {
        self.triples_by_id.lock().get(&id).cloned()
    }

    /// Namespace by prefix.
    pub fn namespace_by_prefix(&self, prefix: &str) -> Option<Namespace> {
        self.ns_by_prefix.lock().get(prefix).cloned()
    }

    /// Namespace by URI.
    pub fn namespace_by_uri(&self, uri: &str) -> Option<Namespace> {
        self.ns_by_uri.lock().get(uri).cloned()
    }

    /// Inserts a node into the id cache (when persisted) and into its
    /// natural-key cache.
    pub fn cache_node(&self, node: &NodeRef) {
        let id = node.id();
        if id >= 0 {
            self.node_shard(id).lock().put(id, Arc::clone(node));
        }
        match node.value() {
            NodeValue::Uri(uri) => {
                self.uris.lock().put(uri.clone(), Arc::clone(node));
            }
            NodeValue::Blank(anon) => {
                self.blanks.lock().put(anon.clone(), Arc::clone(node));
            }
            NodeValue::Literal(lit) => {
                self.literals.lock().put(lit.key(), Arc::clone(node));
            }
        }
    }

    /// Inserts a triple by id.
    pub fn cache_triple(&self, triple: &TripleRef) {
        let id = triple.id();
        if id >= 0 {
            self.triples_by_id.lock().put(id, Arc::clone(triple));
        }
    }

    /// Removes a triple entry, e.g. when a staged triple is discarded.
    pub fn evict_triple(&self, id: i64) {
        self.triples_by_id.lock().pop(&id);
    }

    /// Inserts a namespace into both namespace caches.
    pub fn cache_namespace(&self, ns: &Namespace) {
        self.ns_by_prefix.lock().put(ns.prefix.clone(), ns.clone());
        self.ns_by_uri.lock().put(ns.uri.clone(), ns.clone());
    }

    /// Removes a namespace from both namespace caches.
    pub fn evict_namespace(&self, prefix: &str) {
        let removed = self.ns_by_prefix.lock().pop(prefix);
        if let Some(ns) = removed {
            self.ns_by_uri.lock().pop(&ns.uri);
        }
    }

    /// Drops every entry; used at shutdown.
    pub fn clear(&self) {
        for shard in &self.nodes_by_id {
            shard.lock().clear();
        }
        self.triples_by_id.lock().clear();
        self.uris.lock().clear();
        self.blanks.lock().clear();
        self.literals.lock().clear();
        self.ns_by_prefix.lock().clear();
        self.ns_by_uri.lock().clear();
    }
}

/// Language-tag parse cache. Tags are normalized to lowercase and interned
/// so repeated literals share one allocation; owned by the facade rather
/// than hidden in a global.
pub struct LangCache {
    tags: Mutex<FxHashMap<String, Arc<str>>>,
}

impl LangCache {
    /// Empty cache.
    pub fn new() -> LangCache {
        LangCache {
            tags: Mutex::new(FxHashMap::default()),
        }
    }

    /// Normalized form of a language tag.
    pub fn normalize(&self, tag: &str) -> Arc<str> {
        let lowered = tag.to_ascii_lowercase();
        let mut tags = self.tags.lock();
        if let Some(interned) = tags.get(&lowered) {
            return Arc::clone(interned);
        }
        let interned: Arc<str> = Arc::from(lowered.as_str());
        tags.insert(lowered, Arc::clone(&interned));
        interned
    }
}

impl Default for LangCache {
    fn default() -> Self {
        LangCache::new()
    }
}
