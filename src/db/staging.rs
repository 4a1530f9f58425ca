use rustc_hash::{FxHashMap, FxHashSet};

use crate::model::{NodeKey, NodeRef, TripleRef};

/// In-memory multi-index over staged (not yet flushed) triples.
///
/// Serves two roles: the write buffer drained by batch flush, and the read
/// overlay that makes uncommitted writes visible to pattern queries within
/// the owning transaction. One index per pattern component keeps lookups
/// proportional to the matching subset rather than to everything staged;
/// removal by triple id is O(1) amortized.
#[derive(Default)]
pub(crate) struct TripleStaging {
    by_id: FxHashMap<i64, TripleRef>,
    order: Vec<i64>,
    by_subject: FxHashMap<NodeKey, FxHashSet<i64>>,
    by_predicate: FxHashMap<NodeKey, FxHashSet<i64>>,
    by_object: FxHashMap<NodeKey, FxHashSet<i64>>,
    by_context: FxHashMap<Option<NodeKey>, FxHashSet<i64>>,
}

/// Context component of a pattern: wildcard, the default graph, or one
/// named graph.
#[derive(Clone, Debug)]
pub(crate) enum ContextPattern {
    Any,
    DefaultGraph,
    Named(NodeKey),
}

impl TripleStaging {
    /// Number of staged triples.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Stages a triple. The triple must already carry its id.
    pub fn insert(&mut self, triple: TripleRef) {
        let id = triple.id();
        debug_assert!(id >= 0, "staged triples carry their id");
        self.by_subject
            .entry(triple.subject().key())
            .or_default()
            .insert(id);
        self.by_predicate
            .entry(triple.predicate().key())
            .or_default()
            .insert(id);
        self.by_object
            .entry(triple.object().key())
            .or_default()
            .insert(id);
        self.by_context
            .entry(triple.context().map(|ctx| ctx.key()))
            .or_default()
            .insert(id);
        self.order.push(id);
        self.by_id.insert(id, triple);
    }

    /// Removes a staged triple by id, returning it when it was staged.
    pub fn remove(&mut self, id: i64) -> Option<TripleRef> {
        let triple = self.by_id.remove(&id)?;
        Self::unindex(&mut self.by_subject, triple.subject().key(), id);
        Self::unindex(&mut self.by_predicate, triple.predicate().key(), id);
        Self::unindex(&mut self.by_object, triple.object().key(), id);
        Self::unindex_ctx(&mut self.by_context, triple.context().map(|c| c.key()), id);
        // `order` is pruned lazily at drain.
        Some(triple)
    }

    fn unindex(index: &mut FxHashMap<NodeKey, FxHashSet<i64>>, key: NodeKey, id: i64) {
        if let Some(set) = index.get_mut(&key) {
            set.remove(&id);
            if set.is_empty() {
                index.remove(&key);
            }
        }
    }

    fn unindex_ctx(
        index: &mut FxHashMap<Option<NodeKey>, FxHashSet<i64>>,
        key: Option<NodeKey>,
        id: i64,
    ) {
        if let Some(set) = index.get_mut(&key) {
            set.remove(&id);
            if set.is_empty() {
                index.remove(&key);
            }
        }
    }

    /// Staged triples matching a pattern, using the most selective bound
    /// component as the candidate set.
    pub fn matches(
        &self,
        subject: Option<&NodeRef>,
        predicate: Option<&NodeRef>,
        object: Option<&NodeRef>,
        context: &ContextPattern,
        include_inferred: bool,
    ) -> Vec<TripleRef> {
        let empty = FxHashSet::default();
        let mut bound: Vec<&FxHashSet<i64>> = Vec::new();
        if let Some(node) = subject {
            bound.push(self.by_subject.get(&node.key()).unwrap_or(&empty));
        }
        if let Some(node) = predicate {
            bound.push(self.by_predicate.get(&node.key()).unwrap_or(&empty));
        }
        if let Some(node) = object {
            bound.push(self.by_object.get(&node.key()).unwrap_or(&empty));
        }
        match context {
            ContextPattern::Any => {}
            ContextPattern::DefaultGraph => {
                bound.push(self.by_context.get(&None).unwrap_or(&empty));
            }
            ContextPattern::Named(key) => {
                bound.push(self.by_context.get(&Some(key.clone())).unwrap_or(&empty));
            }
        }
        let candidates = bound.into_iter().min_by_key(|set| set.len());

        let mut out = Vec::new();
        match candidates {
            Some(ids) => {
                for id in ids {
                    if let Some(triple) = self.by_id.get(id) {
                        if Self::triple_matches(
                            triple,
                            subject,
                            predicate,
                            object,
                            context,
                            include_inferred,
                        ) {
                            out.push(triple.clone());
                        }
                    }
                }
            }
            None => {
                for triple in self.by_id.values() {
                    if Self::triple_matches(
                        triple,
                        subject,
                        predicate,
                        object,
                        context,
                        include_inferred,
                    ) {
                        out.push(triple.clone());
                    }
                }
            }
        }
        out
    }

    fn triple_matches(
        triple: &TripleRef,
        subject: Option<&NodeRef>,
        predicate: Option<&NodeRef>,
        object: Option<&NodeRef>,
        context: &ContextPattern,
        include_inferred: bool,
    ) -> bool {
        if !include_inferred && triple.is_inferred() {
            return false;
        }
        if let Some(node) = subject {
            if **node != **triple.subject() {
                return false;
            }
        }
        if let Some(node) = predicate {
            if **node != **triple.predicate() {
                return false;
            }
        }
        if let Some(node) = object {
            if **node != **triple.object() {
                return false;
            }
        }
        match context {
            ContextPattern::Any => true,
            ContextPattern::DefaultGraph => triple.context().is_none(),
            ContextPattern::Named(key) => {
                triple.context().map(|ctx| ctx.key()).as_ref() == Some(key)
            }
        }
    }

    /// Distinct named contexts across staged triples.
    pub fn contexts(&self) -> Vec<NodeRef> {
        let mut seen: FxHashSet<NodeKey> = FxHashSet::default();
        let mut out = Vec::new();
        for triple in self.by_id.values() {
            if let Some(ctx) = triple.context() {
                if seen.insert(ctx.key()) {
                    out.push(ctx.clone());
                }
            }
        }
        out
    }

    /// Removes and returns every staged triple in insertion order.
    pub fn drain(&mut self) -> Vec<TripleRef> {
        let mut out = Vec::with_capacity(self.by_id.len());
        for id in std::mem::take(&mut self.order) {
            if let Some(triple) = self.by_id.remove(&id) {
                out.push(triple);
            }
        }
        self.by_id.clear();
        self.by_subject.clear();
        self.by_predicate.clear();
        self.by_object.clear();
        self.by_context.clear();
        out
    }
}
