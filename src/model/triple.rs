use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use crate::error::{Result, StoreError};

use super::node::{NodeRef, UNPERSISTED};
use super::now_millis;

/// Shared handle to a triple. Delete/undelete flag flips on the shared
/// instance are how concurrent readers of the same cached triple observe a
/// deletion immediately.
pub type TripleRef = Arc<Triple>;

/// A (subject, predicate, object, context) statement with store metadata.
///
/// `context == None` addresses the default graph. The triple owns its own
/// database id, separate from the ids of the terms it references.
#[derive(Debug)]
pub struct Triple {
    id: AtomicI64,
    subject: NodeRef,
    predicate: NodeRef,
    object: NodeRef,
    context: Option<NodeRef>,
    creator: Option<NodeRef>,
    inferred: bool,
    deleted: AtomicBool,
    created: i64,
    // unix millis; 0 means "never deleted"
    deleted_at: AtomicI64,
}

impl Triple {
    /// New unpersisted triple in the given context (`None` = default graph).
    pub fn new(
        subject: NodeRef,
        predicate: NodeRef,
        object: NodeRef,
        context: Option<NodeRef>,
    ) -> TripleRef {
        Arc::new(Triple {
            id: AtomicI64::new(UNPERSISTED),
            subject,
            predicate,
            object,
            context,
            creator: None,
            inferred: false,
            deleted: AtomicBool::new(false),
            created: now_millis(),
            deleted_at: AtomicI64::new(0),
        })
    }

    /// New unpersisted triple carrying creator and inferred metadata.
    pub fn with_meta(
        subject: NodeRef,
        predicate: NodeRef,
        object: NodeRef,
        context: Option<NodeRef>,
        creator: Option<NodeRef>,
        inferred: bool,
    ) -> TripleRef {
        Arc::new(Triple {
            id: AtomicI64::new(UNPERSISTED),
            subject,
            predicate,
            object,
            context,
            creator,
            inferred,
            deleted: AtomicBool::new(false),
            created: now_millis(),
            deleted_at: AtomicI64::new(0),
        })
    }

    /// Reconstructs a triple from a database row.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_row(
        id: i64,
        subject: NodeRef,
        predicate: NodeRef,
        object: NodeRef,
        context: Option<NodeRef>,
        creator: Option<NodeRef>,
        inferred: bool,
        deleted: bool,
        created: i64,
        deleted_at: Option<i64>,
    ) -> TripleRef {
        Arc::new(Triple {
            id: AtomicI64::new(id),
            subject,
            predicate,
            object,
            context,
            creator,
            inferred,
            deleted: AtomicBool::new(deleted),
            created,
            deleted_at: AtomicI64::new(deleted_at.unwrap_or(0)),
        })
    }

    /// Database id, or -1 when unpersisted.
    pub fn id(&self) -> i64 {
        self.id.load(Ordering::Acquire)
    }

    /// Whether the triple carries a persisted (or staged) id.
    pub fn is_persisted(&self) -> bool {
        self.id() >= 0
    }

    /// Subject resource.
    pub fn subject(&self) -> &NodeRef {
        &self.subject
    }

    /// Predicate URI resource.
    pub fn predicate(&self) -> &NodeRef {
        &self.predicate
    }

    /// Object term.
    pub fn object(&self) -> &NodeRef {
        &self.object
    }

    /// Named-graph component; `None` is the default graph.
    pub fn context(&self) -> Option<&NodeRef> {
        self.context.as_ref()
    }

    /// Creator resource, if recorded.
    pub fn creator(&self) -> Option<&NodeRef> {
        self.creator.as_ref()
    }

    /// Whether the triple was produced by inference.
    pub fn is_inferred(&self) -> bool {
        self.inferred
    }

    /// Current deletion flag. Visible to every holder of this instance.
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Creation instant, unix milliseconds.
    pub fn created(&self) -> i64 {
        self.created
    }

    /// Deletion instant, if the triple is currently marked deleted.
    pub fn deleted_at(&self) -> Option<i64> {
        let at = self.deleted_at.load(Ordering::Acquire);
        (at != 0).then_some(at)
    }

    /// Flags the triple deleted with the given instant. Happens before any
    /// backend work so concurrent readers observe the deletion right away.
    pub(crate) fn mark_deleted(&self, at_millis: i64) {
        self.deleted_at.store(at_millis, Ordering::Release);
        self.deleted.store(true, Ordering::Release);
    }

    /// Clears the deletion flag (undelete path).
    pub(crate) fn mark_active(&self) {
        self.deleted.store(false, Ordering::Release);
        self.deleted_at.store(0, Ordering::Release);
    }

    /// Assigns the database id at first store.
    pub(crate) fn assign_id(&self, id: i64) -> Result<()> {
        match self
            .id
            .compare_exchange(UNPERSISTED, id, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(current) if current == id => Ok(()),
            Err(current) => Err(StoreError::contract(format!(
                "triple id already assigned ({current}, refusing {id})"
            ))),
        }
    }

    /// Resets the id to unpersisted. Used when a staged triple is discarded
    /// (staged delete or transaction rollback) before it ever reached the
    /// backend.
    pub(crate) fn clear_id(&self) {
        self.id.store(UNPERSISTED, Ordering::Release);
    }

    /// Contract check applied at store time.
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.subject.is_resource() {
            return Err(StoreError::contract("triple subject must be a resource"));
        }
        if self.predicate.uri_str().is_none() {
            return Err(StoreError::contract(
                "triple predicate must be a URI resource",
            ));
        }
        if let Some(context) = &self.context {
            if !context.is_resource() {
                return Err(StoreError::contract("triple context must be a resource"));
            }
        }
        Ok(())
    }
}

impl PartialEq for Triple {
    fn eq(&self, other: &Self) -> bool {
        self.subject == other.subject
            && self.predicate == other.predicate
            && self.object == other.object
            && match (&self.context, &other.context) {
                (None, None) => true,
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
    }
}

impl Eq for Triple {}
