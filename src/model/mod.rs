//! The graph data model: RDF terms, triples, and namespaces.
//!
//! Terms and triples are shared through `Arc` handles because the same
//! instance is handed out by the process-wide caches to every connection.
//! They are logically immutable after construction; the only sanctioned
//! mutations are id assignment at first store and the delete/undelete flag
//! flips on triples, both of which go through atomics.

mod namespace;
mod node;
mod triple;

pub use namespace::Namespace;
pub use node::{
    Literal, LiteralKey, LiteralValue, Node, NodeId, NodeKey, NodeKind, NodeRef, NodeValue,
    UNPERSISTED,
};
pub use triple::{Triple, TripleRef};

use time::OffsetDateTime;

/// Current wall-clock time as unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
