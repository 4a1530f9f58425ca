//! Terna: the persistence core of an RDF triple store over a relational
//! backend.
//!
//! The crate maps a graph data model (resources, literals, triples,
//! namespaces) onto rows in a transactional relational store and supplies
//! what a plain schema does not give for free: node and triple interning
//! with process-wide caches, batched write staging, retry-with-savepoint
//! execution for transient conflicts, a soft-delete/undelete protocol
//! with a per-transaction Bloom-filter fast path, and a background
//! garbage collector for soft-deleted triples and orphaned nodes.
//!
//! All SQL text is supplied by a [`dialect::Dialect`]; the bundled
//! [`dialect::SqliteDialect`] is the default backend.

#![warn(missing_docs)]

pub mod cache;
pub mod db;
pub mod dialect;
pub mod error;
pub mod model;
pub mod vocab;

pub use db::{Connection, GcDependency, GcStats, Store, StoreConfig, TripleCursor};
pub use error::{Result, StoreError};
pub use model::{
    Literal, LiteralKey, LiteralValue, Namespace, Node, NodeId, NodeKey, NodeKind, NodeRef,
    NodeValue, Triple, TripleRef, UNPERSISTED,
};
