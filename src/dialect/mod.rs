//! SQL dialect contract.
//!
//! All statement text the core executes comes from a [`Dialect`] keyed by
//! [`Stmt`], so the mapping layer stays backend-neutral. The bundled
//! [`SqliteDialect`] is the default; other backends implement the same
//! contract.

mod sqlite;

pub use sqlite::SqliteDialect;

use crate::error::Result;

/// Logical statement keys consumed by the core.
///
/// The dotted names reported by [`Stmt::key`] are stable identifiers used
/// in logs and missing-statement errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stmt {
    /// Node row by id.
    LoadNodeById,
    /// URI resource row by URI string.
    LoadUriByUri,
    /// Blank node row by anonymous id.
    LoadBlankByAnonId,
    /// Plain string literal by lexical form.
    LoadLiteralByValue,
    /// String literal by lexical form and language tag.
    LoadLiteralByValueLang,
    /// Literal by lexical form and datatype id.
    LoadLiteralByValueType,
    /// Integer literal by typed value.
    LoadLiteralByIntValue,
    /// Double literal by typed value.
    LoadLiteralByDoubleValue,
    /// Boolean literal by typed value.
    LoadLiteralByBoolValue,
    /// Date/time literal by typed value.
    LoadLiteralByTimeValue,
    /// Triple row by id, deleted or not.
    LoadTripleById,
    /// Base filter query for triple pattern scans.
    LoadTriple,
    /// Namespace row by prefix.
    LoadNamespaceByPrefix,
    /// Namespace row by URI.
    LoadNamespaceByUri,
    /// Insert a URI resource row.
    StoreUri,
    /// Insert a blank node row.
    StoreBlank,
    /// Insert a string literal row.
    StoreStringLiteral,
    /// Insert an integer literal row.
    StoreIntLiteral,
    /// Insert a double literal row.
    StoreDoubleLiteral,
    /// Insert a boolean literal row.
    StoreBoolLiteral,
    /// Insert a date/time literal row.
    StoreTimeLiteral,
    /// Insert a triple row.
    StoreTriple,
    /// Insert a namespace row.
    StoreNamespace,
    /// Soft-delete a triple row.
    DeleteTriple,
    /// Clear the soft-delete flag of a triple row.
    UndeleteTriple,
    /// Remove a namespace row.
    DeleteNamespace,
    /// Count active triples.
    QuerySize,
    /// Count active triples in one context.
    QuerySizeCtx,
    /// Distinct named contexts of active triples.
    QueryContexts,
    /// All URI resources.
    QueryResources,
    /// URI resources whose value starts with a prefix.
    QueryResourcesPrefix,
    /// All namespace bindings.
    QueryNamespaces,
    /// Table names present in the schema.
    MetaTables,
    /// Metadata value by key.
    MetaGet,
    /// Update a metadata value.
    MetaUpdate,
    /// Insert a metadata row.
    MetaInsert,
    /// Stored schema version.
    MetaVersion,
    /// Atomically advance a named sequence and return its new value.
    SeqAllocate,
}

impl Stmt {
    /// Stable dotted name of this key.
    pub fn key(self) -> &'static str {
        match self {
            Stmt::LoadNodeById => "load.node_by_id",
            Stmt::LoadUriByUri => "load.uri_by_uri",
            Stmt::LoadBlankByAnonId => "load.bnode_by_anonid",
            Stmt::LoadLiteralByValue => "load.literal_by_v",
            Stmt::LoadLiteralByValueLang => "load.literal_by_vl",
            Stmt::LoadLiteralByValueType => "load.literal_by_vt",
            Stmt::LoadLiteralByIntValue => "load.literal_by_iv",
            Stmt::LoadLiteralByDoubleValue => "load.literal_by_dv",
            Stmt::LoadLiteralByBoolValue => "load.literal_by_bv",
            Stmt::LoadLiteralByTimeValue => "load.literal_by_tv",
            Stmt::LoadTripleById => "load.triple_by_id",
            Stmt::LoadTriple => "load.triple",
            Stmt::LoadNamespaceByPrefix => "load.namespace_by_prefix",
            Stmt::LoadNamespaceByUri => "load.namespace_by_uri",
            Stmt::StoreUri => "store.uri",
            Stmt::StoreBlank => "store.bnode",
            Stmt::StoreStringLiteral => "store.sliteral",
            Stmt::StoreIntLiteral => "store.iliteral",
            Stmt::StoreDoubleLiteral => "store.dliteral",
            Stmt::StoreBoolLiteral => "store.bliteral",
            Stmt::StoreTimeLiteral => "store.tliteral",
            Stmt::StoreTriple => "store.triple",
            Stmt::StoreNamespace => "store.namespace",
            Stmt::DeleteTriple => "delete.triple",
            Stmt::UndeleteTriple => "undelete.triple",
            Stmt::DeleteNamespace => "delete.namespace",
            Stmt::QuerySize => "query.size",
            Stmt::QuerySizeCtx => "query.size_ctx",
            Stmt::QueryContexts => "query.contexts",
            Stmt::QueryResources => "query.resources",
            Stmt::QueryResourcesPrefix => "query.resources_prefix",
            Stmt::QueryNamespaces => "query.namespaces",
            Stmt::MetaTables => "meta.tables",
            Stmt::MetaGet => "meta.get",
            Stmt::MetaUpdate => "meta.update",
            Stmt::MetaInsert => "meta.insert",
            Stmt::MetaVersion => "meta.version",
            Stmt::SeqAllocate => "seq.allocate",
        }
    }
}

/// Backend-specific SQL supplier. Pure lookup, no state.
pub trait Dialect: Send + Sync {
    /// Statement text for a logical key.
    fn statement(&self, stmt: Stmt) -> Result<&str>;

    /// Whether the dialect carries text for a key.
    fn has_statement(&self, stmt: Stmt) -> bool {
        self.statement(stmt).is_ok()
    }

    /// Node lookup with an IN-clause of the given arity.
    fn nodes_by_ids(&self, arity: usize) -> String;

    /// Multi-row triple insert for a staged-batch flush.
    fn store_triples_batch(&self, rows: usize) -> String;

    /// Whether multi-row batch inserts are supported.
    fn batch_supported(&self) -> bool;

    /// Whether forward-only cursors over large results are supported.
    fn cursor_supported(&self) -> bool;

    /// Script creating the full schema at [`Dialect::schema_version`].
    fn create_script(&self) -> &str;

    /// Script dropping every object the create script makes.
    fn drop_script(&self) -> &str;

    /// Migration step from `from_version` to `from_version + 1`, when one
    /// exists.
    fn migration_script(&self, from_version: u32) -> Option<&str>;

    /// Schema version the create script produces.
    fn schema_version(&self) -> u32;

    /// Regular-expression match fragment over a column.
    fn regexp(&self, column: &str) -> String;

    /// Case-insensitive LIKE fragment over a column.
    fn ilike(&self, column: &str) -> String;

    /// String concatenation fragment.
    fn concat(&self, parts: &[&str]) -> String;

    /// Extended driver error codes considered transient and retryable. An
    /// empty slice means every backend error is treated as transient.
    fn transient_error_codes(&self) -> &[i32];

    /// Extended driver error code reported on a lock conflict.
    fn lock_conflict_code(&self) -> i32;
}
