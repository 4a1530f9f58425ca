use super::{Dialect, Stmt};
use crate::error::Result;

// Extended result codes: SQLITE_BUSY, SQLITE_LOCKED and their variants.
const TRANSIENT_CODES: &[i32] = &[5, 6, 261, 262, 517];

const NODE_COLUMNS: &str = "id, ntype, svalue, ivalue, dvalue, tvalue, bvalue, lang, ltype, created";

const CREATE_SCRIPT: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY,
    ntype INTEGER NOT NULL,
    svalue TEXT,
    ivalue INTEGER,
    dvalue REAL,
    tvalue INTEGER,
    bvalue INTEGER,
    lang TEXT,
    ltype INTEGER REFERENCES nodes(id),
    created INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_nodes_value ON nodes(ntype, svalue);
CREATE INDEX IF NOT EXISTS idx_nodes_ivalue ON nodes(ivalue);
CREATE INDEX IF NOT EXISTS idx_nodes_dvalue ON nodes(dvalue);
CREATE TABLE IF NOT EXISTS triples (
    id INTEGER PRIMARY KEY,
    subject INTEGER NOT NULL REFERENCES nodes(id),
    predicate INTEGER NOT NULL REFERENCES nodes(id),
    object INTEGER NOT NULL REFERENCES nodes(id),
    context INTEGER REFERENCES nodes(id),
    creator INTEGER REFERENCES nodes(id),
    deleted INTEGER NOT NULL DEFAULT 0,
    inferred INTEGER NOT NULL DEFAULT 0,
    created INTEGER NOT NULL,
    deleted_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_triples_spoc ON triples(subject, predicate, object, context);
CREATE INDEX IF NOT EXISTS idx_triples_object ON triples(object);
CREATE INDEX IF NOT EXISTS idx_triples_context ON triples(context);
CREATE INDEX IF NOT EXISTS idx_triples_deleted ON triples(deleted);
CREATE TABLE IF NOT EXISTS namespaces (
    id INTEGER PRIMARY KEY,
    prefix TEXT NOT NULL UNIQUE,
    uri TEXT NOT NULL UNIQUE,
    created INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS metadata (
    mkey TEXT NOT NULL UNIQUE,
    mvalue TEXT
);
CREATE TABLE IF NOT EXISTS sequences (
    name TEXT NOT NULL UNIQUE,
    value INTEGER NOT NULL
);
INSERT OR IGNORE INTO sequences (name, value) VALUES
    ('nodes', 0),
    ('triples', 0),
    ('namespaces', 0),
    ('tx', 0);
"#;

const DROP_SCRIPT: &str = r#"
DROP TABLE IF EXISTS triples;
DROP TABLE IF EXISTS namespaces;
DROP TABLE IF EXISTS nodes;
DROP TABLE IF EXISTS metadata;
DROP TABLE IF EXISTS sequences;
"#;

/// SQL text for SQLite. The default dialect bundled with the crate.
#[derive(Debug, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// New dialect instance.
    pub fn new() -> SqliteDialect {
        SqliteDialect
    }
}

impl Dialect for SqliteDialect {
    fn statement(&self, stmt: Stmt) -> Result<&str> {
        Ok(match stmt {
            Stmt::LoadNodeById => {
                "SELECT id, ntype, svalue, ivalue, dvalue, tvalue, bvalue, lang, ltype, created \
                 FROM nodes WHERE id = ?1"
            }
            Stmt::LoadUriByUri => {
                "SELECT id, ntype, svalue, ivalue, dvalue, tvalue, bvalue, lang, ltype, created \
                 FROM nodes WHERE ntype = 1 AND svalue = ?1"
            }
            Stmt::LoadBlankByAnonId => {
                "SELECT id, ntype, svalue, ivalue, dvalue, tvalue, bvalue, lang, ltype, created \
                 FROM nodes WHERE ntype = 2 AND svalue = ?1"
            }
            Stmt::LoadLiteralByValue => {
                "SELECT id, ntype, svalue, ivalue, dvalue, tvalue, bvalue, lang, ltype, created \
                 FROM nodes WHERE ntype = 3 AND svalue = ?1 AND lang IS NULL AND ltype IS NULL"
            }
            Stmt::LoadLiteralByValueLang => {
                "SELECT id, ntype, svalue, ivalue, dvalue, tvalue, bvalue, lang, ltype, created \
                 FROM nodes WHERE ntype = 3 AND svalue = ?1 AND lang = ?2"
            }
            Stmt::LoadLiteralByValueType => {
                "SELECT id, ntype, svalue, ivalue, dvalue, tvalue, bvalue, lang, ltype, created \
                 FROM nodes WHERE svalue = ?1 AND ltype = ?2"
            }
            Stmt::LoadLiteralByIntValue => {
                "SELECT id, ntype, svalue, ivalue, dvalue, tvalue, bvalue, lang, ltype, created \
                 FROM nodes WHERE ntype = 4 AND ivalue = ?1"
            }
            Stmt::LoadLiteralByDoubleValue => {
                "SELECT id, ntype, svalue, ivalue, dvalue, tvalue, bvalue, lang, ltype, created \
                 FROM nodes WHERE ntype = 5 AND dvalue = ?1"
            }
            Stmt::LoadLiteralByBoolValue => {
                "SELECT id, ntype, svalue, ivalue, dvalue, tvalue, bvalue, lang, ltype, created \
                 FROM nodes WHERE ntype = 6 AND bvalue = ?1"
            }
            Stmt::LoadLiteralByTimeValue => {
                "SELECT id, ntype, svalue, ivalue, dvalue, tvalue, bvalue, lang, ltype, created \
                 FROM nodes WHERE ntype = 7 AND tvalue = ?1"
            }
            Stmt::LoadTripleById => {
                "SELECT id, subject, predicate, object, context, creator, inferred, deleted, \
                 created, deleted_at FROM triples WHERE id = ?1"
            }
            Stmt::LoadTriple => {
                "SELECT t.id, t.subject, t.predicate, t.object, t.context, t.creator, t.inferred, \
                 t.deleted, t.created, t.deleted_at FROM triples t WHERE t.deleted = 0"
            }
            Stmt::LoadNamespaceByPrefix => {
                "SELECT id, prefix, uri, created FROM namespaces WHERE prefix = ?1"
            }
            Stmt::LoadNamespaceByUri => {
                "SELECT id, prefix, uri, created FROM namespaces WHERE uri = ?1"
            }
            Stmt::StoreUri => {
                "INSERT INTO nodes (id, ntype, svalue, created) VALUES (?1, 1, ?2, ?3)"
            }
            Stmt::StoreBlank => {
                "INSERT INTO nodes (id, ntype, svalue, created) VALUES (?1, 2, ?2, ?3)"
            }
            Stmt::StoreStringLiteral => {
                "INSERT INTO nodes (id, ntype, svalue, lang, ltype, created) \
                 VALUES (?1, 3, ?2, ?3, ?4, ?5)"
            }
            Stmt::StoreIntLiteral => {
                "INSERT INTO nodes (id, ntype, svalue, ivalue, dvalue, ltype, created) \
                 VALUES (?1, 4, ?2, ?3, ?4, ?5, ?6)"
            }
            Stmt::StoreDoubleLiteral => {
                "INSERT INTO nodes (id, ntype, svalue, dvalue, ltype, created) \
                 VALUES (?1, 5, ?2, ?3, ?4, ?5)"
            }
            Stmt::StoreBoolLiteral => {
                "INSERT INTO nodes (id, ntype, svalue, bvalue, ltype, created) \
                 VALUES (?1, 6, ?2, ?3, ?4, ?5)"
            }
            Stmt::StoreTimeLiteral => {
                "INSERT INTO nodes (id, ntype, svalue, tvalue, ltype, created) \
                 VALUES (?1, 7, ?2, ?3, ?4, ?5)"
            }
            Stmt::StoreTriple => {
                "INSERT INTO triples \
                 (id, subject, predicate, object, context, creator, inferred, deleted, created) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)"
            }
            Stmt::StoreNamespace => {
                "INSERT INTO namespaces (id, prefix, uri, created) VALUES (?1, ?2, ?3, ?4)"
            }
            Stmt::DeleteTriple => {
                "UPDATE triples SET deleted = 1, deleted_at = ?2 WHERE id = ?1"
            }
            Stmt::UndeleteTriple => {
                "UPDATE triples SET deleted = 0, deleted_at = NULL WHERE id = ?1"
            }
            Stmt::DeleteNamespace => "DELETE FROM namespaces WHERE prefix = ?1",
            Stmt::QuerySize => "SELECT COUNT(*) FROM triples WHERE deleted = 0",
            Stmt::QuerySizeCtx => {
                "SELECT COUNT(*) FROM triples WHERE deleted = 0 AND context = ?1"
            }
            Stmt::QueryContexts => {
                "SELECT DISTINCT context FROM triples \
                 WHERE deleted = 0 AND context IS NOT NULL"
            }
            Stmt::QueryResources => {
                "SELECT id, ntype, svalue, ivalue, dvalue, tvalue, bvalue, lang, ltype, created \
                 FROM nodes WHERE ntype = 1"
            }
            Stmt::QueryResourcesPrefix => {
                "SELECT id, ntype, svalue, ivalue, dvalue, tvalue, bvalue, lang, ltype, created \
                 FROM nodes WHERE ntype = 1 AND svalue LIKE ?1 ESCAPE '\\'"
            }
            Stmt::QueryNamespaces => {
                "SELECT id, prefix, uri, created FROM namespaces ORDER BY prefix"
            }
            Stmt::MetaTables => "SELECT name FROM sqlite_master WHERE type = 'table'",
            Stmt::MetaGet => "SELECT mvalue FROM metadata WHERE mkey = ?1",
            Stmt::MetaUpdate => "UPDATE metadata SET mvalue = ?2 WHERE mkey = ?1",
            Stmt::MetaInsert => "INSERT INTO metadata (mkey, mvalue) VALUES (?1, ?2)",
            Stmt::MetaVersion => {
                "SELECT mvalue FROM metadata WHERE mkey = 'schema_version'"
            }
            Stmt::SeqAllocate => {
                "UPDATE sequences SET value = value + ?2 WHERE name = ?1 RETURNING value"
            }
        })
    }

    fn nodes_by_ids(&self, arity: usize) -> String {
        let mut sql = String::with_capacity(128 + arity * 2);
        sql.push_str("SELECT ");
        sql.push_str(NODE_COLUMNS);
        sql.push_str(" FROM nodes WHERE id IN (");
        for i in 0..arity {
            if i > 0 {
                sql.push(',');
            }
            sql.push('?');
        }
        sql.push(')');
        sql
    }

    fn store_triples_batch(&self, rows: usize) -> String {
        let mut sql = String::from(
            "INSERT INTO triples \
             (id, subject, predicate, object, context, creator, inferred, deleted, created) VALUES ",
        );
        for i in 0..rows {
            if i > 0 {
                sql.push(',');
            }
            sql.push_str("(?, ?, ?, ?, ?, ?, ?, 0, ?)");
        }
        sql
    }

    fn batch_supported(&self) -> bool {
        true
    }

    fn cursor_supported(&self) -> bool {
        true
    }

    fn create_script(&self) -> &str {
        CREATE_SCRIPT
    }

    fn drop_script(&self) -> &str {
        DROP_SCRIPT
    }

    fn migration_script(&self, _from_version: u32) -> Option<&str> {
        // Version 1 is the first shipped schema; no older layouts exist.
        None
    }

    fn schema_version(&self) -> u32 {
        1
    }

    fn regexp(&self, column: &str) -> String {
        format!("{column} REGEXP ?")
    }

    fn ilike(&self, column: &str) -> String {
        format!("lower({column}) LIKE lower(?)")
    }

    fn concat(&self, parts: &[&str]) -> String {
        parts.join(" || ")
    }

    fn transient_error_codes(&self) -> &[i32] {
        TRANSIENT_CODES
    }

    fn lock_conflict_code(&self) -> i32 {
        5
    }
}
