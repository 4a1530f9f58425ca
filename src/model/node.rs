use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::{Result, StoreError};

use super::now_millis;

/// Database id of a node. Ids are drawn from a single sequence and are
/// unique across all node kinds.
pub type NodeId = i64;

/// Sentinel id of a node that has not been persisted yet.
pub const UNPERSISTED: NodeId = -1;

/// Shared handle to a node. The caches hand out clones of the same `Arc`,
/// so id assignment is observed by every holder.
pub type NodeRef = Arc<Node>;

/// Discriminant stored in the `ntype` column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// URI resource.
    Uri = 1,
    /// Anonymous resource (blank node).
    Blank = 2,
    /// Plain string literal.
    StringLiteral = 3,
    /// Integer literal.
    IntLiteral = 4,
    /// Double literal.
    DoubleLiteral = 5,
    /// Boolean literal.
    BoolLiteral = 6,
    /// Date/time literal.
    DateTimeLiteral = 7,
}

impl NodeKind {
    /// Column value for this kind.
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Decodes an `ntype` column value.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(NodeKind::Uri),
            2 => Ok(NodeKind::Blank),
            3 => Ok(NodeKind::StringLiteral),
            4 => Ok(NodeKind::IntLiteral),
            5 => Ok(NodeKind::DoubleLiteral),
            6 => Ok(NodeKind::BoolLiteral),
            7 => Ok(NodeKind::DateTimeLiteral),
            other => Err(StoreError::contract(format!("unknown node kind {other}"))),
        }
    }
}

/// Any RDF term: a URI resource, a blank node, or a literal.
#[derive(Debug)]
pub struct Node {
    id: AtomicI64,
    created: i64,
    value: NodeValue,
}

/// The term value of a node.
#[derive(Debug)]
pub enum NodeValue {
    /// Absolute URI.
    Uri(String),
    /// Opaque local id of an anonymous resource.
    Blank(String),
    /// Literal value with its projections.
    Literal(Literal),
}

impl Node {
    /// New unpersisted URI resource.
    pub fn uri(value: impl Into<String>) -> NodeRef {
        Arc::new(Node {
            id: AtomicI64::new(UNPERSISTED),
            created: now_millis(),
            value: NodeValue::Uri(value.into()),
        })
    }

    /// New unpersisted blank node.
    pub fn blank(anon_id: impl Into<String>) -> NodeRef {
        Arc::new(Node {
            id: AtomicI64::new(UNPERSISTED),
            created: now_millis(),
            value: NodeValue::Blank(anon_id.into()),
        })
    }

    /// New unpersisted literal node.
    pub fn literal(literal: Literal) -> NodeRef {
        Arc::new(Node {
            id: AtomicI64::new(UNPERSISTED),
            created: now_millis(),
            value: NodeValue::Literal(literal),
        })
    }

    /// Reconstructs a node from a database row.
    pub(crate) fn from_row(id: NodeId, created: i64, value: NodeValue) -> NodeRef {
        Arc::new(Node {
            id: AtomicI64::new(id),
            created,
            value,
        })
    }

    /// Database id, or [`UNPERSISTED`].
    pub fn id(&self) -> NodeId {
        self.id.load(Ordering::Acquire)
    }

    /// Whether the node carries a persisted id.
    pub fn is_persisted(&self) -> bool {
        self.id() >= 0
    }

    /// Creation instant, unix milliseconds.
    pub fn created(&self) -> i64 {
        self.created
    }

    /// Term value.
    pub fn value(&self) -> &NodeValue {
        &self.value
    }

    /// Kind discriminant for the `ntype` column.
    pub fn kind(&self) -> NodeKind {
        match &self.value {
            NodeValue::Uri(_) => NodeKind::Uri,
            NodeValue::Blank(_) => NodeKind::Blank,
            NodeValue::Literal(lit) => match lit.value {
                LiteralValue::Str => NodeKind::StringLiteral,
                LiteralValue::Int(_) => NodeKind::IntLiteral,
                LiteralValue::Double(_) => NodeKind::DoubleLiteral,
                LiteralValue::Bool(_) => NodeKind::BoolLiteral,
                LiteralValue::DateTime(_) => NodeKind::DateTimeLiteral,
            },
        }
    }

    /// Whether this node may appear in subject or context position.
    pub fn is_resource(&self) -> bool {
        matches!(self.value, NodeValue::Uri(_) | NodeValue::Blank(_))
    }

    /// URI string, when the node is a URI resource.
    pub fn uri_str(&self) -> Option<&str> {
        match &self.value {
            NodeValue::Uri(uri) => Some(uri),
            _ => None,
        }
    }

    /// Literal payload, when the node is a literal.
    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.value {
            NodeValue::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// Natural cache/index key of this term.
    pub fn key(&self) -> NodeKey {
        match &self.value {
            NodeValue::Uri(uri) => NodeKey::Uri(uri.clone()),
            NodeValue::Blank(anon) => NodeKey::Blank(anon.clone()),
            NodeValue::Literal(lit) => NodeKey::Literal(lit.key()),
        }
    }

    /// Assigns the database id at first store. Ids are immutable once set;
    /// re-assigning a different id is a contract violation.
    pub(crate) fn assign_id(&self, id: NodeId) -> Result<()> {
        match self
            .id
            .compare_exchange(UNPERSISTED, id, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(current) if current == id => Ok(()),
            Err(current) => Err(StoreError::contract(format!(
                "node id already assigned ({current}, refusing {id})"
            ))),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (&self.value, &other.value) {
            (NodeValue::Uri(a), NodeValue::Uri(b)) => a == b,
            (NodeValue::Blank(a), NodeValue::Blank(b)) => a == b,
            (NodeValue::Literal(a), NodeValue::Literal(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Node {}

/// Literal term: a lexical form plus an optional language tag, an optional
/// datatype reference, and the typed projection kept in sync with the
/// lexical form.
#[derive(Debug)]
pub struct Literal {
    lexical: String,
    lang: Option<String>,
    datatype: Option<NodeRef>,
    value: LiteralValue,
}

/// Typed projection of a literal.
#[derive(Clone, Copy, Debug)]
pub enum LiteralValue {
    /// Plain string; the lexical form is the value.
    Str,
    /// Integer value; a double projection is stored alongside for
    /// range/sort queries.
    Int(i64),
    /// Double value.
    Double(f64),
    /// Boolean value.
    Bool(bool),
    /// Instant as unix seconds, fractional seconds truncated.
    DateTime(i64),
}

impl Literal {
    /// Plain or language-tagged or datatyped string literal. Language tags
    /// are normalized to lowercase so lookups and stored rows agree.
    pub fn string(
        lexical: impl Into<String>,
        lang: Option<String>,
        datatype: Option<NodeRef>,
    ) -> Literal {
        Literal {
            lexical: lexical.into(),
            lang: lang.map(|tag| tag.to_ascii_lowercase()),
            datatype,
            value: LiteralValue::Str,
        }
    }

    /// Integer literal; the lexical form is derived from the value.
    pub fn integer(value: i64, datatype: NodeRef) -> Literal {
        Literal {
            lexical: value.to_string(),
            lang: None,
            datatype: Some(datatype),
            value: LiteralValue::Int(value),
        }
    }

    /// Double literal.
    pub fn double(value: f64, datatype: NodeRef) -> Literal {
        Literal {
            lexical: value.to_string(),
            lang: None,
            datatype: Some(datatype),
            value: LiteralValue::Double(value),
        }
    }

    /// Boolean literal.
    pub fn boolean(value: bool, datatype: NodeRef) -> Literal {
        Literal {
            lexical: value.to_string(),
            lang: None,
            datatype: Some(datatype),
            value: LiteralValue::Bool(value),
        }
    }

    /// Date/time literal. Fractional seconds are truncated before both the
    /// instant and the lexical form are derived.
    pub fn date_time(instant: OffsetDateTime, datatype: NodeRef) -> Literal {
        let truncated = instant.replace_nanosecond(0).unwrap_or(instant);
        let lexical = truncated
            .format(&Rfc3339)
            .unwrap_or_else(|_| truncated.to_string());
        Literal {
            lexical,
            lang: None,
            datatype: Some(datatype),
            value: LiteralValue::DateTime(truncated.unix_timestamp()),
        }
    }

    /// Reassembles a literal from row columns. The caller is the row
    /// mapper, which trusts that projections were stored in sync.
    pub(crate) fn from_parts(
        lexical: String,
        lang: Option<String>,
        datatype: Option<NodeRef>,
        value: LiteralValue,
    ) -> Literal {
        Literal {
            lexical,
            lang,
            datatype,
            value,
        }
    }

    /// Lexical form (string projection).
    pub fn lexical(&self) -> &str {
        &self.lexical
    }

    /// Language tag, if any.
    pub fn lang(&self) -> Option<&str> {
        self.lang.as_deref()
    }

    /// Datatype reference, if any.
    pub fn datatype(&self) -> Option<&NodeRef> {
        self.datatype.as_ref()
    }

    /// Typed projection.
    pub fn value(&self) -> LiteralValue {
        self.value
    }

    /// Double projection of an integer literal, stored in the `dvalue`
    /// column so integers sort with doubles in range queries.
    pub fn double_projection(&self) -> Option<f64> {
        match self.value {
            LiteralValue::Int(v) => Some(v as f64),
            LiteralValue::Double(v) => Some(v),
            _ => None,
        }
    }

    /// Natural key: lexical form, language tag, datatype URI.
    pub fn key(&self) -> LiteralKey {
        LiteralKey {
            lexical: self.lexical.clone(),
            lang: self.lang.clone(),
            datatype: self.datatype_uri().map(str::to_owned),
        }
    }

    /// Datatype URI string, if a datatype reference is present.
    pub fn datatype_uri(&self) -> Option<&str> {
        self.datatype.as_ref().and_then(|node| node.uri_str())
    }

    /// Contract check applied at store time: every literal other than the
    /// generic string literal must carry a datatype reference.
    pub(crate) fn validate(&self) -> Result<()> {
        if !matches!(self.value, LiteralValue::Str) && self.datatype.is_none() {
            return Err(StoreError::contract(format!(
                "typed literal '{}' is missing its datatype",
                self.lexical
            )));
        }
        Ok(())
    }
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        self.lexical == other.lexical
            && self.lang == other.lang
            && self.datatype_uri() == other.datatype_uri()
    }
}

impl Eq for Literal {}

/// Hashable identity of a term, used as a cache and staging-index key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKey {
    /// URI resource key.
    Uri(String),
    /// Blank node key.
    Blank(String),
    /// Literal composite key.
    Literal(LiteralKey),
}

/// Composite natural key of a literal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LiteralKey {
    /// Lexical form.
    pub lexical: String,
    /// Language tag.
    pub lang: Option<String>,
    /// Datatype URI.
    pub datatype: Option<String>,
}
