use super::node::UNPERSISTED;
use super::now_millis;

/// A prefix/URI binding. Both the prefix and the URI are unique within the
/// store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Namespace {
    /// Database id, -1 until persisted.
    pub id: i64,
    /// Short prefix, e.g. `rdf`.
    pub prefix: String,
    /// Namespace URI.
    pub uri: String,
    /// Creation instant, unix milliseconds.
    pub created: i64,
}

impl Namespace {
    /// New unpersisted namespace binding.
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>) -> Namespace {
        Namespace {
            id: UNPERSISTED,
            prefix: prefix.into(),
            uri: uri.into(),
            created: now_millis(),
        }
    }

    /// Whether the namespace carries a persisted id.
    pub fn is_persisted(&self) -> bool {
        self.id >= 0
    }
}
