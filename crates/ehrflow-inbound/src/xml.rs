use std::collections::HashMap;

use ehrflow_core::Result;

/// XML lookup abstraction used by the inbound handlers. The handlers only
/// need two shapes of query: a single node or attribute value at a path, and
/// the attribute maps of every node matching a path. The parsing machinery
/// behind it is an injected collaborator.
pub trait XmlCursor: Send + Sync {
    /// Text or attribute value of the first node matching `path`, if any.
    /// Returns `Err` only when `xml` itself cannot be parsed.
    fn node_value(&self, xml: &str, path: &str) -> Result<Option<String>>;

    /// Attribute maps of every node matching `path`, in document order.
    fn node_entries(&self, xml: &str, path: &str) -> Result<Vec<HashMap<String, String>>>;
}
