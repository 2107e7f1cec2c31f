//! Keyword search over XML configuration documents.
//!
//! A document is parsed into a [`tree::Document`]; [`search::search`] finds the
//! keyword in tag names, `name` attributes and text, and reports every hit as
//! an xpath rooted below the `response`/`result` wrappers. A reported xpath can
//! be drilled into with [`children::list_children`].

pub mod children;
pub mod search;
pub mod source;
pub mod tree;
pub mod xpath;

pub use children::{children_for_ordinal, list_children};
pub use search::{search, Category, SearchError, SearchResults, Selection};
pub use source::Source;
pub use tree::{ConfigNode, Document, XmlElement};
