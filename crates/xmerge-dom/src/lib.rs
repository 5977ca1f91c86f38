//! Owned XML element trees for xmerge.
//!
//! The merge engine works on small, owned trees: an [`Element`] holds its
//! namespace-qualified name, attributes, and an ordered list of
//! [`Content`] items that are either child elements or text. Comments and
//! processing instructions are not part of the model.
//!
//! - [`read`] builds a tree from XML text (quick-xml, namespace aware).
//! - [`write`] produces the canonical compact serialization the comparator
//!   uses for value equality.

pub mod error;
pub mod node;
pub mod read;
pub mod write;

pub use error::{DomError, DomResult};
pub use node::{normalize_whitespace, Attribute, Content, Element, XML_NAMESPACE};
pub use read::parse_str;
pub use write::{escape_text, to_xml_string};
