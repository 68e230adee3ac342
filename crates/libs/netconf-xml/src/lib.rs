//! XML element tree shared by the protocol engine, filters and handlers.

pub mod codec;
pub mod tree;

pub use codec::{parse, serialize, serialize_document, XmlError};
pub use tree::{elm, leaf, local_name_of, XmlElement};
