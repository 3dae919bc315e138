mod field;
mod gvk;
mod meta;
mod path;
mod selector;

pub use field::{Extract, IndexedField, SqlType};
pub use gvk::{sanitize, Gvk};
pub use meta::{default_key, labels_of, metadata_str, name_of, namespace_of, resource_version_of};
pub use path::FieldPath;
pub use selector::{Operator, Requirement, Selector};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("field path {path:?} is empty or malformed")]
    InvalidFieldPath { path: String },
    #[error("document has no metadata.name")]
    MissingName,
    #[error("invalid label selector {selector:?}: {detail}")]
    InvalidSelector { selector: String, detail: String },
}
