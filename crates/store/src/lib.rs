mod indexer;
mod objects;
mod render;

pub use indexer::Indexer;
pub use objects::{KeyFn, Mutation, MutationKind, Store};
pub use render::render_scalar;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("cannot derive a key for document")]
    Key(#[source] document::Error),
    #[error("column {column:?} of {base:?} cannot index a non-scalar value")]
    Unindexable { base: String, column: String },
    #[error("hook failed: {0}")]
    Hook(String),

    #[error(transparent)]
    Db(#[from] sqldb::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
