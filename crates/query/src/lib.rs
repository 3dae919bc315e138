mod compile;
mod execute;
mod options;

pub use compile::{compile, CompiledQuery, QueryContext, SummaryQuery};
pub use execute::{execute, ListResult, SummaryCount};
pub use options::{Filter, ListOptions, Op, OrFilter, Pagination, Partition, Sort, SortOrder};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("column {column:?} is not an indexed field")]
    InvalidColumn { column: String },
    #[error("unsupported operation: {detail}")]
    UnsupportedOperator { detail: String },
    #[error("bad value {value:?}: {detail}")]
    BadValue { value: String, detail: String },
    #[error("requested revision {revision:?} is ahead of the cache")]
    UnknownRevision { revision: String },

    #[error(transparent)]
    Db(#[from] sqldb::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
