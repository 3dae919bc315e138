mod cache;
mod denorm;
mod ingest;

pub use cache::{Cache, CacheOptions};
pub use denorm::{ExternalDependency, ExternalLabelDependency};
pub use ingest::{ingest, ListWatcher, SourceEvent};

pub use eventlog::{WatchEvent, WatchFilter, WatchOptions};
pub use query::{
    Filter, ListOptions, ListResult, Op, OrFilter, Pagination, Partition, Sort, SortOrder,
    SummaryCount,
};

use document::Gvk;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("watch of {gvk} denied: {reason}")]
    Forbidden { gvk: Gvk, reason: String },
    #[error("dependency column {column:?} is not a valid identifier")]
    InvalidDependency { column: String },

    #[error(transparent)]
    Document(#[from] document::Error),
    #[error(transparent)]
    Db(#[from] sqldb::Error),
    #[error(transparent)]
    Store(#[from] store::Error),
    #[error(transparent)]
    Query(#[from] query::Error),
    #[error(transparent)]
    Watch(#[from] eventlog::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Gate for reactive watches. Implementations decide whether the
/// requesting principal may observe the GVK under the given options.
pub trait AccessControl: Send + Sync {
    fn can_watch(&self, gvk: &Gvk, options: &WatchOptions) -> Result<(), Error>;
}

/// Factory owns the embedded database shared by every GVK's cache,
/// plus the cross-GVK denormalization worker.
///
/// Construct it inside a Tokio runtime: the denormalization worker is
/// spawned here.
pub struct Factory {
    client: Arc<sqldb::Client>,
    denorm: Arc<denorm::Denormalizer>,
}

#[derive(Default)]
pub struct FactoryOptions {
    pub codec: sqldb::CodecKind,
    pub keyring: Option<Arc<dyn sqldb::Keyring>>,
    pub field_dependencies: Vec<ExternalDependency>,
    pub label_dependencies: Vec<ExternalLabelDependency>,
}

impl Factory {
    pub fn new(location: sqldb::Location, options: FactoryOptions) -> Result<Self, Error> {
        let client = Arc::new(sqldb::Client::open(
            location,
            options.codec,
            options.keyring,
        )?);
        let denorm = denorm::Denormalizer::spawn(
            client.clone(),
            options.field_dependencies,
            options.label_dependencies,
        )?;
        Ok(Self { client, denorm })
    }

    /// Open (and reset) the cache of one GVK. Any prior tables of the
    /// GVK are dropped and recreated with the declared field set.
    pub fn open(&self, gvk: Gvk, options: CacheOptions) -> Result<Cache, Error> {
        Cache::create(self.client.clone(), self.denorm.clone(), gvk, options)
    }

    pub fn client(&self) -> &Arc<sqldb::Client> {
        &self.client
    }
}
