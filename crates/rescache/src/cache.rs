use super::denorm::Denormalizer;
use super::{AccessControl, Error, WatchEvent, WatchOptions};
use document::{FieldPath, Gvk, IndexedField};
use eventlog::{Event, EventKind, Log};
use serde_json::Value;
use std::sync::Arc;
use store::{Indexer, KeyFn, MutationKind, Store};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct CacheOptions {
    pub namespaced: bool,
    /// Indexed fields beyond the defaults (`metadata.name`,
    /// `metadata.namespace`, `metadata.creationTimestamp`, `id`).
    pub fields: Vec<IndexedField>,
    pub key_fn: Option<KeyFn>,
    /// Event log capacity.
    pub keep_count: usize,
    pub access: Option<Arc<dyn AccessControl>>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            namespaced: true,
            fields: Vec::new(),
            key_fn: None,
            keep_count: eventlog::DEFAULT_KEEP_COUNT,
            access: None,
        }
    }
}

/// Cache is the per-GVK surface over the shared database: transactional
/// ingestion of documents, structured list queries, and resumable
/// watches over the in-memory event log.
pub struct Cache {
    gvk: Gvk,
    store: Arc<Store>,
    log: Log,
    ctx: query::QueryContext,
    client: Arc<sqldb::Client>,
    denorm: Arc<Denormalizer>,
    access: Option<Arc<dyn AccessControl>>,
}

impl Cache {
    pub(crate) fn create(
        client: Arc<sqldb::Client>,
        denorm: Arc<Denormalizer>,
        gvk: Gvk,
        options: CacheOptions,
    ) -> Result<Self, Error> {
        let key_fn = options
            .key_fn
            .unwrap_or_else(|| Arc::new(document::default_key));

        let mut store = Store::create(client.clone(), gvk.clone(), key_fn)?;

        let mut fields = default_fields();
        for field in options.fields {
            if !fields
                .iter()
                .any(|f| f.column_name() == field.column_name())
            {
                fields.push(field);
            }
        }
        let indexer = Indexer::attach(&mut store, fields)?;

        let ctx = query::QueryContext {
            base: store.base().to_string(),
            columns: indexer.fields().iter().map(|f| f.column_name()).collect(),
            namespaced: options.namespaced,
        };

        let log = Log::new(options.keep_count);
        {
            // Publish each committed mutation to the event log (still
            // under the write lock, so publication order is commit
            // order) and poke the denormalizer.
            let log = log.clone();
            let denorm = denorm.clone();
            let gvk = gvk.clone();
            store.set_commit_observer(Box::new(move |mutation| {
                log.append(Event {
                    kind: match mutation.kind {
                        MutationKind::Added => EventKind::Added,
                        MutationKind::Modified => EventKind::Modified,
                        MutationKind::Deleted => EventKind::Deleted,
                    },
                    previous: mutation.previous.clone(),
                    current: mutation.current.clone(),
                    resource_version: document::resource_version_of(&mutation.current)
                        .to_string(),
                });
                denorm.notify(&gvk, Some(&mutation.key));
            }));
        }

        tracing::info!(%gvk, base = %ctx.base, "opened cache");

        Ok(Self {
            gvk,
            store: Arc::new(store),
            log,
            ctx,
            client,
            denorm,
            access: options.access,
        })
    }

    pub fn gvk(&self) -> &Gvk {
        &self.gvk
    }

    pub fn add(&self, doc: &Value) -> Result<(), Error> {
        Ok(self.store.add(doc)?)
    }

    pub fn update(&self, doc: &Value) -> Result<(), Error> {
        Ok(self.store.update(doc)?)
    }

    pub fn delete(&self, doc: &Value) -> Result<(), Error> {
        Ok(self.store.delete(doc)?)
    }

    /// Replace the cache's contents wholesale and record the source's
    /// resource version. Watchers receive no per-document events.
    pub fn replace(&self, docs: &[Value], resource_version: &str) -> Result<(), Error> {
        self.store.replace(docs)?;
        self.log.set_latest_resource_version(resource_version);
        self.denorm_all();
        Ok(())
    }

    pub fn get(&self, doc: &Value) -> Result<Option<Value>, Error> {
        Ok(self.store.get(doc)?)
    }

    pub fn get_by_key(&self, key: &str) -> Result<Option<Value>, Error> {
        Ok(self.store.get_by_key(key)?)
    }

    pub fn list(&self) -> Result<Vec<Value>, Error> {
        Ok(self.store.list()?)
    }

    pub fn list_keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.store.list_keys()?)
    }

    /// Compile and execute a structured list query.
    pub fn list_by_options(
        &self,
        options: &query::ListOptions,
        partitions: &[query::Partition],
        namespace: &str,
    ) -> Result<query::ListResult, Error> {
        let compiled = query::compile(&self.ctx, options, partitions, namespace)?;
        Ok(query::execute(
            &self.client,
            &compiled,
            options,
            &self.log.latest_resource_version(),
        )?)
    }

    /// Stream matching events into `sink` until cancelled. Resuming
    /// from a resource version the event log no longer retains fails
    /// TooOld.
    pub async fn watch(
        &self,
        options: WatchOptions,
        sink: mpsc::Sender<WatchEvent>,
        cancel: CancellationToken,
    ) -> Result<(), Error> {
        if let Some(access) = &self.access {
            access.can_watch(&self.gvk, &options)?;
        }
        Ok(eventlog::watch(&self.log, options, sink, cancel).await?)
    }

    pub fn latest_resource_version(&self) -> String {
        self.log.latest_resource_version()
    }

    /// Record a resource version observed out-of-band (a source
    /// bookmark).
    pub fn record_resource_version(&self, resource_version: &str) {
        self.log.set_latest_resource_version(resource_version);
    }

    /// Tear down this GVK: the event log closes (watchers drain and
    /// end) and all three tables are dropped.
    pub fn drop_all(&self) -> Result<(), Error> {
        self.log.close();
        Ok(self.store.drop_all()?)
    }

    fn denorm_all(&self) {
        // Bulk changes refresh dependents wholesale.
        self.denorm.notify(&self.gvk, None);
    }
}

fn default_fields() -> Vec<IndexedField> {
    vec![
        IndexedField::new(FieldPath::new(["metadata", "name"])),
        IndexedField::new(FieldPath::new(["metadata", "namespace"])),
        IndexedField::new(FieldPath::new(["metadata", "creationTimestamp"])),
        IndexedField::computed(FieldPath::new(["id"]), |doc| {
            doc.pointer("/metadata/name").cloned()
        }),
    ]
}
