use super::Error;
use document::Gvk;
use rusqlite::{Connection, TransactionBehavior};
use serde_json::Value;
use std::sync::Arc;

/// KeyFn derives a document's identity, used as the primary key of the
/// object table. Typically `namespace/name` or `name`.
pub type KeyFn = Arc<dyn Fn(&Value) -> Result<String, document::Error> + Send + Sync>;

/// Hooks observing one mutated document, run inside the mutation's
/// transaction. A hook error aborts the transaction.
pub type MutationHook =
    Box<dyn Fn(&rusqlite::Transaction, &str, &Value) -> Result<(), Error> + Send + Sync>;

/// Hooks observing whole-table transitions (replace, drop).
pub type TxnHook = Box<dyn Fn(&rusqlite::Transaction) -> Result<(), Error> + Send + Sync>;

/// Observer invoked after a mutation commits, while the write lock is
/// still held, so observations occur strictly in commit order.
pub type CommitObserver = Box<dyn Fn(&Mutation) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Added,
    Modified,
    Deleted,
}

/// A committed change to one document.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub kind: MutationKind,
    pub key: String,
    /// The stored document this mutation displaced, if any.
    pub previous: Option<Value>,
    /// The document as ingested. For deletions, the final state
    /// reported by the source.
    pub current: Value,
}

/// Store owns the lifecycle of one GVK's object table: it (re)creates
/// the table on construction, prepares its statements, and applies
/// mutations transactionally with registered hooks.
pub struct Store {
    client: Arc<sqldb::Client>,
    gvk: Gvk,
    base: String,

    key_fn: KeyFn,

    upsert_sql: String,
    delete_sql: String,
    delete_all_sql: String,
    get_sql: String,
    list_sql: String,
    list_keys_sql: String,

    after_add: Vec<MutationHook>,
    after_update: Vec<MutationHook>,
    after_delete: Vec<MutationHook>,
    after_delete_all: Vec<TxnHook>,
    before_drop_all: Vec<TxnHook>,
    on_commit: Option<CommitObserver>,
}

impl Store {
    /// Create the store for `gvk`, dropping any prior incarnation of
    /// its tables. Sidecar tables are dropped here as well: their
    /// column sets may have changed, and the indexer recreates them.
    pub fn create(client: Arc<sqldb::Client>, gvk: Gvk, key_fn: KeyFn) -> Result<Self, Error> {
        let base = gvk.table_base();

        client.with_write_txn(|txn| {
            txn.execute_batch(&format!(
                r#"
                DROP TABLE IF EXISTS "{base}_labels";
                DROP TABLE IF EXISTS "{base}_fields";
                DROP TABLE IF EXISTS "{base}";
                CREATE TABLE "{base}" (
                    key TEXT PRIMARY KEY,
                    object BLOB,
                    objectnonce BLOB,
                    dekid TEXT
                );
                "#
            ))?;
            Ok::<_, Error>(())
        })?;
        tracing::debug!(%gvk, %base, "created object table");

        Ok(Self {
            client,
            gvk,
            key_fn,
            upsert_sql: format!(
                r#"INSERT INTO "{base}" (key, object, objectnonce, dekid) VALUES (?, ?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    object = excluded.object,
                    objectnonce = excluded.objectnonce,
                    dekid = excluded.dekid"#
            ),
            delete_sql: format!(r#"DELETE FROM "{base}" WHERE key = ?"#),
            delete_all_sql: format!(r#"DELETE FROM "{base}""#),
            get_sql: format!(r#"SELECT object, objectnonce, dekid FROM "{base}" WHERE key = ?"#),
            list_sql: format!(r#"SELECT object, objectnonce, dekid FROM "{base}""#),
            list_keys_sql: format!(r#"SELECT key FROM "{base}""#),
            base,
            after_add: Vec::new(),
            after_update: Vec::new(),
            after_delete: Vec::new(),
            after_delete_all: Vec::new(),
            before_drop_all: Vec::new(),
            on_commit: None,
        })
    }

    pub fn gvk(&self) -> &Gvk {
        &self.gvk
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn client(&self) -> &Arc<sqldb::Client> {
        &self.client
    }

    pub fn key_for(&self, doc: &Value) -> Result<String, Error> {
        (self.key_fn)(doc).map_err(Error::Key)
    }

    // Hook registration is append-only; hooks run in registration order.

    pub fn register_after_add(&mut self, hook: MutationHook) {
        self.after_add.push(hook);
    }

    pub fn register_after_update(&mut self, hook: MutationHook) {
        self.after_update.push(hook);
    }

    pub fn register_after_delete(&mut self, hook: MutationHook) {
        self.after_delete.push(hook);
    }

    pub fn register_after_delete_all(&mut self, hook: TxnHook) {
        self.after_delete_all.push(hook);
    }

    pub fn register_before_drop_all(&mut self, hook: TxnHook) {
        self.before_drop_all.push(hook);
    }

    pub fn set_commit_observer(&mut self, observer: CommitObserver) {
        self.on_commit = Some(observer);
    }

    pub fn add(&self, doc: &Value) -> Result<(), Error> {
        self.apply_upsert(doc, MutationKind::Added)
    }

    pub fn update(&self, doc: &Value) -> Result<(), Error> {
        self.apply_upsert(doc, MutationKind::Modified)
    }

    fn apply_upsert(&self, doc: &Value, kind: MutationKind) -> Result<(), Error> {
        let key = self.key_for(doc)?;

        self.client.with_write(|conn| {
            let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let previous = self.read_one(&txn, &key)?;
            self.client.upsert_object(&txn, &self.upsert_sql, &key, doc)?;

            let hooks = match kind {
                MutationKind::Added => &self.after_add,
                _ => &self.after_update,
            };
            for hook in hooks {
                hook(&txn, &key, doc)?;
            }
            txn.commit()?;

            self.observe(Mutation {
                kind,
                key,
                previous,
                current: doc.clone(),
            });
            Ok(())
        })
    }

    pub fn delete(&self, doc: &Value) -> Result<(), Error> {
        let key = self.key_for(doc)?;

        self.client.with_write(|conn| {
            let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let previous = self.read_one(&txn, &key)?;
            txn.prepare_cached(&self.delete_sql)?.execute([&key])?;
            for hook in &self.after_delete {
                hook(&txn, &key, doc)?;
            }
            txn.commit()?;

            self.observe(Mutation {
                kind: MutationKind::Deleted,
                key,
                previous,
                current: doc.clone(),
            });
            Ok(())
        })
    }

    /// Replace the table's contents with `docs`, in one transaction.
    /// No per-document events are observed; the caller records the
    /// source's synthetic resource version.
    pub fn replace(&self, docs: &[Value]) -> Result<(), Error> {
        self.client.with_write_txn(|txn| {
            txn.prepare_cached(&self.delete_all_sql)?.execute([])?;
            for hook in &self.after_delete_all {
                hook(txn)?;
            }
            for doc in docs {
                let key = self.key_for(doc)?;
                self.client.upsert_object(txn, &self.upsert_sql, &key, doc)?;
                for hook in &self.after_add {
                    hook(txn, &key, doc)?;
                }
            }
            Ok(())
        })
    }

    pub fn get(&self, doc: &Value) -> Result<Option<Value>, Error> {
        self.get_by_key(&self.key_for(doc)?)
    }

    pub fn get_by_key(&self, key: &str) -> Result<Option<Value>, Error> {
        self.client.with_read(|conn| self.read_one(conn, key))
    }

    /// List every stored document. Panics on a decode failure: a row
    /// that cannot be decoded means the table no longer corresponds to
    /// this process's codec or keys, which is unrecoverable.
    pub fn list(&self) -> Result<Vec<Value>, Error> {
        self.client.with_read(|conn| {
            let mut stmt = conn.prepare_cached(&self.list_sql)?;
            let mut rows = stmt.query([])?;
            match self.client.read_objects(&mut rows) {
                Ok(docs) => Ok(docs),
                Err(err @ sqldb::Error::Sqlite(_)) => Err(Error::Db(err)),
                Err(err) => panic!("corrupt object row in {:?}: {err}", self.base),
            }
        })
    }

    pub fn list_keys(&self) -> Result<Vec<String>, Error> {
        self.client.with_read(|conn| {
            let mut stmt = conn.prepare_cached(&self.list_keys_sql)?;
            let mut rows = stmt.query([])?;
            sqldb::read_strings(&mut rows).map_err(Error::Db)
        })
    }

    /// Tear down this GVK's tables. Sidecars go first via the
    /// registered `before_drop_all` hooks.
    pub fn drop_all(&self) -> Result<(), Error> {
        self.client.with_write_txn(|txn| {
            for hook in &self.before_drop_all {
                hook(txn)?;
            }
            txn.execute_batch(&format!(r#"DROP TABLE IF EXISTS "{}""#, self.base))?;
            Ok(())
        })
    }

    fn read_one(&self, conn: &Connection, key: &str) -> Result<Option<Value>, Error> {
        let mut stmt = conn.prepare_cached(&self.get_sql)?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            None => Ok(None),
            Some(row) => {
                let blob: Vec<u8> = row.get(0)?;
                let nonce: Vec<u8> = row.get(1)?;
                let dek_id: String = row.get(2)?;
                Ok(Some(self.client.decode_row(&blob, &nonce, &dek_id)?))
            }
        }
    }

    fn observe(&self, mutation: Mutation) {
        if let Some(observer) = &self.on_commit {
            observer(&mutation);
        }
    }
}
