use super::{render_scalar, Error, Store};
use document::{labels_of, IndexedField, SqlType};
use itertools::Itertools;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use std::sync::Arc;

/// Columns written only when the fields row is first inserted.
pub const IMMUTABLE_COLUMNS: &[&str] = &[
    "metadata.name",
    "metadata.namespace",
    "metadata.creationTimestamp",
    "id",
];

struct Inner {
    base: String,
    fields: Vec<IndexedField>,
    upsert_fields_sql: String,
    delete_labels_sql: String,
    insert_label_sql: String,
}

/// Indexer maintains a GVK's `{base}_fields` and `{base}_labels`
/// sidecar tables, hooked into the Store so every sidecar write happens
/// inside the object mutation's transaction.
///
/// The declared field set is fixed once attached; changing it requires
/// recreating the GVK's tables.
pub struct Indexer {
    inner: Arc<Inner>,
}

impl Indexer {
    /// Create the sidecar tables for `store` and register the hooks
    /// which maintain them.
    pub fn attach(store: &mut Store, fields: Vec<IndexedField>) -> Result<Self, Error> {
        let base = store.base().to_string();
        let columns: Vec<String> = fields.iter().map(|f| f.column_name()).collect();

        store.client().with_write_txn(|txn| {
            let column_ddl = columns
                .iter()
                .zip(fields.iter())
                .map(|(col, field)| format!(r#", "{col}" {}"#, field.sql_type.ddl()))
                .join("");

            txn.execute_batch(&format!(
                r#"
                CREATE TABLE "{base}_fields" (
                    key TEXT PRIMARY KEY REFERENCES "{base}"(key) ON DELETE CASCADE{column_ddl}
                );
                CREATE TABLE "{base}_labels" (
                    key TEXT REFERENCES "{base}"(key) ON DELETE CASCADE,
                    label TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (key, label)
                );
                CREATE INDEX "{base}_labels_index" ON "{base}_labels" (label, value);
                "#
            ))?;

            for col in &columns {
                txn.execute_batch(&format!(
                    r#"CREATE INDEX "{base}_fields_{col}_index" ON "{base}_fields" ("{col}");"#
                ))?;
            }
            Ok::<_, Error>(())
        })?;
        tracing::debug!(%base, columns = columns.len(), "created sidecar tables");

        let mutable: Vec<&String> = columns
            .iter()
            .filter(|col| !IMMUTABLE_COLUMNS.contains(&col.as_str()))
            .collect();
        let conflict = if mutable.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!(
                "DO UPDATE SET {}",
                mutable
                    .iter()
                    .map(|col| format!(r#""{col}" = excluded."{col}""#))
                    .join(", ")
            )
        };

        let inner = Arc::new(Inner {
            upsert_fields_sql: format!(
                r#"INSERT INTO "{base}_fields" (key{}) VALUES (?{}) ON CONFLICT(key) {conflict}"#,
                columns.iter().map(|col| format!(r#", "{col}""#)).join(""),
                ", ?".repeat(columns.len()),
            ),
            delete_labels_sql: format!(r#"DELETE FROM "{base}_labels" WHERE key = ?"#),
            insert_label_sql: format!(
                r#"INSERT INTO "{base}_labels" (key, label, value) VALUES (?, ?, ?)"#
            ),
            base,
            fields,
        });

        {
            let inner = inner.clone();
            store.register_after_add(Box::new(move |txn, key, doc| {
                inner.write_row(txn, key, doc)
            }));
        }
        {
            let inner = inner.clone();
            store.register_after_update(Box::new(move |txn, key, doc| {
                inner.write_row(txn, key, doc)
            }));
        }
        {
            let inner = inner.clone();
            store.register_after_delete_all(Box::new(move |txn| {
                txn.execute_batch(&format!(
                    r#"DELETE FROM "{0}_fields"; DELETE FROM "{0}_labels";"#,
                    inner.base
                ))?;
                Ok(())
            }));
        }
        {
            let inner = inner.clone();
            store.register_before_drop_all(Box::new(move |txn| {
                txn.execute_batch(&format!(
                    r#"DROP TABLE IF EXISTS "{0}_labels"; DROP TABLE IF EXISTS "{0}_fields";"#,
                    inner.base
                ))?;
                Ok(())
            }));
        }

        Ok(Self { inner })
    }

    pub fn fields(&self) -> &[IndexedField] {
        &self.inner.fields
    }
}

impl Inner {
    fn write_row(&self, txn: &rusqlite::Transaction, key: &str, doc: &Value) -> Result<(), Error> {
        let mut params: Vec<SqlValue> = Vec::with_capacity(1 + self.fields.len());
        params.push(SqlValue::Text(key.to_string()));

        for field in &self.fields {
            let extracted = field.evaluate(doc);
            params.push(match field.sql_type {
                SqlType::Text => SqlValue::Text(render_scalar(
                    &self.base,
                    &field.column_name(),
                    extracted.as_ref(),
                )?),
                SqlType::Integer => match numeric(&extracted, Value::as_i64) {
                    Some(i) => SqlValue::Integer(i),
                    None => SqlValue::Null,
                },
                SqlType::Real => match numeric(&extracted, Value::as_f64) {
                    Some(f) => SqlValue::Real(f),
                    None => SqlValue::Null,
                },
            });
        }

        txn.prepare_cached(&self.upsert_fields_sql)?
            .execute(rusqlite::params_from_iter(params))?;

        // Reconcile labels: drop the key's rows and insert the current set.
        txn.prepare_cached(&self.delete_labels_sql)?.execute([key])?;
        let mut insert = txn.prepare_cached(&self.insert_label_sql)?;
        for (label, value) in labels_of(doc) {
            insert.execute(rusqlite::params![key, label, value])?;
        }
        Ok(())
    }
}

// Numeric columns accept both JSON numbers and their string forms.
fn numeric<T: std::str::FromStr>(
    extracted: &Option<Value>,
    direct: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    let value = extracted.as_ref()?;
    direct(value).or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod test {
    use super::*;
    use document::{FieldPath, Gvk};
    use serde_json::json;

    fn test_store_with_fields() -> (Store, Indexer) {
        static NEXT: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let name = format!(
            "indexer-test-{}",
            NEXT.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
        );
        let client = Arc::new(
            sqldb::Client::open(
                sqldb::Location::InMemory(name),
                sqldb::CodecKind::MessagePack,
                None,
            )
            .unwrap(),
        );
        let mut store = Store::create(
            client,
            Gvk::new("", "v1", "Pod"),
            Arc::new(document::default_key),
        )
        .unwrap();

        let fields = vec![
            IndexedField::new(FieldPath::parse("metadata.name").unwrap()),
            IndexedField::new(FieldPath::parse("metadata.namespace").unwrap()),
            IndexedField::new(FieldPath::parse("metadata.creationTimestamp").unwrap()),
            IndexedField::new(FieldPath::parse("spec.containers.image").unwrap()),
            IndexedField::new(FieldPath::parse("spec.replicas").unwrap())
                .with_type(document::SqlType::Integer),
            IndexedField::computed(FieldPath::parse("id").unwrap(), |doc| {
                doc.pointer("/metadata/name").cloned()
            }),
        ];
        let indexer = Indexer::attach(&mut store, fields).unwrap();
        (store, indexer)
    }

    fn fields_row(store: &Store, key: &str) -> Option<(String, String, Option<i64>, String)> {
        store
            .client()
            .with_read(|conn| {
                conn.query_row(
                    r#"SELECT "metadata.name", "spec.containers.image", "spec.replicas", "metadata.creationTimestamp"
                       FROM "_v1_Pod_fields" WHERE key = ?"#,
                    [key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .map(Some)
                .or_else(|err| match err {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    err => Err(Error::Sqlite(err)),
                })
            })
            .unwrap()
    }

    fn labels_rows(store: &Store, key: &str) -> Vec<(String, String)> {
        store
            .client()
            .with_read(|conn| {
                let mut stmt = conn
                    .prepare(r#"SELECT label, value FROM "_v1_Pod_labels" WHERE key = ? ORDER BY label"#)?;
                let mut rows = stmt.query([key])?;
                sqldb::read_string_pairs(&mut rows).map_err(Error::Db)
            })
            .unwrap()
    }

    fn pod() -> Value {
        json!({
            "metadata": {
                "namespace": "default",
                "name": "web-0",
                "creationTimestamp": "2026-01-10T10:00:00Z",
                "labels": {"app": "web", "tier": "frontend"},
            },
            "spec": {
                "replicas": 3,
                "containers": [{"name": "c"}],
            },
        })
    }

    #[test]
    fn upsert_writes_fields_and_labels() {
        let (store, _indexer) = test_store_with_fields();
        let mut doc = pod();
        doc["spec"]["containers"] = json!([{"image": "nginx:1.25"}, {"image": "envoy:1.29"}]);

        store.add(&doc).unwrap();

        let (name, images, replicas, ts) = fields_row(&store, "default/web-0").unwrap();
        assert_eq!(name, "web-0");
        assert_eq!(images, "nginx:1.25|envoy:1.29");
        assert_eq!(replicas, Some(3));
        assert_eq!(ts, "2026-01-10T10:00:00Z");

        assert_eq!(
            labels_rows(&store, "default/web-0"),
            vec![
                ("app".to_string(), "web".to_string()),
                ("tier".to_string(), "frontend".to_string()),
            ]
        );
    }

    #[test]
    fn labels_reconcile_on_update() {
        let (store, _indexer) = test_store_with_fields();
        store.add(&pod()).unwrap();

        let mut doc = pod();
        doc["metadata"]["labels"] = json!({"app": "web-v2", "canary": "true"});
        store.update(&doc).unwrap();

        // `tier` is gone, `app` is rewritten, `canary` appears.
        assert_eq!(
            labels_rows(&store, "default/web-0"),
            vec![
                ("app".to_string(), "web-v2".to_string()),
                ("canary".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn immutable_columns_keep_first_write() {
        let (store, _indexer) = test_store_with_fields();
        store.add(&pod()).unwrap();

        let mut doc = pod();
        doc["metadata"]["creationTimestamp"] = json!("2026-02-02T00:00:00Z");
        doc["spec"]["replicas"] = json!(5);
        store.update(&doc).unwrap();

        let (_, _, replicas, ts) = fields_row(&store, "default/web-0").unwrap();
        assert_eq!(replicas, Some(5), "mutable column updated");
        assert_eq!(ts, "2026-01-10T10:00:00Z", "immutable column kept");
    }

    #[test]
    fn delete_cascades_to_sidecars() {
        let (store, _indexer) = test_store_with_fields();
        store.add(&pod()).unwrap();
        store.delete(&pod()).unwrap();

        assert!(fields_row(&store, "default/web-0").is_none());
        assert!(labels_rows(&store, "default/web-0").is_empty());
    }

    #[test]
    fn replace_reindexes() {
        let (store, _indexer) = test_store_with_fields();
        store.add(&pod()).unwrap();

        let other = json!({
            "metadata": {"namespace": "default", "name": "db-0", "labels": {"app": "db"}},
        });
        store.replace(&[other]).unwrap();

        assert!(fields_row(&store, "default/web-0").is_none());
        let (name, _, _, _) = fields_row(&store, "default/db-0").unwrap();
        assert_eq!(name, "db-0");
        assert_eq!(
            labels_rows(&store, "default/db-0"),
            vec![("app".to_string(), "db".to_string())]
        );
    }

    #[test]
    fn unindexable_value_aborts_txn() {
        let (store, _indexer) = test_store_with_fields();
        let mut doc = pod();
        // A map under an indexed path cannot be rendered to a scalar.
        doc["spec"]["containers"] = json!({"image": {"nested": "map"}});

        let err = store.add(&doc).unwrap_err();
        insta::assert_display_snapshot!(
            err,
            @r###"column "spec.containers.image" of "_v1_Pod" cannot index a non-scalar value"###);

        // Nothing of the aborted upsert remains.
        assert_eq!(store.get_by_key("default/web-0").unwrap(), None);
        assert!(fields_row(&store, "default/web-0").is_none());
    }
}
