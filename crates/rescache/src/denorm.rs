use super::Error;
use document::Gvk;
use exponential_backoff::Backoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Declares that column `target_final_field` of `target_gvk`'s fields
/// table is denormalized into the same-named column of
/// `affected_gvk`'s fields table, joined on
/// `affected.source_field = target.target_key_field`.
#[derive(Debug, Clone)]
pub struct ExternalDependency {
    pub affected_gvk: Gvk,
    pub source_field: String,
    pub target_gvk: Gvk,
    pub target_key_field: String,
    pub target_final_field: String,
}

/// As ExternalDependency, but the join key is the value of
/// `source_label` in the affected GVK's labels table.
#[derive(Debug, Clone)]
pub struct ExternalLabelDependency {
    pub affected_gvk: Gvk,
    pub source_label: String,
    pub target_gvk: Gvk,
    pub target_key_field: String,
    pub target_final_field: String,
}

#[derive(Debug)]
enum Trigger {
    /// Refresh every row of the dependency.
    All { dep: usize },
    /// Refresh one affected key.
    Key { dep: usize, key: String },
}

struct Dep {
    affected_gvk: Gvk,
    target_gvk: Gvk,
    sql: String,
    scoped_sql: String,
    label: Option<String>,
}

/// Denormalizer keeps dependent columns converged after mutations.
/// Triggers are submitted from commit observers through a bounded
/// queue which never blocks the committing writer; a serial worker
/// applies idempotent UPDATE joins in their own write transactions,
/// retrying with backoff. A dropped or failed trigger converges on the
/// next mutation.
pub(crate) struct Denormalizer {
    deps: Arc<Vec<Dep>>,
    tx: mpsc::Sender<Trigger>,
}

impl Denormalizer {
    pub(crate) fn spawn(
        client: Arc<sqldb::Client>,
        field_deps: Vec<ExternalDependency>,
        label_deps: Vec<ExternalLabelDependency>,
    ) -> Result<Arc<Self>, Error> {
        let mut deps = Vec::new();
        for dep in field_deps {
            deps.push(build_field_dep(&dep)?);
        }
        for dep in label_deps {
            deps.push(build_label_dep(&dep)?);
        }
        let deps = Arc::new(deps);

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(run(client, deps.clone(), rx));

        Ok(Arc::new(Self { deps, tx }))
    }

    /// Submit the triggers a mutation of `gvk` implies. `key` is the
    /// mutated key, or None for bulk changes.
    pub(crate) fn notify(&self, gvk: &Gvk, key: Option<&str>) {
        for (index, dep) in self.deps.iter().enumerate() {
            let trigger = if dep.affected_gvk == *gvk {
                // A self-update converges just the mutated row.
                match key {
                    Some(key) => Trigger::Key {
                        dep: index,
                        key: key.to_string(),
                    },
                    None => Trigger::All { dep: index },
                }
            } else if dep.target_gvk == *gvk {
                Trigger::All { dep: index }
            } else {
                continue;
            };

            if let Err(err) = self.tx.try_send(trigger) {
                // Dropping is safe: statements are idempotent and the
                // next mutation re-triggers convergence.
                tracing::warn!(%gvk, %err, "denormalization queue rejected trigger");
            }
        }
    }
}

async fn run(client: Arc<sqldb::Client>, deps: Arc<Vec<Dep>>, mut rx: mpsc::Receiver<Trigger>) {
    let backoff = Backoff::new(4, Duration::from_millis(50), Some(Duration::from_secs(2)));

    while let Some(trigger) = rx.recv().await {
        let (dep, key) = match &trigger {
            Trigger::All { dep } => (&deps[*dep], None),
            Trigger::Key { dep, key } => (&deps[*dep], Some(key.as_str())),
        };

        for attempt in 1u32.. {
            match apply(&client, dep, key) {
                Ok(rows) => {
                    tracing::debug!(
                        affected = %dep.affected_gvk,
                        target = %dep.target_gvk,
                        rows,
                        "denormalized"
                    );
                    break;
                }
                Err(err) => match backoff.next(attempt) {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => {
                        tracing::warn!(
                            affected = %dep.affected_gvk,
                            target = %dep.target_gvk,
                            %err,
                            "denormalization failed; will converge on the next mutation"
                        );
                        break;
                    }
                },
            }
        }
    }
}

fn apply(client: &sqldb::Client, dep: &Dep, key: Option<&str>) -> Result<usize, Error> {
    client.with_write_txn(|txn| {
        let sql = if key.is_some() { &dep.scoped_sql } else { &dep.sql };
        let mut stmt = txn.prepare_cached(sql)?;

        let mut params: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(label) = &dep.label {
            // The label name binds twice: in the SET subquery and in
            // the drift guard.
            params.push(label.clone().into());
            params.push(label.clone().into());
        }
        if let Some(key) = key {
            params.push(key.to_string().into());
        }

        Ok(stmt.execute(rusqlite::params_from_iter(params))?)
    })
}

fn build_field_dep(dep: &ExternalDependency) -> Result<Dep, Error> {
    for column in [
        &dep.source_field,
        &dep.target_key_field,
        &dep.target_final_field,
    ] {
        check_identifier(column)?;
    }
    let affected = dep.affected_gvk.table_base();
    let target = dep.target_gvk.table_base();
    let (source, key_field, final_field) = (
        &dep.source_field,
        &dep.target_key_field,
        &dep.target_final_field,
    );

    let lookup = format!(
        r#"COALESCE((SELECT t."{final_field}" FROM "{target}_fields" t WHERE t."{key_field}" = "{affected}_fields"."{source}"), '')"#
    );
    let sql = format!(
        r#"UPDATE "{affected}_fields" SET "{final_field}" = {lookup} WHERE "{final_field}" IS NOT {lookup}"#
    );
    let scoped_sql = format!("{sql} AND key = ?");

    Ok(Dep {
        affected_gvk: dep.affected_gvk.clone(),
        target_gvk: dep.target_gvk.clone(),
        sql,
        scoped_sql,
        label: None,
    })
}

fn build_label_dep(dep: &ExternalLabelDependency) -> Result<Dep, Error> {
    for column in [&dep.target_key_field, &dep.target_final_field] {
        check_identifier(column)?;
    }
    let affected = dep.affected_gvk.table_base();
    let target = dep.target_gvk.table_base();
    let (key_field, final_field) = (&dep.target_key_field, &dep.target_final_field);

    let lookup = format!(
        r#"COALESCE((SELECT t."{final_field}" FROM "{target}_fields" t JOIN "{affected}_labels" l ON l.key = "{affected}_fields".key AND l.label = ? WHERE t."{key_field}" = l.value), '')"#
    );
    let sql = format!(
        r#"UPDATE "{affected}_fields" SET "{final_field}" = {lookup} WHERE "{final_field}" IS NOT {lookup}"#
    );
    let scoped_sql = format!("{sql} AND key = ?");

    Ok(Dep {
        affected_gvk: dep.affected_gvk.clone(),
        target_gvk: dep.target_gvk.clone(),
        sql,
        scoped_sql,
        label: Some(dep.source_label.clone()),
    })
}

fn check_identifier(name: &str) -> Result<(), Error> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'));
    if !ok {
        return Err(Error::InvalidDependency {
            column: name.to_string(),
        });
    }
    Ok(())
}
