use super::compile::CompiledQuery;
use super::{Error, ListOptions};
use rusqlite::params_from_iter;
use serde_json::Value;

/// One row of a summary aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryCount {
    pub field: String,
    pub value: String,
    pub count: i64,
}

/// The assembled response of a list query.
#[derive(Debug, Clone)]
pub struct ListResult {
    pub items: Vec<Value>,
    /// Matching rows before pagination.
    pub total: i64,
    /// Offset token for the next page; empty when this is the last.
    pub continue_token: String,
    pub resource_version: String,
    pub summaries: Vec<SummaryCount>,
}

/// Execute a compiled query inside one read transaction: decode
/// matching documents, count the unpaginated total, derive the
/// continue token, and evaluate summaries.
pub fn execute(
    client: &sqldb::Client,
    compiled: &CompiledQuery,
    opts: &ListOptions,
    latest_rv: &str,
) -> Result<ListResult, Error> {
    // A requested revision ahead of the cache cannot be served. One at
    // or behind it is: the response reports the (newer) latest, so
    // clients observe a non-decreasing resource version.
    if !opts.revision.is_empty() {
        let requested: u64 = opts.revision.parse().map_err(|_| Error::BadValue {
            value: opts.revision.clone(),
            detail: "revision is not a resource version".to_string(),
        })?;
        if requested > latest_rv.parse().unwrap_or(0) {
            return Err(Error::UnknownRevision {
                revision: opts.revision.clone(),
            });
        }
    }

    tracing::trace!(sql = %compiled.sql, params = compiled.params.len(), "executing list query");

    client.with_read(|conn| {
        // One read transaction, so the item, count and summary queries
        // observe a single snapshot.
        let txn = conn.unchecked_transaction()?;

        let mut stmt = txn.prepare_cached(&compiled.sql)?;
        let mut rows = stmt.query(params_from_iter(compiled.params.iter()))?;
        let items = client.read_objects(&mut rows)?;

        let total = match &compiled.count_sql {
            Some(count_sql) => {
                let mut stmt = txn.prepare_cached(count_sql)?;
                let mut rows = stmt.query(params_from_iter(compiled.count_params.iter()))?;
                sqldb::read_int(&mut rows)?
            }
            None => items.len() as i64,
        };

        let continue_token = if compiled.limit > 0 && compiled.offset + (items.len() as i64) < total
        {
            (compiled.offset + compiled.limit).to_string()
        } else {
            String::new()
        };

        let mut summaries = Vec::new();
        for summary in &compiled.summaries {
            let mut stmt = txn.prepare_cached(&summary.sql)?;
            let mut rows = stmt.query(params_from_iter(summary.params.iter()))?;
            while let Some(row) = rows.next()? {
                summaries.push(SummaryCount {
                    field: summary.field.clone(),
                    count: row.get(0)?,
                    value: row.get(1)?,
                });
            }
        }

        Ok(ListResult {
            items,
            total,
            continue_token,
            resource_version: latest_rv.to_string(),
            summaries,
        })
    })
}
