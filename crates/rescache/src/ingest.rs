use super::Cache;
use anyhow::Context;
use exponential_backoff::Backoff;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One change reported by the upstream list/watch source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Added(Value),
    Modified(Value),
    Deleted(Value),
    /// Progress marker carrying only a resource version.
    Bookmark(String),
}

/// The upstream source feeding a cache: a complete listing plus a
/// stream of subsequent changes.
#[async_trait::async_trait]
pub trait ListWatcher: Send + Sync {
    /// List every current document and the collection's resource
    /// version.
    async fn list(&self) -> anyhow::Result<(Vec<Value>, String)>;

    /// Stream changes occurring after `resume`. The stream ends (or
    /// errors) when the source's watch window expires; the caller
    /// re-lists.
    async fn watch(
        &self,
        resume: &str,
    ) -> anyhow::Result<BoxStream<'static, anyhow::Result<SourceEvent>>>;
}

/// Drive `cache` from `source` until cancelled: seed with a full
/// listing (a bulk replace), then apply watch events as they arrive.
/// When the watch stream ends or errors the source is re-listed, with
/// exponential backoff between attempts.
pub async fn ingest(
    cache: &Cache,
    source: &dyn ListWatcher,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let backoff = Backoff::new(u32::MAX, Duration::from_millis(100), Some(Duration::from_secs(30)));
    let mut failures = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let listed = tokio::select! {
            listed = source.list() => listed,
            () = cancel.cancelled() => return Ok(()),
        };

        match listed {
            Ok((docs, resource_version)) => {
                failures = 0;
                cache
                    .replace(&docs, &resource_version)
                    .context("failed to replace cache contents from listing")?;
                tracing::debug!(
                    gvk = %cache.gvk(),
                    count = docs.len(),
                    %resource_version,
                    "seeded cache from listing"
                );

                if let Err(err) = consume_watch(cache, source, &resource_version, cancel).await {
                    tracing::warn!(gvk = %cache.gvk(), err = format!("{err:#}"), "watch failed; re-listing");
                }
                if cancel.is_cancelled() {
                    return Ok(());
                }
            }
            Err(err) => {
                failures += 1;
                tracing::warn!(gvk = %cache.gvk(), err = format!("{err:#}"), "listing failed");
            }
        }

        let delay = backoff.next(failures.max(1)).unwrap_or(Duration::from_secs(30));
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = cancel.cancelled() => return Ok(()),
        }
    }
}

async fn consume_watch(
    cache: &Cache,
    source: &dyn ListWatcher,
    resume: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut stream = source.watch(resume).await.context("failed to start watch")?;

    loop {
        let event = tokio::select! {
            event = stream.next() => event,
            () = cancel.cancelled() => return Ok(()),
        };
        let Some(event) = event else {
            return Ok(()); // Watch window closed; caller re-lists.
        };

        match event.context("watch stream failed")? {
            SourceEvent::Added(doc) => cache.add(&doc)?,
            SourceEvent::Modified(doc) => cache.update(&doc)?,
            SourceEvent::Deleted(doc) => cache.delete(&doc)?,
            SourceEvent::Bookmark(resource_version) => {
                cache.record_resource_version(&resource_version)
            }
        }
    }
}
