use super::{Error, EventKind, Log};
use document::Selector;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// WatchFilter restricts a subscription to matching documents. All set
/// predicates must hold. An event matches when either its previous or
/// its current document does, so a change that moves a document out of
/// the filtered set still yields a final event.
#[derive(Debug, Clone, Default)]
pub struct WatchFilter {
    /// Matches `metadata.name`.
    pub id: Option<String>,
    pub namespace: Option<String>,
    pub selector: Option<Selector>,
}

impl WatchFilter {
    fn matches(&self, doc: &Value) -> bool {
        if let Some(id) = &self.id {
            if document::name_of(doc) != id {
                return false;
            }
        }
        if let Some(namespace) = &self.namespace {
            if document::namespace_of(doc) != namespace {
                return false;
            }
        }
        if let Some(selector) = &self.selector {
            if !selector.matches(&document::labels_of(doc)) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Resume strictly after this resource version. When unset, only
    /// events appended after subscription are streamed.
    pub resource_version: Option<String>,
    pub filter: WatchFilter,
}

/// An event delivered to a watch subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub object: Value,
}

/// Stream matching events from `log` into `sink` until the log closes,
/// the sink is dropped, or `cancel` fires. Cancellation is not an
/// error. Resuming from a resource version the ring no longer holds
/// fails TooOld.
pub async fn watch(
    log: &Log,
    options: WatchOptions,
    sink: mpsc::Sender<WatchEvent>,
    cancel: CancellationToken,
) -> Result<(), Error> {
    let mut reader = log.reader();

    match &options.resource_version {
        Some(rv) if !rv.is_empty() => {
            if !reader.rewind(rv) {
                tracing::debug!(resource_version = %rv, "watch resume is too old");
                return Err(Error::TooOld);
            }
        }
        _ => (),
    }

    while let Some(event) = reader.read(&cancel).await? {
        let matches = event
            .previous
            .as_ref()
            .is_some_and(|prev| options.filter.matches(prev))
            || options.filter.matches(&event.current);
        if !matches {
            continue;
        }

        let out = WatchEvent {
            kind: event.kind,
            object: event.current.clone(),
        };
        if sink.send(out).await.is_err() {
            // Subscriber went away.
            return Ok(());
        }
    }
    Ok(())
}
