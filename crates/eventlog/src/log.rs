use super::Error;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Number of events a log retains by default.
pub const DEFAULT_KEEP_COUNT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
}

/// One committed mutation, as observed by watchers.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    /// The displaced document. None for Added.
    pub previous: Option<Value>,
    pub current: Value,
    pub resource_version: String,
}

#[derive(Default)]
struct State {
    events: VecDeque<Arc<Event>>,
    // Sequence number of events.front(); grows as the ring discards.
    first_seq: u64,
    next_seq: u64,
    latest_rv: String,
    closed: bool,
}

/// Log is a bounded in-memory ring buffer of one GVK's mutation
/// events. Appends happen in commit order; the oldest events are
/// discarded on overflow. Readers hold independent cursors and may
/// resume from a resource version still held by the ring.
#[derive(Clone)]
pub struct Log {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    notify: Notify,
    capacity: usize,
}

impl Log {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Append an event, discarding the oldest if the ring is full, and
    /// record its resource version as the latest.
    pub fn append(&self, event: Event) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.closed {
                return;
            }
            state.latest_rv = event.resource_version.clone();
            state.events.push_back(Arc::new(event));
            state.next_seq += 1;
            if state.events.len() > self.inner.capacity {
                state.events.pop_front();
                state.first_seq += 1;
            }
        }
        self.inner.notify.notify_waiters();
    }

    pub fn latest_resource_version(&self) -> String {
        self.inner.state.lock().unwrap().latest_rv.clone()
    }

    /// Record a resource version observed outside the event stream
    /// (bulk replace, source bookmarks).
    pub fn set_latest_resource_version(&self, rv: &str) {
        self.inner.state.lock().unwrap().latest_rv = rv.to_string();
    }

    /// Close the log: readers drain what remains and then observe
    /// end-of-stream.
    pub fn close(&self) {
        self.inner.state.lock().unwrap().closed = true;
        self.inner.notify.notify_waiters();
    }

    /// A cursor positioned after the most recent event: it observes
    /// only events appended from now on.
    pub fn reader(&self) -> Reader {
        let state = self.inner.state.lock().unwrap();
        Reader {
            inner: self.inner.clone(),
            next: state.next_seq,
        }
    }
}

/// Reader is one subscriber's cursor over the Log.
pub struct Reader {
    inner: Arc<Inner>,
    next: u64,
}

impl Reader {
    /// Position this cursor just after the retained event carrying
    /// `resource_version`, so subsequent reads observe strictly newer
    /// events. Returns false when no retained event matches; the
    /// caller surfaces that as a too-old resume.
    pub fn rewind(&mut self, resource_version: &str) -> bool {
        let state = self.inner.state.lock().unwrap();
        for (i, event) in state.events.iter().enumerate() {
            if event.resource_version == resource_version {
                self.next = state.first_seq + i as u64 + 1;
                return true;
            }
        }
        false
    }

    /// The next event, waiting for one to be appended if needed.
    /// Returns None once the log is closed and drained, or when
    /// `cancel` fires. Fails TooOld when the ring discarded events this
    /// cursor had not yet observed.
    pub async fn read(&mut self, cancel: &CancellationToken) -> Result<Option<Arc<Event>>, Error> {
        loop {
            // Register for wakeup before inspecting state, so an append
            // racing the inspection is not missed.
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.inner.state.lock().unwrap();
                if self.next < state.first_seq {
                    return Err(Error::TooOld);
                }
                let index = (self.next - state.first_seq) as usize;
                if let Some(event) = state.events.get(index) {
                    self.next += 1;
                    return Ok(Some(event.clone()));
                }
                if state.closed {
                    return Ok(None);
                }
            }

            tokio::select! {
                () = notified => {}
                () = cancel.cancelled() => return Ok(None),
            }
        }
    }
}
