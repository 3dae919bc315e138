mod log;
mod watch;

pub use log::{Event, EventKind, Log, Reader, DEFAULT_KEEP_COUNT};
pub use watch::{watch, WatchEvent, WatchFilter, WatchOptions};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("requested resource version is too old to resume from")]
    TooOld,
}
