//! Core of the hearthcal household calendar: iCal subscription sync.
//!
//! The pipeline runs one direction:
//! - `remote` fetches feed text through a CORS relay and sanity-checks it
//! - `ics` parses the text into owned VEVENT descriptions
//! - `expand` + `recurrence` turn those into concrete occurrences inside a `date_range` window
//! - `sync` swaps a source's occurrences in the `store` in one transaction
//! - `scheduler` repeats that for every subscription on a timer

pub mod config;
pub mod date_range;
pub mod error;
pub mod event;
pub mod expand;
pub mod ics;
pub mod recurrence;
pub mod remote;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use error::{FailureKind, SyncError, SyncResult};
pub use event::{Event, EventId, NewEvent, ParsedEvent};
pub use expand::{ExpandedCalendar, Expander, SkippedEvent};
pub use remote::{Fetcher, ProxyFetcher};
pub use scheduler::{SchedulerHandle, SourceFailure, SyncReport, SyncScheduler};
pub use source::{CalendarSource, MemberId, NewSource, SourceId, SourceKind};
pub use store::{Applied, LocalStore, Store, StoreOp};
pub use sync::Synchronizer;
