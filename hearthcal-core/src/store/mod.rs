//! Keyed-record storage for events and calendar sources.

mod local;

pub use local::LocalStore;

use crate::error::{StoreError, StoreResult};
use crate::event::{Event, EventId, NewEvent};
use crate::source::{CalendarSource, NewSource, SourceId, SourceKind};

/// One step of a [`Store::transaction`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    /// Fails the transaction unless the source exists
    RequireSource(SourceId),
    /// Events referencing a source need that source to exist
    InsertEvents(Vec<NewEvent>),
    /// Every event whose source reference equals the id
    DeleteEventsBySource(SourceId),
    InsertSource(NewSource),
    RenameSource { id: SourceId, name: String },
    DeleteSource(SourceId),
}

/// What a committed transaction did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    /// Ids assigned to inserted events, in insertion order
    pub event_ids: Vec<EventId>,
    pub source_ids: Vec<SourceId>,
    pub deleted_events: usize,
}

/// Event and source tables.
///
/// Identities are assigned here and nowhere else. A transaction either
/// applies every op or none, and readers never see a partial one.
pub trait Store: Send + Sync {
    fn transaction(&self, ops: Vec<StoreOp>) -> StoreResult<Applied>;

    /// All events ordered by start.
    fn events(&self) -> StoreResult<Vec<Event>>;
    fn event(&self, id: EventId) -> StoreResult<Option<Event>>;
    fn count_events(&self) -> StoreResult<usize>;
    fn events_for_source(&self, source_id: SourceId) -> StoreResult<Vec<Event>>;

    fn sources(&self, kind: Option<SourceKind>) -> StoreResult<Vec<CalendarSource>>;
    fn source(&self, id: SourceId) -> StoreResult<Option<CalendarSource>>;

    fn insert_events(&self, events: Vec<NewEvent>) -> StoreResult<Vec<EventId>> {
        Ok(self.transaction(vec![StoreOp::InsertEvents(events)])?.event_ids)
    }

    fn delete_events_by_source(&self, source_id: SourceId) -> StoreResult<usize> {
        Ok(self
            .transaction(vec![StoreOp::DeleteEventsBySource(source_id)])?
            .deleted_events)
    }

    fn add_source(&self, source: NewSource) -> StoreResult<CalendarSource> {
        let applied = self.transaction(vec![StoreOp::InsertSource(source)])?;
        let id = applied.source_ids.first().copied().unwrap_or_default();
        self.source(id)?.ok_or(StoreError::MissingSource(id))
    }

    fn rename_source(&self, id: SourceId, name: &str) -> StoreResult<()> {
        self.transaction(vec![StoreOp::RenameSource {
            id,
            name: name.to_string(),
        }])?;
        Ok(())
    }

    fn delete_source(&self, id: SourceId) -> StoreResult<()> {
        self.transaction(vec![StoreOp::DeleteSource(id)])?;
        Ok(())
    }
}
