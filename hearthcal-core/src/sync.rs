//! Refreshing one subscription: fetch, expand, and swap its events in the store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono_tz::Tz;
use tracing::{debug, info};

use crate::error::{StoreError, SyncError, SyncResult};
use crate::event::NewEvent;
use crate::expand::{ExpandedCalendar, Expander};
use crate::remote::Fetcher;
use crate::source::{CalendarSource, NewSource, SourceId, SourceKind};
use crate::store::{Store, StoreOp};

/// Marks a source as being synchronized until dropped.
struct InFlight<'a> {
    sources: &'a Mutex<HashSet<SourceId>>,
    id: SourceId,
}

impl<'a> InFlight<'a> {
    fn acquire(sources: &'a Mutex<HashSet<SourceId>>, id: SourceId) -> SyncResult<Self> {
        let mut set = sources.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(id) {
            return Err(SyncError::InProgress(id));
        }
        Ok(InFlight { sources, id })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

/// Runs synchronizations against one store.
pub struct Synchronizer<F, S> {
    fetcher: F,
    store: Arc<S>,
    floating_tz: Tz,
    in_flight: Mutex<HashSet<SourceId>>,
}

impl<F: Fetcher, S: Store> Synchronizer<F, S> {
    pub fn new(fetcher: F, store: Arc<S>) -> Self {
        Synchronizer {
            fetcher,
            store,
            floating_tz: Tz::UTC,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Zone applied to floating times and DATE values in feeds.
    pub fn with_floating_timezone(mut self, tz: Tz) -> Self {
        self.floating_tz = tz;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn floating_timezone(&self) -> Tz {
        self.floating_tz
    }

    #[cfg(test)]
    pub(crate) fn fetcher(&self) -> &F {
        &self.fetcher
    }

    fn expander(&self) -> Expander {
        Expander::current().with_floating_timezone(self.floating_tz)
    }

    /// Fetch and expand a feed without storing anything.
    pub async fn preview(&self, url: &str) -> SyncResult<ExpandedCalendar> {
        let content = self.fetcher.fetch(url).await?;
        self.expander().expand(&content)
    }

    /// Replace the stored events of `source` with a fresh expansion of its feed.
    ///
    /// Returns the feed's display name; persisting it is up to the caller.
    /// Fails with [`SyncError::SourceNotFound`] if the source was deleted
    /// while its feed was being fetched.
    pub async fn synchronize_one(&self, source: &CalendarSource) -> SyncResult<String> {
        if source.kind != SourceKind::Ical {
            return Err(SyncError::Configuration(format!(
                "Calendar source {} is a {} account, not an iCal feed",
                source.label(),
                source.kind
            )));
        }

        let (Some(id), Some(url)) = (source.id, source.url.as_deref()) else {
            return Err(SyncError::Configuration(format!(
                "Calendar source {} needs both an id and a URL to sync",
                source.label()
            )));
        };

        let _guard = InFlight::acquire(&self.in_flight, id)?;
        debug!(source_id = id, url, "Synchronizing calendar source");

        let content = self.fetcher.fetch(url).await?;
        let expanded = self.expander().expand(&content)?;

        let events: Vec<NewEvent> = expanded
            .events
            .into_iter()
            .map(|event| event.owned_by(source.member_id, id))
            .collect();
        let count = events.len();

        let mut ops = vec![StoreOp::RequireSource(id), StoreOp::DeleteEventsBySource(id)];
        if !events.is_empty() {
            ops.push(StoreOp::InsertEvents(events));
        }
        let applied = self.store.transaction(ops).map_err(|e| match e {
            StoreError::MissingSource(missing) => SyncError::SourceNotFound(missing),
            e => SyncError::Store(e),
        })?;

        info!(
            source_id = id,
            calendar = %expanded.name,
            events = count,
            removed = applied.deleted_events,
            skipped = expanded.skipped.len(),
            "Synchronized calendar source"
        );

        Ok(expanded.name)
    }

    /// Delete every event owned by the source. The source record stays.
    pub fn remove_occurrences_for_subscription(&self, id: SourceId) -> SyncResult<usize> {
        let removed = self.store.delete_events_by_source(id)?;
        debug!(source_id = id, removed, "Removed subscription events");
        Ok(removed)
    }

    /// Register a subscription and run its first synchronization.
    ///
    /// If that first sync fails the error is returned but the source stays
    /// registered, to be retried by the scheduler.
    pub async fn add_subscription(&self, new_source: NewSource) -> SyncResult<CalendarSource> {
        let mut source = self.store.add_source(new_source)?;
        info!(source = %source, kind = %source.kind, "Added calendar source");

        if source.kind != SourceKind::Ical {
            return Ok(source);
        }

        let name = self.synchronize_one(&source).await?;
        if let Some(id) = source.id {
            self.store.rename_source(id, &name)?;
        }
        source.name = Some(name);

        Ok(source)
    }

    /// Remove a subscription and its events in one transaction.
    pub fn delete_subscription(&self, id: SourceId) -> SyncResult<usize> {
        if self.store.source(id)?.is_none() {
            return Err(SyncError::SourceNotFound(id));
        }

        let _guard = InFlight::acquire(&self.in_flight, id)?;
        let applied = self.store.transaction(vec![
            StoreOp::DeleteEventsBySource(id),
            StoreOp::DeleteSource(id),
        ])?;

        info!(source_id = id, removed = applied.deleted_events, "Deleted calendar source");
        Ok(applied.deleted_events)
    }
}
