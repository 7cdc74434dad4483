//! Table store kept in memory, optionally persisted to a JSON file.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Applied, Store, StoreOp};
use crate::error::{StoreError, StoreResult};
use crate::event::{Event, EventId};
use crate::source::{CalendarSource, SourceId, SourceKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tables {
    events: BTreeMap<EventId, Event>,
    sources: BTreeMap<SourceId, CalendarSource>,
    next_event_id: EventId,
    next_source_id: SourceId,
}

impl Default for Tables {
    fn default() -> Self {
        Tables {
            events: BTreeMap::new(),
            sources: BTreeMap::new(),
            next_event_id: 1,
            next_source_id: 1,
        }
    }
}

impl Tables {
    fn apply(&mut self, op: StoreOp, applied: &mut Applied) -> StoreResult<()> {
        match op {
            StoreOp::RequireSource(id) => {
                self.require_source(id)?;
            }
            StoreOp::InsertEvents(events) => {
                for source_id in events.iter().filter_map(|event| event.source_id) {
                    self.require_source(source_id)?;
                }
                for event in events {
                    let id = self.next_event_id;
                    self.next_event_id += 1;
                    self.events.insert(id, event.with_id(id));
                    applied.event_ids.push(id);
                }
            }
            StoreOp::DeleteEventsBySource(source_id) => {
                let before = self.events.len();
                self.events.retain(|_, event| !event.is_owned_by(source_id));
                applied.deleted_events += before - self.events.len();
            }
            StoreOp::InsertSource(source) => {
                let id = self.next_source_id;
                self.next_source_id += 1;
                self.sources.insert(id, source.into_source(id));
                applied.source_ids.push(id);
            }
            StoreOp::RenameSource { id, name } => {
                let source = self
                    .sources
                    .get_mut(&id)
                    .ok_or(StoreError::MissingSource(id))?;
                source.name = Some(name);
            }
            StoreOp::DeleteSource(id) => {
                self.sources
                    .remove(&id)
                    .ok_or(StoreError::MissingSource(id))?;
            }
        }
        Ok(())
    }

    fn require_source(&self, id: SourceId) -> StoreResult<()> {
        if self.sources.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::MissingSource(id))
        }
    }
}

/// Advisory lock on `<store>.lock`, released when dropped.
struct FileLock {
    _file: File,
}

impl FileLock {
    fn acquire(store_path: &Path, exclusive: bool) -> StoreResult<Self> {
        if let Some(parent) = store_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut lock_path = store_path.as_os_str().to_owned();
        lock_path.push(".lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(PathBuf::from(lock_path))?;

        if exclusive {
            FileExt::lock_exclusive(&file)?;
        } else {
            FileExt::lock_shared(&file)?;
        }
        Ok(FileLock { _file: file })
    }
}

fn load(path: &Path) -> StoreResult<Tables> {
    if !path.exists() {
        return Ok(Tables::default());
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// [`Store`] over in-memory tables behind an `RwLock`.
///
/// Transactions run against a staged copy of the tables while holding the
/// write lock. The copy is written to disk (when file-backed) and only then
/// replaces the live tables, so a failed op or a failed write changes nothing.
///
/// A file-backed store may be shared with other processes. Every transaction
/// takes an exclusive lock on a sibling `.lock` file and stages from what is
/// on disk, and every read reloads the file under a shared lock.
#[derive(Debug, Default)]
pub struct LocalStore {
    tables: RwLock<Tables>,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the store at `path`, or start empty if the file doesn't exist yet.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let tables = {
            let _lock = FileLock::acquire(&path, false)?;
            load(&path)?
        };

        Ok(LocalStore {
            tables: RwLock::new(tables),
            path: Some(path),
        })
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        if let Some(path) = &self.path {
            // The file lock is released before the table lock is taken
            let fresh = {
                let _lock = FileLock::acquire(path, false)?;
                load(path)?
            };
            *self.tables.write().map_err(|_| StoreError::Poisoned)? = fresh;
        }
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }

    fn persist(path: &Path, tables: &Tables) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(tables)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, path)?;
        Ok(())
    }
}

impl Store for LocalStore {
    fn transaction(&self, ops: Vec<StoreOp>) -> StoreResult<Applied> {
        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;

        let _lock = match &self.path {
            Some(path) => Some(FileLock::acquire(path, true)?),
            None => None,
        };
        let mut staged = match &self.path {
            Some(path) => load(path)?,
            None => tables.clone(),
        };

        let mut applied = Applied::default();
        for op in ops {
            staged.apply(op, &mut applied)?;
        }

        if let Some(path) = &self.path {
            Self::persist(path, &staged)?;
        }
        *tables = staged;

        debug!(
            inserted = applied.event_ids.len(),
            deleted = applied.deleted_events,
            "Committed store transaction"
        );
        Ok(applied)
    }

    fn events(&self) -> StoreResult<Vec<Event>> {
        let mut events: Vec<Event> = self.read()?.events.values().cloned().collect();
        events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        Ok(events)
    }

    fn event(&self, id: EventId) -> StoreResult<Option<Event>> {
        Ok(self.read()?.events.get(&id).cloned())
    }

    fn count_events(&self) -> StoreResult<usize> {
        Ok(self.read()?.events.len())
    }

    fn events_for_source(&self, source_id: SourceId) -> StoreResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .read()?
            .events
            .values()
            .filter(|event| event.is_owned_by(source_id))
            .cloned()
            .collect();
        events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        Ok(events)
    }

    fn sources(&self, kind: Option<SourceKind>) -> StoreResult<Vec<CalendarSource>> {
        Ok(self
            .read()?
            .sources
            .values()
            .filter(|source| kind.is_none_or(|kind| source.kind == kind))
            .cloned()
            .collect())
    }

    fn source(&self, id: SourceId) -> StoreResult<Option<CalendarSource>> {
        Ok(self.read()?.sources.get(&id).cloned())
    }
}
