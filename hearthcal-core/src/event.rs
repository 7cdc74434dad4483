//! Calendar occurrence records.
//!
//! A `ParsedEvent` is what the expander produces from a feed. The synchronizer
//! stamps it with ownership to get a `NewEvent`, and the store turns that into
//! an `Event` by assigning an id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::{MemberId, SourceId};

/// Store-assigned identity of an event.
pub type EventId = u64;

/// One concrete occurrence parsed out of a feed, not yet owned by anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEvent {
    pub title: String,
    /// Empty when the VEVENT has no DESCRIPTION
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// True when DTSTART is a DATE without a time of day
    pub is_all_day: bool,
}

impl ParsedEvent {
    /// Attach ownership for storage under a subscription.
    pub fn owned_by(self, member_id: MemberId, source_id: SourceId) -> NewEvent {
        NewEvent {
            title: self.title,
            description: Some(self.description),
            start: self.start,
            end: self.end,
            is_all_day: self.is_all_day,
            member_id: Some(member_id),
            source_id: Some(source_id),
        }
    }
}

/// An event ready to be inserted; the store assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_all_day: bool,
    pub member_id: Option<MemberId>,
    /// None for locally created events
    pub source_id: Option<SourceId>,
}

impl NewEvent {
    pub(crate) fn with_id(self, id: EventId) -> Event {
        Event {
            id,
            title: self.title,
            description: self.description,
            start: self.start,
            end: self.end,
            is_all_day: self.is_all_day,
            member_id: self.member_id,
            source_id: self.source_id,
        }
    }
}

/// A stored event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_all_day: bool,
    pub member_id: Option<MemberId>,
    pub source_id: Option<SourceId>,
}

impl Event {
    pub fn is_owned_by(&self, source_id: SourceId) -> bool {
        self.source_id == Some(source_id)
    }

    /// Same occurrence content, ignoring the store-assigned id.
    pub fn same_content(&self, other: &Event) -> bool {
        self.title == other.title
            && self.description == other.description
            && self.start == other.start
            && self.end == other.end
            && self.is_all_day == other.is_all_day
            && self.member_id == other.member_id
            && self.source_id == other.source_id
    }
}
