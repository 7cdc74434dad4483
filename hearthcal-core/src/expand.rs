//! Feed text → sorted list of concrete occurrences.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, warn};

use crate::date_range::DateRange;
use crate::error::{EventError, SyncResult};
use crate::event::ParsedEvent;
use crate::ics::{CalendarDocument, MalformedEvent, VEvent, parse_calendar};
use crate::recurrence::occurrence_starts;

/// A VEVENT that was dropped instead of failing the whole feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEvent {
    pub uid: Option<String>,
    pub summary: Option<String>,
    pub reason: String,
}

impl SkippedEvent {
    fn new(event: &VEvent, reason: EventError) -> Self {
        SkippedEvent {
            uid: event.uid.clone(),
            summary: Some(event.summary.clone()),
            reason: reason.to_string(),
        }
    }
}

impl From<MalformedEvent> for SkippedEvent {
    fn from(malformed: MalformedEvent) -> Self {
        SkippedEvent {
            uid: malformed.uid,
            summary: malformed.summary,
            reason: malformed.error.to_string(),
        }
    }
}

/// Result of expanding one feed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpandedCalendar {
    /// X-WR-CALNAME, or "Unnamed Calendar"
    pub name: String,
    /// Ascending by start
    pub events: Vec<ParsedEvent>,
    pub skipped: Vec<SkippedEvent>,
}

/// Expands feed text into occurrences inside a fixed window.
#[derive(Debug, Clone, Copy)]
pub struct Expander {
    window: DateRange,
    floating_tz: Tz,
}

impl Expander {
    pub fn new(window: DateRange) -> Self {
        Expander {
            window,
            floating_tz: Tz::UTC,
        }
    }

    /// Expander for the window anchored at the current instant.
    pub fn current() -> Self {
        Self::new(DateRange::current())
    }

    /// Zone for floating times, DATE values and unrecognized TZIDs.
    pub fn with_floating_timezone(mut self, tz: Tz) -> Self {
        self.floating_tz = tz;
        self
    }

    /// Parse `content` and expand every event into the window.
    ///
    /// Fails only if the document itself can't be parsed. Malformed events are
    /// logged and reported in `skipped`.
    pub fn expand(&self, content: &str) -> SyncResult<ExpandedCalendar> {
        let CalendarDocument { name, events } = parse_calendar(content)?;
        let overridden = self.overridden_instances(&events);

        let mut expanded = events.into_iter().fold(
            ExpandedCalendar {
                name,
                ..Default::default()
            },
            |mut acc, item| {
                let result = item.map_err(SkippedEvent::from).and_then(|event| {
                    self.occurrences(&event, &overridden)
                        .map_err(|e| SkippedEvent::new(&event, e))
                });

                match result {
                    Ok(occurrences) => acc.events.extend(occurrences),
                    Err(skipped) => {
                        warn!(
                            uid = skipped.uid.as_deref().unwrap_or("-"),
                            summary = skipped.summary.as_deref().unwrap_or("-"),
                            reason = %skipped.reason,
                            "Skipping malformed iCal event"
                        );
                        acc.skipped.push(skipped);
                    }
                }
                acc
            },
        );

        // Equal starts are ordered by title, then end
        expanded.events.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.end.cmp(&b.end))
        });

        debug!(
            calendar = %expanded.name,
            events = expanded.events.len(),
            skipped = expanded.skipped.len(),
            "Expanded calendar"
        );

        Ok(expanded)
    }

    /// (UID, instant) pairs replaced by a RECURRENCE-ID override elsewhere in the feed.
    fn overridden_instances(
        &self,
        events: &[Result<VEvent, MalformedEvent>],
    ) -> HashSet<(String, DateTime<Utc>)> {
        events
            .iter()
            .filter_map(|item| item.as_ref().ok())
            .filter_map(|event| {
                let uid = event.uid.clone()?;
                let recurrence_id = event.recurrence_id.as_ref()?;
                Some((uid, recurrence_id.to_utc(self.floating_tz)))
            })
            .collect()
    }

    fn occurrences(
        &self,
        event: &VEvent,
        overridden: &HashSet<(String, DateTime<Utc>)>,
    ) -> Result<Vec<ParsedEvent>, EventError> {
        let start = event.start.to_utc(self.floating_tz);
        let end = self.resolve_end(event, start);

        if !event.is_recurring() {
            if !self.window.overlaps(start, end) {
                return Ok(Vec::new());
            }
            return Ok(vec![self.occurrence(event, start, end)]);
        }

        let duration = end - start;
        let starts = occurrence_starts(event, &self.window, self.floating_tz)?;

        Ok(starts
            .into_iter()
            .filter(|instant| match &event.uid {
                Some(uid) => !overridden.contains(&(uid.clone(), *instant)),
                None => true,
            })
            .map(|instant| self.occurrence(event, instant, instant + duration))
            .collect())
    }

    /// DTEND, else DTSTART + DURATION, else one day for DATE events, else DTSTART.
    fn resolve_end(&self, event: &VEvent, start: DateTime<Utc>) -> DateTime<Utc> {
        let end = match (&event.end, event.duration) {
            (Some(end), _) => end.to_utc(self.floating_tz),
            (None, Some(duration)) => start + duration,
            (None, None) if event.start.is_date() => start + Duration::days(1),
            (None, None) => start,
        };
        end.max(start)
    }

    fn occurrence(&self, event: &VEvent, start: DateTime<Utc>, end: DateTime<Utc>) -> ParsedEvent {
        ParsedEvent {
            title: event.summary.clone(),
            description: event.description.clone().unwrap_or_default(),
            start,
            end,
            is_all_day: event.start.is_date(),
        }
    }
}
