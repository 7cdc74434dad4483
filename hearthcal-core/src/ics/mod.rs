//! ICS document parsing.
//!
//! This module handles reading feed text according to RFC 5545.

mod parse;
mod time;

pub use parse::{
    CalendarDocument, MalformedEvent, UNNAMED_CALENDAR, VEvent, parse_calendar, unescape_text,
};
pub use time::{EventTime, resolve_tzid};
