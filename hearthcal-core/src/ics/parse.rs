//! Calendar document parsing using the icalendar crate's parser.

use chrono::Duration;
use icalendar::{
    DatePerhapsTime,
    parser::{Component, Property, read_calendar, unfold},
};

use crate::error::{EventError, SyncError, SyncResult};
use crate::ics::time::EventTime;

/// Used when a feed carries no X-WR-CALNAME.
pub const UNNAMED_CALENDAR: &str = "Unnamed Calendar";

/// A parsed feed: its display name and every VEVENT, each either readable or not.
#[derive(Debug)]
pub struct CalendarDocument {
    pub name: String,
    pub events: Vec<Result<VEvent, MalformedEvent>>,
}

/// An owned, validated VEVENT.
#[derive(Debug, Clone, PartialEq)]
pub struct VEvent {
    pub uid: Option<String>,
    pub summary: String,
    pub description: Option<String>,
    pub start: EventTime,
    pub end: Option<EventTime>,
    pub duration: Option<Duration>,
    pub rrule: Option<String>,
    pub rdates: Vec<EventTime>,
    pub exdates: Vec<EventTime>,
    pub recurrence_id: Option<EventTime>,
}

impl VEvent {
    pub fn is_recurring(&self) -> bool {
        self.rrule.is_some() || !self.rdates.is_empty()
    }
}

/// A VEVENT that could not be read, with whatever identified it.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedEvent {
    pub uid: Option<String>,
    pub summary: Option<String>,
    pub error: EventError,
}

/// Parse feed text into a [`CalendarDocument`].
///
/// Fails only when the document as a whole is unusable; individual broken
/// VEVENTs come back as `Err` entries in `events`.
pub fn parse_calendar(content: &str) -> SyncResult<CalendarDocument> {
    let unfolded = unfold(content);
    check_component_nesting(&unfolded)?;

    let calendar = read_calendar(&unfolded).map_err(|e| SyncError::Parse(e.to_string()))?;

    let name = calendar_name(&calendar.properties)
        .or_else(|| {
            calendar
                .components
                .iter()
                .filter(|c| c.name == "VCALENDAR")
                .find_map(|c| calendar_name(&c.properties))
        })
        .unwrap_or_else(|| UNNAMED_CALENDAR.to_string());

    let mut vevents = Vec::new();
    collect_vevents(&calendar.components, &mut vevents);

    let events = vevents.into_iter().map(read_vevent).collect();

    Ok(CalendarDocument { name, events })
}

fn calendar_name(properties: &[Property]) -> Option<String> {
    properties
        .iter()
        .find(|p| p.name == "X-WR-CALNAME")
        .map(|p| unescape_text(p.val.as_ref()).trim().to_string())
        .filter(|name| !name.is_empty())
}

/// VEVENTs either sit at the top level (when the parser unwrapped the
/// VCALENDAR root) or below a VCALENDAR component.
fn collect_vevents<'c, 'a>(components: &'c [Component<'a>], out: &mut Vec<&'c Component<'a>>) {
    for component in components {
        if component.name == "VEVENT" {
            out.push(component);
        } else if component.name == "VCALENDAR" {
            collect_vevents(&component.components, out);
        }
    }
}

/// Reject documents whose BEGIN/END markers don't pair up.
///
/// The parser is lenient about trailing garbage, so a truncated download
/// would otherwise look like a smaller calendar.
fn check_component_nesting(unfolded: &str) -> SyncResult<()> {
    let mut stack: Vec<String> = Vec::new();

    for line in unfolded.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(name) = strip_prefix_ignore_case(line, "BEGIN:") {
            stack.push(name.trim().to_ascii_uppercase());
        } else if let Some(name) = strip_prefix_ignore_case(line, "END:") {
            let name = name.trim().to_ascii_uppercase();
            match stack.pop() {
                Some(open) if open == name => {}
                Some(open) => {
                    return Err(SyncError::Parse(format!(
                        "END:{} does not close BEGIN:{}",
                        name, open
                    )));
                }
                None => {
                    return Err(SyncError::Parse(format!("END:{} without BEGIN", name)));
                }
            }
        }
    }

    match stack.pop() {
        Some(open) => Err(SyncError::Parse(format!("BEGIN:{} is never closed", open))),
        None => Ok(()),
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &line[prefix.len()..])
}

fn read_vevent(vevent: &Component) -> Result<VEvent, MalformedEvent> {
    let uid = vevent.find_prop("UID").map(|p| p.val.to_string());
    let summary = vevent
        .find_prop("SUMMARY")
        .map(|p| unescape_text(p.val.as_ref()));

    parse_vevent_fields(vevent, uid.clone(), summary.clone()).map_err(|error| MalformedEvent {
        uid,
        summary,
        error,
    })
}

fn parse_vevent_fields(
    vevent: &Component,
    uid: Option<String>,
    summary: Option<String>,
) -> Result<VEvent, EventError> {
    // Required fields
    let summary = summary.ok_or(EventError::MissingSummary)?;
    let start = parse_time(vevent.find_prop("DTSTART").ok_or(EventError::MissingStart)?)?;

    let end = vevent.find_prop("DTEND").map(parse_time).transpose()?;
    let duration = vevent
        .find_prop("DURATION")
        .map(|p| parse_duration(p.val.as_ref()))
        .transpose()?;

    let description = vevent
        .find_prop("DESCRIPTION")
        .map(|p| unescape_text(p.val.as_ref()));

    // Recurrence (RRULE, RDATE, EXDATE, RECURRENCE-ID)
    let rrule = vevent
        .find_prop("RRULE")
        .map(|p| p.val.as_ref().trim().to_string())
        .filter(|r| !r.is_empty());
    let rdates = parse_time_list(vevent, "RDATE")?;
    let exdates = parse_time_list(vevent, "EXDATE")?;
    let recurrence_id = vevent
        .find_prop("RECURRENCE-ID")
        .map(parse_time)
        .transpose()?;

    Ok(VEvent {
        uid,
        summary,
        description,
        start,
        end,
        duration,
        rrule,
        rdates,
        exdates,
        recurrence_id,
    })
}

fn parse_time(prop: &Property) -> Result<EventTime, EventError> {
    DatePerhapsTime::try_from(prop)
        .map(EventTime::from)
        .map_err(|_| EventError::InvalidValue {
            property: property_label(prop),
            value: prop.val.to_string(),
        })
}

fn property_label(prop: &Property) -> &'static str {
    match prop.name.as_ref() {
        "DTSTART" => "DTSTART",
        "DTEND" => "DTEND",
        "RECURRENCE-ID" => "RECURRENCE-ID",
        "RDATE" => "RDATE",
        "EXDATE" => "EXDATE",
        _ => "date-time",
    }
}

/// Parse every RDATE/EXDATE property into a flat list of values.
///
/// Handles:
/// - TZID parameter: `EXDATE;TZID=America/New_York:20240108T100000`
/// - VALUE=DATE: `EXDATE;VALUE=DATE:20240108`
/// - UTC: `EXDATE:20240108T100000Z`
/// - Floating: `EXDATE:20240108T100000`
/// - Comma-separated values: `EXDATE;TZID=...:20240108T100000,20240115T100000`
fn parse_time_list(vevent: &Component, name: &'static str) -> Result<Vec<EventTime>, EventError> {
    let mut times = Vec::new();

    for prop in vevent.properties.iter().filter(|p| p.name == name) {
        // RDATE;VALUE=PERIOD is not expanded
        if param(prop, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("PERIOD")) {
            continue;
        }

        let tzid = param(prop, "TZID");
        let is_date = param(prop, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE"));

        for raw in prop.val.as_ref().split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let time = parse_time_value(raw, tzid.as_deref(), is_date).ok_or_else(|| {
                EventError::InvalidValue {
                    property: name,
                    value: raw.to_string(),
                }
            })?;
            times.push(time);
        }
    }

    Ok(times)
}

fn param(prop: &Property, key: &str) -> Option<String> {
    prop.params
        .iter()
        .find(|p| p.key.as_ref().eq_ignore_ascii_case(key))
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()))
}

fn parse_time_value(s: &str, tzid: Option<&str>, is_date: bool) -> Option<EventTime> {
    if is_date || s.len() == 8 {
        return chrono::NaiveDate::parse_from_str(s, "%Y%m%d")
            .ok()
            .map(EventTime::Date);
    }

    if let Some(utc) = s.strip_suffix('Z') {
        return chrono::NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
            .ok()
            .map(|dt| EventTime::DateTimeUtc(dt.and_utc()));
    }

    let naive = chrono::NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S").ok()?;
    Some(match tzid {
        Some(tz) => EventTime::DateTimeZoned {
            datetime: naive,
            tzid: tz.to_string(),
        },
        None => EventTime::DateTimeFloating(naive),
    })
}

/// Parse a DURATION value (`PT30M`, `P1D`, `-PT15M`).
fn parse_duration(value: &str) -> Result<Duration, EventError> {
    let invalid = || EventError::InvalidValue {
        property: "DURATION",
        value: value.to_string(),
    };

    let trimmed = value.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.trim_start_matches('+')),
    };

    let duration = iso8601::duration(unsigned).map_err(|_| invalid())?;
    let std_duration: std::time::Duration = duration.into();
    let duration = Duration::from_std(std_duration).map_err(|_| invalid())?;

    Ok(if negative { -duration } else { duration })
}

/// Undo RFC 5545 TEXT escaping (`\n`, `\,`, `\;`, `\\`).
pub fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    const WORK: &str = "BEGIN:VCALENDAR\r\nX-WR-CALNAME:Work\r\nBEGIN:VEVENT\r\nSUMMARY:Standup\r\nDTSTART:20240101T090000Z\r\nDTEND:20240101T093000Z\r\nEND:VEVENT\r\nEND:VCALENDAR";

    #[test]
    fn test_parse_name_and_single_event() {
        let doc = parse_calendar(WORK).expect("Should parse");

        assert_eq!(doc.name, "Work");
        assert_eq!(doc.events.len(), 1);

        let event = doc.events[0].as_ref().expect("Event should be valid");
        assert_eq!(event.summary, "Standup");
        assert_eq!(
            event.start,
            EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap())
        );
        assert_eq!(
            event.end,
            Some(EventTime::DateTimeUtc(
                Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap()
            ))
        );
        assert!(!event.is_recurring());
    }

    #[test]
    fn test_missing_calendar_name_defaults() {
        let ics = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nEND:VCALENDAR";
        let doc = parse_calendar(ics).expect("Should parse");

        assert_eq!(doc.name, UNNAMED_CALENDAR);
        assert!(doc.events.is_empty());
    }

    #[test]
    fn test_missing_summary_is_malformed_not_fatal() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
BEGIN:VEVENT
UID:no-title
DTSTART:20240101T100000Z
END:VEVENT
BEGIN:VEVENT
UID:ok
SUMMARY:Fine
DTSTART:20240102T100000Z
END:VEVENT
END:VCALENDAR"#;

        let doc = parse_calendar(ics).expect("Should parse");
        assert_eq!(doc.events.len(), 2);

        let broken = doc.events[0].as_ref().expect_err("First event lacks SUMMARY");
        assert_eq!(broken.uid.as_deref(), Some("no-title"));
        assert_eq!(broken.error, EventError::MissingSummary);
        assert!(doc.events[1].is_ok());
    }

    #[test]
    fn test_unbalanced_components_fail_the_document() {
        let ics = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nSUMMARY:Cut off\r\nEND:VCALENDAR";

        let err = parse_calendar(ics).expect_err("Should reject");
        assert!(matches!(err, SyncError::Parse(_)));
    }

    #[test]
    fn test_unclosed_calendar_fails_the_document() {
        let ics = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nSUMMARY:x\r\nDTSTART:20240101T100000Z\r\nEND:VEVENT\r\n";

        assert!(matches!(parse_calendar(ics), Err(SyncError::Parse(_))));
    }

    #[test]
    fn test_parse_exdate_forms() {
        let ics = r#"BEGIN:VCALENDAR
VERSION:2.0
BEGIN:VEVENT
UID:test-123
SUMMARY:Recurring Event
DTSTART:20240101T100000Z
DTEND:20240101T110000Z
RRULE:FREQ=WEEKLY;BYDAY=MO
EXDATE;TZID=America/New_York:20240108T100000,20240115T100000
EXDATE;VALUE=DATE:20240122
EXDATE:20240129T100000Z
END:VEVENT
END:VCALENDAR"#;

        let doc = parse_calendar(ics).expect("Should parse");
        let event = doc.events[0].as_ref().expect("Should be valid");

        assert_eq!(event.rrule.as_deref(), Some("FREQ=WEEKLY;BYDAY=MO"));
        assert_eq!(event.exdates.len(), 4);
        for exdate in &event.exdates[..2] {
            match exdate {
                EventTime::DateTimeZoned { tzid, .. } => assert_eq!(tzid, "America/New_York"),
                other => panic!("Expected DateTimeZoned, got {:?}", other),
            }
        }
        assert_eq!(
            event.exdates[2],
            EventTime::Date(NaiveDate::from_ymd_opt(2024, 1, 22).unwrap())
        );
        assert!(matches!(event.exdates[3], EventTime::DateTimeUtc(_)));
    }

    #[test]
    fn test_invalid_exdate_marks_event_malformed() {
        let ics = r#"BEGIN:VCALENDAR
BEGIN:VEVENT
SUMMARY:Broken
DTSTART:20240101T100000Z
RRULE:FREQ=DAILY
EXDATE:notadate
END:VEVENT
END:VCALENDAR"#;

        let doc = parse_calendar(ics).expect("Should parse");
        let broken = doc.events[0].as_ref().expect_err("Should be malformed");
        assert!(matches!(
            broken.error,
            EventError::InvalidValue { property: "EXDATE", .. }
        ));
    }

    #[test]
    fn test_text_unescaping_and_line_folding() {
        let ics = "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\n\
SUMMARY:Dinner\\, drinks\r\n\
DTSTART:20240101T180000Z\r\n\
DESCRIPTION:Bring \r\n snacks\\nand games\r\n\
END:VEVENT\r\n\
END:VCALENDAR";

        let doc = parse_calendar(ics).expect("Should parse");
        let event = doc.events[0].as_ref().expect("Should be valid");

        assert_eq!(event.summary, "Dinner, drinks");
        assert_eq!(event.description.as_deref(), Some("Bring snacks\nand games"));
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(parse_duration("PT30M").unwrap(), Duration::minutes(30));
        assert_eq!(parse_duration("P1D").unwrap(), Duration::days(1));
        assert_eq!(parse_duration("-PT15M").unwrap(), Duration::minutes(-15));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_all_day_date_value() {
        let ics = r#"BEGIN:VCALENDAR
BEGIN:VEVENT
SUMMARY:Holiday
DTSTART;VALUE=DATE:20240704
END:VEVENT
END:VCALENDAR"#;

        let doc = parse_calendar(ics).expect("Should parse");
        let event = doc.events[0].as_ref().expect("Should be valid");
        assert!(event.start.is_date());
        assert_eq!(event.end, None);
    }
}
