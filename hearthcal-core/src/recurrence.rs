//! RRULE expansion for recurring events.
//!
//! Turns a master VEVENT into the start instants of its occurrences inside a
//! date range, honoring RDATE and EXDATE.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;
use tracing::warn;

use crate::date_range::DateRange;
use crate::error::EventError;
use crate::ics::{EventTime, VEvent};

/// Most occurrences one event may produce inside a range.
///
/// Only occurrences in the range count, however long ago DTSTART is.
pub const MAX_OCCURRENCES: u16 = 50_000;

/// Build an iCalendar-format recurrence set string for the rrule crate parser.
fn build_rrule_string(event: &VEvent, floating: Tz) -> String {
    let mut lines = Vec::new();

    lines.push(event.start.to_rrule_line("DTSTART", floating));

    match &event.rrule {
        Some(rrule) => lines.push(format!(
            "RRULE:{}",
            normalize_until(rrule, &event.start, floating)
        )),
        // DTSTART is always the first instance; the rrule crate only adds it via RRULE
        None => lines.push(event.start.to_rrule_line("RDATE", floating)),
    }

    for rdate in &event.rdates {
        lines.push(rdate.to_rrule_line("RDATE", floating));
    }

    for exdate in &event.exdates {
        lines.push(exdate.to_rrule_line("EXDATE", floating));
    }

    lines.join("\n")
}

/// Rewrite `UNTIL` as a UTC date-time.
///
/// Feeds commonly pair a zoned DTSTART with a floating or DATE-only UNTIL,
/// which the rrule crate rejects. DATE values mean "through the end of that
/// day" in the DTSTART zone.
fn normalize_until(rrule: &str, start: &EventTime, floating: Tz) -> String {
    let zone = start.zone(floating);

    rrule
        .split(';')
        .map(|part| {
            let Some((key, value)) = part.split_once('=') else {
                return part.to_string();
            };
            if !key.eq_ignore_ascii_case("UNTIL") || value.ends_with('Z') {
                return part.to_string();
            }

            let naive = if value.len() == 8 {
                NaiveDate::parse_from_str(value, "%Y%m%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(23, 59, 59))
            } else {
                NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()
            };

            match naive {
                Some(naive) => {
                    let utc = EventTime::DateTimeFloating(naive).to_utc(zone);
                    format!("{}={}", key, utc.format("%Y%m%dT%H%M%SZ"))
                }
                // Leave it for the rrule parser to report
                None => part.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Start instants of `event`'s occurrences that fall inside `range`.
///
/// Rules without an end only produce what the range can hold, up to
/// [`MAX_OCCURRENCES`].
pub fn occurrence_starts(
    event: &VEvent,
    range: &DateRange,
    floating: Tz,
) -> Result<Vec<DateTime<Utc>>, EventError> {
    let rrule_str = build_rrule_string(event, floating);

    let rrule_set: RRuleSet = rrule_str
        .parse()
        .map_err(|e: rrule::RRuleError| EventError::InvalidRule(e.to_string()))?;

    // Widen by a second so occurrences exactly on the bounds are kept
    let tz: rrule::Tz = Utc.into();
    let after = (range.from - Duration::seconds(1)).with_timezone(&tz);
    let before = (range.to + Duration::seconds(1)).with_timezone(&tz);

    let result = rrule_set.after(after).before(before).all(MAX_OCCURRENCES);
    if result.limited {
        warn!(
            uid = event.uid.as_deref().unwrap_or("-"),
            limit = MAX_OCCURRENCES,
            "Recurring event truncated"
        );
    }

    Ok(result
        .dates
        .into_iter()
        .map(|occurrence| occurrence.with_timezone(&Utc))
        .filter(|start| range.contains(*start))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn weekly(start: EventTime, rrule: &str) -> VEvent {
        VEvent {
            uid: Some("weekly@test".to_string()),
            summary: "Weekly".to_string(),
            description: None,
            start,
            end: None,
            duration: None,
            rrule: Some(rrule.to_string()),
            rdates: vec![],
            exdates: vec![],
            recurrence_id: None,
        }
    }

    fn june_2024_window() -> DateRange {
        DateRange::expansion_window(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_unbounded_rule_is_clipped_to_range() {
        let start = EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2020, 1, 6, 10, 0, 0).unwrap());
        let event = weekly(start, "FREQ=WEEKLY");
        let range = june_2024_window();

        let starts = occurrence_starts(&event, &range, Tz::UTC).unwrap();

        assert_eq!(starts.len(), 156);
        assert_eq!(starts[0], Utc.with_ymd_and_hms(2023, 6, 5, 10, 0, 0).unwrap());
        assert_eq!(
            *starts.last().unwrap(),
            Utc.with_ymd_and_hms(2026, 5, 25, 10, 0, 0).unwrap()
        );
        assert!(starts.iter().all(|s| range.contains(*s)));
    }

    #[test]
    fn test_exdates_are_removed() {
        let start = EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
        let mut event = weekly(start, "FREQ=WEEKLY;COUNT=4");
        event.exdates = vec![EventTime::DateTimeUtc(
            Utc.with_ymd_and_hms(2024, 1, 8, 10, 0, 0).unwrap(),
        )];

        let starts = occurrence_starts(&event, &june_2024_window(), Tz::UTC).unwrap();

        assert_eq!(
            starts,
            vec![
                Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 22, 10, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn test_zoned_rule_follows_dst() {
        let start = EventTime::DateTimeZoned {
            datetime: NaiveDateTime::parse_from_str("20240325T090000", "%Y%m%dT%H%M%S").unwrap(),
            tzid: "Europe/Amsterdam".to_string(),
        };
        let event = weekly(start, "FREQ=WEEKLY;COUNT=2");

        let starts = occurrence_starts(&event, &june_2024_window(), Tz::UTC).unwrap();

        // 09:00 CET, then 09:00 CEST after the March 31 switch
        assert_eq!(
            starts,
            vec![
                Utc.with_ymd_and_hms(2024, 3, 25, 8, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 4, 1, 7, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn test_date_only_until_is_inclusive() {
        let start = EventTime::DateTimeZoned {
            datetime: NaiveDateTime::parse_from_str("20240101T090000", "%Y%m%dT%H%M%S").unwrap(),
            tzid: "Europe/Amsterdam".to_string(),
        };
        let event = weekly(start, "FREQ=DAILY;UNTIL=20240110");

        let starts = occurrence_starts(&event, &june_2024_window(), Tz::UTC).unwrap();
        assert_eq!(starts.len(), 10);
    }

    #[test]
    fn test_normalize_until_leaves_utc_alone() {
        let start = EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());
        assert_eq!(
            normalize_until("FREQ=DAILY;UNTIL=20240110T090000Z", &start, Tz::UTC),
            "FREQ=DAILY;UNTIL=20240110T090000Z"
        );
        assert_eq!(
            normalize_until("FREQ=DAILY;UNTIL=20240110", &start, Tz::UTC),
            "FREQ=DAILY;UNTIL=20240110T235959Z"
        );
    }

    #[test]
    fn test_rdate_only_event_includes_dtstart() {
        let start = EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap());
        let mut event = weekly(start, "");
        event.rrule = None;
        event.rdates = vec![EventTime::DateTimeUtc(
            Utc.with_ymd_and_hms(2024, 2, 10, 12, 0, 0).unwrap(),
        )];

        let starts = occurrence_starts(&event, &june_2024_window(), Tz::UTC).unwrap();
        assert_eq!(starts.len(), 2);
    }

    #[test]
    fn test_high_frequency_rule_terminates() {
        let start = EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        let event = weekly(start, "FREQ=SECONDLY");

        let starts = occurrence_starts(&event, &june_2024_window(), Tz::UTC).unwrap();
        assert_eq!(starts.len(), usize::from(MAX_OCCURRENCES));
    }

    #[test]
    fn test_old_dtstart_does_not_eat_into_the_limit() {
        // Over 29,000 hourly instants fall before the window opens
        let start = EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        let event = weekly(start, "FREQ=HOURLY");
        let range = june_2024_window();

        let starts = occurrence_starts(&event, &range, Tz::UTC).unwrap();

        // 1,096 days of hours, both window ends included
        assert_eq!(starts.len(), 1_096 * 24 + 1);
        assert_eq!(starts[0], range.from);
        assert_eq!(*starts.last().unwrap(), range.to);
    }

    #[test]
    fn test_invalid_rule_is_reported() {
        let start = EventTime::DateTimeUtc(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        let event = weekly(start, "FREQ=SOMETIMES");

        let err = occurrence_starts(&event, &june_2024_window(), Tz::UTC).unwrap_err();
        assert!(matches!(err, EventError::InvalidRule(_)));
    }
}
