//! Date/time values as they appear in a feed, and their resolution to UTC.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{CalendarDateTime, DatePerhapsTime};

/// A DTSTART/DTEND/EXDATE/RDATE/RECURRENCE-ID value, with its timezone form preserved.
#[derive(Debug, Clone, PartialEq)]
pub enum EventTime {
    Date(NaiveDate),
    DateTimeUtc(DateTime<Utc>),
    DateTimeFloating(NaiveDateTime),
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
}

impl From<DatePerhapsTime> for EventTime {
    fn from(dpt: DatePerhapsTime) -> Self {
        match dpt {
            DatePerhapsTime::Date(d) => EventTime::Date(d),
            DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
                CalendarDateTime::Utc(dt) => EventTime::DateTimeUtc(dt),
                CalendarDateTime::Floating(naive) => EventTime::DateTimeFloating(naive),
                CalendarDateTime::WithTimezone { date_time, tzid } => EventTime::DateTimeZoned {
                    datetime: date_time,
                    tzid,
                },
            },
        }
    }
}

impl EventTime {
    /// DATE values (no time of day) mark an all-day event.
    pub fn is_date(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// The zone this value's wall-clock time is expressed in.
    ///
    /// Floating values, DATE values and unknown TZIDs use `floating`.
    pub fn zone(&self, floating: Tz) -> Tz {
        match self {
            EventTime::DateTimeUtc(_) => Tz::UTC,
            EventTime::DateTimeZoned { tzid, .. } => resolve_tzid(tzid).unwrap_or(floating),
            EventTime::Date(_) | EventTime::DateTimeFloating(_) => floating,
        }
    }

    /// Wall-clock time of this value (midnight for DATE values).
    pub fn naive(&self) -> NaiveDateTime {
        match self {
            EventTime::Date(d) => d.and_time(chrono::NaiveTime::MIN),
            EventTime::DateTimeUtc(dt) => dt.naive_utc(),
            EventTime::DateTimeFloating(naive) => *naive,
            EventTime::DateTimeZoned { datetime, .. } => *datetime,
        }
    }

    pub fn to_utc(&self, floating: Tz) -> DateTime<Utc> {
        match self {
            EventTime::DateTimeUtc(dt) => *dt,
            other => localize(other.naive(), other.zone(floating)),
        }
    }

    /// Render as an iCalendar content line for the rrule crate, e.g.
    /// `DTSTART;TZID=Europe/Amsterdam:20240101T090000`.
    ///
    /// DATE values become midnight in the floating zone since the rrule crate
    /// only iterates date-times.
    pub fn to_rrule_line(&self, name: &str, floating: Tz) -> String {
        let zone = self.zone(floating);
        if zone == Tz::UTC {
            let utc = self.to_utc(floating);
            return format!("{}:{}", name, utc.format("%Y%m%dT%H%M%SZ"));
        }
        format!(
            "{};TZID={}:{}",
            name,
            zone.name(),
            self.naive().format("%Y%m%dT%H%M%S")
        )
    }
}

/// Look up a TZID in the IANA database.
///
/// Some producers prefix the IANA name with a vendor path
/// (`/freeassociation.sourceforge.net/Europe/Amsterdam`); the longest
/// parseable suffix wins.
pub fn resolve_tzid(tzid: &str) -> Option<Tz> {
    let tzid = tzid.trim().trim_matches('"');
    if let Ok(tz) = tzid.parse::<Tz>() {
        return Some(tz);
    }

    let segments: Vec<&str> = tzid.split('/').filter(|s| !s.is_empty()).collect();
    (1..segments.len()).find_map(|skip| segments[skip..].join("/").parse::<Tz>().ok())
}

/// Interpret a wall-clock time in `tz`.
///
/// Ambiguous times (DST fall-back) take the earlier instant; times inside a
/// DST gap are moved forward an hour.
fn localize(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}
