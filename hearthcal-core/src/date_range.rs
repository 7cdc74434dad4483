//! Expansion window for turning feeds into concrete occurrences.

use chrono::{DateTime, Months, Utc};

/// How far back occurrences are kept.
pub const MONTHS_BEFORE: u32 = 12;
/// How far ahead recurring events are expanded.
pub const MONTHS_AFTER: u32 = 24;

/// Closed instant range `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    /// One calendar year before `now` to two calendar years after it.
    pub fn expansion_window(now: DateTime<Utc>) -> Self {
        let from = now
            .checked_sub_months(Months::new(MONTHS_BEFORE))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let to = now
            .checked_add_months(Months::new(MONTHS_AFTER))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        DateRange { from, to }
    }

    /// Window anchored at the current instant.
    pub fn current() -> Self {
        Self::expansion_window(Utc::now())
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.from && instant <= self.to
    }

    /// Whether `[start, end]` touches the range (inclusive at both ends).
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start <= self.to && end >= self.from
    }
}
