//! Colored terminal rendering for hearthcal types.

use chrono::{DateTime, Local, NaiveDate, Utc};
use chrono_tz::Tz;
use hearthcal_core::{CalendarSource, Event, ParsedEvent, SkippedEvent, SyncReport};
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for CalendarSource {
    fn render(&self) -> String {
        let id = self.id.map(|id| format!("#{}", id)).unwrap_or_default();
        format!("📅 {} {}", id.dimmed(), self.label().bold())
    }
}

impl Render for SkippedEvent {
    fn render(&self) -> String {
        let what = self
            .summary
            .as_deref()
            .or(self.uid.as_deref())
            .unwrap_or("(unnamed event)");
        format!("{} {} {}", "!".yellow(), what, self.reason.dimmed())
    }
}

impl Render for SyncReport {
    fn render(&self) -> String {
        let synced = format!("{} synced", self.synced);
        let failed = format!("{} failed", self.failed());
        let skipped = format!("{} skipped", self.skipped);

        let failed = if self.is_clean() {
            failed.dimmed().to_string()
        } else {
            failed.red().to_string()
        };
        format!("{}, {}, {}", synced.green(), failed, skipped.dimmed())
    }
}

/// Anything with a title and a time span, listed one per line.
pub trait Occurrence {
    fn title(&self) -> &str;
    fn start(&self) -> DateTime<Utc>;
    fn is_all_day(&self) -> bool;
}

impl Occurrence for ParsedEvent {
    fn title(&self) -> &str {
        &self.title
    }
    fn start(&self) -> DateTime<Utc> {
        self.start
    }
    fn is_all_day(&self) -> bool {
        self.is_all_day
    }
}

impl Occurrence for Event {
    fn title(&self) -> &str {
        &self.title
    }
    fn start(&self) -> DateTime<Utc> {
        self.start
    }
    fn is_all_day(&self) -> bool {
        self.is_all_day
    }
}

/// Print occurrences grouped under a line per day.
///
/// `floating` is the zone all-day dates were resolved in.
pub fn print_by_day<T: Occurrence>(
    events: &[T],
    floating: Tz,
    tag: impl Fn(&T) -> Option<String>,
) {
    let today = Local::now().date_naive();
    let mut current_date: Option<String> = None;

    for event in events {
        let date_label = format_date_label(occurrence_date(event, floating), today);

        if current_date.as_ref() != Some(&date_label) {
            if current_date.is_some() {
                println!();
            }
            println!("{}", date_label.bold());
            current_date = Some(date_label);
        }

        let tag = tag(event).map(|t| format!("[{}]", t)).unwrap_or_default();
        println!("  {} {} {}", format_time(event), event.title(), tag.dimmed());
    }
}

/// The day an occurrence is listed under.
///
/// All-day events start at midnight in the floating zone, so their date is
/// read there rather than in the local zone.
fn occurrence_date<T: Occurrence>(event: &T, floating: Tz) -> NaiveDate {
    if event.is_all_day() {
        event.start().with_timezone(&floating).date_naive()
    } else {
        event.start().with_timezone(&Local).date_naive()
    }
}

/// "Today", "Tomorrow", or e.g. "Wed Feb 25 2026"
fn format_date_label(date: NaiveDate, today: NaiveDate) -> String {
    match (date - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        _ => date.format("%a %b %-d %Y").to_string(),
    }
}

/// e.g. "  15:00" or "all-day"
fn format_time<T: Occurrence>(event: &T) -> String {
    if event.is_all_day() {
        return "all-day".to_string();
    }
    format!("{:>7}", event.start().with_timezone(&Local).format("%H:%M"))
}
