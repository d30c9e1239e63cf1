//! Human-readable labels for grouped calendar entries.
//!
//! All times are rendered as wall-clock values in the event's own
//! timezone, which is how the hydrator stores them.

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::event::HydratedEvent;
use crate::geo::DistanceUnit;
use crate::group::{GroupedEntry, OccurrenceKind};

/// Display-ready strings for one entry on one day.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayVars {
    pub title: String,
    pub description: Option<String>,
    /// Time range, "All day", or a date span for continuation days.
    pub time_label: String,
    /// "through Jan 12" on the first day of a multi-day event.
    pub through_label: Option<String>,
    pub is_continuation: bool,
    pub venue_line: Option<String>,
    pub distance_label: Option<String>,
    pub timezone: String,
}

/// Caller hook that may rewrite the computed display vars.
pub type DisplayOverride = Arc<dyn Fn(&HydratedEvent, &mut DisplayVars) + Send + Sync>;

#[derive(Clone)]
pub struct DisplayFormatter {
    sentinel_end_time: NaiveTime,
    display_override: Option<DisplayOverride>,
}

impl DisplayFormatter {
    pub fn new(config: &EngineConfig) -> Self {
        DisplayFormatter {
            sentinel_end_time: config.sentinel_end_time(),
            display_override: None,
        }
    }

    pub fn with_override(mut self, display_override: DisplayOverride) -> Self {
        self.display_override = Some(display_override);
        self
    }

    /// Format the time span of an event that starts at `start_time` on
    /// `start_date`.
    ///
    /// Only the start is shown when there is no end time, when the end
    /// time is the sentinel, or when the end lands on another day. A
    /// missing end date means the same day as the start.
    pub fn format_time_range(
        &self,
        start_date: NaiveDate,
        start_time: NaiveTime,
        end_date: Option<NaiveDate>,
        end_time: Option<NaiveTime>,
    ) -> String {
        let end = end_time
            .filter(|t| *t != self.sentinel_end_time)
            .filter(|_| end_date.is_none_or(|d| d == start_date));

        let Some(end) = end else {
            return format!("{} {}", clock(start_time), period(start_time));
        };

        if period(start_time) == period(end) {
            format!("{} - {} {}", clock(start_time), clock(end), period(end))
        } else {
            format!(
                "{} {} - {} {}",
                clock(start_time),
                period(start_time),
                clock(end),
                period(end)
            )
        }
    }

    /// Compute the display vars for one grouped entry.
    pub fn entry(
        &self,
        entry: &GroupedEntry,
        distance: Option<(f64, DistanceUnit)>,
    ) -> DisplayVars {
        let event: &HydratedEvent = &entry.event;
        let last = event.last_date();

        let time_label = match (entry.kind, event.start_time) {
            (OccurrenceKind::Continuation, _) => span_label(event.start_date, last),
            (_, None) => "All day".to_string(),
            (_, Some(start)) => self.format_time_range(
                event.start_date,
                start,
                event.end_date,
                event.end_time,
            ),
        };

        let through_label = (entry.kind == OccurrenceKind::Start)
            .then(|| format!("through {}", short_date(last)));

        let mut vars = DisplayVars {
            title: clean_text(&event.title),
            description: event.description.as_deref().map(clean_text),
            time_label,
            through_label,
            is_continuation: entry.kind.is_continuation(),
            venue_line: venue_line(event),
            distance_label: distance.map(|(d, unit)| distance_label(d, unit)),
            timezone: event.timezone.name().to_string(),
        };

        if let Some(hook) = &self.display_override {
            hook(event, &mut vars);
        }
        vars
    }
}

/// "Saturday, January 10", with the year when it differs from `today`'s.
pub fn day_heading(date: NaiveDate, today: NaiveDate) -> String {
    if date.year() == today.year() {
        date.format("%A, %B %-d").to_string()
    } else {
        date.format("%A, %B %-d, %Y").to_string()
    }
}

/// "Today" / "Tomorrow" relative to `today`.
pub fn relative_day(date: NaiveDate, today: NaiveDate) -> Option<&'static str> {
    if date == today {
        Some("Today")
    } else if date == today + Duration::days(1) {
        Some("Tomorrow")
    } else {
        None
    }
}

/// "Jan 10 – Jan 12"
pub fn span_label(first: NaiveDate, last: NaiveDate) -> String {
    format!("{} \u{2013} {}", short_date(first), short_date(last))
}

pub fn distance_label(distance: f64, unit: DistanceUnit) -> String {
    format!("{:.1} {}", distance, unit.label())
}

fn short_date(date: NaiveDate) -> String {
    date.format("%b %-d").to_string()
}

fn clock(time: NaiveTime) -> String {
    format!("{}:{:02}", time.hour12().1, time.minute())
}

fn period(time: NaiveTime) -> &'static str {
    if time.hour12().0 { "PM" } else { "AM" }
}

fn venue_line(event: &HydratedEvent) -> Option<String> {
    let venue = event.venue.as_ref()?;
    let name = venue.name.as_deref().map(clean_text);
    let address = venue.address_line().map(|a| clean_text(&a));

    match (name, address) {
        (Some(name), Some(address)) => Some(format!("{}, {}", name, address)),
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}

// ============================================================================
// Text cleanup
// ============================================================================

/// Escapes that show up with their backslash stripped by upstream imports.
const BARE_ESCAPES: &[(&str, char)] = &[
    ("u2018", '\u{2018}'),
    ("u2019", '\u{2019}'),
    ("u201c", '\u{201c}'),
    ("u201d", '\u{201d}'),
    ("u2013", '\u{2013}'),
    ("u2014", '\u{2014}'),
    ("u2026", '\u{2026}'),
    ("u00a0", ' '),
    ("u0026", '&'),
];

/// Repair literal `\uXXXX` escapes and known bare `uXXXX` leftovers.
pub fn clean_text(text: &str) -> String {
    if !text.contains('u') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find(['\\', 'u']) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        if let Some(hex) = rest.strip_prefix("\\u")
            && let Some(c) = decode_hex4(hex)
        {
            out.push(c);
            rest = &rest[6..];
            continue;
        }

        if let Some((token, c)) = BARE_ESCAPES
            .iter()
            .find(|(token, _)| starts_with_ignore_case(rest, token))
        {
            out.push(*c);
            rest = &rest[token.len()..];
            continue;
        }

        // Not an escape: copy the matched char through.
        let len = rest.chars().next().map_or(1, char::len_utf8);
        out.push_str(&rest[..len]);
        rest = &rest[len..];
    }

    out.push_str(rest);
    out
}

fn decode_hex4(s: &str) -> Option<char> {
    let hex = s.get(..4)?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
