//! Expanding events into calendar days and bucketing them by day.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::config::GroupingConfig;
use crate::event::HydratedEvent;
use crate::query::Direction;
use crate::scope::DateWindow;

/// How an event shows up on one of its days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceKind {
    /// One-day event.
    Single,
    /// First visible day of a multi-day event. Full detail.
    Start,
    /// Any later day of a multi-day event. Compact.
    Continuation,
    /// One date of an explicit occurrence list. Full detail.
    Repeat,
}

impl OccurrenceKind {
    pub fn is_continuation(self) -> bool {
        self == OccurrenceKind::Continuation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub date: NaiveDate,
    pub kind: OccurrenceKind,
}

#[derive(Debug, Clone)]
pub struct GroupedEntry {
    pub event: Arc<HydratedEvent>,
    pub kind: OccurrenceKind,
}

#[derive(Debug, Clone)]
pub struct DayGroup {
    pub date: NaiveDate,
    pub entries: Vec<GroupedEntry>,
    /// Days since the previous populated day, set when at or above the gap threshold.
    pub gap_days: Option<i64>,
}

/// Every calendar day an event is displayed on, ascending.
///
/// An explicit occurrence list wins; otherwise the start..end range is
/// expanded (capped at `max_span_days`); otherwise the start date alone.
pub fn occurrence_dates(event: &HydratedEvent, max_span_days: i64) -> Vec<NaiveDate> {
    if !event.occurrences.is_empty() {
        return event.occurrences.clone();
    }

    match event.end_date {
        Some(end) if end > event.start_date => {
            let span = (end - event.start_date).num_days().min(max_span_days.max(0));
            (0..=span)
                .map(|offset| event.start_date + Duration::days(offset))
                .collect()
        }
        _ => vec![event.start_date],
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DateGrouper {
    gap_threshold_days: i64,
    max_span_days: i64,
}

impl DateGrouper {
    pub fn new(config: &GroupingConfig) -> Self {
        DateGrouper {
            gap_threshold_days: config.gap_threshold_days,
            max_span_days: config.max_span_days,
        }
    }

    /// The days an event is shown on, tagged for display.
    ///
    /// In the upcoming view days before the event's local "today" are
    /// dropped, so an in-progress event only shows what is left of it.
    pub fn occurrences(
        &self,
        event: &HydratedEvent,
        direction: Direction,
        now: DateTime<Utc>,
    ) -> Vec<Occurrence> {
        let mut dates = occurrence_dates(event, self.max_span_days);

        if direction == Direction::Upcoming {
            let today = now.with_timezone(&event.timezone).date_naive();
            dates.retain(|d| *d >= today);
        }

        let explicit = !event.occurrences.is_empty();
        let multi_day = !explicit && event.is_multi_day();

        dates
            .into_iter()
            .enumerate()
            .map(|(i, date)| {
                let kind = match (explicit, multi_day, i) {
                    (true, _, _) => OccurrenceKind::Repeat,
                    (false, true, 0) => OccurrenceKind::Start,
                    (false, true, _) => OccurrenceKind::Continuation,
                    (false, false, _) => OccurrenceKind::Single,
                };
                Occurrence { date, kind }
            })
            .collect()
    }

    /// Per-day event counts for a whole result set, limited to `window`.
    pub fn tally<'a, I>(
        &self,
        events: I,
        direction: Direction,
        now: DateTime<Utc>,
        window: &DateWindow,
    ) -> BTreeMap<NaiveDate, usize>
    where
        I: IntoIterator<Item = &'a HydratedEvent>,
    {
        let mut counts = BTreeMap::new();
        for event in events {
            for occurrence in self.occurrences(event, direction, now) {
                if window.contains(occurrence.date) {
                    *counts.entry(occurrence.date).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    /// Bucket events by day, ordered ascending for upcoming and descending
    /// for past, keeping only days inside `window`.
    pub fn group(
        &self,
        events: &[Arc<HydratedEvent>],
        direction: Direction,
        now: DateTime<Utc>,
        window: &DateWindow,
    ) -> Vec<DayGroup> {
        let mut buckets: BTreeMap<NaiveDate, Vec<GroupedEntry>> = BTreeMap::new();

        for event in events {
            for occurrence in self.occurrences(event, direction, now) {
                if !window.contains(occurrence.date) {
                    continue;
                }
                buckets.entry(occurrence.date).or_default().push(GroupedEntry {
                    event: Arc::clone(event),
                    kind: occurrence.kind,
                });
            }
        }

        let mut days: Vec<DayGroup> = buckets
            .into_iter()
            .map(|(date, mut entries)| {
                // New starts before continuations, all-day first, then by time
                entries.sort_by(|a, b| {
                    a.kind
                        .is_continuation()
                        .cmp(&b.kind.is_continuation())
                        .then_with(|| a.event.start_time.cmp(&b.event.start_time))
                        .then_with(|| a.event.title.cmp(&b.event.title))
                        .then_with(|| a.event.id.cmp(&b.event.id))
                });
                DayGroup {
                    date,
                    entries,
                    gap_days: None,
                }
            })
            .collect();

        if direction == Direction::Past {
            days.reverse();
        }

        self.flag_gaps(&mut days, None);
        days
    }

    /// Mark days that follow a long stretch with nothing on.
    ///
    /// `previous` is the day shown just before `days`, e.g. the last day
    /// of the preceding page.
    pub fn flag_gaps(&self, days: &mut [DayGroup], previous: Option<NaiveDate>) {
        let mut last = previous;
        for day in days.iter_mut() {
            day.gap_days = last
                .map(|prev| (day.date - prev).num_days().abs())
                .filter(|gap| *gap >= self.gap_threshold_days);
            last = Some(day.date);
        }
    }
}
