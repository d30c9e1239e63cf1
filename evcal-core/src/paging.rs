//! Splitting a result set's calendar days into pages.
//!
//! A page closes once it holds at least `min_days` distinct days AND at
//! least `min_events` occurrences, or when the days run out. Pages are
//! made of whole days, so a day never spans two pages.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::config::PagingConfig;
use crate::scope::DateWindow;

/// Every populated day of a filtered result set, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateIndex {
    pub dates: Vec<NaiveDate>,
    /// Occurrences per day. None when the source could not count them.
    pub counts: Option<BTreeMap<NaiveDate, usize>>,
    /// Distinct matching events.
    pub total_events: usize,
}

impl DateIndex {
    /// Build an index from per-day counts. `descending` for the past view.
    pub fn from_counts(
        counts: BTreeMap<NaiveDate, usize>,
        total_events: usize,
        descending: bool,
    ) -> Self {
        let mut dates: Vec<NaiveDate> = counts.keys().copied().collect();
        if descending {
            dates.reverse();
        }
        DateIndex {
            dates,
            counts: Some(counts),
            total_events,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// First and last day of one page, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageBoundary {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl PageBoundary {
    /// The page as a date filter (order independent).
    pub fn window(&self) -> DateWindow {
        DateWindow::between(self.first, self.last)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PagePlan {
    pub boundaries: Vec<PageBoundary>,
}

/// A page request after clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPage {
    pub page: usize,
    pub max_pages: usize,
    /// None when the result set is empty.
    pub boundary: Option<PageBoundary>,
    /// Last day of the preceding page, if there is one.
    pub previous_day: Option<NaiveDate>,
}

impl PagePlan {
    /// Always at least one page, even for an empty result.
    pub fn max_pages(&self) -> usize {
        self.boundaries.len().max(1)
    }

    /// Clamp a 1-based page number into range and look up its boundary.
    pub fn resolve(&self, requested: i64) -> ResolvedPage {
        let max_pages = self.max_pages();
        let page = requested.clamp(1, max_pages as i64) as usize;

        ResolvedPage {
            page,
            max_pages,
            boundary: self.boundaries.get(page - 1).copied(),
            previous_day: page
                .checked_sub(2)
                .and_then(|i| self.boundaries.get(i))
                .map(|b| b.last),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    min_days: usize,
    min_events: usize,
}

impl Paginator {
    pub fn new(config: &PagingConfig) -> Self {
        Paginator {
            min_days: config.min_days_per_page.max(1),
            min_events: config.min_events_per_page,
        }
    }

    pub fn plan(&self, index: &DateIndex) -> PagePlan {
        let boundaries = match (&index.counts, index.dates.first(), index.dates.last()) {
            (_, None, _) | (_, _, None) => Vec::new(),
            (Some(_), Some(first), Some(last)) if index.total_events < self.min_events => {
                vec![PageBoundary {
                    first: *first,
                    last: *last,
                }]
            }
            (Some(counts), _, _) => self.by_thresholds(&index.dates, counts),
            (None, _, _) => self.by_day_chunks(&index.dates),
        };

        debug!(
            days = index.dates.len(),
            events = index.total_events,
            pages = boundaries.len(),
            "planned pages"
        );
        PagePlan { boundaries }
    }

    fn by_thresholds(
        &self,
        dates: &[NaiveDate],
        counts: &BTreeMap<NaiveDate, usize>,
    ) -> Vec<PageBoundary> {
        let mut boundaries = Vec::new();
        let mut page_first: Option<NaiveDate> = None;
        let mut days = 0;
        let mut events = 0;

        for (i, date) in dates.iter().enumerate() {
            let first = *page_first.get_or_insert(*date);
            days += 1;
            events += counts.get(date).copied().unwrap_or(0);

            let is_last = i + 1 == dates.len();
            if (days >= self.min_days && events >= self.min_events) || is_last {
                boundaries.push(PageBoundary { first, last: *date });
                page_first = None;
                days = 0;
                events = 0;
            }
        }

        boundaries
    }

    fn by_day_chunks(&self, dates: &[NaiveDate]) -> Vec<PageBoundary> {
        dates
            .chunks(self.min_days)
            .filter_map(|chunk| {
                Some(PageBoundary {
                    first: *chunk.first()?,
                    last: *chunk.last()?,
                })
            })
            .collect()
    }
}
