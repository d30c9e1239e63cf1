//! The query pipeline: request to paginated, day-grouped, display-ready page.
//!
//! 1. build the filter spec (geo narrowing happens here)
//! 2. enumerate the whole result set's days once per fingerprint (cached)
//! 3. plan page boundaries from that enumeration (cached)
//! 4. fetch and hydrate only the requested page's date window
//! 5. group by day and format

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::{CachePurpose, CacheStats, CalendarCache};
use crate::config::EngineConfig;
use crate::display::{DisplayFormatter, DisplayOverride, DisplayVars, day_heading, relative_day};
use crate::error::CalendarResult;
use crate::event::{CategoryMap, HydratedEvent, OrganizerInfo, VenueInfo};
use crate::group::{DateGrouper, DayGroup, OccurrenceKind};
use crate::hydrate::EventHydrator;
use crate::paging::{DateIndex, PageBoundary, PagePlan, Paginator};
use crate::query::{Direction, FilterRequest, FilterSpec, QueryBuilder, SpecTransform};
use crate::scope::DateWindow;
use crate::store::EventStore;

// ============================================================================
// Result
// ============================================================================

/// One page of calendar results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarPage {
    pub grouped_by_date: Vec<DayView>,
    pub total_event_count: usize,
    pub current_page: usize,
    pub max_pages: usize,
    pub past_count: usize,
    pub future_count: usize,
    pub direction: Direction,
    /// The filter's own date window.
    pub window: DateWindow,
    /// The days this page covers, in display order.
    pub page_window: Option<PageBoundary>,
}

impl CalendarPage {
    pub fn is_empty(&self) -> bool {
        self.grouped_by_date.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayView {
    pub date: NaiveDate,
    pub heading: String,
    pub relative: Option<String>,
    /// Days since the previous day shown, when the gap is noteworthy.
    pub gap_days: Option<i64>,
    pub entries: Vec<EntryView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    pub event: EventSummary,
    pub kind: OccurrenceKind,
    pub display_vars: DisplayVars,
}

/// The event fields a calendar listing needs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub cost: Option<String>,
    pub start_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_date: Option<NaiveDate>,
    pub end_time: Option<NaiveTime>,
    pub timezone: String,
    pub categories: CategoryMap,
    pub venue: Option<VenueInfo>,
    pub organizer: Option<OrganizerInfo>,
}

impl From<&HydratedEvent> for EventSummary {
    fn from(event: &HydratedEvent) -> Self {
        EventSummary {
            id: event.id.clone(),
            title: event.title.clone(),
            url: event.url.clone(),
            cost: event.cost.clone(),
            start_date: event.start_date,
            start_time: event.start_time,
            end_date: event.end_date,
            end_time: event.end_time,
            timezone: event.timezone.name().to_string(),
            categories: event.categories.clone(),
            venue: event.venue.clone(),
            organizer: event.organizer.clone(),
        }
    }
}

/// Matching events on each side of "now" for the same filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeCounts {
    pub past: usize,
    pub future: usize,
}

// ============================================================================
// Engine
// ============================================================================

pub struct QueryEngine {
    store: Arc<dyn EventStore>,
    cache: CalendarCache,
    builder: QueryBuilder,
    hydrator: EventHydrator,
    grouper: DateGrouper,
    paginator: Paginator,
    formatter: DisplayFormatter,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn EventStore>, cache: CalendarCache, config: &EngineConfig) -> Self {
        QueryEngine {
            store,
            cache,
            builder: QueryBuilder::new(config),
            hydrator: EventHydrator::new(config),
            grouper: DateGrouper::new(&config.grouping),
            paginator: Paginator::new(&config.paging),
            formatter: DisplayFormatter::new(config),
        }
    }

    /// Rewrite every built filter spec before it is fingerprinted.
    pub fn with_transform(mut self, transform: SpecTransform) -> Self {
        self.builder = self.builder.with_transform(transform);
        self
    }

    pub fn with_display_override(mut self, display_override: DisplayOverride) -> Self {
        self.formatter = self.formatter.with_override(display_override);
        self
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Run a query against the wall clock.
    pub fn run(&self, request: &FilterRequest) -> CalendarResult<CalendarPage> {
        self.run_at(request, Utc::now())
    }

    /// Run a query as of `now`.
    ///
    /// Fails as a whole: a store error anywhere yields an error, never a
    /// partially grouped page.
    pub fn run_at(
        &self,
        request: &FilterRequest,
        now: DateTime<Utc>,
    ) -> CalendarResult<CalendarPage> {
        let spec = self.builder.build(request, now, &*self.store)?;
        let fingerprint = spec.fingerprint()?;

        // All three artifacts share one generation.
        let cache = self.cache.session();
        let index: DateIndex = cache.get_or_compute(
            &fingerprint,
            CachePurpose::UniqueDates,
            None,
            || self.date_index(&spec),
        )?;
        let plan: PagePlan = cache.get_or_compute(
            &fingerprint,
            CachePurpose::PagePlan,
            None,
            || Ok(self.paginator.plan(&index)),
        )?;
        let counts: ScopeCounts = cache.get_or_compute(
            &fingerprint,
            CachePurpose::ScopeCounts,
            None,
            || self.scope_counts(&spec),
        )?;

        let resolved = plan.resolve(request.page.unwrap_or(1));
        let days = match resolved.boundary {
            Some(boundary) => self.page_days(&spec, &boundary, resolved.previous_day)?,
            None => Vec::new(),
        };

        info!(
            page = resolved.page,
            max_pages = resolved.max_pages,
            days = days.len(),
            total = index.total_events,
            "calendar query"
        );

        Ok(CalendarPage {
            grouped_by_date: self.render_days(&spec, days),
            total_event_count: index.total_events,
            current_page: resolved.page,
            max_pages: resolved.max_pages,
            past_count: counts.past,
            future_count: counts.future,
            direction: spec.direction,
            window: spec.window,
            page_window: resolved.boundary,
        })
    }

    /// Every populated day of the full result set with its event count.
    fn date_index(&self, spec: &FilterSpec) -> CalendarResult<DateIndex> {
        let found = self.store.find(spec)?;
        let events = self.hydrate_all(&found.ids)?;

        let counts = self.grouper.tally(
            events.iter().map(|event| &**event),
            spec.direction,
            spec.now,
            &spec.window,
        );
        debug!(events = found.total, days = counts.len(), "enumerated result days");

        Ok(DateIndex::from_counts(
            counts,
            found.total,
            spec.direction.is_past(),
        ))
    }

    fn scope_counts(&self, spec: &FilterSpec) -> CalendarResult<ScopeCounts> {
        let past = self.store.find(&spec.with_direction(Direction::Past))?.total;
        let future = self.store.find(&spec.with_direction(Direction::Upcoming))?.total;
        Ok(ScopeCounts { past, future })
    }

    /// Fetch, hydrate and group only the events on one page.
    ///
    /// Gap flags carry over from `previous_day`, the last day of the page before.
    fn page_days(
        &self,
        spec: &FilterSpec,
        boundary: &PageBoundary,
        previous_day: Option<NaiveDate>,
    ) -> CalendarResult<Vec<DayGroup>> {
        let page_spec = spec.narrowed(&boundary.window());
        let found = self.store.find(&page_spec)?;
        let events = self.hydrate_all(&found.ids)?;

        let mut days = self
            .grouper
            .group(&events, page_spec.direction, page_spec.now, &page_spec.window);
        if previous_day.is_some() {
            self.grouper.flag_gaps(&mut days, previous_day);
        }
        Ok(days)
    }

    fn hydrate_all(&self, ids: &[String]) -> CalendarResult<Vec<Arc<HydratedEvent>>> {
        let mut events = Vec::with_capacity(ids.len());
        for id in ids {
            match self.hydrate(id)? {
                Some(event) => events.push(Arc::new(event)),
                None => debug!(event = %id, "skipping event without a start date"),
            }
        }
        Ok(events)
    }

    fn hydrate(&self, id: &str) -> CalendarResult<Option<HydratedEvent>> {
        let Some(record) = self.store.raw_event(id)? else {
            return Ok(None);
        };

        let venue = match &record.venue_id {
            Some(venue_id) => self.store.venue(venue_id)?,
            None => None,
        };
        let organizer = match &record.organizer_id {
            Some(organizer_id) => self.store.organizer(organizer_id)?,
            None => None,
        };

        Ok(self
            .hydrator
            .hydrate(&record, venue.as_ref(), organizer.as_ref()))
    }

    fn render_days(&self, spec: &FilterSpec, days: Vec<DayGroup>) -> Vec<DayView> {
        days.into_iter()
            .map(|day| DayView {
                date: day.date,
                heading: day_heading(day.date, spec.today),
                relative: relative_day(day.date, spec.today).map(str::to_string),
                gap_days: day.gap_days,
                entries: day
                    .entries
                    .iter()
                    .map(|entry| EntryView {
                        event: EventSummary::from(&*entry.event),
                        kind: entry.kind,
                        display_vars: self
                            .formatter
                            .entry(entry, spec.distance_to(entry.event.venue_id())),
                    })
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AuthoredAttributes, EventRecord};
    use crate::store::InMemoryStore;
    use chrono::TimeZone;

    fn record(id: &str, date: &str, time: Option<&str>) -> EventRecord {
        EventRecord {
            id: id.to_string(),
            title: format!("Event {}", id),
            occurrences: vec![],
            categories: CategoryMap::new(),
            venue_id: None,
            organizer_id: None,
            attributes: AuthoredAttributes {
                start_date: date.parse().ok(),
                start_time: time.and_then(|t| t.parse().ok()),
                ..Default::default()
            },
            schedule: None,
        }
    }

    fn engine(store: Arc<InMemoryStore>) -> QueryEngine {
        let config = EngineConfig::default();
        let cache = CalendarCache::new(&config.cache, store.bus().subscribe());
        QueryEngine::new(store, cache, &config)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_store_gives_one_empty_page() {
        let engine = engine(Arc::new(InMemoryStore::new()));
        let page = engine.run_at(&FilterRequest::default(), now()).unwrap();

        assert!(page.is_empty());
        assert_eq!(page.max_pages, 1);
        assert_eq!(page.current_page, 1);
        assert_eq!(page.total_event_count, 0);
    }

    #[test]
    fn test_past_and_future_counts() {
        let store = Arc::new(InMemoryStore::new());
        store.upsert_event(record("old", "2025-12-20", Some("19:00:00")));
        store.upsert_event(record("new", "2026-01-08", Some("19:00:00")));
        store.upsert_event(record("later", "2026-02-01", None));

        let page = engine(store).run_at(&FilterRequest::default(), now()).unwrap();
        assert_eq!(page.past_count, 1);
        assert_eq!(page.future_count, 2);
        assert_eq!(page.total_event_count, 2);

        let ids: Vec<&str> = page
            .grouped_by_date
            .iter()
            .flat_map(|d| d.entries.iter().map(|e| e.event.id.as_str()))
            .collect();
        assert_eq!(ids, ["new", "later"]);
    }

    #[test]
    fn test_past_view_runs_backwards() {
        let store = Arc::new(InMemoryStore::new());
        store.upsert_event(record("a", "2025-12-01", Some("10:00:00")));
        store.upsert_event(record("b", "2025-12-15", Some("10:00:00")));

        let request = FilterRequest {
            past: true,
            ..Default::default()
        };
        let page = engine(store).run_at(&request, now()).unwrap();
        let dates: Vec<String> = page
            .grouped_by_date
            .iter()
            .map(|d| d.date.to_string())
            .collect();
        assert_eq!(dates, ["2025-12-15", "2025-12-01"]);
        assert_eq!(page.direction, Direction::Past);
    }

    #[test]
    fn test_spec_transform_applies_before_query() {
        let store = Arc::new(InMemoryStore::new());
        store.upsert_event(record("keep", "2026-01-08", None));
        store.upsert_event(record("drop", "2026-01-09", None));

        let engine = engine(store).with_transform(Arc::new(|spec: &mut FilterSpec| {
            spec.search = Some("keep".to_string());
        }));
        let page = engine.run_at(&FilterRequest::default(), now()).unwrap();
        assert_eq!(page.total_event_count, 1);
    }

    #[test]
    fn test_today_heading_is_relative() {
        let store = Arc::new(InMemoryStore::new());
        store.upsert_event(record("tonight", "2026-01-05", Some("20:00:00")));

        let page = engine(store).run_at(&FilterRequest::default(), now()).unwrap();
        let day = &page.grouped_by_date[0];
        assert_eq!(day.relative.as_deref(), Some("Today"));
        assert_eq!(day.heading, "Monday, January 5");
        assert_eq!(day.entries[0].display_vars.time_label, "8:00 PM");
    }
}
