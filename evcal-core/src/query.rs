//! Filter requests and the store-level filter specification built from them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::constants::DEFAULT_RADIUS;
use crate::error::{CalendarError, CalendarResult};
use crate::event::{CategoryMap, HydratedEvent};
use crate::geo::{DistanceUnit, GeoQuery, distance_map};
use crate::scope::{DateWindow, NamedScope};
use crate::store::EventStore;

// ============================================================================
// Request
// ============================================================================

/// A calendar query as received from a caller.
///
/// Everything is optional; malformed values degrade to "not given".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRequest {
    pub search: Option<String>,
    pub date_start: Option<String>,
    pub date_end: Option<String>,
    /// Named window, only used when no explicit date is given.
    pub scope: Option<String>,
    /// Category group -> selected term ids
    pub category_filter: BTreeMap<String, Vec<String>>,
    pub archive_category: Option<String>,
    pub archive_term_id: Option<String>,
    /// 1-based. Out-of-range values are clamped later.
    pub page: Option<i64>,
    pub past: bool,
    #[serde(deserialize_with = "lenient_string")]
    pub geo_lat: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub geo_lng: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub geo_radius: Option<String>,
    pub geo_radius_unit: Option<String>,
}

/// Accept strings or bare JSON numbers for geo fields.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

impl FilterRequest {
    /// Build a request from flat query-string pairs.
    ///
    /// Category selections use `category.<group>=id1,id2` (or the
    /// `category_filter[<group>]` spelling); repeated keys accumulate.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut request = FilterRequest::default();

        for (key, value) in pairs {
            let key = key.as_ref();
            let value = value.as_ref().trim();
            let non_empty = || (!value.is_empty()).then(|| value.to_string());

            match key {
                "search" => request.search = non_empty(),
                "date_start" => request.date_start = non_empty(),
                "date_end" => request.date_end = non_empty(),
                "scope" => request.scope = non_empty(),
                "archive_category" => request.archive_category = non_empty(),
                "archive_term_id" => request.archive_term_id = non_empty(),
                "page" => request.page = value.parse().ok(),
                "past" => request.past = matches!(value, "1" | "true" | "yes" | "on"),
                "geo_lat" => request.geo_lat = non_empty(),
                "geo_lng" => request.geo_lng = non_empty(),
                "geo_radius" => request.geo_radius = non_empty(),
                "geo_radius_unit" => request.geo_radius_unit = non_empty(),
                _ => {
                    if let Some(group) = category_group_from_key(key) {
                        let terms = request.category_filter.entry(group.to_string()).or_default();
                        terms.extend(
                            value
                                .split(',')
                                .map(str::trim)
                                .filter(|t| !t.is_empty())
                                .map(str::to_string),
                        );
                    }
                }
            }
        }

        request
    }
}

fn category_group_from_key(key: &str) -> Option<&str> {
    let group = key
        .strip_prefix("category.")
        .or_else(|| {
            key.strip_prefix("category_filter[")
                .and_then(|rest| rest.strip_suffix(']'))
        })?
        .trim();
    (!group.is_empty()).then_some(group)
}

// ============================================================================
// Category policy
// ============================================================================

/// How selections across and within category groups combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CategoryPolicy {
    /// Every selected group must match; any selected term within a group will do.
    #[default]
    AllGroupsAnyTerm,
    /// Every selected term of every selected group must be present.
    AllGroupsAllTerms,
    /// Any selected term from any selected group is enough.
    AnyGroupAnyTerm,
}

impl CategoryPolicy {
    /// Groups with an empty selection are ignored. No selection matches everything.
    pub fn matches(self, selected: &CategoryMap, assigned: &CategoryMap) -> bool {
        let mut groups = selected.iter().filter(|(_, terms)| !terms.is_empty()).peekable();
        if groups.peek().is_none() {
            return true;
        }

        let group_hit = |group: &String, terms: &BTreeSet<String>, all_terms: bool| {
            let Some(event_terms) = assigned.get(group) else {
                return false;
            };
            if all_terms {
                terms.is_subset(event_terms)
            } else {
                !terms.is_disjoint(event_terms)
            }
        };

        match self {
            CategoryPolicy::AllGroupsAnyTerm => groups.all(|(g, t)| group_hit(g, t, false)),
            CategoryPolicy::AllGroupsAllTerms => groups.all(|(g, t)| group_hit(g, t, true)),
            CategoryPolicy::AnyGroupAnyTerm => groups.any(|(g, t)| group_hit(g, t, false)),
        }
    }
}

// ============================================================================
// Filter specification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Ascending by start, events still running at or after "now".
    Upcoming,
    /// Descending by start, events over strictly before "now".
    Past,
}

impl Direction {
    pub fn is_past(self) -> bool {
        self == Direction::Past
    }

    pub fn flipped(self) -> Self {
        match self {
            Direction::Upcoming => Direction::Past,
            Direction::Past => Direction::Upcoming,
        }
    }
}

/// A category term that stays selected whatever the caller asks for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchivePin {
    pub category: String,
    pub term: String,
}

/// Proximity predicate. `venue_ids` is the GeoQuery result for the params.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoFilter {
    pub lat: f64,
    pub lng: f64,
    pub radius: f64,
    pub unit: DistanceUnit,
    #[serde(skip)]
    pub venue_ids: BTreeSet<String>,
    #[serde(skip)]
    pub distances: BTreeMap<String, f64>,
}

/// Store-level predicate set plus ordering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterSpec {
    /// Lowercased, trimmed search text.
    pub search: Option<String>,
    pub window: DateWindow,
    pub direction: Direction,
    /// Today in the engine's default timezone.
    pub today: NaiveDate,
    /// The query clock, truncated to the configured resolution. Upcoming
    /// and past split on it, so it is part of the fingerprint.
    pub now: DateTime<Utc>,
    pub categories: CategoryMap,
    pub category_policy: CategoryPolicy,
    pub archive: Option<ArchivePin>,
    pub geo: Option<GeoFilter>,
}

impl FilterSpec {
    /// An unfiltered upcoming view as of `now`.
    pub fn upcoming(now: DateTime<Utc>, tz: Tz) -> Self {
        FilterSpec {
            search: None,
            window: DateWindow::unbounded(),
            direction: Direction::Upcoming,
            today: now.with_timezone(&tz).date_naive(),
            now,
            categories: CategoryMap::new(),
            category_policy: CategoryPolicy::default(),
            archive: None,
            geo: None,
        }
    }

    /// Canonical serialization of every predicate; the cache key for this filter.
    pub fn fingerprint(&self) -> CalendarResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The same filter looking the other way in time.
    pub fn with_direction(&self, direction: Direction) -> Self {
        FilterSpec {
            direction,
            ..self.clone()
        }
    }

    /// The same filter narrowed to `window`.
    pub fn narrowed(&self, window: &DateWindow) -> Self {
        FilterSpec {
            window: self.window.intersect(window),
            ..self.clone()
        }
    }

    pub fn distance_to(&self, venue_id: Option<&str>) -> Option<(f64, DistanceUnit)> {
        let geo = self.geo.as_ref()?;
        let distance = geo.distances.get(venue_id?)?;
        Some((*distance, geo.unit))
    }

    /// Evaluate every predicate against a hydrated event.
    pub fn matches(&self, event: &HydratedEvent) -> bool {
        self.matches_time(event)
            && self.matches_window(event)
            && self.matches_search(event)
            && self.category_policy.matches(&self.categories, &event.categories)
            && self.matches_archive(event)
            && self.matches_geo(event)
    }

    fn matches_time(&self, event: &HydratedEvent) -> bool {
        let ends_at = event.ends_at().with_timezone(&Utc);
        match self.direction {
            Direction::Upcoming => ends_at >= self.now,
            Direction::Past => ends_at < self.now,
        }
    }

    fn matches_window(&self, event: &HydratedEvent) -> bool {
        if self.window.is_unbounded() {
            return true;
        }
        if event.occurrences.is_empty() {
            self.window.overlaps(event.start_date, event.last_date())
        } else {
            event.occurrences.iter().any(|d| self.window.contains(*d))
        }
    }

    fn matches_search(&self, event: &HydratedEvent) -> bool {
        let Some(needle) = &self.search else {
            return true;
        };

        [
            Some(event.title.as_str()),
            event.description.as_deref(),
            event.venue_name(),
            event.organizer_name(),
        ]
        .into_iter()
        .flatten()
        .any(|haystack| haystack.to_lowercase().contains(needle))
    }

    fn matches_archive(&self, event: &HydratedEvent) -> bool {
        match &self.archive {
            Some(pin) => event
                .categories
                .get(&pin.category)
                .is_some_and(|terms| terms.contains(&pin.term)),
            None => true,
        }
    }

    fn matches_geo(&self, event: &HydratedEvent) -> bool {
        match &self.geo {
            Some(geo) => event.venue_id().is_some_and(|id| geo.venue_ids.contains(id)),
            None => true,
        }
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let direction = if self.direction.is_past() { "past" } else { "upcoming" };
        write!(f, "{} {}", direction, self.window)?;
        if let Some(search) = &self.search {
            write!(f, " search={:?}", search)?;
        }
        if self.geo.is_some() {
            write!(f, " geo")?;
        }
        Ok(())
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Optional rewrite applied to each built spec before it is fingerprinted.
pub type SpecTransform = Arc<dyn Fn(&mut FilterSpec) + Send + Sync>;

/// Turns a `FilterRequest` into a `FilterSpec`.
#[derive(Clone)]
pub struct QueryBuilder {
    geo: GeoQuery,
    default_unit: DistanceUnit,
    category_policy: CategoryPolicy,
    timezone: Tz,
    clock_resolution: Duration,
    transform: Option<SpecTransform>,
}

impl QueryBuilder {
    pub fn new(config: &EngineConfig) -> Self {
        QueryBuilder {
            geo: GeoQuery::new(config.geo.max_radius),
            default_unit: config.geo.default_unit,
            category_policy: config.query.category_policy,
            timezone: config.timezone(),
            clock_resolution: config.cache.clock_resolution(),
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: SpecTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Round `now` down to the clock resolution.
    fn truncate(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let step = i64::try_from(self.clock_resolution.as_secs().max(1)).unwrap_or(i64::MAX);
        let secs = now.timestamp();
        DateTime::from_timestamp(secs - secs.rem_euclid(step), 0).unwrap_or(now)
    }

    /// Build the spec, consulting the store's venue index when geo params are present.
    pub fn build(
        &self,
        request: &FilterRequest,
        now: DateTime<Utc>,
        store: &dyn EventStore,
    ) -> CalendarResult<FilterSpec> {
        let mut spec = FilterSpec::upcoming(self.truncate(now), self.timezone);
        spec.category_policy = self.category_policy;

        if request.past {
            spec.direction = Direction::Past;
        }

        spec.search = request
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        spec.window = match DateWindow::from_args(
            request.date_start.as_deref(),
            request.date_end.as_deref(),
        ) {
            Some(explicit) => explicit,
            None => request
                .scope
                .as_deref()
                .and_then(NamedScope::parse)
                .map(|scope| scope.window(spec.today))
                .unwrap_or_default(),
        };

        for (group, terms) in &request.category_filter {
            let terms: BTreeSet<String> = terms
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            if !terms.is_empty() {
                spec.categories.insert(group.clone(), terms);
            }
        }

        spec.archive = match (&request.archive_category, &request.archive_term_id) {
            (Some(category), Some(term)) if !category.is_empty() && !term.is_empty() => {
                Some(ArchivePin {
                    category: category.clone(),
                    term: term.clone(),
                })
            }
            _ => None,
        };

        spec.geo = self.geo_filter(request, store)?;

        if let Some(transform) = &self.transform {
            transform(&mut spec);
        }

        debug!(spec = %spec, "built filter spec");
        Ok(spec)
    }

    /// Resolve geo params into a venue set. Invalid params mean no geo filter.
    fn geo_filter(
        &self,
        request: &FilterRequest,
        store: &dyn EventStore,
    ) -> CalendarResult<Option<GeoFilter>> {
        let (Some(lat), Some(lng)) = (request.geo_lat.as_deref(), request.geo_lng.as_deref()) else {
            return Ok(None);
        };

        let params = match self.parse_geo(lat, lng, request) {
            Ok(params) => params,
            Err(e) => {
                warn!(error = %e, "dropping geo filter");
                return Ok(None);
            }
        };
        let (lat, lng, radius, unit) = params;

        let index = store.venue_locations()?;
        let matches = match self.geo.find_within_radius(&index, lat, lng, radius, unit) {
            Ok(matches) => matches,
            Err(e) if e.is_invalid_geo() => {
                warn!(error = %e, "dropping geo filter");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        Ok(Some(GeoFilter {
            lat,
            lng,
            radius,
            unit,
            venue_ids: matches.iter().map(|m| m.venue_id.clone()).collect(),
            distances: distance_map(&matches),
        }))
    }

    fn parse_geo(
        &self,
        lat: &str,
        lng: &str,
        request: &FilterRequest,
    ) -> CalendarResult<(f64, f64, f64, DistanceUnit)> {
        let lat: f64 = lat
            .trim()
            .parse()
            .map_err(|_| CalendarError::InvalidLatitude(f64::NAN))?;
        let lng: f64 = lng
            .trim()
            .parse()
            .map_err(|_| CalendarError::InvalidLongitude(f64::NAN))?;
        GeoQuery::validate_point(lat, lng)?;

        let radius = match request.geo_radius.as_deref() {
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .map_err(|_| CalendarError::InvalidRadius(raw.to_string()))?,
            None => DEFAULT_RADIUS,
        };
        let radius = self.geo.clamp_radius(radius)?;

        let unit = request
            .geo_radius_unit
            .as_deref()
            .and_then(|u| u.parse().ok())
            .unwrap_or(self.default_unit);

        Ok((round6(lat), round6(lng), radius, unit))
    }
}

/// Coordinates are keyed at ~10cm precision so equal requests share a fingerprint.
fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Venue;
    use crate::store::InMemoryStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 14, 18, 0, 0).unwrap()
    }

    fn cats(pairs: &[(&str, &[&str])]) -> CategoryMap {
        pairs
            .iter()
            .map(|(g, terms)| {
                (
                    g.to_string(),
                    terms.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
                )
            })
            .collect()
    }

    fn store_with_venue() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.upsert_venue(Venue {
            id: "v1".to_string(),
            name: "Hall".to_string(),
            address: None,
            city: None,
            region: None,
            postal_code: None,
            latitude: Some(39.7527),
            longitude: Some(-105.0001),
            timezone: None,
        });
        store
    }

    #[test]
    fn test_category_policies() {
        let event = cats(&[("genre", &["jazz", "blues"]), ("age", &["all-ages"])]);
        let selected = cats(&[("genre", &["jazz", "rock"]), ("age", &["all-ages"])]);

        assert!(CategoryPolicy::AllGroupsAnyTerm.matches(&selected, &event));
        assert!(!CategoryPolicy::AllGroupsAllTerms.matches(&selected, &event));

        let other_group = cats(&[("genre", &["rock"]), ("age", &["all-ages"])]);
        assert!(!CategoryPolicy::AllGroupsAnyTerm.matches(&other_group, &event));
        assert!(CategoryPolicy::AnyGroupAnyTerm.matches(&other_group, &event));
    }

    #[test]
    fn test_empty_selection_matches_everything() {
        let event = cats(&[]);
        let selected = cats(&[("genre", &[])]);
        assert!(CategoryPolicy::AllGroupsAnyTerm.matches(&selected, &event));
        assert!(CategoryPolicy::AnyGroupAnyTerm.matches(&CategoryMap::new(), &event));
    }

    #[test]
    fn test_query_pairs_parsing() {
        let request = FilterRequest::from_query_pairs(vec![
            ("search", " jazz "),
            ("category.genre", "1,2"),
            ("category_filter[venue-type]", "club"),
            ("category.genre", "3"),
            ("page", "x"),
            ("past", "true"),
            ("geo_lat", "39.75"),
        ]);

        assert_eq!(request.search.as_deref(), Some("jazz"));
        assert_eq!(request.category_filter["genre"], vec!["1", "2", "3"]);
        assert_eq!(request.category_filter["venue-type"], vec!["club"]);
        assert_eq!(request.page, None);
        assert!(request.past);
        assert_eq!(request.geo_lat.as_deref(), Some("39.75"));
    }

    #[test]
    fn test_json_request_accepts_numeric_geo() {
        let request: FilterRequest = serde_json::from_str(
            r#"{"geo_lat": 39.75, "geo_lng": "-105", "geo_radius": 10, "page": 2}"#,
        )
        .expect("Should parse");
        assert_eq!(request.geo_lat.as_deref(), Some("39.75"));
        assert_eq!(request.geo_lng.as_deref(), Some("-105"));
        assert_eq!(request.geo_radius.as_deref(), Some("10"));
        assert_eq!(request.page, Some(2));
    }

    #[test]
    fn test_explicit_range_overrides_scope() {
        let builder = QueryBuilder::new(&EngineConfig::default());
        let store = InMemoryStore::new();
        let request = FilterRequest {
            scope: Some("this-weekend".to_string()),
            date_start: Some("2026-03-01".to_string()),
            ..FilterRequest::default()
        };

        let spec = builder.build(&request, now(), &store).unwrap();
        assert_eq!(spec.window.start, NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(spec.window.end, None);
    }

    #[test]
    fn test_unknown_scope_is_default_window() {
        let builder = QueryBuilder::new(&EngineConfig::default());
        let store = InMemoryStore::new();
        let request = FilterRequest {
            scope: Some("next-decade".to_string()),
            ..FilterRequest::default()
        };

        let spec = builder.build(&request, now(), &store).unwrap();
        assert!(spec.window.is_unbounded());
        assert_eq!(spec.direction, Direction::Upcoming);
    }

    #[test]
    fn test_invalid_geo_degrades_to_no_geo() {
        let builder = QueryBuilder::new(&EngineConfig::default());
        let store = store_with_venue();

        for (lat, lng, radius) in [("95", "-105", "10"), ("39.7", "-105", "wide"), ("north", "0", "5")] {
            let request = FilterRequest {
                geo_lat: Some(lat.to_string()),
                geo_lng: Some(lng.to_string()),
                geo_radius: Some(radius.to_string()),
                ..FilterRequest::default()
            };
            let spec = builder.build(&request, now(), &store).expect("Should not fail");
            assert!(spec.geo.is_none(), "geo ({}, {}, {}) should be dropped", lat, lng, radius);
        }
    }

    #[test]
    fn test_valid_geo_resolves_venue_set() {
        let builder = QueryBuilder::new(&EngineConfig::default());
        let store = store_with_venue();
        let request = FilterRequest {
            geo_lat: Some("39.75".to_string()),
            geo_lng: Some("-105.0".to_string()),
            geo_radius: Some("5".to_string()),
            geo_radius_unit: Some("km".to_string()),
            ..FilterRequest::default()
        };

        let spec = builder.build(&request, now(), &store).unwrap();
        let geo = spec.geo.expect("geo filter");
        assert!(geo.venue_ids.contains("v1"));
        assert_eq!(geo.unit, DistanceUnit::Kilometers);
    }

    fn hydrated(categories: CategoryMap) -> HydratedEvent {
        HydratedEvent {
            id: "e1".to_string(),
            title: "Late Set".to_string(),
            description: None,
            url: None,
            cost: None,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(),
            start_time: None,
            end_date: None,
            end_time: None,
            timezone: Tz::UTC,
            occurrences: vec![],
            categories,
            venue: None,
            organizer: None,
        }
    }

    #[test]
    fn test_archive_pin_cannot_be_diluted() {
        let builder = QueryBuilder::new(&EngineConfig::default());
        let store = InMemoryStore::new();
        let mut request = FilterRequest {
            archive_category: Some("series".to_string()),
            archive_term_id: Some("residency".to_string()),
            ..FilterRequest::default()
        };
        request
            .category_filter
            .insert("series".to_string(), vec!["other".to_string()]);

        let spec = builder.build(&request, now(), &store).unwrap();

        assert!(
            !spec.matches(&hydrated(cats(&[("series", &["other"])]))),
            "selecting another term must not widen an archive view"
        );
        assert!(spec.matches(&hydrated(cats(&[("series", &["other", "residency"])]))));
        assert!(!spec.matches(&hydrated(cats(&[("series", &["residency"])]))));
    }

    #[test]
    fn test_search_matches_title_case_insensitively() {
        let builder = QueryBuilder::new(&EngineConfig::default());
        let store = InMemoryStore::new();
        let request = FilterRequest {
            search: Some("LATE".to_string()),
            ..FilterRequest::default()
        };
        let spec = builder.build(&request, now(), &store).unwrap();
        assert!(spec.matches(&hydrated(CategoryMap::new())));
    }

    #[test]
    fn test_fingerprint_is_deterministic_and_sensitive() {
        let builder = QueryBuilder::new(&EngineConfig::default());
        let store = InMemoryStore::new();
        let mut request = FilterRequest::default();
        request
            .category_filter
            .insert("genre".to_string(), vec!["b".to_string(), "a".to_string()]);

        let a = builder.build(&request, now(), &store).unwrap().fingerprint().unwrap();
        request
            .category_filter
            .insert("genre".to_string(), vec!["a".to_string(), "b".to_string()]);
        let b = builder.build(&request, now(), &store).unwrap().fingerprint().unwrap();
        assert_eq!(a, b, "term order must not change the fingerprint");

        request.past = true;
        let c = builder.build(&request, now(), &store).unwrap().fingerprint().unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_fingerprint_follows_the_clock_step() {
        let builder = QueryBuilder::new(&EngineConfig::default());
        let store = InMemoryStore::new();
        let request = FilterRequest::default();
        let at = |h, m, s| {
            builder
                .build(&request, Utc.with_ymd_and_hms(2026, 1, 14, h, m, s).unwrap(), &store)
                .unwrap()
        };

        let early = at(9, 0, 5);
        let late = at(9, 0, 55);
        assert_eq!(early.now, Utc.with_ymd_and_hms(2026, 1, 14, 9, 0, 0).unwrap());
        assert_eq!(early.fingerprint().unwrap(), late.fingerprint().unwrap());

        let next = at(11, 0, 0);
        assert_eq!(early.today, next.today);
        assert_ne!(early.fingerprint().unwrap(), next.fingerprint().unwrap());
    }

    #[test]
    fn test_transform_runs_before_fingerprint() {
        let builder = QueryBuilder::new(&EngineConfig::default()).with_transform(Arc::new(
            |spec: &mut FilterSpec| {
                spec.search = Some("forced".to_string());
            },
        ));
        let store = InMemoryStore::new();
        let spec = builder.build(&FilterRequest::default(), now(), &store).unwrap();
        assert_eq!(spec.search.as_deref(), Some("forced"));
        assert!(spec.fingerprint().unwrap().contains("forced"));
    }
}
