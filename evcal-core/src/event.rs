//! Event, venue and organizer records.
//!
//! `EventRecord` is what the store hands out: the authored attributes as
//! they were imported, plus references into the venue/organizer side tables
//! and an optional authoritative schedule. `HydratedEvent` is the read-only
//! projection the calendar works with once those sources are merged.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Category group name -> selected term ids.
pub type CategoryMap = BTreeMap<String, BTreeSet<String>>;

/// A raw event as stored by the import pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub title: String,

    /// Explicit display dates for irregular series. Overrides range expansion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub occurrences: Vec<NaiveDate>,

    #[serde(default)]
    pub categories: CategoryMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer_id: Option<String>,

    /// The record's own copy of its details. May be stale.
    #[serde(default)]
    pub attributes: AuthoredAttributes,

    /// Side-table schedule. Wins over the authored dates when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<EventSchedule>,
}

/// Attributes as authored on the event itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthoredAttributes {
    pub start_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_date: Option<NaiveDate>,
    pub end_time: Option<NaiveTime>,
    pub timezone: Option<String>,

    pub description: Option<String>,
    pub url: Option<String>,
    pub cost: Option<String>,

    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub venue_city: Option<String>,
    pub venue_region: Option<String>,
    pub venue_postal_code: Option<String>,

    pub organizer_name: Option<String>,
    pub organizer_url: Option<String>,
}

/// Authoritative start/end kept in a side table by the import pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSchedule {
    pub start: NaiveDateTime,
    #[serde(default)]
    pub end: Option<NaiveDateTime>,
    #[serde(default)]
    pub all_day: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// IANA timezone id, e.g. "America/Denver"
    #[serde(default)]
    pub timezone: Option<String>,
}

impl Venue {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizerKind {
    #[default]
    Organization,
    Person,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organizer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub kind: OrganizerKind,
}

// ============================================================================
// Hydrated projection
// ============================================================================

/// Venue details after side-table precedence has been applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenueInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub coordinates: Option<(f64, f64)>,
}

impl VenueInfo {
    /// "street, city, region postal" with missing parts skipped.
    pub fn address_line(&self) -> Option<String> {
        let region_postal = match (&self.region, &self.postal_code) {
            (Some(r), Some(p)) => Some(format!("{} {}", r, p)),
            (Some(r), None) => Some(r.clone()),
            (None, Some(p)) => Some(p.clone()),
            (None, None) => None,
        };

        let parts: Vec<String> = [self.address.clone(), self.city.clone(), region_postal]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrganizerInfo {
    pub id: Option<String>,
    pub name: String,
    pub url: Option<String>,
    pub kind: OrganizerKind,
}

/// An event with authored data merged with its side tables.
///
/// Dates and times are wall-clock values in `timezone`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HydratedEvent {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub cost: Option<String>,

    pub start_date: NaiveDate,
    /// None for all-day events.
    pub start_time: Option<NaiveTime>,
    pub end_date: Option<NaiveDate>,
    /// None when no explicit end time was supplied.
    pub end_time: Option<NaiveTime>,
    pub timezone: Tz,

    pub occurrences: Vec<NaiveDate>,
    pub categories: CategoryMap,
    pub venue: Option<VenueInfo>,
    pub organizer: Option<OrganizerInfo>,
}

impl HydratedEvent {
    pub fn is_all_day(&self) -> bool {
        self.start_time.is_none()
    }

    /// Start instant in the event's timezone. All-day events start at midnight.
    pub fn starts_at(&self) -> DateTime<Tz> {
        let time = self.start_time.unwrap_or(NaiveTime::MIN);
        localize(self.timezone, self.start_date.and_time(time))
    }

    /// End instant in the event's timezone.
    ///
    /// Without an explicit end time the event runs to the end of its last day.
    pub fn ends_at(&self) -> DateTime<Tz> {
        let date = self.last_date();
        let time = match (self.end_time, self.end_date) {
            (Some(t), Some(d)) if d == date => t,
            _ => end_of_day(),
        };
        localize(self.timezone, date.and_time(time))
    }

    /// Last calendar day the event touches.
    pub fn last_date(&self) -> NaiveDate {
        let range_end = self
            .end_date
            .filter(|end| *end >= self.start_date)
            .unwrap_or(self.start_date);

        match self.occurrences.iter().max() {
            Some(last) => (*last).max(range_end),
            None => range_end,
        }
    }

    /// True when the event covers a continuous multi-day range.
    pub fn is_multi_day(&self) -> bool {
        self.occurrences.is_empty()
            && self
                .end_date
                .is_some_and(|end| end > self.start_date)
    }

    pub fn venue_name(&self) -> Option<&str> {
        self.venue.as_ref().and_then(|v| v.name.as_deref())
    }

    pub fn venue_id(&self) -> Option<&str> {
        self.venue.as_ref().and_then(|v| v.id.as_deref())
    }

    pub fn organizer_name(&self) -> Option<&str> {
        self.organizer.as_ref().map(|o| o.name.as_str())
    }
}

impl fmt::Display for HydratedEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

/// Resolve a wall-clock time in `tz`, taking the earlier instant when the
/// local time is ambiguous and shifting past the gap when it does not exist.
pub fn localize(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive).earliest() {
        Some(dt) => dt,
        None => tz.from_utc_datetime(&naive),
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}
