//! Merging an event's authored attributes with its side tables.
//!
//! Precedence, lowest to highest:
//! 1. authored attributes on the record
//! 2. the side-table schedule (start/end), with the sentinel end time
//!    meaning "no end time"
//! 3. the referenced venue (name, address, coordinates; timezone only when
//!    the venue has one)
//! 4. the referenced organizer (name, url, kind)

use std::str::FromStr;

use chrono::NaiveTime;
use chrono_tz::Tz;
use tracing::warn;

use crate::config::EngineConfig;
use crate::event::{
    AuthoredAttributes, EventRecord, HydratedEvent, Organizer, OrganizerInfo, OrganizerKind,
    Venue, VenueInfo,
};

#[derive(Debug, Clone, Copy)]
pub struct EventHydrator {
    default_timezone: Tz,
    sentinel_end_time: NaiveTime,
}

impl EventHydrator {
    pub fn new(config: &EngineConfig) -> Self {
        EventHydrator {
            default_timezone: config.timezone(),
            sentinel_end_time: config.sentinel_end_time(),
        }
    }

    pub fn with_timezone(default_timezone: Tz, sentinel_end_time: NaiveTime) -> Self {
        EventHydrator {
            default_timezone,
            sentinel_end_time,
        }
    }

    pub fn default_timezone(&self) -> Tz {
        self.default_timezone
    }

    /// Project a raw record into a `HydratedEvent`.
    ///
    /// `venue` and `organizer` are the side-table rows for the record's
    /// references, if they resolved. Returns None when no start date
    /// survives, which excludes the event from every view.
    pub fn hydrate(
        &self,
        record: &EventRecord,
        venue: Option<&Venue>,
        organizer: Option<&Organizer>,
    ) -> Option<HydratedEvent> {
        let attrs = &record.attributes;

        let mut start_date = attrs.start_date;
        let mut start_time = attrs.start_time;
        let mut end_date = attrs.end_date;
        let mut end_time = attrs.end_time;

        if let Some(schedule) = &record.schedule {
            start_date = Some(schedule.start.date());
            start_time = (!schedule.all_day).then(|| schedule.start.time());
            end_date = schedule.end.map(|end| end.date());
            end_time = schedule
                .end
                .filter(|_| !schedule.all_day)
                .map(|end| end.time());
        }

        end_time = end_time.filter(|t| *t != self.sentinel_end_time);

        let start_date = start_date?;

        let mut occurrences = record.occurrences.clone();
        occurrences.sort();
        occurrences.dedup();

        Some(HydratedEvent {
            id: record.id.clone(),
            title: record.title.trim().to_string(),
            description: non_blank(&attrs.description),
            url: non_blank(&attrs.url),
            cost: non_blank(&attrs.cost),
            start_date,
            start_time,
            end_date,
            end_time,
            timezone: self.timezone_for(record, venue),
            occurrences,
            categories: record.categories.clone(),
            venue: venue_info(record, venue),
            organizer: organizer_info(record, organizer),
        })
    }

    /// Venue timezone, else the authored one, else the configured default.
    fn timezone_for(&self, record: &EventRecord, venue: Option<&Venue>) -> Tz {
        let venue_tz = venue
            .filter(|_| record.venue_id.is_some())
            .and_then(|v| v.timezone.as_deref());

        venue_tz
            .or(record.attributes.timezone.as_deref())
            .and_then(|name| match Tz::from_str(name.trim()) {
                Ok(tz) => Some(tz),
                Err(_) => {
                    warn!(event = %record.id, timezone = name, "unknown timezone, using default");
                    None
                }
            })
            .unwrap_or(self.default_timezone)
    }
}

fn venue_info(record: &EventRecord, venue: Option<&Venue>) -> Option<VenueInfo> {
    if let (Some(_), Some(venue)) = (&record.venue_id, venue) {
        return Some(VenueInfo {
            id: Some(venue.id.clone()),
            name: Some(venue.name.clone()),
            address: venue.address.clone(),
            city: venue.city.clone(),
            region: venue.region.clone(),
            postal_code: venue.postal_code.clone(),
            coordinates: venue.coordinates(),
        });
    }

    let attrs: &AuthoredAttributes = &record.attributes;
    let info = VenueInfo {
        id: record.venue_id.clone(),
        name: non_blank(&attrs.venue_name),
        address: non_blank(&attrs.venue_address),
        city: non_blank(&attrs.venue_city),
        region: non_blank(&attrs.venue_region),
        postal_code: non_blank(&attrs.venue_postal_code),
        coordinates: None,
    };

    let is_empty = info.id.is_none() && info.name.is_none() && info.address_line().is_none();
    (!is_empty).then_some(info)
}

fn organizer_info(record: &EventRecord, organizer: Option<&Organizer>) -> Option<OrganizerInfo> {
    if let (Some(_), Some(organizer)) = (&record.organizer_id, organizer) {
        return Some(OrganizerInfo {
            id: Some(organizer.id.clone()),
            name: organizer.name.clone(),
            url: organizer.url.clone(),
            kind: organizer.kind,
        });
    }

    let name = non_blank(&record.attributes.organizer_name)?;
    Some(OrganizerInfo {
        id: record.organizer_id.clone(),
        name,
        url: non_blank(&record.attributes.organizer_url),
        kind: OrganizerKind::default(),
    })
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
