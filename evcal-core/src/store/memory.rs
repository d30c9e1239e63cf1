//! In-memory event store backed by a JSON dataset.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::CalendarResult;
use crate::event::{EventRecord, HydratedEvent, Organizer, Venue};
use crate::geo::VenueLocation;
use crate::hydrate::EventHydrator;
use crate::query::{Direction, FilterSpec};
use crate::store::{EventStore, FoundEvents, Mutation, MutationBus};

/// On-disk shape of a calendar dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub events: Vec<EventRecord>,
    pub venues: Vec<Venue>,
    pub organizers: Vec<Organizer>,
}

impl Dataset {
    pub fn load(path: &Path) -> CalendarResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Default)]
struct Tables {
    events: BTreeMap<String, EventRecord>,
    venues: BTreeMap<String, Venue>,
    organizers: BTreeMap<String, Organizer>,
}

impl Tables {
    fn hydrate(&self, hydrator: &EventHydrator, record: &EventRecord) -> Option<HydratedEvent> {
        let venue = record.venue_id.as_ref().and_then(|id| self.venues.get(id));
        let organizer = record.organizer_id.as_ref().and_then(|id| self.organizers.get(id));
        hydrator.hydrate(record, venue, organizer)
    }
}

/// Reference store: evaluates filter specs over hydrated records and
/// publishes a `Mutation` after every write.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    hydrator: EventHydrator,
    bus: MutationBus,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        InMemoryStore::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::with_config(&EngineConfig::default())
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        InMemoryStore {
            tables: RwLock::new(Tables::default()),
            hydrator: EventHydrator::new(config),
            bus: MutationBus::default(),
        }
    }

    pub fn from_dataset(dataset: Dataset, config: &EngineConfig) -> Self {
        let store = InMemoryStore::with_config(config);
        {
            let mut tables = store.write();
            tables.events = dataset.events.into_iter().map(|e| (e.id.clone(), e)).collect();
            tables.venues = dataset.venues.into_iter().map(|v| (v.id.clone(), v)).collect();
            tables.organizers = dataset
                .organizers
                .into_iter()
                .map(|o| (o.id.clone(), o))
                .collect();
        }
        store
    }

    pub fn load(path: &Path, config: &EngineConfig) -> CalendarResult<Self> {
        Ok(InMemoryStore::from_dataset(Dataset::load(path)?, config))
    }

    pub fn bus(&self) -> &MutationBus {
        &self.bus
    }

    pub fn event_count(&self) -> usize {
        self.read().events.len()
    }

    // A poisoned lock still holds consistent maps: every write is a single insert/remove.
    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    // MUTATIONS (each publishes after the write lock is released):

    pub fn upsert_event(&self, record: EventRecord) {
        let id = record.id.clone();
        let existed = self.write().events.insert(id.clone(), record).is_some();
        self.bus.publish(if existed {
            Mutation::EventUpdated { id }
        } else {
            Mutation::EventCreated { id }
        });
    }

    pub fn remove_event(&self, id: &str) -> Option<EventRecord> {
        let removed = self.write().events.remove(id);
        if removed.is_some() {
            self.bus.publish(Mutation::EventDeleted { id: id.to_string() });
        }
        removed
    }

    pub fn upsert_venue(&self, venue: Venue) {
        let id = venue.id.clone();
        self.write().venues.insert(id.clone(), venue);
        self.bus.publish(Mutation::VenueChanged { id });
    }

    pub fn remove_venue(&self, id: &str) -> Option<Venue> {
        let removed = self.write().venues.remove(id);
        if removed.is_some() {
            self.bus.publish(Mutation::VenueChanged { id: id.to_string() });
        }
        removed
    }

    pub fn upsert_organizer(&self, organizer: Organizer) {
        let id = organizer.id.clone();
        self.write().organizers.insert(id.clone(), organizer);
        self.bus.publish(Mutation::OrganizerChanged { id });
    }

    /// Rename a category term on every event that carries it.
    pub fn rename_term(&self, group: &str, from: &str, to: &str) {
        {
            let mut tables = self.write();
            for record in tables.events.values_mut() {
                if let Some(terms) = record.categories.get_mut(group) {
                    if terms.remove(from) {
                        terms.insert(to.to_string());
                    }
                }
            }
        }
        self.bus.publish(Mutation::CategoryTermChanged {
            group: group.to_string(),
            term: from.to_string(),
        });
    }
}

impl EventStore for InMemoryStore {
    fn find(&self, spec: &FilterSpec) -> CalendarResult<FoundEvents> {
        let tables = self.read();

        let mut matches: Vec<HydratedEvent> = tables
            .events
            .values()
            .filter_map(|record| tables.hydrate(&self.hydrator, record))
            .filter(|event| spec.matches(event))
            .collect();

        matches.sort_by(|a, b| {
            let a_start = a.starts_at().with_timezone(&Utc);
            let b_start = b.starts_at().with_timezone(&Utc);
            a_start.cmp(&b_start).then_with(|| a.id.cmp(&b.id))
        });
        if spec.direction == Direction::Past {
            matches.reverse();
        }

        let ids: Vec<String> = matches.into_iter().map(|e| e.id).collect();
        Ok(FoundEvents {
            total: ids.len(),
            ids,
        })
    }

    fn raw_event(&self, id: &str) -> CalendarResult<Option<EventRecord>> {
        Ok(self.read().events.get(id).cloned())
    }

    fn venue(&self, id: &str) -> CalendarResult<Option<Venue>> {
        Ok(self.read().venues.get(id).cloned())
    }

    fn organizer(&self, id: &str) -> CalendarResult<Option<Organizer>> {
        Ok(self.read().organizers.get(id).cloned())
    }

    fn venue_locations(&self) -> CalendarResult<Vec<VenueLocation>> {
        Ok(self
            .read()
            .venues
            .values()
            .filter_map(|v| {
                let (latitude, longitude) = v.coordinates()?;
                Some(VenueLocation {
                    venue_id: v.id.clone(),
                    latitude,
                    longitude,
                })
            })
            .collect())
    }
}
