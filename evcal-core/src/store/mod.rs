//! The event store contract and its mutation notifications.
//!
//! Records enter the store through an external import/editing pipeline.
//! The calendar only reads from it, and learns about writes through the
//! `MutationBus`.

mod memory;

pub use memory::{Dataset, InMemoryStore};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::CalendarResult;
use crate::event::{EventRecord, Organizer, Venue};
use crate::geo::VenueLocation;
use crate::query::FilterSpec;

/// Ids of matching events in display order, plus the total match count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoundEvents {
    pub ids: Vec<String>,
    pub total: usize,
}

pub trait EventStore: Send + Sync {
    /// Every event matching `spec`, ordered by start in its direction.
    fn find(&self, spec: &FilterSpec) -> CalendarResult<FoundEvents>;

    fn raw_event(&self, id: &str) -> CalendarResult<Option<EventRecord>>;

    fn venue(&self, id: &str) -> CalendarResult<Option<Venue>>;

    fn organizer(&self, id: &str) -> CalendarResult<Option<Organizer>>;

    /// Coordinate index over every venue that has coordinates.
    fn venue_locations(&self) -> CalendarResult<Vec<VenueLocation>>;
}

/// A write to calendar data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    EventCreated { id: String },
    EventUpdated { id: String },
    EventDeleted { id: String },
    VenueChanged { id: String },
    OrganizerChanged { id: String },
    CategoryTermChanged { group: String, term: String },
}

const BUS_CAPACITY: usize = 256;

/// Fan-out channel for mutation notices.
#[derive(Debug, Clone)]
pub struct MutationBus {
    sender: broadcast::Sender<Mutation>,
}

impl Default for MutationBus {
    fn default() -> Self {
        MutationBus::new(BUS_CAPACITY)
    }
}

impl MutationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        MutationBus { sender }
    }

    /// Publish a notice. Having no subscribers is not an error.
    pub fn publish(&self, mutation: Mutation) {
        let _ = self.sender.send(mutation);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Mutation> {
        self.sender.subscribe()
    }
}
