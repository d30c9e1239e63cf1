//! Query, pagination and caching engine for a filterable event calendar.
//!
//! Turns a filter request (search text, date range or named scope,
//! category selections, archive pin, geo radius) into one page of
//! day-grouped, display-ready events:
//! - `query` builds a canonical `FilterSpec` from a `FilterRequest`
//! - `hydrate` merges each event with its venue/organizer side tables
//! - `group` expands events into calendar days
//! - `paging` splits the result set's days into pages
//! - `cache` memoizes the expensive enumeration, flushed on any mutation
//! - `engine` runs the whole pipeline

pub mod cache;
pub mod config;
pub mod constants;
pub mod display;
pub mod engine;
pub mod error;
pub mod event;
pub mod geo;
pub mod group;
pub mod hydrate;
pub mod paging;
pub mod query;
pub mod scope;
pub mod store;

pub use cache::{CachePurpose, CacheSession, CacheStats, CalendarCache};
pub use config::EngineConfig;
pub use engine::{CalendarPage, DayView, EntryView, EventSummary, QueryEngine};
pub use error::{CalendarError, CalendarResult};
pub use event::{EventRecord, HydratedEvent, Organizer, Venue};
pub use query::{FilterRequest, FilterSpec};
pub use store::{EventStore, InMemoryStore, Mutation, MutationBus};
