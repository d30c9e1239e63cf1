//! Default tuning values. Every one of these can be overridden in config.

/// A page closes only once it holds at least this many distinct days...
pub const MIN_DAYS_PER_PAGE: usize = 5;

/// ...and at least this many event occurrences.
pub const MIN_EVENTS_PER_PAGE: usize = 20;

/// Consecutive populated days this far apart get a separator.
pub const GAP_THRESHOLD_DAYS: i64 = 7;

/// Longest start..end range expanded into per-day buckets.
pub const MAX_SPAN_DAYS: i64 = 366;

/// Upper bound for geo search radius, in the requested unit.
pub const MAX_RADIUS: f64 = 500.0;

/// Lower bound for geo search radius, in the requested unit.
pub const MIN_RADIUS: f64 = 1.0;

pub const EARTH_RADIUS_MILES: f64 = 3958.8;
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// End time stored when no explicit end time was supplied.
pub const SENTINEL_END_TIME: &str = "23:59:59";

pub const DEFAULT_TIMEZONE: &str = "UTC";

pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_CACHE_MAX_ENTRIES: u64 = 1024;

/// Query clocks are truncated to this many seconds before filtering.
pub const DEFAULT_CLOCK_RESOLUTION_SECS: u64 = 60;

/// Radius used when geo coordinates arrive without one.
pub const DEFAULT_RADIUS: f64 = 25.0;
