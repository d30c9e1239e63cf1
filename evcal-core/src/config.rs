//! Engine configuration.
//!
//! Loaded from ~/.config/evcal/config.toml, layered with `EVCAL_*`
//! environment variables (`EVCAL_PAGING__MIN_DAYS_PER_PAGE=7`).

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{
    DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_TTL_SECS, DEFAULT_CLOCK_RESOLUTION_SECS,
    DEFAULT_TIMEZONE, GAP_THRESHOLD_DAYS, MAX_RADIUS, MAX_SPAN_DAYS, MIN_DAYS_PER_PAGE,
    MIN_EVENTS_PER_PAGE, SENTINEL_END_TIME,
};
use crate::error::{CalendarError, CalendarResult};
use crate::geo::DistanceUnit;
use crate::query::CategoryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// IANA timezone used when neither venue nor event carries one.
    pub default_timezone: String,
    /// Stored end time meaning "no explicit end time".
    pub sentinel_end_time: String,
    pub paging: PagingConfig,
    pub grouping: GroupingConfig,
    pub geo: GeoConfig,
    pub cache: CacheConfig,
    pub query: QueryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_timezone: DEFAULT_TIMEZONE.to_string(),
            sentinel_end_time: SENTINEL_END_TIME.to_string(),
            paging: PagingConfig::default(),
            grouping: GroupingConfig::default(),
            geo: GeoConfig::default(),
            cache: CacheConfig::default(),
            query: QueryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    pub min_days_per_page: usize,
    pub min_events_per_page: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        PagingConfig {
            min_days_per_page: MIN_DAYS_PER_PAGE,
            min_events_per_page: MIN_EVENTS_PER_PAGE,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    pub gap_threshold_days: i64,
    pub max_span_days: i64,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        GroupingConfig {
            gap_threshold_days: GAP_THRESHOLD_DAYS,
            max_span_days: MAX_SPAN_DAYS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub max_radius: f64,
    pub default_unit: DistanceUnit,
}

impl Default for GeoConfig {
    fn default() -> Self {
        GeoConfig {
            max_radius: MAX_RADIUS,
            default_unit: DistanceUnit::Miles,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Human-readable duration, e.g. "1h" or "15m"
    pub ttl: String,
    pub max_entries: u64,
    /// Granularity of the query clock. Requests within one step share
    /// cached results.
    pub clock_resolution: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            ttl: format!("{}s", DEFAULT_CACHE_TTL_SECS),
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            clock_resolution: format!("{}s", DEFAULT_CLOCK_RESOLUTION_SECS),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        humantime::parse_duration(&self.ttl).unwrap_or_else(|e| {
            warn!(ttl = %self.ttl, error = %e, "invalid cache ttl, using default");
            Duration::from_secs(DEFAULT_CACHE_TTL_SECS)
        })
    }

    pub fn clock_resolution(&self) -> Duration {
        match humantime::parse_duration(&self.clock_resolution) {
            Ok(resolution) if !resolution.is_zero() => resolution,
            Ok(_) => Duration::from_secs(1),
            Err(e) => {
                warn!(
                    clock_resolution = %self.clock_resolution,
                    error = %e,
                    "invalid clock resolution, using default"
                );
                Duration::from_secs(DEFAULT_CLOCK_RESOLUTION_SECS)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub category_policy: CategoryPolicy,
}

impl EngineConfig {
    pub fn config_path() -> CalendarResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CalendarError::Config("Could not determine config directory".into()))?
            .join("evcal");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location, writing a commented template on first use.
    pub fn load() -> CalendarResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> CalendarResult<Self> {
        Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(Environment::with_prefix("EVCAL").separator("__"))
            .build()
            .map_err(|e| CalendarError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CalendarError::Config(e.to_string()))
    }

    pub fn from_toml(content: &str) -> CalendarResult<Self> {
        toml::from_str(content).map_err(|e| CalendarError::Config(e.to_string()))
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> CalendarResult<()> {
        let contents = format!(
            "\
# evcal engine configuration

# Timezone for events whose venue has none:
# default_timezone = \"{tz}\"

# Stored end time that means \"no end time given\":
# sentinel_end_time = \"{sentinel}\"

# [paging]
# min_days_per_page = {days}
# min_events_per_page = {events}

# [grouping]
# gap_threshold_days = {gap}
# max_span_days = {span}

# [geo]
# max_radius = {radius}
# default_unit = \"mi\"

# [cache]
# enabled = true
# ttl = \"1h\"
# max_entries = {entries}
# clock_resolution = \"1m\"

# [query]
# category_policy = \"all-groups-any-term\"
",
            tz = DEFAULT_TIMEZONE,
            sentinel = SENTINEL_END_TIME,
            days = MIN_DAYS_PER_PAGE,
            events = MIN_EVENTS_PER_PAGE,
            gap = GAP_THRESHOLD_DAYS,
            span = MAX_SPAN_DAYS,
            radius = MAX_RADIUS,
            entries = DEFAULT_CACHE_MAX_ENTRIES,
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CalendarError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| CalendarError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// The configured default timezone, falling back to UTC when unknown.
    pub fn timezone(&self) -> Tz {
        Tz::from_str(&self.default_timezone).unwrap_or_else(|_| {
            warn!(timezone = %self.default_timezone, "unknown default timezone, using UTC");
            Tz::UTC
        })
    }

    pub fn sentinel_end_time(&self) -> NaiveTime {
        NaiveTime::parse_from_str(&self.sentinel_end_time, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(SENTINEL_END_TIME, "%H:%M:%S"))
            .unwrap_or(NaiveTime::MIN)
    }
}

/// Expand `~` in a configured path.
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.paging.min_days_per_page, 5);
        assert_eq!(config.paging.min_events_per_page, 20);
        assert_eq!(config.timezone(), Tz::UTC);
        assert_eq!(config.cache.ttl(), Duration::from_secs(3600));
        assert_eq!(config.cache.clock_resolution(), Duration::from_secs(60));
        assert_eq!(
            config.sentinel_end_time(),
            NaiveTime::from_hms_opt(23, 59, 59).unwrap()
        );
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = EngineConfig::from_toml(
            r#"
default_timezone = "America/Denver"

[paging]
min_events_per_page = 10

[cache]
ttl = "15m"
clock_resolution = "5m"

[query]
category_policy = "any-group-any-term"
"#,
        )
        .expect("Should parse");

        assert_eq!(config.timezone(), chrono_tz::America::Denver);
        assert_eq!(config.paging.min_events_per_page, 10);
        assert_eq!(config.paging.min_days_per_page, 5);
        assert_eq!(config.cache.ttl(), Duration::from_secs(900));
        assert_eq!(config.cache.clock_resolution(), Duration::from_secs(300));
        assert_eq!(config.query.category_policy, CategoryPolicy::AnyGroupAnyTerm);
    }

    #[test]
    fn test_unknown_timezone_falls_back_to_utc() {
        let config = EngineConfig {
            default_timezone: "Mars/Olympus_Mons".to_string(),
            ..EngineConfig::default()
        };
        assert_eq!(config.timezone(), Tz::UTC);
    }

    #[test]
    fn test_default_config_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evcal/config.toml");

        EngineConfig::create_default_config(&path).unwrap();
        let config = EngineConfig::load_from(&path).expect("Commented template should load");

        assert_eq!(config.paging.min_days_per_page, MIN_DAYS_PER_PAGE);
    }
}
