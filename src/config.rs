use crate::error::ConfigError;
use crate::metrics::DEFAULT_STATS_CAPACITY;
use crate::targeting::TargetOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Default TTL for labels without their own
    pub default_ttl: u32,

    /// Default cap on answers per response
    pub default_max_hosts: usize,

    /// Default targeting levels for new zones
    pub default_targeting: TargetOptions,

    /// Whether new labels answer with the closest addresses by default
    pub default_closest: bool,

    /// How many alias (MF) hops a single resolution may follow
    pub max_alias_depth: usize,

    /// Entries kept by the recent label and client trackers
    pub stats_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_ttl: 120,
            default_max_hosts: 2,
            default_targeting: TargetOptions::GLOBAL
                | TargetOptions::CONTINENT
                | TargetOptions::COUNTRY,
            default_closest: false,
            max_alias_depth: 64,
            stats_capacity: DEFAULT_STATS_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Create an EngineConfig from environment variables
    /// Returns Err if a variable is present but invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(ttl) = std::env::var("GEOZONE_DEFAULT_TTL") {
            config.default_ttl = ttl
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidTtl(ttl.clone()))?;
        }

        if let Ok(max_hosts) = std::env::var("GEOZONE_MAX_HOSTS") {
            config.default_max_hosts = max_hosts
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidMaxHosts(max_hosts.clone()))?;
        }

        if let Ok(targeting) = std::env::var("GEOZONE_TARGETING") {
            config.default_targeting = targeting.parse()?;
        }

        if let Ok(closest) = std::env::var("GEOZONE_CLOSEST") {
            config.default_closest = parse_bool(&closest, false);
        }

        if let Ok(depth) = std::env::var("GEOZONE_MAX_ALIAS_DEPTH") {
            config.max_alias_depth = depth
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidAliasDepth(depth.clone()))?;
        }

        if let Ok(capacity) = std::env::var("GEOZONE_STATS_CAPACITY") {
            config.stats_capacity = capacity
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidStatsCapacity(capacity.clone()))?;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_alias_depth == 0 || self.max_alias_depth > 4096 {
            return Err(ConfigError::InvalidAliasDepth(format!(
                "{} (must be between 1 and 4096)",
                self.max_alias_depth
            )));
        }

        if self.stats_capacity == 0 || self.stats_capacity > 10_000_000 {
            return Err(ConfigError::InvalidStatsCapacity(format!(
                "{} (must be between 1 and 10 million)",
                self.stats_capacity
            )));
        }

        if self.default_targeting.is_empty() {
            return Err(ConfigError::InvalidTargeting(
                "at least one targeting level is required".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse a boolean from a string, with a default value for invalid input
fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}
