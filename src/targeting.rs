//! Targeting levels and the fallback chain derived from them.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::geo::GeoLookup;

/// Target that matches the queried name itself
pub const GLOBAL_TARGET: &str = "@";

/// Bitmask of the targeting levels a zone answers with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TargetOptions(u8);

impl TargetOptions {
    pub const GLOBAL: TargetOptions = TargetOptions(1);
    pub const CONTINENT: TargetOptions = TargetOptions(1 << 1);
    pub const COUNTRY: TargetOptions = TargetOptions(1 << 2);
    pub const REGION_GROUP: TargetOptions = TargetOptions(1 << 3);
    pub const REGION: TargetOptions = TargetOptions(1 << 4);

    const NAMES: [(TargetOptions, &'static str); 5] = [
        (TargetOptions::GLOBAL, GLOBAL_TARGET),
        (TargetOptions::CONTINENT, "continent"),
        (TargetOptions::COUNTRY, "country"),
        (TargetOptions::REGION_GROUP, "regiongroup"),
        (TargetOptions::REGION, "region"),
    ];

    pub fn empty() -> Self {
        TargetOptions(0)
    }

    pub fn contains(self, other: TargetOptions) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Fallback chain for a client, most specific first, always ending in
    /// the global target when that level is enabled
    pub fn targets(self, client: &GeoLookup) -> Vec<String> {
        let levels = [
            (TargetOptions::REGION, &client.region),
            (TargetOptions::REGION_GROUP, &client.region_group),
            (TargetOptions::COUNTRY, &client.country),
            (TargetOptions::CONTINENT, &client.continent),
        ];

        let mut targets: Vec<String> = levels
            .into_iter()
            .filter(|(level, _)| self.contains(*level))
            .filter_map(|(_, value)| value.as_deref())
            .filter(|value| !value.is_empty())
            .map(str::to_lowercase)
            .collect();

        if self.contains(TargetOptions::GLOBAL) {
            targets.push(GLOBAL_TARGET.to_string());
        }
        targets
    }
}

impl std::ops::BitOr for TargetOptions {
    type Output = TargetOptions;

    fn bitor(self, rhs: TargetOptions) -> TargetOptions {
        TargetOptions(self.0 | rhs.0)
    }
}

impl FromStr for TargetOptions {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut options = TargetOptions::empty();
        for word in s.split_whitespace() {
            let (level, _) = Self::NAMES
                .iter()
                .find(|(_, name)| word.eq_ignore_ascii_case(name))
                .ok_or_else(|| ConfigError::InvalidTargeting(word.to_string()))?;
            options = options | *level;
        }
        Ok(options)
    }
}

impl fmt::Display for TargetOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(level, _)| self.contains(*level))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join(" "))
    }
}
