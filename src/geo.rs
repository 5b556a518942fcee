//! Geographic lookups for zone records.
//!
//! The GeoIP database itself lives outside this crate; the engine only
//! consumes it through [`GeoProvider`]. Providers are passed explicitly to
//! the zone build steps that need them so tests can substitute fixed tables.

use std::collections::HashMap;
use std::net::IpAddr;

/// A point on the globe in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in kilometers
    pub fn distance_km(&self, other: &Location) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;

        let lat1_rad = self.latitude.to_radians();
        let lat2_rad = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);

        EARTH_RADIUS_KM * 2.0 * a.sqrt().asin()
    }
}

/// Everything a provider knows about one address
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoLookup {
    /// Lowercase ISO country code
    pub country: Option<String>,
    /// Lowercase continent code
    pub continent: Option<String>,
    /// Lowercase region group (e.g. "us-west")
    pub region_group: Option<String>,
    /// Lowercase region code (e.g. "us-ca")
    pub region: Option<String>,
    pub location: Option<Location>,
}

impl GeoLookup {
    pub fn country(country: &str, continent: &str) -> Self {
        Self {
            country: Some(country.to_lowercase()),
            continent: Some(continent.to_lowercase()),
            ..Default::default()
        }
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

/// Source of IP geolocation data
pub trait GeoProvider: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> Option<GeoLookup>;
}

/// Provider that never knows anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeo;

impl GeoProvider for NoGeo {
    fn lookup(&self, _ip: IpAddr) -> Option<GeoLookup> {
        None
    }
}

/// Fixed address table, handy for tests and small deployments
#[derive(Debug, Clone, Default)]
pub struct StaticGeoProvider {
    entries: HashMap<IpAddr, GeoLookup>,
}

impl StaticGeoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ip: IpAddr, lookup: GeoLookup) {
        self.entries.insert(ip, lookup);
    }

    pub fn with_entry(mut self, ip: IpAddr, lookup: GeoLookup) -> Self {
        self.insert(ip, lookup);
        self
    }
}

impl GeoProvider for StaticGeoProvider {
    fn lookup(&self, ip: IpAddr) -> Option<GeoLookup> {
        self.entries.get(&ip).cloned()
    }
}
