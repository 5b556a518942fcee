use super::{Result, Zone};
use crate::geo::GeoProvider;
use crate::health::TestRunner;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Published zones, indexed by origin.
///
/// Zones are immutable once published; a reload builds a new [`Zone`] and
/// swaps it in, so readers holding the previous `Arc<Zone>` are never
/// disturbed.
pub struct ZoneStore {
    zones: Arc<RwLock<HashMap<String, Arc<Zone>>>>,
    geo: Arc<dyn GeoProvider>,
    runner: Arc<dyn TestRunner>,
    /// Serializes publishes so carry-over always sees the latest zone
    publish_lock: Mutex<()>,
}

impl ZoneStore {
    pub fn new(geo: Arc<dyn GeoProvider>, runner: Arc<dyn TestRunner>) -> Self {
        Self {
            zones: Arc::new(RwLock::new(HashMap::new())),
            geo,
            runner,
            publish_lock: Mutex::new(()),
        }
    }

    /// Prepare `zone` and make it the live zone for its origin.
    ///
    /// The zone inherits metrics and health state from the zone it replaces,
    /// which is then retired. If any step fails the previous zone stays live.
    pub fn publish(&self, mut zone: Zone) -> Result<Arc<Zone>> {
        let _guard = self.publish_lock.lock();
        let origin = zone.origin.clone();
        let old = self.get(&origin);

        zone.ensure_soa()?;
        zone.setup_metrics(old.as_deref())?;
        zone.set_locations(self.geo.as_ref());
        zone.start_health_checks(self.runner.as_ref(), old.as_deref());

        let zone = Arc::new(zone);
        self.zones.write().insert(origin.clone(), Arc::clone(&zone));

        match old {
            Some(old) => {
                info!("Reloaded zone: {}", origin);
                old.stop_health_checks(self.runner.as_ref());
                old.release_metrics();
            }
            None => info!("Added zone: {}", origin),
        }

        Ok(zone)
    }

    /// Remove the zone for `origin`, stopping its checks and closing its metrics
    pub fn retire(&self, origin: &str) -> Option<Arc<Zone>> {
        let _guard = self.publish_lock.lock();
        let origin = origin.trim_end_matches('.').to_lowercase();

        let zone = self.zones.write().remove(&origin)?;
        info!("Removing zone: {}", origin);
        zone.close(self.runner.as_ref());
        Some(zone)
    }

    /// Get a zone by origin
    pub fn get(&self, origin: &str) -> Option<Arc<Zone>> {
        let origin = origin.trim_end_matches('.').to_lowercase();
        self.zones.read().get(&origin).cloned()
    }

    /// Find the zone that is authoritative for a given name
    pub fn find_zone(&self, name: &str) -> Option<Arc<Zone>> {
        let zones = self.zones.read();

        let best = zones
            .values()
            .filter(|zone| zone.is_authoritative_for(name))
            .max_by_key(|zone| zone.label_count)
            .cloned();

        if best.is_none() {
            debug!("No zone for {}", name);
        }
        best
    }

    /// Get all zone origins
    pub fn list_zones(&self) -> Vec<String> {
        let zones = self.zones.read();
        zones.keys().cloned().collect()
    }

    pub fn zone_count(&self) -> usize {
        self.zones.read().len()
    }
}
