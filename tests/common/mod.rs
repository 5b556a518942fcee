//! Shared helpers for the zone engine integration tests

#![allow(dead_code)]

use geozone::health::{HealthTest, TestRegistry, TestRunner};
use geozone::zone::{Record, ResourceRecord, Zone};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Runner that records every call on top of an in-memory registry
#[derive(Default)]
pub struct RecordingRunner {
    pub registry: TestRegistry,
    pub added: Mutex<Vec<String>>,
    pub removed: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn added(&self) -> Vec<String> {
        self.added.lock().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().clone()
    }
}

impl TestRunner for RecordingRunner {
    fn add_test(&self, test: Arc<HealthTest>, key: &str) {
        self.added.lock().push(key.to_string());
        self.registry.add_test(test, key);
    }

    fn remove_test(&self, test: &Arc<HealthTest>, key: &str) {
        self.removed.lock().push(key.to_string());
        self.registry.remove_test(test, key);
    }

    fn is_healthy(&self, test: &HealthTest) -> bool {
        self.registry.is_healthy(test)
    }
}

/// Parse a record in presentation format
pub fn record(text: &str) -> Record {
    Record::new(ResourceRecord::parse(text).unwrap())
}

/// Build a zone from `(label, record)` pairs; record names are not
/// checked against the label
pub fn build_zone(origin: &str, records: &[(&str, &str)]) -> Zone {
    let mut zone = Zone::new(origin);
    for (name, text) in records {
        let name = name.to_lowercase();
        if zone.label(&name).is_none() {
            zone.add_label(&name);
        }
        if let Some(label) = zone.label_mut(&name) {
            label.add_record(record(text));
        }
    }
    zone
}

/// Attach a health check definition to an existing label
pub fn with_health(mut zone: Zone, label: &str, definition: Value) -> Zone {
    zone.label_mut(label)
        .unwrap()
        .set_health_test(Some(&definition));
    zone
}
