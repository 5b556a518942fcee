use super::record::{Record, Records, ResourceRecord};
use crate::dns::enums::RecordType;
use crate::geo::Location;
use crate::health::HealthTestConfig;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// The records owned by one name within a zone
#[derive(Debug, Clone, Default)]
pub struct Label {
    /// Name relative to the zone origin, lowercase; empty for the apex
    pub name: String,
    /// TTL override, 0 means use the zone default
    pub ttl: u32,
    /// Maximum number of records returned per answer
    pub max_hosts: usize,
    /// Answer with the records closest to the client
    pub closest: bool,
    records: HashMap<RecordType, Records>,
    weights: HashMap<RecordType, u32>,
    test: Option<Arc<HealthTestConfig>>,
}

impl Label {
    pub(crate) fn new(name: String, max_hosts: usize, closest: bool) -> Self {
        Self {
            name,
            ttl: 0,
            max_hosts,
            closest,
            records: HashMap::new(),
            weights: HashMap::new(),
            test: None,
        }
    }

    /// Records of `rtype`, in insertion order unless sorted
    pub fn records(&self, rtype: RecordType) -> &[Record] {
        self.records
            .get(&rtype)
            .map(|records| records.as_slice())
            .unwrap_or_default()
    }

    pub fn first_record(&self, rtype: RecordType) -> Option<&ResourceRecord> {
        self.records(rtype).first().map(|record| &record.rr)
    }

    pub fn has_records(&self, rtype: RecordType) -> bool {
        !self.records(rtype).is_empty()
    }

    /// Sum of the weights of all records of `rtype`, saturating at `u32::MAX`
    pub fn weight(&self, rtype: RecordType) -> u32 {
        self.weights.get(&rtype).copied().unwrap_or(0)
    }

    pub fn record_types(&self) -> impl Iterator<Item = RecordType> + '_ {
        self.records.keys().copied()
    }

    pub fn add_record(&mut self, record: Record) {
        let rtype = record.rr.rtype();
        let total = self.weights.entry(rtype).or_default();
        *total = total.saturating_add(record.weight);
        self.records.entry(rtype).or_default().push(record);
    }

    /// Sort every record set heaviest first
    pub fn sort_by_weight(&mut self) {
        for records in self.records.values_mut() {
            records.sort_by_weight();
        }
    }

    pub(crate) fn set_records(&mut self, rtype: RecordType, records: Records) {
        let weight = records
            .iter()
            .fold(0u32, |total, record| total.saturating_add(record.weight));
        self.weights.insert(rtype, weight);
        self.records.insert(rtype, records);
    }

    pub(crate) fn all_records_mut(&mut self) -> impl Iterator<Item = (RecordType, &mut Records)> + '_ {
        self.records.iter_mut().map(|(rtype, records)| (*rtype, records))
    }

    /// Health check template shared by this label's address records
    pub fn health_test(&self) -> Option<&Arc<HealthTestConfig>> {
        self.test.as_ref()
    }

    pub fn set_health_template(&mut self, template: Option<Arc<HealthTestConfig>>) {
        self.test = template;
    }

    /// Configure the template from the label's `health` definition.
    ///
    /// A malformed definition is logged and leaves the label without
    /// health gating.
    pub fn set_health_test(&mut self, data: Option<&Value>) {
        self.test = None;

        let Some(data) = data else {
            return;
        };

        match HealthTestConfig::from_value(data) {
            Ok(config) => self.test = Some(Arc::new(config)),
            Err(e) => warn!("Could not configure health check for '{}': {}", self.name, e),
        }
    }

    /// Healthy records of `rtype`, or all of them when none are healthy
    fn candidates(&self, rtype: RecordType) -> Vec<&Record> {
        let all: Vec<&Record> = self.records(rtype).iter().collect();
        let healthy: Vec<&Record> = all.iter().copied().filter(|r| r.is_healthy()).collect();
        if healthy.is_empty() { all } else { healthy }
    }

    /// Weighted random selection of up to `max` records, 0 meaning all
    pub fn pick(&self, rtype: RecordType, max: usize) -> Vec<&Record> {
        let mut remaining = self.candidates(rtype);
        if max == 0 || remaining.len() <= max {
            return remaining;
        }

        let mut rng = rand::rng();
        let mut picked = Vec::with_capacity(max);
        while picked.len() < max {
            let total: u64 = remaining.iter().map(|r| u64::from(r.weight)).sum();
            let idx = if total == 0 {
                rng.random_range(0..remaining.len())
            } else {
                let mut n = rng.random_range(0..total);
                remaining
                    .iter()
                    .position(|r| {
                        let weight = u64::from(r.weight);
                        if n < weight {
                            true
                        } else {
                            n -= weight;
                            false
                        }
                    })
                    .unwrap_or(0)
            };
            picked.push(remaining.remove(idx));
        }
        picked
    }

    /// Up to `max` records ordered by distance from `client`.
    ///
    /// Records without a resolved location sort last.
    pub fn closest(&self, rtype: RecordType, client: &Location, max: usize) -> Vec<&Record> {
        let mut candidates = self.candidates(rtype);
        let distance = |record: &Record| {
            record
                .loc
                .map(|loc| loc.distance_km(client))
                .unwrap_or(f64::INFINITY)
        };
        candidates.sort_by(|a, b| distance(a).total_cmp(&distance(b)));
        if max > 0 {
            candidates.truncate(max);
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthTest;
    use crate::zone::record::RecordData;
    use serde_json::json;

    fn a_record(ip: &str, weight: u32) -> Record {
        Record::new(ResourceRecord::new(
            "www.example.com",
            0,
            RecordData::A(ip.parse().unwrap()),
        ))
        .with_weight(weight)
    }

    #[test]
    fn test_add_record_tracks_weight() {
        let mut label = Label::new("www".to_string(), 2, false);
        label.add_record(a_record("192.0.2.1", 10));
        label.add_record(a_record("192.0.2.2", 5));

        assert_eq!(label.weight(RecordType::A), 15);
        assert_eq!(label.records(RecordType::A).len(), 2);
        assert!(label.has_records(RecordType::A));
        assert!(!label.has_records(RecordType::AAAA));
        assert!(label.records(RecordType::AAAA).is_empty());
        assert_eq!(
            label.first_record(RecordType::A).and_then(|rr| rr.ip()),
            Some("192.0.2.1".parse().unwrap())
        );
    }

    #[test]
    fn test_weight_saturates() {
        let mut label = Label::new("www".to_string(), 2, false);
        label.add_record(a_record("192.0.2.1", u32::MAX - 1));
        label.add_record(a_record("192.0.2.2", u32::MAX - 1));
        assert_eq!(label.weight(RecordType::A), u32::MAX);

        label.set_records(
            RecordType::AAAA,
            Records::from(vec![
                Record::new(ResourceRecord::new("www", 0, RecordData::Aaaa("2001:db8::1".parse().unwrap())))
                    .with_weight(u32::MAX),
                Record::new(ResourceRecord::new("www", 0, RecordData::Aaaa("2001:db8::2".parse().unwrap())))
                    .with_weight(7),
            ]),
        );
        assert_eq!(label.weight(RecordType::AAAA), u32::MAX);

        // Selection still works on the individual weights
        assert_eq!(label.pick(RecordType::A, 1).len(), 1);
    }

    #[test]
    fn test_pick_respects_max_and_skips_zero_weight() {
        let mut label = Label::new("www".to_string(), 2, false);
        label.add_record(a_record("192.0.2.1", 10));
        label.add_record(a_record("192.0.2.2", 0));
        label.add_record(a_record("192.0.2.3", 10));

        for _ in 0..50 {
            let picked = label.pick(RecordType::A, 2);
            assert_eq!(picked.len(), 2);
            assert!(picked.iter().all(|r| r.weight == 10));
        }
        assert_eq!(label.pick(RecordType::A, 0).len(), 3);
    }

    #[test]
    fn test_pick_excludes_unhealthy() {
        let template = Arc::new(HealthTestConfig::from_value(&json!({"type": "http"})).unwrap());
        let mut label = Label::new("www".to_string(), 2, false);
        let mut down = a_record("192.0.2.1", 10);
        down.test = Some(Arc::new(HealthTest::new(Arc::clone(&template), "192.0.2.1".parse().unwrap())));
        let mut up = a_record("192.0.2.2", 10);
        let test = HealthTest::new(template, "192.0.2.2".parse().unwrap());
        test.set_healthy(true);
        up.test = Some(Arc::new(test));
        label.add_record(down);
        label.add_record(up);

        let picked = label.pick(RecordType::A, 0);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].rr.ip(), Some("192.0.2.2".parse().unwrap()));
    }

    #[test]
    fn test_pick_falls_back_when_all_unhealthy() {
        let template = Arc::new(HealthTestConfig::from_value(&json!({"type": "http"})).unwrap());
        let mut label = Label::new("www".to_string(), 2, false);
        for ip in ["192.0.2.1", "192.0.2.2"] {
            let mut record = a_record(ip, 1);
            record.test = Some(Arc::new(HealthTest::new(Arc::clone(&template), ip.parse().unwrap())));
            label.add_record(record);
        }
        assert_eq!(label.pick(RecordType::A, 0).len(), 2);
    }

    #[test]
    fn test_closest_orders_by_distance() {
        let mut label = Label::new("www".to_string(), 2, true);
        let mut far = a_record("192.0.2.1", 1);
        far.loc = Some(Location::new(-33.87, 151.21));
        let mut near = a_record("192.0.2.2", 1);
        near.loc = Some(Location::new(51.51, -0.13));
        label.add_record(a_record("192.0.2.3", 1));
        label.add_record(far);
        label.add_record(near);

        let client = Location::new(52.37, 4.89);
        let ordered: Vec<String> = label
            .closest(RecordType::A, &client, 0)
            .iter()
            .map(|r| r.rr.ip().unwrap().to_string())
            .collect();
        assert_eq!(ordered, ["192.0.2.2", "192.0.2.1", "192.0.2.3"]);
        assert_eq!(label.closest(RecordType::A, &client, 1).len(), 1);
    }

    #[test]
    fn test_set_health_test_logs_and_clears_on_error() {
        let mut label = Label::new("www".to_string(), 2, false);
        label.set_health_test(Some(&json!({"type": "http"})));
        assert!(label.health_test().is_some());

        label.set_health_test(Some(&json!({"type": "bogus"})));
        assert!(label.health_test().is_none());

        label.set_health_test(Some(&json!({"type": "tcp", "port": 25})));
        label.set_health_test(None);
        assert!(label.health_test().is_none());
    }
}
