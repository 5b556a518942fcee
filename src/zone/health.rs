//! Health check lifecycle for the address records of a zone.

use super::label::Label;
use super::zone::Zone;
use crate::dns::enums::RecordType;
use crate::health::{HealthTest, TestRunner};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Registration key of the test on record `index` of `rtype` at `label`
pub fn test_key(origin: &str, label: &str, rtype: RecordType, index: usize) -> String {
    format!("{}/{}/{}/{}", origin, label, rtype.code(), index)
}

/// Verdict of the test on the first record of `rtype` at `label` with
/// address `ip` in a previous generation of the zone
fn previous_verdict(
    labels: &HashMap<String, Arc<Label>>,
    label: &str,
    rtype: RecordType,
    ip: IpAddr,
) -> Option<bool> {
    let record = labels
        .get(label)?
        .records(rtype)
        .iter()
        .find(|record| record.rr.ip() == Some(ip))?;
    record.test.as_ref().map(|test| test.is_healthy())
}

impl Zone {
    pub fn set_health(&mut self, start: bool, runner: &dyn TestRunner, old: Option<&Zone>) {
        if start {
            self.start_health_checks(runner, old);
        } else {
            self.stop_health_checks(runner);
        }
    }

    /// Give every address record of a label with a health template its own
    /// test and register it with `runner`.
    ///
    /// New tests start from the verdict the matching record had in `old`,
    /// so a reload does not reset health state. Records that already carry
    /// a test are re-registered as they are.
    pub fn start_health_checks(&mut self, runner: &dyn TestRunner, old: Option<&Zone>) {
        let old_inner = old.map(|zone| zone.inner.read());
        let old_labels = old_inner.as_ref().map(|inner| &inner.labels);
        let origin = self.origin.clone();

        for (name, label) in self.inner.get_mut().labels.iter_mut() {
            let label = Arc::make_mut(label);
            let template = label.health_test().cloned();

            for (rtype, records) in label.all_records_mut() {
                if !RecordType::ADDRESS_TYPES.contains(&rtype) {
                    continue;
                }

                for (index, record) in records.iter_mut().enumerate() {
                    let Some(ip) = record.rr.ip() else {
                        continue;
                    };
                    let key = test_key(&origin, name, rtype, index);

                    let test = match &record.test {
                        Some(existing) => {
                            runner.remove_test(existing, &key);
                            Arc::clone(existing)
                        }
                        None => {
                            let Some(template) = &template else {
                                continue;
                            };
                            let test = HealthTest::new(Arc::clone(template), ip);
                            if let Some(healthy) = old_labels
                                .and_then(|labels| previous_verdict(labels, name, rtype, ip))
                            {
                                info!(
                                    "Carrying over previous health state for {} in {}: {}",
                                    ip, origin, healthy
                                );
                                test.set_healthy(healthy);
                            }
                            let test = Arc::new(test);
                            record.test = Some(Arc::clone(&test));
                            test
                        }
                    };

                    runner.add_test(test, &key);
                }
            }
        }
    }

    /// Unregister every record's test. Calling this again is harmless.
    pub fn stop_health_checks(&self, runner: &dyn TestRunner) {
        let mut registered = Vec::new();
        {
            let inner = self.inner.read();
            for (name, label) in &inner.labels {
                for rtype in label.record_types() {
                    for (index, record) in label.records(rtype).iter().enumerate() {
                        if let Some(test) = &record.test {
                            registered.push((
                                Arc::clone(test),
                                test_key(&self.origin, name, rtype, index),
                            ));
                        }
                    }
                }
            }
        }

        debug!("Stopping {} health tests for {}", registered.len(), self.origin);
        for (test, key) in registered {
            runner.remove_test(&test, &key);
        }
    }
}
