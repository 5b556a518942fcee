//! Health test handles and the runner interface.
//!
//! Probing happens elsewhere. This module defines what a zone hands to the
//! runner: a [`HealthTest`] bound to one address, built from a label's
//! [`HealthTestConfig`] template, plus the [`TestRunner`] registration API.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HealthError {
    #[error("Invalid health check configuration: {0}")]
    InvalidConfig(String),
}

/// Probe flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthTestKind {
    Tcp,
    Http,
    Https,
    Ntp,
    Nagios,
}

#[derive(Debug, Deserialize)]
struct RawHealthConfig {
    #[serde(rename = "type")]
    kind: HealthTestKind,
    frequency: Option<u64>,
    retry_time: Option<u64>,
    retries: Option<u32>,
    timeout: Option<u64>,
    port: Option<u16>,
    path: Option<String>,
    host: Option<String>,
    expected: Option<String>,
    healthy_initially: Option<bool>,
}

/// Template describing how records of a label are probed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthTestConfig {
    pub kind: HealthTestKind,
    pub frequency: Duration,
    pub retry_time: Duration,
    pub retries: u32,
    pub timeout: Duration,
    pub port: u16,
    pub path: Option<String>,
    pub host: Option<String>,
    pub expected: Option<String>,
    pub healthy_initially: bool,
}

impl HealthTestConfig {
    pub const DEFAULT_FREQUENCY_SECS: u64 = 15;
    pub const DEFAULT_RETRIES: u32 = 2;
    pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

    /// Build a template from the `health` object of a label definition
    pub fn from_value(value: &Value) -> Result<Self, HealthError> {
        if !value.is_object() {
            return Err(HealthError::InvalidConfig(format!(
                "expected an object, got {}",
                value
            )));
        }

        let raw: RawHealthConfig = serde_json::from_value(value.clone())
            .map_err(|e| HealthError::InvalidConfig(e.to_string()))?;

        let frequency = raw.frequency.unwrap_or(Self::DEFAULT_FREQUENCY_SECS);
        if frequency == 0 {
            return Err(HealthError::InvalidConfig(
                "frequency must be greater than 0".to_string(),
            ));
        }
        let timeout = raw.timeout.unwrap_or(Self::DEFAULT_TIMEOUT_SECS);
        if timeout == 0 {
            return Err(HealthError::InvalidConfig(
                "timeout must be greater than 0".to_string(),
            ));
        }

        let port = match (raw.kind, raw.port) {
            (_, Some(port)) => port,
            (HealthTestKind::Http, None) => 80,
            (HealthTestKind::Https, None) => 443,
            (HealthTestKind::Ntp, None) => 123,
            (HealthTestKind::Tcp | HealthTestKind::Nagios, None) => {
                return Err(HealthError::InvalidConfig(format!(
                    "{:?} health check requires a port",
                    raw.kind
                )));
            }
        };

        Ok(Self {
            kind: raw.kind,
            frequency: Duration::from_secs(frequency),
            retry_time: Duration::from_secs(raw.retry_time.unwrap_or(frequency)),
            retries: raw.retries.unwrap_or(Self::DEFAULT_RETRIES),
            timeout: Duration::from_secs(timeout),
            port,
            path: raw.path,
            host: raw.host,
            expected: raw.expected,
            healthy_initially: raw.healthy_initially.unwrap_or(false),
        })
    }
}

/// A liveness probe bound to exactly one address.
///
/// The verdict is an atomic so the runner can flip it while readers pick
/// answers; it is seeded from the template and may be overwritten before
/// registration to carry state over from a previous zone.
#[derive(Debug)]
pub struct HealthTest {
    config: Arc<HealthTestConfig>,
    ip: IpAddr,
    healthy: AtomicBool,
    stopped: AtomicBool,
}

impl HealthTest {
    pub fn new(config: Arc<HealthTestConfig>, ip: IpAddr) -> Self {
        let healthy = config.healthy_initially;
        Self {
            config,
            ip,
            healthy: AtomicBool::new(healthy),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn config(&self) -> &HealthTestConfig {
        &self.config
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
    }

    /// Clear the stopped flag when the test is (re)registered
    pub fn start(&self) {
        self.stopped.store(false, Ordering::Release);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// The probe engine as seen by a zone
pub trait TestRunner: Send + Sync {
    /// Register `test` under `key` and start probing it
    fn add_test(&self, test: Arc<HealthTest>, key: &str);
    /// Stop probing; must not block on in-flight probes
    fn remove_test(&self, test: &Arc<HealthTest>, key: &str);
    fn is_healthy(&self, test: &HealthTest) -> bool;
}

/// In-memory [`TestRunner`] that only tracks registrations
#[derive(Debug, Default)]
pub struct TestRegistry {
    tests: DashMap<String, Arc<HealthTest>>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Arc<HealthTest>> {
        self.tests.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn keys(&self) -> Vec<String> {
        self.tests.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl TestRunner for TestRegistry {
    fn add_test(&self, test: Arc<HealthTest>, key: &str) {
        debug!("Registering health test {} for {}", key, test.ip());
        test.start();
        if let Some(previous) = self.tests.insert(key.to_string(), Arc::clone(&test)) {
            if !Arc::ptr_eq(&previous, &test) {
                previous.stop();
            }
        }
    }

    fn remove_test(&self, test: &Arc<HealthTest>, key: &str) {
        let removed = self
            .tests
            .remove_if(key, |_, registered| Arc::ptr_eq(registered, test));
        if removed.is_some() {
            debug!("Removed health test {}", key);
        }
        test.stop();
    }

    fn is_healthy(&self, test: &HealthTest) -> bool {
        test.is_healthy()
    }
}
