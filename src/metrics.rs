use parking_lot::Mutex;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder, opts};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Registered name of the total query meter
pub const QUERIES_METER: &str = "queries";
/// Registered name of the meter for queries carrying EDNS options
pub const EDNS_QUERIES_METER: &str = "queries_edns";
/// Default capacity of the recent label/client trackers
pub const DEFAULT_STATS_CAPACITY: usize = 10_000;

const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Exponentially weighted moving average, ticked every 5 seconds
#[derive(Debug, Clone)]
struct Ewma {
    alpha: f64,
    rate: f64,
    initialized: bool,
}

impl Ewma {
    fn for_minutes(minutes: f64) -> Self {
        Self {
            alpha: 1.0 - (-TICK_INTERVAL.as_secs_f64() / 60.0 / minutes).exp(),
            rate: 0.0,
            initialized: false,
        }
    }

    fn tick(&mut self, count: u64) {
        let instant_rate = count as f64 / TICK_INTERVAL.as_secs_f64();
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }

    /// Apply `ticks` empty intervals at once
    fn decay(&mut self, ticks: u32) {
        if self.initialized {
            self.rate *= (1.0 - self.alpha).powi(ticks as i32);
        }
    }
}

#[derive(Debug)]
struct MeterState {
    uncounted: u64,
    last_tick: Instant,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

impl MeterState {
    fn tick_until(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        let ticks = (elapsed.as_secs_f64() / TICK_INTERVAL.as_secs_f64()) as u64;
        if ticks == 0 {
            return;
        }

        let count = std::mem::take(&mut self.uncounted);
        for ewma in [&mut self.m1, &mut self.m5, &mut self.m15] {
            ewma.tick(count);
            ewma.decay((ticks - 1).min(i32::MAX as u64) as u32);
        }
        self.last_tick += TICK_INTERVAL * ticks.min(u32::MAX as u64) as u32;
    }
}

#[derive(Debug)]
struct MeterInner {
    counter: IntCounter,
    started: Instant,
    state: Mutex<MeterState>,
}

/// Event counter with 1/5/15 minute decaying rates.
///
/// Clones share the same counter, so a meter handed from one zone
/// generation to the next keeps counting.
#[derive(Debug, Clone)]
pub struct RateMeter {
    inner: Arc<MeterInner>,
}

impl RateMeter {
    pub fn new(name: &str, help: &str) -> Result<Self, prometheus::Error> {
        let counter = IntCounter::with_opts(opts!(name, help))?;
        let now = Instant::now();
        Ok(Self {
            inner: Arc::new(MeterInner {
                counter,
                started: now,
                state: Mutex::new(MeterState {
                    uncounted: 0,
                    last_tick: now,
                    m1: Ewma::for_minutes(1.0),
                    m5: Ewma::for_minutes(5.0),
                    m15: Ewma::for_minutes(15.0),
                }),
            }),
        })
    }

    pub fn mark(&self, n: u64) {
        self.mark_at(n, Instant::now());
    }

    fn mark_at(&self, n: u64, now: Instant) {
        let mut state = self.inner.state.lock();
        state.tick_until(now);
        state.uncounted += n;
        self.inner.counter.inc_by(n);
    }

    pub fn count(&self) -> u64 {
        self.inner.counter.get()
    }

    pub fn rate1(&self) -> f64 {
        self.rates_at(Instant::now()).0
    }

    pub fn rate5(&self) -> f64 {
        self.rates_at(Instant::now()).1
    }

    pub fn rate15(&self) -> f64 {
        self.rates_at(Instant::now()).2
    }

    fn rates_at(&self, now: Instant) -> (f64, f64, f64) {
        let mut state = self.inner.state.lock();
        state.tick_until(now);
        (state.m1.rate, state.m5.rate, state.m15.rate)
    }

    /// Events per second since the meter was created
    pub fn rate_mean(&self) -> f64 {
        let elapsed = self.inner.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.count() as f64 / elapsed
    }

    pub fn same_meter(&self, other: &RateMeter) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn collector(&self) -> Box<IntCounter> {
        Box::new(self.inner.counter.clone())
    }
}

#[derive(Debug)]
struct StatsLog {
    entries: Vec<String>,
    pos: usize,
    closed: bool,
}

/// Bounded log of the most recent names seen, with frequency summaries
#[derive(Debug)]
pub struct LabelStats {
    capacity: usize,
    log: Mutex<StatsLog>,
}

impl LabelStats {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            log: Mutex::new(StatsLog {
                entries: Vec::new(),
                pos: 0,
                closed: false,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record one occurrence; overwrites the oldest entry once full
    pub fn add(&self, name: &str) {
        let mut log = self.log.lock();
        if log.closed {
            return;
        }
        if log.entries.len() < self.capacity {
            log.entries.push(name.to_string());
        } else {
            let pos = log.pos;
            log.entries[pos] = name.to_string();
        }
        log.pos = (log.pos + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.log.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `n` most frequent names among the retained entries, ties by name
    pub fn top_counts(&self, n: usize) -> Vec<(String, usize)> {
        let log = self.log.lock();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for entry in &log.entries {
            *counts.entry(entry.as_str()).or_default() += 1;
        }

        let mut top: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(n);
        top
    }

    /// Drop retained entries and ignore further additions
    pub fn close(&self) {
        let mut log = self.log.lock();
        log.entries = Vec::new();
        log.pos = 0;
        log.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.log.lock().closed
    }
}

/// Per-zone meters and trackers.
///
/// Every component is optional so a bundle can be partially inherited and
/// then completed, and so teardown can run on a bundle that was never set up.
#[derive(Debug, Clone, Default)]
pub struct ZoneMetrics {
    pub registry: Option<Registry>,
    pub queries: Option<RateMeter>,
    pub edns_queries: Option<RateMeter>,
    pub label_stats: Option<Arc<LabelStats>>,
    pub client_stats: Option<Arc<LabelStats>>,
}

impl ZoneMetrics {
    /// Create whatever is still missing
    pub fn fill_missing(&mut self, origin: &str, stats_capacity: usize) -> Result<(), prometheus::Error> {
        let registry = match &self.registry {
            Some(registry) => registry.clone(),
            None => {
                let labels = HashMap::from([("zone".to_string(), origin.to_string())]);
                let registry = Registry::new_custom(Some("geozone".to_string()), Some(labels))?;
                self.registry = Some(registry.clone());
                registry
            }
        };

        if self.queries.is_none() {
            let meter = RateMeter::new(QUERIES_METER, "Queries answered for the zone")?;
            registry.register(meter.collector())?;
            self.queries = Some(meter);
        }
        if self.edns_queries.is_none() {
            let meter = RateMeter::new(EDNS_QUERIES_METER, "Queries carrying EDNS options")?;
            registry.register(meter.collector())?;
            self.edns_queries = Some(meter);
        }
        if self.label_stats.is_none() {
            self.label_stats = Some(Arc::new(LabelStats::new(stats_capacity)));
        }
        if self.client_stats.is_none() {
            self.client_stats = Some(Arc::new(LabelStats::new(stats_capacity)));
        }

        Ok(())
    }

    /// Unregister the meters and close both trackers
    pub fn close(&self) {
        if let Some(registry) = &self.registry {
            for meter in [&self.queries, &self.edns_queries].into_iter().flatten() {
                if let Err(e) = registry.unregister(meter.collector()) {
                    debug!("Meter already unregistered: {}", e);
                }
            }
        }
        if let Some(stats) = &self.label_stats {
            stats.close();
        }
        if let Some(stats) = &self.client_stats {
            stats.close();
        }
    }

    /// Export the registered meters in Prometheus text format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let Some(registry) = &self.registry else {
            return Ok(String::new());
        };
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_counts_and_rates() {
        let meter = RateMeter::new("test_meter", "test").unwrap();
        let start = Instant::now();

        meter.mark_at(10, start);
        assert_eq!(meter.count(), 10);

        // First tick seeds every average with the instantaneous rate
        let (m1, m5, m15) = meter.rates_at(start + TICK_INTERVAL);
        assert!((m1 - 2.0).abs() < 1e-9);
        assert!((m5 - 2.0).abs() < 1e-9);
        assert!((m15 - 2.0).abs() < 1e-9);

        // Idle time decays the short window fastest
        let (m1, m5, m15) = meter.rates_at(start + Duration::from_secs(65));
        assert!(m1 < m5 && m5 < m15);
        assert!(m1 > 0.0);
    }

    #[test]
    fn test_meter_clones_share_state() {
        let meter = RateMeter::new("shared_meter", "test").unwrap();
        let other = meter.clone();
        other.mark(3);
        assert_eq!(meter.count(), 3);
        assert!(meter.same_meter(&other));
    }

    #[test]
    fn test_label_stats_wraps_at_capacity() {
        let stats = LabelStats::new(3);
        for name in ["a", "b", "a", "c", "c"] {
            stats.add(name);
        }
        // the first "a" and the "b" were overwritten by the two "c"s
        assert_eq!(stats.len(), 3);
        assert_eq!(
            stats.top_counts(5),
            vec![("c".to_string(), 2), ("a".to_string(), 1)]
        );
    }

    #[test]
    fn test_label_stats_close() {
        let stats = LabelStats::new(10);
        stats.add("www");
        stats.close();
        stats.add("www");
        assert!(stats.is_empty());
        assert!(stats.is_closed());
        stats.close();
    }

    #[test]
    fn test_zone_metrics_fill_and_close() {
        let mut metrics = ZoneMetrics::default();
        metrics.fill_missing("example.com", 100).unwrap();
        metrics.queries.as_ref().unwrap().mark(2);

        let exported = metrics.export().unwrap();
        assert!(exported.contains("geozone_queries"));
        assert!(exported.contains("zone=\"example.com\""));

        metrics.close();
        metrics.close();
        assert!(metrics.label_stats.as_ref().unwrap().is_closed());
        assert!(!metrics.export().unwrap().contains("geozone_queries"));
    }

    #[test]
    fn test_close_without_setup() {
        ZoneMetrics::default().close();
        assert_eq!(ZoneMetrics::default().export().unwrap(), "");
    }
}
