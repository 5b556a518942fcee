use super::label::Label;
use super::record::{Record, RecordData, Records, ResourceRecord};
use super::{Result, ZoneError};
use crate::config::EngineConfig;
use crate::dns::enums::RecordType;
use crate::geo::{GeoLookup, GeoProvider};
use crate::health::TestRunner;
use crate::metrics::ZoneMetrics;
use crate::targeting::{GLOBAL_TARGET, TargetOptions};
use parking_lot::RwLock;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, warn};

/// Placeholder primary nameserver for zones without apex NS records
const DEFAULT_PRIMARY_NS: &str = "ns";
/// TTL of the diagnostic health TXT record
pub const HEALTH_REPORT_TTL: u32 = 1;

// Zone transfers are not supported, so these SOA timers carry no meaning
const SOA_REFRESH: u32 = 5400;
const SOA_RETRY: u32 = 5400;
const SOA_EXPIRE: u32 = 1_209_600;
const SOA_MINIMUM: u32 = 3600;

/// Zone-wide settings copied into labels as they are added
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneOptions {
    pub serial: u32,
    /// Default TTL for labels without their own
    pub ttl: u32,
    pub max_hosts: usize,
    /// SOA responsible-person mailbox, in domain name form
    pub contact: String,
    pub targeting: TargetOptions,
    pub closest: bool,
}

/// Outcome of [`Zone::resolve`].
///
/// `rtype` is `None` when nothing matched; `label` is then whatever exists
/// at the queried name, so callers can tell NODATA from NXDOMAIN.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub label: Option<Arc<Label>>,
    pub rtype: Option<RecordType>,
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        self.rtype.is_some()
    }
}

pub(crate) struct ZoneInner {
    pub(crate) labels: HashMap<String, Arc<Label>>,
    pub(crate) metrics: ZoneMetrics,
}

/// One authoritative zone.
///
/// A zone is filled through `&mut self` methods before it is published;
/// afterwards it is shared behind an `Arc` and only read, with the label
/// map and metrics bundle behind a reader/writer lock.
pub struct Zone {
    /// Lowercase origin without the trailing dot
    pub origin: String,
    /// Number of labels in the origin
    pub label_count: usize,
    pub options: ZoneOptions,
    max_alias_depth: usize,
    stats_capacity: usize,
    has_closest: bool,
    pub(crate) inner: RwLock<ZoneInner>,
}

impl Zone {
    /// Create an empty zone with default options
    pub fn new(origin: &str) -> Self {
        Self::with_config(origin, &EngineConfig::default())
    }

    pub fn with_config(origin: &str, config: &EngineConfig) -> Self {
        let origin = origin.trim_end_matches('.').to_lowercase();
        let label_count = origin.split('.').filter(|s| !s.is_empty()).count();

        Self {
            options: ZoneOptions {
                serial: Self::generate_serial(),
                ttl: config.default_ttl,
                max_hosts: config.default_max_hosts,
                contact: format!("hostmaster.{}", origin),
                targeting: config.default_targeting,
                closest: config.default_closest,
            },
            origin,
            label_count,
            max_alias_depth: config.max_alias_depth,
            stats_capacity: config.stats_capacity,
            has_closest: false,
            inner: RwLock::new(ZoneInner {
                labels: HashMap::new(),
                metrics: ZoneMetrics::default(),
            }),
        }
    }

    /// Generate a serial number based on current date (YYYYMMDD00 format)
    fn generate_serial() -> u32 {
        use chrono::{Datelike, Utc};

        let now = Utc::now();
        now.year() as u32 * 1_000_000 + now.month() * 10_000 + now.day() * 100
    }

    /// Check if this zone is authoritative for a given name
    pub fn is_authoritative_for(&self, name: &str) -> bool {
        let name = name.trim_end_matches('.').to_lowercase();
        self.origin.is_empty()
            || name == self.origin
            || name.ends_with(&format!(".{}", self.origin))
    }

    /// Add (or replace) the label `name`, seeded with the zone defaults.
    ///
    /// Names are stored lowercase.
    pub fn add_label(&mut self, name: &str) -> &mut Label {
        let name = name.to_lowercase();
        let label = Label::new(name.clone(), self.options.max_hosts, self.options.closest);

        let slot = self.inner.get_mut().labels.entry(name).or_default();
        *slot = Arc::new(label);
        Arc::make_mut(slot)
    }

    pub fn label_mut(&mut self, name: &str) -> Option<&mut Label> {
        self.inner.get_mut().labels.get_mut(name).map(Arc::make_mut)
    }

    /// Exact, case-sensitive lookup of a stored label
    pub fn label(&self, name: &str) -> Option<Arc<Label>> {
        self.inner.read().labels.get(name).cloned()
    }

    pub fn label_names(&self) -> Vec<String> {
        self.inner.read().labels.keys().cloned().collect()
    }

    pub fn label_len(&self) -> usize {
        self.inner.read().labels.len()
    }

    /// Whether any label answers with the closest records
    pub fn has_closest(&self) -> bool {
        self.has_closest
    }

    /// Fallback chain for a client under this zone's targeting options
    pub fn targets_for(&self, client: &GeoLookup) -> Vec<String> {
        self.options.targeting.targets(client)
    }

    pub fn soa_rr(&self) -> Option<ResourceRecord> {
        self.label("")
            .and_then(|root| root.first_record(RecordType::SOA).cloned())
    }

    /// TTL of the synthesized SOA: ten times the zone TTL, capped at an
    /// hour, 600 when the zone TTL is 0
    pub fn soa_ttl(&self) -> u32 {
        match self.options.ttl {
            0 => 600,
            ttl => ttl.saturating_mul(10).min(3600),
        }
    }

    /// Synthesize the apex SOA, creating the apex label if needed.
    ///
    /// Any failure here means the zone cannot be served and must not be
    /// published.
    pub fn ensure_soa(&mut self) -> Result<()> {
        let ttl = self.soa_ttl();

        if self.label_mut("").is_none() {
            warn!(
                "{} doesn't have any 'root' records, you should probably add some NS records",
                self.origin
            );
            self.add_label("");
        }

        let origin = self.origin.clone();
        let contact = self.options.contact.clone();
        let serial = self.options.serial;

        let Some(root) = self.label_mut("") else {
            return Err(ZoneError::SoaConstruction {
                origin,
                reason: "apex label missing".to_string(),
            });
        };

        let primary_ns = match root.first_record(RecordType::NS).map(|rr| &rr.data) {
            Some(RecordData::Ns(ns)) => ns.clone(),
            _ => {
                warn!("{} has no apex NS records, using '{}' in SOA", origin, DEFAULT_PRIMARY_NS);
                DEFAULT_PRIMARY_NS.to_string()
            }
        };

        let text = format!(
            "{}. {} IN SOA {} {} {} {} {} {} {}",
            origin,
            ttl,
            primary_ns,
            contact,
            serial,
            SOA_REFRESH,
            SOA_RETRY,
            SOA_EXPIRE,
            SOA_MINIMUM
        );

        let rr = ResourceRecord::parse(&text).map_err(|e| {
            error!("SOA Error for {}: {}", origin, e);
            ZoneError::SoaConstruction {
                origin: origin.clone(),
                reason: e.to_string(),
            }
        })?;

        root.set_records(RecordType::SOA, Records::from(vec![Record::new(rr)]));
        Ok(())
    }

    /// Find the best label for `name`, trying each target in order and,
    /// at each target, the first of `types` the label has records for.
    ///
    /// `ANY` anywhere in `types` short-circuits to the label at `name`
    /// as soon as any target matches. An `MF` record restarts resolution
    /// at the name it points to, up to the configured alias depth.
    pub fn resolve<S: AsRef<str>>(
        &self,
        name: &str,
        targets: &[S],
        types: &[RecordType],
    ) -> Resolution {
        let inner = self.inner.read();
        self.resolve_in(&inner.labels, name, targets, types, 0)
    }

    fn resolve_in<S: AsRef<str>>(
        &self,
        labels: &HashMap<String, Arc<Label>>,
        name: &str,
        targets: &[S],
        types: &[RecordType],
        depth: usize,
    ) -> Resolution {
        for target in targets {
            let target = target.as_ref();
            let candidate = if target == GLOBAL_TARGET {
                Cow::Borrowed(name)
            } else if name.is_empty() {
                Cow::Borrowed(target)
            } else {
                Cow::Owned(format!("{}.{}", name, target))
            };

            let Some(label) = labels.get(candidate.as_ref()) else {
                continue;
            };

            if types.contains(&RecordType::ANY) {
                return Resolution {
                    label: labels.get(name).cloned(),
                    rtype: Some(RecordType::ANY),
                };
            }

            for &rtype in types {
                if rtype == RecordType::MF {
                    let Some(alias) = label
                        .first_record(RecordType::MF)
                        .and_then(|rr| rr.alias_target())
                    else {
                        continue;
                    };
                    if depth >= self.max_alias_depth {
                        warn!(
                            "Alias chain from '{}' in {} exceeds {} hops, giving up",
                            name, self.origin, self.max_alias_depth
                        );
                        return Self::not_found(labels, name);
                    }
                    return self.resolve_in(labels, alias, targets, types, depth + 1);
                }

                if label.has_records(rtype) {
                    return Resolution {
                        label: Some(Arc::clone(label)),
                        rtype: Some(rtype),
                    };
                }
            }
        }

        Self::not_found(labels, name)
    }

    fn not_found(labels: &HashMap<String, Arc<Label>>, name: &str) -> Resolution {
        Resolution {
            label: labels.get(name).cloned(),
            rtype: None,
        }
    }

    /// Annotate the A records of every "closest" label with their location.
    ///
    /// Previous annotations are always cleared first, so this can be rerun.
    pub fn set_locations(&mut self, geo: &dyn GeoProvider) {
        let mut has_closest = false;

        for label in self.inner.get_mut().labels.values_mut() {
            if !label.closest {
                continue;
            }
            has_closest = true;

            for (rtype, records) in Arc::make_mut(label).all_records_mut() {
                if rtype != RecordType::A {
                    continue;
                }
                for record in records.iter_mut() {
                    record.loc = record
                        .rr
                        .ip()
                        .and_then(|ip| geo.lookup(ip))
                        .and_then(|found| found.location);
                }
            }
        }

        self.has_closest = has_closest;
    }

    /// Attach the metrics bundle, inheriting `old`'s so counters carry on
    /// across reloads, and create whatever is still missing
    pub fn setup_metrics(&mut self, old: Option<&Zone>) -> Result<()> {
        let inherited = old.map(|old| old.inner.read().metrics.clone());

        let inner = self.inner.get_mut();
        if let Some(metrics) = inherited {
            inner.metrics = metrics;
        }
        inner.metrics.fill_missing(&self.origin, self.stats_capacity)?;
        Ok(())
    }

    pub fn metrics(&self) -> ZoneMetrics {
        self.inner.read().metrics.clone()
    }

    /// Count one answered query
    pub fn record_query(&self, label: &str, client: Option<&str>, edns: bool) {
        let inner = self.inner.read();
        let metrics = &inner.metrics;

        if let Some(queries) = &metrics.queries {
            queries.mark(1);
        }
        if edns {
            if let Some(edns_queries) = &metrics.edns_queries {
                edns_queries.mark(1);
            }
        }
        if let Some(stats) = &metrics.label_stats {
            stats.add(label);
        }
        if let (Some(stats), Some(client)) = (&metrics.client_stats, client) {
            stats.add(client);
        }
    }

    /// Detach the metrics bundle without closing it, leaving it to the
    /// zone that inherited it
    pub fn release_metrics(&self) -> ZoneMetrics {
        std::mem::take(&mut self.inner.write().metrics)
    }

    /// Retire the zone: stop its health checks and release its metrics
    pub fn close(&self, runner: &dyn TestRunner) {
        self.stop_health_checks(runner);
        self.release_metrics().close();
    }

    /// Diagnostic TXT record with the live health of `base_label`'s
    /// addresses, keyed by record type then address
    pub fn health_rr(
        &self,
        query_name: &str,
        base_label: &str,
        runner: &dyn TestRunner,
    ) -> ResourceRecord {
        let mut status: BTreeMap<&'static str, BTreeMap<String, bool>> = BTreeMap::new();

        if let Some(label) = self.label(base_label) {
            for rtype in label.record_types() {
                let by_ip = status.entry(rtype.as_str()).or_default();
                for record in label.records(rtype) {
                    if let Some(test) = &record.test {
                        by_ip.insert(test.ip().to_string(), runner.is_healthy(test));
                    }
                }
            }
        }

        let json = serde_json::to_string(&status).unwrap_or_else(|_| "{}".to_string());

        ResourceRecord::new(
            query_name.trim_end_matches('.'),
            HEALTH_REPORT_TTL,
            RecordData::Txt(vec![json]),
        )
    }
}

impl std::fmt::Debug for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zone")
            .field("origin", &self.origin)
            .field("options", &self.options)
            .field("labels", &self.label_len())
            .finish()
    }
}
