pub mod config;
pub mod dns;
pub mod error;
pub mod geo;
pub mod health;
pub mod metrics;
pub mod targeting;
pub mod telemetry;
pub mod zone;

pub use config::EngineConfig;
pub use dns::RecordType;
pub use geo::{GeoLookup, GeoProvider, Location};
pub use health::{HealthTest, HealthTestConfig, TestRegistry, TestRunner};
pub use targeting::TargetOptions;
pub use zone::{Zone, ZoneStore};
