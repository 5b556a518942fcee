pub mod errors;
pub mod health;
pub mod label;
pub mod record;
pub mod store;
#[allow(clippy::module_inception)]
pub mod zone;

pub use errors::{Result, ZoneError};
pub use health::test_key;
pub use label::Label;
pub use record::{Record, RecordData, Records, ResourceRecord, Soa};
pub use store::ZoneStore;
pub use zone::{HEALTH_REPORT_TTL, Resolution, Zone, ZoneOptions};
