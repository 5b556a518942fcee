pub mod enums;

pub use enums::RecordType;
