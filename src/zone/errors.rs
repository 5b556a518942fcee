use thiserror::Error;

/// Zone-related errors
#[derive(Debug, Error)]
pub enum ZoneError {
    /// Textual record could not be parsed
    #[error("Zone parse error: {0}")]
    ParseError(String),
    /// Record data is malformed for its type
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    /// The synthesized SOA did not parse; the zone must not be published
    #[error("Could not set up SOA for {origin}: {reason}")]
    SoaConstruction { origin: String, reason: String },
    /// Invalid domain name
    #[error("Invalid domain name: {0}")]
    InvalidDomainName(String),
    /// Invalid TTL value
    #[error("Invalid TTL value: {0}")]
    InvalidTTL(String),
    /// Invalid resource record type
    #[error("Invalid resource record type: {0}")]
    InvalidRRType(String),
    /// Meter registration failed
    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, ZoneError>;
