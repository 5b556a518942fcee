use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    #[error("Invalid max hosts: {0}")]
    InvalidMaxHosts(String),

    #[error("Invalid targeting level: {0}")]
    InvalidTargeting(String),

    #[error("Invalid alias depth: {0}")]
    InvalidAliasDepth(String),

    #[error("Invalid stats capacity: {0}")]
    InvalidStatsCapacity(String),
}
