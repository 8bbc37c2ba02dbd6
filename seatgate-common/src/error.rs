//! Shared error type for seatgate-common

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by config loading, database setup and session handling
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Root folder or config file access
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unparseable or unserializable TOML
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad, expired or foreign session token
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Password hashing or token signing failed
    #[error("Internal error: {0}")]
    Internal(String),
}
