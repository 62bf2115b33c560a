//! Error types for orderflow.
//!
//! Simulated processing failures are not errors here: they are values
//! ([`crate::pipeline::ProcessingFailure`]) that drive retries, and an
//! exhausted item is still a [`crate::model::ResultRecord`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    /// Send on a closed channel, or a hand-off nobody will receive.
    #[error("channel protocol violation: {0}")]
    Protocol(String),

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
