//! Error types for the RedOps recon core
//!
//! Control-plane failures only. Problems inside a simulated stage are
//! reported as ERROR-severity log events, never through this type.

use std::io;
use thiserror::Error;

use crate::types::{SessionId, SessionState};

#[derive(Error, Debug)]
pub enum RedopsError {
    #[error("scan already running for this target ({0})")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Scheduling error: {0}")]
    Scheduling(String),

    #[error("Invalid pipeline definition: {0}")]
    InvalidDefinition(String),

    #[error("Subscriber overflow: fell {skipped} events behind and was disconnected")]
    SubscriberOverflow { skipped: u64 },

    #[error("Invalid transition for session {session}: {from} -> {to}")]
    InvalidTransition {
        session: SessionId,
        from: SessionState,
        to: SessionState,
    },

    #[error("Text generation failed: {0}")]
    Generation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for RedOps operations
pub type RedopsResult<T> = Result<T, RedopsError>;
