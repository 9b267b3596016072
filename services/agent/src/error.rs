//! Error types for the sweeper.

use thiserror::Error;

use crate::runtime::RuntimeError;

/// Errors that stop the event loop.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The runtime refused a call needed to start or keep running.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// The event stream broke without a clean close.
    #[error("event stream failed: {0}")]
    Stream(RuntimeError),
}

impl AgentError {
    /// Get the reason code used in the final log line.
    pub fn reason_code(&self) -> &'static str {
        match self {
            AgentError::Runtime(_) => "runtime_error",
            AgentError::Stream(_) => "stream_failed",
        }
    }
}
