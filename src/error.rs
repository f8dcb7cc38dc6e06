//! Error types for batch verification
//!
//! Only [`BatchError`] ever reaches the host. Everything else is a per-task
//! failure that is logged and turned into absence from the output.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::proxy::task::TaskState;

/// The engine process could not be started
#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("engine config not found: {}", .0.display())]
    MissingConfig(PathBuf),

    #[error("failed to launch {}: {source}", executable.display())]
    Launch {
        executable: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The engine never accepted connections on its port
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("timeout waiting for port {port} after {timeout:?}")]
pub struct ReadyTimeout {
    pub port: u16,
    pub timeout: Duration,
}

/// The request through the engine did not yield a usable location
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("error building client for proxy {proxy_url}: {source}")]
    Client {
        proxy_url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to send request: {0}")]
    Request(#[source] reqwest::Error),

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("failed to parse response: {source}, body: {body}")]
    Decode {
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("location API returned error: {0}")]
    Status(String),
}

/// Terminal failure of a single verification task
#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    NotReady(#[from] ReadyTimeout),

    #[error(transparent)]
    Probe(#[from] ProbeError),
}

impl TaskError {
    /// The terminal state a task ends in when it fails with this error
    pub fn terminal_state(&self) -> TaskState {
        match self {
            TaskError::Spawn(_) => TaskState::SpawnFailed,
            TaskError::NotReady(_) => TaskState::ReadyTimeout,
            TaskError::Probe(_) => TaskState::ProbeFailed,
        }
    }
}

/// Failure of the whole batch call
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Failed to parse json: {0}")]
    InputParse(#[source] serde_json::Error),

    #[error("Error marshaling output: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to start runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("Cannot block on a batch inside an async runtime, use BatchVerifier::verify_json")]
    InsideRuntime,
}
