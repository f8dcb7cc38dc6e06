//! Verification of a single configuration
//!
//! A task moves through
//! `Pending -> Spawning -> AwaitingReady -> Probing -> Succeeded`, and can
//! stop early in `SpawnFailed`, `ReadyTimeout` or `ProbeFailed`. Admission
//! (`Pending -> Spawning`) is handled by the worker pool. Once a process
//! exists it is terminated on every exit path.

use crate::error::TaskError;
use crate::proxy::engine::{EngineGuard, EngineLauncher};
use crate::proxy::location::LocationProbe;
use crate::proxy::models::{ConfigurationRecord, VerificationResult};
use crate::proxy::readiness::ReadinessProbe;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Spawning,
    SpawnFailed,
    AwaitingReady,
    ReadyTimeout,
    Probing,
    ProbeFailed,
    Succeeded,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::SpawnFailed
                | TaskState::ReadyTimeout
                | TaskState::ProbeFailed
                | TaskState::Succeeded
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Pending => "pending",
            TaskState::Spawning => "spawning",
            TaskState::SpawnFailed => "spawn_failed",
            TaskState::AwaitingReady => "awaiting_ready",
            TaskState::ReadyTimeout => "ready_timeout",
            TaskState::Probing => "probing",
            TaskState::ProbeFailed => "probe_failed",
            TaskState::Succeeded => "succeeded",
        };
        write!(f, "{}", name)
    }
}

/// Collaborators shared by every task of one batch
#[derive(Clone)]
pub struct TaskContext {
    pub launcher: Arc<dyn EngineLauncher>,
    pub locator: Arc<dyn LocationProbe>,
    pub readiness: ReadinessProbe,
}

impl TaskContext {
    pub fn new(
        launcher: Arc<dyn EngineLauncher>,
        locator: Arc<dyn LocationProbe>,
        readiness: ReadinessProbe,
    ) -> Self {
        Self {
            launcher,
            locator,
            readiness,
        }
    }

    /// Run one configuration to a terminal state.
    ///
    /// Failures are logged here; callers only need to forward successes.
    pub async fn run(&self, record: &ConfigurationRecord) -> Option<VerificationResult> {
        match self.verify(record).await {
            Ok(result) => {
                info!(
                    url = %record.public_identifier,
                    country = %result.location.country,
                    state = %TaskState::Succeeded,
                    "found location {} for config",
                    result.location.short_display()
                );
                Some(result)
            }
            Err(e) => {
                warn!(
                    url = %record.public_identifier,
                    port = record.listen_port,
                    state = %e.terminal_state(),
                    error = %e,
                    "error checking the config"
                );
                None
            }
        }
    }

    /// The state machine proper, with each failure as a typed error
    pub async fn verify(
        &self,
        record: &ConfigurationRecord,
    ) -> Result<VerificationResult, TaskError> {
        let port = record.listen_port;
        let config = &record.engine_config_location;

        debug!(port, config = %config.display(), state = %TaskState::Spawning, "running engine");
        let process = self.launcher.spawn(config, port)?;
        let engine = EngineGuard::new(process, port);

        debug!(port, pid = ?engine.id(), state = %TaskState::AwaitingReady, "waiting for port");
        if let Err(e) = self.readiness.await_ready(port).await {
            engine.shutdown().await;
            return Err(e.into());
        }

        debug!(port, state = %TaskState::Probing, "probing location");
        let location = self.locator.probe(port).await;
        engine.shutdown().await;

        Ok(VerificationResult::new(
            record.public_identifier.clone(),
            location?,
        ))
    }
}
