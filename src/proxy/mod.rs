//! Proxy configuration verification
//!
//! This module provides functionality for:
//! - Running an external proxy engine per configuration
//! - Waiting for the engine's local listener to come up
//! - Probing egress geolocation through the engine
//! - Verifying whole batches under a shared concurrency cap
//! - Preparing batches from engine config templates

pub mod aggregator;
pub mod checker;
pub mod engine;
pub mod location;
pub mod models;
pub mod parser;
pub mod pool;
pub mod readiness;
pub mod task;

pub use aggregator::{ResultAggregator, ResultSink};
pub use checker::{BatchVerifier, VerifierConfig};
pub use engine::{EngineGuard, EngineLauncher, EngineProcess, ProcessLauncher};
pub use location::{HttpLocationProbe, LocationProbe};
pub use models::{
    BatchInput, BatchOutput, ConfigurationRecord, GeolocationRecord, ProxyType, VerificationResult,
};
pub use parser::{BatchPreparer, Entry, EntryParser};
pub use pool::WorkerPool;
pub use readiness::ReadinessProbe;
pub use task::{TaskContext, TaskState};
