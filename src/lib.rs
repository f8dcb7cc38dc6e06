//! Proxy Verifier - runs proxy engine configurations and checks them
//!
//! Each configuration is activated by spawning an external proxy engine,
//! waiting for its local listener, and sending one geolocation request
//! through it. Only configurations that carried traffic are reported.

pub mod error;
pub mod proxy;

pub use error::{BatchError, ProbeError, ReadyTimeout, SpawnError, TaskError};
pub use proxy::*;

use std::path::Path;

/// Application result type
pub type Result<T> = anyhow::Result<T>;

/// Verify a serialized batch with default settings, blocking until done.
///
/// Returns the serialized results, or `"Error: ..."` when the payload
/// cannot be parsed or the call is made from inside a Tokio runtime.
pub fn verify_batch(input: &str, engine_path: impl AsRef<Path>) -> String {
    match verify_batch_with(input, engine_path, VerifierConfig::default()) {
        Ok(output) => output,
        Err(e) => format!("Error: {}", e),
    }
}

/// Blocking batch verification with an explicit configuration
pub fn verify_batch_with(
    input: &str,
    engine_path: impl AsRef<Path>,
    config: VerifierConfig,
) -> std::result::Result<String, BatchError> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(BatchError::InsideRuntime);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(BatchError::Runtime)?;

    let verifier = BatchVerifier::new(config, engine_path.as_ref());
    runtime.block_on(verifier.verify_json(input))
}
