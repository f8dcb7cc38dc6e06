//! Engine process lifecycle
//!
//! An engine is an external executable that reads one configuration file and
//! binds a local proxy listener. It has no graceful shutdown contract, so the
//! only way to stop it is a forced kill.

use crate::error::SpawnError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Placeholder replaced by the engine config path in argument templates
pub const CONFIG_PLACEHOLDER: &str = "{config}";

/// Placeholder replaced by the listen port in argument templates
pub const PORT_PLACEHOLDER: &str = "{port}";

/// Starts engine processes
pub trait EngineLauncher: Send + Sync {
    fn spawn(&self, config: &Path, port: u16) -> Result<Box<dyn EngineProcess>, SpawnError>;
}

/// A running engine owned by exactly one task
pub trait EngineProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Force the process down and wait until it is reaped.
    /// Consumes the handle so it cannot run twice.
    fn terminate(self: Box<Self>) -> BoxFuture<'static, io::Result<()>>;

    /// Send the kill without waiting for it to land. Used where awaiting is
    /// impossible, such as `Drop`.
    fn start_terminate(self: Box<Self>) -> io::Result<()>;
}

/// Launches a real executable as `<executable> <args...>`
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    executable: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: vec!["-config".to_string(), CONFIG_PLACEHOLDER.to_string()],
        }
    }

    /// Replace the argument template
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn render_args(&self, config: &Path, port: u16) -> Vec<String> {
        let config = config.to_string_lossy();
        let port = port.to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(CONFIG_PLACEHOLDER, &config)
                    .replace(PORT_PLACEHOLDER, &port)
            })
            .collect()
    }
}

impl EngineLauncher for ProcessLauncher {
    fn spawn(&self, config: &Path, port: u16) -> Result<Box<dyn EngineProcess>, SpawnError> {
        if !config.exists() {
            return Err(SpawnError::MissingConfig(config.to_path_buf()));
        }

        let child = Command::new(&self.executable)
            .args(self.render_args(config, port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SpawnError::Launch {
                executable: self.executable.clone(),
                source,
            })?;

        debug!(pid = ?child.id(), port, config = %config.display(), "engine started");
        Ok(Box::new(EngineChild(child)))
    }
}

struct EngineChild(Child);

impl EngineProcess for EngineChild {
    fn id(&self) -> Option<u32> {
        self.0.id()
    }

    fn terminate(self: Box<Self>) -> BoxFuture<'static, io::Result<()>> {
        let mut child = self.0;
        async move { child.kill().await }.boxed()
    }

    fn start_terminate(self: Box<Self>) -> io::Result<()> {
        let mut child = self.0;
        child.start_kill()?;
        // Reap now if it is already gone; otherwise the runtime reaps the
        // orphan once `child` is dropped.
        let _ = child.try_wait();
        Ok(())
    }
}

/// Scoped ownership of an engine process.
///
/// [`EngineGuard::shutdown`] kills and reaps on the normal path. Any other
/// exit, including an unwinding panic, sends the kill from `Drop`. Either way
/// the process is killed exactly once.
pub struct EngineGuard {
    process: Option<Box<dyn EngineProcess>>,
    port: u16,
}

impl EngineGuard {
    pub fn new(process: Box<dyn EngineProcess>, port: u16) -> Self {
        Self {
            process: Some(process),
            port,
        }
    }

    pub fn id(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.id())
    }

    pub async fn shutdown(mut self) {
        if let Some(process) = self.process.take() {
            let pid = process.id();
            let result = process.terminate().await;
            self.report(pid, result);
        }
    }

    fn report(&self, pid: Option<u32>, result: io::Result<()>) {
        match result {
            Ok(()) => debug!(?pid, port = self.port, "engine terminated"),
            Err(e) => warn!(?pid, port = self.port, error = %e, "failed to terminate engine"),
        }
    }
}

impl Drop for EngineGuard {
    fn drop(&mut self) {
        if let Some(process) = self.process.take() {
            let pid = process.id();
            let result = process.start_terminate();
            self.report(pid, result);
        }
    }
}
