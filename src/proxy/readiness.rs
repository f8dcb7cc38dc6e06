//! Polls a local port until the engine starts accepting connections

use crate::error::ReadyTimeout;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::debug;

/// Default overall readiness deadline
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a single connect attempt
pub const DEFAULT_CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(100);

/// Default pause between failed attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Fixed-interval TCP readiness poller. No jitter, no backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessProbe {
    pub timeout: Duration,
    pub attempt_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_READY_TIMEOUT,
            attempt_timeout: DEFAULT_CONNECT_ATTEMPT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ReadinessProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Wait until `127.0.0.1:port` accepts a TCP connection.
    ///
    /// The probing connection is closed right away. Fails once more than
    /// `timeout` has elapsed since the first attempt.
    pub async fn await_ready(&self, port: u16) -> Result<(), ReadyTimeout> {
        let address = ("127.0.0.1", port);
        let start = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match tokio::time::timeout(self.attempt_timeout, TcpStream::connect(address)).await {
                Ok(Ok(stream)) => {
                    drop(stream);
                    debug!(port, attempts, "port is accepting connections");
                    return Ok(());
                }
                Ok(Err(e)) => debug!(port, attempts, error = %e, "port not ready"),
                Err(_) => debug!(port, attempts, "connect attempt timed out"),
            }

            if start.elapsed() > self.timeout {
                return Err(ReadyTimeout {
                    port,
                    timeout: self.timeout,
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
