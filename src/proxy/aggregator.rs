//! Concurrent sink for successful verification results

use crate::proxy::models::VerificationResult;
use tokio::sync::mpsc;
use tracing::warn;

/// Collects results from concurrently running tasks.
///
/// The buffer is sized to the batch, so a sink never waits for room.
/// Drain only after every task holding a sink has finished.
pub struct ResultAggregator {
    sender: mpsc::Sender<VerificationResult>,
    receiver: mpsc::Receiver<VerificationResult>,
}

/// Insert side handed to each task
#[derive(Clone)]
pub struct ResultSink(mpsc::Sender<VerificationResult>);

impl ResultSink {
    pub fn push(&self, result: VerificationResult) {
        if let Err(e) = self.0.try_send(result) {
            warn!(error = %e, "dropping verification result");
        }
    }
}

impl ResultAggregator {
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self { sender, receiver }
    }

    pub fn sink(&self) -> ResultSink {
        ResultSink(self.sender.clone())
    }

    /// Materialize everything collected so far, in arrival order
    pub fn drain(self) -> Vec<VerificationResult> {
        let Self {
            sender,
            mut receiver,
        } = self;
        drop(sender);

        let mut results = Vec::new();
        while let Ok(result) = receiver.try_recv() {
            results.push(result);
        }
        results
    }
}
