//! Batch verifier: runs every configuration under a shared concurrency cap

use crate::error::BatchError;
use crate::proxy::aggregator::ResultAggregator;
use crate::proxy::engine::{EngineLauncher, ProcessLauncher};
use crate::proxy::location::{
    HttpLocationProbe, LocationProbe, DEFAULT_GEOLOCATION_URL, DEFAULT_PROBE_TIMEOUT,
};
use crate::proxy::models::{
    BatchInput, BatchOutput, ConfigurationRecord, ProxyType, VerificationResult,
};
use crate::proxy::pool::{WorkerPool, DEFAULT_GROUP_SIZE, DEFAULT_MAX_CONCURRENCY};
use crate::proxy::readiness::{
    ReadinessProbe, DEFAULT_CONNECT_ATTEMPT_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_READY_TIMEOUT,
};
use crate::proxy::task::TaskContext;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Configuration for a batch verifier
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Maximum number of engines running at once
    pub max_concurrency: usize,
    /// Bookkeeping group size for admission logging
    pub group_size: usize,
    /// How long an engine gets to open its port
    pub ready_timeout: Duration,
    /// Bound on each readiness connect attempt
    pub connect_attempt_timeout: Duration,
    /// Pause between readiness attempts
    pub poll_interval: Duration,
    /// Total timeout of the geolocation request
    pub probe_timeout: Duration,
    /// Geolocation endpoint queried through each engine
    pub geolocation_url: String,
    /// Protocol of the engine's local inbound
    pub proxy_type: ProxyType,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            group_size: DEFAULT_GROUP_SIZE,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            connect_attempt_timeout: DEFAULT_CONNECT_ATTEMPT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            geolocation_url: DEFAULT_GEOLOCATION_URL.to_string(),
            proxy_type: ProxyType::Http,
        }
    }
}

impl VerifierConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.max_concurrency = concurrency;
        self
    }

    pub fn with_group_size(mut self, group_size: usize) -> Self {
        self.group_size = group_size;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_connect_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.connect_attempt_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_geolocation_url(mut self, url: String) -> Self {
        self.geolocation_url = url;
        self
    }

    pub fn with_proxy_type(mut self, proxy_type: ProxyType) -> Self {
        self.proxy_type = proxy_type;
        self
    }

    pub fn readiness(&self) -> ReadinessProbe {
        ReadinessProbe {
            timeout: self.ready_timeout,
            attempt_timeout: self.connect_attempt_timeout,
            poll_interval: self.poll_interval,
        }
    }
}

/// Verifies batches of engine configurations
pub struct BatchVerifier {
    config: VerifierConfig,
    launcher: Arc<dyn EngineLauncher>,
    locator: Arc<dyn LocationProbe>,
}

impl BatchVerifier {
    /// Verifier that runs `engine` and probes over HTTP
    pub fn new(config: VerifierConfig, engine: impl Into<PathBuf>) -> Self {
        Self::with_launcher(config, Arc::new(ProcessLauncher::new(engine)))
    }

    /// Verifier with a custom launcher and the HTTP geolocation probe
    pub fn with_launcher(config: VerifierConfig, launcher: Arc<dyn EngineLauncher>) -> Self {
        let locator = Arc::new(HttpLocationProbe::new(
            config.geolocation_url.clone(),
            config.probe_timeout,
            config.proxy_type,
        ));
        Self::with_components(config, launcher, locator)
    }

    pub fn with_components(
        config: VerifierConfig,
        launcher: Arc<dyn EngineLauncher>,
        locator: Arc<dyn LocationProbe>,
    ) -> Self {
        Self {
            config,
            launcher,
            locator,
        }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify every record and return the ones that carried traffic.
    ///
    /// Returns only after every task has finished. Result order is
    /// unspecified.
    pub async fn verify(&self, records: Vec<ConfigurationRecord>) -> Vec<VerificationResult> {
        let start = Instant::now();
        let total = records.len();

        let pool =
            WorkerPool::new(self.config.max_concurrency).with_group_size(self.config.group_size);
        let aggregator = ResultAggregator::with_capacity(total);
        let ctx = Arc::new(TaskContext::new(
            Arc::clone(&self.launcher),
            Arc::clone(&self.locator),
            self.config.readiness(),
        ));

        info!(
            total,
            concurrency = pool.max_concurrency(),
            "verifying batch"
        );

        pool.run(records, |record| {
            let ctx = Arc::clone(&ctx);
            let sink = aggregator.sink();
            async move {
                if let Some(result) = ctx.run(&record).await {
                    sink.push(result);
                }
            }
        })
        .await;

        let results = aggregator.drain();
        info!(
            total,
            working = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch complete"
        );
        results
    }

    /// Parse a serialized batch, verify it and serialize the results.
    ///
    /// Only a malformed payload is an error; nothing is spawned in that case.
    pub async fn verify_json(&self, input: &str) -> Result<String, BatchError> {
        let input: BatchInput = serde_json::from_str(input).map_err(BatchError::InputParse)?;
        let outputs = self.verify(input.configs).await;
        serde_json::to_string(&BatchOutput { outputs }).map_err(BatchError::Encode)
    }
}
