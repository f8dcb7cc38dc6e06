use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proxy_verifier::{
    proxy::{
        BatchInput, BatchPreparer, BatchVerifier, EntryParser, ProcessLauncher, ProxyType,
        VerifierConfig,
    },
    BatchError,
};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Verifies proxy engine configurations by running them
#[derive(Parser)]
#[command(name = "proxy-verifier")]
#[command(
    about = "Verifies proxy engine configurations by running them and probing egress location"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a batch of configurations
    Verify {
        /// Batch input file ("-" reads stdin)
        #[arg(short, long, default_value = "-")]
        input: String,
        /// Path to the proxy engine executable
        #[arg(short, long)]
        engine: PathBuf,
        /// Engine argument template; {config} and {port} are substituted
        #[arg(long = "engine-arg", allow_hyphen_values = true)]
        engine_args: Vec<String>,
        /// Output file for results (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Maximum number of engines running at once
        #[arg(short = 'n', long, default_value = "50")]
        concurrency: usize,
        /// Bookkeeping group size
        #[arg(long, default_value = "300")]
        group_size: usize,
        /// Readiness timeout in milliseconds
        #[arg(long, default_value = "5000")]
        ready_timeout_ms: u64,
        /// Bound on each readiness connect attempt in milliseconds
        #[arg(long, default_value = "100")]
        connect_timeout_ms: u64,
        /// Pause between readiness attempts in milliseconds
        #[arg(long, default_value = "50")]
        poll_interval_ms: u64,
        /// Probe timeout in seconds
        #[arg(long, default_value = "5")]
        probe_timeout: u64,
        /// Geolocation endpoint queried through each engine
        #[arg(long, default_value = "http://ip-api.com/json/")]
        geo_url: String,
        /// Engine inbound protocol (http, socks5)
        #[arg(short = 't', long, default_value = "http")]
        proxy_type: ProxyType,
    },
    /// Prepare a batch input from an entry list and engine config templates
    Prepare {
        /// Entry list, one "[identifier] config-path" per line
        #[arg(short, long)]
        list: PathBuf,
        /// Directory receiving the per-entry engine configs
        #[arg(long)]
        out_dir: PathBuf,
        /// Ports are assigned from base-port + 1 upward
        #[arg(long, default_value = "1000")]
        base_port: u16,
        /// Output file for the batch input (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Commands::Verify {
            input,
            engine,
            engine_args,
            output,
            concurrency,
            group_size,
            ready_timeout_ms,
            connect_timeout_ms,
            poll_interval_ms,
            probe_timeout,
            geo_url,
            proxy_type,
        } => {
            let payload = read_input(&input)?;

            let config = VerifierConfig::new()
                .with_concurrency(concurrency)
                .with_group_size(group_size)
                .with_ready_timeout(Duration::from_millis(ready_timeout_ms))
                .with_connect_attempt_timeout(Duration::from_millis(connect_timeout_ms))
                .with_poll_interval(Duration::from_millis(poll_interval_ms))
                .with_probe_timeout(Duration::from_secs(probe_timeout))
                .with_geolocation_url(geo_url)
                .with_proxy_type(proxy_type);

            let mut launcher = ProcessLauncher::new(&engine);
            if !engine_args.is_empty() {
                launcher = launcher.with_args(engine_args);
            }

            eprintln!("Engine: {}", engine.display());
            eprintln!(
                "Checking with {} workers, ready timeout: {}ms, probe timeout: {}s",
                config.max_concurrency, ready_timeout_ms, probe_timeout
            );

            let verifier = BatchVerifier::with_launcher(config, Arc::new(launcher));
            let result = match verifier.verify_json(&payload).await {
                Ok(result) => result,
                Err(e @ BatchError::InputParse(_)) => {
                    return Err(e).with_context(|| format!("invalid batch input {}", input))
                }
                Err(e) => return Err(e.into()),
            };

            write_output(output.as_ref(), &result)?;
        }
        Commands::Prepare {
            list,
            out_dir,
            base_port,
            output,
        } => {
            let entries = EntryParser::parse_file(&list)?;
            eprintln!("Loaded {} entries from {:?}", entries.len(), list);

            let batch: BatchInput = BatchPreparer::new(&out_dir)
                .with_base_port(base_port)
                .prepare(&entries)?;
            eprintln!(
                "Prepared {} engine configs in {:?}",
                batch.configs.len(),
                out_dir
            );

            write_output(output.as_ref(), &serde_json::to_string_pretty(&batch)?)?;
        }
    }

    Ok(())
}

/// Initialize logging, preferring RUST_LOG over the given level
fn init_logging(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut payload = String::new();
        std::io::stdin()
            .read_to_string(&mut payload)
            .context("reading batch from stdin")?;
        Ok(payload)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("reading {}", input))
    }
}

fn write_output(path: Option<&PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content).with_context(|| format!("writing {:?}", path))?;
            eprintln!("Saved output to {:?}", path);
        }
        None => println!("{}", content),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_readiness_flags() {
        let cli = Cli::try_parse_from([
            "proxy-verifier",
            "verify",
            "--engine",
            "/usr/local/bin/xray",
            "--connect-timeout-ms",
            "250",
            "--poll-interval-ms",
            "20",
        ])
        .unwrap();

        match cli.command {
            Commands::Verify {
                connect_timeout_ms,
                poll_interval_ms,
                ready_timeout_ms,
                ..
            } => {
                assert_eq!(connect_timeout_ms, 250);
                assert_eq!(poll_interval_ms, 20);
                assert_eq!(ready_timeout_ms, 5000);
            }
            Commands::Prepare { .. } => panic!("parsed the wrong subcommand"),
        }
    }

    #[test]
    fn test_verify_readiness_flag_defaults() {
        let cli = Cli::try_parse_from(["proxy-verifier", "verify", "-e", "xray"]).unwrap();
        match cli.command {
            Commands::Verify {
                connect_timeout_ms,
                poll_interval_ms,
                ..
            } => {
                assert_eq!(connect_timeout_ms, 100);
                assert_eq!(poll_interval_ms, 50);
            }
            Commands::Prepare { .. } => panic!("parsed the wrong subcommand"),
        }
    }
}
