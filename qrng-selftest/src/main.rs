// SPDX-License-Identifier: MIT
//
// QRNG Supply: Buffered Quantum Randomness for Impatient Consumers

//! QRNG Self-Test - Statistical check of the randomness supply
//!
//! Draws a sample from a [`RandomNumberService`], stops politely when the supply
//! reports exhaustion, and runs a Kolmogorov–Smirnov goodness-of-fit check of
//! the sample against the uniform distribution over the requested range.
//!
//! ```text
//! ┌──────────────┐    HTTPS     ┌──────────────┐   next_in_range   ┌──────────────┐
//! │   QRNG API   │ ───────────> │    Supply    │ ────────────────> │  Self-Test   │
//! │   (remote)   │   (bulk)     │   (buffer)   │    (blocking)     │  (KS check)  │
//! └──────────────┘              └──────────────┘                   └──────────────┘
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use qrng_supply::{
    stats::{self, UniformRange},
    Error, RandomNumberService, SupplyConfig,
};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "qrng-selftest")]
#[command(about = "QRNG Self-Test - Checks quantum random values for uniformity", long_about = None)]
struct Args {
    /// Path to configuration file (environment variables are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `info` or `qrng_supply=debug` (RUST_LOG takes precedence)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// What to draw
    #[arg(long, value_enum, default_value_t = Mode::Range)]
    mode: Mode,

    /// Number of values to draw
    #[arg(short, long, default_value = "1000")]
    samples: usize,

    /// Lower bound (inclusive) in range mode
    #[arg(long, default_value = "-99999999", allow_hyphen_values = true)]
    min: i64,

    /// Upper bound (exclusive) in range mode
    #[arg(long, default_value = "100000000", allow_hyphen_values = true)]
    max: i64,

    /// Significance level
    #[arg(short, long, default_value_t = stats::DEFAULT_ALPHA)]
    alpha: f64,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    metrics: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Values from `next_in_range(min, max)`
    Range,
    /// Raw `next_i32` values
    Int32,
}

impl Args {
    fn distribution(&self) -> Result<UniformRange> {
        match self.mode {
            Mode::Range => Ok(UniformRange::new(self.min, self.max)?),
            Mode::Int32 => Ok(UniformRange::full_i32()),
        }
    }
}

/// Draw up to `count` values, stopping at the first consumer-facing failure
fn collect_sample(service: &RandomNumberService, args: &Args) -> Result<Vec<i64>> {
    let mut sample = Vec::with_capacity(args.samples);

    for _ in 0..args.samples {
        let drawn = match args.mode {
            Mode::Range => service.next_in_range(args.min, args.max),
            Mode::Int32 => service.next_i32().map(i64::from),
        };

        match drawn {
            Ok(value) => sample.push(value),
            Err(Error::EntropyExhausted) => {
                warn!(
                    "Random numbers are exhausted for this session; stopping after {} of {} values",
                    sample.len(),
                    args.samples
                );
                break;
            }
            Err(Error::InterruptedWait) => {
                warn!("Supply shut down while waiting; stopping after {} values", sample.len());
                break;
            }
            Err(e) => return Err(e).context("Failed to draw a random value"),
        }
    }

    Ok(sample)
}

fn run(args: &Args) -> Result<bool> {
    let distribution = args.distribution().context("Invalid range")?;

    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from file: {:?}", path);
            SupplyConfig::from_file(path).context("Failed to load configuration from file")?
        }
        None => {
            info!("Loading configuration from environment variables");
            SupplyConfig::from_env().context("Failed to load configuration from environment")?
        }
    };

    let service = RandomNumberService::new(config).context("Failed to start randomness supply")?;

    info!(
        "Drawing {} {:?} values over [{}, {})",
        args.samples,
        args.mode,
        distribution.min(),
        distribution.max()
    );
    let mut sample = collect_sample(&service, args)?;

    let status = service.status();
    info!(
        "Upstream requests used: {}/{}, bytes left in buffer: {}",
        status.requests_issued,
        status.requests_issued + status.requests_remaining,
        status.buffered_bytes
    );
    if args.metrics {
        print!("{}", service.metrics().prometheus_format());
    }
    service.shutdown();

    if sample.is_empty() {
        bail!("No random values could be drawn");
    }

    let outcome = stats::kolmogorov_smirnov(&mut sample, &distribution, args.alpha)?;
    info!(
        "KS statistic {:.6}, critical value {:.6} (n = {}, alpha = {})",
        outcome.statistic, outcome.critical_value, outcome.sample_size, outcome.alpha
    );

    if outcome.passes() {
        println!(
            "Sample matches the uniform distribution at significance level {:.2}",
            outcome.alpha
        );
    } else {
        println!(
            "Sample does NOT match the uniform distribution at significance level {:.2}",
            outcome.alpha
        );
    }
    Ok(outcome.passes())
}

/// Filter from a `--log-level` directive, falling back to `info` when it does not parse
fn log_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .json()
        .init();

    info!("QRNG Self-Test v{}", env!("CARGO_PKG_VERSION"));

    match run(&args) {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(2),
        Err(e) => {
            error!("Self-test failed: {:#}", e);
            Err(e)
        }
    }
}
