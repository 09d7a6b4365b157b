mod samples;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context as _, ensure};
use clap::Parser;
use decay_stats::{DEFAULT_COMPRESSION, TimeDistribution, TimeUnit};
use log::{debug, info, warn};
use tokio::{signal, time};

use crate::samples::LatencyGenerator;

/// Highest per-writer rate whose sampling period is still at least 1ns.
const MAX_RATE: u32 = 1_000_000_000;

/// Drives one decayed distribution from many concurrent writers and reports
/// its snapshot periodically.
#[derive(Debug, Parser)]
#[command(name = "decay-stats-load")]
struct Args {
    /// Number of concurrent writer tasks.
    #[arg(long, default_value_t = 4)]
    writers: usize,

    /// Samples per second produced by each writer.
    #[arg(long, default_value_t = 1000)]
    rate: u32,

    /// Run time in seconds; 0 runs until ctrl-c.
    #[arg(long, default_value_t = 30)]
    duration: u64,

    /// Seconds between snapshot reports.
    #[arg(long, default_value_t = 5)]
    report_interval: u64,

    /// Decay rate per second (0 disables decay).
    #[arg(long, default_value_t = 0.015)]
    alpha: f64,

    #[arg(long, default_value = "ms")]
    unit: TimeUnit,

    #[arg(long, default_value_t = DEFAULT_COMPRESSION)]
    compression: usize,

    /// Median synthetic latency in milliseconds.
    #[arg(long, default_value_t = 5)]
    median_ms: u64,

    /// Probability that a sample is a tail spike.
    #[arg(long, default_value_t = 0.01)]
    spike_probability: f64,

    /// Base seed; writer `i` uses `seed + i`.
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

impl Args {
    fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.writers > 0, "--writers must be at least 1");
        ensure!(
            (1..=MAX_RATE).contains(&self.rate),
            "--rate must be between 1 and {MAX_RATE}"
        );
        ensure!(self.report_interval > 0, "--report-interval must be at least 1");
        ensure!(
            (0.0..=1.0).contains(&self.spike_probability),
            "--spike-probability must be between 0 and 1"
        );
        Ok(())
    }

    /// Interval between two samples of one writer.
    fn period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.rate))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    args.validate()?;

    let distribution = Arc::new(
        TimeDistribution::builder()
            .alpha(args.alpha)
            .unit(args.unit)
            .compression(args.compression)
            .build()
            .context("invalid distribution settings")?,
    );
    let added = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    let period = args.period();
    let median = Duration::from_millis(args.median_ms);
    let mut tasks = Vec::with_capacity(args.writers + 1);
    for id in 0..args.writers {
        let generator = LatencyGenerator::new(
            args.seed.wrapping_add(id as u64),
            median,
            args.spike_probability,
        );
        tasks.push(tokio::spawn(write_samples(
            id,
            distribution.clone(),
            added.clone(),
            generator,
            period,
        )));
    }

    let report_interval = Duration::from_secs(args.report_interval);
    tasks.push(tokio::spawn(report(
        distribution.clone(),
        added.clone(),
        start,
        report_interval,
    )));

    let run_for = async {
        if args.duration == 0 {
            std::future::pending::<()>().await;
        } else {
            time::sleep(Duration::from_secs(args.duration)).await;
        }
    };

    tokio::select! {
        _ = signal::ctrl_c() => {
            println!("Exiting...");
        }
        _ = run_for => {
            info!("run finished after {}s", args.duration);
        }
    }

    for task in &tasks {
        task.abort();
    }

    let snapshot = distribution.snapshot();
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("failed to encode snapshot")?
    );

    Ok(())
}

async fn write_samples(
    id: usize,
    distribution: Arc<TimeDistribution>,
    added: Arc<AtomicU64>,
    mut generator: LatencyGenerator,
    period: Duration,
) {
    debug!("writer {id} started");
    let mut ticker = time::interval(period);
    loop {
        ticker.tick().await;
        match distribution.add(generator.next_nanos()) {
            Ok(()) => {
                added.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!("writer {id} failed to record sample: {e}"),
        }
    }
}

async fn report(
    distribution: Arc<TimeDistribution>,
    added: Arc<AtomicU64>,
    start: Instant,
    every: Duration,
) {
    let mut ticker = time::interval(every);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let snapshot = distribution.snapshot();
        let samples = added.load(Ordering::Relaxed);
        let elapsed = start.elapsed().as_secs_f64();
        println!(
            "📊 {} samples in {:.1}s = {:.1} events/sec, decayed count {:.1}",
            samples,
            elapsed,
            samples as f64 / elapsed,
            snapshot.count()
        );
        info!(
            "p50:{:.2} p90:{:.2} p99:{:.2} max:{:.2} avg:{:.2} ({})",
            snapshot.p50(),
            snapshot.p90(),
            snapshot.p99(),
            snapshot.max(),
            snapshot.avg(),
            snapshot.unit()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(flags: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("decay-stats-load").chain(flags.iter().copied()))
            .unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let args = parse(&[]);
        assert!(args.validate().is_ok());
        assert_eq!(args.period(), Duration::from_millis(1));
    }

    #[test]
    fn rejects_rates_without_a_positive_period() {
        assert!(parse(&["--rate", "0"]).validate().is_err());
        assert!(parse(&["--rate", "4000000000"]).validate().is_err());

        let fastest = parse(&["--rate", "1000000000"]);
        assert!(fastest.validate().is_ok());
        assert_eq!(fastest.period(), Duration::from_nanos(1));
    }

    #[test]
    fn rejects_spike_probability_outside_unit_interval() {
        for bad in ["NaN", "-0.1", "1.5"] {
            let flag = format!("--spike-probability={bad}");
            let args = parse(&[flag.as_str()]);
            assert!(args.validate().is_err(), "accepted {bad}");
        }
        assert!(parse(&["--spike-probability", "1"]).validate().is_ok());
    }
}
