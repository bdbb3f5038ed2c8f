//! sonde-sim - IoT sensor fleet simulator
//!
//! Usage:
//!   sonde-sim run --duration 30s
//!   sonde-sim run --duration 5m --out data/raw_data.csv --config fleet.json
//!   sonde-sim list

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sonde_core::{DistributionSpec, SensorKind};
use sonde_sim::{Fleet, FleetConfig, ShutdownReport};

#[derive(Parser)]
#[command(name = "sonde-sim")]
#[command(about = "Synthetic IoT sensor fleet writing an append-only raw record store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a bounded simulation
    Run {
        /// Duration (e.g., 30s, 5m, 1h)
        #[arg(short, long, default_value = "30s")]
        duration: String,

        /// Raw record store path (overrides the config file)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// JSON fleet configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the sampling interval of every sensor (milliseconds)
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// List sensor kinds and their default distributions
    List,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            duration,
            out,
            config,
            interval_ms,
        } => run(duration, out, config, interval_ms),
        Commands::List => {
            list();
            ExitCode::SUCCESS
        }
    }
}

fn run(
    duration: String,
    out: Option<PathBuf>,
    config_path: Option<PathBuf>,
    interval_ms: Option<u64>,
) -> ExitCode {
    let mut config = match config_path {
        Some(path) => match FleetConfig::from_path(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => FleetConfig::default(),
    };
    if let Some(out) = out {
        config.output = out;
    }
    if let Some(ms) = interval_ms {
        for sensor in &mut config.sensors {
            sensor.interval_ms = ms;
        }
    }

    let duration = parse_duration(&duration);
    let shutdown_timeout = config.shutdown_timeout();

    eprintln!(
        "Simulating {} sensor(s) for {:.0?} -> {}",
        config.sensors.len(),
        duration,
        config.output.display()
    );

    match Fleet::run_for(config, duration, shutdown_timeout) {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_report(report: &ShutdownReport) {
    eprintln!("\n╔══════════════════════════════════════════════════════════╗");
    eprintln!("║                   Simulation Complete                     ║");
    eprintln!("╠══════════════════════════════════════════════════════════╣");
    for producer in &report.producers {
        eprintln!(
            "║ {:12} {:12} {:>8} samples {:>6} failed   ║",
            producer.id,
            producer.kind.name(),
            producer.samples,
            producer.append_failures
        );
    }
    eprintln!("╠══════════════════════════════════════════════════════════╣");
    eprintln!(
        "║ Total: {:>8} samples in {:<28.1?} ║",
        report.total_samples(),
        report.elapsed
    );
    eprintln!("╚══════════════════════════════════════════════════════════╝");
}

fn list() {
    println!("Available sensor kinds:\n");
    for kind in SensorKind::ALL {
        let spec = DistributionSpec::default_for(kind);
        println!(
            "  {:12} unit {:3}  default {:?} (mean ≈ {:.1})",
            kind.name(),
            kind.unit(),
            spec,
            spec.mean()
        );
    }
    println!("\nUsage: sonde-sim run --duration 30s [--config fleet.json]");
}

fn parse_duration(s: &str) -> Duration {
    let s = s.trim();
    let secs = if let Some(v) = s.strip_suffix('h') {
        v.parse::<u64>().unwrap_or(1) * 3600
    } else if let Some(v) = s.strip_suffix('m') {
        v.parse::<u64>().unwrap_or(1) * 60
    } else if let Some(v) = s.strip_suffix('s') {
        v.parse::<u64>().unwrap_or(30)
    } else {
        s.parse::<u64>().unwrap_or(30)
    };
    Duration::from_secs(secs)
}
