//! cachesim CLI: compare cache-tier routing strategies under live load.

use anyhow::{bail, Context};
use cachesim_core::config::SimConfig;
use cachesim_core::{metrics, Simulation, TopologyChange};
use cachesim_routing::{available_routers, RouterKind};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "cachesim",
    about = "Simulate request routing across a tier of caching servers",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation with a single router.
    Run {
        #[command(flatten)]
        sim: SimArgs,
        /// Router name (overrides the config file).
        #[arg(short, long)]
        router: Option<String>,
        /// Print the cache-miss rate over this many slices of the run.
        #[arg(long)]
        timeline: Option<usize>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the same configuration against several routers.
    Compare {
        #[command(flatten)]
        sim: SimArgs,
        /// Comma-separated list of router names; defaults to all.
        #[arg(short = 'R', long, value_delimiter = ',')]
        routers: Vec<String>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List available routers.
    ListRouters,
}

/// Configuration source plus command-line overrides.
#[derive(Args)]
struct SimArgs {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Run length in milliseconds.
    #[arg(long)]
    duration_ms: Option<u64>,
    /// Initial number of servers.
    #[arg(long)]
    servers: Option<usize>,
    /// Worker threads per server.
    #[arg(long)]
    workers: Option<usize>,
    /// Number of distinct resource keys.
    #[arg(long)]
    resources: Option<usize>,
    /// Mean cache-miss duration in microseconds.
    #[arg(long)]
    avg_miss_us: Option<u64>,
    /// Bounded-load factor C.
    #[arg(long)]
    load_factor: Option<f64>,
    /// Mean gap between arrivals in microseconds (Poisson arrivals).
    #[arg(long)]
    arrival_interval_us: Option<u64>,
    /// Stop creating requests after this many.
    #[arg(long)]
    request_limit: Option<u64>,
    /// Random seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Double the server count at this offset.
    #[arg(long)]
    double_servers_at_ms: Option<u64>,
    /// Remove a random server at this offset (repeatable).
    #[arg(long)]
    remove_random_server_at_ms: Vec<u64>,
}

impl SimArgs {
    fn load(&self) -> anyhow::Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => SimConfig::default(),
        };
        if let Some(ms) = self.duration_ms {
            config = config.with_duration(Duration::from_millis(ms));
        }
        if let Some(n) = self.servers {
            config = config.with_servers(n);
        }
        if let Some(n) = self.workers {
            config = config.with_workers_per_server(n);
        }
        if let Some(n) = self.resources {
            config = config.with_resources(n);
        }
        if let Some(us) = self.avg_miss_us {
            config = config.with_avg_miss_duration(Duration::from_micros(us));
        }
        if let Some(c) = self.load_factor {
            config = config.with_load_factor(c);
        }
        if let Some(us) = self.arrival_interval_us {
            config = config.with_arrival_interval(Duration::from_micros(us));
        }
        if let Some(limit) = self.request_limit {
            config = config.with_request_limit(limit);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(ms) = self.double_servers_at_ms {
            config = config.with_event(Duration::from_millis(ms), TopologyChange::DoubleServers);
        }
        for &ms in &self.remove_random_server_at_ms {
            config = config.with_event(
                Duration::from_millis(ms),
                TopologyChange::RemoveRandomServer,
            );
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn load_config(path: &Path) -> anyhow::Result<SimConfig> {
    SimConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))
}

fn parse_router(name: &str) -> anyhow::Result<RouterKind> {
    match RouterKind::from_name(name) {
        Some(kind) => Ok(kind),
        None => bail!(
            "unknown router: {}. Available: {:?}",
            name,
            available_routers()
        ),
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    println!("Results written to {}", path.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,cachesim_core=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            sim,
            router,
            timeline,
            output,
        } => {
            let mut config = sim.load()?;
            if let Some(name) = router {
                config = config.with_router(parse_router(&name)?);
            }

            let mut simulation = Simulation::new(config)?;
            simulation.run()?;
            simulation.wait_for_actors(Duration::from_secs(1));
            let report = simulation.report();
            println!("{}", metrics::format_table(&report));

            if let Some(buckets) = timeline {
                let rates = metrics::miss_rate_timeline(&simulation.requests(), buckets);
                println!("Cache miss rate over time:");
                for (i, rate) in rates.iter().enumerate() {
                    println!("  [{:>3}] {:>6.2}%", i, rate * 100.0);
                }
            }

            if let Some(output_path) = output {
                write_json(&output_path, &report)?;
            }
        }
        Commands::Compare {
            sim,
            routers,
            output,
        } => {
            let config = sim.load()?;
            let names: Vec<&str> = if routers.is_empty() {
                available_routers()
            } else {
                routers.iter().map(|s| s.as_str()).collect()
            };
            let kinds = names
                .iter()
                .map(|name| parse_router(name))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let results = cachesim_core::compare_routers(&config, &kinds)?;
            println!("{}", metrics::format_comparison_table(&results));
            for result in &results {
                println!("{}", metrics::format_table(result));
            }

            if let Some(output_path) = output {
                write_json(&output_path, &results)?;
            }
        }
        Commands::ListRouters => {
            println!("Available routers:");
            for name in available_routers() {
                println!("  - {}", name);
            }
        }
    }
    Ok(())
}
