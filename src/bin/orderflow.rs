//! orderflow CLI: run the order-processing pipeline.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use orderflow::config::Config;
use orderflow::event::{JsonSink, NullSink};
use orderflow::pipeline::Pipeline;
use orderflow::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "orderflow", about = "Concurrent order-processing pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate, process and aggregate a batch of orders
    Run {
        #[command(flatten)]
        overrides: Overrides,
        /// Output format for events and the final report
        #[arg(long, value_enum, default_value_t = Format::Human)]
        format: Format,
        /// Only print the final report
        #[arg(long)]
        quiet: bool,
    },
    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        overrides: Overrides,
    },
}

#[derive(Args)]
struct Overrides {
    /// Pipeline config file (TOML); overrides ORDERFLOW_CONFIG
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of orders to generate
    #[arg(long)]
    orders: Option<u64>,
    /// Worker pool size
    #[arg(long)]
    workers: Option<usize>,
    /// Processing attempts per order
    #[arg(long)]
    max_attempts: Option<u32>,
    /// Upper bound of the delay between orders
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Shortest simulated processing time
    #[arg(long)]
    min_ms: Option<u64>,
    /// Longest simulated processing time
    #[arg(long)]
    max_ms: Option<u64>,
    /// Chance a single attempt succeeds (0.0 - 1.0)
    #[arg(long)]
    success_probability: Option<f64>,
    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Human,
    Json,
}

impl Overrides {
    fn apply(self, config: &mut Config) -> anyhow::Result<()> {
        let pipeline = &mut config.pipeline;
        if let Some(path) = self.config {
            // A file given on the command line replaces ORDERFLOW_CONFIG;
            // the per-field env overrides still apply on top of it.
            *pipeline = orderflow::config::PipelineConfig::load(&path)?;
            pipeline.apply_env_overrides(|name| std::env::var(name).ok())?;
        }
        if let Some(v) = self.orders {
            pipeline.orders = v;
        }
        if let Some(v) = self.workers {
            pipeline.workers = v;
        }
        if let Some(v) = self.max_attempts {
            pipeline.max_attempts = v;
        }
        if let Some(v) = self.interval_ms {
            pipeline.generation_interval_ms = v;
        }
        if let Some(v) = self.min_ms {
            pipeline.processing_min_ms = v;
        }
        if let Some(v) = self.max_ms {
            pipeline.processing_max_ms = v;
        }
        if let Some(v) = self.success_probability {
            pipeline.success_probability = v;
        }
        if let Some(v) = self.seed {
            pipeline.seed = Some(v);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Command::Run {
            overrides,
            format,
            quiet,
        } => {
            overrides.apply(&mut config)?;
            cmd_run(config, format, quiet).await
        }
        Command::Config { overrides } => {
            overrides.apply(&mut config)?;
            config.pipeline.validate()?;
            print!("{}", config.pipeline.to_toml()?);
            Ok(())
        }
    }
}

async fn cmd_run(config: Config, format: Format, quiet: bool) -> anyhow::Result<()> {
    let guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "orderflow".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    let pipeline = Pipeline::new(config.pipeline)?;
    let pipeline = match (quiet, format) {
        (true, _) => pipeline.with_sink(NullSink),
        (false, Format::Json) => pipeline.with_sink(JsonSink::stdout()),
        (false, Format::Human) => pipeline,
    };

    let report = pipeline.run().await;
    guard.force_flush();
    let report = report?;

    match format {
        Format::Human => println!("\n{}", report.summary),
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}
