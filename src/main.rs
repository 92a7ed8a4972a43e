use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use setgen::config::{ConfigParams, Environment, RunFile};
use setgen::delivery::{run_generation, FlakyQueue};
use setgen::formats::json::SpoolQueue;
use std::path::PathBuf;
use tracing::info;

const DEFAULT_DESTINATION: &str = "set-transmitter";

#[derive(Debug, Parser)]
#[command(name = "setgen")]
#[command(about = "Mock security event token generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Gen {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Generation overrides as a JSON object; replaces the file's table.
        #[arg(long)]
        overrides: Option<String>,
        #[arg(short, long)]
        environment: Option<Environment>,
        #[arg(long)]
        seed: Option<u64>,
        /// Spool directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Gen {
            config,
            overrides,
            environment,
            seed,
            output,
            dry_run,
        } => {
            let mut loaded = match &config {
                Some(path) => RunFile::from_path(path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => RunFile::default(),
            };
            if let Some(environment) = environment {
                loaded.environment = environment;
            }
            if let Some(seed) = seed {
                loaded.seed = Some(seed);
            }
            if let Some(dir) = output {
                loaded.queue.dir = dir.to_string_lossy().to_string();
            }
            let raw_overrides: Option<Value> = match overrides {
                Some(text) => Some(serde_json::from_str(&text).context("parsing --overrides")?),
                None => loaded.overrides_json()?,
            };

            if dry_run {
                let mut params = ConfigParams::new(loaded.environment);
                if let Some(raw) = &raw_overrides {
                    params.apply_overrides(raw)?;
                }
                println!("run file loaded: {loaded:#?}");
                println!("{}", serde_json::to_string_pretty(params.config())?);
                return Ok(());
            }

            let destination = loaded
                .destination
                .clone()
                .unwrap_or_else(|| DEFAULT_DESTINATION.to_string());
            let mut rng = match loaded.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let mut spool = SpoolQueue::new(
                &loaded.queue.dir,
                loaded.queue.target_size_mb,
                loaded.queue.compression.as_deref(),
            )?;

            let report = match loaded.queue.failure_rate {
                Some(rate) if rate > 0.0 => {
                    let queue_seed = loaded.seed.map(|seed| seed.wrapping_add(1));
                    let flaky = FlakyQueue::new(&mut spool, rate, queue_seed).map_err(|err| {
                        anyhow::anyhow!("invalid queue failure_rate {rate}: {err}")
                    })?;
                    run_generation(
                        raw_overrides.as_ref(),
                        loaded.environment,
                        flaky,
                        &destination,
                        &mut rng,
                    )?
                }
                _ => run_generation(
                    raw_overrides.as_ref(),
                    loaded.environment,
                    &mut spool,
                    &destination,
                    &mut rng,
                )?,
            };
            spool.close()?;

            info!(
                sent = report.messages_sent,
                unsent = report.unsent_messages,
                dir = %loaded.queue.dir,
                "generation finished"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
