#![recursion_limit = "256"]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use redox_selfplay::config::AppConfig;
use redox_selfplay::training::{TrainingContext, TrainingCoordinator};

/// Train the tumor and sink-designer policies against each other.
#[derive(Parser)]
#[command(name = "train", about = "Self-play IMPALA training for redox metabolic design")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the total timestep budget
    #[arg(long)]
    timesteps: Option<u64>,

    /// Override the number of rollout workers
    #[arg(long)]
    num_actors: Option<usize>,

    /// Override the learning rate
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Override the checkpoint directory
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Override the delta cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Override the episode seed
    #[arg(long)]
    seed: Option<u64>,

    /// Resume from the latest checkpoint in the checkpoint directory
    #[arg(long)]
    resume: bool,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_default_config: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if cli.print_default_config {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    // Apply CLI overrides
    if let Some(timesteps) = cli.timesteps {
        config.training.total_timesteps = timesteps;
    }
    if let Some(num_actors) = cli.num_actors {
        config.training.num_actors = num_actors;
    }
    if let Some(lr) = cli.learning_rate {
        config.training.learning_rate = lr;
    }
    if let Some(dir) = cli.checkpoint_dir {
        config.training.checkpoint_dir = dir;
    }
    if let Some(dir) = cli.cache_dir {
        config.cache.cache_dir = Some(dir);
    }
    if let Some(seed) = cli.seed {
        config.training.seed = Some(seed);
    }

    let context = TrainingContext::from_config(config);
    info!(
        deltas = context.cache.len(),
        pairs = context.cache.pair_count(),
        "delta cache ready"
    );
    if context.cache.is_empty() {
        warn!("delta cache is empty; construct outcomes fall back to the baseline");
    }

    let mut coordinator =
        TrainingCoordinator::with_surrogate(context).context("setting up training")?;

    if cli.resume {
        match coordinator.checkpoint_manager().latest() {
            Ok(path) => coordinator
                .load_checkpoint(&path)
                .with_context(|| format!("resuming from {}", path.display()))?,
            Err(e) => info!("no checkpoint found ({e}), starting fresh"),
        }
    }

    let stats = coordinator.train().context("training")?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
