#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter running a headless horde survival simulation.

mod session;

use std::fs;
use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use horde_core::ImpactContext;
use horde_system_impact::{ImpactConfig, ImpactResolver};
use horde_system_wave_scheduler::{SchedulerConfig, WaveScheduler};
use tracing_subscriber::EnvFilter;

use crate::session::Session;

#[derive(Debug, Parser)]
#[command(name = "horde")]
#[command(about = "Run a headless horde survival simulation and print a summary")]
struct Args {
    /// Simulated seconds to run.
    #[arg(long, default_value_t = 60.0)]
    seconds: f32,

    /// Frames per simulated second.
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Seed overriding the configured random seeds.
    #[arg(long)]
    seed: Option<u64>,

    /// TOML file with waves, enemy profiles and scheduler tuning.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Upgrade multiplier applied to primary and explosion knockback.
    #[arg(long, default_value_t = 1.0)]
    knockback: f32,

    /// Upgrade multiplier applied to chain knockback.
    #[arg(long, default_value_t = 1.0)]
    chain_force: f32,
}

/// Entry point for the horde command-line interface.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    ensure!(
        args.seconds.is_finite() && args.seconds > 0.0,
        "--seconds must be a positive number, got {}",
        args.seconds
    );
    ensure!(args.fps > 0, "--fps must be positive");
    ensure!(
        args.knockback.is_finite() && args.chain_force.is_finite(),
        "knockback multipliers must be finite"
    );

    let mut scheduler_config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            SchedulerConfig::from_toml_str(&text)
                .with_context(|| format!("invalid scheduler config in {}", path.display()))?
        }
        None => SchedulerConfig::default(),
    };
    let mut impact_config = ImpactConfig::default();
    if let Some(seed) = args.seed {
        scheduler_config.rng_seed = seed;
        impact_config.rng_seed = seed.rotate_left(17);
    }

    let scheduler =
        WaveScheduler::new(scheduler_config).context("failed to build wave scheduler")?;
    let resolver = ImpactResolver::new(impact_config);
    let context = ImpactContext {
        knockback_multiplier: args.knockback,
        chain_force_multiplier: args.chain_force,
    };

    let frame_ms = 1_000.0 / args.fps as f32;
    let frames = (f64::from(args.seconds) * f64::from(args.fps)).ceil() as u64;

    let mut session = Session::new(scheduler, resolver, context);
    session.run(frames, frame_ms);
    println!("{}", session.summary());
    Ok(())
}
