//! Claimguard
//!
//! Diagnostic command line for a claim store.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use claimguard::{
    Engine,
    config::{LogFormat, load_config},
    model::{BlockPos, Subject, UserId, WorldId},
    permission::Flag,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Claimguard - land claim protection engine
#[derive(Parser, Debug)]
#[command(name = "claimguard")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "CLAIMGUARD_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CLAIMGUARD_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the claim owning a block
    ClaimAt {
        world: WorldId,
        x: i32,
        y: i32,
        z: i32,
    },
    /// Decide a flag for a user at a block
    Check {
        world: WorldId,
        x: i32,
        y: i32,
        z: i32,
        user: UserId,
        flag: Flag,
        /// Permission groups the user belongs to
        #[arg(long = "group")]
        groups: Vec<String>,
        /// Source object (namespace:name)
        #[arg(long)]
        source: Option<String>,
        /// Target object (namespace:name)
        #[arg(long)]
        target: Option<String>,
    },
    /// List the claims of a world
    List { world: WorldId },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize logging
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting claimguard");

    let engine = Engine::from_config(config)
        .inspect_err(|e| error!(error = %e, "Failed to create engine"))?;
    engine
        .start()
        .await
        .inspect_err(|e| error!(error = %e, "Failed to load stored claims"))?;

    match args.command {
        Command::ClaimAt { world, x, y, z } => {
            engine.registry().load_world(world).await?;
            let claim = engine
                .registry()
                .claim_at(world, BlockPos::new(x, y, z))
                .with_context(|| format!("world {world} is not loaded"))?;
            println!("{}", serde_json::to_string_pretty(claim.as_ref())?);
        }
        Command::Check {
            world,
            x,
            y,
            z,
            user,
            flag,
            groups,
            source,
            target,
        } => {
            engine.registry().load_world(world).await?;
            let subject = Subject::user(user).with_groups(groups);
            let result = engine.permissions().check(
                world,
                BlockPos::new(x, y, z),
                &subject,
                flag,
                source.as_deref(),
                target.as_deref(),
            );
            println!(
                "{flag}: {} (source: {:?}, trust: {:?})",
                result.value(),
                result.source(),
                result.trust()
            );
            if let Some(message) = result.message() {
                println!("  {message}");
            }
        }
        Command::List { world } => {
            engine.registry().load_world(world).await?;
            for claim in engine.registry().all_claims(world) {
                println!(
                    "{} {} {} owner={}",
                    claim.id(),
                    claim.claim_type(),
                    claim.bounds(),
                    claim
                        .owner()
                        .map(|owner| owner.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }
    }

    Ok(())
}
