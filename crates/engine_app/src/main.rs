//! # engine_app: coordinator
//!
//! Owns a [`Storage`](engine_storage::Storage), populates it with the demo
//! world and drives the registered systems at a fixed tick rate.
//!
//! ## Startup Sequence
//!
//! 1. Build the storage configuration from the environment, then apply
//!    command-line overrides.
//! 2. Register component types and archetypes, then either restore the most
//!    recent snapshot (`--resume`) or spawn a fresh population.
//! 3. Enter the fixed-timestep tick loop.
//! 4. On exit, take a final backup (when backups are enabled) and log the
//!    storage stats and health report.

mod registry;
mod scheduler;
mod systems;
mod tick;
mod world;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use engine_storage::{HealthStatus, Storage, StorageConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tick::{TickConfig, TickLoop};

#[derive(Debug, Parser)]
#[command(name = "engine_app", about = "Entity-component storage demo coordinator")]
struct Args {
    /// Target ticks per second
    #[arg(long, default_value_t = 60.0)]
    tick_rate: f64,

    /// Stop after this many ticks (0 runs forever)
    #[arg(long, default_value_t = 600)]
    max_ticks: u64,

    /// Take a backup every N ticks (0 disables backups)
    #[arg(long, default_value_t = 0)]
    backup_interval: u64,

    /// Snapshot directory (overrides ENGINE_BACKUP_DIR)
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// Snapshots to keep (overrides ENGINE_MAX_BACKUPS)
    #[arg(long)]
    max_backups: Option<usize>,

    /// Number of players to spawn
    #[arg(short, long, default_value_t = 1)]
    players: usize,

    /// Number of enemies to spawn
    #[arg(short, long, default_value_t = 32)]
    enemies: usize,

    /// Restore the newest snapshot instead of spawning a new population
    #[arg(long)]
    resume: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("engine_app=info".parse()?))
        .init();

    let args = Args::parse();
    anyhow::ensure!(
        args.tick_rate.is_finite() && args.tick_rate > 0.0,
        "--tick-rate must be positive"
    );

    let mut config = StorageConfig::from_env();
    if let Some(dir) = &args.backup_dir {
        config = config.with_backup_dir(dir);
    }
    if let Some(max) = args.max_backups {
        config = config.with_max_backups(max);
    }
    info!(backup_dir = %config.backup_dir.display(), max_backups = ?config.max_backups, "engine coordinator starting");

    let storage = Arc::new(Storage::new(config));
    world::register_components(&storage)?;
    world::register_archetypes(&storage)?;

    let resumed = if args.resume {
        resume(&storage)?
    } else {
        false
    };
    if !resumed {
        world::spawn_population(&storage, args.players, args.enemies)
            .context("failed to spawn initial population")?;
    }

    let mut tick_loop = TickLoop::new(
        TickConfig {
            tick_rate: args.tick_rate,
            max_ticks: args.max_ticks,
            backup_interval: args.backup_interval,
        },
        Arc::clone(&storage),
    );
    for system in systems::default_systems() {
        tick_loop.add_system(system);
    }
    tick_loop.run();

    if args.backup_interval > 0
        && let Some(handle) = tick_loop.backup()
    {
        info!(snapshot = %handle, "final backup written");
    }
    report(&storage);

    info!("engine coordinator shut down");
    Ok(())
}

/// Restore the newest snapshot, if any. Returns whether one was restored.
fn resume(storage: &Storage) -> Result<bool> {
    let backups = storage.list_backups().context("failed to list snapshots")?;
    let Some(latest) = backups.last() else {
        warn!("--resume given but no snapshot found; spawning a new population");
        return Ok(false);
    };
    storage
        .restore_backup(latest)
        .with_context(|| format!("failed to restore {latest}"))?;
    info!(snapshot = %latest, entities = storage.entity_count(), "resumed from snapshot");
    Ok(true)
}

fn report(storage: &Storage) {
    let stats = storage.get_storage_stats();
    let perf = &stats.performance_metrics;
    info!(
        live = stats.entity_stats.live,
        created = stats.entity_stats.created,
        destroyed = stats.entity_stats.destroyed,
        operations = perf.total_operations,
        errors = perf.total_errors,
        ops_per_second = perf.ops_per_second,
        "storage stats"
    );
    for op in perf.operations.iter().filter(|o| o.count > 0) {
        info!(
            operation = %op.operation,
            count = op.count,
            errors = op.errors,
            avg_us = op.avg_latency_us,
            max_us = op.max_latency_us,
            "operation metrics"
        );
    }

    let health = storage.health_report();
    if health.overall_health == HealthStatus::Healthy {
        info!(recommendations = health.recommendations.len(), "storage healthy");
    }
    for recommendation in &health.recommendations {
        info!(%recommendation, "health recommendation");
    }
}
