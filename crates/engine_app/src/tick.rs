//! Coordinator tick loop.
//!
//! Each tick:
//!
//! 1. Recompute execution stages if the system set changed.
//! 2. For each stage, run its systems in parallel on scoped threads and wait
//!    for all of them before starting the next stage.
//! 3. Take a backup if the backup interval is due, pruning old snapshots
//!    down to the configured maximum.
//! 4. Advance the tick counter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use engine_storage::{SnapshotHandle, Storage};
use tracing::{debug, info, warn};

use crate::registry::SystemRegistry;
use crate::scheduler::{self, RegisteredSystem, Stage};
use crate::systems::System;

/// Configuration for the coordinator tick loop.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
    /// Take a backup every this many ticks (0 = never).
    pub backup_interval: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
            backup_interval: 0,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub tick_id: u64,
    /// Entities updated across all systems.
    pub updated: usize,
    /// Systems that returned an error or panicked.
    pub failed: usize,
    pub backup: Option<SnapshotHandle>,
}

/// The coordinator's tick loop state.
#[derive(Debug)]
pub struct TickLoop {
    tick_id: u64,
    config: TickConfig,
    storage: Arc<Storage>,
    registry: SystemRegistry,
    stages: Vec<Stage>,
    stages_dirty: bool,
}

impl TickLoop {
    #[must_use]
    pub fn new(config: TickConfig, storage: Arc<Storage>) -> Self {
        Self {
            tick_id: 0,
            config,
            storage,
            registry: SystemRegistry::new(),
            stages: Vec::new(),
            stages_dirty: true,
        }
    }

    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Register a system; see [`SystemRegistry::register`].
    pub fn add_system(&mut self, system: Box<dyn System>) -> bool {
        let added = self.registry.register(system);
        self.stages_dirty |= added;
        added
    }

    /// Mutable access to the registry. Stages are recomputed on the next tick.
    pub fn registry_mut(&mut self) -> &mut SystemRegistry {
        self.stages_dirty = true;
        &mut self.registry
    }

    fn recompute_stages(&mut self) {
        let systems: Vec<RegisteredSystem> = self
            .registry
            .iter()
            .map(|s| RegisteredSystem {
                name: s.name().to_string(),
                query: s.query(),
            })
            .collect();

        self.stages = scheduler::compute_stages(&systems);
        self.stages_dirty = false;

        for (idx, stage) in self.stages.iter().enumerate() {
            let names: Vec<&str> = stage
                .system_indices
                .iter()
                .map(|&i| systems[i].name.as_str())
                .collect();
            debug!(stage = idx, systems = ?names, "stage layout");
        }
        info!(
            tick_id = self.tick_id,
            stage_count = self.stages.len(),
            system_count = systems.len(),
            "recomputed execution stages"
        );
    }

    /// The current execution stages, recomputed if necessary.
    pub fn stages(&mut self) -> &[Stage] {
        if self.stages_dirty {
            self.recompute_stages();
        }
        &self.stages
    }

    /// Run one tick with a timestep of `dt` seconds.
    pub fn tick(&mut self, dt: f32) -> TickSummary {
        self.tick_id += 1;
        if self.stages_dirty {
            self.recompute_stages();
        }

        let mut summary = TickSummary {
            tick_id: self.tick_id,
            ..TickSummary::default()
        };
        let systems: Vec<&dyn System> = self.registry.iter().collect();
        let storage: &Storage = &self.storage;

        for (stage_idx, stage) in self.stages.iter().enumerate() {
            let results: Vec<_> = std::thread::scope(|s| {
                let handles: Vec<_> = stage
                    .system_indices
                    .iter()
                    .map(|&i| {
                        let system = systems[i];
                        (system.name(), s.spawn(move || system.run(storage, dt)))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|(name, handle)| (name, handle.join()))
                    .collect()
            });

            for (name, result) in results {
                match result {
                    Ok(Ok(updated)) => {
                        summary.updated += updated;
                        debug!(tick_id = self.tick_id, stage = stage_idx, system = name, updated, "system done");
                    }
                    Ok(Err(e)) => {
                        summary.failed += 1;
                        warn!(tick_id = self.tick_id, system = name, error = %e, "system failed");
                    }
                    Err(_) => {
                        summary.failed += 1;
                        warn!(tick_id = self.tick_id, system = name, "system panicked");
                    }
                }
            }
        }

        if self.config.backup_interval > 0 && self.tick_id % self.config.backup_interval == 0 {
            summary.backup = self.backup();
        }
        summary
    }

    /// Take a backup now and prune old ones. Failures are logged, not fatal.
    pub fn backup(&self) -> Option<SnapshotHandle> {
        let handle = match self.storage.create_backup() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(tick_id = self.tick_id, error = %e, "periodic backup failed");
                return None;
            }
        };
        if let Some(max) = self.storage.config().max_backups {
            match self.storage.prune_backups(max) {
                Ok(0) => {}
                Ok(pruned) => debug!(pruned, keep = max, "old snapshots pruned"),
                Err(e) => warn!(error = %e, "snapshot pruning failed"),
            }
        }
        Some(handle)
    }

    /// Run for the configured number of ticks, or indefinitely.
    ///
    /// Blocking; sleeps out the remainder of each tick's time budget.
    pub fn run(&mut self) {
        let tick_duration = Duration::from_secs_f64(1.0 / self.config.tick_rate);
        let dt = tick_duration.as_secs_f32();
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            backup_interval = self.config.backup_interval,
            "starting tick loop"
        );

        loop {
            let start = Instant::now();
            self.tick(dt);

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, "tick loop complete");
                break;
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
    }
}
