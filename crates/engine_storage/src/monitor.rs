//! Operation accounting, storage statistics and health diagnostics.
//!
//! [`PerformanceMonitor`] keeps one block of atomic counters per
//! [`OpKind`]. Recording is a handful of relaxed atomic updates: it never
//! locks and never fails, so it sits on every hot path. Aggregation only
//! happens when a diagnostic call asks for it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::HealthThresholds;

/// The kinds of operation the monitor tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    CreateEntity,
    DestroyEntity,
    AddComponent,
    UpdateComponent,
    RemoveComponent,
    GetComponent,
    GetComponents,
    HasComponent,
    IsAlive,
    Query,
    QueryByArchetype,
    Backup,
    Restore,
}

impl OpKind {
    /// Every kind, in reporting order.
    pub const ALL: [OpKind; 13] = [
        OpKind::CreateEntity,
        OpKind::DestroyEntity,
        OpKind::AddComponent,
        OpKind::UpdateComponent,
        OpKind::RemoveComponent,
        OpKind::GetComponent,
        OpKind::GetComponents,
        OpKind::HasComponent,
        OpKind::IsAlive,
        OpKind::Query,
        OpKind::QueryByArchetype,
        OpKind::Backup,
        OpKind::Restore,
    ];

    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            OpKind::CreateEntity => "create_entity",
            OpKind::DestroyEntity => "destroy_entity",
            OpKind::AddComponent => "add_component",
            OpKind::UpdateComponent => "update_component",
            OpKind::RemoveComponent => "remove_component",
            OpKind::GetComponent => "get_component",
            OpKind::GetComponents => "get_components",
            OpKind::HasComponent => "has_component",
            OpKind::IsAlive => "is_alive",
            OpKind::Query => "query",
            OpKind::QueryByArchetype => "query_by_archetype",
            OpKind::Backup => "backup",
            OpKind::Restore => "restore",
        }
    }

    /// Backup and restore do I/O and are expected to be slow; everything
    /// else runs on the per-tick path.
    #[must_use]
    pub const fn is_hot_path(self) -> bool {
        !matches!(self, OpKind::Backup | OpKind::Restore)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct OpCounters {
    count: AtomicU64,
    errors: AtomicU64,
    total_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

/// Lock-free per-operation counters.
#[derive(Debug)]
pub struct PerformanceMonitor {
    started: Instant,
    slow_op_threshold: Duration,
    counters: [OpCounters; OpKind::ALL.len()],
}

impl PerformanceMonitor {
    /// Create a monitor that logs operations slower than `slow_op_threshold`.
    #[must_use]
    pub fn new(slow_op_threshold: Duration) -> Self {
        Self {
            started: Instant::now(),
            slow_op_threshold,
            counters: Default::default(),
        }
    }

    /// Account for one finished operation.
    pub fn record(&self, kind: OpKind, duration: Duration, ok: bool) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        let c = &self.counters[kind.index()];
        c.count.fetch_add(1, Ordering::Relaxed);
        if !ok {
            c.errors.fetch_add(1, Ordering::Relaxed);
        }
        c.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        c.max_nanos.fetch_max(nanos, Ordering::Relaxed);

        if kind.is_hot_path() && duration > self.slow_op_threshold {
            debug!(op = %kind, elapsed_us = duration.as_micros() as u64, "slow storage operation");
        }
    }

    /// Time `f` and record it under `kind`.
    pub fn time<T, E>(&self, kind: OpKind, f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let start = Instant::now();
        let result = f();
        self.record(kind, start.elapsed(), result.is_ok());
        result
    }

    /// Aggregate the counters into a report.
    #[must_use]
    pub fn metrics(&self) -> PerformanceMetrics {
        let uptime = self.started.elapsed();
        let operations: Vec<OpMetrics> = OpKind::ALL
            .iter()
            .map(|&kind| {
                let c = &self.counters[kind.index()];
                let count = c.count.load(Ordering::Relaxed);
                let total = c.total_nanos.load(Ordering::Relaxed);
                OpMetrics {
                    operation: kind,
                    count,
                    errors: c.errors.load(Ordering::Relaxed),
                    avg_latency_us: if count == 0 {
                        0.0
                    } else {
                        total as f64 / count as f64 / 1_000.0
                    },
                    max_latency_us: c.max_nanos.load(Ordering::Relaxed) as f64 / 1_000.0,
                }
            })
            .collect();

        let total_operations: u64 = operations.iter().map(|o| o.count).sum();
        let total_errors: u64 = operations.iter().map(|o| o.errors).sum();
        let uptime_secs = uptime.as_secs_f64();
        PerformanceMetrics {
            uptime_secs,
            total_operations,
            total_errors,
            error_rate: if total_operations == 0 {
                0.0
            } else {
                total_errors as f64 / total_operations as f64
            },
            ops_per_second: if uptime_secs > 0.0 {
                total_operations as f64 / uptime_secs
            } else {
                0.0
            },
            operations,
        }
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(Duration::from_millis(1))
    }
}

/// Counters for one operation kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpMetrics {
    pub operation: OpKind,
    pub count: u64,
    pub errors: u64,
    pub avg_latency_us: f64,
    pub max_latency_us: f64,
}

/// Aggregated operation counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub uptime_secs: f64,
    pub total_operations: u64,
    pub total_errors: u64,
    /// `total_errors / total_operations`, 0.0 when nothing ran yet.
    pub error_rate: f64,
    pub ops_per_second: f64,
    pub operations: Vec<OpMetrics>,
}

impl PerformanceMetrics {
    /// Counters for one kind.
    #[must_use]
    pub fn op(&self, kind: OpKind) -> Option<&OpMetrics> {
        self.operations.iter().find(|o| o.operation == kind)
    }
}

/// Entity population counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStats {
    pub live: usize,
    pub created: u64,
    pub destroyed: u64,
    pub archetypes: usize,
}

/// Row count of one component table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStats {
    pub component_type: String,
    pub count: usize,
}

/// Everything `get_storage_stats` reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageStats {
    pub entity_stats: EntityStats,
    /// Sorted by component type name.
    pub component_stats: Vec<ComponentStats>,
    pub performance_metrics: PerformanceMetrics,
}

/// Qualitative health levels, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

/// Advisory health assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall_health: HealthStatus,
    pub recommendations: Vec<String>,
}

/// Derive a health report from statistics. Never fails.
#[must_use]
pub fn assess(stats: &StorageStats, thresholds: &HealthThresholds) -> HealthReport {
    let mut status = HealthStatus::Healthy;
    let mut recommendations = Vec::new();
    let perf = &stats.performance_metrics;

    if perf.total_operations >= thresholds.min_samples {
        let pct = perf.error_rate * 100.0;
        if perf.error_rate >= thresholds.critical_error_rate {
            status = status.max(HealthStatus::Critical);
            recommendations.push(format!(
                "error rate is {pct:.1}% over {} operations; check callers for operations on destroyed entities or missing components",
                perf.total_operations
            ));
        } else if perf.error_rate >= thresholds.degraded_error_rate {
            status = status.max(HealthStatus::Degraded);
            recommendations.push(format!(
                "error rate is {pct:.1}%; use has_component before reads that may miss"
            ));
        }
    }

    let latency_limit_us = thresholds.degraded_avg_latency.as_secs_f64() * 1_000_000.0;
    for op in perf
        .operations
        .iter()
        .filter(|o| o.operation.is_hot_path() && o.count > 0)
    {
        if op.avg_latency_us > latency_limit_us {
            status = status.max(HealthStatus::Degraded);
            recommendations.push(format!(
                "{} averages {:.1}µs, above the {:.1}µs budget; batch reads with get_components or narrow queries",
                op.operation, op.avg_latency_us, latency_limit_us
            ));
        }
    }

    let populated: Vec<&ComponentStats> =
        stats.component_stats.iter().filter(|c| c.count > 0).collect();
    let largest = populated.iter().max_by_key(|c| c.count);
    let smallest = populated.iter().min_by_key(|c| c.count);
    if let (Some(largest), Some(smallest)) = (largest, smallest) {
        let ratio = largest.count as f64 / smallest.count as f64;
        if populated.len() > 1 && ratio >= thresholds.skew_ratio {
            status = status.max(HealthStatus::Degraded);
            recommendations.push(format!(
                "table skew: '{}' holds {} rows but '{}' only {}; query with the rarer component first",
                largest.component_type, largest.count, smallest.component_type, smallest.count
            ));
        }
    }

    for empty in stats.component_stats.iter().filter(|c| c.count == 0) {
        recommendations.push(format!(
            "component type '{}' is registered but holds no rows",
            empty.component_type
        ));
    }

    HealthReport {
        overall_health: status,
        recommendations,
    }
}
