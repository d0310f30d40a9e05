//! # engine_storage
//!
//! A concurrent, in-memory entity-component store.
//!
//! - [`Storage`]: the context value. Create entities, attach components,
//!   query, snapshot and inspect through it.
//! - [`EntityRegistry`]: ID allocation and liveness.
//! - [`ArchetypeCatalog`]: named templates for batch construction.
//! - [`persistence`]: MessagePack snapshot files.
//! - [`monitor`]: operation counters, stats and the health assessment.
//!
//! ```ignore
//! let storage = Storage::new(StorageConfig::default());
//! storage.register_archetype(
//!     Archetype::builder("player").with(Health::new(150.0)).build(),
//! )?;
//! let player = storage.create_entity(Some("player"))?;
//! storage.add_component(player, Position::new(1.0, 2.0, 0.0))?;
//! let hits = storage.query_entities(&["position", "health"])?;
//! ```

pub mod archetype;
pub mod config;
pub mod error;
pub mod monitor;
pub mod persistence;
pub mod query;
pub mod registry;
mod storage;

pub use archetype::{Archetype, ArchetypeBuilder, ArchetypeCatalog, Overrides};
pub use config::{HealthThresholds, StorageConfig};
pub use error::StorageError;
pub use monitor::{
    ComponentStats, EntityStats, HealthReport, HealthStatus, OpKind, OpMetrics,
    PerformanceMetrics, PerformanceMonitor, StorageStats,
};
pub use persistence::{CancelToken, SnapshotHandle, SnapshotImage};
pub use registry::EntityRegistry;
pub use storage::Storage;
