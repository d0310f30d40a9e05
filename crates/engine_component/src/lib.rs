//! # engine_component
//!
//! The "C" in ECS: defines what a component is, how one component type is
//! stored, and how it is turned into plain records for snapshots.
//!
//! This crate provides:
//!
//! - [`Component`] trait: the capability contract every payload satisfies.
//! - [`Entity`]: lightweight `u64` entity identifiers.
//! - [`EntityAllocator`]: lock-free, never-reusing ID allocator.
//! - [`ComponentTable`]: concurrent keyed storage for one component type,
//!   with [`ErasedTable`] as its type-erased view.
//! - [`QueryDescriptor`]: declarative component requirements.

pub mod component;
pub mod entity;
pub mod error;
pub mod query;
pub mod table;

pub use component::{Component, ComponentRecord, ComponentTypeId};
pub use entity::{Entity, EntityAllocator};
pub use error::ComponentError;
pub use query::{QueryDescriptor, QueryFilter};
pub use table::{ComponentTable, ErasedTable};
