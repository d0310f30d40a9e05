//! Core [`Component`] trait and associated metadata.
//!
//! Every piece of data stored in the engine implements [`Component`]. The
//! trait is the fixed capability contract between a payload type and the
//! storage engine: a stable type name, a `validate` predicate, and a pair of
//! conversions to and from a plain keyed record used for snapshots and
//! type-erased reads.
//!
//! ## Type Identity
//!
//! [`ComponentTypeId`] is derived from the component's **string name** using
//! the FNV-1a 64-bit hash algorithm, so the same name always maps to the same
//! ID regardless of which process computed it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::Entity;
use crate::error::ComponentError;

/// A unique identifier for a component type, derived from its string name
/// using the FNV-1a 64-bit hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u64);

impl ComponentTypeId {
    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// Compute the [`ComponentTypeId`] from a component's string name.
    ///
    /// # Algorithm (FNV-1a 64-bit)
    ///
    /// ```text
    /// hash = 0xcbf29ce484222325          (offset basis)
    /// for each byte in name.as_bytes():
    ///     hash = hash XOR byte
    ///     hash = hash * 0x00000100000001b3  (prime)
    /// return hash
    /// ```
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Compute the [`ComponentTypeId`] for a Rust component type `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self::from_name(T::type_name())
    }
}

/// The component capability contract.
///
/// All data stored in the engine implements this trait. Only
/// [`type_name`](Component::type_name) is required; the remaining methods
/// have serde-backed defaults that payload types override when they need
/// stricter rules.
///
/// # Examples
///
/// ```rust
/// use serde::{Serialize, Deserialize};
/// use engine_component::Component;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {
///     fn type_name() -> &'static str { "health" }
///
///     fn validate(&self) -> Result<(), String> {
///         if self.current > self.max {
///             return Err("current exceeds max".into());
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Component: Clone + Send + Sync + 'static + Serialize + DeserializeOwned {
    /// The name this component type is stored and queried under.
    fn type_name() -> &'static str;

    /// Returns the [`ComponentTypeId`] for this component.
    fn component_type_id() -> ComponentTypeId {
        ComponentTypeId::from_name(Self::type_name())
    }

    /// Checks the payload. Called on every insert and update, and on every
    /// record decoded during a restore.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Converts the payload into a plain keyed record.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Encode`] if the value cannot be represented.
    fn to_record(&self) -> Result<Value, ComponentError> {
        serde_json::to_value(self).map_err(|source| ComponentError::Encode {
            component: Self::type_name().to_string(),
            source,
        })
    }

    /// Rebuilds a payload from a keyed record produced by
    /// [`to_record`](Component::to_record), then validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Decode`] if the record has the wrong shape and
    /// [`ComponentError::Validation`] if the decoded value is rejected.
    fn from_record(record: Value) -> Result<Self, ComponentError> {
        let value: Self = serde_json::from_value(record).map_err(|e| ComponentError::Decode {
            component: Self::type_name().to_string(),
            reason: e.to_string(),
        })?;
        value.check()?;
        Ok(value)
    }

    /// Runs [`validate`](Component::validate) and wraps a rejection in a
    /// [`ComponentError::Validation`].
    fn check(&self) -> Result<(), ComponentError> {
        self.validate().map_err(|reason| ComponentError::Validation {
            component: Self::type_name().to_string(),
            reason,
        })
    }
}

/// A record pairing an [`Entity`] with one serialised component.
///
/// Snapshots store one list of these per component type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// The entity this component belongs to.
    pub entity: Entity,
    /// Keyed record produced by [`Component::to_record`].
    pub record: Value,
}
