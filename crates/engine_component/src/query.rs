//! Query descriptors.
//!
//! A [`QueryDescriptor`] declares which component types a caller needs. The
//! storage engine resolves it into the entities that hold every required type
//! and none of the excluded ones; the coordinator also uses the read/write
//! split to detect conflicts between systems when building execution stages.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::component::Component;

/// Describes the data access requirements of a query or system.
///
/// Reads and writes are both *required* types: an entity matches only if it
/// holds all of them. [`QueryFilter::With`] adds a requirement without
/// declaring access; [`QueryFilter::Without`] excludes entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Component types read immutably.
    pub reads: Vec<String>,
    /// Component types written.
    pub writes: Vec<String>,
    /// Filters applied to the match.
    pub filters: Vec<QueryFilter>,
}

impl QueryDescriptor {
    /// Create a new empty query descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a read-only component requirement.
    #[must_use]
    pub fn read<T: Component>(self) -> Self {
        self.read_name(T::type_name())
    }

    /// Add a mutable component requirement.
    #[must_use]
    pub fn write<T: Component>(self) -> Self {
        self.write_name(T::type_name())
    }

    /// Require a component type without declaring access to it.
    #[must_use]
    pub fn with<T: Component>(self) -> Self {
        self.filter(QueryFilter::With(T::type_name().to_string()))
    }

    /// Exclude entities holding this component type.
    #[must_use]
    pub fn without<T: Component>(self) -> Self {
        self.filter(QueryFilter::Without(T::type_name().to_string()))
    }

    /// Add a read requirement by type name.
    #[must_use]
    pub fn read_name(mut self, name: impl Into<String>) -> Self {
        self.reads.push(name.into());
        self
    }

    /// Add a write requirement by type name.
    #[must_use]
    pub fn write_name(mut self, name: impl Into<String>) -> Self {
        self.writes.push(name.into());
        self
    }

    /// Add a query filter.
    #[must_use]
    pub fn filter(mut self, f: QueryFilter) -> Self {
        self.filters.push(f);
        self
    }

    /// Returns the set of component types an entity must hold to match.
    #[must_use]
    pub fn required_types(&self) -> BTreeSet<&str> {
        let mut types: BTreeSet<&str> = self
            .reads
            .iter()
            .chain(&self.writes)
            .map(String::as_str)
            .collect();
        for f in &self.filters {
            if let QueryFilter::With(name) = f {
                types.insert(name.as_str());
            }
        }
        types
    }

    /// Returns the set of component types an entity must not hold.
    #[must_use]
    pub fn excluded_types(&self) -> BTreeSet<&str> {
        self.filters
            .iter()
            .filter_map(|f| match f {
                QueryFilter::Without(name) => Some(name.as_str()),
                QueryFilter::With(_) => None,
            })
            .collect()
    }

    /// Checks whether this query conflicts with another.
    ///
    /// Two queries conflict when one writes a component type that the other
    /// reads or writes:
    ///
    /// ```text
    /// A.writes ∩ (B.reads ∪ B.writes) ≠ ∅  OR
    /// B.writes ∩ (A.reads ∪ A.writes) ≠ ∅
    /// ```
    #[must_use]
    pub fn conflicts_with(&self, other: &QueryDescriptor) -> bool {
        for w in &self.writes {
            if other.reads.contains(w) || other.writes.contains(w) {
                return true;
            }
        }
        for w in &other.writes {
            if self.reads.contains(w) || self.writes.contains(w) {
                return true;
            }
        }
        false
    }
}

/// A filter that narrows the set of entities matched by a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryFilter {
    /// Only match entities that have this component.
    With(String),
    /// Only match entities that do NOT have this component.
    Without(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_conflict_both_read() {
        let q1 = QueryDescriptor::new().read_name("transform");
        let q2 = QueryDescriptor::new().read_name("transform");
        assert!(!q1.conflicts_with(&q2));
    }

    #[test]
    fn test_conflict_read_vs_write() {
        let q1 = QueryDescriptor::new().read_name("transform");
        let q2 = QueryDescriptor::new().write_name("transform");
        assert!(q1.conflicts_with(&q2));
        assert!(q2.conflicts_with(&q1));
    }

    #[test]
    fn test_conflict_write_vs_write() {
        let q1 = QueryDescriptor::new().write_name("velocity");
        let q2 = QueryDescriptor::new().write_name("velocity");
        assert!(q1.conflicts_with(&q2));
    }

    #[test]
    fn test_no_conflict_different_types() {
        let physics = QueryDescriptor::new().read_name("transform").write_name("velocity");
        let ai = QueryDescriptor::new().read_name("transform").write_name("ai_state");
        assert!(!physics.conflicts_with(&ai));
    }

    #[test]
    fn test_filters_do_not_conflict() {
        let q1 = QueryDescriptor::new()
            .write_name("velocity")
            .filter(QueryFilter::With("frozen".into()));
        let q2 = QueryDescriptor::new()
            .write_name("frozen_timer")
            .filter(QueryFilter::Without("velocity".into()));
        assert!(!q1.conflicts_with(&q2));
    }

    #[test]
    fn test_required_and_excluded_types() {
        let q = QueryDescriptor::new()
            .read_name("a")
            .write_name("b")
            .read_name("a")
            .filter(QueryFilter::With("c".into()))
            .filter(QueryFilter::Without("d".into()));

        let required: Vec<&str> = q.required_types().into_iter().collect();
        assert_eq!(required, vec!["a", "b", "c"]);
        let excluded: Vec<&str> = q.excluded_types().into_iter().collect();
        assert_eq!(excluded, vec!["d"]);
    }
}
