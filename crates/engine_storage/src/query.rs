//! Set-intersection queries over component table membership.
//!
//! Resolution walks the smallest required table and probes every other
//! required table, so the cost tracks the smallest table instead of the
//! product of table sizes. Results are always computed from current
//! membership; nothing is cached.

use std::sync::Arc;

use engine_component::{Entity, ErasedTable};

/// Entities present in every table of `required` and absent from every table
/// of `excluded`, sorted by ID.
///
/// An empty `required` slice yields an empty result; callers reject empty
/// queries before getting here.
#[must_use]
pub fn intersect(required: &[Arc<dyn ErasedTable>], excluded: &[Arc<dyn ErasedTable>]) -> Vec<Entity> {
    let Some((smallest_idx, smallest)) = required.iter().enumerate().min_by_key(|(_, t)| t.len())
    else {
        return Vec::new();
    };

    let mut matched: Vec<Entity> = smallest
        .entities()
        .into_iter()
        .filter(|&e| {
            required
                .iter()
                .enumerate()
                .all(|(i, t)| i == smallest_idx || t.has(e))
        })
        .filter(|&e| !excluded.iter().any(|t| t.has(e)))
        .collect();
    matched.sort_unstable();
    matched
}

#[cfg(test)]
mod tests {
    use engine_component::{Component, ComponentTable};
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct A;
    impl Component for A {
        fn type_name() -> &'static str {
            "a"
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct B;
    impl Component for B {
        fn type_name() -> &'static str {
            "b"
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct C;
    impl Component for C {
        fn type_name() -> &'static str {
            "c"
        }
    }

    fn table<T: Component>(value: T, ids: &[u64]) -> Arc<dyn ErasedTable> {
        let table = ComponentTable::new();
        for &id in ids {
            table.insert(Entity::from_raw(id), value.clone()).unwrap();
        }
        Arc::new(table)
    }

    fn ids(entities: &[Entity]) -> Vec<u64> {
        entities.iter().map(|e| e.id()).collect()
    }

    #[test]
    fn test_intersection_of_two_tables() {
        let a = table(A, &[1, 2, 3, 4, 5]);
        let b = table(B, &[4, 2, 9]);
        assert_eq!(ids(&intersect(&[a, b], &[])), vec![2, 4]);
    }

    #[test]
    fn test_single_table_returns_all_rows_sorted() {
        let a = table(A, &[3, 1, 2]);
        assert_eq!(ids(&intersect(&[a], &[])), vec![1, 2, 3]);
    }

    #[test]
    fn test_exclusion() {
        let a = table(A, &[1, 2, 3]);
        let c = table(C, &[2]);
        assert_eq!(ids(&intersect(&[a], &[c])), vec![1, 3]);
    }

    #[test]
    fn test_disjoint_tables() {
        let a = table(A, &[1, 2]);
        let b = table(B, &[3, 4]);
        let c = table(C, &[1, 3]);
        assert!(intersect(&[a, b, c], &[]).is_empty());
    }

    #[test]
    fn test_empty_required_is_empty() {
        assert!(intersect(&[], &[]).is_empty());
    }
}
