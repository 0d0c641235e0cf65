//! Load/store hooks for solved fields.
//!
//! The storage format behind a handle belongs to the cache implementation;
//! solvers only hand over and receive flat value arrays.

use std::collections::HashMap;
use std::sync::RwLock;

/// Storage for solved fields, keyed by an opaque handle.
pub trait FieldCache: Send + Sync {
    /// The values stored under `handle`, if any.
    fn load(&self, handle: &str) -> Option<Vec<f64>>;

    /// Store `values` under `handle`, replacing any previous entry.
    fn store(&self, handle: &str, values: &[f64]);
}

/// In-process [`FieldCache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    fields: RwLock<HashMap<String, Vec<f64>>>,
}

impl MemoryCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored fields.
    pub fn len(&self) -> usize {
        self.fields.read().map(|f| f.len()).unwrap_or(0)
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the entry under `handle`. Returns whether one existed.
    pub fn remove(&self, handle: &str) -> bool {
        match self.fields.write() {
            Ok(mut fields) => fields.remove(handle).is_some(),
            Err(_) => false,
        }
    }
}

impl FieldCache for MemoryCache {
    fn load(&self, handle: &str) -> Option<Vec<f64>> {
        self.fields.read().ok()?.get(handle).cloned()
    }

    fn store(&self, handle: &str, values: &[f64]) {
        match self.fields.write() {
            Ok(mut fields) => {
                fields.insert(handle.to_owned(), values.to_vec());
            }
            Err(_) => tracing::warn!(handle, "field cache lock poisoned; value not stored"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::eikonal::{EikonalSolver, GridMethod, GridSolver, GridSolverOptions};
    use crate::geometry::{Domain, Rect, Shape};
    use nalgebra::Point2;

    fn solver() -> GridSolver {
        let domain = Domain::new(Rect::new(0.0, 0.0, 4.0, 4.0)).with_target(Shape::Point(Point2::new(1.0, 1.0)));
        GridSolver::new(GridMethod::Fmm, &domain, &|_: &Point2<f64>| 1.0, GridSolverOptions::with_spacing(0.5)).unwrap()
    }

    #[test]
    fn test_round_trip_restores_field() {
        let cache = MemoryCache::new();
        let mut solved = solver();
        assert!(!solved.save_field_to_cache(&cache, "field"));
        solved.solve().unwrap();
        assert!(solved.save_field_to_cache(&cache, "field"));
        assert_eq!(cache.len(), 1);

        let mut fresh = solver();
        assert!(!fresh.load_cached_field(&cache, "missing"));
        assert!(fresh.load_cached_field(&cache, "field"));
        assert!(fresh.is_solved());
        let q = Point2::new(3.3, 2.7);
        assert_eq!(fresh.potential(&q), solved.potential(&q));
        assert_eq!(fresh.values(), solved.values());
    }

    #[test]
    fn test_wrong_size_is_rejected() {
        let cache = MemoryCache::new();
        cache.store("short", &[1.0, 2.0]);
        let mut s = solver();
        assert!(!s.load_cached_field(&cache, "short"));
        assert!(!s.is_solved());
        assert!(cache.remove("short"));
        assert!(cache.is_empty());
    }
}
