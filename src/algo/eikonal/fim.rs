//! Fast Iterative Method on the cell grid.
//!
//! Every iteration updates all active nodes from the same snapshot, so the
//! per-node work has no cross dependencies and runs on rayon. The active
//! list is rebuilt between iterations.

use rayon::prelude::*;

use super::grid::{CellGrid, CellTag};
use super::update::UpdateOrder;
use super::SolveReport;

/// Result of one data-parallel pass over the active list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FimPass {
    /// `(node, new value)` for every active node whose value changed.
    pub changed: Vec<(usize, f64)>,
    /// Active nodes whose update moved by less than the tolerance.
    pub settled: Vec<usize>,
}

/// Compute updates for `active` without mutating the grid.
pub(crate) fn fim_pass(
    grid: &CellGrid,
    active: &[usize],
    order: UpdateOrder,
    tolerance: f64,
    parallel: bool,
) -> FimPass {
    let update = |&idx: &usize| {
        let current = grid.value(idx);
        let candidate = grid.upwind_update(idx, order, &|k| grid.value(k)).min(current);
        let settled = !(current - candidate > tolerance);
        (idx, candidate, current, settled)
    };
    let results: Vec<(usize, f64, f64, bool)> = if parallel {
        active.par_iter().map(update).collect()
    } else {
        active.iter().map(update).collect()
    };

    let mut pass = FimPass {
        changed: Vec::new(),
        settled: Vec::new(),
    };
    for (idx, candidate, current, settled) in results {
        if candidate < current {
            pass.changed.push((idx, candidate));
        }
        if settled {
            pass.settled.push(idx);
        }
    }
    pass
}

/// Apply a pass at the barrier and build the next active list.
///
/// Settled nodes leave the list; their free neighbours join it when an
/// update from the new values would improve them.
fn apply_pass(grid: &mut CellGrid, active: &[usize], pass: &FimPass, order: UpdateOrder, tolerance: f64) -> Vec<usize> {
    for &(idx, value) in &pass.changed {
        grid.set_value(idx, value);
    }

    let mut in_list = vec![false; grid.len()];
    let mut next = Vec::with_capacity(active.len());
    let settled: std::collections::HashSet<usize> = pass.settled.iter().copied().collect();
    for &idx in active {
        if settled.contains(&idx) {
            grid.set_tag(idx, CellTag::Frozen);
        } else if !in_list[idx] {
            in_list[idx] = true;
            next.push(idx);
        }
    }
    for &idx in &pass.settled {
        let neighbors: Vec<usize> = grid.neighbors(idx).collect();
        for n in neighbors {
            if in_list[n] || grid.tag(n).is_fixed() {
                continue;
            }
            let current = grid.value(n);
            let candidate = grid.upwind_update(n, order, &|k| grid.value(k));
            if current - candidate > tolerance || (candidate.is_finite() && !current.is_finite()) {
                grid.set_value(n, candidate);
                grid.set_tag(n, CellTag::Reachable);
                in_list[n] = true;
                next.push(n);
            }
        }
    }
    next
}

/// Nodes adjacent to a seed: the initial active list.
fn initial_active(grid: &CellGrid) -> Vec<usize> {
    let mut in_list = vec![false; grid.len()];
    let mut active = Vec::new();
    for idx in 0..grid.len() {
        if grid.tag(idx) != CellTag::Target {
            continue;
        }
        for n in grid.neighbors(idx) {
            if !in_list[n] && !grid.tag(n).is_fixed() {
                in_list[n] = true;
                active.push(n);
            }
        }
    }
    active
}

/// Solve `grid` in place by the Fast Iterative Method on rayon.
pub(crate) fn iterate(
    grid: &mut CellGrid,
    order: UpdateOrder,
    tolerance: f64,
    max_iterations: usize,
    parallel: bool,
) -> SolveReport {
    let result = iterate_with(grid, order, tolerance, max_iterations, |g, active| {
        Ok::<_, std::convert::Infallible>(fim_pass(g, active, order, tolerance, parallel))
    });
    match result {
        Ok(report) => report,
        Err(never) => match never {},
    }
}

/// The iteration loop with the per-iteration pass supplied by the caller.
///
/// `pass` sees the grid read-only; its result is applied between passes.
pub(crate) fn iterate_with<P, E>(
    grid: &mut CellGrid,
    order: UpdateOrder,
    tolerance: f64,
    max_iterations: usize,
    mut pass: P,
) -> Result<SolveReport, E>
where
    P: FnMut(&CellGrid, &[usize]) -> Result<FimPass, E>,
{
    let mut active = initial_active(grid);
    for &idx in &active {
        grid.set_tag(idx, CellTag::Reachable);
    }
    let mut iterations = 0usize;
    let mut updates = 0usize;

    while !active.is_empty() && iterations < max_iterations {
        iterations += 1;
        let result = pass(grid, &active)?;
        updates += result.changed.len();
        active = apply_pass(grid, &active, &result, order, tolerance);
        tracing::trace!(iterations, active = active.len(), "iterative pass");
    }

    let converged = active.is_empty();
    if !converged {
        tracing::warn!(max_iterations, remaining = active.len(), "iterative method stopped at the iteration cap");
        for idx in active {
            grid.set_tag(idx, CellTag::Frozen);
        }
    }
    tracing::debug!(iterations, updates, converged, "iterative method finished");
    Ok(SolveReport {
        iterations,
        updates,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::eikonal::fmm;
    use crate::geometry::{Domain, Rect, Shape};
    use nalgebra::Point2;

    fn domain() -> Domain {
        Domain::new(Rect::new(0.0, 0.0, 6.0, 6.0))
            .with_target(Shape::Point(Point2::new(1.0, 5.0)))
            .with_obstacle(Rect::new(2.0, 1.0, 3.0, 6.0))
    }

    #[test]
    fn test_matches_fast_marching() {
        let speed = |_: &Point2<f64>| 1.0;
        let mut reference = CellGrid::from_domain(&domain(), &speed, 0.25, 0.5).unwrap();
        fmm::march(&mut reference, UpdateOrder::First);

        for parallel in [false, true] {
            let mut grid = CellGrid::from_domain(&domain(), &speed, 0.25, 0.5).unwrap();
            let report = iterate(&mut grid, UpdateOrder::First, 1e-12, 10_000, parallel);
            assert!(report.converged);
            for idx in 0..grid.len() {
                let (a, b) = (grid.value(idx), reference.value(idx));
                if a.is_infinite() || b.is_infinite() {
                    assert_eq!(a, b);
                } else {
                    assert!((a - b).abs() < 1e-9, "node {idx}: {a} vs {b}");
                }
            }
        }
    }

    #[test]
    fn test_cap_reports_non_convergence() {
        let mut grid = CellGrid::from_domain(&domain(), &|_: &Point2<f64>| 1.0, 0.25, 0.5).unwrap();
        let report = iterate(&mut grid, UpdateOrder::First, 1e-12, 2, false);
        assert!(!report.converged);
        assert_eq!(report.iterations, 2);
    }
}
