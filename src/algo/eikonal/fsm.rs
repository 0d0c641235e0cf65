//! Fast Sweeping on the cell grid.

use super::grid::{CellGrid, CellTag};
use super::update::UpdateOrder;
use super::SolveReport;

/// Solve `grid` in place by Gauss-Seidel sweeps in the four diagonal orders.
///
/// One iteration is all four sweeps; iteration stops once the largest
/// change in an iteration is below `tolerance` or after `max_iterations`.
pub(crate) fn sweep(grid: &mut CellGrid, order: UpdateOrder, tolerance: f64, max_iterations: usize) -> SolveReport {
    let (nx, ny) = (grid.nx(), grid.ny());
    let mut updates = 0usize;
    let mut iterations = 0usize;
    let mut converged = false;

    while iterations < max_iterations {
        iterations += 1;
        let mut max_change = 0.0f64;
        for (rev_x, rev_y) in [(false, false), (true, false), (false, true), (true, true)] {
            for jj in 0..ny {
                let j = if rev_y { ny - 1 - jj } else { jj };
                for ii in 0..nx {
                    let i = if rev_x { nx - 1 - ii } else { ii };
                    let idx = grid.index(i, j);
                    if grid.tag(idx).is_fixed() {
                        continue;
                    }
                    let current = grid.value(idx);
                    let candidate = {
                        let snapshot = &*grid;
                        snapshot.upwind_update(idx, order, &|k| snapshot.value(k))
                    };
                    if candidate < current {
                        let change = if current.is_finite() {
                            current - candidate
                        } else {
                            f64::INFINITY
                        };
                        max_change = max_change.max(change);
                        grid.set_value(idx, candidate);
                        grid.set_tag(idx, CellTag::Reachable);
                        updates += 1;
                    }
                }
            }
        }
        tracing::trace!(iterations, max_change, "sweep iteration");
        if max_change < tolerance {
            converged = true;
            break;
        }
    }

    for idx in 0..grid.len() {
        if grid.tag(idx) == CellTag::Reachable {
            grid.set_tag(idx, CellTag::Frozen);
        }
    }
    if !converged {
        tracing::warn!(max_iterations, "fast sweeping stopped at the iteration cap");
    }
    tracing::debug!(iterations, updates, converged, "fast sweeping finished");
    SolveReport {
        iterations,
        updates,
        converged,
    }
}
