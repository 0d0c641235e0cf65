//! Fast Iterative Method on a triangulation.

use rayon::prelude::*;

use super::update::vertex_update;
use super::{MeshSolverOptions, SolveReport};
use crate::mesh::{PlanarMesh, VertexId};

/// Active-list iteration from the seeded `values`.
///
/// Seeds are the finite entries of `values` on entry and never change.
/// Each pass updates every active vertex from the same snapshot.
pub(crate) fn iterate(
    mesh: &PlanarMesh,
    slowness: &[f64],
    values: &mut [f64],
    options: &MeshSolverOptions,
) -> SolveReport {
    let fixed: Vec<bool> = values.iter().map(|v| v.is_finite()).collect();
    let mut in_list = vec![false; values.len()];
    let mut active: Vec<VertexId> = Vec::new();
    for v in mesh.vertex_ids().filter(|v| fixed[v.index()]) {
        for w in mesh.vertex_neighbors(v) {
            let wi = w.index();
            if !fixed[wi] && !in_list[wi] && slowness[wi].is_finite() {
                in_list[wi] = true;
                active.push(w);
            }
        }
    }

    let tolerance = options.tolerance;
    let mut iterations = 0usize;
    let mut updates = 0usize;
    while !active.is_empty() && iterations < options.max_iterations {
        iterations += 1;
        let snapshot: &[f64] = values;
        let update = |&v: &VertexId| {
            let current = snapshot[v.index()];
            let candidate = vertex_update(mesh, v, slowness[v.index()], &|k: VertexId| snapshot[k.index()], options.max_unfoldings)
                .min(current);
            (v, candidate, current)
        };
        let results: Vec<(VertexId, f64, f64)> = if options.parallel {
            active.par_iter().map(update).collect()
        } else {
            active.iter().map(update).collect()
        };

        let mut settled = Vec::new();
        let mut next = Vec::with_capacity(active.len());
        for &(v, candidate, current) in &results {
            let vi = v.index();
            if candidate < current {
                values[vi] = candidate;
                updates += 1;
            }
            if current - candidate > tolerance {
                next.push(v);
            } else {
                in_list[vi] = false;
                settled.push(v);
            }
        }

        for v in settled {
            for w in mesh.vertex_neighbors(v) {
                let wi = w.index();
                if fixed[wi] || in_list[wi] || slowness[wi].is_infinite() {
                    continue;
                }
                let current = values[wi];
                let snapshot: &[f64] = values;
                let candidate = vertex_update(mesh, w, slowness[wi], &|k: VertexId| snapshot[k.index()], options.max_unfoldings);
                if current - candidate > tolerance || (candidate.is_finite() && !current.is_finite()) {
                    values[wi] = candidate;
                    in_list[wi] = true;
                    next.push(w);
                }
            }
        }
        active = next;
        tracing::trace!(iterations, active = active.len(), "mesh iterative pass");
    }

    let converged = active.is_empty();
    if !converged {
        tracing::warn!(
            max_iterations = options.max_iterations,
            remaining = active.len(),
            "mesh iterative method stopped at the iteration cap"
        );
    }
    tracing::debug!(iterations, updates, converged, "mesh iterative method finished");
    SolveReport {
        iterations,
        updates,
        converged,
    }
}
