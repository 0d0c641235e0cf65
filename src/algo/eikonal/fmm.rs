//! Fast Marching on the cell grid.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::grid::{CellGrid, CellTag};
use super::update::UpdateOrder;
use super::SolveReport;

/// Narrow-band entry; ordered so the heap pops the smallest potential.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BandEntry {
    pub value: f64,
    pub node: usize,
}

impl PartialEq for BandEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BandEntry {}

impl PartialOrd for BandEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BandEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .value
            .total_cmp(&self.value)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Solve `grid` in place by Fast Marching.
///
/// Only frozen and seeded nodes feed updates, so a frozen value never
/// changes. Stale heap entries are skipped on pop.
pub(crate) fn march(grid: &mut CellGrid, order: UpdateOrder) -> SolveReport {
    let mut heap = BinaryHeap::new();
    let mut updates = 0usize;

    let seeds: Vec<usize> = (0..grid.len()).filter(|&i| grid.tag(i) == CellTag::Target).collect();
    for &seed in &seeds {
        relax_neighbors(grid, seed, order, &mut heap, &mut updates);
    }

    let mut frozen = 0usize;
    while let Some(BandEntry { value, node }) = heap.pop() {
        if grid.tag(node) != CellTag::Reachable || value > grid.value(node) {
            continue;
        }
        grid.set_tag(node, CellTag::Frozen);
        frozen += 1;
        relax_neighbors(grid, node, order, &mut heap, &mut updates);
    }

    tracing::debug!(seeds = seeds.len(), frozen, updates, "fast marching finished");
    SolveReport {
        iterations: frozen,
        updates,
        converged: true,
    }
}

fn relax_neighbors(
    grid: &mut CellGrid,
    node: usize,
    order: UpdateOrder,
    heap: &mut BinaryHeap<BandEntry>,
    updates: &mut usize,
) {
    let neighbors: Vec<usize> = grid.neighbors(node).collect();
    for n in neighbors {
        match grid.tag(n) {
            CellTag::Undefined | CellTag::Reachable => {}
            _ => continue,
        }
        let known = |k: usize| match grid.tag(k) {
            CellTag::Frozen | CellTag::Target => grid.value(k),
            _ => f64::INFINITY,
        };
        let candidate = grid.upwind_update(n, order, &known);
        if candidate < grid.value(n) {
            grid.set_value(n, candidate);
            grid.set_tag(n, CellTag::Reachable);
            heap.push(BandEntry { value: candidate, node: n });
            *updates += 1;
        }
    }
}
