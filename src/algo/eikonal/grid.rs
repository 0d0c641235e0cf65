//! Regular cell grid with obstacle and target masks.

use nalgebra::{Point2, Vector2};

use super::update::{solve_axes, AxisTerm, UpdateOrder};
use super::PotentialField;
use crate::error::ConfigError;
use crate::geometry::distance::project;
use crate::geometry::Domain;

/// Largest number of grid nodes accepted by [`CellGrid::from_domain`].
pub const MAX_GRID_NODES: usize = 1 << 26;

/// State of one grid node during and after a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellTag {
    /// No tentative value yet.
    #[default]
    Undefined,
    /// Has a tentative value (narrow band or active list).
    Reachable,
    /// Final value; never changes again.
    Frozen,
    /// Seeded from a target; never changes.
    Target,
    /// Blocked; potential is infinite.
    Obstacle,
}

impl CellTag {
    /// Whether the node's value is fixed by seeding.
    #[inline]
    pub fn is_fixed(self) -> bool {
        matches!(self, CellTag::Target | CellTag::Obstacle)
    }
}

/// Nodes at `origin + (i h, j h)` for `i < nx`, `j < ny`, stored row-major.
#[derive(Debug, Clone)]
pub struct CellGrid {
    origin: Point2<f64>,
    h: f64,
    nx: usize,
    ny: usize,
    potential: Vec<f64>,
    speed: Vec<f64>,
    tags: Vec<CellTag>,
}

impl CellGrid {
    /// Rasterize `domain` at spacing `h`.
    ///
    /// Nodes inside obstacles, outside the bounds, or with a non-positive
    /// speed become [`CellTag::Obstacle`]. Nodes inside a target get zero;
    /// free nodes within `init_radius` of a target with a clear line of
    /// sight get the exact `distance / F`. Every target that seeded no node
    /// this way (a point target between nodes with a tiny radius) seeds its
    /// nearest free node exactly.
    pub fn from_domain<S>(domain: &Domain, speed: &S, h: f64, init_radius: f64) -> Result<Self, ConfigError>
    where
        S: Fn(&Point2<f64>) -> f64 + ?Sized,
    {
        domain.validate_for_solve()?;
        if !(h > 0.0 && h.is_finite()) {
            return Err(ConfigError::invalid_param("spacing", h, "must be positive and finite"));
        }
        if !(init_radius >= 0.0) {
            return Err(ConfigError::invalid_param("init_radius", init_radius, "must be non-negative"));
        }

        let bounds = domain.bounds;
        let count = |extent: f64| (extent / h - 1e-9).ceil().max(1.0) + 1.0;
        let (fx, fy) = (count(bounds.width()), count(bounds.height()));
        if fx * fy > MAX_GRID_NODES as f64 {
            return Err(ConfigError::GridTooLarge {
                nx: fx as usize,
                ny: fy as usize,
                limit: MAX_GRID_NODES,
            });
        }
        let (nx, ny) = (fx as usize, fy as usize);
        let len = nx * ny;
        let mut grid = Self {
            origin: bounds.min,
            h,
            nx,
            ny,
            potential: vec![f64::INFINITY; len],
            speed: vec![0.0; len],
            tags: vec![CellTag::Undefined; len],
        };

        let inside = bounds.expanded(1e-9 * h);
        for idx in 0..len {
            let p = grid.node_position(idx);
            let f = speed(&p);
            grid.speed[idx] = f;
            if !inside.contains(&p) || domain.in_obstacle(&p) || !(f > 0.0 && f.is_finite()) {
                grid.tags[idx] = CellTag::Obstacle;
            }
        }

        let mut seeded = 0usize;
        let mut covered = vec![false; domain.targets.len()];
        for idx in 0..len {
            if grid.tags[idx] == CellTag::Obstacle {
                continue;
            }
            let p = grid.node_position(idx);
            let mut inside_any = false;
            for (k, target) in domain.targets.iter().enumerate() {
                if target.contains(&p) {
                    covered[k] = true;
                    inside_any = true;
                }
            }
            if inside_any {
                grid.seed(idx, 0.0);
                seeded += 1;
                continue;
            }
            if let Some((k, d)) = clear_target_distance(domain, &p, init_radius, h) {
                covered[k] = true;
                grid.seed(idx, d / grid.speed[idx]);
                seeded += 1;
            }
        }

        for (target, _) in domain.targets.iter().zip(&covered).filter(|(_, &c)| !c) {
            if let Some(idx) = grid.nearest_free_node(&target.anchor()) {
                let t = target.distance(&grid.node_position(idx)) / grid.speed[idx];
                let value = if grid.tags[idx] == CellTag::Target {
                    grid.potential[idx].min(t)
                } else {
                    seeded += 1;
                    t
                };
                grid.seed(idx, value);
            }
        }
        tracing::debug!(nx, ny, seeded, "grid rasterized");
        Ok(grid)
    }

    fn seed(&mut self, idx: usize, value: f64) {
        self.potential[idx] = value;
        self.tags[idx] = CellTag::Target;
    }

    fn nearest_free_node(&self, p: &Point2<f64>) -> Option<usize> {
        (0..self.len())
            .filter(|&idx| self.tags[idx] != CellTag::Obstacle)
            .min_by(|&a, &b| {
                let da = (self.node_position(a) - p).norm_squared();
                let db = (self.node_position(b) - p).norm_squared();
                da.total_cmp(&db)
            })
    }

    /// Nodes along x.
    #[inline]
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Nodes along y.
    #[inline]
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// Total node count.
    #[inline]
    pub fn len(&self) -> usize {
        self.potential.len()
    }

    /// Whether the grid has no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.potential.is_empty()
    }

    /// Node spacing.
    #[inline]
    pub fn spacing(&self) -> f64 {
        self.h
    }

    /// Position of node `(0, 0)`.
    #[inline]
    pub fn origin(&self) -> Point2<f64> {
        self.origin
    }

    /// Flat index of node `(i, j)`.
    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        j * self.nx + i
    }

    /// Grid coordinates of a flat index.
    #[inline]
    pub fn coords(&self, idx: usize) -> (usize, usize) {
        (idx % self.nx, idx / self.nx)
    }

    /// World position of a node.
    pub fn node_position(&self, idx: usize) -> Point2<f64> {
        let (i, j) = self.coords(idx);
        Point2::new(
            self.origin.x + i as f64 * self.h,
            self.origin.y + j as f64 * self.h,
        )
    }

    /// Potential of a node.
    #[inline]
    pub fn value(&self, idx: usize) -> f64 {
        self.potential[idx]
    }

    /// Potential of node `(i, j)`.
    #[inline]
    pub fn value_at(&self, i: usize, j: usize) -> f64 {
        self.potential[self.index(i, j)]
    }

    /// Tag of a node.
    #[inline]
    pub fn tag(&self, idx: usize) -> CellTag {
        self.tags[idx]
    }

    /// Travel speed at a node.
    #[inline]
    pub fn speed(&self, idx: usize) -> f64 {
        self.speed[idx]
    }

    /// All potentials, row-major.
    pub fn potentials(&self) -> &[f64] {
        &self.potential
    }

    /// All tags, row-major.
    pub fn tags(&self) -> &[CellTag] {
        &self.tags
    }

    pub(crate) fn set_value(&mut self, idx: usize, value: f64) {
        self.potential[idx] = value;
    }

    pub(crate) fn set_tag(&mut self, idx: usize, tag: CellTag) {
        self.tags[idx] = tag;
    }

    /// Replace every potential; seeded nodes keep their seeds.
    ///
    /// Returns `false` if `values` has the wrong length.
    pub(crate) fn restore(&mut self, values: &[f64]) -> bool {
        if values.len() != self.len() {
            return false;
        }
        for (idx, &v) in values.iter().enumerate() {
            if !self.tags[idx].is_fixed() {
                self.potential[idx] = v;
                self.tags[idx] = if v.is_finite() {
                    CellTag::Frozen
                } else {
                    CellTag::Undefined
                };
            }
        }
        true
    }

    /// The up to four axis neighbours of a node.
    pub fn neighbors(&self, idx: usize) -> impl Iterator<Item = usize> {
        let (i, j) = self.coords(idx);
        let nx = self.nx;
        let ny = self.ny;
        [
            (i > 0).then(|| idx - 1),
            (i + 1 < nx).then(|| idx + 1),
            (j > 0).then(|| idx - nx),
            (j + 1 < ny).then(|| idx + nx),
        ]
        .into_iter()
        .flatten()
    }

    /// `(h / F)` at a node.
    #[inline]
    pub(crate) fn step_cost(&self, idx: usize) -> f64 {
        self.h / self.speed[idx]
    }

    /// Upwind update of node `idx` from neighbour values given by `value`.
    ///
    /// Per axis the smaller neighbour is upwind; second order also reads the
    /// node two steps further in the same direction.
    pub(crate) fn upwind_update<V>(&self, idx: usize, order: UpdateOrder, value: &V) -> f64
    where
        V: Fn(usize) -> f64,
    {
        let (i, j) = self.coords(idx);
        let (nx, ny) = (self.nx, self.ny);
        let step = |along: usize, n: usize, stride: usize, k: usize, forward: bool| -> f64 {
            let reach = if forward { along + k < n } else { along >= k };
            if !reach {
                return f64::INFINITY;
            }
            if forward {
                value(idx + k * stride)
            } else {
                value(idx - k * stride)
            }
        };
        let axis = |along: usize, n: usize, stride: usize| -> AxisTerm {
            let back = step(along, n, stride, 1, false);
            let fwd = step(along, n, stride, 1, true);
            let (t1, forward) = if back <= fwd { (back, false) } else { (fwd, true) };
            match order {
                UpdateOrder::Second if t1.is_finite() => {
                    AxisTerm::second(t1, step(along, n, stride, 2, forward))
                }
                _ => AxisTerm::first(t1),
            }
        };
        let mut terms = [axis(i, nx, 1), axis(j, ny, nx)];
        solve_axes(&mut terms, self.step_cost(idx))
    }

    /// Locate `p` in the cell grid: lower-left node and local coordinates.
    fn cell(&self, p: &Point2<f64>) -> (usize, usize, f64, f64) {
        let fx = ((p.x - self.origin.x) / self.h).clamp(0.0, (self.nx - 1) as f64);
        let fy = ((p.y - self.origin.y) / self.h).clamp(0.0, (self.ny - 1) as f64);
        let i = (fx.floor() as usize).min(self.nx.saturating_sub(2));
        let j = (fy.floor() as usize).min(self.ny.saturating_sub(2));
        (i, j, fx - i as f64, fy - j as f64)
    }

    fn corners(&self, i: usize, j: usize) -> [f64; 4] {
        let i1 = (i + 1).min(self.nx - 1);
        let j1 = (j + 1).min(self.ny - 1);
        [
            self.value_at(i, j),
            self.value_at(i1, j),
            self.value_at(i, j1),
            self.value_at(i1, j1),
        ]
    }
}

/// Distance from `p` to the nearest target when it is within `radius` and
/// the straight path to it avoids obstacles.
fn clear_target_distance(domain: &Domain, p: &Point2<f64>, radius: f64, h: f64) -> Option<(usize, f64)> {
    let (k, target, d) = domain
        .targets
        .iter()
        .enumerate()
        .map(|(k, t)| (k, t, t.distance(p)))
        .min_by(|a, b| a.2.total_cmp(&b.2))?;
    if d > radius {
        return None;
    }
    let sd = |q: &Point2<f64>| target.signed_distance(q);
    let foot = project(&sd, p, 1e-3 * h);
    let samples = ((d / (0.25 * h)).ceil() as usize).max(1);
    let blocked = (1..samples).any(|k| {
        let t = k as f64 / samples as f64;
        domain.in_obstacle(&(p + (foot - p) * t))
    });
    (!blocked).then_some((k, d))
}

impl PotentialField for CellGrid {
    fn potential(&self, p: &Point2<f64>) -> f64 {
        let (i, j, tx, ty) = self.cell(p);
        let t = self.corners(i, j);
        let w = [(1.0 - tx) * (1.0 - ty), tx * (1.0 - ty), (1.0 - tx) * ty, tx * ty];
        let (mut sum, mut weight) = (0.0, 0.0);
        for k in 0..4 {
            if t[k].is_finite() && w[k] > 0.0 {
                sum += w[k] * t[k];
                weight += w[k];
            }
        }
        if weight > 0.0 {
            sum / weight
        } else {
            f64::INFINITY
        }
    }

    fn gradient(&self, p: &Point2<f64>) -> Vector2<f64> {
        let (i, j, tx, ty) = self.cell(p);
        let [t00, t10, t01, t11] = self.corners(i, j);
        if [t00, t10, t01, t11].iter().all(|t| t.is_finite()) {
            return Vector2::new(
                ((1.0 - ty) * (t10 - t00) + ty * (t11 - t01)) / self.h,
                ((1.0 - tx) * (t01 - t00) + tx * (t11 - t10)) / self.h,
            );
        }
        let mean = |pairs: [(f64, f64); 2]| {
            let diffs: Vec<f64> = pairs
                .iter()
                .filter(|(a, b)| a.is_finite() && b.is_finite())
                .map(|(a, b)| b - a)
                .collect();
            if diffs.is_empty() {
                0.0
            } else {
                diffs.iter().sum::<f64>() / diffs.len() as f64
            }
        };
        Vector2::new(
            mean([(t00, t10), (t01, t11)]) / self.h,
            mean([(t00, t01), (t10, t11)]) / self.h,
        )
    }
}
