//! Uniform grid bucketing over CIELAB for nearest-neighbor queries
//!
//! Built once when a table is loaded. Queries walk Chebyshev shells of cells
//! outward from the query's cell and stop once every unvisited cell is
//! provably farther than the best hit plus the tie epsilon.

use crate::color::Lab;

/// Edge length of a grid cell in CIELAB units
pub const DEFAULT_CELL_SIZE: f64 = 10.0;

/// Upper bound on grid cells; sparse tables get coarser cells instead
const MAX_CELLS: usize = 1 << 18;

#[derive(Debug, Clone)]
pub struct GridIndex {
    cell: f64,
    origin: [f64; 3],
    dims: [usize; 3],
    cells: Vec<Vec<usize>>,
}

impl GridIndex {
    pub fn build(points: &[Lab], cell: f64) -> Self {
        if points.is_empty() {
            return Self {
                cell,
                origin: [0.0; 3],
                dims: [0; 3],
                cells: Vec::new(),
            };
        }

        let mut min = [f64::MAX; 3];
        let mut max = [f64::MIN; 3];
        for p in points {
            for (axis, v) in [p.l, p.a, p.b].into_iter().enumerate() {
                min[axis] = min[axis].min(v);
                max[axis] = max[axis].max(v);
            }
        }

        let span = [max[0] - min[0], max[1] - min[1], max[2] - min[2]];
        let (cell, dims) = if span.iter().all(|s| s.is_finite()) {
            fit_cells(span, cell)
        } else {
            // Unbounded coordinates: one cell, searched linearly
            (cell, [1, 1, 1])
        };

        let mut index = Self {
            cell,
            origin: min,
            dims,
            cells: vec![Vec::new(); dims[0] * dims[1] * dims[2]],
        };
        for (i, p) in points.iter().enumerate() {
            let c = index.cell_of(p);
            let slot = index.slot(c);
            index.cells[slot].push(i);
        }
        index
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Indices of every point within `epsilon` of the minimum distance to
    /// `query`, in ascending index order. Empty only for an empty index.
    pub fn nearest(&self, query: &Lab, points: &[Lab], epsilon: f64) -> Vec<usize> {
        if self.is_empty() {
            return Vec::new();
        }

        let center = self.cell_of(query);
        let max_radius = *self.dims.iter().max().unwrap_or(&0);
        let mut best = f64::MAX;
        let mut hits: Vec<(usize, f64)> = Vec::new();

        for radius in 0..=max_radius {
            self.visit_shell(center, radius, |slot| {
                for &i in &self.cells[slot] {
                    let d = query.distance(&points[i]);
                    if d <= best + epsilon {
                        best = best.min(d);
                        hits.push((i, d));
                    }
                }
            });

            // Every cell outside this shell is at least radius * cell away
            if best + epsilon <= radius as f64 * self.cell {
                break;
            }
        }

        let mut out: Vec<usize> = hits
            .into_iter()
            .filter(|&(_, d)| d <= best + epsilon)
            .map(|(i, _)| i)
            .collect();
        out.sort_unstable();
        out
    }

    /// Clamped cell coordinates of a point
    fn cell_of(&self, p: &Lab) -> [usize; 3] {
        let mut c = [0usize; 3];
        for (axis, v) in [p.l, p.a, p.b].into_iter().enumerate() {
            let raw = ((v - self.origin[axis]) / self.cell).floor();
            c[axis] = if raw.is_nan() || raw < 0.0 {
                0
            } else {
                (raw as usize).min(self.dims[axis] - 1)
            };
        }
        c
    }

    fn slot(&self, c: [usize; 3]) -> usize {
        (c[0] * self.dims[1] + c[1]) * self.dims[2] + c[2]
    }

    /// Call `f` with every in-bounds cell at exactly Chebyshev `radius`
    fn visit_shell(&self, center: [usize; 3], radius: usize, mut f: impl FnMut(usize)) {
        let r = radius as isize;
        let range = |axis: usize| {
            let c = center[axis] as isize;
            let lo = (c - r).max(0);
            let hi = (c + r).min(self.dims[axis] as isize - 1);
            lo..=hi
        };

        for x in range(0) {
            for y in range(1) {
                for z in range(2) {
                    let on_shell = (x - center[0] as isize).abs() == r
                        || (y - center[1] as isize).abs() == r
                        || (z - center[2] as isize).abs() == r;
                    if on_shell {
                        f(self.slot([x as usize, y as usize, z as usize]));
                    }
                }
            }
        }
    }
}

/// Grow the cell edge until the grid has at most [`MAX_CELLS`] cells
fn fit_cells(span: [f64; 3], cell: f64) -> (f64, [usize; 3]) {
    let count = |cell: f64| span.map(|s| (s / cell).floor() + 1.0);
    let mut cell = if cell.is_finite() && cell > 0.0 {
        cell
    } else {
        DEFAULT_CELL_SIZE
    };
    while count(cell).iter().product::<f64>() > MAX_CELLS as f64 {
        cell *= 2.0;
    }
    (cell, count(cell).map(|n| n as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Brute-force counterpart of [`GridIndex::nearest`]
    fn nearest_linear(query: &Lab, points: &[Lab], epsilon: f64) -> Vec<usize> {
        let best = points
            .iter()
            .map(|p| query.distance(p))
            .fold(f64::MAX, f64::min);
        points
            .iter()
            .enumerate()
            .filter(|(_, p)| query.distance(p) <= best + epsilon)
            .map(|(i, _)| i)
            .collect()
    }

    /// Deterministic pseudo-random coordinates
    fn scatter(n: usize, seed: u64) -> Vec<Lab> {
        let mut state = seed;
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        (0..n)
            .map(|_| Lab::new(next() * 100.0, next() * 200.0 - 100.0, next() * 200.0 - 100.0))
            .collect()
    }

    #[test]
    fn test_matches_linear_scan() {
        let points = scatter(2000, 7);
        let index = GridIndex::build(&points, DEFAULT_CELL_SIZE);

        for query in scatter(300, 99) {
            assert_eq!(
                index.nearest(&query, &points, 1e-9),
                nearest_linear(&query, &points, 1e-9),
                "query {:?}",
                query
            );
        }
    }

    #[test]
    fn test_query_outside_grid() {
        let points = scatter(500, 3);
        let index = GridIndex::build(&points, DEFAULT_CELL_SIZE);

        for query in [Lab::new(-50.0, 300.0, -300.0), Lab::new(250.0, 0.0, 0.0)] {
            assert_eq!(
                index.nearest(&query, &points, 1e-9),
                nearest_linear(&query, &points, 1e-9)
            );
        }
    }

    #[test]
    fn test_returns_all_equidistant_points() {
        let points = vec![
            Lab::new(50.0, 10.0, 0.0),
            Lab::new(50.0, -10.0, 0.0),
            Lab::new(50.0, 40.0, 0.0),
        ];
        let index = GridIndex::build(&points, DEFAULT_CELL_SIZE);
        assert_eq!(index.nearest(&Lab::new(50.0, 0.0, 0.0), &points, 1e-9), vec![0, 1]);
    }

    #[test]
    fn test_far_apart_points_stay_bounded() {
        let mut points = scatter(200, 11);
        points.push(Lab::new(1e101, 0.0, 0.0));
        points.push(Lab::new(50.0, -5.7e6, 2.0e6));
        let index = GridIndex::build(&points, DEFAULT_CELL_SIZE);
        assert!(index.cells.len() <= MAX_CELLS);

        for query in scatter(50, 5).into_iter().chain([Lab::new(1e101, 0.0, 0.0)]) {
            assert_eq!(
                index.nearest(&query, &points, 1e-9),
                nearest_linear(&query, &points, 1e-9)
            );
        }
    }

    #[test]
    fn test_unbounded_points_use_one_cell() {
        let points = vec![Lab::new(f64::INFINITY, 0.0, 0.0), Lab::new(50.0, 0.0, 0.0)];
        let index = GridIndex::build(&points, DEFAULT_CELL_SIZE);
        assert_eq!(index.cells.len(), 1);
        assert_eq!(index.nearest(&Lab::new(40.0, 0.0, 0.0), &points, 1e-9), vec![1]);
    }

    #[test]
    fn test_empty_index() {
        let index = GridIndex::build(&[], DEFAULT_CELL_SIZE);
        assert!(index.is_empty());
        assert!(index.nearest(&Lab::new(50.0, 0.0, 0.0), &[], 1e-9).is_empty());
    }
}
