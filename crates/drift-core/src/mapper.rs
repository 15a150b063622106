//! Geographic <-> fractional grid index mapping.
//!
//! Fractional index `(i, j)` means: cell `(floor i, floor j)`, at bilinear
//! parameters `(i - floor i, j - floor j)` between the four rho nodes at its
//! corners. `to_index` inverts that map: the grid's R-tree of cell envelopes
//! yields the few candidate cells, and a Newton solve runs inside each.

use crate::error::GridError;
use crate::grid::CurvilinearGrid;

const NEWTON_MAX_ITER: usize = 30;
const NEWTON_TOL: f64 = 1e-12;
const CELL_SLACK: f64 = 1e-9;

/// Maps between geographic coordinates and fractional grid indices.
#[derive(Debug, Clone, Copy)]
pub struct GridIndexMapper<'g> {
    grid: &'g CurvilinearGrid,
}

impl<'g> GridIndexMapper<'g> {
    pub fn new(grid: &'g CurvilinearGrid) -> Self {
        Self { grid }
    }

    pub fn grid(&self) -> &'g CurvilinearGrid {
        self.grid
    }

    /// Fractional `(i, j)` of a geographic point.
    ///
    /// Returns `OutOfDomain` for NaN input and for points not inside any
    /// grid cell.
    pub fn to_index(&self, lon: f64, lat: f64) -> Result<(f64, f64), GridError> {
        let out = GridError::OutOfDomain { lon, lat };
        if !lon.is_finite() || !lat.is_finite() || !self.grid.bounds().contains(lon, lat) {
            return Err(out);
        }

        for (ci, cj) in self.grid.cells_containing(lon, lat) {
            if let Some(hit) = self.invert_cell(ci, cj, lon, lat) {
                return Ok(hit);
            }
        }

        Err(out)
    }

    /// Geographic `(lon, lat)` of a fractional index, by bilinear
    /// interpolation of the cell's corner nodes.
    pub fn to_geographic(&self, i: f64, j: f64) -> Result<(f64, f64), GridError> {
        let max_i = (self.grid.nx() - 1) as f64;
        let max_j = (self.grid.ny() - 1) as f64;
        if !(0.0..=max_i).contains(&i) || !(0.0..=max_j).contains(&j) {
            return Err(GridError::IndexOutOfDomain { i, j });
        }

        let ci = (i.floor() as usize).min(self.grid.nx() - 2);
        let cj = (j.floor() as usize).min(self.grid.ny() - 2);
        let s = i - ci as f64;
        let t = j - cj as f64;
        Ok(self.corners(ci, cj).eval(s, t))
    }

    fn corners(&self, ci: usize, cj: usize) -> Cell {
        Cell {
            p00: self.grid.node(ci, cj),
            p10: self.grid.node(ci + 1, cj),
            p01: self.grid.node(ci, cj + 1),
            p11: self.grid.node(ci + 1, cj + 1),
        }
    }

    fn invert_cell(&self, ci: usize, cj: usize, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let (s, t) = self.corners(ci, cj).invert(lon, lat)?;
        Some((ci as f64 + s, cj as f64 + t))
    }
}

/// Corner nodes of one cell, `pST` at bilinear parameters `(S, T)`.
struct Cell {
    p00: (f64, f64),
    p10: (f64, f64),
    p01: (f64, f64),
    p11: (f64, f64),
}

impl Cell {
    fn eval(&self, s: f64, t: f64) -> (f64, f64) {
        let w00 = (1.0 - s) * (1.0 - t);
        let w10 = s * (1.0 - t);
        let w01 = (1.0 - s) * t;
        let w11 = s * t;
        (
            w00 * self.p00.0 + w10 * self.p10.0 + w01 * self.p01.0 + w11 * self.p11.0,
            w00 * self.p00.1 + w10 * self.p10.1 + w01 * self.p01.1 + w11 * self.p11.1,
        )
    }

    /// Newton solve for `(s, t)`; `None` if it diverges or lands outside
    /// the unit square.
    fn invert(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let (mut s, mut t) = (0.5, 0.5);
        for _ in 0..NEWTON_MAX_ITER {
            let (x, y) = self.eval(s, t);
            let fx = x - lon;
            let fy = y - lat;

            let dxds = (1.0 - t) * (self.p10.0 - self.p00.0) + t * (self.p11.0 - self.p01.0);
            let dyds = (1.0 - t) * (self.p10.1 - self.p00.1) + t * (self.p11.1 - self.p01.1);
            let dxdt = (1.0 - s) * (self.p01.0 - self.p00.0) + s * (self.p11.0 - self.p10.0);
            let dydt = (1.0 - s) * (self.p01.1 - self.p00.1) + s * (self.p11.1 - self.p10.1);

            let det = dxds * dydt - dxdt * dyds;
            if det == 0.0 || !det.is_finite() {
                return None;
            }
            let ds = (fx * dydt - fy * dxdt) / det;
            let dt = (fy * dxds - fx * dyds) / det;
            s -= ds;
            t -= dt;
            if !s.is_finite() || !t.is_finite() {
                return None;
            }
            if ds.abs() < NEWTON_TOL && dt.abs() < NEWTON_TOL {
                break;
            }
        }

        let inside = |v: f64| (-CELL_SLACK..=1.0 + CELL_SLACK).contains(&v);
        if !inside(s) || !inside(t) {
            return None;
        }
        let (x, y) = self.eval(s, t);
        let residual = (x - lon).abs().max((y - lat).abs());
        if residual > 1e-8 {
            return None;
        }
        Some((s.clamp(0.0, 1.0), t.clamp(0.0, 1.0)))
    }
}
