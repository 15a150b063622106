//! Circulation-model grid as seen by the seeding core.
//!
//! The grid is an immutable value: rho-point longitude/latitude arrays, the
//! land/water mask and the shapes of the u- and v-face arrays. Arrays are
//! stored flat with index `j * nx + i`, `i` running along the xi direction.

use std::path::Path;

use drift_state::FaceValues;
use serde::{Deserialize, Serialize};

use crate::error::GridError;
use crate::spatial_index::{CellEnvelope, CellIndex};

/// Geographic extent of the rho points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl Bounds {
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.lon_min && lon <= self.lon_max && lat >= self.lat_min && lat <= self.lat_max
    }
}

/// Curvilinear ocean-model grid.
#[derive(Debug, Clone)]
pub struct CurvilinearGrid {
    nx: usize,
    ny: usize,
    lon: Vec<f64>,
    lat: Vec<f64>,
    /// `true` for water.
    mask: Vec<bool>,
    bounds: Bounds,
    cells: CellIndex,
}

/// On-disk grid layout: 2-D arrays as rows indexed by `j`.
#[derive(Debug, Serialize, Deserialize)]
pub struct GridFile {
    pub lon_rho: Vec<Vec<f64>>,
    pub lat_rho: Vec<Vec<f64>>,
    /// 1 for water, 0 for land.
    pub mask_rho: Vec<Vec<u8>>,
}

impl CurvilinearGrid {
    /// Build a grid from flat `[j * nx + i]` arrays.
    pub fn new(
        nx: usize,
        ny: usize,
        lon: Vec<f64>,
        lat: Vec<f64>,
        mask: Vec<bool>,
    ) -> Result<Self, GridError> {
        if nx < 2 || ny < 2 {
            return Err(GridError::Shape(format!(
                "need at least 2 x 2 rho points, got {nx} x {ny}"
            )));
        }
        let n = nx * ny;
        if lon.len() != n || lat.len() != n || mask.len() != n {
            return Err(GridError::Shape(format!(
                "expected {n} values per array, got lon {} lat {} mask {}",
                lon.len(),
                lat.len(),
                mask.len()
            )));
        }
        if lon.iter().chain(&lat).any(|v| !v.is_finite()) {
            return Err(GridError::Shape("non-finite rho coordinate".to_string()));
        }

        let fold = |values: &[f64]| {
            values
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                })
        };
        let (lon_min, lon_max) = fold(&lon);
        let (lat_min, lat_max) = fold(&lat);

        let node = |i: usize, j: usize| (lon[j * nx + i], lat[j * nx + i]);
        let mut envelopes = Vec::with_capacity((nx - 1) * (ny - 1));
        for cj in 0..ny - 1 {
            for ci in 0..nx - 1 {
                let corners = [
                    node(ci, cj),
                    node(ci + 1, cj),
                    node(ci, cj + 1),
                    node(ci + 1, cj + 1),
                ];
                envelopes.push(CellEnvelope::new(ci, cj, corners));
            }
        }
        let cells = CellIndex::build(envelopes);

        Ok(Self {
            nx,
            ny,
            lon,
            lat,
            mask,
            bounds: Bounds {
                lon_min,
                lon_max,
                lat_min,
                lat_max,
            },
            cells,
        })
    }

    /// Regular lon/lat grid with its first rho point at `(lon0, lat0)`.
    ///
    /// `is_water(i, j)` classifies each rho point.
    pub fn rectilinear(
        lon0: f64,
        lat0: f64,
        dlon: f64,
        dlat: f64,
        nx: usize,
        ny: usize,
        is_water: impl Fn(usize, usize) -> bool,
    ) -> Result<Self, GridError> {
        let n = nx * ny;
        let mut lon = Vec::with_capacity(n);
        let mut lat = Vec::with_capacity(n);
        let mut mask = Vec::with_capacity(n);
        for j in 0..ny {
            for i in 0..nx {
                lon.push(lon0 + dlon * i as f64);
                lat.push(lat0 + dlat * j as f64);
                mask.push(is_water(i, j));
            }
        }
        Self::new(nx, ny, lon, lat, mask)
    }

    /// Build from the row-major JSON layout.
    pub fn from_grid_file(file: GridFile) -> Result<Self, GridError> {
        let ny = file.lon_rho.len();
        let nx = file.lon_rho.first().map_or(0, Vec::len);
        if !rectangular(&file.lon_rho, nx, ny)
            || !rectangular(&file.lat_rho, nx, ny)
            || !rectangular(&file.mask_rho, nx, ny)
        {
            return Err(GridError::Shape(
                "lon_rho, lat_rho and mask_rho must share one rectangular shape".to_string(),
            ));
        }
        let lon = file.lon_rho.into_iter().flatten().collect();
        let lat = file.lat_rho.into_iter().flatten().collect();
        let mask = file.mask_rho.into_iter().flatten().map(|m| m != 0).collect();
        Self::new(nx, ny, lon, lat, mask)
    }

    /// Read a JSON grid file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, GridError> {
        let bytes = std::fs::read(path)?;
        let file: GridFile = serde_json::from_slice(&bytes)?;
        Self::from_grid_file(file)
    }

    /// Number of rho points along xi.
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Number of rho points along eta.
    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// `(lon, lat)` of rho point `(i, j)`. Panics if out of range.
    pub fn node(&self, i: usize, j: usize) -> (f64, f64) {
        let k = j * self.nx + i;
        (self.lon[k], self.lat[k])
    }

    /// Cells `(ci, cj)` whose bounding box contains `(lon, lat)`.
    pub fn cells_containing(
        &self,
        lon: f64,
        lat: f64,
    ) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.cells.candidates(lon, lat)
    }

    /// Whether rho cell `(i, j)` is water. Out-of-range cells are land.
    pub fn is_water(&self, i: usize, j: usize) -> bool {
        i < self.nx && j < self.ny && self.mask[j * self.nx + i]
    }

    /// Shape `(nx, ny)` of the u-face arrays.
    pub fn u_shape(&self) -> (usize, usize) {
        (self.nx - 1, self.ny)
    }

    /// Shape `(nx, ny)` of the v-face arrays.
    pub fn v_shape(&self) -> (usize, usize) {
        (self.nx, self.ny - 1)
    }
}

fn rectangular<T>(rows: &[Vec<T>], nx: usize, ny: usize) -> bool {
    rows.len() == ny && rows.iter().all(|row| row.len() == nx)
}

/// A 2-D field over one family of cell faces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceField {
    nx: usize,
    ny: usize,
    values: Vec<f64>,
}

impl FaceField {
    pub fn zeros((nx, ny): (usize, usize)) -> Self {
        Self {
            nx,
            ny,
            values: vec![0.0; nx * ny],
        }
    }

    /// Wrap flat `[j * nx + i]` values; `None` if the length does not match.
    pub fn from_values((nx, ny): (usize, usize), values: Vec<f64>) -> Option<Self> {
        (values.len() == nx * ny).then_some(Self { nx, ny, values })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        (i < self.nx && j < self.ny).then(|| self.values[j * self.nx + i])
    }

    /// Add `amount` at `(i, j)`; returns `false` if the face does not exist.
    pub fn add(&mut self, i: usize, j: usize, amount: f64) -> bool {
        if i < self.nx && j < self.ny {
            self.values[j * self.nx + i] += amount;
            true
        } else {
            false
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }
}

impl From<FaceField> for FaceValues {
    fn from(field: FaceField) -> Self {
        FaceValues {
            nx: field.nx,
            ny: field.ny,
            values: field.values,
        }
    }
}

impl TryFrom<FaceValues> for FaceField {
    type Error = GridError;

    fn try_from(face: FaceValues) -> Result<Self, Self::Error> {
        let (nx, ny) = (face.nx, face.ny);
        FaceField::from_values((nx, ny), face.values)
            .ok_or_else(|| GridError::Shape(format!("face values do not fill {nx} x {ny}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectilinear_layout() {
        let grid = CurvilinearGrid::rectilinear(-95.0, 28.0, 0.1, 0.1, 4, 3, |_, _| true).unwrap();
        assert_eq!(grid.nx(), 4);
        assert_eq!(grid.ny(), 3);
        let (lon, lat) = grid.node(3, 2);
        assert!((lon - -94.7).abs() < 1e-12);
        assert!((lat - 28.2).abs() < 1e-12);
        assert_eq!(grid.u_shape(), (3, 3));
        assert_eq!(grid.v_shape(), (4, 2));
    }

    #[test]
    fn every_cell_is_indexed() {
        let grid = CurvilinearGrid::rectilinear(-95.0, 28.0, 0.1, 0.1, 4, 3, |_, _| true).unwrap();
        let hits: Vec<_> = grid.cells_containing(-94.75, 28.15).collect();
        assert_eq!(hits, vec![(2, 1)]);
        assert_eq!(grid.cells_containing(-94.0, 28.15).count(), 0);
    }

    #[test]
    fn bounds_cover_all_nodes() {
        let grid = CurvilinearGrid::rectilinear(-95.0, 28.0, 0.5, 0.25, 3, 5, |_, _| true).unwrap();
        let b = grid.bounds();
        assert_eq!(b.lon_min, -95.0);
        assert_eq!(b.lon_max, -94.0);
        assert_eq!(b.lat_min, 28.0);
        assert_eq!(b.lat_max, 29.0);
        assert!(b.contains(-94.5, 28.5));
        assert!(!b.contains(-93.9, 28.5));
    }

    #[test]
    fn mask_is_respected() {
        let grid = CurvilinearGrid::rectilinear(0.0, 0.0, 1.0, 1.0, 3, 3, |i, _| i > 0).unwrap();
        assert!(!grid.is_water(0, 1));
        assert!(grid.is_water(1, 1));
        assert!(!grid.is_water(3, 0));
    }

    #[test]
    fn rejects_degenerate_shapes() {
        assert!(CurvilinearGrid::rectilinear(0.0, 0.0, 1.0, 1.0, 1, 5, |_, _| true).is_err());
        assert!(CurvilinearGrid::new(2, 2, vec![0.0; 4], vec![0.0; 3], vec![true; 4]).is_err());
        assert!(CurvilinearGrid::new(
            2,
            2,
            vec![0.0, 1.0, f64::NAN, 1.0],
            vec![0.0; 4],
            vec![true; 4]
        )
        .is_err());
    }

    #[test]
    fn grid_file_round_trip() {
        let file = GridFile {
            lon_rho: vec![vec![-95.0, -94.9, -94.8], vec![-95.0, -94.9, -94.8]],
            lat_rho: vec![vec![28.0, 28.0, 28.0], vec![28.1, 28.1, 28.1]],
            mask_rho: vec![vec![0, 1, 1], vec![1, 1, 0]],
        };
        let grid = CurvilinearGrid::from_grid_file(file).unwrap();
        assert_eq!((grid.nx(), grid.ny()), (3, 2));
        assert!(!grid.is_water(0, 0));
        assert!(!grid.is_water(2, 1));
        assert!(grid.is_water(1, 1));
    }

    #[test]
    fn grid_file_rejects_ragged_rows() {
        let file = GridFile {
            lon_rho: vec![vec![0.0, 1.0], vec![0.0]],
            lat_rho: vec![vec![0.0, 0.0], vec![1.0, 1.0]],
            mask_rho: vec![vec![1, 1], vec![1, 1]],
        };
        assert!(CurvilinearGrid::from_grid_file(file).is_err());
    }

    #[test]
    fn grid_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.json");
        let body = serde_json::json!({
            "lon_rho": [[-95.0, -94.0], [-95.0, -94.0]],
            "lat_rho": [[28.0, 28.0], [29.0, 29.0]],
            "mask_rho": [[1, 1], [1, 0]],
        });
        std::fs::write(&path, body.to_string()).unwrap();
        let grid = CurvilinearGrid::from_json_file(&path).unwrap();
        assert!(!grid.is_water(1, 1));
    }

    #[test]
    fn face_field_accumulates() {
        let mut f = FaceField::zeros((2, 3));
        assert!(f.add(1, 2, 1.5));
        assert!(f.add(1, 2, 0.5));
        assert!(!f.add(2, 0, 1.0));
        assert_eq!(f.get(1, 2), Some(2.0));
        assert_eq!(f.get(5, 5), None);
        assert_eq!(f.sum(), 2.0);
    }

    #[test]
    fn face_values_conversion_checks_length() {
        let bad = FaceValues {
            nx: 2,
            ny: 2,
            values: vec![0.0; 3],
        };
        assert!(FaceField::try_from(bad).is_err());
        let good: FaceValues = FaceField::zeros((2, 2)).into();
        assert_eq!(good.values.len(), 4);
    }
}
