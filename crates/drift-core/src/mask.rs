//! Land/water filtering of candidate seed points.

use serde::{Deserialize, Serialize};

use crate::error::SeedError;
use crate::grid::CurvilinearGrid;
use crate::mapper::GridIndexMapper;

/// A geographic position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// A seed point after index mapping and masking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeedPoint {
    pub lon: f64,
    pub lat: f64,
    /// Fractional xi index; NaN when the point is out of domain.
    pub i: f64,
    /// Fractional eta index; NaN when the point is out of domain.
    pub j: f64,
    pub valid: bool,
}

/// Why a candidate was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    OutOfDomain,
    OnLand,
}

/// Outcome of filtering one seed set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaskReport {
    /// Surviving points, in input order.
    pub valid: Vec<SeedPoint>,
    pub dropped: usize,
    pub out_of_domain: usize,
    pub on_land: usize,
}

impl MaskReport {
    pub fn candidates(&self) -> usize {
        self.valid.len() + self.dropped
    }

    /// The valid points, or `AllSeedsInvalid` when none survived.
    pub fn require_valid(self) -> Result<Vec<SeedPoint>, SeedError> {
        if self.valid.is_empty() {
            return Err(SeedError::AllSeedsInvalid {
                dropped: self.dropped,
            });
        }
        Ok(self.valid)
    }
}

/// Drops candidates that are on land or outside the grid.
pub struct MaskFilter;

impl MaskFilter {
    /// Map and classify a single point.
    pub fn classify(point: GeoPoint, grid: &CurvilinearGrid) -> Result<SeedPoint, DropReason> {
        let mapper = GridIndexMapper::new(grid);
        let (i, j) = mapper
            .to_index(point.lon, point.lat)
            .map_err(|_| DropReason::OutOfDomain)?;

        let ri = i.round();
        let rj = j.round();
        if ri < 0.0 || rj < 0.0 || ri >= grid.nx() as f64 || rj >= grid.ny() as f64 {
            return Err(DropReason::OutOfDomain);
        }
        if !grid.is_water(ri as usize, rj as usize) {
            return Err(DropReason::OnLand);
        }

        Ok(SeedPoint {
            lon: point.lon,
            lat: point.lat,
            i,
            j,
            valid: true,
        })
    }

    /// Keep the water points of `points`, counting the rest.
    pub fn filter(points: &[GeoPoint], grid: &CurvilinearGrid) -> MaskReport {
        let mut report = MaskReport::default();
        for &point in points {
            match Self::classify(point, grid) {
                Ok(seed) => report.valid.push(seed),
                Err(reason) => {
                    report.dropped += 1;
                    match reason {
                        DropReason::OutOfDomain => report.out_of_domain += 1,
                        DropReason::OnLand => report.on_land += 1,
                    }
                }
            }
        }
        report
    }
}
