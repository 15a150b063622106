//! Candidate seed positions around a recovery event.
//!
//! Every strategy returns geographic coordinates only; index mapping and
//! masking happen downstream in [`MaskFilter`](crate::mask::MaskFilter).

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::RecoveryEvent;
use crate::grid::CurvilinearGrid;
use crate::mapper::GridIndexMapper;
use crate::mask::GeoPoint;

/// Seeding strategy, selected by configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeedStrategy {
    /// `n x n` regular points within `center +- (dlon, dlat)`.
    Mesh { n: usize, dlon: f64, dlat: f64 },
    /// `n x n` normally distributed points with std `(dlon, dlat)`.
    Gaussian {
        n: usize,
        dlon: f64,
        dlat: f64,
        seed: u64,
    },
    /// The event location, nudged once by `(nudge_di, nudge_dj)` grid
    /// cells if it lands on a masked cell.
    SinglePoint { nudge_di: i32, nudge_dj: i32 },
}

impl Default for SeedStrategy {
    fn default() -> Self {
        SeedStrategy::Mesh {
            n: 30,
            dlon: 0.5,
            dlat: 0.5,
        }
    }
}

impl SeedStrategy {
    /// Land-avoidance nudge used when none is configured: two rows south.
    pub fn single_point() -> Self {
        SeedStrategy::SinglePoint {
            nudge_di: 0,
            nudge_dj: -2,
        }
    }

    /// Number of candidates the strategy produces.
    pub fn candidate_count(&self) -> usize {
        match self {
            SeedStrategy::Mesh { n, .. } | SeedStrategy::Gaussian { n, .. } => n * n,
            SeedStrategy::SinglePoint { .. } => 1,
        }
    }

    /// Whether candidates depend on the per-request stream. When false, every
    /// offset of one event yields the same candidates.
    pub fn varies_with_stream(&self) -> bool {
        matches!(self, SeedStrategy::Gaussian { .. })
    }
}

/// Per-request random stream for the Gaussian strategy.
///
/// Distinct `(event, offset)` pairs draw from distinct streams of the same
/// configured seed.
pub fn stream_id(event_index: usize, offset_hours: i64) -> u64 {
    ((event_index as u64) << 32) ^ (offset_hours as u64 & 0xFFFF_FFFF)
}

pub struct SeedGenerator<'g> {
    grid: &'g CurvilinearGrid,
    strategy: SeedStrategy,
}

impl<'g> SeedGenerator<'g> {
    pub fn new(grid: &'g CurvilinearGrid, strategy: SeedStrategy) -> Self {
        Self { grid, strategy }
    }

    pub fn strategy(&self) -> &SeedStrategy {
        &self.strategy
    }

    /// Candidate positions for `event`. `stream` selects the random stream
    /// for the Gaussian strategy and is ignored otherwise.
    pub fn generate(&self, event: &RecoveryEvent, stream: u64) -> Vec<GeoPoint> {
        let (lon, lat) = (event.longitude, event.latitude);
        match self.strategy {
            SeedStrategy::Mesh { n, dlon, dlat } => mesh(lon, lat, n, dlon, dlat),
            SeedStrategy::Gaussian {
                n,
                dlon,
                dlat,
                seed,
            } => gaussian(lon, lat, n, dlon, dlat, seed, stream),
            SeedStrategy::SinglePoint { nudge_di, nudge_dj } => {
                vec![self.single_point(lon, lat, nudge_di, nudge_dj)]
            }
        }
    }

    fn single_point(&self, lon: f64, lat: f64, di: i32, dj: i32) -> GeoPoint {
        let original = GeoPoint::new(lon, lat);
        let mapper = GridIndexMapper::new(self.grid);
        let Ok((i, j)) = mapper.to_index(lon, lat) else {
            return original;
        };

        let (ri, rj) = (i.round(), j.round());
        let on_water = ri >= 0.0 && rj >= 0.0 && self.grid.is_water(ri as usize, rj as usize);
        if on_water {
            return original;
        }

        let (ni, nj) = (i + f64::from(di), j + f64::from(dj));
        match mapper.to_geographic(ni, nj) {
            Ok((nlon, nlat)) => {
                debug!(from_i = i, from_j = j, to_i = ni, to_j = nj, "nudged seed off land");
                GeoPoint::new(nlon, nlat)
            }
            Err(_) => original,
        }
    }
}

/// `n` evenly spaced values across `center +- half`.
fn linspace(center: f64, half: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![center],
        _ => {
            let lo = center - half;
            let step = 2.0 * half / (n - 1) as f64;
            (0..n).map(|k| lo + step * k as f64).collect()
        }
    }
}

fn mesh(lon: f64, lat: f64, n: usize, dlon: f64, dlat: f64) -> Vec<GeoPoint> {
    let lons = linspace(lon, dlon, n);
    let lats = linspace(lat, dlat, n);
    lats.iter()
        .flat_map(|&y| lons.iter().map(move |&x| GeoPoint::new(x, y)))
        .collect()
}

fn gaussian(
    lon: f64,
    lat: f64,
    n: usize,
    dlon: f64,
    dlat: f64,
    seed: u64,
    stream: u64,
) -> Vec<GeoPoint> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    (0..n * n)
        .map(|_| {
            let x = lon + dlon * box_muller(&mut rng);
            let y = lat + dlat * box_muller(&mut rng);
            GeoPoint::new(x, y)
        })
        .collect()
}

/// Standard normal sample.
fn box_muller(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(1e-300);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(lon: f64, lat: f64) -> RecoveryEvent {
        RecoveryEvent {
            index: 14,
            longitude: lon,
            latitude: lat,
            found_date: Utc.with_ymd_and_hms(2013, 5, 24, 0, 0, 0).unwrap(),
            label: "Galveston Beach, Galveston, TX".to_string(),
        }
    }

    fn open_water() -> CurvilinearGrid {
        CurvilinearGrid::rectilinear(-96.0, 28.0, 0.1, 0.1, 21, 21, |_, _| true).unwrap()
    }

    #[test]
    fn mesh_is_row_major_over_lat_lon() {
        let grid = open_water();
        let strategy = SeedStrategy::Mesh { n: 3, dlon: 0.5, dlat: 0.2 };
        let generator = SeedGenerator::new(&grid, strategy);
        let pts = generator.generate(&event(-94.5, 29.3), 0);
        assert_eq!(pts.len(), 9);
        assert!((pts[0].lon - -95.0).abs() < 1e-12);
        assert!((pts[0].lat - 29.1).abs() < 1e-12);
        assert!((pts[1].lon - -94.5).abs() < 1e-12);
        assert!((pts[1].lat - 29.1).abs() < 1e-12);
        assert!((pts[3].lat - 29.3).abs() < 1e-12);
        assert!((pts[8].lon - -94.0).abs() < 1e-12);
    }

    #[test]
    fn default_mesh_yields_nine_hundred() {
        let grid = open_water();
        let generator = SeedGenerator::new(&grid, SeedStrategy::default());
        assert_eq!(generator.generate(&event(-94.5, 29.3), 0).len(), 900);
        assert_eq!(SeedStrategy::default().candidate_count(), 900);
    }

    #[test]
    fn mesh_of_one_is_the_event() {
        let grid = open_water();
        let strategy = SeedStrategy::Mesh { n: 1, dlon: 0.5, dlat: 0.5 };
        let generator = SeedGenerator::new(&grid, strategy);
        let pts = generator.generate(&event(-94.5, 29.3), 0);
        assert_eq!(pts, vec![GeoPoint::new(-94.5, 29.3)]);
    }

    #[test]
    fn gaussian_is_reproducible_per_stream() {
        let grid = open_water();
        let strategy = SeedStrategy::Gaussian {
            n: 4,
            dlon: 0.1,
            dlat: 0.1,
            seed: 42,
        };
        let generator = SeedGenerator::new(&grid, strategy);
        let e = event(-95.0, 29.0);
        let a = generator.generate(&e, stream_id(14, -4));
        let b = generator.generate(&e, stream_id(14, -4));
        let c = generator.generate(&e, stream_id(14, -8));
        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn only_gaussian_varies_with_stream() {
        assert!(!SeedStrategy::default().varies_with_stream());
        assert!(!SeedStrategy::single_point().varies_with_stream());
        let gaussian = SeedStrategy::Gaussian {
            n: 2,
            dlon: 0.1,
            dlat: 0.1,
            seed: 1,
        };
        assert!(gaussian.varies_with_stream());
    }

    #[test]
    fn gaussian_spread_matches_std() {
        let grid = open_water();
        let strategy = SeedStrategy::Gaussian { n: 60, dlon: 0.2, dlat: 0.1, seed: 7 };
        let pts = SeedGenerator::new(&grid, strategy).generate(&event(-95.0, 29.0), 0);
        let n = pts.len() as f64;
        let mean_lon = pts.iter().map(|p| p.lon).sum::<f64>() / n;
        let var_lat = pts.iter().map(|p| (p.lat - 29.0).powi(2)).sum::<f64>() / n;
        assert!((mean_lon - -95.0).abs() < 0.02);
        assert!((var_lat.sqrt() - 0.1).abs() < 0.01);
    }

    #[test]
    fn single_point_on_water_is_unchanged() {
        let grid = open_water();
        let generator = SeedGenerator::new(&grid, SeedStrategy::single_point());
        let pts = generator.generate(&event(-95.0, 29.0), 0);
        assert_eq!(pts, vec![GeoPoint::new(-95.0, 29.0)]);
    }

    #[test]
    fn single_point_on_land_is_nudged_once() {
        // Land north of row 10.
        let grid =
            CurvilinearGrid::rectilinear(-96.0, 28.0, 0.1, 0.1, 21, 21, |_, j| j < 10).unwrap();
        let generator = SeedGenerator::new(&grid, SeedStrategy::single_point());
        let pts = generator.generate(&event(-95.0, 29.05), 0);
        assert_eq!(pts.len(), 1);
        // j = 10.5 -> 8.5.
        assert!((pts[0].lat - 28.85).abs() < 1e-9);
        assert!((pts[0].lon - -95.0).abs() < 1e-9);
    }

    #[test]
    fn single_point_nudge_is_configurable() {
        let grid =
            CurvilinearGrid::rectilinear(-96.0, 28.0, 0.1, 0.1, 21, 21, |i, _| i > 5).unwrap();
        let strategy = SeedStrategy::SinglePoint { nudge_di: 3, nudge_dj: 0 };
        let generator = SeedGenerator::new(&grid, strategy);
        let pts = generator.generate(&event(-95.6, 29.0), 0);
        assert!((pts[0].lon - -95.3).abs() < 1e-9);
    }

    #[test]
    fn single_point_out_of_domain_is_returned_as_is() {
        let grid = open_water();
        let generator = SeedGenerator::new(&grid, SeedStrategy::single_point());
        let pts = generator.generate(&event(-80.0, 29.0), 0);
        assert_eq!(pts, vec![GeoPoint::new(-80.0, 29.0)]);
    }
}
