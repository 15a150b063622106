//! R-tree over grid cell envelopes.
//!
//! Built once per grid. A point query returns the few cells whose bounding
//! boxes contain the point; the mapper then solves exactly inside those.

use std::fmt;
use std::sync::Arc;

use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// Axis-aligned bounding box of cell `(ci, cj)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CellEnvelope {
    pub ci: usize,
    pub cj: usize,
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl CellEnvelope {
    pub fn new(ci: usize, cj: usize, corners: [(f64, f64); 4]) -> Self {
        let mut env = Self {
            ci,
            cj,
            min_lon: f64::INFINITY,
            min_lat: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            max_lat: f64::NEG_INFINITY,
        };
        for (lon, lat) in corners {
            env.min_lon = env.min_lon.min(lon);
            env.min_lat = env.min_lat.min(lat);
            env.max_lon = env.max_lon.max(lon);
            env.max_lat = env.max_lat.max(lat);
        }
        env
    }
}

impl RTreeObject for CellEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.min_lon, self.min_lat], [self.max_lon, self.max_lat])
    }
}

impl PointDistance for CellEnvelope {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = (self.min_lon - point[0]).max(point[0] - self.max_lon).max(0.0);
        let dy = (self.min_lat - point[1]).max(point[1] - self.max_lat).max(0.0);
        dx * dx + dy * dy
    }

    fn contains_point(&self, point: &[f64; 2]) -> bool {
        point[0] >= self.min_lon
            && point[0] <= self.max_lon
            && point[1] >= self.min_lat
            && point[1] <= self.max_lat
    }
}

/// Spatial index of every cell of one grid. Cheap to clone.
#[derive(Clone)]
pub struct CellIndex {
    tree: Arc<RTree<CellEnvelope>>,
}

impl CellIndex {
    pub fn build(envelopes: Vec<CellEnvelope>) -> Self {
        Self {
            tree: Arc::new(RTree::bulk_load(envelopes)),
        }
    }

    /// Cells whose bounding box contains `(lon, lat)`.
    pub fn candidates(&self, lon: f64, lat: f64) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.tree
            .locate_all_at_point(&[lon, lat])
            .map(|env| (env.ci, env.cj))
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl fmt::Debug for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellIndex").field("cells", &self.len()).finish()
    }
}
