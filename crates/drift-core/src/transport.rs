//! Streamline-mode volume transport.
//!
//! Each drifter of a run carries the same transport `T0`, fixed from the
//! integrator's first-step flux at the seed cells. `U` and `V` start at
//! zero over the grid's u- and v-faces; the integrator adds `T0` to a face
//! each time a drifter crosses it.

use drift_state::TransportSnapshot;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::TransportError;
use crate::grid::{CurvilinearGrid, FaceField};
use crate::mask::SeedPoint;

/// Volume flux through every u- and v-face at the first model step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FluxSnapshot {
    pub u: FaceField,
    pub v: FaceField,
}

/// Transport state owned by one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportState {
    pub t0: f64,
    pub u: FaceField,
    pub v: FaceField,
    /// Every seed sampled exactly zero flux.
    pub needs_review: bool,
    pub ndrifters: usize,
}

impl From<TransportState> for TransportSnapshot {
    fn from(state: TransportState) -> Self {
        TransportSnapshot {
            t0: state.t0,
            u: state.u.into(),
            v: state.v.into(),
        }
    }
}

pub struct TransportAccumulator {
    state: TransportState,
}

impl TransportAccumulator {
    /// Compute `T0` from `flux` at the seed cells and zero `U`/`V`.
    ///
    /// `T0 = sum(|u| + |v|) / N`, sampling the u-face at
    /// `(floor i, round j)` and the v-face at `(round i, floor j)`.
    pub fn initialize(
        grid: &CurvilinearGrid,
        seeds: &[SeedPoint],
        flux: &FluxSnapshot,
    ) -> Result<TransportState, TransportError> {
        check_shape("u", grid.u_shape(), flux.u.shape())?;
        check_shape("v", grid.v_shape(), flux.v.shape())?;
        if seeds.is_empty() {
            return Err(TransportError::NoSeeds);
        }

        let total = sampled_flux(seeds, flux);
        let n = seeds.len();
        let t0 = total / n as f64;
        let needs_review = total == 0.0;
        if needs_review {
            warn!(
                ndrifters = n,
                "initial flux is zero at every seed cell; transport flagged for review"
            );
        }

        Ok(TransportState {
            t0,
            u: FaceField::zeros(grid.u_shape()),
            v: FaceField::zeros(grid.v_shape()),
            needs_review,
            ndrifters: n,
        })
    }

    pub fn new(state: TransportState) -> Self {
        Self { state }
    }

    /// Record one drifter crossing u-face `(i, j)`.
    pub fn add_u(&mut self, i: usize, j: usize, crossings: f64) -> bool {
        let t0 = self.state.t0;
        self.state.u.add(i, j, crossings * t0)
    }

    /// Record one drifter crossing v-face `(i, j)`.
    pub fn add_v(&mut self, i: usize, j: usize, crossings: f64) -> bool {
        let t0 = self.state.t0;
        self.state.v.add(i, j, crossings * t0)
    }

    pub fn state(&self) -> &TransportState {
        &self.state
    }

    pub fn into_state(self) -> TransportState {
        self.state
    }
}

fn check_shape(
    face: &'static str,
    expected: (usize, usize),
    actual: (usize, usize),
) -> Result<(), TransportError> {
    if expected == actual {
        Ok(())
    } else {
        Err(TransportError::FluxShape {
            face,
            expected,
            actual,
        })
    }
}

/// `sum(|u| + |v|)` over the seed cells.
pub fn sampled_flux(seeds: &[SeedPoint], flux: &FluxSnapshot) -> f64 {
    seeds
        .iter()
        .map(|seed| {
            let u = sample(&flux.u, seed.i.floor(), seed.j.round());
            let v = sample(&flux.v, seed.i.round(), seed.j.floor());
            u.abs() + v.abs()
        })
        .sum()
}

/// Value at `(i, j)` clamped into the face array.
fn sample(field: &FaceField, i: f64, j: f64) -> f64 {
    let (nx, ny) = field.shape();
    let ci = (i.max(0.0) as usize).min(nx.saturating_sub(1));
    let cj = (j.max(0.0) as usize).min(ny.saturating_sub(1));
    field.get(ci, cj).unwrap_or(0.0)
}
