//! Simulation requests handed to the trajectory integrator.

use chrono::{DateTime, Duration, Utc};
use drift_state::{content_digest, RunId};
use serde::{Deserialize, Serialize};

use crate::event::RecoveryEvent;
use crate::mask::SeedPoint;
use crate::transport::TransportState;

/// Direction of integration in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    /// Track drifters back from where they were found.
    #[default]
    Backward,
}

impl Direction {
    /// Integrator time sign: `1` forward, `-1` backward.
    pub fn ff(self) -> i8 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

/// Turbulence/diffusion scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Turbulence {
    #[default]
    None,
    /// Parameterized turbulence.
    Parameterized,
    /// Diffusion on a circle.
    CircleDiffusion,
    /// Anisotropic diffusion on an ellipse.
    EllipseDiffusion,
}

impl Turbulence {
    /// Integer flag understood by tracmass-style integrators.
    pub fn flag(self) -> u8 {
        match self {
            Turbulence::None => 0,
            Turbulence::Parameterized => 1,
            Turbulence::CircleDiffusion => 2,
            Turbulence::EllipseDiffusion => 3,
        }
    }
}

/// How the initial drifter depth is chosen; `zpar` qualifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalPlacement {
    /// Terrain-following level `zpar`.
    #[default]
    S,
    /// Constant depth `zpar` (negative, meters).
    Z,
    /// Density surface `zpar`.
    Rho,
    Salt,
    Temp,
    /// Depths below mean sea level.
    #[serde(rename = "fromMSL")]
    FromMsl,
}

/// Parameters passed through to the integrator unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorParams {
    /// Steps between model outputs.
    pub nsteps: u32,
    /// Days to track.
    pub ndays: f64,
    /// Seconds between model outputs.
    pub tseas: f64,
    /// Horizontal diffusivity, m^2/s.
    pub ah: f64,
    /// Vertical diffusivity, m^2/s.
    pub av: f64,
    pub do3d: bool,
    pub doturb: Turbulence,
    pub z0: VerticalPlacement,
    pub zpar: f64,
}

impl Default for IntegratorParams {
    fn default() -> Self {
        Self {
            nsteps: 5,
            ndays: 1.0,
            tseas: 4.0 * 3600.0,
            ah: 5.0,
            av: 1e-5,
            do3d: false,
            doturb: Turbulence::None,
            z0: VerticalPlacement::S,
            zpar: 29.0,
        }
    }
}

/// One `(event, offset)` simulation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRequest {
    pub run_id: RunId,
    pub event: RecoveryEvent,
    pub offset_hours: i64,
    pub start: DateTime<Utc>,
    pub direction: Direction,
    pub seeds: Vec<SeedPoint>,
    pub params: IntegratorParams,
    /// Present only in streamline mode.
    pub transport: Option<TransportState>,
}

impl RunRequest {
    /// Simulation start date for an offset from the found date.
    pub fn start_date(event: &RecoveryEvent, offset_hours: i64) -> DateTime<Utc> {
        event.found_date + Duration::hours(offset_hours)
    }

    pub fn ndrifters(&self) -> usize {
        self.seeds.len()
    }

    pub fn streamline(&self) -> bool {
        self.transport.is_some()
    }

    /// SHA-256 of the request's JSON form.
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        Ok(content_digest(&serde_json::to_vec(self)?))
    }
}
