//! Recovery events and versioned event catalogs.
//!
//! A catalog is loaded once at startup and never mutated. Historical
//! variants are named catalog versions rather than separate code paths;
//! custom catalogs load from JSON.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

/// Where and when a drifting object was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryEvent {
    pub index: usize,
    /// Decimal degrees, west negative. NaN when the location is unknown.
    #[serde(deserialize_with = "nan_if_null")]
    pub longitude: f64,
    #[serde(deserialize_with = "nan_if_null")]
    pub latitude: f64,
    pub found_date: DateTime<Utc>,
    pub label: String,
}

impl RecoveryEvent {
    pub fn has_location(&self) -> bool {
        self.longitude.is_finite() && self.latitude.is_finite()
    }
}

fn nan_if_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Names of the catalogs compiled into the binary.
pub const BUILTIN_VERSIONS: &[&str] = &[PACKAGES_2013];

const PACKAGES_2013: &str = "packages-2013";

/// An immutable, named list of recovery events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCatalog {
    pub version: String,
    pub events: Vec<RecoveryEvent>,
}

impl EventCatalog {
    /// Build a catalog, checking that event indices are unique.
    pub fn new(
        version: impl Into<String>,
        events: Vec<RecoveryEvent>,
    ) -> Result<Self, ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for event in &events {
            if !seen.insert(event.index) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate event index {}",
                    event.index
                )));
            }
        }
        Ok(Self {
            version: version.into(),
            events,
        })
    }

    /// One of the [`BUILTIN_VERSIONS`].
    pub fn builtin(version: &str) -> Result<Self, ConfigError> {
        match version {
            PACKAGES_2013 => Self::new(PACKAGES_2013, packages_2013()?),
            other => Err(ConfigError::UnknownCatalog(other.to_string())),
        }
    }

    /// Load a catalog document (`{"version": .., "events": [..]}`).
    ///
    /// Unknown coordinates may be written as `null`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)?;
        let catalog: EventCatalog = serde_json::from_slice(&bytes)?;
        Self::new(catalog.version, catalog.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RecoveryEvent> {
        self.events.iter().find(|e| e.index == index)
    }
}

type Dms = (f64, f64, f64);

fn degrees((d, m, s): Dms) -> f64 {
    d + m / 60.0 + s / 3600.0
}

struct Record {
    label: &'static str,
    /// North latitude.
    lat: Option<Dms>,
    /// West longitude.
    lon: Option<Dms>,
    date: (i32, u32, u32),
}

const fn at(label: &'static str, lat: Dms, lon: Dms, date: (i32, u32, u32)) -> Record {
    Record {
        label,
        lat: Some(lat),
        lon: Some(lon),
        date,
    }
}

const fn unknown(label: &'static str, date: (i32, u32, u32)) -> Record {
    Record {
        label,
        lat: None,
        lon: None,
        date,
    }
}

const MATAGORDA: (Dms, Dms) = ((28.0, 10.0, 8.03), (96.0, 44.0, 19.30));
const PADRE_NS: (Dms, Dms) = ((27.0, 25.0, 26.96), (97.0, 17.0, 57.06));
const MUSTANG: (Dms, Dms) = ((27.0, 44.0, 21.98), (97.0, 7.0, 54.01));
const GALVESTON: (Dms, Dms) = ((29.0, 16.0, 16.79), (94.0, 49.0, 25.87));
const CRYSTAL: (Dms, Dms) = ((29.0, 27.0, 25.82), (94.0, 38.0, 22.71));
const MCFADDIN: (Dms, Dms) = ((29.0, 39.0, 24.04), (94.0, 6.0, 20.05));
const TEXAS_POINT: (Dms, Dms) = ((29.0, 41.0, 3.88), (93.0, 51.0, 2.66));
const SEA_RIM: (Dms, Dms) = ((29.0, 41.0, 12.84), (94.0, 2.0, 38.40));
const CAMERON: (Dms, Dms) = ((29.0, 47.0, 51.80), (93.0, 19.0, 30.16));

/// Packages recovered along the northern Gulf coast, January-June 2013.
const PACKAGES_2013_RECORDS: [Record; 40] = [
    at("Matagorda Island, TX", MATAGORDA.0, MATAGORDA.1, (2013, 1, 11)),
    at("Padre Island National Seashore, TX", PADRE_NS.0, PADRE_NS.1, (2013, 1, 16)),
    at("Matagorda Island, TX", MATAGORDA.0, MATAGORDA.1, (2013, 1, 18)),
    unknown("In Gulf of Mexico", (2013, 1, 25)),
    at("Mustang Island, TX", MUSTANG.0, MUSTANG.1, (2013, 1, 29)),
    at("Padre Island National Seashore, TX", PADRE_NS.0, PADRE_NS.1, (2013, 2, 10)),
    at("South Padre Island, TX", (26.0, 6.0, 42.62), (97.0, 10.0, 5.25), (2013, 4, 10)),
    at("Padre Island National Seashore, TX", PADRE_NS.0, PADRE_NS.1, (2013, 4, 13)),
    at("Padre Island National Seashore, TX", PADRE_NS.0, PADRE_NS.1, (2013, 4, 23)),
    at("Mustang Island, TX", MUSTANG.0, MUSTANG.1, (2013, 4, 30)),
    at("Padre Island National Seashore, TX", PADRE_NS.0, PADRE_NS.1, (2013, 5, 7)),
    at("Padre Island National Seashore, TX", PADRE_NS.0, PADRE_NS.1, (2013, 5, 7)),
    at("Ship Island, MS", (30.0, 12.0, 40.09), (88.0, 57.0, 50.85), (2013, 5, 12)),
    unknown("Gilchrist Beach, TX", (2013, 5, 19)),
    at("Galveston Beach, Galveston, TX", GALVESTON.0, GALVESTON.1, (2013, 5, 24)),
    at("Galveston Beach, Galveston, TX", GALVESTON.0, GALVESTON.1, (2013, 5, 26)),
    at("Crystal Beach, TX", CRYSTAL.0, CRYSTAL.1, (2013, 5, 26)),
    at("Mud Lake, TX", (29.0, 32.0, 33.32), (95.0, 0.0, 56.82), (2013, 5, 28)),
    at("Galveston Beach, Galveston, TX", GALVESTON.0, GALVESTON.1, (2013, 5, 29)),
    at("High Island, TX", (29.0, 34.0, 0.83), (94.0, 23.0, 36.68), (2013, 5, 29)),
    at("Galveston Seawall, Galveston, TX", (29.0, 18.0, 8.85), (94.0, 46.0, 27.70), (2013, 5, 30)),
    at("Crystal Beach, TX", CRYSTAL.0, CRYSTAL.1, (2013, 6, 2)),
    at("McFadden Beach, TX", MCFADDIN.0, MCFADDIN.1, (2013, 6, 2)),
    at("Sabine Pass Jetties, TX", (29.0, 41.0, 40.00), (93.0, 51.0, 9.07), (2013, 6, 3)),
    at("Padre Island, TX", (27.0, 15.0, 49.24), (97.0, 21.0, 49.13), (2013, 6, 3)),
    at("McFaddin Beach, Sabine Pass, TX", MCFADDIN.0, MCFADDIN.1, (2013, 6, 7)),
    at("McFaddin Beach, Sabine Pass, TX", MCFADDIN.0, MCFADDIN.1, (2013, 6, 7)),
    at("Galveston Beach, Galveston, TX", GALVESTON.0, GALVESTON.1, (2013, 6, 7)),
    at("Texas Point, Sabine Pass, TX", TEXAS_POINT.0, TEXAS_POINT.1, (2013, 6, 9)),
    at("Texas Point, Sabine Pass, TX", TEXAS_POINT.0, TEXAS_POINT.1, (2013, 6, 9)),
    at("Sabine Pass, TX", TEXAS_POINT.0, TEXAS_POINT.1, (2013, 6, 10)),
    at("Sabine Pass, TX", TEXAS_POINT.0, TEXAS_POINT.1, (2013, 6, 10)),
    at("Sea Rim State Park, Sabine Pass, TX", SEA_RIM.0, SEA_RIM.1, (2013, 6, 10)),
    at("Sea Rim State Park, Sabine Pass, TX", SEA_RIM.0, SEA_RIM.1, (2013, 6, 10)),
    at("Pirates Beach, Galveston, TX", (29.0, 12.0, 15.35), (94.0, 56.0, 10.69), (2013, 6, 11)),
    at("Bolivar Peninsula, TX", (29.0, 28.0, 41.84), (94.0, 34.0, 47.69), (2013, 6, 11)),
    unknown("GOM, 3 miles south of Destin, FL", (2013, 6, 12)),
    at("Cameron, LA", CAMERON.0, CAMERON.1, (2013, 6, 13)),
    at("Cameron, LA", CAMERON.0, CAMERON.1, (2013, 6, 13)),
    at("Cameron, LA", CAMERON.0, CAMERON.1, (2013, 6, 13)),
];

fn packages_2013() -> Result<Vec<RecoveryEvent>, ConfigError> {
    PACKAGES_2013_RECORDS
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let (y, m, d) = record.date;
            let found_date = Utc
                .with_ymd_and_hms(y, m, d, 0, 0, 0)
                .single()
                .ok_or_else(|| ConfigError::Invalid(format!("bad date for event {index}")))?;
            Ok(RecoveryEvent {
                index,
                longitude: record.lon.map_or(f64::NAN, |lon| -degrees(lon)),
                latitude: record.lat.map_or(f64::NAN, degrees),
                found_date,
                label: record.label.to_string(),
            })
        })
        .collect()
}
