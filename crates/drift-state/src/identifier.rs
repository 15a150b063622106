//! Deterministic run identifiers.
//!
//! A run identifier names one `(event, time offset)` simulation and the
//! artifact it produces. Layout:
//!
//! ```text
//! 20130524T00_e14_o-004h_galveston-beach-galveston-tx
//! ^date       ^event ^offset ^label
//! ```
//!
//! Components are joined by [`SEPARATOR`], which never occurs inside a
//! component, so distinct inputs cannot collapse onto one identifier unless
//! their sanitized labels coincide for the same event index.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Separator between identifier components.
pub const SEPARATOR: char = '_';

const MAX_LEN: usize = 200;

/// Identifier of one run and its artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

impl RunId {
    /// Build the identifier for `event_index` found at `found`, shifted by
    /// `offset_hours`, labelled `label`.
    pub fn build(
        event_index: usize,
        found: DateTime<Utc>,
        offset_hours: i64,
        label: &str,
    ) -> Self {
        let sign = if offset_hours < 0 { '-' } else { '+' };
        RunId(format!(
            "{date}{sep}e{event_index:02}{sep}o{sign}{hours:03}h{sep}{label}",
            date = found.format("%Y%m%dT%H"),
            sep = SEPARATOR,
            hours = offset_hours.unsigned_abs(),
            label = sanitize_label(label),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Artifact file name for this run.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl TryFrom<String> for RunId {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '.');
        if s.is_empty() || s.len() > MAX_LEN || s.starts_with('.') || !s.chars().all(allowed) {
            return Err(StorageError::InvalidRunId(s));
        }
        Ok(RunId(s))
    }
}

impl TryFrom<&str> for RunId {
    type Error = StorageError;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        RunId::try_from(s.to_string())
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduce a free-form label to lowercase ASCII alphanumerics joined by `-`.
///
/// Every run of other characters (spaces, commas, separators, non-ASCII)
/// collapses to one dash; leading and trailing dashes are dropped.
pub fn sanitize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut pending_dash = false;
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        out.push_str("unlabeled");
    }
    out
}
