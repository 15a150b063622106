//! The trajectory integrator seam.
//!
//! The integrator itself is an external collaborator. [`CommandIntegrator`]
//! drives one as a child process: the request goes in as JSON on stdin, the
//! result comes back as JSON on stdout.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use drift_state::{TrackArtifact, ARTIFACT_SCHEMA_VERSION};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::IntegrationError;
use crate::request::RunRequest;
use crate::transport::{FluxSnapshot, TransportAccumulator, TransportState};

/// Face-crossing counts reported by an out-of-process integrator, flat
/// `[j * nx + i]` over the u- and v-faces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Crossings {
    pub u: Vec<f64>,
    pub v: Vec<f64>,
}

/// Per-drifter series returned by the integrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackOutput {
    /// Output times, seconds since the run's start date.
    pub t: Vec<f64>,
    pub lonp: Vec<Vec<f64>>,
    pub latp: Vec<Vec<f64>>,
    #[serde(default)]
    pub zp: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crossings: Option<Crossings>,
}

impl TrackOutput {
    /// Wrap the output as the run's artifact.
    pub fn into_artifact(
        self,
        request: &RunRequest,
        transport: Option<TransportState>,
    ) -> Result<TrackArtifact, IntegrationError> {
        if self.lonp.len() != request.ndrifters() {
            return Err(IntegrationError::Malformed(format!(
                "{} drifters requested, {} returned",
                request.ndrifters(),
                self.lonp.len()
            )));
        }
        let request_digest = request
            .digest()
            .map_err(|e| IntegrationError::Malformed(e.to_string()))?;

        let artifact = TrackArtifact {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            run_id: request.run_id.clone(),
            request_digest,
            ndrifters: request.ndrifters(),
            t: self.t,
            lonp: self.lonp,
            latp: self.latp,
            zp: self.zp,
            transport: transport.map(Into::into),
            written_at: Utc::now(),
        };
        artifact.validate().map_err(IntegrationError::Malformed)?;
        Ok(artifact)
    }
}

/// Trajectory integrator.
#[async_trait]
pub trait Integrator: Send + Sync {
    /// Face fluxes at the first model step of `request`, for streamline
    /// mode.
    async fn initial_flux(&self, request: &RunRequest) -> Result<FluxSnapshot, IntegrationError>;

    /// Run the request. In streamline mode `transport` receives the face
    /// crossings.
    async fn integrate(
        &self,
        request: &RunRequest,
        transport: Option<&mut TransportAccumulator>,
    ) -> Result<TrackOutput, IntegrationError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum Operation {
    InitialFlux,
    Integrate,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    op: Operation,
    request: &'a RunRequest,
}

/// Runs an external program per call.
#[derive(Debug, Clone)]
pub struct CommandIntegrator {
    command: Vec<String>,
    timeout_secs: u64,
}

impl CommandIntegrator {
    /// `command[0]` is the executable. `timeout_secs == 0` disables the
    /// timeout.
    pub fn new(command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            command,
            timeout_secs,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        op: Operation,
        request: &RunRequest,
    ) -> Result<T, IntegrationError> {
        let Some((exe, args)) = self.command.split_first() else {
            return Err(IntegrationError::Failed("integrator command is empty".to_string()));
        };
        let payload = serde_json::to_vec(&Envelope { op, request })
            .map_err(|e| IntegrationError::Malformed(e.to_string()))?;

        let start = Instant::now();
        let mut child = Command::new(exe)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| IntegrationError::Failed("integrator stdin unavailable".to_string()))?;

        let write = async move {
            let result = stdin.write_all(&payload).await;
            drop(stdin);
            match result {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            }
        };
        let run = async {
            let (written, output) = tokio::join!(write, child.wait_with_output());
            written?;
            output
        };

        let output = if self.timeout_secs > 0 {
            tokio::time::timeout(Duration::from_secs(self.timeout_secs), run)
                .await
                .map_err(|_| IntegrationError::TimedOut(self.timeout_secs))??
        } else {
            run.await?
        };

        debug!(
            run_id = %request.run_id,
            duration_ms = start.elapsed().as_millis() as u64,
            exit_code = output.status.code().unwrap_or(-1),
            "integrator exited"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IntegrationError::Failed(format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|e| IntegrationError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl Integrator for CommandIntegrator {
    async fn initial_flux(&self, request: &RunRequest) -> Result<FluxSnapshot, IntegrationError> {
        self.call(Operation::InitialFlux, request).await
    }

    async fn integrate(
        &self,
        request: &RunRequest,
        transport: Option<&mut TransportAccumulator>,
    ) -> Result<TrackOutput, IntegrationError> {
        let output: TrackOutput = self.call(Operation::Integrate, request).await?;
        if let (Some(acc), Some(crossings)) = (transport, output.crossings.as_ref()) {
            apply_crossings(acc, crossings)?;
        }
        Ok(output)
    }
}

/// Add reported crossing counts to the accumulator.
pub fn apply_crossings(
    acc: &mut TransportAccumulator,
    crossings: &Crossings,
) -> Result<(), IntegrationError> {
    let (ux, uy) = acc.state().u.shape();
    let (vx, vy) = acc.state().v.shape();
    if crossings.u.len() != ux * uy || crossings.v.len() != vx * vy {
        return Err(IntegrationError::Malformed(format!(
            "crossings have {} u and {} v values, faces are {ux}x{uy} and {vx}x{vy}",
            crossings.u.len(),
            crossings.v.len()
        )));
    }
    for (k, &n) in crossings.u.iter().enumerate() {
        if n != 0.0 {
            acc.add_u(k % ux, k / ux, n);
        }
    }
    for (k, &n) in crossings.v.iter().enumerate() {
        if n != 0.0 {
            acc.add_v(k % vx, k / vx, n);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RecoveryEvent;
    use crate::grid::FaceField;
    use crate::mask::SeedPoint;
    use crate::request::{Direction, IntegratorParams};
    use chrono::TimeZone;
    use drift_state::RunId;

    fn request(n: usize) -> RunRequest {
        let event = RecoveryEvent {
            index: 0,
            longitude: -96.7,
            latitude: 28.2,
            found_date: Utc.with_ymd_and_hms(2013, 1, 11, 0, 0, 0).unwrap(),
            label: "Matagorda Island, TX".to_string(),
        };
        RunRequest {
            run_id: RunId::build(0, event.found_date, 0, &event.label),
            start: event.found_date,
            event,
            offset_hours: 0,
            direction: Direction::Backward,
            seeds: vec![
                SeedPoint {
                    lon: -96.7,
                    lat: 28.2,
                    i: 1.0,
                    j: 1.0,
                    valid: true,
                };
                n
            ],
            params: IntegratorParams::default(),
            transport: None,
        }
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn artifact_rejects_drifter_mismatch() {
        let output = TrackOutput {
            t: vec![0.0],
            lonp: vec![vec![-96.7]],
            latp: vec![vec![28.2]],
            ..Default::default()
        };
        assert!(matches!(
            output.into_artifact(&request(2), None),
            Err(IntegrationError::Malformed(_))
        ));
    }

    #[test]
    fn artifact_carries_digest() {
        let output = TrackOutput {
            t: vec![0.0, 14400.0],
            lonp: vec![vec![-96.7, -96.8]],
            latp: vec![vec![28.2, 28.1]],
            ..Default::default()
        };
        let req = request(1);
        let artifact = output.into_artifact(&req, None).unwrap();
        assert_eq!(artifact.request_digest, req.digest().unwrap());
        assert_eq!(artifact.final_positions(), vec![(-96.8, 28.1)]);
    }

    #[test]
    fn artifact_times_stay_relative_to_start() {
        let output = TrackOutput {
            t: vec![0.0, -14400.0, -28800.0],
            lonp: vec![vec![-96.7, -96.8, -96.9]],
            latp: vec![vec![28.2, 28.1, 28.0]],
            ..Default::default()
        };
        let artifact = output.into_artifact(&request(1), None).unwrap();
        assert_eq!(artifact.t, vec![0.0, -14400.0, -28800.0]);
    }

    #[tokio::test]
    async fn command_output_is_parsed() {
        let integrator = CommandIntegrator::new(
            sh(r#"cat > /dev/null; echo '{"t":[0.0],"lonp":[[-96.7]],"latp":[[28.2]]}'"#),
            30,
        );
        let output = integrator.integrate(&request(1), None).await.unwrap();
        assert_eq!(output.lonp, vec![vec![-96.7]]);
        assert!(output.zp.is_empty());
    }

    #[tokio::test]
    async fn request_reaches_stdin() {
        let integrator = CommandIntegrator::new(
            sh(r#"grep -q '"op":"integrate"' && echo '{"t":[],"lonp":[],"latp":[]}'"#),
            30,
        );
        assert!(integrator.integrate(&request(1), None).await.is_ok());
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let integrator = CommandIntegrator::new(sh("cat > /dev/null; echo boom >&2; exit 3"), 30);
        match integrator.integrate(&request(1), None).await {
            Err(IntegrationError::Failed(msg)) => assert!(msg.contains("boom")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_output_is_malformed() {
        let integrator = CommandIntegrator::new(sh("cat > /dev/null; echo not-json"), 30);
        assert!(matches!(
            integrator.integrate(&request(1), None).await,
            Err(IntegrationError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn hung_integrator_times_out() {
        let integrator = CommandIntegrator::new(sh("sleep 10"), 1);
        assert!(matches!(
            integrator.integrate(&request(1), None).await,
            Err(IntegrationError::TimedOut(1))
        ));
    }

    #[tokio::test]
    async fn empty_command_fails() {
        let integrator = CommandIntegrator::new(Vec::new(), 0);
        assert!(integrator.initial_flux(&request(1)).await.is_err());
    }

    #[test]
    fn crossings_are_scaled_by_t0() {
        let state = TransportState {
            t0: 2.5,
            u: FaceField::zeros((2, 2)),
            v: FaceField::zeros((3, 1)),
            needs_review: false,
            ndrifters: 4,
        };
        let mut acc = TransportAccumulator::new(state);
        let crossings = Crossings {
            u: vec![0.0, 1.0, 0.0, 2.0],
            v: vec![0.0, 0.0, -1.0],
        };
        apply_crossings(&mut acc, &crossings).unwrap();
        assert_eq!(acc.state().u.get(1, 0), Some(2.5));
        assert_eq!(acc.state().u.get(1, 1), Some(5.0));
        assert_eq!(acc.state().v.get(2, 0), Some(-2.5));

        let bad = Crossings {
            u: vec![1.0],
            v: Vec::new(),
        };
        assert!(apply_crossings(&mut acc, &bad).is_err());
    }
}
