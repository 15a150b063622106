//! drifttrack - recovery-event drifter sweeps
//!
//! The `drifttrack` command seeds drifters around recovery events, hands
//! each `(event, offset)` run to an external integrator and keeps the
//! resulting tracks in a resumable catalog.
//!
//! ## Commands
//!
//! - `sweep`: run every pending `(event, offset)` pair
//! - `plan`: list run identifiers and their catalog status
//! - `aggregate`: combine final positions of completed runs
//! - `events`: print an event catalog
//! - `init-config`: write a default configuration file

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use drift_core::metrics::METRICS;
use drift_core::obs::SweepSpan;
use drift_core::reporting::{
    render_sweep_summary_md, write_aggregate_json, write_sweep_report_json,
    write_sweep_summary_md,
};
use drift_core::telemetry::{init_tracing, LogFormat};
use drift_core::{
    plan_runs, CommandIntegrator, CurvilinearGrid, EventCatalog, ResultAggregator, RunCatalog,
    RunId, ScheduleOptions, SweepConfig, SweepReport, TimeWindowScheduler,
};
use drift_state::FsRunCatalog;

#[derive(Parser)]
#[command(name = "drifttrack")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Drifter sweeps around recovery events", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Sweep configuration file (TOML)
    #[arg(short, long, global = true, env = "DRIFTTRACK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Flags that override values from the configuration file.
#[derive(Args, Debug, Default, Clone)]
struct Overrides {
    /// Grid file (JSON)
    #[arg(long, env = "DRIFTTRACK_GRID")]
    grid: Option<PathBuf>,

    /// Output root; tracks are written under `<output>/tracks`
    #[arg(short, long, env = "DRIFTTRACK_OUTPUT")]
    output: Option<PathBuf>,

    /// Built-in event catalog version
    #[arg(long)]
    catalog: Option<String>,

    /// Custom event catalog (JSON), replaces the built-in one
    #[arg(long)]
    catalog_file: Option<PathBuf>,

    /// Restrict the sweep to these event indices (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    events: Vec<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every pending (event, offset) pair
    Sweep {
        #[command(flatten)]
        overrides: Overrides,

        /// Track the transport of each run
        #[arg(long)]
        streamline: bool,

        /// Maximum number of runs in flight
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Per-call integrator timeout in seconds (0 disables)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// List run identifiers and their catalog status
    Plan {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Combine final positions of completed runs
    Aggregate {
        #[command(flatten)]
        overrides: Overrides,

        /// Output path for the combined positions
        #[arg(long, default_value = "aggregate.json")]
        out: PathBuf,
    },

    /// Print an event catalog as JSON
    Events {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Write a default configuration file
    InitConfig {
        /// Path to write
        #[arg(default_value = "drifttrack.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(LogFormat::from_json_flag(cli.json), level);

    match cli.command {
        Commands::Sweep {
            overrides,
            streamline,
            max_concurrent,
            timeout_secs,
        } => {
            let mut config = load_config(cli.config.as_deref(), &overrides)?;
            config.streamline |= streamline;
            if let Some(n) = max_concurrent {
                config.max_concurrent = n;
            }
            if let Some(secs) = timeout_secs {
                config.timeout_secs = secs;
            }
            config.validate().context("Invalid configuration")?;
            let report = cmd_sweep(&config).await?;
            print!("{}", render_sweep_summary_md(&report));
            Ok(())
        }
        Commands::Plan { overrides } => {
            let config = load_config(cli.config.as_deref(), &overrides)?;
            for row in cmd_plan(&config).await? {
                println!("{:<10} {}", row.status, row.run_id);
            }
            Ok(())
        }
        Commands::Aggregate { overrides, out } => {
            let config = load_config(cli.config.as_deref(), &overrides)?;
            cmd_aggregate(&config, &out).await
        }
        Commands::Events { overrides } => {
            let config = load_config(cli.config.as_deref(), &overrides)?;
            cmd_events(&config)
        }
        Commands::InitConfig { path, force } => cmd_init_config(&path, force),
    }
}

/// Load the configuration file (or defaults) and apply command-line overrides.
fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<SweepConfig> {
    let mut config = match path {
        Some(path) => SweepConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => SweepConfig::default(),
    };

    if let Some(grid) = &overrides.grid {
        config.grid_path = grid.clone();
    }
    if let Some(output) = &overrides.output {
        config.output_root = output.clone();
    }
    if let Some(catalog) = &overrides.catalog {
        config.catalog = catalog.clone();
    }
    if let Some(file) = &overrides.catalog_file {
        config.catalog_file = Some(file.clone());
    }
    if !overrides.events.is_empty() {
        config.events = overrides.events.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn open_catalog(config: &SweepConfig) -> Result<Arc<FsRunCatalog>> {
    let catalog = FsRunCatalog::new(&config.output_root)
        .with_context(|| format!("Failed to open run catalog at {:?}", config.output_root))?;
    Ok(Arc::new(catalog))
}

fn load_events(config: &SweepConfig) -> Result<EventCatalog> {
    config.load_events().context("Failed to load event catalog")
}

/// Run a sweep and write `sweep_report.json` and `sweep_summary.md` under
/// the output root.
async fn cmd_sweep(config: &SweepConfig) -> Result<SweepReport> {
    if config.integrator.is_empty() {
        anyhow::bail!("No integrator command configured; set `integrator` in the config file");
    }

    let grid = CurvilinearGrid::from_json_file(&config.grid_path)
        .with_context(|| format!("Failed to load grid {:?}", config.grid_path))?;
    let events = load_events(config)?;
    let catalog = open_catalog(config)?;
    // The scheduler bounds every call; the child is killed when the call is dropped.
    let integrator = Arc::new(CommandIntegrator::new(config.integrator.clone(), 0));

    let _span = SweepSpan::enter(&events.version);
    info!(
        "Sweeping {} events from {} into {:?}",
        events.len(),
        events.version,
        catalog.tracks_dir()
    );

    let scheduler = TimeWindowScheduler::new(
        Arc::new(grid),
        catalog,
        integrator,
        ScheduleOptions::from(config),
    );
    let report = scheduler.run(&events).await.context("Sweep aborted")?;
    METRICS.flush();

    let report_path = config.output_root.join("sweep_report.json");
    write_sweep_report_json(&report_path, &report)?;
    write_sweep_summary_md(&config.output_root.join("sweep_summary.md"), &report)?;
    info!("Report written to {:?}", report_path);

    Ok(report)
}

/// One line of `drifttrack plan`.
#[derive(Debug)]
struct PlanRow {
    run_id: RunId,
    /// Catalog status, or `PENDING` for identifiers never registered.
    status: String,
}

async fn cmd_plan(config: &SweepConfig) -> Result<Vec<PlanRow>> {
    let events = load_events(config)?;
    let catalog = open_catalog(config)?;
    let planned = plan_runs(&events, &config.window).context("Failed to plan sweep")?;

    let mut rows = Vec::with_capacity(planned.len());
    for run in planned {
        let status = if catalog.exists(&run.run_id).await? {
            "COMPLETED".to_string()
        } else {
            match catalog.record(&run.run_id).await? {
                Some(record) => record.status.to_string(),
                None => "PENDING".to_string(),
            }
        };
        rows.push(PlanRow {
            run_id: run.run_id,
            status,
        });
    }
    Ok(rows)
}

/// Merge every planned run that has a track, in plan order.
async fn cmd_aggregate(config: &SweepConfig, out: &Path) -> Result<()> {
    let events = load_events(config)?;
    let catalog = open_catalog(config)?;
    let ids: Vec<RunId> = plan_runs(&events, &config.window)
        .context("Failed to plan sweep")?
        .into_iter()
        .map(|run| run.run_id)
        .collect();

    let result = ResultAggregator::new(catalog)
        .aggregate(&ids)
        .await
        .context("Failed to aggregate tracks")?;
    write_aggregate_json(out, &result)?;

    println!(
        "Merged {} drifters from {} runs ({} skipped) into {:?}",
        result.len(),
        result.runs.len(),
        result.skipped,
        out
    );
    Ok(())
}

fn cmd_events(config: &SweepConfig) -> Result<()> {
    let events = load_events(config)?;
    println!("{}", serde_json::to_string_pretty(&events)?);
    Ok(())
}

fn cmd_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{:?} already exists (use --force to overwrite)", path);
    }
    SweepConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write {:?}", path))?;
    println!("Wrote default configuration to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use drift_core::{AggregateResult, GridFile, RecoveryEvent, SeedStrategy, TimeWindow};

    /// 11 x 11 open-water grid around (-95.0, 29.0) plus a one-event catalog.
    fn workspace(dir: &Path) -> SweepConfig {
        let rows = |f: &dyn Fn(usize, usize) -> f64| -> Vec<Vec<f64>> {
            (0..11).map(|j| (0..11).map(|i| f(i, j)).collect()).collect()
        };
        let grid = GridFile {
            lon_rho: rows(&|i, _| -95.5 + 0.1 * i as f64),
            lat_rho: rows(&|_, j| 28.5 + 0.1 * j as f64),
            mask_rho: vec![vec![1; 11]; 11],
        };
        let grid_path = dir.join("grid.json");
        std::fs::write(&grid_path, serde_json::to_vec(&grid).unwrap()).unwrap();

        let events = EventCatalog::new(
            "test",
            vec![RecoveryEvent {
                index: 0,
                longitude: -95.0,
                latitude: 29.0,
                found_date: Utc.with_ymd_and_hms(2013, 5, 24, 0, 0, 0).unwrap(),
                label: "Galveston Beach".to_string(),
            }],
        )
        .unwrap();
        let events_path = dir.join("events.json");
        std::fs::write(&events_path, serde_json::to_vec(&events).unwrap()).unwrap();

        SweepConfig {
            grid_path,
            output_root: dir.join("out"),
            catalog_file: Some(events_path),
            seeding: SeedStrategy::single_point(),
            window: TimeWindow {
                window_hours: 8,
                step_hours: 4,
                ..Default::default()
            },
            integrator: vec![
                "sh".to_string(),
                "-c".to_string(),
                concat!(
                    "cat >/dev/null; echo ",
                    r#"'{"t":[0,14400],"lonp":[[-95.0,-95.1]],"latp":[[29.0,28.9]]}'"#,
                )
                .to_string(),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("drifttrack.toml");
        let toml = "grid_path = \"a.json\"\nstreamline = true\nevents = [1, 2]\n";
        std::fs::write(&path, toml).unwrap();

        let overrides = Overrides {
            grid: Some(PathBuf::from("b.json")),
            events: vec![7],
            ..Default::default()
        };
        let config = load_config(Some(&path), &overrides).unwrap();
        assert_eq!(config.grid_path, PathBuf::from("b.json"));
        assert_eq!(config.events, vec![7]);
        assert!(config.streamline);
    }

    #[test]
    fn test_unknown_catalog_rejected() {
        let overrides = Overrides {
            catalog: Some("packages-1999".to_string()),
            ..Default::default()
        };
        let err = load_config(None, &overrides).unwrap_err();
        assert!(format!("{err:#}").contains("packages-1999"), "unexpected error: {err:#}");
    }

    #[test]
    fn test_cli_parses_comma_separated_events() {
        let args = ["drifttrack", "sweep", "--events", "3,14", "--streamline"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Sweep {
                overrides,
                streamline,
                ..
            } => {
                assert_eq!(overrides.events, vec![3, 14]);
                assert!(streamline);
            }
            _ => panic!("expected sweep"),
        }
    }

    #[test]
    fn test_init_config_round_trips_and_refuses_overwrite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("drifttrack.toml");
        cmd_init_config(&path, false).unwrap();
        assert_eq!(SweepConfig::load(&path).unwrap(), SweepConfig::default());

        let err = cmd_init_config(&path, false).unwrap_err();
        assert!(format!("{err:#}").contains("already exists"));
        cmd_init_config(&path, true).unwrap();
    }

    #[tokio::test]
    async fn test_sweep_without_integrator_is_rejected() {
        let err = cmd_sweep(&SweepConfig::default()).await.unwrap_err();
        assert!(format!("{err:#}").contains("No integrator command"));
    }

    #[tokio::test]
    async fn test_sweep_plan_aggregate_lifecycle() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = workspace(temp_dir.path());

        let pending = cmd_plan(&config).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|row| row.status == "PENDING"));

        let report = cmd_sweep(&config).await.unwrap();
        assert_eq!(report.totals.completed, 2, "{:?}", report);
        assert!(config.output_root.join("sweep_report.json").exists());
        assert!(config.output_root.join("sweep_summary.md").exists());

        let done = cmd_plan(&config).await.unwrap();
        assert!(done.iter().all(|row| row.status == "COMPLETED"));

        // Resuming dispatches nothing.
        let again = cmd_sweep(&config).await.unwrap();
        assert_eq!(again.totals.skipped, 2);
        assert_eq!(again.totals.dispatched, 0);

        let out = temp_dir.path().join("aggregate.json");
        cmd_aggregate(&config, &out).await.unwrap();
        let merged: AggregateResult =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(merged.lon, vec![-95.1, -95.1]);
        assert_eq!(merged.lat, vec![28.9, 28.9]);
        assert_eq!(merged.skipped, 0);
    }
}
