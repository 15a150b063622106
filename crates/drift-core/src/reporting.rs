use anyhow::{Context, Result};
use std::path::Path;

use crate::aggregate::AggregateResult;
use crate::scheduler::{OffsetStatus, SweepReport};

/// Write the sweep report in pretty JSON format.
pub fn write_sweep_report_json(path: &Path, report: &SweepReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize sweep report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Write combined final positions in pretty JSON format.
pub fn write_aggregate_json(path: &Path, result: &AggregateResult) -> Result<()> {
    let content = serde_json::to_string_pretty(result).context("serialize aggregate")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Render a markdown summary of a sweep.
pub fn render_sweep_summary_md(report: &SweepReport) -> String {
    let t = &report.totals;
    let mut out = String::new();
    out.push_str("# Sweep Summary\n\n");
    out.push_str(&format!("- catalog: {}\n", report.catalog));
    out.push_str(&format!("- completed: {}\n", t.completed));
    out.push_str(&format!("- skipped: {}\n", t.skipped));
    out.push_str(&format!("- failed: {}\n", t.failed));
    out.push_str(&format!("- dispatched: {}\n", t.dispatched));
    out.push_str(&format!(
        "- seeds dropped: {} of {}\n",
        t.seeds_dropped, t.candidates
    ));

    let failed: Vec<_> = report
        .outcomes()
        .filter(|o| o.status == OffsetStatus::Failed)
        .collect();
    if !failed.is_empty() {
        out.push_str("\n## Failed Runs\n");
        for o in failed {
            out.push_str(&format!(
                "- `{}`: {}\n",
                o.run_id,
                o.detail.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    let flagged: Vec<_> = report.outcomes().filter(|o| o.transport_flagged).collect();
    if !flagged.is_empty() {
        out.push_str("\n## Transport Flagged For Review\n");
        for o in flagged {
            out.push_str(&format!("- `{}`\n", o.run_id));
        }
    }
    out
}

/// Write the markdown summary.
pub fn write_sweep_summary_md(path: &Path, report: &SweepReport) -> Result<()> {
    let md = render_sweep_summary_md(report);
    std::fs::write(path, md).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{EventPhase, EventReport, OffsetOutcome, SweepTotals};
    use chrono::{TimeZone, Utc};
    use drift_state::RunId;

    fn outcome(offset: i64, status: OffsetStatus, detail: Option<&str>) -> OffsetOutcome {
        let found = Utc.with_ymd_and_hms(2013, 5, 19, 0, 0, 0).unwrap();
        OffsetOutcome {
            event_index: 13,
            offset_hours: offset,
            start: found,
            run_id: RunId::build(13, found, offset, "Gilchrist Beach, TX"),
            status,
            candidates: 900,
            dropped: 900,
            dispatched: false,
            transport_flagged: false,
            detail: detail.map(str::to_string),
            phases: vec![EventPhase::NotStarted, EventPhase::Scheduling, EventPhase::Done],
        }
    }

    const ALL_ON_LAND: &str = "all 900 candidate seed points are on land or outside the grid";

    fn report() -> SweepReport {
        SweepReport {
            catalog: "packages-2013".to_string(),
            events: vec![EventReport {
                event_index: 13,
                label: "Gilchrist Beach, TX".to_string(),
                outcomes: vec![
                    outcome(0, OffsetStatus::Failed, Some(ALL_ON_LAND)),
                    outcome(-4, OffsetStatus::Skipped, None),
                ],
            }],
            totals: SweepTotals {
                completed: 0,
                skipped: 1,
                failed: 1,
                dispatched: 0,
                candidates: 1800,
                seeds_dropped: 1800,
            },
            duration_ms: 5,
        }
    }

    #[test]
    fn sweep_summary_markdown_render_is_stable() {
        let actual = render_sweep_summary_md(&report());
        let expected = "# Sweep Summary\n\n\
            - catalog: packages-2013\n\
            - completed: 0\n\
            - skipped: 1\n\
            - failed: 1\n\
            - dispatched: 0\n\
            - seeds dropped: 1800 of 1800\n\n\
            ## Failed Runs\n\
            - `20130519T00_e13_o+000h_gilchrist-beach-tx`: \
            all 900 candidate seed points are on land or outside the grid\n";
        assert_eq!(actual, expected);
    }

    #[test]
    fn sweep_report_json_has_expected_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_sweep_report_json(&path, &report()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["totals"]["failed"], serde_json::json!(1));
        assert_eq!(raw["events"][0]["outcomes"][1]["status"], serde_json::json!("skipped"));
        assert_eq!(raw["events"][0]["outcomes"][0]["phases"][2], serde_json::json!("done"));
    }

    #[test]
    fn aggregate_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aggregate.json");
        let result = AggregateResult {
            lon: vec![-94.1],
            lat: vec![29.2],
            ..Default::default()
        };
        write_aggregate_json(&path, &result).unwrap();
        let back: AggregateResult =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, result);
    }
}
