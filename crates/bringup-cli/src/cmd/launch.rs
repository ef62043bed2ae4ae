use std::collections::BTreeSet;

use anyhow::Context;
use bringup_core::{build_plan, EventKind, Executor, LaunchPlan, LaunchReport, TokioHost};
use tracing::warn;

use crate::output::{print_json, print_table};

pub fn run(json: bool) -> anyhow::Result<()> {
    let plan = build_plan();
    warn_missing_programs(&plan);

    let rt = tokio::runtime::Runtime::new()?;
    let executor = Executor::new(TokioHost);

    let report = rt
        .block_on(async {
            tokio::select! {
                res = executor.run(&plan) => res.map(Some),
                _ = tokio::signal::ctrl_c() => {
                    warn!("interrupted, stopping launched processes");
                    Ok(None)
                }
            }
        })
        .context("controller bringup failed")?;

    // Interrupted: children are killed when the runtime drops their handles.
    let Some(report) = report else {
        return Ok(());
    };

    if json {
        print_json(&report)
    } else {
        print_report(&report);
        Ok(())
    }
}

/// Spawning still goes ahead; the OS error is what gets reported if it fails.
fn warn_missing_programs(plan: &LaunchPlan) {
    let programs: BTreeSet<&str> = plan
        .processes()
        .into_iter()
        .map(|p| p.command.program.as_str())
        .collect();
    for program in programs {
        if which::which(program).is_err() {
            warn!(program, "executable not found on PATH");
        }
    }
}

fn print_report(report: &LaunchReport) {
    let rows = report
        .events
        .iter()
        .map(|e| {
            let (event, detail) = event_columns(&e.kind);
            vec![format!("{:.3}s", e.at.as_secs_f64()), event, detail]
        })
        .collect();
    println!(
        "Bringup started {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    print_table(&["AT", "EVENT", "DETAIL"], rows);
}

fn event_columns(kind: &EventKind) -> (String, String) {
    match kind {
        EventKind::TimerStarted { period } => (
            "timer started".into(),
            format!("{:.1}s", period.as_secs_f64()),
        ),
        EventKind::TimerFired { period } => (
            "timer fired".into(),
            format!("{:.1}s", period.as_secs_f64()),
        ),
        EventKind::HandlerRegistered { target } => {
            ("on-exit registered".into(), format!("watching {target}"))
        }
        EventKind::HandlerFired { target } => ("on-exit fired".into(), format!("{target} exited")),
        EventKind::ProcessStarted { name, pid, .. } => (
            "started".into(),
            match pid {
                Some(pid) => format!("{name} (pid {pid})"),
                None => name.clone(),
            },
        ),
        EventKind::ProcessExited { name, outcome, .. } => {
            ("exited".into(), format!("{name} ({outcome})"))
        }
    }
}
