use crate::output::{print_json, print_table};
use bringup_core::{build_plan, LaunchPlan, Trigger};

pub fn run(json: bool) -> anyhow::Result<()> {
    let plan = build_plan();

    if json {
        return print_json(&plan);
    }

    let rows = plan
        .steps()
        .iter()
        .map(|step| {
            vec![
                step.process.name.clone(),
                trigger_label(&plan, step.trigger),
                step.process.command.output.as_str().to_string(),
                step.process.command.display(),
            ]
        })
        .collect();
    print_table(&["PROCESS", "TRIGGER", "OUTPUT", "COMMAND"], rows);
    Ok(())
}

/// Like `Trigger`'s Display, but names the watched process.
pub(crate) fn trigger_label(plan: &LaunchPlan, trigger: Trigger) -> String {
    match trigger {
        Trigger::ExitOf(id) => plan
            .process(id)
            .map(|p| format!("on exit of {}", p.name))
            .unwrap_or_else(|| trigger.to_string()),
        other => other.to_string(),
    }
}
