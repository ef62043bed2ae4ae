use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::host::{ExitOutcome, ProcessHost};
use crate::plan::{serialize_secs, Action, ActionId, ExecuteProcess, LaunchPlan, TimerAction};
use crate::{BringupError, Result};

// ─── LaunchReport ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    TimerStarted {
        #[serde(rename = "period_secs", serialize_with = "serialize_secs")]
        period: Duration,
    },
    TimerFired {
        #[serde(rename = "period_secs", serialize_with = "serialize_secs")]
        period: Duration,
    },
    HandlerRegistered {
        target: ActionId,
    },
    HandlerFired {
        target: ActionId,
    },
    ProcessStarted {
        id: ActionId,
        name: String,
        pid: Option<u32>,
    },
    ProcessExited {
        id: ActionId,
        name: String,
        outcome: ExitOutcome,
    },
}

/// One thing that happened during a run, stamped with the time since the run
/// began.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchEvent {
    #[serde(rename = "at_secs", serialize_with = "serialize_secs")]
    pub at: Duration,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Ordered record of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchReport {
    pub started_at: DateTime<Utc>,
    pub events: Vec<LaunchEvent>,
}

impl LaunchReport {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            events: Vec::new(),
        }
    }

    /// When process `id` was spawned, relative to the start of the run.
    pub fn started(&self, id: ActionId) -> Option<Duration> {
        self.events.iter().find_map(|e| match &e.kind {
            EventKind::ProcessStarted { id: i, .. } if *i == id => Some(e.at),
            _ => None,
        })
    }

    pub fn exited(&self, id: ActionId) -> Option<(Duration, ExitOutcome)> {
        self.events.iter().find_map(|e| match &e.kind {
            EventKind::ProcessExited { id: i, outcome, .. } if *i == id => Some((e.at, *outcome)),
            _ => None,
        })
    }

    /// Index of the first event matching `pred`, for ordering checks.
    pub fn position(&self, pred: impl Fn(&EventKind) -> bool) -> Option<usize> {
        self.events.iter().position(|e| pred(&e.kind))
    }

    pub fn spawn_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::ProcessStarted { .. }))
            .count()
    }

    pub fn elapsed(&self) -> Duration {
        self.events.last().map(|e| e.at).unwrap_or_default()
    }
}

// ─── Executor ─────────────────────────────────────────────────────────────

/// Runs a [`LaunchPlan`] against a [`ProcessHost`].
///
/// Timers and process waits live in one `JoinSet`; the run ends when it is
/// empty. Exit handlers are kept in a table keyed by the watched process and
/// removed the first time they fire. Dropping the future returned by
/// [`Executor::run`] aborts pending timers and drops every child handle.
pub struct Executor<H> {
    host: H,
}

enum Completion {
    Timer(TimerAction),
    Exit {
        process: ExecuteProcess,
        outcome: Result<ExitOutcome>,
    },
}

struct Run {
    start: Instant,
    tasks: JoinSet<Completion>,
    handlers: HashMap<ActionId, Vec<Action>>,
    executed: HashSet<ActionId>,
    report: LaunchReport,
}

impl Run {
    fn record(&mut self, kind: EventKind) {
        let at = self.start.elapsed();
        self.report.events.push(LaunchEvent { at, kind });
    }
}

impl<H: ProcessHost> Executor<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    pub async fn run(&self, plan: &LaunchPlan) -> Result<LaunchReport> {
        let mut run = Run {
            start: Instant::now(),
            tasks: JoinSet::new(),
            handlers: HashMap::new(),
            executed: HashSet::new(),
            report: LaunchReport::new(),
        };

        for action in plan.actions() {
            self.dispatch(action.clone(), &mut run)?;
        }

        while let Some(joined) = run.tasks.join_next().await {
            match joined.map_err(|e| BringupError::Task(e.to_string()))? {
                Completion::Timer(timer) => {
                    debug!(period_secs = timer.period.as_secs_f64(), "timer fired");
                    run.record(EventKind::TimerFired {
                        period: timer.period,
                    });
                    for action in timer.actions {
                        self.dispatch(action, &mut run)?;
                    }
                }
                Completion::Exit { process, outcome } => {
                    let outcome = outcome?;
                    info!(process = %process.name, %outcome, "process has finished");
                    run.record(EventKind::ProcessExited {
                        id: process.id,
                        name: process.name.clone(),
                        outcome,
                    });

                    if let Some(actions) = run.handlers.remove(&process.id) {
                        info!(process = %process.name, "running on-exit actions");
                        run.record(EventKind::HandlerFired { target: process.id });
                        for action in actions {
                            self.dispatch(action, &mut run)?;
                        }
                    }
                }
            }
        }

        Ok(run.report)
    }

    fn dispatch(&self, action: Action, run: &mut Run) -> Result<()> {
        match action {
            Action::Execute(process) => {
                if !run.executed.insert(process.id) {
                    return Err(BringupError::AlreadyExecuted(process.id));
                }
                let child = self.host.spawn(&process)?;
                let pid = self.host.pid(&child);
                info!(
                    process = %process.name,
                    pid,
                    cmd = %process.command.display(),
                    "process started"
                );
                run.record(EventKind::ProcessStarted {
                    id: process.id,
                    name: process.name.clone(),
                    pid,
                });
                let wait = self.host.wait(&process, child);
                run.tasks.spawn(async move {
                    let outcome = wait.await;
                    Completion::Exit { process, outcome }
                });
            }
            Action::Timer(timer) => {
                debug!(period_secs = timer.period.as_secs_f64(), "timer started");
                run.record(EventKind::TimerStarted {
                    period: timer.period,
                });
                run.tasks.spawn(async move {
                    tokio::time::sleep(timer.period).await;
                    Completion::Timer(timer)
                });
            }
            Action::OnProcessExit(handler) => {
                debug!(target_id = %handler.target, "on-exit handler registered");
                run.record(EventKind::HandlerRegistered {
                    target: handler.target,
                });
                run.handlers
                    .entry(handler.target)
                    .or_default()
                    .extend(handler.on_exit);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bringup::{build_plan, BROADCASTER_DELAY};
    use crate::command::{CommandSpec, DIFF_DRIVE_CONTROLLER, JOINT_STATE_BROADCASTER};
    use crate::host::TokioHost;
    use crate::plan::OnProcessExit;
    use futures::future::{BoxFuture, FutureExt};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy)]
    enum Script {
        ExitAfter(Duration, i32),
        Never,
        FailSpawn,
    }

    /// Scripted process layer: each controller name maps to a behaviour, and
    /// every spawn is logged with the (tokio) time it happened.
    #[derive(Clone)]
    struct ScriptedHost {
        scripts: Vec<(&'static str, Script)>,
        spawns: Arc<Mutex<Vec<(String, Instant)>>>,
    }

    impl ScriptedHost {
        fn new(scripts: Vec<(&'static str, Script)>) -> Self {
            Self {
                scripts,
                spawns: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn script_for(&self, process: &ExecuteProcess) -> Script {
            self.scripts
                .iter()
                .find(|(key, _)| process.command.args.iter().any(|a| a == key))
                .map(|(_, s)| *s)
                .unwrap_or(Script::ExitAfter(Duration::ZERO, 0))
        }

        fn spawned(&self) -> Vec<(String, Instant)> {
            self.spawns.lock().unwrap().clone()
        }
    }

    impl ProcessHost for ScriptedHost {
        type Child = Script;

        fn spawn(&self, process: &ExecuteProcess) -> Result<Script> {
            let script = self.script_for(process);
            if let Script::FailSpawn = script {
                return Err(BringupError::Spawn {
                    name: process.name.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "ros2 not found"),
                });
            }
            let controller = process.command.args[4].clone();
            self.spawns
                .lock()
                .unwrap()
                .push((controller, Instant::now()));
            Ok(script)
        }

        fn wait(
            &self,
            _process: &ExecuteProcess,
            child: Script,
        ) -> BoxFuture<'static, Result<ExitOutcome>> {
            match child {
                Script::ExitAfter(after, code) => async move {
                    tokio::time::sleep(after).await;
                    Ok(ExitOutcome::code(code))
                }
                .boxed(),
                Script::Never | Script::FailSpawn => {
                    futures::future::pending::<Result<ExitOutcome>>().boxed()
                }
            }
        }
    }

    /// Paused-clock timers land on millisecond ticks.
    fn assert_near(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual - expected < Duration::from_millis(5),
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    fn ids() -> (ActionId, ActionId) {
        let plan = build_plan();
        let steps = plan.steps();
        (steps[0].process.id, steps[1].process.id)
    }

    #[tokio::test(start_paused = true)]
    async fn broadcaster_waits_for_delay_then_diff_drive_follows_exit() {
        let host = ScriptedHost::new(vec![
            (
                JOINT_STATE_BROADCASTER,
                Script::ExitAfter(Duration::from_secs(2), 0),
            ),
            (
                DIFF_DRIVE_CONTROLLER,
                Script::ExitAfter(Duration::from_secs(1), 0),
            ),
        ]);
        let start = Instant::now();
        let report = Executor::new(host.clone())
            .run(&build_plan())
            .await
            .unwrap();
        let (broadcaster, diff) = ids();

        let b_start = report.started(broadcaster).unwrap();
        let (b_exit, _) = report.exited(broadcaster).unwrap();
        let d_start = report.started(diff).unwrap();
        assert!(b_start >= BROADCASTER_DELAY);
        assert!(b_exit >= b_start);
        assert!(d_start >= b_exit);
        assert_near(d_start, Duration::from_secs(27));

        let exit_pos = report
            .position(|k| matches!(k, EventKind::ProcessExited { id, .. } if *id == broadcaster))
            .unwrap();
        let diff_pos = report
            .position(|k| matches!(k, EventKind::ProcessStarted { id, .. } if *id == diff))
            .unwrap();
        assert!(diff_pos > exit_pos);

        let spawned = host.spawned();
        assert_eq!(spawned.len(), 2);
        assert_eq!(spawned[0].0, JOINT_STATE_BROADCASTER);
        assert_eq!(spawned[1].0, DIFF_DRIVE_CONTROLLER);
        assert!(spawned[0].1 >= start + BROADCASTER_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn exit_status_does_not_matter() {
        for code in [0, 1] {
            let host = ScriptedHost::new(vec![(
                JOINT_STATE_BROADCASTER,
                Script::ExitAfter(Duration::from_secs(1), code),
            )]);
            let report = Executor::new(host.clone())
                .run(&build_plan())
                .await
                .unwrap();
            let (broadcaster, diff) = ids();
            assert_eq!(
                report.exited(broadcaster).map(|(_, o)| o),
                Some(ExitOutcome::code(code))
            );
            assert_near(report.started(diff).unwrap(), Duration::from_secs(26));
            assert_eq!(host.spawned().len(), 2);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn diff_drive_never_starts_if_broadcaster_hangs() {
        let host = ScriptedHost::new(vec![(JOINT_STATE_BROADCASTER, Script::Never)]);
        let executor = Executor::new(host.clone());
        let plan = build_plan();
        let outcome = tokio::time::timeout(Duration::from_secs(24 * 3600), executor.run(&plan)).await;
        assert!(outcome.is_err());

        let spawned = host.spawned();
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].0, JOINT_STATE_BROADCASTER);
    }

    #[tokio::test(start_paused = true)]
    async fn building_the_plan_has_no_side_effects() {
        let host = ScriptedHost::new(Vec::new());
        let executor = Executor::new(host.clone());
        let plan = build_plan();
        tokio::time::advance(BROADCASTER_DELAY * 2).await;
        assert!(host.spawned().is_empty());

        // A timer armed at build time would have expired during the advance
        // and spawned the broadcaster at once; here it only starts with the run.
        let report = executor.run(&plan).await.unwrap();
        let timer_starts: Vec<Duration> = report
            .events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::TimerStarted { .. }))
            .map(|e| e.at)
            .collect();
        assert_eq!(timer_starts, vec![Duration::ZERO]);
        let (broadcaster, _) = ids();
        assert_near(report.started(broadcaster).unwrap(), BROADCASTER_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_measured_from_run_start() {
        let plan = build_plan();
        tokio::time::advance(Duration::from_secs(100)).await;

        let host = ScriptedHost::new(Vec::new());
        let run_start = Instant::now();
        let report = Executor::new(host.clone()).run(&plan).await.unwrap();
        let (broadcaster, _) = ids();

        assert_near(report.started(broadcaster).unwrap(), BROADCASTER_DELAY);
        assert!(host.spawned()[0].1 >= run_start + BROADCASTER_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_failure_surfaces_and_stops_the_sequence() {
        let host = ScriptedHost::new(vec![(JOINT_STATE_BROADCASTER, Script::FailSpawn)]);
        let err = Executor::new(host.clone())
            .run(&build_plan())
            .await
            .unwrap_err();
        assert!(matches!(err, BringupError::Spawn { .. }));
        assert!(host.spawned().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn handlers_fire_once_and_in_registration_order() {
        let mut b = LaunchPlan::builder();
        let first = b.process(CommandSpec::new("ros2", ["a", "b", "c", "d", "first"]));
        let second = b.process(CommandSpec::new("ros2", ["a", "b", "c", "d", "second"]));
        let third = b.process(CommandSpec::new("ros2", ["a", "b", "c", "d", "third"]));
        let target = first.id;
        b.add_action(OnProcessExit {
            target,
            on_exit: vec![second.into()],
        })
        .add_action(OnProcessExit {
            target,
            on_exit: vec![third.into()],
        })
        .add_action(first);
        let plan = b.build();

        let host = ScriptedHost::new(Vec::new());
        let report = Executor::new(host.clone()).run(&plan).await.unwrap();

        let fired = report
            .events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::HandlerFired { .. }))
            .count();
        assert_eq!(fired, 1);
        assert_eq!(report.spawn_count(), 3);
        let order: Vec<String> = host.spawned().into_iter().map(|(c, _)| c).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn process_runs_at_most_once() {
        let mut b = LaunchPlan::builder();
        let p = b.process(CommandSpec::new("ros2", ["a", "b", "c", "d", "only"]));
        b.add_action(p.clone()).add_action(p.clone());
        let plan = b.build();

        let host = ScriptedHost::new(Vec::new());
        let err = Executor::new(host.clone()).run(&plan).await.unwrap_err();
        assert!(matches!(err, BringupError::AlreadyExecuted(id) if id == p.id));
        assert_eq!(host.spawned().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn report_serializes_events() {
        let host = ScriptedHost::new(Vec::new());
        let report = Executor::new(host).run(&build_plan()).await.unwrap();
        assert_near(report.elapsed(), BROADCASTER_DELAY);

        let json = serde_json::to_value(&report).unwrap();
        let events = json["events"].as_array().unwrap();
        assert_eq!(events[0]["event"], "timer_started");
        assert_eq!(events[0]["period_secs"], 25.0);
        assert_eq!(events[0]["at_secs"], 0.0);
        assert_eq!(events[1]["event"], "handler_registered");
        assert!(events
            .iter()
            .any(|e| e["event"] == "process_exited" && e["outcome"]["code"] == 0));
    }

    #[tokio::test]
    async fn runs_real_processes_in_order() {
        let mut b = LaunchPlan::builder();
        let first = b.process(CommandSpec::new("sh", ["-c", "exit 1"]));
        let second = b.process(CommandSpec::new("sh", ["-c", "exit 0"]));
        let first_id = first.id;
        let second_id = second.id;
        b.add_action(TimerAction {
            period: Duration::from_millis(20),
            actions: vec![first.into()],
        })
        .add_action(OnProcessExit {
            target: first_id,
            on_exit: vec![second.into()],
        });

        let report = Executor::new(TokioHost).run(&b.build()).await.unwrap();
        let (first_exit, outcome) = report.exited(first_id).unwrap();
        assert_eq!(outcome, ExitOutcome::code(1));
        assert!(report.started(first_id).unwrap() >= Duration::from_millis(20));
        assert!(report.started(second_id).unwrap() >= first_exit);
        assert_eq!(
            report.exited(second_id).map(|(_, o)| o),
            Some(ExitOutcome::code(0))
        );
    }
}
