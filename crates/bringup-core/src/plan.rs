//! Declarative launch plans.
//!
//! A [`LaunchPlan`] is a description only: building one never spawns a
//! process or starts a timer. The [`crate::executor::Executor`] is the sole
//! place where a plan turns into side effects.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::command::CommandSpec;

// ---------------------------------------------------------------------------
// ActionId
// ---------------------------------------------------------------------------

/// Identifies a process action within one plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ActionId(u32);

impl ActionId {
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Run an external command once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecuteProcess {
    pub id: ActionId,
    /// `<program>-<id>`, used in logs and reports.
    pub name: String,
    pub command: CommandSpec,
}

/// Run `actions` once, `period` after the timer is started.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerAction {
    #[serde(rename = "period_secs", serialize_with = "serialize_secs")]
    pub period: Duration,
    pub actions: Vec<Action>,
}

/// Run `on_exit` once, when the process `target` terminates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnProcessExit {
    pub target: ActionId,
    pub on_exit: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Execute(ExecuteProcess),
    Timer(TimerAction),
    OnProcessExit(OnProcessExit),
}

impl From<ExecuteProcess> for Action {
    fn from(p: ExecuteProcess) -> Self {
        Action::Execute(p)
    }
}

impl From<TimerAction> for Action {
    fn from(t: TimerAction) -> Self {
        Action::Timer(t)
    }
}

impl From<OnProcessExit> for Action {
    fn from(h: OnProcessExit) -> Self {
        Action::OnProcessExit(h)
    }
}

pub(crate) fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

// ---------------------------------------------------------------------------
// Trigger / PlanStep
// ---------------------------------------------------------------------------

/// What causes a process action to run, as seen from its enclosing action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Start,
    Delay(Duration),
    ExitOf(ActionId),
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Start => write!(f, "at start"),
            Trigger::Delay(d) => write!(f, "after {:.1}s", d.as_secs_f64()),
            Trigger::ExitOf(id) => write!(f, "on exit of {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlanStep<'a> {
    pub trigger: Trigger,
    pub process: &'a ExecuteProcess,
}

// ---------------------------------------------------------------------------
// LaunchPlan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchPlan {
    actions: Vec<Action>,
}

impl LaunchPlan {
    pub fn builder() -> PlanBuilder {
        PlanBuilder::default()
    }

    /// Top-level actions, in the order the executor dispatches them.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Every timer in the plan, nested ones included.
    pub fn timers(&self) -> Vec<&TimerAction> {
        let mut out = Vec::new();
        walk(&self.actions, &mut |a| {
            if let Action::Timer(t) = a {
                out.push(t);
            }
        });
        out
    }

    /// Every exit-triggered registration in the plan, nested ones included.
    pub fn exit_handlers(&self) -> Vec<&OnProcessExit> {
        let mut out = Vec::new();
        walk(&self.actions, &mut |a| {
            if let Action::OnProcessExit(h) = a {
                out.push(h);
            }
        });
        out
    }

    pub fn processes(&self) -> Vec<&ExecuteProcess> {
        self.steps().into_iter().map(|s| s.process).collect()
    }

    pub fn process(&self, id: ActionId) -> Option<&ExecuteProcess> {
        self.processes().into_iter().find(|p| p.id == id)
    }

    /// Each process action paired with its immediate trigger, in plan order.
    pub fn steps(&self) -> Vec<PlanStep<'_>> {
        let mut out = Vec::new();
        collect_steps(&self.actions, Trigger::Start, &mut out);
        out
    }
}

fn walk<'a>(actions: &'a [Action], f: &mut impl FnMut(&'a Action)) {
    for action in actions {
        f(action);
        match action {
            Action::Execute(_) => {}
            Action::Timer(t) => walk(&t.actions, f),
            Action::OnProcessExit(h) => walk(&h.on_exit, f),
        }
    }
}

fn collect_steps<'a>(actions: &'a [Action], trigger: Trigger, out: &mut Vec<PlanStep<'a>>) {
    for action in actions {
        match action {
            Action::Execute(p) => out.push(PlanStep {
                trigger,
                process: p,
            }),
            Action::Timer(t) => collect_steps(&t.actions, Trigger::Delay(t.period), out),
            Action::OnProcessExit(h) => collect_steps(&h.on_exit, Trigger::ExitOf(h.target), out),
        }
    }
}

// ---------------------------------------------------------------------------
// PlanBuilder
// ---------------------------------------------------------------------------

/// Allocates process ids and collects top-level actions.
#[derive(Debug, Default)]
pub struct PlanBuilder {
    next_id: u32,
    actions: Vec<Action>,
}

impl PlanBuilder {
    /// Declare a process. It is not part of the plan until it is added,
    /// directly or nested in a timer or exit handler.
    pub fn process(&mut self, command: CommandSpec) -> ExecuteProcess {
        self.next_id += 1;
        let id = ActionId(self.next_id);
        let program = Path::new(&command.program)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(&command.program)
            .to_string();
        ExecuteProcess {
            id,
            name: format!("{program}-{}", id.get()),
            command,
        }
    }

    pub fn add_action(&mut self, action: impl Into<Action>) -> &mut Self {
        self.actions.push(action.into());
        self
    }

    pub fn build(self) -> LaunchPlan {
        LaunchPlan {
            actions: self.actions,
        }
    }
}
