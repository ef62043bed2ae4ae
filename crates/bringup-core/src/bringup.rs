//! The controller startup sequence for the differential drive UGV.
//!
//! 1. Joint state broadcaster: publishes joint states to `/joint_states`.
//! 2. Diff drive controller: drives the wheels from `~/cmd_vel`.
//!
//! The broadcaster is activated after [`BROADCASTER_DELAY`]; the diff drive
//! controller is activated once the broadcaster's loader process has exited,
//! whatever its exit status.

use std::time::Duration;

use crate::command::{
    CommandSpec, OutputMode, CONTROLLER_MANAGER, DIFF_DRIVE_CONTROLLER, JOINT_STATE_BROADCASTER,
};
use crate::plan::{LaunchPlan, OnProcessExit, TimerAction};

/// Delay before the joint state broadcaster is activated.
pub const BROADCASTER_DELAY: Duration = Duration::from_secs(25);

/// Build the bringup plan. Pure: nothing is spawned or scheduled until the
/// plan is handed to an [`crate::executor::Executor`].
pub fn build_plan() -> LaunchPlan {
    let mut plan = LaunchPlan::builder();

    let start_diff_drive_controller = plan.process(
        CommandSpec::activate_controller(DIFF_DRIVE_CONTROLLER, CONTROLLER_MANAGER)
            .with_output(OutputMode::Screen),
    );
    let start_joint_state_broadcaster = plan.process(
        CommandSpec::activate_controller(JOINT_STATE_BROADCASTER, CONTROLLER_MANAGER)
            .with_output(OutputMode::Screen),
    );

    let broadcaster_id = start_joint_state_broadcaster.id;

    plan.add_action(TimerAction {
        period: BROADCASTER_DELAY,
        actions: vec![start_joint_state_broadcaster.into()],
    })
    .add_action(OnProcessExit {
        target: broadcaster_id,
        on_exit: vec![start_diff_drive_controller.into()],
    });

    plan.build()
}
