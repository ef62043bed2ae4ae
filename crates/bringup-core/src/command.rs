use serde::Serialize;

/// The controller-manager node every controller is loaded into.
pub const CONTROLLER_MANAGER: &str = "/controller_manager";

pub const JOINT_STATE_BROADCASTER: &str = "joint_state_broadcaster";
pub const DIFF_DRIVE_CONTROLLER: &str = "diff_drive_controller";

// ---------------------------------------------------------------------------
// OutputMode
// ---------------------------------------------------------------------------

/// Where a spawned process's stdout/stderr go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Inherit the launcher's terminal; nothing is captured.
    #[default]
    Screen,
    /// Capture both streams and re-emit each line as a log event.
    Log,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::Screen => "screen",
            OutputMode::Log => "log",
        }
    }
}

// ---------------------------------------------------------------------------
// CommandSpec
// ---------------------------------------------------------------------------

/// An external command: the program to run and its ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub output: OutputMode,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            output: OutputMode::default(),
        }
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Full argument vector, program first.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Shell-like rendering for display. Not quoted; never fed to a shell.
    pub fn display(&self) -> String {
        self.argv().join(" ")
    }

    /// `ros2 control load_controller --set-state active <controller> --controller-manager <manager>`
    pub fn activate_controller(controller: &str, manager: &str) -> Self {
        Self::new(
            "ros2",
            [
                "control",
                "load_controller",
                "--set-state",
                "active",
                controller,
                "--controller-manager",
                manager,
            ],
        )
    }
}
