//! `bringup-core`: sequenced ros2_control controller bringup for a
//! differential drive UGV.
//!
//! # Architecture
//!
//! ```text
//! build_plan()    ← pure: timer(25s) → broadcaster, on-exit → diff drive
//!     │
//!     ▼
//! LaunchPlan      ← Execute / Timer / OnProcessExit actions, serializable
//!     │
//!     ▼
//! Executor        ← JoinSet of timers + process waits, one-shot exit table
//!     │
//!     ▼
//! ProcessHost     ← TokioHost spawns `ros2 control load_controller …`
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use bringup_core::{build_plan, Executor, TokioHost};
//!
//! let report = Executor::new(TokioHost).run(&build_plan()).await?;
//! println!("{} processes started", report.spawn_count());
//! ```

pub mod bringup;
pub mod command;
pub mod error;
pub mod executor;
pub mod host;
pub mod plan;

pub use bringup::{build_plan, BROADCASTER_DELAY};
pub use command::{CommandSpec, OutputMode};
pub use error::{BringupError, Result};
pub use executor::{EventKind, Executor, LaunchEvent, LaunchReport};
pub use host::{ExitOutcome, ProcessHost, TokioHost};
pub use plan::{Action, ActionId, ExecuteProcess, LaunchPlan, OnProcessExit, TimerAction, Trigger};
