//! Process Supervisor: spawning, streaming, and terminating the external
//! `sqlmap`/`xsstrike`-style tool invocations.

pub mod registry;
pub mod supervisor;

pub use registry::{ActiveProcessRegistry, ProcessHandle};
pub use supervisor::{
    resolve_invocation, ExitReport, ProcessSupervisor, ToolInvocation, ToolOutputLine,
};
