//! Diagnostic capture: module catalog, command execution, orchestration.

pub mod catalog;
pub mod orchestrator;
pub mod tool_runner;

pub use catalog::{catalog, CaptureModule, TargetOs};
pub use orchestrator::{format_block, CaptureError, CaptureOrchestrator, CaptureResult};
pub use tool_runner::{ToolConfig, ToolError, ToolOutput, ToolRunner, ToolRunnerBuilder};
