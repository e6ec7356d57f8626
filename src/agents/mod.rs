//! External agent execution: the Claude CLI invocation, the subprocess
//! runner it goes through and the events agents report in their output.

pub mod claude;
pub mod events;
pub mod runner;

pub use claude::{handler_prompt, initiator_prompt, resolve_binary, ClaudeInvocation};
pub use events::{agent_event_request, parse_agent_events};
pub use runner::{run_process, ProcessOutput, RunnerConfig, RunnerError};
