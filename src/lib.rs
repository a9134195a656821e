//! agentrig: install, launch and capture third-party CLI coding agents.
//!
//! Each attempt runs inside a caller-provided sandbox directory. The library
//! installs the agent (from a pre-built bundle when one is available,
//! otherwise by running a rendered install script), launches it with an
//! allow-listed environment, streams its output to a redacted log and turns
//! the result into an [`runner::ExecutionRecord`].
//!
//! The entry point is [`attempt::run_attempt`].

pub mod agent;
pub mod attempt;
pub mod context;
pub mod credentials;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod extract;
pub mod fs;
pub mod install;
pub mod runner;
pub mod template;
pub mod usage;

#[cfg(test)]
mod test_support;
