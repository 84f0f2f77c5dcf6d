//! browseragent CLI: wires the `browser-agent-core` Planner/Navigator/
//! Validator orchestrator to a command-line front end. Exposed as a
//! library so integration tests can drive `cli::app::run` paths without
//! going through a subprocess.

pub mod cli;
pub mod config;
pub mod errors;
