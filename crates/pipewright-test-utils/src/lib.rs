//! Shared test utilities for Pipewright crates.
//!
//! - [`FnStage`]: a stage backed by a closure
//! - [`ScriptedRunner`]: a command runner that replays canned outputs and
//!   records every call
//! - [`TempWorkspace`]: a config rooted in a temporary directory
//! - roadmap fixtures

mod fixtures;
mod runner;
mod stage;
mod workspace;

pub use fixtures::{roadmap_of, roadmap_with, sample_roadmap};
pub use runner::{RunnerCall, ScriptedRunner};
pub use stage::FnStage;
pub use workspace::TempWorkspace;
