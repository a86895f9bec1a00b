//! Built-in stages and command runners.

pub mod registry;
pub mod runner;
pub mod stages;

pub use registry::builtin_registry;
pub use runner::{runner_for, DockerExecRunner, LocalRunner};
