//! Graph Execution Engine — a fixed pipeline of named stages with cycles.
//!
//! Stages are a closed enumeration (`StageName`). Each stage has exactly one
//! outgoing `Edge`: either an unconditional successor or a router function
//! whose answer must fall inside the edge's allowed set. The adjacency table
//! is `edge_for`, a `match` over every stage.
//!
//! The `GraphExecutor` starts at the entry stage, invokes each stage with a
//! snapshot of the `WorkflowState`, checkpoints the result, checks the
//! interrupt flag, and then follows the edge. It stops at `Target::End`, at
//! the step ceiling, or on interrupt, and always writes a final checkpoint.

pub mod edge;
pub mod executor;
pub mod registry;
pub mod router;
pub mod stage;

pub use edge::{edge_for, Edge, Target};
pub use executor::{GraphExecutor, Persistence, RunOutcome, StopReason};
pub use registry::StageRegistry;
pub use stage::StageName;
