pub mod checkpoint;
pub mod graph;
pub mod interrupt;
pub mod resume;
pub mod store;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use graph::{
    edge_for, Edge, GraphExecutor, Persistence, RunOutcome, StageName, StageRegistry, StopReason,
    Target,
};
pub use interrupt::{install_signal_handlers, InterruptHandle};
pub use resume::{discard, resume, Reconciler, ResumeReport};
pub use store::{AuditLogWriter, RoadmapStore};
