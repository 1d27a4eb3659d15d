pub mod access;
pub mod audit;
pub mod engine;
pub mod locks;

pub use access::{AccessGuard, DirectoryAccessGuard};
pub use audit::TracingAuditSink;
pub use engine::{
    ActionableApproval, ApprovalEngine, DecisionOutcome, EngineRepositories, EngineSettings,
    RequestContext, SubmittedOrder,
};
pub use locks::OrderLocks;
