//! Task lifecycle: the per-worker coordinator that owns the registry and the
//! interaction acknowledgement promise used by the dispatch loop.

pub mod coordinator;
pub mod interaction;

pub use coordinator::{DescribeSubmission, GenerateSubmission, LifecycleCoordinator, ReapReport};
pub use interaction::InteractionWaiter;
