//! Relay orchestration: the per-message state machine and its retry policy.

mod job;
mod orchestrator;
mod retry;

pub use job::{JobState, RelayJob, Transition};
pub use orchestrator::RelayOrchestrator;
pub use retry::RetryPolicy;
