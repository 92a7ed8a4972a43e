//! Batching, retry orchestration and queue wrappers.

pub mod batch;
pub mod flaky;
pub mod orchestrator;

pub use batch::{BatchError, BatchOutcome, BatchSender};
pub use flaky::FlakyQueue;
pub use orchestrator::{
    check_inbound_endpoint, run_checked_generation, run_generation, GenerationError,
    GenerationReport, HealthCheckError,
};
