pub mod backend;
pub mod evaluator;
pub mod executor;
pub mod harness;
pub mod orchestrator;
pub mod service;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use executor::Executor;
pub use harness::TestHarness;
pub use orchestrator::FallbackOrchestrator;
pub use service::{BackendCapabilities, ExecutionService};
