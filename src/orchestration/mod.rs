pub mod extraction;
pub mod task_runner;
pub mod task_store;

pub use extraction::ExtractionOrchestrator;
pub use task_runner::TaskRunner;
pub use task_store::TaskStore;
