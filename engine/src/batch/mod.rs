pub mod executor;

pub use executor::{BatchExecutor, BatchOptions, BatchSummary, ExecutorStatus, JobResult};
