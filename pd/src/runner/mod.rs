//! Process runner - concurrent, fault-isolated child process execution
//!
//! A batch of [`Job`]s runs with at most `n_threads` live processes. Failures
//! stay on the job that produced them; sibling jobs always run to completion.

mod job;
mod pool;

pub use job::{Job, JobFailure};
pub use pool::{RunOptions, RunSummary, Runner, default_n_threads};
