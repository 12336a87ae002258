//! Compile-or-fetch orchestration over the shared stencil cache.
//!
//! [`ExecutionJob`] is the per-call workflow: look the source up, compile and
//! insert it on a miss, then instantiate and run it in the caller's execution
//! context. [`WorkerDriver`] runs that workflow on several threads at once.

pub mod driver;
pub mod job;
pub mod report;
pub mod state;

#[cfg(test)]
mod test_support;

pub use driver::{DriverError, ScriptSource, WorkerDriver};
pub use job::{ExecutionJob, JobCompletion, JobError, Lookup};
pub use report::{DriverReport, JobReport};
pub use state::JobState;
