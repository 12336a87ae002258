use std::collections::BTreeMap;
use std::time::Duration;

use stencil_cache::CacheStats;
use stencil_metrics::CompileStats;

use crate::job::{JobCompletion, JobError, Lookup};

/// Outcome of one job run by one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub worker: usize,
    pub iteration: usize,
    /// Index of the script in the submitted list.
    pub script: usize,
    pub outcome: Result<JobCompletion, JobError>,
}

impl JobReport {
    pub fn is_hit(&self) -> bool {
        matches!(&self.outcome, Ok(done) if done.lookup == Lookup::Hit)
    }

    pub fn error(&self) -> Option<&JobError> {
        self.outcome.as_ref().err()
    }
}

/// Everything a driver run produced.
#[derive(Debug, Clone)]
pub struct DriverReport {
    pub threads: usize,
    pub jobs: Vec<JobReport>,
    pub cache: CacheStats,
    pub compiles: CompileStats,
    pub elapsed: Duration,
}

impl DriverReport {
    pub fn succeeded(&self) -> usize {
        self.jobs.iter().filter(|job| job.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.jobs.len() - self.succeeded()
    }

    pub fn failures_by_class(&self) -> BTreeMap<&'static str, usize> {
        let mut classes = BTreeMap::new();
        for error in self.jobs.iter().filter_map(JobReport::error) {
            *classes.entry(error.class()).or_insert(0) += 1;
        }
        classes
    }

    /// Jobs run by `worker`, in the order it ran them.
    pub fn jobs_for(&self, worker: usize) -> impl Iterator<Item = &JobReport> {
        self.jobs.iter().filter(move |job| job.worker == worker)
    }

    /// First recorded error for the script at `index`.
    pub fn first_error_for(&self, index: usize) -> Option<&JobError> {
        self.jobs
            .iter()
            .filter(|job| job.script == index)
            .find_map(JobReport::error)
    }
}
