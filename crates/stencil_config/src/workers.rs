use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::parse_or;

/// Worker driver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of worker threads (0 = one per CPU)
    pub worker_threads: usize,

    /// How many times each worker runs the whole script list
    pub iterations: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            iterations: 2,
        }
    }
}

impl WorkerConfig {
    pub(crate) fn apply_overrides<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.worker_threads = parse_or(lookup("STENCIL_WORKER_THREADS"), self.worker_threads);
        self.iterations = parse_or(lookup("STENCIL_ITERATIONS"), self.iterations);
    }

    /// Thread count with auto-detection resolved.
    pub fn resolved_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        let mut system = System::new();
        system.refresh_cpu();
        system.cpus().len().max(1)
    }
}
