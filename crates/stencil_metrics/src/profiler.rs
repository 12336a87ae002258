//! Compilation profiling for tracking compile cost per script source

use std::time::{Duration, Instant};

use ahash::{AHashMap, RandomState};
use parking_lot::RwLock;

/// Stable digest of a script source, used to key per-source statistics.
pub type SourceDigest = u64;

/// Digest `source` with fixed seeds so equal sources agree across threads.
pub fn source_digest(source: &str) -> SourceDigest {
    RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    )
    .hash_one(source)
}

/// Aggregate statistics over every compile attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileStats {
    /// Total number of compile attempts
    pub attempts: u64,

    /// Attempts that produced an artifact
    pub successes: u64,

    /// Attempts that failed
    pub failures: u64,

    /// Total time spent compiling (microseconds)
    pub total_time_us: u64,

    /// Minimum compile time (microseconds)
    pub min_time_us: u64,

    /// Maximum compile time (microseconds)
    pub max_time_us: u64,
}

impl Default for CompileStats {
    fn default() -> Self {
        Self {
            attempts: 0,
            successes: 0,
            failures: 0,
            total_time_us: 0,
            min_time_us: u64::MAX,
            max_time_us: 0,
        }
    }
}

impl CompileStats {
    fn record(&mut self, duration_us: u64, succeeded: bool) {
        self.attempts += 1;
        if succeeded {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_time_us += duration_us;
        self.min_time_us = self.min_time_us.min(duration_us);
        self.max_time_us = self.max_time_us.max(duration_us);
    }

    /// Get average compile time (microseconds)
    pub fn avg_time_us(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.total_time_us as f64 / self.attempts as f64
        }
    }
}

/// Per-source compile statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCompileStats {
    pub digest: SourceDigest,

    /// Filename reported by the most recent attempt
    pub filename: String,

    /// Number of compile attempts for this source
    pub compile_count: u64,

    /// Attempts that failed
    pub failure_count: u64,

    /// Duration of the most recent attempt (microseconds)
    pub last_time_us: u64,
}

/// Compile profiler
#[derive(Debug, Default)]
pub struct CompileProfiler {
    totals: RwLock<CompileStats>,
    per_source: RwLock<AHashMap<SourceDigest, SourceCompileStats>>,
}

impl CompileProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing a compile of `source`
    pub fn start(&self, source: &str, filename: &str) -> CompileTimer {
        CompileTimer {
            digest: source_digest(source),
            filename: filename.to_string(),
            start: Instant::now(),
        }
    }

    /// Record the attempt started by `timer`
    pub fn finish(&self, timer: CompileTimer, succeeded: bool) -> Duration {
        let duration = timer.elapsed();
        self.record(timer.digest, &timer.filename, duration, succeeded);
        duration
    }

    /// Record a completed compile attempt
    pub fn record(
        &self,
        digest: SourceDigest,
        filename: &str,
        duration: Duration,
        succeeded: bool,
    ) {
        let duration_us = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);

        self.totals.write().record(duration_us, succeeded);

        let mut per_source = self.per_source.write();
        let stats = per_source
            .entry(digest)
            .or_insert_with(|| SourceCompileStats {
                digest,
                filename: filename.to_string(),
                compile_count: 0,
                failure_count: 0,
                last_time_us: 0,
            });
        stats.compile_count += 1;
        if !succeeded {
            stats.failure_count += 1;
        }
        stats.last_time_us = duration_us;
        filename.clone_into(&mut stats.filename);
    }

    /// Get aggregate statistics
    pub fn stats(&self) -> CompileStats {
        self.totals.read().clone()
    }

    /// Get statistics for one source text
    pub fn source_stats(&self, source: &str) -> Option<SourceCompileStats> {
        self.per_source.read().get(&source_digest(source)).cloned()
    }

    /// Number of compile attempts recorded for `source`
    pub fn compile_count(&self, source: &str) -> u64 {
        self.source_stats(source)
            .map_or(0, |stats| stats.compile_count)
    }

    /// Get statistics for every source seen, most compiled first
    pub fn all_source_stats(&self) -> Vec<SourceCompileStats> {
        let mut all: Vec<_> = self.per_source.read().values().cloned().collect();
        all.sort_by(|a, b| {
            b.compile_count
                .cmp(&a.compile_count)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        all
    }

    /// Clear all statistics
    pub fn clear(&self) {
        *self.totals.write() = CompileStats::default();
        self.per_source.write().clear();
    }
}

/// Timer for measuring one compile attempt
#[derive(Debug)]
pub struct CompileTimer {
    digest: SourceDigest,
    filename: String,
    start: Instant,
}

impl CompileTimer {
    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn digest(&self) -> SourceDigest {
        self.digest
    }
}
