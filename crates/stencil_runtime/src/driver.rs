use std::io;
use std::sync::Arc;

use crossbeam_channel::Sender;
use stencil_cache::CompilationCache;
use stencil_config::WorkerConfig;
use stencil_engine::{Engine, ScriptCompiler};
use stencil_metrics::CompileProfiler;
use stencil_utils::Stopwatch;
use thiserror::Error;

use crate::job::ExecutionJob;
use crate::report::{DriverReport, JobReport};

/// A script submitted to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    pub source: String,
    pub filename: String,
    pub line: u32,
}

impl ScriptSource {
    pub fn new(source: impl Into<String>, filename: impl Into<String>, line: u32) -> Self {
        Self {
            source: source.into(),
            filename: filename.into(),
            line,
        }
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to spawn worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: io::Error,
    },

    #[error("worker thread(s) {workers:?} panicked")]
    WorkerPanicked { workers: Vec<usize> },
}

/// Runs a script list on several threads, each with its own execution
/// context, all sharing one cache, one compiler and one profiler.
pub struct WorkerDriver {
    engine: Arc<Engine>,
    cache: Arc<CompilationCache>,
    compiler: Arc<dyn ScriptCompiler>,
    profiler: Arc<CompileProfiler>,
    config: WorkerConfig,
}

impl WorkerDriver {
    pub fn new(
        engine: Arc<Engine>,
        cache: Arc<CompilationCache>,
        compiler: Arc<dyn ScriptCompiler>,
        profiler: Arc<CompileProfiler>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            engine,
            cache,
            compiler,
            profiler,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<CompilationCache> {
        &self.cache
    }

    pub fn profiler(&self) -> &Arc<CompileProfiler> {
        &self.profiler
    }

    /// Run every script `iterations` times on each worker and collect the outcomes.
    pub fn run(&self, scripts: &[ScriptSource]) -> Result<DriverReport, DriverError> {
        let threads = self.config.resolved_threads();
        let stopwatch = Stopwatch::start_new();
        let (sender, receiver) = crossbeam_channel::unbounded();

        tracing::info!(
            threads,
            iterations = self.config.iterations,
            scripts = scripts.len(),
            "Starting workers"
        );

        let scoped = crossbeam_utils::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(threads);
            for worker in 0..threads {
                let sender = sender.clone();
                let handle = scope
                    .builder()
                    .name(format!("stencil-worker-{worker}"))
                    .spawn(move |_| self.work(worker, scripts, &sender))
                    .map_err(|source| DriverError::Spawn { worker, source })?;
                handles.push((worker, handle));
            }
            drop(sender);

            let panicked: Vec<usize> = handles
                .into_iter()
                .filter_map(|(worker, handle)| handle.join().is_err().then_some(worker))
                .collect();
            if panicked.is_empty() {
                Ok(())
            } else {
                Err(DriverError::WorkerPanicked { workers: panicked })
            }
        });
        scoped.map_err(|_| DriverError::WorkerPanicked {
            workers: Vec::new(),
        })??;

        let jobs: Vec<JobReport> = receiver.iter().collect();
        let report = DriverReport {
            threads,
            jobs,
            cache: self.cache.stats(),
            compiles: self.profiler.stats(),
            elapsed: stopwatch.elapsed(),
        };
        tracing::info!(
            jobs = report.jobs.len(),
            failed = report.failed(),
            cached = report.cache.entries,
            elapsed_us = stopwatch.elapsed_us(),
            "Workers finished"
        );
        Ok(report)
    }

    fn work(&self, worker: usize, scripts: &[ScriptSource], reports: &Sender<JobReport>) {
        let mut context = self.engine.new_context();
        let job = ExecutionJob::new(&self.cache, self.compiler.as_ref(), &self.profiler);
        tracing::info!(worker, context = context.id(), "Worker thread started");

        for iteration in 0..self.config.iterations {
            for (index, script) in scripts.iter().enumerate() {
                let outcome = job.run(&mut context, &script.source, &script.filename, script.line);
                let report = JobReport {
                    worker,
                    iteration,
                    script: index,
                    outcome,
                };
                if reports.send(report).is_err() {
                    return;
                }
            }
        }
    }
}
