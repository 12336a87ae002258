//! Find-or-compile, then instantiate and run.
//!
//! The cache lookup and the insert are two separate critical sections, so two
//! jobs that miss on the same source at once both compile it. The second
//! insert is discarded by the cache and each job runs the artifact it built.

use stencil_cache::{CompilationCache, InsertOutcome};
use stencil_engine::{
    ArtifactHandle, CompileError, ExecutionContext, InstantiateError, RuntimeError,
    ScriptCompiler,
};
use stencil_metrics::CompileProfiler;
use stencil_utils::Stopwatch;
use thiserror::Error;

use crate::state::{JobState, StateTrace};

/// Whether a job found its script in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Miss,
}

/// Successful job outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCompletion {
    pub lookup: Lookup,
    /// Completion value of the script, as text.
    pub value: String,
    pub path: Vec<JobState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("compile failed: {0}")]
    Compile(#[from] CompileError),

    #[error("instantiation failed: {0}")]
    InstantiateFailed(#[from] InstantiateError),

    #[error("script failed: {0}")]
    RuntimeError(#[from] RuntimeError),
}

impl JobError {
    /// Short name of the failure class, used in logs and summaries.
    pub fn class(&self) -> &'static str {
        match self {
            JobError::Compile(CompileError::SyntaxError(_)) => "SyntaxError",
            JobError::Compile(CompileError::ContextUnavailable { .. }) => "ContextUnavailable",
            JobError::Compile(CompileError::StackExhausted { .. }) => "StackExhausted",
            JobError::InstantiateFailed(_) => "InstantiateError",
            JobError::RuntimeError(RuntimeError::Uncaught { .. }) => "UncaughtException",
            JobError::RuntimeError(RuntimeError::TypeError { .. }) => "TypeError",
            JobError::RuntimeError(RuntimeError::ReferenceError { .. }) => "ReferenceError",
            JobError::RuntimeError(RuntimeError::RangeError { .. }) => "RangeError",
            JobError::RuntimeError(RuntimeError::Host { .. }) => "HostError",
            JobError::RuntimeError(RuntimeError::ForeignScript) => "ForeignScript",
        }
    }

    /// State a job ends in when it fails with this error.
    pub fn terminal_state(&self) -> JobState {
        match self {
            JobError::Compile(_) => JobState::Failed,
            JobError::InstantiateFailed(_) => JobState::InstantiateFailed,
            JobError::RuntimeError(_) => JobState::RuntimeError,
        }
    }
}

/// Runs scripts against the shared cache on behalf of one worker.
#[derive(Clone, Copy)]
pub struct ExecutionJob<'a> {
    cache: &'a CompilationCache,
    compiler: &'a dyn ScriptCompiler,
    profiler: &'a CompileProfiler,
}

impl<'a> ExecutionJob<'a> {
    pub fn new(
        cache: &'a CompilationCache,
        compiler: &'a dyn ScriptCompiler,
        profiler: &'a CompileProfiler,
    ) -> Self {
        Self {
            cache,
            compiler,
            profiler,
        }
    }

    /// Run `source` in `context`, compiling it first if no other job has.
    pub fn run(
        &self,
        context: &mut ExecutionContext,
        source: &str,
        filename: &str,
        line: u32,
    ) -> Result<JobCompletion, JobError> {
        let mut trace = StateTrace::new();
        let result = self.run_traced(&mut trace, context, source, filename, line);
        match result {
            Ok((lookup, value)) => {
                trace.advance(JobState::Done);
                Ok(JobCompletion {
                    lookup,
                    value,
                    path: trace.into_path(),
                })
            }
            Err(error) => {
                trace.advance(error.terminal_state());
                tracing::info!(filename, line, class = error.class(), "{error}");
                Err(error)
            }
        }
    }

    fn run_traced(
        &self,
        trace: &mut StateTrace,
        context: &mut ExecutionContext,
        source: &str,
        filename: &str,
        line: u32,
    ) -> Result<(Lookup, String), JobError> {
        let (lookup, artifact) = if let Some(artifact) = self.cache.find(source) {
            trace.advance(JobState::Hit);
            tracing::info!(filename, line, "Taking script from cache");
            (Lookup::Hit, artifact)
        } else {
            trace.advance(JobState::Miss);
            tracing::info!(filename, line, "Compiling script");
            trace.advance(JobState::Compiling);
            let artifact = self.compile(source, filename, line)?;
            trace.advance(JobState::Compiled);
            (Lookup::Miss, artifact)
        };

        trace.advance(JobState::Instantiating);
        let script = context.instantiate(&artifact)?;
        trace.advance(JobState::Ready);

        trace.advance(JobState::Executing);
        let stopwatch = Stopwatch::start_new();
        let value = context.execute(&script)?;
        tracing::debug!(
            filename,
            line,
            elapsed_us = stopwatch.elapsed_us(),
            "Script executed"
        );
        Ok((lookup, value.to_display()))
    }

    fn compile(
        &self,
        source: &str,
        filename: &str,
        line: u32,
    ) -> Result<ArtifactHandle, CompileError> {
        let timer = self.profiler.start(source, filename);
        let result = self.compiler.compile(source, filename, line);
        let elapsed = self.profiler.finish(timer, result.is_ok());

        let artifact = result?;
        if self.cache.insert(source, artifact.clone()) == InsertOutcome::AlreadyPresent {
            tracing::debug!(filename, line, "Another worker cached this script first");
        }
        tracing::debug!(
            filename,
            line,
            ops = artifact.op_count(),
            elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            "Compiled script"
        );
        Ok(artifact)
    }
}
