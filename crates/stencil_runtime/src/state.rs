use std::fmt;

/// Lifecycle of one execution job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Lookup,
    Hit,
    Miss,
    Compiling,
    Compiled,
    Failed,
    Instantiating,
    Ready,
    InstantiateFailed,
    Executing,
    Done,
    RuntimeError,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Failed | JobState::InstantiateFailed | JobState::RuntimeError | JobState::Done
        )
    }

    pub fn can_advance_to(self, next: JobState) -> bool {
        use JobState::{
            Compiled, Compiling, Done, Executing, Failed, Hit, InstantiateFailed, Instantiating,
            Lookup, Miss, Ready, RuntimeError,
        };

        matches!(
            (self, next),
            (Lookup, Hit | Miss)
                | (Miss, Compiling)
                | (Compiling, Compiled | Failed)
                | (Hit | Compiled, Instantiating)
                | (Instantiating, Ready | InstantiateFailed)
                | (Ready, Executing)
                | (Executing, Done | RuntimeError)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Lookup => "lookup",
            JobState::Hit => "hit",
            JobState::Miss => "miss",
            JobState::Compiling => "compiling",
            JobState::Compiled => "compiled",
            JobState::Failed => "failed",
            JobState::Instantiating => "instantiating",
            JobState::Ready => "ready",
            JobState::InstantiateFailed => "instantiate-failed",
            JobState::Executing => "executing",
            JobState::Done => "done",
            JobState::RuntimeError => "runtime-error",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path a job has taken so far.
#[derive(Debug, Clone)]
pub(crate) struct StateTrace {
    path: Vec<JobState>,
}

impl StateTrace {
    pub(crate) fn new() -> Self {
        Self {
            path: vec![JobState::Lookup],
        }
    }

    pub(crate) fn current(&self) -> JobState {
        self.path.last().copied().unwrap_or(JobState::Lookup)
    }

    pub(crate) fn advance(&mut self, next: JobState) {
        let current = self.current();
        debug_assert!(
            current.can_advance_to(next),
            "invalid job transition {current} -> {next}"
        );
        tracing::trace!(from = %current, to = %next, "Job transition");
        self.path.push(next);
    }

    pub(crate) fn into_path(self) -> Vec<JobState> {
        self.path
    }
}
