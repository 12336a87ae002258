//! Per-compile frontend contexts.
//!
//! A [`FrontendContext`] is the private parsing state of one compile call. It
//! is acquired from a [`FrontendBudget`] at the start of the call, never leaves
//! the acquiring thread and is returned to the budget when dropped, on every
//! exit path.
//!
//! The frontend runs on its own scoped thread whose stack is the configured
//! quota plus [`FRONTEND_STACK_RESERVE`]. The depth limit handed to the parser
//! and the lowering pass is derived from that same quota, so a script that is
//! too deeply nested fails with [`CompileError::StackExhausted`] instead of
//! overflowing the stack.

use std::marker::PhantomData;
use std::panic;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use stencil_config::MIN_STACK_QUOTA;
use stencil_syntax::ast::Program;
use stencil_syntax::{ParseOptions, SyntaxError, parse_program};

use crate::error::CompileError;

/// Native stack bytes budgeted per level of syntactic nesting. One level of
/// parentheses takes about 8 KiB across the parser's precedence functions in
/// unoptimized builds.
pub const FRAME_ESTIMATE: usize = 16 * 1024;

/// Stack on the frontend thread beyond the quota, for the tokenizer and the
/// frames below the first nesting level.
pub const FRONTEND_STACK_RESERVE: usize = 256 * 1024;

/// Run `f` on a scoped frontend thread with `stack_quota` bytes of stack on
/// top of [`FRONTEND_STACK_RESERVE`]. A panic in `f` is resumed on the caller.
pub(crate) fn on_frontend_stack<T, F>(stack_quota: usize, f: F) -> Result<T, CompileError>
where
    T: Send,
    F: FnOnce() -> Result<T, CompileError> + Send,
{
    crossbeam_utils::thread::scope(|scope| {
        let handle = scope
            .builder()
            .name("stencil-frontend".to_string())
            .stack_size(stack_quota.saturating_add(FRONTEND_STACK_RESERVE))
            .spawn(move |_| f())
            .map_err(|err| CompileError::ContextUnavailable {
                reason: format!("failed to start frontend thread: {err}"),
            })?;
        handle
            .join()
            .unwrap_or_else(|payload| panic::resume_unwind(payload))
    })
    .unwrap_or_else(|payload| panic::resume_unwind(payload))
}

/// Counts live frontend contexts against a fixed ceiling.
#[derive(Debug)]
pub struct FrontendBudget {
    live: AtomicUsize,
    max_live: usize,
}

impl FrontendBudget {
    pub fn new(max_live: usize) -> Self {
        Self {
            live: AtomicUsize::new(0),
            max_live,
        }
    }

    /// Number of contexts currently acquired.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Acquire a context whose depth limit is derived from `stack_quota`.
    pub fn acquire(self: &Arc<Self>, stack_quota: usize) -> Result<FrontendContext, CompileError> {
        if stack_quota < MIN_STACK_QUOTA {
            return Err(CompileError::ContextUnavailable {
                reason: format!(
                    "stack quota of {stack_quota} bytes is below the minimum of {MIN_STACK_QUOTA}"
                ),
            });
        }

        let max_live = self.max_live;
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < max_live).then_some(live + 1)
            })
            .map_err(|live| CompileError::ContextUnavailable {
                reason: format!("{live} of {max_live} frontend contexts already in use"),
            })?;

        let depth_limit = stack_quota / FRAME_ESTIMATE;
        tracing::trace!(depth_limit, "Acquired frontend context");
        Ok(FrontendContext {
            budget: Arc::clone(self),
            depth_limit,
            _not_send: PhantomData,
        })
    }
}

/// Thread-confined parsing state for a single compile.
#[derive(Debug)]
pub struct FrontendContext {
    budget: Arc<FrontendBudget>,
    depth_limit: usize,
    _not_send: PhantomData<*const ()>,
}

impl FrontendContext {
    pub fn depth_limit(&self) -> usize {
        self.depth_limit
    }

    pub fn parse(&self, source: &str) -> Result<Program, SyntaxError> {
        parse_program(
            source,
            ParseOptions {
                max_depth: self.depth_limit,
            },
        )
    }
}

impl Drop for FrontendContext {
    fn drop(&mut self) {
        self.budget.live.fetch_sub(1, Ordering::AcqRel);
        tracing::trace!("Released frontend context");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stencil_config::DEFAULT_STACK_QUOTA;

    #[test]
    fn test_acquire_and_release() {
        let budget = Arc::new(FrontendBudget::new(2));
        let first = budget.acquire(DEFAULT_STACK_QUOTA).unwrap();
        let second = budget.acquire(DEFAULT_STACK_QUOTA).unwrap();
        assert_eq!(budget.live(), 2);

        let err = budget.acquire(DEFAULT_STACK_QUOTA).unwrap_err();
        assert!(matches!(err, CompileError::ContextUnavailable { .. }));

        drop(first);
        drop(second);
        assert_eq!(budget.live(), 0);
    }

    #[test]
    fn test_quota_below_minimum() {
        let budget = Arc::new(FrontendBudget::new(4));
        let err = budget.acquire(MIN_STACK_QUOTA - 1).unwrap_err();
        assert!(matches!(err, CompileError::ContextUnavailable { .. }));
        assert_eq!(budget.live(), 0);
    }

    #[test]
    fn test_frontend_thread_has_quota_sized_stack() {
        let label = on_frontend_stack(MIN_STACK_QUOTA, || Ok(stencil_utils::thread_label())).unwrap();
        assert_eq!(label, "stencil-frontend");

        let err = on_frontend_stack::<(), _>(DEFAULT_STACK_QUOTA, || {
            Err(CompileError::StackExhausted { depth_limit: 1 })
        })
        .unwrap_err();
        assert_eq!(err, CompileError::StackExhausted { depth_limit: 1 });
    }

    #[test]
    #[should_panic(expected = "frontend bug")]
    fn test_frontend_panic_reaches_caller() {
        let _ = on_frontend_stack::<(), _>(MIN_STACK_QUOTA, || panic!("frontend bug"));
    }

    #[test]
    fn test_depth_limit_scales_with_quota() {
        let budget = Arc::new(FrontendBudget::new(4));
        let small = budget.acquire(MIN_STACK_QUOTA).unwrap();
        let large = budget.acquire(DEFAULT_STACK_QUOTA).unwrap();
        assert_eq!(small.depth_limit(), MIN_STACK_QUOTA / FRAME_ESTIMATE);
        assert!(large.depth_limit() > small.depth_limit());
    }
}
