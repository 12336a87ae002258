use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use stencil_config::ContextConfig;

use crate::context::ExecutionContext;
use crate::sink::{OutputSink, StdoutSink};

/// Process-level parent of every execution context.
///
/// Each context holds an `Arc<Engine>`, so the engine is torn down only after
/// the last context is gone.
pub struct Engine {
    config: ContextConfig,
    sink: Arc<dyn OutputSink>,
    live_contexts: AtomicUsize,
    next_context_id: AtomicU64,
}

impl Engine {
    /// Initialize the engine with output going to stdout.
    pub fn init(config: ContextConfig) -> Arc<Self> {
        Self::with_sink(config, Arc::new(StdoutSink))
    }

    pub fn with_sink(config: ContextConfig, sink: Arc<dyn OutputSink>) -> Arc<Self> {
        tracing::debug!(
            max_string_bytes = config.max_string_bytes,
            install_print = config.install_print,
            "Engine initialized"
        );
        Arc::new(Self {
            config,
            sink,
            live_contexts: AtomicUsize::new(0),
            next_context_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn sink(&self) -> Arc<dyn OutputSink> {
        Arc::clone(&self.sink)
    }

    pub fn live_contexts(&self) -> usize {
        self.live_contexts.load(Ordering::Acquire)
    }

    pub fn new_context(self: &Arc<Self>) -> ExecutionContext {
        ExecutionContext::new(self)
    }

    pub(crate) fn register_context(&self) -> u64 {
        self.live_contexts.fetch_add(1, Ordering::AcqRel);
        self.next_context_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn unregister_context(&self) {
        self.live_contexts.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("live_contexts", &self.live_contexts())
            .finish_non_exhaustive()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        tracing::debug!("Engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::BufferSink;

    #[test]
    fn test_contexts_keep_engine_alive() {
        let engine = Engine::with_sink(ContextConfig::default(), Arc::new(BufferSink::new()));
        let weak = Arc::downgrade(&engine);

        let first = engine.new_context();
        let second = engine.new_context();
        assert_ne!(first.id(), second.id());
        assert_eq!(engine.live_contexts(), 2);

        drop(engine);
        assert!(weak.upgrade().is_some());
        drop(first);
        drop(second);
        assert!(weak.upgrade().is_none());
    }
}
