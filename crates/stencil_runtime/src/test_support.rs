use std::sync::atomic::{AtomicUsize, Ordering};

use stencil_engine::{ArtifactHandle, CompileError, ScriptCompiler, StencilCompiler};

/// Compiler wrapper that counts how often it is invoked.
#[derive(Debug, Default)]
pub(crate) struct CountingCompiler {
    inner: StencilCompiler,
    calls: AtomicUsize,
}

impl CountingCompiler {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn live_frontends(&self) -> usize {
        self.inner.live_frontends()
    }
}

impl ScriptCompiler for CountingCompiler {
    fn compile(
        &self,
        source: &str,
        filename: &str,
        line: u32,
    ) -> Result<ArtifactHandle, CompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.compile(source, filename, line)
    }
}
