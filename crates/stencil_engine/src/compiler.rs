use std::sync::Arc;

use stencil_config::CompileConfig;
use stencil_syntax::SyntaxError;

use crate::artifact::{ArtifactHandle, Stencil};
use crate::error::{CompileError, Diagnostic};
use crate::frontend::{FrontendBudget, on_frontend_stack};
use crate::lower::lower;

/// Turns source text into a shareable compiled artifact.
///
/// Implementations are called concurrently from every worker thread and keep
/// no per-call state between calls.
pub trait ScriptCompiler: Send + Sync {
    /// Compile `source`; `filename` and `line` describe where it came from and
    /// are used for diagnostics and runtime error locations.
    fn compile(&self, source: &str, filename: &str, line: u32)
    -> Result<ArtifactHandle, CompileError>;
}

/// Compiler for the stencil script language.
#[derive(Debug)]
pub struct StencilCompiler {
    config: CompileConfig,
    budget: Arc<FrontendBudget>,
}

impl StencilCompiler {
    pub fn new(config: CompileConfig) -> Self {
        let budget = Arc::new(FrontendBudget::new(config.max_live_frontends));
        Self { config, budget }
    }

    pub fn config(&self) -> &CompileConfig {
        &self.config
    }

    /// Frontend contexts currently held by in-flight compiles.
    pub fn live_frontends(&self) -> usize {
        self.budget.live()
    }
}

impl Default for StencilCompiler {
    fn default() -> Self {
        Self::new(CompileConfig::default())
    }
}

impl ScriptCompiler for StencilCompiler {
    fn compile(
        &self,
        source: &str,
        filename: &str,
        line: u32,
    ) -> Result<ArtifactHandle, CompileError> {
        let stencil =
            on_frontend_stack(self.config.stack_quota, || self.build(source, filename, line))?;
        tracing::debug!(
            filename,
            line,
            ops = stencil.ops().len(),
            globals = stencil.globals().len(),
            "Compiled stencil"
        );
        Ok(ArtifactHandle::new(stencil))
    }
}

impl StencilCompiler {
    /// Parse and lower on the current thread, which must have the quota's
    /// worth of stack available.
    fn build(&self, source: &str, filename: &str, line: u32) -> Result<Stencil, CompileError> {
        let frontend = self.budget.acquire(self.config.stack_quota)?;
        let depth_limit = frontend.depth_limit();
        let to_compile_error = |error: SyntaxError| match error {
            SyntaxError::TooDeep { .. } => CompileError::StackExhausted { depth_limit },
            other => CompileError::SyntaxError(Some(Diagnostic::from_syntax(
                &other, source, filename, line,
            ))),
        };

        let program = frontend.parse(source).map_err(to_compile_error)?;
        let stencil =
            lower(&program, source, filename, line, depth_limit).map_err(to_compile_error)?;
        // The AST is dropped here, on the frontend stack.
        drop(program);
        Ok(stencil)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use stencil_config::{DEFAULT_STACK_QUOTA, MIN_STACK_QUOTA};

    use crate::frontend::FRAME_ESTIMATE;

    const AWAIT_SCRIPT: &str = "\n        await print(`JS log two: ${1 + 1}`);\n        ";

    #[test]
    fn test_compile_records_metadata() {
        let compiler = StencilCompiler::default();
        let artifact = compiler.compile("print(\"hello\");", "hello.js", 7).unwrap();
        assert_eq!(artifact.filename(), "hello.js");
        assert_eq!(artifact.base_line(), 7);
        assert_eq!(artifact.source_len(), 15);
        assert!(artifact.op_count() > 0);
    }

    #[test]
    fn test_await_is_a_syntax_error() {
        let compiler = StencilCompiler::default();
        let err = compiler.compile(AWAIT_SCRIPT, "none", 2).unwrap_err();
        let diagnostic = err.diagnostic().unwrap();
        assert_eq!(diagnostic.filename, "none");
        assert_eq!(diagnostic.line, 3);
        assert_eq!(diagnostic.column, 9);
        assert!(diagnostic.message.contains("await is only valid in async functions"));
        assert!(err.to_string().starts_with("SyntaxError: none:3:9:"));
    }

    #[test]
    fn test_lowering_errors_are_syntax_errors() {
        let compiler = StencilCompiler::default();
        let err = compiler.compile("let a; let a;", "dup.js", 1).unwrap_err();
        assert!(matches!(err, CompileError::SyntaxError(Some(_))));
    }

    #[test]
    fn test_deep_nesting_exhausts_stack_quota() {
        let compiler = StencilCompiler::new(CompileConfig::default().with_stack_quota(MIN_STACK_QUOTA));
        let source = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        let err = compiler.compile(&source, "deep.js", 1).unwrap_err();
        assert!(matches!(err, CompileError::StackExhausted { depth_limit: 4 }));
    }

    /// Compile `source` with the default config from a worker-sized thread.
    fn compile_on_small_thread(source: String) -> Result<ArtifactHandle, CompileError> {
        thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || StencilCompiler::default().compile(&source, "deep.js", 1))
            .unwrap()
            .join()
            .unwrap()
    }

    #[test]
    fn test_nesting_just_under_default_limit_compiles() {
        let parens = DEFAULT_STACK_QUOTA / FRAME_ESTIMATE - 4;
        let source = format!("print({}1{});", "(".repeat(parens), ")".repeat(parens));
        compile_on_small_thread(source).unwrap();
    }

    #[test]
    fn test_deep_parens_fail_without_overflow() {
        let source = format!("{}1{}", "(".repeat(250), ")".repeat(250));
        let err = compile_on_small_thread(source).unwrap_err();
        assert!(matches!(err, CompileError::StackExhausted { .. }));

        let source = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        let err = compile_on_small_thread(source).unwrap_err();
        assert!(matches!(err, CompileError::StackExhausted { .. }));
    }

    #[test]
    fn test_long_operator_chain_fails_without_overflow() {
        let source = format!("1{}", " + 1".repeat(20_000));
        let err = compile_on_small_thread(source).unwrap_err();
        assert!(matches!(err, CompileError::StackExhausted { .. }));

        let source = format!("x{}", " || x".repeat(20_000));
        let err = compile_on_small_thread(source).unwrap_err();
        assert!(matches!(err, CompileError::StackExhausted { .. }));

        let source = format!("print(1{});", " + 1".repeat(30));
        compile_on_small_thread(source).unwrap();
    }

    #[test]
    fn test_quota_below_minimum_is_unavailable() {
        let compiler = StencilCompiler::new(CompileConfig::default().with_stack_quota(1024));
        let err = compiler.compile("1", "none", 1).unwrap_err();
        assert!(matches!(err, CompileError::ContextUnavailable { .. }));
    }

    #[test]
    fn test_exhausted_frontend_budget() {
        let compiler = StencilCompiler::new(CompileConfig {
            max_live_frontends: 0,
            ..CompileConfig::default()
        });
        let err = compiler.compile("1", "none", 1).unwrap_err();
        assert!(matches!(err, CompileError::ContextUnavailable { .. }));
    }

    #[test]
    fn test_frontend_released_on_every_path() {
        let compiler = StencilCompiler::default();
        compiler.compile("print(1)", "ok.js", 1).unwrap();
        compiler.compile(AWAIT_SCRIPT, "bad.js", 1).unwrap_err();
        compiler.compile("let a; a = ", "bad.js", 1).unwrap_err();
        assert_eq!(compiler.live_frontends(), 0);
    }

    #[test]
    fn test_concurrent_compiles() {
        let compiler = StencilCompiler::default();
        std::thread::scope(|scope| {
            for i in 0..4 {
                let compiler = &compiler;
                scope.spawn(move || {
                    let source = format!("print({i})");
                    compiler.compile(&source, "par.js", 1).unwrap();
                });
            }
        });
        assert_eq!(compiler.live_frontends(), 0);
    }
}
