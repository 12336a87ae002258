//! Reference script engine behind the cache's engine boundary.
//!
//! The boundary is small: a [`ScriptCompiler`] produces [`ArtifactHandle`]s
//! that any thread may hold, and a per-thread [`ExecutionContext`] created from
//! a shared [`Engine`] instantiates and runs them.

pub mod artifact;
pub mod compiler;
pub mod context;
pub mod engine;
pub mod error;
pub mod frontend;
pub mod host;
mod lower;
pub mod sink;
pub mod value;
mod vm;

pub use artifact::{ArtifactHandle, Constant, Op, Stencil};
pub use compiler::{ScriptCompiler, StencilCompiler};
pub use context::{ExecutionContext, Script};
pub use engine::Engine;
pub use error::{CompileError, Diagnostic, InstantiateError, RuntimeError};
pub use frontend::{FrontendBudget, FrontendContext};
pub use host::{HostFunction, HostResult};
pub use sink::{BufferSink, OutputLine, OutputSink, StdoutSink};
pub use value::Value;
