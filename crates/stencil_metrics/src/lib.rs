//! Compile-time accounting shared by every worker thread.

pub mod profiler;

pub use profiler::{
    CompileProfiler, CompileStats, CompileTimer, SourceCompileStats, SourceDigest, source_digest,
};
