use std::fmt;
use std::ops::Range;

use thiserror::Error;

use stencil_syntax::{LineIndex, Span, SyntaxError};
use stencil_utils::render_report;

/// Location and message of a syntax error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub filename: String,
    /// Line in the caller's numbering (base line + offset within the source).
    pub line: u32,
    pub column: u32,
    pub message: String,
    /// Byte range within the compiled source.
    pub span: Range<usize>,
}

impl Diagnostic {
    pub(crate) fn from_syntax(
        error: &SyntaxError,
        source: &str,
        filename: &str,
        base_line: u32,
    ) -> Self {
        let span = error.span();
        Self::at(span, error.to_string(), source, filename, base_line)
    }

    pub(crate) fn at(
        span: Span,
        message: String,
        source: &str,
        filename: &str,
        base_line: u32,
    ) -> Self {
        let (rel_line, column) = LineIndex::new(source).line_col(span.start);
        Self {
            filename: filename.to_string(),
            line: base_line.saturating_add(rel_line.saturating_sub(1)),
            column,
            message,
            span: span.range(),
        }
    }

    /// Render the diagnostic as an annotated source snippet.
    pub fn render(&self, source: &str) -> String {
        render_report(&self.filename, source, self.span.clone(), &self.message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.filename, self.line, self.column, self.message
        )
    }
}

fn describe_syntax(diagnostic: &Option<Diagnostic>) -> String {
    match diagnostic {
        Some(diagnostic) => format!("SyntaxError: {diagnostic}"),
        None => "compilation failed".to_string(),
    }
}

/// Why a compile produced no artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("{}", describe_syntax(.0))]
    SyntaxError(Option<Diagnostic>),

    #[error("compilation context unavailable: {reason}")]
    ContextUnavailable { reason: String },

    #[error("script nesting exceeds the depth limit of {depth_limit}")]
    StackExhausted { depth_limit: usize },
}

impl CompileError {
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            CompileError::SyntaxError(diagnostic) => diagnostic.as_ref(),
            _ => None,
        }
    }
}

/// Why an artifact could not be bound to an execution context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstantiateError {
    #[error("ReferenceError: {name} is not defined (while linking {filename})")]
    UnresolvedGlobal { name: String, filename: String },
}

/// Unhandled error raised while a script runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Uncaught {value} at {location}")]
    Uncaught { value: String, location: String },

    #[error("TypeError: {message} at {location}")]
    TypeError { message: String, location: String },

    #[error("ReferenceError: {message} at {location}")]
    ReferenceError { message: String, location: String },

    #[error("RangeError: {message} at {location}")]
    RangeError { message: String, location: String },

    #[error("{function}: {message} at {location}")]
    Host {
        function: String,
        message: String,
        location: String,
    },

    #[error("script was instantiated by a different execution context")]
    ForeignScript,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_diagnostic_renders_generic_message() {
        assert_eq!(
            CompileError::SyntaxError(None).to_string(),
            "compilation failed"
        );
    }

    #[test]
    fn test_diagnostic_lines_follow_base_line() {
        let source = "\nprint(1)\n  await x";
        let diagnostic = Diagnostic::at(
            Span::new(12, 17),
            "await is only valid in async functions".into(),
            source,
            "none",
            3,
        );
        assert_eq!(diagnostic.line, 5);
        assert_eq!(diagnostic.column, 3);
        assert_eq!(
            diagnostic.to_string(),
            "none:5:3: await is only valid in async functions"
        );
        assert!(diagnostic.render(source).contains("await is only valid"));
    }
}
