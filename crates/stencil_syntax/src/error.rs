use thiserror::Error;

use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexerError {
    #[error("unexpected character `{ch}`")]
    UnexpectedChar { ch: char, span: Span },
    #[error("unterminated string literal")]
    UnterminatedString { span: Span },
    #[error("unterminated template literal")]
    UnterminatedTemplate { span: Span },
    #[error("unterminated block comment")]
    UnterminatedComment { span: Span },
    #[error("invalid escape sequence in literal")]
    InvalidEscape { span: Span },
    #[error("invalid number literal `{text}`")]
    InvalidNumber { text: String, span: Span },
    #[error("template literals nested more than {limit} levels deep")]
    TemplateNesting { limit: usize, span: Span },
}

impl LexerError {
    pub fn span(&self) -> Span {
        match self {
            LexerError::UnexpectedChar { span, .. }
            | LexerError::UnterminatedString { span }
            | LexerError::UnterminatedTemplate { span }
            | LexerError::UnterminatedComment { span }
            | LexerError::InvalidEscape { span }
            | LexerError::InvalidNumber { span, .. }
            | LexerError::TemplateNesting { span, .. } => *span,
        }
    }
}

/// Everything that can make a script fail to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error(transparent)]
    Lex(#[from] LexerError),
    #[error("{message}")]
    Unexpected { message: String, span: Span },
    #[error("nesting exceeds the compile depth limit of {limit}")]
    TooDeep { limit: usize, span: Span },
}

impl SyntaxError {
    pub fn unexpected(message: impl Into<String>, span: Span) -> Self {
        SyntaxError::Unexpected {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            SyntaxError::Lex(err) => err.span(),
            SyntaxError::Unexpected { span, .. } | SyntaxError::TooDeep { span, .. } => *span,
        }
    }
}
