//! Internal compiler errors.
//!
//! A [`CompilerError`] reports an invariant violation inside the compiler
//! itself, such as asking for the pattern of a node that should no longer
//! exist after resolution. It is fatal for the compilation in progress and
//! unwinds the current stage back to the driver through ordinary `Result`
//! propagation. It is never a normal outcome for bad user input; that is
//! what [`Diagnostic`](crate::Diagnostic) is for.

use crate::span::Span;
use std::fmt;

/// An invariant violation inside the compiler, with up to two spans of
/// context.
#[derive(Debug, Clone)]
pub struct CompilerError {
    pub message: String,
    pub spans: Vec<Span>,
}

impl CompilerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            spans: Vec::new(),
        }
    }

    /// Attaches a span of context to the error.
    pub fn with_span(mut self, span: Span) -> Self {
        self.spans.push(span);
        self
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for span in &self.spans {
            write!(
                f,
                "\n\n{}:{}  {}{}{}",
                span.line,
                span.column,
                span.source.file_path(),
                if span.multiline { "\n" } else { "  " },
                span.source_text()
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for CompilerError {}

/// Alias for `std::result::Result<T, CompilerError>`.
///
/// The return type of every compiler stage that can hit an internal
/// invariant violation.
pub type Result<T> = std::result::Result<T, CompilerError>;
