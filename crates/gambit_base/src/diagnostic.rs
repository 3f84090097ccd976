//! User-visible compile errors.
//!
//! A [`Diagnostic`] describes one fault in the user's program: a message, a
//! primary line and column, the source it belongs to, and zero or more
//! [`Span`]s whose text is shown under the message. Diagnostics are never
//! propagated as Rust errors; each stage appends them to the shared
//! [`DiagnosticSink`] and carries on so one compilation can report many
//! faults.
//!
//! # Display format
//!
//! ```text
//! [3:7] 'Colour' is not defined.
//!
//! Colour
//! ```
//!
//! Each attached span follows the message after a blank line. When a
//! diagnostic's spans touch more than one source, every span is prefixed
//! with `path  line:column` so the reader can tell them apart.

use crate::source::Source;
use crate::span::Span;
use std::fmt;
use std::rc::Rc;

/// One user-visible compile error.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub source: Rc<Source>,
    pub spans: Vec<Span>,
}

impl Diagnostic {
    pub fn new(
        message: impl Into<String>,
        line: usize,
        column: usize,
        source: Rc<Source>,
    ) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            source,
            spans: Vec::new(),
        }
    }

    /// Builds a diagnostic positioned at a span's start, with the span
    /// attached for display.
    pub fn at_span(message: impl Into<String>, span: Span) -> Self {
        let source = Rc::clone(&span.source);
        let mut diagnostic = Diagnostic::new(message, span.line, span.column, source);
        diagnostic.spans.push(span);
        diagnostic
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.spans.push(span);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}] {}", self.line, self.column, self.message)?;

        let multiple_sources = self
            .spans
            .iter()
            .any(|span| !Source::same(&span.source, &self.source));

        for span in &self.spans {
            write!(f, "\n\n")?;
            if multiple_sources {
                writeln!(
                    f,
                    "{}  {}:{}",
                    span.source.file_path(),
                    span.line,
                    span.column
                )?;
            }
            write!(f, "{}", span.source_text())?;
        }

        Ok(())
    }
}

/// Append-only collection of [`Diagnostic`]s for one compilation.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn error(&mut self, message: impl Into<String>, line: usize, column: usize, source: &Rc<Source>) {
        self.push(Diagnostic::new(message, line, column, Rc::clone(source)));
    }

    pub fn error_at_span(&mut self, message: impl Into<String>, span: Span) {
        self.push(Diagnostic::at_span(message, span));
    }

    pub fn error_at_spans(&mut self, message: impl Into<String>, spans: Vec<Span>) {
        let mut spans = spans.into_iter();
        let first = match spans.next() {
            Some(span) => span,
            None => return,
        };
        let mut diagnostic = Diagnostic::at_span(message, first);
        for span in spans {
            diagnostic = diagnostic.with_span(span);
        }
        self.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Diagnostics grouped per source, in the order each source first
    /// produced one. Each compilation has one source today, but spans can
    /// reference intrinsic declarations from elsewhere.
    pub fn grouped_by_source(&self) -> Vec<(Rc<Source>, Vec<&Diagnostic>)> {
        let mut groups: Vec<(Rc<Source>, Vec<&Diagnostic>)> = Vec::new();
        for diagnostic in &self.diagnostics {
            match groups
                .iter_mut()
                .find(|(source, _)| Source::same(source, &diagnostic.source))
            {
                Some((_, list)) => list.push(diagnostic),
                None => groups.push((Rc::clone(&diagnostic.source), vec![diagnostic])),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_source() -> Rc<Source> {
        Rc::new(Source::new("demo.gambit", "enum Color { Red }\n"))
    }

    #[test]
    fn display_is_line_column_then_message() {
        let diagnostic = Diagnostic::new("Expected expression", 3, 7, demo_source());
        assert_eq!(diagnostic.to_string(), "[3:7] Expected expression");
    }

    #[test]
    fn display_renders_span_text_after_blank_line() {
        let source = demo_source();
        let span = Span::new(1, 6, 5, 5, false, Rc::clone(&source));
        let diagnostic = Diagnostic::new("'Color' already exists.", 1, 6, source).with_span(span);
        assert_eq!(
            diagnostic.to_string(),
            "[1:6] 'Color' already exists.\n\nColor"
        );
    }

    #[test]
    fn spans_from_other_sources_are_prefixed_with_path() {
        let primary = demo_source();
        let other = Rc::new(Source::new("other.gambit", "entity Player\n"));
        let span = Span::new(1, 1, 0, 6, false, Rc::clone(&other));
        let diagnostic = Diagnostic::new("clash", 1, 1, primary).with_span(span);
        let text = diagnostic.to_string();
        assert!(text.contains("other.gambit  1:1\n"));
        assert!(text.contains("entity"));
    }

    #[test]
    fn sink_is_append_only_and_ordered() {
        let source = demo_source();
        let mut sink = DiagnosticSink::new();
        sink.error("first", 1, 1, &source);
        sink.error("second", 2, 1, &source);
        let messages: Vec<_> = sink.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, ["first", "second"]);
    }

    #[test]
    fn grouped_by_source_keeps_first_seen_order() {
        let a = demo_source();
        let b = Rc::new(Source::new("b.gambit", ""));
        let mut sink = DiagnosticSink::new();
        sink.error("one", 1, 1, &a);
        sink.error("two", 1, 1, &b);
        sink.error("three", 2, 1, &a);
        let groups = sink.grouped_by_source();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].1.len(), 1);
    }
}
