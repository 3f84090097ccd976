//! Source location tracking for diagnostics.
//!
//! A [`Span`] names a contiguous region of one [`Source`]: the line and
//! column where it starts, its byte position and length, and whether it
//! crosses a line boundary. Every token and program-model node that can
//! appear in a diagnostic carries one.
//!
//! Spans from the same source can be merged: the union runs from the
//! earlier start to the later end. Merging spans from *different* sources
//! has no meaning and is reported as a [`CompilerError`].

use crate::error::CompilerError;
use crate::source::Source;
use std::rc::Rc;

/// A region of source text with positional context.
///
/// `line` and `column` are 1-based; `position` is a 0-based byte offset.
#[derive(Debug, Clone)]
pub struct Span {
    pub line: usize,
    pub column: usize,
    pub position: usize,
    pub length: usize,
    pub multiline: bool,
    pub source: Rc<Source>,
}

impl Span {
    pub fn new(
        line: usize,
        column: usize,
        position: usize,
        length: usize,
        multiline: bool,
        source: Rc<Source>,
    ) -> Self {
        Self {
            line,
            column,
            position,
            length,
            multiline,
            source,
        }
    }

    /// The spanned source text, byte-for-byte as written.
    pub fn source_text(&self) -> &str {
        self.source.substr(self.position, self.length)
    }

    /// Creates a span covering both `self` and `other`.
    ///
    /// The operands may arrive in either order. Merging spans that point
    /// into different sources is an internal invariant violation.
    pub fn merge(&self, other: &Span) -> Result<Span, CompilerError> {
        if !Source::same(&self.source, &other.source) {
            return Err(CompilerError::new("Attempt to merge spans from different sources")
                .with_span(self.clone())
                .with_span(other.clone()));
        }

        let (start, end) = if self.position <= other.position {
            (self, other)
        } else {
            (other, self)
        };

        Ok(Span {
            line: start.line,
            column: start.column,
            position: start.position,
            length: (end.position + end.length).saturating_sub(start.position),
            multiline: start.multiline || end.multiline || start.line != end.line,
            source: Rc::clone(&start.source),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_source() -> Rc<Source> {
        Rc::new(Source::new("demo.gambit", "enum Color { Red, Green }\n"))
    }

    #[test]
    fn source_text_recovers_exact_bytes() {
        let source = demo_source();
        let span = Span::new(1, 6, 5, 5, false, Rc::clone(&source));
        assert_eq!(span.source_text(), "Color");
    }

    #[test]
    fn merge_runs_from_earlier_start_to_later_end() {
        let source = demo_source();
        let keyword = Span::new(1, 1, 0, 4, false, Rc::clone(&source));
        let name = Span::new(1, 6, 5, 5, false, Rc::clone(&source));
        let merged = keyword.merge(&name).unwrap();
        assert_eq!(merged.position, 0);
        assert_eq!(merged.length, 10);
        assert_eq!(merged.source_text(), "enum Color");
    }

    #[test]
    fn merge_accepts_operands_in_either_order() {
        let source = demo_source();
        let keyword = Span::new(1, 1, 0, 4, false, Rc::clone(&source));
        let name = Span::new(1, 6, 5, 5, false, Rc::clone(&source));
        let merged = name.merge(&keyword).unwrap();
        assert_eq!(merged.position, 0);
        assert_eq!(merged.source_text(), "enum Color");
    }

    #[test]
    fn merge_across_lines_is_multiline() {
        let source = demo_source();
        let a = Span::new(1, 1, 0, 4, false, Rc::clone(&source));
        let b = Span::new(2, 1, 26, 0, false, Rc::clone(&source));
        let merged = a.merge(&b).unwrap();
        assert!(merged.multiline);
    }

    #[test]
    fn merge_across_sources_is_a_compiler_bug() {
        let a = Span::new(1, 1, 0, 4, false, demo_source());
        let b = Span::new(1, 1, 0, 4, false, demo_source());
        assert!(a.merge(&b).is_err());
    }
}
