//! Source text ownership.
//!
//! A [`Source`] owns the path and full text of one compilation input. Every
//! [`Span`](crate::Span) and [`Diagnostic`](crate::Diagnostic) holds a
//! reference back to the `Source` it points into, so substrings can be
//! recovered verbatim for display.

use std::rc::Rc;

/// One compilation input: a file path plus its full text.
///
/// Sources are created once, wrapped in an [`Rc`], and never mutated.
/// Each compilation processes exactly one source.
#[derive(Debug)]
pub struct Source {
    file_path: String,
    content: String,
    length: usize,
}

impl Source {
    /// Creates a source from a path and its already-loaded content.
    ///
    /// File I/O is the caller's concern; the compiler core only ever sees
    /// in-memory text.
    pub fn new(file_path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let length = content.len();
        Self {
            file_path: file_path.into(),
            content,
            length,
        }
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Length of the content in bytes.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The substring starting at `position`, `length` bytes long.
    ///
    /// Out-of-range requests are clamped to the end of the content.
    pub fn substr(&self, position: usize, length: usize) -> &str {
        let start = position.min(self.length);
        let end = (position + length).min(self.length);
        &self.content[start..end]
    }

    /// `true` if `a` and `b` are the same source object.
    ///
    /// Identity, not content, is what matters: two files with equal text are
    /// still different sources for diagnostics.
    pub fn same(a: &Rc<Source>, b: &Rc<Source>) -> bool {
        Rc::ptr_eq(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_stores_path_and_content() {
        let source = Source::new("main.gambit", "entity Player\n");
        assert_eq!(source.file_path(), "main.gambit");
        assert_eq!(source.content(), "entity Player\n");
        assert_eq!(source.len(), 14);
    }

    #[test]
    fn substr_recovers_exact_bytes() {
        let source = Source::new("main.gambit", "enum Color { Red }");
        assert_eq!(source.substr(0, 4), "enum");
        assert_eq!(source.substr(5, 5), "Color");
    }

    #[test]
    fn substr_clamps_out_of_range() {
        let source = Source::new("main.gambit", "abc");
        assert_eq!(source.substr(1, 100), "bc");
        assert_eq!(source.substr(50, 3), "");
    }

    #[test]
    fn same_compares_identity_not_content() {
        let a = Rc::new(Source::new("a.gambit", "x"));
        let b = Rc::new(Source::new("a.gambit", "x"));
        assert!(Source::same(&a, &Rc::clone(&a)));
        assert!(!Source::same(&a, &b));
    }
}
