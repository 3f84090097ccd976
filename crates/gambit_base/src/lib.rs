//! # gambit-base
//!
//! Structural atoms for the Gambit compiler.
//!
//! This crate provides the foundational types shared by every stage of the
//! front-end:
//!
//! - [`Source`] — owns a file's path and text
//! - [`Span`] — a region of source text with line/column context
//! - [`Diagnostic`]/[`DiagnosticSink`] — user-visible compile errors
//! - [`CompilerError`] — internal invariant violations
//!
//! # Design Principles
//!
//! This crate has **no knowledge of the Gambit grammar or the program
//! model**. It provides only the generic infrastructure the language crate
//! builds upon.

pub mod diagnostic;
pub mod error;
pub mod source;
pub mod span;

pub use diagnostic::{Diagnostic, DiagnosticSink};
pub use error::{CompilerError, Result};
pub use source::Source;
pub use span::Span;
