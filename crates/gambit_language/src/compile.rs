//! Compilation driver.
//!
//! [`compile_source`] runs the whole front-end over one source text: lexer,
//! parser, resolver, checker. Later stages still run when earlier ones
//! reported faults — invalid nodes are marked and treated as opaque — so a
//! single compilation surfaces as many diagnostics as it can. An `Err`
//! from any stage is an internal compiler bug, never a verdict on the
//! user's program.

use crate::apm::Program;
use crate::checker::Checker;
use crate::intrinsics::Intrinsics;
use crate::lexer;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::token::Token;
use gambit_base::{DiagnosticSink, Result, Source};
use std::rc::Rc;

/// Everything one compilation produced.
pub struct Compilation {
    pub source: Rc<Source>,
    pub tokens: Vec<Token>,
    pub program: Program,
    pub intrinsics: Intrinsics,
    pub sink: DiagnosticSink,
}

impl Compilation {
    /// `true` when no user-visible diagnostics were produced.
    pub fn succeeded(&self) -> bool {
        self.sink.is_empty()
    }
}

/// Compiles one source text through every front-end stage.
pub fn compile_source(file_path: &str, content: &str) -> Result<Compilation> {
    let source = Rc::new(Source::new(file_path, content));
    let mut sink = DiagnosticSink::new();
    let intrinsics = Intrinsics::new();

    let tokens = lexer::tokenise(&source, &mut sink);
    let program = Parser::new(&tokens, &source, &intrinsics, &mut sink).parse()?;
    Resolver::new(&intrinsics, &mut sink).resolve(&program)?;
    Checker::new(&intrinsics, &mut sink).check(&program)?;

    Ok(Compilation {
        source,
        tokens,
        program,
        intrinsics,
        sink,
    })
}
