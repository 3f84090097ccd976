//! Token types for the Gambit lexer and parser.
//!
//! Tokens are the atomic syntactic units produced by the lexer and consumed
//! by the parser. Operators and punctuation are matched against a fixed
//! lexeme table by longest match (`==` beats `=`); identifiers that spell a
//! keyword are reclassified after matching, with `true`/`false` becoming
//! [`TokenKind::Boolean`].

use gambit_base::{Source, Span};
use std::fmt;
use std::rc::Rc;

/// The kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Statement terminator; one per newline outside comments.
    Line,
    EndOfFile,

    Equal,
    NotEqual,
    LessThanEqual,
    GreaterThanEqual,

    Add,
    Sub,
    Mul,
    Div,
    Dot,
    Comma,
    Colon,
    Question,
    Assign,
    Hash,
    ParenL,
    ParenR,
    CurlyL,
    CurlyR,
    SquareL,
    SquareR,
    TrigL,
    TrigR,

    KeyEntity,
    KeyEnum,
    KeyFn,
    KeyState,
    KeyLet,
    KeyVar,
    KeyIf,
    KeyElse,
    KeyFor,
    KeyIn,
    KeyLoop,
    KeyMatch,
    KeyAny,
    KeyBreak,
    KeyContinue,
    KeyReturn,
    KeyUntil,
    KeyChoose,
    KeyFilter,
    KeyInsert,
    KeyMap,
    KeyAnd,
    KeyOr,
    KeyNot,

    Boolean,
    Number,
    String,
    Identity,
}

impl TokenKind {
    /// The kind's name as used in diagnostics ("Expected Identity, got …").
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Line => "Line",
            TokenKind::EndOfFile => "EndOfFile",
            TokenKind::Equal => "Equal",
            TokenKind::NotEqual => "NotEqual",
            TokenKind::LessThanEqual => "LessThanEqual",
            TokenKind::GreaterThanEqual => "GreaterThanEqual",
            TokenKind::Add => "Add",
            TokenKind::Sub => "Sub",
            TokenKind::Mul => "Mul",
            TokenKind::Div => "Div",
            TokenKind::Dot => "Dot",
            TokenKind::Comma => "Comma",
            TokenKind::Colon => "Colon",
            TokenKind::Question => "Question",
            TokenKind::Assign => "Assign",
            TokenKind::Hash => "Hash",
            TokenKind::ParenL => "ParenL",
            TokenKind::ParenR => "ParenR",
            TokenKind::CurlyL => "CurlyL",
            TokenKind::CurlyR => "CurlyR",
            TokenKind::SquareL => "SquareL",
            TokenKind::SquareR => "SquareR",
            TokenKind::TrigL => "TrigL",
            TokenKind::TrigR => "TrigR",
            TokenKind::KeyEntity => "KeyEntity",
            TokenKind::KeyEnum => "KeyEnum",
            TokenKind::KeyFn => "KeyFn",
            TokenKind::KeyState => "KeyState",
            TokenKind::KeyLet => "KeyLet",
            TokenKind::KeyVar => "KeyVar",
            TokenKind::KeyIf => "KeyIf",
            TokenKind::KeyElse => "KeyElse",
            TokenKind::KeyFor => "KeyFor",
            TokenKind::KeyIn => "KeyIn",
            TokenKind::KeyLoop => "KeyLoop",
            TokenKind::KeyMatch => "KeyMatch",
            TokenKind::KeyAny => "KeyAny",
            TokenKind::KeyBreak => "KeyBreak",
            TokenKind::KeyContinue => "KeyContinue",
            TokenKind::KeyReturn => "KeyReturn",
            TokenKind::KeyUntil => "KeyUntil",
            TokenKind::KeyChoose => "KeyChoose",
            TokenKind::KeyFilter => "KeyFilter",
            TokenKind::KeyInsert => "KeyInsert",
            TokenKind::KeyMap => "KeyMap",
            TokenKind::KeyAnd => "KeyAnd",
            TokenKind::KeyOr => "KeyOr",
            TokenKind::KeyNot => "KeyNot",
            TokenKind::Boolean => "Boolean",
            TokenKind::Number => "Number",
            TokenKind::String => "String",
            TokenKind::Identity => "Identity",
        }
    }
}

/// Operator and punctuation lexemes, longest first so that `==` wins
/// over `=` and `<=` over `<`.
pub const LEXEMES: &[(&str, TokenKind)] = &[
    ("==", TokenKind::Equal),
    ("!=", TokenKind::NotEqual),
    ("<=", TokenKind::LessThanEqual),
    (">=", TokenKind::GreaterThanEqual),
    ("+", TokenKind::Add),
    ("-", TokenKind::Sub),
    ("*", TokenKind::Mul),
    ("/", TokenKind::Div),
    (".", TokenKind::Dot),
    (",", TokenKind::Comma),
    (":", TokenKind::Colon),
    ("?", TokenKind::Question),
    ("=", TokenKind::Assign),
    ("#", TokenKind::Hash),
    ("(", TokenKind::ParenL),
    (")", TokenKind::ParenR),
    ("{", TokenKind::CurlyL),
    ("}", TokenKind::CurlyR),
    ("[", TokenKind::SquareL),
    ("]", TokenKind::SquareR),
    ("<", TokenKind::TrigL),
    (">", TokenKind::TrigR),
];

/// Identifiers that are reclassified to keyword kinds.
pub const KEYWORDS: &[(&str, TokenKind)] = &[
    ("entity", TokenKind::KeyEntity),
    ("enum", TokenKind::KeyEnum),
    ("fn", TokenKind::KeyFn),
    ("state", TokenKind::KeyState),
    ("let", TokenKind::KeyLet),
    ("var", TokenKind::KeyVar),
    ("if", TokenKind::KeyIf),
    ("else", TokenKind::KeyElse),
    ("for", TokenKind::KeyFor),
    ("in", TokenKind::KeyIn),
    ("loop", TokenKind::KeyLoop),
    ("match", TokenKind::KeyMatch),
    ("any", TokenKind::KeyAny),
    ("break", TokenKind::KeyBreak),
    ("continue", TokenKind::KeyContinue),
    ("return", TokenKind::KeyReturn),
    ("until", TokenKind::KeyUntil),
    ("choose", TokenKind::KeyChoose),
    ("filter", TokenKind::KeyFilter),
    ("insert", TokenKind::KeyInsert),
    ("map", TokenKind::KeyMap),
    ("and", TokenKind::KeyAnd),
    ("or", TokenKind::KeyOr),
    ("not", TokenKind::KeyNot),
    ("true", TokenKind::Boolean),
    ("false", TokenKind::Boolean),
];

/// A lexeme tagged with its kind and position.
///
/// `line` and `column` are 1-based, `position` is a byte offset into the
/// source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
    pub position: usize,
}

impl Token {
    pub fn new(
        kind: TokenKind,
        text: impl Into<String>,
        line: usize,
        column: usize,
        position: usize,
    ) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            column,
            position,
        }
    }

    /// The span of this token within `source`.
    pub fn span(&self, source: &Rc<Source>) -> Span {
        Span::new(
            self.line,
            self.column,
            self.position,
            self.text.len(),
            self.kind == TokenKind::Line,
            Rc::clone(source),
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == TokenKind::Line {
            write!(f, "[{}:{} /]", self.line, self.column)
        } else {
            write!(
                f,
                "[{}:{} {} {}]",
                self.line,
                self.column,
                self.kind.name(),
                self.text
            )
        }
    }
}
