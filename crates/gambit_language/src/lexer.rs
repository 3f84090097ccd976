//! One-pass tokeniser for Gambit source text.
//!
//! The lexer consumes the source left to right exactly once and produces a
//! token stream terminated by [`TokenKind::EndOfFile`]. Newlines are
//! significant (they terminate statements) and surface as
//! [`TokenKind::Line`] tokens; spaces and tabs are skipped.
//!
//! ## Comments
//!
//! - `// …` runs to the end of the line. A `Line` token is emitted *before*
//!   the comment so the comment cannot swallow the statement terminator;
//!   the newline that ends the comment is consumed by it.
//! - `/* … */` nests to any depth. A block that crosses at least one
//!   newline emits a single phantom `Line` token when it closes, positioned
//!   at the block's opening. Single-line blocks emit nothing.
//!
//! ## Recovery
//!
//! An unrecognised character logs one diagnostic, enters panic mode and
//! skips a character; further unrecognised characters stay silent until a
//! valid token resets panic mode.

use crate::token::{Token, TokenKind, KEYWORDS, LEXEMES};
use gambit_base::{DiagnosticSink, Source};
use std::rc::Rc;

/// Tokenises `source`, appending lexical errors to `sink`.
///
/// The returned stream always ends with an `EndOfFile` token, even when the
/// source is empty or ends mid-error.
pub fn tokenise(source: &Rc<Source>, sink: &mut DiagnosticSink) -> Vec<Token> {
    Lexer::new(source).run(sink)
}

struct Lexer<'a> {
    source: &'a Rc<Source>,
    content: &'a str,
    position: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    panic_mode: bool,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a Rc<Source>) -> Self {
        Self {
            source,
            content: source.content(),
            position: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            panic_mode: false,
        }
    }

    fn rest(&self) -> &'a str {
        &self.content[self.position..]
    }

    /// Consumes `text`, which must be the next bytes of the source.
    fn advance(&mut self, text: &str) {
        self.position += text.len();
        self.column += text.chars().count();
    }

    fn advance_line(&mut self) {
        self.position += 1;
        self.line += 1;
        self.column = 1;
    }

    /// Consumes the single character at the current position.
    fn advance_char(&mut self) {
        match self.rest().chars().next() {
            Some(ch) => {
                self.position += ch.len_utf8();
                self.column += 1;
            }
            None => self.position = self.content.len(),
        }
    }

    fn push(&mut self, kind: TokenKind, text: &str) {
        self.tokens
            .push(Token::new(kind, text, self.line, self.column, self.position));
        self.advance(text);
        self.panic_mode = false;
    }

    fn push_line_token(&mut self) {
        self.tokens.push(Token::new(
            TokenKind::Line,
            "\n",
            self.line,
            self.column,
            self.position,
        ));
    }

    fn run(mut self, sink: &mut DiagnosticSink) -> Vec<Token> {
        let mut block_comment_nesting = 0usize;
        let mut in_line_comment = false;

        // The phantom Line token a multi-line block comment will emit on
        // close, timed at the block's opening.
        let mut phantom_line: Option<Token> = None;
        let mut insert_phantom_line = false;

        while self.position < self.content.len() {
            let rest = self.rest();

            if in_line_comment {
                if rest.starts_with('\n') {
                    self.advance_line();
                    in_line_comment = false;
                } else {
                    self.advance_char();
                }
                continue;
            }

            if rest.starts_with("/*") {
                if block_comment_nesting == 0 {
                    phantom_line = Some(Token::new(
                        TokenKind::Line,
                        "\n",
                        self.line,
                        self.column,
                        self.position,
                    ));
                    insert_phantom_line = false;
                }
                block_comment_nesting += 1;
                self.advance("/*");
                continue;
            }

            if block_comment_nesting > 0 {
                if rest.starts_with("*/") {
                    block_comment_nesting -= 1;
                    self.advance("*/");
                    if block_comment_nesting == 0 && insert_phantom_line {
                        if let Some(token) = phantom_line.take() {
                            self.tokens.push(token);
                        }
                    }
                } else if rest.starts_with('\n') {
                    self.advance_line();
                    insert_phantom_line = true;
                } else {
                    self.advance_char();
                }
                continue;
            }

            if rest.starts_with("//") {
                self.push_line_token();
                in_line_comment = true;
                self.advance("//");
                continue;
            }

            if rest.starts_with('\n') {
                self.push_line_token();
                self.advance_line();
                continue;
            }

            if rest.starts_with(' ') || rest.starts_with('\t') {
                self.advance(&rest[..1]);
                continue;
            }

            if self.match_token() {
                continue;
            }

            let Some(ch) = rest.chars().next() else { break };
            if !self.panic_mode {
                sink.error(
                    format!("Could not parse character '{ch}', syntax not recognised."),
                    self.line,
                    self.column,
                    self.source,
                );
            }
            self.advance_char();
            self.panic_mode = true;
        }

        self.tokens.push(Token::new(
            TokenKind::EndOfFile,
            "",
            self.line,
            self.column,
            self.position,
        ));
        self.tokens
    }

    /// Attempts to lex one token at the current position. Longest-match
    /// over the operator table, then numbers, strings and identifiers.
    fn match_token(&mut self) -> bool {
        let rest = self.rest();

        for (lexeme, kind) in LEXEMES {
            if rest.starts_with(lexeme) {
                self.push(*kind, lexeme);
                return true;
            }
        }

        if let Some(text) = match_number(rest) {
            self.push(TokenKind::Number, text);
            return true;
        }

        if let Some(text) = match_string(rest) {
            self.push(TokenKind::String, text);
            return true;
        }

        if let Some(text) = match_identity(rest) {
            let kind = KEYWORDS
                .iter()
                .find(|(word, _)| *word == text)
                .map(|(_, kind)| *kind)
                .unwrap_or(TokenKind::Identity);
            self.push(kind, text);
            return true;
        }

        false
    }
}

/// `[0-9]+(\.[0-9]+)?` — the fractional part needs at least one digit, so
/// `1.` is a number followed by a dot.
fn match_number(rest: &str) -> Option<&str> {
    let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }

    let after = &rest[digits..];
    if after.starts_with('.') {
        let fraction = after[1..].bytes().take_while(|b| b.is_ascii_digit()).count();
        if fraction > 0 {
            return Some(&rest[..digits + 1 + fraction]);
        }
    }
    Some(&rest[..digits])
}

/// A double-quoted literal with backslash escapes, closed on the same line.
fn match_string(rest: &str) -> Option<&str> {
    let mut chars = rest.char_indices();
    match chars.next() {
        Some((_, '"')) => {}
        _ => return None,
    }

    let mut escaped = false;
    for (index, ch) in chars {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '\n' => return None,
            '"' => return Some(&rest[..index + 1]),
            _ => {}
        }
    }
    None
}

/// `[A-Za-z][A-Za-z0-9_]*`
fn match_identity(rest: &str) -> Option<&str> {
    let first = rest.bytes().next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    let length = rest
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    Some(&rest[..length])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(text: &str) -> (Vec<Token>, DiagnosticSink) {
        let source = Rc::new(Source::new("test.gambit", text));
        let mut sink = DiagnosticSink::new();
        let tokens = tokenise(&source, &mut sink);
        (tokens, sink)
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_source_is_just_end_of_file() {
        let (tokens, sink) = lex("");
        assert_eq!(kinds(&tokens), [TokenKind::EndOfFile]);
        assert!(sink.is_empty());
    }

    #[test]
    fn keywords_are_reclassified_identities() {
        let (tokens, _) = lex("entity Player");
        assert_eq!(
            kinds(&tokens),
            [
                TokenKind::KeyEntity,
                TokenKind::Identity,
                TokenKind::EndOfFile
            ]
        );
        assert_eq!(tokens[1].text, "Player");
    }

    #[test]
    fn true_and_false_lex_as_booleans() {
        let (tokens, _) = lex("true false");
        assert_eq!(tokens[0].kind, TokenKind::Boolean);
        assert_eq!(tokens[1].kind, TokenKind::Boolean);
    }

    #[test]
    fn longest_match_prefers_double_equals() {
        let (tokens, _) = lex("a == b = c <= d");
        let operators: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind != TokenKind::Identity && t.kind != TokenKind::EndOfFile)
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            operators,
            [
                TokenKind::Equal,
                TokenKind::Assign,
                TokenKind::LessThanEqual
            ]
        );
    }

    #[test]
    fn numbers_split_at_a_trailing_dot() {
        let (tokens, _) = lex("1. 2.5");
        assert_eq!(
            kinds(&tokens),
            [
                TokenKind::Number,
                TokenKind::Dot,
                TokenKind::Number,
                TokenKind::EndOfFile
            ]
        );
        assert_eq!(tokens[0].text, "1");
        assert_eq!(tokens[2].text, "2.5");
    }

    #[test]
    fn strings_keep_their_quotes_and_escapes() {
        let (tokens, sink) = lex(r#""hello \"there\"""#);
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].text, r#""hello \"there\"""#);
        assert!(sink.is_empty());
    }

    #[test]
    fn unterminated_string_is_an_unrecognised_character() {
        let (_, sink) = lex("\"oops\n");
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn newline_emits_a_line_token() {
        let (tokens, _) = lex("a\nb");
        assert_eq!(
            kinds(&tokens),
            [
                TokenKind::Identity,
                TokenKind::Line,
                TokenKind::Identity,
                TokenKind::EndOfFile
            ]
        );
        assert_eq!(tokens[2].line, 2);
        assert_eq!(tokens[2].column, 1);
    }

    #[test]
    fn line_comment_emits_line_token_before_the_comment() {
        let (tokens, _) = lex("a // trailing words\nb");
        assert_eq!(
            kinds(&tokens),
            [
                TokenKind::Identity,
                TokenKind::Line,
                TokenKind::Identity,
                TokenKind::EndOfFile
            ]
        );
        // The Line token sits where the comment starts, not at the newline.
        assert_eq!(tokens[1].line, 1);
        assert_eq!(tokens[1].column, 3);
    }

    #[test]
    fn single_line_block_comment_emits_nothing() {
        let (tokens, _) = lex("a /* quiet */ b");
        assert_eq!(
            kinds(&tokens),
            [
                TokenKind::Identity,
                TokenKind::Identity,
                TokenKind::EndOfFile
            ]
        );
    }

    #[test]
    fn multiline_block_comment_emits_one_phantom_line() {
        let (tokens, _) = lex("a /* one\ntwo\nthree */ b");
        assert_eq!(
            kinds(&tokens),
            [
                TokenKind::Identity,
                TokenKind::Line,
                TokenKind::Identity,
                TokenKind::EndOfFile
            ]
        );
        // Phantom token is timed at the block's opening.
        assert_eq!(tokens[1].line, 1);
        assert_eq!(tokens[1].column, 3);
    }

    #[test]
    fn block_comments_nest() {
        let (tokens, sink) = lex("a /* outer /* inner */ still out */ b");
        assert_eq!(
            kinds(&tokens),
            [
                TokenKind::Identity,
                TokenKind::Identity,
                TokenKind::EndOfFile
            ]
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn unrecognised_character_logs_once_and_reaches_end_of_file() {
        let (tokens, sink) = lex("%");
        assert_eq!(sink.len(), 1);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::EndOfFile);
    }

    #[test]
    fn panic_mode_suppresses_a_cascade() {
        let (_, sink) = lex("%%% %%%");
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn valid_token_resets_panic_mode() {
        let (_, sink) = lex("% a %");
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn token_positions_recover_source_text() {
        let text = "state num(Player player).score: 0\n";
        let source = Rc::new(Source::new("test.gambit", text));
        let mut sink = DiagnosticSink::new();
        let tokens = tokenise(&source, &mut sink);
        for token in &tokens {
            assert_eq!(
                source.substr(token.position, token.text.len()),
                token.text,
                "token {token} does not match its source position"
            );
        }
    }
}
