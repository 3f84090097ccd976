//! Recursive-descent parser.
//!
//! The parser turns the token stream into an APM whose references are
//! [`UnresolvedIdentity`] nodes; the resolver links them afterwards.
//! Expressions use a Pratt-style precedence ladder ([`Precedence`]), with
//! [`operator_should_bind`] deciding whether an infix operator belongs to
//! the current caller.
//!
//! `Line` tokens terminate statements and definitions. When peeking or
//! eating any other kind, interleaved `Line` tokens are skipped, so
//! constructs may span newlines freely between their tokens.
//!
//! ## Recovery
//!
//! The first diagnostic of a statement or definition flips *panic mode*,
//! which suppresses further diagnostics. Recovery skips to the end of the
//! line — and, at the top level, out of any open blocks — then clears the
//! flag and resumes. Name clashes found while declaring are semantic, not
//! syntactic, and do not enter panic mode.

use crate::apm::{
    AnyPattern, AssignmentStatement, CodeBlock, Entity, EnumType, EnumValue, Expression,
    ForStatement, IfStatement, IfStatementRule, InstanceList, IntrinsicLiteral, IntrinsicValue,
    InvalidExpression, InvalidValue, ListValue, LookupValue, Match, MatchRule, OptionalPattern,
    Pattern, Program, Property, PropertyIndex, Ptr, Scope, StateProperty, Statement,
    FunctionProperty, Unary, Binary, UninferredPattern, UnresolvedIdentity, Variable,
    VariableDeclaration, ptr,
};
use crate::intrinsics::Intrinsics;
use crate::scope::{self, DeclareOutcome};
use crate::token::{Token, TokenKind};
use gambit_base::{CompilerError, DiagnosticSink, Result, Source, Span};
use std::rc::Rc;

/// Binding strength of expression operators, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    LogicalOr,
    LogicalAnd,
    Term,
    Factor,
    Unary,
    Index,
    Match,
}

/// Whether an infix operator binds against the caller's precedence.
///
/// Left-associative operators require strictly stronger binding; right-
/// associative ones also bind at equal strength.
pub fn operator_should_bind(
    operator_precedence: Precedence,
    caller_precedence: Precedence,
    left_associative: bool,
) -> bool {
    if left_associative {
        operator_precedence > caller_precedence
    } else {
        operator_precedence >= caller_precedence
    }
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    source: &'a Rc<Source>,
    intrinsics: &'a Intrinsics,
    sink: &'a mut DiagnosticSink,
    current_token_index: usize,
    current_block_nesting: usize,
    panic_mode: bool,
    end_of_file_token: Token,
}

impl<'a> Parser<'a> {
    pub fn new(
        tokens: &'a [Token],
        source: &'a Rc<Source>,
        intrinsics: &'a Intrinsics,
        sink: &'a mut DiagnosticSink,
    ) -> Self {
        Self {
            tokens,
            source,
            intrinsics,
            sink,
            current_token_index: 0,
            current_block_nesting: 0,
            panic_mode: false,
            end_of_file_token: Token::new(TokenKind::EndOfFile, "", 1, 1, 0),
        }
    }

    /// Parses a whole program. Syntax faults are reported to the sink; an
    /// `Err` means an internal invariant broke.
    pub fn parse(mut self) -> Result<Program> {
        let program = Program {
            global_scope: ptr(Scope::new(None)),
        };
        self.intrinsics.declare_in(&program.global_scope)?;
        self.parse_program(&program.global_scope)?;
        Ok(program)
    }

    // UTILITY //

    fn current_token(&self) -> &Token {
        self.tokens
            .get(self.current_token_index)
            .or_else(|| self.tokens.last())
            .unwrap_or(&self.end_of_file_token)
    }

    fn to_span(&self, token: &Token) -> Span {
        token.span(self.source)
    }

    /// `true` if the next significant token is `kind`. `Line` tokens are
    /// looked through for every kind other than `Line` itself.
    fn peek(&self, kind: TokenKind) -> bool {
        let token = self.current_token();
        if token.kind == kind {
            return true;
        }

        if kind != TokenKind::Line && token.kind != TokenKind::EndOfFile {
            let mut index = self.current_token_index;
            while self.tokens.get(index).map(|ahead| ahead.kind) == Some(TokenKind::Line) {
                index += 1;
            }
            return self.tokens.get(index).map(|ahead| ahead.kind) == Some(kind);
        }

        false
    }

    /// Consumes the next significant token, which must be `kind`.
    ///
    /// On disagreement a diagnostic is reported and the current token is
    /// returned *without* being consumed, so the caller still gets a
    /// position to build spans from.
    fn eat(&mut self, kind: TokenKind) -> Token {
        if !self.peek(kind) {
            let token = self.current_token().clone();
            self.gambit_error(
                format!("Expected {}, got {}", kind.name(), token.kind.name()),
                &token,
            );
            return token;
        }

        if kind != TokenKind::Line {
            while self.current_token().kind == TokenKind::Line {
                self.current_token_index += 1;
            }
        }

        let token = self.current_token().clone();

        if kind == TokenKind::CurlyL {
            self.current_block_nesting += 1;
        } else if kind == TokenKind::CurlyR && self.current_block_nesting > 0 {
            self.current_block_nesting -= 1;
        }

        self.current_token_index += 1;
        token
    }

    /// Consumes one token of any kind, tracking block nesting.
    fn skip(&mut self) {
        match self.current_token().kind {
            TokenKind::CurlyL => self.current_block_nesting += 1,
            TokenKind::CurlyR if self.current_block_nesting > 0 => {
                self.current_block_nesting -= 1
            }
            _ => {}
        }
        self.current_token_index += 1;
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if !self.peek(kind) {
            return false;
        }
        self.eat(kind);
        true
    }

    fn end_of_file(&self) -> bool {
        self.peek(TokenKind::EndOfFile)
    }

    fn skip_whitespace(&mut self) {
        while self.match_kind(TokenKind::Line) {}
    }

    fn skip_to_end_of_line(&mut self) {
        while !self.end_of_file() && !self.match_kind(TokenKind::Line) {
            self.skip();
        }
    }

    fn skip_to_block_nesting(&mut self, target_nesting: usize) {
        while !self.end_of_file() && self.current_block_nesting != target_nesting {
            self.skip();
        }
    }

    // ERRORS //

    fn gambit_error(&mut self, message: String, token: &Token) {
        if self.panic_mode {
            return;
        }
        self.sink
            .error(message, token.line, token.column, self.source);
        self.panic_mode = true;
    }

    fn gambit_error_at_span(&mut self, message: String, span: Span) {
        if self.panic_mode {
            return;
        }
        self.sink.error_at_span(message, span);
        self.panic_mode = true;
    }

    fn gambit_error_at_spans(&mut self, message: String, spans: Vec<Span>) {
        if self.panic_mode {
            return;
        }
        if spans.is_empty() {
            let token = self.current_token().clone();
            self.sink
                .error(message, token.line, token.column, self.source);
        } else {
            self.sink.error_at_spans(message, spans);
        }
        self.panic_mode = true;
    }

    /// Declares `value` in `scope`, reporting a clash as a diagnostic.
    ///
    /// Clashes are semantic rather than syntactic, so they do not enter
    /// panic mode and parsing continues where it stands.
    fn declare(&mut self, scope: &Ptr<Scope>, value: LookupValue) -> Result<()> {
        let identity = scope::identity_of(&value)?;
        let new_span = value.span();
        match scope::declare(scope, value)? {
            DeclareOutcome::Declared => {}
            DeclareOutcome::Clash { existing } => {
                let mut spans = Vec::new();
                if let Some(span) = new_span {
                    spans.push(span);
                }
                if let Some(span) = existing.span() {
                    spans.push(span);
                }
                self.gambit_error_at_spans(
                    format!("Cannot declare {identity} in scope, as {identity} already exists."),
                    spans,
                );
                self.panic_mode = false;
            }
        }
        Ok(())
    }

    fn merge_spans(&self, base: &Span, other: Option<Span>) -> Result<Span> {
        match other {
            Some(other) => base.merge(&other),
            None => Ok(base.clone()),
        }
    }

    // PROGRAM STRUCTURE //

    fn parse_program(&mut self, global_scope: &Ptr<Scope>) -> Result<()> {
        loop {
            if self.match_kind(TokenKind::EndOfFile) {
                return Ok(());
            }

            if self.peek(TokenKind::KeyEntity) {
                self.parse_entity_definition(global_scope)?;
            } else if self.peek(TokenKind::KeyEnum) {
                self.parse_enum_definition(global_scope)?;
            } else if self.peek(TokenKind::KeyState) {
                self.parse_state_property_definition(global_scope)?;
            } else if self.peek(TokenKind::KeyFn) {
                self.parse_function_property_definition(global_scope)?;
            } else {
                self.skip_whitespace();
                if self.match_kind(TokenKind::EndOfFile) {
                    return Ok(());
                }
                let token = self.current_token().clone();
                self.gambit_error(
                    format!("Unexpected '{}' in global scope.", token.text),
                    &token,
                );
            }

            if self.panic_mode {
                self.skip_to_end_of_line();
                self.skip_to_block_nesting(0);
                self.panic_mode = false;
            }
        }
    }

    fn peek_code_block(&self, singleton_allowed: bool) -> bool {
        self.peek(TokenKind::CurlyL) || (self.peek(TokenKind::Colon) && singleton_allowed)
    }

    fn parse_code_block(&mut self, scope: &Ptr<Scope>) -> Result<Ptr<CodeBlock>> {
        let code_block = ptr(CodeBlock {
            span: None,
            singleton_block: false,
            scope: Scope::nested_in(scope),
            statements: Vec::new(),
        });
        let block_scope = Ptr::clone(&code_block.borrow().scope);

        // Singleton code blocks
        if self.peek(TokenKind::Colon) {
            let colon = self.eat(TokenKind::Colon);

            let statement = self.parse_statement(&block_scope)?;
            let span = self.merge_spans(&self.to_span(&colon), statement.span())?;

            // Code block statements are not allowed inside of singleton blocks
            if let Statement::CodeBlock(inner) = &statement {
                if inner.borrow().singleton_block {
                    self.gambit_error_at_span("Too many colons.".into(), span.clone());
                } else {
                    self.gambit_error_at_span(
                        "Syntax `: { ... }` is invalid. Either use `: ... ` for a single \
                         statement, or `{ ... }` for multiple statements."
                            .into(),
                        span.clone(),
                    );
                }
            }

            let mut block = code_block.borrow_mut();
            block.statements.push(statement);
            block.singleton_block = true;
            block.span = Some(span);
            drop(block);
            return Ok(code_block);
        }

        // Regular code blocks
        let curly_l = self.eat(TokenKind::CurlyL);
        self.match_kind(TokenKind::Line);

        while !self.peek(TokenKind::CurlyR) && !self.end_of_file() {
            let statement = self.parse_statement(&block_scope)?;
            code_block.borrow_mut().statements.push(statement);
        }

        let curly_r = self.eat(TokenKind::CurlyR);
        code_block.borrow_mut().span =
            Some(self.to_span(&curly_l).merge(&self.to_span(&curly_r))?);

        Ok(code_block)
    }

    fn parse_enum_definition(&mut self, scope: &Ptr<Scope>) -> Result<()> {
        let keyword = self.eat(TokenKind::KeyEnum);
        let identity = self.eat(TokenKind::Identity);

        let enum_type = ptr(EnumType {
            span: None,
            identity: identity.text,
            values: Vec::new(),
        });

        self.eat(TokenKind::CurlyL);
        loop {
            let value_token = self.eat(TokenKind::Identity);
            let enum_value = ptr(EnumValue {
                span: Some(self.to_span(&value_token)),
                identity: value_token.text,
                ty: Rc::downgrade(&enum_type),
            });
            enum_type.borrow_mut().values.push(enum_value);

            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        let curly_r = self.eat(TokenKind::CurlyR);

        enum_type.borrow_mut().span =
            Some(self.to_span(&keyword).merge(&self.to_span(&curly_r))?);

        self.declare(scope, LookupValue::EnumType(enum_type))
    }

    fn parse_entity_definition(&mut self, scope: &Ptr<Scope>) -> Result<()> {
        let keyword = self.eat(TokenKind::KeyEntity);
        let identity_token = self.eat(TokenKind::Identity);

        let entity = ptr(Entity {
            span: Some(
                self.to_span(&keyword)
                    .merge(&self.to_span(&identity_token))?,
            ),
            identity: identity_token.text,
        });

        if !self.match_kind(TokenKind::EndOfFile) {
            self.eat(TokenKind::Line);
        }

        self.declare(scope, LookupValue::Entity(entity))
    }

    fn parse_state_property_definition(&mut self, scope: &Ptr<Scope>) -> Result<()> {
        let state = ptr(StateProperty {
            span: None,
            identity: String::new(),
            pattern: Pattern::UninferredPattern(ptr(UninferredPattern)),
            scope: Scope::nested_in(scope),
            parameters: Vec::new(),
            initial_value: None,
        });
        let property_scope = Ptr::clone(&state.borrow().scope);

        let keyword = self.eat(TokenKind::KeyState);
        state.borrow_mut().pattern = self.parse_pattern()?;

        self.eat(TokenKind::ParenL);
        loop {
            let parameter = self.parse_parameter()?;
            state.borrow_mut().parameters.push(Ptr::clone(&parameter));
            self.declare(&property_scope, LookupValue::Variable(parameter))?;
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        self.eat(TokenKind::ParenR);

        self.eat(TokenKind::Dot);

        let identity_token = self.eat(TokenKind::Identity);
        {
            let mut state = state.borrow_mut();
            state.identity = identity_token.text.clone();
            state.span = Some(
                self.to_span(&keyword)
                    .merge(&self.to_span(&identity_token))?,
            );
        }

        self.declare(scope, LookupValue::StateProperty(Ptr::clone(&state)))?;

        if self.match_kind(TokenKind::Colon) {
            let initial_value = self.parse_expression(Precedence::None)?;
            state.borrow_mut().initial_value = Some(initial_value);
        }

        Ok(())
    }

    fn parse_function_property_definition(&mut self, scope: &Ptr<Scope>) -> Result<()> {
        let funct = ptr(FunctionProperty {
            span: None,
            identity: String::new(),
            pattern: Pattern::UninferredPattern(ptr(UninferredPattern)),
            scope: Scope::nested_in(scope),
            parameters: Vec::new(),
            body: None,
        });
        let property_scope = Ptr::clone(&funct.borrow().scope);

        let keyword = self.eat(TokenKind::KeyFn);
        funct.borrow_mut().pattern = self.parse_pattern()?;

        self.eat(TokenKind::ParenL);
        loop {
            let parameter = self.parse_parameter()?;
            funct.borrow_mut().parameters.push(Ptr::clone(&parameter));
            self.declare(&property_scope, LookupValue::Variable(parameter))?;
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }
        self.eat(TokenKind::ParenR);

        self.eat(TokenKind::Dot);

        let identity_token = self.eat(TokenKind::Identity);
        {
            let mut funct = funct.borrow_mut();
            funct.identity = identity_token.text.clone();
            funct.span = Some(
                self.to_span(&keyword)
                    .merge(&self.to_span(&identity_token))?,
            );
        }

        self.declare(scope, LookupValue::FunctionProperty(Ptr::clone(&funct)))?;

        if self.peek_code_block(true) {
            let body = self.parse_code_block(&property_scope)?;
            funct.borrow_mut().body = Some(body);
        }

        Ok(())
    }

    /// A property parameter: `pattern identity`.
    fn parse_parameter(&mut self) -> Result<Ptr<Variable>> {
        let pattern = self.parse_pattern()?;
        let identity_token = self.eat(TokenKind::Identity);
        let identity_span = self.to_span(&identity_token);
        let span = match pattern.span() {
            Some(pattern_span) => pattern_span.merge(&identity_span)?,
            None => identity_span,
        };
        Ok(ptr(Variable {
            span: Some(span),
            identity: identity_token.text,
            pattern,
            is_mutable: false,
        }))
    }

    // STATEMENTS //

    fn peek_expression(&self) -> bool {
        self.peek(TokenKind::ParenL)
            || self.peek(TokenKind::KeyMatch)
            || self.peek_unary()
            || self.peek(TokenKind::Identity)
            || self.peek_literal()
            || self.peek(TokenKind::SquareL)
    }

    fn parse_statement(&mut self, scope: &Ptr<Scope>) -> Result<Statement> {
        let statement = if self.peek_code_block(false) {
            Statement::CodeBlock(self.parse_code_block(scope)?)
        } else if self.peek(TokenKind::KeyIf) {
            self.parse_if_statement(scope)?
        } else if self.peek(TokenKind::KeyFor) {
            self.parse_for_statement(scope)?
        } else if self.peek(TokenKind::KeyLet) || self.peek(TokenKind::KeyVar) {
            self.parse_variable_declaration(scope)?
        } else if self.peek_expression() {
            let expression = self.parse_expression(Precedence::None)?;
            if self.peek(TokenKind::Assign) {
                self.eat(TokenKind::Assign);
                let value = self.parse_expression(Precedence::None)?;
                let span = match (expression.span(), value.span()) {
                    (Some(subject), Some(value_span)) => Some(subject.merge(&value_span)?),
                    (subject, value_span) => subject.or(value_span),
                };
                Statement::AssignmentStatement(ptr(AssignmentStatement {
                    span,
                    subject: expression,
                    value,
                }))
            } else {
                Statement::Expression(expression)
            }
        } else {
            let token = self.current_token().clone();
            self.gambit_error("Expected statement".into(), &token);
            Statement::Expression(Expression::InvalidExpression(ptr(InvalidExpression {
                span: Some(self.to_span(&token)),
            })))
        };

        // Statements end on a line break, the end of the file, or the end
        // of the enclosing block.
        if !self.peek(TokenKind::CurlyR) && !self.match_kind(TokenKind::EndOfFile) {
            self.eat(TokenKind::Line);
        }

        if self.panic_mode {
            self.skip_to_end_of_line();
            self.panic_mode = false;
        }

        Ok(statement)
    }

    fn parse_if_statement(&mut self, scope: &Ptr<Scope>) -> Result<Statement> {
        let keyword = self.eat(TokenKind::KeyIf);
        let mut rules = Vec::new();
        let mut else_block = None;
        let mut last_span = self.to_span(&keyword);

        loop {
            let condition = self.parse_expression(Precedence::None)?;
            let code_block = self.parse_code_block(scope)?;
            let block_span = code_block.borrow().span.clone();
            let rule_span = match (condition.span(), block_span.clone()) {
                (Some(condition_span), Some(block_span)) => {
                    Some(condition_span.merge(&block_span)?)
                }
                (condition_span, block_span) => condition_span.or(block_span),
            };
            if let Some(span) = &block_span {
                last_span = span.clone();
            }
            rules.push(IfStatementRule {
                span: rule_span,
                condition,
                code_block,
            });

            if !self.peek(TokenKind::KeyElse) {
                break;
            }
            let else_token = self.eat(TokenKind::KeyElse);
            last_span = self.to_span(&else_token);

            if !self.peek(TokenKind::KeyIf) {
                let block = self.parse_code_block(scope)?;
                let block_span = block.borrow().span.clone();
                if let Some(span) = block_span {
                    last_span = span;
                }
                else_block = Some(block);
                break;
            }
            self.eat(TokenKind::KeyIf);
        }

        let span = self.to_span(&keyword).merge(&last_span)?;
        Ok(Statement::IfStatement(ptr(IfStatement {
            span: Some(span),
            rules,
            else_block,
        })))
    }

    fn parse_for_statement(&mut self, scope: &Ptr<Scope>) -> Result<Statement> {
        let keyword = self.eat(TokenKind::KeyFor);
        let identity_token = self.eat(TokenKind::Identity);
        self.eat(TokenKind::KeyIn);
        let range = self.parse_pattern()?;

        let for_scope = Scope::nested_in(scope);
        let variable = ptr(Variable {
            span: Some(self.to_span(&identity_token)),
            identity: identity_token.text,
            pattern: range.clone(),
            is_mutable: false,
        });
        self.declare(&for_scope, LookupValue::Variable(Ptr::clone(&variable)))?;

        let body = self.parse_code_block(&for_scope)?;
        let body_span = body.borrow().span.clone();
        let span = self.merge_spans(&self.to_span(&keyword), body_span)?;

        Ok(Statement::ForStatement(ptr(ForStatement {
            span: Some(span),
            variable,
            range,
            scope: for_scope,
            body,
        })))
    }

    fn parse_variable_declaration(&mut self, scope: &Ptr<Scope>) -> Result<Statement> {
        let keyword = if self.peek(TokenKind::KeyVar) {
            self.eat(TokenKind::KeyVar)
        } else {
            self.eat(TokenKind::KeyLet)
        };
        let is_mutable = keyword.kind == TokenKind::KeyVar;

        let identity_token = self.eat(TokenKind::Identity);
        let identity_span = self.to_span(&identity_token);
        let variable = ptr(Variable {
            span: Some(identity_span.clone()),
            identity: identity_token.text,
            pattern: Pattern::UninferredPattern(ptr(UninferredPattern)),
            is_mutable,
        });

        let value = if self.match_kind(TokenKind::Assign) {
            Some(self.parse_expression(Precedence::None)?)
        } else {
            None
        };

        self.declare(scope, LookupValue::Variable(Ptr::clone(&variable)))?;

        let end_span = value
            .as_ref()
            .and_then(|value| value.span())
            .or_else(|| Some(identity_span));
        let span = self.merge_spans(&self.to_span(&keyword), end_span)?;

        Ok(Statement::VariableDeclaration(ptr(VariableDeclaration {
            span: Some(span),
            variable,
            value,
        })))
    }

    // EXPRESSIONS //

    fn parse_unresolved_identity(&mut self) -> Result<Ptr<UnresolvedIdentity>> {
        let token = self.eat(TokenKind::Identity);
        Ok(ptr(UnresolvedIdentity {
            span: self.to_span(&token),
            identity: token.text,
        }))
    }

    fn parse_expression(&mut self, caller_precedence: Precedence) -> Result<Expression> {
        // Prefix expressions. Unary is right-associative, so stacks such
        // as `--1` nest.
        let mut lhs = if self.peek_unary()
            && operator_should_bind(Precedence::Unary, caller_precedence, false)
        {
            self.parse_unary()?
        } else if self.peek(TokenKind::KeyMatch) {
            self.parse_match()?
        } else if self.peek(TokenKind::Identity) {
            Expression::UnresolvedIdentity(self.parse_unresolved_identity()?)
        } else if self.peek(TokenKind::ParenL) {
            self.parse_paren_expr()?
        } else if self.peek_literal() {
            self.parse_literal()?
        } else if self.peek(TokenKind::SquareL) {
            self.parse_list_value()?
        } else {
            let token = self.current_token().clone();
            self.gambit_error("Expected expression".into(), &token);
            return Ok(Expression::InvalidExpression(ptr(InvalidExpression {
                span: Some(self.to_span(&token)),
            })));
        };

        loop {
            if self.peek_infix_factor()
                && operator_should_bind(Precedence::Factor, caller_precedence, true)
            {
                lhs = self.parse_infix_factor(lhs)?;
            } else if self.peek_infix_term()
                && operator_should_bind(Precedence::Term, caller_precedence, true)
            {
                lhs = self.parse_infix_term(lhs)?;
            } else if self.peek(TokenKind::Dot)
                && operator_should_bind(Precedence::Index, caller_precedence, true)
            {
                lhs = self.parse_infix_property_index(lhs)?;
            } else if self.peek(TokenKind::KeyAnd)
                && operator_should_bind(Precedence::LogicalAnd, caller_precedence, true)
            {
                lhs = self.parse_infix_logical(lhs, TokenKind::KeyAnd, Precedence::LogicalAnd)?;
            } else if self.peek(TokenKind::KeyOr)
                && operator_should_bind(Precedence::LogicalOr, caller_precedence, true)
            {
                lhs = self.parse_infix_logical(lhs, TokenKind::KeyOr, Precedence::LogicalOr)?;
            } else {
                break;
            }
        }

        Ok(lhs)
    }

    fn parse_paren_expr(&mut self) -> Result<Expression> {
        let paren_l = self.eat(TokenKind::ParenL);

        let expression = self.parse_expression(Precedence::None)?;

        // Bracketed expression
        if !self.peek(TokenKind::Comma) {
            self.eat(TokenKind::ParenR);
            return Ok(expression);
        }

        // Instance list, greedily followed by a property index
        let instance_list = ptr(InstanceList {
            span: None,
            values: vec![expression],
        });

        while self.match_kind(TokenKind::Comma) {
            let value = self.parse_expression(Precedence::None)?;
            instance_list.borrow_mut().values.push(value);
        }

        let paren_r = self.eat(TokenKind::ParenR);
        instance_list.borrow_mut().span =
            Some(self.to_span(&paren_l).merge(&self.to_span(&paren_r))?);

        self.parse_infix_property_index(Expression::InstanceList(instance_list))
    }

    fn parse_match(&mut self) -> Result<Expression> {
        let keyword = self.eat(TokenKind::KeyMatch);
        let subject = self.parse_expression(Precedence::None)?;

        let match_node = ptr(Match {
            span: None,
            subject,
            rules: Vec::new(),
            has_else: false,
        });

        self.eat(TokenKind::CurlyL);
        loop {
            if self.peek(TokenKind::KeyElse) {
                let else_token = self.eat(TokenKind::KeyElse);
                self.eat(TokenKind::Colon);
                let result = self.parse_expression(Precedence::None)?;
                let pattern = Pattern::AnyPattern(ptr(AnyPattern {
                    span: Some(self.to_span(&else_token)),
                }));
                let span = self.merge_spans(&self.to_span(&else_token), result.span())?;
                let mut node = match_node.borrow_mut();
                node.rules.push(MatchRule {
                    span: Some(span),
                    pattern_span: Some(self.to_span(&else_token)),
                    pattern,
                    result,
                });
                node.has_else = true;
                continue;
            }

            if !self.peek(TokenKind::Identity) && !self.peek(TokenKind::KeyAny) {
                break;
            }

            let pattern = self.parse_pattern()?;
            self.eat(TokenKind::Colon);
            let result = self.parse_expression(Precedence::None)?;
            let pattern_span = pattern.span();
            let span = match (pattern_span.clone(), result.span()) {
                (Some(pattern_span), Some(result_span)) => {
                    Some(pattern_span.merge(&result_span)?)
                }
                (pattern_span, result_span) => pattern_span.or(result_span),
            };
            match_node.borrow_mut().rules.push(MatchRule {
                span,
                pattern_span,
                pattern,
                result,
            });
        }
        let curly_r = self.eat(TokenKind::CurlyR);

        match_node.borrow_mut().span =
            Some(self.to_span(&keyword).merge(&self.to_span(&curly_r))?);
        Ok(Expression::Match(match_node))
    }

    fn peek_unary(&self) -> bool {
        self.peek(TokenKind::Add) || self.peek(TokenKind::Sub) || self.peek(TokenKind::KeyNot)
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        let op_token = if self.peek(TokenKind::Add) {
            self.eat(TokenKind::Add)
        } else if self.peek(TokenKind::Sub) {
            self.eat(TokenKind::Sub)
        } else if self.peek(TokenKind::KeyNot) {
            self.eat(TokenKind::KeyNot)
        } else {
            return Err(CompilerError::new(format!(
                "Expected unary expression, got {} token",
                self.current_token()
            )));
        };

        let value = self.parse_expression(Precedence::Unary)?;
        let span = self.merge_spans(&self.to_span(&op_token), value.span())?;

        Ok(Expression::Unary(ptr(Unary {
            span: Some(span),
            op: op_token.text,
            value,
        })))
    }

    fn peek_literal(&self) -> bool {
        self.peek(TokenKind::Number)
            || self.peek(TokenKind::String)
            || self.peek(TokenKind::Boolean)
    }

    fn parse_literal(&mut self) -> Result<Expression> {
        if self.peek(TokenKind::Number) {
            let token = self.eat(TokenKind::Number);
            let span = self.to_span(&token);

            // A literal with a fractional part is a `num`; a plain count
            // can use `amt`, as number literals cannot be negative.
            let (value, ty) = if token.text.contains('.') {
                match token.text.parse::<f64>() {
                    Ok(real) => (
                        IntrinsicLiteral::Real(real),
                        Ptr::clone(&self.intrinsics.type_num),
                    ),
                    Err(_) => {
                        self.gambit_error("Number literal is out of range.".into(), &token);
                        return Ok(Expression::InvalidValue(ptr(InvalidValue {
                            span: Some(span),
                        })));
                    }
                }
            } else {
                match token.text.parse::<i64>() {
                    Ok(integer) => (
                        IntrinsicLiteral::Integer(integer),
                        Ptr::clone(&self.intrinsics.type_amt),
                    ),
                    Err(_) => {
                        self.gambit_error("Number literal is out of range.".into(), &token);
                        return Ok(Expression::InvalidValue(ptr(InvalidValue {
                            span: Some(span),
                        })));
                    }
                }
            };

            return Ok(Expression::IntrinsicValue(ptr(IntrinsicValue {
                span: Some(span),
                value,
                ty,
            })));
        }

        if self.peek(TokenKind::String) {
            let token = self.eat(TokenKind::String);
            let contents = token.text.trim_matches('"').to_string();
            return Ok(Expression::IntrinsicValue(ptr(IntrinsicValue {
                span: Some(self.to_span(&token)),
                value: IntrinsicLiteral::Str(contents),
                ty: Ptr::clone(&self.intrinsics.type_str),
            })));
        }

        if self.peek(TokenKind::Boolean) {
            let token = self.eat(TokenKind::Boolean);
            return Ok(Expression::IntrinsicValue(ptr(IntrinsicValue {
                span: Some(self.to_span(&token)),
                value: IntrinsicLiteral::Bool(token.text == "true"),
                ty: Ptr::clone(&self.intrinsics.type_bool),
            })));
        }

        let token = self.current_token().clone();
        self.gambit_error("Expected literal".into(), &token);
        Ok(Expression::InvalidValue(ptr(InvalidValue {
            span: Some(self.to_span(&token)),
        })))
    }

    fn parse_list_value(&mut self) -> Result<Expression> {
        let square_l = self.eat(TokenKind::SquareL);

        let list = ptr(ListValue {
            span: None,
            values: Vec::new(),
        });

        if self.peek_expression() {
            loop {
                let value = self.parse_expression(Precedence::None)?;
                list.borrow_mut().values.push(value);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }

        let square_r = self.eat(TokenKind::SquareR);
        list.borrow_mut().span =
            Some(self.to_span(&square_l).merge(&self.to_span(&square_r))?);
        Ok(Expression::ListValue(list))
    }

    fn peek_infix_term(&self) -> bool {
        self.peek(TokenKind::Add) || self.peek(TokenKind::Sub)
    }

    fn parse_infix_term(&mut self, lhs: Expression) -> Result<Expression> {
        let op_token = if self.peek(TokenKind::Add) {
            self.eat(TokenKind::Add)
        } else {
            self.eat(TokenKind::Sub)
        };
        self.parse_binary(lhs, op_token, Precedence::Term)
    }

    fn peek_infix_factor(&self) -> bool {
        self.peek(TokenKind::Mul) || self.peek(TokenKind::Div)
    }

    fn parse_infix_factor(&mut self, lhs: Expression) -> Result<Expression> {
        let op_token = if self.peek(TokenKind::Mul) {
            self.eat(TokenKind::Mul)
        } else {
            self.eat(TokenKind::Div)
        };
        self.parse_binary(lhs, op_token, Precedence::Factor)
    }

    fn parse_infix_logical(
        &mut self,
        lhs: Expression,
        kind: TokenKind,
        precedence: Precedence,
    ) -> Result<Expression> {
        let op_token = self.eat(kind);
        self.parse_binary(lhs, op_token, precedence)
    }

    fn parse_binary(
        &mut self,
        lhs: Expression,
        op_token: Token,
        precedence: Precedence,
    ) -> Result<Expression> {
        let rhs = self.parse_expression(precedence)?;
        let span = match (lhs.span(), rhs.span()) {
            (Some(lhs_span), Some(rhs_span)) => Some(lhs_span.merge(&rhs_span)?),
            (lhs_span, rhs_span) => lhs_span.or(rhs_span),
        };
        Ok(Expression::Binary(ptr(Binary {
            span,
            op: op_token.text,
            lhs,
            rhs,
        })))
    }

    fn parse_infix_property_index(&mut self, lhs: Expression) -> Result<Expression> {
        // The subject of a property index is always an instance list; the
        // syntax `foo.bar` wraps its single subject on the way in.
        let lhs = match lhs {
            Expression::InstanceList(_) => lhs,
            other => {
                let span = other.span();
                Expression::InstanceList(ptr(InstanceList {
                    span,
                    values: vec![other],
                }))
            }
        };

        self.eat(TokenKind::Dot);
        let unresolved = self.parse_unresolved_identity()?;
        let identity_span = unresolved.borrow().span.clone();

        let span = match lhs.span() {
            Some(lhs_span) => lhs_span.merge(&identity_span)?,
            None => identity_span,
        };

        Ok(Expression::PropertyIndex(ptr(PropertyIndex {
            span: Some(span),
            expr: lhs,
            property: Property::UnresolvedIdentity(unresolved),
        })))
    }

    // PATTERNS //

    fn parse_pattern(&mut self) -> Result<Pattern> {
        let mut pattern = if self.peek(TokenKind::KeyAny) {
            let token = self.eat(TokenKind::KeyAny);
            Pattern::AnyPattern(ptr(AnyPattern {
                span: Some(self.to_span(&token)),
            }))
        } else {
            Pattern::UnresolvedIdentity(self.parse_unresolved_identity()?)
        };

        if self.peek(TokenKind::Question) {
            let question = self.eat(TokenKind::Question);
            let span = self.merge_spans(&self.to_span(&question), pattern.span())?;
            pattern = Pattern::OptionalPattern(ptr(OptionalPattern {
                span: Some(span),
                pattern,
            }));
        }

        Ok(pattern)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::scope::{declared_in_scope, fetch};

    fn parse(text: &str) -> (Program, DiagnosticSink) {
        let source = Rc::new(Source::new("test.gambit", text));
        let mut sink = DiagnosticSink::new();
        let intrinsics = Intrinsics::new();
        let tokens = lexer::tokenise(&source, &mut sink);
        let parser = Parser::new(&tokens, &source, &intrinsics, &mut sink);
        let program = parser.parse().unwrap();
        (program, sink)
    }

    #[test]
    fn enum_definition_declares_its_values_in_order() {
        let (program, sink) = parse("enum Color { Red, Green, Blue }\n");
        assert!(sink.is_empty(), "{:?}", sink.iter().collect::<Vec<_>>());
        match fetch(&program.global_scope, "Color") {
            Some(LookupValue::EnumType(enum_type)) => {
                let names: Vec<_> = enum_type
                    .borrow()
                    .values
                    .iter()
                    .map(|value| value.borrow().identity.clone())
                    .collect();
                assert_eq!(names, ["Red", "Green", "Blue"]);
            }
            other => panic!("expected an enum type, got {other:?}"),
        }
    }

    #[test]
    fn entity_definition_declares_the_entity() {
        let (program, sink) = parse("entity Card\n");
        assert!(sink.is_empty());
        assert!(matches!(
            fetch(&program.global_scope, "Card"),
            Some(LookupValue::Entity(_))
        ));
    }

    #[test]
    fn state_property_keeps_parameters_and_initial_value() {
        let (program, sink) = parse("state num(Player player).score: 0\n");
        assert!(sink.is_empty(), "{:?}", sink.iter().collect::<Vec<_>>());
        match fetch(&program.global_scope, "score") {
            Some(LookupValue::OverloadedIdentity(set)) => {
                let overloads = set.borrow().overloads.clone();
                assert_eq!(overloads.len(), 1);
                match &overloads[0] {
                    LookupValue::StateProperty(state) => {
                        let state = state.borrow();
                        assert_eq!(state.parameters.len(), 1);
                        assert!(state.initial_value.is_some());
                        assert!(declared_in_scope(&state.scope, "player"));
                    }
                    other => panic!("expected a state property, got {other:?}"),
                }
            }
            other => panic!("expected an overload set, got {other:?}"),
        }
    }

    #[test]
    fn function_property_takes_a_block_body() {
        let (program, sink) = parse("fn bool(Player p).winner { true\n }\n");
        assert!(sink.is_empty(), "{:?}", sink.iter().collect::<Vec<_>>());
        match fetch(&program.global_scope, "winner") {
            Some(LookupValue::OverloadedIdentity(set)) => {
                match &set.borrow().overloads[0] {
                    LookupValue::FunctionProperty(funct) => {
                        let funct = funct.borrow();
                        let body = funct.body.as_ref().unwrap().borrow();
                        assert!(!body.singleton_block);
                        assert_eq!(body.statements.len(), 1);
                    }
                    other => panic!("expected a function property, got {other:?}"),
                }
            }
            other => panic!("expected an overload set, got {other:?}"),
        }
    }

    #[test]
    fn singleton_body_sets_the_flag() {
        let (program, sink) = parse("fn bool(Player p).winner: true\n");
        assert!(sink.is_empty(), "{:?}", sink.iter().collect::<Vec<_>>());
        match fetch(&program.global_scope, "winner") {
            Some(LookupValue::OverloadedIdentity(set)) => match &set.borrow().overloads[0] {
                LookupValue::FunctionProperty(funct) => {
                    let funct = funct.borrow();
                    assert!(funct.body.as_ref().unwrap().borrow().singleton_block);
                }
                other => panic!("expected a function property, got {other:?}"),
            },
            other => panic!("expected an overload set, got {other:?}"),
        }
    }

    #[test]
    fn singleton_block_around_a_block_is_diagnosed() {
        let (_, sink) = parse("fn bool(Player p).winner: { true\n }\n");
        assert!(sink
            .iter()
            .any(|d| d.message.contains("Syntax `: { ... }` is invalid")));
    }

    #[test]
    fn match_expression_collects_rules() {
        let (program, sink) =
            parse("enum C { A, B }\nfn bool(C c).ok { match c { A: true  B: false } }\n");
        assert!(sink.is_empty(), "{:?}", sink.iter().collect::<Vec<_>>());
        let funct = match fetch(&program.global_scope, "ok") {
            Some(LookupValue::OverloadedIdentity(set)) => match &set.borrow().overloads[0] {
                LookupValue::FunctionProperty(funct) => Ptr::clone(funct),
                other => panic!("expected a function property, got {other:?}"),
            },
            other => panic!("expected an overload set, got {other:?}"),
        };
        let funct = funct.borrow();
        let body = funct.body.as_ref().unwrap().borrow();
        match &body.statements[0] {
            Statement::Expression(Expression::Match(match_node)) => {
                let match_node = match_node.borrow();
                assert_eq!(match_node.rules.len(), 2);
                assert!(!match_node.has_else);
            }
            other => panic!("expected a match statement, got {other:?}"),
        }
    }

    #[test]
    fn match_else_rule_uses_the_any_pattern() {
        let (program, sink) =
            parse("enum C { A, B }\nfn bool(C c).ok { match c { A: true  else: false } }\n");
        assert!(sink.is_empty(), "{:?}", sink.iter().collect::<Vec<_>>());
        let funct = match fetch(&program.global_scope, "ok") {
            Some(LookupValue::OverloadedIdentity(set)) => match &set.borrow().overloads[0] {
                LookupValue::FunctionProperty(funct) => Ptr::clone(funct),
                other => panic!("expected a function property, got {other:?}"),
            },
            other => panic!("expected an overload set, got {other:?}"),
        };
        let funct = funct.borrow();
        let body = funct.body.as_ref().unwrap().borrow();
        match &body.statements[0] {
            Statement::Expression(Expression::Match(match_node)) => {
                let match_node = match_node.borrow();
                assert!(match_node.has_else);
                assert!(matches!(
                    match_node.rules[1].pattern,
                    Pattern::AnyPattern(_)
                ));
            }
            other => panic!("expected a match statement, got {other:?}"),
        }
    }

    #[test]
    fn redeclaring_an_entity_is_reported_but_parsing_continues() {
        let (program, sink) = parse("entity Card\nentity Card\nenum Color { Red }\n");
        assert_eq!(sink.len(), 1);
        assert!(sink
            .iter()
            .any(|d| d.message.contains("already exists")));
        // The later definition still lands in the scope.
        assert!(declared_in_scope(&program.global_scope, "Color"));
    }

    #[test]
    fn garbage_at_top_level_recovers_at_the_next_line() {
        let (program, sink) = parse("12345\nentity Card\n");
        assert_eq!(sink.len(), 1);
        assert!(declared_in_scope(&program.global_scope, "Card"));
    }

    #[test]
    fn operators_nest_by_precedence() {
        let (program, sink) = parse("state num(Player p).x: 1 + 2 * 3\n");
        assert!(sink.is_empty(), "{:?}", sink.iter().collect::<Vec<_>>());
        let state = match fetch(&program.global_scope, "x") {
            Some(LookupValue::OverloadedIdentity(set)) => match &set.borrow().overloads[0] {
                LookupValue::StateProperty(state) => Ptr::clone(state),
                other => panic!("expected a state property, got {other:?}"),
            },
            other => panic!("expected an overload set, got {other:?}"),
        };
        let state = state.borrow();
        match state.initial_value.as_ref().unwrap() {
            Expression::Binary(add) => {
                let add = add.borrow();
                assert_eq!(add.op, "+");
                match &add.rhs {
                    Expression::Binary(mul) => assert_eq!(mul.borrow().op, "*"),
                    other => panic!("expected the product on the right, got {other:?}"),
                }
            }
            other => panic!("expected a sum, got {other:?}"),
        }
    }

    #[test]
    fn stacked_unary_operators_nest_right_associatively() {
        let (program, sink) = parse("state num(Player p).x: --1\n");
        assert!(sink.is_empty(), "{:?}", sink.iter().collect::<Vec<_>>());
        let state = match fetch(&program.global_scope, "x") {
            Some(LookupValue::OverloadedIdentity(set)) => match &set.borrow().overloads[0] {
                LookupValue::StateProperty(state) => Ptr::clone(state),
                other => panic!("expected a state property, got {other:?}"),
            },
            other => panic!("expected an overload set, got {other:?}"),
        };
        let state = state.borrow();
        match state.initial_value.as_ref().unwrap() {
            Expression::Unary(outer) => {
                let outer = outer.borrow();
                assert_eq!(outer.op, "-");
                match &outer.value {
                    Expression::Unary(inner) => {
                        let inner = inner.borrow();
                        assert_eq!(inner.op, "-");
                        assert!(matches!(inner.value, Expression::IntrinsicValue(_)));
                    }
                    other => panic!("expected a nested negation, got {other:?}"),
                }
            }
            other => panic!("expected a negation, got {other:?}"),
        }
    }

    #[test]
    fn property_index_wraps_single_subjects() {
        let (program, sink) = parse("state num(Player p).x: p.score\n");
        // `score` is unresolved at this point, which is fine; only the
        // shape of the APM matters here.
        assert!(sink.is_empty(), "{:?}", sink.iter().collect::<Vec<_>>());
        let state = match fetch(&program.global_scope, "x") {
            Some(LookupValue::OverloadedIdentity(set)) => match &set.borrow().overloads[0] {
                LookupValue::StateProperty(state) => Ptr::clone(state),
                other => panic!("expected a state property, got {other:?}"),
            },
            other => panic!("expected an overload set, got {other:?}"),
        };
        let state = state.borrow();
        match state.initial_value.as_ref().unwrap() {
            Expression::PropertyIndex(index) => {
                let index = index.borrow();
                match &index.expr {
                    Expression::InstanceList(list) => {
                        assert_eq!(list.borrow().values.len(), 1)
                    }
                    other => panic!("expected an instance list subject, got {other:?}"),
                }
                assert!(matches!(index.property, Property::UnresolvedIdentity(_)));
            }
            other => panic!("expected a property index, got {other:?}"),
        }
    }

    #[test]
    fn optional_pattern_marks_parameters() {
        let (program, sink) = parse("state num(Player player, num bonus).score: 0\n");
        assert!(sink.is_empty(), "{:?}", sink.iter().collect::<Vec<_>>());
        let (program2, sink2) = parse("state num(num? bonus).total: 0\n");
        assert!(sink2.is_empty(), "{:?}", sink2.iter().collect::<Vec<_>>());
        drop(program);
        let state = match fetch(&program2.global_scope, "total") {
            Some(LookupValue::OverloadedIdentity(set)) => match &set.borrow().overloads[0] {
                LookupValue::StateProperty(state) => Ptr::clone(state),
                other => panic!("expected a state property, got {other:?}"),
            },
            other => panic!("expected an overload set, got {other:?}"),
        };
        let state = state.borrow();
        assert!(matches!(
            state.parameters[0].borrow().pattern,
            Pattern::OptionalPattern(_)
        ));
    }

    #[test]
    fn spans_recover_the_written_text() {
        let text = "enum Color { Red, Green, Blue }\n";
        let (program, _) = parse(text);
        match fetch(&program.global_scope, "Color") {
            Some(LookupValue::EnumType(enum_type)) => {
                let enum_type = enum_type.borrow();
                let span = enum_type.span.clone().unwrap();
                assert_eq!(span.source_text(), "enum Color { Red, Green, Blue }");
                let red = enum_type.values[0].borrow();
                assert_eq!(red.span.clone().unwrap().source_text(), "Red");
            }
            other => panic!("expected an enum type, got {other:?}"),
        }
    }
}
