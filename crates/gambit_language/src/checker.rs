//! The pattern checker.
//!
//! The checker runs over the resolved APM and validates it without mutating
//! anything:
//!
//! 1. a state property's initial value must fit its declared pattern;
//! 2. an `if` condition must be able to produce `true`, `false`, or `none`;
//! 3. a match rule must be reachable — it must overlap its subject and not
//!    be fully covered by the rules before it — and a match without an
//!    else rule must cover its subject;
//! 4. no two overloads of one identifier may share a parameter-pattern
//!    list.
//!
//! Nodes the resolver marked `Invalid*` are accepted silently; their
//! faults were already reported.

use crate::apm::{
    CodeBlock, Expression, LookupValue, Match, Pattern, Program, Ptr, Scope, Statement, Variable,
};
use crate::intrinsics::Intrinsics;
use crate::pattern::{
    determine_expression_pattern, do_patterns_overlap, is_pattern_optional,
    is_pattern_subset_of_superset, create_union_pattern,
};
use gambit_base::{CompilerError, DiagnosticSink, Result, Span};

pub struct Checker<'a> {
    intrinsics: &'a Intrinsics,
    sink: &'a mut DiagnosticSink,
    panic_mode: bool,
}

impl<'a> Checker<'a> {
    pub fn new(intrinsics: &'a Intrinsics, sink: &'a mut DiagnosticSink) -> Self {
        Self {
            intrinsics,
            sink,
            panic_mode: false,
        }
    }

    pub fn check(&mut self, program: &Program) -> Result<()> {
        self.check_scope(&program.global_scope)
    }

    fn emit(&mut self, message: String, span: Option<Span>) {
        if self.panic_mode {
            return;
        }
        if let Some(span) = span {
            self.sink.error_at_span(message, span);
            self.panic_mode = true;
        }
    }

    fn emit_at_spans(&mut self, message: String, spans: Vec<Span>) {
        if self.panic_mode || spans.is_empty() {
            return;
        }
        self.sink.error_at_spans(message, spans);
        self.panic_mode = true;
    }

    // PROGRAM STRUCTURE //

    fn check_scope(&mut self, scope: &Ptr<Scope>) -> Result<()> {
        let values: Vec<LookupValue> = scope.borrow().lookup.values().cloned().collect();
        for value in &values {
            self.panic_mode = false;
            self.check_lookup_value(value, scope)?;
        }
        Ok(())
    }

    fn check_lookup_value(&mut self, value: &LookupValue, scope: &Ptr<Scope>) -> Result<()> {
        match value {
            LookupValue::Variable(_)
            | LookupValue::UnionPattern(_)
            | LookupValue::IntrinsicType(_)
            | LookupValue::EnumType(_)
            | LookupValue::Entity(_) => Ok(()),

            LookupValue::StateProperty(state) => {
                let initial_value = state.borrow().initial_value.clone();
                if let Some(initial_value) = initial_value {
                    let property_scope = Ptr::clone(&state.borrow().scope);
                    self.check_expression(&initial_value, &property_scope)?;

                    let value_pattern =
                        determine_expression_pattern(&initial_value, self.intrinsics)?;
                    let declared = state.borrow().pattern.clone();
                    if !matches!(value_pattern, Pattern::InvalidPattern(_))
                        && !matches!(declared, Pattern::InvalidPattern(_))
                        && !is_pattern_subset_of_superset(&value_pattern, &declared)?
                    {
                        self.emit(
                            "Default value for state is the incorrect type.".into(),
                            initial_value.span(),
                        );
                    }
                }
                Ok(())
            }

            LookupValue::FunctionProperty(funct) => {
                let body = funct.borrow().body.clone();
                if let Some(body) = body {
                    self.check_code_block(&body)?;
                }
                Ok(())
            }

            LookupValue::Procedure(procedure) => {
                let body = Ptr::clone(&procedure.borrow().body);
                self.check_code_block(&body)
            }

            LookupValue::OverloadedIdentity(set) => {
                let overloads = set.borrow().overloads.clone();
                for overload in &overloads {
                    self.panic_mode = false;
                    self.check_lookup_value(overload, scope)?;
                }
                self.panic_mode = false;
                self.check_overload_signatures(&overloads)
            }
        }
    }

    /// No two overloads of one identifier may share a parameter-pattern
    /// list; the later declaration is the one reported.
    fn check_overload_signatures(&mut self, overloads: &[LookupValue]) -> Result<()> {
        for later in 1..overloads.len() {
            for earlier in 0..later {
                if self.overload_parameters_equal(&overloads[earlier], &overloads[later])? {
                    let mut spans = Vec::new();
                    if let Some(span) = overloads[later].span() {
                        spans.push(span);
                    }
                    if let Some(span) = overloads[earlier].span() {
                        spans.push(span);
                    }
                    self.emit_at_spans(
                        "This overload has the same parameters as a previous overload.".into(),
                        spans,
                    );
                    break;
                }
            }
        }
        Ok(())
    }

    fn overload_parameters_equal(&self, a: &LookupValue, b: &LookupValue) -> Result<bool> {
        let parameters_a = overload_parameters(a);
        let parameters_b = overload_parameters(b);
        let (Some(parameters_a), Some(parameters_b)) = (parameters_a, parameters_b) else {
            return Ok(false);
        };
        if parameters_a.len() != parameters_b.len() {
            return Ok(false);
        }
        for (param_a, param_b) in parameters_a.iter().zip(&parameters_b) {
            let pattern_a = param_a.borrow().pattern.clone();
            let pattern_b = param_b.borrow().pattern.clone();
            if matches!(pattern_a, Pattern::InvalidPattern(_))
                || matches!(pattern_b, Pattern::InvalidPattern(_))
            {
                return Ok(false);
            }
            if !is_pattern_subset_of_superset(&pattern_a, &pattern_b)?
                || !is_pattern_subset_of_superset(&pattern_b, &pattern_a)?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn check_code_block(&mut self, code_block: &Ptr<CodeBlock>) -> Result<()> {
        let block_scope = Ptr::clone(&code_block.borrow().scope);
        self.check_scope(&block_scope)?;
        let statements = code_block.borrow().statements.clone();
        for statement in &statements {
            self.panic_mode = false;
            self.check_statement(statement, &block_scope)?;
        }
        Ok(())
    }

    // STATEMENTS //

    fn check_statement(&mut self, statement: &Statement, scope: &Ptr<Scope>) -> Result<()> {
        match statement {
            Statement::Expression(expression) => self.check_expression(expression, scope),
            Statement::CodeBlock(code_block) => self.check_code_block(code_block),
            Statement::IfStatement(node) => {
                let rules = node.borrow().rules.clone();
                for rule in &rules {
                    self.check_expression(&rule.condition, scope)?;
                    self.check_code_block(&rule.code_block)?;
                    self.check_condition(&rule.condition, rule.span.clone())?;
                }
                let else_block = node.borrow().else_block.clone();
                if let Some(else_block) = else_block {
                    self.check_code_block(&else_block)?;
                }
                Ok(())
            }
            Statement::ForStatement(node) => {
                let body = Ptr::clone(&node.borrow().body);
                self.check_code_block(&body)
            }
            Statement::AssignmentStatement(node) => {
                let (subject, value) = {
                    let borrowed = node.borrow();
                    (borrowed.subject.clone(), borrowed.value.clone())
                };
                self.check_expression(&subject, scope)?;
                self.check_expression(&value, scope)
            }
            Statement::VariableDeclaration(node) => {
                let value = node.borrow().value.clone();
                if let Some(value) = value {
                    self.check_expression(&value, scope)?;
                }
                Ok(())
            }
        }
    }

    /// A condition must be able to produce `true`, `false`, or `none`;
    /// anything else can never take a branch.
    fn check_condition(&mut self, condition: &Expression, span: Option<Span>) -> Result<()> {
        let condition_pattern = determine_expression_pattern(condition, self.intrinsics)?;
        if matches!(condition_pattern, Pattern::InvalidPattern(_)) {
            return Ok(());
        }
        let bool_pattern = Pattern::IntrinsicType(Ptr::clone(&self.intrinsics.type_bool));
        let is_bool = is_pattern_subset_of_superset(&condition_pattern, &bool_pattern)?;
        let is_optional = is_pattern_optional(&condition_pattern);
        if !is_bool && !is_optional {
            self.emit(
                "If statement conditions must evaluate either to true or false, or potentially \
                 to none. This condition will never be true, false, or none."
                    .into(),
                condition.span().or(span),
            );
        }
        Ok(())
    }

    // EXPRESSIONS //

    fn check_expression(&mut self, expression: &Expression, scope: &Ptr<Scope>) -> Result<()> {
        match expression {
            Expression::UnresolvedIdentity(_) => Err(CompilerError::new(
                "Attempt to check UnresolvedIdentity. This should have already been resolved.",
            )),
            Expression::Variable(_)
            | Expression::EnumValue(_)
            | Expression::IntrinsicValue(_)
            | Expression::InvalidValue(_)
            | Expression::InvalidExpression(_) => Ok(()),
            Expression::ListValue(node) => {
                let values = node.borrow().values.clone();
                for value in &values {
                    self.check_expression(value, scope)?;
                }
                Ok(())
            }
            Expression::InstanceList(node) => {
                let values = node.borrow().values.clone();
                for value in &values {
                    self.check_expression(value, scope)?;
                }
                Ok(())
            }
            Expression::Unary(node) => {
                let value = node.borrow().value.clone();
                self.check_expression(&value, scope)
            }
            Expression::Binary(node) => {
                let (lhs, rhs) = {
                    let borrowed = node.borrow();
                    (borrowed.lhs.clone(), borrowed.rhs.clone())
                };
                self.check_expression(&lhs, scope)?;
                self.check_expression(&rhs, scope)
            }
            Expression::ExpressionIndex(node) => {
                let (subject, index) = {
                    let borrowed = node.borrow();
                    (borrowed.subject.clone(), borrowed.index.clone())
                };
                self.check_expression(&subject, scope)?;
                self.check_expression(&index, scope)
            }
            Expression::PropertyIndex(node) => {
                let subject = node.borrow().expr.clone();
                self.check_expression(&subject, scope)
            }
            Expression::Call(node) => {
                let (callee, arguments) = {
                    let borrowed = node.borrow();
                    (borrowed.callee.clone(), borrowed.arguments.clone())
                };
                self.check_expression(&callee, scope)?;
                for argument in &arguments {
                    self.check_expression(argument, scope)?;
                }
                Ok(())
            }
            Expression::IfExpression(node) => {
                let rules = node.borrow().rules.clone();
                for rule in &rules {
                    self.check_expression(&rule.condition, scope)?;
                    self.check_expression(&rule.result, scope)?;
                    self.check_condition(&rule.condition, rule.span.clone())?;
                }
                Ok(())
            }
            Expression::Match(node) => self.check_match(node, scope),
        }
    }

    /// Reachability and exhaustiveness of a match expression.
    fn check_match(&mut self, node: &Ptr<Match>, scope: &Ptr<Scope>) -> Result<()> {
        let subject = node.borrow().subject.clone();
        self.check_expression(&subject, scope)?;

        let subject_pattern = determine_expression_pattern(&subject, self.intrinsics)?;
        let subject_invalid = matches!(subject_pattern, Pattern::InvalidPattern(_));

        let rules = node.borrow().rules.clone();
        let mut covered: Option<Pattern> = None;
        for rule in &rules {
            self.check_expression(&rule.result, scope)?;

            if subject_invalid || matches!(rule.pattern, Pattern::InvalidPattern(_)) {
                continue;
            }

            // A rule that cannot overlap the subject, or whose pattern the
            // rules before it already cover, can never fire.
            let unreachable = !do_patterns_overlap(&rule.pattern, &subject_pattern)?
                || match &covered {
                    Some(covered) => is_pattern_subset_of_superset(&rule.pattern, covered)?,
                    None => false,
                };
            if unreachable {
                self.emit(
                    "This rule's pattern will never match.".into(),
                    rule.pattern_span
                        .clone()
                        .or_else(|| rule.pattern.span())
                        .or_else(|| rule.span.clone()),
                );
            }

            covered = Some(match covered {
                Some(covered) => create_union_pattern(covered, rule.pattern.clone()),
                None => rule.pattern.clone(),
            });
        }

        let has_else = node.borrow().has_else;
        if !subject_invalid && !has_else {
            let exhaustive = match &covered {
                Some(covered) => is_pattern_subset_of_superset(&subject_pattern, covered)?,
                None => false,
            };
            if !exhaustive {
                self.emit(
                    "This match does not cover every possible value of its subject.".into(),
                    node.borrow().span.clone(),
                );
            }
        }

        Ok(())
    }
}

/// The parameter list of an overloadable lookup value.
fn overload_parameters(value: &LookupValue) -> Option<Vec<Ptr<Variable>>> {
    match value {
        LookupValue::StateProperty(state) => Some(state.borrow().parameters.clone()),
        LookupValue::FunctionProperty(funct) => Some(funct.borrow().parameters.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::parser::Parser;
    use crate::resolver::Resolver;
    use gambit_base::Source;
    use std::rc::Rc;

    fn check_source(text: &str) -> DiagnosticSink {
        let source = Rc::new(Source::new("test.gambit", text));
        let mut sink = DiagnosticSink::new();
        let intrinsics = Intrinsics::new();
        let tokens = lexer::tokenise(&source, &mut sink);
        let program = Parser::new(&tokens, &source, &intrinsics, &mut sink)
            .parse()
            .unwrap();
        Resolver::new(&intrinsics, &mut sink)
            .resolve(&program)
            .unwrap();
        Checker::new(&intrinsics, &mut sink).check(&program).unwrap();
        sink
    }

    #[test]
    fn numeric_state_default_checks_clean() {
        let sink = check_source("entity Card\nstate num(Player player).score: 0\n");
        assert!(sink.is_empty(), "{:?}", sink.iter().collect::<Vec<_>>());
    }

    #[test]
    fn string_default_for_numeric_state_is_reported_with_its_span() {
        let sink = check_source("state num(Player player).score: \"hi\"\n");
        let diagnostic = sink
            .iter()
            .find(|d| d.message == "Default value for state is the incorrect type.")
            .expect("expected the default-value diagnostic");
        assert_eq!(diagnostic.spans[0].source_text(), "\"hi\"");
    }

    #[test]
    fn exhaustive_match_over_an_enum_checks_clean() {
        let sink =
            check_source("enum C { A, B }\nfn bool(C c).ok { match c { A: true  B: false } }\n");
        assert!(sink.is_empty(), "{:?}", sink.iter().collect::<Vec<_>>());
    }

    #[test]
    fn covered_rule_is_reported_as_unreachable() {
        let sink = check_source(
            "enum C { A, B }\nfn bool(C c).ok { match c { A: true  B: false  C: true } }\n",
        );
        let diagnostic = sink
            .iter()
            .find(|d| d.message == "This rule's pattern will never match.")
            .expect("expected the unreachable-rule diagnostic");
        assert_eq!(diagnostic.spans[0].source_text(), "C");
    }

    #[test]
    fn incomplete_match_without_else_is_reported() {
        let sink = check_source("enum C { A, B }\nfn bool(C c).ok { match c { A: true } }\n");
        assert!(sink
            .iter()
            .any(|d| d.message == "This match does not cover every possible value of its subject."));
    }

    #[test]
    fn else_rule_makes_a_match_exhaustive() {
        let sink =
            check_source("enum C { A, B }\nfn bool(C c).ok { match c { A: true  else: false } }\n");
        assert!(sink.is_empty(), "{:?}", sink.iter().collect::<Vec<_>>());
    }

    #[test]
    fn non_bool_condition_is_reported() {
        let sink = check_source("fn num(Player p).x { if 5 { 1\n }\n }\n");
        assert!(sink
            .iter()
            .any(|d| d.message.contains("will never be true, false, or none")));
    }

    #[test]
    fn bool_condition_checks_clean() {
        let sink = check_source("fn num(Player p).x { if true { 1\n }\n }\n");
        assert!(sink.is_empty(), "{:?}", sink.iter().collect::<Vec<_>>());
    }

    #[test]
    fn duplicate_overload_signatures_are_reported() {
        let sink =
            check_source("state num(Player p).x\nstate num(Player p).x\n");
        assert!(sink
            .iter()
            .any(|d| d.message == "This overload has the same parameters as a previous overload."));
    }

    #[test]
    fn overloads_with_different_parameters_check_clean() {
        let sink = check_source("state num(num n).x\nstate num(str s).x\n");
        assert!(sink.is_empty(), "{:?}", sink.iter().collect::<Vec<_>>());
    }
}
