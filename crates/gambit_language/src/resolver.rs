//! Name resolution.
//!
//! The resolver walks the APM once, replacing every [`UnresolvedIdentity`]
//! with a link to its definition. Identities in pattern position resolve to
//! type-like bindings (intrinsic types, enums, entities, named unions);
//! identities in expression position resolve to variables, enum values, or
//! zero-argument property accesses. A name that cannot be resolved is
//! reported and replaced with an `Invalid*` marker so later stages accept
//! the node silently.
//!
//! ## Pattern hints
//!
//! An expected pattern threads down through expression resolution to
//! disambiguate bare identifiers. A match-rule pattern `A` may name a value
//! of the subject's enum type or a binding in scope; the hint is tried
//! first.
//!
//! Scopes resolve in two passes: all property signatures first, then
//! initial values and bodies, so a body can index any property declared
//! anywhere in the scope.

use crate::apm::{
    CodeBlock, EnumValue, Expression, InstanceList, InvalidExpression, InvalidPattern,
    InvalidProperty, LookupValue, Pattern, Program, Property, Ptr, Scope, Statement, ptr,
};
use crate::intrinsics::Intrinsics;
use crate::pattern::{
    determine_expression_pattern, does_instance_list_match_parameters, patterns_equal,
};
use crate::scope;
use gambit_base::{CompilerError, DiagnosticSink, Result, Span};

pub struct Resolver<'a> {
    intrinsics: &'a Intrinsics,
    sink: &'a mut DiagnosticSink,
    panic_mode: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(intrinsics: &'a Intrinsics, sink: &'a mut DiagnosticSink) -> Self {
        Self {
            intrinsics,
            sink,
            panic_mode: false,
        }
    }

    pub fn resolve(&mut self, program: &Program) -> Result<()> {
        self.resolve_scope(&program.global_scope)
    }

    // ERRORS //

    fn emit(&mut self, message: String, span: Span) {
        if self.panic_mode {
            return;
        }
        self.sink.error_at_span(message, span);
        self.panic_mode = true;
    }

    // PROGRAM STRUCTURE //

    fn resolve_scope(&mut self, scope: &Ptr<Scope>) -> Result<()> {
        let values: Vec<LookupValue> = scope.borrow().lookup.values().cloned().collect();

        // Signatures first, so bodies can reference any property in the
        // scope regardless of declaration order.
        for value in &values {
            self.panic_mode = false;
            self.resolve_lookup_value_signature(value, scope)?;
        }
        for value in &values {
            self.panic_mode = false;
            self.resolve_lookup_value_definition(value, scope)?;
        }
        Ok(())
    }

    fn resolve_lookup_value_signature(
        &mut self,
        value: &LookupValue,
        scope: &Ptr<Scope>,
    ) -> Result<()> {
        match value {
            LookupValue::Variable(variable) => {
                let pattern = variable.borrow().pattern.clone();
                let resolved = self.resolve_pattern(pattern, scope, None)?;
                variable.borrow_mut().pattern = resolved;
            }
            LookupValue::UnionPattern(union) => {
                // Named unions keep their node; resolution rewrites the
                // members in place.
                self.resolve_pattern(Pattern::UnionPattern(Ptr::clone(union)), scope, None)?;
            }
            LookupValue::StateProperty(state) => {
                let pattern = state.borrow().pattern.clone();
                let resolved = self.resolve_pattern(pattern, scope, None)?;
                state.borrow_mut().pattern = resolved;
                let parameters = state.borrow().parameters.clone();
                let property_scope = Ptr::clone(&state.borrow().scope);
                for parameter in parameters {
                    let pattern = parameter.borrow().pattern.clone();
                    let resolved = self.resolve_pattern(pattern, &property_scope, None)?;
                    parameter.borrow_mut().pattern = resolved;
                }
            }
            LookupValue::FunctionProperty(funct) => {
                let pattern = funct.borrow().pattern.clone();
                let resolved = self.resolve_pattern(pattern, scope, None)?;
                funct.borrow_mut().pattern = resolved;
                let parameters = funct.borrow().parameters.clone();
                let property_scope = Ptr::clone(&funct.borrow().scope);
                for parameter in parameters {
                    let pattern = parameter.borrow().pattern.clone();
                    let resolved = self.resolve_pattern(pattern, &property_scope, None)?;
                    parameter.borrow_mut().pattern = resolved;
                }
            }
            LookupValue::Procedure(procedure) => {
                let parameters = procedure.borrow().parameters.clone();
                let procedure_scope = Ptr::clone(&procedure.borrow().scope);
                for parameter in parameters {
                    let pattern = parameter.borrow().pattern.clone();
                    let resolved = self.resolve_pattern(pattern, &procedure_scope, None)?;
                    parameter.borrow_mut().pattern = resolved;
                }
            }
            LookupValue::OverloadedIdentity(set) => {
                let overloads = set.borrow().overloads.clone();
                for overload in &overloads {
                    self.resolve_lookup_value_signature(overload, scope)?;
                }
            }
            LookupValue::IntrinsicType(_) | LookupValue::EnumType(_) | LookupValue::Entity(_) => {}
        }
        Ok(())
    }

    fn resolve_lookup_value_definition(
        &mut self,
        value: &LookupValue,
        scope: &Ptr<Scope>,
    ) -> Result<()> {
        match value {
            LookupValue::StateProperty(state) => {
                let initial_value = state.borrow().initial_value.clone();
                if let Some(initial_value) = initial_value {
                    let property_scope = Ptr::clone(&state.borrow().scope);
                    let hint = state.borrow().pattern.clone();
                    let resolved =
                        self.resolve_expression(initial_value, &property_scope, Some(&hint))?;
                    state.borrow_mut().initial_value = Some(resolved);
                }
            }
            LookupValue::FunctionProperty(funct) => {
                let body = funct.borrow().body.clone();
                if let Some(body) = body {
                    let hint = funct.borrow().pattern.clone();
                    self.resolve_code_block(&body, Some(&hint))?;
                }
            }
            LookupValue::Procedure(procedure) => {
                let body = Ptr::clone(&procedure.borrow().body);
                self.resolve_code_block(&body, None)?;
            }
            LookupValue::OverloadedIdentity(set) => {
                let overloads = set.borrow().overloads.clone();
                for overload in &overloads {
                    self.resolve_lookup_value_definition(overload, scope)?;
                }
            }
            LookupValue::Variable(_)
            | LookupValue::UnionPattern(_)
            | LookupValue::IntrinsicType(_)
            | LookupValue::EnumType(_)
            | LookupValue::Entity(_) => {}
        }
        Ok(())
    }

    fn resolve_code_block(
        &mut self,
        code_block: &Ptr<CodeBlock>,
        pattern_hint: Option<&Pattern>,
    ) -> Result<()> {
        let block_scope = Ptr::clone(&code_block.borrow().scope);
        self.resolve_scope(&block_scope)?;

        let statements = code_block.borrow().statements.clone();
        let mut resolved = Vec::with_capacity(statements.len());
        for statement in statements {
            self.panic_mode = false;
            resolved.push(self.resolve_statement(statement, &block_scope, pattern_hint)?);
        }
        code_block.borrow_mut().statements = resolved;
        Ok(())
    }

    // STATEMENTS //

    fn resolve_statement(
        &mut self,
        statement: Statement,
        scope: &Ptr<Scope>,
        pattern_hint: Option<&Pattern>,
    ) -> Result<Statement> {
        match statement {
            Statement::Expression(expression) => {
                let resolved = self.resolve_expression(expression, scope, pattern_hint)?;
                Ok(Statement::Expression(resolved))
            }
            Statement::CodeBlock(code_block) => {
                self.resolve_code_block(&code_block, pattern_hint)?;
                Ok(Statement::CodeBlock(code_block))
            }
            Statement::IfStatement(node) => {
                let rules = node.borrow().rules.clone();
                let bool_hint = Pattern::IntrinsicType(Ptr::clone(&self.intrinsics.type_bool));
                let mut resolved_rules = Vec::with_capacity(rules.len());
                for mut rule in rules {
                    rule.condition =
                        self.resolve_expression(rule.condition, scope, Some(&bool_hint))?;
                    self.resolve_code_block(&rule.code_block, pattern_hint)?;
                    resolved_rules.push(rule);
                }
                node.borrow_mut().rules = resolved_rules;

                let else_block = node.borrow().else_block.clone();
                if let Some(else_block) = else_block {
                    self.resolve_code_block(&else_block, pattern_hint)?;
                }
                Ok(Statement::IfStatement(node))
            }
            Statement::ForStatement(node) => {
                let range = node.borrow().range.clone();
                let resolved_range = self.resolve_pattern(range, scope, None)?;
                node.borrow_mut().range = resolved_range.clone();
                let variable = Ptr::clone(&node.borrow().variable);
                variable.borrow_mut().pattern = resolved_range;
                let body = Ptr::clone(&node.borrow().body);
                self.resolve_code_block(&body, pattern_hint)?;
                Ok(Statement::ForStatement(node))
            }
            Statement::AssignmentStatement(node) => {
                let subject = node.borrow().subject.clone();
                let subject = self.resolve_expression(subject, scope, None)?;
                let subject_hint = determine_expression_pattern(&subject, self.intrinsics).ok();
                let value = node.borrow().value.clone();
                let value = self.resolve_expression(value, scope, subject_hint.as_ref())?;
                let mut statement = node.borrow_mut();
                statement.subject = subject;
                statement.value = value;
                drop(statement);
                Ok(Statement::AssignmentStatement(node))
            }
            Statement::VariableDeclaration(node) => {
                let value = node.borrow().value.clone();
                if let Some(value) = value {
                    let resolved = self.resolve_expression(value, scope, None)?;
                    let variable = Ptr::clone(&node.borrow().variable);
                    let uninferred =
                        matches!(variable.borrow().pattern, Pattern::UninferredPattern(_));
                    if uninferred {
                        let inferred = determine_expression_pattern(&resolved, self.intrinsics)?;
                        variable.borrow_mut().pattern = inferred;
                    }
                    node.borrow_mut().value = Some(resolved);
                }
                Ok(Statement::VariableDeclaration(node))
            }
        }
    }

    // EXPRESSIONS //

    fn resolve_expression(
        &mut self,
        expression: Expression,
        scope: &Ptr<Scope>,
        pattern_hint: Option<&Pattern>,
    ) -> Result<Expression> {
        match expression {
            Expression::UnresolvedIdentity(node) => {
                self.resolve_identity_expression(&node, scope, pattern_hint)
            }
            Expression::Variable(_)
            | Expression::EnumValue(_)
            | Expression::IntrinsicValue(_)
            | Expression::InvalidValue(_)
            | Expression::InvalidExpression(_) => Ok(expression),
            Expression::ListValue(node) => {
                let element_hint = match pattern_hint {
                    Some(Pattern::ListPattern(list)) => Some(list.borrow().list_of.clone()),
                    _ => None,
                };
                let values = node.borrow().values.clone();
                let mut resolved = Vec::with_capacity(values.len());
                for value in values {
                    resolved.push(self.resolve_expression(value, scope, element_hint.as_ref())?);
                }
                node.borrow_mut().values = resolved;
                Ok(Expression::ListValue(node))
            }
            Expression::InstanceList(node) => {
                let values = node.borrow().values.clone();
                let mut resolved = Vec::with_capacity(values.len());
                for value in values {
                    resolved.push(self.resolve_expression(value, scope, None)?);
                }
                node.borrow_mut().values = resolved;
                Ok(Expression::InstanceList(node))
            }
            Expression::Unary(node) => {
                let value = node.borrow().value.clone();
                let resolved = self.resolve_expression(value, scope, pattern_hint)?;
                node.borrow_mut().value = resolved;
                Ok(Expression::Unary(node))
            }
            Expression::Binary(node) => {
                let (lhs, rhs) = {
                    let borrowed = node.borrow();
                    (borrowed.lhs.clone(), borrowed.rhs.clone())
                };
                let lhs = self.resolve_expression(lhs, scope, pattern_hint)?;
                let rhs = self.resolve_expression(rhs, scope, pattern_hint)?;
                let mut borrowed = node.borrow_mut();
                borrowed.lhs = lhs;
                borrowed.rhs = rhs;
                drop(borrowed);
                Ok(Expression::Binary(node))
            }
            Expression::ExpressionIndex(node) => {
                let (subject, index) = {
                    let borrowed = node.borrow();
                    (borrowed.subject.clone(), borrowed.index.clone())
                };
                let subject = self.resolve_expression(subject, scope, None)?;
                let index = self.resolve_expression(index, scope, None)?;
                let mut borrowed = node.borrow_mut();
                borrowed.subject = subject;
                borrowed.index = index;
                drop(borrowed);
                Ok(Expression::ExpressionIndex(node))
            }
            Expression::PropertyIndex(node) => self.resolve_property_index(node, scope),
            Expression::Call(node) => {
                let (callee, arguments) = {
                    let borrowed = node.borrow();
                    (borrowed.callee.clone(), borrowed.arguments.clone())
                };
                let callee = self.resolve_expression(callee, scope, None)?;
                let mut resolved_arguments = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    resolved_arguments.push(self.resolve_expression(argument, scope, None)?);
                }
                let mut borrowed = node.borrow_mut();
                borrowed.callee = callee;
                borrowed.arguments = resolved_arguments;
                drop(borrowed);
                Ok(Expression::Call(node))
            }
            Expression::IfExpression(node) => {
                let rules = node.borrow().rules.clone();
                let bool_hint = Pattern::IntrinsicType(Ptr::clone(&self.intrinsics.type_bool));
                let mut resolved_rules = Vec::with_capacity(rules.len());
                for mut rule in rules {
                    rule.condition =
                        self.resolve_expression(rule.condition, scope, Some(&bool_hint))?;
                    rule.result = self.resolve_expression(rule.result, scope, pattern_hint)?;
                    resolved_rules.push(rule);
                }
                node.borrow_mut().rules = resolved_rules;
                Ok(Expression::IfExpression(node))
            }
            Expression::Match(node) => {
                let subject = node.borrow().subject.clone();
                let subject = self.resolve_expression(subject, scope, None)?;
                node.borrow_mut().subject = subject.clone();

                // The subject's pattern disambiguates bare identifiers in
                // the rules, hint-first.
                let subject_hint = determine_expression_pattern(&subject, self.intrinsics).ok();

                let rules = node.borrow().rules.clone();
                let mut resolved_rules = Vec::with_capacity(rules.len());
                for mut rule in rules {
                    rule.pattern =
                        self.resolve_pattern(rule.pattern, scope, subject_hint.as_ref())?;
                    rule.result = self.resolve_expression(rule.result, scope, pattern_hint)?;
                    resolved_rules.push(rule);
                }
                node.borrow_mut().rules = resolved_rules;
                Ok(Expression::Match(node))
            }
        }
    }

    fn resolve_identity_expression(
        &mut self,
        node: &Ptr<crate::apm::UnresolvedIdentity>,
        scope: &Ptr<Scope>,
        pattern_hint: Option<&Pattern>,
    ) -> Result<Expression> {
        let identity = node.borrow().identity.clone();
        let span = node.borrow().span.clone();

        if let Some(hint) = pattern_hint {
            if let Some(enum_value) = find_enum_value_in_pattern(hint, &identity) {
                return Ok(Expression::EnumValue(enum_value));
            }
        }

        match scope::fetch(scope, &identity) {
            Some(LookupValue::Variable(variable)) => Ok(Expression::Variable(variable)),
            Some(LookupValue::OverloadedIdentity(set)) => {
                let overloads = set.borrow().overloads.clone();
                if overloads.len() == 1 {
                    return self.zero_argument_property_index(&overloads[0], span);
                }
                self.emit(format!("'{identity}' is ambiguous here."), span.clone());
                Ok(invalid_expression(span))
            }
            Some(
                value @ (LookupValue::StateProperty(_) | LookupValue::FunctionProperty(_)),
            ) => self.zero_argument_property_index(&value, span),
            Some(_) => {
                self.emit(format!("'{identity}' is not a value."), span.clone());
                Ok(invalid_expression(span))
            }
            None => {
                self.emit(format!("'{identity}' is not defined."), span.clone());
                Ok(invalid_expression(span))
            }
        }
    }

    /// A bare property reference becomes a property index over an empty
    /// instance list.
    fn zero_argument_property_index(
        &mut self,
        overload: &LookupValue,
        span: Span,
    ) -> Result<Expression> {
        let property = match overload {
            LookupValue::StateProperty(state) => Property::StateProperty(Ptr::clone(state)),
            LookupValue::FunctionProperty(funct) => Property::FunctionProperty(Ptr::clone(funct)),
            _ => {
                return Err(CompilerError::new(
                    "Overload set contains a non-property binding",
                ))
            }
        };
        let instance_list = ptr(InstanceList {
            span: Some(span.clone()),
            values: Vec::new(),
        });
        Ok(Expression::PropertyIndex(ptr(
            crate::apm::PropertyIndex {
                span: Some(span),
                expr: Expression::InstanceList(instance_list),
                property,
            },
        )))
    }

    fn resolve_property_index(
        &mut self,
        node: Ptr<crate::apm::PropertyIndex>,
        scope: &Ptr<Scope>,
    ) -> Result<Expression> {
        let expr = node.borrow().expr.clone();
        let resolved_expr = self.resolve_expression(expr, scope, None)?;
        node.borrow_mut().expr = resolved_expr.clone();

        let property = node.borrow().property.clone();
        let unresolved = match property {
            Property::UnresolvedIdentity(unresolved) => unresolved,
            _ => return Ok(Expression::PropertyIndex(node)),
        };
        let identity = unresolved.borrow().identity.clone();
        let span = unresolved.borrow().span.clone();

        let instance_list = match &resolved_expr {
            Expression::InstanceList(list) => Ptr::clone(list),
            _ => {
                return Err(CompilerError::new(
                    "Property index subject is not an instance list",
                ))
            }
        };

        // A fault in the subject was already reported; accept the index
        // silently rather than cascading.
        let subject_invalid = instance_list.borrow().values.iter().any(|value| {
            matches!(
                value,
                Expression::InvalidValue(_) | Expression::InvalidExpression(_)
            )
        });
        if subject_invalid {
            node.borrow_mut().property =
                Property::InvalidProperty(ptr(InvalidProperty { span: Some(span) }));
            return Ok(Expression::PropertyIndex(node));
        }

        let overloads = scope::fetch_all_overloads(scope, &identity);
        if overloads.is_empty() {
            if scope::declared_in_scope(scope, &identity) {
                self.emit(format!("'{identity}' is not a property."), span.clone());
            } else {
                self.emit(format!("'{identity}' is not defined."), span.clone());
            }
            node.borrow_mut().property =
                Property::InvalidProperty(ptr(InvalidProperty { span: Some(span) }));
            return Ok(Expression::PropertyIndex(node));
        }

        for overload in &overloads {
            let parameters = match overload {
                LookupValue::StateProperty(state) => state.borrow().parameters.clone(),
                LookupValue::FunctionProperty(funct) => funct.borrow().parameters.clone(),
                _ => continue,
            };
            if does_instance_list_match_parameters(&instance_list, &parameters, self.intrinsics)? {
                let property = match overload {
                    LookupValue::StateProperty(state) => {
                        Property::StateProperty(Ptr::clone(state))
                    }
                    LookupValue::FunctionProperty(funct) => {
                        Property::FunctionProperty(Ptr::clone(funct))
                    }
                    _ => continue,
                };
                node.borrow_mut().property = property;
                return Ok(Expression::PropertyIndex(node));
            }
        }

        self.emit(
            format!("No overload of '{identity}' matches these values."),
            span.clone(),
        );
        node.borrow_mut().property =
            Property::InvalidProperty(ptr(InvalidProperty { span: Some(span) }));
        Ok(Expression::PropertyIndex(node))
    }

    // PATTERNS //

    fn resolve_pattern(
        &mut self,
        pattern: Pattern,
        scope: &Ptr<Scope>,
        pattern_hint: Option<&Pattern>,
    ) -> Result<Pattern> {
        match pattern {
            Pattern::UnresolvedIdentity(node) => {
                let identity = node.borrow().identity.clone();
                let span = node.borrow().span.clone();

                if let Some(hint) = pattern_hint {
                    if let Some(enum_value) = find_enum_value_in_pattern(hint, &identity) {
                        return Ok(Pattern::EnumValue(enum_value));
                    }
                }

                match scope::fetch(scope, &identity) {
                    Some(LookupValue::IntrinsicType(ty)) => Ok(Pattern::IntrinsicType(ty)),
                    Some(LookupValue::EnumType(ty)) => Ok(Pattern::EnumType(ty)),
                    Some(LookupValue::Entity(entity)) => Ok(Pattern::Entity(entity)),
                    Some(LookupValue::UnionPattern(union)) => Ok(Pattern::UnionPattern(union)),
                    Some(_) => {
                        self.emit(format!("'{identity}' is not a type."), span.clone());
                        Ok(invalid_pattern(span))
                    }
                    None => {
                        self.emit(format!("'{identity}' is not defined."), span.clone());
                        Ok(invalid_pattern(span))
                    }
                }
            }
            Pattern::OptionalPattern(node) => {
                let inner = node.borrow().pattern.clone();
                let mut resolved = self.resolve_pattern(inner, scope, pattern_hint)?;
                // The inner pattern of an optional is never itself optional.
                if let Pattern::OptionalPattern(nested) = &resolved {
                    let flattened = nested.borrow().pattern.clone();
                    resolved = flattened;
                }
                node.borrow_mut().pattern = resolved;
                Ok(Pattern::OptionalPattern(node))
            }
            Pattern::UnionPattern(node) => {
                let members = node.borrow().patterns.clone();
                let mut resolved_members: Vec<Pattern> = Vec::with_capacity(members.len());
                for member in members {
                    let resolved = self.resolve_pattern(member, scope, pattern_hint)?;
                    flatten_member(resolved, &mut resolved_members);
                }

                let named = node.borrow().identity.is_some();
                if resolved_members.len() == 1 && !named {
                    if let Some(single) = resolved_members.pop() {
                        return Ok(single);
                    }
                }
                node.borrow_mut().patterns = resolved_members;
                Ok(Pattern::UnionPattern(node))
            }
            Pattern::ListPattern(node) => {
                let list_of = node.borrow().list_of.clone();
                let resolved = self.resolve_pattern(list_of, scope, pattern_hint)?;
                node.borrow_mut().list_of = resolved;

                let fixed_size = node.borrow().fixed_size.clone();
                if let Some(fixed_size) = fixed_size {
                    let amt_hint = Pattern::IntrinsicType(Ptr::clone(&self.intrinsics.type_amt));
                    let resolved = self.resolve_expression(fixed_size, scope, Some(&amt_hint))?;
                    node.borrow_mut().fixed_size = Some(resolved);
                }
                Ok(Pattern::ListPattern(node))
            }
            other => Ok(other),
        }
    }
}

fn invalid_expression(span: Span) -> Expression {
    Expression::InvalidExpression(ptr(InvalidExpression { span: Some(span) }))
}

fn invalid_pattern(span: Span) -> Pattern {
    Pattern::InvalidPattern(ptr(InvalidPattern { span: Some(span) }))
}

/// Adds a resolved union member, flattening nested unions and dropping
/// duplicates.
fn flatten_member(pattern: Pattern, members: &mut Vec<Pattern>) {
    if let Pattern::UnionPattern(union) = &pattern {
        let nested = union.borrow().patterns.clone();
        for member in nested {
            flatten_member(member, members);
        }
        return;
    }
    if !members.iter().any(|member| patterns_equal(member, &pattern)) {
        members.push(pattern);
    }
}

/// Finds an enum value named `identity` inside a hint pattern.
fn find_enum_value_in_pattern(hint: &Pattern, identity: &str) -> Option<Ptr<EnumValue>> {
    match hint {
        Pattern::EnumType(enum_type) => enum_type
            .borrow()
            .values
            .iter()
            .find(|value| value.borrow().identity == identity)
            .map(Ptr::clone),
        Pattern::EnumValue(value) => {
            if value.borrow().identity == identity {
                Some(Ptr::clone(value))
            } else {
                None
            }
        }
        Pattern::UnionPattern(union) => union
            .borrow()
            .patterns
            .iter()
            .find_map(|member| find_enum_value_in_pattern(member, identity)),
        Pattern::OptionalPattern(optional) => {
            let inner = optional.borrow().pattern.clone();
            find_enum_value_in_pattern(&inner, identity)
        }
        _ => None,
    }
}
