//! The Abstract Program Model.
//!
//! The APM is the in-memory representation of a Gambit program: scopes,
//! entities, enums, properties, patterns, expressions and statements. The
//! parser produces an APM populated with [`UnresolvedIdentity`] nodes, the
//! resolver replaces them with links to their definitions, and the checker
//! reads the result without mutating it.
//!
//! Nodes are shared through [`Ptr`] (`Rc<RefCell<_>>`); back-links that
//! would create ownership cycles — a scope's parent, an enum value's type —
//! are the non-owning [`WPtr`]. Ownership flows from [`Program`] through
//! the global scope into definitions, bodies and nested scopes.
//!
//! The utility methods in this module have no side effects and report no
//! language errors; each stage of the compiler decides for itself how to
//! handle the situations they reveal.

use gambit_base::Span;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Shared handle to an APM node.
pub type Ptr<T> = Rc<RefCell<T>>;
/// Non-owning handle to an APM node.
pub type WPtr<T> = Weak<RefCell<T>>;

/// Allocates a node and returns its shared handle.
pub fn ptr<T>(value: T) -> Ptr<T> {
    Rc::new(RefCell::new(value))
}

/// `true` if two handles refer to the same node.
pub fn same_node<T>(a: &Ptr<T>, b: &Ptr<T>) -> bool {
    Rc::ptr_eq(a, b)
}

// Program

/// A fully-parsed program: one global scope.
#[derive(Debug)]
pub struct Program {
    pub global_scope: Ptr<Scope>,
}

/// A brace-delimited (or `:` singleton) sequence of statements with its
/// own scope.
#[derive(Debug)]
pub struct CodeBlock {
    pub span: Option<Span>,
    pub singleton_block: bool,
    pub scope: Ptr<Scope>,
    pub statements: Vec<Statement>,
}

/// An insertion-ordered mapping from identifier to definition, with an
/// optional (non-owning) link to the enclosing scope.
#[derive(Debug)]
pub struct Scope {
    pub parent: Option<WPtr<Scope>>,
    pub lookup: IndexMap<String, LookupValue>,
}

impl Scope {
    pub fn new(parent: Option<WPtr<Scope>>) -> Self {
        Self {
            parent,
            lookup: IndexMap::new(),
        }
    }

    /// A fresh scope nested inside `parent`.
    pub fn nested_in(parent: &Ptr<Scope>) -> Ptr<Scope> {
        ptr(Scope::new(Some(Rc::downgrade(parent))))
    }
}

/// One binding in a scope.
#[derive(Debug, Clone)]
pub enum LookupValue {
    Variable(Ptr<Variable>),
    UnionPattern(Ptr<UnionPattern>),
    IntrinsicType(Ptr<IntrinsicType>),
    EnumType(Ptr<EnumType>),
    Entity(Ptr<Entity>),
    StateProperty(Ptr<StateProperty>),
    FunctionProperty(Ptr<FunctionProperty>),
    Procedure(Ptr<Procedure>),
    OverloadedIdentity(Ptr<OverloadedIdentity>),
}

/// The overloads declared under one identifier.
///
/// Only state and function properties may be overloaded; every overloadable
/// declaration is wrapped in one of these, even the first.
#[derive(Debug)]
pub struct OverloadedIdentity {
    pub identity: String,
    pub overloads: Vec<LookupValue>,
}

// Unresolved identity

/// A name the parser could not yet attach to a definition.
///
/// None of these survive resolution: the resolver replaces each with a link
/// to its definition or with an `Invalid*` marker.
#[derive(Debug)]
pub struct UnresolvedIdentity {
    pub span: Span,
    pub identity: String,
}

/// Placeholder pattern for a declaration whose pattern is inferred later.
#[derive(Debug)]
pub struct UninferredPattern;

// Variables

#[derive(Debug)]
pub struct Variable {
    pub span: Option<Span>,
    pub identity: String,
    pub pattern: Pattern,
    pub is_mutable: bool,
}

// Patterns

/// A set-of-values specifier, used both as a type and — for singleton
/// values — as a literal.
#[derive(Debug, Clone)]
pub enum Pattern {
    UnresolvedIdentity(Ptr<UnresolvedIdentity>),
    UninferredPattern(Ptr<UninferredPattern>),
    InvalidPattern(Ptr<InvalidPattern>),
    AnyPattern(Ptr<AnyPattern>),
    UnionPattern(Ptr<UnionPattern>),
    ListPattern(Ptr<ListPattern>),
    OptionalPattern(Ptr<OptionalPattern>),
    IntrinsicType(Ptr<IntrinsicType>),
    EnumType(Ptr<EnumType>),
    Entity(Ptr<Entity>),
    IntrinsicValue(Ptr<IntrinsicValue>),
    EnumValue(Ptr<EnumValue>),
}

/// Matches every value, `none` included.
#[derive(Debug)]
pub struct AnyPattern {
    pub span: Option<Span>,
}

/// The set-union of two or more patterns.
///
/// Flat after resolution: no member is itself a union, and members are
/// pairwise distinct. Only unions declared as scope entries carry an
/// identity; all others are anonymous.
#[derive(Debug)]
pub struct UnionPattern {
    pub span: Option<Span>,
    pub identity: Option<String>,
    pub patterns: Vec<Pattern>,
}

/// A homogeneous list, optionally of fixed size.
#[derive(Debug)]
pub struct ListPattern {
    pub span: Option<Span>,
    pub list_of: Pattern,
    pub fixed_size: Option<Expression>,
}

/// The inner pattern or `none`. The inner pattern is never itself optional.
#[derive(Debug)]
pub struct OptionalPattern {
    pub span: Option<Span>,
    pub pattern: Pattern,
}

/// Marker left where a pattern could not be produced.
#[derive(Debug)]
pub struct InvalidPattern {
    pub span: Option<Span>,
}

// Enums

#[derive(Debug)]
pub struct EnumType {
    pub span: Option<Span>,
    pub identity: String,
    pub values: Vec<Ptr<EnumValue>>,
}

/// One value of an enum. Back-references its type without owning it.
#[derive(Debug)]
pub struct EnumValue {
    pub span: Option<Span>,
    pub identity: String,
    pub ty: WPtr<EnumType>,
}

impl EnumValue {
    /// The enum type this value belongs to, while it is alive.
    pub fn enum_type(&self) -> Option<Ptr<EnumType>> {
        self.ty.upgrade()
    }
}

// Entities

/// A declared entity. Instances are opaque handles; field storage is a
/// concern of the code generator, not the front-end.
#[derive(Debug)]
pub struct Entity {
    pub span: Option<Span>,
    pub identity: String,
}

// Properties

/// The property named by a property index.
#[derive(Debug, Clone)]
pub enum Property {
    UnresolvedIdentity(Ptr<UnresolvedIdentity>),
    StateProperty(Ptr<StateProperty>),
    FunctionProperty(Ptr<FunctionProperty>),
    InvalidProperty(Ptr<InvalidProperty>),
}

/// A unit of game state: `state P(params).id [: initial]`.
#[derive(Debug)]
pub struct StateProperty {
    pub span: Option<Span>,
    pub identity: String,
    pub pattern: Pattern,
    pub scope: Ptr<Scope>,
    pub parameters: Vec<Ptr<Variable>>,
    pub initial_value: Option<Expression>,
}

/// A derived value: `fn P(params).id [body]`.
#[derive(Debug)]
pub struct FunctionProperty {
    pub span: Option<Span>,
    pub identity: String,
    pub pattern: Pattern,
    pub scope: Ptr<Scope>,
    pub parameters: Vec<Ptr<Variable>>,
    pub body: Option<Ptr<CodeBlock>>,
}

#[derive(Debug)]
pub struct InvalidProperty {
    pub span: Option<Span>,
}

// Procedures

#[derive(Debug)]
pub struct Procedure {
    pub span: Option<Span>,
    pub identity: String,
    pub scope: Ptr<Scope>,
    pub parameters: Vec<Ptr<Variable>>,
    pub body: Ptr<CodeBlock>,
}

// Intrinsic types and values

/// A built-in type, constructed once per compilation and never mutated.
#[derive(Debug)]
pub struct IntrinsicType {
    pub identity: String,
}

/// A literal or built-in value, tagged with its intrinsic type.
#[derive(Debug)]
pub struct IntrinsicValue {
    pub span: Option<Span>,
    pub value: IntrinsicLiteral,
    pub ty: Ptr<IntrinsicType>,
}

/// The payload of an [`IntrinsicValue`].
#[derive(Debug, Clone, PartialEq)]
pub enum IntrinsicLiteral {
    Real(f64),
    Integer(i64),
    Bool(bool),
    Str(String),
    None,
}

// Expressions

#[derive(Debug, Clone)]
pub enum Expression {
    UnresolvedIdentity(Ptr<UnresolvedIdentity>),
    Variable(Ptr<Variable>),
    EnumValue(Ptr<EnumValue>),
    IntrinsicValue(Ptr<IntrinsicValue>),
    ListValue(Ptr<ListValue>),
    InstanceList(Ptr<InstanceList>),
    Unary(Ptr<Unary>),
    Binary(Ptr<Binary>),
    ExpressionIndex(Ptr<ExpressionIndex>),
    PropertyIndex(Ptr<PropertyIndex>),
    Call(Ptr<Call>),
    IfExpression(Ptr<IfExpression>),
    Match(Ptr<Match>),
    InvalidValue(Ptr<InvalidValue>),
    InvalidExpression(Ptr<InvalidExpression>),
}

/// A `[ … ]` list literal.
#[derive(Debug)]
pub struct ListValue {
    pub span: Option<Span>,
    pub values: Vec<Expression>,
}

/// An ordered positional argument tuple, as in `(a, b).property`.
#[derive(Debug)]
pub struct InstanceList {
    pub span: Option<Span>,
    pub values: Vec<Expression>,
}

#[derive(Debug)]
pub struct Unary {
    pub span: Option<Span>,
    pub op: String,
    pub value: Expression,
}

#[derive(Debug)]
pub struct Binary {
    pub span: Option<Span>,
    pub op: String,
    pub lhs: Expression,
    pub rhs: Expression,
}

/// `subject[index]`
#[derive(Debug)]
pub struct ExpressionIndex {
    pub span: Option<Span>,
    pub subject: Expression,
    pub index: Expression,
}

/// `subject.property` — the subject is always an instance list, wrapping
/// single values on the way in.
#[derive(Debug)]
pub struct PropertyIndex {
    pub span: Option<Span>,
    pub expr: Expression,
    pub property: Property,
}

#[derive(Debug)]
pub struct Call {
    pub span: Option<Span>,
    pub callee: Expression,
    pub arguments: Vec<Expression>,
}

#[derive(Debug)]
pub struct IfExpression {
    pub span: Option<Span>,
    pub rules: Vec<IfExpressionRule>,
    pub has_else: bool,
}

#[derive(Debug, Clone)]
pub struct IfExpressionRule {
    pub span: Option<Span>,
    pub condition: Expression,
    pub result: Expression,
}

/// `match subject { pattern : result … }`
#[derive(Debug)]
pub struct Match {
    pub span: Option<Span>,
    pub subject: Expression,
    pub rules: Vec<MatchRule>,
    pub has_else: bool,
}

#[derive(Debug, Clone)]
pub struct MatchRule {
    pub span: Option<Span>,
    /// Where the pattern was written. Resolution may replace `pattern`
    /// with a shared declaration node whose own span is the declaration,
    /// so diagnostics about the rule point here instead.
    pub pattern_span: Option<Span>,
    pub pattern: Pattern,
    pub result: Expression,
}

#[derive(Debug)]
pub struct InvalidValue {
    pub span: Option<Span>,
}

#[derive(Debug)]
pub struct InvalidExpression {
    pub span: Option<Span>,
}

// Statements

#[derive(Debug, Clone)]
pub enum Statement {
    Expression(Expression),
    CodeBlock(Ptr<CodeBlock>),
    IfStatement(Ptr<IfStatement>),
    ForStatement(Ptr<ForStatement>),
    AssignmentStatement(Ptr<AssignmentStatement>),
    VariableDeclaration(Ptr<VariableDeclaration>),
}

#[derive(Debug)]
pub struct IfStatement {
    pub span: Option<Span>,
    pub rules: Vec<IfStatementRule>,
    pub else_block: Option<Ptr<CodeBlock>>,
}

#[derive(Debug, Clone)]
pub struct IfStatementRule {
    pub span: Option<Span>,
    pub condition: Expression,
    pub code_block: Ptr<CodeBlock>,
}

#[derive(Debug)]
pub struct ForStatement {
    pub span: Option<Span>,
    pub variable: Ptr<Variable>,
    pub range: Pattern,
    pub scope: Ptr<Scope>,
    pub body: Ptr<CodeBlock>,
}

#[derive(Debug)]
pub struct AssignmentStatement {
    pub span: Option<Span>,
    pub subject: Expression,
    pub value: Expression,
}

#[derive(Debug)]
pub struct VariableDeclaration {
    pub span: Option<Span>,
    pub variable: Ptr<Variable>,
    pub value: Option<Expression>,
}

// Span dispatch

impl Statement {
    /// The statement's span, dispatching on variant.
    pub fn span(&self) -> Option<Span> {
        match self {
            Statement::Expression(expr) => expr.span(),
            Statement::CodeBlock(node) => node.borrow().span.clone(),
            Statement::IfStatement(node) => node.borrow().span.clone(),
            Statement::ForStatement(node) => node.borrow().span.clone(),
            Statement::AssignmentStatement(node) => node.borrow().span.clone(),
            Statement::VariableDeclaration(node) => node.borrow().span.clone(),
        }
    }
}

impl Expression {
    /// The expression's span, dispatching on variant.
    pub fn span(&self) -> Option<Span> {
        match self {
            Expression::UnresolvedIdentity(node) => Some(node.borrow().span.clone()),
            Expression::Variable(node) => node.borrow().span.clone(),
            Expression::EnumValue(node) => node.borrow().span.clone(),
            Expression::IntrinsicValue(node) => node.borrow().span.clone(),
            Expression::ListValue(node) => node.borrow().span.clone(),
            Expression::InstanceList(node) => node.borrow().span.clone(),
            Expression::Unary(node) => node.borrow().span.clone(),
            Expression::Binary(node) => node.borrow().span.clone(),
            Expression::ExpressionIndex(node) => node.borrow().span.clone(),
            Expression::PropertyIndex(node) => node.borrow().span.clone(),
            Expression::Call(node) => node.borrow().span.clone(),
            Expression::IfExpression(node) => node.borrow().span.clone(),
            Expression::Match(node) => node.borrow().span.clone(),
            Expression::InvalidValue(node) => node.borrow().span.clone(),
            Expression::InvalidExpression(node) => node.borrow().span.clone(),
        }
    }
}

impl Pattern {
    /// The pattern's span, dispatching on variant. Intrinsic types and
    /// uninferred placeholders have none.
    pub fn span(&self) -> Option<Span> {
        match self {
            Pattern::UnresolvedIdentity(node) => Some(node.borrow().span.clone()),
            Pattern::UninferredPattern(_) => None,
            Pattern::InvalidPattern(node) => node.borrow().span.clone(),
            Pattern::AnyPattern(node) => node.borrow().span.clone(),
            Pattern::UnionPattern(node) => node.borrow().span.clone(),
            Pattern::ListPattern(node) => node.borrow().span.clone(),
            Pattern::OptionalPattern(node) => node.borrow().span.clone(),
            Pattern::IntrinsicType(_) => None,
            Pattern::EnumType(node) => node.borrow().span.clone(),
            Pattern::Entity(node) => node.borrow().span.clone(),
            Pattern::IntrinsicValue(node) => node.borrow().span.clone(),
            Pattern::EnumValue(node) => node.borrow().span.clone(),
        }
    }
}

impl Property {
    pub fn span(&self) -> Option<Span> {
        match self {
            Property::UnresolvedIdentity(node) => Some(node.borrow().span.clone()),
            Property::StateProperty(node) => node.borrow().span.clone(),
            Property::FunctionProperty(node) => node.borrow().span.clone(),
            Property::InvalidProperty(node) => node.borrow().span.clone(),
        }
    }
}

impl LookupValue {
    /// The binding's span, dispatching on variant. Intrinsic declarations
    /// have none.
    pub fn span(&self) -> Option<Span> {
        match self {
            LookupValue::Variable(node) => node.borrow().span.clone(),
            LookupValue::UnionPattern(node) => node.borrow().span.clone(),
            LookupValue::IntrinsicType(_) => None,
            LookupValue::EnumType(node) => node.borrow().span.clone(),
            LookupValue::Entity(node) => node.borrow().span.clone(),
            LookupValue::StateProperty(node) => node.borrow().span.clone(),
            LookupValue::FunctionProperty(node) => node.borrow().span.clone(),
            LookupValue::Procedure(node) => node.borrow().span.clone(),
            LookupValue::OverloadedIdentity(node) => node
                .borrow()
                .overloads
                .first()
                .and_then(|overload| overload.span()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_scope_links_back_to_its_parent() {
        let outer = ptr(Scope::new(None));
        let inner = Scope::nested_in(&outer);
        let parent = inner.borrow().parent.clone().unwrap().upgrade().unwrap();
        assert!(same_node(&parent, &outer));
    }

    #[test]
    fn enum_value_back_references_its_type() {
        let enum_type = ptr(EnumType {
            span: None,
            identity: "Color".into(),
            values: Vec::new(),
        });
        let value = ptr(EnumValue {
            span: None,
            identity: "Red".into(),
            ty: Rc::downgrade(&enum_type),
        });
        enum_type.borrow_mut().values.push(Rc::clone(&value));
        let recovered = value.borrow().enum_type().unwrap();
        assert!(same_node(&recovered, &enum_type));
    }

    #[test]
    fn parent_link_does_not_keep_the_scope_alive() {
        let inner;
        {
            let outer = ptr(Scope::new(None));
            inner = Scope::nested_in(&outer);
        }
        assert!(inner.borrow().parent.clone().unwrap().upgrade().is_none());
    }
}
