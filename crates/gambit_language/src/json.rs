//! JSON debug dump of the APM.
//!
//! Every node serialises as an object whose `node` field names the variant,
//! followed by one field per semantic attribute. Spans and back-links (a
//! scope's parent, an enum value's type) are omitted: the dump describes
//! the program, not the bookkeeping, and the back-links would recurse
//! forever.
//!
//! Rendering goes through `serde_json`'s pretty printer, which produces the
//! expected shape: two-space indentation, containers opening on the same
//! line and closing at matching indent, and control characters escaped as
//! `\u00xx` (with the usual short escapes for `\b \f \n \r \t`).

use crate::apm::{
    AnyPattern, AssignmentStatement, Binary, Call, CodeBlock, Entity, EnumType, EnumValue,
    Expression, ExpressionIndex, ForStatement, FunctionProperty, IfExpression, IfExpressionRule,
    IfStatement, IfStatementRule, InstanceList, IntrinsicLiteral, IntrinsicType, IntrinsicValue,
    InvalidExpression, InvalidPattern, InvalidProperty, InvalidValue, ListPattern, ListValue,
    LookupValue, Match, MatchRule, OptionalPattern, OverloadedIdentity, Pattern, Procedure,
    Program, Property, PropertyIndex, Scope, StateProperty, Statement, Unary, UninferredPattern,
    UnionPattern, UnresolvedIdentity, Variable, VariableDeclaration,
};
use gambit_base::{CompilerError, Result};
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Renders any APM node as pretty-printed JSON.
pub fn to_json<T: Serialize>(node: &T) -> Result<String> {
    serde_json::to_string_pretty(node)
        .map_err(|error| CompilerError::new(format!("Could not serialise node to JSON: {error}")))
}

impl Serialize for Program {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Program", 2)?;
        state.serialize_field("node", "Program")?;
        state.serialize_field("global_scope", &self.global_scope)?;
        state.end()
    }
}

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Scope", 2)?;
        state.serialize_field("node", "Scope")?;
        state.serialize_field("lookup", &self.lookup)?;
        state.end()
    }
}

impl Serialize for LookupValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            LookupValue::Variable(node) => node.serialize(serializer),
            LookupValue::UnionPattern(node) => node.serialize(serializer),
            LookupValue::IntrinsicType(node) => node.serialize(serializer),
            LookupValue::EnumType(node) => node.serialize(serializer),
            LookupValue::Entity(node) => node.serialize(serializer),
            LookupValue::StateProperty(node) => node.serialize(serializer),
            LookupValue::FunctionProperty(node) => node.serialize(serializer),
            LookupValue::Procedure(node) => node.serialize(serializer),
            LookupValue::OverloadedIdentity(node) => node.serialize(serializer),
        }
    }
}

impl Serialize for OverloadedIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("OverloadedIdentity", 3)?;
        state.serialize_field("node", "OverloadedIdentity")?;
        state.serialize_field("identity", &self.identity)?;
        state.serialize_field("overloads", &self.overloads)?;
        state.end()
    }
}

impl Serialize for UnresolvedIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("UnresolvedIdentity", 2)?;
        state.serialize_field("node", "UnresolvedIdentity")?;
        state.serialize_field("identity", &self.identity)?;
        state.end()
    }
}

impl Serialize for UninferredPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("UninferredPattern", 1)?;
        state.serialize_field("node", "UninferredPattern")?;
        state.end()
    }
}

impl Serialize for InvalidPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("InvalidPattern", 1)?;
        state.serialize_field("node", "InvalidPattern")?;
        state.end()
    }
}

impl Serialize for AnyPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AnyPattern", 1)?;
        state.serialize_field("node", "AnyPattern")?;
        state.end()
    }
}

impl Serialize for UnionPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("UnionPattern", 3)?;
        state.serialize_field("node", "UnionPattern")?;
        state.serialize_field("identity", &self.identity)?;
        state.serialize_field("patterns", &self.patterns)?;
        state.end()
    }
}

impl Serialize for ListPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ListPattern", 3)?;
        state.serialize_field("node", "ListPattern")?;
        state.serialize_field("list_of", &self.list_of)?;
        state.serialize_field("fixed_size", &self.fixed_size)?;
        state.end()
    }
}

impl Serialize for OptionalPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("OptionalPattern", 2)?;
        state.serialize_field("node", "OptionalPattern")?;
        state.serialize_field("pattern", &self.pattern)?;
        state.end()
    }
}

impl Serialize for IntrinsicType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("IntrinsicType", 2)?;
        state.serialize_field("node", "IntrinsicType")?;
        state.serialize_field("identity", &self.identity)?;
        state.end()
    }
}

impl Serialize for IntrinsicValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("IntrinsicValue", 3)?;
        state.serialize_field("node", "IntrinsicValue")?;
        state.serialize_field("value", &self.value)?;
        state.serialize_field("type", &self.ty)?;
        state.end()
    }
}

impl Serialize for IntrinsicLiteral {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            IntrinsicLiteral::Real(value) => serializer.serialize_f64(*value),
            IntrinsicLiteral::Integer(value) => serializer.serialize_i64(*value),
            IntrinsicLiteral::Bool(value) => serializer.serialize_bool(*value),
            IntrinsicLiteral::Str(value) => serializer.serialize_str(value),
            IntrinsicLiteral::None => serializer.serialize_unit(),
        }
    }
}

impl Serialize for EnumType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("EnumType", 3)?;
        state.serialize_field("node", "EnumType")?;
        state.serialize_field("identity", &self.identity)?;
        state.serialize_field("values", &self.values)?;
        state.end()
    }
}

impl Serialize for EnumValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("EnumValue", 2)?;
        state.serialize_field("node", "EnumValue")?;
        state.serialize_field("identity", &self.identity)?;
        state.end()
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Entity", 2)?;
        state.serialize_field("node", "Entity")?;
        state.serialize_field("identity", &self.identity)?;
        state.end()
    }
}

impl Serialize for Variable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Variable", 4)?;
        state.serialize_field("node", "Variable")?;
        state.serialize_field("identity", &self.identity)?;
        state.serialize_field("pattern", &self.pattern)?;
        state.serialize_field("is_mutable", &self.is_mutable)?;
        state.end()
    }
}

impl Serialize for StateProperty {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("StateProperty", 5)?;
        state.serialize_field("node", "StateProperty")?;
        state.serialize_field("identity", &self.identity)?;
        state.serialize_field("pattern", &self.pattern)?;
        state.serialize_field("parameters", &self.parameters)?;
        state.serialize_field("initial_value", &self.initial_value)?;
        state.end()
    }
}

impl Serialize for FunctionProperty {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FunctionProperty", 5)?;
        state.serialize_field("node", "FunctionProperty")?;
        state.serialize_field("identity", &self.identity)?;
        state.serialize_field("pattern", &self.pattern)?;
        state.serialize_field("parameters", &self.parameters)?;
        state.serialize_field("body", &self.body)?;
        state.end()
    }
}

impl Serialize for InvalidProperty {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("InvalidProperty", 1)?;
        state.serialize_field("node", "InvalidProperty")?;
        state.end()
    }
}

impl Serialize for Procedure {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Procedure", 4)?;
        state.serialize_field("node", "Procedure")?;
        state.serialize_field("identity", &self.identity)?;
        state.serialize_field("parameters", &self.parameters)?;
        state.serialize_field("body", &self.body)?;
        state.end()
    }
}

impl Serialize for Property {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        // A resolved property is declared elsewhere in the dump; repeat
        // only its identity here rather than the whole definition.
        match self {
            Property::UnresolvedIdentity(node) => node.serialize(serializer),
            Property::StateProperty(node) => {
                let node = node.borrow();
                let mut state = serializer.serialize_struct("StateProperty", 2)?;
                state.serialize_field("node", "StateProperty")?;
                state.serialize_field("identity", &node.identity)?;
                state.end()
            }
            Property::FunctionProperty(node) => {
                let node = node.borrow();
                let mut state = serializer.serialize_struct("FunctionProperty", 2)?;
                state.serialize_field("node", "FunctionProperty")?;
                state.serialize_field("identity", &node.identity)?;
                state.end()
            }
            Property::InvalidProperty(node) => node.serialize(serializer),
        }
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Pattern::UnresolvedIdentity(node) => node.serialize(serializer),
            Pattern::UninferredPattern(node) => node.serialize(serializer),
            Pattern::InvalidPattern(node) => node.serialize(serializer),
            Pattern::AnyPattern(node) => node.serialize(serializer),
            Pattern::UnionPattern(node) => node.serialize(serializer),
            Pattern::ListPattern(node) => node.serialize(serializer),
            Pattern::OptionalPattern(node) => node.serialize(serializer),
            Pattern::IntrinsicType(node) => node.serialize(serializer),
            Pattern::EnumType(node) => node.serialize(serializer),
            Pattern::Entity(node) => node.serialize(serializer),
            Pattern::IntrinsicValue(node) => node.serialize(serializer),
            Pattern::EnumValue(node) => node.serialize(serializer),
        }
    }
}

impl Serialize for ListValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ListValue", 2)?;
        state.serialize_field("node", "ListValue")?;
        state.serialize_field("values", &self.values)?;
        state.end()
    }
}

impl Serialize for InstanceList {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("InstanceList", 2)?;
        state.serialize_field("node", "InstanceList")?;
        state.serialize_field("values", &self.values)?;
        state.end()
    }
}

impl Serialize for Unary {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Unary", 3)?;
        state.serialize_field("node", "Unary")?;
        state.serialize_field("op", &self.op)?;
        state.serialize_field("value", &self.value)?;
        state.end()
    }
}

impl Serialize for Binary {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Binary", 4)?;
        state.serialize_field("node", "Binary")?;
        state.serialize_field("op", &self.op)?;
        state.serialize_field("lhs", &self.lhs)?;
        state.serialize_field("rhs", &self.rhs)?;
        state.end()
    }
}

impl Serialize for ExpressionIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ExpressionIndex", 3)?;
        state.serialize_field("node", "ExpressionIndex")?;
        state.serialize_field("subject", &self.subject)?;
        state.serialize_field("index", &self.index)?;
        state.end()
    }
}

impl Serialize for PropertyIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PropertyIndex", 3)?;
        state.serialize_field("node", "PropertyIndex")?;
        state.serialize_field("expr", &self.expr)?;
        state.serialize_field("property", &self.property)?;
        state.end()
    }
}

impl Serialize for Call {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Call", 3)?;
        state.serialize_field("node", "Call")?;
        state.serialize_field("callee", &self.callee)?;
        state.serialize_field("arguments", &self.arguments)?;
        state.end()
    }
}

impl Serialize for IfExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("IfExpression", 3)?;
        state.serialize_field("node", "IfExpression")?;
        state.serialize_field("rules", &self.rules)?;
        state.serialize_field("has_else", &self.has_else)?;
        state.end()
    }
}

impl Serialize for IfExpressionRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("IfExpressionRule", 3)?;
        state.serialize_field("node", "IfExpressionRule")?;
        state.serialize_field("condition", &self.condition)?;
        state.serialize_field("result", &self.result)?;
        state.end()
    }
}

impl Serialize for Match {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Match", 4)?;
        state.serialize_field("node", "Match")?;
        state.serialize_field("subject", &self.subject)?;
        state.serialize_field("rules", &self.rules)?;
        state.serialize_field("has_else", &self.has_else)?;
        state.end()
    }
}

impl Serialize for MatchRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("MatchRule", 3)?;
        state.serialize_field("node", "MatchRule")?;
        state.serialize_field("pattern", &self.pattern)?;
        state.serialize_field("result", &self.result)?;
        state.end()
    }
}

impl Serialize for InvalidValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("InvalidValue", 1)?;
        state.serialize_field("node", "InvalidValue")?;
        state.end()
    }
}

impl Serialize for InvalidExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("InvalidExpression", 1)?;
        state.serialize_field("node", "InvalidExpression")?;
        state.end()
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Expression::UnresolvedIdentity(node) => node.serialize(serializer),
            Expression::Variable(node) => node.serialize(serializer),
            Expression::EnumValue(node) => node.serialize(serializer),
            Expression::IntrinsicValue(node) => node.serialize(serializer),
            Expression::ListValue(node) => node.serialize(serializer),
            Expression::InstanceList(node) => node.serialize(serializer),
            Expression::Unary(node) => node.serialize(serializer),
            Expression::Binary(node) => node.serialize(serializer),
            Expression::ExpressionIndex(node) => node.serialize(serializer),
            Expression::PropertyIndex(node) => node.serialize(serializer),
            Expression::Call(node) => node.serialize(serializer),
            Expression::IfExpression(node) => node.serialize(serializer),
            Expression::Match(node) => node.serialize(serializer),
            Expression::InvalidValue(node) => node.serialize(serializer),
            Expression::InvalidExpression(node) => node.serialize(serializer),
        }
    }
}

impl Serialize for CodeBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("CodeBlock", 3)?;
        state.serialize_field("node", "CodeBlock")?;
        state.serialize_field("singleton_block", &self.singleton_block)?;
        state.serialize_field("statements", &self.statements)?;
        state.end()
    }
}

impl Serialize for IfStatement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("IfStatement", 3)?;
        state.serialize_field("node", "IfStatement")?;
        state.serialize_field("rules", &self.rules)?;
        state.serialize_field("else_block", &self.else_block)?;
        state.end()
    }
}

impl Serialize for IfStatementRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("IfStatementRule", 3)?;
        state.serialize_field("node", "IfStatementRule")?;
        state.serialize_field("condition", &self.condition)?;
        state.serialize_field("code_block", &self.code_block)?;
        state.end()
    }
}

impl Serialize for ForStatement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ForStatement", 4)?;
        state.serialize_field("node", "ForStatement")?;
        state.serialize_field("variable", &self.variable)?;
        state.serialize_field("range", &self.range)?;
        state.serialize_field("body", &self.body)?;
        state.end()
    }
}

impl Serialize for AssignmentStatement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AssignmentStatement", 3)?;
        state.serialize_field("node", "AssignmentStatement")?;
        state.serialize_field("subject", &self.subject)?;
        state.serialize_field("value", &self.value)?;
        state.end()
    }
}

impl Serialize for VariableDeclaration {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("VariableDeclaration", 3)?;
        state.serialize_field("node", "VariableDeclaration")?;
        state.serialize_field("variable", &self.variable)?;
        state.serialize_field("value", &self.value)?;
        state.end()
    }
}

impl Serialize for Statement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Statement::Expression(expression) => expression.serialize(serializer),
            Statement::CodeBlock(node) => node.serialize(serializer),
            Statement::IfStatement(node) => node.serialize(serializer),
            Statement::ForStatement(node) => node.serialize(serializer),
            Statement::AssignmentStatement(node) => node.serialize(serializer),
            Statement::VariableDeclaration(node) => node.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apm::ptr;

    #[test]
    fn nodes_carry_their_variant_name() {
        let entity = Entity {
            span: None,
            identity: "Player".into(),
        };
        let json = to_json(&entity).unwrap();
        assert!(json.contains("\"node\": \"Entity\""));
        assert!(json.contains("\"identity\": \"Player\""));
    }

    #[test]
    fn enum_values_do_not_recurse_into_their_type() {
        let enum_type = ptr(EnumType {
            span: None,
            identity: "Color".into(),
            values: Vec::new(),
        });
        let value = ptr(EnumValue {
            span: None,
            identity: "Red".into(),
            ty: std::rc::Rc::downgrade(&enum_type),
        });
        enum_type.borrow_mut().values.push(value);
        let json = to_json(&enum_type).unwrap();
        assert!(json.contains("\"node\": \"EnumValue\""));
        assert!(!json.contains("\"ty\""));
    }

    #[test]
    fn dump_uses_two_space_indentation() {
        let entity = Entity {
            span: None,
            identity: "Player".into(),
        };
        let json = to_json(&entity).unwrap();
        assert!(json.starts_with("{\n  \"node\""));
    }

    #[test]
    fn string_scalars_escape_control_characters() {
        let json = to_json(&IntrinsicLiteral::Str("a\tb\u{1}".into())).unwrap();
        assert_eq!(json, "\"a\\tb\\u0001\"");
    }
}
