//! Pre-declared types, values and entities.
//!
//! Intrinsics are constructed once per compilation, seeded into the global
//! scope before parsing begins, and never mutated afterwards. The checker
//! keeps a reference so it can compare condition patterns against `bool`
//! and literal patterns against the numeric tower.

use crate::apm::{
    Entity, IntrinsicLiteral, IntrinsicType, IntrinsicValue, LookupValue, Pattern, Ptr, Scope,
    StateProperty, Variable, ptr,
};
use crate::scope::{DeclareOutcome, declare};
use gambit_base::{CompilerError, Result};

/// The built-in declarations every Gambit program can see.
#[derive(Debug)]
pub struct Intrinsics {
    pub type_str: Ptr<IntrinsicType>,
    /// Real numbers.
    pub type_num: Ptr<IntrinsicType>,
    /// Signed integers.
    pub type_int: Ptr<IntrinsicType>,
    /// Non-negative integers.
    pub type_amt: Ptr<IntrinsicType>,
    pub type_bool: Ptr<IntrinsicType>,
    pub type_none: Ptr<IntrinsicType>,
    /// The unique `none` value; its pattern is the `none` type.
    pub value_none: Ptr<IntrinsicValue>,
    pub entity_player: Ptr<Entity>,
    /// `state amt(Player player).number`
    pub state_player_number: Ptr<StateProperty>,
}

fn intrinsic_type(identity: &str) -> Ptr<IntrinsicType> {
    ptr(IntrinsicType {
        identity: identity.into(),
    })
}

impl Intrinsics {
    pub fn new() -> Self {
        let type_str = intrinsic_type("str");
        let type_num = intrinsic_type("num");
        let type_int = intrinsic_type("int");
        let type_amt = intrinsic_type("amt");
        let type_bool = intrinsic_type("bool");
        let type_none = intrinsic_type("none");

        let value_none = ptr(IntrinsicValue {
            span: None,
            value: IntrinsicLiteral::None,
            ty: Ptr::clone(&type_none),
        });

        let entity_player = ptr(Entity {
            span: None,
            identity: "Player".into(),
        });

        // The `player` parameter is not declared in the property's scope;
        // intrinsic properties have no body that could refer to it.
        let state_player_number = ptr(StateProperty {
            span: None,
            identity: "number".into(),
            pattern: Pattern::IntrinsicType(Ptr::clone(&type_amt)),
            scope: ptr(Scope::new(None)),
            parameters: vec![ptr(Variable {
                span: None,
                identity: "player".into(),
                pattern: Pattern::Entity(Ptr::clone(&entity_player)),
                is_mutable: false,
            })],
            initial_value: None,
        });

        Self {
            type_str,
            type_num,
            type_int,
            type_amt,
            type_bool,
            type_none,
            value_none,
            entity_player,
            state_player_number,
        }
    }

    /// Seeds the intrinsic declarations into `scope`.
    ///
    /// The scope is expected to be freshly created; a clash here means the
    /// compiler seeded it twice.
    pub fn declare_in(&self, scope: &Ptr<Scope>) -> Result<()> {
        let declarations = [
            LookupValue::IntrinsicType(Ptr::clone(&self.type_str)),
            LookupValue::IntrinsicType(Ptr::clone(&self.type_num)),
            LookupValue::IntrinsicType(Ptr::clone(&self.type_int)),
            LookupValue::IntrinsicType(Ptr::clone(&self.type_amt)),
            LookupValue::IntrinsicType(Ptr::clone(&self.type_bool)),
            LookupValue::IntrinsicType(Ptr::clone(&self.type_none)),
            LookupValue::Entity(Ptr::clone(&self.entity_player)),
            LookupValue::StateProperty(Ptr::clone(&self.state_player_number)),
        ];
        for declaration in declarations {
            if let DeclareOutcome::Clash { .. } = declare(scope, declaration)? {
                return Err(CompilerError::new(
                    "Intrinsic declaration clashed while seeding the global scope",
                ));
            }
        }
        Ok(())
    }
}

impl Default for Intrinsics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{declared_in_scope, fetch, fetch_all_overloads};

    #[test]
    fn seeding_declares_the_built_in_names() {
        let intrinsics = Intrinsics::new();
        let scope = ptr(Scope::new(None));
        intrinsics.declare_in(&scope).unwrap();
        for name in ["str", "num", "int", "amt", "bool", "none", "Player"] {
            assert!(declared_in_scope(&scope, name), "missing intrinsic {name}");
        }
    }

    #[test]
    fn player_number_is_an_overload_set() {
        let intrinsics = Intrinsics::new();
        let scope = ptr(Scope::new(None));
        intrinsics.declare_in(&scope).unwrap();
        match fetch(&scope, "number") {
            Some(LookupValue::OverloadedIdentity(_)) => {}
            other => panic!("expected an overload set, got {other:?}"),
        }
        assert_eq!(fetch_all_overloads(&scope, "number").len(), 1);
    }

    #[test]
    fn none_value_has_the_none_type() {
        let intrinsics = Intrinsics::new();
        let value = intrinsics.value_none.borrow();
        assert_eq!(value.value, IntrinsicLiteral::None);
        assert_eq!(value.ty.borrow().identity, "none");
    }
}
