//! Scope lookup and declaration.
//!
//! A name is *directly* declared in a scope when the scope's own table
//! contains it, and *visible* when it or any ancestor does. State and
//! function properties are the only overloadable bindings; declaring one
//! wraps it in an [`OverloadedIdentity`], and later overloads append to the
//! existing set.
//!
//! [`fetch_all_overloads`] deliberately gathers overload sets from *every*
//! enclosing scope, even past a non-overloadable binding of the same name.
//! Shadowing hides a name from plain [`fetch`], but overloads stay
//! discoverable across nesting.

use crate::apm::{LookupValue, OverloadedIdentity, Ptr, Scope, ptr};
use gambit_base::{CompilerError, Result};

/// Projects the identifier from any lookup value.
///
/// Anonymous union patterns have no identifier; asking for one is an
/// internal error.
pub fn identity_of(value: &LookupValue) -> Result<String> {
    match value {
        LookupValue::Variable(node) => Ok(node.borrow().identity.clone()),
        LookupValue::UnionPattern(node) => node.borrow().identity.clone().ok_or_else(|| {
            CompilerError::new("Cannot get identity of anonymous union pattern")
        }),
        LookupValue::IntrinsicType(node) => Ok(node.borrow().identity.clone()),
        LookupValue::EnumType(node) => Ok(node.borrow().identity.clone()),
        LookupValue::Entity(node) => Ok(node.borrow().identity.clone()),
        LookupValue::StateProperty(node) => Ok(node.borrow().identity.clone()),
        LookupValue::FunctionProperty(node) => Ok(node.borrow().identity.clone()),
        LookupValue::Procedure(node) => Ok(node.borrow().identity.clone()),
        LookupValue::OverloadedIdentity(node) => Ok(node.borrow().identity.clone()),
    }
}

/// `true` for the binding kinds that may share an identifier.
pub fn is_overloadable(value: &LookupValue) -> bool {
    matches!(
        value,
        LookupValue::StateProperty(_) | LookupValue::FunctionProperty(_)
    )
}

/// `true` if `identity` is declared in `scope` itself.
pub fn directly_declared_in_scope(scope: &Ptr<Scope>, identity: &str) -> bool {
    scope.borrow().lookup.contains_key(identity)
}

/// `true` if `identity` is visible in `scope` or any ancestor.
pub fn declared_in_scope(scope: &Ptr<Scope>, identity: &str) -> bool {
    fetch(scope, identity).is_some()
}

/// The first visible binding for `identity`, searching from `scope`
/// outwards.
pub fn fetch(scope: &Ptr<Scope>, identity: &str) -> Option<LookupValue> {
    let mut current = Ptr::clone(scope);
    loop {
        if let Some(value) = current.borrow().lookup.get(identity) {
            return Some(value.clone());
        }
        let parent = current.borrow().parent.clone()?.upgrade()?;
        current = parent;
    }
}

/// Every overload of `identity` visible from `scope`, innermost scope
/// first.
///
/// Non-overloadable bindings along the chain are skipped rather than
/// shadowing the sets declared further out.
pub fn fetch_all_overloads(scope: &Ptr<Scope>, identity: &str) -> Vec<LookupValue> {
    let mut overloads = Vec::new();
    let mut current = Ptr::clone(scope);
    loop {
        if let Some(LookupValue::OverloadedIdentity(set)) = current.borrow().lookup.get(identity) {
            overloads.extend(set.borrow().overloads.iter().cloned());
        }
        let parent = match current.borrow().parent.clone().and_then(|p| p.upgrade()) {
            Some(parent) => parent,
            None => return overloads,
        };
        current = parent;
    }
}

/// The result of a [`declare`] attempt.
#[derive(Debug)]
pub enum DeclareOutcome {
    Declared,
    /// The identifier is already taken and the two sides cannot overload.
    Clash { existing: LookupValue },
}

/// Declares `value` in `scope`.
///
/// Overloadable values append to an existing overload set under the same
/// identifier, or start a fresh one. A clash between anything else is
/// reported to the caller, which decides how to surface it; the scope is
/// left unchanged.
pub fn declare(scope: &Ptr<Scope>, value: LookupValue) -> Result<DeclareOutcome> {
    let identity = identity_of(&value)?;

    let existing = scope.borrow().lookup.get(&identity).cloned();
    if let Some(existing) = existing {
        if let (LookupValue::OverloadedIdentity(set), true) = (&existing, is_overloadable(&value)) {
            set.borrow_mut().overloads.push(value);
            return Ok(DeclareOutcome::Declared);
        }
        return Ok(DeclareOutcome::Clash { existing });
    }

    let declared = if is_overloadable(&value) {
        LookupValue::OverloadedIdentity(ptr(OverloadedIdentity {
            identity: identity.clone(),
            overloads: vec![value],
        }))
    } else {
        value
    };
    scope.borrow_mut().lookup.insert(identity, declared);
    Ok(DeclareOutcome::Declared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apm::{Entity, Pattern, Scope, StateProperty, UninferredPattern, Variable};

    fn entity(identity: &str) -> LookupValue {
        LookupValue::Entity(ptr(Entity {
            span: None,
            identity: identity.into(),
        }))
    }

    fn state_property(identity: &str) -> LookupValue {
        LookupValue::StateProperty(ptr(StateProperty {
            span: None,
            identity: identity.into(),
            pattern: Pattern::UninferredPattern(ptr(UninferredPattern)),
            scope: ptr(Scope::new(None)),
            parameters: Vec::new(),
            initial_value: None,
        }))
    }

    fn variable(identity: &str) -> LookupValue {
        LookupValue::Variable(ptr(Variable {
            span: None,
            identity: identity.into(),
            pattern: Pattern::UninferredPattern(ptr(UninferredPattern)),
            is_mutable: false,
        }))
    }

    #[test]
    fn declared_names_are_directly_visible() {
        let scope = ptr(Scope::new(None));
        declare(&scope, entity("Player")).unwrap();
        assert!(directly_declared_in_scope(&scope, "Player"));
        assert!(declared_in_scope(&scope, "Player"));
        assert!(!declared_in_scope(&scope, "Deck"));
    }

    #[test]
    fn names_are_visible_from_nested_scopes() {
        let outer = ptr(Scope::new(None));
        let inner = Scope::nested_in(&outer);
        declare(&outer, entity("Player")).unwrap();
        assert!(!directly_declared_in_scope(&inner, "Player"));
        assert!(declared_in_scope(&inner, "Player"));
        assert!(fetch(&inner, "Player").is_some());
    }

    #[test]
    fn inner_declarations_shadow_outer_ones_for_fetch() {
        let outer = ptr(Scope::new(None));
        let inner = Scope::nested_in(&outer);
        declare(&outer, entity("thing")).unwrap();
        declare(&inner, variable("thing")).unwrap();
        match fetch(&inner, "thing") {
            Some(LookupValue::Variable(_)) => {}
            other => panic!("expected the inner variable, got {other:?}"),
        }
    }

    #[test]
    fn redeclaring_a_non_overloadable_name_clashes() {
        let scope = ptr(Scope::new(None));
        declare(&scope, entity("Player")).unwrap();
        match declare(&scope, entity("Player")).unwrap() {
            DeclareOutcome::Clash { .. } => {}
            other => panic!("expected a clash, got {other:?}"),
        }
    }

    #[test]
    fn overloadable_values_share_an_identity() {
        let scope = ptr(Scope::new(None));
        declare(&scope, state_property("score")).unwrap();
        declare(&scope, state_property("score")).unwrap();
        match fetch(&scope, "score") {
            Some(LookupValue::OverloadedIdentity(set)) => {
                assert_eq!(set.borrow().overloads.len(), 2);
            }
            other => panic!("expected an overload set, got {other:?}"),
        }
    }

    #[test]
    fn overloadable_value_clashes_with_a_non_overloadable_one() {
        let scope = ptr(Scope::new(None));
        declare(&scope, entity("score")).unwrap();
        match declare(&scope, state_property("score")).unwrap() {
            DeclareOutcome::Clash { .. } => {}
            other => panic!("expected a clash, got {other:?}"),
        }
    }

    #[test]
    fn fetch_all_overloads_concatenates_innermost_first() {
        let outer = ptr(Scope::new(None));
        let inner = Scope::nested_in(&outer);
        declare(&outer, state_property("score")).unwrap();
        declare(&inner, state_property("score")).unwrap();
        declare(&inner, state_property("score")).unwrap();
        let overloads = fetch_all_overloads(&inner, "score");
        assert_eq!(overloads.len(), 3);
    }

    #[test]
    fn overloads_are_discoverable_past_a_non_overloadable_shadow() {
        let outer = ptr(Scope::new(None));
        let middle = Scope::nested_in(&outer);
        let inner = Scope::nested_in(&middle);
        declare(&outer, state_property("score")).unwrap();
        declare(&middle, variable("score")).unwrap();
        // Plain fetch sees the shadowing variable…
        match fetch(&inner, "score") {
            Some(LookupValue::Variable(_)) => {}
            other => panic!("expected the shadowing variable, got {other:?}"),
        }
        // …but the outer overload set is still gathered.
        assert_eq!(fetch_all_overloads(&inner, "score").len(), 1);
    }
}
