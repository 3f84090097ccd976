//! The pattern algebra.
//!
//! Patterns describe sets of values, and the compiler reasons about them
//! through two relations: *subset* (every value of one pattern belongs to
//! another) and *overlap* (the two share at least one value). The checker
//! uses subset for conformance (state defaults, conditions, signatures) and
//! overlap for match-rule reachability.
//!
//! All functions here are pure: they read the APM and report nothing. A
//! pattern that still contains an [`UnresolvedIdentity`] is a compiler bug
//! at this level — resolution must run first — while `Invalid*` markers
//! short-circuit to "no" so faults reported earlier stay silent.

use crate::apm::{
    AnyPattern, Expression, InstanceList, IntrinsicLiteral, IntrinsicType, IntrinsicValue,
    InvalidPattern, ListPattern, Pattern, Property, Ptr, UnionPattern, Variable, ptr, same_node,
};
use crate::intrinsics::Intrinsics;
use gambit_base::{CompilerError, Result};

/// Identity of two patterns: the same node, or the same intrinsic value.
pub fn patterns_equal(a: &Pattern, b: &Pattern) -> bool {
    match (a, b) {
        (Pattern::UnresolvedIdentity(x), Pattern::UnresolvedIdentity(y)) => same_node(x, y),
        (Pattern::UninferredPattern(x), Pattern::UninferredPattern(y)) => same_node(x, y),
        (Pattern::InvalidPattern(x), Pattern::InvalidPattern(y)) => same_node(x, y),
        (Pattern::AnyPattern(_), Pattern::AnyPattern(_)) => true,
        (Pattern::UnionPattern(x), Pattern::UnionPattern(y)) => same_node(x, y),
        (Pattern::ListPattern(x), Pattern::ListPattern(y)) => same_node(x, y),
        (Pattern::OptionalPattern(x), Pattern::OptionalPattern(y)) => {
            same_node(x, y) || patterns_equal(&x.borrow().pattern, &y.borrow().pattern)
        }
        (Pattern::IntrinsicType(x), Pattern::IntrinsicType(y)) => same_node(x, y),
        (Pattern::EnumType(x), Pattern::EnumType(y)) => same_node(x, y),
        (Pattern::Entity(x), Pattern::Entity(y)) => same_node(x, y),
        (Pattern::IntrinsicValue(x), Pattern::IntrinsicValue(y)) => {
            same_node(x, y)
                || (x.borrow().value == y.borrow().value
                    && same_node(&x.borrow().ty, &y.borrow().ty))
        }
        (Pattern::EnumValue(x), Pattern::EnumValue(y)) => same_node(x, y),
        _ => false,
    }
}

/// `true` if the pattern admits `none`.
pub fn is_pattern_optional(pattern: &Pattern) -> bool {
    match pattern {
        Pattern::OptionalPattern(_) => true,
        Pattern::AnyPattern(_) => true,
        Pattern::UnionPattern(node) => node.borrow().patterns.iter().any(is_pattern_optional),
        _ => pattern_is_none(pattern),
    }
}

/// `true` for the `none` type or the `none` value.
fn pattern_is_none(pattern: &Pattern) -> bool {
    match pattern {
        Pattern::IntrinsicType(node) => node.borrow().identity == "none",
        Pattern::IntrinsicValue(node) => node.borrow().value == IntrinsicLiteral::None,
        _ => false,
    }
}

/// The numeric tower: `amt ⊆ int ⊆ num`; every other intrinsic type only
/// contains itself.
fn intrinsic_type_is_subset(subset: &Ptr<IntrinsicType>, superset: &Ptr<IntrinsicType>) -> bool {
    if same_node(subset, superset) {
        return true;
    }
    matches!(
        (
            subset.borrow().identity.as_str(),
            superset.borrow().identity.as_str(),
        ),
        ("amt", "int") | ("amt", "num") | ("int", "num")
    )
}

fn unresolved_operands(a: &Pattern, b: &Pattern) -> bool {
    matches!(a, Pattern::UnresolvedIdentity(_)) || matches!(b, Pattern::UnresolvedIdentity(_))
}

fn invalid_operands(a: &Pattern, b: &Pattern) -> bool {
    matches!(a, Pattern::InvalidPattern(_)) || matches!(b, Pattern::InvalidPattern(_))
}

/// `true` if every value of `subset` is also a value of `superset`.
pub fn is_pattern_subset_of_superset(subset: &Pattern, superset: &Pattern) -> Result<bool> {
    if unresolved_operands(subset, superset) {
        return Err(CompilerError::new(
            "Call to is_pattern_subset_of_superset has unresolved identities in its patterns",
        ));
    }
    if invalid_operands(subset, superset) {
        return Ok(false);
    }
    if patterns_equal(subset, superset) {
        return Ok(true);
    }

    // Any contains every value, none included.
    if matches!(superset, Pattern::AnyPattern(_)) {
        return Ok(true);
    }

    // A union is a subset when all of its members are; a union contains a
    // pattern when any of its members does. An enum type on the subset side
    // behaves as the union of its values, and must expand before the
    // superset-union rule so that `C ⊆ A | B` holds when A and B are all of
    // C's values.
    if let Pattern::UnionPattern(node) = subset {
        let members = node.borrow().patterns.clone();
        for member in &members {
            if !is_pattern_subset_of_superset(member, superset)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }
    if let Pattern::EnumType(node) = subset {
        let values = node.borrow().values.clone();
        for value in values {
            if !is_pattern_subset_of_superset(&Pattern::EnumValue(value), superset)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }
    if let Pattern::UnionPattern(node) = superset {
        let members = node.borrow().patterns.clone();
        for member in &members {
            if is_pattern_subset_of_superset(subset, member)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    // Optional patterns: P ⊆ P? and P? ⊆ P?, but never P? ⊆ P.
    match (subset, superset) {
        (Pattern::OptionalPattern(a), Pattern::OptionalPattern(b)) => {
            let (inner_a, inner_b) = (a.borrow().pattern.clone(), b.borrow().pattern.clone());
            return is_pattern_subset_of_superset(&inner_a, &inner_b);
        }
        (Pattern::OptionalPattern(_), _) => return Ok(false),
        (_, Pattern::OptionalPattern(node)) => {
            if pattern_is_none(subset) {
                return Ok(true);
            }
            let inner = node.borrow().pattern.clone();
            return is_pattern_subset_of_superset(subset, &inner);
        }
        _ => {}
    }

    match (subset, superset) {
        // A singleton value is contained by any type its own type fits in.
        (Pattern::IntrinsicValue(value), Pattern::IntrinsicType(ty)) => {
            Ok(intrinsic_type_is_subset(&value.borrow().ty, ty))
        }
        (Pattern::IntrinsicType(a), Pattern::IntrinsicType(b)) => {
            Ok(intrinsic_type_is_subset(a, b))
        }
        (Pattern::EnumValue(value), Pattern::EnumType(ty)) => Ok(value
            .borrow()
            .enum_type()
            .is_some_and(|value_ty| same_node(&value_ty, ty))),
        (Pattern::ListPattern(a), Pattern::ListPattern(b)) => {
            if b.borrow().fixed_size.is_some() {
                return Ok(false);
            }
            let (element_a, element_b) = (a.borrow().list_of.clone(), b.borrow().list_of.clone());
            is_pattern_subset_of_superset(&element_a, &element_b)
        }
        _ => Ok(false),
    }
}

/// `true` if the two patterns share at least one value. Commutative.
pub fn do_patterns_overlap(a: &Pattern, b: &Pattern) -> Result<bool> {
    if unresolved_operands(a, b) {
        return Err(CompilerError::new(
            "Call to do_patterns_overlap has unresolved identities in its patterns",
        ));
    }
    if invalid_operands(a, b) {
        return Ok(false);
    }

    if matches!(a, Pattern::AnyPattern(_)) || matches!(b, Pattern::AnyPattern(_)) {
        return Ok(true);
    }

    if let Pattern::UnionPattern(node) = a {
        let members = node.borrow().patterns.clone();
        for member in &members {
            if do_patterns_overlap(member, b)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }
    if matches!(b, Pattern::UnionPattern(_)) {
        return do_patterns_overlap(b, a);
    }

    // An optional pattern overlaps anything its inner pattern overlaps,
    // plus anything that admits none.
    if let Pattern::OptionalPattern(node) = a {
        let inner = node.borrow().pattern.clone();
        return Ok(do_patterns_overlap(&inner, b)? || is_pattern_optional(b));
    }
    if matches!(b, Pattern::OptionalPattern(_)) {
        return do_patterns_overlap(b, a);
    }

    Ok(is_pattern_subset_of_superset(a, b)? || is_pattern_subset_of_superset(b, a)?)
}

/// Collects the members of `pattern` into `members`, flattening unions.
fn flatten_into(pattern: Pattern, members: &mut Vec<Pattern>) {
    if let Pattern::UnionPattern(node) = &pattern {
        let nested = node.borrow().patterns.clone();
        for member in nested {
            flatten_into(member, members);
        }
        return;
    }
    if !members.iter().any(|member| patterns_equal(member, &pattern)) {
        members.push(pattern);
    }
}

/// The union of `a` and `b`: flat, deduplicated, and collapsed back to a
/// single pattern when only one distinct member remains.
pub fn create_union_pattern(a: Pattern, b: Pattern) -> Pattern {
    let mut members = Vec::new();
    flatten_into(a, &mut members);
    flatten_into(b, &mut members);
    if members.len() == 1 {
        if let Some(single) = members.pop() {
            return single;
        }
    }
    Pattern::UnionPattern(ptr(UnionPattern {
        span: None,
        identity: None,
        patterns: members,
    }))
}

/// The pattern of values an expression may produce.
///
/// Asking before resolution has finished, or for a variant that is not a
/// value (an instance list, a bare call), is a compiler bug.
pub fn determine_expression_pattern(
    expression: &Expression,
    intrinsics: &Intrinsics,
) -> Result<Pattern> {
    match expression {
        Expression::UnresolvedIdentity(_) => Err(CompilerError::new(
            "Cannot determine pattern of expression before unresolved identities have been resolved",
        )),
        Expression::Variable(node) => Ok(node.borrow().pattern.clone()),
        Expression::EnumValue(node) => Ok(Pattern::EnumValue(Ptr::clone(node))),
        Expression::IntrinsicValue(node) => Ok(Pattern::IntrinsicValue(Ptr::clone(node))),
        Expression::ListValue(node) => {
            let values = node.borrow().values.clone();
            let mut element: Option<Pattern> = None;
            for value in &values {
                let value_pattern = determine_expression_pattern(value, intrinsics)?;
                element = Some(match element {
                    Some(so_far) => create_union_pattern(so_far, value_pattern),
                    None => value_pattern,
                });
            }
            let list_of =
                element.unwrap_or_else(|| Pattern::AnyPattern(ptr(AnyPattern { span: None })));
            let fixed_size = Expression::IntrinsicValue(ptr(IntrinsicValue {
                span: None,
                value: IntrinsicLiteral::Integer(values.len() as i64),
                ty: Ptr::clone(&intrinsics.type_amt),
            }));
            Ok(Pattern::ListPattern(ptr(ListPattern {
                span: node.borrow().span.clone(),
                list_of,
                fixed_size: Some(fixed_size),
            })))
        }
        Expression::InstanceList(_) => Err(CompilerError::new(
            "Cannot determine pattern of an instance list",
        )),
        Expression::Unary(node) => {
            let op = node.borrow().op.clone();
            match op.as_str() {
                "not" => Ok(Pattern::IntrinsicType(Ptr::clone(&intrinsics.type_bool))),
                "+" | "-" => Ok(Pattern::IntrinsicType(Ptr::clone(&intrinsics.type_num))),
                _ => Err(CompilerError::new(format!(
                    "Cannot determine pattern of unary expression with op '{op}'"
                ))),
            }
        }
        Expression::Binary(node) => {
            let op = node.borrow().op.clone();
            match op.as_str() {
                "and" | "or" | "==" | "!=" | "<" | ">" | "<=" | ">=" => {
                    Ok(Pattern::IntrinsicType(Ptr::clone(&intrinsics.type_bool)))
                }
                "+" | "-" | "*" | "/" => {
                    Ok(Pattern::IntrinsicType(Ptr::clone(&intrinsics.type_num)))
                }
                _ => Err(CompilerError::new(format!(
                    "Cannot determine pattern of binary expression with op '{op}'"
                ))),
            }
        }
        Expression::ExpressionIndex(node) => {
            let subject = node.borrow().subject.clone();
            match determine_expression_pattern(&subject, intrinsics)? {
                Pattern::ListPattern(list) => Ok(list.borrow().list_of.clone()),
                Pattern::InvalidPattern(invalid) => Ok(Pattern::InvalidPattern(invalid)),
                _ => Err(CompilerError::new(
                    "Cannot determine pattern of an expression index over a non-list subject",
                )),
            }
        }
        Expression::PropertyIndex(node) => match &node.borrow().property {
            Property::StateProperty(property) => Ok(property.borrow().pattern.clone()),
            Property::FunctionProperty(property) => Ok(property.borrow().pattern.clone()),
            Property::UnresolvedIdentity(_) => Err(CompilerError::new(
                "Cannot determine pattern of property index before unresolved identities have been resolved",
            )),
            Property::InvalidProperty(_) => {
                Ok(Pattern::InvalidPattern(ptr(InvalidPattern { span: None })))
            }
        },
        Expression::Call(_) => Err(CompilerError::new(
            "Cannot determine pattern of a call expression",
        )),
        Expression::IfExpression(node) => {
            let rules = node.borrow().rules.clone();
            union_of_results(rules.iter().map(|rule| &rule.result), intrinsics)
        }
        Expression::Match(node) => {
            let rules = node.borrow().rules.clone();
            union_of_results(rules.iter().map(|rule| &rule.result), intrinsics)
        }
        Expression::InvalidValue(_) | Expression::InvalidExpression(_) => {
            Ok(Pattern::InvalidPattern(ptr(InvalidPattern { span: None })))
        }
    }
}

fn union_of_results<'a>(
    results: impl Iterator<Item = &'a Expression>,
    intrinsics: &Intrinsics,
) -> Result<Pattern> {
    let mut pattern: Option<Pattern> = None;
    for result in results {
        let result_pattern = determine_expression_pattern(result, intrinsics)?;
        pattern = Some(match pattern {
            Some(so_far) => create_union_pattern(so_far, result_pattern),
            None => result_pattern,
        });
    }
    Ok(pattern.unwrap_or_else(|| Pattern::InvalidPattern(ptr(InvalidPattern { span: None }))))
}

/// Positional match of an argument tuple against a parameter list.
///
/// Values may be fewer than parameters only when every unmatched parameter
/// is optional; each supplied value's pattern must be a subset of its
/// parameter's pattern.
pub fn does_instance_list_match_parameters(
    instance_list: &Ptr<InstanceList>,
    parameters: &[Ptr<Variable>],
    intrinsics: &Intrinsics,
) -> Result<bool> {
    let values = instance_list.borrow().values.clone();
    if values.len() > parameters.len() {
        return Ok(false);
    }

    for (index, parameter) in parameters.iter().enumerate() {
        let parameter_pattern = parameter.borrow().pattern.clone();

        if index >= values.len() {
            if !matches!(parameter_pattern, Pattern::OptionalPattern(_)) {
                return Ok(false);
            }
            continue;
        }

        let value_pattern = determine_expression_pattern(&values[index], intrinsics)?;
        if !is_pattern_subset_of_superset(&value_pattern, &parameter_pattern)? {
            return Ok(false);
        }
    }

    Ok(true)
}
