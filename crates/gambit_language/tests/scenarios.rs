//! End-to-end scenarios over the whole front-end.
//!
//! Each test compiles a literal Gambit program through lexing, parsing,
//! resolution and checking, then inspects the diagnostics and the program
//! model.

use gambit_language::apm::{LookupValue, Pattern};
use gambit_language::compile::{compile_source, Compilation};
use gambit_language::json;
use gambit_language::scope::{fetch, fetch_all_overloads};

fn compile(text: &str) -> Compilation {
    compile_source("test.gambit", text).expect("compilation hit an internal error")
}

fn messages(compilation: &Compilation) -> Vec<String> {
    compilation
        .sink
        .iter()
        .map(|diagnostic| diagnostic.message.clone())
        .collect()
}

// ═══════════════════════════════════════════════════════════════════
// DECLARATIONS
// ═══════════════════════════════════════════════════════════════════

#[test]
fn enum_declaration_lands_in_the_global_scope_in_order() {
    let compilation = compile("enum Color { Red, Green, Blue }\n");
    assert!(compilation.succeeded(), "{:?}", messages(&compilation));

    match fetch(&compilation.program.global_scope, "Color") {
        Some(LookupValue::EnumType(enum_type)) => {
            let names: Vec<String> = enum_type
                .borrow()
                .values
                .iter()
                .map(|value| value.borrow().identity.clone())
                .collect();
            assert_eq!(names, ["Red", "Green", "Blue"]);
        }
        other => panic!("expected Color to be an enum type, got {other:?}"),
    }
}

#[test]
fn state_with_numeric_default_checks_clean() {
    let compilation = compile("entity Player\nstate num(Player player).score: 0\n");
    // `Player` is already intrinsic, so the entity declaration clashes…
    // use a fresh entity instead to keep the program clean.
    let compilation_clean = compile("entity Card\nstate num(Player player).score: 0\n");
    assert!(!compilation.succeeded());
    assert!(
        compilation_clean.succeeded(),
        "{:?}",
        messages(&compilation_clean)
    );
}

#[test]
fn state_with_string_default_reports_the_value_span() {
    let compilation = compile("state num(Player player).score: \"hi\"\n");
    let diagnostic = compilation
        .sink
        .iter()
        .find(|d| d.message == "Default value for state is the incorrect type.")
        .expect("expected the incorrect-default diagnostic");
    assert_eq!(diagnostic.spans[0].source_text(), "\"hi\"");
}

// ═══════════════════════════════════════════════════════════════════
// MATCH RULES
// ═══════════════════════════════════════════════════════════════════

#[test]
fn exhaustive_match_over_an_enum_checks_clean() {
    let compilation =
        compile("enum C { A, B }\nfn bool(C c).ok { match c { A: true  B: false } }\n");
    assert!(compilation.succeeded(), "{:?}", messages(&compilation));
}

#[test]
fn fully_covered_rule_is_unreachable_and_points_at_its_pattern() {
    let compilation = compile(
        "enum C { A, B }\nfn bool(C c).ok { match c { A: true  B: false  C: true } }\n",
    );
    let diagnostic = compilation
        .sink
        .iter()
        .find(|d| d.message == "This rule's pattern will never match.")
        .expect("expected the unreachable-rule diagnostic");
    assert_eq!(diagnostic.spans[0].source_text(), "C");
}

#[test]
fn rule_from_another_enum_never_overlaps_the_subject() {
    let compilation = compile(
        "enum C { A, B }\nenum D { X, Y }\n\
         fn bool(C c).ok { match c { A: true  D: false  B: true } }\n",
    );
    let diagnostic = compilation
        .sink
        .iter()
        .find(|d| d.message == "This rule's pattern will never match.")
        .expect("expected the unreachable-rule diagnostic");
    assert_eq!(diagnostic.spans[0].source_text(), "D");
}

#[test]
fn match_missing_a_value_is_not_exhaustive() {
    let compilation = compile("enum C { A, B }\nfn bool(C c).ok { match c { A: true } }\n");
    assert!(compilation
        .sink
        .iter()
        .any(|d| d.message == "This match does not cover every possible value of its subject."));
}

// ═══════════════════════════════════════════════════════════════════
// CONDITIONS
// ═══════════════════════════════════════════════════════════════════

#[test]
fn literal_number_condition_is_dead_and_diagnosed() {
    let compilation = compile("fn num(Player p).x { if 5 { 1\n }\n }\n");
    assert!(compilation
        .sink
        .iter()
        .any(|d| d.message.contains("will never be true, false, or none")));
}

#[test]
fn boolean_and_optional_conditions_are_accepted() {
    let boolean = compile("fn num(Player p).x { if true { 1\n }\n }\n");
    assert!(boolean.succeeded(), "{:?}", messages(&boolean));

    let optional = compile("fn num(bool? flag).x { if flag { 1\n }\n }\n");
    assert!(optional.succeeded(), "{:?}", messages(&optional));
}

// ═══════════════════════════════════════════════════════════════════
// OVERLOADS
// ═══════════════════════════════════════════════════════════════════

#[test]
fn identical_overload_signatures_collide_on_the_second() {
    let compilation = compile("state num(Player p).x\nstate num(Player p).x\n");
    let collisions: Vec<_> = compilation
        .sink
        .iter()
        .filter(|d| d.message == "This overload has the same parameters as a previous overload.")
        .collect();
    assert_eq!(collisions.len(), 1);
}

#[test]
fn overloads_with_distinct_parameter_patterns_coexist() {
    let compilation = compile("state num(num n).x\nstate num(str s).x\n");
    assert!(compilation.succeeded(), "{:?}", messages(&compilation));

    match fetch(&compilation.program.global_scope, "x") {
        Some(LookupValue::OverloadedIdentity(set)) => {
            assert_eq!(set.borrow().overloads.len(), 2);
        }
        other => panic!("expected an overload set, got {other:?}"),
    }
}

#[test]
fn overloads_stay_discoverable_past_a_non_overloadable_shadow() {
    // Inside the function, `total` names the parameter variable; the
    // property index still finds the state property declared outside.
    let compilation = compile(
        "state num(num n).total: 0\nfn num(num total).x { (total).total\n }\n",
    );
    assert!(compilation.succeeded(), "{:?}", messages(&compilation));
}

#[test]
fn fetch_all_overloads_gathers_across_the_scope_chain() {
    let compilation = compile("state num(num n).x\nstate num(str s).x\n");
    let funct_scope = match fetch(&compilation.program.global_scope, "x") {
        Some(LookupValue::OverloadedIdentity(set)) => match &set.borrow().overloads[0] {
            LookupValue::StateProperty(state) => state.borrow().scope.clone(),
            other => panic!("expected a state property, got {other:?}"),
        },
        other => panic!("expected an overload set, got {other:?}"),
    };
    // From the property's own scope, both overloads and the intrinsic
    // `number` state are reachable through the parent chain.
    assert_eq!(fetch_all_overloads(&funct_scope, "x").len(), 2);
    assert_eq!(fetch_all_overloads(&funct_scope, "number").len(), 1);
}

// ═══════════════════════════════════════════════════════════════════
// LEXICAL RECOVERY
// ═══════════════════════════════════════════════════════════════════

#[test]
fn lone_unrecognised_character_reports_once_and_reaches_end_of_file() {
    let compilation = compile("%");
    assert_eq!(compilation.sink.len(), 1);
    assert!(compilation
        .sink
        .iter()
        .all(|d| d.message.contains("syntax not recognised")));
    assert!(!compilation.tokens.is_empty());
}

#[test]
fn unrecognised_character_cascade_is_suppressed() {
    let compilation = compile("%%%%%");
    assert_eq!(compilation.sink.len(), 1);
}

// ═══════════════════════════════════════════════════════════════════
// SPANS
// ═══════════════════════════════════════════════════════════════════

#[test]
fn declaration_spans_recover_the_written_text() {
    let text = "enum Color { Red, Green, Blue }\nentity Card\nstate num(Player player).score: 0\n";
    let compilation = compile(text);
    assert!(compilation.succeeded(), "{:?}", messages(&compilation));

    match fetch(&compilation.program.global_scope, "Color") {
        Some(LookupValue::EnumType(enum_type)) => {
            let enum_type = enum_type.borrow();
            assert_eq!(
                enum_type.span.clone().unwrap().source_text(),
                "enum Color { Red, Green, Blue }"
            );
            assert_eq!(
                enum_type.values[1].borrow().span.clone().unwrap().source_text(),
                "Green"
            );
        }
        other => panic!("expected an enum type, got {other:?}"),
    }

    match fetch(&compilation.program.global_scope, "Card") {
        Some(LookupValue::Entity(entity)) => {
            assert_eq!(
                entity.borrow().span.clone().unwrap().source_text(),
                "entity Card"
            );
        }
        other => panic!("expected an entity, got {other:?}"),
    }

    match fetch(&compilation.program.global_scope, "score") {
        Some(LookupValue::OverloadedIdentity(set)) => match &set.borrow().overloads[0] {
            LookupValue::StateProperty(state) => {
                let state = state.borrow();
                assert_eq!(
                    state.span.clone().unwrap().source_text(),
                    "state num(Player player).score"
                );
                assert_eq!(
                    state.parameters[0].borrow().span.clone().unwrap().source_text(),
                    "Player player"
                );
            }
            other => panic!("expected a state property, got {other:?}"),
        },
        other => panic!("expected an overload set, got {other:?}"),
    }
}

// ═══════════════════════════════════════════════════════════════════
// RESOLUTION & SERIALISATION
// ═══════════════════════════════════════════════════════════════════

#[test]
fn resolution_removes_every_unresolved_identity() {
    let compilation = compile(
        "enum C { A, B }\nentity Card\nstate num(Player player).score: 0\n\
         fn bool(C c).ok { match c { A: true  B: false } }\n\
         fn num(Player p).doubled { p.score + p.score\n }\n",
    );
    assert!(compilation.succeeded(), "{:?}", messages(&compilation));
    let dump = json::to_json(&compilation.program).unwrap();
    assert!(!dump.contains("\"node\": \"UnresolvedIdentity\""));
}

#[test]
fn json_dump_is_deterministic_across_parses() {
    let text = "enum C { A, B }\nentity Card\nstate num(Player player).score: 0\n\
                fn bool(C c).ok { match c { A: true  B: false } }\n";
    let first = json::to_json(&compile(text).program).unwrap();
    let second = json::to_json(&compile(text).program).unwrap();
    assert_eq!(first, second);
}

#[test]
fn json_dump_names_every_variant_with_a_node_field() {
    let compilation = compile("enum C { A, B }\nstate num(Player player).score: 0\n");
    let dump = json::to_json(&compilation.program).unwrap();
    for expected in [
        "\"node\": \"Program\"",
        "\"node\": \"Scope\"",
        "\"node\": \"EnumType\"",
        "\"node\": \"EnumValue\"",
        "\"node\": \"OverloadedIdentity\"",
        "\"node\": \"StateProperty\"",
        "\"node\": \"Variable\"",
        "\"node\": \"IntrinsicType\"",
        "\"node\": \"IntrinsicValue\"",
    ] {
        assert!(dump.contains(expected), "missing {expected} in dump");
    }
}

// ═══════════════════════════════════════════════════════════════════
// STATEMENT FORMS
// ═══════════════════════════════════════════════════════════════════

#[test]
fn variable_declarations_infer_their_pattern_from_the_value() {
    let compilation = compile("fn num(Player p).x { let n = 3\n n + 1\n }\n");
    assert!(compilation.succeeded(), "{:?}", messages(&compilation));

    let funct = match fetch(&compilation.program.global_scope, "x") {
        Some(LookupValue::OverloadedIdentity(set)) => match &set.borrow().overloads[0] {
            LookupValue::FunctionProperty(funct) => funct.clone(),
            other => panic!("expected a function property, got {other:?}"),
        },
        other => panic!("expected an overload set, got {other:?}"),
    };
    let funct = funct.borrow();
    let body = funct.body.as_ref().unwrap().borrow();
    match fetch(&body.scope, "n") {
        Some(LookupValue::Variable(variable)) => {
            assert!(matches!(
                variable.borrow().pattern,
                Pattern::IntrinsicValue(_)
            ));
        }
        other => panic!("expected the declared variable, got {other:?}"),
    }
}

#[test]
fn else_branches_parse_and_check() {
    let compilation = compile(
        "fn num(bool flag).x { if flag { 1\n } else { 2\n }\n }\n",
    );
    assert!(compilation.succeeded(), "{:?}", messages(&compilation));
}

#[test]
fn for_statement_iterates_over_a_pattern() {
    let compilation = compile("fn num(Player p).x { for c in Player { 1\n }\n }\n");
    assert!(compilation.succeeded(), "{:?}", messages(&compilation));
}

// ═══════════════════════════════════════════════════════════════════
// RESOLUTION FAILURES
// ═══════════════════════════════════════════════════════════════════

#[test]
fn unknown_names_report_not_defined() {
    let compilation = compile("state Points(Player player).score\n");
    assert!(compilation
        .sink
        .iter()
        .any(|d| d.message == "'Points' is not defined."));
}

#[test]
fn later_stages_accept_invalid_markers_silently() {
    // The unresolved pattern is reported exactly once; the checker does
    // not add a second complaint about the same fault.
    let compilation = compile("state Points(Player player).score: 0\n");
    assert_eq!(compilation.sink.len(), 1);
}
