mod common;
use common::{infer, infer_should_fail_with, with_prelude};

// ── Single parameter bindings ───────────────────────────────────────────────

#[test]
fn identity_binds_argument_type() {
    let report = infer(&with_prelude(
        r#"
[[expression]]
call = "identity"
args = [{ literal = "Integer" }]
"#,
    ));
    let call = report.call("identity").unwrap();
    assert_eq!(call.types.len(), 1);
    assert_eq!(call.type_binding("T"), Some("Integer"));
    assert!(call.multiplicities.is_empty());
    assert_eq!(call.return_type, "Integer[1]");
}

#[test]
fn nested_calls_complete_inside_out() {
    let report = infer(&with_prelude(
        r#"
[[expression]]
call = "identity"
span = [0, 20]
args = [{ call = "identity", span = [9, 19], args = [{ literal = "String" }] }]
"#,
    ));
    let spans: Vec<String> = report.calls_to("identity").map(|c| c.span.to_string()).collect();
    assert_eq!(spans, vec!["9..19", "0..20"]);
    assert!(report.calls_to("identity").all(|c| c.type_binding("T") == Some("String")));
}

#[test]
fn generic_argument_is_matched_structurally() {
    let report = infer(
        r#"
[[function]]
name = "first"
type_params = ["T"]
params = [{ name = "xs", type = { name = "List", args = ["T"] } }]
returns = { type = "T", mul = "0..1" }

[[expression]]
call = "first"
args = [{ literal = { name = "List", args = ["Date"] } }]
"#,
    );
    let call = report.call("first").unwrap();
    assert_eq!(call.type_binding("T"), Some("Date"));
    assert_eq!(call.return_type, "Date[0..1]");
}

#[test]
fn subclass_argument_is_aligned_through_inheritance() {
    let report = infer(
        r#"
[[class]]
name = "Names"
extends = [{ name = "List", args = ["String"] }]

[[function]]
name = "first"
type_params = ["T"]
params = [{ name = "xs", type = { name = "List", args = ["T"] } }]
returns = { type = "T" }

[[expression]]
call = "first"
args = [{ literal = "Names" }]
"#,
    );
    assert_eq!(report.call("first").unwrap().type_binding("T"), Some("String"));
}

#[test]
fn shared_parameter_takes_common_supertype() {
    let report = infer(
        r#"
[[class]]
name = "Animal"

[[class]]
name = "Cat"
extends = ["Animal"]

[[class]]
name = "Dog"
extends = ["Animal"]

[[function]]
name = "pair"
type_params = ["T"]
params = [{ name = "a", type = "T" }, { name = "b", type = "T" }]
returns = { type = "T" }

[[expression]]
call = "pair"
args = [{ literal = "Cat" }, { literal = "Dog" }]
"#,
    );
    let call = report.call("pair").unwrap();
    assert_eq!(call.type_binding("T"), Some("Animal"));
    assert_eq!(call.return_type, "Animal[1]");
}

// ── Multiplicity parameters ─────────────────────────────────────────────────

const OPT: &str = r#"
[[function]]
name = "opt"
mul_params = ["m"]
params = [{ name = "x", type = "Integer", mul = "m" }]
returns = { type = "Integer", mul = "m" }

[[function]]
name = "both"
mul_params = ["m"]
params = [{ name = "a", type = "Integer", mul = "m" }, { name = "b", type = "Integer", mul = "m" }]
returns = { type = "Integer", mul = "m" }
"#;

#[test]
fn multiplicity_parameter_binds_argument_multiplicity() {
    let report = infer(&format!(
        r#"{OPT}
[[expression]]
call = "opt"
args = [{{ literal = "Integer", mul = "0..1" }}]
"#
    ));
    let call = report.call("opt").unwrap();
    assert_eq!(call.multiplicity_binding("m"), Some("[0..1]"));
    assert_eq!(call.return_type, "Integer[0..1]");
}

// Both arguments register `m` into the one context of the `both` call.
#[test]
fn shared_multiplicity_parameter_widens() {
    let report = infer(&format!(
        r#"{OPT}
[[expression]]
call = "both"
args = [{{ literal = "Integer", mul = "0..1" }}, {{ literal = "Integer" }}]
"#
    ));
    assert_eq!(report.call("both").unwrap().multiplicity_binding("m"), Some("[0..1]"));
}

#[test]
fn separate_call_sites_bind_multiplicity_independently() {
    let report = infer(&format!(
        r#"{OPT}
[[function]]
name = "twice"
params = [{{ name = "p", type = "Integer", mul = "0..1" }}, {{ name = "q", type = "Integer" }}]
returns = {{ type = "Integer", mul = "0..1" }}
body = [{{ call = "opt", args = [{{ var = "p" }}] }}, {{ call = "opt", args = [{{ var = "q" }}] }}]
"#
    ));
    let bound: Vec<_> = report.calls_to("opt").map(|c| c.multiplicity_binding("m")).collect();
    assert_eq!(bound, vec![Some("[0..1]"), Some("[1]")]);
    assert!(report.calls_to("opt").all(|c| c.owner.as_deref() == Some("twice")));
}

#[test]
fn unresolved_multiplicity_parameter_is_an_error() {
    infer_should_fail_with(
        r#"
[[function]]
name = "some"
mul_params = ["m"]
returns = { type = "Integer", mul = "m" }

[[expression]]
call = "some"
"#,
        "The multiplicity parameter m was not resolved!",
    );
}

// ── Calls inside function bodies ────────────────────────────────────────────

#[test]
fn body_call_defers_to_owner_parameters() {
    let report = infer(&with_prelude(&format!(
        r#"{OPT}
[[function]]
name = "wrap"
type_params = ["W"]
mul_params = ["n"]
params = [{{ name = "w", type = "W" }}, {{ name = "y", type = "Integer", mul = "n" }}]
returns = {{ type = "W" }}
body = [{{ call = "identity", args = [{{ var = "w" }}] }}, {{ call = "opt", args = [{{ var = "y" }}] }}]
"#
    )));
    let identity = report.call("identity").unwrap();
    assert_eq!(identity.owner.as_deref(), Some("wrap"));
    assert_eq!(identity.type_binding("T"), Some("W"));
    assert_eq!(identity.return_type, "W[1]");
    let opt = report.call("opt").unwrap();
    assert_eq!(opt.multiplicity_binding("m"), Some("[n]"));
    assert_eq!(opt.return_type, "Integer[n]");
}

#[test]
fn body_call_with_unresolvable_argument_fails() {
    infer_should_fail_with(
        &with_prelude(
            r#"
[[function]]
name = "widen"
type_params = ["T"]
params = [{ name = "x", type = "Integer" }]
returns = { type = "T", mul = "*" }

[[function]]
name = "outer"
returns = { type = "Integer", mul = "*" }
body = [{ call = "widen", args = [{ call = "make" }] }]
"#,
        ),
        "The system is not capable of inferring the return type (U) of the function 'make'. Check your signatures!",
    );
}

#[test]
fn body_call_with_free_return_parameter_fails() {
    infer_should_fail_with(
        &with_prelude(
            r#"
[[function]]
name = "outer"
returns = { type = "Integer" }
body = [{ call = "make" }]
"#,
        ),
        "not capable of inferring the return type (U) of the function 'make'",
    );
}

#[test]
fn undefined_variable_is_reported() {
    infer_should_fail_with(
        &with_prelude(
            r#"
[[expression]]
call = "identity"
args = [{ var = "nope" }]
"#,
        ),
        "undefined variable 'nope'",
    );
}

// ── Failures at the top level ───────────────────────────────────────────────

#[test]
fn unresolvable_type_parameter_names_signature() {
    infer_should_fail_with(
        &with_prelude(
            r#"
[[expression]]
call = "make"
"#,
        ),
        "The type parameter U was not resolved (make / {->U[1]})!",
    );
}

#[test]
fn unknown_function_has_no_match() {
    infer_should_fail_with(
        r#"
[[expression]]
call = "missing"
args = [{ literal = "Integer" }]
"#,
        "The system can't find a match for the function: missing",
    );
}

#[test]
fn arity_mismatch_has_no_match() {
    infer_should_fail_with(
        &with_prelude(
            r#"
[[expression]]
call = "identity"
args = [{ literal = "Integer" }, { literal = "Integer" }]
"#,
        ),
        "The system can't find a match for the function: identity",
    );
}

// ── Qualified properties ────────────────────────────────────────────────────

#[test]
fn qualified_property_return_comes_from_signature_mapping() {
    let report = infer(
        r#"
[[function]]
name = "head"
kind = "qualified_property"
type_params = ["T"]
params = [{ name = "xs", type = { name = "List", args = ["T"] } }]
returns = { type = "T", mul = "0..1" }

[[expression]]
call = "head"
args = [{ literal = { name = "List", args = ["String"] } }]
"#,
    );
    let call = report.call("head").unwrap();
    assert!(call.types.is_empty());
    assert_eq!(call.return_type, "String[0..1]");
}
