mod common;
use common::{infer, infer_error, infer_should_fail_with, with_prelude};

use std::path::Path;

use gminfer::typeck::{RecordingObserver, UNTYPEABLE_LAMBDA};

fn function_of(param: &str, ret: &str) -> String {
    format!(
        r#"{{ name = "Function", args = [{{ fn = {{ params = [{{ name = "p", type = "{param}" }}], returns = {{ type = "{ret}" }} }} }}] }}"#
    )
}

// ── Untyped lambdas typed from the signature ───────────────────────────────

#[test]
fn map_types_lambda_from_collection_parameter() {
    let report = infer(&with_prelude(
        r#"
[[expression]]
call = "map"
args = [
    { literal = "Integer", mul = "*" },
    { lambda = { params = [{ name = "x" }], body = [{ var = "x" }] } },
]
"#,
    ));
    let call = report.call("map").unwrap();
    assert_eq!(call.type_binding("T"), Some("Integer"));
    assert_eq!(call.type_binding("V"), Some("Integer"));
    assert_eq!(call.return_type, "Integer[*]");
}

#[test]
fn lambda_body_return_binds_result_parameter() {
    let report = infer(&with_prelude(
        r#"
[[expression]]
call = "map"
args = [
    { literal = "Integer", mul = "*" },
    { lambda = { params = [{ name = "x" }], body = [{ literal = "String" }] } },
]
"#,
    ));
    let call = report.call("map").unwrap();
    assert_eq!(call.type_binding("V"), Some("String"));
    assert_eq!(call.return_type, "String[*]");
}

#[test]
fn call_inside_lambda_sees_typed_parameter() {
    let report = infer(&with_prelude(
        r#"
[[expression]]
call = "map"
args = [
    { literal = "Float", mul = "*" },
    { lambda = { params = [{ name = "x" }], body = [{ call = "identity", args = [{ var = "x" }] }] } },
]
"#,
    ));
    assert_eq!(report.call("identity").unwrap().type_binding("T"), Some("Float"));
    assert_eq!(report.call("map").unwrap().type_binding("V"), Some("Float"));
}

#[test]
fn typed_lambda_is_matched_structurally() {
    let report = infer(&format!(
        r#"
[[function]]
name = "transform"
type_params = ["T", "V"]
params = [{{ name = "x", type = "T" }}, {{ name = "f", type = {} }}]
returns = {{ type = "V" }}

[[expression]]
call = "transform"
args = [
    {{ literal = "String" }},
    {{ lambda = {{ params = [{{ name = "s", type = "String" }}], body = [{{ literal = "Integer" }}] }} }},
]
"#,
        function_of("T", "V")
    ));
    let call = report.call("transform").unwrap();
    assert_eq!(call.type_binding("T"), Some("String"));
    assert_eq!(call.type_binding("V"), Some("Integer"));
}

// ── Lambdas unblocking one another ─────────────────────────────────────────

fn chain_scenario() -> String {
    format!(
        r#"
[[function]]
name = "chain"
type_params = ["T", "U", "V"]
params = [{{ name = "g", type = {} }}, {{ name = "f", type = {} }}, {{ name = "x", type = "T" }}]
returns = {{ type = "V" }}

[[expression]]
call = "chain"
args = [
    {{ lambda = {{ params = [{{ name = "y" }}], body = [{{ var = "y" }}] }} }},
    {{ lambda = {{ params = [{{ name = "z" }}], body = [{{ literal = "String" }}] }} }},
    {{ literal = "Integer" }},
]
"#,
        function_of("U", "V"),
        function_of("T", "U")
    )
}

#[test]
fn later_lambda_unblocks_earlier_one() {
    let report = infer(&chain_scenario());
    let call = report.call("chain").unwrap();
    assert_eq!(call.type_binding("T"), Some("Integer"));
    assert_eq!(call.type_binding("U"), Some("String"));
    assert_eq!(call.type_binding("V"), Some("String"));
    assert_eq!(call.return_type, "String[1]");
}

#[test]
fn blocked_lambda_is_reprocessed() {
    let mut scenario = gminfer::scenario::parse(&chain_scenario(), Path::new("chain.toml")).unwrap();
    let printer = scenario.model.clone();
    let mut observer = RecordingObserver::new(&printer);
    gminfer::run_scenario(&mut scenario, &mut observer).unwrap();

    let position = |event: &str| observer.events.iter().position(|e| e == event);
    assert!(position("lambda_deferred 0").is_some());
    assert!(position("lambda_deferred 1").is_some());
    assert_eq!(observer.events.iter().filter(|e| e.starts_with("reprocessing_lambda")).count(), 1);
    assert!(position("reprocessing_lambda 0") > position("lambda_deferred 1"));
}

// ── Lambdas that cannot be typed ───────────────────────────────────────────

fn apply_scenario(strict: bool, in_body: bool) -> String {
    let lambda = r#"{ lambda = { params = [{ name = "x" }], body = [{ literal = "Boolean" }] } }"#;
    let usage = if in_body {
        format!(
            r#"
[[function]]
name = "host"
returns = {{ type = "Boolean" }}
body = [{{ call = "apply", args = [{lambda}] }}]
"#
        )
    } else {
        format!("\n[[expression]]\ncall = \"apply\"\nargs = [{lambda}]\n")
    };
    format!(
        r#"
[options]
strict_lambda_types = {strict}

[[function]]
name = "apply"
type_params = ["T"]
params = [{{ name = "f", type = {} }}]
returns = {{ type = "Boolean" }}
{usage}
"#,
        function_of("T", "Boolean")
    )
}

#[test]
fn strict_mode_rejects_untypeable_lambda() {
    infer_should_fail_with(&apply_scenario(true, false), UNTYPEABLE_LAMBDA);
    infer_should_fail_with(&apply_scenario(true, true), UNTYPEABLE_LAMBDA);
}

#[test]
fn lenient_mode_leaves_lambda_unprocessed_in_body() {
    let report = infer(&apply_scenario(false, true));
    let call = report.call("apply").unwrap();
    assert_eq!(call.owner.as_deref(), Some("host"));
    assert!(call.types.is_empty());
    assert_eq!(call.return_type, "Boolean[1]");
}

#[test]
fn lenient_mode_still_needs_parameters_at_top_level() {
    let err = infer_error(&apply_scenario(false, false));
    assert!(err.message().starts_with("The type parameter T was not resolved (apply / "));
}

#[test]
fn universal_template_never_types_a_lambda() {
    let scenario = r#"
[options]
strict_lambda_types = false

[[function]]
name = "run"
params = [{ name = "f", type = "Any" }]
returns = { type = "Boolean" }

[[expression]]
call = "run"
args = [{ lambda = { params = [{ name = "x" }], body = [{ literal = "Boolean" }] }, span = [4, 12] }]
"#;
    let err = infer_error(scenario);
    assert_eq!(err.message(), UNTYPEABLE_LAMBDA);
    assert_eq!(err.span().map(|s| s.to_string()).as_deref(), Some("4..12"));
}
