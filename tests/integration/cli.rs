mod common;
use common::{gminfer, run_cli, with_prelude};

fn identity_scenario() -> String {
    with_prelude(
        r#"
[[expression]]
call = "identity"
args = [{ literal = "Integer" }]
span = [0, 11]
"#,
    )
    .replacen('\n', "source = \"identity(1)\"\n", 1)
}

// ── check ───────────────────────────────────────────────────────────────────

#[test]
fn check_prints_call_site_bindings() {
    let output = run_cli(&["check"], &identity_scenario());
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "identity @ 0..11: [T = Integer] / [] -> Integer[1]");
}

#[test]
fn check_json_report() {
    let output = run_cli(&["check", "--json"], &identity_scenario());
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let site = &report["call_sites"][0];
    assert_eq!(site["function"], "identity");
    assert_eq!(site["span"]["start"], 0);
    assert_eq!(site["span"]["end"], 11);
    assert_eq!(site["types"][0]["name"], "T");
    assert_eq!(site["types"][0]["value"], "Integer");
    assert_eq!(site["return_type"], "Integer[1]");
    assert!(site.get("owner").is_none());
    assert!(report["contexts_created"].as_u64().unwrap() >= 1);
}

#[test]
fn check_failure_exits_nonzero() {
    let scenario = with_prelude(
        r#"
[[expression]]
call = "make"
span = [0, 6]
"#,
    )
    .replacen('\n', "source = \"make()\"\n", 1);
    let output = run_cli(&["check"], &scenario);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("The type parameter U was not resolved"), "stderr: {stderr}");
    assert!(output.stdout.is_empty());
}

#[test]
fn check_invalid_scenario_reports_path() {
    let output = run_cli(&["check"], "[[expression]]\nliteral = \"Widget\"\n");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("scenario.toml"), "stderr: {stderr}");
    assert!(stderr.contains("unknown type 'Widget'"), "stderr: {stderr}");
}

#[test]
fn check_missing_file() {
    let output = gminfer().args(["check", "/nonexistent/scenario.toml"]).output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("could not read file"), "stderr: {stderr}");
}

// ── trace ───────────────────────────────────────────────────────────────────

#[test]
fn trace_logs_inference_steps() {
    let output = run_cli(&["trace"], &identity_scenario());
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("matched identity{T[1]->T[1]}"), "stderr: {stderr}");
    assert!(stderr.contains("identity returns Integer[1]"), "stderr: {stderr}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("identity @ 0..11"));
}

#[test]
fn check_is_quiet_without_trace_option() {
    let output = run_cli(&["check"], &identity_scenario());
    assert!(output.stderr.is_empty(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
}

#[test]
fn trace_option_enables_logging_for_check() {
    let scenario = identity_scenario().replacen("[[function]]", "[options]\ntrace = true\n\n[[function]]", 1);
    let output = run_cli(&["check"], &scenario);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("matched identity"));
}
