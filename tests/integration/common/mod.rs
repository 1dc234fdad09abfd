use std::path::PathBuf;
use std::process::{Command, Output};

use gminfer::diagnostics::CompileError;
use gminfer::typeck::CheckReport;

pub fn gminfer() -> Command {
    Command::new(env!("CARGO_BIN_EXE_gminfer"))
}

pub fn infer(scenario: &str) -> CheckReport {
    match gminfer::infer_scenario(scenario) {
        Ok(report) => report,
        Err(err) => panic!("Inference failed: {err}"),
    }
}

pub fn infer_error(scenario: &str) -> CompileError {
    match gminfer::infer_scenario(scenario) {
        Ok(report) => panic!("Inference should have failed, got {report:?}"),
        Err(err) => err,
    }
}

pub fn infer_should_fail_with(scenario: &str, expected_msg: &str) {
    let err = infer_error(scenario);
    assert!(
        err.message().contains(expected_msg),
        "Expected error containing '{}', got: {}",
        expected_msg,
        err
    );
}

/// Write `scenario` to a temp file and run the binary on it.
pub fn run_cli(args: &[&str], scenario: &str) -> Output {
    let dir = tempfile::tempdir().unwrap();
    let path: PathBuf = dir.path().join("scenario.toml");
    std::fs::write(&path, scenario).unwrap();
    gminfer().args(args).arg(&path).output().unwrap()
}

/// Declarations shared by most scenarios.
pub const PRELUDE: &str = r#"
[[function]]
name = "identity"
type_params = ["T"]
params = [{ name = "x", type = "T" }]
returns = { type = "T" }

[[function]]
name = "pick"
type_params = ["T"]
params = [{ name = "xs", type = "T", mul = "*" }]
returns = { type = "T" }

[[function]]
name = "make"
type_params = ["U"]
returns = { type = "U" }

[[function]]
name = "map"
type_params = ["T", "V"]
params = [
    { name = "xs", type = "T", mul = "*" },
    { name = "f", type = { name = "Function", args = [{ fn = { params = [{ name = "x", type = "T" }], returns = { type = "V" } } }] } },
]
returns = { type = "V", mul = "*" }
"#;

pub fn with_prelude(body: &str) -> String {
    format!("{PRELUDE}\n{body}")
}
