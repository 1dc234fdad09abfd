pub mod span;
pub mod diagnostics;
pub mod model;
pub mod scenario;
pub mod typeck;

use diagnostics::CompileError;
use scenario::Scenario;
use std::path::Path;
use typeck::{CheckReport, InferenceObserver, NoopObserver, TracingObserver};

/// Parse a scenario from TOML text and run inference over it.
/// No file I/O. Useful for tests that only need the resulting bindings or error.
pub fn infer_scenario(text: &str) -> Result<CheckReport, CompileError> {
    let mut scenario = scenario::parse(text, Path::new("<scenario>"))?;
    run_scenario(&mut scenario, &mut NoopObserver)
}

/// Load a scenario file and run inference, tracing when the file asks for it.
pub fn infer_file(path: &Path) -> Result<CheckReport, CompileError> {
    let mut scenario = scenario::load(path)?;
    run_scenario_with_options(&mut scenario)
}

/// Run inference with the observer selected by the scenario's `[options]`.
pub fn run_scenario_with_options(scenario: &mut Scenario) -> Result<CheckReport, CompileError> {
    if !scenario.options.trace {
        return run_scenario(scenario, &mut NoopObserver);
    }
    let options = scenario.options.check_options();
    let mut observer = TracingObserver::new(&scenario.model);
    typeck::check_program(&scenario.model, &mut scenario.program, &options, &mut observer)
}

pub fn run_scenario(scenario: &mut Scenario, observer: &mut dyn InferenceObserver) -> Result<CheckReport, CompileError> {
    let options = scenario.options.check_options();
    typeck::check_program(&scenario.model, &mut scenario.program, &options, observer)
}
