//! Side-channel notifications from the inference engine. Observers never
//! influence results; every method defaults to doing nothing.

use crate::model::program::CallSiteBindings;
use crate::model::{FunctionSig, GenericType, Multiplicity, TypeAlgebra};

use super::context::ContextId;

pub trait InferenceObserver {
    fn register(&mut self, _template: &GenericType, _value: &GenericType, _ctx: ContextId, _target: ContextId) {}

    fn register_mul(&mut self, _template: &Multiplicity, _value: &Multiplicity, _ctx: ContextId, _target: ContextId) {}

    fn merged_types(&mut self, _name: &str, _existing: &GenericType, _incoming: &GenericType, _merged: &GenericType) {}

    fn merged_multiplicities(&mut self, _name: &str, _existing: &Multiplicity, _incoming: &Multiplicity, _merged: &Multiplicity) {}

    fn forward(&mut self, _from: ContextId, _to: ContextId, _name: &str) {}

    fn shift_tab(&mut self) {}

    fn un_shift_tab(&mut self) {}

    fn start_processing_function(&mut self, _name: &str) {}

    fn finished_processing_function(&mut self, _name: &str) {}

    fn function_matched(&mut self, _function: &FunctionSig, _ctx: ContextId) {}

    fn processing_parameter(&mut self, _index: usize, _template: &GenericType, _value: Option<&GenericType>) {}

    fn lambda_deferred(&mut self, _index: usize) {}

    fn reprocessing_lambda(&mut self, _index: usize) {}

    fn collection_folded(&mut self, _ctx: ContextId, _elements: usize) {}

    fn stored_inferred_parameters(&mut self, _function: &str, _bindings: &CallSiteBindings) {}

    fn return_type(&mut self, _function: &str, _return_type: &GenericType, _multiplicity: &Multiplicity) {}

    fn inference_failed(&mut self, _message: &str) {}
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl InferenceObserver for NoopObserver {}

/// Emits `tracing` debug events, indented by the current forwarding depth.
pub struct TracingObserver<'a> {
    printer: &'a dyn TypeAlgebra,
    depth: usize,
}

impl<'a> TracingObserver<'a> {
    pub fn new(printer: &'a dyn TypeAlgebra) -> Self {
        Self { printer, depth: 0 }
    }

    fn indent(&self) -> String {
        "  ".repeat(self.depth)
    }
}

impl InferenceObserver for TracingObserver<'_> {
    fn register(&mut self, template: &GenericType, value: &GenericType, ctx: ContextId, target: ContextId) {
        tracing::debug!(
            "{}register {} := {} in {ctx} (target {target})",
            self.indent(),
            self.printer.print_type(template),
            self.printer.print_type(value)
        );
    }

    fn register_mul(&mut self, template: &Multiplicity, value: &Multiplicity, ctx: ContextId, target: ContextId) {
        tracing::debug!("{}register {template} := {value} in {ctx} (target {target})", self.indent());
    }

    fn merged_types(&mut self, name: &str, existing: &GenericType, incoming: &GenericType, merged: &GenericType) {
        tracing::debug!(
            "{}merge {name}: {} + {} = {}",
            self.indent(),
            self.printer.print_type(existing),
            self.printer.print_type(incoming),
            self.printer.print_type(merged)
        );
    }

    fn merged_multiplicities(&mut self, name: &str, existing: &Multiplicity, incoming: &Multiplicity, merged: &Multiplicity) {
        tracing::debug!("{}merge {name}: {existing} + {incoming} = {merged}", self.indent());
    }

    fn forward(&mut self, from: ContextId, to: ContextId, name: &str) {
        tracing::debug!("{}forward {name} from {from} to {to}", self.indent());
    }

    fn shift_tab(&mut self) {
        self.depth += 1;
    }

    fn un_shift_tab(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn start_processing_function(&mut self, name: &str) {
        tracing::debug!("{}processing {name}", self.indent());
        self.depth += 1;
    }

    fn finished_processing_function(&mut self, name: &str) {
        self.depth = self.depth.saturating_sub(1);
        tracing::debug!("{}finished {name}", self.indent());
    }

    fn function_matched(&mut self, function: &FunctionSig, ctx: ContextId) {
        tracing::debug!(
            "{}matched {}{} in {ctx}",
            self.indent(),
            function.name,
            self.printer.print_function_type(&function.ftype)
        );
    }

    fn processing_parameter(&mut self, index: usize, template: &GenericType, value: Option<&GenericType>) {
        let value = value.map(|v| self.printer.print_type(v)).unwrap_or_else(|| "?".to_string());
        tracing::debug!("{}param #{index}: {} <- {value}", self.indent(), self.printer.print_type(template));
    }

    fn lambda_deferred(&mut self, index: usize) {
        tracing::debug!("{}lambda #{index} deferred", self.indent());
    }

    fn reprocessing_lambda(&mut self, index: usize) {
        tracing::debug!("{}reprocessing lambda #{index}", self.indent());
    }

    fn collection_folded(&mut self, ctx: ContextId, elements: usize) {
        tracing::debug!("{}folded {elements} element frames of {ctx}", self.indent());
    }

    fn stored_inferred_parameters(&mut self, function: &str, bindings: &CallSiteBindings) {
        let types: Vec<String> = bindings
            .types
            .iter()
            .map(|(name, t)| format!("{name} = {}", self.printer.print_type(t)))
            .collect();
        let muls: Vec<String> = bindings.multiplicities.iter().map(|(name, m)| format!("{name} = {m}")).collect();
        tracing::debug!("{}{function}: [{}] / [{}]", self.indent(), types.join(", "), muls.join(", "));
    }

    fn return_type(&mut self, function: &str, return_type: &GenericType, multiplicity: &Multiplicity) {
        tracing::debug!("{}{function} returns {}{multiplicity}", self.indent(), self.printer.print_type(return_type));
    }

    fn inference_failed(&mut self, message: &str) {
        tracing::warn!("{}{message}", self.indent());
    }
}

/// Collects a line per notification.
pub struct RecordingObserver<'a> {
    printer: &'a dyn TypeAlgebra,
    pub events: Vec<String>,
}

impl<'a> RecordingObserver<'a> {
    pub fn new(printer: &'a dyn TypeAlgebra) -> Self {
        Self { printer, events: Vec::new() }
    }
}

impl InferenceObserver for RecordingObserver<'_> {
    fn register(&mut self, template: &GenericType, value: &GenericType, ctx: ContextId, target: ContextId) {
        self.events.push(format!(
            "register {} := {} @{ctx}->{target}",
            self.printer.print_type(template),
            self.printer.print_type(value)
        ));
    }

    fn register_mul(&mut self, template: &Multiplicity, value: &Multiplicity, ctx: ContextId, target: ContextId) {
        self.events.push(format!("register_mul {template} := {value} @{ctx}->{target}"));
    }

    fn merged_types(&mut self, name: &str, _existing: &GenericType, _incoming: &GenericType, merged: &GenericType) {
        self.events.push(format!("merge {name} = {}", self.printer.print_type(merged)));
    }

    fn merged_multiplicities(&mut self, name: &str, _existing: &Multiplicity, _incoming: &Multiplicity, merged: &Multiplicity) {
        self.events.push(format!("merge {name} = {merged}"));
    }

    fn forward(&mut self, from: ContextId, to: ContextId, name: &str) {
        self.events.push(format!("forward {name} {from}->{to}"));
    }

    fn function_matched(&mut self, function: &FunctionSig, ctx: ContextId) {
        self.events.push(format!("matched {} @{ctx}", function.name));
    }

    fn lambda_deferred(&mut self, index: usize) {
        self.events.push(format!("lambda_deferred {index}"));
    }

    fn reprocessing_lambda(&mut self, index: usize) {
        self.events.push(format!("reprocessing_lambda {index}"));
    }

    fn collection_folded(&mut self, ctx: ContextId, elements: usize) {
        self.events.push(format!("folded {elements} @{ctx}"));
    }

    fn stored_inferred_parameters(&mut self, function: &str, bindings: &CallSiteBindings) {
        self.events.push(format!(
            "stored {function} ({} types, {} multiplicities)",
            bindings.types.len(),
            bindings.multiplicities.len()
        ));
    }

    fn inference_failed(&mut self, message: &str) {
        self.events.push(format!("failed: {message}"));
    }
}
