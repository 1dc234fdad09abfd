use std::collections::BTreeMap;

use crate::model::{GenericType, Multiplicity};

use super::binding::{MultiplicityBinding, TypeBinding};

/// One frame of an inference context: parameter bindings for a single nesting
/// level. Frame 0 is shared by the whole call; extra frames are per collection
/// element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeState {
    type_params: BTreeMap<String, TypeBinding>,
    mul_params: BTreeMap<String, MultiplicityBinding>,
    ahead: bool,
    ahead_consumed: bool,
}

impl ScopeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_binding(&self, name: &str) -> Option<&TypeBinding> {
        self.type_params.get(name)
    }

    pub fn put_type_binding(&mut self, name: impl Into<String>, binding: TypeBinding) {
        self.type_params.insert(name.into(), binding);
    }

    pub fn has_type_param(&self, name: &str) -> bool {
        self.type_params.contains_key(name)
    }

    pub fn type_param_names(&self) -> impl Iterator<Item = &str> {
        self.type_params.keys().map(String::as_str)
    }

    pub fn type_value(&self, name: &str) -> Option<&GenericType> {
        self.type_params.get(name).map(|b| b.value())
    }

    pub fn mul_binding(&self, name: &str) -> Option<&MultiplicityBinding> {
        self.mul_params.get(name)
    }

    pub fn put_mul_binding(&mut self, name: impl Into<String>, binding: MultiplicityBinding) {
        self.mul_params.insert(name.into(), binding);
    }

    pub fn has_mul_param(&self, name: &str) -> bool {
        self.mul_params.contains_key(name)
    }

    pub fn mul_param_names(&self) -> impl Iterator<Item = &str> {
        self.mul_params.keys().map(String::as_str)
    }

    pub fn mul_value(&self, name: &str) -> Option<&Multiplicity> {
        self.mul_params.get(name).map(|b| b.value())
    }

    /// Bindings copied by value; coordination flags start cleared.
    pub fn copy(&self) -> Self {
        Self {
            type_params: self.type_params.clone(),
            mul_params: self.mul_params.clone(),
            ahead: false,
            ahead_consumed: false,
        }
    }

    pub fn set_ahead(&mut self) {
        self.ahead = true;
    }

    pub fn is_ahead(&self) -> bool {
        self.ahead
    }

    pub fn set_ahead_consumed(&mut self) {
        self.ahead_consumed = true;
    }

    pub fn is_ahead_consumed(&self) -> bool {
        self.ahead_consumed
    }
}
