//! Inference contexts: a parent-linked tree of scopes, each holding a stack of
//! binding frames, plus the registration and resolution algorithm over them.
//!
//! Contexts live in an arena (`InferenceContexts`) for the duration of one
//! function or top-level expression tree and are addressed by `ContextId`.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::model::{DeclaresParameters, FunctionType, GenericType, MulMap, Multiplicity, RawType, TypeAlgebra, TypeMap};

use super::binding::{Binding, MultiplicityBinding, TypeBinding};
use super::observer::InferenceObserver;
use super::state::ScopeState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(usize);

impl ContextId {
    pub fn from_index(index: usize) -> Self {
        ContextId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

/// Rendered in hex, counting from 1.
impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0 + 1)
    }
}

#[derive(Debug, Clone)]
struct InferenceContext {
    id: ContextId,
    parent: Option<ContextId>,
    scope: Option<String>,
    states: Vec<ScopeState>,
    /// Declared parameter names; only populated on chain roots.
    tops: BTreeSet<String>,
}

impl InferenceContext {
    fn frame(&self) -> Option<&ScopeState> {
        self.states.last()
    }

    fn frame_mut(&mut self) -> &mut ScopeState {
        if self.states.is_empty() {
            self.states.push(ScopeState::new());
        }
        let last = self.states.len() - 1;
        &mut self.states[last]
    }
}

/// A registration to replay in another context once the current one is done.
struct Forward<V> {
    context: ContextId,
    template: V,
    value: V,
}

pub struct InferenceContexts<'a> {
    algebra: &'a dyn TypeAlgebra,
    contexts: Vec<InferenceContext>,
    /// (context, parameter) pairs whose registration is still applying forwards.
    in_flight: Vec<(ContextId, String)>,
}

impl<'a> InferenceContexts<'a> {
    pub fn new(algebra: &'a dyn TypeAlgebra) -> Self {
        Self { algebra, contexts: Vec::new(), in_flight: Vec::new() }
    }

    pub fn algebra(&self) -> &'a dyn TypeAlgebra {
        self.algebra
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Allocate a context. When `owner` is given its declared type and
    /// multiplicity parameters seed frame 0 as terminal self-references and
    /// are recorded as the chain's top names.
    pub fn new_context(&mut self, parent: Option<ContextId>, owner: Option<&dyn DeclaresParameters>) -> ContextId {
        let id = ContextId(self.contexts.len());
        let mut state = ScopeState::new();
        let mut tops = BTreeSet::new();
        if let Some(owner) = owner {
            for param in owner.declared_type_params() {
                state.put_type_binding(param.name.clone(), Binding::new(param.as_type(), id, id, true));
                tops.insert(param.name.clone());
            }
            for name in owner.declared_mul_params() {
                state.put_mul_binding(name.clone(), Binding::new(Multiplicity::param(name), id, id, true));
                tops.insert(name.clone());
            }
        }
        self.contexts.push(InferenceContext { id, parent, scope: None, states: vec![state], tops });
        id
    }

    fn get(&self, id: ContextId) -> &InferenceContext {
        &self.contexts[id.0]
    }

    fn get_mut(&mut self, id: ContextId) -> &mut InferenceContext {
        &mut self.contexts[id.0]
    }

    pub fn parent(&self, id: ContextId) -> Option<ContextId> {
        self.get(id).parent
    }

    pub fn top_context(&self, id: ContextId) -> ContextId {
        let mut current = id;
        while let Some(parent) = self.get(current).parent {
            current = parent;
        }
        current
    }

    pub fn is_top(&self, id: ContextId, name: &str) -> bool {
        self.get(self.top_context(id)).tops.contains(name)
    }

    pub fn set_scope(&mut self, id: ContextId, scope: impl Into<String>) {
        self.get_mut(id).scope = Some(scope.into());
    }

    pub fn state_count(&self, id: ContextId) -> usize {
        self.get(id).states.len()
    }

    /// Push a copy of frame 0 for the next collection element.
    pub fn add_state_for_collection_element(&mut self, id: ContextId) {
        let ctx = self.get_mut(id);
        let copy = ctx.states.first().map(ScopeState::copy).unwrap_or_default();
        ctx.states.push(copy);
    }

    /// Pop `count` frames. Returns the last `count + 1` frames; the first of
    /// them stays on the stack and is returned as a copy. Dropping at least as
    /// many frames as exist empties the stack.
    pub fn drop_states(&mut self, id: ContextId, count: usize) -> Vec<ScopeState> {
        let states = &mut self.get_mut(id).states;
        match states.len().checked_sub(count) {
            Some(new_size) if new_size > 0 => {
                let dropped = states[new_size - 1..].to_vec();
                states.truncate(new_size);
                dropped
            }
            _ => std::mem::take(states),
        }
    }

    // ---- Ahead coordination ----

    pub fn set_ahead(&mut self, id: ContextId) {
        self.get_mut(id).frame_mut().set_ahead();
    }

    pub fn is_ahead(&self, id: ContextId) -> bool {
        self.get(id).frame().is_some_and(ScopeState::is_ahead)
    }

    pub fn set_ahead_consumed(&mut self, id: ContextId) {
        self.get_mut(id).frame_mut().set_ahead_consumed();
    }

    pub fn is_ahead_consumed(&self, id: ContextId) -> bool {
        self.get(id).frame().is_some_and(ScopeState::is_ahead_consumed)
    }

    // ---- Registration ----

    /// Bind the parameter named by `template` to `value` in the latest frame of
    /// `id`, then descend into matching type and multiplicity arguments.
    pub fn register(
        &mut self,
        id: ContextId,
        template: &GenericType,
        value: &GenericType,
        target: ContextId,
        observer: &mut dyn InferenceObserver,
    ) {
        if let Some(name) = template.param_name() {
            let forwards = self.bind_type(id, name, template.is_covariant(), value, target, observer);
            observer.register(template, value, id, target);
            self.apply_type_forwards(id, name, forwards, target, observer);
        }

        if template.is_concrete()
            && value.is_concrete()
            && !self.algebra.is_bottom(&template.raw)
            && !self.algebra.is_bottom(&value.raw)
            && !self.algebra.is_top(&template.raw)
            && !self.algebra.is_top(&value.raw)
        {
            self.register_structure(id, template, value, target, observer);
        }
    }

    fn bind_type(
        &mut self,
        id: ContextId,
        name: &str,
        covariant: bool,
        value: &GenericType,
        target: ContextId,
        observer: &mut dyn InferenceObserver,
    ) -> Vec<Forward<GenericType>> {
        let frames = self.state_count(id);
        let existing = self.get(id).frame().and_then(|s| s.type_binding(name)).cloned();
        let mut forwards = Vec::new();
        let Some(existing) = existing else {
            self.put_type(id, name, value.clone(), target);
            return forwards;
        };
        let held = existing.value();
        let held_target = existing.target_context(id);

        if held.is_concrete() && value.is_concrete() {
            let merged = self.algebra.best_common_type(&[held.clone(), value.clone()], covariant);
            observer.merged_types(name, held, value, &merged);
            if held.raw == merged.raw {
                for (old, new) in held.type_args.iter().zip(&merged.type_args) {
                    if !old.is_concrete() && new.is_concrete() {
                        forwards.push(Forward { context: held_target, template: old.clone(), value: new.clone() });
                    }
                }
            }
            self.put_type(id, name, merged, target);
        } else if frames > 1 {
            self.put_type(id, name, value.clone(), target);
        } else if held.is_concrete() {
            self.put_type(id, name, value.clone(), target);
            forwards.push(Forward { context: target, template: value.clone(), value: held.clone() });
        } else {
            forwards.push(Forward { context: held_target, template: held.clone(), value: value.clone() });
        }
        forwards
    }

    fn put_type(&mut self, id: ContextId, name: &str, value: GenericType, target: ContextId) {
        self.get_mut(id).frame_mut().put_type_binding(name, Binding::new(value, target, id, false));
    }

    fn apply_type_forwards(
        &mut self,
        id: ContextId,
        name: &str,
        forwards: Vec<Forward<GenericType>>,
        target: ContextId,
        observer: &mut dyn InferenceObserver,
    ) {
        self.in_flight.push((id, name.to_string()));
        observer.shift_tab();
        for forward in forwards {
            if !self.may_forward(id, forward.context, forward.template.param_name()) {
                // Keep a blocked concrete value in this context.
                if forward.value.is_concrete() && !self.holds_concrete_type(id, name) {
                    self.put_type(id, name, forward.value, target);
                }
                continue;
            }
            observer.forward(id, forward.context, forward.template.param_name().unwrap_or(name));
            self.register(forward.context, &forward.template, &forward.value, target, observer);
        }
        observer.un_shift_tab();
        self.in_flight.pop();
    }

    /// A forward never lands on the originating context, nor on a parameter
    /// whose own registration is still unwinding further up the call stack.
    fn may_forward(&self, from: ContextId, to: ContextId, name: Option<&str>) -> bool {
        if from == to {
            return false;
        }
        match name {
            Some(name) => !self.in_flight.iter().any(|(c, n)| *c == to && n == name),
            None => true,
        }
    }

    pub fn register_mul(
        &mut self,
        id: ContextId,
        template: &Multiplicity,
        value: &Multiplicity,
        target: ContextId,
        observer: &mut dyn InferenceObserver,
    ) {
        let Some(name) = template.param_name() else {
            return;
        };
        let frames = self.state_count(id);
        let existing = self.get(id).frame().and_then(|s| s.mul_binding(name)).cloned();
        let mut forward = None;
        match existing {
            None => self.put_mul(id, name, value.clone(), target),
            Some(existing) => {
                let held = existing.value();
                if held.is_concrete() && value.is_concrete() {
                    let merged = self.algebra.min_subsuming(value, held);
                    observer.merged_multiplicities(name, held, value, &merged);
                    self.put_mul(id, name, merged, target);
                } else if frames > 1 {
                    self.put_mul(id, name, value.clone(), target);
                } else if held.is_concrete() {
                    self.put_mul(id, name, value.clone(), target);
                    forward = Some(Forward { context: target, template: value.clone(), value: held.clone() });
                } else {
                    forward = Some(Forward {
                        context: existing.target_context(id),
                        template: held.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        observer.register_mul(template, value, id, target);
        let Some(forward) = forward else {
            return;
        };
        if !self.may_forward(id, forward.context, forward.template.param_name()) {
            if forward.value.is_concrete() && !self.holds_concrete_mul(id, name) {
                self.put_mul(id, name, forward.value, target);
            }
            return;
        }
        self.in_flight.push((id, name.to_string()));
        observer.shift_tab();
        observer.forward(id, forward.context, forward.template.param_name().unwrap_or(name));
        self.register_mul(forward.context, &forward.template, &forward.value, target, observer);
        observer.un_shift_tab();
        self.in_flight.pop();
    }

    fn holds_concrete_type(&self, id: ContextId, name: &str) -> bool {
        self.get(id).frame().and_then(|s| s.type_binding(name)).is_some_and(|b| b.value().is_concrete())
    }

    fn holds_concrete_mul(&self, id: ContextId, name: &str) -> bool {
        self.get(id).frame().and_then(|s| s.mul_binding(name)).is_some_and(|b| b.value().is_concrete())
    }

    fn put_mul(&mut self, id: ContextId, name: &str, value: Multiplicity, target: ContextId) {
        self.get_mut(id).frame_mut().put_mul_binding(name, Binding::new(value, target, id, false));
    }

    /// Pair up type and multiplicity arguments of two concrete types, aligning
    /// through inheritance when one raw type is a subtype of the other.
    fn register_structure(
        &mut self,
        id: ContextId,
        template: &GenericType,
        value: &GenericType,
        target: ContextId,
        observer: &mut dyn InferenceObserver,
    ) {
        if let (RawType::Function(first), RawType::Function(second)) = (&template.raw, &value.raw) {
            observer.register(template, value, id, target);
            observer.shift_tab();
            self.register_function_types(id, first, second, target, observer);
            observer.un_shift_tab();
            return;
        }

        let (type_templates, mul_templates, type_values, mul_values) =
            if self.algebra.subtype_of(&template.raw, &value.raw) {
                let Some(aligned) = self.algebra.resolve_via_inheritance(template, &value.raw) else {
                    return;
                };
                (aligned.type_args, aligned.mul_args, value.type_args.clone(), value.mul_args.clone())
            } else {
                let Some(aligned) = self.algebra.resolve_via_inheritance(value, &template.raw) else {
                    return;
                };
                (template.type_args.clone(), template.mul_args.clone(), aligned.type_args, aligned.mul_args)
            };

        for (t, v) in mul_templates.iter().zip(&mul_values) {
            self.register_mul(id, t, v, target, observer);
        }
        for (first, second) in type_templates.iter().zip(&type_values) {
            match (&first.raw, &second.raw) {
                (RawType::Function(f), RawType::Function(s)) => {
                    observer.register(first, second, id, target);
                    observer.shift_tab();
                    self.register_function_types(id, f, s, target, observer);
                    observer.un_shift_tab();
                }
                _ => self.register(id, first, second, target, observer),
            }
        }
    }

    fn register_function_types(
        &mut self,
        id: ContextId,
        template: &FunctionType,
        value: &FunctionType,
        target: ContextId,
        observer: &mut dyn InferenceObserver,
    ) {
        for (t, v) in template.params.iter().zip(&value.params) {
            if let (Some(tt), Some(vt)) = (&t.generic_type, &v.generic_type) {
                self.register(id, tt, vt, target, observer);
            }
            if let (Some(tm), Some(vm)) = (&t.multiplicity, &v.multiplicity) {
                self.register_mul(id, tm, vm, target, observer);
            }
        }
        self.register(id, &template.return_type, &value.return_type, target, observer);
        self.register_mul(id, &template.return_multiplicity, &value.return_multiplicity, target, observer);
    }

    // ---- Resolution ----

    pub fn contains_type_parameter(&self, id: ContextId, name: &str) -> bool {
        self.get(id).frame().is_some_and(|s| s.has_type_param(name))
    }

    pub fn contains_multiplicity_parameter(&self, id: ContextId, name: &str) -> bool {
        self.get(id).frame().is_some_and(|s| s.has_mul_param(name))
    }

    /// Follow indirections from `(id, name)` until a concrete value, a binding
    /// with no usable indirection, or an already visited pair.
    pub fn resolve_type_parameter(&self, id: ContextId, name: &str) -> Option<GenericType> {
        self.follow(id, name, |ctx, n| self.get(ctx).frame().and_then(|s| s.type_binding(n)), |t| t.param_name())
    }

    pub fn resolve_multiplicity_parameter(&self, id: ContextId, name: &str) -> Option<Multiplicity> {
        self.follow(id, name, |ctx, n| self.get(ctx).frame().and_then(|s| s.mul_binding(n)), |m| m.param_name())
    }

    fn follow<'s, V: Clone + 's>(
        &'s self,
        id: ContextId,
        name: &str,
        lookup: impl Fn(ContextId, &str) -> Option<&'s Binding<V>>,
        param_name: impl Fn(&V) -> Option<&str>,
    ) -> Option<V> {
        let mut visited = HashSet::new();
        let mut current = (id, name.to_string());
        loop {
            let binding = lookup(current.0, &current.1)?;
            let value = binding.value();
            let Some(next_name) = param_name(value) else {
                return Some(value.clone());
            };
            if !visited.insert(current.clone()) {
                return Some(value.clone());
            }
            match binding.indirection() {
                Some(next) if lookup(next, next_name).is_some() => current = (next, next_name.to_string()),
                _ => return Some(value.clone()),
            }
        }
    }

    /// Resolve a type in `id`, falling back to the chain root for parameters
    /// the local frame does not know.
    pub fn resolve(&self, id: ContextId, t: &GenericType) -> Option<GenericType> {
        if t.is_concrete() {
            return Some(t.clone());
        }
        let name = t.param_name()?;
        if self.contains_type_parameter(id, name) {
            return self.resolve_type_parameter(id, name);
        }
        let top = self.top_context(id);
        if self.contains_type_parameter(top, name) {
            return self.resolve_type_parameter(top, name);
        }
        None
    }

    pub fn is_type_parameter_resolved(&self, id: ContextId, t: &GenericType) -> bool {
        if t.is_concrete() {
            return true;
        }
        let Some(name) = t.param_name() else {
            return false;
        };
        let settled = |ctx: ContextId| {
            self.get(ctx)
                .frame()
                .and_then(|s| s.type_binding(name))
                .is_some_and(|b: &TypeBinding| b.is_terminal() || b.value().is_concrete())
        };
        settled(id) || settled(self.top_context(id))
    }

    pub fn type_parameter_value(&self, id: ContextId, name: &str) -> Option<GenericType> {
        if self.contains_type_parameter(id, name) { self.resolve_type_parameter(id, name) } else { None }
    }

    pub fn multiplicity_parameter_value(&self, id: ContextId, name: &str) -> Option<Multiplicity> {
        if self.contains_multiplicity_parameter(id, name) { self.resolve_multiplicity_parameter(id, name) } else { None }
    }

    /// Resolved view of the latest frame's type parameters.
    pub fn type_parameter_map(&self, id: ContextId) -> TypeMap {
        let Some(frame) = self.get(id).frame() else {
            return TypeMap::new();
        };
        frame
            .type_param_names()
            .filter_map(|name| Some((name.to_string(), self.resolve_type_parameter(id, name)?)))
            .collect()
    }

    pub fn multiplicity_parameter_map(&self, id: ContextId) -> MulMap {
        let Some(frame) = self.get(id).frame() else {
            return MulMap::new();
        };
        frame
            .mul_param_names()
            .filter_map(|name| Some((name.to_string(), self.resolve_multiplicity_parameter(id, name)?)))
            .collect()
    }

    // ---- Printing ----

    /// `##>[id:scope ~ [T = *Integer, U = V:2] / [m = [1]] || ...] -> [parent]<##`
    pub fn print(&self, id: ContextId) -> String {
        let mut out = String::from("##>");
        let mut current = Some(id);
        let mut first = true;
        while let Some(ctx) = current {
            if !first {
                out.push_str(" -> ");
            }
            first = false;
            self.print_context(&mut out, self.get(ctx));
            current = self.get(ctx).parent;
        }
        out.push_str("<##");
        out
    }

    fn print_context(&self, out: &mut String, ctx: &InferenceContext) {
        out.push('[');
        out.push_str(&ctx.id.to_string());
        out.push(':');
        out.push_str(ctx.scope.as_deref().unwrap_or("NULL"));
        out.push_str(" ~ ");
        for (i, state) in ctx.states.iter().enumerate() {
            if i > 0 {
                out.push_str(" || ");
            }
            self.print_state(out, ctx.id, state);
        }
        out.push(']');
    }

    fn print_state(&self, out: &mut String, owner: ContextId, state: &ScopeState) {
        let types: Vec<String> = state
            .type_param_names()
            .filter_map(|name| Some((name, state.type_binding(name)?)))
            .map(|(name, binding)| {
                let mut entry = format!("{name} = ");
                if binding.is_terminal() {
                    entry.push('*');
                }
                entry.push_str(&self.algebra.print_type(binding.value()));
                if !binding.value().is_concrete() {
                    entry.push(':');
                    entry.push_str(&binding.target_context(owner).to_string());
                }
                entry
            })
            .collect();
        let muls: Vec<String> = state
            .mul_param_names()
            .filter_map(|name| Some((name, state.mul_binding(name)?)))
            .map(|(name, binding): (&str, &MultiplicityBinding)| {
                let star = if binding.is_terminal() { "*" } else { "" };
                format!("{name} = {star}{}", binding.value())
            })
            .collect();
        out.push_str(&format!("[{}] / [{}]", types.join(", "), muls.join(", ")));
    }
}
