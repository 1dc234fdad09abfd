//! Depth-first walker that drives the inference engine over a `Program` the way
//! a semantic pass would: function bodies under a root context seeded from the
//! signature, one child context per call, untyped lambdas typed from the
//! matched signature, and collection arguments unified one element at a time.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::diagnostics::CompileError;
use crate::model::algebra::{make_multiplicity_as_concrete_as_possible, make_type_as_concrete_as_possible};
use crate::model::program::{ExprId, ExprKind, Lambda, LambdaId, Program};
use crate::model::{DeclaresParameters, FunctionKind, FunctionSig, GenericType, Model, Multiplicity, TypeAlgebra};
use crate::span::Span;

use super::context::{ContextId, InferenceContexts};
use super::infer::{self, LambdaHost, SubstitutionStack, UNTYPEABLE_LAMBDA};
use super::observer::InferenceObserver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOptions {
    /// Reject lambdas whose parameter types never become inferable. When off
    /// such lambdas are left unprocessed.
    pub strict_lambda_types: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self { strict_lambda_types: true }
    }
}

// ---- Report ----

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedBinding {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSiteReport {
    pub function: String,
    /// Function whose body holds the call; `None` for top-level expressions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub span: Span,
    pub types: Vec<ResolvedBinding>,
    pub multiplicities: Vec<ResolvedBinding>,
    pub return_type: String,
}

impl CallSiteReport {
    pub fn type_binding(&self, name: &str) -> Option<&str> {
        self.types.iter().find(|b| b.name == name).map(|b| b.value.as_str())
    }

    pub fn multiplicity_binding(&self, name: &str) -> Option<&str> {
        self.multiplicities.iter().find(|b| b.name == name).map(|b| b.value.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    /// Call sites in the order their inference completed.
    pub call_sites: Vec<CallSiteReport>,
    pub contexts_created: usize,
}

impl CheckReport {
    pub fn call(&self, function: &str) -> Option<&CallSiteReport> {
        self.call_sites.iter().find(|c| c.function == function)
    }

    pub fn calls_to<'r>(&'r self, function: &'r str) -> impl Iterator<Item = &'r CallSiteReport> + 'r {
        self.call_sites.iter().filter(move |c| c.function == function)
    }
}

// ---- Processor state ----

type Variable = (GenericType, Multiplicity);

pub struct ProcessorState<'a> {
    model: &'a Model,
    program: &'a mut Program,
    contexts: InferenceContexts<'a>,
    /// Active contexts, innermost last. A reused ahead context appears twice.
    stack: Vec<ContextId>,
    variables: Vec<HashMap<String, Variable>>,
    substitutions: SubstitutionStack,
    observer: &'a mut dyn InferenceObserver,
    options: CheckOptions,
    owner: Option<String>,
    completed: Vec<(ExprId, Option<String>)>,
    completed_ids: HashSet<ExprId>,
}

impl<'a> ProcessorState<'a> {
    pub fn new(
        model: &'a Model,
        program: &'a mut Program,
        options: CheckOptions,
        observer: &'a mut dyn InferenceObserver,
    ) -> Self {
        Self {
            model,
            program,
            contexts: InferenceContexts::new(model),
            stack: Vec::new(),
            variables: Vec::new(),
            substitutions: SubstitutionStack::new(),
            observer,
            options,
            owner: None,
            completed: Vec::new(),
            completed_ids: HashSet::new(),
        }
    }

    /// Enter a child of the current context. A context pushed ahead is handed
    /// out once instead, so the call being reprocessed sees what was
    /// registered into it.
    pub fn push_context(&mut self) -> ContextId {
        let current = self.current_context();
        if let Some(ahead) = current
            && self.contexts.is_ahead(ahead)
            && !self.contexts.is_ahead_consumed(ahead)
        {
            self.contexts.set_ahead_consumed(ahead);
            self.stack.push(ahead);
            return ahead;
        }
        let id = self.contexts.new_context(current, None);
        self.stack.push(id);
        id
    }

    pub fn push_root_context(&mut self, owner: &dyn DeclaresParameters) -> ContextId {
        let id = self.contexts.new_context(None, Some(owner));
        self.stack.push(id);
        id
    }

    pub fn push_context_ahead(&mut self) -> ContextId {
        let id = self.contexts.new_context(self.current_context(), None);
        self.contexts.set_ahead(id);
        self.stack.push(id);
        id
    }

    pub fn pop_context(&mut self) -> Option<ContextId> {
        self.stack.pop()
    }

    pub fn pop_context_ahead(&mut self) -> Option<ContextId> {
        let id = self.stack.pop()?;
        debug_assert!(self.contexts.is_ahead(id));
        Some(id)
    }

    pub fn push_variable_scope(&mut self) {
        self.variables.push(HashMap::new());
    }

    pub fn pop_variable_scope(&mut self) {
        self.variables.pop();
    }

    fn define(&mut self, name: &str, generic_type: GenericType, multiplicity: Multiplicity) {
        if let Some(scope) = self.variables.last_mut() {
            scope.insert(name.to_string(), (generic_type, multiplicity));
        }
    }

    fn lookup(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().rev().find_map(|scope| scope.get(name))
    }

    fn set_type(&mut self, id: ExprId, generic_type: GenericType, multiplicity: Multiplicity) {
        let expr = self.program.expr_mut(id);
        expr.generic_type = Some(generic_type);
        expr.multiplicity = Some(multiplicity);
    }

    // ---- Walking ----

    fn check_function(&mut self, index: usize) -> Result<(), CompileError> {
        let model = self.model;
        let body = self.program.bodies[index].clone();
        let Some(sig) = model.function_by_name(&body.function) else {
            return Err(CompileError::type_err(
                format!("unknown function '{}'", body.function),
                Span::dummy(),
            ));
        };

        self.observer.start_processing_function(&sig.name);
        self.owner = Some(sig.name.clone());
        let root = self.push_root_context(sig);
        self.contexts.set_scope(root, format!("{}{}", sig.name, model.print_function_type(&sig.ftype)));
        self.push_variable_scope();
        for param in &sig.ftype.params {
            if let (Some(t), Some(m)) = (&param.generic_type, &param.multiplicity) {
                self.define(&param.name, t.clone(), m.clone());
            }
        }

        let result = body.body.iter().try_for_each(|&expr| self.process_expr(expr));

        self.pop_variable_scope();
        self.pop_context();
        self.owner = None;
        self.observer.finished_processing_function(&sig.name);
        result
    }

    fn check_top_level(&mut self) -> Result<(), CompileError> {
        let exprs = self.program.top_level.clone();
        self.push_variable_scope();
        let result = exprs.iter().try_for_each(|&expr| self.process_expr(expr));
        self.pop_variable_scope();
        result
    }

    fn process_expr(&mut self, id: ExprId) -> Result<(), CompileError> {
        let span = self.program.expr(id).span;
        match self.program.expr(id).kind.clone() {
            ExprKind::Literal => Ok(()),
            ExprKind::Var(name) => {
                let Some((t, m)) = self.lookup(&name).cloned() else {
                    return Err(CompileError::type_err(format!("undefined variable '{name}'"), span));
                };
                self.set_type(id, t, m);
                Ok(())
            }
            ExprKind::Collection(elements) => {
                for &element in &elements {
                    self.process_expr(element)?;
                }
                self.type_collection(id, &elements);
                Ok(())
            }
            ExprKind::Call { function, args } => self.process_call(id, &function, &args),
            ExprKind::Lambda(lambda) => {
                let current = self.stack.last().copied();
                if infer::can_process_lambda(self.program.lambda_def(lambda), &self.contexts, current) {
                    return self.process_lambda(lambda);
                }
                if self.options.strict_lambda_types {
                    return Err(CompileError::type_err(UNTYPEABLE_LAMBDA, span));
                }
                Ok(())
            }
        }
    }

    /// Covariant best common type of the elements, multiplicity `[n]`.
    fn type_collection(&mut self, id: ExprId, elements: &[ExprId]) {
        if elements.is_empty() {
            self.set_type(id, GenericType::nil(), Multiplicity::ZERO);
            return;
        }
        let types: Vec<GenericType> = elements
            .iter()
            .filter_map(|&e| self.program.expr(e).generic_type.clone())
            .collect();
        let joined = self.model.best_common_type(&types, true);
        self.set_type(id, joined, Multiplicity::exactly(elements.len() as u32));
    }

    fn process_lambda(&mut self, id: LambdaId) -> Result<(), CompileError> {
        let lambda = self.program.lambda_def(id).clone();
        self.push_variable_scope();
        for param in &lambda.params {
            if let (Some(t), Some(m)) = (&param.generic_type, &param.multiplicity) {
                self.define(&param.name, t.clone(), m.clone());
            }
        }
        self.push_context();
        let result = lambda.body.iter().try_for_each(|&expr| self.process_expr(expr));
        self.pop_context();
        self.pop_variable_scope();
        result?;

        let last = lambda.body.last().map(|&e| self.program.expr(e));
        let (return_type, return_multiplicity) = last
            .and_then(|e| Some((e.generic_type.clone()?, e.multiplicity.clone()?)))
            .unwrap_or_else(|| (GenericType::nil(), Multiplicity::ZERO));
        let def = self.program.lambda_def_mut(id);
        def.return_type = Some(return_type);
        def.return_multiplicity = Some(return_multiplicity);
        self.type_lambda_expr(id);
        Ok(())
    }

    fn type_lambda_expr(&mut self, id: LambdaId) {
        let def = self.program.lambda_def(id);
        let expr = def.expr;
        if let Some(value_type) = def.value_type() {
            self.set_type(expr, value_type, Multiplicity::PURE_ONE);
        }
    }

    // ---- Calls ----

    fn process_call(&mut self, id: ExprId, function: &str, args: &[ExprId]) -> Result<(), CompileError> {
        let model = self.model;
        let span = self.program.expr(id).span;
        let sig = match model.function_by_name(function) {
            Some(sig) if sig.ftype.params.len() == args.len() => sig,
            _ => {
                let msg = format!("The system can't find a match for the function: {function}");
                self.observer.inference_failed(&msg);
                return Err(CompileError::type_err(msg, span));
            }
        };

        let ctx = self.push_context();
        self.contexts.set_scope(ctx, sig.name.as_str());
        self.observer.function_matched(sig, ctx);
        let result = self.infer_call(id, sig, args, ctx);
        if result.is_err() {
            tracing::debug!("inference of {} failed in {}", sig.name, self.contexts.print(ctx));
        }
        self.pop_context();
        result?;

        if self.completed_ids.insert(id) {
            self.completed.push((id, self.owner.clone()));
        }
        Ok(())
    }

    fn infer_call(&mut self, id: ExprId, sig: &FunctionSig, args: &[ExprId], ctx: ContextId) -> Result<(), CompileError> {
        let span = self.program.expr(id).span;
        let top = self.contexts.top_context(ctx);
        let params = &sig.ftype.params;

        let mut deferred = Vec::new();
        let mut folded = Vec::new();
        for (index, (&arg, param)) in args.iter().zip(params).enumerate() {
            match self.program.expr(arg).kind.clone() {
                ExprKind::Lambda(lambda) if self.program.lambda_def(lambda).has_untyped_params() => {
                    self.observer.lambda_deferred(index);
                    deferred.push((index, arg, lambda));
                }
                ExprKind::Collection(elements) if elements.len() > 1 => {
                    match &param.generic_type {
                        Some(template) => {
                            self.process_collection_argument(ctx, template, &elements)?;
                            folded.push(index);
                        }
                        None => {
                            for &element in &elements {
                                self.process_expr(element)?;
                            }
                        }
                    }
                    self.type_collection(arg, &elements);
                }
                _ => self.process_expr(arg)?,
            }
        }

        self.observer.shift_tab();
        for (index, (&arg, param)) in args.iter().zip(params).enumerate() {
            if deferred.iter().any(|(i, ..)| *i == index) {
                continue;
            }
            let expr = self.program.expr(arg);
            let (value, value_mul) = (expr.generic_type.clone(), expr.multiplicity.clone());
            if let Some(template) = &param.generic_type {
                self.observer.processing_parameter(index, template, value.as_ref());
                if let Some(value) = &value
                    && !folded.contains(&index)
                {
                    self.contexts.register(ctx, template, value, top, &mut *self.observer);
                }
            }
            if let (Some(template), Some(value)) = (&param.multiplicity, &value_mul) {
                self.contexts.register_mul(ctx, template, value, top, &mut *self.observer);
            }
        }
        self.observer.un_shift_tab();

        self.process_deferred_lambdas(ctx, sig, deferred)?;

        let types = self.contexts.type_parameter_map(ctx);
        let muls = self.contexts.multiplicity_parameter_map(ctx);
        let return_type = make_type_as_concrete_as_possible(&sig.ftype.return_type, &types, &muls);
        if let Some(name) = return_type.param_name()
            && !self.contexts.is_top(ctx, name)
        {
            self.observer.shift_tab();
            let result = self.reverse_match(ctx, sig, args);
            self.observer.un_shift_tab();
            result?;
        }

        infer::store_inferred_parameters(self.program.expr_mut(id), &self.contexts, ctx, sig, &mut *self.observer)?;

        let (return_type, return_multiplicity) = if sig.kind == FunctionKind::QualifiedProperty {
            self.qualified_property_return(sig, args).map_err(|e| e.with_span(span))?
        } else {
            let types = self.contexts.type_parameter_map(ctx);
            let muls = self.contexts.multiplicity_parameter_map(ctx);
            (
                make_type_as_concrete_as_possible(&sig.ftype.return_type, &types, &muls),
                make_multiplicity_as_concrete_as_possible(&sig.ftype.return_multiplicity, &muls),
            )
        };
        if let Some(name) = return_type.param_name()
            && !self.contexts.is_top(ctx, name)
        {
            let msg = format!(
                "The system is not capable of inferring the return type ({}) of the function '{}'. Check your signatures!",
                self.model.print_type(&return_type),
                sig.name
            );
            self.observer.inference_failed(&msg);
            return Err(CompileError::type_err(msg, span));
        }
        self.observer.return_type(&sig.name, &return_type, &return_multiplicity);
        self.set_type(id, return_type, return_multiplicity);
        Ok(())
    }

    /// Register every element into its own frame of a child context, then fold
    /// the per-element bindings back into `ctx`.
    fn process_collection_argument(
        &mut self,
        ctx: ContextId,
        template: &GenericType,
        elements: &[ExprId],
    ) -> Result<(), CompileError> {
        let frames = self.push_context();
        self.contexts.register(frames, template, template, ctx, &mut *self.observer);
        let result = elements.iter().try_for_each(|&element| {
            self.contexts.add_state_for_collection_element(frames);
            self.process_expr(element)?;
            if let Some(value) = self.program.expr(element).generic_type.clone() {
                self.contexts.register(frames, template, &value, ctx, &mut *self.observer);
            }
            Ok(())
        });
        if result.is_ok() {
            infer::fold_collection_element_bindings(&mut self.contexts, frames, elements.len(), &mut *self.observer);
        }
        self.pop_context();
        result
    }

    /// Retry untyped lambdas until all are processed or a round makes no
    /// progress. Each processed lambda feeds its return type back into `ctx`,
    /// which may unblock the others.
    fn process_deferred_lambdas(
        &mut self,
        ctx: ContextId,
        sig: &FunctionSig,
        mut pending: Vec<(usize, ExprId, LambdaId)>,
    ) -> Result<(), CompileError> {
        let mut round = 0;
        while !pending.is_empty() {
            let before = pending.len();
            let mut blocked = Vec::new();
            for (index, arg, lambda) in pending {
                if round > 0 {
                    self.observer.reprocessing_lambda(index);
                }
                let span = self.program.expr(arg).span;
                let Some(template) = sig.ftype.params.get(index).and_then(|p| p.generic_type.as_ref()) else {
                    return Err(CompileError::type_err(UNTYPEABLE_LAMBDA, span));
                };
                if infer::process_lambda_param_types_from_template(self, lambda, template, span)? {
                    blocked.push((index, arg, lambda));
                } else {
                    self.register_lambda_return(ctx, template, lambda);
                }
            }
            if blocked.len() == before {
                if let Some((_, arg, _)) = blocked.first()
                    && self.options.strict_lambda_types
                {
                    let span = self.program.expr(*arg).span;
                    self.observer.inference_failed(UNTYPEABLE_LAMBDA);
                    return Err(CompileError::type_err(UNTYPEABLE_LAMBDA, span));
                }
                return Ok(());
            }
            pending = blocked;
            round += 1;
        }
        Ok(())
    }

    /// Make the lambda's return as concrete as the chain root allows and bind
    /// the template's return type and multiplicity to it.
    fn register_lambda_return(&mut self, ctx: ContextId, template: &GenericType, lambda: LambdaId) {
        let Some(expected) = template.as_function_type() else {
            return;
        };
        let top = self.contexts.top_context(ctx);
        let types = self.contexts.type_parameter_map(top);
        let muls = self.contexts.multiplicity_parameter_map(top);

        let def = self.program.lambda_def_mut(lambda);
        let return_type = def.return_type.as_ref().map(|t| make_type_as_concrete_as_possible(t, &types, &muls));
        let return_multiplicity = def
            .return_multiplicity
            .as_ref()
            .map(|m| make_multiplicity_as_concrete_as_possible(m, &muls));
        def.return_type = return_type.clone();
        def.return_multiplicity = return_multiplicity.clone();
        self.type_lambda_expr(lambda);

        let target = self.contexts.parent(ctx).unwrap_or(ctx);
        if let Some(value) = &return_type
            && !expected.return_type.is_concrete()
        {
            self.contexts.register(ctx, &expected.return_type, value, target, &mut *self.observer);
        }
        if let Some(value) = &return_multiplicity {
            self.contexts.register_mul(ctx, &expected.return_multiplicity, value, target, &mut *self.observer);
        }
    }

    /// Reprocess call arguments under an ahead context holding what `ctx`
    /// already expects of them, then register their new types.
    fn reverse_match(&mut self, ctx: ContextId, sig: &FunctionSig, args: &[ExprId]) -> Result<(), CompileError> {
        let top = self.contexts.top_context(ctx);
        for (index, (&arg, param)) in args.iter().zip(&sig.ftype.params).enumerate() {
            let ExprKind::Call { function, .. } = &self.program.expr(arg).kind else {
                continue;
            };
            let function = function.clone();
            let (Some(template), Some(template_mul)) = (&param.generic_type, &param.multiplicity) else {
                continue;
            };
            let types = self.contexts.type_parameter_map(ctx);
            let muls = self.contexts.multiplicity_parameter_map(ctx);
            let expected = make_type_as_concrete_as_possible(template, &types, &muls);
            let expected_mul = make_multiplicity_as_concrete_as_possible(template_mul, &muls);

            let ahead = self.push_context_ahead();
            self.contexts.set_scope(ahead, function);
            self.observer.processing_parameter(index, template, Some(&expected));
            let expr = self.program.expr(arg);
            let (value, value_mul) = (expr.generic_type.clone(), expr.multiplicity.clone());
            if let Some(value) = &value {
                self.contexts.register(ahead, value, &expected, ctx, &mut *self.observer);
            }
            if let Some(value) = &value_mul {
                self.contexts.register_mul(ahead, value, &expected_mul, ctx, &mut *self.observer);
            }

            self.program.expr_mut(arg).resolved = None;
            let result = self.process_expr(arg);
            self.pop_context_ahead();
            result?;

            let expr = self.program.expr(arg);
            let (value, value_mul) = (expr.generic_type.clone(), expr.multiplicity.clone());
            if let Some(value) = &value {
                self.contexts.register(ctx, template, value, top, &mut *self.observer);
            }
            if let Some(value) = &value_mul {
                self.contexts.register_mul(ctx, template_mul, value, top, &mut *self.observer);
            }
        }
        Ok(())
    }

    /// Qualified properties are typed by substituting their signature against
    /// the argument types rather than through the call context.
    fn qualified_property_return(
        &mut self,
        sig: &FunctionSig,
        args: &[ExprId],
    ) -> Result<(GenericType, Multiplicity), CompileError> {
        let values: Vec<(Option<GenericType>, Option<Multiplicity>)> = args
            .iter()
            .map(|&a| {
                let e = self.program.expr(a);
                (e.generic_type.clone(), e.multiplicity.clone())
            })
            .collect();
        infer::map_signature_to_call_args(&sig.ftype.params, &values, &mut self.substitutions, self.model)?;
        let return_type =
            make_type_as_concrete_as_possible(&sig.ftype.return_type, self.substitutions.types(), self.substitutions.muls());
        let return_multiplicity =
            make_multiplicity_as_concrete_as_possible(&sig.ftype.return_multiplicity, self.substitutions.muls());
        self.substitutions.pop();
        Ok((return_type, return_multiplicity))
    }

    fn into_report(self) -> CheckReport {
        let model = self.model;
        let program: &Program = self.program;
        let call_sites = self
            .completed
            .iter()
            .filter_map(|(id, owner)| {
                let expr = program.expr(*id);
                let ExprKind::Call { function, .. } = &expr.kind else {
                    return None;
                };
                let resolved = expr.resolved.clone().unwrap_or_default();
                let return_type = match (&expr.generic_type, &expr.multiplicity) {
                    (Some(t), Some(m)) => format!("{}{m}", model.print_type(t)),
                    _ => "?".to_string(),
                };
                Some(CallSiteReport {
                    function: function.clone(),
                    owner: owner.clone(),
                    span: expr.span,
                    types: resolved
                        .types
                        .iter()
                        .map(|(name, t)| ResolvedBinding { name: name.clone(), value: model.print_type(t) })
                        .collect(),
                    multiplicities: resolved
                        .multiplicities
                        .iter()
                        .map(|(name, m)| ResolvedBinding { name: name.clone(), value: m.to_string() })
                        .collect(),
                    return_type,
                })
            })
            .collect();
        CheckReport { call_sites, contexts_created: self.contexts.len() }
    }
}

impl LambdaHost for ProcessorState<'_> {
    fn contexts(&self) -> &InferenceContexts<'_> {
        &self.contexts
    }

    fn current_context(&self) -> Option<ContextId> {
        self.stack.last().copied()
    }

    fn lambda(&self, id: LambdaId) -> &Lambda {
        self.program.lambda_def(id)
    }

    fn lambda_mut(&mut self, id: LambdaId) -> &mut Lambda {
        self.program.lambda_def_mut(id)
    }

    fn process_lambda_body(&mut self, id: LambdaId) -> Result<(), CompileError> {
        self.process_lambda(id)
    }
}

/// Run inference over every function body, then over the top-level
/// expressions. The first error aborts the pass.
pub fn check_program(
    model: &Model,
    program: &mut Program,
    options: &CheckOptions,
    observer: &mut dyn InferenceObserver,
) -> Result<CheckReport, CompileError> {
    let mut state = ProcessorState::new(model, program, *options, observer);
    for index in 0..state.program.bodies.len() {
        state.check_function(index)?;
    }
    state.check_top_level()?;
    Ok(state.into_report())
}
