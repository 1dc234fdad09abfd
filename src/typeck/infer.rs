use crate::diagnostics::CompileError;
use crate::model::algebra::{make_multiplicity_as_concrete_as_possible, make_type_as_concrete_as_possible};
use crate::model::program::{CallSiteBindings, Expr, Lambda, LambdaId};
use crate::model::{FunctionKind, FunctionSig, GenericType, MulMap, Multiplicity, RawType, TypeAlgebra, TypeMap, VarDecl};
use crate::span::Span;

use super::context::{ContextId, InferenceContexts};
use super::observer::InferenceObserver;

pub const UNTYPEABLE_LAMBDA: &str =
    "Can't infer the parameters' types for the lambda. Please specify it in the signature.";

/// What lambda parameter inference needs from the pass walking the program.
pub trait LambdaHost {
    fn contexts(&self) -> &InferenceContexts<'_>;

    fn current_context(&self) -> Option<ContextId>;

    fn lambda(&self, id: LambdaId) -> &Lambda;

    fn lambda_mut(&mut self, id: LambdaId) -> &mut Lambda;

    /// Process the lambda body under a fresh variable scope and child context.
    fn process_lambda_body(&mut self, id: LambdaId) -> Result<(), CompileError>;
}

/// A lambda can be descended into once every parameter has a type that is
/// concrete or resolvable in `ctx`.
pub fn can_process_lambda(lambda: &Lambda, contexts: &InferenceContexts, ctx: Option<ContextId>) -> bool {
    lambda.params.iter().all(|param| match &param.generic_type {
        None => false,
        Some(t) => t.is_concrete() || ctx.is_some_and(|c| contexts.is_type_parameter_resolved(c, t)),
    })
}

/// Attach the resolved bindings of `found` to `call`, in declaration order.
///
/// A missing type parameter is only an error in a parentless context, where no
/// enclosing scope could still supply it. A missing multiplicity parameter is
/// always an error. Qualified properties are skipped.
pub fn store_inferred_parameters(
    call: &mut Expr,
    contexts: &InferenceContexts,
    ctx: ContextId,
    found: &FunctionSig,
    observer: &mut dyn InferenceObserver,
) -> Result<(), CompileError> {
    if found.kind == FunctionKind::QualifiedProperty {
        return Ok(());
    }
    let mut bindings = CallSiteBindings::default();
    for param in &found.type_params {
        match contexts.type_parameter_value(ctx, &param.name) {
            Some(value) => bindings.types.push((param.name.clone(), value)),
            None if contexts.parent(ctx).is_none() => {
                let msg = format!(
                    "The type parameter {} was not resolved ({} / {})!",
                    param.name,
                    found.name,
                    contexts.algebra().print_function_type(&found.ftype)
                );
                observer.inference_failed(&msg);
                return Err(CompileError::type_err(msg, call.span));
            }
            None => {}
        }
    }
    for name in &found.mul_params {
        match contexts.multiplicity_parameter_value(ctx, name) {
            Some(value) => bindings.multiplicities.push((name.clone(), value)),
            None => {
                let msg = format!("The multiplicity parameter {name} was not resolved!");
                observer.inference_failed(&msg);
                return Err(CompileError::execution(msg, call.span));
            }
        }
    }
    observer.stored_inferred_parameters(&found.name, &bindings);
    call.resolved = Some(bindings);
    Ok(())
}

/// Type the untyped parameters of `lambda` from the function type expected by
/// `template`, then process its body.
///
/// Returns `Ok(true)` when some parameter type is not yet resolvable; the
/// lambda is left untouched so it can be retried after more registrations.
pub fn process_lambda_param_types_from_template<H: LambdaHost + ?Sized>(
    host: &mut H,
    lambda: LambdaId,
    template: &GenericType,
    span: Span,
) -> Result<bool, CompileError> {
    let contexts = host.contexts();
    let algebra = contexts.algebra();
    if !template.is_concrete() || !algebra.is_function_class(&template.raw) {
        return Err(CompileError::type_err(UNTYPEABLE_LAMBDA, span));
    }
    let expected = match &template.raw {
        RawType::Function(_) => Some(template),
        _ => template.type_args.first(),
    };
    let ctx = host.current_context();
    let (types, muls) = match ctx {
        Some(c) => (contexts.type_parameter_map(c), contexts.multiplicity_parameter_map(c)),
        None => (TypeMap::new(), MulMap::new()),
    };

    let mut assigned = Vec::new();
    for (j, param) in host.lambda(lambda).params.iter().enumerate() {
        if param.generic_type.is_some() {
            continue;
        }
        let expected_fn = match expected.map(|e| &e.raw) {
            Some(RawType::Function(f)) => f,
            _ => return Err(CompileError::type_err(UNTYPEABLE_LAMBDA, span)),
        };
        let Some(VarDecl { generic_type: Some(template_type), multiplicity: template_mul, .. }) =
            expected_fn.params.get(j)
        else {
            return Err(CompileError::type_err(UNTYPEABLE_LAMBDA, span));
        };
        let generic_type = make_type_as_concrete_as_possible(template_type, &types, &muls);
        let resolved = match ctx {
            _ if generic_type.is_concrete() => Some(generic_type),
            Some(c) if contexts.is_type_parameter_resolved(c, &generic_type) => contexts.resolve(c, &generic_type),
            _ => None,
        };
        let Some(generic_type) = resolved else {
            return Ok(true);
        };
        let multiplicity = template_mul
            .as_ref()
            .map(|m| make_multiplicity_as_concrete_as_possible(m, &muls))
            .unwrap_or(Multiplicity::PURE_ONE);
        assigned.push((j, generic_type, multiplicity));
    }

    let target = host.lambda_mut(lambda);
    for (j, generic_type, multiplicity) in assigned {
        target.params[j].generic_type = Some(generic_type);
        target.params[j].multiplicity = Some(multiplicity);
    }
    host.process_lambda_body(lambda)?;
    Ok(false)
}

/// Pop the `element_count` per-element frames of `ctx` and push, for every
/// parameter still unresolved in the shared frame, the best common value
/// across the elements up into the parent context.
pub fn fold_collection_element_bindings(
    contexts: &mut InferenceContexts,
    ctx: ContextId,
    element_count: usize,
    observer: &mut dyn InferenceObserver,
) {
    let frames = contexts.drop_states(ctx, element_count);
    let Some(parent) = contexts.parent(ctx) else {
        return;
    };
    let Some((base, elements)) = frames.split_first() else {
        return;
    };
    if elements.is_empty() {
        return;
    }
    let algebra = contexts.algebra();

    let mut types = Vec::new();
    for name in base.type_param_names() {
        let Some(held) = base.type_value(name) else { continue };
        if held.is_concrete() {
            continue;
        }
        let values: Vec<GenericType> = elements.iter().filter_map(|s| s.type_value(name).cloned()).collect();
        types.push((held.clone(), algebra.best_common_type(&values, held.is_covariant())));
    }

    let mut muls = Vec::new();
    for name in base.mul_param_names() {
        let Some(held) = base.mul_value(name) else { continue };
        if held.is_concrete() {
            continue;
        }
        let mut values = elements.iter().filter_map(|s| s.mul_value(name));
        let Some(first) = values.next() else { continue };
        let joined = values.fold(first.clone(), |acc, m| algebra.min_subsuming(&acc, m));
        muls.push((held.clone(), joined));
    }

    observer.collection_folded(ctx, element_count);
    for (held, joined) in types {
        contexts.register(parent, &held, &joined, parent, observer);
    }
    for (held, joined) in muls {
        contexts.register_mul(parent, &held, &joined, parent, observer);
    }
}

/// Stack of parameter substitutions used while mapping signatures onto
/// arguments. Starts with one empty frame.
#[derive(Debug, Clone)]
pub struct SubstitutionStack {
    types: Vec<TypeMap>,
    muls: Vec<MulMap>,
}

impl Default for SubstitutionStack {
    fn default() -> Self {
        Self::new()
    }
}

impl SubstitutionStack {
    pub fn new() -> Self {
        Self { types: vec![TypeMap::new()], muls: vec![MulMap::new()] }
    }

    pub fn push(&mut self, types: TypeMap, muls: MulMap) {
        self.types.push(types);
        self.muls.push(muls);
    }

    /// Never pops the base frame.
    pub fn pop(&mut self) -> Option<(TypeMap, MulMap)> {
        if self.types.len() <= 1 {
            return None;
        }
        Some((self.types.pop()?, self.muls.pop()?))
    }

    pub fn types(&self) -> &TypeMap {
        &self.types[self.types.len() - 1]
    }

    pub fn muls(&self) -> &MulMap {
        &self.muls[self.muls.len() - 1]
    }

    pub fn depth(&self) -> usize {
        self.types.len()
    }

    /// `[(T -> Integer,m -> [1]),...]`, bottom frame first.
    pub fn print(&self, printer: &dyn TypeAlgebra) -> String {
        let frames: Vec<String> = self
            .types
            .iter()
            .zip(&self.muls)
            .map(|(types, muls)| {
                let entries: Vec<String> = types
                    .iter()
                    .map(|(name, t)| format!("{name} -> {}", printer.print_type(t)))
                    .chain(muls.iter().map(|(name, m)| format!("{name} -> {m}")))
                    .collect();
                format!("({})", entries.join(","))
            })
            .collect();
        format!("[{}]", frames.join(","))
    }
}

/// Zip declared parameters against argument types and push the resulting
/// substitution onto `stack`. Argument types are first made as concrete as the
/// current top frame allows.
pub fn map_signature_to_call_args(
    params: &[VarDecl],
    args: &[(Option<GenericType>, Option<Multiplicity>)],
    stack: &mut SubstitutionStack,
    algebra: &dyn TypeAlgebra,
) -> Result<(), CompileError> {
    let mut types = TypeMap::new();
    let mut muls = MulMap::new();
    for (param, (arg_type, _)) in params.iter().zip(args) {
        if let (Some(template), Some(value)) = (&param.generic_type, arg_type) {
            map_type(template, value, &mut types, &mut muls, stack, algebra)?;
        }
    }
    for (param, (_, arg_mul)) in params.iter().zip(args) {
        if let Some(template) = &param.multiplicity {
            map_multiplicity(template, arg_mul.as_ref(), &mut muls, stack.muls())?;
        }
    }
    stack.push(types, muls);
    Ok(())
}

fn map_type(
    template: &GenericType,
    from_instance: &GenericType,
    types: &mut TypeMap,
    muls: &mut MulMap,
    stack: &SubstitutionStack,
    algebra: &dyn TypeAlgebra,
) -> Result<(), CompileError> {
    let value = make_type_as_concrete_as_possible(from_instance, stack.types(), stack.muls());
    match &template.raw {
        RawType::Param { name, .. } => {
            types.insert(name.clone(), value.clone());
        }
        raw if algebra.is_function_class(raw) => {
            if let (Some(expected), Some(actual)) = (template.as_function_type(), value.as_function_type()) {
                map_type(&expected.return_type, &actual.return_type, types, muls, stack, algebra)?;
                map_multiplicity(&expected.return_multiplicity, Some(&actual.return_multiplicity), muls, stack.muls())?;
                for (e, a) in expected.params.iter().zip(&actual.params) {
                    if let (Some(et), Some(at)) = (&e.generic_type, &a.generic_type) {
                        map_type(et, at, types, muls, stack, algebra)?;
                    }
                    if let Some(em) = &e.multiplicity {
                        map_multiplicity(em, a.multiplicity.as_ref(), muls, stack.muls())?;
                    }
                }
            }
        }
        _ => {}
    }
    for (t, v) in template.type_args.iter().zip(&value.type_args) {
        map_type(t, v, types, muls, stack, algebra)?;
    }
    for (t, v) in template.mul_args.iter().zip(&value.mul_args) {
        map_multiplicity(t, Some(v), muls, stack.muls())?;
    }
    Ok(())
}

fn map_multiplicity(
    template: &Multiplicity,
    from_instance: Option<&Multiplicity>,
    muls: &mut MulMap,
    previous: &MulMap,
) -> Result<(), CompileError> {
    let Some(name) = template.param_name() else {
        return Ok(());
    };
    let Some(value) = from_instance else {
        return Err(CompileError::execution(
            format!("Cannot resolve multiplicity parameter: {name}"),
            Span::dummy(),
        ));
    };
    let mapped = match value.param_name() {
        Some(from) => previous.get(from).cloned().unwrap_or_else(|| value.clone()),
        None => value.clone(),
    };
    muls.insert(name.to_string(), mapped);
    Ok(())
}
