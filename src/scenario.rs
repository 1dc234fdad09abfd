use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::diagnostics::CompileError;
use crate::model::program::{ExprId, FunctionBody, Program};
use crate::model::{FunctionKind, FunctionSig, FunctionType, GenericType, Model, Multiplicity, TypeParamDecl, VarDecl};
use crate::span::Span;
use crate::typeck::CheckOptions;

/// A loaded scenario: the declarations and expressions inference runs over,
/// plus the program text spans point into.
pub struct Scenario {
    pub path: PathBuf,
    pub source: String,
    pub options: ScenarioOptions,
    pub model: Model,
    pub program: Program,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioOptions {
    /// Install the tracing observer.
    #[serde(default)]
    pub trace: bool,
    /// `tracing_subscriber` filter directive, e.g. `debug` or `gminfer=trace`.
    pub log_level: Option<String>,
    #[serde(default = "default_strict")]
    pub strict_lambda_types: bool,
}

fn default_strict() -> bool {
    true
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self { trace: false, log_level: None, strict_lambda_types: true }
    }
}

impl ScenarioOptions {
    pub fn check_options(&self) -> CheckOptions {
        CheckOptions { strict_lambda_types: self.strict_lambda_types }
    }
}

// ---- TOML deserialization types ----

#[derive(Deserialize)]
struct TomlScenario {
    #[serde(default)]
    source: String,
    #[serde(default)]
    options: ScenarioOptions,
    #[serde(default, rename = "class")]
    classes: Vec<TomlClass>,
    #[serde(default, rename = "function")]
    functions: Vec<TomlFunction>,
    #[serde(default, rename = "expression")]
    expressions: Vec<TomlExpr>,
}

#[derive(Deserialize)]
struct TomlClass {
    name: String,
    #[serde(default)]
    type_params: Vec<String>,
    #[serde(default)]
    mul_params: Vec<String>,
    #[serde(default)]
    extends: Vec<TomlType>,
}

#[derive(Deserialize)]
struct TomlFunction {
    name: String,
    #[serde(default)]
    type_params: Vec<String>,
    #[serde(default)]
    mul_params: Vec<String>,
    #[serde(default)]
    params: Vec<TomlParam>,
    returns: TomlReturn,
    #[serde(default = "default_kind")]
    kind: FunctionKind,
    body: Option<Vec<TomlExpr>>,
}

fn default_kind() -> FunctionKind {
    FunctionKind::Function
}

#[derive(Deserialize)]
struct TomlParam {
    name: String,
    #[serde(rename = "type")]
    ty: Option<TomlType>,
    mul: Option<String>,
}

#[derive(Deserialize)]
struct TomlReturn {
    #[serde(rename = "type")]
    ty: TomlType,
    #[serde(default = "default_mul")]
    mul: String,
}

fn default_mul() -> String {
    "1".to_string()
}

/// `"Integer"`, `{ name = "List", args = ["T"], muls = ["m"] }`, or
/// `{ fn = { params = [...], returns = {...} } }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TomlType {
    Name(String),
    Function {
        #[serde(rename = "fn")]
        function: Box<TomlFnType>,
    },
    Generic {
        name: String,
        #[serde(default)]
        args: Vec<TomlType>,
        #[serde(default)]
        muls: Vec<String>,
    },
}

#[derive(Deserialize)]
struct TomlFnType {
    #[serde(default)]
    params: Vec<TomlParam>,
    returns: TomlReturn,
}

/// Exactly one of `literal`, `var`, `call`, `collection` or `lambda`.
#[derive(Deserialize)]
struct TomlExpr {
    literal: Option<TomlType>,
    mul: Option<String>,
    var: Option<String>,
    call: Option<String>,
    #[serde(default)]
    args: Vec<TomlExpr>,
    collection: Option<Vec<TomlExpr>>,
    lambda: Option<TomlLambda>,
    span: Option<[usize; 2]>,
}

#[derive(Deserialize)]
struct TomlLambda {
    #[serde(default)]
    params: Vec<TomlParam>,
    #[serde(default)]
    body: Vec<TomlExpr>,
}

// ---- Loading ----

pub fn load(path: &Path) -> Result<Scenario, CompileError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CompileError::scenario(format!("could not read file: {e}"), path))?;
    parse(&content, path)
}

pub fn parse(content: &str, path: &Path) -> Result<Scenario, CompileError> {
    let scenario: TomlScenario =
        toml::from_str(content).map_err(|e| CompileError::scenario(format!("invalid syntax: {e}"), path))?;
    let mut lowering = Lowering { path, model: Model::new(), program: Program::new() };
    lowering.classes(&scenario.classes)?;
    lowering.functions(&scenario.functions)?;
    let scope = Scope::default();
    for expr in &scenario.expressions {
        let id = lowering.expr(expr, &scope)?;
        lowering.program.top_level.push(id);
    }
    Ok(Scenario {
        path: path.to_path_buf(),
        source: scenario.source,
        options: scenario.options,
        model: lowering.model,
        program: lowering.program,
    })
}

// ---- Lowering ----

/// Parameters visible while lowering a declaration's types.
#[derive(Default)]
struct Scope {
    types: HashMap<String, TypeParamDecl>,
    muls: Vec<String>,
}

impl Scope {
    fn new(type_params: &[TypeParamDecl], mul_params: &[String]) -> Self {
        Self {
            types: type_params.iter().map(|p| (p.name.clone(), p.clone())).collect(),
            muls: mul_params.to_vec(),
        }
    }
}

struct Lowering<'p> {
    path: &'p Path,
    model: Model,
    program: Program,
}

impl Lowering<'_> {
    fn err(&self, msg: impl Into<String>) -> CompileError {
        CompileError::scenario(msg, self.path)
    }

    /// Declared in two passes so generalizations can name classes declared later.
    fn classes(&mut self, classes: &[TomlClass]) -> Result<(), CompileError> {
        for class in classes {
            if self.model.class_id(&class.name).is_some() {
                return Err(self.err(format!("class '{}' is declared twice", class.name)));
            }
            let type_params = class.type_params.iter().map(|p| TypeParamDecl::parse(p)).collect();
            self.model.define_class(&class.name, type_params, class.mul_params.clone(), Vec::new());
        }
        for class in classes {
            let Some(def) = self.model.class_id(&class.name).and_then(|id| self.model.class(id)) else {
                continue;
            };
            let scope = Scope::new(&def.type_params, &def.mul_params);
            let (type_params, mul_params) = (def.type_params.clone(), def.mul_params.clone());
            let generalizations = class
                .extends
                .iter()
                .map(|t| self.generic_type(t, &scope))
                .collect::<Result<Vec<_>, _>>()?;
            self.model.define_class(&class.name, type_params, mul_params, generalizations);
        }
        Ok(())
    }

    fn functions(&mut self, functions: &[TomlFunction]) -> Result<(), CompileError> {
        let mut bodies = Vec::new();
        for function in functions {
            if self.model.function_id(&function.name).is_some() {
                return Err(self.err(format!("function '{}' is declared twice", function.name)));
            }
            let type_params: Vec<TypeParamDecl> = function.type_params.iter().map(|p| TypeParamDecl::parse(p)).collect();
            let scope = Scope::new(&type_params, &function.mul_params);
            let params = function
                .params
                .iter()
                .map(|p| self.param(p, &scope))
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(untyped) = params.iter().find(|p| p.generic_type.is_none()) {
                return Err(self.err(format!(
                    "parameter '{}' of function '{}' needs a type",
                    untyped.name, function.name
                )));
            }
            let ftype = FunctionType {
                params,
                return_type: self.generic_type(&function.returns.ty, &scope)?,
                return_multiplicity: self.multiplicity(&function.returns.mul, &scope)?,
            };
            self.model.add_function(FunctionSig {
                name: function.name.clone(),
                kind: function.kind,
                type_params,
                mul_params: function.mul_params.clone(),
                ftype,
            });
            if let Some(body) = &function.body {
                bodies.push((function.name.clone(), body, scope));
            }
        }
        // Bodies may call functions declared after them.
        for (function, body, scope) in bodies {
            let body = body.iter().map(|e| self.expr(e, &scope)).collect::<Result<Vec<_>, _>>()?;
            self.program.bodies.push(FunctionBody { function, body });
        }
        Ok(())
    }

    fn param(&self, param: &TomlParam, scope: &Scope) -> Result<VarDecl, CompileError> {
        let Some(ty) = &param.ty else {
            return Ok(VarDecl::untyped(&param.name));
        };
        let multiplicity = self.multiplicity(param.mul.as_deref().unwrap_or("1"), scope)?;
        Ok(VarDecl::typed(&param.name, self.generic_type(ty, scope)?, multiplicity))
    }

    fn generic_type(&self, ty: &TomlType, scope: &Scope) -> Result<GenericType, CompileError> {
        match ty {
            TomlType::Name(name) => self.named_type(name, &[], &[], scope),
            TomlType::Generic { name, args, muls } => self.named_type(name, args, muls, scope),
            TomlType::Function { function } => {
                let params = function
                    .params
                    .iter()
                    .map(|p| self.param(p, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(GenericType::function(FunctionType {
                    params,
                    return_type: self.generic_type(&function.returns.ty, scope)?,
                    return_multiplicity: self.multiplicity(&function.returns.mul, scope)?,
                }))
            }
        }
    }

    fn named_type(
        &self,
        name: &str,
        args: &[TomlType],
        muls: &[String],
        scope: &Scope,
    ) -> Result<GenericType, CompileError> {
        if let Some(param) = scope.types.get(name) {
            if !args.is_empty() || !muls.is_empty() {
                return Err(self.err(format!("type parameter '{name}' cannot take arguments")));
            }
            return Ok(param.as_type());
        }
        let Some(id) = self.model.class_id(name) else {
            return Err(self.err(format!("unknown type '{name}'")));
        };
        let expected = self.model.class(id).map(|c| (c.type_params.len(), c.mul_params.len())).unwrap_or((0, 0));
        if (args.len(), muls.len()) != expected {
            return Err(self.err(format!(
                "class '{name}' takes {} type and {} multiplicity argument(s), got {} and {}",
                expected.0,
                expected.1,
                args.len(),
                muls.len()
            )));
        }
        let type_args = args.iter().map(|a| self.generic_type(a, scope)).collect::<Result<Vec<_>, _>>()?;
        let mul_args = muls.iter().map(|m| self.multiplicity(m, scope)).collect::<Result<Vec<_>, _>>()?;
        Ok(GenericType::generic(id, type_args, mul_args))
    }

    fn multiplicity(&self, text: &str, scope: &Scope) -> Result<Multiplicity, CompileError> {
        let multiplicity: Multiplicity = text.parse().map_err(|e: String| self.err(e))?;
        if let Some(name) = multiplicity.param_name()
            && !scope.muls.iter().any(|m| m == name)
        {
            return Err(self.err(format!("unknown multiplicity parameter '{name}'")));
        }
        Ok(multiplicity)
    }

    fn expr(&mut self, expr: &TomlExpr, scope: &Scope) -> Result<ExprId, CompileError> {
        let span = expr.span.map(Span::from).unwrap_or_else(Span::dummy);
        let kinds = [
            expr.literal.is_some(),
            expr.var.is_some(),
            expr.call.is_some(),
            expr.collection.is_some(),
            expr.lambda.is_some(),
        ];
        if kinds.iter().filter(|&&k| k).count() != 1 {
            return Err(self.err(format!(
                "expression at {span} must set exactly one of literal, var, call, collection, lambda"
            )));
        }

        if let Some(ty) = &expr.literal {
            let generic_type = self.generic_type(ty, scope)?;
            let multiplicity = self.multiplicity(expr.mul.as_deref().unwrap_or("1"), scope)?;
            return Ok(self.program.literal(generic_type, multiplicity, span));
        }
        if let Some(name) = &expr.var {
            return Ok(self.program.var(name, span));
        }
        if let Some(function) = &expr.call {
            let args = expr.args.iter().map(|a| self.expr(a, scope)).collect::<Result<Vec<_>, _>>()?;
            return Ok(self.program.call(function, args, span));
        }
        if let Some(elements) = &expr.collection {
            let elements = elements.iter().map(|e| self.expr(e, scope)).collect::<Result<Vec<_>, _>>()?;
            return Ok(self.program.collection(elements, span));
        }
        let Some(lambda) = &expr.lambda else {
            return Err(self.err("empty expression"));
        };
        let params = lambda
            .params
            .iter()
            .map(|p| self.param(p, scope))
            .collect::<Result<Vec<_>, _>>()?;
        let body = lambda.body.iter().map(|e| self.expr(e, scope)).collect::<Result<Vec<_>, _>>()?;
        Ok(self.program.lambda(params, body, span))
    }
}
