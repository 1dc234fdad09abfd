use serde::{Deserialize, Serialize};

use crate::span::Span;

use super::types::{FunctionType, GenericType, Multiplicity, TypeId, VarDecl};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LambdaId(pub u32);

/// Bindings inferred for one call site, in the declaration order of the
/// called function's parameters. Written once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallSiteBindings {
    pub types: Vec<(String, GenericType)>,
    pub multiplicities: Vec<(String, Multiplicity)>,
}

impl CallSiteBindings {
    pub fn type_binding(&self, name: &str) -> Option<&GenericType> {
        self.types.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn multiplicity_binding(&self, name: &str) -> Option<&Multiplicity> {
        self.multiplicities.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// A value whose type and multiplicity are given up front.
    Literal,
    Var(String),
    Collection(Vec<ExprId>),
    Call { function: String, args: Vec<ExprId> },
    Lambda(LambdaId),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub generic_type: Option<GenericType>,
    pub multiplicity: Option<Multiplicity>,
    pub resolved: Option<CallSiteBindings>,
}

impl Expr {
    pub fn is_typed(&self) -> bool {
        self.generic_type.is_some() && self.multiplicity.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Lambda {
    /// Parameters may be untyped until inferred from the expected function type.
    pub params: Vec<VarDecl>,
    pub body: Vec<ExprId>,
    pub return_type: Option<GenericType>,
    pub return_multiplicity: Option<Multiplicity>,
    /// The expression node holding this lambda.
    pub expr: ExprId,
}

impl Lambda {
    pub fn has_untyped_params(&self) -> bool {
        self.params.iter().any(|p| p.generic_type.is_none() || p.multiplicity.is_none())
    }

    /// Known once the body has been processed.
    pub fn function_type(&self) -> Option<FunctionType> {
        Some(FunctionType {
            params: self.params.clone(),
            return_type: self.return_type.clone()?,
            return_multiplicity: self.return_multiplicity.clone()?,
        })
    }

    /// `LambdaFunction<{..}>`, the type of the lambda as a value.
    pub fn value_type(&self) -> Option<GenericType> {
        self.function_type()
            .map(|f| GenericType::generic(TypeId::LAMBDA_FUNCTION, vec![GenericType::function(f)], vec![]))
    }
}

#[derive(Debug, Clone)]
pub struct FunctionBody {
    pub function: String,
    pub body: Vec<ExprId>,
}

/// Expression arena: function bodies plus top-level expressions that run
/// without an enclosing function.
#[derive(Debug, Clone, Default)]
pub struct Program {
    exprs: Vec<Expr>,
    lambdas: Vec<Lambda>,
    pub bodies: Vec<FunctionBody>,
    pub top_level: Vec<ExprId>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: ExprKind, span: Span, typed: Option<(GenericType, Multiplicity)>) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        let (generic_type, multiplicity) = match typed {
            Some((t, m)) => (Some(t), Some(m)),
            None => (None, None),
        };
        self.exprs.push(Expr { kind, span, generic_type, multiplicity, resolved: None });
        id
    }

    pub fn literal(&mut self, generic_type: GenericType, multiplicity: Multiplicity, span: Span) -> ExprId {
        self.push(ExprKind::Literal, span, Some((generic_type, multiplicity)))
    }

    pub fn var(&mut self, name: impl Into<String>, span: Span) -> ExprId {
        self.push(ExprKind::Var(name.into()), span, None)
    }

    pub fn collection(&mut self, elements: Vec<ExprId>, span: Span) -> ExprId {
        self.push(ExprKind::Collection(elements), span, None)
    }

    pub fn call(&mut self, function: impl Into<String>, args: Vec<ExprId>, span: Span) -> ExprId {
        self.push(ExprKind::Call { function: function.into(), args }, span, None)
    }

    pub fn lambda(&mut self, params: Vec<VarDecl>, body: Vec<ExprId>, span: Span) -> ExprId {
        let id = LambdaId(self.lambdas.len() as u32);
        let expr = ExprId(self.exprs.len() as u32);
        self.lambdas.push(Lambda { params, body, return_type: None, return_multiplicity: None, expr });
        self.push(ExprKind::Lambda(id), span, None)
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.0 as usize]
    }

    pub fn lambda_def(&self, id: LambdaId) -> &Lambda {
        &self.lambdas[id.0 as usize]
    }

    pub fn lambda_def_mut(&mut self, id: LambdaId) -> &mut Lambda {
        &mut self.lambdas[id.0 as usize]
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    /// Every call expression in arena order.
    pub fn calls(&self) -> impl Iterator<Item = (ExprId, &Expr)> {
        self.exprs
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e.kind, ExprKind::Call { .. }))
            .map(|(i, e)| (ExprId(i as u32), e))
    }
}
