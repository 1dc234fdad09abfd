use std::collections::{HashSet, VecDeque};

use super::types::{FunctionType, GenericType, MulMap, Multiplicity, RawType, TypeId, TypeMap, VarDecl};
use super::Model;

/// Operations on generic types and multiplicities the inference engine
/// consumes. The engine never inspects class hierarchies directly.
pub trait TypeAlgebra {
    /// Join (covariant) or meet (contravariant) of the given types.
    fn best_common_type(&self, types: &[GenericType], covariant: bool) -> GenericType;

    fn subtype_of(&self, sub: &RawType, sup: &RawType) -> bool;

    /// Re-express `source` in terms of the supertype `target`, substituting
    /// type and multiplicity arguments along the inheritance path.
    fn resolve_via_inheritance(&self, source: &GenericType, target: &RawType) -> Option<GenericType>;

    fn min_subsuming(&self, a: &Multiplicity, b: &Multiplicity) -> Multiplicity {
        a.min_subsuming(b)
    }

    fn is_top(&self, raw: &RawType) -> bool;

    fn is_bottom(&self, raw: &RawType) -> bool;

    /// True for function raw types and for every class below `Function`.
    fn is_function_class(&self, raw: &RawType) -> bool;

    fn print_type(&self, t: &GenericType) -> String;

    fn print_function_type(&self, f: &FunctionType) -> String;
}

/// Substitute known parameter values into `t`. A parameter mapped to itself is
/// left alone; unknown parameters stay as references.
pub fn make_type_as_concrete_as_possible(t: &GenericType, types: &TypeMap, muls: &MulMap) -> GenericType {
    match &t.raw {
        RawType::Param { name, .. } => match types.get(name) {
            Some(value) if value != t => value.clone(),
            _ => t.clone(),
        },
        RawType::Class(id) => GenericType {
            raw: RawType::Class(*id),
            type_args: t.type_args.iter().map(|a| make_type_as_concrete_as_possible(a, types, muls)).collect(),
            mul_args: t.mul_args.iter().map(|m| make_multiplicity_as_concrete_as_possible(m, muls)).collect(),
        },
        RawType::Function(f) => GenericType {
            raw: RawType::Function(Box::new(make_function_as_concrete_as_possible(f, types, muls))),
            type_args: t.type_args.iter().map(|a| make_type_as_concrete_as_possible(a, types, muls)).collect(),
            mul_args: t.mul_args.iter().map(|m| make_multiplicity_as_concrete_as_possible(m, muls)).collect(),
        },
    }
}

pub fn make_multiplicity_as_concrete_as_possible(m: &Multiplicity, muls: &MulMap) -> Multiplicity {
    match m {
        Multiplicity::Param(name) => muls.get(name).cloned().unwrap_or_else(|| m.clone()),
        Multiplicity::Range { .. } => m.clone(),
    }
}

fn make_function_as_concrete_as_possible(f: &FunctionType, types: &TypeMap, muls: &MulMap) -> FunctionType {
    FunctionType {
        params: f
            .params
            .iter()
            .map(|p| VarDecl {
                name: p.name.clone(),
                generic_type: p.generic_type.as_ref().map(|t| make_type_as_concrete_as_possible(t, types, muls)),
                multiplicity: p.multiplicity.as_ref().map(|m| make_multiplicity_as_concrete_as_possible(m, muls)),
            })
            .collect(),
        return_type: make_type_as_concrete_as_possible(&f.return_type, types, muls),
        return_multiplicity: make_multiplicity_as_concrete_as_possible(&f.return_multiplicity, muls),
    }
}

impl Model {
    /// Breadth-first ancestors of a class, the class itself first.
    fn ancestors(&self, id: TypeId) -> Vec<TypeId> {
        let mut seen = HashSet::from([id]);
        let mut order = vec![id];
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            let Some(class) = self.class(current) else { continue };
            for general in &class.generalizations {
                if let Some(parent) = general.class_id()
                    && seen.insert(parent)
                {
                    order.push(parent);
                    queue.push_back(parent);
                }
            }
        }
        if !seen.contains(&TypeId::ANY) {
            order.push(TypeId::ANY);
        }
        order
    }

    /// Map a class's declared parameters onto the arguments of `t`.
    fn parameter_maps(&self, t: &GenericType) -> (TypeMap, MulMap) {
        let mut types = TypeMap::new();
        let mut muls = MulMap::new();
        if let Some(class) = t.class_id().and_then(|id| self.class(id)) {
            for (param, arg) in class.type_params.iter().zip(&t.type_args) {
                types.insert(param.name.clone(), arg.clone());
            }
            for (param, arg) in class.mul_params.iter().zip(&t.mul_args) {
                muls.insert(param.clone(), arg.clone());
            }
        }
        (types, muls)
    }

    fn join(&self, types: &[GenericType]) -> GenericType {
        let inputs: Vec<&GenericType> = types.iter().filter(|t| !self.is_bottom(&t.raw)).collect();
        let Some(first) = inputs.first() else {
            return GenericType::nil();
        };
        if inputs.iter().all(|t| t == first) {
            return (*first).clone();
        }
        if inputs.iter().any(|t| self.is_top(&t.raw)) {
            return GenericType::any();
        }
        if inputs.iter().all(|t| matches!(t.raw, RawType::Function(_))) {
            return self.join_functions(&inputs).unwrap_or_else(GenericType::any);
        }
        let Some(first_id) = first.class_id() else {
            return GenericType::any();
        };
        let common = self
            .ancestors(first_id)
            .into_iter()
            .find(|candidate| inputs.iter().all(|t| self.subtype_of(&t.raw, &RawType::Class(*candidate))));
        let Some(common) = common else {
            return GenericType::any();
        };
        let target = RawType::Class(common);
        let aligned: Option<Vec<GenericType>> =
            inputs.iter().map(|t| self.resolve_via_inheritance(t, &target)).collect();
        let Some(aligned) = aligned else {
            return GenericType::any();
        };
        let Some(class) = self.class(common) else {
            return GenericType::any();
        };

        let mut type_args = Vec::new();
        for (i, param) in class.type_params.iter().enumerate() {
            let column: Option<Vec<GenericType>> = aligned.iter().map(|t| t.type_args.get(i).cloned()).collect();
            match column {
                Some(column) => type_args.push(self.best_common_type(&column, !param.contravariant)),
                None => break,
            }
        }
        if type_args.len() != class.type_params.len() {
            type_args.clear();
        }
        let mut mul_args = Vec::new();
        for i in 0..class.mul_params.len() {
            let column: Option<Vec<&Multiplicity>> = aligned.iter().map(|t| t.mul_args.get(i)).collect();
            let Some((head, rest)) = column.as_deref().and_then(|c| c.split_first()) else {
                mul_args.clear();
                break;
            };
            mul_args.push(rest.iter().fold((*head).clone(), |acc, m| acc.min_subsuming(m)));
        }
        GenericType::generic(common, type_args, mul_args)
    }

    /// Parameters meet, returns join. Mismatched arity gives up.
    fn join_functions(&self, inputs: &[&GenericType]) -> Option<GenericType> {
        let fns: Vec<&FunctionType> = inputs
            .iter()
            .filter_map(|t| match &t.raw {
                RawType::Function(f) => Some(f.as_ref()),
                _ => None,
            })
            .collect();
        let first = fns.first()?;
        if fns.iter().any(|f| f.params.len() != first.params.len()) {
            return None;
        }
        let mut params = Vec::with_capacity(first.params.len());
        for (i, param) in first.params.iter().enumerate() {
            let types: Option<Vec<GenericType>> = fns.iter().map(|f| f.params[i].generic_type.clone()).collect();
            let muls: Option<Vec<Multiplicity>> = fns.iter().map(|f| f.params[i].multiplicity.clone()).collect();
            let (types, muls) = (types?, muls?);
            let (head, rest) = muls.split_first()?;
            params.push(VarDecl {
                name: param.name.clone(),
                generic_type: Some(self.best_common_type(&types, false)),
                multiplicity: Some(rest.iter().fold(head.clone(), |acc, m| acc.min_subsuming(m))),
            });
        }
        let returns: Vec<GenericType> = fns.iter().map(|f| f.return_type.clone()).collect();
        let return_multiplicity = fns
            .iter()
            .skip(1)
            .fold(first.return_multiplicity.clone(), |acc, f| acc.min_subsuming(&f.return_multiplicity));
        Some(GenericType::function(FunctionType {
            params,
            return_type: self.best_common_type(&returns, true),
            return_multiplicity,
        }))
    }

    fn meet(&self, types: &[GenericType]) -> GenericType {
        let inputs: Vec<&GenericType> = types.iter().filter(|t| !self.is_top(&t.raw)).collect();
        let Some(first) = inputs.first() else {
            return GenericType::any();
        };
        if inputs.iter().all(|t| t == first) {
            return (*first).clone();
        }
        inputs
            .iter()
            .find(|candidate| inputs.iter().all(|t| self.subtype_of(&candidate.raw, &t.raw)))
            .map(|t| (*t).clone())
            .unwrap_or_else(GenericType::nil)
    }
}

impl TypeAlgebra for Model {
    fn best_common_type(&self, types: &[GenericType], covariant: bool) -> GenericType {
        let Some(first) = types.first() else {
            return if covariant { GenericType::nil() } else { GenericType::any() };
        };
        if types.iter().any(|t| !t.is_concrete()) {
            if types.iter().all(|t| t == first) {
                return first.clone();
            }
            return if covariant { GenericType::any() } else { GenericType::nil() };
        }
        if covariant { self.join(types) } else { self.meet(types) }
    }

    fn subtype_of(&self, sub: &RawType, sup: &RawType) -> bool {
        if sub == sup || self.is_top(sup) || self.is_bottom(sub) {
            return true;
        }
        match (sub, sup) {
            (RawType::Class(a), RawType::Class(b)) => self.ancestors(*a).contains(b),
            (RawType::Function(_), RawType::Class(b)) => *b == TypeId::FUNCTION,
            _ => false,
        }
    }

    fn resolve_via_inheritance(&self, source: &GenericType, target: &RawType) -> Option<GenericType> {
        if &source.raw == target {
            return Some(source.clone());
        }
        if self.is_top(target) {
            return Some(GenericType::any());
        }
        if let (RawType::Function(_), RawType::Class(TypeId::FUNCTION)) = (&source.raw, target) {
            return Some(GenericType::generic(TypeId::FUNCTION, vec![source.clone()], vec![]));
        }
        let start = source.class_id()?;
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([source.clone()]);
        while let Some(current) = queue.pop_front() {
            if &current.raw == target {
                return Some(current);
            }
            let Some(class) = current.class_id().and_then(|id| self.class(id)) else { continue };
            let (types, muls) = self.parameter_maps(&current);
            for general in &class.generalizations {
                if let Some(id) = general.class_id()
                    && seen.insert(id)
                {
                    queue.push_back(make_type_as_concrete_as_possible(general, &types, &muls));
                }
            }
        }
        None
    }

    fn is_top(&self, raw: &RawType) -> bool {
        *raw == RawType::Class(TypeId::ANY)
    }

    fn is_bottom(&self, raw: &RawType) -> bool {
        *raw == RawType::Class(TypeId::NIL)
    }

    fn is_function_class(&self, raw: &RawType) -> bool {
        match raw {
            RawType::Function(_) => true,
            RawType::Class(id) => *id != TypeId::NIL && self.ancestors(*id).contains(&TypeId::FUNCTION),
            RawType::Param { .. } => false,
        }
    }

    fn print_type(&self, t: &GenericType) -> String {
        Model::print_type(self, t)
    }

    fn print_function_type(&self, f: &FunctionType) -> String {
        Model::print_function_type(self, f)
    }
}
