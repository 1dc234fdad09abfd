//! Arena of class definitions and function signatures the inference engine
//! reads. Everything is addressed by index so types can refer to their own
//! class (or to each other) without shared ownership.

pub mod algebra;
pub mod program;
pub mod types;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use algebra::TypeAlgebra;
pub use types::{FunctionType, GenericType, Multiplicity, MulMap, RawType, TypeId, TypeMap, VarDecl};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeParamDecl {
    pub name: String,
    pub contravariant: bool,
}

impl TypeParamDecl {
    pub fn covariant(name: impl Into<String>) -> Self {
        Self { name: name.into(), contravariant: false }
    }

    /// Parses the `-T` shorthand for a contravariant parameter.
    pub fn parse(decl: &str) -> Self {
        match decl.trim().strip_prefix('-') {
            Some(name) => Self { name: name.trim().to_string(), contravariant: true },
            None => Self::covariant(decl.trim()),
        }
    }

    /// The parameter as a type reference, carrying its variance.
    pub fn as_type(&self) -> GenericType {
        if self.contravariant {
            GenericType::contravariant_param(&self.name)
        } else {
            GenericType::param(&self.name)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub type_params: Vec<TypeParamDecl>,
    pub mul_params: Vec<String>,
    /// Direct supertypes, expressed over this class's own parameters.
    pub generalizations: Vec<GenericType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    Function,
    /// Derived property on a class. Its type parameters are fixed where the
    /// property is defined, so call sites do not record inferred bindings.
    QualifiedProperty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

#[derive(Debug, Clone)]
pub struct FunctionSig {
    pub name: String,
    pub kind: FunctionKind,
    pub type_params: Vec<TypeParamDecl>,
    pub mul_params: Vec<String>,
    pub ftype: FunctionType,
}

/// Something that declares type and multiplicity parameters and can therefore
/// seed the root of an inference context chain.
pub trait DeclaresParameters {
    fn declared_type_params(&self) -> &[TypeParamDecl];
    fn declared_mul_params(&self) -> &[String];
}

impl DeclaresParameters for FunctionSig {
    fn declared_type_params(&self) -> &[TypeParamDecl] {
        &self.type_params
    }

    fn declared_mul_params(&self) -> &[String] {
        &self.mul_params
    }
}

impl DeclaresParameters for ClassDef {
    fn declared_type_params(&self) -> &[TypeParamDecl] {
        &self.type_params
    }

    fn declared_mul_params(&self) -> &[String] {
        &self.mul_params
    }
}

#[derive(Debug, Clone)]
pub struct Model {
    classes: Vec<ClassDef>,
    class_names: HashMap<String, TypeId>,
    functions: Vec<FunctionSig>,
    function_names: HashMap<String, FunctionId>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    /// A model holding only the built-in classes.
    pub fn new() -> Self {
        let mut model = Self {
            classes: Vec::new(),
            class_names: HashMap::new(),
            functions: Vec::new(),
            function_names: HashMap::new(),
        };
        model.bootstrap();
        model
    }

    fn bootstrap(&mut self) {
        let t = || vec![TypeParamDecl::covariant("T")];
        let number = GenericType::class(TypeId::NUMBER);
        let builtins: [(&str, Vec<TypeParamDecl>, Vec<GenericType>); 13] = [
            ("Any", vec![], vec![]),
            ("Nil", vec![], vec![]),
            ("String", vec![], vec![]),
            ("Boolean", vec![], vec![]),
            ("Number", vec![], vec![]),
            ("Integer", vec![], vec![number.clone()]),
            ("Float", vec![], vec![number.clone()]),
            ("Decimal", vec![], vec![number]),
            ("Date", vec![], vec![]),
            ("List", t(), vec![]),
            ("Function", t(), vec![]),
            (
                "LambdaFunction",
                t(),
                vec![GenericType::generic(TypeId::FUNCTION, vec![GenericType::param("T")], vec![])],
            ),
            ("Pair", vec![TypeParamDecl::covariant("U"), TypeParamDecl::covariant("V")], vec![]),
        ];
        for (name, type_params, generalizations) in builtins {
            self.define_class(name, type_params, Vec::new(), generalizations);
        }
    }

    /// Reserve a class slot so generalizations can refer to classes declared later.
    pub fn declare_class(&mut self, name: &str) -> TypeId {
        if let Some(id) = self.class_names.get(name) {
            return *id;
        }
        let id = TypeId(self.classes.len() as u32);
        self.classes.push(ClassDef {
            name: name.to_string(),
            type_params: Vec::new(),
            mul_params: Vec::new(),
            generalizations: Vec::new(),
        });
        self.class_names.insert(name.to_string(), id);
        id
    }

    pub fn define_class(
        &mut self,
        name: &str,
        type_params: Vec<TypeParamDecl>,
        mul_params: Vec<String>,
        generalizations: Vec<GenericType>,
    ) -> TypeId {
        let id = self.declare_class(name);
        let class = &mut self.classes[id.index()];
        class.type_params = type_params;
        class.mul_params = mul_params;
        class.generalizations = generalizations;
        id
    }

    pub fn class(&self, id: TypeId) -> Option<&ClassDef> {
        self.classes.get(id.index())
    }

    pub fn class_id(&self, name: &str) -> Option<TypeId> {
        self.class_names.get(name).copied()
    }

    pub fn class_name(&self, id: TypeId) -> &str {
        self.class(id).map(|c| c.name.as_str()).unwrap_or("?")
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn add_function(&mut self, sig: FunctionSig) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.function_names.insert(sig.name.clone(), id);
        self.functions.push(sig);
        id
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionSig> {
        self.functions.get(id.0 as usize)
    }

    pub fn function_id(&self, name: &str) -> Option<FunctionId> {
        self.function_names.get(name).copied()
    }

    pub fn function_by_name(&self, name: &str) -> Option<&FunctionSig> {
        self.function_id(name).and_then(|id| self.function(id))
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionSig> {
        self.functions.iter()
    }

    // ---- Printing ----

    pub fn print_type(&self, t: &GenericType) -> String {
        let mut out = String::new();
        self.write_type(&mut out, t);
        out
    }

    pub fn print_function_type(&self, f: &FunctionType) -> String {
        let mut out = String::new();
        self.write_function_type(&mut out, f);
        out
    }

    fn write_type(&self, out: &mut String, t: &GenericType) {
        match &t.raw {
            RawType::Param { name, .. } => out.push_str(name),
            RawType::Class(id) => out.push_str(self.class_name(*id)),
            RawType::Function(f) => self.write_function_type(out, f),
        }
        if t.type_args.is_empty() && t.mul_args.is_empty() {
            return;
        }
        out.push('<');
        for (i, arg) in t.type_args.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write_type(out, arg);
        }
        if !t.mul_args.is_empty() {
            out.push('|');
            let muls: Vec<String> = t
                .mul_args
                .iter()
                .map(|m| match m {
                    Multiplicity::Param(name) => name.clone(),
                    other => other.to_string().trim_matches(['[', ']']).to_string(),
                })
                .collect();
            out.push_str(&muls.join(", "));
        }
        out.push('>');
    }

    fn write_function_type(&self, out: &mut String, f: &FunctionType) {
        out.push('{');
        for (i, param) in f.params.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            match &param.generic_type {
                Some(t) => self.write_type(out, t),
                None => out.push('?'),
            }
            match &param.multiplicity {
                Some(m) => out.push_str(&m.to_string()),
                None => out.push_str("[?]"),
            }
        }
        out.push_str("->");
        self.write_type(out, &f.return_type);
        out.push_str(&f.return_multiplicity.to_string());
        out.push('}');
    }
}
