use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Index of a class in the model arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const ANY: TypeId = TypeId(0);
    pub const NIL: TypeId = TypeId(1);
    pub const STRING: TypeId = TypeId(2);
    pub const BOOLEAN: TypeId = TypeId(3);
    pub const NUMBER: TypeId = TypeId(4);
    pub const INTEGER: TypeId = TypeId(5);
    pub const FLOAT: TypeId = TypeId(6);
    pub const DECIMAL: TypeId = TypeId(7);
    pub const DATE: TypeId = TypeId(8);
    pub const LIST: TypeId = TypeId(9);
    pub const FUNCTION: TypeId = TypeId(10);
    pub const LAMBDA_FUNCTION: TypeId = TypeId(11);
    pub const PAIR: TypeId = TypeId(12);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Resolved parameter values keyed by parameter name.
pub type TypeMap = BTreeMap<String, GenericType>;
pub type MulMap = BTreeMap<String, Multiplicity>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawType {
    /// Reference to a named type parameter. `contravariant` mirrors the
    /// declaring site's variance so merges can honor it.
    Param { name: String, contravariant: bool },
    Class(TypeId),
    Function(Box<FunctionType>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenericType {
    pub raw: RawType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_args: Vec<GenericType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mul_args: Vec<Multiplicity>,
}

impl GenericType {
    pub fn class(id: TypeId) -> Self {
        Self { raw: RawType::Class(id), type_args: Vec::new(), mul_args: Vec::new() }
    }

    pub fn generic(id: TypeId, type_args: Vec<GenericType>, mul_args: Vec<Multiplicity>) -> Self {
        Self { raw: RawType::Class(id), type_args, mul_args }
    }

    pub fn param(name: impl Into<String>) -> Self {
        Self {
            raw: RawType::Param { name: name.into(), contravariant: false },
            type_args: Vec::new(),
            mul_args: Vec::new(),
        }
    }

    pub fn contravariant_param(name: impl Into<String>) -> Self {
        Self {
            raw: RawType::Param { name: name.into(), contravariant: true },
            type_args: Vec::new(),
            mul_args: Vec::new(),
        }
    }

    pub fn function(ftype: FunctionType) -> Self {
        Self { raw: RawType::Function(Box::new(ftype)), type_args: Vec::new(), mul_args: Vec::new() }
    }

    pub fn any() -> Self {
        Self::class(TypeId::ANY)
    }

    pub fn nil() -> Self {
        Self::class(TypeId::NIL)
    }

    /// Top-level concreteness: `List<T>` is concrete, `T` is not.
    pub fn is_concrete(&self) -> bool {
        !matches!(self.raw, RawType::Param { .. })
    }

    pub fn param_name(&self) -> Option<&str> {
        match &self.raw {
            RawType::Param { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Variance of a parameter reference; concrete types count as covariant.
    pub fn is_covariant(&self) -> bool {
        !matches!(self.raw, RawType::Param { contravariant: true, .. })
    }

    pub fn class_id(&self) -> Option<TypeId> {
        match self.raw {
            RawType::Class(id) => Some(id),
            _ => None,
        }
    }

    /// The function signature carried by this type: either a bare function raw
    /// type or the first argument of a function class such as `Function<{..}>`.
    pub fn as_function_type(&self) -> Option<&FunctionType> {
        match &self.raw {
            RawType::Function(f) => Some(f),
            RawType::Class(_) => match self.type_args.first().map(|a| &a.raw) {
                Some(RawType::Function(f)) => Some(f),
                _ => None,
            },
            RawType::Param { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub generic_type: Option<GenericType>,
    pub multiplicity: Option<Multiplicity>,
}

impl VarDecl {
    pub fn typed(name: impl Into<String>, generic_type: GenericType, multiplicity: Multiplicity) -> Self {
        Self { name: name.into(), generic_type: Some(generic_type), multiplicity: Some(multiplicity) }
    }

    pub fn untyped(name: impl Into<String>) -> Self {
        Self { name: name.into(), generic_type: None, multiplicity: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionType {
    pub params: Vec<VarDecl>,
    pub return_type: GenericType,
    pub return_multiplicity: Multiplicity,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Multiplicity {
    /// `upper == None` means unbounded.
    Range { lower: u32, upper: Option<u32> },
    Param(String),
}

impl Multiplicity {
    pub const PURE_ONE: Multiplicity = Multiplicity::Range { lower: 1, upper: Some(1) };
    pub const ZERO_ONE: Multiplicity = Multiplicity::Range { lower: 0, upper: Some(1) };
    pub const ZERO: Multiplicity = Multiplicity::Range { lower: 0, upper: Some(0) };
    pub const ZERO_MANY: Multiplicity = Multiplicity::Range { lower: 0, upper: None };
    pub const ONE_MANY: Multiplicity = Multiplicity::Range { lower: 1, upper: None };

    pub fn exactly(n: u32) -> Self {
        Multiplicity::Range { lower: n, upper: Some(n) }
    }

    pub fn param(name: impl Into<String>) -> Self {
        Multiplicity::Param(name.into())
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, Multiplicity::Range { .. })
    }

    pub fn param_name(&self) -> Option<&str> {
        match self {
            Multiplicity::Param(name) => Some(name),
            Multiplicity::Range { .. } => None,
        }
    }

    /// Narrowest range covering both. Parameters only subsume themselves;
    /// anything else widens to `[*]`.
    pub fn min_subsuming(&self, other: &Multiplicity) -> Multiplicity {
        match (self, other) {
            (
                Multiplicity::Range { lower: l1, upper: u1 },
                Multiplicity::Range { lower: l2, upper: u2 },
            ) => {
                let upper = match (u1, u2) {
                    (Some(a), Some(b)) => Some((*a).max(*b)),
                    _ => None,
                };
                Multiplicity::Range { lower: (*l1).min(*l2), upper }
            }
            (a, b) if a == b => a.clone(),
            _ => Multiplicity::ZERO_MANY,
        }
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Multiplicity::Param(name) => write!(f, "[{name}]"),
            Multiplicity::Range { lower: 0, upper: None } => write!(f, "[*]"),
            Multiplicity::Range { lower, upper: None } => write!(f, "[{lower}..*]"),
            Multiplicity::Range { lower, upper: Some(upper) } if lower == upper => write!(f, "[{lower}]"),
            Multiplicity::Range { lower, upper: Some(upper) } => write!(f, "[{lower}..{upper}]"),
        }
    }
}

impl FromStr for Multiplicity {
    type Err = String;

    /// Accepts `1`, `0..1`, `*`, `1..*`, `2`, or a parameter name such as `m`.
    /// Surrounding brackets are optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let text = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')).unwrap_or(text).trim();
        if text.is_empty() {
            return Err("empty multiplicity".to_string());
        }
        if text == "*" {
            return Ok(Multiplicity::ZERO_MANY);
        }
        let bound = |part: &str| -> Result<Option<u32>, String> {
            let part = part.trim();
            if part == "*" {
                return Ok(None);
            }
            part.parse::<u32>().map(Some).map_err(|_| format!("invalid multiplicity bound '{part}' in '{s}'"))
        };
        if let Some((lo, hi)) = text.split_once("..") {
            let lower = bound(lo)?.ok_or_else(|| format!("lower bound of '{s}' cannot be '*'"))?;
            let upper = bound(hi)?;
            if let Some(u) = upper
                && u < lower
            {
                return Err(format!("upper bound below lower bound in '{s}'"));
            }
            return Ok(Multiplicity::Range { lower, upper });
        }
        if text.chars().all(|c| c.is_ascii_digit()) {
            let n = bound(text)?.unwrap_or(0);
            return Ok(Multiplicity::exactly(n));
        }
        if text.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
            && text.chars().all(|c| c.is_alphanumeric() || c == '_')
        {
            return Ok(Multiplicity::Param(text.to_string()));
        }
        Err(format!("invalid multiplicity '{s}'"))
    }
}
