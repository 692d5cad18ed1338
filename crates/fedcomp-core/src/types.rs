//! Type descriptors for federated computations
//!
//! Types are immutable and compared structurally. A placed type carries the
//! placement of its value (clients or server) and an all-equal bit that
//! hints whether every participant holds the same value.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element kind of a tensor type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TensorKind {
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
}

impl TensorKind {
    /// Name used when rendering types
    pub fn as_str(self) -> &'static str {
        match self {
            TensorKind::Int32 => "int32",
            TensorKind::Int64 => "int64",
            TensorKind::Float32 => "float32",
            TensorKind::Float64 => "float64",
            TensorKind::Bool => "bool",
        }
    }
}

impl fmt::Display for TensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a federated value lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Placement {
    /// The many participants
    Clients,
    /// The single coordinator
    Server,
}

impl Placement {
    /// The all-equal bit a placed type gets when none is given, which is
    /// also the canonical bit for the placement.
    pub fn default_all_equal(self) -> bool {
        matches!(self, Placement::Server)
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Clients => write!(f, "CLIENTS"),
            Placement::Server => write!(f, "SERVER"),
        }
    }
}

/// A named-tuple element: optional name plus type
pub type TupleElement = (Option<CompactString>, Type);

/// Type descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Tensor of a single element kind
    Tensor(TensorKind),
    /// Ordered, optionally named elements
    NamedTuple(Vec<TupleElement>),
    /// Function; an absent parameter is the niladic form
    Function {
        parameter: Option<Box<Type>>,
        result: Box<Type>,
    },
    /// Value placed at clients or server
    Placed {
        member: Box<Type>,
        placement: Placement,
        all_equal: bool,
    },
}

impl Type {
    /// Tensor type shorthand
    pub fn tensor(kind: TensorKind) -> Self {
        Type::Tensor(kind)
    }

    pub fn int32() -> Self {
        Type::Tensor(TensorKind::Int32)
    }

    pub fn float32() -> Self {
        Type::Tensor(TensorKind::Float32)
    }

    pub fn bool() -> Self {
        Type::Tensor(TensorKind::Bool)
    }

    /// Tuple with unnamed elements
    pub fn tuple(elements: impl IntoIterator<Item = Type>) -> Self {
        Type::NamedTuple(elements.into_iter().map(|t| (None, t)).collect())
    }

    /// Tuple with explicit (optional) names
    pub fn named_tuple<N: Into<CompactString>>(
        elements: impl IntoIterator<Item = (Option<N>, Type)>,
    ) -> Self {
        Type::NamedTuple(
            elements
                .into_iter()
                .map(|(name, ty)| (name.map(Into::into), ty))
                .collect(),
        )
    }

    /// Single-parameter function type
    pub fn function(parameter: Type, result: Type) -> Self {
        Type::Function {
            parameter: Some(Box::new(parameter)),
            result: Box::new(result),
        }
    }

    /// Niladic function type
    pub fn niladic(result: Type) -> Self {
        Type::Function {
            parameter: None,
            result: Box::new(result),
        }
    }

    /// Placed type with the placement's default all-equal bit
    pub fn placed(member: Type, placement: Placement) -> Self {
        Self::placed_with(member, placement, placement.default_all_equal())
    }

    /// Placed type with an explicit all-equal bit
    pub fn placed_with(member: Type, placement: Placement, all_equal: bool) -> Self {
        Type::Placed {
            member: Box::new(member),
            placement,
            all_equal,
        }
    }

    pub fn at_clients(member: Type) -> Self {
        Self::placed(member, Placement::Clients)
    }

    pub fn at_server(member: Type) -> Self {
        Self::placed(member, Placement::Server)
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function { .. })
    }

    pub fn is_placed(&self) -> bool {
        matches!(self, Type::Placed { .. })
    }

    /// Elements of a named tuple type
    pub fn tuple_elements(&self) -> Option<&[TupleElement]> {
        match self {
            Type::NamedTuple(elements) => Some(elements),
            _ => None,
        }
    }

    /// `(parameter, result)` of a function type
    pub fn function_parts(&self) -> Option<(Option<&Type>, &Type)> {
        match self {
            Type::Function { parameter, result } => Some((parameter.as_deref(), result)),
            _ => None,
        }
    }

    /// `(member, placement, all_equal)` of a placed type
    pub fn placed_parts(&self) -> Option<(&Type, Placement, bool)> {
        match self {
            Type::Placed {
                member,
                placement,
                all_equal,
            } => Some((member, *placement, *all_equal)),
            _ => None,
        }
    }

    /// Replace every placed type by its member type, recursively
    pub fn strip_placement(&self) -> Type {
        match self {
            Type::Tensor(_) => self.clone(),
            Type::NamedTuple(elements) => Type::NamedTuple(
                elements
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.strip_placement()))
                    .collect(),
            ),
            Type::Function { parameter, result } => Type::Function {
                parameter: parameter.as_ref().map(|p| Box::new(p.strip_placement())),
                result: Box::new(result.strip_placement()),
            },
            Type::Placed { member, .. } => member.strip_placement(),
        }
    }

    /// Whether any placed type occurs anywhere inside this type
    pub fn contains_placement(&self) -> bool {
        match self {
            Type::Tensor(_) => false,
            Type::NamedTuple(elements) => elements.iter().any(|(_, ty)| ty.contains_placement()),
            Type::Function { parameter, result } => {
                parameter.as_ref().is_some_and(|p| p.contains_placement())
                    || result.contains_placement()
            }
            Type::Placed { .. } => true,
        }
    }

    /// Rewrite every all-equal bit to the canonical value for its placement
    pub fn normalize_all_equal(&self) -> Type {
        match self {
            Type::Tensor(_) => self.clone(),
            Type::NamedTuple(elements) => Type::NamedTuple(
                elements
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.normalize_all_equal()))
                    .collect(),
            ),
            Type::Function { parameter, result } => Type::Function {
                parameter: parameter
                    .as_ref()
                    .map(|p| Box::new(p.normalize_all_equal())),
                result: Box::new(result.normalize_all_equal()),
            },
            Type::Placed {
                member, placement, ..
            } => Type::placed(member.normalize_all_equal(), *placement),
        }
    }

    /// Whether a value of `source` may be used where `self` is expected
    pub fn is_assignable_from(&self, source: &Type) -> bool {
        match (self, source) {
            (Type::Tensor(a), Type::Tensor(b)) => a == b,
            (Type::NamedTuple(targets), Type::NamedTuple(sources)) => {
                targets.len() == sources.len()
                    && targets.iter().zip(sources).all(|((tn, tt), (sn, st))| {
                        let names_agree = match (tn, sn) {
                            (Some(a), Some(b)) => a == b,
                            _ => true,
                        };
                        names_agree && tt.is_assignable_from(st)
                    })
            }
            (
                Type::Function {
                    parameter: tp,
                    result: tr,
                },
                Type::Function {
                    parameter: sp,
                    result: sr,
                },
            ) => {
                let parameters_agree = match (tp, sp) {
                    (None, None) => true,
                    (Some(t), Some(s)) => s.is_assignable_from(t),
                    _ => false,
                };
                parameters_agree && tr.is_assignable_from(sr)
            }
            (
                Type::Placed {
                    member: tm,
                    placement: tp,
                    all_equal: ta,
                },
                Type::Placed {
                    member: sm,
                    placement: sp,
                    all_equal: sa,
                },
            ) => tp == sp && (!ta || *sa) && tm.is_assignable_from(sm),
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Tensor(kind) => write!(f, "{kind}"),
            Type::NamedTuple(elements) => {
                write!(f, "<")?;
                for (i, (name, ty)) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    match name {
                        Some(name) => write!(f, "{name}={ty}")?,
                        None => write!(f, "{ty}")?,
                    }
                }
                write!(f, ">")
            }
            Type::Function { parameter, result } => match parameter {
                Some(parameter) => write!(f, "({parameter} -> {result})"),
                None => write!(f, "( -> {result})"),
            },
            Type::Placed {
                member,
                placement,
                all_equal,
            } => {
                if *all_equal {
                    write!(f, "{member}@{placement}")
                } else {
                    write!(f, "{{{member}}}@{placement}")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
