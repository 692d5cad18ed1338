//! Compiled units and their payloads
//!
//! A compiled unit is opaque to every transformation: its payload is an
//! encoded [`LocalProgram`] that only an executor looks inside. Payloads are
//! bincode-encoded so a unit is self-contained and can be handed over
//! verbatim.

use crate::building_block::{BlockKind, BuildingBlock, Comp};
use crate::tree;
use blake2::{Blake2s256, Digest};
use bytes::Bytes;
use compact_str::CompactString;
use fedcomp_core::{
    compilation_error, ExecutionError, FederatedResult, TensorKind, Type, TypeError,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque encoded payload of a compiled unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Payload(Bytes);

impl Payload {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Payload(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Short hex digest identifying the payload
    pub fn fingerprint(&self) -> String {
        let digest = Blake2s256::digest(self.0.as_ref());
        hex::encode(&digest[..4])
    }
}

/// Concrete values exchanged with an executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    Tuple(Vec<(Option<CompactString>, Value)>),
}

impl Value {
    /// Tuple of unnamed values
    pub fn tuple(values: impl IntoIterator<Item = Value>) -> Self {
        Value::Tuple(values.into_iter().map(|v| (None, v)).collect())
    }

    pub fn type_signature(&self) -> Type {
        match self {
            Value::Int32(_) => Type::tensor(TensorKind::Int32),
            Value::Int64(_) => Type::tensor(TensorKind::Int64),
            Value::Float32(_) => Type::tensor(TensorKind::Float32),
            Value::Float64(_) => Type::tensor(TensorKind::Float64),
            Value::Bool(_) => Type::tensor(TensorKind::Bool),
            Value::Tuple(elements) => Type::NamedTuple(
                elements
                    .iter()
                    .map(|(name, value)| (name.clone(), value.type_signature()))
                    .collect(),
            ),
        }
    }

    /// Element `index` of a tuple value
    pub fn element(&self, index: usize) -> Option<&Value> {
        match self {
            Value::Tuple(elements) => elements.get(index).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Tuple(elements) => {
                write!(f, "<")?;
                for (i, (name, value)) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    match name {
                        Some(name) => write!(f, "{name}={value}")?,
                        None => write!(f, "{value}")?,
                    }
                }
                write!(f, ">")
            }
        }
    }
}

/// Built-in binary arithmetic of type `(<T,T> -> T)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Add(TensorKind),
    Multiply(TensorKind),
    Maximum(TensorKind),
}

impl Primitive {
    fn kind(self) -> TensorKind {
        match self {
            Primitive::Add(kind) | Primitive::Multiply(kind) | Primitive::Maximum(kind) => kind,
        }
    }

    pub fn type_signature(self) -> Type {
        let operand = Type::tensor(self.kind());
        Type::function(Type::tuple([operand.clone(), operand.clone()]), operand)
    }

    /// Apply the operator to two operands of its tensor kind
    pub fn apply(self, lhs: &Value, rhs: &Value) -> Result<Value, ExecutionError> {
        macro_rules! arith {
            ($a:expr, $b:expr, $variant:ident) => {
                match self {
                    Primitive::Add(_) => Value::$variant($a + $b),
                    Primitive::Multiply(_) => Value::$variant($a * $b),
                    Primitive::Maximum(_) => Value::$variant(if $a >= $b { $a } else { $b }),
                }
            };
        }
        match (lhs, rhs) {
            (Value::Int32(a), Value::Int32(b)) => Ok(match self {
                Primitive::Add(_) => Value::Int32(a.wrapping_add(*b)),
                Primitive::Multiply(_) => Value::Int32(a.wrapping_mul(*b)),
                Primitive::Maximum(_) => Value::Int32(*a.max(b)),
            }),
            (Value::Int64(a), Value::Int64(b)) => Ok(match self {
                Primitive::Add(_) => Value::Int64(a.wrapping_add(*b)),
                Primitive::Multiply(_) => Value::Int64(a.wrapping_mul(*b)),
                Primitive::Maximum(_) => Value::Int64(*a.max(b)),
            }),
            (Value::Float32(a), Value::Float32(b)) => Ok(arith!(*a, *b, Float32)),
            (Value::Float64(a), Value::Float64(b)) => Ok(arith!(*a, *b, Float64)),
            (Value::Bool(a), Value::Bool(b)) => Ok(match self {
                Primitive::Add(_) | Primitive::Maximum(_) => Value::Bool(*a || *b),
                Primitive::Multiply(_) => Value::Bool(*a && *b),
            }),
            _ => Err(ExecutionError::UnexpectedValue {
                expected: "two operands of one tensor kind",
                found: format!("{lhs} and {rhs}"),
            }),
        }
    }
}

/// What a compiled unit's payload encodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocalProgram {
    /// Niladic unit producing a constant
    Constant(Value),
    /// Built-in binary operator
    Primitive(Primitive),
    /// Local IR tree: no placed types, no intrinsics, no unbound references
    Expression(Comp),
}

impl LocalProgram {
    pub fn encode(&self) -> FederatedResult<Payload> {
        bincode::serialize(self)
            .map(Payload::from_bytes)
            .map_err(|e| compilation_error(format!("failed to encode compiled unit: {e}")))
    }

    pub fn decode(payload: &Payload) -> Result<Self, ExecutionError> {
        bincode::deserialize(payload.as_bytes()).map_err(|e| ExecutionError::MalformedPayload {
            message: e.to_string(),
        })
    }
}

/// Niladic unit returning `value`
pub fn compiled_constant(value: Value) -> FederatedResult<Comp> {
    let ty = Type::niladic(value.type_signature());
    BuildingBlock::compiled_unit(ty, LocalProgram::Constant(value).encode()?)
}

/// Unit computing a binary primitive
pub fn compiled_primitive(primitive: Primitive) -> FederatedResult<Comp> {
    BuildingBlock::compiled_unit(
        primitive.type_signature(),
        LocalProgram::Primitive(primitive).encode()?,
    )
}

/// Identity unit over `ty`
pub fn compiled_identity(ty: Type) -> FederatedResult<Comp> {
    let identity = BuildingBlock::lambda("x", ty.clone(), BuildingBlock::reference("x", ty));
    compile_local(&identity)
}

/// Compile a local tree into a single unit.
///
/// A function-typed tree keeps its type; a value-typed tree becomes a
/// niladic unit producing that value. The tree must be closed and free of
/// placed types and intrinsics.
pub fn compile_local(tree_root: &Comp) -> FederatedResult<Comp> {
    let unbound = tree::unbound_references(tree_root);
    if !unbound.is_empty() {
        return Err(compilation_error(format!(
            "cannot compile a computation with unbound references {:?}: {tree_root}",
            unbound.keys().map(|n| n.as_str()).collect::<Vec<_>>()
        )));
    }
    let non_local = tree::find(tree_root, &mut |node: &Comp| {
        matches!(node.kind(), BlockKind::Intrinsic { .. })
            || node.type_signature().contains_placement()
    });
    if let Some(node) = non_local {
        return Err(TypeError::UnexpectedNode {
            expected: "a local computation without placements or intrinsics",
            found: node.to_string(),
        }
        .into());
    }
    let ty = if tree_root.type_signature().is_function() {
        tree_root.type_signature().clone()
    } else {
        Type::niladic(tree_root.type_signature().clone())
    };
    BuildingBlock::compiled_unit(ty, LocalProgram::Expression(tree_root.clone()).encode()?)
}
