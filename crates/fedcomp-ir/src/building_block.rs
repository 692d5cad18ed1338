//! Building blocks: the federated computation IR
//!
//! A computation is an immutable tree of [`BuildingBlock`] nodes. Every node
//! carries its type signature, computed and checked when the node is built,
//! so a tree that exists is a well-typed tree. Children are shared through
//! [`Arc`]; transformations build new nodes and reuse untouched subtrees.

use crate::compiled::Payload;
use crate::intrinsics::IntrinsicUri;
use compact_str::CompactString;
use fedcomp_core::{FederatedResult, Type, TypeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Shared handle to a building block
pub type Comp = Arc<BuildingBlock>;

/// A tuple element: optional name plus value
pub type NamedElement = (Option<CompactString>, Comp);

/// One node of the IR together with its type signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingBlock {
    kind: BlockKind,
    type_signature: Type,
}

/// The node kinds of the IR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockKind {
    /// Occurrence of a bound variable
    Reference { name: CompactString },

    /// Single-argument function
    Lambda {
        parameter_name: CompactString,
        parameter_type: Type,
        result: Comp,
    },

    /// Function application; the argument is absent for niladic functions
    Call {
        function: Comp,
        argument: Option<Comp>,
    },

    /// Ordered, optionally named elements
    Tuple { elements: Vec<NamedElement> },

    /// Positional selection out of a tuple
    Selection { source: Comp, index: usize },

    /// Reference to a cross-placement primitive
    Intrinsic { uri: IntrinsicUri },

    /// Opaque local computation handed to an executor verbatim
    CompiledUnit { payload: Payload },
}

impl BlockKind {
    /// Human-readable kind name for diagnostics
    pub fn label(&self) -> &'static str {
        match self {
            BlockKind::Reference { .. } => "Reference",
            BlockKind::Lambda { .. } => "Lambda",
            BlockKind::Call { .. } => "Call",
            BlockKind::Tuple { .. } => "Tuple",
            BlockKind::Selection { .. } => "Selection",
            BlockKind::Intrinsic { .. } => "Intrinsic",
            BlockKind::CompiledUnit { .. } => "CompiledUnit",
        }
    }
}

impl BuildingBlock {
    /// Reference to `name`, declared with type `ty`
    pub fn reference(name: impl Into<CompactString>, ty: Type) -> Comp {
        Arc::new(BuildingBlock {
            kind: BlockKind::Reference { name: name.into() },
            type_signature: ty,
        })
    }

    /// Lambda binding `parameter_name` in `result`
    pub fn lambda(
        parameter_name: impl Into<CompactString>,
        parameter_type: Type,
        result: Comp,
    ) -> Comp {
        let type_signature = Type::function(parameter_type.clone(), result.type_signature.clone());
        Arc::new(BuildingBlock {
            kind: BlockKind::Lambda {
                parameter_name: parameter_name.into(),
                parameter_type,
                result,
            },
            type_signature,
        })
    }

    /// Call `function`, checking the argument against its parameter type
    pub fn call(function: Comp, argument: Option<Comp>) -> FederatedResult<Comp> {
        let Some((parameter, result)) = function.type_signature.function_parts() else {
            return Err(TypeError::NotAFunction {
                ty: function.type_signature.clone(),
            }
            .into());
        };
        match (parameter, &argument) {
            (None, None) => {}
            (Some(parameter), Some(argument)) => {
                if !parameter.is_assignable_from(&argument.type_signature) {
                    return Err(TypeError::Mismatch {
                        context: "call argument",
                        expected: parameter.clone(),
                        actual: argument.type_signature.clone(),
                    }
                    .into());
                }
            }
            (Some(_), None) => {
                return Err(TypeError::MissingArgument {
                    function: function.type_signature.clone(),
                }
                .into());
            }
            (None, Some(argument)) => {
                return Err(TypeError::UnexpectedArgument {
                    function: function.type_signature.clone(),
                    argument: argument.type_signature.clone(),
                }
                .into());
            }
        }
        let type_signature = result.clone();
        Ok(Arc::new(BuildingBlock {
            kind: BlockKind::Call { function, argument },
            type_signature,
        }))
    }

    /// Tuple of optionally named elements
    pub fn tuple(elements: Vec<NamedElement>) -> Comp {
        let type_signature = Type::NamedTuple(
            elements
                .iter()
                .map(|(name, element)| (name.clone(), element.type_signature.clone()))
                .collect(),
        );
        Arc::new(BuildingBlock {
            kind: BlockKind::Tuple { elements },
            type_signature,
        })
    }

    /// Tuple without element names
    pub fn unnamed_tuple(elements: impl IntoIterator<Item = Comp>) -> Comp {
        Self::tuple(elements.into_iter().map(|e| (None, e)).collect())
    }

    /// Select element `index` out of a tuple-typed `source`
    pub fn selection(source: Comp, index: usize) -> FederatedResult<Comp> {
        let Some(elements) = source.type_signature.tuple_elements() else {
            return Err(TypeError::NotATuple {
                ty: source.type_signature.clone(),
            }
            .into());
        };
        let Some((_, element_type)) = elements.get(index) else {
            return Err(TypeError::NonexistentIndex {
                index,
                ty: source.type_signature.clone(),
            }
            .into());
        };
        let type_signature = element_type.clone();
        Ok(Arc::new(BuildingBlock {
            kind: BlockKind::Selection { source, index },
            type_signature,
        }))
    }

    /// Intrinsic with its declared functional type
    pub fn intrinsic(uri: IntrinsicUri, ty: Type) -> Comp {
        Arc::new(BuildingBlock {
            kind: BlockKind::Intrinsic { uri },
            type_signature: ty,
        })
    }

    /// Compiled unit; the type must be a placement-free function type
    pub fn compiled_unit(ty: Type, payload: Payload) -> FederatedResult<Comp> {
        if !ty.is_function() {
            return Err(TypeError::NotAFunction { ty }.into());
        }
        if ty.contains_placement() {
            return Err(TypeError::UnexpectedNode {
                expected: "a placement-free type for a compiled unit",
                found: ty.to_string(),
            }
            .into());
        }
        Ok(Arc::new(BuildingBlock {
            kind: BlockKind::CompiledUnit { payload },
            type_signature: ty,
        }))
    }

    pub fn kind(&self) -> &BlockKind {
        &self.kind
    }

    pub fn type_signature(&self) -> &Type {
        &self.type_signature
    }

    /// Name of a reference node
    pub fn reference_name(&self) -> Option<&CompactString> {
        match &self.kind {
            BlockKind::Reference { name } => Some(name),
            _ => None,
        }
    }

    /// `(parameter_name, parameter_type, result)` of a lambda node
    pub fn lambda_parts(&self) -> Option<(&CompactString, &Type, &Comp)> {
        match &self.kind {
            BlockKind::Lambda {
                parameter_name,
                parameter_type,
                result,
            } => Some((parameter_name, parameter_type, result)),
            _ => None,
        }
    }

    /// `(function, argument)` of a call node
    pub fn call_parts(&self) -> Option<(&Comp, Option<&Comp>)> {
        match &self.kind {
            BlockKind::Call { function, argument } => Some((function, argument.as_ref())),
            _ => None,
        }
    }

    /// Payload of a compiled unit
    pub fn payload(&self) -> Option<&Payload> {
        match &self.kind {
            BlockKind::CompiledUnit { payload } => Some(payload),
            _ => None,
        }
    }

    pub fn is_lambda(&self) -> bool {
        matches!(self.kind, BlockKind::Lambda { .. })
    }

    pub fn is_compiled_unit(&self) -> bool {
        matches!(self.kind, BlockKind::CompiledUnit { .. })
    }

    /// The intrinsic this node calls, if it is a call to an intrinsic
    pub fn called_intrinsic(&self) -> Option<IntrinsicUri> {
        let (function, _) = self.call_parts()?;
        match function.kind {
            BlockKind::Intrinsic { uri } => Some(uri),
            _ => None,
        }
    }

    /// Whether this node is a call to the intrinsic `uri`
    pub fn is_called_intrinsic(&self, uri: IntrinsicUri) -> bool {
        self.called_intrinsic() == Some(uri)
    }

    /// Whether this node is a call to a compiled unit
    pub fn is_called_compiled_unit(&self) -> bool {
        self.call_parts()
            .is_some_and(|(function, _)| function.is_compiled_unit())
    }
}

impl fmt::Display for BuildingBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BlockKind::Reference { name } => write!(f, "{name}"),
            BlockKind::Lambda {
                parameter_name,
                result,
                ..
            } => write!(f, "({parameter_name} -> {result})"),
            BlockKind::Call { function, argument } => match argument {
                Some(argument) => write!(f, "{function}({argument})"),
                None => write!(f, "{function}()"),
            },
            BlockKind::Tuple { elements } => {
                write!(f, "<")?;
                for (i, (name, element)) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    match name {
                        Some(name) => write!(f, "{name}={element}")?,
                        None => write!(f, "{element}")?,
                    }
                }
                write!(f, ">")
            }
            BlockKind::Selection { source, index } => write!(f, "{source}[{index}]"),
            BlockKind::Intrinsic { uri } => write!(f, "{uri}"),
            BlockKind::CompiledUnit { payload } => write!(f, "comp#{}", payload.fingerprint()),
        }
    }
}
