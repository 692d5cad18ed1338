//! Error taxonomy for IR construction and canonical-form compilation
//!
//! Errors fall into three families that callers may want to tell apart:
//! - [`TypeError`]: wrong node kinds, wrong shapes and type mismatches
//! - [`ValueError`]: well-typed inputs that violate a value precondition
//! - [`CanonicalFormCompilationError`]: the computation cannot be put into
//!   canonical form
//!
//! The reference executor adds [`ExecutionError`]. Every error is raised
//! before any rewriting happens; no transformation returns a partial result.

use crate::types::{Placement, Type};
use thiserror::Error;

/// Result type used across the workspace
pub type FederatedResult<T> = Result<T, FederatedError>;

/// Any error produced by the IR or its transformations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FederatedError {
    #[error("TypeError: {0}")]
    Type(#[from] TypeError),

    #[error("ValueError: {0}")]
    Value(#[from] ValueError),

    #[error("CanonicalFormCompilationError: {0}")]
    CanonicalForm(#[from] CanonicalFormCompilationError),

    #[error("ExecutionError: {0}")]
    Execution(#[from] ExecutionError),
}

impl FederatedError {
    pub fn is_type_error(&self) -> bool {
        matches!(self, FederatedError::Type(_))
    }

    pub fn is_value_error(&self) -> bool {
        matches!(self, FederatedError::Value(_))
    }

    pub fn is_compilation_error(&self) -> bool {
        matches!(self, FederatedError::CanonicalForm(_))
    }
}

/// Precondition violations and type mismatches
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeError {
    #[error("expected {expected}, found {found}")]
    UnexpectedNode {
        expected: &'static str,
        found: String,
    },

    #[error("type mismatch in {context}: expected {expected}, got {actual}")]
    Mismatch {
        context: &'static str,
        expected: Type,
        actual: Type,
    },

    #[error("cannot call a value of non-functional type {ty}")]
    NotAFunction { ty: Type },

    #[error("function of type {function} requires an argument")]
    MissingArgument { function: Type },

    #[error("niladic function of type {function} cannot take an argument of type {argument}")]
    UnexpectedArgument { function: Type, argument: Type },

    #[error("cannot select from non-tuple type {ty}")]
    NotATuple { ty: Type },

    #[error("selection of nonexistent index {index} from {ty}")]
    NonexistentIndex { index: usize, ty: Type },

    #[error("expected a placed type, got {ty}")]
    NotPlaced { ty: Type },

    #[error("expected a value placed at {expected}, got {actual}")]
    WrongPlacement { expected: Placement, actual: Type },

    #[error("selected values must all be at the same placement; found {first} and {second}")]
    MixedPlacements { first: Placement, second: Placement },

    #[error(
        "reference '{name}' of functional type {ty} passed for consolidation; \
         there is no body to inline"
    )]
    FunctionalReference { name: String, ty: Type },

    #[error("expected {expected} element(s) in the argument of {intrinsic}, got {actual}")]
    IntrinsicArity {
        intrinsic: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Well-typed inputs that violate a value precondition
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("bound name '{name}' occurs more than once; names must be unique")]
    NonUniqueName { name: String },

    #[error("{what} must not be empty")]
    Empty { what: &'static str },
}

/// The computation cannot be put into canonical form
///
/// The message is a complete diagnostic suitable for end users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CanonicalFormCompilationError {
    pub message: String,
}

impl CanonicalFormCompilationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failures of the reference executor
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("unbound name '{name}' during execution")]
    UnboundName { name: String },

    #[error("expected {expected} during execution, found {found}")]
    UnexpectedValue {
        expected: &'static str,
        found: String,
    },

    #[error("argument count mismatch: unit of type {ty} invoked {detail}")]
    Arity { ty: Type, detail: &'static str },

    #[error("intrinsic {uri} cannot be executed locally")]
    NonLocal { uri: String },
}

/// Shorthand for building a compilation error wrapped in [`FederatedError`]
pub fn compilation_error(message: impl Into<String>) -> FederatedError {
    FederatedError::CanonicalForm(CanonicalFormCompilationError::new(message))
}
