//! Federated computation core
//!
//! Foundation types shared by the IR and its transformations:
//!
//! - **Types**: tensor, named-tuple, function and placed type descriptors
//! - **Errors**: the error taxonomy used by every transformation

pub mod errors;
pub mod types;

pub use errors::{
    compilation_error, CanonicalFormCompilationError, ExecutionError, FederatedError,
    FederatedResult, TypeError, ValueError,
};
pub use types::{Placement, TensorKind, TupleElement, Type};

/// Version information for the fedcomp-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
