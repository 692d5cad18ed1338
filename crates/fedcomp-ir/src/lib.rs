//! Federated computation IR
//!
//! The building-block tree, the intrinsic catalogue, and everything needed
//! to rewrite trees without breaking name hygiene:
//!
//! - [`building_block`]: the seven node kinds and their checked constructors
//! - [`intrinsics`]: enumerated intrinsics and well-typed call builders
//! - [`naming`]: per-invocation fresh-name generation
//! - [`tree`]: analysis, the postorder visitor, substitution and renaming
//! - [`compiled`]: compiled-unit payloads
//! - [`executor`]: the executor interface and a reference executor

pub mod building_block;
pub mod compiled;
pub mod executor;
pub mod intrinsics;
pub mod naming;
pub mod tree;

pub use building_block::{BlockKind, BuildingBlock, Comp, NamedElement};
pub use compiled::{
    compile_local, compiled_constant, compiled_identity, compiled_primitive, LocalProgram,
    Payload, Primitive, Value,
};
pub use executor::{LocalExecutor, ReferenceExecutor};
pub use intrinsics::{IntrinsicUri, UnknownIntrinsic};
pub use naming::NameGenerator;
pub use tree::{
    alpha_equivalent, check_has_unique_names, count_called_intrinsics, transform_postorder,
    unbound_references, uniquify_reference_names, Transform,
};

/// Version information for the fedcomp-ir crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
