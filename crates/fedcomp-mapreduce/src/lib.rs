//! Canonical MapReduce form for federated computations
//!
//! Rewrites of typed building-block trees into the two-phase shape a
//! MapReduce-style backend runs:
//!
//! - [`consolidate`]: reduce local processing to one compiled unit
//! - [`split`]: merge the calls to one intrinsic and cut the tree around them
//! - [`rebind`]: rebind parameter leaves as a zipped lower-level argument
//! - [`select`] and [`concatenate`]: reshape function outputs
//! - [`normalize`]: canonical all-equal bits
//!
//! Every transformation is a method of [`CanonicalFormCompiler`] and a free
//! function using the default [`TransformConfig`].

pub mod compiler;
pub mod concatenate;
pub mod config;
pub mod consolidate;
pub mod normalize;
pub mod rebind;
mod reduce;
pub mod select;
pub mod split;

pub use compiler::CanonicalFormCompiler;
pub use concatenate::concatenate_function_outputs;
pub use config::{ConfigError, TransformConfig};
pub use consolidate::{check_extraction_result, consolidate_and_extract_local_processing};
pub use normalize::normalize_all_equal_bit;
pub use rebind::{
    bind_single_selection_as_argument_to_lower_level_lambda,
    zip_selection_as_argument_to_lower_level_lambda,
};
pub use select::{select_output_from_lambda, OutputSelection};
pub use split::{force_align_and_split_by_intrinsic, INTRINSIC_RESULTS, ORIGINAL_ARG};

/// Version information for the fedcomp-mapreduce crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
