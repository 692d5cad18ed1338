//! The configured entry point to every transformation

use crate::config::TransformConfig;
use fedcomp_ir::{Comp, NameGenerator};

/// Holds a [`TransformConfig`] and exposes each canonical-form
/// transformation as a method. The free functions of this crate call the
/// same methods on a default-configured compiler.
#[derive(Debug, Clone, Default)]
pub struct CanonicalFormCompiler {
    config: TransformConfig,
}

impl CanonicalFormCompiler {
    pub fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Fresh-name generator for one invocation, seeded with `comp`'s names
    pub(crate) fn names_for(&self, comp: &Comp) -> NameGenerator {
        NameGenerator::for_tree(comp, self.config.name_prefix.as_str())
    }
}
