//! Fresh-name generation
//!
//! A [`NameGenerator`] is created per transformation call and seeded with
//! every name already present in the trees it will touch, so generated
//! names never collide with existing binders or references. There is no
//! process-wide counter: two generators built over the same tree produce
//! the same sequence.

use crate::building_block::{BlockKind, Comp};
use crate::tree;
use compact_str::{format_compact, CompactString};
use std::collections::HashSet;

/// Default prefix for generated names
pub const DEFAULT_PREFIX: &str = "_var";

/// Produces names unused in the trees it was seeded with
#[derive(Debug, Clone)]
pub struct NameGenerator {
    prefix: CompactString,
    counter: usize,
    taken: HashSet<CompactString>,
}

impl NameGenerator {
    pub fn new(prefix: impl Into<CompactString>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: 0,
            taken: HashSet::new(),
        }
    }

    /// Generator that avoids every name occurring in `comp`
    pub fn for_tree(comp: &Comp, prefix: impl Into<CompactString>) -> Self {
        let mut generator = Self::new(prefix);
        generator.reserve_tree(comp);
        generator
    }

    /// Mark every binder and reference name in `comp` as taken
    pub fn reserve_tree(&mut self, comp: &Comp) {
        tree::walk(comp, &mut |node: &Comp| match node.kind() {
            BlockKind::Reference { name } => {
                self.taken.insert(name.clone());
            }
            BlockKind::Lambda { parameter_name, .. } => {
                self.taken.insert(parameter_name.clone());
            }
            _ => {}
        });
    }

    /// Mark a single name as taken
    pub fn reserve(&mut self, name: impl Into<CompactString>) {
        self.taken.insert(name.into());
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    /// Next unused name: `<prefix>1`, `<prefix>2`, ...
    pub fn next_name(&mut self) -> CompactString {
        loop {
            self.counter += 1;
            let candidate = format_compact!("{}{}", self.prefix, self.counter);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}
