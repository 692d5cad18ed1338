//! Canonical all-equal bits
//!
//! Clients values are never all-equal and server values always are. Every
//! placed type in the tree is rewritten to that convention and the
//! `federated_map_all_equal` intrinsic becomes plain `federated_map`, whose
//! result bit then agrees with the rewritten types. Arguments are kept as
//! they are; only the called intrinsic changes.

use crate::compiler::CanonicalFormCompiler;
use fedcomp_core::FederatedResult;
use fedcomp_ir::tree::map_children;
use fedcomp_ir::{BlockKind, BuildingBlock, Comp, IntrinsicUri};
use tracing::{debug_span, trace};

impl CanonicalFormCompiler {
    /// Rewrite every all-equal bit in `comp` to its canonical value
    pub fn normalize_all_equal_bit(&self, comp: &Comp) -> FederatedResult<Comp> {
        let _span = debug_span!("normalize_all_equal_bit").entered();
        normalize(comp)
    }
}

/// Normalize all-equal bits with the default configuration
pub fn normalize_all_equal_bit(comp: &Comp) -> FederatedResult<Comp> {
    CanonicalFormCompiler::default().normalize_all_equal_bit(comp)
}

fn normalize(comp: &Comp) -> FederatedResult<Comp> {
    match comp.kind() {
        BlockKind::Reference { name } => {
            let ty = comp.type_signature().normalize_all_equal();
            if &ty == comp.type_signature() {
                return Ok(comp.clone());
            }
            Ok(BuildingBlock::reference(name.clone(), ty))
        }
        BlockKind::Lambda {
            parameter_name,
            parameter_type,
            result,
        } => Ok(BuildingBlock::lambda(
            parameter_name.clone(),
            parameter_type.normalize_all_equal(),
            normalize(result)?,
        )),
        BlockKind::Intrinsic { uri } => {
            let ty = comp.type_signature().normalize_all_equal();
            let uri = match uri {
                IntrinsicUri::FederatedMapAllEqual => {
                    trace!("rewriting federated_map_all_equal as federated_map");
                    IntrinsicUri::FederatedMap
                }
                other => *other,
            };
            Ok(BuildingBlock::intrinsic(uri, ty))
        }
        BlockKind::Call { .. }
        | BlockKind::Tuple { .. }
        | BlockKind::Selection { .. }
        | BlockKind::CompiledUnit { .. } => map_children(comp, normalize),
    }
}
