//! Local reductions used before extraction and splitting
//!
//! Beta-reduction of applied lambdas, folding of selections out of literal
//! tuples, and eta-reduction of lambdas that only forward to a compiled
//! unit. All three preserve meaning because the IR is pure.

use fedcomp_core::FederatedResult;
use fedcomp_ir::tree::{substitute, transform_postorder};
use fedcomp_ir::{BlockKind, Comp, NameGenerator};
use tracing::trace;

/// Reduce every `(x -> body)(arg)` to `body[x := arg]` and every `<..>[i]`
/// to its `i`th element, until no redex remains.
pub(crate) fn beta_reduce(comp: &Comp, names: &mut NameGenerator) -> FederatedResult<Comp> {
    transform_postorder(comp, &mut |node: &Comp| reduce_node(node, names))
}

fn reduce_node(node: &Comp, names: &mut NameGenerator) -> FederatedResult<Option<Comp>> {
    match node.kind() {
        BlockKind::Call {
            function,
            argument: Some(argument),
        } => {
            let Some((parameter, _, body)) = function.lambda_parts() else {
                return Ok(None);
            };
            trace!(parameter = %parameter, "beta-reducing applied lambda");
            let substituted = substitute(body, parameter, argument, names)?;
            // Substitution can expose new redexes inside the body.
            beta_reduce(&substituted, names).map(Some)
        }
        BlockKind::Selection { source, index } => match source.kind() {
            BlockKind::Tuple { elements } => Ok(elements.get(*index).map(|(_, e)| e.clone())),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

/// Replace `(x -> u(x))` by `u` when `u` is a compiled unit of the same type
pub(crate) fn eta_reduce_compiled_units(comp: &Comp) -> FederatedResult<Comp> {
    transform_postorder(comp, &mut |node: &Comp| -> FederatedResult<Option<Comp>> {
        let Some((parameter, _, body)) = node.lambda_parts() else {
            return Ok(None);
        };
        let Some((function, Some(argument))) = body.call_parts() else {
            return Ok(None);
        };
        let forwards_parameter = argument.reference_name() == Some(parameter);
        if function.is_compiled_unit()
            && forwards_parameter
            && function.type_signature() == node.type_signature()
        {
            trace!(unit = %function, "eta-reducing forwarding lambda");
            return Ok(Some(function.clone()));
        }
        Ok(None)
    })
}

/// Whether `comp` still contains a reducible application or selection
#[cfg(test)]
pub(crate) fn has_redex(comp: &Comp) -> bool {
    fedcomp_ir::tree::find(comp, &mut |node: &Comp| match node.kind() {
        BlockKind::Call {
            function,
            argument: Some(_),
        } => function.is_lambda(),
        BlockKind::Selection { source, .. } => matches!(source.kind(), BlockKind::Tuple { .. }),
        _ => false,
    })
    .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedcomp_core::{TensorKind, Type};
    use fedcomp_ir::{compiled_primitive, BuildingBlock, Primitive};

    fn int_ref(name: &str) -> Comp {
        BuildingBlock::reference(name, Type::int32())
    }

    #[test]
    fn test_beta_reduces_nested_applications() {
        // (f -> f(y))((x -> <x, x>))
        let pair = BuildingBlock::unnamed_tuple([int_ref("x"), int_ref("x")]);
        let dup = BuildingBlock::lambda("x", Type::int32(), pair);
        let f = BuildingBlock::reference("f", dup.type_signature().clone());
        let apply = BuildingBlock::lambda(
            "f",
            dup.type_signature().clone(),
            BuildingBlock::call(f, Some(int_ref("y"))).unwrap(),
        );
        let tree = BuildingBlock::call(apply, Some(dup)).unwrap();
        let mut names = NameGenerator::for_tree(&tree, "_var");
        let reduced = beta_reduce(&tree, &mut names).unwrap();
        assert_eq!(reduced.to_string(), "<y,y>");
        assert!(!has_redex(&reduced));
    }

    #[test]
    fn test_folds_selection_from_tuple() {
        let tuple = BuildingBlock::unnamed_tuple([int_ref("a"), int_ref("b")]);
        let tree = BuildingBlock::selection(tuple, 1).unwrap();
        let mut names = NameGenerator::default();
        assert_eq!(beta_reduce(&tree, &mut names).unwrap().to_string(), "b");
    }

    #[test]
    fn test_eta_reduces_forwarding_lambda() {
        let add = compiled_primitive(Primitive::Add(TensorKind::Int32)).unwrap();
        let pair = add.type_signature().function_parts().unwrap().0.unwrap().clone();
        let p = BuildingBlock::reference("p", pair.clone());
        let forward = BuildingBlock::lambda("p", pair, BuildingBlock::call(add.clone(), Some(p)).unwrap());
        let reduced = eta_reduce_compiled_units(&forward).unwrap();
        assert!(std::sync::Arc::ptr_eq(&reduced, &add));
    }

    #[test]
    fn test_keeps_lambda_that_does_not_forward() {
        let add = compiled_primitive(Primitive::Add(TensorKind::Int32)).unwrap();
        let x = int_ref("x");
        let body = BuildingBlock::call(add, Some(BuildingBlock::unnamed_tuple([x.clone(), x]))).unwrap();
        let lam = BuildingBlock::lambda("x", Type::int32(), body);
        let reduced = eta_reduce_compiled_units(&lam).unwrap();
        assert!(std::sync::Arc::ptr_eq(&reduced, &lam));
    }
}
