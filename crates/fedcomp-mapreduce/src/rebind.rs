//! Rebinding selected parameter leaves as one lower-level argument

use crate::compiler::CanonicalFormCompiler;
use fedcomp_core::{FederatedError, FederatedResult, Placement, Type, TypeError};
use fedcomp_ir::intrinsics::{create_federated_map_or_apply, create_federated_zip};
use fedcomp_ir::tree::selection_path;
use fedcomp_ir::{
    transform_postorder, uniquify_reference_names, BuildingBlock, Comp, NameGenerator,
};
use tracing::{debug, debug_span, trace};

/// A selected leaf of the parameter: its path and placed type
#[derive(Debug)]
struct Leaf {
    path: Vec<usize>,
    ty: Type,
}

impl CanonicalFormCompiler {
    /// Zip the placed leaves of `comp`'s parameter at `paths` into one value
    /// bound by an inner lambda.
    ///
    /// The result is `(x -> (z -> body')(zipped))` with the type of `comp`.
    /// `body'` reads each selected leaf back out of `z` with the map-like
    /// intrinsic for its placement. The selected leaves must agree on their
    /// placement and on their all-equal bit, so that every leaf read back
    /// has its original type.
    pub fn zip_selection_as_argument_to_lower_level_lambda<P: AsRef<[usize]>>(
        &self,
        comp: &Comp,
        paths: &[P],
    ) -> FederatedResult<Comp> {
        let _span = debug_span!(
            "zip_selection_as_argument_to_lower_level_lambda",
            paths = paths.len()
        )
        .entered();

        let Some((_, parameter_type, _)) = comp.lambda_parts() else {
            return Err(expected_lambda(comp));
        };
        if paths.is_empty() {
            return Err(TypeError::UnexpectedNode {
                expected: "a non-empty sequence of selection paths",
                found: "an empty sequence".to_string(),
            }
            .into());
        }
        if parameter_type.tuple_elements().is_none() {
            return Err(TypeError::NotATuple {
                ty: parameter_type.clone(),
            }
            .into());
        }
        let leaves = paths
            .iter()
            .map(|path| resolve_leaf(parameter_type, path.as_ref()))
            .collect::<FederatedResult<Vec<_>>>()?;
        let placement = common_placement(&leaves)?;
        check_common_all_equal(&leaves)?;

        let mut names = self.names_for(comp);
        let renamed = uniquify_reference_names(comp, &mut names)?;
        let Some((parameter, parameter_type, body)) = renamed.lambda_parts() else {
            return Err(expected_lambda(comp));
        };
        let parameter_reference =
            BuildingBlock::reference(parameter.clone(), parameter_type.clone());
        let leaf_values = leaves
            .iter()
            .map(|leaf| select_path(&parameter_reference, &leaf.path))
            .collect::<FederatedResult<Vec<_>>>()?;

        let zipped = if let [_, _, ..] = leaf_values.as_slice() {
            let tuple = BuildingBlock::unnamed_tuple(leaf_values.iter().cloned());
            Some(create_federated_zip(tuple)?)
        } else {
            None
        };
        let zipped_type = match &zipped {
            Some(zipped) => zipped.type_signature().clone(),
            None => wrapped_type(&leaves[0].ty),
        };
        let Some((member_type, _, _)) = zipped_type.placed_parts() else {
            return Err(TypeError::NotPlaced { ty: zipped_type }.into());
        };
        let member_type = member_type.clone();

        let bound = names.next_name();
        let bound_reference = BuildingBlock::reference(bound.clone(), zipped_type.clone());
        let mut read_leaf = |node: &Comp| -> FederatedResult<Option<Comp>> {
            let Some((name, path)) = selection_path(node) else {
                return Ok(None);
            };
            if name != parameter {
                return Ok(None);
            }
            let Some(index) = leaves.iter().position(|leaf| leaf.path == path) else {
                return Ok(None);
            };
            trace!(?path, index, "reading selected leaf from the zipped argument");
            let select = selector(&member_type, index, &mut names)?;
            create_federated_map_or_apply(select, bound_reference.clone()).map(Some)
        };
        let new_body = transform_postorder(body, &mut read_leaf)?;

        let zipped = match zipped {
            Some(zipped) => zipped,
            None => wrap_single(&leaf_values[0], &leaves[0].ty, &mut names)?,
        };
        debug!(leaves = leaves.len(), %placement, "zipped selected leaves");
        let inner = BuildingBlock::lambda(bound, zipped_type, new_body);
        let result = BuildingBlock::call(inner, Some(zipped))?;
        Ok(BuildingBlock::lambda(parameter.clone(), parameter_type.clone(), result))
    }

    /// Bind `x[index]` of `comp`'s parameter `x` to a new inner parameter.
    ///
    /// The result is `(x -> (z -> body[x[index] := z])(x[index]))`.
    pub fn bind_single_selection_as_argument_to_lower_level_lambda(
        &self,
        comp: &Comp,
        index: usize,
    ) -> FederatedResult<Comp> {
        let _span =
            debug_span!("bind_single_selection_as_argument_to_lower_level_lambda", index).entered();

        let Some((_, parameter_type, _)) = comp.lambda_parts() else {
            return Err(expected_lambda(comp));
        };
        let leaf = resolve_path(parameter_type, &[index])?;

        let mut names = self.names_for(comp);
        let renamed = uniquify_reference_names(comp, &mut names)?;
        let Some((parameter, parameter_type, body)) = renamed.lambda_parts() else {
            return Err(expected_lambda(comp));
        };
        let bound = names.next_name();
        let bound_reference = BuildingBlock::reference(bound.clone(), leaf.clone());
        let mut bind_leaf = |node: &Comp| -> FederatedResult<Option<Comp>> {
            match selection_path(node) {
                Some((name, path)) if name == parameter && path == [index] => {
                    Ok(Some(bound_reference.clone()))
                }
                _ => Ok(None),
            }
        };
        let new_body = transform_postorder(body, &mut bind_leaf)?;

        let parameter_reference =
            BuildingBlock::reference(parameter.clone(), parameter_type.clone());
        let argument = BuildingBlock::selection(parameter_reference, index)?;
        let inner = BuildingBlock::lambda(bound, leaf, new_body);
        let result = BuildingBlock::call(inner, Some(argument))?;
        Ok(BuildingBlock::lambda(parameter.clone(), parameter_type.clone(), result))
    }
}

/// Zip the parameter leaves at `paths` with the default configuration
pub fn zip_selection_as_argument_to_lower_level_lambda<P: AsRef<[usize]>>(
    comp: &Comp,
    paths: &[P],
) -> FederatedResult<Comp> {
    CanonicalFormCompiler::default().zip_selection_as_argument_to_lower_level_lambda(comp, paths)
}

/// Bind one parameter element with the default configuration
pub fn bind_single_selection_as_argument_to_lower_level_lambda(
    comp: &Comp,
    index: usize,
) -> FederatedResult<Comp> {
    CanonicalFormCompiler::default()
        .bind_single_selection_as_argument_to_lower_level_lambda(comp, index)
}

fn expected_lambda(comp: &Comp) -> FederatedError {
    TypeError::UnexpectedNode {
        expected: "a Lambda",
        found: comp.kind().label().to_string(),
    }
    .into()
}

/// Type reached from `ty` by selecting along `path`
fn resolve_path(ty: &Type, path: &[usize]) -> FederatedResult<Type> {
    if path.is_empty() {
        return Err(TypeError::UnexpectedNode {
            expected: "a non-empty selection path",
            found: "an empty path".to_string(),
        }
        .into());
    }
    let mut current = ty;
    for &index in path {
        current = match current.tuple_elements().and_then(|elements| elements.get(index)) {
            Some((_, element)) => element,
            None => {
                return Err(TypeError::NonexistentIndex {
                    index,
                    ty: current.clone(),
                }
                .into())
            }
        };
    }
    Ok(current.clone())
}

fn resolve_leaf(ty: &Type, path: &[usize]) -> FederatedResult<Leaf> {
    let leaf = resolve_path(ty, path)?;
    if !leaf.is_placed() {
        return Err(TypeError::NotPlaced { ty: leaf }.into());
    }
    Ok(Leaf {
        path: path.to_vec(),
        ty: leaf,
    })
}

fn common_placement(leaves: &[Leaf]) -> FederatedResult<Placement> {
    let mut placement = None;
    for leaf in leaves {
        let Some((_, found, _)) = leaf.ty.placed_parts() else {
            return Err(TypeError::NotPlaced { ty: leaf.ty.clone() }.into());
        };
        match placement {
            None => placement = Some(found),
            Some(first) if first != found => {
                return Err(TypeError::MixedPlacements { first, second: found }.into());
            }
            Some(_) => {}
        }
    }
    placement.ok_or_else(|| {
        TypeError::UnexpectedNode {
            expected: "at least one selected leaf",
            found: "none".to_string(),
        }
        .into()
    })
}

/// The zip of the leaves is all-equal only when every leaf is, and reading a
/// leaf back yields the zip's bit, so the leaves must share theirs.
fn check_common_all_equal(leaves: &[Leaf]) -> FederatedResult<()> {
    let Some((first, rest)) = leaves.split_first() else {
        return Ok(());
    };
    let bit = |leaf: &Leaf| leaf.ty.placed_parts().map(|(_, _, all_equal)| all_equal);
    match rest.iter().find(|&leaf| bit(leaf) != bit(first)) {
        Some(other) => Err(TypeError::Mismatch {
            context: "all-equal bits of zipped leaves",
            expected: first.ty.clone(),
            actual: other.ty.clone(),
        }
        .into()),
        None => Ok(()),
    }
}

fn select_path(source: &Comp, path: &[usize]) -> FederatedResult<Comp> {
    path.iter()
        .try_fold(source.clone(), |current, &index| BuildingBlock::selection(current, index))
}

/// `(t -> t[index])` over `ty`, with a fresh `t`
fn selector(ty: &Type, index: usize, names: &mut NameGenerator) -> FederatedResult<Comp> {
    let parameter = names.next_name();
    let reference = BuildingBlock::reference(parameter.clone(), ty.clone());
    Ok(BuildingBlock::lambda(
        parameter,
        ty.clone(),
        BuildingBlock::selection(reference, index)?,
    ))
}

/// Type of a single placed leaf mapped into a one-element tuple
fn wrapped_type(leaf: &Type) -> Type {
    match leaf.placed_parts() {
        Some((member, placement, all_equal)) => {
            Type::placed_with(Type::tuple([member.clone()]), placement, all_equal)
        }
        None => Type::tuple([leaf.clone()]),
    }
}

/// `map_or_apply(<(u -> <u>), leaf>)`
fn wrap_single(leaf: &Comp, ty: &Type, names: &mut NameGenerator) -> FederatedResult<Comp> {
    let Some((member, _, _)) = ty.placed_parts() else {
        return Err(TypeError::NotPlaced { ty: ty.clone() }.into());
    };
    let parameter = names.next_name();
    let reference = BuildingBlock::reference(parameter.clone(), member.clone());
    let wrap = BuildingBlock::lambda(
        parameter,
        member.clone(),
        BuildingBlock::unnamed_tuple([reference]),
    );
    create_federated_map_or_apply(wrap, leaf.clone())
}
