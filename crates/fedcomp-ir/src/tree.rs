//! Tree analysis and rewriting
//!
//! Traversals over [`BuildingBlock`] trees: walking, searching, counting,
//! scope-aware analysis of references, the postorder [`Transform`] visitor,
//! and the name-hygienic rewrites every transformation is built from.

use crate::building_block::{BlockKind, BuildingBlock, Comp};
use crate::intrinsics::IntrinsicUri;
use crate::naming::NameGenerator;
use compact_str::CompactString;
use fedcomp_core::{FederatedResult, Type, ValueError};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

/// Direct children of a node, in evaluation order
pub fn children(comp: &BuildingBlock) -> Vec<&Comp> {
    match comp.kind() {
        BlockKind::Reference { .. }
        | BlockKind::Intrinsic { .. }
        | BlockKind::CompiledUnit { .. } => Vec::new(),
        BlockKind::Lambda { result, .. } => vec![result],
        BlockKind::Call { function, argument } => {
            let mut nodes = vec![function];
            nodes.extend(argument.iter());
            nodes
        }
        BlockKind::Tuple { elements } => elements.iter().map(|(_, e)| e).collect(),
        BlockKind::Selection { source, .. } => vec![source],
    }
}

/// Visit every node in preorder
pub fn walk(comp: &Comp, visit: &mut impl FnMut(&Comp)) {
    visit(comp);
    for child in children(comp) {
        walk(child, visit);
    }
}

/// First node in preorder satisfying `predicate`
pub fn find(comp: &Comp, predicate: &mut impl FnMut(&Comp) -> bool) -> Option<Comp> {
    if predicate(comp) {
        return Some(comp.clone());
    }
    children(comp)
        .into_iter()
        .find_map(|child| find(child, predicate))
}

/// Number of nodes satisfying `predicate`
pub fn count(comp: &Comp, mut predicate: impl FnMut(&Comp) -> bool) -> usize {
    let mut total = 0;
    walk(comp, &mut |node| {
        if predicate(node) {
            total += 1;
        }
    });
    total
}

/// Number of calls to the intrinsic `uri`
pub fn count_called_intrinsics(comp: &Comp, uri: IntrinsicUri) -> usize {
    count(comp, |node| node.is_called_intrinsic(uri))
}

/// Whether any node references the intrinsic `uri`, called or not
pub fn contains_intrinsic(comp: &Comp, uri: IntrinsicUri) -> bool {
    find(comp, &mut |node: &Comp| {
        matches!(node.kind(), BlockKind::Intrinsic { uri: found } if *found == uri)
    })
    .is_some()
}

/// Names of every lambda parameter, in preorder
pub fn bound_names(comp: &Comp) -> Vec<CompactString> {
    let mut names = Vec::new();
    walk(comp, &mut |node| {
        if let Some((name, _, _)) = node.lambda_parts() {
            names.push(name.clone());
        }
    });
    names
}

/// Unbound references of `comp` with their types, in first-occurrence order
pub fn unbound_references(comp: &Comp) -> IndexMap<CompactString, Type> {
    fn collect(
        comp: &Comp,
        bound: &mut Vec<CompactString>,
        unbound: &mut IndexMap<CompactString, Type>,
    ) {
        match comp.kind() {
            BlockKind::Reference { name } => {
                if !bound.contains(name) && !unbound.contains_key(name) {
                    unbound.insert(name.clone(), comp.type_signature().clone());
                }
            }
            BlockKind::Lambda {
                parameter_name,
                result,
                ..
            } => {
                bound.push(parameter_name.clone());
                collect(result, bound, unbound);
                bound.pop();
            }
            _ => {
                for child in children(comp) {
                    collect(child, bound, unbound);
                }
            }
        }
    }

    let mut unbound = IndexMap::new();
    collect(comp, &mut Vec::new(), &mut unbound);
    unbound
}

/// Fail with a value error if any name is bound more than once
pub fn check_has_unique_names(comp: &Comp) -> FederatedResult<()> {
    let mut seen = HashSet::new();
    for name in bound_names(comp) {
        if !seen.insert(name.clone()) {
            return Err(ValueError::NonUniqueName {
                name: name.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// A postorder rewrite step.
///
/// Called on every node after its children have been rewritten. Returning
/// `Ok(None)` keeps the node; `Ok(Some(new))` replaces it.
pub trait Transform {
    fn transform(&mut self, comp: &Comp) -> FederatedResult<Option<Comp>>;
}

impl<F> Transform for F
where
    F: FnMut(&Comp) -> FederatedResult<Option<Comp>>,
{
    fn transform(&mut self, comp: &Comp) -> FederatedResult<Option<Comp>> {
        self(comp)
    }
}

/// Rewrite `comp` bottom-up, sharing every subtree the transform leaves alone
pub fn transform_postorder(comp: &Comp, transform: &mut impl Transform) -> FederatedResult<Comp> {
    let rebuilt = map_children(comp, |child| transform_postorder(child, transform))?;
    Ok(transform.transform(&rebuilt)?.unwrap_or(rebuilt))
}

/// Rebuild `comp` with each child replaced by `f(child)`.
///
/// Returns `comp` itself when every child comes back pointer-identical.
/// Types of rebuilt nodes are re-derived through the checked constructors.
pub fn map_children(
    comp: &Comp,
    mut f: impl FnMut(&Comp) -> FederatedResult<Comp>,
) -> FederatedResult<Comp> {
    match comp.kind() {
        BlockKind::Reference { .. }
        | BlockKind::Intrinsic { .. }
        | BlockKind::CompiledUnit { .. } => Ok(comp.clone()),
        BlockKind::Lambda {
            parameter_name,
            parameter_type,
            result,
        } => {
            let new_result = f(result)?;
            if Arc::ptr_eq(&new_result, result) {
                return Ok(comp.clone());
            }
            Ok(BuildingBlock::lambda(
                parameter_name.clone(),
                parameter_type.clone(),
                new_result,
            ))
        }
        BlockKind::Call { function, argument } => {
            let new_function = f(function)?;
            let new_argument = argument.as_ref().map(&mut f).transpose()?;
            let unchanged = Arc::ptr_eq(&new_function, function)
                && match (&new_argument, argument) {
                    (Some(new), Some(old)) => Arc::ptr_eq(new, old),
                    _ => true,
                };
            if unchanged {
                return Ok(comp.clone());
            }
            BuildingBlock::call(new_function, new_argument)
        }
        BlockKind::Tuple { elements } => {
            let mut changed = false;
            let mut new_elements = Vec::with_capacity(elements.len());
            for (name, element) in elements {
                let new_element = f(element)?;
                changed |= !Arc::ptr_eq(&new_element, element);
                new_elements.push((name.clone(), new_element));
            }
            if !changed {
                return Ok(comp.clone());
            }
            Ok(BuildingBlock::tuple(new_elements))
        }
        BlockKind::Selection { source, index } => {
            let new_source = f(source)?;
            if Arc::ptr_eq(&new_source, source) {
                return Ok(comp.clone());
            }
            BuildingBlock::selection(new_source, *index)
        }
    }
}

/// Rename every bound name in `comp` to a fresh one from `names`.
///
/// References are renamed along with their binders; unbound references keep
/// their names. The result has unique bound names.
pub fn uniquify_reference_names(comp: &Comp, names: &mut NameGenerator) -> FederatedResult<Comp> {
    fn rename(
        comp: &Comp,
        scope: &im::HashMap<CompactString, CompactString>,
        names: &mut NameGenerator,
    ) -> FederatedResult<Comp> {
        match comp.kind() {
            BlockKind::Reference { name } => match scope.get(name) {
                Some(new_name) if new_name != name => Ok(BuildingBlock::reference(
                    new_name.clone(),
                    comp.type_signature().clone(),
                )),
                _ => Ok(comp.clone()),
            },
            BlockKind::Lambda {
                parameter_name,
                parameter_type,
                result,
            } => {
                let fresh = names.next_name();
                trace!(from = %parameter_name, to = %fresh, "renaming binder");
                let inner = scope.update(parameter_name.clone(), fresh.clone());
                let new_result = rename(result, &inner, names)?;
                Ok(BuildingBlock::lambda(fresh, parameter_type.clone(), new_result))
            }
            _ => map_children(comp, |child| rename(child, scope, names)),
        }
    }

    names.reserve_tree(comp);
    rename(comp, &im::HashMap::new(), names)
}

/// Capture-free substitution of `replacement` for the free occurrences of
/// `name` in `comp`.
///
/// Binders in `comp` that would capture a free name of `replacement` are
/// renamed. When `replacement` contains binders and is inserted more than
/// once, every copy after the first has its binders freshened so bound
/// names stay unique.
pub fn substitute(
    comp: &Comp,
    name: &str,
    replacement: &Comp,
    names: &mut NameGenerator,
) -> FederatedResult<Comp> {
    struct Substitution<'a> {
        name: &'a str,
        replacement: &'a Comp,
        replacement_free: IndexMap<CompactString, Type>,
        has_binders: bool,
        uses: usize,
    }

    impl Substitution<'_> {
        fn apply(&mut self, comp: &Comp, names: &mut NameGenerator) -> FederatedResult<Comp> {
            match comp.kind() {
                BlockKind::Reference { name } if name == self.name => {
                    self.uses += 1;
                    if self.uses > 1 && self.has_binders {
                        uniquify_reference_names(self.replacement, names)
                    } else {
                        Ok(self.replacement.clone())
                    }
                }
                BlockKind::Lambda {
                    parameter_name,
                    parameter_type,
                    result,
                } => {
                    if parameter_name == self.name {
                        return Ok(comp.clone());
                    }
                    if !unbound_references(result).contains_key(self.name) {
                        return Ok(comp.clone());
                    }
                    if self.replacement_free.contains_key(parameter_name) {
                        let fresh = names.next_name();
                        trace!(from = %parameter_name, to = %fresh, "avoiding capture");
                        let renamed =
                            rename_free(result, parameter_name, &fresh, parameter_type, names)?;
                        let new_result = self.apply(&renamed, names)?;
                        return Ok(BuildingBlock::lambda(fresh, parameter_type.clone(), new_result));
                    }
                    let new_result = self.apply(result, names)?;
                    Ok(BuildingBlock::lambda(
                        parameter_name.clone(),
                        parameter_type.clone(),
                        new_result,
                    ))
                }
                _ => map_children(comp, |child| self.apply(child, names)),
            }
        }
    }

    names.reserve_tree(comp);
    names.reserve_tree(replacement);
    let mut substitution = Substitution {
        name,
        replacement,
        replacement_free: unbound_references(replacement),
        has_binders: !bound_names(replacement).is_empty(),
        uses: 0,
    };
    substitution.apply(comp, names)
}

/// Rename the free occurrences of `from` in `comp` to `to`
fn rename_free(
    comp: &Comp,
    from: &str,
    to: &CompactString,
    ty: &Type,
    names: &mut NameGenerator,
) -> FederatedResult<Comp> {
    let replacement = BuildingBlock::reference(to.clone(), ty.clone());
    substitute(comp, from, &replacement, names)
}

/// Structural equality up to consistent renaming of bound names
pub fn alpha_equivalent(a: &Comp, b: &Comp) -> bool {
    fn equivalent(a: &Comp, b: &Comp, pairs: &mut Vec<(CompactString, CompactString)>) -> bool {
        if a.type_signature() != b.type_signature() {
            return false;
        }
        match (a.kind(), b.kind()) {
            (BlockKind::Reference { name: x }, BlockKind::Reference { name: y }) => {
                let bound_x = pairs.iter().rev().find(|(l, _)| l == x);
                let bound_y = pairs.iter().rev().find(|(_, r)| r == y);
                match (bound_x, bound_y) {
                    (Some((_, ry)), Some((lx, _))) => ry == y && lx == x,
                    (None, None) => x == y,
                    _ => false,
                }
            }
            (
                BlockKind::Lambda {
                    parameter_name: x,
                    result: ra,
                    ..
                },
                BlockKind::Lambda {
                    parameter_name: y,
                    result: rb,
                    ..
                },
            ) => {
                pairs.push((x.clone(), y.clone()));
                let same = equivalent(ra, rb, pairs);
                pairs.pop();
                same
            }
            (
                BlockKind::Call {
                    function: fa,
                    argument: aa,
                },
                BlockKind::Call {
                    function: fb,
                    argument: ab,
                },
            ) => {
                equivalent(fa, fb, pairs)
                    && match (aa, ab) {
                        (Some(aa), Some(ab)) => equivalent(aa, ab, pairs),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (BlockKind::Tuple { elements: ea }, BlockKind::Tuple { elements: eb }) => {
                ea.len() == eb.len()
                    && ea
                        .iter()
                        .zip(eb)
                        .all(|((na, xa), (nb, xb))| na == nb && equivalent(xa, xb, pairs))
            }
            (
                BlockKind::Selection {
                    source: sa,
                    index: ia,
                },
                BlockKind::Selection {
                    source: sb,
                    index: ib,
                },
            ) => ia == ib && equivalent(sa, sb, pairs),
            (BlockKind::Intrinsic { uri: ua }, BlockKind::Intrinsic { uri: ub }) => ua == ub,
            (BlockKind::CompiledUnit { payload: pa }, BlockKind::CompiledUnit { payload: pb }) => {
                pa == pb
            }
            _ => false,
        }
    }

    Arc::ptr_eq(a, b) || equivalent(a, b, &mut Vec::new())
}

/// The reference a selection chain starts from, and the path of indices
/// from it: `x[1][0]` yields `("x", [1, 0])`
pub fn selection_path(comp: &Comp) -> Option<(&CompactString, Vec<usize>)> {
    let mut path = Vec::new();
    let mut current = comp;
    loop {
        match current.kind() {
            BlockKind::Selection { source, index } => {
                path.push(*index);
                current = source;
            }
            BlockKind::Reference { name } => {
                path.reverse();
                return Some((name, path));
            }
            _ => return None,
        }
    }
}
