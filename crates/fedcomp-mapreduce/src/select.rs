//! Selecting outputs of a tuple-valued lambda

use crate::compiler::CanonicalFormCompiler;
use fedcomp_core::{FederatedResult, TypeError, ValueError};
use fedcomp_ir::{BuildingBlock, Comp};
use std::collections::BTreeSet;
use tracing::{debug, debug_span};

/// Positions to select from a tuple result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSelection {
    /// The element itself
    Single(usize),
    /// A tuple of the elements, in this order; repeats allowed
    Multiple(Vec<usize>),
}

impl From<usize> for OutputSelection {
    fn from(index: usize) -> Self {
        OutputSelection::Single(index)
    }
}

impl From<Vec<usize>> for OutputSelection {
    fn from(indices: Vec<usize>) -> Self {
        OutputSelection::Multiple(indices)
    }
}

impl From<&[usize]> for OutputSelection {
    fn from(indices: &[usize]) -> Self {
        OutputSelection::Multiple(indices.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for OutputSelection {
    fn from(indices: [usize; N]) -> Self {
        OutputSelection::Multiple(indices.to_vec())
    }
}

/// Sets select in ascending order
impl From<BTreeSet<usize>> for OutputSelection {
    fn from(indices: BTreeSet<usize>) -> Self {
        OutputSelection::Multiple(indices.into_iter().collect())
    }
}

impl CanonicalFormCompiler {
    /// Restrict the result of `comp` to the elements at `selection`.
    ///
    /// The body is bound once to a fresh name and selected from, so it is
    /// never duplicated: `(x -> (v -> v[i])(body))`.
    pub fn select_output_from_lambda(
        &self,
        comp: &Comp,
        selection: impl Into<OutputSelection>,
    ) -> FederatedResult<Comp> {
        let selection = selection.into();
        let _span = debug_span!("select_output_from_lambda", ?selection).entered();

        let Some((parameter, parameter_type, body)) = comp.lambda_parts() else {
            return Err(TypeError::UnexpectedNode {
                expected: "a Lambda",
                found: comp.kind().label().to_string(),
            }
            .into());
        };
        let Some(elements) = body.type_signature().tuple_elements() else {
            return Err(TypeError::NotATuple {
                ty: body.type_signature().clone(),
            }
            .into());
        };
        if matches!(&selection, OutputSelection::Multiple(indices) if indices.is_empty()) {
            return Err(ValueError::Empty {
                what: "the collection of output indices",
            }
            .into());
        }

        let mut names = self.names_for(comp);
        let bound = names.next_name();
        let bound_reference =
            BuildingBlock::reference(bound.clone(), body.type_signature().clone());
        let selected = match &selection {
            OutputSelection::Single(index) => BuildingBlock::selection(bound_reference, *index)?,
            OutputSelection::Multiple(indices) => {
                let picked = indices
                    .iter()
                    .map(|&index| {
                        let name = elements.get(index).and_then(|(name, _)| name.clone());
                        Ok((name, BuildingBlock::selection(bound_reference.clone(), index)?))
                    })
                    .collect::<FederatedResult<Vec<_>>>()?;
                BuildingBlock::tuple(picked)
            }
        };
        debug!(result = %selected.type_signature(), "selected outputs");
        let binder = BuildingBlock::lambda(bound, body.type_signature().clone(), selected);
        let new_body = BuildingBlock::call(binder, Some(body.clone()))?;
        Ok(BuildingBlock::lambda(parameter.clone(), parameter_type.clone(), new_body))
    }
}

/// Restrict the result of `comp` with the default configuration
pub fn select_output_from_lambda(
    comp: &Comp,
    selection: impl Into<OutputSelection>,
) -> FederatedResult<Comp> {
    CanonicalFormCompiler::default().select_output_from_lambda(comp, selection)
}
